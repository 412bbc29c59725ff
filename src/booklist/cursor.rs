// OpenShelf - Personal Library Catalogue for Mobile
// Copyright (C) 2026 OpenShelf contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Read access to a materialized booklist
//!
//! A cursor addresses rows by *visible position*: the 0-based index into
//! the projection of rows whose `visible` flag is set, in absolute-position
//! order. Collapsing a subtree shrinks the projection without disturbing
//! absolute positions, so a cursor never needs a rebuild after a toggle,
//! only fresh reads.

use sqlx::SqlitePool;

use crate::error::{Result, ShelfError};

use super::row::{BookRowInfo, BooklistRow};

const ROW_COLUMNS: &str = "abs_pos, level, kind, book_id, author_id, series_id, \
                           bookshelf_id, label, node_key, read, loaned, series_num, \
                           expanded, visible";

#[derive(Clone)]
pub struct BooklistCursor {
    pool: SqlitePool,
    table: String,
    level_count: i64,
}

impl BooklistCursor {
    pub(crate) fn new(pool: SqlitePool, table: String, level_count: i64) -> Self {
        Self {
            pool,
            table,
            level_count,
        }
    }

    pub fn level_count(&self) -> i64 {
        self.level_count
    }

    /// Rows currently visible
    pub async fn visible_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE visible = 1",
            self.table
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(closed_on_missing_table)?;
        Ok(count)
    }

    /// All rows, visible or not
    pub async fn total_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(closed_on_missing_table)?;
        Ok(count)
    }

    /// Row at a visible position, or None past the end
    pub async fn row_at(&self, visible_pos: i64) -> Result<Option<BooklistRow>> {
        if visible_pos < 0 {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, BooklistRow>(&format!(
            "SELECT {} FROM {} WHERE visible = 1 ORDER BY abs_pos LIMIT 1 OFFSET ?",
            ROW_COLUMNS, self.table
        ))
        .bind(visible_pos)
        .fetch_optional(&self.pool)
        .await
        .map_err(closed_on_missing_table)?;
        Ok(row)
    }

    /// A window of visible rows starting at `first`, for list adapters
    pub async fn window(&self, first: i64, count: i64) -> Result<Vec<BooklistRow>> {
        if first < 0 || count <= 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, BooklistRow>(&format!(
            "SELECT {} FROM {} WHERE visible = 1 ORDER BY abs_pos LIMIT ? OFFSET ?",
            ROW_COLUMNS, self.table
        ))
        .bind(count)
        .bind(first)
        .fetch_all(&self.pool)
        .await
        .map_err(closed_on_missing_table)?;
        Ok(rows)
    }

    /// Row at an absolute position regardless of visibility
    pub async fn row_at_absolute(&self, abs_pos: i64) -> Result<BooklistRow> {
        let total = self.total_count().await?;
        sqlx::query_as::<_, BooklistRow>(&format!(
            "SELECT {} FROM {} WHERE abs_pos = ?",
            ROW_COLUMNS, self.table
        ))
        .bind(abs_pos)
        .fetch_optional(&self.pool)
        .await
        .map_err(closed_on_missing_table)?
        .ok_or(ShelfError::PositionOutOfRange {
            position: abs_pos,
            visible_count: total,
        })
    }

    /// All positions at which a book appears, with visible indexes for
    /// rows not hidden inside a collapsed subtree
    pub async fn rows_for_book(&self, book_id: i64) -> Result<Vec<BookRowInfo>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT abs_pos, visible FROM {} WHERE book_id = ? ORDER BY abs_pos",
            self.table
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(closed_on_missing_table)?;

        let mut infos = Vec::with_capacity(rows.len());
        for (abs_pos, visible) in rows {
            let visible_position = if visible != 0 {
                let (idx,): (i64,) = sqlx::query_as(&format!(
                    "SELECT COUNT(*) FROM {} WHERE visible = 1 AND abs_pos < ?",
                    self.table
                ))
                .bind(abs_pos)
                .fetch_one(&self.pool)
                .await
                .map_err(closed_on_missing_table)?;
                Some(idx)
            } else {
                None
            };
            infos.push(BookRowInfo {
                absolute_position: abs_pos,
                visible_position,
            });
        }
        Ok(infos)
    }

    /// Visible index of an absolute position, or None while hidden
    pub async fn visible_position_of(&self, abs_pos: i64) -> Result<Option<i64>> {
        let row = self.row_at_absolute(abs_pos).await?;
        if !row.visible {
            return Ok(None);
        }
        let (idx,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE visible = 1 AND abs_pos < ?",
            self.table
        ))
        .bind(abs_pos)
        .fetch_one(&self.pool)
        .await
        .map_err(closed_on_missing_table)?;
        Ok(Some(idx))
    }
}

/// The backing table disappears when the owning builder is closed; give
/// readers the closed error rather than a raw SQL failure
fn closed_on_missing_table(e: sqlx::Error) -> ShelfError {
    if e.to_string().contains("no such table") {
        ShelfError::BooklistClosed
    } else {
        ShelfError::Sqlx(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booklist::builder::BooklistBuilder;
    use crate::booklist::Filters;
    use crate::storage::models::{NewAuthor, NewBook};
    use crate::storage::{queries, Database};
    use crate::style::{GroupKind, Style};

    async fn built_list() -> (SqlitePool, BooklistBuilder) {
        let db = Database::new_in_memory()
            .await
            .expect("Failed to create test database");
        let pool = db.pool().clone();

        let author = queries::upsert_author(&pool, &NewAuthor::parse("Jane Doe"))
            .await
            .expect("Failed to insert author");
        for title in ["Alpha", "Beta"] {
            let book = queries::insert_book(&pool, &NewBook::new(title.to_string()))
                .await
                .expect("Failed to insert book");
            queries::add_book_author(&pool, book, author, 1)
                .await
                .expect("Failed to link author");
        }

        let style = Style::new("By Author", vec![GroupKind::Author]);
        let list = BooklistBuilder::build(pool.clone(), &style, &Filters::default())
            .await
            .expect("Failed to build booklist");
        (pool, list)
    }

    #[tokio::test]
    async fn test_window_and_positions() {
        let (_pool, mut list) = built_list().await;
        let cursor = list.cursor();

        assert_eq!(cursor.visible_count().await.expect("count failed"), 3);
        let window = cursor.window(1, 10).await.expect("Failed to read window");
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].label, "Alpha");

        assert_eq!(
            cursor
                .visible_position_of(2)
                .await
                .expect("Failed to project position"),
            Some(2)
        );

        list.toggle_node(0).await.expect("Failed to toggle");
        assert_eq!(
            cursor
                .visible_position_of(2)
                .await
                .expect("Failed to project position"),
            None
        );

        list.close().await.expect("Failed to close booklist");
    }

    #[tokio::test]
    async fn test_reads_after_close_report_closed() {
        let (_pool, mut list) = built_list().await;
        let cursor = list.cursor();
        list.close().await.expect("Failed to close booklist");

        let err = cursor.row_at(0).await.unwrap_err();
        assert!(matches!(err, ShelfError::BooklistClosed));
    }

    #[tokio::test]
    async fn test_row_at_past_end_is_none() {
        let (_pool, mut list) = built_list().await;
        let cursor = list.cursor();
        assert!(cursor
            .row_at(99)
            .await
            .expect("Failed to read row")
            .is_none());
        list.close().await.expect("Failed to close booklist");
    }
}
