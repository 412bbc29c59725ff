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


//! Book-order snapshot for detail-screen paging
//!
//! When the user opens a book and swipes to the next one, navigation must
//! follow the list order they were just looking at, and must keep working
//! even while the list itself is rebuilt behind them. The snapshot copies
//! the book ids of the source list, in list order, into its own table
//! with an independent lifetime.

use std::sync::atomic::{AtomicI64, Ordering};

use log::debug;
use sqlx::SqlitePool;

use crate::error::{Result, ShelfError};

use super::builder::BooklistBuilder;

static SNAPSHOT_COUNTER: AtomicI64 = AtomicI64::new(1);

/// A positional snapshot of book ids with a movable current position
pub struct FlattenedBooklist {
    pool: SqlitePool,
    table: String,
    count: i64,
    position: i64,
    closed: bool,
}

impl FlattenedBooklist {
    /// Snapshot every book row of a built list, in list order.
    /// Hidden rows are included; collapsing a group should not make its
    /// books unreachable from the detail screen.
    pub async fn snapshot(builder: &BooklistBuilder) -> Result<Self> {
        let pool = builder.pool().clone();
        let table = format!(
            "booklist_flat_{}",
            SNAPSHOT_COUNTER.fetch_add(1, Ordering::SeqCst)
        );

        sqlx::query(&format!(
            "CREATE TABLE {} (pos INTEGER PRIMARY KEY AUTOINCREMENT, book_id INTEGER NOT NULL)",
            table
        ))
        .execute(&pool)
        .await?;

        let result = sqlx::query(&format!(
            "INSERT INTO {} (book_id)
             SELECT book_id FROM {} WHERE kind = 0 ORDER BY abs_pos",
            table,
            builder.table_name()
        ))
        .execute(&pool)
        .await;

        let count = match result {
            Ok(done) => done.rows_affected() as i64,
            Err(e) => {
                let _ = sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                    .execute(&pool)
                    .await;
                return Err(e.into());
            }
        };

        debug!("Snapshot {} holds {} books", table, count);
        Ok(Self {
            pool,
            table,
            count,
            position: 0,
            closed: false,
        })
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Book id at the current position
    pub async fn current(&self) -> Result<Option<i64>> {
        self.ensure_open()?;
        if self.count == 0 {
            return Ok(None);
        }
        self.book_id_at(self.position).await
    }

    pub async fn book_id_at(&self, position: i64) -> Result<Option<i64>> {
        self.ensure_open()?;
        let id: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT book_id FROM {} ORDER BY pos LIMIT 1 OFFSET ?",
            self.table
        ))
        .bind(position)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(|(i,)| i))
    }

    /// Advance; false at the end
    pub fn move_next(&mut self) -> bool {
        if self.position + 1 < self.count {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Step back; false at the start
    pub fn move_prev(&mut self) -> bool {
        if self.position > 0 {
            self.position -= 1;
            true
        } else {
            false
        }
    }

    /// Jump to the first occurrence of a book; false when absent
    pub async fn move_to_book(&mut self, book_id: i64) -> Result<bool> {
        self.ensure_open()?;
        let found: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE pos < \
             (SELECT MIN(pos) FROM {} WHERE book_id = ?)",
            self.table, self.table
        ))
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        let exists: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE book_id = ?",
            self.table
        ))
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        if exists.0 == 0 {
            return Ok(false);
        }
        if let Some((pos,)) = found {
            self.position = pos;
        }
        Ok(true)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(ShelfError::BooklistClosed)
        } else {
            Ok(())
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
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
        for title in ["Alpha", "Beta", "Gamma"] {
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
    async fn test_snapshot_navigation() {
        let (_pool, mut list) = built_list().await;
        let mut flat = FlattenedBooklist::snapshot(&list)
            .await
            .expect("Failed to snapshot");

        assert_eq!(flat.count(), 3);
        assert_eq!(flat.current().await.expect("read failed"), Some(1));
        assert!(flat.move_next());
        assert_eq!(flat.current().await.expect("read failed"), Some(2));
        assert!(flat.move_next());
        assert!(!flat.move_next());
        assert!(flat.move_prev());
        assert_eq!(flat.position(), 1);

        assert!(flat.move_to_book(3).await.expect("jump failed"));
        assert_eq!(flat.current().await.expect("read failed"), Some(3));
        assert!(!flat.move_to_book(999).await.expect("jump failed"));

        flat.close().await.expect("Failed to close snapshot");
        list.close().await.expect("Failed to close booklist");
    }

    #[tokio::test]
    async fn test_snapshot_outlives_source_list() {
        let (_pool, mut list) = built_list().await;
        let flat = FlattenedBooklist::snapshot(&list)
            .await
            .expect("Failed to snapshot");
        list.close().await.expect("Failed to close booklist");

        // paging still works after the source table is gone
        assert_eq!(flat.book_id_at(2).await.expect("read failed"), Some(3));
    }
}
