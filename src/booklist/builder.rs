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


//! Booklist materialization
//!
//! [`BooklistBuilder::build`] runs the composed base query once, walks the
//! ordered result emitting a header row whenever a group key changes, and
//! bulk-inserts the flattened tree into a uniquely-named table. The
//! builder then owns that table: expand/collapse mutate the `visible`
//! flag over contiguous position ranges, and [`BooklistBuilder::close`]
//! drops it.
//!
//! Tables are ordinary (not TEMP) because the connection pool hands out
//! whichever connection is free; a TEMP table on one connection would be
//! invisible on the next. [`purge_stale`] sweeps leftovers from crashed
//! sessions at startup.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use log::{debug, info, warn};
use sqlx::{Row, SqlitePool};

use crate::error::{Result, ShelfError};
use crate::style::Style;

use super::cursor::BooklistCursor;
use super::node_state::{self, NodeStateScope};
use super::plan::QueryPlan;
use super::row::{BookRowInfo, RowKind};
use super::Filters;

static TABLE_COUNTER: AtomicI64 = AtomicI64::new(1);

const TABLE_PREFIX: &str = "booklist_tmp_";

/// Rows per INSERT batch; 14 columns each keeps us under SQLite's
/// 999-parameter limit
const INSERT_CHUNK: usize = 50;

// ===== BUILD OUTPUT =====

/// Counts reported after a successful build
#[derive(Debug, Clone, Copy)]
pub struct BuildSummary {
    pub total_count: i64,
    pub visible_count: i64,
    pub level_count: i64,
    pub book_count: i64,
}

/// One node of the flattened tree, staged before insert
struct FlatRow {
    abs_pos: i64,
    level: i64,
    kind: i64,
    book_id: Option<i64>,
    author_id: Option<i64>,
    series_id: Option<i64>,
    bookshelf_id: Option<i64>,
    label: String,
    node_key: String,
    read: bool,
    loaned: bool,
    series_num: String,
    expanded: bool,
    visible: bool,
}

// ===== BUILDER =====

/// Owns one materialized booklist table
pub struct BooklistBuilder {
    pool: SqlitePool,
    table: String,
    scope: NodeStateScope,
    summary: BuildSummary,
    closed: bool,
}

impl BooklistBuilder {
    /// Materialize a booklist for a style and filter set.
    ///
    /// Restores persisted collapse state for the (style, bookshelf)
    /// scope, so the tree reopens with the shape it was left in.
    pub async fn build(pool: SqlitePool, style: &Style, filters: &Filters) -> Result<Self> {
        let plan = QueryPlan::compose(style, filters)?;
        let scope = NodeStateScope::new(style.uuid.to_string(), filters.node_state_scope());
        let table = format!(
            "{}{}",
            TABLE_PREFIX,
            TABLE_COUNTER.fetch_add(1, Ordering::SeqCst)
        );

        create_table(&pool, &table).await?;

        match Self::populate(&pool, &table, &plan, &scope).await {
            Ok(summary) => {
                info!(
                    "Built booklist {} for style '{}': {} rows, {} books, {} levels",
                    table, style.name, summary.total_count, summary.book_count, summary.level_count
                );
                Ok(Self {
                    pool,
                    table,
                    scope,
                    summary,
                    closed: false,
                })
            }
            Err(e) => {
                // do not leave a half-built table behind
                drop_table(&pool, &table).await;
                Err(e)
            }
        }
    }

    async fn populate(
        pool: &SqlitePool,
        table: &str,
        plan: &QueryPlan,
        scope: &NodeStateScope,
    ) -> Result<BuildSummary> {
        let mut query = sqlx::query(&plan.sql);
        for bind in &plan.binds {
            query = query.bind(bind);
        }
        let base_rows = query.fetch_all(pool).await.map_err(map_base_query_error)?;

        let collapsed = node_state::load_collapsed(pool, scope).await?;

        let level_count = plan.level_count();
        let mut rows: Vec<FlatRow> = Vec::with_capacity(base_rows.len() * 2);
        let mut last_keys: Vec<Option<String>> = vec![None; plan.stages.len()];
        let mut abs_pos: i64 = 0;
        let mut book_count: i64 = 0;

        for base in &base_rows {
            let book_id: i64 = base.try_get("book_id")?;
            let title: String = base.try_get("title")?;
            let read: bool = base.try_get::<i64, _>("read")? != 0;
            let loaned: bool = base.try_get::<i64, _>("loaned")? != 0;
            let series_num: String = base.try_get("series_num")?;
            let author_id: Option<i64> = base.try_get("author_id")?;
            let series_id: Option<i64> = base.try_get("series_id")?;
            let bookshelf_id: Option<i64> = base.try_get("bookshelf_id")?;

            // first level whose key differs from the previous row
            let mut changed_from: Option<usize> = None;
            for i in 0..plan.stages.len() {
                let key: String = base.try_get(format!("g{}_key", i).as_str())?;
                if last_keys[i].as_deref() != Some(key.as_str()) {
                    changed_from = Some(i);
                    // deeper levels restart even if their key matches
                    for slot in last_keys.iter_mut().skip(i) {
                        *slot = None;
                    }
                    last_keys[i] = Some(key);
                    break;
                }
            }
            if let Some(first) = changed_from {
                for i in first..plan.stages.len() {
                    if last_keys[i].is_none() {
                        let key: String = base.try_get(format!("g{}_key", i).as_str())?;
                        last_keys[i] = Some(key);
                    }
                    let label: String = base.try_get(format!("g{}_label", i).as_str())?;
                    let group_id: Option<i64> = base.try_get(format!("g{}_id", i).as_str())?;
                    let stage = &plan.stages[i];
                    let node_key = node_key_for(plan, &last_keys, i);

                    let kind = RowKind::from_group(stage.kind);
                    let mut row = FlatRow {
                        abs_pos,
                        level: i as i64 + 1,
                        kind: kind.as_i64(),
                        book_id: None,
                        author_id: None,
                        series_id: None,
                        bookshelf_id: None,
                        label,
                        node_key,
                        read: false,
                        loaned: false,
                        series_num: String::new(),
                        expanded: true,
                        visible: true,
                    };
                    match kind {
                        RowKind::Author => row.author_id = group_id,
                        RowKind::Series => row.series_id = group_id,
                        RowKind::Bookshelf => row.bookshelf_id = group_id,
                        _ => {}
                    }
                    rows.push(row);
                    abs_pos += 1;
                }
            }

            rows.push(FlatRow {
                abs_pos,
                level: level_count,
                kind: RowKind::Book.as_i64(),
                book_id: Some(book_id),
                author_id,
                series_id,
                bookshelf_id,
                label: title,
                node_key: String::new(),
                read,
                loaned,
                series_num,
                expanded: true,
                visible: true,
            });
            abs_pos += 1;
            book_count += 1;
        }

        let visible_count = apply_collapsed(&mut rows, &collapsed);

        insert_rows(pool, table, &rows).await?;

        Ok(BuildSummary {
            total_count: abs_pos,
            visible_count,
            level_count,
            book_count,
        })
    }

    pub fn summary(&self) -> BuildSummary {
        self.summary
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read handle over the current visible projection
    pub fn cursor(&self) -> BooklistCursor {
        BooklistCursor::new(
            self.pool.clone(),
            self.table.clone(),
            self.summary.level_count,
        )
    }

    // ===== EXPAND / COLLAPSE =====

    /// Flip one header between expanded and collapsed; returns the new
    /// expanded state. Errors with `NotAGroupNode` on a book row.
    pub async fn toggle_node(&mut self, abs_pos: i64) -> Result<bool> {
        self.ensure_open()?;
        let row = sqlx::query(&format!(
            "SELECT level, kind, node_key, expanded, visible FROM {} WHERE abs_pos = ?",
            self.table
        ))
        .bind(abs_pos)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ShelfError::PositionOutOfRange {
            position: abs_pos,
            visible_count: self.summary.total_count,
        })?;

        let kind: i64 = row.try_get("kind")?;
        if RowKind::from_i64(kind)?.is_book() {
            return Err(ShelfError::NotAGroupNode(abs_pos));
        }
        let level: i64 = row.try_get("level")?;
        let node_key: String = row.try_get("node_key")?;
        let was_expanded: bool = row.try_get::<i64, _>("expanded")? != 0;
        let visible: bool = row.try_get::<i64, _>("visible")? != 0;
        let expand = !was_expanded;

        let end = self.subtree_end(abs_pos, level).await?;

        if expand {
            // A header hidden under a collapsed ancestor only records the
            // new state; its subtree surfaces when the ancestor reopens.
            if visible {
                self.reveal_subtree(abs_pos, end).await?;
            }
        } else {
            sqlx::query(&format!(
                "UPDATE {} SET visible = 0 WHERE abs_pos > ? AND abs_pos < ?",
                self.table
            ))
            .bind(abs_pos)
            .bind(end)
            .execute(&self.pool)
            .await?;
        }
        sqlx::query(&format!(
            "UPDATE {} SET expanded = ? WHERE abs_pos = ?",
            self.table
        ))
        .bind(expand)
        .bind(abs_pos)
        .execute(&self.pool)
        .await?;

        node_state::set_collapsed(&self.pool, &self.scope, &node_key, !expand).await?;
        self.refresh_visible_count().await?;
        debug!(
            "Toggled node {} at {} ({} rows now visible)",
            node_key, abs_pos, self.summary.visible_count
        );
        Ok(expand)
    }

    /// Expand or collapse the whole tree and persist the result
    pub async fn expand_all(&mut self, expand: bool) -> Result<()> {
        self.ensure_open()?;
        if expand {
            sqlx::query(&format!("UPDATE {} SET visible = 1, expanded = 1", self.table))
                .execute(&self.pool)
                .await?;
            node_state::clear_scope(&self.pool, &self.scope).await?;
        } else {
            sqlx::query(&format!(
                "UPDATE {} SET expanded = 0 WHERE kind != 0",
                self.table
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "UPDATE {} SET visible = (level = 1)",
                self.table
            ))
            .execute(&self.pool)
            .await?;

            let keys: Vec<(String,)> = sqlx::query_as(&format!(
                "SELECT node_key FROM {} WHERE kind != 0",
                self.table
            ))
            .fetch_all(&self.pool)
            .await?;
            let keys: Vec<String> = keys.into_iter().map(|(k,)| k).collect();
            node_state::replace_scope(&self.pool, &self.scope, &keys).await?;
        }
        self.refresh_visible_count().await?;
        Ok(())
    }

    /// First position after the subtree rooted at `abs_pos`
    async fn subtree_end(&self, abs_pos: i64, level: i64) -> Result<i64> {
        let (end,): (Option<i64>,) = sqlx::query_as(&format!(
            "SELECT MIN(abs_pos) FROM {} WHERE abs_pos > ? AND level <= ?",
            self.table
        ))
        .bind(abs_pos)
        .bind(level)
        .fetch_one(&self.pool)
        .await?;

        Ok(end.unwrap_or(self.summary.total_count))
    }

    /// Make a subtree visible again, honouring collapsed descendants:
    /// rows under a still-collapsed inner header stay hidden
    async fn reveal_subtree(&self, start: i64, end: i64) -> Result<()> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(&format!(
            "SELECT abs_pos, level, expanded FROM {} \
             WHERE abs_pos > ? AND abs_pos < ? ORDER BY abs_pos",
            self.table
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut show: Vec<i64> = Vec::new();
        let mut hide: Vec<i64> = Vec::new();
        let mut hide_stack: Vec<i64> = Vec::new();
        for (pos, level, expanded) in rows {
            while hide_stack.last().is_some_and(|l| level <= *l) {
                hide_stack.pop();
            }
            if hide_stack.is_empty() {
                show.push(pos);
            } else {
                hide.push(pos);
            }
            if expanded == 0 {
                hide_stack.push(level);
            }
        }

        self.set_visible(&show, true).await?;
        self.set_visible(&hide, false).await?;
        Ok(())
    }

    async fn set_visible(&self, positions: &[i64], visible: bool) -> Result<()> {
        for chunk in positions.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE {} SET visible = ? WHERE abs_pos IN ({})",
                self.table, placeholders
            );
            let mut query = sqlx::query(&sql).bind(visible);
            for pos in chunk {
                query = query.bind(pos);
            }
            query.execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn refresh_visible_count(&mut self) -> Result<()> {
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE visible = 1",
            self.table
        ))
        .fetch_one(&self.pool)
        .await?;
        self.summary.visible_count = count;
        Ok(())
    }

    // ===== LOOKUP =====

    /// All positions at which a book appears; see
    /// [`BooklistCursor::rows_for_book`]
    pub async fn rows_for_book(&self, book_id: i64) -> Result<Vec<BookRowInfo>> {
        self.ensure_open()?;
        self.cursor().rows_for_book(book_id).await
    }

    // ===== LIFECYCLE =====

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(ShelfError::BooklistClosed)
        } else {
            Ok(())
        }
    }

    /// Drop the backing table. Cursors created from this builder fail
    /// afterwards; call order is the caller's responsibility.
    pub async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            drop_table(&self.pool, &self.table).await;
            debug!("Closed booklist {}", self.table);
        }
        Ok(())
    }
}

// ===== TABLE MANAGEMENT =====

async fn create_table(pool: &SqlitePool, table: &str) -> Result<()> {
    sqlx::query(&format!(
        "CREATE TABLE {} (
            abs_pos INTEGER PRIMARY KEY,
            level INTEGER NOT NULL,
            kind INTEGER NOT NULL,
            book_id INTEGER,
            author_id INTEGER,
            series_id INTEGER,
            bookshelf_id INTEGER,
            label TEXT NOT NULL,
            node_key TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            loaned INTEGER NOT NULL DEFAULT 0,
            series_num TEXT NOT NULL DEFAULT '',
            expanded INTEGER NOT NULL DEFAULT 1,
            visible INTEGER NOT NULL DEFAULT 1
        )",
        table
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX idx_{t}_visible ON {t} (visible, abs_pos)",
        t = table
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX idx_{t}_book ON {t} (book_id)",
        t = table
    ))
    .execute(pool)
    .await?;
    Ok(())
}

async fn drop_table(pool: &SqlitePool, table: &str) {
    if let Err(e) = sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(pool)
        .await
    {
        warn!("Failed to drop booklist table {}: {}", table, e);
    }
}

/// Drop leftover booklist tables from sessions that never closed them
pub async fn purge_stale(pool: &SqlitePool) -> Result<u64> {
    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND (name LIKE 'booklist_tmp_%' OR name LIKE 'booklist_flat_%')",
    )
    .fetch_all(pool)
    .await?;

    let mut purged = 0;
    for (name,) in names {
        drop_table(pool, &name).await;
        purged += 1;
    }
    if purged > 0 {
        info!("Purged {} stale booklist tables", purged);
    }
    Ok(purged)
}

async fn insert_rows(pool: &SqlitePool, table: &str, rows: &[FlatRow]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let values = vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (abs_pos, level, kind, book_id, author_id, series_id, \
             bookshelf_id, label, node_key, read, loaned, series_num, expanded, visible) \
             VALUES {}",
            table, values
        );
        let mut query = sqlx::query(&sql);
        for row in chunk {
            query = query
                .bind(row.abs_pos)
                .bind(row.level)
                .bind(row.kind)
                .bind(row.book_id)
                .bind(row.author_id)
                .bind(row.series_id)
                .bind(row.bookshelf_id)
                .bind(&row.label)
                .bind(&row.node_key)
                .bind(row.read)
                .bind(row.loaned)
                .bind(&row.series_num)
                .bind(row.expanded)
                .bind(row.visible);
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

// ===== HELPERS =====

fn node_key_for(plan: &QueryPlan, keys: &[Option<String>], level: usize) -> String {
    let mut parts = Vec::with_capacity(level + 1);
    for (i, stage) in plan.stages.iter().enumerate().take(level + 1) {
        let key = keys[i].as_deref().unwrap_or("");
        parts.push(format!("{}={}", stage.kind.key_tag(), key));
    }
    parts.join("/")
}

/// Apply persisted collapse state in one pre-order walk; returns the
/// visible row count
fn apply_collapsed(rows: &mut [FlatRow], collapsed: &HashSet<String>) -> i64 {
    let mut hide_stack: Vec<i64> = Vec::new();
    let mut visible = 0;
    for row in rows.iter_mut() {
        while hide_stack.last().is_some_and(|l| row.level <= *l) {
            hide_stack.pop();
        }
        row.visible = hide_stack.is_empty();
        if row.visible {
            visible += 1;
        }
        if row.kind != RowKind::Book.as_i64() && collapsed.contains(&row.node_key) {
            row.expanded = false;
            hide_stack.push(row.level);
        }
    }
    visible
}

/// The base query only ever fails on a malformed grouping definition or
/// a genuinely broken schema; surface the former as a fatal style error
fn map_base_query_error(e: sqlx::Error) -> ShelfError {
    let message = e.to_string();
    if message.contains("no such column") || message.contains("no such table") {
        ShelfError::style_config(format!("Grouping refers to missing data: {}", message), None)
    } else {
        ShelfError::Sqlx(e)
    }
}
