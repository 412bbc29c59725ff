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


//! Durable expand/collapse state
//!
//! Only collapsed nodes are stored; absence means expanded, so a fresh
//! style opens fully expanded and the table stays small. State is scoped
//! per (style, bookshelf) so the same style can hold different shapes on
//! different shelves.

use std::collections::HashSet;

use sqlx::SqlitePool;

use crate::error::Result;

/// Identifies one node-state scope
#[derive(Debug, Clone)]
pub struct NodeStateScope {
    pub style_uuid: String,
    pub bookshelf_id: i64,
}

impl NodeStateScope {
    pub fn new(style_uuid: impl Into<String>, bookshelf_id: i64) -> Self {
        Self {
            style_uuid: style_uuid.into(),
            bookshelf_id,
        }
    }
}

/// Node keys collapsed within a scope
pub async fn load_collapsed(pool: &SqlitePool, scope: &NodeStateScope) -> Result<HashSet<String>> {
    let keys: Vec<(String,)> = sqlx::query_as(
        "SELECT node_key FROM booklist_node_state
         WHERE style_uuid = ? AND bookshelf_id = ? AND expanded = 0",
    )
    .bind(&scope.style_uuid)
    .bind(scope.bookshelf_id)
    .fetch_all(pool)
    .await?;

    Ok(keys.into_iter().map(|(k,)| k).collect())
}

/// Record one node as collapsed or forget it (expanded is the default)
pub async fn set_collapsed(
    pool: &SqlitePool,
    scope: &NodeStateScope,
    node_key: &str,
    collapsed: bool,
) -> Result<()> {
    if collapsed {
        sqlx::query(
            "INSERT OR REPLACE INTO booklist_node_state
             (style_uuid, bookshelf_id, node_key, expanded)
             VALUES (?, ?, ?, 0)",
        )
        .bind(&scope.style_uuid)
        .bind(scope.bookshelf_id)
        .bind(node_key)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            "DELETE FROM booklist_node_state
             WHERE style_uuid = ? AND bookshelf_id = ? AND node_key = ?",
        )
        .bind(&scope.style_uuid)
        .bind(scope.bookshelf_id)
        .bind(node_key)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Replace the scope's state wholesale with the given collapsed keys
pub async fn replace_scope(
    pool: &SqlitePool,
    scope: &NodeStateScope,
    collapsed: &[String],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM booklist_node_state WHERE style_uuid = ? AND bookshelf_id = ?")
        .bind(&scope.style_uuid)
        .bind(scope.bookshelf_id)
        .execute(&mut *tx)
        .await?;
    for key in collapsed {
        sqlx::query(
            "INSERT INTO booklist_node_state (style_uuid, bookshelf_id, node_key, expanded)
             VALUES (?, ?, ?, 0)",
        )
        .bind(&scope.style_uuid)
        .bind(scope.bookshelf_id)
        .bind(key)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Drop all state for a scope (used when expanding everything)
pub async fn clear_scope(pool: &SqlitePool, scope: &NodeStateScope) -> Result<()> {
    sqlx::query("DELETE FROM booklist_node_state WHERE style_uuid = ? AND bookshelf_id = ?")
        .bind(&scope.style_uuid)
        .bind(scope.bookshelf_id)
        .execute(pool)
        .await?;
    Ok(())
}
