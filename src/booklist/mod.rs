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


//! The booklist construction engine
//!
//! Turns a [`Style`](crate::style::Style) plus filter criteria into a
//! materialized, navigable tree of rows: group headers at each level and
//! book rows as leaves.
//!
//! The tree lives in a uniquely-named flattened table, one row per node in
//! depth-first pre-order. Each row carries its absolute position (a stable
//! index into the fully expanded tree), its level, its row kind, and a
//! `visible` flag. Because the order is pre-order, the subtree under any
//! header is a contiguous run of absolute positions, so expand/collapse is
//! a flag flip over a range rather than a structural rebuild. Absolute
//! positions never change between builds of the same data; only the
//! visible projection does.
//!
//! Module map:
//! - [`plan`]: typed query-plan builder (each group kind contributes its
//!   SQL fragments)
//! - [`builder`]: materializes the flattened table, owns its lifecycle
//! - [`cursor`]: read access to the visible projection
//! - [`node_state`]: durable expand/collapse state per style and bookshelf
//! - [`flattened`]: the book-id-order snapshot for detail-screen paging
//! - [`extras`]: throttled per-row background field lookups

pub mod builder;
pub mod cursor;
pub mod extras;
pub mod flattened;
pub mod node_state;
pub mod plan;
pub mod row;

pub use builder::{BooklistBuilder, BuildSummary};
pub use cursor::BooklistCursor;
pub use extras::{BookExtras, ExtrasFetcher};
pub use flattened::FlattenedBooklist;
pub use row::{BookRowInfo, BooklistRow, RowKind};

use serde::{Deserialize, Serialize};

/// Filter criteria for a list build; all present filters are ANDed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filters {
    /// Restrict to books on this bookshelf
    pub bookshelf_id: Option<i64>,
    /// Free-text search resolved through the FTS index
    pub search: Option<String>,
    /// Restrict by read flag
    pub read: Option<bool>,
    /// Restrict by loan presence
    pub loaned: Option<bool>,
}

impl Filters {
    pub fn for_bookshelf(bookshelf_id: i64) -> Self {
        Self {
            bookshelf_id: Some(bookshelf_id),
            ..Default::default()
        }
    }

    /// Bookshelf scope used for node-state persistence (0 = all books)
    pub fn node_state_scope(&self) -> i64 {
        self.bookshelf_id.unwrap_or(0)
    }
}
