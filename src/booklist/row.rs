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


//! Row types for the flattened booklist table

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{Result, ShelfError};
use crate::style::GroupKind;

// ===== ROW KIND =====

/// What a flattened row represents: a book leaf or one of the group
/// header kinds. Stored numerically in the flattened table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    Book,
    Author,
    Series,
    Bookshelf,
    Loaned,
    ReadStatus,
    Rating,
    Publisher,
    Language,
    Format,
    Genre,
    TitleLetter,
    PublicationYear,
    PublicationMonth,
    AddedYear,
    AddedMonth,
    AddedDay,
}

impl RowKind {
    pub fn as_i64(&self) -> i64 {
        match self {
            RowKind::Book => 0,
            RowKind::Author => 1,
            RowKind::Series => 2,
            RowKind::Bookshelf => 3,
            RowKind::Loaned => 4,
            RowKind::ReadStatus => 5,
            RowKind::Rating => 6,
            RowKind::Publisher => 7,
            RowKind::Language => 8,
            RowKind::Format => 9,
            RowKind::Genre => 10,
            RowKind::TitleLetter => 11,
            RowKind::PublicationYear => 12,
            RowKind::PublicationMonth => 13,
            RowKind::AddedYear => 14,
            RowKind::AddedMonth => 15,
            RowKind::AddedDay => 16,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self> {
        Ok(match value {
            0 => RowKind::Book,
            1 => RowKind::Author,
            2 => RowKind::Series,
            3 => RowKind::Bookshelf,
            4 => RowKind::Loaned,
            5 => RowKind::ReadStatus,
            6 => RowKind::Rating,
            7 => RowKind::Publisher,
            8 => RowKind::Language,
            9 => RowKind::Format,
            10 => RowKind::Genre,
            11 => RowKind::TitleLetter,
            12 => RowKind::PublicationYear,
            13 => RowKind::PublicationMonth,
            14 => RowKind::AddedYear,
            15 => RowKind::AddedMonth,
            16 => RowKind::AddedDay,
            other => {
                return Err(ShelfError::internal(format!(
                    "Unknown booklist row kind: {}",
                    other
                )))
            }
        })
    }

    pub fn from_group(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Author => RowKind::Author,
            GroupKind::Series => RowKind::Series,
            GroupKind::Bookshelf => RowKind::Bookshelf,
            GroupKind::Loaned => RowKind::Loaned,
            GroupKind::ReadStatus => RowKind::ReadStatus,
            GroupKind::Rating => RowKind::Rating,
            GroupKind::Publisher => RowKind::Publisher,
            GroupKind::Language => RowKind::Language,
            GroupKind::Format => RowKind::Format,
            GroupKind::Genre => RowKind::Genre,
            GroupKind::TitleLetter => RowKind::TitleLetter,
            GroupKind::PublicationYear => RowKind::PublicationYear,
            GroupKind::PublicationMonth => RowKind::PublicationMonth,
            GroupKind::AddedYear => RowKind::AddedYear,
            GroupKind::AddedMonth => RowKind::AddedMonth,
            GroupKind::AddedDay => RowKind::AddedDay,
        }
    }

    pub fn is_book(&self) -> bool {
        matches!(self, RowKind::Book)
    }
}

// ===== FLATTENED ROW =====

/// One row of the materialized booklist table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BooklistRow {
    /// Position in the fully expanded pre-order tree, 0-based, stable
    pub abs_pos: i64,
    /// Depth; group levels start at 1, books sit at `level_count`
    pub level: i64,
    /// Numeric [`RowKind`]
    pub kind: i64,
    pub book_id: Option<i64>,
    pub author_id: Option<i64>,
    pub series_id: Option<i64>,
    pub bookshelf_id: Option<i64>,
    /// Display text: header label or book title
    pub label: String,
    /// Hierarchical identity, e.g. `a=12/s=3`; empty for book rows
    pub node_key: String,
    pub read: bool,
    pub loaned: bool,
    /// Number within the series, empty when not applicable
    pub series_num: String,
    pub expanded: bool,
    pub visible: bool,
}

impl BooklistRow {
    pub fn row_kind(&self) -> Result<RowKind> {
        RowKind::from_i64(self.kind)
    }

    pub fn is_book(&self) -> bool {
        self.kind == RowKind::Book.as_i64()
    }

    /// Month headers store the zero-padded month number; translate for
    /// display
    pub fn display_label(&self) -> String {
        match RowKind::from_i64(self.kind) {
            Ok(RowKind::PublicationMonth) | Ok(RowKind::AddedMonth) => {
                month_name(&self.label).unwrap_or_else(|| self.label.clone())
            }
            _ => self.label.clone(),
        }
    }
}

/// Where a book's rows sit in the current list
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookRowInfo {
    pub absolute_position: i64,
    /// None when the row is inside a collapsed subtree
    pub visible_position: Option<i64>,
}

fn month_name(number: &str) -> Option<String> {
    let name = match number {
        "01" => "January",
        "02" => "February",
        "03" => "March",
        "04" => "April",
        "05" => "May",
        "06" => "June",
        "07" => "July",
        "08" => "August",
        "09" => "September",
        "10" => "October",
        "11" => "November",
        "12" => "December",
        _ => return None,
    };
    Some(name.to_string())
}
