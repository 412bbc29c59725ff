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


//! Database models for the catalogue
//!
//! Entity structs mapped with `sqlx::FromRow`, plus `New*` structs for
//! inserts.
//!
//! # SQLite Adaptations
//! - Dates stored as TEXT in ISO 8601 format
//! - Booleans stored as INTEGER 0/1
//! - The anthology field is a small bitmask (see [`Book::is_anthology`])

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Anthology bitmask: the book is a collection of stories
pub const ANTHOLOGY_IS_COLLECTION: i32 = 1;
/// Anthology bitmask: the collection has multiple authors
pub const ANTHOLOGY_MULTIPLE_AUTHORS: i32 = 2;

// ============================================================================
// MAIN ENTITIES
// ============================================================================

/// Book entity - core catalogue record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Book {
    /// Primary key (auto-increment)
    pub book_id: i64,

    pub title: String,
    /// Pre-computed sort form ("Hobbit, The")
    pub sort_title: String,
    pub isbn: String,
    pub description: String,
    pub publisher: String,
    #[sqlx(default)]
    pub date_published: Option<NaiveDate>,
    pub format: String,
    pub genre: String,
    pub language: String,
    pub pages: i32,
    pub list_price: String,

    // Reading state
    pub read: bool,
    #[sqlx(default)]
    pub read_start: Option<NaiveDate>,
    #[sqlx(default)]
    pub read_end: Option<NaiveDate>,
    pub rating: f32,

    // User metadata
    pub notes: String,
    pub location: String,
    pub signed: bool,
    pub anthology: i32,

    // Timestamps
    pub date_added: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Book {
    pub fn is_anthology(&self) -> bool {
        self.anthology & ANTHOLOGY_IS_COLLECTION != 0
    }

    /// Year the book was published, if known
    pub fn publication_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.date_published.map(|d| d.year())
    }
}

/// Author entity
///
/// Names are stored split so the two display forms can both be derived:
/// "Given Family" for detail screens and "Family, Given" for sorting and
/// group headers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Author {
    pub author_id: i64,
    pub given_names: String,
    pub family_name: String,
}

impl Author {
    /// Display name: "Given Family"
    pub fn display_name(&self) -> String {
        if self.given_names.is_empty() {
            self.family_name.clone()
        } else {
            format!("{} {}", self.given_names, self.family_name)
        }
    }

    /// Sort name: "Family, Given"
    pub fn sort_name(&self) -> String {
        if self.given_names.is_empty() {
            self.family_name.clone()
        } else {
            format!("{}, {}", self.family_name, self.given_names)
        }
    }
}

/// Series entity
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Series {
    pub series_id: i64,
    pub name: String,
}

/// Bookshelf entity
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Bookshelf {
    pub bookshelf_id: i64,
    pub name: String,
}

/// The seeded default bookshelf
pub const DEFAULT_BOOKSHELF_ID: i64 = 1;

/// Loan entity - one active loan per book
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Loan {
    pub book_id: i64,
    pub loaned_to: String,
    pub loan_date: DateTime<Utc>,
}

/// Table-of-contents entry (anthology support)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TocEntry {
    pub toc_entry_id: i64,
    pub author_id: i64,
    pub title: String,
}

// ============================================================================
// LINK TABLES
// ============================================================================

/// Book <-> Author link; position 1 is the primary author
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookAuthor {
    pub book_id: i64,
    pub author_id: i64,
    pub position: i32,
}

/// Book <-> Series link with the number-within-series string
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookSeries {
    pub book_id: i64,
    pub series_id: i64,
    pub series_num: String,
    pub position: i32,
}

// ============================================================================
// NEW RECORD STRUCTS (for inserts)
// ============================================================================

/// New book record for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub isbn: String,
    pub description: String,
    pub publisher: String,
    pub date_published: Option<NaiveDate>,
    pub format: String,
    pub genre: String,
    pub language: String,
    pub pages: i32,
    pub list_price: String,
    pub read: bool,
    pub read_start: Option<NaiveDate>,
    pub read_end: Option<NaiveDate>,
    pub rating: f32,
    pub notes: String,
    pub location: String,
    pub signed: bool,
    pub anthology: i32,
}

impl NewBook {
    pub fn new(title: String) -> Self {
        Self {
            title,
            isbn: String::new(),
            description: String::new(),
            publisher: String::new(),
            date_published: None,
            format: String::new(),
            genre: String::new(),
            language: String::new(),
            pages: 0,
            list_price: String::new(),
            read: false,
            read_start: None,
            read_end: None,
            rating: 0.0,
            notes: String::new(),
            location: String::new(),
            signed: false,
            anthology: 0,
        }
    }

    /// Compute the sort form of a title: leading articles move to the end,
    /// so "The Hobbit" sorts as "Hobbit, The".
    pub fn sort_title(&self) -> String {
        sort_title_of(&self.title)
    }
}

/// Compute a title's sort form by relocating a leading article
pub fn sort_title_of(title: &str) -> String {
    const ARTICLES: [&str; 5] = ["The ", "A ", "An ", "Der ", "Le "];
    for article in ARTICLES {
        // The boundary check keeps multibyte titles like "Añejo" from
        // being sliced mid-character when the byte prefix happens to match.
        if title.len() > article.len()
            && title.is_char_boundary(article.len())
            && title[..article.len()].eq_ignore_ascii_case(article)
        {
            return format!("{}, {}", &title[article.len()..], title[..article.len() - 1].trim());
        }
    }
    title.to_string()
}

/// New author record for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuthor {
    pub given_names: String,
    pub family_name: String,
}

impl NewAuthor {
    pub fn new(given_names: String, family_name: String) -> Self {
        Self {
            given_names,
            family_name,
        }
    }

    /// Parse a display-form name ("John Doe") or sort-form name
    /// ("Doe, John") into its parts.
    pub fn parse(name: &str) -> Self {
        if let Some((family, given)) = name.split_once(',') {
            return Self::new(given.trim().to_string(), family.trim().to_string());
        }
        match name.trim().rsplit_once(' ') {
            Some((given, family)) => Self::new(given.to_string(), family.to_string()),
            None => Self::new(String::new(), name.trim().to_string()),
        }
    }
}

/// New TOC entry record for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTocEntry {
    pub author_id: i64,
    pub title: String,
}
