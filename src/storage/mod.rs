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


//! Database storage and models
//!
//! All catalogue persistence lives here: the pooled SQLite connection,
//! runtime migrations, entity models and the repository query functions.
//! The booklist engine consumes this module read-only.
//!
//! # Database Schema
//! - books: core catalogue record (title, ISBN, reading state, ...)
//! - authors / series / bookshelves / loans / toc_entries
//! - link tables: book_authors, book_series, book_bookshelves, book_toc_entries
//! - books_fts: full-text index over the searchable book fields
//! - styles / booklist_node_state: booklist engine support tables
//!
//! # Usage Example
//! ```no_run
//! use openshelf_core::storage::{queries, models::NewBook, Database};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./library.db").await?;
//!
//! let book_id = queries::insert_book(db.pool(), &NewBook::new("The Hobbit".into())).await?;
//! let book = queries::find_book_by_id(db.pool(), book_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

// Re-export commonly used types
pub use database::Database;
pub use models::{
    Author, Book, BookAuthor, BookSeries, Bookshelf, Loan, NewAuthor, NewBook, NewTocEntry,
    Series, TocEntry, DEFAULT_BOOKSHELF_ID,
};
