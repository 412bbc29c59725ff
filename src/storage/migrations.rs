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


//! Database migrations
//!
//! Schema creation and evolution for the catalogue database. Migrations run
//! at open time and are tracked in the `_migrations` table; sqlx's
//! compile-time migration system needs a build-time database connection, so
//! runtime SQL execution is used instead for mobile compatibility.
//!
//! The schema carries "dirty book" triggers: any change to a book's authors,
//! series, bookshelves, loans or TOC entries touches the owning book's
//! `last_modified` timestamp, so sync/backup layers can find changed books
//! without diffing link tables.

use crate::error::Result;
use sqlx::{Executor, SqlitePool};

/// Run all database migrations
///
/// Creates the schema and applies any pending migrations in order.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "initial_schema", create_initial_schema(pool)).await?;
    run_migration(pool, 2, "fts_index", create_fts_index(pool)).await?;

    Ok(())
}

/// Create migrations tracking table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Create initial database schema
async fn create_initial_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
-- ============================================================================
-- MAIN ENTITIES
-- ============================================================================

-- Books table: core catalogue record
CREATE TABLE IF NOT EXISTS books (
    book_id INTEGER PRIMARY KEY AUTOINCREMENT,

    title TEXT NOT NULL,
    -- Pre-computed sort form ("Hobbit, The"); group sort keys collate on this
    sort_title TEXT NOT NULL,
    isbn TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    publisher TEXT NOT NULL DEFAULT '',
    date_published TEXT,          -- ISO 8601 date (YYYY-MM-DD)
    format TEXT NOT NULL DEFAULT '',
    genre TEXT NOT NULL DEFAULT '',
    language TEXT NOT NULL DEFAULT '',
    pages INTEGER NOT NULL DEFAULT 0,
    list_price TEXT NOT NULL DEFAULT '',

    -- Reading state
    read INTEGER NOT NULL DEFAULT 0,
    read_start TEXT,              -- ISO 8601 date
    read_end TEXT,                -- ISO 8601 date
    rating REAL NOT NULL DEFAULT 0.0,

    -- User metadata
    notes TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '',
    signed INTEGER NOT NULL DEFAULT 0,
    anthology INTEGER NOT NULL DEFAULT 0,   -- bitmask: 1=is anthology, 2=multiple authors

    -- Timestamps; last_modified is kept fresh by the dirty-book triggers
    date_added TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    last_modified TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Authors table
CREATE TABLE IF NOT EXISTS authors (
    author_id INTEGER PRIMARY KEY AUTOINCREMENT,
    given_names TEXT NOT NULL DEFAULT '',
    family_name TEXT NOT NULL,
    UNIQUE(family_name, given_names)
);

-- Series table
CREATE TABLE IF NOT EXISTS series (
    series_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Bookshelves table
CREATE TABLE IF NOT EXISTS bookshelves (
    bookshelf_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Loans table: one active loan per book
CREATE TABLE IF NOT EXISTS loans (
    book_id INTEGER PRIMARY KEY,
    loaned_to TEXT NOT NULL,
    loan_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
);

-- Table-of-contents entries (anthology support); an entry may appear in
-- several books (collections reprint stories)
CREATE TABLE IF NOT EXISTS toc_entries (
    toc_entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    FOREIGN KEY (author_id) REFERENCES authors(author_id) ON DELETE CASCADE,
    UNIQUE(author_id, title)
);

-- ============================================================================
-- LINK TABLES
-- ============================================================================

CREATE TABLE IF NOT EXISTS book_authors (
    book_id INTEGER NOT NULL,
    author_id INTEGER NOT NULL,
    position INTEGER NOT NULL DEFAULT 1,   -- primary author = 1
    FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE,
    FOREIGN KEY (author_id) REFERENCES authors(author_id) ON DELETE CASCADE,
    PRIMARY KEY (book_id, author_id)
);

CREATE TABLE IF NOT EXISTS book_series (
    book_id INTEGER NOT NULL,
    series_id INTEGER NOT NULL,
    series_num TEXT NOT NULL DEFAULT '',   -- "1", "2.5", "Omnibus 1-3"
    position INTEGER NOT NULL DEFAULT 1,
    FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE,
    FOREIGN KEY (series_id) REFERENCES series(series_id) ON DELETE CASCADE,
    PRIMARY KEY (book_id, series_id)
);

CREATE TABLE IF NOT EXISTS book_bookshelves (
    book_id INTEGER NOT NULL,
    bookshelf_id INTEGER NOT NULL,
    FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE,
    FOREIGN KEY (bookshelf_id) REFERENCES bookshelves(bookshelf_id) ON DELETE CASCADE,
    PRIMARY KEY (book_id, bookshelf_id)
);

CREATE TABLE IF NOT EXISTS book_toc_entries (
    book_id INTEGER NOT NULL,
    toc_entry_id INTEGER NOT NULL,
    position INTEGER NOT NULL DEFAULT 1,
    FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE,
    FOREIGN KEY (toc_entry_id) REFERENCES toc_entries(toc_entry_id) ON DELETE CASCADE,
    PRIMARY KEY (book_id, toc_entry_id)
);

-- ============================================================================
-- BOOKLIST SUPPORT
-- ============================================================================

-- Style registry: user-defined list styles, persisted as JSON documents.
-- Builtin styles live in code and are not stored here.
CREATE TABLE IF NOT EXISTS styles (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    document TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0
);

-- Node expansion state: which tree branches are open, per style and
-- bookshelf. Only collapsed nodes are stored (expanded is the default),
-- keyed by the materialized ancestor path of the node.
CREATE TABLE IF NOT EXISTS booklist_node_state (
    style_uuid TEXT NOT NULL,
    bookshelf_id INTEGER NOT NULL DEFAULT 0,
    node_key TEXT NOT NULL,
    expanded INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (style_uuid, bookshelf_id, node_key)
);

-- ============================================================================
-- INDEXES
-- ============================================================================

CREATE INDEX IF NOT EXISTS idx_books_sort_title ON books(sort_title);
CREATE INDEX IF NOT EXISTS idx_books_read ON books(read);
CREATE INDEX IF NOT EXISTS idx_books_date_added ON books(date_added);
CREATE INDEX IF NOT EXISTS idx_books_last_modified ON books(last_modified);

CREATE INDEX IF NOT EXISTS idx_authors_family_name ON authors(family_name, given_names);

CREATE INDEX IF NOT EXISTS idx_book_authors_author ON book_authors(author_id);
CREATE INDEX IF NOT EXISTS idx_book_authors_book ON book_authors(book_id, position);
CREATE INDEX IF NOT EXISTS idx_book_series_series ON book_series(series_id);
CREATE INDEX IF NOT EXISTS idx_book_series_book ON book_series(book_id, position);
CREATE INDEX IF NOT EXISTS idx_book_bookshelves_shelf ON book_bookshelves(bookshelf_id);
CREATE INDEX IF NOT EXISTS idx_book_toc_entries_book ON book_toc_entries(book_id, position);

-- ============================================================================
-- DIRTY-BOOK TRIGGERS
-- ============================================================================

-- Direct edits to a book refresh its own last_modified
CREATE TRIGGER IF NOT EXISTS books_touch_on_update
AFTER UPDATE OF title, sort_title, isbn, description, publisher, date_published,
    format, genre, language, pages, list_price, read, read_start, read_end,
    rating, notes, location, signed, anthology
ON books
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = NEW.book_id;
END;

-- Link-table changes mark the owning book dirty
CREATE TRIGGER IF NOT EXISTS book_authors_touch_insert
AFTER INSERT ON book_authors
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = NEW.book_id;
END;

CREATE TRIGGER IF NOT EXISTS book_authors_touch_delete
AFTER DELETE ON book_authors
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = OLD.book_id;
END;

CREATE TRIGGER IF NOT EXISTS book_series_touch_insert
AFTER INSERT ON book_series
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = NEW.book_id;
END;

CREATE TRIGGER IF NOT EXISTS book_series_touch_delete
AFTER DELETE ON book_series
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = OLD.book_id;
END;

CREATE TRIGGER IF NOT EXISTS book_bookshelves_touch_insert
AFTER INSERT ON book_bookshelves
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = NEW.book_id;
END;

CREATE TRIGGER IF NOT EXISTS book_bookshelves_touch_delete
AFTER DELETE ON book_bookshelves
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = OLD.book_id;
END;

CREATE TRIGGER IF NOT EXISTS loans_touch_insert
AFTER INSERT ON loans
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = NEW.book_id;
END;

CREATE TRIGGER IF NOT EXISTS loans_touch_delete
AFTER DELETE ON loans
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = OLD.book_id;
END;

CREATE TRIGGER IF NOT EXISTS book_toc_entries_touch_insert
AFTER INSERT ON book_toc_entries
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = NEW.book_id;
END;

CREATE TRIGGER IF NOT EXISTS book_toc_entries_touch_delete
AFTER DELETE ON book_toc_entries
FOR EACH ROW
BEGIN
    UPDATE books SET last_modified = CURRENT_TIMESTAMP WHERE book_id = OLD.book_id;
END;

-- ============================================================================
-- SEED DATA
-- ============================================================================

INSERT OR IGNORE INTO bookshelves (bookshelf_id, name) VALUES (1, 'Default');
        "#,
    )
    .await?;

    Ok(())
}

/// Create the full-text search index
///
/// An FTS4 table over the searchable book fields. Rows are refreshed from
/// query-layer code (author/series text needs joins a trigger can't express
/// cleanly); the delete trigger keeps orphans out.
async fn create_fts_index(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
CREATE VIRTUAL TABLE IF NOT EXISTS books_fts USING fts4(
    title,
    authors,
    series,
    isbn,
    notes
);

CREATE TRIGGER IF NOT EXISTS books_fts_delete
AFTER DELETE ON books
FOR EACH ROW
BEGIN
    DELETE FROM books_fts WHERE docid = OLD.book_id;
END;
        "#,
    )
    .await?;

    Ok(())
}
