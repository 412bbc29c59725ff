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


//! Database query functions
//!
//! Repository functions over the catalogue tables. The booklist engine only
//! reads; everything that mutates the catalogue (and therefore invalidates
//! built lists) goes through here.
//!
//! Writers that change a book's searchable text call [`refresh_fts`]; the
//! FTS row needs author and series names, which take joins a SQLite trigger
//! can't express cleanly.

use crate::error::{Result, ShelfError};
use crate::storage::models::*;
use sqlx::SqlitePool;

// ============================================================================
// BOOK QUERIES
// ============================================================================

/// Insert a new book
///
/// Returns the book_id of the inserted book. The sort title is computed
/// here so every later ORDER BY can lean on the stored column.
pub async fn insert_book(pool: &SqlitePool, book: &NewBook) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO books (
            title, sort_title, isbn, description, publisher, date_published,
            format, genre, language, pages, list_price,
            read, read_start, read_end, rating,
            notes, location, signed, anthology
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&book.title)
    .bind(book.sort_title())
    .bind(&book.isbn)
    .bind(&book.description)
    .bind(&book.publisher)
    .bind(book.date_published)
    .bind(&book.format)
    .bind(&book.genre)
    .bind(&book.language)
    .bind(book.pages)
    .bind(&book.list_price)
    .bind(book.read)
    .bind(book.read_start)
    .bind(book.read_end)
    .bind(book.rating)
    .bind(&book.notes)
    .bind(&book.location)
    .bind(book.signed)
    .bind(book.anthology)
    .execute(pool)
    .await?;

    let book_id = result.last_insert_rowid();
    refresh_fts(pool, book_id).await?;

    Ok(book_id)
}

/// Find book by ID
pub async fn find_book_by_id(pool: &SqlitePool, book_id: i64) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE book_id = ?")
        .bind(book_id)
        .fetch_optional(pool)
        .await?;

    Ok(book)
}

/// Find book by ISBN
pub async fn find_book_by_isbn(pool: &SqlitePool, isbn: &str) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE isbn = ?")
        .bind(isbn)
        .fetch_optional(pool)
        .await?;

    Ok(book)
}

/// Update an existing book's editable fields
pub async fn update_book(pool: &SqlitePool, book: &Book) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE books SET
            title = ?, sort_title = ?, isbn = ?, description = ?, publisher = ?,
            date_published = ?, format = ?, genre = ?, language = ?, pages = ?,
            list_price = ?, read = ?, read_start = ?, read_end = ?, rating = ?,
            notes = ?, location = ?, signed = ?, anthology = ?
        WHERE book_id = ?
        "#,
    )
    .bind(&book.title)
    .bind(sort_title_of(&book.title))
    .bind(&book.isbn)
    .bind(&book.description)
    .bind(&book.publisher)
    .bind(book.date_published)
    .bind(&book.format)
    .bind(&book.genre)
    .bind(&book.language)
    .bind(book.pages)
    .bind(&book.list_price)
    .bind(book.read)
    .bind(book.read_start)
    .bind(book.read_end)
    .bind(book.rating)
    .bind(&book.notes)
    .bind(&book.location)
    .bind(book.signed)
    .bind(book.anthology)
    .bind(book.book_id)
    .execute(pool)
    .await?;

    refresh_fts(pool, book.book_id).await?;

    Ok(())
}

/// Flip a book's read flag, setting the finished date when turning it on
pub async fn set_book_read(pool: &SqlitePool, book_id: i64, read: bool) -> Result<()> {
    let affected = sqlx::query(
        r#"
        UPDATE books SET
            read = ?,
            read_end = CASE WHEN ? THEN date('now') ELSE read_end END
        WHERE book_id = ?
        "#,
    )
    .bind(read)
    .bind(read)
    .bind(book_id)
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(ShelfError::not_found(format!("book {}", book_id)));
    }

    Ok(())
}

/// Count total books
pub async fn count_books(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Delete a book (and all related data via CASCADE)
pub async fn delete_book(pool: &SqlitePool, book_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM books WHERE book_id = ?")
        .bind(book_id)
        .execute(pool)
        .await?;

    Ok(())
}

// ============================================================================
// AUTHOR QUERIES
// ============================================================================

/// Insert or find author by name
///
/// Returns the author_id (either existing or newly created)
pub async fn upsert_author(pool: &SqlitePool, author: &NewAuthor) -> Result<i64> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT author_id FROM authors WHERE family_name = ? AND given_names = ?",
    )
    .bind(&author.family_name)
    .bind(&author.given_names)
    .fetch_optional(pool)
    .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let result = sqlx::query("INSERT INTO authors (given_names, family_name) VALUES (?, ?)")
        .bind(&author.given_names)
        .bind(&author.family_name)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Find the authors of a book, primary author first
pub async fn find_authors_by_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<Author>> {
    let authors = sqlx::query_as::<_, Author>(
        r#"
        SELECT a.* FROM authors a
        INNER JOIN book_authors ba ON a.author_id = ba.author_id
        WHERE ba.book_id = ?
        ORDER BY ba.position
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(authors)
}

/// Link book to author at the given position (primary author = 1)
pub async fn add_book_author(
    pool: &SqlitePool,
    book_id: i64,
    author_id: i64,
    position: i32,
) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO book_authors (book_id, author_id, position) VALUES (?, ?, ?)",
    )
    .bind(book_id)
    .bind(author_id)
    .bind(position)
    .execute(pool)
    .await?;

    refresh_fts(pool, book_id).await?;

    Ok(())
}

// ============================================================================
// SERIES QUERIES
// ============================================================================

/// Insert or find series by name
pub async fn upsert_series(pool: &SqlitePool, name: &str) -> Result<i64> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT series_id FROM series WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let result = sqlx::query("INSERT INTO series (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Link book to series with its number within the series
pub async fn add_book_to_series(
    pool: &SqlitePool,
    book_id: i64,
    series_id: i64,
    series_num: &str,
    position: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO book_series (book_id, series_id, series_num, position)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(book_id)
    .bind(series_id)
    .bind(series_num)
    .bind(position)
    .execute(pool)
    .await?;

    refresh_fts(pool, book_id).await?;

    Ok(())
}

/// Find the series memberships of a book
pub async fn find_series_by_book(
    pool: &SqlitePool,
    book_id: i64,
) -> Result<Vec<(Series, BookSeries)>> {
    let rows = sqlx::query_as::<_, (i64, String, String, i32)>(
        r#"
        SELECT s.series_id, s.name, bs.series_num, bs.position
        FROM series s
        INNER JOIN book_series bs ON s.series_id = bs.series_id
        WHERE bs.book_id = ?
        ORDER BY bs.position
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(series_id, name, series_num, position)| {
            (
                Series { series_id, name },
                BookSeries {
                    book_id,
                    series_id,
                    series_num,
                    position,
                },
            )
        })
        .collect())
}

// ============================================================================
// BOOKSHELF QUERIES
// ============================================================================

/// Insert or find bookshelf by name
pub async fn upsert_bookshelf(pool: &SqlitePool, name: &str) -> Result<i64> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT bookshelf_id FROM bookshelves WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let result = sqlx::query("INSERT INTO bookshelves (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// List all bookshelves
pub async fn list_bookshelves(pool: &SqlitePool) -> Result<Vec<Bookshelf>> {
    let shelves = sqlx::query_as::<_, Bookshelf>("SELECT * FROM bookshelves ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(shelves)
}

/// Bookshelves a book sits on
pub async fn find_shelves_by_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<Bookshelf>> {
    let shelves = sqlx::query_as::<_, Bookshelf>(
        r#"
        SELECT bs.* FROM bookshelves bs
        JOIN book_bookshelves bbs ON bbs.bookshelf_id = bs.bookshelf_id
        WHERE bbs.book_id = ?
        ORDER BY bs.name
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(shelves)
}

/// Put a book on a bookshelf
pub async fn add_book_to_shelf(pool: &SqlitePool, book_id: i64, bookshelf_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO book_bookshelves (book_id, bookshelf_id) VALUES (?, ?)")
        .bind(book_id)
        .bind(bookshelf_id)
        .execute(pool)
        .await?;

    Ok(())
}

// ============================================================================
// LOAN QUERIES
// ============================================================================

/// Lend a book out; replaces any existing loan record
pub async fn lend_book(pool: &SqlitePool, book_id: i64, loaned_to: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO loans (book_id, loaned_to) VALUES (?, ?)")
        .bind(book_id)
        .bind(loaned_to)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record the return of a loaned book
pub async fn return_book(pool: &SqlitePool, book_id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM loans WHERE book_id = ?")
        .bind(book_id)
        .execute(pool)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(ShelfError::not_found(format!("loan for book {}", book_id)));
    }

    Ok(())
}

/// Find the active loan for a book
pub async fn find_loan(pool: &SqlitePool, book_id: i64) -> Result<Option<Loan>> {
    let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE book_id = ?")
        .bind(book_id)
        .fetch_optional(pool)
        .await?;

    Ok(loan)
}

// ============================================================================
// TOC QUERIES
// ============================================================================

/// Insert or find a TOC entry (an entry may be reprinted in several books)
pub async fn upsert_toc_entry(pool: &SqlitePool, entry: &NewTocEntry) -> Result<i64> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT toc_entry_id FROM toc_entries WHERE author_id = ? AND title = ?",
    )
    .bind(entry.author_id)
    .bind(&entry.title)
    .fetch_optional(pool)
    .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let result = sqlx::query("INSERT INTO toc_entries (author_id, title) VALUES (?, ?)")
        .bind(entry.author_id)
        .bind(&entry.title)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Attach a TOC entry to a book at the given position
pub async fn add_book_toc_entry(
    pool: &SqlitePool,
    book_id: i64,
    toc_entry_id: i64,
    position: i32,
) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO book_toc_entries (book_id, toc_entry_id, position) VALUES (?, ?, ?)",
    )
    .bind(book_id)
    .bind(toc_entry_id)
    .bind(position)
    .execute(pool)
    .await?;

    Ok(())
}

/// List a book's TOC entries in order
pub async fn find_toc_by_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<TocEntry>> {
    let entries = sqlx::query_as::<_, TocEntry>(
        r#"
        SELECT t.* FROM toc_entries t
        INNER JOIN book_toc_entries bt ON t.toc_entry_id = bt.toc_entry_id
        WHERE bt.book_id = ?
        ORDER BY bt.position
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

// ============================================================================
// FULL-TEXT SEARCH
// ============================================================================

/// Rebuild the FTS row for one book
///
/// Pulls the current title/notes/isbn plus the joined author and series
/// names into a single searchable document.
pub async fn refresh_fts(pool: &SqlitePool, book_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM books_fts WHERE docid = ?")
        .bind(book_id)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO books_fts (docid, title, authors, series, isbn, notes)
        SELECT
            b.book_id,
            b.title,
            COALESCE((
                SELECT GROUP_CONCAT(a.given_names || ' ' || a.family_name, '; ')
                FROM book_authors ba JOIN authors a ON ba.author_id = a.author_id
                WHERE ba.book_id = b.book_id
            ), ''),
            COALESCE((
                SELECT GROUP_CONCAT(s.name, '; ')
                FROM book_series bs JOIN series s ON bs.series_id = s.series_id
                WHERE bs.book_id = b.book_id
            ), ''),
            b.isbn,
            b.notes
        FROM books b WHERE b.book_id = ?
        "#,
    )
    .bind(book_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Free-text search returning matching book ids
pub async fn search_book_ids(pool: &SqlitePool, query: &str) -> Result<Vec<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT docid FROM books_fts WHERE books_fts MATCH ?")
        .bind(query)
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;

    #[tokio::test]
    async fn test_insert_and_find_book() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let mut new_book = NewBook::new("The Hobbit".to_string());
        new_book.isbn = "9780261103283".to_string();

        let book_id = insert_book(db.pool(), &new_book)
            .await
            .expect("Failed to insert book");
        assert!(book_id > 0);

        let found = find_book_by_isbn(db.pool(), "9780261103283")
            .await
            .expect("Failed to find book")
            .expect("Book missing");

        assert_eq!(found.title, "The Hobbit");
        assert_eq!(found.sort_title, "Hobbit, The");
    }

    #[tokio::test]
    async fn test_upsert_author() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let author = NewAuthor::parse("John Doe");
        let id1 = upsert_author(db.pool(), &author)
            .await
            .expect("Failed to upsert author");
        let id2 = upsert_author(db.pool(), &author)
            .await
            .expect("Failed to upsert author");

        assert_eq!(id1, id2, "Upserting the same author must return the same id");
    }

    #[tokio::test]
    async fn test_loan_round_trip() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let book_id = insert_book(db.pool(), &NewBook::new("Dune".to_string()))
            .await
            .expect("Failed to insert book");

        lend_book(db.pool(), book_id, "Alice").await.expect("Failed to lend");
        let loan = find_loan(db.pool(), book_id)
            .await
            .expect("Failed to query loan")
            .expect("Loan missing");
        assert_eq!(loan.loaned_to, "Alice");

        return_book(db.pool(), book_id).await.expect("Failed to return");
        assert!(find_loan(db.pool(), book_id)
            .await
            .expect("Failed to query loan")
            .is_none());

        // Returning twice is an error
        assert!(return_book(db.pool(), book_id).await.is_err());
    }

    #[tokio::test]
    async fn test_dirty_book_trigger() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let book_id = insert_book(db.pool(), &NewBook::new("Dune".to_string()))
            .await
            .expect("Failed to insert book");

        // Backdate last_modified so the trigger's refresh is observable
        sqlx::query("UPDATE books SET last_modified = '2000-01-01 00:00:00' WHERE book_id = ?")
            .bind(book_id)
            .execute(db.pool())
            .await
            .expect("Failed to backdate");

        lend_book(db.pool(), book_id, "Bob").await.expect("Failed to lend");

        let last_modified: String =
            sqlx::query_scalar("SELECT last_modified FROM books WHERE book_id = ?")
                .bind(book_id)
                .fetch_one(db.pool())
                .await
                .expect("Failed to read last_modified");

        assert_ne!(last_modified, "2000-01-01 00:00:00", "Loan did not touch the book");
    }

    #[tokio::test]
    async fn test_fts_search() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let book_id = insert_book(db.pool(), &NewBook::new("A Wizard of Earthsea".to_string()))
            .await
            .expect("Failed to insert book");
        let author_id = upsert_author(db.pool(), &NewAuthor::parse("Ursula K. Le Guin"))
            .await
            .expect("Failed to upsert author");
        add_book_author(db.pool(), book_id, author_id, 1)
            .await
            .expect("Failed to link author");

        let by_title = search_book_ids(db.pool(), "earthsea").await.expect("Search failed");
        assert_eq!(by_title, vec![book_id]);

        let by_author = search_book_ids(db.pool(), "guin").await.expect("Search failed");
        assert_eq!(by_author, vec![book_id]);

        let none = search_book_ids(db.pool(), "asimov").await.expect("Search failed");
        assert!(none.is_empty());
    }
}
