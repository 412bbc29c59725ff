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


//! Background per-row field lookups
//!
//! Book rows render instantly from the flattened table; the secondary
//! fields (full author list, series memberships, shelves, loan details)
//! are fetched off the render path through a small worker pool.
//!
//! List views recycle row slots while scrolling, so every request carries
//! the slot's current book id; when a lookup finishes, the result is
//! delivered only if the slot still wants that book, otherwise it is
//! dropped silently.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{RwLock, Semaphore};

use crate::error::{Result, ShelfError};
use crate::storage::queries;

/// Concurrent extras lookups; keeps the pool from starving list reads
const MAX_CONCURRENT_FETCHES: usize = 4;

/// Secondary fields for one book row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookExtras {
    pub book_id: i64,
    pub authors: Vec<String>,
    /// Series names with number, e.g. "Earthsea #2"
    pub series: Vec<String>,
    pub bookshelves: Vec<String>,
    pub loaned_to: Option<String>,
    pub location: Option<String>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
}

/// Receives completed lookups; implemented by the platform bridge
pub trait ExtrasDelegate: Send + Sync {
    fn extras_ready(&self, slot: i64, extras: BookExtras);
}

/// Worker pool for extras lookups with slot identity checks
pub struct ExtrasFetcher {
    pool: SqlitePool,
    semaphore: Arc<Semaphore>,
    /// slot id -> book id that slot currently displays
    slots: Arc<RwLock<HashMap<i64, i64>>>,
}

impl ExtrasFetcher {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES)),
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Queue a lookup for a slot. Rebinds the slot to `book_id`, so an
    /// in-flight result for the slot's previous book is discarded on
    /// arrival.
    pub async fn request(&self, slot: i64, book_id: i64, delegate: Arc<dyn ExtrasDelegate>) {
        self.slots.write().await.insert(slot, book_id);

        let pool = self.pool.clone();
        let semaphore = self.semaphore.clone();
        let slots = self.slots.clone();
        tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return, // fetcher shut down
            };

            match fetch_extras(&pool, book_id).await {
                Ok(extras) => {
                    let current = slots.read().await.get(&slot).copied();
                    if current == Some(book_id) {
                        delegate.extras_ready(slot, extras);
                    } else {
                        debug!("Dropping stale extras for book {} (slot {})", book_id, slot);
                    }
                }
                Err(e) => {
                    warn!("Extras lookup failed for book {}: {}", book_id, e);
                }
            }
        });
    }

    /// Forget a recycled slot so late results are dropped
    pub async fn release_slot(&self, slot: i64) {
        self.slots.write().await.remove(&slot);
    }

    /// Forget all slots, e.g. when the list screen goes away
    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }
}

/// Synchronous variant for callers that want the fields inline
pub async fn fetch_extras(pool: &SqlitePool, book_id: i64) -> Result<BookExtras> {
    let book = queries::find_book_by_id(pool, book_id)
        .await?
        .ok_or_else(|| ShelfError::not_found(format!("book {}", book_id)))?;

    let authors = queries::find_authors_by_book(pool, book_id)
        .await?
        .into_iter()
        .map(|a| a.display_name())
        .collect();

    let series = queries::find_series_by_book(pool, book_id)
        .await?
        .into_iter()
        .map(|(series, link)| {
            if link.series_num.is_empty() {
                series.name
            } else {
                format!("{} #{}", series.name, link.series_num)
            }
        })
        .collect();

    let bookshelves = queries::find_shelves_by_book(pool, book_id)
        .await?
        .into_iter()
        .map(|shelf| shelf.name)
        .collect();

    let loaned_to = queries::find_loan(pool, book_id).await?.map(|l| l.loaned_to);

    // The schema stores these as NOT NULL with '' defaults; the display
    // layer wants absent, not blank.
    Ok(BookExtras {
        book_id,
        authors,
        series,
        bookshelves,
        loaned_to,
        location: non_empty(book.location),
        publisher: non_empty(book.publisher),
        isbn: non_empty(book.isbn),
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::storage::models::{NewAuthor, NewBook};
    use crate::storage::{queries, Database};

    struct Recorder {
        delivered: Mutex<Vec<(i64, i64)>>,
    }

    impl ExtrasDelegate for Recorder {
        fn extras_ready(&self, slot: i64, extras: BookExtras) {
            self.delivered
                .lock()
                .expect("Lock poisoned")
                .push((slot, extras.book_id));
        }
    }

    async fn seeded_pool() -> SqlitePool {
        let db = Database::new_in_memory()
            .await
            .expect("Failed to create test database");
        let pool = db.pool().clone();

        let author = queries::upsert_author(&pool, &NewAuthor::parse("Ursula Le Guin"))
            .await
            .expect("Failed to insert author");
        for title in ["First", "Second"] {
            let book = queries::insert_book(&pool, &NewBook::new(title.to_string()))
                .await
                .expect("Failed to insert book");
            queries::add_book_author(&pool, book, author, 1)
                .await
                .expect("Failed to link author");
        }
        let series = queries::upsert_series(&pool, "Earthsea")
            .await
            .expect("Failed to insert series");
        queries::add_book_to_series(&pool, 1, series, "2", 1)
            .await
            .expect("Failed to link series");
        queries::lend_book(&pool, 2, "Alice")
            .await
            .expect("Failed to lend book");
        pool
    }

    #[tokio::test]
    async fn test_fetch_extras_inline() {
        let pool = seeded_pool().await;
        let extras = fetch_extras(&pool, 1).await.expect("Failed to fetch extras");
        assert_eq!(extras.authors, vec!["Ursula Le Guin".to_string()]);
        assert_eq!(extras.series, vec!["Earthsea #2".to_string()]);
        assert!(extras.loaned_to.is_none());

        let extras = fetch_extras(&pool, 2).await.expect("Failed to fetch extras");
        assert_eq!(extras.loaned_to.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_blank_detail_fields_come_back_absent() {
        let pool = seeded_pool().await;

        let mut new_book = NewBook::new("Catalogued".to_string());
        new_book.isbn = "9780000000001".to_string();
        let book = queries::insert_book(&pool, &new_book)
            .await
            .expect("Failed to insert book");

        let extras = fetch_extras(&pool, book).await.expect("Failed to fetch extras");
        assert_eq!(extras.isbn.as_deref(), Some("9780000000001"));
        assert!(extras.location.is_none());
        assert!(extras.publisher.is_none());
    }

    #[tokio::test]
    async fn test_stale_slot_results_are_dropped() {
        let pool = seeded_pool().await;
        let fetcher = ExtrasFetcher::new(pool);
        let recorder = Arc::new(Recorder {
            delivered: Mutex::new(Vec::new()),
        });

        // slot 7 asks for book 1, then gets recycled to book 2 before
        // the first result can land
        fetcher.request(7, 1, recorder.clone()).await;
        fetcher.request(7, 2, recorder.clone()).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        let delivered = recorder.delivered.lock().expect("Lock poisoned").clone();
        assert!(delivered.iter().all(|(slot, book)| *slot == 7 && *book == 2));
        assert!(!delivered.is_empty());
    }

    #[tokio::test]
    async fn test_released_slot_gets_nothing() {
        let pool = seeded_pool().await;
        let fetcher = ExtrasFetcher::new(pool);
        let recorder = Arc::new(Recorder {
            delivered: Mutex::new(Vec::new()),
        });

        fetcher.request(3, 1, recorder.clone()).await;
        fetcher.release_slot(3).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(recorder.delivered.lock().expect("Lock poisoned").is_empty());
    }
}
