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


//! List-screen orchestration
//!
//! [`BookshelfController`] owns the current booklist for one screen: the
//! active style and filters, the materialized list, and the scroll state
//! to restore after a rebuild. Rebuilds run through a generation counter;
//! when a newer rebuild is requested while an older one is still
//! materializing, the older result is closed and discarded on arrival.
//! The previous list stays installed and readable until its replacement
//! is ready, so the screen never shows an empty flash.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::booklist::{BooklistBuilder, BooklistCursor, BuildSummary, Filters};
use crate::error::{Result, ShelfError};
use crate::style::Style;

// ===== PUBLIC TYPES =====

/// How much of the previous view a rebuild should preserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildKind {
    /// New style or filters: start at the top
    Full,
    /// Data changed underneath: keep the user where they were
    Partial,
}

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListState {
    Idle,
    Building,
    Ready,
}

/// Where the screen was: first visible row plus the pixel overshoot
/// of that row past the top edge
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScrollAnchor {
    pub first_visible_pos: i64,
    pub pixel_offset: i64,
}

/// Result of an installed rebuild
#[derive(Debug, Clone, Copy)]
pub struct RebuildOutcome {
    pub summary: BuildSummary,
    /// Visible position the screen should scroll to
    pub position: i64,
    pub pixel_offset: i64,
}

// ===== CONTROLLER =====

struct ControllerInner {
    style: Style,
    filters: Filters,
    state: ListState,
    list: Option<BooklistBuilder>,
    anchor: ScrollAnchor,
    /// Book to keep on screen across the next partial rebuild
    target_book: Option<i64>,
}

pub struct BookshelfController {
    pool: SqlitePool,
    inner: Arc<RwLock<ControllerInner>>,
    generation: Arc<AtomicI64>,
}

impl BookshelfController {
    pub fn new(pool: SqlitePool, style: Style) -> Self {
        Self {
            pool,
            inner: Arc::new(RwLock::new(ControllerInner {
                style,
                filters: Filters::default(),
                state: ListState::Idle,
                list: None,
                anchor: ScrollAnchor::default(),
                target_book: None,
            })),
            generation: Arc::new(AtomicI64::new(0)),
        }
    }

    pub async fn state(&self) -> ListState {
        self.inner.read().await.state
    }

    /// The pool this controller builds on; style lookups and catalogue
    /// queries for the same database should go through it
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn style(&self) -> Style {
        self.inner.read().await.style.clone()
    }

    /// Switch style; takes effect on the next rebuild
    pub async fn set_style(&self, style: Style) {
        let mut inner = self.inner.write().await;
        inner.style = style;
        inner.anchor = ScrollAnchor::default();
        inner.target_book = None;
    }

    pub async fn set_filters(&self, filters: Filters) {
        let mut inner = self.inner.write().await;
        inner.filters = filters;
        inner.anchor = ScrollAnchor::default();
    }

    /// Record where the screen is; called as the user scrolls away
    pub async fn save_scroll(&self, anchor: ScrollAnchor) {
        self.inner.write().await.anchor = anchor;
    }

    /// Keep this book on screen across the next partial rebuild,
    /// e.g. the book just edited
    pub async fn set_target_book(&self, book_id: Option<i64>) {
        self.inner.write().await.target_book = book_id;
    }

    /// Rebuild the list. Returns None when a newer rebuild superseded
    /// this one; the caller just waits for the newer result.
    pub async fn rebuild(&self, kind: RebuildKind) -> Result<Option<RebuildOutcome>> {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (style, filters) = {
            let mut inner = self.inner.write().await;
            inner.state = ListState::Building;
            (inner.style.clone(), inner.filters.clone())
        };

        let built = BooklistBuilder::build(self.pool.clone(), &style, &filters).await;
        let mut built = match built {
            Ok(built) => built,
            Err(e) => {
                let mut inner = self.inner.write().await;
                inner.state = if inner.list.is_some() {
                    ListState::Ready
                } else {
                    ListState::Idle
                };
                return Err(e);
            }
        };

        if self.generation.load(Ordering::SeqCst) != my_generation {
            debug!("Discarding superseded booklist build (generation {})", my_generation);
            built.close().await?;
            return Ok(None);
        }

        let summary = built.summary();
        let (position, pixel_offset) = match kind {
            RebuildKind::Full => (0, 0),
            RebuildKind::Partial => self.restore_position(&built).await?,
        };

        // install first, then retire the old list
        let old = {
            let mut inner = self.inner.write().await;
            if self.generation.load(Ordering::SeqCst) != my_generation {
                // lost the race at the last moment
                drop(inner);
                built.close().await?;
                return Ok(None);
            }
            let old = inner.list.take();
            inner.list = Some(built);
            inner.state = ListState::Ready;
            inner.anchor = ScrollAnchor {
                first_visible_pos: position,
                pixel_offset,
            };
            inner.target_book = None;
            old
        };
        if let Some(mut old) = old {
            old.close().await?;
        }

        info!(
            "Installed booklist generation {}: {} visible of {} rows",
            my_generation, summary.visible_count, summary.total_count
        );
        Ok(Some(RebuildOutcome {
            summary,
            position,
            pixel_offset,
        }))
    }

    /// Pick the visible position to restore after a partial rebuild:
    /// prefer the target book's row nearest the previous anchor, fall
    /// back to the clamped anchor position
    async fn restore_position(&self, built: &BooklistBuilder) -> Result<(i64, i64)> {
        let (anchor, target_book) = {
            let inner = self.inner.read().await;
            (inner.anchor, inner.target_book)
        };
        let visible_count = built.summary().visible_count;
        if visible_count == 0 {
            return Ok((0, 0));
        }

        if let Some(book_id) = target_book {
            let candidates = built.rows_for_book(book_id).await?;
            let nearest = candidates
                .iter()
                .filter_map(|info| info.visible_position)
                .min_by_key(|pos| (pos - anchor.first_visible_pos).abs());
            if let Some(pos) = nearest {
                return Ok((pos, 0));
            }
        }

        let clamped = anchor.first_visible_pos.min(visible_count - 1).max(0);
        if clamped == anchor.first_visible_pos {
            Ok((clamped, anchor.pixel_offset))
        } else {
            // clamping moved the row, the saved offset no longer applies
            Ok((clamped, 0))
        }
    }

    // ===== LIST OPERATIONS =====

    /// Read handle over the installed list
    pub async fn cursor(&self) -> Result<BooklistCursor> {
        let inner = self.inner.read().await;
        match &inner.list {
            Some(list) => Ok(list.cursor()),
            None => Err(ShelfError::invalid_state("No booklist has been built")),
        }
    }

    /// Toggle a header node; returns its new expanded state
    pub async fn toggle_node(&self, abs_pos: i64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.list.as_mut() {
            Some(list) => list.toggle_node(abs_pos).await,
            None => Err(ShelfError::invalid_state("No booklist has been built")),
        }
    }

    pub async fn expand_all(&self, expand: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.list.as_mut() {
            Some(list) => list.expand_all(expand).await,
            None => Err(ShelfError::invalid_state("No booklist has been built")),
        }
    }

    /// Drop the installed list. Only this controller's own table goes;
    /// other controllers and paging snapshots on the same pool keep theirs.
    /// Leftovers from sessions that never closed are swept by `purge_stale`
    /// at startup.
    pub async fn close(&self) -> Result<()> {
        let old = {
            let mut inner = self.inner.write().await;
            inner.state = ListState::Idle;
            inner.list.take()
        };
        if let Some(mut list) = old {
            list.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{NewAuthor, NewBook};
    use crate::storage::{queries, Database};
    use crate::style::GroupKind;

    async fn seeded_pool() -> SqlitePool {
        let db = Database::new_in_memory()
            .await
            .expect("Failed to create test database");
        let pool = db.pool().clone();

        let doe = queries::upsert_author(&pool, &NewAuthor::parse("Jane Doe"))
            .await
            .expect("Failed to insert author");
        let roe = queries::upsert_author(&pool, &NewAuthor::parse("Richard Roe"))
            .await
            .expect("Failed to insert author");
        for (title, author) in [("Alpha", doe), ("Beta", doe), ("Gamma", roe)] {
            let book = queries::insert_book(&pool, &NewBook::new(title.to_string()))
                .await
                .expect("Failed to insert book");
            queries::add_book_author(&pool, book, author, 1)
                .await
                .expect("Failed to link author");
        }
        pool
    }

    fn author_style() -> Style {
        Style::new("By Author", vec![GroupKind::Author])
    }

    #[tokio::test]
    async fn test_full_rebuild_starts_at_top() {
        let pool = seeded_pool().await;
        let controller = BookshelfController::new(pool, author_style());
        assert_eq!(controller.state().await, ListState::Idle);

        let outcome = controller
            .rebuild(RebuildKind::Full)
            .await
            .expect("Failed to rebuild")
            .expect("Build was superseded");
        assert_eq!(outcome.position, 0);
        assert_eq!(outcome.summary.visible_count, 5);
        assert_eq!(controller.state().await, ListState::Ready);

        controller.close().await.expect("Failed to close controller");
    }

    #[tokio::test]
    async fn test_partial_rebuild_clamps_anchor() {
        let pool = seeded_pool().await.clone();
        let controller = BookshelfController::new(pool.clone(), author_style());
        controller
            .rebuild(RebuildKind::Full)
            .await
            .expect("Failed to rebuild");

        // user was far down a list that is about to shrink
        controller
            .save_scroll(ScrollAnchor {
                first_visible_pos: 4,
                pixel_offset: 37,
            })
            .await;
        controller
            .set_filters(Filters {
                search: Some("Alpha".to_string()),
                ..Default::default()
            })
            .await;
        // set_filters resets the anchor; scroll again as the UI would
        controller
            .save_scroll(ScrollAnchor {
                first_visible_pos: 4,
                pixel_offset: 37,
            })
            .await;

        let outcome = controller
            .rebuild(RebuildKind::Partial)
            .await
            .expect("Failed to rebuild")
            .expect("Build was superseded");
        // header + one book remain; position clamped, offset dropped
        assert_eq!(outcome.summary.visible_count, 2);
        assert_eq!(outcome.position, 1);
        assert_eq!(outcome.pixel_offset, 0);

        controller.close().await.expect("Failed to close controller");
    }

    #[tokio::test]
    async fn test_partial_rebuild_follows_target_book() {
        let pool = seeded_pool().await;
        let controller = BookshelfController::new(pool.clone(), author_style());
        controller
            .rebuild(RebuildKind::Full)
            .await
            .expect("Failed to rebuild");

        // Gamma (book 3) sits at abs 4; its visible position is 4
        controller.set_target_book(Some(3)).await;
        let outcome = controller
            .rebuild(RebuildKind::Partial)
            .await
            .expect("Failed to rebuild")
            .expect("Build was superseded");
        assert_eq!(outcome.position, 4);

        controller.close().await.expect("Failed to close controller");
    }

    #[tokio::test]
    async fn test_superseded_build_is_discarded() {
        let pool = seeded_pool().await;
        let controller = BookshelfController::new(pool.clone(), author_style());

        let (first, second) = tokio::join!(
            controller.rebuild(RebuildKind::Full),
            controller.rebuild(RebuildKind::Full),
        );
        let first = first.expect("Failed to rebuild");
        let second = second.expect("Failed to rebuild").expect("Latest build must install");

        assert!(first.is_none());
        assert_eq!(second.summary.visible_count, 5);

        // exactly one live table: the installed one
        controller.close().await.expect("Failed to close controller");
        let leftovers: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE name LIKE 'booklist_tmp_%'",
        )
        .fetch_all(&pool)
        .await
        .expect("Failed to list tables");
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_style_refresh_rides_the_controller_pool() {
        let pool = seeded_pool().await;
        let builtin = crate::style::builtin_styles()
            .into_iter()
            .find(|s| s.groups == [GroupKind::Author, GroupKind::Series])
            .expect("Builtin author style missing");
        let controller = BookshelfController::new(pool, builtin);
        controller
            .rebuild(RebuildKind::Full)
            .await
            .expect("Failed to rebuild");
        controller
            .save_scroll(ScrollAnchor {
                first_visible_pos: 2,
                pixel_offset: 10,
            })
            .await;

        // the bridge resolves styles on the controller's own pool and
        // skips set_style when the uuid is unchanged, keeping the anchor
        let current = controller.style().await;
        let reloaded = crate::style::load_style(controller.pool(), &current.uuid)
            .await
            .expect("Failed to load style");
        assert_eq!(reloaded.uuid, current.uuid);

        let outcome = controller
            .rebuild(RebuildKind::Partial)
            .await
            .expect("Failed to rebuild")
            .expect("Build was superseded");
        assert_eq!(outcome.position, 2);
        assert_eq!(outcome.pixel_offset, 10);

        controller.close().await.expect("Failed to close controller");
    }

    #[tokio::test]
    async fn test_close_leaves_other_lists_alone() {
        let pool = seeded_pool().await;

        // An independent list with a paging snapshot, e.g. a detail screen
        let standalone =
            BooklistBuilder::build(pool.clone(), &author_style(), &Filters::default())
                .await
                .expect("Failed to build list");
        let flat = crate::booklist::FlattenedBooklist::snapshot(&standalone)
            .await
            .expect("Failed to snapshot");

        let controller = BookshelfController::new(pool.clone(), author_style());
        controller
            .rebuild(RebuildKind::Full)
            .await
            .expect("Failed to rebuild");
        controller.close().await.expect("Failed to close controller");

        // The unrelated list and its snapshot survive the close
        assert_eq!(flat.book_id_at(0).await.expect("Snapshot read failed"), Some(1));
        let cursor = standalone.cursor();
        assert_eq!(cursor.visible_count().await.expect("count failed"), 5);
    }

    #[tokio::test]
    async fn test_toggle_through_controller() {
        let pool = seeded_pool().await;
        let controller = BookshelfController::new(pool, author_style());
        controller
            .rebuild(RebuildKind::Full)
            .await
            .expect("Failed to rebuild");

        let expanded = controller.toggle_node(0).await.expect("Failed to toggle");
        assert!(!expanded);
        let cursor = controller.cursor().await.expect("Failed to get cursor");
        assert_eq!(cursor.visible_count().await.expect("count failed"), 3);

        controller.close().await.expect("Failed to close controller");
    }

    #[tokio::test]
    async fn test_operations_before_build_fail() {
        let pool = seeded_pool().await;
        let controller = BookshelfController::new(pool, author_style());
        assert!(controller.cursor().await.is_err());
        assert!(controller.toggle_node(0).await.is_err());
    }
}
