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


//! Booklist styles
//!
//! A [`Style`] is an ordered sequence of grouping levels plus display
//! options; it is the user's answer to "how should my library be laid
//! out". The booklist builder turns a style into the flattened row table.
//!
//! Styles are identified by a stable UUID. Builtin styles additionally
//! carry small fixed negative ids and live in code; user styles are
//! persisted as JSON documents in the `styles` table. The builder never
//! mutates a style: editing happens only through explicit save/delete
//! calls here.

use crate::error::{Result, ShelfError};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

/// One grouping dimension of a style
///
/// The order of variants here is also the row-kind numbering used in the
/// flattened table (offset by the reserved Book kind 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
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

impl GroupKind {
    /// All kinds, for style editors to enumerate
    pub const ALL: [GroupKind; 16] = [
        GroupKind::Author,
        GroupKind::Series,
        GroupKind::Bookshelf,
        GroupKind::Loaned,
        GroupKind::ReadStatus,
        GroupKind::Rating,
        GroupKind::Publisher,
        GroupKind::Language,
        GroupKind::Format,
        GroupKind::Genre,
        GroupKind::TitleLetter,
        GroupKind::PublicationYear,
        GroupKind::PublicationMonth,
        GroupKind::AddedYear,
        GroupKind::AddedMonth,
        GroupKind::AddedDay,
    ];

    /// Human-readable name for style editors and logs
    pub fn label(&self) -> &'static str {
        match self {
            GroupKind::Author => "Author",
            GroupKind::Series => "Series",
            GroupKind::Bookshelf => "Bookshelf",
            GroupKind::Loaned => "Loaned",
            GroupKind::ReadStatus => "Read & Unread",
            GroupKind::Rating => "Rating",
            GroupKind::Publisher => "Publisher",
            GroupKind::Language => "Language",
            GroupKind::Format => "Format",
            GroupKind::Genre => "Genre",
            GroupKind::TitleLetter => "First Letter of Title",
            GroupKind::PublicationYear => "Year Published",
            GroupKind::PublicationMonth => "Month Published",
            GroupKind::AddedYear => "Year Added",
            GroupKind::AddedMonth => "Month Added",
            GroupKind::AddedDay => "Day Added",
        }
    }

    /// Short stable tag used inside node keys ("a=12/s=3")
    pub fn key_tag(&self) -> &'static str {
        match self {
            GroupKind::Author => "a",
            GroupKind::Series => "s",
            GroupKind::Bookshelf => "shelf",
            GroupKind::Loaned => "loan",
            GroupKind::ReadStatus => "read",
            GroupKind::Rating => "rt",
            GroupKind::Publisher => "pub",
            GroupKind::Language => "lang",
            GroupKind::Format => "fmt",
            GroupKind::Genre => "gnr",
            GroupKind::TitleLetter => "tl",
            GroupKind::PublicationYear => "yp",
            GroupKind::PublicationMonth => "mp",
            GroupKind::AddedYear => "ya",
            GroupKind::AddedMonth => "ma",
            GroupKind::AddedDay => "da",
        }
    }
}

/// Thumbnail scaling for book rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThumbnailScale {
    Small,
    #[default]
    Standard,
    Large,
}

/// Secondary sort for the book rows inside the innermost group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BookSort {
    #[default]
    Title,
    DateAdded,
}

/// Extras shown on book rows; fetched lazily per row
pub mod extras {
    pub const BOOKSHELVES: u32 = 1;
    pub const LOCATION: u32 = 2;
    pub const PUBLISHER: u32 = 4;
    pub const FORMAT: u32 = 8;
    pub const AUTHOR: u32 = 16;
    pub const ALL: u32 = 31;
}

/// Per-style display options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleOptions {
    /// Bit per level: show the header text for that level
    pub show_headers: u32,
    /// Extra book fields to show on book rows (see [`extras`])
    pub extras: u32,
    pub thumbnail_scale: ThumbnailScale,
    pub book_sort: BookSort,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            show_headers: u32::MAX,
            extras: 0,
            thumbnail_scale: ThumbnailScale::Standard,
            book_sort: BookSort::Title,
        }
    }
}

/// A booklist style: ordered grouping levels plus display options
///
/// An implicit terminal Book level follows `groups`; a style with no
/// groups is a plain flat list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    /// Small fixed negative id for builtins, 0 for unsaved, rowid for saved
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub groups: Vec<GroupKind>,
    pub options: StyleOptions,
}

impl Style {
    /// Create a new user style
    pub fn new<S: Into<String>>(name: S, groups: Vec<GroupKind>) -> Self {
        Self {
            id: 0,
            uuid: Uuid::new_v4(),
            name: name.into(),
            groups,
            options: StyleOptions::default(),
        }
    }

    fn builtin(id: i64, uuid: &str, name: &str, groups: Vec<GroupKind>) -> Self {
        Self {
            id,
            // Builtin UUIDs are compile-time constants
            uuid: Uuid::parse_str(uuid).expect("builtin style uuid"),
            name: name.to_string(),
            groups,
            options: StyleOptions::default(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.id < 0
    }

    /// Number of tree levels a list built from this style has: one per
    /// group, plus the terminal book level.
    pub fn level_count(&self) -> usize {
        self.groups.len() + 1
    }
}

// ============================================================================
// BUILTIN STYLES
// ============================================================================

/// The builtin styles shipped with the app, in menu order
pub fn builtin_styles() -> Vec<Style> {
    vec![
        Style::builtin(
            -1,
            "0113fba1-6986-4b32-b05f-a4a70bd91c01",
            "Authors, then Series",
            vec![GroupKind::Author, GroupKind::Series],
        ),
        Style::builtin(
            -2,
            "0113fba1-6986-4b32-b05f-a4a70bd91c02",
            "Unread by Author",
            vec![GroupKind::ReadStatus, GroupKind::Author],
        ),
        Style::builtin(
            -3,
            "0113fba1-6986-4b32-b05f-a4a70bd91c03",
            "Books by Title",
            vec![GroupKind::TitleLetter],
        ),
        Style::builtin(
            -4,
            "0113fba1-6986-4b32-b05f-a4a70bd91c04",
            "Series",
            vec![GroupKind::Series],
        ),
        Style::builtin(
            -5,
            "0113fba1-6986-4b32-b05f-a4a70bd91c05",
            "Read & Unread",
            vec![GroupKind::ReadStatus],
        ),
        Style::builtin(
            -6,
            "0113fba1-6986-4b32-b05f-a4a70bd91c06",
            "Loaned Books",
            vec![GroupKind::Loaned],
        ),
        Style::builtin(
            -7,
            "0113fba1-6986-4b32-b05f-a4a70bd91c07",
            "Publication Date",
            vec![GroupKind::PublicationYear, GroupKind::PublicationMonth],
        ),
    ]
}

// ============================================================================
// STYLE REGISTRY (persistence)
// ============================================================================

/// Save a user style (insert or replace by UUID)
pub async fn save_style(pool: &SqlitePool, style: &Style) -> Result<()> {
    if style.is_builtin() {
        return Err(ShelfError::InvalidInput(
            "Builtin styles cannot be saved".to_string(),
        ));
    }

    let document = serde_json::to_string(style)?;
    sqlx::query("INSERT OR REPLACE INTO styles (uuid, name, document) VALUES (?, ?, ?)")
        .bind(style.uuid.to_string())
        .bind(&style.name)
        .bind(document)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete a user style and its remembered node state
pub async fn delete_style(pool: &SqlitePool, uuid: &Uuid) -> Result<()> {
    sqlx::query("DELETE FROM styles WHERE uuid = ?")
        .bind(uuid.to_string())
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM booklist_node_state WHERE style_uuid = ?")
        .bind(uuid.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Load one style by UUID, looking through builtins first
pub async fn load_style(pool: &SqlitePool, uuid: &Uuid) -> Result<Style> {
    if let Some(builtin) = builtin_styles().into_iter().find(|s| &s.uuid == uuid) {
        return Ok(builtin);
    }

    let document: Option<String> = sqlx::query_scalar("SELECT document FROM styles WHERE uuid = ?")
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await?;

    match document {
        Some(doc) => serde_json::from_str(&doc)
            .map_err(|e| ShelfError::InvalidStyleDocument(e.to_string())),
        None => Err(ShelfError::StyleNotFound(uuid.to_string())),
    }
}

/// List all styles: builtins first, then saved user styles
pub async fn list_styles(pool: &SqlitePool) -> Result<Vec<Style>> {
    let mut styles = builtin_styles();

    let documents: Vec<String> =
        sqlx::query_scalar("SELECT document FROM styles ORDER BY position, name")
            .fetch_all(pool)
            .await?;

    for doc in documents {
        let style: Style = serde_json::from_str(&doc)
            .map_err(|e| ShelfError::InvalidStyleDocument(e.to_string()))?;
        styles.push(style);
    }

    Ok(styles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_builtin_identity() {
        let styles = builtin_styles();
        assert!(!styles.is_empty());

        for style in &styles {
            assert!(style.is_builtin(), "builtin id must be negative");
        }

        // Ids and UUIDs are unique
        let mut ids: Vec<i64> = styles.iter().map(|s| s.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), styles.len());
    }

    #[test]
    fn test_level_count() {
        let style = Style::new("test", vec![GroupKind::Author, GroupKind::Series]);
        assert_eq!(style.level_count(), 3);

        let flat = Style::new("flat", vec![]);
        assert_eq!(flat.level_count(), 1);
    }

    #[test]
    fn test_style_document_round_trip() {
        let style = Style::new("mine", vec![GroupKind::ReadStatus, GroupKind::Author]);
        let doc = serde_json::to_string(&style).expect("Failed to serialize");
        let back: Style = serde_json::from_str(&doc).expect("Failed to deserialize");

        assert_eq!(back.uuid, style.uuid);
        assert_eq!(back.groups, style.groups);
    }

    #[tokio::test]
    async fn test_registry_round_trip() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let style = Style::new("mine", vec![GroupKind::Series]);
        save_style(db.pool(), &style).await.expect("Failed to save style");

        let loaded = load_style(db.pool(), &style.uuid)
            .await
            .expect("Failed to load style");
        assert_eq!(loaded.name, "mine");

        let all = list_styles(db.pool()).await.expect("Failed to list styles");
        assert!(all.iter().any(|s| s.uuid == style.uuid));

        delete_style(db.pool(), &style.uuid)
            .await
            .expect("Failed to delete style");
        assert!(matches!(
            load_style(db.pool(), &style.uuid).await,
            Err(ShelfError::StyleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_builtin_styles_cannot_be_saved() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let builtin = builtin_styles().remove(0);
        assert!(save_style(db.pool(), &builtin).await.is_err());
    }
}
