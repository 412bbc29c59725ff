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


//! Error types for OpenShelf Core
//!
//! Errors are defined with thiserror and grouped by domain (style
//! configuration, booklist construction, storage, general API misuse).
//! The important split for callers is fatal configuration defects versus
//! transient build failures:
//!
//! - A [`ShelfError::StyleConfig`] means a style references a grouping
//!   dimension or column that does not exist in the schema. That is a
//!   programming or data-migration defect; it is never retried.
//! - A failed list build (`BuildFailed` or a wrapped sqlx error) is logged
//!   and the caller keeps showing its previous cursor. It is not retried
//!   automatically either, but the app stays usable.
//! - Stale results from superseded rebuilds and recycled extras rows are
//!   not errors at all; they are silently discarded at delivery time.

use thiserror::Error;

/// Result type alias using our ShelfError type
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Main error type for OpenShelf Core
#[derive(Error, Debug)]
pub enum ShelfError {
    // ===== Style / Configuration Errors =====

    /// A style references a grouping dimension or column the schema does
    /// not have. Fatal: indicates a defect, not a runtime condition.
    #[error("Style configuration error: {message}")]
    StyleConfig {
        message: String,
        /// UUID of the offending style if known
        style_uuid: Option<String>,
    },

    /// A style document could not be parsed from its persisted JSON form
    #[error("Invalid style document: {0}")]
    InvalidStyleDocument(String),

    /// Requested style does not exist in the registry
    #[error("Style not found: {0}")]
    StyleNotFound(String),

    // ===== Booklist Errors =====

    /// List build failed; the previous cursor should stay on screen
    #[error("Booklist build failed: {0}")]
    BuildFailed(String),

    /// A cursor or builder was used after `close()`
    #[error("Booklist is closed")]
    BooklistClosed,

    /// A row position outside the current projection was requested
    #[error("Row position out of range: {position} (visible rows: {visible_count})")]
    PositionOutOfRange {
        position: i64,
        visible_count: i64,
    },

    /// The row at the given absolute position is not a group header
    #[error("Row at absolute position {0} is not an expandable node")]
    NotAGroupNode(i64),

    // ===== Storage Errors =====

    /// Generic database error
    #[error("Database error: {0}")]
    Database(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// File I/O problem around the database file itself
    #[error("File I/O error: {0}")]
    FileIo(String),

    // ===== General Errors =====

    /// Input validation failure
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// API used in a state it does not support
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    Internal(String),

    // ===== External Library Errors =====

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShelfError {
    /// Create a StyleConfig error for an unknown grouping column
    pub fn style_config<S: Into<String>>(message: S, style_uuid: Option<String>) -> Self {
        ShelfError::StyleConfig {
            message: message.into(),
            style_uuid,
        }
    }

    /// Create a RecordNotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        ShelfError::RecordNotFound(resource.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        ShelfError::InvalidInput(message.into())
    }

    /// Create an InvalidState error with a message
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        ShelfError::InvalidState(message.into())
    }

    /// Create an Internal error with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        ShelfError::Internal(message.into())
    }

    /// Check if this error indicates a configuration defect
    ///
    /// Fatal errors are surfaced loudly (crash/log) and never retried,
    /// since they mean a style references schema that does not exist.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShelfError::StyleConfig { .. } | ShelfError::InvalidStyleDocument(_)
        )
    }

    /// Check if this error came out of a list build
    ///
    /// Build failures are recoverable at the UI level: the previous cursor
    /// stays installed and the user keeps a working list.
    pub fn is_build_error(&self) -> bool {
        matches!(self, ShelfError::BuildFailed(_))
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            ShelfError::BuildFailed(_) => {
                "The book list could not be rebuilt. The previous list is still shown.".to_string()
            }
            ShelfError::StyleNotFound(name) => {
                format!("The list style '{}' no longer exists. Pick another style.", name)
            }
            ShelfError::MigrationFailed(_) => {
                "The library database could not be upgraded. Restore from a backup if this persists."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for ShelfError {
    fn from(err: std::num::ParseIntError) -> Self {
        ShelfError::InvalidInput(format!("Failed to parse integer: {}", err))
    }
}

impl From<uuid::Error> for ShelfError {
    fn from(err: uuid::Error) -> Self {
        ShelfError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let err = ShelfError::style_config("no such column: genre", None);
        assert!(err.is_fatal());
        assert!(!err.is_build_error());

        let err = ShelfError::BuildFailed("disk full".to_string());
        assert!(!err.is_fatal());
        assert!(err.is_build_error());
    }

    #[test]
    fn test_user_message_for_build_failure() {
        let err = ShelfError::BuildFailed("SQL logic error".to_string());
        assert!(err.user_message().contains("previous list"));
    }
}
