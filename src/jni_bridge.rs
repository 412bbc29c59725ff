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


//! JNI bridge for Android - Exposes the booklist core to the Kotlin layer
//!
//! # Design Patterns
//! 1. **JSON Communication**: All complex data is serialized to JSON for FFI crossing
//! 2. **Error Handling**: All errors are caught and returned as JSON error responses
//! 3. **Async Runtime**: Tokio runtime is used to execute async Rust functions
//! 4. **No Panics**: All panics are caught to prevent crashes across FFI boundary
//!
//! # Response Format
//! All functions return JSON strings with this structure:
//! ```json
//! {
//!   "success": true,
//!   "data": { ... }
//! }
//! ```
//! Or on error:
//! ```json
//! {
//!   "success": false,
//!   "error": "Error message"
//! }
//! ```

use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::booklist::Filters;
use crate::shelf::{BookshelfController, RebuildKind, ScrollAnchor};
use crate::style;

// Lazy static tokio runtime for async operations
lazy_static::lazy_static! {
    static ref RUNTIME: tokio::runtime::Runtime =
        tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    // Global controller cache (db_path -> controller instance)
    static ref CONTROLLERS: Mutex<HashMap<String, Arc<BookshelfController>>> =
        Mutex::new(HashMap::new());
}

/// Get or create the controller for the given database path
async fn get_or_create_controller(
    db_path: &str,
    style_uuid: &str,
) -> crate::Result<Arc<BookshelfController>> {
    {
        let controllers = CONTROLLERS.lock().map_err(lock_error)?;
        if let Some(controller) = controllers.get(db_path) {
            return Ok(Arc::clone(controller));
        }
    }

    let db = crate::storage::Database::new(db_path).await?;
    crate::booklist::builder::purge_stale(db.pool()).await?;

    let uuid = uuid::Uuid::parse_str(style_uuid)?;
    let style = style::load_style(db.pool(), &uuid).await?;
    let controller = Arc::new(BookshelfController::new(db.pool().clone(), style));

    let mut controllers = CONTROLLERS.lock().map_err(lock_error)?;
    Ok(Arc::clone(
        controllers
            .entry(db_path.to_string())
            .or_insert(controller),
    ))
}

fn lock_error<T>(_: std::sync::PoisonError<T>) -> crate::ShelfError {
    crate::ShelfError::internal("Controller cache lock poisoned")
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert JString to Rust String
fn jstring_to_string(env: &mut JNIEnv, jstr: JString) -> crate::Result<String> {
    env.get_string(&jstr)
        .map(|s| s.into())
        .map_err(|e| {
            crate::ShelfError::InvalidInput(format!("JNI string conversion failed: {}", e))
        })
}

/// Convert Rust result to JSON response string
fn result_to_json<T: Serialize>(result: crate::Result<T>) -> String {
    match result {
        Ok(data) => serde_json::json!({
            "success": true,
            "data": data
        })
        .to_string(),
        Err(e) => serde_json::json!({
            "success": false,
            "error": e.user_message()
        })
        .to_string(),
    }
}

/// Create error response JSON
fn error_response(error: &str) -> String {
    serde_json::json!({
        "success": false,
        "error": error
    })
    .to_string()
}

/// Wrap a function call with panic catching
fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };
            error_response(&format!("Rust panic: {}", panic_msg))
        }
    }
}

fn to_jstring(env: &mut JNIEnv, response: String) -> jstring {
    match env.new_string(response) {
        Ok(output) => output.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

// ============================================================================
// BOOKLIST FUNCTIONS
// ============================================================================

/// Build (or rebuild) the booklist for a database
///
/// # Arguments (JSON string)
/// ```json
/// {
///   "db_path": "/data/data/org.openshelf/databases/library.db",
///   "style_uuid": "0113fba1-...",
///   "bookshelf_id": 1,
///   "search": "tolkien",
///   "full": true
/// }
/// ```
///
/// # Returns (JSON)
/// ```json
/// {
///   "success": true,
///   "data": {
///     "total_count": 120,
///     "visible_count": 42,
///     "level_count": 3,
///     "position": 0,
///     "pixel_offset": 0
///   }
/// }
/// ```
#[no_mangle]
pub extern "C" fn Java_org_openshelf_core_OpenShelfBridge_nativeBuildBooklist(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = match jstring_to_string(&mut env, params_json) {
        Ok(s) => s,
        Err(e) => return to_jstring(&mut env, error_response(&e.to_string())),
    };

    let response = catch_panic(move || {
        #[derive(Deserialize)]
        struct Params {
            db_path: String,
            style_uuid: String,
            bookshelf_id: Option<i64>,
            search: Option<String>,
            full: bool,
        }
        #[derive(Serialize)]
        struct BuildResult {
            total_count: i64,
            visible_count: i64,
            level_count: i64,
            position: i64,
            pixel_offset: i64,
            superseded: bool,
        }

        let result: crate::Result<BuildResult> = RUNTIME.block_on(async {
            let params: Params = serde_json::from_str(&params_str)?;
            let controller =
                get_or_create_controller(&params.db_path, &params.style_uuid).await?;

            // Style changes ride the cached controller's pool; a fresh
            // Database here would leak a pool per rebuild. Re-applying an
            // unchanged style would also reset the scroll anchor.
            let uuid = uuid::Uuid::parse_str(&params.style_uuid)?;
            if controller.style().await.uuid != uuid {
                let style = style::load_style(controller.pool(), &uuid).await?;
                controller.set_style(style).await;
            }
            controller
                .set_filters(Filters {
                    bookshelf_id: params.bookshelf_id,
                    search: params.search,
                    ..Default::default()
                })
                .await;

            let kind = if params.full {
                RebuildKind::Full
            } else {
                RebuildKind::Partial
            };
            match controller.rebuild(kind).await? {
                Some(outcome) => Ok(BuildResult {
                    total_count: outcome.summary.total_count,
                    visible_count: outcome.summary.visible_count,
                    level_count: outcome.summary.level_count,
                    position: outcome.position,
                    pixel_offset: outcome.pixel_offset,
                    superseded: false,
                }),
                None => Ok(BuildResult {
                    total_count: 0,
                    visible_count: 0,
                    level_count: 0,
                    position: 0,
                    pixel_offset: 0,
                    superseded: true,
                }),
            }
        });

        result_to_json(result)
    });

    to_jstring(&mut env, response)
}

/// Fetch a window of visible rows for the list adapter
#[no_mangle]
pub extern "C" fn Java_org_openshelf_core_OpenShelfBridge_nativeGetWindow(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = match jstring_to_string(&mut env, params_json) {
        Ok(s) => s,
        Err(e) => return to_jstring(&mut env, error_response(&e.to_string())),
    };

    let response = catch_panic(move || {
        #[derive(Deserialize)]
        struct Params {
            db_path: String,
            first: i64,
            count: i64,
        }

        let result = RUNTIME.block_on(async {
            let params: Params = serde_json::from_str(&params_str)?;
            let controller = cached_controller(&params.db_path)?;
            let cursor = controller.cursor().await?;
            cursor.window(params.first, params.count).await
        });

        result_to_json(result)
    });

    to_jstring(&mut env, response)
}

/// Toggle a group header between expanded and collapsed
#[no_mangle]
pub extern "C" fn Java_org_openshelf_core_OpenShelfBridge_nativeToggleNode(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = match jstring_to_string(&mut env, params_json) {
        Ok(s) => s,
        Err(e) => return to_jstring(&mut env, error_response(&e.to_string())),
    };

    let response = catch_panic(move || {
        #[derive(Deserialize)]
        struct Params {
            db_path: String,
            abs_pos: i64,
        }
        #[derive(Serialize)]
        struct ToggleResult {
            expanded: bool,
            visible_count: i64,
        }

        let result = RUNTIME.block_on(async {
            let params: Params = serde_json::from_str(&params_str)?;
            let controller = cached_controller(&params.db_path)?;
            let expanded = controller.toggle_node(params.abs_pos).await?;
            let visible_count = controller.cursor().await?.visible_count().await?;
            Ok(ToggleResult {
                expanded,
                visible_count,
            })
        });

        result_to_json(result)
    });

    to_jstring(&mut env, response)
}

/// Record the screen's scroll anchor for position restore
#[no_mangle]
pub extern "C" fn Java_org_openshelf_core_OpenShelfBridge_nativeSaveScroll(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    let params_str = match jstring_to_string(&mut env, params_json) {
        Ok(s) => s,
        Err(e) => return to_jstring(&mut env, error_response(&e.to_string())),
    };

    let response = catch_panic(move || {
        #[derive(Deserialize)]
        struct Params {
            db_path: String,
            first_visible_pos: i64,
            pixel_offset: i64,
        }

        let result = RUNTIME.block_on(async {
            let params: Params = serde_json::from_str(&params_str)?;
            let controller = cached_controller(&params.db_path)?;
            controller
                .save_scroll(ScrollAnchor {
                    first_visible_pos: params.first_visible_pos,
                    pixel_offset: params.pixel_offset,
                })
                .await;
            Ok(true)
        });

        result_to_json(result)
    });

    to_jstring(&mut env, response)
}

/// List all styles, built-in and user-defined
#[no_mangle]
pub extern "C" fn Java_org_openshelf_core_OpenShelfBridge_nativeListStyles(
    mut env: JNIEnv,
    _class: JClass,
    db_path: JString,
) -> jstring {
    let db_path = match jstring_to_string(&mut env, db_path) {
        Ok(s) => s,
        Err(e) => return to_jstring(&mut env, error_response(&e.to_string())),
    };

    let response = catch_panic(move || {
        let result = RUNTIME.block_on(async {
            // reuse the cached controller's pool when one exists
            if let Ok(controller) = cached_controller(&db_path) {
                return style::list_styles(controller.pool()).await;
            }
            let db = crate::storage::Database::new(&db_path).await?;
            let styles = style::list_styles(db.pool()).await;
            db.close().await?;
            styles
        });

        result_to_json(result)
    });

    to_jstring(&mut env, response)
}

fn cached_controller(db_path: &str) -> crate::Result<Arc<BookshelfController>> {
    let controllers = CONTROLLERS.lock().map_err(lock_error)?;
    controllers
        .get(db_path)
        .cloned()
        .ok_or_else(|| crate::ShelfError::invalid_state("No booklist built for this database"))
}
