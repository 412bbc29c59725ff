uniffi::setup_scaffolding!();

// JNI bridge for Android
#[cfg(target_os = "android")]
mod jni_bridge;

pub mod booklist;
pub mod error;
pub mod shelf;
pub mod storage;
pub mod style;

pub use error::{Result, ShelfError};
pub use storage::Database;

#[uniffi::export]
pub fn core_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
