//! Lumen State - Persistence for the mesh-to-MQTT bridge
//!
//! This crate provides the key-value storage backends used by the bridge
//! to persist the lamp registry and the mesh session state.
//!
//! ## Components
//!
//! - **storage**: the [`Storage`] trait plus the in-memory and SQLite backends
//! - **error**: storage-specific error types
//!
//! ## Example
//!
//! ```ignore
//! use lumen_state::{SqliteStore, Storage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::open("lumen.db").await?;
//!     store.put("session", b"{}").await?;
//!     let bytes = store.get("session").await?;
//!     assert!(bytes.is_some());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod storage;

// Re-exports for convenience
pub use error::{Result, StateError};
pub use storage::{MemoryStore, SqliteStore, Storage};
