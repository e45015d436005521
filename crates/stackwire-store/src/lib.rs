//! # stackwire-store
//!
//! Parameter store client shared by every stack of a deployment.
//!
//! Handles:
//! - **Backend**: The storage trait and the published-parameter record.
//! - **Memory**: Process-local backend for tests and single-process runs.
//! - **File**: Durable JSON-file backend with atomic replacement.
//! - **Client**: Key validation, publishing, and render-time resolution of
//!   deferred references.

pub mod backend;
pub mod client;
pub mod file;
pub mod memory;

pub use backend::{ParameterBackend, PublishedParameter};
pub use client::ParameterStore;
pub use file::FileBackend;
pub use memory::MemoryBackend;
