#![forbid(unsafe_code)]
//! autoabr-io: artifact storage and result parsing.
//!
//! - `storage`: the async `ArtifactStore` trait with filesystem, in-memory and
//!   object store adapters, plus retry/backoff for transient failures.
//! - `readers`: quality-result artifacts (scores), metadata and CPU-time
//!   sidecars, and bulk loading of a result directory or prefix.
//! - `writers`: CSV export of loaded results.

pub mod error;
pub mod memory_storage;
pub mod readers;
pub mod storage;
pub mod uri;
pub mod writers;

pub use error::{Error, Result};
pub use memory_storage::MemoryStore;
pub use storage::{build_store_for, ArtifactStore, CloudStore, FsStore, RetryConfig};
pub use uri::ArtifactLocation;
