//! # Sitesync
//!
//! Manifest-guided incremental directory synchronization.
//!
//! Sitesync mirrors a source directory tree onto a destination tree the
//! way a deployment pipeline needs it done: new and changed files are
//! copied, files the tool itself produced on a previous run are deleted
//! when they disappear from the source, and files that showed up in the
//! destination out-of-band are never touched. Ownership is tracked in a
//! persisted **manifest** of relative paths, rewritten at the end of
//! every successful run.
//!
//! ## Features
//!
//! - **Manifest-gated deletion**: only paths recorded by a prior run are
//!   ever removed; both historical first-run policies are explicit
//!   configuration
//! - **Incremental copies**: size + modification time comparison, with
//!   timestamps preserved across copies
//! - **Bounded-parallel copies**: a fixed fan-out per directory, never an
//!   unbounded task flood
//! - **Retry discipline**: every filesystem mutation retries with a fixed
//!   delay, for network-backed destinations that fail transiently
//! - **Ignore patterns**: case-insensitive globs excluding paths from both
//!   copy and delete consideration
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use sitesync::SyncBuilder;
//!
//! #[tokio::main]
//! async fn main() -> sitesync::Result<()> {
//!     let engine = SyncBuilder::new()
//!         .ignore_patterns("*.log;tmp/**")?
//!         .build();
//!
//!     let stats = engine
//!         .sync(
//!             Path::new("build/output"),
//!             Path::new("/site/wwwroot"),
//!             None,
//!             Path::new("/site/deployments/next.manifest"),
//!             Some(Path::new("/site/deployments/previous.manifest")),
//!         )
//!         .await?;
//!
//!     println!("{} files copied", stats.files_copied);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

mod entry;
mod error;
mod ignore;
mod manifest;
mod retry;
mod sync;

pub use entry::{DirectoryEntry, FileEntry};
pub use error::{Result, SyncError};
pub use ignore::IgnoreList;
pub use manifest::Manifest;
pub use retry::{RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
pub use sync::{
    SiteSync, SyncBuilder, SyncConfig, SyncStats, DEFAULT_MAX_PARALLEL_COPIES,
};
