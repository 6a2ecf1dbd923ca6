//! Tree synchronization engine.
//!
//! This module provides the [`SyncBuilder`]/[`SiteSync`] pair that drives
//! a manifest-guided incremental sync of a source directory tree onto a
//! destination tree: copy new and changed files, delete orphans the
//! manifest authorizes, leave everything else alone.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::entry::{normalized, DirectoryEntry, FileEntry};
use crate::error::{Result, SyncError};
use crate::ignore::IgnoreList;
use crate::manifest::Manifest;
use crate::retry::{RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};

/// Default number of concurrent file copies within a single directory.
pub const DEFAULT_MAX_PARALLEL_COPIES: usize = 5;

/// Configuration for a sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Concurrent copy fan-out within one directory (at least 1).
    pub max_parallel_copies: usize,
    /// Additional attempts for each filesystem mutation.
    pub retries: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay: Duration,
    /// Disable manifest gating: every destination-only entry becomes
    /// deletion-eligible.
    pub ignore_manifest: bool,
    /// Legacy first-run policy: an empty previous manifest makes every
    /// destination-only entry deletion-eligible. When false, a first run
    /// leaves destination-only entries alone.
    pub first_run_cleans_destination: bool,
    /// Compute and log intended actions without mutating the filesystem
    /// or persisting a manifest.
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel_copies: DEFAULT_MAX_PARALLEL_COPIES,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            ignore_manifest: false,
            first_run_cleans_destination: false,
            dry_run: false,
        }
    }
}

/// Builder for creating sync engines with custom configuration.
///
/// # Example
///
/// ```rust
/// use sitesync::SyncBuilder;
///
/// let engine = SyncBuilder::new()
///     .max_parallel_copies(8)
///     .dry_run(true)
///     .build();
/// assert!(engine.config().dry_run);
/// ```
#[derive(Debug, Default)]
pub struct SyncBuilder {
    config: SyncConfig,
    ignore: Option<IgnoreList>,
}

impl SyncBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the copy fan-out within a single directory.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn max_parallel_copies(mut self, count: usize) -> Self {
        assert!(count >= 1, "max_parallel_copies must be at least 1");
        self.config.max_parallel_copies = count;
        self
    }

    /// Set the number of additional attempts for filesystem mutations.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the fixed delay between retry attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Disable manifest gating for deletions.
    #[must_use]
    pub fn ignore_manifest(mut self, ignore: bool) -> Self {
        self.config.ignore_manifest = ignore;
        self
    }

    /// Select the legacy first-run policy (empty previous manifest cleans
    /// the whole destination) instead of the default leave-alone policy.
    #[must_use]
    pub fn first_run_cleans_destination(mut self, clean: bool) -> Self {
        self.config.first_run_cleans_destination = clean;
        self
    }

    /// Enable dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Parse and install a semicolon-delimited ignore pattern list.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidIgnorePattern`] if a pattern does not
    /// compile; this surfaces before any filesystem work starts.
    pub fn ignore_patterns(mut self, spec: &str) -> Result<Self> {
        self.ignore = IgnoreList::parse(spec)?;
        Ok(self)
    }

    /// Build the sync engine.
    #[must_use]
    pub fn build(self) -> SiteSync {
        SiteSync {
            config: self.config,
            ignore: self.ignore,
        }
    }
}

/// Statistics from a sync run.
///
/// In dry-run mode the counts reflect intended actions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Files copied (created or updated).
    pub files_copied: u64,
    /// Source files skipped because the destination was already current.
    pub files_up_to_date: u64,
    /// Destination files deleted.
    pub files_deleted: u64,
    /// Destination directories deleted.
    pub directories_deleted: u64,
    /// Entries skipped by ignore patterns.
    pub entries_ignored: u64,
}

impl SyncStats {
    /// Total mutations performed (or intended, in dry-run mode).
    #[must_use]
    pub fn changes(&self) -> u64 {
        self.files_copied + self.files_deleted + self.directories_deleted
    }
}

/// Manifest-guided incremental directory synchronizer.
#[derive(Debug, Default)]
pub struct SiteSync {
    config: SyncConfig,
    ignore: Option<IgnoreList>,
}

impl SiteSync {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        SyncBuilder::new().build()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Synchronize `source_root` onto `dest_root`.
    ///
    /// When `target_subfolder` is given the effective destination is
    /// `dest_root/target_subfolder` and manifest keys carry the
    /// sub-folder prefix. The previous manifest (if any) gates orphan
    /// deletion; the next manifest is persisted to `next_manifest_path`
    /// at the very end of a successful non-dry run.
    ///
    /// # Errors
    ///
    /// Fails before any filesystem work for a missing source root,
    /// overlapping roots, or an unreadable (other than missing) previous
    /// manifest; fails during the walk when a filesystem operation still
    /// errors after the retry budget.
    pub async fn sync(
        &self,
        source_root: &Path,
        dest_root: &Path,
        target_subfolder: Option<&Path>,
        next_manifest_path: &Path,
        previous_manifest_path: Option<&Path>,
    ) -> Result<SyncStats> {
        let effective_dest = match target_subfolder {
            Some(sub) => dest_root.join(sub),
            None => dest_root.to_path_buf(),
        };

        let mut from = DirectoryEntry::new(source_root, source_root);
        let mut to = DirectoryEntry::new(&effective_dest, &effective_dest);

        if !from.exists().await {
            return Err(SyncError::SourceMissing(source_root.to_path_buf()));
        }
        if from.is_subdirectory_of(&to) || to.is_subdirectory_of(&from) {
            return Err(SyncError::OverlappingRoots {
                source_root: source_root.to_path_buf(),
                dest_root: effective_dest,
            });
        }

        let previous = if self.config.ignore_manifest {
            Manifest::new()
        } else {
            match previous_manifest_path {
                Some(path) => Manifest::load(path).await?,
                None => Manifest::new(),
            }
        };

        info!(
            from = %source_root.display(),
            to = %effective_dest.display(),
            dry_run = self.config.dry_run,
            "syncing directory tree",
        );

        let mut walk = Walk {
            engine: self,
            retry: RetryPolicy::new(self.config.retries, self.config.retry_delay),
            source_root: source_root.to_path_buf(),
            dest_root: effective_dest,
            target_subfolder: target_subfolder.map(Path::to_path_buf),
            previous,
            next: Manifest::new(),
            stats: SyncStats::default(),
        };

        walk.sync_directory(&mut from, &mut to).await?;

        if !self.config.dry_run {
            walk.next.save(next_manifest_path).await?;
        }

        Ok(walk.stats)
    }
}

/// One file scheduled for copying.
struct CopyJob {
    source: PathBuf,
    dest: PathBuf,
    modified: Option<SystemTime>,
}

/// Per-run walk state: manifests, stats, and resolved roots.
struct Walk<'e> {
    engine: &'e SiteSync,
    retry: RetryPolicy,
    source_root: PathBuf,
    dest_root: PathBuf,
    target_subfolder: Option<PathBuf>,
    previous: Manifest,
    next: Manifest,
    stats: SyncStats,
}

impl Walk<'_> {
    fn is_ignored(&self, path: &Path, root: &Path) -> bool {
        self.engine
            .ignore
            .as_ref()
            .is_some_and(|list| list.is_ignored(path, root))
    }

    /// Whether a destination-only entry may be deleted.
    ///
    /// An entry the manifest does not authorize deleting was produced by
    /// something other than this tool and is never silently destroyed.
    fn deletion_eligible(&self, path: &Path) -> bool {
        let config = &self.engine.config;
        config.ignore_manifest
            || (self.previous.is_empty() && config.first_run_cleans_destination)
            || self
                .previous
                .contains(path, &self.dest_root, self.target_subfolder.as_deref())
    }

    /// Synchronize one (source, destination) directory pair, recursively.
    fn sync_directory<'a>(
        &'a mut self,
        from: &'a mut DirectoryEntry,
        to: &'a mut DirectoryEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            if self.is_ignored(from.path(), &self.source_root) {
                self.stats.entries_ignored += 1;
                return Ok(());
            }

            // Never walk into the directory that is the destination root
            // itself; syncing it would consume the tool's own output.
            if normalized(from.path()) == normalized(&self.dest_root) {
                return Ok(());
            }

            let is_root = from.relative_path().as_os_str().is_empty();
            if !is_root {
                self.next.add(
                    from.path(),
                    &self.source_root,
                    self.target_subfolder.as_deref(),
                );
            }

            if !self.engine.config.dry_run {
                to.ensure_created(&self.retry).await?;
            }

            to.list(&self.retry).await?;
            from.list(&self.retry).await?;

            self.copy_files(from, to).await?;
            self.delete_orphan_files(from, to).await?;

            // Destination directories with no source counterpart.
            for index in 0..to.subdir_count() {
                let name = to.subdirs()[index].name().to_string();
                if from.subdir(&name).is_some() {
                    continue;
                }
                let to_sub = to.subdir_at_mut(index);
                if self.is_ignored(to_sub.path(), &self.dest_root) {
                    self.stats.entries_ignored += 1;
                    continue;
                }
                self.delete_directory(to_sub).await?;
            }

            // Recurse into source directories.
            for index in 0..from.subdir_count() {
                let name = from.subdirs()[index].name().to_string();
                // Reuse an existing destination directory's spelling so a
                // case-insensitive match never produces a duplicate tree.
                let (sub_path, existed) = match to.subdir(&name) {
                    Some(existing) => (existing.path().to_path_buf(), true),
                    None => (to.path().join(&name), false),
                };
                let mut to_sub = DirectoryEntry::new(sub_path, self.dest_root.clone());
                if existed {
                    to_sub.mark_exists();
                }
                let from_sub = from.subdir_at_mut(index);
                self.sync_directory(from_sub, &mut to_sub).await?;
            }

            Ok(())
        })
    }

    /// Copy phase: schedule changed files, run them with bounded fan-out.
    async fn copy_files(&mut self, from: &DirectoryEntry, to: &DirectoryEntry) -> Result<()> {
        let mut jobs = Vec::new();

        for file in from.files() {
            if self.is_ignored(file.path(), &self.source_root) {
                self.stats.entries_ignored += 1;
                continue;
            }

            self.next.add(
                file.path(),
                &self.source_root,
                self.target_subfolder.as_deref(),
            );

            let counterpart = to.file(file.name());
            if counterpart.is_some_and(|existing| file.matches(existing)) {
                self.stats.files_up_to_date += 1;
                continue;
            }

            // Target the existing destination spelling when a
            // case-insensitive counterpart is present.
            let dest = counterpart.map_or_else(
                || to.path().join(file.name()),
                |existing| existing.path().to_path_buf(),
            );

            debug!(file = %file.relative_path().display(), "copying file");
            self.stats.files_copied += 1;

            if !self.engine.config.dry_run {
                jobs.push(CopyJob {
                    source: file.path().to_path_buf(),
                    dest,
                    modified: file.modified(),
                });
            }
        }

        if jobs.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.engine.config.max_parallel_copies));
        let retry = self.retry;
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| io::Error::other("copy scheduler closed"))?;

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                retry
                    .run(|| copy_with_mtime(&job.source, &job.dest, job.modified))
                    .await
            }));
        }

        let mut first_error: Option<SyncError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_error.get_or_insert(err.into());
                }
                Err(join_err) => {
                    first_error.get_or_insert(join_err.into());
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Delete phase: destination files with no source counterpart.
    async fn delete_orphan_files(
        &mut self,
        from: &DirectoryEntry,
        to: &DirectoryEntry,
    ) -> Result<()> {
        for file in to.files() {
            if self.is_ignored(file.path(), &self.dest_root) {
                self.stats.entries_ignored += 1;
                continue;
            }
            if from.file(file.name()).is_some() {
                continue;
            }
            self.delete_file(file).await?;
        }
        Ok(())
    }

    async fn delete_file(&mut self, file: &FileEntry) -> Result<()> {
        if !self.deletion_eligible(file.path()) {
            return Ok(());
        }

        debug!(file = %file.relative_path().display(), "deleting file");
        self.stats.files_deleted += 1;

        if !self.engine.config.dry_run {
            let path = file.path().to_path_buf();
            self.retry.run(|| remove_file_if_present(&path)).await?;
        }
        Ok(())
    }

    /// Recursively delete a manifest-eligible destination directory.
    ///
    /// Children are deleted first (each file gated individually), the
    /// listing is refreshed, and the directory itself is removed only if
    /// it is now completely empty. A non-empty leftover is preserved.
    fn delete_directory<'a>(
        &'a mut self,
        dir: &'a mut DirectoryEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            if !self.deletion_eligible(dir.path()) {
                return Ok(());
            }

            dir.list(&self.retry).await?;

            for file in dir.files() {
                self.delete_file(file).await?;
            }
            for index in 0..dir.subdir_count() {
                let sub = dir.subdir_at_mut(index);
                self.delete_directory(sub).await?;
            }

            dir.refresh(&self.retry).await?;
            if dir.files().is_empty() && dir.subdirs().is_empty() {
                debug!(dir = %dir.relative_path().display(), "deleting directory");
                self.stats.directories_deleted += 1;

                if !self.engine.config.dry_run {
                    let path = dir.path().to_path_buf();
                    self.retry.run(|| remove_dir_if_present(&path)).await?;
                }
            }
            Ok(())
        })
    }
}

/// Copy one file and stamp the destination with the source's mtime.
///
/// Retried as a single unit; both halves are safely re-runnable.
async fn copy_with_mtime(
    source: &Path,
    dest: &Path,
    modified: Option<SystemTime>,
) -> io::Result<()> {
    tokio::fs::copy(source, dest).await?;
    if let Some(mtime) = modified {
        filetime::set_file_mtime(dest, FileTime::from_system_time(mtime))?;
    }
    Ok(())
}

async fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

async fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir(path).await {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
