//! Persisted record of the destination paths a previous run produced.
//!
//! The manifest is what separates "files this tool owns and may delete
//! when they disappear from the source" from "files somebody else put in
//! the destination, never to be touched". It is loaded once at the start
//! of a run, rebuilt from scratch during the walk, and persisted at the
//! end of a successful non-dry run.

use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::error::Result;

/// Set of relative paths a synchronization run is responsible for.
///
/// Keys are paths relative to the run's root, optionally prefixed with a
/// target sub-folder. Insertion order is irrelevant.
#[derive(Debug, Default, Clone)]
pub struct Manifest {
    paths: FxHashSet<PathBuf>,
}

impl Manifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest from a newline-delimited file.
    ///
    /// Blank lines are skipped. A missing file yields an empty manifest —
    /// that is the single "no previous run" signal, not an error.
    ///
    /// # Errors
    ///
    /// Any I/O failure other than the file not existing propagates.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => return Err(err.into()),
        };

        let mut manifest = Self::new();
        for line in content.lines() {
            let line = line.trim();
            if !line.is_empty() {
                manifest.paths.insert(PathBuf::from(line));
            }
        }
        Ok(manifest)
    }

    /// Persist the manifest, one relative path per line.
    ///
    /// The content is written to a sibling temp file and renamed over the
    /// target, so a crash mid-write never leaves a truncated manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or renaming fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut lines: Vec<String> = self
            .paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        lines.sort_unstable();
        let content = lines.join("\n");

        let temp_path = path.with_extension("manifest.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }

    fn key(path: &Path, root: &Path, target_subfolder: Option<&Path>) -> PathBuf {
        let relative = path.strip_prefix(root).unwrap_or(path);
        match target_subfolder {
            Some(prefix) => prefix.join(relative),
            None => relative.to_path_buf(),
        }
    }

    /// Record `path` (relative to `root`, under the optional sub-folder).
    pub fn add(&mut self, path: &Path, root: &Path, target_subfolder: Option<&Path>) {
        self.paths.insert(Self::key(path, root, target_subfolder));
    }

    /// Whether `path` (relative to `root`, under the optional sub-folder)
    /// was recorded.
    #[must_use]
    pub fn contains(&self, path: &Path, root: &Path, target_subfolder: Option<&Path>) -> bool {
        self.paths.contains(&Self::key(path, root, target_subfolder))
    }

    /// True when no entry was ever loaded or added.
    ///
    /// For a previous-run manifest this is the "no previous run" signal
    /// that drives the configurable first-run deletion policy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    proptest! {
        /// load(save(M)) reproduces the same path set, order-independent.
        #[test]
        fn manifest_round_trips(
            names in prop::collection::hash_set("[a-z][a-z0-9]{0,8}(/[a-z][a-z0-9]{0,8}){0,3}", 0..32)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let tmp = tempdir().unwrap();
                let path = tmp.path().join("manifest");
                let root = Path::new("/r");

                let mut manifest = Manifest::new();
                for name in &names {
                    manifest.add(&root.join(name), root, None);
                }
                manifest.save(&path).await.unwrap();

                let reloaded = Manifest::load(&path).await.unwrap();
                prop_assert_eq!(reloaded.len(), manifest.len());
                for name in &names {
                    prop_assert!(reloaded.contains(&root.join(name), root, None));
                }
                Ok(())
            })?;
        }
    }
}
