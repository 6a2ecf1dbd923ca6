//! Filesystem entity model for the tree walk.
//!
//! [`FileEntry`] is an immutable snapshot of a file taken at
//! directory-listing time. [`DirectoryEntry`] owns the listing state for
//! one directory: a cached existence flag and lazily populated,
//! name-indexed child maps. Child names are upper-cased before every map
//! insert and lookup, so matching is case-insensitive regardless of the
//! host filesystem.

use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::SystemTime;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::retry::RetryPolicy;

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Uppercased absolute form of a path, for case-insensitive comparisons.
pub(crate) fn normalized(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    absolute.to_string_lossy().to_uppercase()
}

/// Snapshot of a single file, taken when its parent directory was listed.
#[derive(Debug, Clone)]
pub struct FileEntry {
    name: String,
    path: PathBuf,
    root: PathBuf,
    size: u64,
    modified: Option<SystemTime>,
}

impl FileEntry {
    pub(crate) fn new(
        path: PathBuf,
        root: PathBuf,
        size: u64,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            name: entry_name(&path),
            path,
            root,
            size,
            modified,
        }
    }

    /// Base name of the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the root this entry was listed under.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time, if the filesystem reported one.
    #[must_use]
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Whether `other` snapshots the same content state.
    ///
    /// True iff both entries carry a modification time, the times match
    /// exactly, and the byte sizes match. An entry with an unknown
    /// modification time never matches anything, forcing a copy.
    #[must_use]
    pub fn matches(&self, other: &FileEntry) -> bool {
        match (self.modified, other.modified) {
            (Some(a), Some(b)) => a == b && self.size == other.size,
            _ => false,
        }
    }
}

/// One directory in the tree walk, with lazily listed children.
///
/// Listing transitions the entry from unlisted to listed exactly once;
/// [`DirectoryEntry::refresh`] is the explicit re-list transition used
/// after deletions to re-check emptiness.
#[derive(Debug)]
pub struct DirectoryEntry {
    name: String,
    path: PathBuf,
    root: PathBuf,
    exists: Option<bool>,
    listed: bool,
    files: Vec<FileEntry>,
    file_index: FxHashMap<String, usize>,
    subdirs: Vec<DirectoryEntry>,
    subdir_index: FxHashMap<String, usize>,
}

impl DirectoryEntry {
    /// Create an entry for `path`, tracked relative to `root`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: entry_name(&path),
            path,
            root: root.into(),
            exists: None,
            listed: false,
            files: Vec::new(),
            file_index: FxHashMap::default(),
            subdirs: Vec::new(),
            subdir_index: FxHashMap::default(),
        }
    }

    /// Base name of the directory.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the root this entry is tracked under.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }

    /// Whether the directory exists on disk, computed once and cached.
    pub async fn exists(&mut self) -> bool {
        if let Some(exists) = self.exists {
            return exists;
        }
        let exists = tokio::fs::try_exists(&self.path).await.unwrap_or(false);
        self.exists = Some(exists);
        exists
    }

    /// Force the cached existence flag, avoiding a redundant stat after a
    /// successful creation or a listing that produced this entry.
    pub fn mark_exists(&mut self) {
        self.exists = Some(true);
    }

    /// Ensure this directory and all missing ancestors exist.
    ///
    /// Ancestors are created one at a time, topmost first, each creation
    /// running under the retry policy. Creation of an already-present
    /// directory is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the final I/O error if a creation still fails once the
    /// retry budget is exhausted.
    pub async fn ensure_created(&mut self, retry: &RetryPolicy) -> Result<()> {
        if self.exists().await {
            return Ok(());
        }

        let mut missing = vec![self.path.clone()];
        let mut cursor = self.path.clone();
        while let Some(parent) = cursor.parent() {
            if parent.as_os_str().is_empty()
                || tokio::fs::try_exists(parent).await.unwrap_or(false)
            {
                break;
            }
            missing.push(parent.to_path_buf());
            cursor = parent.to_path_buf();
        }

        for dir in missing.iter().rev() {
            retry.run(|| create_dir_if_missing(dir)).await?;
        }

        self.exists = Some(true);
        // A freshly created directory has no children to list.
        self.listed = true;
        Ok(())
    }

    /// Populate the child maps and lists, once.
    ///
    /// A directory that does not exist yields empty listings rather than
    /// an error; this is what keeps dry runs safe when the destination
    /// was never created.
    ///
    /// # Errors
    ///
    /// Returns the final I/O error if reading the directory still fails
    /// once the retry budget is exhausted.
    pub async fn list(&mut self, retry: &RetryPolicy) -> Result<()> {
        if self.listed || !self.exists().await {
            return Ok(());
        }

        let (files, subdirs) = retry.run(|| self.read_children()).await?;

        self.file_index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_uppercase(), i))
            .collect();
        self.subdir_index = subdirs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name().to_uppercase(), i))
            .collect();
        self.files = files;
        self.subdirs = subdirs;
        self.listed = true;
        Ok(())
    }

    /// Discard the cached listing and list again.
    ///
    /// # Errors
    ///
    /// Same as [`DirectoryEntry::list`].
    pub async fn refresh(&mut self, retry: &RetryPolicy) -> Result<()> {
        self.listed = false;
        self.files.clear();
        self.file_index.clear();
        self.subdirs.clear();
        self.subdir_index.clear();
        self.list(retry).await
    }

    async fn read_children(&self) -> io::Result<(Vec<FileEntry>, Vec<DirectoryEntry>)> {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let path = entry.path();
            if metadata.is_dir() {
                let mut dir = DirectoryEntry::new(path, self.root.clone());
                dir.mark_exists();
                subdirs.push(dir);
            } else {
                files.push(FileEntry::new(
                    path,
                    self.root.clone(),
                    metadata.len(),
                    metadata.modified().ok(),
                ));
            }
        }

        Ok((files, subdirs))
    }

    /// Look up a child file by name, case-insensitively.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.file_index
            .get(&name.to_uppercase())
            .map(|&i| &self.files[i])
    }

    /// Look up a child directory by name, case-insensitively.
    #[must_use]
    pub fn subdir(&self, name: &str) -> Option<&DirectoryEntry> {
        self.subdir_index
            .get(&name.to_uppercase())
            .map(|&i| &self.subdirs[i])
    }

    /// Child files in listing order.
    #[must_use]
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Child directories in listing order.
    #[must_use]
    pub fn subdirs(&self) -> &[DirectoryEntry] {
        &self.subdirs
    }

    /// Number of child directories.
    #[must_use]
    pub fn subdir_count(&self) -> usize {
        self.subdirs.len()
    }

    /// Mutable access to the child directory at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn subdir_at_mut(&mut self, index: usize) -> &mut DirectoryEntry {
        &mut self.subdirs[index]
    }

    /// Whether this directory lies strictly inside `other`.
    ///
    /// Case-insensitive path-prefix containment on absolutized paths. The
    /// contained path must keep at least one separator after the prefix
    /// is stripped, so `/foo` is not considered inside `/foobar`, and a
    /// path is never inside itself.
    #[must_use]
    pub fn is_subdirectory_of(&self, other: &DirectoryEntry) -> bool {
        let this = normalized(&self.path);
        let parent = normalized(&other.path);

        match this.strip_prefix(&parent) {
            Some(rest) => rest.contains(MAIN_SEPARATOR) || rest.contains('/'),
            None => false,
        }
    }
}

async fn create_dir_if_missing(path: &Path) -> io::Result<()> {
    match tokio::fs::create_dir(path).await {
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(0, std::time::Duration::from_millis(1))
    }

    fn file_entry(name: &str, size: u64, modified: Option<SystemTime>) -> FileEntry {
        FileEntry::new(PathBuf::from(name), PathBuf::from("."), size, modified)
    }

    // ==========================================================================
    // FILE ENTRY TESTS
    // ==========================================================================

    #[test]
    fn matches_same_time_and_size() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        let a = file_entry("a", 10, Some(t));
        let b = file_entry("b", 10, Some(t));
        assert!(a.matches(&b));
    }

    #[test]
    fn matches_rejects_different_size() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        let a = file_entry("a", 10, Some(t));
        let b = file_entry("b", 11, Some(t));
        assert!(!a.matches(&b));
    }

    #[test]
    fn matches_rejects_different_time() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        let a = file_entry("a", 10, Some(t));
        let b = file_entry("b", 10, Some(t + std::time::Duration::from_millis(1)));
        assert!(!a.matches(&b));
    }

    #[test]
    fn unknown_modified_time_never_matches() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000);
        let a = file_entry("a", 10, None);
        let b = file_entry("b", 10, Some(t));
        assert!(!a.matches(&b));
        assert!(!b.matches(&a));
        assert!(!a.matches(&a.clone()));
    }

    #[test]
    fn relative_path_strips_root() {
        let entry = FileEntry::new(
            PathBuf::from("/site/wwwroot/css/main.css"),
            PathBuf::from("/site/wwwroot"),
            1,
            None,
        );
        assert_eq!(entry.relative_path(), Path::new("css/main.css"));
        assert_eq!(entry.name(), "main.css");
    }

    // ==========================================================================
    // DIRECTORY ENTRY TESTS
    // ==========================================================================

    #[tokio::test]
    async fn listing_populates_children() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("one.txt"), b"1").unwrap();
        fs::write(tmp.path().join("two.txt"), b"22").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let mut dir = DirectoryEntry::new(tmp.path(), tmp.path());
        dir.list(&policy()).await.unwrap();

        assert_eq!(dir.files().len(), 2);
        assert_eq!(dir.subdirs().len(), 1);
        assert_eq!(dir.file("one.txt").unwrap().size(), 1);
        assert_eq!(dir.subdir("sub").unwrap().name(), "sub");
    }

    #[tokio::test]
    async fn lookups_are_case_insensitive() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("Readme.MD"), b"hi").unwrap();
        fs::create_dir(tmp.path().join("Assets")).unwrap();

        let mut dir = DirectoryEntry::new(tmp.path(), tmp.path());
        dir.list(&policy()).await.unwrap();

        assert!(dir.file("README.md").is_some());
        assert!(dir.file("readme.md").is_some());
        assert!(dir.subdir("assets").is_some());
        assert!(dir.file("missing").is_none());
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let tmp = tempdir().unwrap();
        let mut dir = DirectoryEntry::new(tmp.path().join("nope"), tmp.path());

        assert!(!dir.exists().await);
        dir.list(&policy()).await.unwrap();
        assert!(dir.files().is_empty());
        assert!(dir.subdirs().is_empty());
    }

    #[tokio::test]
    async fn listing_is_memoized_until_refresh() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a"), b"a").unwrap();

        let mut dir = DirectoryEntry::new(tmp.path(), tmp.path());
        dir.list(&policy()).await.unwrap();
        assert_eq!(dir.files().len(), 1);

        fs::write(tmp.path().join("b"), b"b").unwrap();
        dir.list(&policy()).await.unwrap();
        assert_eq!(dir.files().len(), 1);

        dir.refresh(&policy()).await.unwrap();
        assert_eq!(dir.files().len(), 2);
    }

    #[tokio::test]
    async fn ensure_created_builds_ancestors() {
        let tmp = tempdir().unwrap();
        let deep = tmp.path().join("a").join("b").join("c");

        let mut dir = DirectoryEntry::new(&deep, tmp.path());
        dir.ensure_created(&policy()).await.unwrap();

        assert!(deep.is_dir());
        assert!(dir.exists().await);
    }

    #[tokio::test]
    async fn ensure_created_is_idempotent() {
        let tmp = tempdir().unwrap();
        let mut dir = DirectoryEntry::new(tmp.path(), tmp.path());
        dir.ensure_created(&policy()).await.unwrap();
        dir.ensure_created(&policy()).await.unwrap();
        assert!(dir.exists().await);
    }

    #[test]
    fn subdirectory_containment() {
        let root = DirectoryEntry::new("/deploy/site", "/deploy/site");
        let nested = DirectoryEntry::new("/deploy/site/css", "/deploy/site");
        let sibling = DirectoryEntry::new("/deploy/sitebackup", "/deploy");

        assert!(nested.is_subdirectory_of(&root));
        assert!(!root.is_subdirectory_of(&nested));
        assert!(!sibling.is_subdirectory_of(&root));
        assert!(!root.is_subdirectory_of(&root));
    }

    #[test]
    fn subdirectory_containment_ignores_case() {
        let root = DirectoryEntry::new("/Deploy/Site", "/Deploy/Site");
        let nested = DirectoryEntry::new("/deploy/site/js/app", "/deploy/site");
        assert!(nested.is_subdirectory_of(&root));
    }
}
