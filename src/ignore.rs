//! Glob-based exclusion of paths from both copy and delete consideration.
//!
//! Patterns arrive as one semicolon-delimited string. Matching is
//! case-insensitive and follows shell-glob semantics: `*` stops at path
//! separators, `**` crosses them. A pattern without a separator matches
//! against base names anywhere in the tree; a pattern with separators
//! matches the full path relative to the walk root.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::error::{Result, SyncError};

struct IgnorePattern {
    text: String,
    matcher: GlobMatcher,
    /// Separator-less patterns match base names at any depth.
    match_base: bool,
}

/// Compiled list of ignore patterns.
pub struct IgnoreList {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreList {
    /// Parse a semicolon-delimited pattern string.
    ///
    /// An empty or whitespace-only input yields `None` ("no ignoring").
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidIgnorePattern`] for a pattern that does
    /// not compile as a glob.
    pub fn parse(spec: &str) -> Result<Option<Self>> {
        let mut patterns = Vec::new();
        for text in spec.split(';') {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let glob = GlobBuilder::new(text)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|source| SyncError::InvalidIgnorePattern {
                    pattern: text.to_string(),
                    source,
                })?;
            patterns.push(IgnorePattern {
                text: text.to_string(),
                matcher: glob.compile_matcher(),
                match_base: !text.contains('/') && !text.contains('\\'),
            });
        }

        if patterns.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { patterns }))
    }

    /// Whether `path`, taken relative to `root`, matches any pattern.
    ///
    /// The first matching pattern short-circuits.
    #[must_use]
    pub fn is_ignored(&self, path: &Path, root: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);

        for pattern in &self.patterns {
            let hit = if pattern.match_base {
                relative
                    .file_name()
                    .is_some_and(|name| pattern.matcher.is_match(name))
            } else {
                pattern.matcher.is_match(relative)
            };
            if hit {
                debug!(path = %relative.display(), pattern = %pattern.text, "ignoring");
                return true;
            }
        }
        false
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the list holds no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl std::fmt::Debug for IgnoreList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.patterns.iter().map(|p| &p.text))
            .finish()
    }
}
