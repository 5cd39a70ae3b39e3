use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::sync_path;

/// File holding user ignore patterns, placed at the datasites root.
pub const IGNORE_FILE_NAME: &str = "_.syftignore";

/// Prefix of temp files created by atomic writes.
pub const TEMP_FILE_PREFIX: &str = ".syncbox-tmp";

const OS_ARTIFACTS: &[&str] = &[".DS_Store"];

/// Rules deciding which paths never take part in a snapshot.
///
/// Always skipped: OS artifacts anywhere, `Icon*` marker files directly
/// under the snapshot root and leftover temp files. On top of that the
/// caller can add folder names and gitignore-style patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    folders: Vec<String>,
    patterns: Option<Gitignore>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip any directory with this name, at any depth.
    pub fn with_folder(mut self, name: impl Into<String>) -> Self {
        self.folders.push(name.into());
        self
    }

    /// Add gitignore-style patterns, one per line. Blank lines and `#`
    /// comments are allowed.
    pub fn with_patterns<'a, I>(mut self, lines: I) -> Result<Self, ignore::Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut builder = GitignoreBuilder::new("");
        for line in lines {
            builder.add_line(None, line)?;
        }
        self.patterns = Some(builder.build()?);
        Ok(self)
    }

    /// Load patterns from `<datasites>/_.syftignore` if it exists.
    pub fn load(datasites: &Path) -> Result<Self, ignore::Error> {
        let file = datasites.join(IGNORE_FILE_NAME);
        let rules = Self::new();
        if !file.is_file() {
            return Ok(rules);
        }
        let contents = std::fs::read_to_string(&file).map_err(ignore::Error::Io)?;
        rules.with_patterns(contents.lines())
    }

    /// Whether a directory (relative to the datasites root) is skipped.
    pub fn is_ignored_dir(&self, path: &str) -> bool {
        let name = sync_path::file_name(path);
        if self.folders.iter().any(|folder| folder == name) {
            return true;
        }
        self.matches(path, true)
    }

    /// Whether a file is skipped. `snapshot_root` is the directory the
    /// snapshot started from, used for the top-level-only `Icon` rule.
    pub fn is_ignored_file(&self, path: &str, snapshot_root: &str) -> bool {
        let name = sync_path::file_name(path);
        if OS_ARTIFACTS.contains(&name) || name.starts_with(TEMP_FILE_PREFIX) {
            return true;
        }
        if name.starts_with("Icon") && sync_path::parent(path) == snapshot_root {
            return true;
        }
        self.matches(path, false)
    }

    /// Whether a file is skipped either by its own name or because one of
    /// its enclosing folders is.
    pub fn is_ignored(&self, path: &str, snapshot_root: &str) -> bool {
        let in_ignored_folder = sync_path::parent(path)
            .split('/')
            .any(|name| self.folders.iter().any(|folder| folder == name));
        in_ignored_folder || self.is_ignored_file(path, snapshot_root)
    }

    fn matches(&self, path: &str, is_dir: bool) -> bool {
        match &self.patterns {
            Some(patterns) => patterns
                .matched_path_or_any_parents(path, is_dir)
                .is_ignore(),
            None => false,
        }
    }
}
