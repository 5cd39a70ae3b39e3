use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use super::rule::{Capabilities, PermissionRule};
use super::{PermissionError, PERMISSION_FILE_NAME};
use crate::sync_path;

/// How to treat a permission file that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Skip it with a warning.
    #[default]
    BestEffort,
    /// Fail the whole tree.
    Strict,
}

/// Immutable snapshot of every permission rule below some root.
///
/// Build a new tree whenever permission files change; a tree is never
/// mutated once it has been handed out.
#[derive(Debug, Clone, Default)]
pub struct PermissionTree {
    rules: BTreeMap<String, PermissionRule>,
}

impl PermissionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(permission file path, contents)` pairs.
    pub fn from_files<I>(files: I, mode: ParseMode) -> Result<Self, PermissionError>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut tree = Self::new();
        for (path, bytes) in files {
            match PermissionRule::parse(&bytes) {
                Ok(rule) => tree.insert(sync_path::parent(&path), rule),
                Err(e) => tree.reject(&path, e.to_string(), mode)?,
            }
        }
        Ok(tree)
    }

    /// Walk `root/dir` on disk and load every permission file found.
    ///
    /// Keys are synced paths relative to `root`.
    pub fn from_dir(root: &Path, dir: &str, mode: ParseMode) -> Result<Self, PermissionError> {
        let start = sync_path::to_fs_path(root, dir);
        let mut tree = Self::new();
        if !start.exists() {
            return Ok(tree);
        }

        for entry in WalkDir::new(&start).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    tree.reject(&path, e.to_string(), mode)?;
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != PERMISSION_FILE_NAME {
                continue;
            }
            let Some(path) = sync_path::from_fs_path(root, entry.path()) else {
                continue;
            };
            match std::fs::read(entry.path()) {
                Ok(bytes) => match PermissionRule::parse(&bytes) {
                    Ok(rule) => tree.insert(sync_path::parent(&path), rule),
                    Err(e) => tree.reject(&path, e.to_string(), mode)?,
                },
                Err(e) => tree.reject(&path, e.to_string(), mode)?,
            }
        }
        Ok(tree)
    }

    fn reject(&self, path: &str, reason: String, mode: ParseMode) -> Result<(), PermissionError> {
        match mode {
            ParseMode::Strict => Err(PermissionError::CorruptPermissionTree {
                path: path.to_string(),
                reason,
            }),
            ParseMode::BestEffort => {
                tracing::warn!(path = %path, reason = %reason, "skipping corrupt permission file");
                Ok(())
            }
        }
    }

    /// Set the rule for `dir`, replacing any existing one.
    pub fn insert(&mut self, dir: &str, mut rule: PermissionRule) {
        rule.dir = dir.to_string();
        self.rules.insert(dir.to_string(), rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule governing `path`, if any.
    pub fn rule_for(&self, path: &str) -> Option<&PermissionRule> {
        let mut chain: Vec<&str> = sync_path::ancestors(path).collect();
        chain.reverse();
        chain.push(path);

        let mut found = None;
        for dir in chain {
            if let Some(rule) = self.rules.get(dir) {
                if rule.terminal {
                    return Some(rule);
                }
                found = Some(rule);
            }
        }
        found
    }

    pub fn resolve(&self, identity: &str, path: &str) -> Capabilities {
        self.rule_for(path)
            .map(|rule| rule.capabilities_for(identity))
            .unwrap_or_else(Capabilities::none)
    }

    /// Like [`resolve`](Self::resolve), but the owner of a datasite always
    /// has full access to it.
    pub fn resolve_effective(&self, identity: &str, path: &str) -> Capabilities {
        if sync_path::datasite_of(path) == identity {
            return Capabilities::all();
        }
        self.resolve(identity, path)
    }
}
