//! Directory snapshots.
//!
//! A [`DirectoryState`] is a point in time map of synced path to
//! [`FileMetadata`]. Snapshots are plain values: the change detector only
//! ever compares two of them and never looks at the filesystem itself.

mod ignore_rules;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

pub use self::ignore_rules::{IgnoreRules, IGNORE_FILE_NAME, TEMP_FILE_PREFIX};
use crate::sync_path;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("directory does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Metadata of one version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: String,
    /// Hex encoded SHA-256 of the content.
    pub hash: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl FileMetadata {
    pub fn from_bytes(path: &str, bytes: &[u8]) -> Self {
        Self {
            path: path.to_string(),
            hash: hash_bytes(bytes),
            size: bytes.len() as u64,
            last_modified: Utc::now(),
        }
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a file without loading it whole.
pub fn hash_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size += read as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

/// Metadata for a single on-disk file addressed by its synced path.
pub fn file_metadata(root: &Path, path: &str) -> std::io::Result<FileMetadata> {
    let fs_path = sync_path::to_fs_path(root, path);
    let (hash, size) = hash_file(&fs_path)?;
    let last_modified = std::fs::metadata(&fs_path)?
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Ok(FileMetadata {
        path: path.to_string(),
        hash,
        size,
        last_modified,
    })
}

/// Snapshot of a directory below the datasites root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryState {
    /// Synced path of the directory the snapshot covers.
    pub root: String,
    pub timestamp: DateTime<Utc>,
    pub tree: BTreeMap<String, FileMetadata>,
}

impl DirectoryState {
    pub fn empty(root: &str) -> Self {
        Self {
            root: root.to_string(),
            timestamp: Utc::now(),
            tree: BTreeMap::new(),
        }
    }

    /// Build a snapshot from metadata received from elsewhere, e.g. the
    /// server. Entries outside `root` are dropped.
    pub fn from_metadata<I>(root: &str, files: I) -> Self
    where
        I: IntoIterator<Item = FileMetadata>,
    {
        let tree = files
            .into_iter()
            .filter(|meta| sync_path::is_within(&meta.path, root))
            .map(|meta| (meta.path.clone(), meta))
            .collect();
        Self {
            root: root.to_string(),
            timestamp: Utc::now(),
            tree,
        }
    }

    pub fn hash_of(&self, path: &str) -> Option<&str> {
        self.tree.get(path).map(|meta| meta.hash.as_str())
    }

    pub fn get(&self, path: &str) -> Option<&FileMetadata> {
        self.tree.get(path)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Walk `datasites/dir` and hash every file not excluded by `rules`.
///
/// A missing directory yields an empty snapshot; callers that must tell
/// the two apart check for the directory first.
pub fn snapshot(
    datasites: &Path,
    dir: &str,
    rules: &IgnoreRules,
) -> Result<DirectoryState, StateError> {
    if !datasites.is_dir() {
        return Err(StateError::MissingRoot(datasites.to_path_buf()));
    }

    let start = sync_path::to_fs_path(datasites, dir);
    let mut state = DirectoryState::empty(dir);
    if !start.is_dir() {
        return Ok(state);
    }

    let walker = WalkDir::new(&start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            match sync_path::from_fs_path(datasites, entry.path()) {
                Some(path) => path == dir || !rules.is_ignored_dir(&path),
                None => true,
            }
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = sync_path::from_fs_path(datasites, entry.path()) else {
            tracing::debug!(path = %entry.path().display(), "skipping non utf-8 path");
            continue;
        };
        if rules.is_ignored_file(&path, dir) {
            continue;
        }

        let meta = file_metadata(datasites, &path).map_err(|source| StateError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;
        state.tree.insert(path, meta);
    }

    state.timestamp = Utc::now();
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, path: &str, contents: &[u8]) {
        let fs_path = sync_path::to_fs_path(root, path);
        std::fs::create_dir_all(fs_path.parent().unwrap()).unwrap();
        std::fs::write(fs_path, contents).unwrap();
    }

    #[test]
    fn test_hash_is_content_only() {
        assert_eq!(hash_bytes(b"same"), hash_bytes(b"same"));
        assert_ne!(hash_bytes(b"same"), hash_bytes(b"other"));
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_snapshot_skips_ignored() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(root, "a@x.org/file.txt", b"one");
        write(root, "a@x.org/sub/two.bin", b"two");
        write(root, "a@x.org/sub/.DS_Store", b"junk");
        write(root, "a@x.org/Icon\r", b"");
        write(root, "a@x.org/apps/cache.db", b"cache");
        write(root, "b@x.org/other.txt", b"other");

        let rules = IgnoreRules::new().with_folder("apps");
        let state = snapshot(root, "a@x.org", &rules).unwrap();

        let paths: Vec<_> = state.tree.keys().cloned().collect();
        assert_eq!(paths, vec!["a@x.org/file.txt", "a@x.org/sub/two.bin"]);
        assert_eq!(state.hash_of("a@x.org/file.txt"), Some(hash_bytes(b"one").as_str()));
        assert_eq!(state.get("a@x.org/sub/two.bin").unwrap().size, 3);
    }

    #[test]
    fn test_snapshot_missing_dir_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let state = snapshot(temp.path(), "nobody@x.org", &IgnoreRules::new()).unwrap();
        assert!(state.is_empty());

        let missing = temp.path().join("gone");
        assert!(matches!(
            snapshot(&missing, "a@x.org", &IgnoreRules::new()),
            Err(StateError::MissingRoot(_))
        ));
    }

    #[test]
    fn test_from_metadata_filters_root() {
        let state = DirectoryState::from_metadata(
            "a@x.org",
            vec![
                FileMetadata::from_bytes("a@x.org/f", b"1"),
                FileMetadata::from_bytes("b@x.org/f", b"2"),
            ],
        );
        assert_eq!(state.len(), 1);
        assert!(state.get("a@x.org/f").is_some());
    }
}
