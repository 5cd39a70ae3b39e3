//! Helpers for synced paths.
//!
//! Every synced path is relative to the datasites root and uses `/` as the
//! separator, e.g. `alice@example.org/shared/notes.txt`. The first component
//! is always the datasite the path belongs to.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path must be relative: {0}")]
    Absolute(String),
    #[error("invalid path component in: {0}")]
    InvalidComponent(String),
}

/// Normalize a user supplied path into the canonical synced form.
///
/// Backslashes are treated as separators, duplicate and trailing slashes
/// are collapsed. `.` and `..` components are rejected outright rather
/// than resolved.
pub fn normalize(path: &str) -> Result<String, PathError> {
    let unified = path.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(PathError::Absolute(path.to_string()));
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" => continue,
            "." | ".." => return Err(PathError::InvalidComponent(path.to_string())),
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(parts.join("/"))
}

/// The datasite (first component) of a normalized path.
pub fn datasite_of(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

/// The parent directory of a normalized path, `""` for top-level entries.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Whether `path` is `dir` itself or lies below it. The empty dir contains
/// everything.
pub fn is_within(path: &str, dir: &str) -> bool {
    if dir.is_empty() || path == dir {
        return true;
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

/// Directories enclosing `path`, nearest first, ending with `""`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut current = Some(path);
    std::iter::from_fn(move || {
        let here = current?;
        if here.is_empty() {
            current = None;
            return None;
        }
        let up = parent(here);
        current = Some(up);
        Some(up)
    })
}

pub fn to_fs_path(root: &Path, path: &str) -> PathBuf {
    path.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Convert an on-disk path below `root` back into synced form.
pub fn from_fs_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a//b/c/").unwrap(), "a/b/c");
        assert_eq!(normalize("a\\b").unwrap(), "a/b");
        assert_eq!(normalize("/a/b"), Err(PathError::Absolute("/a/b".into())));
        assert!(matches!(
            normalize("a/../b"),
            Err(PathError::InvalidComponent(_))
        ));
        assert_eq!(normalize("//"), Err(PathError::Absolute("//".into())));
        assert_eq!(normalize(""), Err(PathError::Empty));
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("a/b/c.txt"), "a/b");
        assert_eq!(parent("a"), "");
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(datasite_of("alice@x.org/b"), "alice@x.org");
    }

    #[test]
    fn test_ancestors() {
        let ancestors: Vec<_> = ancestors("a/b/c").collect();
        assert_eq!(ancestors, vec!["a/b", "a", ""]);
        assert_eq!(super::ancestors("a").collect::<Vec<_>>(), vec![""]);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("a/b/c", "a/b"));
        assert!(is_within("a/b", "a/b"));
        assert!(!is_within("a/bc", "a/b"));
        assert!(is_within("anything", ""));
    }

    #[test]
    fn test_fs_round_trip() {
        let root = Path::new("/tmp/root");
        let fs = to_fs_path(root, "a/b/c.txt");
        assert_eq!(fs, PathBuf::from("/tmp/root/a/b/c.txt"));
        assert_eq!(from_fs_path(root, &fs).unwrap(), "a/b/c.txt");
        assert_eq!(from_fs_path(root, root), None);
    }
}
