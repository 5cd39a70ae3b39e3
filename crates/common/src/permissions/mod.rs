//! # Permissions
//!
//! Access to synced paths is governed by permission files (`_.syftperm`)
//! placed in any directory of a datasite. Each file holds a single
//! [`PermissionRule`] listing the identities that may administer, read and
//! write everything at or below that directory.
//!
//! ## Resolution
//!
//! The rule that applies to a path is the one in the nearest enclosing
//! directory (the path itself included). Rules never merge across levels:
//! a deeper rule fully replaces its ancestors. A rule flagged `terminal`
//! stops the walk, so any rule below it is ignored.
//!
//! The reserved identity [`GLOBAL`] matches every identity.
//!
//! ## Parse modes
//!
//! A [`PermissionTree`] can be built in [`ParseMode::BestEffort`], where a
//! malformed permission file is skipped with a warning, or in
//! [`ParseMode::Strict`], where it fails the whole build with
//! [`PermissionError::CorruptPermissionTree`]. Servers validating incoming
//! writes use the strict mode.

mod rule;
mod tree;

pub use rule::{is_valid, Capabilities, PermissionRule};
pub use tree::{ParseMode, PermissionTree};

/// File name of a permission file.
pub const PERMISSION_FILE_NAME: &str = "_.syftperm";

/// Wildcard identity matching anyone.
pub const GLOBAL: &str = "GLOBAL";

/// Whether a synced path points at a permission file.
pub fn is_permission_file(path: &str) -> bool {
    crate::sync_path::file_name(path) == PERMISSION_FILE_NAME
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("corrupt permission tree at {path}: {reason}")]
    CorruptPermissionTree { path: String, reason: String },

    #[error("invalid permission file: {0}")]
    InvalidFile(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
