use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use super::RpcError;
use crate::sync_path;

pub const SCHEME: &str = "syft://";

// constant pattern, checked by the parsing tests
static SYFT_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^syft://(?P<datasite>[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+)(?P<path>/.*)?$")
        .expect("syft url regex")
});

/// Address of a directory inside some datasite: `syft://<datasite>/<path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct SyftUrl {
    datasite: String,
    /// Normalized path below the datasite, empty for the datasite root.
    path: String,
}

impl SyftUrl {
    pub fn new(datasite: &str, path: &str) -> Result<Self, RpcError> {
        format!("{}{}/{}", SCHEME, datasite, path.trim_start_matches('/')).parse()
    }

    pub fn datasite(&self) -> &str {
        &self.datasite
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Synced path of the addressed directory, e.g. `a@x.org/api/rpc`.
    pub fn sync_path(&self) -> String {
        if self.path.is_empty() {
            self.datasite.clone()
        } else {
            sync_path::join(&self.datasite, &self.path)
        }
    }

    pub fn to_local_path(&self, datasites: &Path) -> PathBuf {
        sync_path::to_fs_path(datasites, &self.sync_path())
    }

    /// Inverse of [`to_local_path`](Self::to_local_path).
    pub fn from_local_path(datasites: &Path, path: &Path) -> Result<Self, RpcError> {
        let synced = sync_path::from_fs_path(datasites, path)
            .ok_or_else(|| RpcError::InvalidUrl(path.display().to_string()))?;
        let datasite = sync_path::datasite_of(&synced);
        let rest = synced[datasite.len()..].trim_start_matches('/');
        Self::new(datasite, rest)
    }
}

impl FromStr for SyftUrl {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = SYFT_URL_REGEX
            .captures(s)
            .ok_or_else(|| RpcError::InvalidUrl(s.to_string()))?;
        let datasite = captures["datasite"].to_string();
        let raw_path = captures
            .name("path")
            .map(|m| m.as_str().trim_matches('/'))
            .unwrap_or_default();
        let path = if raw_path.is_empty() {
            String::new()
        } else {
            sync_path::normalize(raw_path)
                .map_err(|e| RpcError::InvalidUrl(format!("{}: {}", s, e)))?
        };
        Ok(Self { datasite, path })
    }
}

impl fmt::Display for SyftUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}{}", SCHEME, self.datasite)
        } else {
            write!(f, "{}{}/{}", SCHEME, self.datasite, self.path)
        }
    }
}
