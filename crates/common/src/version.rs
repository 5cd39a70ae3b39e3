use serde::{Deserialize, Serialize};

/// Compile-time information about the running build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub build_profile: String,
    pub build_features: String,
    pub build_timestamp: String,
    pub version: String,
}

impl BuildInfo {
    pub fn new() -> Self {
        Self {
            build_profile: env!("BUILD_PROFILE").to_string(),
            build_features: env!("BUILD_FEATURES").to_string(),
            build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
            version: env!("REPO_VERSION").to_string(),
        }
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "syncbox {} ({} build, features: {}, built {})",
            self.version, self.build_profile, self.build_features, self.build_timestamp
        )
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::new()
}

#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::build_info()
    };
}
