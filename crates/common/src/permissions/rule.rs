use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{PermissionError, GLOBAL};

/// Effective access of one identity on one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_read: bool,
    pub can_write: bool,
    pub can_admin: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            can_read: true,
            can_write: true,
            can_admin: true,
        }
    }
}

/// Contents of a single permission file.
///
/// `admin` and `write` are independent grants. Admins implicitly read and
/// write; writers implicitly read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionRule {
    #[serde(default)]
    pub admin: BTreeSet<String>,
    #[serde(default)]
    pub read: BTreeSet<String>,
    #[serde(default)]
    pub write: BTreeSet<String>,
    /// Ignore any rule below this one.
    #[serde(default)]
    pub terminal: bool,
    /// Directory this rule applies to. Derived from where the file lives,
    /// never read from its contents.
    #[serde(skip)]
    pub dir: String,
}

impl PermissionRule {
    /// Parse and validate permission file contents.
    pub fn parse(bytes: &[u8]) -> Result<Self, PermissionError> {
        let rule: PermissionRule = serde_json::from_slice(bytes)
            .map_err(|e| PermissionError::InvalidFile(e.to_string()))?;
        rule.validate()?;
        Ok(rule)
    }

    fn validate(&self) -> Result<(), PermissionError> {
        let identities = self.admin.iter().chain(&self.read).chain(&self.write);
        for identity in identities {
            if identity.trim().is_empty() || identity.contains(char::is_whitespace) {
                return Err(PermissionError::InvalidFile(format!(
                    "invalid identity {:?}",
                    identity
                )));
            }
        }
        Ok(())
    }

    /// Only the owner may do anything.
    pub fn owner_only(owner: &str) -> Self {
        Self {
            admin: BTreeSet::from([owner.to_string()]),
            read: BTreeSet::from([owner.to_string()]),
            write: BTreeSet::from([owner.to_string()]),
            ..Default::default()
        }
    }

    /// Owner administers, everyone reads.
    pub fn public_read(owner: &str) -> Self {
        let mut rule = Self::owner_only(owner);
        rule.read.insert(GLOBAL.to_string());
        rule
    }

    pub fn with_read(mut self, identity: &str) -> Self {
        self.read.insert(identity.to_string());
        self
    }

    pub fn with_write(mut self, identity: &str) -> Self {
        self.write.insert(identity.to_string());
        self
    }

    pub fn with_admin(mut self, identity: &str) -> Self {
        self.admin.insert(identity.to_string());
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // a struct of sets and a bool always serializes
        serde_json::to_vec_pretty(self).unwrap_or_default()
    }

    pub fn capabilities_for(&self, identity: &str) -> Capabilities {
        let grants = |set: &BTreeSet<String>| set.contains(identity) || set.contains(GLOBAL);
        let can_admin = grants(&self.admin);
        let can_write = can_admin || grants(&self.write);
        let can_read = can_write || grants(&self.read);
        Capabilities {
            can_read,
            can_write,
            can_admin,
        }
    }
}

/// Whether `bytes` is a structurally valid permission file.
pub fn is_valid(bytes: &[u8]) -> bool {
    PermissionRule::parse(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let rule = PermissionRule::parse(
            br#"{"admin": ["a@x.org"], "read": ["GLOBAL"], "write": [], "filepath": "x/_.syftperm"}"#,
        )
        .unwrap();
        assert!(rule.admin.contains("a@x.org"));
        assert!(!rule.terminal);
        assert_eq!(rule.dir, "");
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid(br#"{}"#));
        assert!(is_valid(&PermissionRule::public_read("a@x.org").to_bytes()));
        assert!(!is_valid(b"not json"));
        assert!(!is_valid(br#"{"admin": "a@x.org"}"#));
        assert!(!is_valid(br#"{"read": [""]}"#));
        assert!(!is_valid(br#"[1, 2]"#));
    }

    #[test]
    fn test_capabilities() {
        let rule = PermissionRule::default()
            .with_admin("admin@x.org")
            .with_write("writer@x.org")
            .with_read("reader@x.org");

        assert_eq!(rule.capabilities_for("admin@x.org"), Capabilities::all());

        let writer = rule.capabilities_for("writer@x.org");
        assert!(writer.can_write && writer.can_read && !writer.can_admin);

        let reader = rule.capabilities_for("reader@x.org");
        assert!(reader.can_read && !reader.can_write);

        assert_eq!(rule.capabilities_for("nobody@x.org"), Capabilities::none());
    }

    #[test]
    fn test_global_matches_anyone() {
        let rule = PermissionRule::public_read("a@x.org");
        let caps = rule.capabilities_for("stranger@y.org");
        assert!(caps.can_read);
        assert!(!caps.can_write);
    }
}
