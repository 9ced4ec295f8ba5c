//! Credential records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::GrantSet;

/// One owner's credential and the policy attached to it.
///
/// `access_key` and `secret_key` never change after creation; only `grants`
/// is replaced, and only by a committed policy update. The secret key is
/// redacted from `Debug` output so records can be logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Owning account.
    pub owner: String,
    /// Globally unique access key.
    pub access_key: String,
    /// Secret disclosed only to the owner.
    pub secret_key: String,
    /// Volume permissions.
    #[serde(default)]
    pub grants: GrantSet,
}

impl CredentialRecord {
    /// A record with an empty policy.
    pub fn new(
        owner: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            grants: GrantSet::new(),
        }
    }

    /// This record with its policy replaced.
    pub fn with_grants(&self, grants: GrantSet) -> Self {
        Self {
            grants,
            ..self.clone()
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("owner", &self.owner)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("grants", &self.grants)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let record = CredentialRecord::new("alice", "AK1", "s3cr3tValue");
        let debug = format!("{record:?}");
        assert!(debug.contains("alice"));
        assert!(debug.contains("AK1"));
        assert!(!debug.contains("s3cr3tValue"));
    }

    #[test]
    fn test_with_grants_keeps_keys() {
        let record = CredentialRecord::new("alice", "AK1", "SK1");
        let updated = record.with_grants(GrantSet::new().with_owned("vol1"));
        assert_eq!(updated.access_key, "AK1");
        assert_eq!(updated.secret_key, "SK1");
        assert!(updated.grants.owns("vol1"));
        assert!(record.grants.is_empty());
    }

    #[test]
    fn test_missing_grants_deserialize_empty() {
        let json = r#"{"owner":"bob","access_key":"AK2","secret_key":"SK2"}"#;
        let record: CredentialRecord = serde_json::from_str(json).unwrap();
        assert!(record.grants.is_empty());
    }
}
