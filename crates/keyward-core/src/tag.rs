//! Tagged reverse-index entries.
//!
//! A [`GrantTag`] is what the volume reverse index stores: which access key
//! holds which grant on the volume. Its string form is
//! `<access_key>_<action>`, with the reserved [`WILDCARD`] action standing
//! for full ownership. Access keys are alphanumeric, so the first
//! [`SEPARATOR`] always splits the two halves unambiguously.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reserved action token denoting full ownership of a volume.
pub const WILDCARD: &str = "all";

/// Separator between access key and action in a tag's string form.
pub const SEPARATOR: char = '_';

/// The grant half of a tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrantAction {
    /// Full ownership of the volume.
    Owner,
    /// A single named action on the volume.
    Action(String),
}

impl GrantAction {
    /// The token used in tag strings and error messages.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Owner => WILDCARD,
            Self::Action(name) => name,
        }
    }
}

impl From<&str> for GrantAction {
    fn from(token: &str) -> Self {
        if token == WILDCARD {
            Self::Owner
        } else {
            Self::Action(token.to_string())
        }
    }
}

/// One reverse-index entry: an access key and the grant it holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct GrantTag {
    /// Access key of the credential holding the grant.
    pub access_key: String,
    /// The grant held.
    pub action: GrantAction,
}

impl GrantTag {
    /// Tag for full ownership.
    pub fn owner(access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            action: GrantAction::Owner,
        }
    }

    /// Tag for a single named action.
    pub fn action(access_key: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            action: GrantAction::Action(action.into()),
        }
    }

    /// Whether this tag denotes full ownership.
    pub fn is_owner(&self) -> bool {
        self.action == GrantAction::Owner
    }
}

impl fmt::Display for GrantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.access_key, SEPARATOR, self.action.as_str())
    }
}

impl FromStr for GrantTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(SEPARATOR) {
            Some((access_key, action)) if !access_key.is_empty() && !action.is_empty() => {
                Ok(Self {
                    access_key: access_key.to_string(),
                    action: GrantAction::from(action),
                })
            }
            _ => Err(Error::serialization(format!("malformed grant tag: {s:?}"))),
        }
    }
}

impl From<GrantTag> for String {
    fn from(tag: GrantTag) -> Self {
        tag.to_string()
    }
}

impl TryFrom<String> for GrantTag {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_tag_string_form() {
        let tag = GrantTag::owner("AKIA0123");
        assert_eq!(tag.to_string(), "AKIA0123_all");
        assert!(tag.is_owner());
    }

    #[test]
    fn test_action_tag_keeps_separators_in_action() {
        let tag: GrantTag = "AK9_action:oss:Put_Object".parse().unwrap();
        assert_eq!(tag.access_key, "AK9");
        assert_eq!(
            tag.action,
            GrantAction::Action("action:oss:Put_Object".into())
        );
    }

    #[test]
    fn test_wildcard_parses_to_owner() {
        let tag: GrantTag = "AK9_all".parse().unwrap();
        assert_eq!(tag, GrantTag::owner("AK9"));
    }

    #[test]
    fn test_malformed_tags_rejected() {
        assert!("noseparator".parse::<GrantTag>().is_err());
        assert!("_read".parse::<GrantTag>().is_err());
        assert!("AK_".parse::<GrantTag>().is_err());
    }

    #[test]
    fn test_tag_serializes_as_string() {
        let tag = GrantTag::action("AK1", "read");
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"AK1_read\"");
        let back: GrantTag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }
}
