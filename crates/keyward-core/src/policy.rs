//! The grant-set algebra.
//!
//! A [`GrantSet`] is the policy attached to one credential: a set of volumes
//! the credential fully owns, plus per-volume sets of named actions on
//! volumes it does not own. Both operations, [`GrantSet::merge`] and
//! [`GrantSet::subtract`], are pure and return a normalized value; the
//! stored policy of a credential is only ever replaced wholesale by one of
//! their results.
//!
//! # Normalization
//!
//! Ownership implies every action, so a volume never appears in both
//! collections: when a volume is owned, its scoped entry is dropped. A scoped
//! entry that happens to list many actions is never promoted to ownership,
//! since actions are open-ended names rather than a closed vocabulary.
//! Empty scoped entries are dropped as well.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::tag::{GrantAction, GrantTag, WILDCARD};
use crate::{Error, Result};

/// Volume permissions held by one credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GrantSetRepr", into = "GrantSetRepr")]
pub struct GrantSet {
    owned: BTreeSet<String>,
    scoped: BTreeMap<String, BTreeSet<String>>,
}

/// Wire shape; normalized on the way in.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GrantSetRepr {
    own_volumes: BTreeSet<String>,
    scoped_actions: BTreeMap<String, BTreeSet<String>>,
}

impl From<GrantSetRepr> for GrantSet {
    fn from(repr: GrantSetRepr) -> Self {
        let mut set = Self {
            owned: repr.own_volumes,
            scoped: repr.scoped_actions,
        };
        set.normalize();
        set
    }
}

impl From<GrantSet> for GrantSetRepr {
    fn from(set: GrantSet) -> Self {
        Self {
            own_volumes: set.owned,
            scoped_actions: set.scoped,
        }
    }
}

impl GrantSet {
    /// An empty grant set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this set with full ownership of `volume` added.
    ///
    /// Builder for constructing deltas; equivalent to merging a single-volume
    /// ownership grant.
    pub fn with_owned(mut self, volume: impl Into<String>) -> Self {
        let volume = volume.into();
        self.scoped.remove(&volume);
        self.owned.insert(volume);
        self
    }

    /// Returns this set with `action` on `volume` added.
    ///
    /// Has no effect on a volume this set already owns.
    pub fn with_action(mut self, volume: impl Into<String>, action: impl Into<String>) -> Self {
        let volume = volume.into();
        if !self.owned.contains(&volume) {
            self.scoped.entry(volume).or_default().insert(action.into());
        }
        self
    }

    /// Volumes fully owned, in name order.
    pub fn owned_volumes(&self) -> impl Iterator<Item = &str> {
        self.owned.iter().map(String::as_str)
    }

    /// Scoped action sets, keyed by volume.
    pub fn scoped_actions(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.scoped
    }

    /// Whether the set fully owns `volume`.
    pub fn owns(&self, volume: &str) -> bool {
        self.owned.contains(volume)
    }

    /// Whether `action` is permitted on `volume`, by ownership or scope.
    pub fn allows(&self, volume: &str, action: &str) -> bool {
        self.owns(volume)
            || self
                .scoped
                .get(volume)
                .is_some_and(|actions| actions.contains(action))
    }

    /// Whether the set grants nothing.
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty() && self.scoped.is_empty()
    }

    /// Every volume the set mentions.
    pub fn volumes(&self) -> BTreeSet<&str> {
        self.owned
            .iter()
            .chain(self.scoped.keys())
            .map(String::as_str)
            .collect()
    }

    /// Union of `self` and `delta`, normalized.
    pub fn merge(&self, delta: &GrantSet) -> GrantSet {
        let mut merged = self.clone();
        merged.owned.extend(delta.owned.iter().cloned());
        for (volume, actions) in &delta.scoped {
            merged
                .scoped
                .entry(volume.clone())
                .or_default()
                .extend(actions.iter().cloned());
        }
        merged.normalize();
        merged
    }

    /// `self` with every grant in `delta` removed, normalized.
    ///
    /// Scoped removals only touch scoped entries: removing an action from a
    /// volume that is owned outright leaves the ownership in place.
    pub fn subtract(&self, delta: &GrantSet) -> GrantSet {
        let mut remaining = self.clone();
        for volume in &delta.owned {
            remaining.owned.remove(volume);
        }
        for (volume, actions) in &delta.scoped {
            if let Some(held) = remaining.scoped.get_mut(volume) {
                for action in actions {
                    held.remove(action);
                }
            }
        }
        remaining.normalize();
        remaining
    }

    /// The first grant in `delta` that [`subtract`](Self::subtract) would
    /// have nothing to remove for, as `(volume, action)`.
    pub fn first_missing(&self, delta: &GrantSet) -> Option<(String, GrantAction)> {
        if let Some(volume) = delta.owned.iter().find(|v| !self.owned.contains(*v)) {
            return Some((volume.clone(), GrantAction::Owner));
        }
        for (volume, actions) in &delta.scoped {
            let held = self.scoped.get(volume);
            if let Some(action) = actions
                .iter()
                .find(|a| !held.is_some_and(|h| h.contains(*a)))
            {
                return Some((volume.clone(), GrantAction::Action(action.clone())));
            }
        }
        None
    }

    /// Reverse-index tags implied by this set for `access_key`, per volume.
    pub fn tags(&self, access_key: &str) -> BTreeMap<String, BTreeSet<GrantTag>> {
        let mut tags: BTreeMap<String, BTreeSet<GrantTag>> = BTreeMap::new();
        for volume in &self.owned {
            tags.entry(volume.clone())
                .or_default()
                .insert(GrantTag::owner(access_key));
        }
        for (volume, actions) in &self.scoped {
            let entry = tags.entry(volume.clone()).or_default();
            for action in actions {
                entry.insert(GrantTag::action(access_key, action.clone()));
            }
        }
        tags
    }

    /// The single grant a tag denotes, as a delta.
    pub fn from_tag(volume: &str, tag: &GrantTag) -> GrantSet {
        match &tag.action {
            GrantAction::Owner => GrantSet::new().with_owned(volume),
            GrantAction::Action(action) => GrantSet::new().with_action(volume, action.clone()),
        }
    }

    /// Check names: volumes and actions non-empty, actions not the wildcard.
    pub fn validate(&self) -> Result<()> {
        for volume in self.volumes() {
            if volume.is_empty() {
                return Err(Error::invalid_policy("volume name must not be empty"));
            }
        }
        for (volume, actions) in &self.scoped {
            for action in actions {
                if action.is_empty() {
                    return Err(Error::invalid_policy(format!(
                        "empty action name on volume '{volume}'"
                    )));
                }
                if action == WILDCARD {
                    return Err(Error::invalid_policy(format!(
                        "'{WILDCARD}' is reserved for ownership (volume '{volume}')"
                    )));
                }
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        let owned = &self.owned;
        self.scoped
            .retain(|volume, actions| !owned.contains(volume) && !actions.is_empty());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alice_policy() -> GrantSet {
        GrantSet::new()
            .with_owned("vol1")
            .with_action("vol2", "read")
            .with_action("vol2", "list")
    }

    #[test]
    fn test_merge_unions_actions() {
        let base = GrantSet::new().with_action("vol2", "read");
        let merged = base.merge(&GrantSet::new().with_action("vol2", "write"));
        let actions: Vec<_> = merged.scoped_actions()["vol2"].iter().cloned().collect();
        assert_eq!(actions, vec!["read", "write"]);
    }

    #[test]
    fn test_merge_ownership_drops_scoped_entry() {
        let merged = alice_policy().merge(&GrantSet::new().with_owned("vol2"));
        assert!(merged.owns("vol2"));
        assert!(!merged.scoped_actions().contains_key("vol2"));
        assert!(merged.allows("vol2", "read"));
    }

    #[test]
    fn test_with_action_ignored_on_owned_volume() {
        let set = GrantSet::new().with_owned("vol1").with_action("vol1", "read");
        assert!(set.scoped_actions().is_empty());
    }

    #[test]
    fn test_subtract_drops_empty_entries() {
        let remaining = alice_policy().subtract(
            &GrantSet::new()
                .with_action("vol2", "read")
                .with_action("vol2", "list"),
        );
        assert_eq!(remaining, GrantSet::new().with_owned("vol1"));
    }

    #[test]
    fn test_subtract_scoped_leaves_ownership() {
        let remaining = alice_policy().subtract(&GrantSet::new().with_action("vol1", "read"));
        assert!(remaining.owns("vol1"));
    }

    #[test]
    fn test_first_missing() {
        let policy = alice_policy();
        assert_eq!(policy.first_missing(&GrantSet::new().with_owned("vol1")), None);
        assert_eq!(
            policy.first_missing(&GrantSet::new().with_owned("vol2")),
            Some(("vol2".into(), GrantAction::Owner))
        );
        assert_eq!(
            policy.first_missing(&GrantSet::new().with_action("vol1", "read")),
            Some(("vol1".into(), GrantAction::Action("read".into())))
        );
    }

    #[test]
    fn test_tags_per_volume() {
        let tags = alice_policy().tags("AK1");
        assert_eq!(tags.len(), 2);
        assert!(tags["vol1"].contains(&GrantTag::owner("AK1")));
        assert_eq!(tags["vol2"].len(), 2);
        assert!(tags["vol2"].contains(&GrantTag::action("AK1", "list")));
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(
            GrantSet::from_tag("vol3", &GrantTag::owner("AK")),
            GrantSet::new().with_owned("vol3")
        );
        assert_eq!(
            GrantSet::from_tag("vol3", &GrantTag::action("AK", "get")),
            GrantSet::new().with_action("vol3", "get")
        );
    }

    #[test]
    fn test_validate_rejects_reserved_and_empty_names() {
        assert!(alice_policy().validate().is_ok());
        assert!(
            GrantSet::new()
                .with_action("vol", WILDCARD)
                .validate()
                .is_err()
        );
        assert!(GrantSet::new().with_action("vol", "").validate().is_err());
        assert!(GrantSet::new().with_owned("").validate().is_err());
    }

    #[test]
    fn test_deserialize_normalizes() {
        let json = r#"{"own_volumes":["vol1"],"scoped_actions":{"vol1":["read"],"vol2":[]}}"#;
        let set: GrantSet = serde_json::from_str(json).unwrap();
        assert_eq!(set, GrantSet::new().with_owned("vol1"));
    }

    #[test]
    fn test_serialize_shape() {
        let json = serde_json::to_value(alice_policy()).unwrap();
        assert_eq!(json["own_volumes"][0], "vol1");
        assert_eq!(json["scoped_actions"]["vol2"][1], "read");
    }

    fn grant_set_strategy() -> impl Strategy<Value = GrantSet> {
        let volume = prop::sample::select(vec!["vol1", "vol2", "vol3", "vol4"]);
        let action = prop::sample::select(vec!["read", "write", "list", "delete"]);
        (
            prop::collection::vec(volume.clone(), 0..3),
            prop::collection::vec((volume, action), 0..6),
        )
            .prop_map(|(owned, scoped)| {
                let mut set = GrantSet::new();
                for (volume, action) in scoped {
                    set = set.with_action(volume, action);
                }
                for volume in owned {
                    set = set.with_owned(volume);
                }
                set
            })
    }

    proptest! {
        #[test]
        fn prop_merge_is_normalized(a in grant_set_strategy(), b in grant_set_strategy()) {
            let merged = a.merge(&b);
            for volume in merged.owned_volumes() {
                prop_assert!(!merged.scoped_actions().contains_key(volume));
            }
            prop_assert!(merged.scoped_actions().values().all(|s| !s.is_empty()));
        }

        #[test]
        fn prop_merge_commutes(a in grant_set_strategy(), b in grant_set_strategy()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn prop_merge_idempotent(a in grant_set_strategy(), b in grant_set_strategy()) {
            let once = a.merge(&b);
            prop_assert_eq!(once.merge(&b), once);
        }

        #[test]
        fn prop_subtract_undoes_disjoint_merge(
            a in grant_set_strategy(),
            b in grant_set_strategy(),
        ) {
            let shared = a.volumes().intersection(&b.volumes()).count();
            prop_assume!(shared == 0);
            prop_assert_eq!(a.merge(&b).subtract(&b), a);
        }

        #[test]
        fn prop_held_grants_are_never_missing(a in grant_set_strategy()) {
            prop_assert_eq!(a.first_missing(&a), None);
        }
    }
}
