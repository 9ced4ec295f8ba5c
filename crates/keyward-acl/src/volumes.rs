//! The volume → grant reverse index.
//!
//! For each volume, an ordered list of [`GrantTag`]s naming which access keys
//! hold which grants on it. The list is derived from the credentials'
//! policies and maintained incrementally: a policy change stages the
//! post-change lists of the volumes it touched, and those lists ride in the
//! same durable record as the policy itself.
//!
//! # Locking
//!
//! A coarse index lock is taken shared by every per-volume mutation and
//! exclusively only by clear/replay. Each volume additionally has its own
//! mutex, so changes to different volumes never contend while changes to
//! the same volume serialize.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use keyward_core::{Error, GrantSet, GrantTag, Result};
use log::{info, warn};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::gateway::{ReplicationGateway, commit};
use crate::locks::{KeyGuard, LockRegistry};
use crate::operation::{Operation, VolumeGrantEntry};

/// Locks held on a set of volumes for the duration of one mutation.
pub(crate) struct VolumeLease<'a> {
    _index: RwLockReadGuard<'a, ()>,
    _volumes: Vec<KeyGuard>,
}

/// Reverse index from volume name to tagged grants.
pub struct VolumeGrantIndex {
    gateway: Arc<dyn ReplicationGateway>,
    entries: DashMap<String, Vec<GrantTag>>,
    index_lock: RwLock<()>,
    volume_locks: LockRegistry,
}

impl VolumeGrantIndex {
    pub(crate) fn new(gateway: Arc<dyn ReplicationGateway>) -> Self {
        Self {
            gateway,
            entries: DashMap::new(),
            index_lock: RwLock::new(()),
            volume_locks: LockRegistry::new(),
        }
    }

    /// The tagged grants on `volume`, in insertion order.
    pub fn grants(&self, volume: &str) -> Result<Vec<GrantTag>> {
        self.entries
            .get(volume)
            .map(|list| list.value().clone())
            .ok_or_else(|| Error::NoSuchVolumePolicy(volume.to_string()))
    }

    /// Whether `volume` lists `tag`.
    pub fn contains(&self, volume: &str, tag: &GrantTag) -> bool {
        self.entries
            .get(volume)
            .is_some_and(|list| list.contains(tag))
    }

    /// Tracked volume names, sorted.
    pub fn volumes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Append `tag` to `volume`'s list, creating the list if needed.
    ///
    /// Low-level: this does not touch any credential's policy, so callers
    /// are responsible for keeping the two in step. Adding a tag that is
    /// already listed is a no-op and proposes nothing.
    pub async fn add_entry(&self, volume: &str, tag: GrantTag) -> Result<()> {
        let _lease = self.lease([volume]).await;
        let mut list = self.entries.get(volume).map(|l| l.value().clone()).unwrap_or_default();
        if list.contains(&tag) {
            return Ok(());
        }
        list.push(tag);
        let entry = VolumeGrantEntry {
            volume: volume.to_string(),
            grants: list,
        };
        commit(
            self.gateway.as_ref(),
            &Operation::PutVolumeGrants {
                entry: entry.clone(),
            },
        )
        .await?;
        self.apply_entry(&entry);
        Ok(())
    }

    /// Remove the first occurrence of `tag` from `volume`'s list.
    ///
    /// Fails with [`Error::NoSuchGrant`] when the volume is untracked and
    /// with [`Error::InconsistentIndex`] when the list lacks the tag.
    pub async fn remove_entry(&self, volume: &str, tag: &GrantTag) -> Result<()> {
        let _lease = self.lease([volume]).await;
        let mut list = self
            .entries
            .get(volume)
            .map(|l| l.value().clone())
            .ok_or_else(|| Error::NoSuchGrant {
                access_key: tag.access_key.clone(),
                volume: volume.to_string(),
                grant: tag.action.as_str().to_string(),
            })?;
        let pos = list
            .iter()
            .position(|t| t == tag)
            .ok_or_else(|| Error::InconsistentIndex {
                volume: volume.to_string(),
                tag: tag.to_string(),
            })?;
        list.remove(pos);
        self.commit_list(volume, list).await
    }

    /// Take the shared index lock plus the locks of `volumes`.
    pub(crate) async fn lease<'v, I>(&self, volumes: I) -> VolumeLease<'_>
    where
        I: IntoIterator<Item = &'v str>,
    {
        let index = self.index_lock.read().await;
        let guards = self.volume_locks.lock_all(volumes).await;
        VolumeLease {
            _index: index,
            _volumes: guards,
        }
    }

    /// Take the index lock exclusively, excluding every volume mutation.
    pub(crate) async fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.index_lock.write().await
    }

    /// Post-change lists for every volume whose tags differ between
    /// `before` and `after` for `access_key`.
    ///
    /// Callers must hold a lease on every volume either set mentions. A tag
    /// that should be removed but is not listed is an index anomaly: it is
    /// logged and skipped rather than failing the policy change.
    pub(crate) fn stage(
        &self,
        access_key: &str,
        before: &GrantSet,
        after: &GrantSet,
    ) -> Vec<VolumeGrantEntry> {
        let old_tags = before.tags(access_key);
        let new_tags = after.tags(access_key);
        let empty = BTreeSet::new();
        let touched: BTreeSet<&String> = old_tags.keys().chain(new_tags.keys()).collect();

        let mut staged = Vec::new();
        for volume in touched {
            let old = old_tags.get(volume).unwrap_or(&empty);
            let new = new_tags.get(volume).unwrap_or(&empty);
            if old == new {
                continue;
            }
            let mut list = self.entries.get(volume).map(|l| l.value().clone()).unwrap_or_default();
            for tag in old.difference(new) {
                match list.iter().position(|t| t == tag) {
                    Some(pos) => {
                        list.remove(pos);
                    }
                    None => warn!(
                        "Grant index inconsistency: volume '{volume}' has no entry '{tag}'"
                    ),
                }
            }
            for tag in new.difference(old) {
                if !list.contains(tag) {
                    list.push(tag.clone());
                }
            }
            staged.push(VolumeGrantEntry {
                volume: volume.clone(),
                grants: list,
            });
        }
        staged
    }

    /// Drop `stale` tags from `volume`, deleting the list if nothing remains.
    ///
    /// Tags not in `stale` are kept, so grants that arrived after the caller
    /// read the list survive. Untracked volumes are left alone.
    pub(crate) async fn sweep(&self, volume: &str, stale: &[GrantTag]) -> Result<()> {
        let _lease = self.lease([volume]).await;
        let Some(current) = self.entries.get(volume).map(|l| l.value().clone()) else {
            return Ok(());
        };
        let list: Vec<GrantTag> = current
            .iter()
            .filter(|t| !stale.contains(t))
            .cloned()
            .collect();
        if list.len() == current.len() && !list.is_empty() {
            return Ok(());
        }
        self.commit_list(volume, list).await?;
        info!("action[purge_volume] swept volume '{volume}'");
        Ok(())
    }

    /// Propose and apply a volume's new list. Callers hold its lease.
    async fn commit_list(&self, volume: &str, list: Vec<GrantTag>) -> Result<()> {
        let op = if list.is_empty() {
            Operation::DeleteVolumeGrants {
                volume: volume.to_string(),
            }
        } else {
            Operation::PutVolumeGrants {
                entry: VolumeGrantEntry {
                    volume: volume.to_string(),
                    grants: list.clone(),
                },
            }
        };
        commit(self.gateway.as_ref(), &op).await?;
        self.apply_entry(&VolumeGrantEntry {
            volume: volume.to_string(),
            grants: list,
        });
        Ok(())
    }

    /// Install a committed list; an empty list untracks the volume.
    pub(crate) fn apply_entry(&self, entry: &VolumeGrantEntry) {
        if entry.grants.is_empty() {
            self.entries.remove(&entry.volume);
        } else {
            self.entries
                .insert(entry.volume.clone(), entry.grants.clone());
        }
    }

    pub(crate) fn apply_delete(&self, volume: &str) {
        self.entries.remove(volume);
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn held_locks(&self) -> usize {
        self.volume_locks.len()
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, Vec<GrantTag>> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
