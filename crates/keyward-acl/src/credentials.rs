//! The credential index.
//!
//! Owns the access key → record map and the owner → access key map, and
//! drives every credential and policy mutation through the replication
//! gateway. Each mutation follows the same discipline:
//!
//! 1. take the locks that make its check-then-act sequence atomic,
//! 2. validate against in-memory state and compute the post-change state,
//! 3. propose a single durable record describing that state,
//! 4. only after the proposal commits, install the state in memory.
//!
//! A failed proposal therefore leaves both this index and the volume index
//! untouched.
//!
//! # Lock order
//!
//! access-key lock → owner lock → per-credential lock → volume index lock →
//! per-volume locks (sorted by name). Creation and revocation take the two
//! coarse locks exclusively; policy changes take the access-key lock shared,
//! so they cannot interleave with a revocation of the same credential, and
//! serialize per credential through the per-credential lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use keyward_core::{
    CredentialRecord, Error, GrantSet, KeyGenerator, Result, WILDCARD, validate_key,
};
use log::{error, info, warn};
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::gateway::{ReplicationGateway, commit};
use crate::locks::LockRegistry;
use crate::operation::Operation;
use crate::volumes::VolumeGrantIndex;

/// Exclusive hold on both coarse credential locks.
pub(crate) struct CredentialsExclusive<'a> {
    _keys: RwLockWriteGuard<'a, ()>,
    _owners: RwLockWriteGuard<'a, ()>,
}

/// Access key → credential and owner → access key maps.
pub struct CredentialIndex {
    gateway: Arc<dyn ReplicationGateway>,
    keygen: KeyGenerator,
    by_key: DashMap<String, CredentialRecord>,
    by_owner: DashMap<String, String>,
    key_lock: RwLock<()>,
    owner_lock: RwLock<()>,
    credential_locks: LockRegistry,
}

impl CredentialIndex {
    pub(crate) fn new(gateway: Arc<dyn ReplicationGateway>, keygen: KeyGenerator) -> Self {
        Self {
            gateway,
            keygen,
            by_key: DashMap::new(),
            by_owner: DashMap::new(),
            key_lock: RwLock::new(()),
            owner_lock: RwLock::new(()),
            credential_locks: LockRegistry::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Creation and revocation
    // ------------------------------------------------------------------------

    /// Issue a credential with system-generated keys.
    ///
    /// Regenerates the access key until it collides with no existing one.
    /// Both coarse locks are held from the duplicate check through the
    /// in-memory insert, so no concurrent creation can claim the same owner
    /// or access key in between.
    pub async fn create_generated_credential(&self, owner: &str) -> Result<CredentialRecord> {
        validate_owner(owner)?;
        let _keys = self.key_lock.write().await;
        let _owners = self.owner_lock.write().await;

        let result = async {
            if self.by_owner.contains_key(owner) {
                return Err(Error::DuplicateOwner(owner.to_string()));
            }
            let mut access_key = self.keygen.access_key();
            while self.by_key.contains_key(&access_key) {
                access_key = self.keygen.access_key();
            }
            let record = CredentialRecord::new(owner, access_key, self.keygen.secret_key());
            self.commit_create(record).await
        }
        .await;

        result.inspect_err(|e| error!("action[create_credential] owner={owner}: {e}"))
    }

    /// Issue a credential with caller-supplied keys.
    ///
    /// The caller's access key is authoritative: a collision is rejected
    /// with [`Error::DuplicateAccessKey`] rather than retried.
    pub async fn create_credential_with_keys(
        &self,
        owner: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<CredentialRecord> {
        validate_owner(owner)?;
        validate_key("access key", access_key)?;
        validate_key("secret key", secret_key)?;
        let _keys = self.key_lock.write().await;
        let _owners = self.owner_lock.write().await;

        let result = async {
            if self.by_owner.contains_key(owner) {
                return Err(Error::DuplicateOwner(owner.to_string()));
            }
            if self.by_key.contains_key(access_key) {
                return Err(Error::DuplicateAccessKey(access_key.to_string()));
            }
            self.commit_create(CredentialRecord::new(owner, access_key, secret_key))
                .await
        }
        .await;

        result.inspect_err(|e| {
            error!("action[create_credential_with_keys] owner={owner} access_key={access_key}: {e}")
        })
    }

    async fn commit_create(&self, record: CredentialRecord) -> Result<CredentialRecord> {
        commit(
            self.gateway.as_ref(),
            &Operation::CreateCredential {
                record: record.clone(),
            },
        )
        .await?;
        self.apply_create(&record);
        info!(
            "action[create_credential] owner={} access_key={}",
            record.owner, record.access_key
        );
        Ok(record)
    }

    /// Revoke an owner's credential.
    ///
    /// The deletion record also carries the removal of every reverse-index
    /// entry the credential's policy implied, so the volume index never
    /// refers to a credential that no longer exists.
    pub async fn revoke_credential(&self, owner: &str, volumes: &VolumeGrantIndex) -> Result<()> {
        let _keys = self.key_lock.write().await;
        let _owners = self.owner_lock.write().await;

        let result = async {
            let record = self.get_by_owner(owner)?;
            let _lease = volumes.lease(record.grants.volumes()).await;
            let entries = volumes.stage(&record.access_key, &record.grants, &GrantSet::new());

            commit(
                self.gateway.as_ref(),
                &Operation::DeleteCredential {
                    owner: owner.to_string(),
                    access_key: record.access_key.clone(),
                    volumes: entries.clone(),
                },
            )
            .await?;

            self.apply_delete(owner, &record.access_key);
            for entry in &entries {
                volumes.apply_entry(entry);
            }
            info!(
                "action[revoke_credential] owner={owner} access_key={}",
                record.access_key
            );
            Ok(())
        }
        .await;

        result.inspect_err(|e| error!("action[revoke_credential] owner={owner}: {e}"))
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// The credential with this access key.
    pub fn get_by_access_key(&self, access_key: &str) -> Result<CredentialRecord> {
        self.by_key
            .get(access_key)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::AccessKeyNotFound(access_key.to_string()))
    }

    /// The credential owned by `owner`.
    pub fn get_by_owner(&self, owner: &str) -> Result<CredentialRecord> {
        let access_key = self
            .by_owner
            .get(owner)
            .map(|ak| ak.value().clone())
            .ok_or_else(|| Error::OwnerNotFound(owner.to_string()))?;
        // A concurrent revocation drops the key mapping first.
        self.by_key
            .get(&access_key)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::OwnerNotFound(owner.to_string()))
    }

    /// Number of live credentials.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether no credential exists.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ------------------------------------------------------------------------
    // Policy mutation
    // ------------------------------------------------------------------------

    /// Merge `delta` into the credential's policy.
    pub async fn grant_policy(
        &self,
        access_key: &str,
        delta: &GrantSet,
        volumes: &VolumeGrantIndex,
    ) -> Result<CredentialRecord> {
        self.update_policy("grant_policy", access_key, delta, volumes, |current| {
            Ok(current.merge(delta))
        })
        .await
    }

    /// Remove `delta` from the credential's policy.
    ///
    /// Every grant in `delta` must currently be held, otherwise the call
    /// fails with [`Error::NoSuchGrant`] and nothing is proposed.
    pub async fn revoke_policy(
        &self,
        access_key: &str,
        delta: &GrantSet,
        volumes: &VolumeGrantIndex,
    ) -> Result<CredentialRecord> {
        self.update_policy("revoke_policy", access_key, delta, volumes, |current| {
            match current.first_missing(delta) {
                Some((volume, grant)) => Err(Error::NoSuchGrant {
                    access_key: access_key.to_string(),
                    volume,
                    grant: grant.as_str().to_string(),
                }),
                None => Ok(current.subtract(delta)),
            }
        })
        .await
    }

    /// Move ownership of `volume` from one credential to another.
    ///
    /// Runs as a revoke followed by a grant, each committed on its own. If
    /// the grant fails after the revoke committed, the volume is left owned
    /// by neither credential. With `validate_target` the target access key
    /// is looked up before anything is revoked, which closes the common case
    /// of a mistyped target but not a target revoked concurrently.
    pub async fn transfer_volume_ownership(
        &self,
        volume: &str,
        from_access_key: &str,
        to_access_key: &str,
        volumes: &VolumeGrantIndex,
        validate_target: bool,
    ) -> Result<CredentialRecord> {
        let result = async {
            let source = self.get_by_access_key(from_access_key)?;
            if !source.grants.owns(volume) {
                return Err(Error::NoSuchGrant {
                    access_key: from_access_key.to_string(),
                    volume: volume.to_string(),
                    grant: WILDCARD.to_string(),
                });
            }
            if validate_target {
                self.get_by_access_key(to_access_key)?;
            }

            let delta = GrantSet::new().with_owned(volume);
            self.revoke_policy(from_access_key, &delta, volumes).await?;
            self.grant_policy(to_access_key, &delta, volumes).await
        }
        .await;

        match &result {
            Ok(_) => info!(
                "action[transfer_volume_ownership] volume={volume} from={from_access_key} to={to_access_key}"
            ),
            Err(e) => error!(
                "action[transfer_volume_ownership] volume={volume} from={from_access_key} to={to_access_key}: {e}"
            ),
        }
        result
    }

    async fn update_policy<F>(
        &self,
        action: &'static str,
        access_key: &str,
        delta: &GrantSet,
        volumes: &VolumeGrantIndex,
        compute: F,
    ) -> Result<CredentialRecord>
    where
        F: FnOnce(&GrantSet) -> Result<GrantSet> + Send,
    {
        let result = async {
            delta.validate()?;
            let _keys = self.key_lock.read().await;
            // Unknown keys never reach the lock registry.
            self.get_by_access_key(access_key)?;
            let _credential = self.credential_locks.lock(access_key).await;

            let current = self.get_by_access_key(access_key)?;
            let updated = compute(&current.grants)?;
            let _lease = volumes.lease(delta.volumes()).await;
            let entries = volumes.stage(access_key, &current.grants, &updated);

            commit(
                self.gateway.as_ref(),
                &Operation::UpdatePolicy {
                    access_key: access_key.to_string(),
                    grants: updated.clone(),
                    volumes: entries.clone(),
                },
            )
            .await?;

            let record = current.with_grants(updated);
            self.by_key.insert(access_key.to_string(), record.clone());
            for entry in &entries {
                volumes.apply_entry(entry);
            }
            Ok(record)
        }
        .await;

        match &result {
            Ok(_) => info!("action[{action}] access_key={access_key}"),
            Err(e) => error!("action[{action}] access_key={access_key}: {e}"),
        }
        result
    }

    // ------------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------------

    /// Take both coarse locks exclusively.
    pub(crate) async fn lock_exclusive(&self) -> CredentialsExclusive<'_> {
        let keys = self.key_lock.write().await;
        let owners = self.owner_lock.write().await;
        CredentialsExclusive {
            _keys: keys,
            _owners: owners,
        }
    }

    pub(crate) fn apply_create(&self, record: &CredentialRecord) {
        self.by_key
            .insert(record.access_key.clone(), record.clone());
        self.by_owner
            .insert(record.owner.clone(), record.access_key.clone());
    }

    pub(crate) fn apply_delete(&self, owner: &str, access_key: &str) {
        self.by_key.remove(access_key);
        self.by_owner.remove_if(owner, |_, ak| ak == access_key);
    }

    pub(crate) fn apply_grants(&self, access_key: &str, grants: &GrantSet) {
        match self.by_key.get_mut(access_key) {
            Some(mut record) => {
                let updated = record.with_grants(grants.clone());
                *record = updated;
            }
            None => warn!("Policy update for unknown access key {access_key} ignored"),
        }
    }

    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.by_owner.clear();
    }

    pub(crate) fn snapshot(
        &self,
    ) -> (
        BTreeMap<String, CredentialRecord>,
        BTreeMap<String, String>,
    ) {
        let records = self
            .by_key
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let owners = self
            .by_owner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        (records, owners)
    }
}

fn validate_owner(owner: &str) -> Result<()> {
    if owner.trim().is_empty() {
        return Err(Error::invalid_key("owner id must not be empty"));
    }
    Ok(())
}
