//! The authorization store facade.
//!
//! [`AuthorizationStore`] composes the [`CredentialIndex`], the
//! [`VolumeGrantIndex`] and a [`ReplicationGateway`] into the operations
//! exposed to callers, and owns the clear/replay lifecycle used when a node
//! rebuilds its state from the durable log.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use keyward_core::{CredentialRecord, Error, GrantAction, GrantSet, GrantTag, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::credentials::{CredentialIndex, CredentialsExclusive};
use crate::gateway::ReplicationGateway;
use crate::operation::Operation;
use crate::volumes::VolumeGrantIndex;

/// Point-in-time copy of every index, ordered for stable comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Access key → credential.
    pub credentials: BTreeMap<String, CredentialRecord>,
    /// Owner → access key.
    pub owners: BTreeMap<String, String>,
    /// Volume → tagged grants, in list order.
    pub volumes: BTreeMap<String, Vec<GrantTag>>,
}

impl StoreSnapshot {
    /// This snapshot with every secret key blanked out.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for record in copy.credentials.values_mut() {
            record.secret_key = REDACTED.to_string();
        }
        copy
    }
}

const REDACTED: &str = "<redacted>";

/// Credential store with per-volume grants and a reverse index.
pub struct AuthorizationStore {
    config: StoreConfig,
    credentials: CredentialIndex,
    volumes: VolumeGrantIndex,
}

impl AuthorizationStore {
    /// A store with default settings committing through `gateway`.
    pub fn new(gateway: Arc<dyn ReplicationGateway>) -> Self {
        let config = StoreConfig::default();
        Self {
            credentials: CredentialIndex::new(Arc::clone(&gateway), Default::default()),
            volumes: VolumeGrantIndex::new(gateway),
            config,
        }
    }

    /// A store with explicit settings.
    pub fn with_config(gateway: Arc<dyn ReplicationGateway>, config: StoreConfig) -> Result<Self> {
        let keygen = config.key_generator()?;
        Ok(Self {
            credentials: CredentialIndex::new(Arc::clone(&gateway), keygen),
            volumes: VolumeGrantIndex::new(gateway),
            config,
        })
    }

    /// The settings this store runs with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The credential index.
    pub fn credentials(&self) -> &CredentialIndex {
        &self.credentials
    }

    /// The volume reverse index.
    pub fn volumes(&self) -> &VolumeGrantIndex {
        &self.volumes
    }

    // ------------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------------

    /// See [`CredentialIndex::create_generated_credential`].
    pub async fn create_generated_credential(&self, owner: &str) -> Result<CredentialRecord> {
        self.credentials.create_generated_credential(owner).await
    }

    /// See [`CredentialIndex::create_credential_with_keys`].
    pub async fn create_credential_with_keys(
        &self,
        owner: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<CredentialRecord> {
        self.credentials
            .create_credential_with_keys(owner, access_key, secret_key)
            .await
    }

    /// Revoke `owner`'s credential together with its reverse-index entries.
    pub async fn revoke_credential(&self, owner: &str) -> Result<()> {
        self.credentials
            .revoke_credential(owner, &self.volumes)
            .await
    }

    /// Remove `owner`'s credential and every grant it held.
    ///
    /// The same single-record deletion as
    /// [`revoke_credential`](Self::revoke_credential).
    pub async fn delete_credential(&self, owner: &str) -> Result<()> {
        self.revoke_credential(owner).await
    }

    /// See [`CredentialIndex::get_by_access_key`].
    pub fn get_by_access_key(&self, access_key: &str) -> Result<CredentialRecord> {
        self.credentials.get_by_access_key(access_key)
    }

    /// See [`CredentialIndex::get_by_owner`].
    pub fn get_by_owner(&self, owner: &str) -> Result<CredentialRecord> {
        self.credentials.get_by_owner(owner)
    }

    // ------------------------------------------------------------------------
    // Policies
    // ------------------------------------------------------------------------

    /// Merge `delta` into a credential's policy.
    pub async fn grant_policy(&self, access_key: &str, delta: &GrantSet) -> Result<CredentialRecord> {
        self.credentials
            .grant_policy(access_key, delta, &self.volumes)
            .await
    }

    /// Remove `delta` from a credential's policy.
    pub async fn revoke_policy(
        &self,
        access_key: &str,
        delta: &GrantSet,
    ) -> Result<CredentialRecord> {
        self.credentials
            .revoke_policy(access_key, delta, &self.volumes)
            .await
    }

    /// Move ownership of `volume` between credentials.
    ///
    /// Not atomic: see [`CredentialIndex::transfer_volume_ownership`]. Set
    /// [`StoreConfig::validate_transfer_target`] to check the target before
    /// the source loses the volume.
    pub async fn transfer_volume_ownership(
        &self,
        volume: &str,
        from_access_key: &str,
        to_access_key: &str,
    ) -> Result<CredentialRecord> {
        self.credentials
            .transfer_volume_ownership(
                volume,
                from_access_key,
                to_access_key,
                &self.volumes,
                self.config.validate_transfer_target,
            )
            .await
    }

    // ------------------------------------------------------------------------
    // Volumes
    // ------------------------------------------------------------------------

    /// The tagged grants on `volume`.
    pub fn volume_grants(&self, volume: &str) -> Result<Vec<GrantTag>> {
        self.volumes.grants(volume)
    }

    /// Revoke every grant on `volume` and stop tracking it.
    ///
    /// Each listed grant is revoked from its credential as its own policy
    /// update, so a durability failure part-way through leaves the grants
    /// already processed revoked. Listed grants whose credential is gone or
    /// no longer holds them are swept from the list at the end. Grants added
    /// to the volume while the purge runs are kept.
    pub async fn purge_volume(&self, volume: &str) -> Result<()> {
        let tags = self.volumes.grants(volume)?;
        let mut stale = Vec::new();

        for tag in &tags {
            let delta = GrantSet::from_tag(volume, tag);
            match self
                .credentials
                .revoke_policy(&tag.access_key, &delta, &self.volumes)
                .await
            {
                Ok(_) => debug!("Purged '{tag}' from volume '{volume}'"),
                Err(Error::AccessKeyNotFound(_) | Error::NoSuchGrant { .. }) => {
                    warn!("Volume '{volume}' lists '{tag}' with no matching grant; sweeping");
                    stale.push(tag.clone());
                }
                Err(e) => return Err(e),
            }
        }

        self.volumes.sweep(volume, &stale).await?;
        info!("action[purge_volume] volume={volume} grants={}", tags.len());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Empty every index.
    pub async fn clear_all(&self) {
        let _guard = self.lock_exclusive().await;
        self.clear_unlocked();
    }

    /// Apply one committed record to memory without proposing it.
    pub async fn apply(&self, operation: &Operation) {
        let _guard = self.lock_exclusive().await;
        self.apply_unlocked(operation);
    }

    /// Rebuild memory from committed records in commit order.
    ///
    /// Every index is cleared first; nothing else can observe or mutate the
    /// store until the last record has been applied.
    pub async fn replay<'a, I>(&self, operations: I) -> usize
    where
        I: IntoIterator<Item = &'a Operation>,
    {
        let _guard = self.lock_exclusive().await;
        self.clear_unlocked();
        let mut count = 0;
        for operation in operations {
            self.apply_unlocked(operation);
            count += 1;
        }
        info!(
            "Replayed {count} records: {} credentials, {} volumes",
            self.credentials.len(),
            self.volumes.volumes().len()
        );
        count
    }

    /// A consistent copy of every index.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let _guard = self.lock_exclusive().await;
        let (credentials, owners) = self.credentials.snapshot();
        StoreSnapshot {
            credentials,
            owners,
            volumes: self.volumes.snapshot(),
        }
    }

    /// Problems found by cross-checking the indices; empty when consistent.
    pub async fn check_consistency(&self) -> Vec<String> {
        check_snapshot(&self.snapshot().await)
    }

    async fn lock_exclusive(&self) -> StoreExclusive<'_> {
        let credentials = self.credentials.lock_exclusive().await;
        let volumes = self.volumes.lock_exclusive().await;
        StoreExclusive {
            _credentials: credentials,
            _volumes: volumes,
        }
    }

    fn clear_unlocked(&self) {
        self.credentials.clear();
        self.volumes.clear();
    }

    fn apply_unlocked(&self, operation: &Operation) {
        debug!("Applying {}", operation.kind());
        match operation {
            Operation::CreateCredential { record } => self.credentials.apply_create(record),
            Operation::DeleteCredential {
                owner,
                access_key,
                volumes,
            } => {
                self.credentials.apply_delete(owner, access_key);
                for entry in volumes {
                    self.volumes.apply_entry(entry);
                }
            }
            Operation::UpdatePolicy {
                access_key,
                grants,
                volumes,
            } => {
                self.credentials.apply_grants(access_key, grants);
                for entry in volumes {
                    self.volumes.apply_entry(entry);
                }
            }
            Operation::PutVolumeGrants { entry } => self.volumes.apply_entry(entry),
            Operation::DeleteVolumeGrants { volume } => self.volumes.apply_delete(volume),
        }
    }
}

struct StoreExclusive<'a> {
    _credentials: CredentialsExclusive<'a>,
    _volumes: tokio::sync::RwLockWriteGuard<'a, ()>,
}

fn check_snapshot(snapshot: &StoreSnapshot) -> Vec<String> {
    let mut problems = Vec::new();

    for (access_key, record) in &snapshot.credentials {
        if &record.access_key != access_key {
            problems.push(format!(
                "credential stored under '{access_key}' carries access key '{}'",
                record.access_key
            ));
        }
        match snapshot.owners.get(&record.owner) {
            Some(mapped) if mapped == access_key => {}
            Some(mapped) => problems.push(format!(
                "owner '{}' maps to '{mapped}' but also holds '{access_key}'",
                record.owner
            )),
            None => problems.push(format!(
                "owner '{}' of '{access_key}' is missing from the owner map",
                record.owner
            )),
        }
    }
    for (owner, access_key) in &snapshot.owners {
        if !snapshot
            .credentials
            .get(access_key)
            .is_some_and(|r| &r.owner == owner)
        {
            problems.push(format!(
                "owner '{owner}' maps to '{access_key}', which it does not own"
            ));
        }
    }

    for (access_key, record) in &snapshot.credentials {
        for (volume, tags) in record.grants.tags(access_key) {
            let listed = snapshot.volumes.get(&volume);
            for tag in tags {
                if !listed.is_some_and(|l| l.contains(&tag)) {
                    problems.push(format!("volume '{volume}' is missing entry '{tag}'"));
                }
            }
        }
    }
    for (volume, tags) in &snapshot.volumes {
        let mut seen = BTreeSet::new();
        for tag in tags {
            if !seen.insert(tag) {
                problems.push(format!("volume '{volume}' lists '{tag}' twice"));
            }
            let held = snapshot
                .credentials
                .get(&tag.access_key)
                .is_some_and(|r| match &tag.action {
                    GrantAction::Owner => r.grants.owns(volume),
                    GrantAction::Action(action) => r
                        .grants
                        .scoped_actions()
                        .get(volume)
                        .is_some_and(|a| a.contains(action)),
                });
            if !held {
                problems.push(format!(
                    "volume '{volume}' lists '{tag}' but no credential holds that grant"
                ));
            }
        }
    }

    problems
}
