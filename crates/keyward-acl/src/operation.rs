//! Durable records proposed to the replicated log.
//!
//! Every mutation of the store is described by exactly one [`Operation`].
//! Records carry post-mutation state rather than deltas, so applying a record
//! that is already reflected in memory changes nothing and replay after a
//! restart is safe.

use std::fmt;

use keyward_core::{CredentialRecord, Error, GrantSet, GrantTag, Result};
use serde::{Deserialize, Serialize};

/// A volume's reverse-index entry list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGrantEntry {
    /// Volume name.
    pub volume: String,
    /// Tagged grants in insertion order. Empty means the volume is untracked.
    pub grants: Vec<GrantTag>,
}

/// One durable mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// A new credential with an empty policy.
    CreateCredential {
        /// The full record, including the secret key.
        record: CredentialRecord,
    },

    /// Removal of an owner's credential.
    DeleteCredential {
        /// Owner whose credential is removed.
        owner: String,
        /// Access key of that credential.
        access_key: String,
        /// Post-change lists of the volumes the credential had grants on.
        #[serde(default)]
        volumes: Vec<VolumeGrantEntry>,
    },

    /// A credential's policy together with every volume list it changed.
    UpdatePolicy {
        /// Credential whose policy is replaced.
        access_key: String,
        /// Policy after the change.
        grants: GrantSet,
        /// Post-change lists of the touched volumes.
        #[serde(default)]
        volumes: Vec<VolumeGrantEntry>,
    },

    /// Replacement of one volume's entry list.
    PutVolumeGrants {
        /// The list after the change.
        entry: VolumeGrantEntry,
    },

    /// Removal of one volume's entry list.
    DeleteVolumeGrants {
        /// Volume whose list is removed.
        volume: String,
    },
}

/// Discriminant of an [`Operation`], used as the proposal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// [`Operation::CreateCredential`]
    CreateCredential,
    /// [`Operation::DeleteCredential`]
    DeleteCredential,
    /// [`Operation::UpdatePolicy`]
    UpdatePolicy,
    /// [`Operation::PutVolumeGrants`]
    PutVolumeGrants,
    /// [`Operation::DeleteVolumeGrants`]
    DeleteVolumeGrants,
}

impl OperationKind {
    /// Snake-case name, as used in logs and durability errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCredential => "create_credential",
            Self::DeleteCredential => "delete_credential",
            Self::UpdatePolicy => "update_policy",
            Self::PutVolumeGrants => "put_volume_grants",
            Self::DeleteVolumeGrants => "delete_volume_grants",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    /// The proposal type of this record.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateCredential { .. } => OperationKind::CreateCredential,
            Self::DeleteCredential { .. } => OperationKind::DeleteCredential,
            Self::UpdatePolicy { .. } => OperationKind::UpdatePolicy,
            Self::PutVolumeGrants { .. } => OperationKind::PutVolumeGrants,
            Self::DeleteVolumeGrants { .. } => OperationKind::DeleteVolumeGrants,
        }
    }
}

/// An `(operation type, serialized payload)` pair handed to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Type of the encoded operation.
    pub kind: OperationKind,
    /// Compact JSON encoding of the operation.
    pub payload: Vec<u8>,
}

impl Proposal {
    /// Serialize an operation.
    pub fn encode(operation: &Operation) -> Result<Self> {
        let payload = serde_json::to_vec(operation).map_err(|e| {
            Error::serialization(format!("Failed to encode {}: {e}", operation.kind()))
        })?;
        Ok(Self {
            kind: operation.kind(),
            payload,
        })
    }

    /// Deserialize the payload back into an operation.
    pub fn decode(&self) -> Result<Operation> {
        decode_operation(&self.payload)
    }
}

/// Deserialize one encoded operation.
pub fn decode_operation(bytes: &[u8]) -> Result<Operation> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::serialization(format!("Failed to decode operation: {e}")))
}
