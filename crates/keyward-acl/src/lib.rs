//! Keyward ACL: the authorization store.
//!
//! Access-key/secret-key credentials, per-volume grant policies, and a
//! volume → grant reverse index, kept mutually consistent under concurrent
//! access. Every mutation is committed through a [`ReplicationGateway`]
//! before it becomes visible in memory; a failed commit leaves the store
//! unchanged.
//!
//! # Modules
//!
//! - [`store`]: [`AuthorizationStore`], the facade callers use
//! - [`credentials`]: [`CredentialIndex`], credentials and their policies
//! - [`volumes`]: [`VolumeGrantIndex`], the reverse index
//! - [`operation`]: durable [`Operation`] records and [`Proposal`] encoding
//! - [`gateway`]: the [`ReplicationGateway`] trait and [`MemoryLog`]
//! - [`journal`]: [`FileJournal`], a file-backed gateway
//! - [`config`]: [`StoreConfig`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyward_acl::{AuthorizationStore, MemoryLog};
//! use keyward_core::GrantSet;
//!
//! # async fn example() -> keyward_core::Result<()> {
//! let store = AuthorizationStore::new(Arc::new(MemoryLog::new()));
//! let alice = store.create_generated_credential("alice").await?;
//! store
//!     .grant_policy(&alice.access_key, &GrantSet::new().with_owned("vol1"))
//!     .await?;
//! assert_eq!(store.volume_grants("vol1")?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod gateway;
pub mod journal;
mod locks;
pub mod operation;
pub mod store;
pub mod volumes;

// Re-exports
pub use config::StoreConfig;
pub use credentials::CredentialIndex;
pub use gateway::{MemoryLog, ReplicationGateway};
pub use journal::FileJournal;
pub use operation::{Operation, OperationKind, Proposal, VolumeGrantEntry, decode_operation};
pub use store::{AuthorizationStore, StoreSnapshot};
pub use volumes::VolumeGrantIndex;
