//! Store tuning knobs.

use keyward_core::{ACCESS_KEY_LENGTH, KeyGenerator, Result, SECRET_KEY_LENGTH};
use serde::{Deserialize, Serialize};

/// Settings for an [`AuthorizationStore`](crate::AuthorizationStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Length of generated access keys.
    pub access_key_length: usize,

    /// Length of generated secret keys.
    pub secret_key_length: usize,

    /// Look up the target credential before a volume transfer revokes
    /// anything from the source.
    pub validate_transfer_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            access_key_length: ACCESS_KEY_LENGTH,
            secret_key_length: SECRET_KEY_LENGTH,
            validate_transfer_target: false,
        }
    }
}

impl StoreConfig {
    /// A key generator with the configured lengths.
    pub fn key_generator(&self) -> Result<KeyGenerator> {
        KeyGenerator::new(self.access_key_length, self.secret_key_length)
    }
}
