//! Random access-key and secret-key generation.
//!
//! Keys are drawn uniformly from `[0-9A-Za-z]`. The generator knows nothing
//! about which keys are taken; collision checks belong to the credential
//! index, which retries until it finds a free access key.

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::{Error, Result};

/// Default access key length.
pub const ACCESS_KEY_LENGTH: usize = 16;

/// Default secret key length.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Produces fixed-length alphanumeric credential strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGenerator {
    access_key_length: usize,
    secret_key_length: usize,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self {
            access_key_length: ACCESS_KEY_LENGTH,
            secret_key_length: SECRET_KEY_LENGTH,
        }
    }
}

impl KeyGenerator {
    /// Creates a generator with explicit key lengths.
    pub fn new(access_key_length: usize, secret_key_length: usize) -> Result<Self> {
        if access_key_length == 0 || secret_key_length == 0 {
            return Err(Error::config("key lengths must be greater than zero"));
        }
        Ok(Self {
            access_key_length,
            secret_key_length,
        })
    }

    /// A fresh access key.
    pub fn access_key(&self) -> String {
        random_string(self.access_key_length)
    }

    /// A fresh secret key.
    pub fn secret_key(&self) -> String {
        random_string(self.secret_key_length)
    }

    /// Length of generated access keys.
    pub fn access_key_length(&self) -> usize {
        self.access_key_length
    }

    /// Length of generated secret keys.
    pub fn secret_key_length(&self) -> usize {
        self.secret_key_length
    }
}

/// Check a caller-supplied key against the generated alphabet.
///
/// Length is not enforced, so keys issued by an older deployment with a
/// different configured length stay valid.
pub fn validate_key(kind: &str, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key(format!("{kind} must not be empty")));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::invalid_key(format!(
            "{kind} must be ASCII alphanumeric"
        )));
    }
    Ok(())
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
