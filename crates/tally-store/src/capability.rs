//! IP hashing capability.
//!
//! Geolocation rows store a hash of the player's address, never the address
//! itself. Whether hashing works is a property of the [`HashCapability`]
//! instance passed into the transaction: after the first failure the instance
//! stays unavailable and every later geolocation write it guards is skipped.

use std::sync::atomic::{AtomicBool, Ordering};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// The hasher could not produce a digest.
#[derive(Debug, Error)]
#[error("ip hashing unavailable: {0}")]
pub struct CapabilityError(pub String);

/// Something that turns an address into a stable opaque string.
pub trait IpHasher: Send + Sync {
    /// Algorithm name for logs.
    fn algorithm(&self) -> &'static str;

    /// Hash `ip`.
    fn hash(&self, ip: &str) -> Result<String, CapabilityError>;
}

/// SHA-256, hex encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256IpHasher;

impl IpHasher for Sha256IpHasher {
    fn algorithm(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, ip: &str) -> Result<String, CapabilityError> {
        Ok(sha256_hex(ip))
    }
}

/// Hex-encoded SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Hashing capability with a sticky failure flag.
pub struct HashCapability {
    hasher: Box<dyn IpHasher>,
    failed: AtomicBool,
}

impl HashCapability {
    /// Capability backed by [`Sha256IpHasher`].
    pub fn sha256() -> Self {
        Self::with_hasher(Sha256IpHasher)
    }

    /// Capability backed by a custom hasher.
    pub fn with_hasher(hasher: impl IpHasher + 'static) -> Self {
        Self {
            hasher: Box::new(hasher),
            failed: AtomicBool::new(false),
        }
    }

    /// False once any hash attempt has failed.
    pub fn is_available(&self) -> bool {
        !self.failed.load(Ordering::Acquire)
    }

    /// Hash `ip`, or `None` if the capability is (or just became) unavailable.
    pub fn hash(&self, ip: &str) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        match self.hasher.hash(ip) {
            Ok(hash) => Some(hash),
            Err(e) => {
                self.failed.store(true, Ordering::Release);
                warn!(algorithm = self.hasher.algorithm(), error = %e, "ip hashing failed, disabling");
                None
            }
        }
    }
}

impl Default for HashCapability {
    fn default() -> Self {
        Self::sha256()
    }
}

impl std::fmt::Debug for HashCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCapability")
            .field("algorithm", &self.hasher.algorithm())
            .field("available", &self.is_available())
            .finish()
    }
}
