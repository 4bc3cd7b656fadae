//! Client identity presented to the broker
//!
//! The broker routes webhook callbacks back to the application that asked
//! for a tunnel, keyed by a stable client id. The id is derived from the
//! application's public host with a fast, non-cryptographic hash and is
//! computed once for the lifetime of the identity; the key is read from
//! configuration on every access so a rotated secret takes effect without
//! rebuilding the identity.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::Config;

/// The `{id, key}` pair identifying this application to the broker
#[derive(Debug)]
pub struct ClientIdentity {
    config: Arc<Config>,
    id: OnceCell<String>,
}

impl ClientIdentity {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            id: OnceCell::new(),
        }
    }

    /// Stable client id: lowercase hex MD5 of the public server host,
    /// memoized on first access
    pub fn id(&self) -> &str {
        self.id
            .get_or_init(|| format!("{:x}", md5::compute(self.config.server_host().as_bytes())))
    }

    /// Shared secret key, read from configuration on each access
    pub fn key(&self) -> &str {
        self.config.secret_key()
    }
}
