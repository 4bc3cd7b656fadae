//! Payload signature computation and verification
//!
//! Every payload exchanged with the broker is signed as
//! `sha1(payload + secret)` over the exact serialized string that is
//! transmitted. Verification must therefore run over the received string,
//! never over a re-serialized decode of it.

use std::sync::Arc;

use sha1::{Digest, Sha1};

use crate::config::Config;

/// Computes and verifies payload signatures with the shared secret
#[derive(Debug, Clone)]
pub struct SignatureService {
    config: Arc<Config>,
}

impl SignatureService {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Lowercase hex SHA-1 digest of `payload + secret`.
    ///
    /// Callers serialize typed payloads to JSON first and sign the exact
    /// string they put on the wire.
    pub fn compute(&self, payload: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(payload.as_bytes());
        hasher.update(self.config.secret_key().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify a signature over `payload`.
    ///
    /// When the configuration disables signature checking this always
    /// returns `true` (explicit trust bypass for trusted operators and
    /// testing).
    pub fn check(&self, payload: &str, signature: &str) -> bool {
        if !self.config.check_signature() {
            return true;
        }

        self.compute(payload) == signature
    }
}
