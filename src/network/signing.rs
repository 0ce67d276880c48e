//! Replay-oriented request signing shared by clients and the ingestion service.
//!
//! A signature is the hex digest of the shared secret, the timestamp and the nonce,
//! sorted lexicographically and concatenated:
//!
//! ```text
//! signature = hex(H(concat(sort([secret, timestamp, nonce]))))
//! ```
//!
//! The three values travel in the `Signature`, `Timestamp` and `Nonce` headers; the
//! secret never leaves either side. `H` is SHA-1 by default, which is what existing
//! counterparts speak.
//!
//! The bare scheme does not stop a captured request from being replayed. The server side
//! can add a [`ReplayGuard`], which bounds timestamp skew and remembers nonces for the
//! length of that window, without changing what goes over the wire.

use crate::error::ProtocolError;
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "Signature";
/// Header carrying the unix timestamp in seconds.
pub const TIMESTAMP_HEADER: &str = "Timestamp";
/// Header carrying the per-request nonce.
pub const NONCE_HEADER: &str = "Nonce";

/// Digest applied to the sorted concatenation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    /// SHA-1, 40 hex characters
    #[default]
    Sha1,
    /// SHA-256, 64 hex characters
    Sha256,
}

/// Signs with the default algorithm.
pub fn sign(secret: &str, timestamp: &str, nonce: &str) -> String {
    sign_with(SignatureAlgorithm::default(), secret, timestamp, nonce)
}

/// Signs with an explicit algorithm.
pub fn sign_with(algorithm: SignatureAlgorithm, secret: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [secret, timestamp, nonce];
    parts.sort_unstable();
    let raw = parts.concat();

    match algorithm {
        SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(raw.as_bytes())),
        SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(raw.as_bytes())),
    }
}

/// The three authentication headers of one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    /// Hex digest
    pub signature: String,
    /// Unix seconds, decimal
    pub timestamp: String,
    /// Six-digit random nonce
    pub nonce: String,
}

impl AuthHeaders {
    /// Fresh headers for the current time with a random nonce.
    pub fn generate(secret: &str, algorithm: SignatureAlgorithm) -> Self {
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        Self::with_values(secret, algorithm, timestamp, nonce)
    }

    /// Headers for a given timestamp and nonce.
    pub fn with_values(
        secret: &str,
        algorithm: SignatureAlgorithm,
        timestamp: String,
        nonce: String,
    ) -> Self {
        Self {
            signature: sign_with(algorithm, secret, &timestamp, &nonce),
            timestamp,
            nonce,
        }
    }

    /// `(name, value)` pairs ready to attach to a request.
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            (SIGNATURE_HEADER, self.signature.as_str()),
            (TIMESTAMP_HEADER, self.timestamp.as_str()),
            (NONCE_HEADER, self.nonce.as_str()),
        ]
    }
}

/// Server-side check of inbound authentication headers.
#[derive(Debug)]
pub struct SignatureVerifier {
    secret: String,
    algorithm: SignatureAlgorithm,
    replay_guard: Option<ReplayGuard>,
}

impl SignatureVerifier {
    /// Verifier that only checks the signature.
    pub fn new(secret: impl Into<String>, algorithm: SignatureAlgorithm) -> Self {
        Self {
            secret: secret.into(),
            algorithm,
            replay_guard: None,
        }
    }

    /// Adds timestamp-skew and nonce-reuse checks. A zero window leaves them off.
    pub fn with_replay_window(mut self, window_secs: u64) -> Self {
        self.replay_guard = (window_secs > 0).then(|| ReplayGuard::new(window_secs));
        self
    }

    /// Validates the three header values.
    ///
    /// Missing or empty values fail with [`ProtocolError::MissingParameter`] before any
    /// hashing. The replay guard, when present, runs only after the signature matched,
    /// so forged requests cannot fill its nonce memory.
    pub fn verify(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<(), ProtocolError> {
        let signature = required(signature, SIGNATURE_HEADER)?;
        let timestamp = required(timestamp, TIMESTAMP_HEADER)?;
        let nonce = required(nonce, NONCE_HEADER)?;

        let expected = sign_with(self.algorithm, &self.secret, timestamp, nonce);
        if !constant_time_eq(expected.as_bytes(), signature.to_ascii_lowercase().as_bytes()) {
            return Err(ProtocolError::SignatureMismatch);
        }

        match &self.replay_guard {
            Some(guard) => guard.check(timestamp, nonce, Utc::now().timestamp()),
            None => Ok(()),
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ProtocolError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ProtocolError::MissingParameter(name)),
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Bounded timestamp skew plus a memory of recently seen `(timestamp, nonce)` pairs.
#[derive(Debug)]
pub struct ReplayGuard {
    window_secs: u64,
    seen: Mutex<HashMap<String, i64>>,
}

impl ReplayGuard {
    /// Guard accepting timestamps within `window_secs` of the local clock.
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Accepts a pair once. `now` is unix seconds.
    pub fn check(&self, timestamp: &str, nonce: &str, now: i64) -> Result<(), ProtocolError> {
        let issued: i64 = timestamp
            .parse()
            .map_err(|_| ProtocolError::MalformedTimestamp(timestamp.to_string()))?;
        let window = self.window_secs as i64;
        if (now - issued).abs() > window {
            return Err(ProtocolError::StaleTimestamp {
                timestamp: issued,
                window_secs: self.window_secs,
            });
        }

        let mut seen = self.seen.lock();
        seen.retain(|_, &mut at| (now - at).abs() <= window);
        let key = format!("{issued}:{nonce}");
        if seen.contains_key(&key) {
            return Err(ProtocolError::ReplayedNonce(nonce.to_string()));
        }
        seen.insert(key, issued);
        Ok(())
    }

    /// Pairs currently remembered.
    pub fn remembered(&self) -> usize {
        self.seen.lock().len()
    }
}
