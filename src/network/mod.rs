//! Outbound delivery and the shared signing scheme.
pub mod client;
pub mod signing;
pub mod transfer;
pub mod wire;

pub use client::WaveformClient;
pub use signing::{AuthHeaders, SignatureAlgorithm, SignatureVerifier};
