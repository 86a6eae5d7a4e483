//! Tracking token issuance

use phishsim_common::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Length of an encoded token
#[cfg(test)]
pub(crate) const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Issues opaque per-recipient tracking tokens.
///
/// Tokens are drawn from the operating system CSPRNG and hex encoded. They
/// carry no structure: no target id, timestamp or checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenIssuer;

impl TokenIssuer {
    pub fn new() -> Self {
        Self
    }

    /// Issue a fresh token.
    ///
    /// Fails with [`Error::Randomness`] if the OS randomness source is
    /// unavailable. There is no fallback source.
    pub fn issue(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::Randomness(format!("OS randomness unavailable: {}", e)))?;
        Ok(hex::encode(bytes))
    }
}
