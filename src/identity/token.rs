//! Visitor token generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

use crate::identity::error::{IdentityError, IdentityResult};
use crate::types::VisitorToken;

/// Source of fresh visitor tokens.
pub trait TokenGenerator: Send + Sync {
    /// Generate a token carrying `byte_size` bytes of entropy.
    fn generate(&self, byte_size: usize) -> IdentityResult<VisitorToken>;
}

/// Token generator backed by the operating system CSPRNG.
///
/// Tokens are URL-safe base64 without padding, so 16 bytes encode to 22
/// characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTokenGenerator;

impl TokenGenerator for OsTokenGenerator {
    fn generate(&self, byte_size: usize) -> IdentityResult<VisitorToken> {
        if byte_size == 0 {
            return Err(IdentityError::Generation(
                "token byte size must be greater than zero".to_string(),
            ));
        }

        let mut bytes = vec![0u8; byte_size];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| IdentityError::Generation(format!("OsRng failed: {}", e)))?;

        Ok(VisitorToken::new(URL_SAFE_NO_PAD.encode(&bytes)))
    }
}
