//! Token issuance: one signed access token plus one opaque refresh token
//!
//! Issuing never touches the cache. Persisting the pair is left to the
//! caller so the issuer stays pure.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

use super::jwt::{JwtManager, TokenError};

/// Refresh token entropy (256 bits)
pub const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub access_token_id: String,
    pub refresh_token: String,
    /// Unix seconds
    pub issued_at: i64,
    pub access_expires_at: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    jwt: JwtManager,
}

impl TokenIssuer {
    pub fn new(jwt: JwtManager) -> Self {
        Self { jwt }
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    pub fn issue(&self, user_id: i64, now: i64) -> Result<IssuedTokens, TokenError> {
        let signed = self.jwt.sign_access_token(user_id, now)?;
        Ok(IssuedTokens {
            access_token: signed.token,
            access_token_id: signed.claims.jti,
            refresh_token: generate_refresh_token(),
            issued_at: now,
            access_expires_at: signed.claims.exp,
        })
    }
}

/// URL-safe, unpadded base64 of 32 CSPRNG bytes
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short, log-safe prefix of a token
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    &token[..end]
}
