use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;

use super::claims::Claims;
use crate::config::JwtConfig;

/// The only algorithm tokens are signed with or accepted under.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Why a token was refused. Kept for logs; callers outside `auth` only see
/// "unauthorized".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a well-formed JWT")]
    MalformedToken,
    #[error("token header names an unexpected algorithm")]
    AlgorithmMismatch,
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token claims are missing or mistyped")]
    MalformedClaims,
    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Holds JWT signing and verification keys with the configured lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn from_config(cfg: &JwtConfig) -> Self {
        let ttl_secs = u64::try_from(cfg.ttl_minutes).unwrap_or(0).saturating_mul(60);
        Self::new(cfg.secret.as_bytes(), Duration::from_secs(ttl_secs))
    }

    /// Signs a token for `user_id` that expires `ttl` after `now`.
    ///
    /// Timestamps are whole unix seconds; `now` is truncated.
    pub fn issue(
        &self,
        user_id: i64,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let iat = now.unix_timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            user_id,
            iat,
            expires_at: iat.saturating_add(ttl_secs),
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(user_id, exp = claims.expires_at, "jwt signed");
        Ok(token)
    }

    /// Signs a token with the configured lifetime, starting now.
    pub fn sign(&self, user_id: i64) -> Result<String, TokenError> {
        self.issue(user_id, OffsetDateTime::now_utc(), self.ttl)
    }

    /// Checks structure, algorithm, signature and expiry, in that order, and
    /// returns the user id the token was issued for.
    pub fn verify(&self, token: &str, now: OffsetDateTime) -> Result<i64, TokenError> {
        // Read `alg` ourselves: jsonwebtoken cannot even parse `none`.
        if header_algorithm(token)? != "HS256" {
            return Err(TokenError::AlgorithmMismatch);
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::AlgorithmMismatch
                }
                ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
                    TokenError::MalformedClaims
                }
                _ => TokenError::MalformedToken,
            }
        })?;

        if now.unix_timestamp() >= data.claims.expires_at {
            return Err(TokenError::Expired);
        }

        debug!(user_id = data.claims.user_id, "jwt verified");
        Ok(data.claims.user_id)
    }
}

fn header_algorithm(token: &str) -> Result<String, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::MalformedToken);
    };
    let bytes = Base64UrlUnpadded::decode_vec(header).map_err(|_| TokenError::MalformedToken)?;
    let raw: RawHeader =
        serde_json::from_slice(&bytes).map_err(|_| TokenError::MalformedToken)?;
    Ok(raw.alg)
}
