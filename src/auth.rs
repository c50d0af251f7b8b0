//! Credentials: password hashing and signed identity tokens.
//!
//! Tokens have the shape `v1.<payload>.<signature>`, both parts base64url
//! without padding. The payload is the JSON of [`Claims`]; the signature is
//! HMAC-SHA256 over the encoded payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::{Result, TrackerError};
use crate::fields::{Department, Role};
use crate::user::{Identity, User, UserId};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION_V1: &str = "v1";
const MAX_TOKEN_LEN: usize = 2048;
const SALT_LEN: usize = 16;
pub const DEFAULT_HASH_ROUNDS: u32 = 100_000;

/// One-way password hashing.
pub trait PasswordHasher {
    fn hash(&self, password: &str) -> Result<String>;
    /// True when `password` matches `encoded`. Malformed hashes never match.
    fn verify(&self, password: &str, encoded: &str) -> bool;
}

/// Salted PBKDF2-HMAC-SHA256, encoded as `pbkdf2-sha256$<rounds>$<salt>$<digest>`
/// with hex salt and digest.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Hasher {
    rounds: u32,
}

impl Pbkdf2Hasher {
    pub fn new(rounds: u32) -> Self {
        Pbkdf2Hasher { rounds: rounds.max(1) }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Pbkdf2Hasher::new(DEFAULT_HASH_ROUNDS)
    }
}

fn pbkdf2_sha256(password: &[u8], salt: &[u8], rounds: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut out);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt: [u8; SALT_LEN] = rand::random();
        let digest = pbkdf2_sha256(password.as_bytes(), &salt, self.rounds);
        Ok(format!(
            "pbkdf2-sha256${}${}${}",
            self.rounds,
            hex::encode(salt),
            hex::encode(digest)
        ))
    }

    fn verify(&self, password: &str, encoded: &str) -> bool {
        let parts: Vec<&str> = encoded.split('$').collect();
        let [scheme, rounds, salt, digest] = parts.as_slice() else {
            return false;
        };
        if *scheme != "pbkdf2-sha256" {
            return false;
        }
        let (Ok(rounds), Ok(salt), Ok(expected)) =
            (rounds.parse::<u32>(), hex::decode(salt), hex::decode(digest))
        else {
            return false;
        };
        constant_time_eq(&pbkdf2_sha256(password.as_bytes(), &salt, rounds.max(1)), &expected)
    }
}

/// Signed payload of an identity token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub id: UserId,
    pub role: Role,
    pub department: Option<Department>,
    pub email: String,
    pub name: String,
    /// Expiry as a unix timestamp (seconds).
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            role: self.role,
            department: self.department,
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Issues and verifies identity tokens with a shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TrackerError::Config("token secret must not be empty".into()));
        }
        Ok(TokenIssuer { secret, ttl })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| TrackerError::Config(e.to_string()))
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            id: user.id,
            role: user.role,
            department: user.department,
            email: user.email.clone(),
            name: user.name.clone(),
            exp: (now + self.ttl).timestamp(),
        };
        let payload_part = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let mut mac = self.mac()?;
        mac.update(payload_part.as_bytes());
        let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{TOKEN_VERSION_V1}.{payload_part}.{sig_part}"))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TrackerError::unauthenticated("no token provided"));
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(TrackerError::unauthenticated("token exceeds max length"));
        }
        let parts: Vec<&str> = token.split('.').collect();
        let (payload_part, sig_part) = match parts.as_slice() {
            [version, payload, sig] if *version == TOKEN_VERSION_V1 => (*payload, *sig),
            [version, _, _] => {
                return Err(TrackerError::unauthenticated(format!("unsupported token version: {version}")))
            }
            _ => return Err(TrackerError::unauthenticated("invalid token format")),
        };

        let sig = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| TrackerError::unauthenticated("invalid token signature encoding"))?;
        let mut mac = self.mac()?;
        mac.update(payload_part.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| TrackerError::unauthenticated("invalid token"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| TrackerError::unauthenticated("invalid token payload encoding"))?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|e| {
            debug!(error = %e, "token payload rejected");
            TrackerError::unauthenticated("invalid token payload")
        })?;
        if claims.exp <= now.timestamp() {
            return Err(TrackerError::unauthenticated("token expired"));
        }
        Ok(claims)
    }
}
