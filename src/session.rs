//! Password hashing and bearer tokens.
//!
//! A token reads `{user_id}.{expires_unix}.{mac}` where `mac` is the hex BLAKE3
//! keyed hash of the first two parts. The key is derived from the configured
//! secret, so rotating the secret invalidates every outstanding token.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, TimeZone, Utc};
use derive_more::Display;
use once_cell::sync::Lazy;

static ARGON2: Lazy<Argon2<'static>> = Lazy::new(Argon2::default);

const TOKEN_KEY_CONTEXT: &str = "pollbox session token v1";

pub fn get_argon2() -> &'static Argon2<'static> {
    &ARGON2
}

/// Returns the PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    Ok(get_argon2()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => get_argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum TokenError {
    #[display(fmt = "Invalid token")]
    Malformed,
    #[display(fmt = "Invalid token")]
    BadSignature,
    #[display(fmt = "Token expired")]
    Expired,
}

impl std::error::Error for TokenError {}

/// Issues and checks bearer tokens.
pub struct TokenIssuer {
    key: [u8; 32],
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: blake3::derive_key(TOKEN_KEY_CONTEXT, secret.as_bytes()),
            ttl,
        }
    }

    fn sign(&self, payload: &str) -> blake3::Hash {
        blake3::keyed_hash(&self.key, payload.as_bytes())
    }

    pub fn issue(&self, user_id: i32, now: DateTime<Utc>) -> String {
        let payload = format!("{}.{}", user_id, (now + self.ttl).timestamp());
        format!("{}.{}", payload, self.sign(&payload).to_hex())
    }

    /// Returns the user id the token was issued for.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<i32, TokenError> {
        let (payload, mac) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let (user_id, expires) = payload.split_once('.').ok_or(TokenError::Malformed)?;
        let user_id: i32 = user_id.parse().map_err(|_| TokenError::Malformed)?;
        let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;

        let mac: [u8; 32] = hex::decode(mac)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(TokenError::Malformed)?;

        // blake3::Hash equality is constant-time.
        if self.sign(payload) != blake3::Hash::from(mac) {
            return Err(TokenError::BadSignature);
        }

        match Utc.timestamp_opt(expires, 0).single() {
            Some(expires_at) if expires_at > now => Ok(user_id),
            _ => Err(TokenError::Expired),
        }
    }
}
