//! Signed bearer tokens and password credentials.
//!
//! A token is `hex(claims) "." hex(hmac)` where the MAC is HMAC-SHA256 of the
//! JSON claims under the server secret. Every token carries a purpose, and a
//! token is only accepted for the purpose it was issued for.

use bson::oid::ObjectId;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use pbkdf2::password_hash::{
    self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use pbkdf2::{Params, Pbkdf2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Authenticates a user; `sub` is a user id.
    Login,
    /// Admits its bearer to a group; `sub` is a group id.
    Invite,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub purpose: TokenPurpose,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token was issued for another purpose")]
    WrongPurpose,
    #[error("token has expired")]
    Expired,
}

/// An issued token with its expiry.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this never fails.
        match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
        }
    }

    pub fn issue(
        &self,
        subject: ObjectId,
        purpose: TokenPurpose,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> IssuedToken {
        let expires_at = now + ttl;
        let claims = Claims {
            sub: subject.to_hex(),
            purpose,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        // Serialising a struct of strings and integers cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let mut mac = self.mac();
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        IssuedToken {
            token: format!("{}.{}", hex::encode(&payload), hex::encode(signature)),
            expires_at,
        }
    }

    /// Checks signature, purpose and expiry, returning the subject id.
    pub fn verify(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<ObjectId, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = hex::decode(payload).map_err(|_| TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.purpose != purpose {
            return Err(TokenError::WrongPurpose);
        }
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        ObjectId::parse_str(&claims.sub).map_err(|_| TokenError::Malformed)
    }
}

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 password hashing, stored as a PHC string
/// (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`).
///
/// Both operations are CPU bound; async callers run them on the blocking pool.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(rounds: u32) -> Self {
        Self {
            params: Params {
                rounds: rounds.max(1),
                output_length: KEY_LEN,
            },
        }
    }

    pub fn hash(&self, password: &str) -> Result<String, password_hash::Error> {
        let salt_bytes: [u8; SALT_LEN] = rand::thread_rng().gen();
        let salt = SaltString::encode_b64(&salt_bytes)?;
        let hash =
            Pbkdf2.hash_password_customized(password.as_bytes(), None, None, self.params, &salt)?;
        Ok(hash.to_string())
    }

    /// Checks `password` against a stored PHC string, using the rounds
    /// recorded in it. Unparseable strings never verify.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        PasswordHash::new(stored)
            .and_then(|parsed| Pbkdf2.verify_password(password.as_bytes(), &parsed))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret")
    }

    #[test]
    fn login_token_round_trips_subject() {
        let now = Utc::now();
        let user = ObjectId::new();
        let issued = signer().issue(user, TokenPurpose::Login, Duration::minutes(30), now);
        assert_eq!(signer().verify(&issued.token, TokenPurpose::Login, now), Ok(user));
        assert_eq!(issued.expires_at, now + Duration::minutes(30));
    }

    #[rstest]
    #[case(TokenPurpose::Login, TokenPurpose::Invite)]
    #[case(TokenPurpose::Invite, TokenPurpose::Login)]
    fn token_is_rejected_outside_its_purpose(
        #[case] issued_for: TokenPurpose,
        #[case] presented_as: TokenPurpose,
    ) {
        let now = Utc::now();
        let issued = signer().issue(ObjectId::new(), issued_for, Duration::hours(24), now);
        assert_eq!(
            signer().verify(&issued.token, presented_as, now),
            Err(TokenError::WrongPurpose)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let issued = signer().issue(
            ObjectId::new(),
            TokenPurpose::Login,
            Duration::minutes(1),
            now,
        );
        let later = now + Duration::minutes(2);
        assert_eq!(
            signer().verify(&issued.token, TokenPurpose::Login, later),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let now = Utc::now();
        let issued = TokenSigner::new("other").issue(
            ObjectId::new(),
            TokenPurpose::Login,
            Duration::minutes(5),
            now,
        );
        assert_eq!(
            signer().verify(&issued.token, TokenPurpose::Login, now),
            Err(TokenError::BadSignature)
        );
    }

    #[rstest]
    #[case("")]
    #[case("no-dot")]
    #[case("zz.zz")]
    #[case("abcd.")]
    fn malformed_tokens_are_rejected(#[case] token: &str) {
        let result = signer().verify(token, TokenPurpose::Login, Utc::now());
        assert!(matches!(
            result,
            Err(TokenError::Malformed) | Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn password_hash_verifies_only_the_original_password() {
        let hasher = PasswordHasher::new(1_000);
        let stored = hasher.hash("password123").unwrap();
        assert!(stored.starts_with("$pbkdf2-sha256$i=1000,l=32$"));
        assert!(hasher.verify("password123", &stored));
        assert!(!hasher.verify("password124", &stored));
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = PasswordHasher::new(10);
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn verification_uses_stored_rounds() {
        let stored = PasswordHasher::new(20).hash("secret").unwrap();
        assert!(PasswordHasher::new(5_000).verify("secret", &stored));
    }

    #[rstest]
    #[case("")]
    #[case("bcrypt$10$aa$bb")]
    #[case("pbkdf2-sha256$10$aa$bb")]
    #[case("$pbkdf2-sha256$i=10,l=32$not base64!$bb")]
    fn unrecognised_hashes_never_verify(#[case] stored: &str) {
        assert!(!PasswordHasher::new(10).verify("secret", stored));
    }
}
