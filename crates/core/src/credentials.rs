//! Salted, slow password digests stored as
//! `pbkdf2-sha256$<iterations>$<salt-hex>$<hash-hex>`.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::errors::DomainError;

pub const SCHEME: &str = "pbkdf2-sha256";
pub const DEFAULT_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub fn hash_password(password: &SecretString, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    encode(password, &salt, iterations.max(1))
}

/// Returns `Ok(false)` for a wrong password and an error only when the stored
/// digest itself is malformed.
pub fn verify_password(password: &SecretString, encoded: &str) -> Result<bool, DomainError> {
    let parsed = ParsedDigest::parse(encoded)?;

    let mut candidate = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        &parsed.salt,
        parsed.iterations,
        &mut candidate,
    );

    Ok(constant_time_eq(&candidate, &parsed.hash))
}

fn encode(password: &SecretString, salt: &[u8], iterations: u32) -> String {
    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.expose_secret().as_bytes(), salt, iterations, &mut hash);
    format!("{SCHEME}${iterations}${}${}", hex::encode(salt), hex::encode(hash))
}

struct ParsedDigest {
    iterations: u32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl ParsedDigest {
    fn parse(encoded: &str) -> Result<Self, DomainError> {
        let malformed = |detail: &str| {
            DomainError::InvariantViolation(format!("stored credential digest is malformed: {detail}"))
        };

        let mut parts = encoded.split('$');
        let scheme = parts.next().ok_or_else(|| malformed("missing scheme"))?;
        if scheme != SCHEME {
            return Err(malformed("unsupported scheme"));
        }
        let iterations = parts
            .next()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .ok_or_else(|| malformed("bad iteration count"))?;
        let salt = parts
            .next()
            .and_then(|value| hex::decode(value).ok())
            .ok_or_else(|| malformed("bad salt"))?;
        let hash = parts
            .next()
            .and_then(|value| hex::decode(value).ok())
            .filter(|value| value.len() == HASH_LEN)
            .ok_or_else(|| malformed("bad hash"))?;
        if parts.next().is_some() {
            return Err(malformed("trailing segments"));
        }

        Ok(Self { iterations, salt, hash })
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
