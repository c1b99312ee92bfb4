//! Password records: PBKDF2-HMAC-SHA256 with a per-record salt and work factor.
//!
//! The iteration count is stored next to the salt and hash, so raising the
//! default only affects records written afterwards; existing records keep
//! verifying with the count they were created with.

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Default PBKDF2 work factor for newly written records.
pub const DEFAULT_ITERATIONS: u32 = 210_000;

/// Salt length in bytes (stored hex-encoded).
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (stored hex-encoded).
pub const KEY_LEN: usize = 32;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 4;

/// One user's stored credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRecord {
    pub salt: String,
    #[serde(default = "default_iterations", deserialize_with = "lenient_iterations")]
    pub iterations: u32,
    pub hash: String,
    #[serde(default)]
    pub must_change_password: bool,
    /// Fields written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

/// Older records may carry the count as a string; anything unusable falls
/// back to the default.
fn lenient_iterations<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|n| *n >= 1).unwrap_or(DEFAULT_ITERATIONS))
}

impl PasswordRecord {
    /// Build a fresh record for `password` with a random salt.
    pub fn new(password: &str, iterations: u32) -> Self {
        let iterations = iterations.max(1);
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill(&mut salt);
        let key = pbkdf2_sha256(password.as_bytes(), &salt, iterations, KEY_LEN);

        Self {
            salt: hex::encode(salt),
            iterations,
            hash: hex::encode(key),
            must_change_password: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Recompute the derived key and compare it in constant time.
    pub fn verify(&self, password: &str) -> bool {
        let (Ok(salt), Ok(expected)) = (hex::decode(&self.salt), hex::decode(&self.hash)) else {
            return false;
        };
        if salt.is_empty() || expected.is_empty() {
            return false;
        }
        let computed = pbkdf2_sha256(password.as_bytes(), &salt, self.iterations, expected.len());
        computed.ct_eq(&expected).into()
    }
}

/// Burn one derivation's worth of work so a lookup miss costs the same as a
/// wrong password.
pub fn dummy_verify(password: &str, iterations: u32) {
    let salt = [0u8; SALT_LEN];
    let _ = pbkdf2_sha256(password.as_bytes(), &salt, iterations.max(1), KEY_LEN);
}

/// HMAC-SHA256 keyed with `password`. The key block is built up front:
/// keys longer than the SHA-256 block are hashed, shorter ones zero-padded.
fn hmac_sha256(password: &[u8]) -> HmacSha256 {
    let mut key = Key::<HmacSha256>::default();
    if password.len() > key.len() {
        let digest = <Sha256 as sha2::Digest>::digest(password);
        key[..digest.len()].copy_from_slice(&digest);
    } else {
        key[..password.len()].copy_from_slice(password);
    }
    <HmacSha256 as KeyInit>::new(&key)
}

/// PBKDF2 (RFC 8018 §5.2) with HMAC-SHA256 as the PRF.
///
/// Block `i` is `U_1 ^ U_2 ^ ... ^ U_c` where `U_1 = PRF(P, S || INT(i))` and
/// `U_j = PRF(P, U_{j-1})`; blocks are concatenated and truncated to `key_len`.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32, key_len: usize) -> Vec<u8> {
    const H_LEN: usize = 32;
    let prf = hmac_sha256(password);

    let blocks = key_len.div_ceil(H_LEN);
    let mut out = Vec::with_capacity(blocks * H_LEN);

    for block in 1..=blocks as u32 {
        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&block.to_be_bytes());
        let mut u = mac.finalize().into_bytes();
        let mut t = u.clone();

        for _ in 1..iterations {
            let mut mac = prf.clone();
            mac.update(&u);
            u = mac.finalize().into_bytes();
            for (acc, byte) in t.iter_mut().zip(u.iter()) {
                *acc ^= byte;
            }
        }
        out.extend_from_slice(&t);
    }

    out.truncate(key_len);
    out
}
