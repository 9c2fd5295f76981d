//! Passphrase-at-rest.
//!
//! A passphrase is converted to a 32-byte key via scrypt
//! (`N = 2^15, r = 8, p = 1`). The stored "secret" is
//! `salt(16) || scrypt(passphrase, salt)`, base64-encoded; verification
//! recomputes the KDF and compares in constant time.

use crate::error::{EngineError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use scrypt::Params;
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
pub const MASTER_KEY_LEN: usize = 32;

fn params() -> Params {
    // log2(N) = 15, r = 8, p = 1.
    Params::new(15, 8, 1, KEY_LEN).expect("static scrypt params are valid")
}

fn derive(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    scrypt::scrypt(passphrase, salt, &params(), &mut out).expect("scrypt output length matches");
    out
}

/// Derive a fresh salt and a stored secret blob for a new repository.
/// Returns `(stored_secret_b64, master_key)`.
pub fn create_secret(passphrase: &[u8]) -> (String, [u8; MASTER_KEY_LEN]) {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).expect("OS RNG available");
    let key = derive(passphrase, &salt);

    let mut blob = Vec::with_capacity(SALT_LEN + KEY_LEN);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&key);
    (BASE64.encode(blob), key)
}

/// Verify a passphrase against a stored secret blob, returning the
/// derived master key on success. Even a zero-length passphrase is
/// accepted at the KDF level — it still must match.
pub fn verify_secret(stored_secret_b64: &str, passphrase: &[u8]) -> Result<[u8; MASTER_KEY_LEN]> {
    let blob = BASE64
        .decode(stored_secret_b64.trim())
        .map_err(|e| EngineError::Format(format!("invalid key blob: {e}")))?;
    if blob.len() != SALT_LEN + KEY_LEN {
        return Err(EngineError::Format("key blob has wrong length".into()));
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&blob[..SALT_LEN]);
    let expected = &blob[SALT_LEN..];

    let candidate = derive(passphrase, &salt);
    if candidate.ct_eq(expected).into() {
        Ok(candidate)
    } else {
        Err(EngineError::BadPassphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_passphrase_verifies() {
        let (secret, key) = create_secret(b"hunter2");
        let verified = verify_secret(&secret, b"hunter2").unwrap();
        assert_eq!(verified, key);
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let (secret, _) = create_secret(b"hunter2");
        let err = verify_secret(&secret, b"wrong").unwrap_err();
        assert!(matches!(err, EngineError::BadPassphrase));
    }

    #[test]
    fn empty_passphrase_still_requires_verification() {
        let (secret, key) = create_secret(b"");
        assert_eq!(verify_secret(&secret, b"").unwrap(), key);
        assert!(verify_secret(&secret, b"nonempty").is_err());
    }
}
