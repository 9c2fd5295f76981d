//! Named digest functions.
//!
//! Configuration records a hasher's *name*, never its identity, so a
//! repository created under one version keeps working if later versions
//! add hashers. `lookup` is the only way in; there is no way to construct
//! a `&dyn Hasher` except through the registry.

use crate::error::{EngineError, Result};
use std::io::Read;

pub const DIGEST_LEN: usize = 32;

/// Fixed-width digest. Equality defines object identity in every
/// content-addressed namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| EngineError::Format(format!("invalid digest hex: {e}")))?;
        if bytes.len() != DIGEST_LEN {
            return Err(EngineError::Format(format!(
                "expected {DIGEST_LEN}-byte digest, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&bytes);
        Ok(Digest(out))
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A named digest function over a byte stream.
pub trait Hasher: Send + Sync {
    fn name(&self) -> &'static str;
    fn digest_reader(&self, r: &mut dyn Read) -> Result<Digest>;
    fn digest_bytes(&self, buf: &[u8]) -> Digest;
}

struct Blake3;

impl Hasher for Blake3 {
    fn name(&self) -> &'static str {
        "BLAKE3"
    }

    fn digest_reader(&self, r: &mut dyn Read) -> Result<Digest> {
        let mut hasher = blake3::Hasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest(*hasher.finalize().as_bytes()))
    }

    fn digest_bytes(&self, buf: &[u8]) -> Digest {
        Digest(*blake3::hash(buf).as_bytes())
    }
}

struct Sha256;

impl Hasher for Sha256 {
    fn name(&self) -> &'static str {
        "SHA-256"
    }

    fn digest_reader(&self, r: &mut dyn Read) -> Result<Digest> {
        use sha2::Digest as _;
        let mut hasher = sha2::Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest(hasher.finalize().into()))
    }

    fn digest_bytes(&self, buf: &[u8]) -> Digest {
        use sha2::Digest as _;
        Digest(sha2::Sha256::digest(buf).into())
    }
}

/// `lookup(name)` / `default()`. New hashers are added here,
/// never constructed directly by callers.
pub fn lookup(name: &str) -> Result<&'static dyn Hasher> {
    match name {
        "BLAKE3" => Ok(&Blake3),
        "SHA-256" => Ok(&Sha256),
        other => Err(EngineError::UnsupportedAlgorithm(other.to_string())),
    }
}

pub fn default_hasher() -> &'static dyn Hasher {
    &Blake3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrips_hex() {
        let d = default_hasher().digest_bytes(b"hello world");
        let hex = d.to_hex();
        let back = Digest::from_hex(&hex).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn unknown_name_is_unsupported() {
        let err = lookup("SHA-512").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn sha256_reader_and_bytes_agree() {
        let hasher = lookup("SHA-256").unwrap();
        let data = vec![9u8; 150_000];
        let mut cursor = std::io::Cursor::new(&data);
        let a = hasher.digest_reader(&mut cursor).unwrap();
        let b = hasher.digest_bytes(&data);
        assert_eq!(a, b);
        assert_eq!(hasher.name(), "SHA-256");
    }

    #[test]
    fn reader_and_bytes_agree() {
        let data = vec![7u8; 300_000];
        let mut cursor = std::io::Cursor::new(&data);
        let a = default_hasher().digest_reader(&mut cursor).unwrap();
        let b = default_hasher().digest_bytes(&data);
        assert_eq!(a, b);
    }
}
