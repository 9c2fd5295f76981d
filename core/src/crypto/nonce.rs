//! Nonce derivation shared by the envelope and streaming AEAD layers:
//! a blake3-derived nonce from salt + domain + counter, rather than
//! storing random nonces out of band.

use blake3::Hasher;
use chacha20poly1305::XNonce;

/// Domain-separation tag so the same `(salt, counter)` pair never
/// derives the same nonce across unrelated uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    SubkeyWrap,
    Payload,
    StreamFrame,
}

impl Domain {
    fn tag(self) -> u8 {
        match self {
            Domain::SubkeyWrap => 1,
            Domain::Payload => 2,
            Domain::StreamFrame => 3,
        }
    }
}

/// `nonce = blake3(salt || domain || counter).take(24)` — XChaCha
/// requires a 24-byte nonce.
pub fn derive(salt: &[u8], domain: Domain, counter: u64) -> XNonce {
    let mut h = Hasher::new();
    h.update(salt);
    h.update(&[domain.tag()]);
    h.update(&counter.to_le_bytes());
    let out = h.finalize();
    *XNonce::from_slice(&out.as_bytes()[..24])
}
