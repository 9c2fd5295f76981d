//! Data-at-rest envelope AEAD.
//!
//! For every stored blob: a fresh 32-byte subkey is generated, sealed
//! under the master key, and the payload is sealed under the subkey.
//! On disk: `subkey_nonce || sealed_subkey || data_nonce || sealed_payload`.
//! A two-layer envelope rather than a single fixed-key scheme, so a
//! leaked per-blob subkey never exposes the master key.

use super::nonce::{self, Domain};
use crate::error::{EngineError, Result};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const SUBKEY_LEN: usize = 32;

#[derive(Clone, Copy)]
pub struct MasterKey(pub [u8; 32]);

fn cipher_for(key: &[u8; 32]) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key))
}

fn random_nonce() -> XNonce {
    let mut raw = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut raw).expect("OS RNG available");
    *XNonce::from_slice(&raw)
}

/// Seal `plaintext` under a fresh subkey, itself sealed under `master`.
/// `aad` binds the ciphertext to its logical location (e.g. namespace +
/// digest) so a sealed blob can't be silently moved to another slot.
pub fn seal(master: &MasterKey, aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut subkey = [0u8; SUBKEY_LEN];
    getrandom::getrandom(&mut subkey).expect("OS RNG available");

    let subkey_nonce = random_nonce();
    let sealed_subkey = cipher_for(&master.0)
        .encrypt(
            &subkey_nonce,
            chacha20poly1305::aead::Payload {
                msg: &subkey,
                aad,
            },
        )
        .expect("encrypt with valid key never fails");

    let data_nonce = random_nonce();
    let sealed_payload = cipher_for(&subkey)
        .encrypt(
            &data_nonce,
            chacha20poly1305::aead::Payload {
                msg: plaintext,
                aad,
            },
        )
        .expect("encrypt with valid key never fails");

    let mut out =
        Vec::with_capacity(NONCE_LEN * 2 + sealed_subkey.len() + sealed_payload.len());
    out.extend_from_slice(&subkey_nonce);
    out.extend_from_slice(&sealed_subkey);
    out.extend_from_slice(&data_nonce);
    out.extend_from_slice(&sealed_payload);
    out
}

/// Open a blob produced by [`seal`]. Every failure is hard: callers
/// never observe partially decrypted output.
pub fn open(master: &MasterKey, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    let min_len = NONCE_LEN + SUBKEY_LEN + TAG_LEN + NONCE_LEN + TAG_LEN;
    if sealed.len() < min_len {
        return Err(EngineError::corruption("envelope", "sealed blob too short"));
    }

    let (subkey_nonce, rest) = sealed.split_at(NONCE_LEN);
    let (sealed_subkey, rest) = rest.split_at(SUBKEY_LEN + TAG_LEN);
    let (data_nonce, sealed_payload) = rest.split_at(NONCE_LEN);

    let subkey_bytes = cipher_for(&master.0)
        .decrypt(
            XNonce::from_slice(subkey_nonce),
            chacha20poly1305::aead::Payload {
                msg: sealed_subkey,
                aad,
            },
        )
        .map_err(|_| EngineError::corruption("envelope", "subkey open failed"))?;
    let mut subkey = [0u8; SUBKEY_LEN];
    subkey.copy_from_slice(&subkey_bytes);

    cipher_for(&subkey)
        .decrypt(
            XNonce::from_slice(data_nonce),
            chacha20poly1305::aead::Payload {
                msg: sealed_payload,
                aad,
            },
        )
        .map_err(|_| EngineError::corruption("envelope", "payload open failed"))
}

/// Derive a nonce for a context where randomness would need to be
/// stored out of band anyway (e.g. streaming frames); kept distinct
/// from [`seal`]'s random nonces, which never need reproducing.
pub fn derived_nonce(salt: &[u8], domain: Domain, counter: u64) -> XNonce {
    nonce::derive(salt, domain, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterKey {
        let mut k = [0u8; 32];
        getrandom::getrandom(&mut k).unwrap();
        MasterKey(k)
    }

    #[test]
    fn seal_then_open_round_trips() {
        let m = master();
        let plaintext = b"snapshot section bytes";
        let sealed = seal(&m, b"chunk:abc", plaintext);
        let opened = open(&m, b"chunk:abc", &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_aad_fails_to_open() {
        let m = master();
        let sealed = seal(&m, b"chunk:abc", b"data");
        assert!(open(&m, b"chunk:def", &sealed).is_err());
    }

    #[test]
    fn bit_flip_is_detected() {
        let m = master();
        let mut sealed = seal(&m, b"aad", b"payload bytes");
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&m, b"aad", &sealed).is_err());
    }

    #[test]
    fn two_seals_of_same_plaintext_differ() {
        let m = master();
        let a = seal(&m, b"aad", b"same plaintext");
        let b = seal(&m, b"aad", b"same plaintext");
        assert_ne!(a, b, "fresh subkey+nonce per call must randomize ciphertext");
    }
}
