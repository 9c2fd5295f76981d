//! Streaming AEAD variant: same envelope header as [`super::aead`],
//! followed by a sequence of independently-sealed fixed-size plaintext
//! frames (default 1 KiB), each frame's nonce derived from a counter
//! rather than stored alongside it.

use super::aead::{MasterKey, NONCE_LEN, SUBKEY_LEN, TAG_LEN};
use super::nonce::{self, Domain};
use crate::error::{EngineError, Result};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

pub const DEFAULT_FRAME_LEN: usize = 1024;

fn cipher_for(key: &[u8; 32]) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key))
}

fn random_nonce() -> XNonce {
    let mut raw = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut raw).expect("OS RNG available");
    *XNonce::from_slice(&raw)
}

/// Seal `plaintext` as a header (subkey nonce + sealed subkey) followed
/// by `ceil(len / frame_len)` independently-sealed frames, each nonce
/// derived from `(subkey, frame index)` rather than stored.
pub fn seal_stream(master: &MasterKey, aad: &[u8], plaintext: &[u8], frame_len: usize) -> Vec<u8> {
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

    let mut out = Vec::with_capacity(
        NONCE_LEN + sealed_subkey.len() + plaintext.len() + TAG_LEN * (plaintext.len() / frame_len + 1),
    );
    out.extend_from_slice(&subkey_nonce);
    out.extend_from_slice(&sealed_subkey);

    let cipher = cipher_for(&subkey);
    for (idx, frame) in plaintext.chunks(frame_len.max(1)).enumerate() {
        let nonce = nonce::derive(&subkey, Domain::StreamFrame, idx as u64);
        let sealed = cipher
            .encrypt(&nonce, chacha20poly1305::aead::Payload { msg: frame, aad })
            .expect("encrypt with valid key never fails");
        out.extend_from_slice(&(sealed.len() as u32).to_le_bytes());
        out.extend_from_slice(&sealed);
    }
    out
}

/// Open a blob produced by [`seal_stream`]. A failure on any frame is
/// hard: the caller never sees a partially decrypted prefix.
pub fn open_stream(master: &MasterKey, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + SUBKEY_LEN + TAG_LEN {
        return Err(EngineError::corruption("stream", "sealed blob too short"));
    }
    let (subkey_nonce, rest) = sealed.split_at(NONCE_LEN);
    let (sealed_subkey, mut frames) = rest.split_at(SUBKEY_LEN + TAG_LEN);

    let subkey_bytes = cipher_for(&master.0)
        .decrypt(
            XNonce::from_slice(subkey_nonce),
            chacha20poly1305::aead::Payload {
                msg: sealed_subkey,
                aad,
            },
        )
        .map_err(|_| EngineError::corruption("stream", "subkey open failed"))?;
    let mut subkey = [0u8; SUBKEY_LEN];
    subkey.copy_from_slice(&subkey_bytes);
    let cipher = cipher_for(&subkey);

    let mut out = Vec::new();
    let mut idx = 0u64;
    while !frames.is_empty() {
        if frames.len() < 4 {
            return Err(EngineError::corruption("stream", "truncated frame length"));
        }
        let (len_bytes, rest) = frames.split_at(4);
        let frame_len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        if rest.len() < frame_len {
            return Err(EngineError::corruption("stream", "truncated frame body"));
        }
        let (body, rest) = rest.split_at(frame_len);

        let nonce = nonce::derive(&subkey, Domain::StreamFrame, idx);
        let plain = cipher
            .decrypt(&nonce, chacha20poly1305::aead::Payload { msg: body, aad })
            .map_err(|_| EngineError::corruption("stream", format!("frame {idx} open failed")))?;
        out.extend_from_slice(&plain);

        frames = rest;
        idx += 1;
    }
    Ok(out)
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
    fn round_trips_across_many_frames() {
        let m = master();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let sealed = seal_stream(&m, b"object:1", &payload, 64);
        let opened = open_stream(&m, b"object:1", &sealed).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn empty_payload_round_trips() {
        let m = master();
        let sealed = seal_stream(&m, b"aad", &[], DEFAULT_FRAME_LEN);
        let opened = open_stream(&m, b"aad", &sealed).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn corrupted_frame_is_rejected() {
        let m = master();
        let payload = vec![9u8; 5000];
        let mut sealed = seal_stream(&m, b"aad", &payload, 256);
        let mid = sealed.len() / 2;
        sealed[mid] ^= 0xFF;
        assert!(open_stream(&m, b"aad", &sealed).is_err());
    }
}
