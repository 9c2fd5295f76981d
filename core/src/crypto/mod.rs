//! Encryption: passphrase-derived key material plus
//! envelope/streaming AEAD for blobs.

pub mod aead;
pub mod kdf;
pub mod nonce;
pub mod stream;

pub use aead::MasterKey;
