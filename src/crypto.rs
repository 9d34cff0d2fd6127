//! Optional symmetric encryption of BLOCK_XFER payloads — AES-128 in CBC
//! mode.
//!
//! # Key and IV
//!
//! [`CipherState::new_random`] generates a fresh 16-byte key and 16-byte IV
//! at session start, as the original client does. The IV is **reset** (the
//! CBC chain restarted from the original IV, not carried over from the
//! previous call) before every encrypt/decrypt, because every BLOCK_XFER
//! payload is exactly one `BLOCK_SIZE`-byte unit — there is no cross-call
//! chaining in this protocol.
//!
//! # Unresolved requirement (carried forward, not silently fixed)
//!
//! The client never transmits its key to the server: as written, a real
//! device server cannot decrypt payloads encrypted with a client-generated
//! random key unless the key is somehow pre-shared out of band. This crate
//! does not invent a key-exchange step; [`CipherState::new_random`] is only
//! useful against a server configured with the same key via some mechanism
//! outside this crate's scope.

use aes::Aes128;
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use thiserror::Error;

pub const KEY_LEN: usize = 16;
pub const IV_LEN: usize = 16;

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("payload length {0} is not a multiple of the AES block size (16)")]
    UnalignedPayload(usize),
}

/// A session's encryption key and the fixed IV it resets to before every
/// block transfer.
#[derive(Clone)]
pub struct CipherState {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl CipherState {
    /// Generate a fresh random key and IV (see the module-level doc for the
    /// caveat about key distribution).
    pub fn new_random() -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    #[cfg(test)]
    pub fn from_parts(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Encrypt `plaintext` (exactly `BLOCK_SIZE` bytes) with the IV reset to
    /// its session-start value.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.len() % 16 != 0 {
            return Err(CryptoError::UnalignedPayload(plaintext.len()));
        }
        let enc = Aes128CbcEnc::new(&self.key.into(), &self.iv.into());
        Ok(enc.encrypt_padded_vec_mut::<NoPadding>(plaintext))
    }

    /// Decrypt `ciphertext` (exactly `BLOCK_SIZE` bytes) with the IV reset
    /// to its session-start value.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() % 16 != 0 {
            return Err(CryptoError::UnalignedPayload(ciphertext.len()));
        }
        let dec = Aes128CbcDec::new(&self.key.into(), &self.iv.into());
        dec.decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip_one_block() {
        let cipher = CipherState::from_parts([7u8; 16], [9u8; 16]);
        let plaintext = vec![0x42u8; 256];
        let ct = cipher.encrypt(&plaintext).unwrap();
        assert_eq!(ct.len(), plaintext.len());
        let pt = cipher.decrypt(&ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn iv_reset_makes_repeated_encryption_deterministic() {
        let cipher = CipherState::from_parts([1u8; 16], [2u8; 16]);
        let plaintext = vec![0xAAu8; 256];
        let ct1 = cipher.encrypt(&plaintext).unwrap();
        let ct2 = cipher.encrypt(&plaintext).unwrap();
        assert_eq!(ct1, ct2, "IV must reset to the same value before each call");
    }

    #[test]
    fn unaligned_payload_rejected() {
        let cipher = CipherState::from_parts([1u8; 16], [2u8; 16]);
        assert!(cipher.encrypt(&[0u8; 10]).is_err());
    }
}
