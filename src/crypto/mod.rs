//! AES-256-CBC encryption and Argon2id key/IV derivation.
//!
//! # Key and IV derivation
//! The on-page format has nowhere to store a random nonce — the encrypted
//! stream is just the compressed file, padded to a 16-byte boundary, with no
//! header of its own (the superblock already carries `datasize`/`filecrc`).
//! So both the 32-byte key *and* the 16-byte IV are derived from the
//! password via Argon2id, each with its own fixed, domain-separated salt.
//! This makes encryption deterministic for a given password: the same file
//! encrypted twice with the same password produces the same ciphertext,
//! which is acceptable here since the threat model is "a lost/stolen
//! printout", not protecting against a chosen-plaintext adversary who can
//! also observe repeated encryptions of related files.
//!
//! # Padding
//! `encrypt`/`decrypt` require the input to already be a multiple of 16
//! bytes (the compression stage's [`crate::compression::pad_to_block`]
//! guarantees this) and use no CBC padding scheme of their own — the block
//! cipher operates directly on the already-aligned buffer.

use aes::Aes256;
use argon2::{Algorithm, Argon2, Params, Version};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_SALT: &[u8] = b"paperback-v1/key";
const IV_SALT: &[u8] = b"paperback-v1/iv";

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption input is {0} bytes, not a multiple of 16")]
    Unaligned(usize),
    #[error("decryption failed — wrong password or corrupted data")]
    DecryptionFailed,
}

fn argon2() -> Argon2<'static> {
    // m=64 MiB, t=3, p=1 — same conservative parameters used elsewhere in
    // this crate's Argon2id calls, sized for a CLI invocation rather than a
    // latency-sensitive server path.
    let params = Params::new(64 * 1024, 3, 1, Some(32)).expect("static Argon2 params are valid");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Derive the 32-byte AES-256 key from `password`.
pub fn derive_key(password: &str) -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    argon2()
        .hash_password_into(password.as_bytes(), KEY_SALT, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Derive the 16-byte CBC IV from `password`.
pub fn derive_iv(password: &str) -> Result<[u8; 16], CryptoError> {
    let mut wide = [0u8; 32];
    argon2()
        .hash_password_into(password.as_bytes(), IV_SALT, &mut wide)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&wide[..16]);
    Ok(iv)
}

/// Encrypt `plaintext` (already padded to a 16-byte multiple) with AES-256-CBC.
pub fn encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if plaintext.len() % 16 != 0 {
        return Err(CryptoError::Unaligned(plaintext.len()));
    }
    let mut buf = plaintext.to_vec();
    let ciphertext = Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, plaintext.len())
        .expect("buffer is already block-aligned; NoPadding cannot overflow it");
    Ok(ciphertext.to_vec())
}

/// Decrypt a ciphertext produced by [`encrypt`] with the same key/IV.
pub fn decrypt(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() % 16 != 0 {
        return Err(CryptoError::Unaligned(ciphertext.len()));
    }
    let mut buf = ciphertext.to_vec();
    let plaintext = Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_correct_password() {
        let key = derive_key("hunter2").unwrap();
        let iv = derive_iv("hunter2").unwrap();
        let plaintext = b"0123456789ABCDEF0123456789ABCDEF".to_vec(); // 32 bytes
        let ciphertext = encrypt(&key, &iv, &plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_password_does_not_reproduce_plaintext() {
        let plaintext = vec![0x5Au8; 32];
        let ciphertext = encrypt(
            &derive_key("correct horse").unwrap(),
            &derive_iv("correct horse").unwrap(),
            &plaintext,
        )
        .unwrap();

        let wrong_key = derive_key("battery staple").unwrap();
        let wrong_iv = derive_iv("battery staple").unwrap();
        let decrypted = decrypt(&wrong_key, &wrong_iv, &ciphertext).unwrap();
        assert_ne!(decrypted, plaintext);
    }

    #[test]
    fn key_and_iv_derivation_are_deterministic() {
        assert_eq!(derive_key("pw").unwrap(), derive_key("pw").unwrap());
        assert_eq!(derive_iv("pw").unwrap(), derive_iv("pw").unwrap());
        assert_ne!(derive_key("pw").unwrap(), derive_key("pw2").unwrap());
    }

    #[test]
    fn key_and_iv_are_independent() {
        let key = derive_key("pw").unwrap();
        let iv = derive_iv("pw").unwrap();
        assert_ne!(&key[..16], &iv[..]);
    }

    #[test]
    fn rejects_unaligned_input() {
        let key = [0u8; 32];
        let iv = [0u8; 16];
        assert!(matches!(
            encrypt(&key, &iv, &[1, 2, 3]),
            Err(CryptoError::Unaligned(3))
        ));
    }
}
