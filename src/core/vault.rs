//! Credential vault - at-rest encryption for the stored account password
//!
//! AES-256-CBC with a fixed application key and a fresh random IV per
//! encryption; the blob format is base64(IV || ciphertext). The embedded key
//! makes this obfuscation against casual disk inspection, not confidentiality
//! against code inspection. The scheme must stay stable so previously
//! persisted blobs keep decrypting.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_PASSPHRASE: &str = "LaunchPilot2024!SecureKey32BytesLong!";
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Derive the fixed 256-bit key: passphrase bytes padded with zeros or
/// truncated to exactly 32 bytes.
fn cipher_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    let bytes = KEY_PASSPHRASE.as_bytes();
    let len = bytes.len().min(key.len());
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

/// Encrypt a secret into an opaque base64 blob.
///
/// Non-deterministic: every call draws a fresh IV.
pub fn encrypt(plaintext: &str) -> String {
    let key = cipher_key();
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    BASE64.encode(blob)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Returns the empty string on any malformed input (bad base64, blob shorter
/// than the IV, ciphertext length not a block multiple, bad padding, invalid
/// UTF-8); callers treat the empty string as "no usable credential".
pub fn decrypt(blob: &str) -> String {
    let Ok(bytes) = BASE64.decode(blob.trim()) else {
        return String::new();
    };
    if bytes.len() <= IV_LEN || (bytes.len() - IV_LEN) % BLOCK_LEN != 0 {
        return String::new();
    }

    let key = cipher_key();
    let (iv, ciphertext) = bytes.split_at(IV_LEN);
    let Ok(decryptor) = Aes256CbcDec::new_from_slices(&key, iv) else {
        return String::new();
    };
    let Ok(plaintext) = decryptor.decrypt_padded_vec_mut::<Pkcs7>(ciphertext) else {
        return String::new();
    };
    String::from_utf8(plaintext).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_secrets() {
        for secret in ["hunter2", "", "päßwörd with späces", "16-bytes-exactly", "a"] {
            assert_eq!(decrypt(&encrypt(secret)), secret, "secret: {secret:?}");
        }
    }

    #[test]
    fn encryption_is_non_deterministic() {
        let first = encrypt("same secret");
        let second = encrypt("same secret");
        assert_ne!(first, second);
        // Both still decrypt
        assert_eq!(decrypt(&first), "same secret");
        assert_eq!(decrypt(&second), "same secret");
    }

    #[test]
    fn malformed_blobs_decrypt_to_empty() {
        assert_eq!(decrypt(""), "");
        assert_eq!(decrypt("not base64 at all!"), "");
        // Valid base64 but shorter than the IV
        assert_eq!(decrypt(&BASE64.encode([0u8; 8])), "");
        // IV alone with no ciphertext
        assert_eq!(decrypt(&BASE64.encode([0u8; 16])), "");
        // Ciphertext length not a multiple of the block size
        assert_eq!(decrypt(&BASE64.encode([0u8; 17])), "");
        assert_eq!(decrypt(&BASE64.encode([0u8; 47])), "");
    }

    #[test]
    fn blob_layout_is_iv_then_ciphertext() {
        let blob = encrypt("layout");
        let bytes = BASE64.decode(blob).unwrap();
        assert!(bytes.len() > IV_LEN);
        assert_eq!((bytes.len() - IV_LEN) % BLOCK_LEN, 0);
    }
}
