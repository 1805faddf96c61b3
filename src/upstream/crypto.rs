//! Key derivation and frame decryption for the fe-web transport.
//!
//! fe-web encrypts each WebSocket binary frame as
//! `[12 B IV][ciphertext][16 B tag]` with AES-256-GCM and no associated
//! data. The key is derived once per connection from the shared password.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hmac::Hmac;
use sha2::Sha256;

use crate::error::{UpstreamError, UpstreamResult};

const KEY_SIZE: usize = 32;
const IV_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const PBKDF2_ITERATIONS: u32 = 10_000;
const PBKDF2_SALT: &[u8] = b"irssi-fe-web-v1";

/// Derive the 32-byte AES-256 key from the shared password.
pub fn derive_key(password: &str) -> UpstreamResult<[u8; KEY_SIZE]> {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(
        password.as_bytes(),
        PBKDF2_SALT,
        PBKDF2_ITERATIONS,
        &mut key,
    )
    .map_err(|_| UpstreamError::KeyDerivation)?;
    Ok(key)
}

/// Decrypt one binary frame. The returned plaintext is UTF-8 JSON.
pub fn decrypt_frame(key: &[u8; KEY_SIZE], frame: &[u8]) -> UpstreamResult<Vec<u8>> {
    if frame.len() < IV_SIZE + TAG_SIZE {
        return Err(UpstreamError::FrameTooShort(frame.len()));
    }

    let (iv, sealed) = frame.split_at(IV_SIZE);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| UpstreamError::KeyDerivation)?;

    // aes-gcm expects ciphertext with the tag appended, which is exactly
    // the frame layout after the IV.
    cipher
        .decrypt(Nonce::from_slice(iv), sealed)
        .map_err(|_| UpstreamError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt_frame(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Vec<u8> {
        let cipher = Aes256Gcm::new_from_slice(key).unwrap();
        let sealed = cipher.encrypt(Nonce::from_slice(iv), plaintext).unwrap();
        let mut frame = iv.to_vec();
        frame.extend_from_slice(&sealed);
        frame
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let a = derive_key("secret").unwrap();
        let b = derive_key("secret").unwrap();
        let c = derive_key("other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn frame_roundtrip() {
        let key = derive_key("hunter2").unwrap();
        let frame = encrypt_frame(&key, &[7u8; IV_SIZE], br#"{"type":"pong"}"#);
        let plaintext = decrypt_frame(&key, &frame).unwrap();
        assert_eq!(plaintext, br#"{"type":"pong"}"#);
    }

    #[test]
    fn minimum_frame_decrypts_to_empty_plaintext() {
        // IV + empty ciphertext + tag: exactly 28 bytes, valid but empty.
        let key = derive_key("hunter2").unwrap();
        let frame = encrypt_frame(&key, &[1u8; IV_SIZE], b"");
        assert_eq!(frame.len(), IV_SIZE + TAG_SIZE);
        let plaintext = decrypt_frame(&key, &frame).unwrap();
        assert!(plaintext.is_empty());

        // JSON parsing of the empty document fails, but the error is a
        // parse error, not a decrypt error.
        let parsed: Result<serde_json::Value, _> = serde_json::from_slice(&plaintext);
        assert!(parsed.is_err());
    }

    #[test]
    fn short_frames_are_rejected() {
        let key = derive_key("hunter2").unwrap();
        match decrypt_frame(&key, &[0u8; 27]) {
            Err(UpstreamError::FrameTooShort(27)) => {}
            other => panic!("expected FrameTooShort, got {other:?}"),
        }
    }

    #[test]
    fn tampered_frames_fail_authentication() {
        let key = derive_key("hunter2").unwrap();
        let mut frame = encrypt_frame(&key, &[2u8; IV_SIZE], b"payload");
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(matches!(
            decrypt_frame(&key, &frame),
            Err(UpstreamError::Decrypt)
        ));
    }
}
