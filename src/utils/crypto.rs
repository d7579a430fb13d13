// Crypto primitives shared across the credential and two-factor services.
// Password hashing lives in `utils/password.rs`, JWT signing in
// `services/jwt.rs` - this module covers what neither of those already
// provide: TOTP-secret-at-rest encryption, constant-time comparisons and
// CSPRNG-backed random token/code generation.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AesOsRng},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("ciphertext is malformed or too short")]
    MalformedCiphertext,

    #[error("decryption failed - wrong key or tampered ciphertext")]
    DecryptionFailed,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

const NONCE_LEN: usize = 12;

/// Encrypts `plaintext` with AES-256-GCM under `key` (32 raw bytes).
/// Output layout is `nonce || ciphertext_with_tag`, so a single `Bytea`
/// column can hold it with no separate nonce column.
pub fn encrypt_secret(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != 32 {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut AesOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverses `encrypt_secret`. Rotation path: decrypt with the old key,
/// re-encrypt with the current one, on next use of the secret.
pub fn decrypt_secret(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != 32 {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }
    if sealed.len() <= NONCE_LEN {
        return Err(CryptoError::MalformedCiphertext);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Constant-time equality for secrets (codes, tokens, hashes-as-strings).
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    // Compare lengths first is fine - length alone isn't the sensitive bit,
    // the *content* match/mismatch at matched length is.
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// CSPRNG-backed random byte generation, used for refresh tokens, reset
/// tokens, verification tokens and backup codes alike.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Base64url (no padding) encoding of `n` random bytes - the shape used for
/// opaque refresh/reset/verification tokens.
pub fn random_token(n: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(random_bytes(n))
}

/// A random numeric code of `digits` digits, left-zero-padded (e.g. 2FA
/// email codes). Rejection sampling avoids modulo bias.
pub fn random_numeric_code(digits: u32) -> String {
    let max = 10u64.pow(digits);
    let mut buf = [0u8; 8];
    let n = loop {
        rand::rngs::OsRng.fill_bytes(&mut buf);
        let candidate = u64::from_le_bytes(buf);
        let limit = u64::MAX - (u64::MAX % max);
        if candidate < limit {
            break candidate % max;
        }
    };
    format!("{:0width$}", n, width = digits as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = random_bytes(32);
        let plaintext = b"JBSWY3DPEHPK3PXP";
        let sealed = encrypt_secret(&key, plaintext).unwrap();
        assert_ne!(sealed, plaintext);
        let opened = decrypt_secret(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let key = random_bytes(32);
        let other_key = random_bytes(32);
        let sealed = encrypt_secret(&key, b"secret").unwrap();
        assert!(decrypt_secret(&other_key, &sealed).is_err());
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let key = random_bytes(32);
        let mut sealed = encrypt_secret(&key, b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(decrypt_secret(&key, &sealed).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(matches!(
            encrypt_secret(&[0u8; 16], b"x"),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn constant_time_eq_matches_and_mismatches() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("short", "longer-string"));
    }

    #[test]
    fn random_numeric_code_has_requested_digits() {
        for _ in 0..50 {
            let code = random_numeric_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn random_token_is_url_safe() {
        let token = random_token(32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
