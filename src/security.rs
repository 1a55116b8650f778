//! Security boundary: hashing, authenticated encryption and filename hygiene.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::SecurityError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Symmetric key for sealing alerts.
#[derive(Clone)]
pub struct AlertKey([u8; KEY_LEN]);

impl AlertKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl std::fmt::Debug for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AlertKey(..)")
    }
}

/// Encrypt with ChaCha20-Poly1305. Output is `nonce || ciphertext+tag`.
pub fn encrypt(plaintext: &[u8], key: &AlertKey) -> Result<Vec<u8>, SecurityError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce);

    let sealed = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| SecurityError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Inverse of [`encrypt`]. Any modification or a wrong key yields `Integrity`.
pub fn decrypt(sealed: &[u8], key: &AlertKey) -> Result<Vec<u8>, SecurityError> {
    if sealed.len() < NONCE_LEN {
        return Err(SecurityError::Integrity);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SecurityError::Integrity)
}

/// Reduce `name` to a single safe path component.
///
/// Directory components and `.`/`..` segments are stripped, the remaining parts
/// joined with `_`, and anything outside `[A-Za-z0-9._-]` replaced. Leading dots
/// are removed so the result is never hidden or relative.
pub fn sanitize_filename(name: &str) -> Result<String, SecurityError> {
    let joined = name
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>()
        .join("_");

    let cleaned: String = joined
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').replace("..", "_");

    if cleaned.is_empty() {
        return Err(SecurityError::UnsafeFilename(name.to_string()));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_encrypt_round_trip() {
        let key = AlertKey::generate();
        for payload in [&b""[..], &b"Critical Alert!"[..], &[0u8, 255, 7, 42][..]] {
            let sealed = encrypt(payload, &key).unwrap();
            assert_ne!(&sealed[NONCE_LEN..], payload);
            assert_eq!(decrypt(&sealed, &key).unwrap(), payload);
        }
    }

    #[test]
    fn test_tampering_detected() {
        let key = AlertKey::generate();
        let mut sealed = encrypt(b"pressure spike", &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(matches!(decrypt(&sealed, &key), Err(SecurityError::Integrity)));
        assert!(matches!(decrypt(&sealed[..4], &key), Err(SecurityError::Integrity)));
    }

    #[test]
    fn test_wrong_key_detected() {
        let sealed = encrypt(b"vibration", &AlertKey::generate()).unwrap();
        assert!(matches!(
            decrypt(&sealed, &AlertKey::generate()),
            Err(SecurityError::Integrity)
        ));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("log.txt").unwrap(), "log.txt");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "etc_passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini").unwrap(), "boot.ini");
        assert_eq!(sanitize_filename("temp sensor #1").unwrap(), "temp_sensor__1");
        assert_eq!(sanitize_filename(".hidden").unwrap(), "hidden");

        for bad in ["", "..", "../..", "/"] {
            assert!(matches!(
                sanitize_filename(bad),
                Err(SecurityError::UnsafeFilename(_))
            ));
        }
    }
}
