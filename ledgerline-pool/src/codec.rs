//! Authenticated encryption of tenant database passwords at rest.
//!
//! Blob layout (before base64):
//!
//! ```text
//! | salt (16) | iv (12) | tag (16) | ciphertext (n) |
//! ```
//!
//! The master key is the SHA-256 of the server secret. Each call draws a fresh
//! salt and IV and derives a per-call AES-256-GCM key from the master key with
//! PBKDF2-HMAC-SHA256.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ledgerline_core::{ConfigError, CredentialError};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Symmetric codec for stored credential blobs.
#[derive(Clone)]
pub struct CredentialCodec {
    master_key: [u8; KEY_LEN],
    iterations: u32,
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("master_key", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl CredentialCodec {
    /// Build a codec from the server-wide secret.
    ///
    /// # Errors
    /// `ConfigError::MissingRequired` when the secret is absent or blank, and
    /// `ConfigError::InvalidValue` when `iterations` is zero.
    pub fn new(secret: Option<&SecretString>, iterations: u32) -> Result<Self, ConfigError> {
        let secret = secret
            .map(|s| s.expose_secret())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "LEDGERLINE_ENCRYPTION_KEY".to_string(),
            })?;

        if iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "LEDGERLINE_PBKDF2_ITERATIONS".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mut master_key = [0u8; KEY_LEN];
        master_key.copy_from_slice(&Sha256::digest(secret.as_bytes()));

        Ok(Self {
            master_key,
            iterations,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(&self.master_key, salt, self.iterations, &mut key);
        key
    }

    /// Encrypt a plaintext password into a base64 blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);

        let key = self.derive_key(&salt);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| CredentialError::Encryption {
                reason: e.to_string(),
            })?;

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| CredentialError::Encryption {
                reason: e.to_string(),
            })?;

        let mut blob = Vec::with_capacity(HEADER_LEN + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(tag.as_slice());
        blob.extend_from_slice(&buffer);

        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`CredentialCodec::encrypt`].
    ///
    /// The returned plaintext is wrapped so it cannot leak through `Debug`.
    pub fn decrypt(&self, blob: &str) -> Result<SecretString, CredentialError> {
        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|e| CredentialError::Decryption {
                reason: format!("invalid base64: {}", e),
            })?;

        if raw.len() < HEADER_LEN {
            return Err(CredentialError::Decryption {
                reason: format!("blob too short: {} bytes", raw.len()),
            });
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let key = self.derive_key(salt);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| CredentialError::Decryption {
                reason: e.to_string(),
            })?;

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(iv),
                b"",
                &mut buffer,
                Tag::from_slice(tag),
            )
            .map_err(|_| CredentialError::Decryption {
                reason: "authentication tag mismatch".to_string(),
            })?;

        let plaintext = String::from_utf8(buffer).map_err(|_| CredentialError::Decryption {
            reason: "plaintext is not valid UTF-8".to_string(),
        })?;

        Ok(SecretString::new(plaintext.into()))
    }

    /// [`CredentialCodec::encrypt`] on tokio's blocking pool.
    ///
    /// Key derivation is CPU-bound; async callers use this so a rotation does
    /// not stall the worker thread.
    pub async fn encrypt_async(&self, plaintext: &str) -> Result<String, CredentialError> {
        let codec = self.clone();
        let plaintext = SecretString::new(plaintext.into());
        tokio::task::spawn_blocking(move || codec.encrypt(plaintext.expose_secret()))
            .await
            .map_err(|e| CredentialError::Encryption {
                reason: format!("codec task failed: {}", e),
            })?
    }

    /// [`CredentialCodec::decrypt`] on tokio's blocking pool.
    pub async fn decrypt_async(&self, blob: &str) -> Result<SecretString, CredentialError> {
        let codec = self.clone();
        let blob = blob.to_string();
        tokio::task::spawn_blocking(move || codec.decrypt(&blob))
            .await
            .map_err(|e| CredentialError::Decryption {
                reason: format!("codec task failed: {}", e),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        let secret = SecretString::new("unit-test-secret".into());
        CredentialCodec::new(Some(&secret), 1_000).expect("codec")
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let err = CredentialCodec::new(None, 1_000).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));

        let blank = SecretString::new("   ".into());
        assert!(CredentialCodec::new(Some(&blank), 1_000).is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let secret = SecretString::new("s".into());
        let err = CredentialCodec::new(Some(&secret), 0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_roundtrip() {
        let codec = codec();
        let blob = codec.encrypt("hunter2").expect("encrypt");
        let plain = codec.decrypt(&blob).expect("decrypt");
        assert_eq!(plain.expose_secret(), "hunter2");
    }

    #[test]
    fn test_fresh_salt_per_call() {
        let codec = codec();
        let a = codec.encrypt("same").expect("encrypt");
        let b = codec.encrypt("same").expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let blob = codec().encrypt("hunter2").expect("encrypt");
        let other = SecretString::new("another-secret".into());
        let other = CredentialCodec::new(Some(&other), 1_000).expect("codec");
        assert!(matches!(
            other.decrypt(&blob),
            Err(CredentialError::Decryption { .. })
        ));
    }

    #[test]
    fn test_malformed_input() {
        let codec = codec();
        assert!(codec.decrypt("not base64 !!").is_err());
        assert!(codec.decrypt(&STANDARD.encode([0u8; 10])).is_err());
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let codec = codec();
        let blob = codec.encrypt("").expect("encrypt");
        assert_eq!(codec.decrypt(&blob).expect("decrypt").expose_secret(), "");
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let codec = codec();
        let blob = codec.encrypt_async("hunter2").await.expect("encrypt");
        let plain = codec.decrypt_async(&blob).await.expect("decrypt");
        assert_eq!(plain.expose_secret(), "hunter2");
        assert!(codec.decrypt_async("garbage").await.is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_async_decrypt_leaves_runtime_free() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let secret = SecretString::new("unit-test-secret".into());
        let codec = CredentialCodec::new(Some(&secret), DEFAULT_ITERATIONS).expect("codec");
        let blob = codec.encrypt("hunter2").expect("encrypt");

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        // On a single-threaded runtime the ticker only runs if decryption
        // yields the thread.
        codec.decrypt_async(&blob).await.expect("decrypt");
        assert!(ticks.load(Ordering::SeqCst) > 0);
        ticker.abort();
    }

    #[test]
    fn test_debug_hides_key() {
        let rendered = format!("{:?}", codec());
        assert!(rendered.contains("[REDACTED]"));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> CredentialCodec {
        let secret = SecretString::new("prop-test-secret".into());
        CredentialCodec::new(Some(&secret), 10).expect("codec")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: decrypt(encrypt(p)) == p
        #[test]
        fn prop_roundtrip(password in "\\PC{0,64}") {
            let codec = codec();
            let blob = codec.encrypt(&password).expect("encrypt");
            let plain = codec.decrypt(&blob).expect("decrypt");
            prop_assert_eq!(plain.expose_secret(), password.as_str());
        }

        /// Property: flipping any bit of the blob makes decryption fail.
        #[test]
        fn prop_tamper_detected(
            password in "[a-zA-Z0-9]{1,32}",
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let codec = codec();
            let blob = codec.encrypt(&password).expect("encrypt");
            let mut raw = STANDARD.decode(&blob).expect("base64");
            let at = index.index(raw.len());
            raw[at] ^= 1 << bit;
            let tampered = STANDARD.encode(raw);
            prop_assert!(codec.decrypt(&tampered).is_err());
        }
    }
}
