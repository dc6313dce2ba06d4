//! Process-wide symmetric cipher keyed by the deployment root key.
//!
//! Sealed payloads are `nonce (12 bytes) || ciphertext || tag` under
//! AES-256-GCM, so tampering, truncation and a wrong key are all detected
//! on [`Cipher::open`].
//!
//! The cipher is built once at startup and shared by reference (usually
//! inside an `Arc`); it carries no per-call state.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use rand::RngCore;
use rand::rngs::OsRng;

use super::digits::RootKey;
use crate::auth::error::{AuthError, AuthErrorCode};
use crate::config::ApiConfig;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Raw root key length in bytes (before base64).
pub const ROOTKEY_BYTES: usize = 32;

/// Authenticated symmetric cipher.
pub struct Cipher {
    aead: Aes256Gcm,
    /// Redacted root key, for `Debug` only
    fingerprint: String,
}

impl Cipher {
    /// Build a cipher from an existing root key.
    pub fn new(key: &RootKey) -> Result<Self, AuthError> {
        let raw = URL_SAFE.decode(key.expose()).map_err(|_| {
            AuthError::new(
                AuthErrorCode::ConfigurationError,
                "Root key is not URL-safe base64",
            )
        })?;
        if raw.len() != ROOTKEY_BYTES {
            return Err(AuthError::new(
                AuthErrorCode::ConfigurationError,
                format!(
                    "Root key must decode to {} bytes, got {}",
                    ROOTKEY_BYTES,
                    raw.len()
                ),
            ));
        }
        let aead = Aes256Gcm::new_from_slice(&raw).map_err(|_| {
            AuthError::new(AuthErrorCode::ConfigurationError, "Invalid root key length")
        })?;
        Ok(Self {
            aead,
            fingerprint: key.redacted(),
        })
    }

    /// Load the root key from the `api` configuration section.
    ///
    /// Fails with `ConfigurationError` when the key is absent or malformed.
    pub fn from_config(config: &ApiConfig) -> Result<Self, AuthError> {
        let raw = config
            .rootkey
            .as_deref()
            .ok_or_else(|| {
                AuthError::new(AuthErrorCode::ConfigurationError, "Missing 'api.rootkey'")
            })?;
        let key = RootKey::new(raw).map_err(|e| {
            AuthError::new(
                AuthErrorCode::ConfigurationError,
                format!("Malformed 'api.rootkey': {}", e),
            )
        })?;
        Self::new(&key)
    }

    /// Generate a new root key for a deployment.
    pub fn new_rootkey() -> RootKey {
        let mut raw = [0u8; ROOTKEY_BYTES];
        OsRng.fill_bytes(&mut raw);
        // 32 bytes always encode to 44 URL-safe base64 digits
        RootKey::new(URL_SAFE.encode(raw))
            .expect("URL-safe base64 of 32 bytes is a valid RootKey")
    }

    /// Encrypt and authenticate `data`.
    pub fn seal(&self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self.aead.encrypt(nonce, data).map_err(|_| {
            AuthError::new(AuthErrorCode::FormatInvalid, "Payload cannot be sealed")
        })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Verify and decrypt `data` produced by [`Cipher::seal`].
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(AuthError::new(
                AuthErrorCode::TokenInvalid,
                "Sealed payload too short",
            ));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.aead
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuthError::from_code(AuthErrorCode::TokenInvalid))
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Cipher(key=<RootKey('{}')>)>", self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn api_config(rootkey: Option<String>) -> ApiConfig {
        ApiConfig {
            rootkey,
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_new_rootkey() {
        let key = Cipher::new_rootkey();
        assert_eq!(key.len(), 44);
        assert!(Cipher::new(&key).is_ok());
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = Cipher::new(&Cipher::new_rootkey()).unwrap();
        let sealed = cipher.seal(b"hello refitt").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"hello refitt");
        assert_eq!(cipher.open(&sealed).unwrap(), b"hello refitt");
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let cipher = Cipher::new(&Cipher::new_rootkey()).unwrap();
        assert_ne!(cipher.seal(b"same").unwrap(), cipher.seal(b"same").unwrap());
    }

    #[test]
    fn test_open_with_wrong_key() {
        let k1 = Cipher::new(&Cipher::new_rootkey()).unwrap();
        let k2 = Cipher::new(&Cipher::new_rootkey()).unwrap();
        let sealed = k1.seal(b"payload").unwrap();
        assert_eq!(
            k2.open(&sealed).unwrap_err().code,
            AuthErrorCode::TokenInvalid
        );
    }

    #[test]
    fn test_open_truncated() {
        let cipher = Cipher::new(&Cipher::new_rootkey()).unwrap();
        let err = cipher.open(&[0u8; 10]).unwrap_err();
        assert_eq!(err.code, AuthErrorCode::TokenInvalid);
    }

    #[test]
    fn test_from_config_missing() {
        let err = Cipher::from_config(&api_config(None)).unwrap_err();
        assert_eq!(err.code, AuthErrorCode::ConfigurationError);
        assert!(err.message.contains("api.rootkey"));
    }

    #[test]
    fn test_from_config_malformed() {
        let err = Cipher::from_config(&api_config(Some("too-short".into()))).unwrap_err();
        assert_eq!(err.code, AuthErrorCode::ConfigurationError);

        // 44 valid digits that are not base64 of 32 bytes
        let err = Cipher::from_config(&api_config(Some("=".repeat(44)))).unwrap_err();
        assert_eq!(err.code, AuthErrorCode::ConfigurationError);
    }

    #[test]
    fn test_from_config_ok() {
        let key = Cipher::new_rootkey();
        let cipher = Cipher::from_config(&api_config(Some(key.expose().to_string()))).unwrap();
        let other = Cipher::new(&key).unwrap();
        let sealed = cipher.seal(b"shared").unwrap();
        assert_eq!(other.open(&sealed).unwrap(), b"shared");
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = Cipher::new_rootkey();
        let cipher = Cipher::new(&key).unwrap();
        let rendered = format!("{:?}", cipher);
        assert!(rendered.starts_with("<Cipher(key=<RootKey('"));
        assert!(!rendered.contains(key.expose()));
    }

    proptest! {
        #[test]
        fn prop_single_byte_tamper_detected(
            payload in proptest::collection::vec(any::<u8>(), 0..128),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let cipher = Cipher::new(&Cipher::new_rootkey()).unwrap();
            let mut sealed = cipher.seal(&payload).unwrap();
            let i = index.index(sealed.len());
            sealed[i] ^= flip;
            let err = cipher.open(&sealed).unwrap_err();
            prop_assert_eq!(err.code, AuthErrorCode::TokenInvalid);
        }
    }
}
