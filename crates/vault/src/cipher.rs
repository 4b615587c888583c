use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use common::config::Config;
use common::types::DeploymentMode;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::VaultError;

/// AES-256-GCM with a 16-byte IV, matching the stored blob format.
type BlobCipher = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Publicly known. Only ever used when the process runs in development mode.
const DEVELOPMENT_SECRET: &str = "botfeed-development-only-secret";

/// Secret material injected at startup.
#[derive(Clone)]
pub struct CodecSettings {
    pub mode: DeploymentMode,
    pub secret: Option<String>,
}

impl CodecSettings {
    pub fn new(mode: DeploymentMode, secret: Option<String>) -> Self {
        Self { mode, secret }
    }

    /// Mode from `[general]`, secret from the env var named in `[vault]`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.general.mode, config.encryption_secret())
    }
}

impl fmt::Debug for CodecSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecSettings")
            .field("mode", &self.mode)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// 32-byte symmetric key. Debug output never shows the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; 32]);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// SHA-256 of the configured secret.
///
/// Without a secret, development mode falls back to a fixed key; every other
/// mode fails, as does a non-development process configured with that key.
pub fn derive_key(settings: &CodecSettings) -> Result<SecretKey, VaultError> {
    let secret = match settings.secret.as_deref().filter(|s| !s.is_empty()) {
        Some(secret) => {
            if !settings.mode.is_development() && secret == DEVELOPMENT_SECRET {
                return Err(VaultError::Configuration(format!(
                    "the development secret cannot be used in {} mode",
                    settings.mode
                )));
            }
            secret
        }
        None if settings.mode.is_development() => {
            tracing::warn!("no encryption secret configured; using the development-only key");
            DEVELOPMENT_SECRET
        }
        None => {
            return Err(VaultError::Configuration(format!(
                "an encryption secret is required in {} mode",
                settings.mode
            )));
        }
    };

    Ok(SecretKey(Sha256::digest(secret.as_bytes()).into()))
}

/// Encrypts and decrypts short strings as `hex(iv):hex(tag):hex(ciphertext)`.
#[derive(Clone)]
pub struct SecretCodec {
    cipher: BlobCipher,
}

impl fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretCodec")
    }
}

impl SecretCodec {
    pub fn new(key: &SecretKey) -> Self {
        Self {
            cipher: BlobCipher::new(&key.0.into()),
        }
    }

    pub fn from_settings(settings: &CodecSettings) -> Result<Self, VaultError> {
        Ok(Self::new(&derive_key(settings)?))
    }

    /// Every call draws a fresh IV from the OS RNG.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| VaultError::Encoding(format!("encryption failed: {e}")))?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let segments: Vec<&str> = blob.split(':').collect();
        let [iv_hex, tag_hex, ciphertext_hex] = segments.as_slice() else {
            return Err(VaultError::Format(format!(
                "expected 3 colon-separated segments, got {}",
                segments.len()
            )));
        };

        let iv = decode_segment("iv", iv_hex)?;
        let tag = decode_segment("tag", tag_hex)?;
        let mut buffer = decode_segment("ciphertext", ciphertext_hex)?;

        if iv.len() != IV_LEN {
            return Err(VaultError::Format(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::Format(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        self.cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_auth_err| VaultError::Authentication)?;

        String::from_utf8(buffer)
            .map_err(|e| VaultError::Encoding(format!("plaintext is not utf8: {e}")))
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, VaultError> {
    hex::decode(segment).map_err(|e| VaultError::Format(format!("{name} is not hex: {e}")))
}
