use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::fmt;

use crate::error::VaultError;

/// Solana public keys are raw 32-byte Ed25519 points.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Solana keypair export: 32-byte secret seed followed by the public key.
pub const KEYPAIR_LEN: usize = 64;

pub struct WalletKeypair {
    pub public_address: String,
    /// Base58 of the 64-byte keypair. Encrypt before storing.
    pub private_key: String,
}

impl fmt::Debug for WalletKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeypair")
            .field("public_address", &self.public_address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

pub fn generate_wallet_keypair() -> WalletKeypair {
    let signing_key = SigningKey::generate(&mut OsRng);
    WalletKeypair {
        public_address: bs58::encode(signing_key.verifying_key().as_bytes()).into_string(),
        private_key: bs58::encode(signing_key.to_keypair_bytes()).into_string(),
    }
}

/// True iff `address` is base58 that decodes to exactly 32 bytes.
pub fn is_valid_address(address: &str) -> bool {
    bs58::decode(address)
        .into_vec()
        .is_ok_and(|bytes| bytes.len() == PUBLIC_KEY_LEN)
}

/// Public address of an imported base58 keypair. Rejects keypairs whose
/// public half does not match the secret seed.
pub fn address_from_private_key(private_key: &str) -> Result<String, VaultError> {
    let bytes = bs58::decode(private_key)
        .into_vec()
        .map_err(|e| VaultError::Encoding(format!("private key is not base58: {e}")))?;
    let keypair: [u8; KEYPAIR_LEN] = bytes.as_slice().try_into().map_err(|_len_err| {
        VaultError::Encoding(format!(
            "private key must decode to {KEYPAIR_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    let signing_key = SigningKey::from_keypair_bytes(&keypair)
        .map_err(|e| VaultError::Encoding(format!("inconsistent keypair: {e}")))?;
    Ok(bs58::encode(signing_key.verifying_key().as_bytes()).into_string())
}
