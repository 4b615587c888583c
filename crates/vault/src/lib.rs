//! Secrets at rest: authenticated encryption of short strings (wallet
//! private keys, OAuth tokens) and Solana wallet key material.

pub mod cipher;
pub mod error;
pub mod wallet;

pub use cipher::{derive_key, CodecSettings, SecretCodec, SecretKey};
pub use error::VaultError;
pub use wallet::{address_from_private_key, generate_wallet_keypair, is_valid_address, WalletKeypair};
