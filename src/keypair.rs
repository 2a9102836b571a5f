//! Keypair parsing, re-encoding and generation.
//!
//! Private keys are accepted as base58 text or as a literal byte array such
//! as `[100,43,148,...]`. Only the first 32 bytes (the ed25519 seed) are used
//! to rebuild the keypair; the exported form is always the full 64 bytes.

use std::path::Path;

use serde::Serialize;
use solana_derivation_path::DerivationPath;
use solana_keypair::{seed_derivable::keypair_from_seed_and_derivation_path, Keypair};
use solana_seed_phrase::generate_seed_from_seed_phrase_and_passphrase;
use solana_signer::Signer;

use crate::errors::Error;

const SEED_LEN: usize = 32;

/// A freshly generated account in every supported encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAccount {
    pub public_key: String,
    pub private_key_base58: String,
    pub private_key_arr: Vec<u8>,
}

/// Decodes private key text into raw bytes.
pub fn parse_private_key(private_key: &str) -> Result<Vec<u8>, Error> {
    let private_key = private_key.trim();
    if private_key.contains('[') {
        private_key
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(|b| {
                b.trim()
                    .parse::<u8>()
                    .map_err(|e| Error::InvalidPrivateKey(format!("bad byte {b:?}: {e}")))
            })
            .collect()
    } else {
        bs58::decode(private_key)
            .into_vec()
            .map_err(|e| Error::InvalidPrivateKey(e.to_string()))
    }
}

/// Rebuilds a keypair from the seed half of raw key bytes.
pub fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, Error> {
    let seed: [u8; SEED_LEN] = bytes
        .get(..SEED_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            Error::InvalidPrivateKey(format!(
                "expected at least {SEED_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
    Ok(Keypair::new_from_array(seed))
}

pub fn keypair_from_private_key(private_key: &str) -> Result<Keypair, Error> {
    keypair_from_bytes(&parse_private_key(private_key)?)
}

/// Reads a keypair file as written by `solana-keygen` (a JSON byte array).
pub fn read_keypair_file(path: impl AsRef<Path>) -> Result<Keypair, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bytes: Vec<u8> =
        serde_json::from_str(&text).map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
    keypair_from_bytes(&bytes)
}

pub fn public_key(private_key: &str) -> Result<String, Error> {
    Ok(keypair_from_private_key(private_key)?.pubkey().to_string())
}

pub fn private_key_base58(private_key: &str) -> Result<String, Error> {
    Ok(keypair_from_private_key(private_key)?.to_base58_string())
}

pub fn private_key_array(private_key: &str) -> Result<Vec<u8>, Error> {
    Ok(keypair_from_private_key(private_key)?.to_bytes().to_vec())
}

pub fn private_key_array_string(private_key: &str) -> Result<String, Error> {
    Ok(bytes_to_array_string(&private_key_array(private_key)?))
}

/// Formats bytes as `[n0,n1,...]` with no spaces.
pub fn bytes_to_array_string(bytes: &[u8]) -> String {
    let parts: Vec<String> = bytes.iter().map(u8::to_string).collect();
    format!("[{}]", parts.join(","))
}

/// True when `private_key` derives exactly `public_key`.
///
/// Undecodable key material is reported as a mismatch.
pub fn check_private_key(public_key: &str, private_key: &str) -> bool {
    self::public_key(private_key).is_ok_and(|derived| derived == public_key)
}

pub fn check_private_key_bytes(public_key: &str, private_key: &[u8]) -> bool {
    keypair_from_bytes(private_key).is_ok_and(|kp| kp.pubkey().to_string() == public_key)
}

/// Keypair of the first Solana account (`m/44'/501'/0'/0'`) derived from a
/// BIP39 mnemonic.
///
/// Words may be separated by any whitespace. The word list checksum is not
/// verified, so a mistyped word yields a different key instead of an error.
pub fn keypair_from_mnemonic(mnemonic: &str, passphrase: &str) -> Result<Keypair, Error> {
    let words: Vec<&str> = mnemonic.split_whitespace().collect();
    if ![12, 15, 18, 21, 24].contains(&words.len()) {
        return Err(Error::InvalidMnemonic(format!(
            "expected 12, 15, 18, 21 or 24 words, got {}",
            words.len()
        )));
    }

    let seed = generate_seed_from_seed_phrase_and_passphrase(&words.join(" "), passphrase);
    let path = DerivationPath::new_bip44(Some(0), Some(0));
    keypair_from_seed_and_derivation_path(&seed, Some(path))
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))
}

pub fn generate_account() -> NewAccount {
    let keypair = Keypair::new();
    NewAccount {
        public_key: keypair.pubkey().to_string(),
        private_key_base58: keypair.to_base58_string(),
        private_key_arr: keypair.to_bytes().to_vec(),
    }
}
