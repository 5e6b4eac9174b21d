//! Bech32 key encodings: `npub1…` public keys and `nsec1…` secret keys.

use bech32::{Bech32, Hrp};

use crate::error::{SigningError, ValidationError};
use crate::types::is_hex64;

const NPUB: Hrp = Hrp::parse_unchecked("npub");
const NSEC: Hrp = Hrp::parse_unchecked("nsec");

fn decode_key(expected: Hrp, encoded: &str) -> Option<[u8; 32]> {
    let (hrp, data) = bech32::decode(encoded).ok()?;
    if hrp != expected {
        return None;
    }
    data.try_into().ok()
}

/// `npub1…` form of a hex public key.
pub fn encode_npub(pubkey_hex: &str) -> Result<String, ValidationError> {
    let invalid = || ValidationError::RecipientKey(pubkey_hex.to_string());
    let bytes: [u8; 32] = hex::decode(pubkey_hex)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(invalid)?;
    bech32::encode::<Bech32>(NPUB, &bytes).map_err(|_| invalid())
}

/// Lowercase hex public key from either an `npub1…` string or 64 hex characters.
pub fn normalize_pubkey(input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    if input.starts_with("npub1") {
        return decode_key(NPUB, input)
            .map(hex::encode)
            .ok_or_else(|| ValidationError::RecipientKey(input.to_string()));
    }

    let lower = input.to_ascii_lowercase();
    if is_hex64(&lower) {
        Ok(lower)
    } else {
        Err(ValidationError::RecipientKey(input.to_string()))
    }
}

/// Secret key bytes from either an `nsec1…` string or 64 hex characters.
pub fn decode_secret(input: &str) -> Result<[u8; 32], SigningError> {
    let input = input.trim();
    if input.starts_with("nsec1") {
        return decode_key(NSEC, input).ok_or(SigningError::InvalidSecretKey);
    }
    hex::decode(input)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or(SigningError::InvalidSecretKey)
}
