use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use signature::hazmat::{PrehashSigner, PrehashVerifier};

use crate::error::{SigningError, ValidationError};
use crate::record::{SignedRecord, UnsignedRecord};

/// Signing capability for records authored by one owner key.
///
/// Key custody lives behind this trait; the engine only ever hands it the
/// record fields and gets back a fully signed record.
pub trait Signer: Send + Sync {
    /// Hex x-only public key of the owner.
    fn public_key_hex(&self) -> String;

    /// Sign `kind`/`tags`/`content` as the owner, stamped with the current time.
    fn sign(
        &self,
        kind: u32,
        tags: Vec<Vec<String>>,
        content: String,
    ) -> Result<SignedRecord, SigningError> {
        let unsigned = UnsignedRecord {
            pubkey: self.public_key_hex(),
            created_at: chrono::Utc::now().timestamp().max(0) as u64,
            kind,
            tags,
            content,
        };
        self.sign_unsigned(unsigned)
    }

    /// Sign a fully specified record (fixed timestamp).
    fn sign_unsigned(&self, unsigned: UnsignedRecord) -> Result<SignedRecord, SigningError>;
}

/// A secp256k1 key pair producing BIP-340 Schnorr signatures.
#[derive(Clone)]
pub struct Keys {
    signing_key: SigningKey,
}

impl Keys {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        loop {
            let secret: [u8; 32] = rand::random();
            if let Ok(keys) = Self::from_secret_bytes(&secret) {
                return keys;
            }
        }
    }

    /// Restore keys from 32 secret bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, SigningError> {
        let signing_key =
            SigningKey::from_bytes(secret).map_err(|_| SigningError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Restore keys from a 64-character hex secret
    pub fn from_secret_hex(hex_secret: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(hex_secret.trim()).map_err(|_| SigningError::InvalidSecretKey)?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SigningError::InvalidSecretKey)?;
        Self::from_secret_bytes(&secret)
    }

    /// Restore keys from an `nsec1…` string or a 64-character hex secret
    pub fn from_secret_str(secret: &str) -> Result<Self, SigningError> {
        Self::from_secret_bytes(&crate::nip19::decode_secret(secret)?)
    }

    /// Public key in `npub1…` form
    pub fn public_key_npub(&self) -> Result<String, ValidationError> {
        crate::nip19::encode_npub(&self.public_key_hex())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes().into()
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl Signer for Keys {
    fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    fn sign_unsigned(&self, unsigned: UnsignedRecord) -> Result<SignedRecord, SigningError> {
        if unsigned.pubkey != self.public_key_hex() {
            return Err(SigningError::InvalidPublicKey(unsigned.pubkey));
        }

        let id = unsigned.compute_id()?;
        let digest = hex::decode(&id).map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
        let signature: Signature = self
            .signing_key
            .sign_prehash(&digest)
            .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;

        Ok(SignedRecord {
            id,
            pubkey: unsigned.pubkey,
            created_at: unsigned.created_at,
            kind: unsigned.kind,
            tags: unsigned.tags,
            content: unsigned.content,
            sig: hex::encode(signature.to_bytes()),
        })
    }
}

/// Verify a hex Schnorr signature over a hex record identifier.
pub fn verify_signature(pubkey_hex: &str, id_hex: &str, sig_hex: &str) -> Result<(), SigningError> {
    let pubkey_bytes =
        hex::decode(pubkey_hex).map_err(|_| SigningError::InvalidPublicKey(pubkey_hex.into()))?;
    let verifying_key = VerifyingKey::from_bytes(&pubkey_bytes)
        .map_err(|_| SigningError::InvalidPublicKey(pubkey_hex.into()))?;

    let sig_bytes =
        hex::decode(sig_hex).map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;

    let digest = hex::decode(id_hex).map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    verifying_key
        .verify_prehash(&digest, &signature)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))
}
