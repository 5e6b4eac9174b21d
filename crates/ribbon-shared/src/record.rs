//! Signed record model shared by every relay message.
//!
//! A record's identifier is content-addressed: the lowercase hex SHA-256 of
//! the compact JSON array `[0, pubkey, created_at, kind, tags, content]`.
//! The signature is a BIP-340 Schnorr signature over the 32 identifier bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SigningError;

/// Everything a record carries before it is signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedRecord {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedRecord {
    /// Compute the content-addressed identifier.
    pub fn compute_id(&self) -> Result<String, SigningError> {
        compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }
}

/// A complete, signed record as exchanged with relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRecord {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl SignedRecord {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(name))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    /// Value of the `d` (discriminator) tag.
    pub fn discriminator(&self) -> Option<&str> {
        self.tag_value("d")
    }

    /// Recompute the identifier and check the signature against `pubkey`.
    pub fn verify(&self) -> Result<(), SigningError> {
        let computed = compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;
        if computed != self.id {
            return Err(SigningError::IdMismatch {
                expected: self.id.clone(),
                computed,
            });
        }
        crate::identity::verify_signature(&self.pubkey, &self.id, &self.sig)
    }

    /// First 8 characters of the identifier, for logs and snapshot keys.
    ///
    /// Relay-supplied ids are not guaranteed to be ASCII; the cut is on a
    /// character boundary.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }
}

fn compute_id(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String, SigningError> {
    let canonical = serde_json::to_string(&serde_json::json!([
        0, pubkey, created_at, kind, tags, content
    ]))?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UnsignedRecord {
        UnsignedRecord {
            pubkey: "a".repeat(64),
            created_at: 1_700_000_000,
            kind: 30008,
            tags: vec![vec!["d".into(), "profile_badges".into()]],
            content: "hello \"world\"".into(),
        }
    }

    #[test]
    fn test_id_is_deterministic() {
        let record = sample();
        let id1 = record.compute_id().unwrap();
        let id2 = record.compute_id().unwrap();
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 64);
    }

    #[test]
    fn test_id_covers_every_field() {
        let base = sample().compute_id().unwrap();

        let mut changed = sample();
        changed.content.push('!');
        assert_ne!(changed.compute_id().unwrap(), base);

        let mut changed = sample();
        changed.tags.push(vec!["a".into(), "x".into()]);
        assert_ne!(changed.compute_id().unwrap(), base);

        let mut changed = sample();
        changed.created_at += 1;
        assert_ne!(changed.compute_id().unwrap(), base);
    }

    #[test]
    fn test_tag_lookup() {
        let record = SignedRecord {
            id: String::new(),
            pubkey: String::new(),
            created_at: 0,
            kind: 30008,
            tags: vec![
                vec!["d".into(), "profile_badges".into()],
                vec!["a".into(), "first".into()],
                vec!["a".into(), "second".into()],
            ],
            content: String::new(),
            sig: String::new(),
        };
        assert_eq!(record.discriminator(), Some("profile_badges"));
        assert_eq!(record.tag_value("a"), Some("first"));
        assert_eq!(record.tag_value("p"), None);
    }

    #[test]
    fn test_short_id_on_non_ascii_id() {
        let mut record = SignedRecord {
            id: "1234567érest".into(),
            pubkey: String::new(),
            created_at: 0,
            kind: 30008,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        };
        assert_eq!(record.short_id(), "1234567é");

        record.id = "abc".into();
        assert_eq!(record.short_id(), "abc");

        record.id = "0123456789abcdef".into();
        assert_eq!(record.short_id(), "01234567");
    }
}
