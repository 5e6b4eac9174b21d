use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFINITION_KIND, HEX_ID_LEN};
use crate::error::ValidationError;

/// `true` for exactly 64 lowercase hex characters.
pub fn is_hex64(s: &str) -> bool {
    s.len() == HEX_ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Pointer to a badge definition record: `30009:<issuer-hex>:<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinitionReference {
    issuer: String,
    identifier: String,
}

impl DefinitionReference {
    pub fn new(issuer: &str, identifier: &str) -> Result<Self, ValidationError> {
        Self::parse(&format!("{DEFINITION_KIND}:{issuer}:{identifier}"))
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let prefix = format!("{DEFINITION_KIND}:");
        if !s.starts_with(&prefix) {
            return Err(ValidationError::DefinitionPrefix(s.to_string()));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(ValidationError::DefinitionShape(s.to_string()));
        }

        let (issuer, identifier) = (parts[1], parts[2]);
        if !is_hex64(issuer) {
            return Err(ValidationError::IssuerKey(issuer.to_string()));
        }
        if identifier.is_empty() {
            return Err(ValidationError::EmptyIdentifier(s.to_string()));
        }

        Ok(Self {
            issuer: issuer.to_string(),
            identifier: identifier.to_string(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for DefinitionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", DEFINITION_KIND, self.issuer, self.identifier)
    }
}

/// Identifier of a published award record (64 lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AwardReference(String);

impl AwardReference {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if is_hex64(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::AwardReference(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AwardReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A displayed badge: (definition reference, award reference).
///
/// Both halves are kept as raw strings so that pairs parsed from an untrusted
/// remote record can be carried around, compared and reported before they
/// are validated. Serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct BadgePair {
    pub definition: String,
    pub award: String,
}

impl BadgePair {
    pub fn new(definition: impl Into<String>, award: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            award: award.into(),
        }
    }

    /// Validate both references independently.
    pub fn validate(&self) -> Result<(DefinitionReference, AwardReference), ValidationError> {
        let definition = DefinitionReference::parse(&self.definition)?;
        let award = AwardReference::parse(&self.award)?;
        Ok((definition, award))
    }
}

impl From<(String, String)> for BadgePair {
    fn from((definition, award): (String, String)) -> Self {
        Self { definition, award }
    }
}

impl From<BadgePair> for (String, String) {
    fn from(pair: BadgePair) -> Self {
        (pair.definition, pair.award)
    }
}

impl From<(DefinitionReference, AwardReference)> for BadgePair {
    fn from((definition, award): (DefinitionReference, AwardReference)) -> Self {
        Self::new(definition.to_string(), award.0)
    }
}

impl fmt::Display for BadgePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.definition, self.award)
    }
}

/// Validate a single pair, returning the reason on failure.
pub fn validate_pair(pair: &BadgePair) -> Result<(), ValidationError> {
    pair.validate().map(|_| ())
}

/// Result of validating a list of pairs.
#[derive(Debug, Clone, Default)]
pub struct SetValidation {
    /// Pairs that passed, in their original order.
    pub valid: Vec<BadgePair>,
    /// One entry per failing pair: (1-based position, reason).
    pub errors: Vec<(usize, ValidationError)>,
}

impl SetValidation {
    pub fn all_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Reason of the first failing pair, if any.
    pub fn reason(&self) -> Option<String> {
        self.errors
            .first()
            .map(|(position, err)| format!("Pair {position}: {err}"))
    }
}

/// Validate every pair independently, keeping the subset that passed.
pub fn validate_set(pairs: &[BadgePair]) -> SetValidation {
    let mut report = SetValidation::default();
    for (i, pair) in pairs.iter().enumerate() {
        match validate_pair(pair) {
            Ok(()) => report.valid.push(pair.clone()),
            Err(e) => report.errors.push((i + 1, e)),
        }
    }
    report
}
