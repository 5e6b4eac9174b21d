//! Issuer side: badge definitions and awards.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use ribbon_net::{publish, query, PublishOutcome, RelayEndpoint};
use ribbon_shared::constants::{AWARD_KIND, DEFINITION_KIND};
use ribbon_shared::identity::Signer;
use ribbon_shared::protocol::Filter;
use ribbon_shared::record::SignedRecord;
use ribbon_shared::nip19::normalize_pubkey;
use ribbon_shared::types::DefinitionReference;
use ribbon_shared::ValidationError;

use crate::error::IssueError;

/// A badge as described by its issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub identifier: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub thumbs: Vec<String>,
}

impl BadgeDefinition {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    pub fn tags(&self) -> Vec<Vec<String>> {
        let mut tags = vec![vec!["d".to_string(), self.identifier.clone()]];
        let optional = [
            ("name", &self.name),
            ("description", &self.description),
            ("image", &self.image),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                tags.push(vec![key.to_string(), value.clone()]);
            }
        }
        for thumb in &self.thumbs {
            tags.push(vec!["thumb".to_string(), thumb.clone()]);
        }
        tags
    }

    pub fn content(&self) -> String {
        format!(
            "Badge definition: {}",
            self.name.as_deref().unwrap_or(&self.identifier)
        )
    }

    /// Reference to this definition as published by `issuer`.
    pub fn reference(&self, issuer: &str) -> Result<DefinitionReference, ValidationError> {
        DefinitionReference::new(issuer, &self.identifier)
    }

    pub fn sign(&self, signer: &impl Signer) -> Result<SignedRecord, IssueError> {
        if self.identifier.is_empty() {
            return Err(ValidationError::EmptyIdentifier(self.identifier.clone()).into());
        }
        Ok(signer.sign(DEFINITION_KIND, self.tags(), self.content())?)
    }
}

/// What `publish_definition_if_missing` ended up doing.
#[derive(Debug)]
pub enum DefinitionStatus {
    /// A matching definition was already on a relay; nothing was published.
    Exists(SignedRecord),
    Published {
        record: SignedRecord,
        outcomes: Vec<PublishOutcome>,
    },
    PublishedUnverified {
        record: SignedRecord,
        outcomes: Vec<PublishOutcome>,
    },
}

impl DefinitionStatus {
    pub fn record(&self) -> &SignedRecord {
        match self {
            Self::Exists(record)
            | Self::Published { record, .. }
            | Self::PublishedUnverified { record, .. } => record,
        }
    }
}

/// Publish `definition` unless the issuer already has one with the same identifier.
pub async fn publish_definition_if_missing(
    definition: &BadgeDefinition,
    signer: &impl Signer,
    endpoints: &[RelayEndpoint],
    lookup_window: Duration,
) -> Result<DefinitionStatus, IssueError> {
    let issuer = signer.public_key_hex();
    let reference = definition.reference(&issuer)?;

    let filter = Filter::by_discriminator(DEFINITION_KIND, &issuer, &definition.identifier);
    if let Some(existing) = query(endpoints, &filter, lookup_window).await {
        info!(definition = %reference, record_id = %existing.short_id(), "definition already exists");
        return Ok(DefinitionStatus::Exists(existing));
    }

    let record = definition.sign(signer)?;
    let outcomes = publish(&record, endpoints).await;
    let verified = outcomes.iter().filter(|o| o.verified).count();
    info!(definition = %reference, verified, "definition published");

    Ok(if verified > 0 {
        DefinitionStatus::Published { record, outcomes }
    } else {
        DefinitionStatus::PublishedUnverified { record, outcomes }
    })
}

/// A signed award plus where it landed.
#[derive(Debug)]
pub struct AwardResult {
    pub record: SignedRecord,
    pub outcomes: Vec<PublishOutcome>,
}

impl AwardResult {
    pub fn verified(&self) -> bool {
        self.outcomes.iter().any(|o| o.verified)
    }
}

/// Build the award record for `recipients` without publishing it.
///
/// Recipients may be given as `npub1…` or hex; `p` tags always carry hex.
pub fn award_record(
    definition: &DefinitionReference,
    recipients: &[String],
    signer: &impl Signer,
) -> Result<SignedRecord, IssueError> {
    let mut tags = vec![vec!["a".to_string(), definition.to_string()]];
    for recipient in recipients {
        tags.push(vec!["p".to_string(), normalize_pubkey(recipient)?]);
    }
    let content = format!("Awarded badge to {} recipient(s)", recipients.len());
    Ok(signer.sign(AWARD_KIND, tags, content)?)
}

/// Award `definition` to `recipients` and publish the award.
pub async fn award(
    definition: &DefinitionReference,
    recipients: &[String],
    signer: &impl Signer,
    endpoints: &[RelayEndpoint],
) -> Result<AwardResult, IssueError> {
    let record = award_record(definition, recipients, signer)?;
    info!(
        definition = %definition,
        recipients = recipients.len(),
        record_id = %record.short_id(),
        "awarding badge"
    );
    let outcomes = publish(&record, endpoints).await;
    Ok(AwardResult { record, outcomes })
}
