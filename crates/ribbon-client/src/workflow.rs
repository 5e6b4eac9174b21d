//! Badge acceptance: fetch, merge, snapshot, publish, verify.
//!
//! The run is an explicit state machine. A merge rule violation ends in
//! `merge_failed`; any other failure goes through `Recovering`, which
//! reports the newest local snapshot instead of silently succeeding.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use ribbon_net::{publish, query, summarize, PublishOutcome, PublishSummary, RelayEndpoint};
use ribbon_shared::badges::{pairs_from_record, BadgeSet};
use ribbon_shared::constants::{
    DEFAULT_FETCH_WINDOW_SECS, DEFAULT_MAX_BACKUPS, PROFILE_BADGES_DISCRIMINATOR,
    PROFILE_BADGES_KIND,
};
use ribbon_shared::identity::Signer;
use ribbon_shared::protocol::Filter;
use ribbon_shared::record::{SignedRecord, UnsignedRecord};
use ribbon_shared::types::BadgePair;
use ribbon_store::BackupStore;

use crate::error::{AcceptError, MergeError};
use crate::merge::MergeEngine;

/// States of one acceptance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptState {
    Fetching,
    Merging,
    BackingUp,
    Publishing,
    Verifying,
    Done,
    Failed,
    Recovering,
    Recovered,
    FailedFinal,
}

/// Terminal result of an acceptance run.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// Verified on at least one relay.
    Success {
        record: SignedRecord,
        verified_relays: usize,
        total_badges: usize,
    },
    /// Sent, but no relay confirmed storage.
    PublishedUnverified {
        record: SignedRecord,
        total_badges: usize,
    },
    MergeFailed {
        error: MergeError,
        existing_badges: usize,
    },
    RecoveredFromBackup {
        error: AcceptError,
        recovered_badges: usize,
    },
    Failed {
        error: AcceptError,
    },
}

impl AcceptOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::PublishedUnverified { .. } => "published_unverified",
            Self::MergeFailed { .. } => "merge_failed",
            Self::RecoveredFromBackup { .. } => "recovered_from_backup",
            Self::Failed { .. } => "failed",
        }
    }

    /// `merge_failed` and `failed` are failures; everything else made progress.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::MergeFailed { .. } | Self::Failed { .. })
    }

    /// The published record, when one was sent.
    pub fn record(&self) -> Option<&SignedRecord> {
        match self {
            Self::Success { record, .. } | Self::PublishedUnverified { record, .. } => Some(record),
            _ => None,
        }
    }
}

impl fmt::Display for AcceptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success {
                verified_relays,
                total_badges,
                ..
            } => write!(
                f,
                "success: displayed on {verified_relays} relay(s), {total_badges} badge(s) total"
            ),
            Self::PublishedUnverified { total_badges, .. } => write!(
                f,
                "published_unverified: {total_badges} badge(s), storage not yet confirmed"
            ),
            Self::MergeFailed {
                error,
                existing_badges,
            } => write!(f, "merge_failed: {error} ({existing_badges} existing badge(s) kept)"),
            Self::RecoveredFromBackup {
                error,
                recovered_badges,
            } => write!(
                f,
                "recovered_from_backup: {error} ({recovered_badges} badge(s) in latest backup)"
            ),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Outcome plus everything observed on the way there.
#[derive(Debug)]
pub struct AcceptReport {
    pub outcome: AcceptOutcome,
    /// Every state entered, in order.
    pub states: Vec<AcceptState>,
    /// Per-relay publish results; empty when nothing was published.
    pub publish: Vec<PublishOutcome>,
}

impl AcceptReport {
    pub fn summary(&self) -> Option<PublishSummary> {
        (!self.publish.is_empty()).then(|| summarize(&self.publish))
    }
}

/// Tunables for the workflow itself; relay timeouts live on each endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub fetch_window: Duration,
    pub max_backups: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            fetch_window: Duration::from_secs(DEFAULT_FETCH_WINDOW_SECS),
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

#[derive(Default)]
struct Run {
    states: Vec<AcceptState>,
    publish: Vec<PublishOutcome>,
}

impl Run {
    fn enter(&mut self, state: AcceptState) {
        debug!(?state, "acceptance state");
        self.states.push(state);
    }
}

/// Accepts badges on behalf of the signer's key.
pub struct AcceptanceWorkflow<S> {
    signer: S,
    endpoints: Vec<RelayEndpoint>,
    store: BackupStore,
    config: WorkflowConfig,
}

impl<S: Signer> AcceptanceWorkflow<S> {
    pub fn new(signer: S, endpoints: Vec<RelayEndpoint>, store: BackupStore) -> Self {
        Self {
            signer,
            endpoints,
            store,
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    pub fn endpoints(&self) -> &[RelayEndpoint] {
        &self.endpoints
    }

    pub fn owner_key(&self) -> String {
        self.signer.public_key_hex()
    }

    /// Accept the badge `(definition, award)` into the owner's displayed set.
    pub async fn accept(&self, definition: &str, award: &str) -> AcceptReport {
        info!(definition, award, "accepting badge");
        let new_pair = BadgePair::new(definition, award);

        let mut run = Run::default();
        let outcome = match self.run(&mut run, &new_pair).await {
            Ok(outcome) => outcome,
            Err(error) => self.recover(&mut run, error),
        };

        info!(status = outcome.status(), "acceptance finished");
        AcceptReport {
            outcome,
            states: run.states,
            publish: run.publish,
        }
    }

    async fn run(&self, run: &mut Run, new_pair: &BadgePair) -> Result<AcceptOutcome, AcceptError> {
        let owner = self.signer.public_key_hex();

        run.enter(AcceptState::Fetching);
        let previous = self.fetch_existing(&owner).await;
        let existing = previous
            .as_ref()
            .map(pairs_from_record)
            .unwrap_or_default();
        info!(badges = existing.len(), "existing badges");

        run.enter(AcceptState::Merging);
        let merged = match MergeEngine::new(&self.store, &owner).merge(&existing, new_pair) {
            Ok(merged) => merged,
            Err(MergeError::Store(e)) => return Err(AcceptError::Store(e)),
            Err(e) => {
                error!(error = %e, "merge failed");
                run.enter(AcceptState::Failed);
                return Ok(AcceptOutcome::MergeFailed {
                    error: e,
                    existing_badges: existing.len(),
                });
            }
        };

        run.enter(AcceptState::BackingUp);
        let set = BadgeSet::new(owner.as_str(), merged.pairs);
        let record = self.sign_set(&set, previous.as_ref())?;
        self.store.snapshot(set.pairs(), &owner, &record.id)?;

        run.enter(AcceptState::Publishing);
        let outcomes = publish(&record, &self.endpoints).await;

        run.enter(AcceptState::Verifying);
        let verified_relays = outcomes.iter().filter(|o| o.verified).count();
        run.publish = outcomes;

        run.enter(AcceptState::Done);
        if verified_relays > 0 {
            if let Err(e) = self.store.prune(self.config.max_backups) {
                warn!(error = %e, "backup pruning failed");
            }
            Ok(AcceptOutcome::Success {
                record,
                verified_relays,
                total_badges: set.len(),
            })
        } else {
            warn!(record_id = %record.short_id(), "published but not verified on any relay");
            Ok(AcceptOutcome::PublishedUnverified {
                record,
                total_badges: set.len(),
            })
        }
    }

    fn recover(&self, run: &mut Run, error: AcceptError) -> AcceptOutcome {
        error!(error = %error, "acceptance failed, attempting recovery from backup");
        run.enter(AcceptState::Failed);
        run.enter(AcceptState::Recovering);

        let latest = match self.store.latest_for_owner(&self.owner_key()) {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "could not read backups");
                None
            }
        };

        match latest {
            Some(pairs) => {
                info!(badges = pairs.len(), "recovered badges from backup");
                run.enter(AcceptState::Recovered);
                AcceptOutcome::RecoveredFromBackup {
                    error,
                    recovered_badges: pairs.len(),
                }
            }
            None => {
                run.enter(AcceptState::FailedFinal);
                AcceptOutcome::Failed {
                    error: AcceptError::RecoveryExhausted(Box::new(error)),
                }
            }
        }
    }

    async fn fetch_existing(&self, owner: &str) -> Option<SignedRecord> {
        let filter =
            Filter::by_discriminator(PROFILE_BADGES_KIND, owner, PROFILE_BADGES_DISCRIMINATOR);
        let found = query(&self.endpoints, &filter, self.config.fetch_window).await;
        if found.is_none() {
            info!("no existing profile badges found");
        }
        found
    }

    /// Sign the set, stamped strictly after the record it replaces so relays
    /// keep the new one.
    fn sign_set(
        &self,
        set: &BadgeSet,
        previous: Option<&SignedRecord>,
    ) -> Result<SignedRecord, AcceptError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let created_at = previous.map_or(now, |p| now.max(p.created_at.saturating_add(1)));
        let relay_hint = self.endpoints.first().map(|e| e.url.as_str());

        let record = self.signer.sign_unsigned(UnsignedRecord {
            pubkey: set.owner_key().to_string(),
            created_at,
            kind: set.kind(),
            tags: set.to_tags(relay_hint),
            content: set.content(),
        })?;
        Ok(record)
    }
}
