//! Publish one signed record to many relays and confirm durable storage.
//!
//! Every endpoint is driven independently and concurrently; the result is
//! one [`PublishOutcome`] per endpoint, in endpoint order. Acknowledgement
//! and verification are separate signals: relays acknowledge records they
//! later drop and store records they never acknowledge, so only a
//! read-back by identifier counts as success.

use std::fmt;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use ribbon_shared::protocol::{Filter, InboundFrame, OutboundFrame};
use ribbon_shared::record::SignedRecord;

use crate::error::PublishError;
use crate::query::{query_endpoint, query_link};
use crate::relay::{RelayEndpoint, RelayLink};

/// What happened on one endpoint during one publish attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub relay: String,
    pub connected: bool,
    /// `None` when the relay never answered within the response window.
    pub acknowledged: Option<bool>,
    pub ack_message: Option<String>,
    pub notices: Vec<String>,
    pub closed_reason: Option<String>,
    pub verified: bool,
    pub error: Option<String>,
}

impl PublishOutcome {
    fn new(relay: &str) -> Self {
        Self {
            relay: relay.to_string(),
            ..Default::default()
        }
    }

    /// One-line status for reports.
    pub fn status_line(&self) -> String {
        let status = if self.verified {
            "verified"
        } else if self.acknowledged == Some(true) {
            "unverified"
        } else {
            "failed"
        };
        format!("[{status}] {}", self.relay)
    }
}

/// Publish `record` to every endpoint concurrently.
pub async fn publish(record: &SignedRecord, endpoints: &[RelayEndpoint]) -> Vec<PublishOutcome> {
    info!(
        record_id = %record.short_id(),
        kind = record.kind,
        relays = endpoints.len(),
        "Publishing record"
    );
    join_all(
        endpoints
            .iter()
            .map(|endpoint| publish_to_endpoint(record, endpoint)),
    )
    .await
}

/// Drive one endpoint: connect, send, read responses, verify, close.
pub async fn publish_to_endpoint(record: &SignedRecord, endpoint: &RelayEndpoint) -> PublishOutcome {
    let mut outcome = PublishOutcome::new(&endpoint.url);

    let mut link = match RelayLink::open(endpoint).await {
        Ok(link) => link,
        Err(e) => {
            warn!(relay = %endpoint.url, error = %e, "Failed to connect");
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };
    outcome.connected = true;

    if let Err(e) = link.send(&OutboundFrame::Publish(record.clone())).await {
        warn!(relay = %endpoint.url, error = %e, "Failed to send record");
        outcome.error = Some(e.to_string());
        link.close().await;
        return outcome;
    }
    debug!(relay = %endpoint.url, record_id = %record.short_id(), "Record sent");

    read_responses(&mut link, record, endpoint, &mut outcome).await;
    outcome.verified = verify_storage(&mut link, record, endpoint).await;

    link.close().await;

    if outcome.verified {
        info!(relay = %endpoint.url, record_id = %record.short_id(), "Storage verified");
    } else {
        warn!(relay = %endpoint.url, record_id = %record.short_id(), "Could not verify storage");
    }
    outcome
}

async fn read_responses(
    link: &mut RelayLink,
    record: &SignedRecord,
    endpoint: &RelayEndpoint,
    outcome: &mut PublishOutcome,
) {
    let mut frames = link.receive_window(endpoint.timeouts.response_window);
    while let Some(frame) = frames.next().await {
        match frame {
            InboundFrame::Ack {
                record_id,
                accepted,
                message,
            } if record_id == record.id => {
                debug!(relay = %endpoint.url, accepted, message = %message, "OK received");
                outcome.acknowledged = Some(accepted);
                outcome.ack_message = Some(message.clone());
                if !accepted {
                    outcome.error = Some(PublishError::Rejected(message).to_string());
                    return;
                }
            }
            InboundFrame::Notice(message) => {
                debug!(relay = %endpoint.url, notice = %message, "NOTICE received");
                outcome.notices.push(message);
            }
            InboundFrame::Closed { reason, .. } => {
                debug!(relay = %endpoint.url, reason = %reason, "CLOSED received");
                outcome.error = Some(PublishError::Closed(reason.clone()).to_string());
                outcome.closed_reason = Some(reason);
                return;
            }
            _ => {}
        }
    }
}

async fn verify_storage(
    link: &mut RelayLink,
    record: &SignedRecord,
    endpoint: &RelayEndpoint,
) -> bool {
    let filter = Filter::by_id(&record.id);
    let window = endpoint.timeouts.verify_window;

    let result = if link.is_open() {
        query_link(link, &filter, window).await
    } else {
        // The relay hung up after answering; ask again on a fresh connection.
        query_endpoint(endpoint, &filter, window).await
    };

    match result {
        Ok(Some(stored)) => stored.id == record.id,
        Ok(None) => false,
        Err(e) => {
            debug!(relay = %endpoint.url, error = %e, "Verification query failed");
            false
        }
    }
}

/// Aggregate counts over one publish run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub total: usize,
    pub connected: usize,
    pub acknowledged: usize,
    pub verified: usize,
    pub lines: Vec<String>,
}

impl PublishSummary {
    pub fn success_rate(&self) -> String {
        format!("{}/{}", self.verified, self.total)
    }
}

pub fn summarize(outcomes: &[PublishOutcome]) -> PublishSummary {
    let mut lines = Vec::new();
    for outcome in outcomes {
        lines.push(outcome.status_line());
        if let Some(error) = &outcome.error {
            lines.push(format!("    error: {error}"));
        }
        if let Some(message) = outcome.ack_message.as_deref().filter(|m| !m.is_empty()) {
            lines.push(format!("    ok: {message}"));
        }
        for notice in &outcome.notices {
            lines.push(format!("    notice: {notice}"));
        }
    }

    PublishSummary {
        total: outcomes.len(),
        connected: outcomes.iter().filter(|o| o.connected).count(),
        acknowledged: outcomes
            .iter()
            .filter(|o| o.acknowledged == Some(true))
            .count(),
        verified: outcomes.iter().filter(|o| o.verified).count(),
        lines,
    }
}

impl fmt::Display for PublishSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Relays:       {}", self.total)?;
        writeln!(f, "Connected:    {}", self.connected)?;
        writeln!(f, "Acknowledged: {}", self.acknowledged)?;
        writeln!(f, "Verified:     {}", self.verified)?;
        writeln!(f, "Success rate: {}", self.success_rate())?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
