//! Subscription queries against one or more relays.
//!
//! The same primitive answers "does this definition exist" and "did this
//! relay durably store this record"; only the filter differs.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use ribbon_shared::protocol::{Filter, InboundFrame, OutboundFrame};
use ribbon_shared::record::SignedRecord;

use crate::error::TransportError;
use crate::relay::{RelayEndpoint, RelayLink};

/// Try `endpoints` in order and return the first matching record.
///
/// Per-endpoint transport errors count as "no match here".
pub async fn query(
    endpoints: &[RelayEndpoint],
    filter: &Filter,
    window: Duration,
) -> Option<SignedRecord> {
    for endpoint in endpoints {
        match query_endpoint(endpoint, filter, window).await {
            Ok(Some(record)) => {
                info!(relay = %endpoint.url, record_id = %record.short_id(), "Query matched");
                return Some(record);
            }
            Ok(None) => {
                debug!(relay = %endpoint.url, "No match from relay");
            }
            Err(e) => {
                warn!(relay = %endpoint.url, error = %e, "Query failed on relay");
            }
        }
    }
    None
}

/// Open a fresh link to one endpoint and run one subscription on it.
pub async fn query_endpoint(
    endpoint: &RelayEndpoint,
    filter: &Filter,
    window: Duration,
) -> Result<Option<SignedRecord>, TransportError> {
    let mut link = RelayLink::open(endpoint).await?;
    let result = query_link(&mut link, filter, window).await;
    link.close().await;
    result
}

/// Run one subscription on an already open link.
///
/// Returns the first `EVENT` for this subscription that satisfies `filter`
/// and carries a valid id and signature; `None` on `EOSE`, `CLOSED`, or
/// when the window runs out.
pub async fn query_link(
    link: &mut RelayLink,
    filter: &Filter,
    window: Duration,
) -> Result<Option<SignedRecord>, TransportError> {
    let subscription_id = Uuid::new_v4().simple().to_string();
    link.send(&OutboundFrame::Subscribe {
        subscription_id: subscription_id.clone(),
        filter: filter.clone(),
    })
    .await?;

    let mut found = None;
    let mut frames = link.receive_window(window);
    while let Some(frame) = frames.next().await {
        match frame {
            InboundFrame::Record {
                subscription_id: sid,
                record,
            } if sid == subscription_id => {
                if !filter.matches(&record) {
                    debug!(record_id = %record.short_id(), "Ignoring record outside filter");
                    continue;
                }
                if let Err(e) = record.verify() {
                    warn!(record_id = %record.short_id(), error = %e, "Ignoring forged record");
                    continue;
                }
                found = Some(record);
                break;
            }
            InboundFrame::End {
                subscription_id: sid,
            } if sid == subscription_id => break,
            InboundFrame::Closed {
                subscription_id: sid,
                reason,
            } if sid == subscription_id => {
                debug!(reason = %reason, "Subscription closed by relay");
                return Ok(None);
            }
            InboundFrame::Notice(message) => {
                debug!(notice = %message, "Relay notice during query");
            }
            _ => {}
        }
    }

    if link.is_open() {
        // Best effort; the relay may already have dropped the subscription.
        let _ = link.send(&OutboundFrame::Close { subscription_id }).await;
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayTimeouts;
    use crate::testing::{MockRelay, RelayBehavior};
    use ribbon_shared::identity::{Keys, Signer};

    fn endpoint(url: String) -> RelayEndpoint {
        RelayEndpoint::new(url).with_timeouts(RelayTimeouts {
            connect: Duration::from_secs(2),
            read: Duration::from_millis(300),
            response_window: Duration::from_millis(800),
            verify_window: Duration::from_millis(800),
        })
    }

    fn definition(keys: &Keys, d: &str) -> SignedRecord {
        keys.sign(30009, vec![vec!["d".into(), d.into()]], "def".into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_endpoint_with_match_wins() {
        let keys = Keys::generate();
        let record = definition(&keys, "welcome");

        let empty = MockRelay::spawn(RelayBehavior::honest()).await;
        let holder = MockRelay::spawn(RelayBehavior::honest()).await;
        holder.seed(record.clone()).await;

        let filter = Filter::by_discriminator(30009, &keys.public_key_hex(), "welcome");
        let endpoints = vec![endpoint(empty.url()), endpoint(holder.url())];
        let found = query(&endpoints, &filter, Duration::from_secs(1)).await;
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_unreachable_and_silent_endpoints_are_skipped() {
        let keys = Keys::generate();
        let record = definition(&keys, "welcome");

        let silent = MockRelay::spawn(RelayBehavior::silent()).await;
        let holder = MockRelay::spawn(RelayBehavior::honest()).await;
        holder.seed(record.clone()).await;

        let endpoints = vec![
            endpoint("ws://127.0.0.1:1".into()),
            endpoint(silent.url()),
            endpoint(holder.url()),
        ];
        let found = query(&endpoints, &Filter::by_id(&record.id), Duration::from_secs(1)).await;
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_no_match_returns_none() {
        let relay = MockRelay::spawn(RelayBehavior::honest()).await;
        let found = query(
            &[endpoint(relay.url())],
            &Filter::by_id(&"f".repeat(64)),
            Duration::from_secs(1),
        )
        .await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_forged_record_is_ignored() {
        let keys = Keys::generate();
        let mut forged = definition(&keys, "welcome");
        forged.content = "tampered".into();

        let relay = MockRelay::spawn(RelayBehavior::honest()).await;
        relay.seed(forged.clone()).await;

        let found = query(
            &[endpoint(relay.url())],
            &Filter::by_id(&forged.id),
            Duration::from_secs(1),
        )
        .await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_foreign_end_does_not_end_query() {
        let keys = Keys::generate();
        let record = definition(&keys, "welcome");

        let relay =
            MockRelay::spawn(RelayBehavior::honest().with_decoy_subscription("someone-else")).await;
        relay.seed(record.clone()).await;

        let found = query(
            &[endpoint(relay.url())],
            &Filter::by_id(&record.id),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_foreign_records_are_ignored() {
        let keys = Keys::generate();
        let record = definition(&keys, "welcome");

        let behavior = RelayBehavior {
            answer_queries: false,
            ..RelayBehavior::honest()
        }
        .with_decoy_subscription("someone-else");
        let relay = MockRelay::spawn(behavior).await;
        relay.seed(record.clone()).await;

        let found = query(
            &[endpoint(relay.url())],
            &Filter::by_id(&record.id),
            Duration::from_secs(1),
        )
        .await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_non_ascii_record_id_is_logged_and_ignored() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let keys = Keys::generate();
        let mut lying = keys
            .sign(
                30008,
                vec![vec!["d".into(), "profile_badges".into()]],
                String::new(),
            )
            .unwrap();
        lying.id = "1234567érest".into();

        let relay = MockRelay::spawn(RelayBehavior::honest()).await;
        relay.seed(lying).await;

        let found = query(
            &[endpoint(relay.url())],
            &Filter::by_discriminator(30008, &keys.public_key_hex(), "profile_badges"),
            Duration::from_secs(1),
        )
        .await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_closed_subscription_is_no_match() {
        let keys = Keys::generate();
        let relay = MockRelay::spawn(RelayBehavior::closing("auth-required: sign in")).await;
        relay.seed(definition(&keys, "welcome")).await;

        let result = query_endpoint(
            &endpoint(relay.url()),
            &Filter::by_discriminator(30009, &keys.public_key_hex(), "welcome"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }
}
