//! In-process relay for tests.
//!
//! Speaks the real frame protocol over a loopback WebSocket so the relay
//! link, query engine and publish coordinator are exercised end to end.
//! Each relay's behaviour is scripted with [`RelayBehavior`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use ribbon_shared::protocol::{Filter, InboundFrame, OutboundFrame};
use ribbon_shared::record::SignedRecord;

/// How the relay reacts to a published record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckMode {
    /// `["OK", id, true, ""]`
    Accept,
    /// `["OK", id, false, reason]`
    Reject(String),
    /// No OK frame at all.
    Silent,
}

/// Scripted relay behaviour.
#[derive(Debug, Clone)]
pub struct RelayBehavior {
    pub ack: AckMode,
    /// Persist published records so later queries can find them.
    pub store: bool,
    /// Answer subscriptions (with stored matches and EOSE).
    pub answer_queries: bool,
    /// Send this NOTICE before acknowledging a publish.
    pub notice: Option<String>,
    /// Answer publishes and subscriptions with CLOSED and this reason.
    pub closed_reason: Option<String>,
    /// Send this NOTICE after the OK frame of a publish.
    pub notice_after_ack: Option<String>,
    /// Before answering a subscription, replay its matches and EOSE under
    /// this unrelated subscription id.
    pub decoy_subscription: Option<String>,
}

impl RelayBehavior {
    /// Acknowledges, stores and answers queries.
    pub fn honest() -> Self {
        Self {
            ack: AckMode::Accept,
            store: true,
            answer_queries: true,
            notice: None,
            closed_reason: None,
            notice_after_ack: None,
            decoy_subscription: None,
        }
    }

    /// Accepts the connection and never says anything.
    pub fn silent() -> Self {
        Self {
            ack: AckMode::Silent,
            store: false,
            answer_queries: false,
            notice: None,
            closed_reason: None,
            notice_after_ack: None,
            decoy_subscription: None,
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            ack: AckMode::Reject(reason.to_string()),
            store: false,
            ..Self::honest()
        }
    }

    /// Stores the record but never acknowledges it.
    pub fn store_without_ack() -> Self {
        Self {
            ack: AckMode::Silent,
            ..Self::honest()
        }
    }

    /// Acknowledges but drops the record.
    pub fn ack_without_store() -> Self {
        Self {
            store: false,
            ..Self::honest()
        }
    }

    pub fn closing(reason: &str) -> Self {
        Self {
            closed_reason: Some(reason.to_string()),
            ..Self::honest()
        }
    }

    pub fn with_notice(mut self, notice: &str) -> Self {
        self.notice = Some(notice.to_string());
        self
    }

    pub fn with_notice_after_ack(mut self, notice: &str) -> Self {
        self.notice_after_ack = Some(notice.to_string());
        self
    }

    pub fn with_decoy_subscription(mut self, subscription_id: &str) -> Self {
        self.decoy_subscription = Some(subscription_id.to_string());
        self
    }
}

#[derive(Default)]
struct RelayState {
    records: Vec<SignedRecord>,
    publishes: usize,
}

/// A running loopback relay. Stops accepting connections when dropped.
pub struct MockRelay {
    addr: SocketAddr,
    state: Arc<Mutex<RelayState>>,
    accept_task: JoinHandle<()>,
}

impl MockRelay {
    pub async fn spawn(behavior: RelayBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock relay");
        let addr = listener.local_addr().expect("mock relay address");
        let state = Arc::new(Mutex::new(RelayState::default()));

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = accept_state.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(socket, behavior, state).await {
                        debug!(error = %e, "Mock relay connection ended");
                    }
                });
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Preload a record as if it had been published earlier.
    pub async fn seed(&self, record: SignedRecord) {
        store_record(&mut self.state.lock().await.records, record);
    }

    pub async fn records(&self) -> Vec<SignedRecord> {
        self.state.lock().await.records.clone()
    }

    /// Number of publish frames received.
    pub async fn publish_count(&self) -> usize {
        self.state.lock().await.publishes
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    socket: TcpStream,
    behavior: RelayBehavior,
    state: Arc<Mutex<RelayState>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut ws = tokio_tungstenite::accept_async(socket).await?;

    while let Some(msg) = ws.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(frame) = OutboundFrame::decode(&text) else {
            let notice = InboundFrame::Notice("error: could not parse frame".into());
            ws.send(Message::Text(notice.encode()?)).await?;
            continue;
        };

        let mut replies = Vec::new();
        match frame {
            OutboundFrame::Publish(record) => {
                state.lock().await.publishes += 1;
                if let Some(notice) = &behavior.notice {
                    replies.push(InboundFrame::Notice(notice.clone()));
                }
                if let Some(reason) = &behavior.closed_reason {
                    replies.push(InboundFrame::Closed {
                        subscription_id: String::new(),
                        reason: reason.clone(),
                    });
                } else {
                    let valid = record.verify().is_ok();
                    if valid && behavior.store {
                        store_record(&mut state.lock().await.records, record.clone());
                    }
                    match (&behavior.ack, valid) {
                        (AckMode::Silent, _) => {}
                        (_, false) => replies.push(InboundFrame::Ack {
                            record_id: record.id.clone(),
                            accepted: false,
                            message: "invalid: bad signature".into(),
                        }),
                        (AckMode::Accept, true) => replies.push(InboundFrame::Ack {
                            record_id: record.id.clone(),
                            accepted: true,
                            message: String::new(),
                        }),
                        (AckMode::Reject(reason), true) => replies.push(InboundFrame::Ack {
                            record_id: record.id.clone(),
                            accepted: false,
                            message: reason.clone(),
                        }),
                    }
                    if let Some(notice) = &behavior.notice_after_ack {
                        replies.push(InboundFrame::Notice(notice.clone()));
                    }
                }
            }
            OutboundFrame::Subscribe {
                subscription_id,
                filter,
            } => {
                if let Some(reason) = &behavior.closed_reason {
                    replies.push(InboundFrame::Closed {
                        subscription_id,
                        reason: reason.clone(),
                    });
                } else {
                    let matches = matching_records(&state, &filter).await;
                    if let Some(decoy) = &behavior.decoy_subscription {
                        answer_subscription(&mut replies, decoy, matches.clone());
                    }
                    if behavior.answer_queries {
                        answer_subscription(&mut replies, &subscription_id, matches);
                    }
                }
            }
            OutboundFrame::Close { .. } => {}
        }

        for reply in replies {
            ws.send(Message::Text(reply.encode()?)).await?;
        }
    }
    Ok(())
}

async fn matching_records(state: &Mutex<RelayState>, filter: &Filter) -> Vec<SignedRecord> {
    let mut matches: Vec<SignedRecord> = state
        .lock()
        .await
        .records
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if let Some(limit) = filter.limit {
        matches.truncate(limit);
    }
    matches
}

fn answer_subscription(
    replies: &mut Vec<InboundFrame>,
    subscription_id: &str,
    matches: Vec<SignedRecord>,
) {
    for record in matches {
        replies.push(InboundFrame::Record {
            subscription_id: subscription_id.to_string(),
            record,
        });
    }
    replies.push(InboundFrame::End {
        subscription_id: subscription_id.to_string(),
    });
}

/// Replaceable kinds keep only the newest record per (author, kind, `d`).
fn store_record(records: &mut Vec<SignedRecord>, record: SignedRecord) {
    if (30_000..40_000).contains(&record.kind) {
        let same_slot = |r: &SignedRecord| {
            r.pubkey == record.pubkey
                && r.kind == record.kind
                && r.discriminator() == record.discriminator()
        };
        if records
            .iter()
            .any(|r| same_slot(r) && r.created_at > record.created_at)
        {
            return;
        }
        records.retain(|r| !same_slot(r));
    } else if records.iter().any(|r| r.id == record.id) {
        return;
    }
    records.push(record);
}
