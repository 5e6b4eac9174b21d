//! Relay frame codec.
//!
//! Frames are JSON arrays whose first element names the frame type:
//!
//! | direction | frame                                   |
//! |-----------|-----------------------------------------|
//! | out       | `["EVENT", record]`                     |
//! | out       | `["REQ", subscription_id, filter]`      |
//! | out       | `["CLOSE", subscription_id]`            |
//! | in        | `["OK", record_id, accepted, message]`  |
//! | in        | `["NOTICE", message]`                   |
//! | in        | `["CLOSED", subscription_id, reason]`   |
//! | in        | `["EVENT", subscription_id, record]`    |
//! | in        | `["EOSE", subscription_id]`             |
//!
//! Pure translation, no state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;
use crate::record::SignedRecord;

/// Subscription filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(rename = "#d", default, skip_serializing_if = "Option::is_none")]
    pub d_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Filter for one record by identifier.
    pub fn by_id(id: &str) -> Self {
        Self {
            ids: Some(vec![id.to_string()]),
            limit: Some(1),
            ..Default::default()
        }
    }

    /// Filter for the newest replaceable record of `kind` by `author` with discriminator `d`.
    pub fn by_discriminator(kind: u32, author: &str, d: &str) -> Self {
        Self {
            kinds: Some(vec![kind]),
            authors: Some(vec![author.to_string()]),
            d_tags: Some(vec![d.to_string()]),
            limit: Some(1),
            ..Default::default()
        }
    }

    /// Whether `record` satisfies every populated field of the filter.
    pub fn matches(&self, record: &SignedRecord) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &record.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| a == &record.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&record.kind) {
                return false;
            }
        }
        if let Some(d_tags) = &self.d_tags {
            match record.discriminator() {
                Some(d) if d_tags.iter().any(|v| v == d) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Publish(SignedRecord),
    Subscribe {
        subscription_id: String,
        filter: Filter,
    },
    Close {
        subscription_id: String,
    },
}

/// Frames sent by a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Ack {
        record_id: String,
        accepted: bool,
        message: String,
    },
    Notice(String),
    Closed {
        subscription_id: String,
        reason: String,
    },
    Record {
        subscription_id: String,
        record: SignedRecord,
    },
    End {
        subscription_id: String,
    },
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, FrameError> {
        let value = match self {
            Self::Publish(record) => serde_json::json!(["EVENT", record]),
            Self::Subscribe {
                subscription_id,
                filter,
            } => serde_json::json!(["REQ", subscription_id, filter]),
            Self::Close { subscription_id } => serde_json::json!(["CLOSE", subscription_id]),
        };
        Ok(serde_json::to_string(&value)?)
    }

    /// Relay-side decoding (used by the mock relay).
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        let items = split_frame(raw)?;
        match frame_type(&items)? {
            "EVENT" => {
                let record = items.get(1).ok_or(FrameError::Malformed("EVENT"))?;
                Ok(Self::Publish(serde_json::from_value(record.clone())?))
            }
            "REQ" => {
                let subscription_id = string_at(&items, 1, "REQ")?;
                let filter = match items.get(2) {
                    Some(v) => serde_json::from_value(v.clone())?,
                    None => Filter::default(),
                };
                Ok(Self::Subscribe {
                    subscription_id,
                    filter,
                })
            }
            "CLOSE" => Ok(Self::Close {
                subscription_id: string_at(&items, 1, "CLOSE")?,
            }),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }
}

impl InboundFrame {
    pub fn decode(raw: &str) -> Result<Self, FrameError> {
        let items = split_frame(raw)?;
        match frame_type(&items)? {
            "OK" => {
                let record_id = string_at(&items, 1, "OK")?;
                let accepted = items
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or(FrameError::Malformed("OK"))?;
                let message = items
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Ack {
                    record_id,
                    accepted,
                    message,
                })
            }
            "NOTICE" => Ok(Self::Notice(string_at(&items, 1, "NOTICE")?)),
            "CLOSED" => Ok(Self::Closed {
                subscription_id: string_at(&items, 1, "CLOSED")?,
                reason: items
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "EVENT" => {
                let subscription_id = string_at(&items, 1, "EVENT")?;
                let record = items.get(2).ok_or(FrameError::Malformed("EVENT"))?;
                Ok(Self::Record {
                    subscription_id,
                    record: serde_json::from_value(record.clone())?,
                })
            }
            "EOSE" => Ok(Self::End {
                subscription_id: string_at(&items, 1, "EOSE")?,
            }),
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }

    /// Relay-side encoding (used by the mock relay).
    pub fn encode(&self) -> Result<String, FrameError> {
        let value = match self {
            Self::Ack {
                record_id,
                accepted,
                message,
            } => serde_json::json!(["OK", record_id, accepted, message]),
            Self::Notice(message) => serde_json::json!(["NOTICE", message]),
            Self::Closed {
                subscription_id,
                reason,
            } => serde_json::json!(["CLOSED", subscription_id, reason]),
            Self::Record {
                subscription_id,
                record,
            } => serde_json::json!(["EVENT", subscription_id, record]),
            Self::End { subscription_id } => serde_json::json!(["EOSE", subscription_id]),
        };
        Ok(serde_json::to_string(&value)?)
    }
}

fn split_frame(raw: &str) -> Result<Vec<Value>, FrameError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(FrameError::NotArray),
    }
}

fn frame_type(items: &[Value]) -> Result<&str, FrameError> {
    items
        .first()
        .and_then(Value::as_str)
        .ok_or(FrameError::NotArray)
}

fn string_at(items: &[Value], index: usize, frame: &'static str) -> Result<String, FrameError> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(FrameError::Malformed(frame))
}
