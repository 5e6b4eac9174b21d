// Relay transport: WebSocket links with bounded receive windows, the
// subscription query engine, and the multi-relay publish coordinator.

pub mod error;
pub mod publish;
pub mod query;
pub mod relay;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{PublishError, TransportError};
pub use publish::{publish, publish_to_endpoint, summarize, PublishOutcome, PublishSummary};
pub use query::{query, query_endpoint, query_link};
pub use relay::{ReceiveWindow, RelayEndpoint, RelayLink, RelayTimeouts};
