//! The session seam between the pool and a concrete broker client.

use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::TopicBatch;
use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::message::RecordAck;

/// A producer session for one connection config.
///
/// Implementations wrap a concrete client library. The pool drives the
/// lifecycle and relies on two properties:
///
/// - `connect` is idempotent; it is re-issued on every reuse and must be a
///   cheap no-op when the session is already up
/// - `send` is atomic per topic group; either every record of the group is
///   accepted or the call fails as a whole
#[async_trait]
pub trait Producer: Send + Sync {
    /// Establish the session. Safe to call when already connected.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Send one topic group, returning acks in record order when the client
    /// reports them.
    async fn send(&self, batch: &TopicBatch) -> Result<Vec<RecordAck>, TransportError>;

    /// Tear the session down. Best effort; the pool logs and counts failures
    /// but never aborts on them.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Builds producers for the pool.
///
/// Construction must not touch the network; the pool drives `connect`
/// separately so that connect failures are attributable.
pub trait ProducerFactory: Send + Sync {
    fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Producer>, TransportError>;
}
