//! sluice-kafka - Pooled Kafka producer sessions with batched, multi-status dispatch
//!
//! This crate is the delivery engine of a Kafka destination: it takes a
//! connection config plus a batch of outbound messages, reuses (or opens) the
//! right producer session, sends each topic's records as one atomic group and
//! reports a per-message outcome without failing the batch as a whole.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                          │
//! │   validate config ─ fingerprint ─ group by topic ─ send    │
//! ├──────────────────────────┬─────────────────────────────────┤
//! │       ProducerPool       │        DispatchOutcome          │
//! │  fingerprint -> session  │  index, status, code, sent, ack │
//! │  30 min idle TTL, lazy   │  200 ok / 500 retry / 400 drop  │
//! ├──────────────────────────┴─────────────────────────────────┤
//! │              Producer / ProducerFactory traits             │
//! │        bundled impl: rskafka (feature "rskafka")           │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use sluice_kafka::{ConnectionConfig, Dispatcher, OutboundMessage, PoolStats};
//!
//! let mut config = ConnectionConfig::new("my-writer", vec!["broker-a:9092".into()]);
//! config.username = Some("svc-user".into());
//! config.password = Some("hunter2".into());
//!
//! let dispatcher = Dispatcher::with_default_transport();
//! let stats = PoolStats::new();
//!
//! let outcomes = dispatcher
//!     .dispatch(
//!         &config,
//!         vec![
//!             OutboundMessage::new("events", r#"{"kind":"signup"}"#).with_key("user-42"),
//!             OutboundMessage::new("audit", r#"{"kind":"login"}"#),
//!         ],
//!         Some(&stats),
//!     )
//!     .await?;
//!
//! for outcome in &outcomes {
//!     println!("#{} -> {} ({})", outcome.index, outcome.code, outcome.status.is_success());
//! }
//! ```
//!
//! Sessions are keyed by a canonical fingerprint of the config, so repeated
//! dispatches with the same settings share one connection and a credential
//! rotation transparently opens a new one.

// Connection settings and validation
pub mod config;

// Canonical cache key for pooled sessions
pub mod fingerprint;

// Error types
pub mod error;

// Messages, outcomes and topic grouping
pub mod batch;
pub mod message;

// Session pool and the transport seam
pub mod dispatch;
pub mod pool;
pub mod producer;

// Pool observability
pub mod stats;

// Common types (SensitiveString)
pub mod types;

// Bundled rskafka transport
#[cfg(feature = "rskafka")]
pub mod transport;

// Re-export the working surface at the crate root
pub use batch::{group_by_topic, BatchRecord, TopicBatch};
pub use config::{AuthMechanism, ConnectionConfig, Partitioner, TlsOptions};
pub use dispatch::Dispatcher;
pub use error::{ConfigError, FailureClass, TransportError};
pub use fingerprint::Fingerprint;
pub use message::{
    DeliveryStatus, DispatchOutcome, OutboundMessage, RecordAck, SentRecord,
};
pub use pool::{ProducerPool, SESSION_TTL};
pub use producer::{Producer, ProducerFactory};
pub use stats::{PoolCounter, PoolStats, PoolStatsSnapshot, StatsSink};
pub use types::SensitiveString;

#[cfg(feature = "rskafka")]
pub use transport::{RskafkaProducer, RskafkaProducerFactory, REQUEST_TIMEOUT};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AuthMechanism,
        ConfigError,
        ConnectionConfig,
        DeliveryStatus,
        DispatchOutcome,
        Dispatcher,
        OutboundMessage,
        Partitioner,
        PoolStats,
        Producer,
        ProducerFactory,
        ProducerPool,
        RecordAck,
        SensitiveString,
        StatsSink,
        TopicBatch,
        TransportError,
    };
    #[cfg(feature = "rskafka")]
    pub use crate::RskafkaProducerFactory;
}
