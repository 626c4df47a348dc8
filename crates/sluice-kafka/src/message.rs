//! Outbound messages and per-message delivery outcomes.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::Partitioner;
use crate::error::{FailureClass, TransportError};

// ============================================================================
// Input
// ============================================================================

/// A single message bound for a destination topic.
///
/// The payload is opaque bytes; whatever serialization produced it happened
/// upstream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutboundMessage {
    /// Destination topic
    pub topic: String,
    /// Payload bytes
    pub payload: Bytes,
    /// Optional message key
    #[serde(default)]
    pub key: Option<String>,
    /// Optional headers
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Explicit partition; wins over `default_partition`
    #[serde(default)]
    pub partition: Option<i32>,
    /// Fallback partition when no explicit one is set
    #[serde(default)]
    pub default_partition: Option<i32>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            key: None,
            headers: None,
            partition: None,
            default_partition: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_default_partition(mut self, partition: i32) -> Self {
        self.default_partition = Some(partition);
        self
    }

    /// Partition the record will be steered to: explicit, else the fallback,
    /// else unset (the partitioner decides).
    pub fn resolved_partition(&self) -> Option<i32> {
        self.partition.or(self.default_partition)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Exactly what was handed to the transport for one message.
///
/// Echoed in every outcome, failures included, so delivery reports show what
/// was (or would have been) transmitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentRecord {
    /// Payload bytes
    pub value: Bytes,
    /// Message key, if any
    pub key: Option<String>,
    /// Headers, if any
    pub headers: Option<HashMap<String, String>>,
    /// Resolved partition, if any
    pub partition: Option<i32>,
    /// Partitioner the session was configured with
    pub partitioner: Partitioner,
}

/// Broker-reported placement of one accepted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordAck {
    pub partition: i32,
    pub offset: i64,
}

/// Delivery status of one input message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    /// The brokers accepted the record
    Success,
    /// Delivery failed but the same batch may succeed later
    RetriableFailure,
    /// Delivery failed and retrying will not help
    PermanentFailure,
}

impl DeliveryStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<FailureClass> for DeliveryStatus {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::Retriable => Self::RetriableFailure,
            FailureClass::Permanent => Self::PermanentFailure,
        }
    }
}

/// One row of the multi-status delivery report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    /// Position of the message in the dispatch input
    pub index: usize,
    /// Delivery status
    pub status: DeliveryStatus,
    /// HTTP-style status code: 200, 500 (retriable) or 400 (permanent)
    pub code: u16,
    /// Failure message, preferring the innermost cause
    pub error: Option<String>,
    /// What was handed to the transport
    pub sent: SentRecord,
    /// Broker placement, when the transport reports one
    pub ack: Option<RecordAck>,
}

impl DispatchOutcome {
    /// Outcome for an accepted record.
    pub fn success(index: usize, sent: SentRecord, ack: Option<RecordAck>) -> Self {
        Self {
            index,
            status: DeliveryStatus::Success,
            code: 200,
            error: None,
            sent,
            ack,
        }
    }

    /// Outcome for a record whose topic group failed to send.
    pub fn send_failure(index: usize, sent: SentRecord, error: &TransportError) -> Self {
        let class = FailureClass::of(error);
        Self {
            index,
            status: class.into(),
            code: class.status_code(),
            error: Some(error.root_cause_message()),
            sent,
            ack: None,
        }
    }

    /// Outcome for a record whose session never came up.
    ///
    /// Connect-phase failures point at the settings, so they are permanent
    /// regardless of how the transport flagged the error.
    pub fn connect_failure(index: usize, sent: SentRecord, error: &TransportError) -> Self {
        Self {
            index,
            status: DeliveryStatus::PermanentFailure,
            code: 400,
            error: Some(error.root_cause_message()),
            sent,
            ack: None,
        }
    }
}
