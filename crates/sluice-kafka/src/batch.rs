//! Topic grouping for one dispatch call.

use std::collections::HashMap;

use crate::config::ConnectionConfig;
use crate::message::{OutboundMessage, SentRecord};

/// One record of a topic group, tagged with its input position.
#[derive(Debug, Clone)]
pub struct BatchRecord {
    /// Position in the dispatch input
    pub index: usize,
    /// Transport-ready record
    pub sent: SentRecord,
}

/// All records bound for one topic, in input order.
#[derive(Debug, Clone)]
pub struct TopicBatch {
    pub topic: String,
    pub records: Vec<BatchRecord>,
}

impl TopicBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Partition messages by destination topic.
///
/// Groups appear in order of each topic's first occurrence and records keep
/// their relative input order inside a group. Partition resolution happens
/// here: explicit partition, else the message's fallback, else unset.
pub fn group_by_topic(
    config: &ConnectionConfig,
    messages: Vec<OutboundMessage>,
) -> Vec<TopicBatch> {
    let mut batches: Vec<TopicBatch> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, message) in messages.into_iter().enumerate() {
        let partition = message.resolved_partition();
        let OutboundMessage {
            topic,
            payload,
            key,
            headers,
            ..
        } = message;
        let sent = SentRecord {
            value: payload,
            key,
            headers,
            partition,
            partitioner: config.partitioner,
        };

        let position = match positions.get(&topic) {
            Some(&position) => position,
            None => {
                let position = batches.len();
                positions.insert(topic.clone(), position);
                batches.push(TopicBatch {
                    topic,
                    records: Vec::new(),
                });
                position
            }
        };
        batches[position].records.push(BatchRecord { index, sent });
    }

    batches
}
