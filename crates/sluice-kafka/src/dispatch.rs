//! Batched dispatch with per-message outcomes.

use std::sync::Arc;

use futures::future;
use tracing::{debug, error, warn};

use crate::batch::{group_by_topic, TopicBatch};
use crate::config::ConnectionConfig;
use crate::error::{ConfigError, TransportError};
use crate::fingerprint::Fingerprint;
use crate::message::{DispatchOutcome, OutboundMessage, RecordAck};
use crate::pool::ProducerPool;
use crate::producer::Producer;
use crate::stats::StatsSink;

/// Entry point of the engine.
///
/// One dispatcher per process is the intended shape; it owns the session
/// pool and is cheap to share behind an [`Arc`].
pub struct Dispatcher {
    pool: Arc<ProducerPool>,
}

impl Dispatcher {
    pub fn new(pool: Arc<ProducerPool>) -> Self {
        Self { pool }
    }

    /// The session pool backing this dispatcher.
    pub fn pool(&self) -> &Arc<ProducerPool> {
        &self.pool
    }

    /// Send `messages` through the pooled session for `config`.
    ///
    /// Returns one outcome per input message, in input order, with partial
    /// success expressed per message. The `Err` side is reserved for rejected
    /// settings, which abort before any network activity; once the config
    /// passes validation every path reports through the outcomes:
    ///
    /// - the session cannot be established: every message fails permanent
    /// - one topic group fails to send: that group's messages fail, the
    ///   other groups are unaffected
    pub async fn dispatch(
        &self,
        config: &ConnectionConfig,
        messages: Vec<OutboundMessage>,
        stats: Option<&dyn StatsSink>,
    ) -> Result<Vec<DispatchOutcome>, ConfigError> {
        config.ensure_valid()?;
        let key = Fingerprint::compute(config)?;

        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let total = messages.len();
        let batches = group_by_topic(config, messages);
        debug!(messages = total, groups = batches.len(), "dispatching batch");

        let producer = match self.pool.acquire(&key, config, stats).await {
            Ok(producer) => producer,
            Err(err) => {
                error!(error = %err, "broker session unavailable, failing whole batch");
                return Ok(connect_failure_outcomes(batches, &err));
            }
        };

        // One send per topic group, all groups in flight at once.
        let sends = batches
            .iter()
            .map(|batch| send_group(producer.as_ref(), batch));
        let results = future::join_all(sends).await;

        let mut outcomes = Vec::with_capacity(total);
        for (batch, result) in batches.into_iter().zip(results) {
            match result {
                Ok(acks) => {
                    for (position, record) in batch.records.into_iter().enumerate() {
                        let ack = acks.get(position).copied();
                        outcomes.push(DispatchOutcome::success(record.index, record.sent, ack));
                    }
                }
                Err(err) => {
                    warn!(topic = %batch.topic, error = %err, "topic group send failed");
                    for record in batch.records {
                        outcomes.push(DispatchOutcome::send_failure(
                            record.index,
                            record.sent,
                            &err,
                        ));
                    }
                }
            }
        }
        outcomes.sort_by_key(|outcome| outcome.index);

        self.pool.touch(&key).await;
        Ok(outcomes)
    }
}

#[cfg(feature = "rskafka")]
impl Dispatcher {
    /// Dispatcher over a fresh pool backed by the bundled rskafka transport.
    pub fn with_default_transport() -> Self {
        let factory = Arc::new(crate::transport::RskafkaProducerFactory);
        Self::new(Arc::new(ProducerPool::new(factory)))
    }
}

async fn send_group(
    producer: &dyn Producer,
    batch: &TopicBatch,
) -> Result<Vec<RecordAck>, TransportError> {
    let acks = producer.send(batch).await?;
    debug!(topic = %batch.topic, records = batch.len(), "topic group sent");
    Ok(acks)
}

/// Fail every record of every group with the connect-phase error.
fn connect_failure_outcomes(
    batches: Vec<TopicBatch>,
    err: &TransportError,
) -> Vec<DispatchOutcome> {
    let mut outcomes: Vec<DispatchOutcome> = batches
        .into_iter()
        .flat_map(|batch| batch.records)
        .map(|record| DispatchOutcome::connect_failure(record.index, record.sent, err))
        .collect();
    outcomes.sort_by_key(|outcome| outcome.index);
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMechanism;
    use crate::message::DeliveryStatus;
    use crate::producer::ProducerFactory;
    use crate::stats::PoolStats;
    use crate::types::SensitiveString;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Producer that records sends and fails topics on demand.
    #[derive(Default)]
    struct ScriptedProducer {
        fail_connect: AtomicBool,
        connect_attempts: AtomicUsize,
        send_errors: Mutex<HashMap<String, TransportError>>,
        sent: Mutex<Vec<TopicBatch>>,
    }

    impl ScriptedProducer {
        fn fail_topic(&self, topic: &str, error: TransportError) {
            self.send_errors
                .lock()
                .unwrap()
                .insert(topic.to_string(), error);
        }

        fn sent_topics(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|batch| batch.topic.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Producer for ScriptedProducer {
        async fn connect(&self) -> Result<(), TransportError> {
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(TransportError::connection("bootstrap brokers unreachable"));
            }
            Ok(())
        }

        async fn send(&self, batch: &TopicBatch) -> Result<Vec<RecordAck>, TransportError> {
            if let Some(error) = self.send_errors.lock().unwrap().remove(&batch.topic) {
                return Err(error);
            }
            let acks = batch
                .records
                .iter()
                .enumerate()
                .map(|(offset, record)| RecordAck {
                    partition: record.sent.partition.unwrap_or(0),
                    offset: offset as i64,
                })
                .collect();
            self.sent.lock().unwrap().push(batch.clone());
            Ok(acks)
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct ScriptedFactory {
        producer: Arc<ScriptedProducer>,
        created: AtomicUsize,
    }

    impl ScriptedFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                producer: Arc::new(ScriptedProducer::default()),
                created: AtomicUsize::new(0),
            })
        }
    }

    impl ProducerFactory for ScriptedFactory {
        fn create(
            &self,
            _config: &ConnectionConfig,
        ) -> Result<Arc<dyn Producer>, TransportError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.producer) as Arc<dyn Producer>)
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<ScriptedFactory>) {
        let factory = ScriptedFactory::new();
        let pool = Arc::new(ProducerPool::new(factory.clone()));
        (Dispatcher::new(pool), factory)
    }

    fn config() -> ConnectionConfig {
        let mut config = ConnectionConfig::new("writer-1", vec!["broker-a:9092".to_string()]);
        config.username = Some("svc-user".to_string());
        config.password = Some(SensitiveString::new("hunter2"));
        config
    }

    fn message(topic: &str, payload: &str) -> OutboundMessage {
        OutboundMessage::new(topic, payload.as_bytes().to_vec())
    }

    fn interleaved() -> Vec<OutboundMessage> {
        vec![
            message("t1", "A"),
            message("t2", "B"),
            message("t1", "C"),
        ]
    }

    #[tokio::test]
    async fn test_all_messages_accepted() {
        let (dispatcher, factory) = dispatcher();
        let outcomes = dispatcher
            .dispatch(&config(), interleaved(), None)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        for (position, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, position);
            assert_eq!(outcome.status, DeliveryStatus::Success);
            assert_eq!(outcome.code, 200);
            assert_eq!(outcome.error, None);
            assert!(outcome.ack.is_some());
        }
        assert_eq!(outcomes[0].sent.value, Bytes::from_static(b"A"));
        assert_eq!(outcomes[1].sent.value, Bytes::from_static(b"B"));
        assert_eq!(outcomes[2].sent.value, Bytes::from_static(b"C"));

        // two topic groups went out, one per topic
        assert_eq!(factory.producer.sent_topics(), vec!["t1", "t2"]);
        let sent = factory.producer.sent.lock().unwrap();
        assert_eq!(sent[0].records.len(), 2);
        assert_eq!(sent[1].records.len(), 1);
    }

    #[tokio::test]
    async fn test_retriable_group_failure_scopes_to_that_group() {
        let (dispatcher, factory) = dispatcher();
        factory
            .producer
            .fail_topic("t2", TransportError::produce("not enough in-sync replicas", true));

        let outcomes = dispatcher
            .dispatch(&config(), interleaved(), None)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, DeliveryStatus::Success);
        assert_eq!(outcomes[1].status, DeliveryStatus::RetriableFailure);
        assert_eq!(outcomes[1].code, 500);
        assert!(outcomes[1]
            .error
            .as_deref()
            .unwrap()
            .contains("in-sync replicas"));
        assert_eq!(outcomes[2].status, DeliveryStatus::Success);

        // the failed group still echoes what would have been sent
        assert_eq!(outcomes[1].sent.value, Bytes::from_static(b"B"));
    }

    #[tokio::test]
    async fn test_permanent_group_failure_reports_400() {
        let (dispatcher, factory) = dispatcher();
        factory
            .producer
            .fail_topic("t1", TransportError::produce("message too large", false));

        let outcomes = dispatcher
            .dispatch(&config(), interleaved(), None)
            .await
            .unwrap();

        assert_eq!(outcomes[0].status, DeliveryStatus::PermanentFailure);
        assert_eq!(outcomes[0].code, 400);
        assert_eq!(outcomes[1].status, DeliveryStatus::Success);
        assert_eq!(outcomes[2].status, DeliveryStatus::PermanentFailure);
        assert_eq!(outcomes[2].code, 400);
    }

    #[tokio::test]
    async fn test_unknown_error_shape_is_permanent() {
        let (dispatcher, factory) = dispatcher();
        factory
            .producer
            .fail_topic("t1", TransportError::unsupported("exotic client state"));

        let outcomes = dispatcher
            .dispatch(&config(), vec![message("t1", "A")], None)
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, DeliveryStatus::PermanentFailure);
        assert_eq!(outcomes[0].code, 400);
    }

    #[tokio::test]
    async fn test_connect_failure_fails_the_whole_batch() {
        let (dispatcher, factory) = dispatcher();
        factory.producer.fail_connect.store(true, Ordering::SeqCst);

        let outcomes = dispatcher
            .dispatch(&config(), interleaved(), None)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        for (position, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, position);
            assert_eq!(outcome.status, DeliveryStatus::PermanentFailure);
            assert_eq!(outcome.code, 400);
            assert!(outcome
                .error
                .as_deref()
                .unwrap()
                .contains("bootstrap brokers unreachable"));
        }
        // nothing went out
        assert!(factory.producer.sent_topics().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_settings_never_touch_the_network() {
        let (dispatcher, factory) = dispatcher();
        let mut config = config();
        config.password = None;

        let err = dispatcher
            .dispatch(&config, interleaved(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SASL_PARAMS_MISSING");
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
        assert_eq!(factory.producer.connect_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_no_outcomes() {
        let (dispatcher, factory) = dispatcher();
        let outcomes = dispatcher
            .dispatch(&config(), Vec::new(), None)
            .await
            .unwrap();
        assert!(outcomes.is_empty());
        // no session is opened for an empty batch
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_reports_innermost_cause() {
        let (dispatcher, factory) = dispatcher();
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded on broker 3");
        factory.producer.fail_topic(
            "t1",
            TransportError::produce_with_source("produce request rejected", false, inner),
        );

        let outcomes = dispatcher
            .dispatch(&config(), vec![message("t1", "A")], None)
            .await
            .unwrap();
        assert_eq!(
            outcomes[0].error.as_deref(),
            Some("quota exceeded on broker 3")
        );
    }

    #[tokio::test]
    async fn test_partition_resolution_reaches_the_transport() {
        let (dispatcher, factory) = dispatcher();
        let messages = vec![
            message("t", "a").with_partition(3).with_default_partition(7),
            message("t", "b").with_default_partition(7),
            message("t", "c"),
        ];

        let outcomes = dispatcher.dispatch(&config(), messages, None).await.unwrap();
        assert_eq!(outcomes[0].sent.partition, Some(3));
        assert_eq!(outcomes[1].sent.partition, Some(7));
        assert_eq!(outcomes[2].sent.partition, None);

        let sent = factory.producer.sent.lock().unwrap();
        assert_eq!(sent[0].records[0].sent.partition, Some(3));
    }

    #[tokio::test]
    async fn test_acks_carry_partition_and_offset() {
        let (dispatcher, _factory) = dispatcher();
        let messages = vec![message("t", "a").with_partition(5), message("t", "b").with_partition(5)];

        let outcomes = dispatcher.dispatch(&config(), messages, None).await.unwrap();
        assert_eq!(outcomes[0].ack, Some(RecordAck { partition: 5, offset: 0 }));
        assert_eq!(outcomes[1].ack, Some(RecordAck { partition: 5, offset: 1 }));
    }

    #[tokio::test]
    async fn test_pool_stats_flow_through_dispatch() {
        let (dispatcher, _factory) = dispatcher();
        let stats = PoolStats::new();

        dispatcher
            .dispatch(&config(), vec![message("t", "a")], Some(&stats))
            .await
            .unwrap();
        dispatcher
            .dispatch(&config(), vec![message("t", "b")], Some(&stats))
            .await
            .unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_opened, 1);
        assert_eq!(snapshot.connections_reused, 1);
    }

    #[tokio::test]
    async fn test_same_settings_share_one_session_across_calls() {
        let (dispatcher, factory) = dispatcher();

        for _ in 0..3 {
            dispatcher
                .dispatch(&config(), vec![message("t", "x")], None)
                .await
                .unwrap();
        }
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.pool().len().await, 1);
    }

    #[tokio::test]
    async fn test_changed_credentials_open_a_second_session() {
        let (dispatcher, factory) = dispatcher();

        dispatcher
            .dispatch(&config(), vec![message("t", "x")], None)
            .await
            .unwrap();

        let mut rotated = config();
        rotated.password = Some(SensitiveString::new("hunter3"));
        dispatcher
            .dispatch(&rotated, vec![message("t", "y")], None)
            .await
            .unwrap();

        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.pool().len().await, 2);
    }

    #[tokio::test]
    async fn test_iam_settings_validate_before_dispatch() {
        let (dispatcher, _factory) = dispatcher();
        let mut config = ConnectionConfig::new("writer-1", vec!["broker-a:9092".to_string()]);
        config.mechanism = AuthMechanism::AwsIam;

        let err = dispatcher
            .dispatch(&config, vec![message("t", "x")], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SASL_AWS_PARAMS_MISSING");
    }
}
