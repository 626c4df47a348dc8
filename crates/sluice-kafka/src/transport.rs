//! Bundled transport backed by rskafka.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rskafka::client::partition::{Compression, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder, SaslConfig};
use rskafka::record::Record;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::batch::TopicBatch;
use crate::config::{AuthMechanism, ConnectionConfig};
use crate::error::TransportError;
use crate::message::RecordAck;
use crate::producer::{Producer, ProducerFactory};

/// Ceiling on client construction, which covers metadata bootstrap.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Producer session backed by an rskafka [`Client`].
///
/// The client is built lazily on the first `connect` and kept until
/// `disconnect`; re-connecting while a client is live is a no-op, which is
/// the idempotence the pool relies on.
pub struct RskafkaProducer {
    config: ConnectionConfig,
    client: Mutex<Option<Arc<Client>>>,
}

impl RskafkaProducer {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    async fn build_client(&self) -> Result<Client, TransportError> {
        let brokers: Vec<String> = self
            .config
            .brokers
            .iter()
            .map(|broker| broker.trim().to_string())
            .collect();
        let mut builder = ClientBuilder::new(brokers);

        match self.config.mechanism {
            AuthMechanism::Plain | AuthMechanism::ScramSha256 | AuthMechanism::ScramSha512 => {
                let (Some(username), Some(password)) =
                    (&self.config.username, &self.config.password)
                else {
                    return Err(TransportError::auth(
                        "SASL authentication requires username and password",
                    ));
                };
                if self.config.mechanism != AuthMechanism::Plain {
                    // rskafka v0.5 only speaks SASL/PLAIN
                    warn!(
                        mechanism = ?self.config.mechanism,
                        "SCRAM is not supported by this transport, falling back to SASL/PLAIN"
                    );
                }
                builder = builder.sasl_config(SaslConfig::Plain {
                    username: username.clone(),
                    password: password.expose_secret().to_string(),
                });
            }
            AuthMechanism::AwsIam => {
                return Err(TransportError::unsupported(
                    "IAM authentication is not available in the rskafka transport",
                ));
            }
            AuthMechanism::ClientCert => {
                return Err(TransportError::unsupported(
                    "client-certificate authentication is not available in the rskafka transport",
                ));
            }
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, builder.build()).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(error)) => Err(TransportError::connection(format!(
                "failed to build Kafka client: {error}"
            ))),
            Err(_) => Err(TransportError::timeout(format!(
                "Kafka client construction exceeded {REQUEST_TIMEOUT:?}"
            ))),
        }
    }
}

#[async_trait]
impl Producer for RskafkaProducer {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut client = self.client.lock().await;
        if client.is_none() {
            *client = Some(Arc::new(self.build_client().await?));
            debug!(client_id = %self.config.client_id, "Kafka client ready");
        }
        Ok(())
    }

    async fn send(&self, batch: &TopicBatch) -> Result<Vec<RecordAck>, TransportError> {
        let client = self
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(|| TransportError::connection("producer is not connected"))?;

        // rskafka produces per partition, so split the group accordingly.
        // Records without a resolved partition go to partition 0.
        let mut partitions: Vec<i32> = Vec::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (position, record) in batch.records.iter().enumerate() {
            let partition = record.sent.partition.unwrap_or(0);
            match partitions.iter().position(|&known| known == partition) {
                Some(slot) => groups[slot].push(position),
                None => {
                    partitions.push(partition);
                    groups.push(vec![position]);
                }
            }
        }

        let mut acks: Vec<Option<RecordAck>> = vec![None; batch.records.len()];
        for (partition, positions) in partitions.into_iter().zip(groups) {
            let partition_client = client
                .partition_client(&batch.topic, partition, UnknownTopicHandling::Retry)
                .await
                .map_err(|error| {
                    TransportError::connection(format!(
                        "failed to open partition client for {}/{}: {error}",
                        batch.topic, partition
                    ))
                })?;

            let records: Vec<Record> = positions
                .iter()
                .map(|&position| to_record(&batch.records[position].sent))
                .collect();

            let offsets = partition_client
                .produce(records, Compression::NoCompression)
                .await
                .map_err(classify_produce_error)?;

            if offsets.len() != positions.len() {
                return Err(TransportError::produce(
                    "broker returned fewer acks than records sent",
                    false,
                ));
            }
            for (&position, offset) in positions.iter().zip(offsets) {
                acks[position] = Some(RecordAck { partition, offset });
            }
        }

        Ok(acks.into_iter().flatten().collect())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        // rskafka has no explicit close; dropping the client tears the
        // connections down.
        let mut client = self.client.lock().await;
        if client.take().is_some() {
            debug!(client_id = %self.config.client_id, "Kafka client dropped");
        }
        Ok(())
    }
}

fn to_record(sent: &crate::message::SentRecord) -> Record {
    let mut headers = BTreeMap::new();
    if let Some(map) = &sent.headers {
        for (name, value) in map {
            headers.insert(name.clone(), value.clone().into_bytes());
        }
    }
    Record {
        key: sent.key.as_ref().map(|key| key.as_bytes().to_vec()),
        value: Some(sent.value.to_vec()),
        headers,
        timestamp: chrono::Utc::now(),
    }
}

/// Map an rskafka produce failure onto the retriable contract.
///
/// rskafka does not expose a structured retriable flag at this level, so
/// classification goes by the rendered message; anything that does not look
/// transient is treated as permanent.
fn classify_produce_error(error: impl std::error::Error + Send + Sync + 'static) -> TransportError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    let transient = [
        "connection",
        "refused",
        "reset",
        "broken pipe",
        "timed out",
        "timeout",
        "eof",
        "leader",
        "not enough",
        "unavailable",
        "rebalance",
    ];
    let retriable = transient.iter().any(|needle| lowered.contains(needle));
    TransportError::produce_with_source(message, retriable, error)
}

/// Factory handing out [`RskafkaProducer`] sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RskafkaProducerFactory;

impl ProducerFactory for RskafkaProducerFactory {
    fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Producer>, TransportError> {
        if config.tls.enabled || config.tls.ca_cert.is_some() {
            warn!("custom TLS trust material is not applied by the rskafka transport");
        }
        Ok(Arc::new(RskafkaProducer::new(config.clone())))
    }
}
