//! Process-wide pool of producer sessions, keyed by config fingerprint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::fingerprint::Fingerprint;
use crate::producer::{Producer, ProducerFactory};
use crate::stats::{PoolCounter, StatsSink};

/// Inactivity window after which a pooled session is recycled.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

struct Entry {
    producer: Arc<dyn Producer>,
    connected: bool,
    last_used: Instant,
}

/// Pool of live producer sessions.
///
/// One session per fingerprint. [`acquire`](Self::acquire) holds a
/// per-fingerprint lock across the whole check-evict-connect sequence, so
/// concurrent dispatches for the same config cannot race a second session
/// into existence; distinct fingerprints proceed in parallel. Eviction is
/// lazy: a session's age is only examined when its fingerprint is next
/// touched, there is no background sweeper.
pub struct ProducerPool {
    factory: Arc<dyn ProducerFactory>,
    ttl: Duration,
    slots: Mutex<HashMap<Fingerprint, Arc<Mutex<Option<Entry>>>>>,
}

impl ProducerPool {
    /// Pool with the standard session TTL.
    pub fn new(factory: Arc<dyn ProducerFactory>) -> Self {
        Self::with_ttl(factory, SESSION_TTL)
    }

    /// Pool with a custom TTL. Production code wants [`SESSION_TTL`]; short
    /// TTLs are for tests.
    pub fn with_ttl(factory: Arc<dyn ProducerFactory>, ttl: Duration) -> Self {
        Self {
            factory,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of fingerprints the pool currently tracks.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Get or create the session for `config`.
    ///
    /// A fresh session is connected before it is stored; a reused one gets
    /// its idempotent `connect` re-issued so a silently dropped connection
    /// comes back. Counter emission mirrors the session lifecycle: `reused`
    /// before the reconnect, `closed`/`disconnect_error` around expiry
    /// teardown, `opened` only after a successful connect.
    pub async fn acquire(
        &self,
        key: &Fingerprint,
        config: &ConnectionConfig,
        stats: Option<&dyn StatsSink>,
    ) -> Result<Arc<dyn Producer>, TransportError> {
        let slot = self.slot(key).await;
        let mut entry = slot.lock().await;
        let now = Instant::now();

        if let Some(current) = entry.as_mut() {
            if now.duration_since(current.last_used) < self.ttl {
                emit(stats, PoolCounter::ConnectionReused);
                debug!(client_id = %config.client_id, "reusing pooled broker session");
                let producer = Arc::clone(&current.producer);
                producer.connect().await?;
                current.last_used = now;
                return Ok(producer);
            }

            debug!(client_id = %config.client_id, "pooled broker session expired");
            if current.connected {
                emit(stats, PoolCounter::ConnectionClosed);
                if let Err(error) = current.producer.disconnect().await {
                    warn!(%error, "failed to disconnect expired broker session");
                    emit(stats, PoolCounter::DisconnectError);
                }
            }
            *entry = None;
        }

        let producer = self.factory.create(config)?;
        producer.connect().await?;
        emit(stats, PoolCounter::ConnectionOpened);
        info!(
            client_id = %config.client_id,
            brokers = config.brokers.len(),
            "opened broker session"
        );
        *entry = Some(Entry {
            producer: Arc::clone(&producer),
            connected: true,
            last_used: now,
        });
        Ok(producer)
    }

    /// Refresh the recency of a session after it was used.
    pub async fn touch(&self, key: &Fingerprint) {
        let slot = self.slots.lock().await.get(key).cloned();
        if let Some(slot) = slot {
            if let Some(entry) = slot.lock().await.as_mut() {
                entry.last_used = Instant::now();
            }
        }
    }

    /// Per-fingerprint slot, created on first use. The outer map lock is
    /// held only long enough to clone the slot handle.
    async fn slot(&self, key: &Fingerprint) -> Arc<Mutex<Option<Entry>>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(key.clone()).or_default())
    }
}

fn emit(stats: Option<&dyn StatsSink>, counter: PoolCounter) {
    if let Some(stats) = stats {
        stats.incr(counter);
    }
}
