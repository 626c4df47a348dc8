//! Observability hooks for the session pool.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Pool lifecycle counters emitted during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCounter {
    /// A new broker session was opened
    ConnectionOpened,
    /// An existing session was served from the pool
    ConnectionReused,
    /// An expired session was closed
    ConnectionClosed,
    /// Closing an expired session failed
    DisconnectError,
}

impl PoolCounter {
    /// Stable counter name for external stats pipelines.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConnectionOpened => "connection_opened",
            Self::ConnectionReused => "connection_reused",
            Self::ConnectionClosed => "connection_closed",
            Self::DisconnectError => "disconnect_error",
        }
    }
}

/// Receives pool lifecycle counters.
///
/// Passed per dispatch call rather than held by the pool, so one pool can
/// serve callers with different stats pipelines.
pub trait StatsSink: Send + Sync {
    fn incr(&self, counter: PoolCounter);
}

/// Lock-free counter set, the default [`StatsSink`].
///
/// All counters are relaxed atomics. Read them through
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct PoolStats {
    connections_opened: AtomicU64,
    connections_reused: AtomicU64,
    connections_closed: AtomicU64,
    disconnect_errors: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_reused: self.connections_reused.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            disconnect_errors: self.disconnect_errors.load(Ordering::Relaxed),
        }
    }
}

impl StatsSink for PoolStats {
    fn incr(&self, counter: PoolCounter) {
        let cell = match counter {
            PoolCounter::ConnectionOpened => &self.connections_opened,
            PoolCounter::ConnectionReused => &self.connections_reused,
            PoolCounter::ConnectionClosed => &self.connections_closed,
            PoolCounter::DisconnectError => &self.disconnect_errors,
        };
        cell.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of [`PoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatsSnapshot {
    pub connections_opened: u64,
    pub connections_reused: u64,
    pub connections_closed: u64,
    pub disconnect_errors: u64,
}

impl PoolStatsSnapshot {
    /// Share of acquisitions served from the pool, 0.0 when idle.
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.connections_opened + self.connections_reused;
        if total == 0 {
            return 0.0;
        }
        self.connections_reused as f64 / total as f64
    }

    /// Render in Prometheus text exposition format.
    pub fn to_prometheus_format(&self, prefix: &str) -> String {
        let mut output = String::new();
        let rows = [
            (
                "connections_opened_total",
                "Broker sessions opened",
                self.connections_opened,
            ),
            (
                "connections_reused_total",
                "Broker sessions served from the pool",
                self.connections_reused,
            ),
            (
                "connections_closed_total",
                "Expired broker sessions closed",
                self.connections_closed,
            ),
            (
                "disconnect_errors_total",
                "Failures while closing expired sessions",
                self.disconnect_errors,
            ),
        ];
        for (name, help, value) in rows {
            output.push_str(&format!("# HELP {}_{} {}\n", prefix, name, help));
            output.push_str(&format!("# TYPE {}_{} counter\n", prefix, name));
            output.push_str(&format!("{}_{} {}\n", prefix, name, value));
        }
        output
    }
}
