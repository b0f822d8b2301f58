//! Invalidation signals.
//!
//! Every successful write publishes an [`Invalidation`] naming the view
//! scopes it affects. The bus records, per scope, the sequence number of the
//! latest signal at publish time. A cached view built for a lower sequence
//! number is stale, whether or not any listener has processed the signal
//! yet.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use tatsahay_shared::constants::INVALIDATION_CHANNEL_CAPACITY;
use tatsahay_shared::{Report, UserId};

/// A family of cached views.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    User(UserId),
    Map,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("all"),
            Scope::User(id) => write!(f, "user:{id}"),
            Scope::Map => f.write_str("map"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invalidation {
    /// Position in the global write order.
    pub seq: u64,
    pub scopes: Vec<Scope>,
    /// The record whose write caused the signal.
    pub report: Report,
}

struct BusInner {
    tx: broadcast::Sender<Invalidation>,
    seq: AtomicU64,
    watermarks: RwLock<HashMap<Scope, u64>>,
}

/// Fan-out of invalidation signals plus per-scope watermarks.
#[derive(Clone)]
pub struct InvalidationBus {
    inner: Arc<BusInner>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(BusInner {
                tx,
                seq: AtomicU64::new(0),
                watermarks: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Publish a signal for `scopes` and return its sequence number.
    pub fn publish(&self, scopes: Vec<Scope>, report: Report) -> u64 {
        let seq = {
            // Sequence allocation and watermark update happen under one lock
            // so watermarks only ever move forward.
            let mut marks = self
                .inner
                .watermarks
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
            for scope in &scopes {
                marks.insert(scope.clone(), seq);
            }
            seq
        };

        debug!(
            seq,
            report = %report.id,
            scopes = ?scopes.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "invalidation published"
        );

        // No receivers simply means nobody caches anything yet.
        let _ = self.inner.tx.send(Invalidation {
            seq,
            scopes,
            report,
        });
        seq
    }

    /// Signal that `report` was created or changed: the global feed, the
    /// author's profile and the map are all affected.
    pub fn report_changed(&self, report: &Report) -> u64 {
        self.publish(
            vec![
                Scope::All,
                Scope::User(report.author_id.clone()),
                Scope::Map,
            ],
            report.clone(),
        )
    }

    /// Sequence number of the latest signal naming `scope`, 0 if none.
    pub fn watermark(&self, scope: &Scope) -> u64 {
        self.inner
            .watermarks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope)
            .copied()
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.inner.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}
