//! Submissions started through this server, kept so their author can poll
//! or cancel them.
//!
//! A finished submission stays visible for the retention window and is
//! dropped on a later insert. Submissions still in flight are never
//! dropped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use tatsahay_core::SubmissionHandle;

struct Entry {
    handle: SubmissionHandle,
    started: Instant,
}

pub struct SubmissionRegistry {
    entries: Mutex<HashMap<Uuid, Entry>>,
    retention: Duration,
}

impl SubmissionRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, handle: SubmissionHandle) {
        let mut entries = self.entries();

        let before = entries.len();
        entries.retain(|_, entry| {
            entry.started.elapsed() < self.retention || !entry.handle.state().is_terminal()
        });
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!(pruned, remaining = entries.len(), "Pruned finished submissions");
        }

        entries.insert(
            handle.id(),
            Entry {
                handle,
                started: Instant::now(),
            },
        );
    }

    pub fn get(&self, id: Uuid) -> Option<SubmissionHandle> {
        self.entries().get(&id).map(|entry| entry.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }
}
