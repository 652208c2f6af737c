//! Aggregation of file change bursts.
//!
//! Changes are collected until no new change has arrived for the aggregate
//! window, then released as one batch. Editors that write a file several
//! times per save produce one rebuild.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeSet<PathBuf>,
    deadline: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeSet::new(),
            deadline: None,
        }
    }

    /// Record a change observed at `now`. Pushes the deadline back.
    pub fn record_at(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path);
        self.deadline = Some(now + self.window);
    }

    pub fn record(&mut self, path: PathBuf) {
        self.record_at(path, Instant::now());
    }

    /// Release the batch if the window has passed since the last change.
    pub fn drain_ready_at(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(std::mem::take(&mut self.pending).into_iter().collect())
            }
            _ => None,
        }
    }

    pub fn drain_ready(&mut self) -> Option<Vec<PathBuf>> {
        self.drain_ready_at(Instant::now())
    }

    /// Time left until the pending batch is due, if there is one.
    #[must_use]
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}
