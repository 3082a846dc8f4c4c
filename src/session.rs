//! Freshness tracking for layouts computed while the snapshot keeps changing.
//!
//! Triggers may overlap: a computation started for one snapshot can finish after a newer
//! snapshot was observed. Such results are discarded at commit time instead of being
//! cancelled.

use std::cell::RefCell;

use crate::config::LayoutConfig;
use crate::ir::{Snapshot, SnapshotId};
use crate::layout::{Layout, LayoutEngine, LayoutError, compute_layout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    Discarded,
}

/// Identity of the snapshot a computation started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    identity: SnapshotId,
}

#[derive(Debug, Default)]
pub struct LayoutSession {
    latest: RefCell<Option<SnapshotId>>,
    current: RefCell<Option<Layout>>,
}

impl LayoutSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the newest snapshot the store has handed out. A snapshot with a lower
    /// revision than the one already observed is ignored.
    pub fn observe(&self, snapshot: &Snapshot) {
        let mut latest = self.latest.borrow_mut();
        if let Some(seen) = latest.as_ref().filter(|seen| snapshot.revision < seen.revision) {
            tracing::debug!(
                revision = snapshot.revision,
                latest = seen.revision,
                "ignoring out-of-order snapshot"
            );
            return;
        }
        *latest = Some(snapshot.identity());
    }

    /// Starts a computation for `snapshot`. Only [`LayoutSession::observe`] moves the latest
    /// snapshot, so starting work on an older one never makes it current again.
    pub fn begin(&self, snapshot: &Snapshot) -> Ticket {
        Ticket {
            identity: snapshot.identity(),
        }
    }

    pub fn is_fresh(&self, ticket: &Ticket) -> bool {
        self.latest.borrow().as_ref() == Some(&ticket.identity)
    }

    pub fn commit(&self, ticket: Ticket, layout: Layout) -> Commit {
        if !self.is_fresh(&ticket) {
            tracing::debug!(
                head = %ticket.identity.head,
                revision = ticket.identity.revision,
                "discarding stale layout"
            );
            return Commit::Discarded;
        }
        *self.current.borrow_mut() = Some(layout);
        Commit::Applied
    }

    /// Observes `snapshot`, computes a layout for it and commits it if nothing newer was observed in the
    /// meantime.
    pub async fn refresh<E: LayoutEngine + ?Sized>(
        &self,
        snapshot: &Snapshot,
        config: &LayoutConfig,
        engine: &E,
    ) -> Result<Commit, LayoutError> {
        self.observe(snapshot);
        let ticket = self.begin(snapshot);
        let layout = compute_layout(snapshot, config, engine).await?;
        Ok(self.commit(ticket, layout))
    }

    /// The last committed layout.
    pub fn layout(&self) -> Option<Layout> {
        self.current.borrow().clone()
    }
}
