//! Authoritative in-memory milestone state.
//!
//! The state is volatile: it starts empty on every process start and is
//! rebuilt only from events observed afterwards.

use crate::events::{MilestoneEvent, Percentage};
use compact_str::CompactString;
use mona_sdk::objects::WsServerMessage;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// A read-consistent view of the state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub current_milestone: Percentage,
    /// Visible windows in first-seen order.
    pub windows_visible: Vec<CompactString>,
}

impl StateSnapshot {
    /// The `snapshot` message sent to a newly admitted subscriber.
    pub fn to_message(&self) -> WsServerMessage {
        WsServerMessage::Snapshot {
            current_milestone: self.current_milestone.get(),
            windows_visible: self.windows_visible.clone(),
        }
    }
}

/// What a single [`StateStore::apply`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Applied {
    pub milestone_raised: bool,
    pub window_added: bool,
}

#[derive(Debug, Default)]
struct MilestoneState {
    latest_milestone: Percentage,
    window_index: HashSet<CompactString>,
    windows: Vec<CompactString>,
}

impl MilestoneState {
    fn apply(&mut self, event: &MilestoneEvent) -> Applied {
        // One global maximum across all windows, not per-window progress.
        let milestone_raised = event.payment_percentage > self.latest_milestone;
        if milestone_raised {
            self.latest_milestone = event.payment_percentage;
        }

        let window_added = self.window_index.insert(event.window_name.clone());
        if window_added {
            self.windows.push(event.window_name.clone());
        }

        Applied {
            milestone_raised,
            window_added,
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            current_milestone: self.latest_milestone,
            windows_visible: self.windows.clone(),
        }
    }
}

/// Shared handle to the milestone state.
///
/// Cloning is cheap; all clones see the same state. The milestone never
/// decreases and windows are never removed.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<MilestoneState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `event` into the state as one atomic step.
    pub fn apply(&self, event: &MilestoneEvent) -> Applied {
        self.apply_then(event, |_| ()).0
    }

    /// Read the whole state at once.
    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.read().snapshot()
    }

    /// Whether any event so far named `window_name`.
    pub fn contains(&self, window_name: &str) -> bool {
        self.inner.read().window_index.contains(window_name)
    }

    pub fn latest_milestone(&self) -> Percentage {
        self.inner.read().latest_milestone
    }

    /// Apply `event` and run `then` before the write lock is released.
    ///
    /// `then` must not block; it runs inside the critical section that
    /// admission snapshots are serialized against.
    pub(crate) fn apply_then<R>(
        &self,
        event: &MilestoneEvent,
        then: impl FnOnce(Applied) -> R,
    ) -> (Applied, R) {
        let mut state = self.inner.write();
        let applied = state.apply(event);
        let result = then(applied);
        drop(state);
        (applied, result)
    }

    /// Take a snapshot and run `then` on it before the read lock is
    /// released, so no event can be applied in between.
    pub(crate) fn with_snapshot<R>(&self, then: impl FnOnce(StateSnapshot) -> R) -> R {
        let state = self.inner.read();
        then(state.snapshot())
    }
}
