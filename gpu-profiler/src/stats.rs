//! Lifecycle counters for the GPU controller

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the activation and deactivation handlers
#[derive(Debug, Default)]
pub struct ControllerStats {
    contexts_created: AtomicU64,
    contexts_destroyed: AtomicU64,
    activations: AtomicU64,
    sessions_started: AtomicU64,
    sessions_stopped: AtomicU64,
    session_failures: AtomicU64,
    sessions_skipped: AtomicU64,
    unmatched_destroys: AtomicU64,
}

/// Point-in-time copy of [`ControllerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub contexts_created: u64,
    pub contexts_destroyed: u64,
    /// Process-wide profiler activations (at most one)
    pub activations: u64,
    pub sessions_started: u64,
    pub sessions_stopped: u64,
    /// Session start or stop failures. A session that fails to stop still
    /// counts as stopped.
    pub session_failures: u64,
    /// Contexts left unprofiled because event profiling is disabled
    pub sessions_skipped: u64,
    /// Destroy notifications with no live session
    pub unmatched_destroys: u64,
}

impl StatsSnapshot {
    /// Sessions started and not yet torn down
    pub fn live_sessions(&self) -> u64 {
        self.sessions_started.saturating_sub(self.sessions_stopped)
    }
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl ControllerStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        record_context_created => contexts_created,
        record_context_destroyed => contexts_destroyed,
        record_activation => activations,
        record_session_started => sessions_started,
        record_session_stopped => sessions_stopped,
        record_session_failure => session_failures,
        record_session_skipped => sessions_skipped,
        record_unmatched_destroy => unmatched_destroys,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            contexts_created: self.contexts_created.load(Ordering::Relaxed),
            contexts_destroyed: self.contexts_destroyed.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_stopped: self.sessions_stopped.load(Ordering::Relaxed),
            session_failures: self.session_failures.load(Ordering::Relaxed),
            sessions_skipped: self.sessions_skipped.load(Ordering::Relaxed),
            unmatched_destroys: self.unmatched_destroys.load(Ordering::Relaxed),
        }
    }
}
