//! Context activation and deactivation handlers
//!
//! Driver threads call [`EventProfilerController::on_context_created`] and
//! [`EventProfilerController::on_context_destroyed`] concurrently. One mutex
//! serializes the initialization gate, session creation and session teardown.
//! The gate decision and the session that follows it are made under the same
//! guard, so two contexts created back to back cannot both activate the
//! process-wide profiler.

use crate::config::event_profiler_disabled_by_env;
use crate::context::ContextHandle;
use crate::registry::ProfilerApi;
use crate::session::{EventEngine, EventSession};
use crate::stats::{ControllerStats, StatsSnapshot};
use anyhow::anyhow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// One-shot latch for process-wide profiler activation.
///
/// Only reachable through the controller's guarded state, so it is always
/// evaluated with the shared mutex held.
#[derive(Debug, Default)]
pub struct InitGate {
    initialized: bool,
}

impl InitGate {
    /// Run `activate` if this is the first call. Returns whether it ran.
    ///
    /// The flag flips before `activate` runs, so a panicking activation is
    /// never retried.
    pub fn ensure_initialized_once(&mut self, activate: impl FnOnce()) -> bool {
        if self.initialized {
            return false;
        }
        self.initialized = true;
        activate();
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

struct ControllerState {
    gate: InitGate,
    sessions: HashMap<ContextHandle, Box<dyn EventSession>>,
    dispatch_enabled: bool,
}

/// Starts and stops per-context event profiler sessions in step with driver
/// context notifications
pub struct EventProfilerController {
    api: Arc<ProfilerApi>,
    engine: Arc<dyn EventEngine>,
    event_profiler_disabled: fn() -> bool,
    stats: ControllerStats,
    state: Mutex<ControllerState>,
}

impl EventProfilerController {
    pub fn new(api: Arc<ProfilerApi>, engine: Arc<dyn EventEngine>) -> Self {
        Self {
            api,
            engine,
            event_profiler_disabled: event_profiler_disabled_by_env,
            stats: ControllerStats::new(),
            state: Mutex::new(ControllerState {
                gate: InitGate::default(),
                sessions: HashMap::new(),
                dispatch_enabled: true,
            }),
        }
    }

    /// Replace the check consulted on every context creation to decide
    /// whether event profiling is disabled. Defaults to the
    /// `APERTURE_DISABLE_EVENT_PROFILER` environment variable.
    pub fn with_disable_check(mut self, check: fn() -> bool) -> Self {
        self.event_profiler_disabled = check;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handler for context-created notifications
    pub fn on_context_created(&self, ctx: ContextHandle) {
        debug!("GPU context {} created", ctx);
        self.stats.record_context_created();

        let mut state = self.lock_state();
        if !state.dispatch_enabled {
            debug!("Ignoring context {}: GPU callbacks are inactive", ctx);
            return;
        }

        let api = &self.api;
        let stats = &self.stats;
        state.gate.ensure_initialized_once(|| {
            api.init_profiler_if_registered();
            stats.record_activation();
            info!("GPU profilers activated");
        });

        if (self.event_profiler_disabled)() {
            info!("Event profiler disabled via environment, context {} left unprofiled", ctx);
            self.stats.record_session_skipped();
            return;
        }

        if state.sessions.contains_key(&ctx) {
            warn!("Event profiler session already active for context {}", ctx);
            return;
        }

        let loader = self.api.config_loader();
        if let Err(e) = loader.init_base_config() {
            warn!("Using previous event profiler config: {}", e);
        }
        let config = loader.base_config();

        let started = catch_unwind(AssertUnwindSafe(|| self.engine.start(ctx, &config)))
            .unwrap_or_else(|_| Err(anyhow!("event engine panicked")));
        match started {
            Ok(session) => {
                state.sessions.insert(ctx, session);
                self.stats.record_session_started();
                let live = state.sessions.len();
                if live > config.session_warn_threshold {
                    warn!(
                        "{} event profiler sessions live (threshold {}); contexts may be leaking",
                        live, config.session_warn_threshold
                    );
                }
            }
            Err(e) => {
                warn!("Failed to start event profiler for context {}: {:#}", ctx, e);
                self.stats.record_session_failure();
            }
        }
    }

    /// Handler for context-destroyed notifications
    pub fn on_context_destroyed(&self, ctx: ContextHandle) {
        info!("GPU context {} destroyed", ctx);
        self.stats.record_context_destroyed();

        let mut state = self.lock_state();
        let Some(session) = state.sessions.remove(&ctx) else {
            debug!("No event profiler session for context {}", ctx);
            self.stats.record_unmatched_destroy();
            return;
        };

        let stopped = catch_unwind(AssertUnwindSafe(|| session.stop()))
            .unwrap_or_else(|_| Err(anyhow!("event engine panicked")));
        self.stats.record_session_stopped();
        if let Err(e) = stopped {
            warn!("Failed to stop event profiler for context {}: {:#}", ctx, e);
            self.stats.record_session_failure();
        }
    }

    /// Make both handlers no-ops for the rest of the process
    pub fn disable_dispatch(&self) {
        self.lock_state().dispatch_enabled = false;
    }

    pub fn is_dispatch_enabled(&self) -> bool {
        self.lock_state().dispatch_enabled
    }

    /// Whether process-wide activation has happened
    pub fn is_initialized(&self) -> bool {
        self.lock_state().gate.is_initialized()
    }

    pub fn live_sessions(&self) -> usize {
        self.lock_state().sessions.len()
    }

    pub fn has_session(&self, ctx: ContextHandle) -> bool {
        self.lock_state().sessions.contains_key(&ctx)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
