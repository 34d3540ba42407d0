//! Registration bootstrap
//!
//! Subscribes the controller's handlers to the driver callback channel once
//! per process and registers the activity profiler. Every failure ends in
//! cpu-only mode; the host keeps running.

use crate::channel::{CallbackChannel, CallbackDomain, ResourceEvent, ResourceHandler};
use crate::context::ContextHandle;
use crate::controller::EventProfilerController;
use crate::error::GpuError;
use crate::registry::{ActivityProfilerProxy, ProfilerApi};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Where the remediation for CUPTI_ERROR_INSUFFICIENT_PRIVILEGES is documented
pub const INSUFFICIENT_PRIVILEGES_HELP: &str =
    "https://developer.nvidia.com/nvidia-development-tools-solutions-err-nvgpuctrperm-cupti";

/// Whole-subsystem state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemState {
    NotLoaded,
    GpuCallbacksActive,
    /// `fallback` is set when GPU registration was attempted and failed
    CpuOnly { fallback: bool },
}

impl SubsystemState {
    /// Bootstrap result reported to the caller
    pub fn success(self) -> bool {
        !matches!(self, SubsystemState::CpuOnly { fallback: true })
    }
}

struct BootstrapState {
    subsystem: SubsystemState,
    channel: Option<Arc<dyn CallbackChannel>>,
}

/// One-shot bootstrap of GPU event profiling for a process
pub struct Bootstrap {
    api: Arc<ProfilerApi>,
    controller: Arc<EventProfilerController>,
    state: Mutex<BootstrapState>,
}

impl Bootstrap {
    pub fn new(api: Arc<ProfilerApi>, controller: Arc<EventProfilerController>) -> Self {
        Self {
            api,
            controller,
            state: Mutex::new(BootstrapState {
                subsystem: SubsystemState::NotLoaded,
                channel: None,
            }),
        }
    }

    pub fn controller(&self) -> &Arc<EventProfilerController> {
        &self.controller
    }

    pub fn api(&self) -> &Arc<ProfilerApi> {
        &self.api
    }

    pub fn state(&self) -> SubsystemState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subsystem
    }

    /// Subscribe to context notifications and register the profiler.
    ///
    /// `connect` is only called when `cpu_only` is false. Returns whether GPU
    /// callback registration succeeded (always `true` in cpu-only mode). A
    /// second call changes nothing and returns the first result.
    pub fn activate<F>(&self, cpu_only: bool, log_on_error: bool, connect: F) -> bool
    where
        F: FnOnce() -> Arc<dyn CallbackChannel>,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.subsystem != SubsystemState::NotLoaded {
            debug!("GPU profiling already bootstrapped: {:?}", state.subsystem);
            return state.subsystem.success();
        }

        let subsystem = if cpu_only {
            info!("CPU-only mode requested, skipping GPU callback registration");
            SubsystemState::CpuOnly { fallback: false }
        } else {
            let channel = connect();
            match self.subscribe(channel.as_ref()) {
                Ok(()) => {
                    info!("GPU context callbacks registered");
                    state.channel = Some(channel);
                    SubsystemState::GpuCallbacksActive
                }
                Err(e) => {
                    self.controller.disable_dispatch();
                    if log_on_error {
                        log_failure(&e);
                    } else {
                        debug!("GPU callback registration failed: {}", e);
                    }
                    SubsystemState::CpuOnly { fallback: true }
                }
            }
        };

        let cpu_only = subsystem != SubsystemState::GpuCallbacksActive;
        self.api.register_profiler(Box::new(ActivityProfilerProxy::new(
            cpu_only,
            self.api.config_loader(),
        )));

        state.subsystem = subsystem;
        subsystem.success()
    }

    /// Register both handlers, then enable both. On failure nothing is left
    /// enabled that the channel is able to disable.
    fn subscribe(&self, channel: &dyn CallbackChannel) -> Result<(), GpuError> {
        if !channel.init_success() {
            return Err(GpuError::ChannelUnavailable(channel.last_error_status()));
        }

        let domain = CallbackDomain::Resource;
        for event in ResourceEvent::ALL {
            if !channel.register_callback(domain, event, self.handler(event)) {
                return Err(GpuError::Registration {
                    event,
                    status: channel.last_error_status(),
                });
            }
        }

        let mut enabled = Vec::with_capacity(ResourceEvent::ALL.len());
        for event in ResourceEvent::ALL {
            if !channel.enable_callback(domain, event) {
                let status = channel.last_error_status();
                for done in enabled {
                    if !channel.disable_callback(domain, done) {
                        warn!("Could not disable {} callback after failed enable", done);
                    }
                }
                return Err(GpuError::Enable { event, status });
            }
            enabled.push(event);
        }

        Ok(())
    }

    fn handler(&self, event: ResourceEvent) -> ResourceHandler {
        let controller = Arc::clone(&self.controller);
        match event {
            ResourceEvent::ContextCreated => {
                Arc::new(move |ctx: ContextHandle| controller.on_context_created(ctx))
            }
            ResourceEvent::ContextDestroyed => {
                Arc::new(move |ctx: ContextHandle| controller.on_context_destroyed(ctx))
            }
        }
    }
}

fn log_failure(err: &GpuError) {
    if let Some(status) = err.status() {
        warn!("CUPTI status: {}", status);
    }
    warn!("CUPTI initialization failed - CUDA profiler activities will be missing ({})", err);
    info!(
        "If you see CUPTI_ERROR_INSUFFICIENT_PRIVILEGES, refer to {}",
        INSUFFICIENT_PRIVILEGES_HELP
    );
}
