//! Process-wide profiler registry
//!
//! Other parts of the host query the registry for the activity profiler. The
//! bootstrap always registers one, GPU-capable or cpu-only.

use crate::config::ConfigLoader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Activity/trace profiler handed to the registry
pub trait ActivityProfiler: Send + Sync {
    /// Whether GPU activity collection is off for this process
    fn is_cpu_only(&self) -> bool;

    fn is_initialized(&self) -> bool;

    /// Turn the profiler on for the process
    fn init(&self);
}

/// Activity profiler registered by the bootstrap
pub struct ActivityProfilerProxy {
    cpu_only: bool,
    config_loader: Arc<dyn ConfigLoader>,
    initialized: AtomicBool,
}

impl ActivityProfilerProxy {
    pub fn new(cpu_only: bool, config_loader: Arc<dyn ConfigLoader>) -> Self {
        Self {
            cpu_only,
            config_loader,
            initialized: AtomicBool::new(false),
        }
    }
}

impl ActivityProfiler for ActivityProfilerProxy {
    fn is_cpu_only(&self) -> bool {
        self.cpu_only
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn init(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        let config = self.config_loader.base_config();
        info!(
            "Activity profiler initialized (cpu_only={}, report period {} s)",
            self.cpu_only, config.report_period_secs
        );
    }
}

#[derive(Default)]
struct RegistryState {
    profiler: Option<Arc<dyn ActivityProfiler>>,
    init_requested: bool,
}

/// Process-wide registry of the activity profiler and the config loader
pub struct ProfilerApi {
    config_loader: Arc<dyn ConfigLoader>,
    state: Mutex<RegistryState>,
}

impl ProfilerApi {
    pub fn new(config_loader: Arc<dyn ConfigLoader>) -> Self {
        Self {
            config_loader,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn config_loader(&self) -> Arc<dyn ConfigLoader> {
        Arc::clone(&self.config_loader)
    }

    /// Install the activity profiler, replacing any previous one.
    ///
    /// If activation was already requested, the new profiler is initialized
    /// right away.
    pub fn register_profiler(&self, profiler: Box<dyn ActivityProfiler>) {
        let profiler: Arc<dyn ActivityProfiler> = Arc::from(profiler);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Registering activity profiler (cpu_only={})", profiler.is_cpu_only());
        if state.init_requested && !profiler.is_initialized() {
            profiler.init();
        }
        state.profiler = Some(profiler);
    }

    /// Initialize the registered profiler if there is one and it is not yet
    /// initialized. The request is remembered for a profiler registered later.
    pub fn init_profiler_if_registered(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.init_requested = true;
        if let Some(profiler) = &state.profiler {
            if !profiler.is_initialized() {
                profiler.init();
            }
        }
    }

    pub fn profiler(&self) -> Option<Arc<dyn ActivityProfiler>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .profiler
            .clone()
    }

    pub fn is_profiler_registered(&self) -> bool {
        self.profiler().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigLoader;

    fn api() -> ProfilerApi {
        ProfilerApi::new(Arc::new(StaticConfigLoader::default()))
    }

    #[test]
    fn test_empty_registry() {
        let api = api();
        assert!(!api.is_profiler_registered());
        api.init_profiler_if_registered();
        assert!(api.profiler().is_none());
    }

    #[test]
    fn test_init_after_registration() {
        let api = api();
        api.register_profiler(Box::new(ActivityProfilerProxy::new(false, api.config_loader())));
        assert!(!api.profiler().unwrap().is_initialized());

        api.init_profiler_if_registered();
        let profiler = api.profiler().unwrap();
        assert!(profiler.is_initialized());
        assert!(!profiler.is_cpu_only());
    }

    #[test]
    fn test_init_requested_before_registration() {
        let api = api();
        api.init_profiler_if_registered();

        api.register_profiler(Box::new(ActivityProfilerProxy::new(true, api.config_loader())));
        let profiler = api.profiler().unwrap();
        assert!(profiler.is_initialized());
        assert!(profiler.is_cpu_only());
    }
}
