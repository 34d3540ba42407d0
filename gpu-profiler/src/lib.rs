//! GPU event profiling lifecycle
//!
//! Turns GPU event profiling on and off in step with the creation and
//! destruction of GPU execution contexts. Activation is driven by driver
//! notifications; the host never calls a "start profiling" API.
//!
//! Process-scoped state lives in [`api`] and [`bootstrap`]. Both are created
//! on first use and never torn down.

pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod context;
pub mod controller;
#[cfg(feature = "cuda")]
pub mod cupti;
pub mod error;
pub mod registry;
pub mod session;
pub mod stats;

pub use bootstrap::{Bootstrap, SubsystemState};
pub use channel::{CallbackChannel, CallbackDomain, ChannelStatus, ResourceEvent};
pub use crate::config::{ConfigLoader, EventProfilerConfig, FileConfigLoader};
pub use context::ContextHandle;
pub use controller::EventProfilerController;
pub use error::GpuError;
pub use registry::{ActivityProfiler, ProfilerApi};
pub use session::{EventEngine, EventSession, PassiveEventEngine};

use std::sync::{Arc, OnceLock};

static API: OnceLock<Arc<ProfilerApi>> = OnceLock::new();
static BOOTSTRAP: OnceLock<Bootstrap> = OnceLock::new();

/// The process-wide profiler registry
pub fn api() -> &'static Arc<ProfilerApi> {
    API.get_or_init(|| Arc::new(ProfilerApi::new(Arc::new(FileConfigLoader::from_env()))))
}

/// The process-wide bootstrap and the controller it subscribes
pub fn bootstrap() -> &'static Bootstrap {
    BOOTSTRAP.get_or_init(|| {
        let api = Arc::clone(api());
        let controller = Arc::new(EventProfilerController::new(
            Arc::clone(&api),
            Arc::new(PassiveEventEngine),
        ));
        Bootstrap::new(api, controller)
    })
}

/// Bootstrap GPU event profiling for this process.
///
/// Returns `true` unless GPU callback registration was attempted and failed.
/// The process continues either way. Without the `cuda` feature no GPU layer
/// is compiled in and the process runs cpu-only, which is not a failure.
pub fn init(cpu_only: bool, log_on_error: bool) -> bool {
    let cpu_only = cpu_only || !cfg!(feature = "cuda");
    bootstrap().activate(cpu_only, log_on_error, default_channel)
}

#[cfg(feature = "cuda")]
fn default_channel() -> Arc<dyn CallbackChannel> {
    cupti::CuptiCallbackChannel::singleton()
}

#[cfg(not(feature = "cuda"))]
fn default_channel() -> Arc<dyn CallbackChannel> {
    Arc::new(channel::local::LocalChannel::unavailable(ChannelStatus::new(
        channel::STATUS_NOT_INITIALIZED,
        "built without CUDA support",
    )))
}
