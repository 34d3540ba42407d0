//! Aperture GPU injection library
//!
//! Exported with C linkage so a host can call it directly, or the CUDA driver
//! can load it through `CUDA_INJECTION64_PATH`. No entry point panics or
//! fails the host; errors become log output and cpu-only mode.

pub mod logging;

use std::ffi::c_int;
use std::panic::catch_unwind;
use tracing::{error, info};

/// Bootstrap GPU event profiling. Returns `false` if GPU callback
/// registration was attempted and failed.
#[no_mangle]
pub extern "C" fn aperture_gpu_init(cpu_only: bool, log_on_error: bool) -> bool {
    logging::init();
    match catch_unwind(|| aperture_gpu::init(cpu_only, log_on_error)) {
        Ok(success) => success,
        Err(_) => {
            error!("GPU profiler bootstrap panicked; continuing without GPU profiling");
            false
        }
    }
}

/// Called by the CUDA driver when `CUDA_INJECTION64_PATH` points at this library
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn InitializeInjection() -> c_int {
    logging::init();
    info!("Injection mode: initializing Aperture GPU profiler");
    aperture_gpu_init(false, true);
    1
}

/// Only log errors from here on
#[no_mangle]
pub extern "C" fn aperture_gpu_suppress_log_messages() {
    logging::suppress();
}
