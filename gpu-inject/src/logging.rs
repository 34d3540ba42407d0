//! Logging for a library injected into a foreign process
//!
//! The host may already own the global subscriber. If so we log through it
//! and level suppression is left to the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, reload, util::SubscriberInitExt, Registry,
};

/// Environment variable holding the tracing filter directive
pub const LOG_FILTER_ENV: &str = "APERTURE_LOG";

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();
static SUPPRESSED: AtomicBool = AtomicBool::new(false);
static INIT: OnceLock<()> = OnceLock::new();

fn base_filter() -> EnvFilter {
    if SUPPRESSED.load(Ordering::Acquire) {
        return EnvFilter::new("error");
    }
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the stderr subscriber once per process
pub fn init() {
    INIT.get_or_init(|| {
        let (filter, handle) = reload::Layer::new(base_filter());
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .is_ok();
        if installed {
            let _ = FILTER.set(handle);
        }
    });
}

/// Raise the minimum level to `error`. Takes effect for a subscriber
/// installed later as well.
pub fn suppress() {
    SUPPRESSED.store(true, Ordering::Release);
    if let Some(handle) = FILTER.get() {
        let _ = handle.modify(|filter| *filter = EnvFilter::new("error"));
    }
}

pub fn is_suppressed() -> bool {
    SUPPRESSED.load(Ordering::Acquire)
}
