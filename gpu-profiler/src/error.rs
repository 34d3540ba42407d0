//! Error types for the GPU lifecycle controller

use crate::channel::{ChannelStatus, ResourceEvent};
use thiserror::Error;

/// Failures surfaced while bootstrapping or configuring GPU event profiling.
///
/// None of these cross a driver callback. They end up as log output and a
/// degraded operating mode.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("GPU callback channel unavailable: {0}")]
    ChannelUnavailable(ChannelStatus),

    #[error("failed to register {event} callback: {status}")]
    Registration {
        event: ResourceEvent,
        status: ChannelStatus,
    },

    #[error("failed to enable {event} callback: {status}")]
    Enable {
        event: ResourceEvent,
        status: ChannelStatus,
    },

    #[error("failed to load event profiler configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid event profiler configuration: {0}")]
    InvalidConfig(String),
}

impl GpuError {
    /// Channel status attached to this error, if any
    pub fn status(&self) -> Option<&ChannelStatus> {
        match self {
            GpuError::ChannelUnavailable(status)
            | GpuError::Registration { status, .. }
            | GpuError::Enable { status, .. } => Some(status),
            GpuError::Config(_) | GpuError::InvalidConfig(_) => None,
        }
    }
}
