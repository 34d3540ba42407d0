//! Per-context profiler sessions
//!
//! Counter collection itself belongs to the event engine. The controller only
//! starts a session when a context appears and stops it when the context goes
//! away.

use crate::config::EventProfilerConfig;
use crate::context::ContextHandle;
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::info;

/// Engine that sets up counter collection for one execution context
pub trait EventEngine: Send + Sync {
    /// Start profiling `ctx` with the given baseline configuration
    fn start(&self, ctx: ContextHandle, config: &EventProfilerConfig) -> Result<Box<dyn EventSession>>;
}

/// A live profiler session bound to one execution context
pub trait EventSession: Send {
    /// Context this session observes
    fn context(&self) -> ContextHandle;

    /// Stop profiling and flush final readings
    fn stop(self: Box<Self>) -> Result<()>;
}

/// Engine that tracks session lifetimes and configured event names without
/// reading hardware counters
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveEventEngine;

impl EventEngine for PassiveEventEngine {
    fn start(&self, ctx: ContextHandle, config: &EventProfilerConfig) -> Result<Box<dyn EventSession>> {
        info!(
            "Event profiler session started for context {} ({} events, {} metrics, sampling every {} ms)",
            ctx,
            config.events.len(),
            config.metrics.len(),
            config.sample_period_ms
        );
        Ok(Box::new(PassiveSession {
            ctx,
            events: config.events.clone(),
            started_at: Instant::now(),
        }))
    }
}

/// Session created by [`PassiveEventEngine`]
#[derive(Debug)]
pub struct PassiveSession {
    ctx: ContextHandle,
    events: Vec<String>,
    started_at: Instant,
}

impl PassiveSession {
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl EventSession for PassiveSession {
    fn context(&self) -> ContextHandle {
        self.ctx
    }

    fn stop(self: Box<Self>) -> Result<()> {
        info!(
            "Event profiler session stopped for context {} after {:?}",
            self.ctx,
            self.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passive_session_lifecycle() {
        let config = EventProfilerConfig {
            events: vec!["inst_executed".to_string()],
            ..EventProfilerConfig::default()
        };
        let ctx = ContextHandle::from_raw(0x42);

        let session = PassiveEventEngine.start(ctx, &config).unwrap();
        assert_eq!(session.context(), ctx);
        assert!(session.stop().is_ok());
    }
}
