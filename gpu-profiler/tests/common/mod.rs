#![allow(dead_code)]

use anyhow::{bail, Result};
use aperture_gpu::config::StaticConfigLoader;
use aperture_gpu::registry::ProfilerApi;
use aperture_gpu::{
    Bootstrap, ContextHandle, EventEngine, EventProfilerConfig, EventProfilerController,
    EventSession,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Engine that records which contexts have live sessions
#[derive(Default)]
pub struct RecordingEngine {
    pub live: Arc<Mutex<HashSet<ContextHandle>>>,
    pub started: AtomicUsize,
    pub stopped: Arc<AtomicUsize>,
    pub fail_for: Option<ContextHandle>,
}

struct RecordingSession {
    ctx: ContextHandle,
    live: Arc<Mutex<HashSet<ContextHandle>>>,
    stopped: Arc<AtomicUsize>,
}

impl EventEngine for RecordingEngine {
    fn start(&self, ctx: ContextHandle, _config: &EventProfilerConfig) -> Result<Box<dyn EventSession>> {
        if self.fail_for == Some(ctx) {
            bail!("no counters available for {}", ctx);
        }
        let fresh = self.live.lock().unwrap().insert(ctx);
        assert!(fresh, "second live session for {}", ctx);
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession {
            ctx,
            live: Arc::clone(&self.live),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

impl EventSession for RecordingSession {
    fn context(&self) -> ContextHandle {
        self.ctx
    }

    fn stop(self: Box<Self>) -> Result<()> {
        assert!(self.live.lock().unwrap().remove(&self.ctx));
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn api() -> Arc<ProfilerApi> {
    Arc::new(ProfilerApi::new(Arc::new(StaticConfigLoader::default())))
}

pub fn controller(engine: Arc<RecordingEngine>, disabled: fn() -> bool) -> Arc<EventProfilerController> {
    Arc::new(EventProfilerController::new(api(), engine).with_disable_check(disabled))
}

pub fn bootstrap(engine: Arc<RecordingEngine>) -> Bootstrap {
    let api = api();
    let controller = Arc::new(
        EventProfilerController::new(Arc::clone(&api), engine).with_disable_check(|| false),
    );
    Bootstrap::new(api, controller)
}
