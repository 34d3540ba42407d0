mod common;

use aperture_gpu::channel::local::LocalChannel;
use aperture_gpu::channel::{ChannelStatus, STATUS_INSUFFICIENT_PRIVILEGES, STATUS_NOT_INITIALIZED};
use aperture_gpu::{CallbackChannel, ContextHandle, ResourceEvent, SubsystemState};
use common::{bootstrap, RecordingEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn connect(channel: &Arc<LocalChannel>) -> impl FnOnce() -> Arc<dyn CallbackChannel> {
    let channel = Arc::clone(channel);
    move || channel as Arc<dyn CallbackChannel>
}

#[test]
fn test_notifications_drive_sessions() {
    let engine = Arc::new(RecordingEngine::default());
    let bootstrap = bootstrap(Arc::clone(&engine));
    let channel = Arc::new(LocalChannel::new());

    assert!(bootstrap.activate(false, true, connect(&channel)));

    let ctx = ContextHandle::from_raw(0x7f00);
    assert!(channel.notify(ResourceEvent::ContextCreated, ctx));
    assert!(bootstrap.controller().has_session(ctx));
    assert!(bootstrap.api().profiler().unwrap().is_initialized());

    assert!(channel.notify(ResourceEvent::ContextDestroyed, ctx));
    assert!(!bootstrap.controller().has_session(ctx));
    assert_eq!(engine.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unavailable_channel_falls_back_to_cpu_only() {
    let engine = Arc::new(RecordingEngine::default());
    let bootstrap = bootstrap(engine);
    let channel = Arc::new(LocalChannel::unavailable(ChannelStatus::new(
        STATUS_NOT_INITIALIZED,
        "libcupti.so: cannot open shared object file",
    )));

    assert!(!bootstrap.activate(false, true, connect(&channel)));

    assert_eq!(bootstrap.state(), SubsystemState::CpuOnly { fallback: true });
    let profiler = bootstrap.api().profiler().expect("registry must hold a profiler");
    assert!(profiler.is_cpu_only());
}

#[test]
fn test_insufficient_privileges_reported() {
    let bootstrap = bootstrap(Arc::new(RecordingEngine::default()));
    let channel = Arc::new(LocalChannel::unavailable(ChannelStatus::new(
        STATUS_INSUFFICIENT_PRIVILEGES,
        "CUPTI_ERROR_INSUFFICIENT_PRIVILEGES",
    )));

    assert!(!bootstrap.activate(false, false, connect(&channel)));
    assert!(channel.last_error_status().is_insufficient_privileges());
    assert!(bootstrap.api().profiler().unwrap().is_cpu_only());
}

#[test]
fn test_second_activate_does_not_reregister() {
    let bootstrap = bootstrap(Arc::new(RecordingEngine::default()));
    let channel = Arc::new(LocalChannel::new());

    assert!(bootstrap.activate(false, true, connect(&channel)));
    assert!(bootstrap.activate(false, true, connect(&channel)));

    assert_eq!(channel.registration_count(), ResourceEvent::ALL.len());
    for event in ResourceEvent::ALL {
        assert!(channel.is_registered(event));
        assert!(channel.is_enabled(event));
    }
}

#[test]
fn test_failed_bootstrap_is_not_retried() {
    let bootstrap = bootstrap(Arc::new(RecordingEngine::default()));
    let broken = Arc::new(LocalChannel::unavailable(ChannelStatus::new(
        STATUS_NOT_INITIALIZED,
        "no driver",
    )));
    let working = Arc::new(LocalChannel::new());

    assert!(!bootstrap.activate(false, false, connect(&broken)));
    assert!(!bootstrap.activate(false, false, connect(&working)));
    assert_eq!(working.registration_count(), 0);
}

#[test]
fn test_registration_failure_enables_nothing() {
    let engine = Arc::new(RecordingEngine::default());
    let bootstrap = bootstrap(Arc::clone(&engine));
    let channel = Arc::new(LocalChannel::new().fail_registration(ResourceEvent::ContextDestroyed));

    assert!(!bootstrap.activate(false, true, connect(&channel)));

    assert!(channel.is_registered(ResourceEvent::ContextCreated));
    assert!(!channel.is_enabled(ResourceEvent::ContextCreated));
    assert!(!channel.notify(ResourceEvent::ContextCreated, ContextHandle::from_raw(1)));
    assert_eq!(engine.started.load(Ordering::SeqCst), 0);
    assert!(bootstrap.api().profiler().unwrap().is_cpu_only());
}

#[test]
fn test_enable_failure_rolls_back() {
    let engine = Arc::new(RecordingEngine::default());
    let bootstrap = bootstrap(Arc::clone(&engine));
    let channel = Arc::new(LocalChannel::new().fail_enable(ResourceEvent::ContextDestroyed));

    assert!(!bootstrap.activate(false, true, connect(&channel)));

    for event in ResourceEvent::ALL {
        assert!(!channel.is_enabled(event), "{} left enabled", event);
    }
    assert!(!bootstrap.controller().is_dispatch_enabled());
    assert_eq!(bootstrap.state(), SubsystemState::CpuOnly { fallback: true });
}

#[test]
fn test_cpu_only_registers_cpu_profiler() {
    let bootstrap = bootstrap(Arc::new(RecordingEngine::default()));
    let channel = Arc::new(LocalChannel::new());

    assert!(bootstrap.activate(true, true, connect(&channel)));

    assert_eq!(channel.registration_count(), 0);
    assert_eq!(bootstrap.state(), SubsystemState::CpuOnly { fallback: false });
    assert!(bootstrap.api().profiler().unwrap().is_cpu_only());
}
