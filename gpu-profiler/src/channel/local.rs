//! In-process callback channel
//!
//! Dispatches synthetic context notifications to subscribed handlers. Used to
//! simulate a driver in tests and tooling.

use super::{
    CallbackChannel, CallbackDomain, ChannelStatus, ResourceEvent, ResourceHandler,
    STATUS_UNKNOWN,
};
use crate::context::ContextHandle;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::trace;

/// Callback channel that lives entirely in this process
#[derive(Default)]
pub struct LocalChannel {
    unavailable: Option<ChannelStatus>,
    failing_registrations: HashSet<ResourceEvent>,
    failing_enables: HashSet<ResourceEvent>,
    handlers: RwLock<HashMap<ResourceEvent, ResourceHandler>>,
    enabled: RwLock<HashSet<ResourceEvent>>,
    last_status: Mutex<Option<ChannelStatus>>,
    registrations: AtomicUsize,
}

impl LocalChannel {
    /// A working channel
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose driver library could not be brought up
    pub fn unavailable(status: ChannelStatus) -> Self {
        Self {
            unavailable: Some(status),
            ..Self::default()
        }
    }

    /// Make registration of `event` fail
    pub fn fail_registration(mut self, event: ResourceEvent) -> Self {
        self.failing_registrations.insert(event);
        self
    }

    /// Make enabling `event` fail
    pub fn fail_enable(mut self, event: ResourceEvent) -> Self {
        self.failing_enables.insert(event);
        self
    }

    /// Deliver a notification. Returns whether a live handler ran.
    ///
    /// The handler runs on the calling thread without any channel lock held.
    pub fn notify(&self, event: ResourceEvent, ctx: ContextHandle) -> bool {
        if !self.is_enabled(event) {
            trace!("Dropping {} for {}: not enabled", event, ctx);
            return false;
        }
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .cloned();
        match handler {
            Some(handler) => {
                handler(ctx);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, event: ResourceEvent) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&event)
    }

    pub fn is_enabled(&self, event: ResourceEvent) -> bool {
        self.enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&event)
    }

    /// Number of successful `register_callback` calls so far
    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }

    fn fail(&self, status: ChannelStatus) -> bool {
        *self.last_status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
        false
    }
}

impl CallbackChannel for LocalChannel {
    fn init_success(&self) -> bool {
        self.unavailable.is_none()
    }

    fn register_callback(
        &self,
        domain: CallbackDomain,
        event: ResourceEvent,
        handler: ResourceHandler,
    ) -> bool {
        if let Some(status) = &self.unavailable {
            return self.fail(status.clone());
        }
        if self.failing_registrations.contains(&event) {
            return self.fail(ChannelStatus::new(
                STATUS_UNKNOWN,
                format!("registration of {:?}/{} rejected", domain, event),
            ));
        }
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event, handler);
        self.registrations.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn enable_callback(&self, domain: CallbackDomain, event: ResourceEvent) -> bool {
        if let Some(status) = &self.unavailable {
            return self.fail(status.clone());
        }
        if !self.is_registered(event) || self.failing_enables.contains(&event) {
            return self.fail(ChannelStatus::new(
                STATUS_UNKNOWN,
                format!("enabling {:?}/{} rejected", domain, event),
            ));
        }
        self.enabled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event);
        true
    }

    fn disable_callback(&self, _domain: CallbackDomain, event: ResourceEvent) -> bool {
        self.enabled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&event)
    }

    fn last_error_status(&self) -> ChannelStatus {
        self.last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .or_else(|| self.unavailable.clone())
            .unwrap_or_else(ChannelStatus::success)
    }
}
