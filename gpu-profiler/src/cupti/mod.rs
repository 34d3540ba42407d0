//! CUDA CUPTI callback channel
//!
//! CUPTI allows a single subscriber per process, so the channel is a process
//! singleton. Resource callbacks reach Rust through [`dispatch_callback`],
//! which forwards them to the handlers that are registered and enabled.

pub mod bindings;

use self::bindings::{
    CUpti_CallbackDomain, CUpti_CallbackId, CUpti_ResourceData, CUpti_SubscriberHandle,
    CuptiLibrary, CUPTI_CBID_RESOURCE_CONTEXT_CREATED, CUPTI_CBID_RESOURCE_CONTEXT_DESTROY_STARTING,
    CUPTI_CB_DOMAIN_RESOURCE, CUPTI_SUCCESS,
};
use crate::channel::{
    CallbackChannel, CallbackDomain, ChannelStatus, ResourceEvent, ResourceHandler,
    STATUS_NOT_INITIALIZED,
};
use crate::context::ContextHandle;
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use tracing::{debug, error, warn};

static CHANNEL: OnceLock<Arc<CuptiCallbackChannel>> = OnceLock::new();

struct Subscriber(CUpti_SubscriberHandle);

// Safety: the handle is an opaque token CUPTI accepts from any thread.
unsafe impl Send for Subscriber {}
unsafe impl Sync for Subscriber {}

struct Connection {
    library: CuptiLibrary,
    subscriber: Subscriber,
}

/// Callback channel backed by the CUPTI callback API
pub struct CuptiCallbackChannel {
    connection: Option<Connection>,
    init_status: ChannelStatus,
    last_status: Mutex<ChannelStatus>,
    handlers: RwLock<HashMap<ResourceEvent, ResourceHandler>>,
    enabled: RwLock<HashSet<ResourceEvent>>,
}

impl CuptiCallbackChannel {
    /// The process-wide channel. CUPTI is loaded and subscribed on first use.
    pub fn singleton() -> Arc<CuptiCallbackChannel> {
        Arc::clone(CHANNEL.get_or_init(|| Arc::new(Self::connect())))
    }

    fn connect() -> Self {
        let (connection, init_status) = match CuptiLibrary::load() {
            Err(e) => {
                debug!("CUPTI unavailable: {}", e);
                (None, ChannelStatus::new(STATUS_NOT_INITIALIZED, e))
            }
            Ok(library) => match library.subscribe(Some(dispatch_callback)) {
                Ok(handle) => (
                    Some(Connection {
                        library,
                        subscriber: Subscriber(handle),
                    }),
                    ChannelStatus::success(),
                ),
                Err(code) => {
                    let status = ChannelStatus::new(code, library.result_string(code));
                    warn!("cuptiSubscribe failed: {}", status);
                    (None, status)
                }
            },
        };

        Self {
            connection,
            last_status: Mutex::new(init_status.clone()),
            init_status,
            handlers: RwLock::new(HashMap::new()),
            enabled: RwLock::new(HashSet::new()),
        }
    }

    fn set_enabled(&self, domain: CallbackDomain, event: ResourceEvent, enable: bool) -> bool {
        let Some(connection) = &self.connection else {
            self.record(self.init_status.clone());
            return false;
        };
        if enable && !self.handlers.read().unwrap_or_else(PoisonError::into_inner).contains_key(&event) {
            self.record(ChannelStatus::new(
                STATUS_NOT_INITIALIZED,
                format!("no handler registered for {}", event),
            ));
            return false;
        }

        let code = connection.library.enable_callback(
            enable,
            connection.subscriber.0,
            domain_id(domain),
            callback_id(event),
        );
        if code != CUPTI_SUCCESS {
            self.record(ChannelStatus::new(code, connection.library.result_string(code)));
            return false;
        }

        let mut enabled = self.enabled.write().unwrap_or_else(PoisonError::into_inner);
        if enable {
            enabled.insert(event);
        } else {
            enabled.remove(&event);
        }
        true
    }

    fn record(&self, status: ChannelStatus) {
        *self.last_status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn dispatch(&self, event: ResourceEvent, ctx: ContextHandle) {
        if !self.enabled.read().unwrap_or_else(PoisonError::into_inner).contains(&event) {
            return;
        }
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .cloned();
        if let Some(handler) = handler {
            handler(ctx);
        }
    }
}

impl CallbackChannel for CuptiCallbackChannel {
    fn init_success(&self) -> bool {
        self.connection.is_some()
    }

    fn register_callback(
        &self,
        _domain: CallbackDomain,
        event: ResourceEvent,
        handler: ResourceHandler,
    ) -> bool {
        if self.connection.is_none() {
            self.record(self.init_status.clone());
            return false;
        }
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event, handler);
        true
    }

    fn enable_callback(&self, domain: CallbackDomain, event: ResourceEvent) -> bool {
        self.set_enabled(domain, event, true)
    }

    fn disable_callback(&self, domain: CallbackDomain, event: ResourceEvent) -> bool {
        self.set_enabled(domain, event, false)
    }

    fn last_error_status(&self) -> ChannelStatus {
        self.last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn domain_id(domain: CallbackDomain) -> CUpti_CallbackDomain {
    match domain {
        CallbackDomain::Resource => CUPTI_CB_DOMAIN_RESOURCE,
    }
}

fn callback_id(event: ResourceEvent) -> CUpti_CallbackId {
    match event {
        ResourceEvent::ContextCreated => CUPTI_CBID_RESOURCE_CONTEXT_CREATED,
        ResourceEvent::ContextDestroyed => CUPTI_CBID_RESOURCE_CONTEXT_DESTROY_STARTING,
    }
}

fn resource_event(domain: CUpti_CallbackDomain, cbid: CUpti_CallbackId) -> Option<ResourceEvent> {
    if domain != CUPTI_CB_DOMAIN_RESOURCE {
        return None;
    }
    match cbid {
        CUPTI_CBID_RESOURCE_CONTEXT_CREATED => Some(ResourceEvent::ContextCreated),
        CUPTI_CBID_RESOURCE_CONTEXT_DESTROY_STARTING => Some(ResourceEvent::ContextDestroyed),
        _ => None,
    }
}

/// CUPTI subscriber callback. Never unwinds into the driver.
unsafe extern "C" fn dispatch_callback(
    _userdata: *mut c_void,
    domain: CUpti_CallbackDomain,
    cbid: CUpti_CallbackId,
    cbdata: *const c_void,
) {
    let Some(event) = resource_event(domain, cbid) else {
        return;
    };
    if cbdata.is_null() {
        return;
    }
    // Safety: resource-domain callbacks carry a CUpti_ResourceData payload.
    let ctx = ContextHandle::from_ptr(unsafe { (*(cbdata as *const CUpti_ResourceData)).context });

    let result = catch_unwind(AssertUnwindSafe(|| {
        if let Some(channel) = CHANNEL.get() {
            channel.dispatch(event, ctx);
        }
    }));
    if result.is_err() {
        error!("Panic in {} handler for context {}", event, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_ids_round_trip() {
        for event in ResourceEvent::ALL {
            assert_eq!(
                resource_event(domain_id(CallbackDomain::Resource), callback_id(event)),
                Some(event)
            );
        }
    }

    #[test]
    fn test_other_domains_ignored() {
        assert_eq!(resource_event(1, CUPTI_CBID_RESOURCE_CONTEXT_CREATED), None);
        assert_eq!(resource_event(CUPTI_CB_DOMAIN_RESOURCE, 3), None);
    }

    #[test]
    fn test_null_payload_is_ignored() {
        unsafe {
            dispatch_callback(
                std::ptr::null_mut(),
                CUPTI_CB_DOMAIN_RESOURCE,
                CUPTI_CBID_RESOURCE_CONTEXT_CREATED,
                std::ptr::null(),
            );
        }
    }
}
