//! Driver callback channel interface
//!
//! The driver notifies subscribed code when an execution context is created
//! or destroyed. The controller only depends on this capability interface,
//! so its logic can be driven by [`local::LocalChannel`] without a GPU.

pub mod local;

use crate::context::ContextHandle;
use std::fmt;
use std::sync::Arc;

/// CUPTI: CUPTI_SUCCESS
pub const STATUS_SUCCESS: i32 = 0;
/// CUPTI: CUPTI_ERROR_NOT_INITIALIZED
pub const STATUS_NOT_INITIALIZED: i32 = 15;
/// CUPTI: CUPTI_ERROR_INSUFFICIENT_PRIVILEGES
pub const STATUS_INSUFFICIENT_PRIVILEGES: i32 = 35;
/// CUPTI: CUPTI_ERROR_UNKNOWN
pub const STATUS_UNKNOWN: i32 = 999;

/// Callback domain. Only resource notifications are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackDomain {
    Resource,
}

/// Resource notification kinds for execution contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceEvent {
    ContextCreated,
    ContextDestroyed,
}

impl ResourceEvent {
    /// Both notification kinds, in subscription order
    pub const ALL: [ResourceEvent; 2] = [ResourceEvent::ContextCreated, ResourceEvent::ContextDestroyed];
}

impl fmt::Display for ResourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceEvent::ContextCreated => write!(f, "context-created"),
            ResourceEvent::ContextDestroyed => write!(f, "context-destroyed"),
        }
    }
}

/// Handler invoked by the channel with the affected context
pub type ResourceHandler = Arc<dyn Fn(ContextHandle) + Send + Sync>;

/// Last status reported by a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub code: i32,
    pub description: String,
}

impl ChannelStatus {
    pub fn success() -> Self {
        Self {
            code: STATUS_SUCCESS,
            description: "no error".to_string(),
        }
    }

    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == STATUS_SUCCESS
    }

    /// The common cause of registration failure on locked-down hosts
    pub fn is_insufficient_privileges(&self) -> bool {
        self.code == STATUS_INSUFFICIENT_PRIVILEGES
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.description, self.code)
    }
}

/// A driver-owned mechanism that invokes registered handlers on context
/// lifecycle events.
///
/// A handler that is registered but not enabled must never fire.
pub trait CallbackChannel: Send + Sync {
    /// Whether the channel (and the driver library behind it) came up
    fn init_success(&self) -> bool;

    /// Register `handler` for `event`. Does not make it live.
    fn register_callback(
        &self,
        domain: CallbackDomain,
        event: ResourceEvent,
        handler: ResourceHandler,
    ) -> bool;

    /// Enable dispatch of a previously registered handler
    fn enable_callback(&self, domain: CallbackDomain, event: ResourceEvent) -> bool;

    /// Stop dispatch of an enabled handler. Channels that cannot do this return `false`.
    fn disable_callback(&self, _domain: CallbackDomain, _event: ResourceEvent) -> bool {
        false
    }

    /// Status of the most recent failed operation
    fn last_error_status(&self) -> ChannelStatus;
}
