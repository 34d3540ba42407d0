//! GPU execution context handles

use std::ffi::c_void;
use std::fmt;

/// Opaque identifier of a driver-owned GPU execution context.
///
/// The handle carries identity only. It is unique while the context is live
/// and is used as the key for that context's profiler session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextHandle(u64);

impl ContextHandle {
    /// Wrap a raw handle value (e.g. a synthetic context in simulation)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Wrap a driver context pointer (`CUcontext`)
    pub fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr as usize as u64)
    }

    /// Raw handle value
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
