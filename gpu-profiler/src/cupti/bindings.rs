//! CUPTI FFI bindings
//!
//! Only the subscriber and callback entry points are bound. The library is
//! opened at runtime so a host without a GPU driver still loads us.

#![allow(non_camel_case_types)]

use libloading::{Library, Symbol};
use std::ffi::{c_char, c_void, CStr};
use tracing::{debug, info};

pub type CUptiResult = i32;
pub type CUpti_CallbackDomain = u32;
pub type CUpti_CallbackId = u32;
pub type CUcontext = *mut c_void;

/// Opaque subscriber handle owned by CUPTI
pub type CUpti_SubscriberHandle = *mut c_void;

pub type CUpti_CallbackFunc = Option<
    unsafe extern "C" fn(
        userdata: *mut c_void,
        domain: CUpti_CallbackDomain,
        cbid: CUpti_CallbackId,
        cbdata: *const c_void,
    ),
>;

pub const CUPTI_SUCCESS: CUptiResult = 0;

pub const CUPTI_CB_DOMAIN_RESOURCE: CUpti_CallbackDomain = 3;

pub const CUPTI_CBID_RESOURCE_CONTEXT_CREATED: CUpti_CallbackId = 1;
pub const CUPTI_CBID_RESOURCE_CONTEXT_DESTROY_STARTING: CUpti_CallbackId = 2;

/// Callback payload for the resource domain
#[repr(C)]
pub struct CUpti_ResourceData {
    pub context: CUcontext,
    pub resource_handle: *mut c_void,
    pub resource_descriptor: *mut c_void,
}

type FnCuptiSubscribe = unsafe extern "C" fn(
    subscriber: *mut CUpti_SubscriberHandle,
    callback: CUpti_CallbackFunc,
    userdata: *mut c_void,
) -> CUptiResult;
type FnCuptiEnableCallback = unsafe extern "C" fn(
    enable: u32,
    subscriber: CUpti_SubscriberHandle,
    domain: CUpti_CallbackDomain,
    cbid: CUpti_CallbackId,
) -> CUptiResult;
type FnCuptiGetResultString =
    unsafe extern "C" fn(result: CUptiResult, str: *mut *const c_char) -> CUptiResult;

#[cfg(target_os = "linux")]
const LIBRARY_NAMES: &[&str] = &["libcupti.so", "libcupti.so.12", "libcupti.so.11"];
#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["cupti64.dll"];
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
const LIBRARY_NAMES: &[&str] = &[];

/// Dynamically loaded CUPTI library
pub struct CuptiLibrary {
    _lib: Library,
    cupti_subscribe: FnCuptiSubscribe,
    cupti_enable_callback: FnCuptiEnableCallback,
    cupti_get_result_string: Option<FnCuptiGetResultString>,
}

impl CuptiLibrary {
    /// Locate and open CUPTI
    pub fn load() -> Result<Self, String> {
        let mut last_err = String::from("no CUPTI library name for this platform");
        for name in LIBRARY_NAMES {
            // Safety: loading CUPTI runs no initialization routines beyond its own.
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    info!("Loaded CUPTI from: {}", name);
                    return unsafe { Self::bind(lib) };
                }
                Err(e) => {
                    debug!("Failed to load {}: {}", name, e);
                    last_err = format!("{}: {}", name, e);
                }
            }
        }
        Err(format!("failed to load CUPTI library: {}", last_err))
    }

    unsafe fn bind(lib: Library) -> Result<Self, String> {
        let cupti_subscribe = load_fn::<FnCuptiSubscribe>(&lib, "cuptiSubscribe")?;
        let cupti_enable_callback = load_fn::<FnCuptiEnableCallback>(&lib, "cuptiEnableCallback")?;
        let cupti_get_result_string = lib
            .get(b"cuptiGetResultString")
            .ok()
            .map(|s: Symbol<FnCuptiGetResultString>| *s);
        Ok(Self {
            _lib: lib,
            cupti_subscribe,
            cupti_enable_callback,
            cupti_get_result_string,
        })
    }

    /// Subscribe `callback`; returns the subscriber handle
    pub fn subscribe(
        &self,
        callback: CUpti_CallbackFunc,
    ) -> Result<CUpti_SubscriberHandle, CUptiResult> {
        let mut handle: CUpti_SubscriberHandle = std::ptr::null_mut();
        let status = unsafe { (self.cupti_subscribe)(&mut handle, callback, std::ptr::null_mut()) };
        if status == CUPTI_SUCCESS {
            Ok(handle)
        } else {
            Err(status)
        }
    }

    pub fn enable_callback(
        &self,
        enable: bool,
        subscriber: CUpti_SubscriberHandle,
        domain: CUpti_CallbackDomain,
        cbid: CUpti_CallbackId,
    ) -> CUptiResult {
        unsafe { (self.cupti_enable_callback)(u32::from(enable), subscriber, domain, cbid) }
    }

    /// Human-readable name of a CUPTI status
    pub fn result_string(&self, result: CUptiResult) -> String {
        let Some(get) = self.cupti_get_result_string else {
            return format!("CUPTI error {}", result);
        };
        let mut ptr: *const c_char = std::ptr::null();
        let status = unsafe { get(result, &mut ptr) };
        if status != CUPTI_SUCCESS || ptr.is_null() {
            return format!("CUPTI error {}", result);
        }
        // Safety: CUPTI returns a static NUL-terminated string.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

unsafe fn load_fn<F: Copy>(lib: &Library, name: &str) -> Result<F, String> {
    let sym: Symbol<F> = lib
        .get(name.as_bytes())
        .map_err(|e| format!("failed to load {}: {}", name, e))?;
    Ok(*sym)
}
