//! Host functions handed to the binary at instantiation.
//!
//! Generation two passes a [`HostContext`] pointer back to every callback as
//! the component environment. Generation one has no such slot, so the
//! context of the call in progress is kept in a thread-local for the
//! duration of each dispatch and the originating instance is resolved by its
//! native pointer through the [`ActiveInstanceRegistry`].

use std::cell::{Cell, RefCell};
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

use crate::abi::{v1, v2, RawStatus};
use crate::active::ActiveInstanceRegistry;
use crate::status::Status;

thread_local! {
    static ACTIVE_CONTEXT: Cell<*const HostContext> = const { Cell::new(ptr::null()) };
}

/// A message the binary sent to the host logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Resolved name of the instance that logged.
    pub instance: String,
    pub status: Status,
    pub category: String,
    pub message: String,
}

/// Per-instance state reachable from callbacks.
#[derive(Debug)]
pub struct HostContext {
    instance_name: String,
    registry: Option<ActiveInstanceRegistry>,
    last_log: RefCell<Option<LogRecord>>,
}

impl HostContext {
    pub fn new(instance_name: impl Into<String>, registry: Option<ActiveInstanceRegistry>) -> Self {
        Self {
            instance_name: instance_name.into(),
            registry,
            last_log: RefCell::new(None),
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn registry(&self) -> Option<&ActiveInstanceRegistry> {
        self.registry.as_ref()
    }

    /// Most recent message logged by the binary for this instance.
    pub fn last_log(&self) -> Option<LogRecord> {
        self.last_log.borrow().clone()
    }

    fn record(&self, record: LogRecord) {
        if let Ok(mut slot) = self.last_log.try_borrow_mut() {
            *slot = Some(record);
        }
    }
}

/// Run `f` with `context` visible to generation-one callbacks.
pub(crate) fn with_active<R>(context: &HostContext, f: impl FnOnce() -> R) -> R {
    let previous = ACTIVE_CONTEXT.with(|active| active.replace(context as *const HostContext));
    let result = f();
    ACTIVE_CONTEXT.with(|active| active.set(previous));
    result
}

/// Copy a possibly-null C string.
///
/// # Safety
/// `text` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn string_from(text: *const c_char) -> Option<String> {
    if text.is_null() {
        return None;
    }
    Some(CStr::from_ptr(text).to_string_lossy().into_owned())
}

fn forward(
    context: Option<&HostContext>,
    component: Option<*const c_void>,
    reported_name: *const c_char,
    status: RawStatus,
    category: *const c_char,
    message: *const c_char,
) {
    let status = Status::from_raw(status);
    // SAFETY: the binary passes NUL-terminated strings or null.
    let (reported_name, category, message) = unsafe {
        (
            string_from(reported_name),
            string_from(category).unwrap_or_default(),
            string_from(message).unwrap_or_default(),
        )
    };

    let instance = context
        .and_then(|ctx| {
            let registry = ctx.registry.as_ref()?;
            registry.lookup(component?)
        })
        .or_else(|| context.map(|ctx| ctx.instance_name.clone()))
        .or(reported_name)
        .unwrap_or_else(|| "<unknown>".to_string());

    match status {
        Status::Ok | Status::Pending => {
            tracing::info!(instance = %instance, category = %category, "{message}")
        }
        Status::Warning => tracing::warn!(instance = %instance, category = %category, "{message}"),
        Status::Discard | Status::Error | Status::Fatal => {
            tracing::error!(instance = %instance, category = %category, %status, "{message}")
        }
    }

    if let Some(ctx) = context {
        ctx.record(LogRecord {
            instance,
            status,
            category,
            message,
        });
    }
}

/// Logger for generation one. Format arguments after `message` are ignored.
pub(crate) extern "C" fn v1_logger(
    component: v1::Component,
    instance_name: v1::FmiString,
    status: RawStatus,
    category: v1::FmiString,
    message: v1::FmiString,
) {
    let context = ACTIVE_CONTEXT.with(Cell::get);
    // SAFETY: set by `with_active` from a live reference for the duration
    // of the call that reached this callback.
    let context = unsafe { context.as_ref() };
    forward(
        context,
        Some(component as *const c_void),
        instance_name,
        status,
        category,
        message,
    );
}

/// Logger for generation two. Format arguments after `message` are ignored.
pub(crate) extern "C" fn v2_logger(
    environment: v2::ComponentEnvironment,
    instance_name: v2::FmiString,
    status: RawStatus,
    category: v2::FmiString,
    message: v2::FmiString,
) {
    // SAFETY: the environment is the boxed context of the owning handle,
    // which outlives the instance.
    let context = unsafe { (environment as *const HostContext).as_ref() };
    forward(context, None, instance_name, status, category, message);
}

pub(crate) extern "C" fn allocate_memory(count: usize, size: usize) -> *mut c_void {
    // SAFETY: calloc accepts any sizes and returns null on failure.
    unsafe { libc::calloc(count, size) }
}

pub(crate) extern "C" fn free_memory(pointer: *mut c_void) {
    // SAFETY: only pointers from `allocate_memory` (or null) are passed back.
    unsafe { libc::free(pointer) }
}

extern "C" fn v1_step_finished(_component: v1::Component, status: RawStatus) {
    tracing::trace!(status = %Status::from_raw(status), "asynchronous step finished");
}

extern "C" fn v2_step_finished(_environment: v2::ComponentEnvironment, status: RawStatus) {
    tracing::trace!(status = %Status::from_raw(status), "asynchronous step finished");
}

pub(crate) fn v1_model_callbacks() -> v1::ModelCallbackFunctions {
    v1::ModelCallbackFunctions {
        logger: v1_logger,
        allocate_memory,
        free_memory,
    }
}

pub(crate) fn v1_slave_callbacks() -> v1::SlaveCallbackFunctions {
    v1::SlaveCallbackFunctions {
        logger: v1_logger,
        allocate_memory,
        free_memory,
        step_finished: Some(v1_step_finished),
    }
}

/// Callback struct whose environment points at `context`. The context must
/// stay at a stable address for as long as the instance lives.
pub(crate) fn v2_callbacks(context: &HostContext) -> v2::CallbackFunctions {
    v2::CallbackFunctions {
        logger: v2_logger,
        allocate_memory,
        free_memory,
        step_finished: Some(v2_step_finished),
        component_environment: context as *const HostContext as *mut c_void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use uuid::Uuid;

    #[test]
    fn v2_logger_records_through_environment() {
        let context = HostContext::new("inst", None);
        let callbacks = v2_callbacks(&context);
        let category = CString::new("logAll").unwrap();
        let message = CString::new("step rejected").unwrap();
        (callbacks.logger)(
            callbacks.component_environment,
            ptr::null(),
            crate::abi::STATUS_WARNING,
            category.as_ptr(),
            message.as_ptr(),
        );
        let record = context.last_log().unwrap();
        assert_eq!(record.instance, "inst");
        assert_eq!(record.status, Status::Warning);
        assert_eq!(record.message, "step rejected");
    }

    #[test]
    fn v1_logger_resolves_instance_by_pointer() {
        let registry = ActiveInstanceRegistry::new();
        let component = 0xdead_0000usize as *mut c_void;
        registry.register(Uuid::new_v4(), "registered-name", component);
        let context = HostContext::new("context-name", Some(registry));
        let message = CString::new("hello").unwrap();

        with_active(&context, || {
            v1_logger(component, ptr::null(), 0, ptr::null(), message.as_ptr());
        });
        assert_eq!(context.last_log().unwrap().instance, "registered-name");

        // Unknown pointer falls back to the active context's own name.
        with_active(&context, || {
            v1_logger(ptr::null_mut(), ptr::null(), 0, ptr::null(), message.as_ptr());
        });
        assert_eq!(context.last_log().unwrap().instance, "context-name");
    }

    #[test]
    fn v1_logger_without_context_is_harmless() {
        let name = CString::new("orphan").unwrap();
        v1_logger(ptr::null_mut(), name.as_ptr(), 3, ptr::null(), ptr::null());
    }

    #[test]
    fn active_context_is_restored() {
        let outer = HostContext::new("outer", None);
        let inner = HostContext::new("inner", None);
        with_active(&outer, || {
            with_active(&inner, || {});
            let current = ACTIVE_CONTEXT.with(Cell::get);
            assert_eq!(current, &outer as *const HostContext);
        });
        assert!(ACTIVE_CONTEXT.with(Cell::get).is_null());
    }

    #[test]
    fn memory_callbacks_round_trip() {
        let p = allocate_memory(4, 8);
        assert!(!p.is_null());
        free_memory(p);
    }
}
