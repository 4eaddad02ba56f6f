//! Generation one (`fmiVersion="1.0"`).
//!
//! Every symbol is prefixed with the model identifier, e.g.
//! `bouncingBall_fmiDoStep`. Callback structs are passed by value.

use std::os::raw::{c_char, c_int, c_uint, c_void};

use super::{RawStatus, RawStatusKind};

pub type Component = *mut c_void;
pub type ValueReference = c_uint;
pub type Real = f64;
pub type Integer = c_int;
pub type Boolean = c_char;
pub type FmiString = *const c_char;

pub const TRUE: Boolean = 1;
pub const FALSE: Boolean = 0;

pub fn boolean(value: bool) -> Boolean {
    if value {
        TRUE
    } else {
        FALSE
    }
}

/// Host logger. The binary calls it as a variadic function; only the fixed
/// arguments are read.
pub type Logger = extern "C" fn(Component, FmiString, RawStatus, FmiString, FmiString);
pub type AllocateMemory = extern "C" fn(usize, usize) -> *mut c_void;
pub type FreeMemory = extern "C" fn(*mut c_void);
pub type StepFinished = extern "C" fn(Component, RawStatus);

/// Callbacks handed to `fmiInstantiateModel`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ModelCallbackFunctions {
    pub logger: Logger,
    pub allocate_memory: AllocateMemory,
    pub free_memory: FreeMemory,
}

/// Callbacks handed to `fmiInstantiateSlave`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SlaveCallbackFunctions {
    pub logger: Logger,
    pub allocate_memory: AllocateMemory,
    pub free_memory: FreeMemory,
    pub step_finished: Option<StepFinished>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EventInfo {
    pub iteration_converged: Boolean,
    pub state_value_references_changed: Boolean,
    pub state_values_changed: Boolean,
    pub terminate_simulation: Boolean,
    pub upcoming_time_event: Boolean,
    pub next_event_time: Real,
}

pub type GetStringFn = unsafe extern "C" fn() -> FmiString;
pub type InstantiateModelFn =
    unsafe extern "C" fn(FmiString, FmiString, ModelCallbackFunctions, Boolean) -> Component;
pub type InstantiateSlaveFn = unsafe extern "C" fn(
    FmiString,
    FmiString,
    FmiString,
    FmiString,
    Real,
    Boolean,
    Boolean,
    SlaveCallbackFunctions,
    Boolean,
) -> Component;
pub type FreeInstanceFn = unsafe extern "C" fn(Component);
pub type ComponentFn = unsafe extern "C" fn(Component) -> RawStatus;
pub type SetDebugLoggingFn = unsafe extern "C" fn(Component, Boolean) -> RawStatus;
pub type SetValuesFn<T> =
    unsafe extern "C" fn(Component, *const ValueReference, usize, *const T) -> RawStatus;
pub type GetValuesFn<T> =
    unsafe extern "C" fn(Component, *const ValueReference, usize, *mut T) -> RawStatus;

// Model exchange.
pub type SetTimeFn = unsafe extern "C" fn(Component, Real) -> RawStatus;
pub type SetRealsFn = unsafe extern "C" fn(Component, *const Real, usize) -> RawStatus;
pub type GetRealsFn = unsafe extern "C" fn(Component, *mut Real, usize) -> RawStatus;
pub type CompletedIntegratorStepFn = unsafe extern "C" fn(Component, *mut Boolean) -> RawStatus;
pub type InitializeFn = unsafe extern "C" fn(Component, Boolean, Real, *mut EventInfo) -> RawStatus;
pub type EventUpdateFn = unsafe extern "C" fn(Component, Boolean, *mut EventInfo) -> RawStatus;
pub type GetStateValueReferencesFn =
    unsafe extern "C" fn(Component, *mut ValueReference, usize) -> RawStatus;

// Co-simulation.
pub type InitializeSlaveFn = unsafe extern "C" fn(Component, Real, Boolean, Real) -> RawStatus;
pub type DoStepFn = unsafe extern "C" fn(Component, Real, Real, Boolean) -> RawStatus;
pub type GetStatusFn<T> = unsafe extern "C" fn(Component, RawStatusKind, *mut T) -> RawStatus;
