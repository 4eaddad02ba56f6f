//! Generation two (`fmiVersion="2.0"`).
//!
//! Symbols carry a fixed `fmi2` prefix and one binary may serve both kinds.
//! The callback struct is passed by pointer and must outlive the instance.

use std::os::raw::{c_char, c_int, c_uint, c_void};

use super::{RawStatus, RawStatusKind};

pub type Component = *mut c_void;
pub type ComponentEnvironment = *mut c_void;
pub type FmuState = *mut c_void;
pub type ValueReference = c_uint;
pub type Real = f64;
pub type Integer = c_int;
pub type Boolean = c_int;
pub type Byte = c_char;
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

/// `fmi2Type` passed to `fmi2Instantiate`.
pub type Type = c_int;
pub const MODEL_EXCHANGE: Type = 0;
pub const CO_SIMULATION: Type = 1;

/// Host logger; see [`super::v1::Logger`] for the variadic caveat.
pub type Logger = extern "C" fn(ComponentEnvironment, FmiString, RawStatus, FmiString, FmiString);
pub type AllocateMemory = extern "C" fn(usize, usize) -> *mut c_void;
pub type FreeMemory = extern "C" fn(*mut c_void);
pub type StepFinished = extern "C" fn(ComponentEnvironment, RawStatus);

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CallbackFunctions {
    pub logger: Logger,
    pub allocate_memory: AllocateMemory,
    pub free_memory: FreeMemory,
    pub step_finished: Option<StepFinished>,
    pub component_environment: ComponentEnvironment,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct EventInfo {
    pub new_discrete_states_needed: Boolean,
    pub terminate_simulation: Boolean,
    pub nominals_of_continuous_states_changed: Boolean,
    pub values_of_continuous_states_changed: Boolean,
    pub next_event_time_defined: Boolean,
    pub next_event_time: Real,
}

pub type GetStringFn = unsafe extern "C" fn() -> FmiString;
pub type InstantiateFn = unsafe extern "C" fn(
    FmiString,
    Type,
    FmiString,
    FmiString,
    *const CallbackFunctions,
    Boolean,
    Boolean,
) -> Component;
pub type FreeInstanceFn = unsafe extern "C" fn(Component);
pub type ComponentFn = unsafe extern "C" fn(Component) -> RawStatus;
pub type SetDebugLoggingFn =
    unsafe extern "C" fn(Component, Boolean, usize, *const FmiString) -> RawStatus;
pub type SetupExperimentFn =
    unsafe extern "C" fn(Component, Boolean, Real, Real, Boolean, Real) -> RawStatus;
pub type SetValuesFn<T> =
    unsafe extern "C" fn(Component, *const ValueReference, usize, *const T) -> RawStatus;
pub type GetValuesFn<T> =
    unsafe extern "C" fn(Component, *const ValueReference, usize, *mut T) -> RawStatus;

// State exchange.
pub type GetFmuStateFn = unsafe extern "C" fn(Component, *mut FmuState) -> RawStatus;
pub type SetFmuStateFn = unsafe extern "C" fn(Component, FmuState) -> RawStatus;
pub type FreeFmuStateFn = unsafe extern "C" fn(Component, *mut FmuState) -> RawStatus;
pub type SerializedSizeFn = unsafe extern "C" fn(Component, FmuState, *mut usize) -> RawStatus;
pub type SerializeFn = unsafe extern "C" fn(Component, FmuState, *mut Byte, usize) -> RawStatus;
pub type DeserializeFn =
    unsafe extern "C" fn(Component, *const Byte, usize, *mut FmuState) -> RawStatus;
pub type GetDirectionalDerivativeFn = unsafe extern "C" fn(
    Component,
    *const ValueReference,
    usize,
    *const ValueReference,
    usize,
    *const Real,
    *mut Real,
) -> RawStatus;

// Model exchange.
pub type NewDiscreteStatesFn = unsafe extern "C" fn(Component, *mut EventInfo) -> RawStatus;
pub type CompletedIntegratorStepFn =
    unsafe extern "C" fn(Component, Boolean, *mut Boolean, *mut Boolean) -> RawStatus;
pub type SetTimeFn = unsafe extern "C" fn(Component, Real) -> RawStatus;
pub type SetRealsFn = unsafe extern "C" fn(Component, *const Real, usize) -> RawStatus;
pub type GetRealsFn = unsafe extern "C" fn(Component, *mut Real, usize) -> RawStatus;

// Co-simulation.
pub type DoStepFn = unsafe extern "C" fn(Component, Real, Real, Boolean) -> RawStatus;
pub type GetStatusFn<T> = unsafe extern "C" fn(Component, RawStatusKind, *mut T) -> RawStatus;
