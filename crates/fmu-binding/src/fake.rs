//! In-process stand-in for a compiled model binary.
//!
//! [`FakeImage`] maps exported symbol names to `extern "C"` functions defined
//! here, so binding and instance tests run without a shared library on disk.
//! The fake model holds a handful of value slots per base type, integrates
//! time on `DoStep`, and reports through the host logger when handed an
//! invalid step.
//!
//! `DoStep` with a negative step size returns `error` (after logging), a step
//! larger than [`FATAL_STEP`] returns `fatal`. An instance named
//! [`REFUSE_NAME`] is refused with a null pointer.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

use fmu_model::{
    BaseType, Causality, InterfaceGeneration, KindCapabilities, ModelDescription,
    ModelMetadata, ModelStructure, Variable, VariableRegistry,
};

use crate::abi::{self, v1, v2, RawStatus, RawStatusKind};
use crate::image::NativeImage;

pub(crate) const SLOTS: usize = 8;
pub(crate) const FATAL_STEP: f64 = 1000.0;
pub(crate) const REFUSE_NAME: &str = "refuse";

thread_local! {
    static CALLS: Cell<usize> = const { Cell::new(0) };
}

/// Number of fake entry points invoked on this thread so far.
pub(crate) fn calls() -> usize {
    CALLS.with(Cell::get)
}

fn hit() {
    CALLS.with(|c| c.set(c.get() + 1));
}

#[derive(Clone, Copy)]
enum Logger {
    V1(v1::Logger),
    V2(v2::Logger, v2::ComponentEnvironment),
}

struct FakeInstance {
    name: CString,
    logger: Logger,
    reals: [f64; SLOTS],
    integers: [i32; SLOTS],
    booleans: [bool; SLOTS],
    strings: Vec<CString>,
    time: f64,
    states: [f64; 2],
    logging_on: bool,
}

impl FakeInstance {
    fn new(name: *const c_char, logger: Logger) -> Self {
        // SAFETY: the host always passes a NUL-terminated name.
        let name = unsafe { CStr::from_ptr(name) }.to_owned();
        Self {
            name,
            logger,
            reals: [0.0; SLOTS],
            integers: [0; SLOTS],
            booleans: [false; SLOTS],
            strings: (0..SLOTS).map(|_| CString::default()).collect(),
            time: 0.0,
            states: [1.0, 0.0],
            logging_on: false,
        }
    }

    fn log(&self, status: RawStatus, message: &str) {
        let category = CString::new("logStatusError").unwrap();
        let message = CString::new(message).unwrap();
        match self.logger {
            Logger::V1(logger) => logger(
                self as *const Self as *mut c_void,
                self.name.as_ptr(),
                status,
                category.as_ptr(),
                message.as_ptr(),
            ),
            Logger::V2(logger, environment) => logger(
                environment,
                self.name.as_ptr(),
                status,
                category.as_ptr(),
                message.as_ptr(),
            ),
        }
    }

    fn do_step(&mut self, current: f64, step: f64) -> RawStatus {
        if step < 0.0 {
            self.log(abi::STATUS_ERROR, "negative step size");
            return abi::STATUS_ERROR;
        }
        if step > FATAL_STEP {
            return abi::STATUS_FATAL;
        }
        self.time = current + step;
        self.reals[0] = self.time;
        abi::STATUS_OK
    }
}

unsafe fn instance<'a>(c: *mut c_void) -> &'a mut FakeInstance {
    &mut *(c as *mut FakeInstance)
}

unsafe fn references<'a>(vr: *const v2::ValueReference, n: usize) -> &'a [v2::ValueReference] {
    std::slice::from_raw_parts(vr, n)
}

fn in_range(vr: &[v2::ValueReference]) -> bool {
    vr.iter().all(|&r| (r as usize) < SLOTS)
}

// Shared by both generations: identical signatures.

extern "C" fn get_types_platform() -> *const c_char {
    hit();
    b"default\0".as_ptr() as *const c_char
}

extern "C" fn get_version_v1() -> *const c_char {
    hit();
    b"1.0\0".as_ptr() as *const c_char
}

extern "C" fn get_version_v2() -> *const c_char {
    hit();
    b"2.0\0".as_ptr() as *const c_char
}

unsafe extern "C" fn free_instance(c: *mut c_void) {
    hit();
    if !c.is_null() {
        drop(Box::from_raw(c as *mut FakeInstance));
    }
}

unsafe extern "C" fn ok_component(_c: *mut c_void) -> RawStatus {
    hit();
    abi::STATUS_OK
}

unsafe extern "C" fn reset(c: *mut c_void) -> RawStatus {
    hit();
    let inst = instance(c);
    inst.reals = [0.0; SLOTS];
    inst.integers = [0; SLOTS];
    inst.time = 0.0;
    abi::STATUS_OK
}

unsafe extern "C" fn set_real(
    c: *mut c_void,
    vr: *const v2::ValueReference,
    n: usize,
    values: *const f64,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        inst.reals[r as usize] = *values.add(i);
    }
    abi::STATUS_OK
}

unsafe extern "C" fn get_real(
    c: *mut c_void,
    vr: *const v2::ValueReference,
    n: usize,
    values: *mut f64,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        *values.add(i) = inst.reals[r as usize];
    }
    abi::STATUS_OK
}

unsafe extern "C" fn set_integer(
    c: *mut c_void,
    vr: *const v2::ValueReference,
    n: usize,
    values: *const i32,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        inst.integers[r as usize] = *values.add(i);
    }
    abi::STATUS_OK
}

unsafe extern "C" fn get_integer(
    c: *mut c_void,
    vr: *const v2::ValueReference,
    n: usize,
    values: *mut i32,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        *values.add(i) = inst.integers[r as usize];
    }
    abi::STATUS_OK
}

unsafe extern "C" fn set_string(
    c: *mut c_void,
    vr: *const v2::ValueReference,
    n: usize,
    values: *const *const c_char,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        inst.strings[r as usize] = CStr::from_ptr(*values.add(i)).to_owned();
    }
    abi::STATUS_OK
}

unsafe extern "C" fn get_string(
    c: *mut c_void,
    vr: *const v2::ValueReference,
    n: usize,
    values: *mut *const c_char,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        *values.add(i) = inst.strings[r as usize].as_ptr();
    }
    abi::STATUS_OK
}

unsafe extern "C" fn get_status(c: *mut c_void, _kind: RawStatusKind, value: *mut RawStatus) -> RawStatus {
    hit();
    let _ = instance(c);
    *value = abi::STATUS_OK;
    abi::STATUS_OK
}

unsafe extern "C" fn get_real_status(c: *mut c_void, kind: RawStatusKind, value: *mut f64) -> RawStatus {
    hit();
    // Only last-successful-time is defined for reals.
    if kind != 2 {
        return abi::STATUS_DISCARD;
    }
    *value = instance(c).time;
    abi::STATUS_OK
}

unsafe extern "C" fn get_integer_status(_c: *mut c_void, _kind: RawStatusKind, _value: *mut i32) -> RawStatus {
    hit();
    abi::STATUS_DISCARD
}

unsafe extern "C" fn get_string_status(
    _c: *mut c_void,
    _kind: RawStatusKind,
    value: *mut *const c_char,
) -> RawStatus {
    hit();
    *value = b"idle\0".as_ptr() as *const c_char;
    abi::STATUS_OK
}

// Generation two.

unsafe extern "C" fn v2_instantiate(
    name: v2::FmiString,
    _kind: v2::Type,
    _guid: v2::FmiString,
    _resources: v2::FmiString,
    callbacks: *const v2::CallbackFunctions,
    _visible: v2::Boolean,
    logging_on: v2::Boolean,
) -> v2::Component {
    hit();
    if CStr::from_ptr(name).to_bytes() == REFUSE_NAME.as_bytes() {
        return ptr::null_mut();
    }
    let callbacks = *callbacks;
    let mut inst = FakeInstance::new(
        name,
        Logger::V2(callbacks.logger, callbacks.component_environment),
    );
    inst.logging_on = logging_on != v2::FALSE;
    Box::into_raw(Box::new(inst)) as v2::Component
}

unsafe extern "C" fn v2_set_debug_logging(
    c: v2::Component,
    on: v2::Boolean,
    n: usize,
    categories: *const v2::FmiString,
) -> RawStatus {
    hit();
    let inst = instance(c);
    inst.logging_on = on != v2::FALSE;
    for i in 0..n {
        if CStr::from_ptr(*categories.add(i)).to_bytes() == b"unknownCategory" {
            return abi::STATUS_ERROR;
        }
    }
    abi::STATUS_OK
}

unsafe extern "C" fn v2_setup_experiment(
    c: v2::Component,
    _tolerance_defined: v2::Boolean,
    _tolerance: f64,
    start: f64,
    _stop_defined: v2::Boolean,
    _stop: f64,
) -> RawStatus {
    hit();
    instance(c).time = start;
    abi::STATUS_OK
}

unsafe extern "C" fn v2_set_boolean(
    c: v2::Component,
    vr: *const v2::ValueReference,
    n: usize,
    values: *const v2::Boolean,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        inst.booleans[r as usize] = *values.add(i) != v2::FALSE;
    }
    abi::STATUS_OK
}

unsafe extern "C" fn v2_get_boolean(
    c: v2::Component,
    vr: *const v2::ValueReference,
    n: usize,
    values: *mut v2::Boolean,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        *values.add(i) = v2::boolean(inst.booleans[r as usize]);
    }
    abi::STATUS_OK
}

unsafe extern "C" fn v2_get_fmu_state(c: v2::Component, state: *mut v2::FmuState) -> RawStatus {
    hit();
    let snapshot = Box::new((instance(c).reals, instance(c).time));
    *state = Box::into_raw(snapshot) as v2::FmuState;
    abi::STATUS_OK
}

unsafe extern "C" fn v2_set_fmu_state(c: v2::Component, state: v2::FmuState) -> RawStatus {
    hit();
    let (reals, time) = *(state as *const ([f64; SLOTS], f64));
    let inst = instance(c);
    inst.reals = reals;
    inst.time = time;
    abi::STATUS_OK
}

unsafe extern "C" fn v2_free_fmu_state(_c: v2::Component, state: *mut v2::FmuState) -> RawStatus {
    hit();
    if !(*state).is_null() {
        drop(Box::from_raw(*state as *mut ([f64; SLOTS], f64)));
        *state = ptr::null_mut();
    }
    abi::STATUS_OK
}

const SERIALIZED_SIZE: usize = (SLOTS + 1) * 8;

unsafe extern "C" fn v2_serialized_size(_c: v2::Component, _state: v2::FmuState, size: *mut usize) -> RawStatus {
    hit();
    *size = SERIALIZED_SIZE;
    abi::STATUS_OK
}

unsafe extern "C" fn v2_serialize(
    _c: v2::Component,
    state: v2::FmuState,
    bytes: *mut v2::Byte,
    size: usize,
) -> RawStatus {
    hit();
    if size < SERIALIZED_SIZE {
        return abi::STATUS_ERROR;
    }
    let (reals, time) = *(state as *const ([f64; SLOTS], f64));
    let out = std::slice::from_raw_parts_mut(bytes as *mut u8, size);
    for (i, value) in reals.iter().chain(std::iter::once(&time)).enumerate() {
        out[i * 8..(i + 1) * 8].copy_from_slice(&value.to_le_bytes());
    }
    abi::STATUS_OK
}

unsafe extern "C" fn v2_deserialize(
    _c: v2::Component,
    bytes: *const v2::Byte,
    size: usize,
    state: *mut v2::FmuState,
) -> RawStatus {
    hit();
    if size != SERIALIZED_SIZE {
        return abi::STATUS_ERROR;
    }
    let input = std::slice::from_raw_parts(bytes as *const u8, size);
    let mut values = [0.0; SLOTS + 1];
    for (i, value) in values.iter_mut().enumerate() {
        let mut word = [0u8; 8];
        word.copy_from_slice(&input[i * 8..(i + 1) * 8]);
        *value = f64::from_le_bytes(word);
    }
    let mut reals = [0.0; SLOTS];
    reals.copy_from_slice(&values[..SLOTS]);
    *state = Box::into_raw(Box::new((reals, values[SLOTS]))) as v2::FmuState;
    abi::STATUS_OK
}

unsafe extern "C" fn v2_get_directional_derivative(
    _c: v2::Component,
    _unknowns: *const v2::ValueReference,
    n_unknowns: usize,
    _knowns: *const v2::ValueReference,
    n_knowns: usize,
    dv_known: *const f64,
    dv_unknown: *mut f64,
) -> RawStatus {
    hit();
    let seed: f64 = std::slice::from_raw_parts(dv_known, n_knowns).iter().sum();
    for i in 0..n_unknowns {
        *dv_unknown.add(i) = 2.0 * seed;
    }
    abi::STATUS_OK
}

unsafe extern "C" fn v2_new_discrete_states(c: v2::Component, info: *mut v2::EventInfo) -> RawStatus {
    hit();
    let inst = instance(c);
    *info = v2::EventInfo {
        next_event_time_defined: v2::TRUE,
        next_event_time: inst.time + 1.0,
        ..Default::default()
    };
    abi::STATUS_OK
}

unsafe extern "C" fn v2_completed_integrator_step(
    c: v2::Component,
    _no_set_prior: v2::Boolean,
    enter_event_mode: *mut v2::Boolean,
    terminate: *mut v2::Boolean,
) -> RawStatus {
    hit();
    let inst = instance(c);
    *enter_event_mode = v2::boolean(inst.states[0] < 0.0);
    *terminate = v2::FALSE;
    abi::STATUS_OK
}

unsafe extern "C" fn set_time(c: *mut c_void, time: f64) -> RawStatus {
    hit();
    instance(c).time = time;
    abi::STATUS_OK
}

unsafe extern "C" fn set_continuous_states(c: *mut c_void, x: *const f64, n: usize) -> RawStatus {
    hit();
    if n != 2 {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    inst.states.copy_from_slice(std::slice::from_raw_parts(x, n));
    abi::STATUS_OK
}

unsafe extern "C" fn get_continuous_states(c: *mut c_void, x: *mut f64, n: usize) -> RawStatus {
    hit();
    if n != 2 {
        return abi::STATUS_ERROR;
    }
    std::slice::from_raw_parts_mut(x, n).copy_from_slice(&instance(c).states);
    abi::STATUS_OK
}

unsafe extern "C" fn get_derivatives(c: *mut c_void, dx: *mut f64, n: usize) -> RawStatus {
    hit();
    if n != 2 {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    *dx = inst.states[1];
    *dx.add(1) = -9.81;
    abi::STATUS_OK
}

unsafe extern "C" fn get_event_indicators(c: *mut c_void, z: *mut f64, n: usize) -> RawStatus {
    hit();
    if n != 1 {
        return abi::STATUS_ERROR;
    }
    *z = instance(c).states[0];
    abi::STATUS_OK
}

unsafe extern "C" fn get_nominals(_c: *mut c_void, x: *mut f64, n: usize) -> RawStatus {
    hit();
    std::slice::from_raw_parts_mut(x, n).fill(1.0);
    abi::STATUS_OK
}

unsafe extern "C" fn v2_do_step(
    c: v2::Component,
    current: f64,
    step: f64,
    _no_set_prior: v2::Boolean,
) -> RawStatus {
    hit();
    instance(c).do_step(current, step)
}

unsafe extern "C" fn v1_do_step(c: *mut c_void, current: f64, step: f64, _new_step: v1::Boolean) -> RawStatus {
    hit();
    instance(c).do_step(current, step)
}

unsafe extern "C" fn v2_get_boolean_status(
    _c: v2::Component,
    _kind: RawStatusKind,
    value: *mut v2::Boolean,
) -> RawStatus {
    hit();
    *value = v2::FALSE;
    abi::STATUS_OK
}

// Generation one co-simulation.

unsafe extern "C" fn v1_instantiate_slave(
    name: v1::FmiString,
    _guid: v1::FmiString,
    _location: v1::FmiString,
    _mime_type: v1::FmiString,
    _timeout: f64,
    _visible: v1::Boolean,
    _interactive: v1::Boolean,
    callbacks: v1::SlaveCallbackFunctions,
    logging_on: v1::Boolean,
) -> v1::Component {
    hit();
    if CStr::from_ptr(name).to_bytes() == REFUSE_NAME.as_bytes() {
        return ptr::null_mut();
    }
    let mut inst = FakeInstance::new(name, Logger::V1(callbacks.logger));
    inst.logging_on = logging_on != v1::FALSE;
    Box::into_raw(Box::new(inst)) as v1::Component
}

unsafe extern "C" fn v1_initialize_slave(
    c: v1::Component,
    start: f64,
    _stop_defined: v1::Boolean,
    _stop: f64,
) -> RawStatus {
    hit();
    instance(c).time = start;
    abi::STATUS_OK
}

unsafe extern "C" fn v1_set_debug_logging(c: v1::Component, on: v1::Boolean) -> RawStatus {
    hit();
    instance(c).logging_on = on != v1::FALSE;
    abi::STATUS_OK
}

unsafe extern "C" fn v1_set_boolean(
    c: v1::Component,
    vr: *const v1::ValueReference,
    n: usize,
    values: *const v1::Boolean,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        inst.booleans[r as usize] = *values.add(i) != v1::FALSE;
    }
    abi::STATUS_OK
}

unsafe extern "C" fn v1_get_boolean(
    c: v1::Component,
    vr: *const v1::ValueReference,
    n: usize,
    values: *mut v1::Boolean,
) -> RawStatus {
    hit();
    let vr = references(vr, n);
    if !in_range(vr) {
        return abi::STATUS_ERROR;
    }
    let inst = instance(c);
    for (i, &r) in vr.iter().enumerate() {
        *values.add(i) = v1::boolean(inst.booleans[r as usize]);
    }
    abi::STATUS_OK
}

unsafe extern "C" fn v1_get_boolean_status(
    _c: v1::Component,
    _kind: RawStatusKind,
    value: *mut v1::Boolean,
) -> RawStatus {
    hit();
    *value = v1::FALSE;
    abi::STATUS_OK
}

/// A symbol table standing in for a loaded shared library.
#[derive(Debug, Clone)]
pub(crate) struct FakeImage {
    path: PathBuf,
    symbols: HashMap<String, usize>,
}

macro_rules! export {
    ($image:expr, $name:expr, $function:expr) => {
        $image.symbols.insert($name.to_string(), $function as usize)
    };
}

impl FakeImage {
    fn empty(name: &str) -> Self {
        Self {
            path: PathBuf::from(format!("/fake/binaries/{name}")),
            symbols: HashMap::new(),
        }
    }

    /// Every generation-two entry point, for both variants.
    pub(crate) fn v2() -> Self {
        let mut image = Self::empty("fake.so");
        export!(image, "fmi2GetTypesPlatform", get_types_platform);
        export!(image, "fmi2GetVersion", get_version_v2);
        export!(image, "fmi2SetDebugLogging", v2_set_debug_logging);
        export!(image, "fmi2Instantiate", v2_instantiate);
        export!(image, "fmi2FreeInstance", free_instance);
        export!(image, "fmi2SetupExperiment", v2_setup_experiment);
        export!(image, "fmi2EnterInitializationMode", ok_component);
        export!(image, "fmi2ExitInitializationMode", ok_component);
        export!(image, "fmi2Terminate", ok_component);
        export!(image, "fmi2Reset", reset);
        export!(image, "fmi2SetReal", set_real);
        export!(image, "fmi2SetInteger", set_integer);
        export!(image, "fmi2SetBoolean", v2_set_boolean);
        export!(image, "fmi2SetString", set_string);
        export!(image, "fmi2GetReal", get_real);
        export!(image, "fmi2GetInteger", get_integer);
        export!(image, "fmi2GetBoolean", v2_get_boolean);
        export!(image, "fmi2GetString", get_string);
        export!(image, "fmi2GetFMUstate", v2_get_fmu_state);
        export!(image, "fmi2SetFMUstate", v2_set_fmu_state);
        export!(image, "fmi2FreeFMUstate", v2_free_fmu_state);
        export!(image, "fmi2SerializedFMUstateSize", v2_serialized_size);
        export!(image, "fmi2SerializeFMUstate", v2_serialize);
        export!(image, "fmi2DeSerializeFMUstate", v2_deserialize);
        export!(image, "fmi2GetDirectionalDerivative", v2_get_directional_derivative);
        export!(image, "fmi2EnterEventMode", ok_component);
        export!(image, "fmi2NewDiscreteStates", v2_new_discrete_states);
        export!(image, "fmi2EnterContinuousTimeMode", ok_component);
        export!(image, "fmi2CompletedIntegratorStep", v2_completed_integrator_step);
        export!(image, "fmi2SetTime", set_time);
        export!(image, "fmi2SetContinuousStates", set_continuous_states);
        export!(image, "fmi2GetDerivatives", get_derivatives);
        export!(image, "fmi2GetEventIndicators", get_event_indicators);
        export!(image, "fmi2GetContinuousStates", get_continuous_states);
        export!(image, "fmi2GetNominalsOfContinuousStates", get_nominals);
        export!(image, "fmi2DoStep", v2_do_step);
        export!(image, "fmi2CancelStep", ok_component);
        export!(image, "fmi2GetStatus", get_status);
        export!(image, "fmi2GetRealStatus", get_real_status);
        export!(image, "fmi2GetIntegerStatus", get_integer_status);
        export!(image, "fmi2GetBooleanStatus", v2_get_boolean_status);
        export!(image, "fmi2GetStringStatus", get_string_status);
        image
    }

    /// Generation-one co-simulation entry points under `prefix`.
    pub(crate) fn v1_slave(prefix: &str) -> Self {
        let mut image = Self::empty(&format!("{prefix}.so"));
        let name = |operation: &str| format!("{prefix}_fmi{operation}");
        export!(image, name("GetTypesPlatform"), get_types_platform);
        export!(image, name("GetVersion"), get_version_v1);
        export!(image, name("SetDebugLogging"), v1_set_debug_logging);
        export!(image, name("InstantiateSlave"), v1_instantiate_slave);
        export!(image, name("InitializeSlave"), v1_initialize_slave);
        export!(image, name("TerminateSlave"), ok_component);
        export!(image, name("ResetSlave"), reset);
        export!(image, name("FreeSlaveInstance"), free_instance);
        export!(image, name("SetReal"), set_real);
        export!(image, name("SetInteger"), set_integer);
        export!(image, name("SetBoolean"), v1_set_boolean);
        export!(image, name("SetString"), set_string);
        export!(image, name("GetReal"), get_real);
        export!(image, name("GetInteger"), get_integer);
        export!(image, name("GetBoolean"), v1_get_boolean);
        export!(image, name("GetString"), get_string);
        export!(image, name("DoStep"), v1_do_step);
        export!(image, name("CancelStep"), ok_component);
        export!(image, name("GetStatus"), get_status);
        export!(image, name("GetRealStatus"), get_real_status);
        export!(image, name("GetIntegerStatus"), get_integer_status);
        export!(image, name("GetBooleanStatus"), v1_get_boolean_status);
        export!(image, name("GetStringStatus"), get_string_status);
        image
    }

    /// Drop one export.
    pub(crate) fn without(mut self, symbol: &str) -> Self {
        self.symbols.remove(symbol);
        self
    }
}

impl NativeImage for FakeImage {
    fn location(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, symbol: &str) -> Option<*const c_void> {
        self.symbols.get(symbol).map(|&address| address as *const c_void)
    }
}

/// A description offering both variants under the identifier `fake`.
pub(crate) fn model_description(generation: InterfaceGeneration) -> ModelDescription {
    build_description(generation, true)
}

/// A description offering co-simulation only.
pub(crate) fn model_description_cs_only(generation: InterfaceGeneration) -> ModelDescription {
    build_description(generation, false)
}

fn build_description(generation: InterfaceGeneration, with_me: bool) -> ModelDescription {
    let mut metadata = ModelMetadata::new(generation);
    metadata.model_name = "fake".into();
    metadata.guid = "{8c4e810f-3df3-4a00-8276-176fa3c9f000}".into();
    metadata.number_of_event_indicators = 1;
    let capabilities = KindCapabilities {
        model_identifier: "fake".into(),
        ..Default::default()
    };
    if with_me {
        metadata.model_exchange = Some(capabilities.clone());
    }
    metadata.co_simulation = Some(capabilities);
    if generation == InterfaceGeneration::V1 {
        metadata.model_identifier = Some("fake".into());
        metadata.number_of_continuous_states = Some(2);
    }

    let mut variables = VariableRegistry::new();
    for (name, vr, causality) in [
        ("time_out", 0, Causality::Output),
        ("u", 1, Causality::Input),
    ] {
        variables
            .insert(Variable::new(name, vr, BaseType::Real).with_causality(causality))
            .unwrap();
    }
    ModelDescription::new(metadata, variables, ModelStructure::default(), true)
}
