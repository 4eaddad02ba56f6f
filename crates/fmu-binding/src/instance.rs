//! Instance lifecycle and typed dispatch.
//!
//! An [`InstanceHandle`] walks `Unbound → Bound → Instantiated → Terminated
//! → Destroyed`. Binding loads the binary into the handle's
//! [`BindingTable`]; instantiation asks the binary for a native instance
//! pointer; every later call passes that pointer back.
//!
//! Status translation follows one rule: `ok`, `warning` and `pending` are
//! returned as `Ok(status)`, anything else as [`DispatchError::Failed`]. A
//! `fatal` status poisons the handle and every later call except
//! [`InstanceHandle::destroy`] fails with `InvalidState` without reaching the
//! binary.
//!
//! Raw calls pass the instance pointer the binary returned together with
//! buffers whose lengths match the counts passed alongside them.

use std::ffi::CString;
use std::fmt;
use std::os::raw::{c_char, c_void};
use std::path::Path;
use std::ptr;

use fmu_model::{FmuKind, InterfaceGeneration, ModelDescription, ValueReference};
use uuid::Uuid;

use crate::abi::{v1, v2, RawStatus, STATUS_OK};
use crate::active::ActiveInstanceRegistry;
use crate::callbacks::{self, HostContext, LogRecord};
use crate::error::{BindError, DispatchError, InstantiationError};
use crate::image::{LibraryImage, NativeImage};
use crate::status::{EventInfo, ExperimentSetup, IntegratorStep, Status, StatusKind};
use crate::table::{BindingTarget, BindingTable, Operations, V2Operations};

/// Result of a dispatched call.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

const MIME_TYPE: &[u8] = b"application/x-fmu-sharedlibrary\0";

/// Lifecycle state of an [`InstanceHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Unbound,
    Bound,
    Instantiated,
    Terminated,
    Destroyed,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::Bound => "bound",
            Self::Instantiated => "instantiated",
            Self::Terminated => "terminated",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings fixed at handle creation.
#[derive(Debug, Clone, Default)]
pub struct InstanceOptions {
    /// Defaults to the model name plus a short random suffix.
    pub instance_name: Option<String>,
    /// URI handed to the binary: the resources directory for generation two,
    /// the extracted package root for generation-one co-simulation.
    pub resource_location: Option<String>,
    pub logging_on: bool,
    pub visible: bool,
    /// Track the instance here while it is alive.
    pub registry: Option<ActiveInstanceRegistry>,
}

/// A state snapshot owned by the binary. Release it with
/// [`InstanceHandle::free_fmu_state`] on the handle that produced it.
#[derive(Debug)]
pub struct FmuState {
    raw: v2::FmuState,
}

// Same call on both generations where the slot signatures agree.
macro_rules! both {
    ($ops:expr, $slot:ident, |$f:ident| $call:expr) => {
        match $ops {
            Operations::V1(o) => o.$slot.map(|$f| unsafe { $call }),
            Operations::V2(o) => o.$slot.map(|$f| unsafe { $call }),
        }
    };
}

/// One bound, possibly instantiated, model binary.
///
/// A handle created with a registry joins it once bound and leaves it on
/// destroy. Its native pointer is recorded when instantiation succeeds.
pub struct InstanceHandle<'m> {
    id: Uuid,
    model: &'m ModelDescription,
    table: BindingTable,
    state: InstanceState,
    component: *mut c_void,
    poisoned: bool,
    registered: bool,
    resource_location: Option<String>,
    logging_on: bool,
    visible: bool,
    last_event: Option<EventInfo>,
    context: Box<HostContext>,
    // Referenced by the binary for the lifetime of the instance.
    callbacks: Box<v2::CallbackFunctions>,
}

impl<'m> InstanceHandle<'m> {
    /// An unbound handle for one binary variant of `model`.
    pub fn new(
        model: &'m ModelDescription,
        kind: FmuKind,
        options: InstanceOptions,
    ) -> Result<Self, BindError> {
        let target = BindingTarget::for_model(model, kind)?;
        let id = Uuid::new_v4();
        let instance_name = options.instance_name.unwrap_or_else(|| {
            let suffix = id.simple().to_string();
            format!("{}-{}", model.model_name(), &suffix[..8])
        });
        let context = Box::new(HostContext::new(instance_name, options.registry));
        let callbacks = Box::new(callbacks::v2_callbacks(&context));
        Ok(Self {
            id,
            model,
            table: BindingTable::new(target),
            state: InstanceState::Unbound,
            component: ptr::null_mut(),
            poisoned: false,
            registered: false,
            resource_location: options.resource_location,
            logging_on: options.logging_on,
            visible: options.visible,
            last_event: None,
            context,
            callbacks,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instance_name(&self) -> &str {
        self.context.instance_name()
    }

    pub fn model(&self) -> &'m ModelDescription {
        self.model
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn kind(&self) -> FmuKind {
        self.table.kind()
    }

    pub fn generation(&self) -> InterfaceGeneration {
        self.table.generation()
    }

    /// Whether a `fatal` status was received.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Path of the bound binary.
    pub fn binary_location(&self) -> Option<&Path> {
        self.table.location()
    }

    /// Most recent message the binary logged for this instance.
    pub fn last_log(&self) -> Option<LogRecord> {
        self.context.last_log()
    }

    /// Event information from the last initialization or event update.
    pub fn last_event_info(&self) -> Option<EventInfo> {
        self.last_event
    }

    /// Bind an already loaded image.
    pub fn bind(&mut self, image: Box<dyn NativeImage>) -> Result<(), BindError> {
        if self.state != InstanceState::Unbound {
            return Err(BindError::AlreadyBound);
        }
        self.table.bind(image)?;
        self.state = InstanceState::Bound;
        if let Some(registry) = self.context.registry() {
            registry.register(self.id, self.context.instance_name(), ptr::null());
            self.registered = true;
        }
        Ok(())
    }

    /// Load the shared library at `path` and bind it.
    pub fn bind_library(&mut self, path: &Path) -> Result<(), BindError> {
        if self.state != InstanceState::Unbound {
            return Err(BindError::AlreadyBound);
        }
        self.bind(Box::new(LibraryImage::load(path)?))
    }

    /// Ask the binary for a native instance.
    ///
    /// A null result leaves the handle `Bound`, so the call may be retried.
    pub fn instantiate(&mut self) -> Result<(), InstantiationError> {
        if self.state != InstanceState::Bound {
            return Err(InstantiationError::InvalidState { state: self.state });
        }
        let name = c_string(self.instance_name(), "instance name")?;
        let guid = c_string(self.model.guid(), "guid")?;
        let location = c_string(
            self.resource_location.as_deref().unwrap_or_default(),
            "resource location",
        )?;
        let Some(operations) = self.table.operations() else {
            return Err(InstantiationError::InvalidState { state: self.state });
        };
        let kind = self.kind();
        let (visible, logging_on) = (self.visible, self.logging_on);
        let host_callbacks: &v2::CallbackFunctions = &self.callbacks;

        let component = callbacks::with_active(&self.context, || match operations {
            Operations::V1(ops) => match kind {
                FmuKind::ModelExchange => ops.instantiate_model.map(|f| unsafe {
                    f(
                        name.as_ptr(),
                        guid.as_ptr(),
                        callbacks::v1_model_callbacks(),
                        v1::boolean(logging_on),
                    )
                }),
                FmuKind::CoSimulation => ops.instantiate_slave.map(|f| unsafe {
                    f(
                        name.as_ptr(),
                        guid.as_ptr(),
                        location.as_ptr(),
                        MIME_TYPE.as_ptr() as *const c_char,
                        0.0,
                        v1::boolean(visible),
                        v1::FALSE,
                        callbacks::v1_slave_callbacks(),
                        v1::boolean(logging_on),
                    )
                }),
            },
            Operations::V2(ops) => ops.instantiate.map(|f| unsafe {
                let fmi_type = match kind {
                    FmuKind::ModelExchange => v2::MODEL_EXCHANGE,
                    FmuKind::CoSimulation => v2::CO_SIMULATION,
                };
                f(
                    name.as_ptr(),
                    fmi_type,
                    guid.as_ptr(),
                    location.as_ptr(),
                    host_callbacks,
                    v2::boolean(visible),
                    v2::boolean(logging_on),
                )
            }),
        })
        .unwrap_or(ptr::null_mut());

        if component.is_null() {
            tracing::warn!(instance = %self.instance_name(), "binary returned no instance");
            return Err(InstantiationError::NullInstance {
                instance_name: self.instance_name().to_string(),
            });
        }

        self.component = component;
        self.state = InstanceState::Instantiated;
        if self.registered {
            if let Some(registry) = self.context.registry() {
                registry.attach(self.id, component);
            }
        }
        tracing::info!(
            instance = %self.instance_name(),
            kind = %kind,
            generation = %self.generation(),
            "instantiated"
        );
        Ok(())
    }

    fn ensure_generation(
        &self,
        operation: &'static str,
        generation: InterfaceGeneration,
    ) -> DispatchResult<()> {
        if self.generation() != generation {
            return Err(DispatchError::Unsupported { operation });
        }
        Ok(())
    }

    fn ensure_kind(&self, operation: &'static str, kind: FmuKind) -> DispatchResult<()> {
        if self.kind() != kind {
            return Err(DispatchError::Unsupported { operation });
        }
        Ok(())
    }

    fn poisoned_error(operation: &'static str) -> DispatchError {
        DispatchError::InvalidState {
            operation,
            detail: "the binary reported a fatal status; destroy the instance".into(),
        }
    }

    /// The instance pointer, when calls are allowed.
    fn ready(&self, operation: &'static str) -> DispatchResult<v2::Component> {
        if self.poisoned {
            return Err(Self::poisoned_error(operation));
        }
        match self.state {
            InstanceState::Instantiated => Ok(self.component),
            InstanceState::Unbound => Err(DispatchError::NotBound { operation }),
            state => Err(DispatchError::InvalidState {
                operation,
                detail: format!("handle is {state}"),
            }),
        }
    }

    fn call(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Operations) -> Option<RawStatus>,
    ) -> Status {
        callbacks::with_active(&self.context, || self.table.dispatch(operation, f))
    }

    fn check(&mut self, operation: &'static str, status: Status) -> DispatchResult<Status> {
        match status {
            Status::Ok | Status::Warning | Status::Pending => Ok(status),
            Status::Fatal => {
                self.poisoned = true;
                tracing::error!(
                    instance = %self.instance_name(),
                    operation,
                    "binary reported fatal status; no further calls will be made"
                );
                Err(DispatchError::Failed(status))
            }
            Status::Discard | Status::Error => {
                tracing::debug!(instance = %self.instance_name(), operation, %status, "call failed");
                Err(DispatchError::Failed(status))
            }
        }
    }

    fn query_string(
        &self,
        operation: &'static str,
        pick: impl FnOnce(&Operations) -> Option<v1::GetStringFn>,
    ) -> DispatchResult<String> {
        if self.poisoned {
            return Err(Self::poisoned_error(operation));
        }
        match self.state {
            InstanceState::Bound | InstanceState::Instantiated => {}
            InstanceState::Unbound => return Err(DispatchError::NotBound { operation }),
            state => {
                return Err(DispatchError::InvalidState {
                    operation,
                    detail: format!("handle is {state}"),
                })
            }
        }
        let operations = self
            .table
            .operations()
            .ok_or(DispatchError::NotBound { operation })?;
        let f = pick(operations).ok_or(DispatchError::Unsupported { operation })?;
        let text = callbacks::with_active(&self.context, || unsafe { f() });
        // SAFETY: the binary returns a static NUL-terminated string.
        Ok(unsafe { callbacks::string_from(text) }.unwrap_or_default())
    }

    /// Version string the binary reports. Allowed once bound.
    pub fn get_version(&self) -> DispatchResult<String> {
        self.query_string("GetVersion", |ops| match ops {
            Operations::V1(o) => o.get_version,
            Operations::V2(o) => o.get_version,
        })
    }

    /// Platform types string the binary was compiled with. Allowed once bound.
    pub fn get_types_platform(&self) -> DispatchResult<String> {
        self.query_string("GetTypesPlatform", |ops| match ops {
            Operations::V1(o) => o.get_types_platform,
            Operations::V2(o) => o.get_types_platform,
        })
    }

    /// Toggle the binary's own logging. Categories apply to generation two only.
    pub fn set_debug_logging(&mut self, on: bool, categories: &[&str]) -> DispatchResult<Status> {
        const OP: &str = "SetDebugLogging";
        let c = self.ready(OP)?;
        let categories = c_strings(OP, categories)?;
        let pointers: Vec<*const c_char> = categories.iter().map(|s| s.as_ptr()).collect();
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.set_debug_logging.map(|f| unsafe { f(c, v1::boolean(on)) }),
            Operations::V2(o) => o.set_debug_logging.map(|f| unsafe {
                f(c, v2::boolean(on), pointers.len(), pointers.as_ptr())
            }),
        });
        self.check(OP, status)
    }

    // ---- Values ---------------------------------------------------------

    pub fn set_real(&mut self, references: &[ValueReference], values: &[f64]) -> DispatchResult<Status> {
        const OP: &str = "SetReal";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, set_real, |f| f(c, references.as_ptr(), references.len(), values.as_ptr()))
        });
        self.check(OP, status)
    }

    pub fn get_real(&mut self, references: &[ValueReference], values: &mut [f64]) -> DispatchResult<Status> {
        const OP: &str = "GetReal";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, get_real, |f| f(c, references.as_ptr(), references.len(), values.as_mut_ptr()))
        });
        self.check(OP, status)
    }

    pub fn set_integer(&mut self, references: &[ValueReference], values: &[i32]) -> DispatchResult<Status> {
        const OP: &str = "SetInteger";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, set_integer, |f| f(c, references.as_ptr(), references.len(), values.as_ptr()))
        });
        self.check(OP, status)
    }

    pub fn get_integer(&mut self, references: &[ValueReference], values: &mut [i32]) -> DispatchResult<Status> {
        const OP: &str = "GetInteger";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, get_integer, |f| f(c, references.as_ptr(), references.len(), values.as_mut_ptr()))
        });
        self.check(OP, status)
    }

    pub fn set_boolean(&mut self, references: &[ValueReference], values: &[bool]) -> DispatchResult<Status> {
        const OP: &str = "SetBoolean";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let n = references.len();
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.set_boolean.map(|f| {
                let raw: Vec<v1::Boolean> = values.iter().map(|&b| v1::boolean(b)).collect();
                unsafe { f(c, references.as_ptr(), n, raw.as_ptr()) }
            }),
            Operations::V2(o) => o.set_boolean.map(|f| {
                let raw: Vec<v2::Boolean> = values.iter().map(|&b| v2::boolean(b)).collect();
                unsafe { f(c, references.as_ptr(), n, raw.as_ptr()) }
            }),
        });
        self.check(OP, status)
    }

    pub fn get_boolean(&mut self, references: &[ValueReference], values: &mut [bool]) -> DispatchResult<Status> {
        const OP: &str = "GetBoolean";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let n = references.len();
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.get_boolean.map(|f| {
                let mut raw = vec![v1::FALSE; n];
                let status = unsafe { f(c, references.as_ptr(), n, raw.as_mut_ptr()) };
                for (out, b) in values.iter_mut().zip(&raw) {
                    *out = *b != v1::FALSE;
                }
                status
            }),
            Operations::V2(o) => o.get_boolean.map(|f| {
                let mut raw = vec![v2::FALSE; n];
                let status = unsafe { f(c, references.as_ptr(), n, raw.as_mut_ptr()) };
                for (out, b) in values.iter_mut().zip(&raw) {
                    *out = *b != v2::FALSE;
                }
                status
            }),
        });
        self.check(OP, status)
    }

    pub fn set_string<S: AsRef<str>>(
        &mut self,
        references: &[ValueReference],
        values: &[S],
    ) -> DispatchResult<Status> {
        const OP: &str = "SetString";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let owned = c_strings(OP, values)?;
        let pointers: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        let status = self.call(OP, |ops| {
            both!(ops, set_string, |f| f(c, references.as_ptr(), references.len(), pointers.as_ptr()))
        });
        self.check(OP, status)
    }

    pub fn get_string(
        &mut self,
        references: &[ValueReference],
        values: &mut [String],
    ) -> DispatchResult<Status> {
        const OP: &str = "GetString";
        assert_eq!(references.len(), values.len(), "references and values differ in length");
        let c = self.ready(OP)?;
        let mut raw: Vec<*const c_char> = vec![ptr::null(); references.len()];
        let status = self.call(OP, |ops| {
            both!(ops, get_string, |f| f(c, references.as_ptr(), references.len(), raw.as_mut_ptr()))
        });
        let result = self.check(OP, status)?;
        for (out, text) in values.iter_mut().zip(raw) {
            // SAFETY: strings returned by the binary stay valid until its next call.
            *out = unsafe { callbacks::string_from(text) }.unwrap_or_default();
        }
        Ok(result)
    }

    // ---- Lifecycle ------------------------------------------------------

    /// Bring the instance to its first output point.
    ///
    /// Generation two runs setup-experiment, enter- and exit-initialization.
    /// Generation one calls its single initialize entry point for the bound
    /// variant.
    pub fn initialize(&mut self, setup: &ExperimentSetup) -> DispatchResult<Status> {
        const OP: &str = "Initialize";
        let c = self.ready(OP)?;
        match (self.generation(), self.kind()) {
            (InterfaceGeneration::V2, _) => {
                let first = self.setup_experiment(setup)?;
                let second = self.enter_initialization_mode()?;
                let third = self.exit_initialization_mode()?;
                Ok(first.worst(second).worst(third))
            }
            (InterfaceGeneration::V1, FmuKind::ModelExchange) => {
                let mut info = v1::EventInfo::default();
                let status = self.call(OP, |ops| match ops {
                    Operations::V1(o) => o.initialize.map(|f| unsafe {
                        f(
                            c,
                            v1::boolean(setup.tolerance.is_some()),
                            setup.tolerance.unwrap_or_default(),
                            &mut info,
                        )
                    }),
                    Operations::V2(_) => None,
                });
                let result = self.check(OP, status)?;
                self.last_event = Some(info.into());
                Ok(result)
            }
            (InterfaceGeneration::V1, FmuKind::CoSimulation) => {
                let status = self.call("InitializeSlave", |ops| match ops {
                    Operations::V1(o) => o.initialize_slave.map(|f| unsafe {
                        f(
                            c,
                            setup.start_time,
                            v1::boolean(setup.stop_time.is_some()),
                            setup.stop_time.unwrap_or(setup.start_time),
                        )
                    }),
                    Operations::V2(_) => None,
                });
                self.check("InitializeSlave", status)
            }
        }
    }

    pub fn setup_experiment(&mut self, setup: &ExperimentSetup) -> DispatchResult<Status> {
        const OP: &str = "SetupExperiment";
        self.ensure_generation(OP, InterfaceGeneration::V2)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| match ops {
            Operations::V2(o) => o.setup_experiment.map(|f| unsafe {
                f(
                    c,
                    v2::boolean(setup.tolerance.is_some()),
                    setup.tolerance.unwrap_or_default(),
                    setup.start_time,
                    v2::boolean(setup.stop_time.is_some()),
                    setup.stop_time.unwrap_or_default(),
                )
            }),
            Operations::V1(_) => None,
        });
        self.check(OP, status)
    }

    pub fn enter_initialization_mode(&mut self) -> DispatchResult<Status> {
        self.v2_component_call("EnterInitializationMode", None, |o| o.enter_initialization_mode)
    }

    pub fn exit_initialization_mode(&mut self) -> DispatchResult<Status> {
        self.v2_component_call("ExitInitializationMode", None, |o| o.exit_initialization_mode)
    }

    fn v2_component_call(
        &mut self,
        operation: &'static str,
        kind: Option<FmuKind>,
        pick: impl FnOnce(&V2Operations) -> Option<v2::ComponentFn>,
    ) -> DispatchResult<Status> {
        self.ensure_generation(operation, InterfaceGeneration::V2)?;
        if let Some(kind) = kind {
            self.ensure_kind(operation, kind)?;
        }
        let c = self.ready(operation)?;
        let status = self.call(operation, |ops| match ops {
            Operations::V2(o) => pick(o).map(|f| unsafe { f(c) }),
            Operations::V1(_) => None,
        });
        self.check(operation, status)
    }

    /// End the simulation run. The instance can still be reset or destroyed;
    /// every other call, value getters included, is rejected afterwards.
    pub fn terminate(&mut self) -> DispatchResult<Status> {
        const OP: &str = "Terminate";
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| both!(ops, terminate, |f| f(c)));
        let result = self.check(OP, status)?;
        self.state = InstanceState::Terminated;
        tracing::debug!(instance = %self.instance_name(), "terminated");
        Ok(result)
    }

    /// Return to the freshly instantiated state. Allowed after `terminate`.
    pub fn reset(&mut self) -> DispatchResult<Status> {
        const OP: &str = "Reset";
        if self.generation() == InterfaceGeneration::V1 {
            self.ensure_kind(OP, FmuKind::CoSimulation)?;
        }
        if self.poisoned {
            return Err(Self::poisoned_error(OP));
        }
        let c = match self.state {
            InstanceState::Instantiated | InstanceState::Terminated => self.component,
            InstanceState::Unbound => return Err(DispatchError::NotBound { operation: OP }),
            state => {
                return Err(DispatchError::InvalidState {
                    operation: OP,
                    detail: format!("handle is {state}"),
                })
            }
        };
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.reset_slave.map(|f| unsafe { f(c) }),
            Operations::V2(o) => o.reset.map(|f| unsafe { f(c) }),
        });
        let result = self.check(OP, status)?;
        self.state = InstanceState::Instantiated;
        self.last_event = None;
        Ok(result)
    }

    /// Release the native instance, unload the binary and leave the
    /// registry. Repeated calls, and calls on an unbound handle, do nothing.
    pub fn destroy(&mut self) {
        if matches!(self.state, InstanceState::Unbound | InstanceState::Destroyed) {
            return;
        }

        if !self.component.is_null() {
            if self.poisoned {
                tracing::warn!(
                    instance = %self.instance_name(),
                    "skipping free of an instance that reported a fatal status"
                );
            } else {
                let c = self.component;
                callbacks::with_active(&self.context, || match self.table.operations() {
                    Some(Operations::V1(o)) => o.free_instance.map(|f| unsafe { f(c) }),
                    Some(Operations::V2(o)) => o.free_instance.map(|f| unsafe { f(c) }),
                    None => None,
                });
            }
            self.component = ptr::null_mut();
        }

        self.table.unload();

        if self.registered {
            if let Some(registry) = self.context.registry() {
                registry.unregister(self.id);
            }
            self.registered = false;
        }

        self.state = InstanceState::Destroyed;
        tracing::debug!(instance = %self.instance_name(), "destroyed");
    }

    // ---- Co-simulation ----------------------------------------------------

    /// Advance from `current_time` by `step_size`.
    ///
    /// `new_step` marks the previous step as accepted; for generation two it
    /// is passed as "no rollback before the current point".
    pub fn do_step(&mut self, current_time: f64, step_size: f64, new_step: bool) -> DispatchResult<Status> {
        const OP: &str = "DoStep";
        self.ensure_kind(OP, FmuKind::CoSimulation)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o
                .do_step
                .map(|f| unsafe { f(c, current_time, step_size, v1::boolean(new_step)) }),
            Operations::V2(o) => o
                .do_step
                .map(|f| unsafe { f(c, current_time, step_size, v2::boolean(new_step)) }),
        });
        self.check(OP, status)
    }

    pub fn cancel_step(&mut self) -> DispatchResult<Status> {
        const OP: &str = "CancelStep";
        self.ensure_kind(OP, FmuKind::CoSimulation)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| both!(ops, cancel_step, |f| f(c)));
        self.check(OP, status)
    }

    fn ensure_status_kind(&self, operation: &'static str, kind: StatusKind) -> DispatchResult<()> {
        self.ensure_kind(operation, FmuKind::CoSimulation)?;
        if kind == StatusKind::Terminated && self.generation() == InterfaceGeneration::V1 {
            return Err(DispatchError::Unsupported { operation });
        }
        Ok(())
    }

    /// Status of an asynchronous step.
    pub fn get_status(&mut self, kind: StatusKind) -> DispatchResult<Status> {
        const OP: &str = "GetStatus";
        self.ensure_status_kind(OP, kind)?;
        let c = self.ready(OP)?;
        let mut value: RawStatus = STATUS_OK;
        let status = self.call(OP, |ops| {
            both!(ops, get_status, |f| f(c, kind.to_raw(), &mut value))
        });
        self.check(OP, status)?;
        Ok(Status::from_raw(value))
    }

    pub fn get_real_status(&mut self, kind: StatusKind) -> DispatchResult<f64> {
        const OP: &str = "GetRealStatus";
        self.ensure_status_kind(OP, kind)?;
        let c = self.ready(OP)?;
        let mut value = 0.0;
        let status = self.call(OP, |ops| {
            both!(ops, get_real_status, |f| f(c, kind.to_raw(), &mut value))
        });
        self.check(OP, status)?;
        Ok(value)
    }

    pub fn get_integer_status(&mut self, kind: StatusKind) -> DispatchResult<i32> {
        const OP: &str = "GetIntegerStatus";
        self.ensure_status_kind(OP, kind)?;
        let c = self.ready(OP)?;
        let mut value = 0;
        let status = self.call(OP, |ops| {
            both!(ops, get_integer_status, |f| f(c, kind.to_raw(), &mut value))
        });
        self.check(OP, status)?;
        Ok(value)
    }

    pub fn get_boolean_status(&mut self, kind: StatusKind) -> DispatchResult<bool> {
        const OP: &str = "GetBooleanStatus";
        self.ensure_status_kind(OP, kind)?;
        let c = self.ready(OP)?;
        let mut value = false;
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.get_boolean_status.map(|f| {
                let mut raw = v1::FALSE;
                let status = unsafe { f(c, kind.to_raw(), &mut raw) };
                value = raw != v1::FALSE;
                status
            }),
            Operations::V2(o) => o.get_boolean_status.map(|f| {
                let mut raw = v2::FALSE;
                let status = unsafe { f(c, kind.to_raw(), &mut raw) };
                value = raw != v2::FALSE;
                status
            }),
        });
        self.check(OP, status)?;
        Ok(value)
    }

    pub fn get_string_status(&mut self, kind: StatusKind) -> DispatchResult<String> {
        const OP: &str = "GetStringStatus";
        self.ensure_status_kind(OP, kind)?;
        let c = self.ready(OP)?;
        let mut value: *const c_char = ptr::null();
        let status = self.call(OP, |ops| {
            both!(ops, get_string_status, |f| f(c, kind.to_raw(), &mut value))
        });
        self.check(OP, status)?;
        Ok(unsafe { callbacks::string_from(value) }.unwrap_or_default())
    }

    // ---- Model exchange ---------------------------------------------------

    pub fn set_time(&mut self, time: f64) -> DispatchResult<Status> {
        const OP: &str = "SetTime";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| both!(ops, set_time, |f| f(c, time)));
        self.check(OP, status)
    }

    pub fn set_continuous_states(&mut self, states: &[f64]) -> DispatchResult<Status> {
        const OP: &str = "SetContinuousStates";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, set_continuous_states, |f| f(c, states.as_ptr(), states.len()))
        });
        self.check(OP, status)
    }

    pub fn get_continuous_states(&mut self, states: &mut [f64]) -> DispatchResult<Status> {
        const OP: &str = "GetContinuousStates";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, get_continuous_states, |f| f(c, states.as_mut_ptr(), states.len()))
        });
        self.check(OP, status)
    }

    pub fn get_derivatives(&mut self, derivatives: &mut [f64]) -> DispatchResult<Status> {
        const OP: &str = "GetDerivatives";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, get_derivatives, |f| f(c, derivatives.as_mut_ptr(), derivatives.len()))
        });
        self.check(OP, status)
    }

    pub fn get_event_indicators(&mut self, indicators: &mut [f64]) -> DispatchResult<Status> {
        const OP: &str = "GetEventIndicators";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| {
            both!(ops, get_event_indicators, |f| f(c, indicators.as_mut_ptr(), indicators.len()))
        });
        self.check(OP, status)
    }

    pub fn get_nominals_of_continuous_states(&mut self, nominals: &mut [f64]) -> DispatchResult<Status> {
        const OP: &str = "GetNominalsOfContinuousStates";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let (ptr, n) = (nominals.as_mut_ptr(), nominals.len());
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.get_nominal_continuous_states.map(|f| unsafe { f(c, ptr, n) }),
            Operations::V2(o) => o.get_nominals_of_continuous_states.map(|f| unsafe { f(c, ptr, n) }),
        });
        self.check(OP, status)
    }

    /// Value references of the continuous states. Generation one only.
    pub fn get_state_value_references(&mut self, references: &mut [ValueReference]) -> DispatchResult<Status> {
        const OP: &str = "GetStateValueReferences";
        self.ensure_generation(OP, InterfaceGeneration::V1)?;
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o
                .get_state_value_references
                .map(|f| unsafe { f(c, references.as_mut_ptr(), references.len()) }),
            Operations::V2(_) => None,
        });
        self.check(OP, status)
    }

    pub fn completed_integrator_step(&mut self) -> DispatchResult<(Status, IntegratorStep)> {
        const OP: &str = "CompletedIntegratorStep";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let mut step = IntegratorStep::default();
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.completed_integrator_step.map(|f| {
                let mut call_event_update = v1::FALSE;
                let status = unsafe { f(c, &mut call_event_update) };
                step.enter_event_mode = call_event_update != v1::FALSE;
                status
            }),
            Operations::V2(o) => o.completed_integrator_step.map(|f| {
                let (mut enter, mut terminate) = (v2::FALSE, v2::FALSE);
                let status = unsafe { f(c, v2::TRUE, &mut enter, &mut terminate) };
                step.enter_event_mode = enter != v2::FALSE;
                step.terminate_simulation = terminate != v2::FALSE;
                status
            }),
        });
        let result = self.check(OP, status)?;
        Ok((result, step))
    }

    /// One event iteration: generation one `eventUpdate`, generation two
    /// `newDiscreteStates`.
    pub fn event_update(&mut self) -> DispatchResult<(Status, EventInfo)> {
        const OP: &str = "EventUpdate";
        self.ensure_kind(OP, FmuKind::ModelExchange)?;
        let c = self.ready(OP)?;
        let mut info = EventInfo::default();
        let status = self.call(OP, |ops| match ops {
            Operations::V1(o) => o.event_update.map(|f| {
                let mut raw = v1::EventInfo::default();
                let status = unsafe { f(c, v1::FALSE, &mut raw) };
                info = raw.into();
                status
            }),
            Operations::V2(o) => o.new_discrete_states.map(|f| {
                let mut raw = v2::EventInfo::default();
                let status = unsafe { f(c, &mut raw) };
                info = raw.into();
                status
            }),
        });
        let result = self.check(OP, status)?;
        self.last_event = Some(info);
        Ok((result, info))
    }

    pub fn enter_event_mode(&mut self) -> DispatchResult<Status> {
        self.v2_component_call("EnterEventMode", Some(FmuKind::ModelExchange), |o| o.enter_event_mode)
    }

    pub fn enter_continuous_time_mode(&mut self) -> DispatchResult<Status> {
        self.v2_component_call(
            "EnterContinuousTimeMode",
            Some(FmuKind::ModelExchange),
            |o| o.enter_continuous_time_mode,
        )
    }

    // ---- State exchange and derivatives (generation two) ----------------

    pub fn get_fmu_state(&mut self) -> DispatchResult<FmuState> {
        const OP: &str = "GetFMUstate";
        self.ensure_generation(OP, InterfaceGeneration::V2)?;
        let c = self.ready(OP)?;
        let mut raw: v2::FmuState = ptr::null_mut();
        let status = self.call(OP, |ops| match ops {
            Operations::V2(o) => o.get_fmu_state.map(|f| unsafe { f(c, &mut raw) }),
            Operations::V1(_) => None,
        });
        self.check(OP, status)?;
        Ok(FmuState { raw })
    }

    pub fn set_fmu_state(&mut self, state: &FmuState) -> DispatchResult<Status> {
        const OP: &str = "SetFMUstate";
        self.ensure_generation(OP, InterfaceGeneration::V2)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| match ops {
            Operations::V2(o) => o.set_fmu_state.map(|f| unsafe { f(c, state.raw) }),
            Operations::V1(_) => None,
        });
        self.check(OP, status)
    }

    pub fn free_fmu_state(&mut self, state: FmuState) -> DispatchResult<Status> {
        const OP: &str = "FreeFMUstate";
        self.ensure_generation(OP, InterfaceGeneration::V2)?;
        let c = self.ready(OP)?;
        let mut raw = state.raw;
        let status = self.call(OP, |ops| match ops {
            Operations::V2(o) => o.free_fmu_state.map(|f| unsafe { f(c, &mut raw) }),
            Operations::V1(_) => None,
        });
        self.check(OP, status)
    }

    pub fn serialize_fmu_state(&mut self, state: &FmuState) -> DispatchResult<Vec<u8>> {
        const OP: &str = "SerializeFMUstate";
        self.ensure_generation(OP, InterfaceGeneration::V2)?;
        let c = self.ready(OP)?;
        let mut size = 0usize;
        let status = self.call("SerializedFMUstateSize", |ops| match ops {
            Operations::V2(o) => o
                .serialized_fmu_state_size
                .map(|f| unsafe { f(c, state.raw, &mut size) }),
            Operations::V1(_) => None,
        });
        self.check("SerializedFMUstateSize", status)?;

        let mut bytes = vec![0u8; size];
        let status = self.call(OP, |ops| match ops {
            Operations::V2(o) => o.serialize_fmu_state.map(|f| unsafe {
                f(c, state.raw, bytes.as_mut_ptr() as *mut v2::Byte, bytes.len())
            }),
            Operations::V1(_) => None,
        });
        self.check(OP, status)?;
        Ok(bytes)
    }

    pub fn deserialize_fmu_state(&mut self, bytes: &[u8]) -> DispatchResult<FmuState> {
        const OP: &str = "DeSerializeFMUstate";
        self.ensure_generation(OP, InterfaceGeneration::V2)?;
        let c = self.ready(OP)?;
        let mut raw: v2::FmuState = ptr::null_mut();
        let status = self.call(OP, |ops| match ops {
            Operations::V2(o) => o.deserialize_fmu_state.map(|f| unsafe {
                f(c, bytes.as_ptr() as *const v2::Byte, bytes.len(), &mut raw)
            }),
            Operations::V1(_) => None,
        });
        self.check(OP, status)?;
        Ok(FmuState { raw })
    }

    /// Directional derivative of `unknowns` along the seed `known_seed`.
    pub fn get_directional_derivative(
        &mut self,
        unknowns: &[ValueReference],
        knowns: &[ValueReference],
        known_seed: &[f64],
        unknown_out: &mut [f64],
    ) -> DispatchResult<Status> {
        const OP: &str = "GetDirectionalDerivative";
        assert_eq!(knowns.len(), known_seed.len(), "knowns and seed differ in length");
        assert_eq!(unknowns.len(), unknown_out.len(), "unknowns and output differ in length");
        self.ensure_generation(OP, InterfaceGeneration::V2)?;
        let c = self.ready(OP)?;
        let status = self.call(OP, |ops| match ops {
            Operations::V2(o) => o.get_directional_derivative.map(|f| unsafe {
                f(
                    c,
                    unknowns.as_ptr(),
                    unknowns.len(),
                    knowns.as_ptr(),
                    knowns.len(),
                    known_seed.as_ptr(),
                    unknown_out.as_mut_ptr(),
                )
            }),
            Operations::V1(_) => None,
        });
        self.check(OP, status)
    }
}

impl Drop for InstanceHandle<'_> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for InstanceHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("id", &self.id)
            .field("instance_name", &self.instance_name())
            .field("state", &self.state)
            .field("poisoned", &self.poisoned)
            .field("table", &self.table)
            .finish()
    }
}

fn c_string(value: &str, what: &str) -> Result<CString, InstantiationError> {
    CString::new(value).map_err(|_| InstantiationError::InvalidArgument {
        detail: format!("{what} contains a NUL byte"),
    })
}

fn c_strings<S: AsRef<str>>(operation: &'static str, values: &[S]) -> DispatchResult<Vec<CString>> {
    values
        .iter()
        .map(|v| {
            CString::new(v.as_ref()).map_err(|_| DispatchError::InvalidArgument {
                operation,
                detail: format!("'{}' contains a NUL byte", v.as_ref().escape_debug()),
            })
        })
        .collect()
}
