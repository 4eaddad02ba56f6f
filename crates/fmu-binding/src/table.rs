//! Entry-point resolution and the per-generation function tables.
//!
//! A [`BindingTarget`] names what to bind: the interface generation, the
//! binary variant, the symbol prefix and the capability flags that decide
//! which optional entry points become mandatory. [`BindingTable::bind`]
//! resolves every entry point of that variant into a typed slot. The first
//! mandatory symbol that is not exported fails the bind and nothing is kept.
//!
//! Dispatch goes through [`BindingTable::dispatch`], which matches on the
//! bound [`Operations`] variant and translates the raw status.

use std::os::raw::c_void;
use std::path::Path;

use fmu_model::{FmuKind, InterfaceGeneration, KindCapabilities, ModelDescription};

use crate::abi::{v1, v2, RawStatus};
use crate::error::{BindError, Result};
use crate::image::{LibraryImage, NativeImage};
use crate::status::Status;

/// What to bind, derived from a model description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTarget {
    pub generation: InterfaceGeneration,
    pub kind: FmuKind,
    /// Symbol prefix for generation one; binary base name for both.
    pub model_identifier: String,
    pub capabilities: KindCapabilities,
}

impl BindingTarget {
    /// Binding parameters for one binary variant of `model`.
    pub fn for_model(model: &ModelDescription, kind: FmuKind) -> Result<Self> {
        let capabilities = model
            .capabilities(kind)
            .ok_or(BindError::UnsupportedKind { kind })?;
        let model_identifier = model
            .model_identifier(kind)
            .filter(|id| !id.is_empty())
            .ok_or(BindError::NoModelIdentifier { kind })?;
        Ok(Self {
            generation: model.generation(),
            kind,
            model_identifier: model_identifier.to_string(),
            capabilities: capabilities.clone(),
        })
    }

    /// Exported name of an entry point, e.g. `DoStep` becomes
    /// `bouncingBall_fmiDoStep` or `fmi2DoStep`.
    pub fn symbol_name(&self, operation: &str) -> String {
        match self.generation {
            InterfaceGeneration::V1 => format!("{}_fmi{operation}", self.model_identifier),
            InterfaceGeneration::V2 => format!("fmi2{operation}"),
        }
    }
}

struct Resolver<'a> {
    image: &'a dyn NativeImage,
    target: &'a BindingTarget,
    missing: Option<String>,
}

impl<'a> Resolver<'a> {
    fn new(image: &'a dyn NativeImage, target: &'a BindingTarget) -> Self {
        Self {
            image,
            target,
            missing: None,
        }
    }

    fn lookup(&mut self, operation: &str, mandatory: bool) -> Option<*const c_void> {
        let symbol = self.target.symbol_name(operation);
        let address = self.image.resolve(&symbol);
        if address.is_none() {
            if mandatory {
                if self.missing.is_none() {
                    self.missing = Some(symbol);
                }
            } else {
                tracing::trace!(symbol = %symbol, "optional symbol not exported");
            }
        }
        address
    }

    fn finish(self) -> Result<()> {
        match self.missing {
            Some(symbol) => Err(BindError::SymbolMissing { symbol }),
            None => Ok(()),
        }
    }
}

// Resolve an entry point into the fn-pointer type of the slot it fills.
macro_rules! entry {
    ($resolver:expr, $operation:literal, $mandatory:expr) => {
        $resolver
            .lookup($operation, $mandatory)
            // SAFETY: the exported name fixes the signature for the bound
            // generation; the slot type is that signature.
            .map(|address| unsafe { std::mem::transmute::<*const c_void, _>(address) })
    };
}

// Mandatory when `$cond` holds, otherwise not looked up at all.
macro_rules! entry_if {
    ($cond:expr, $resolver:expr, $operation:literal) => {
        if $cond {
            entry!($resolver, $operation, true)
        } else {
            None
        }
    };
}

/// Generation-one entry points. Model-exchange and co-simulation binaries
/// export different sets; slots of the other variant stay empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1Operations {
    pub get_types_platform: Option<v1::GetStringFn>,
    pub get_version: Option<v1::GetStringFn>,
    pub set_debug_logging: Option<v1::SetDebugLoggingFn>,
    pub free_instance: Option<v1::FreeInstanceFn>,
    pub terminate: Option<v1::ComponentFn>,
    pub set_real: Option<v1::SetValuesFn<v1::Real>>,
    pub set_integer: Option<v1::SetValuesFn<v1::Integer>>,
    pub set_boolean: Option<v1::SetValuesFn<v1::Boolean>>,
    pub set_string: Option<v1::SetValuesFn<v1::FmiString>>,
    pub get_real: Option<v1::GetValuesFn<v1::Real>>,
    pub get_integer: Option<v1::GetValuesFn<v1::Integer>>,
    pub get_boolean: Option<v1::GetValuesFn<v1::Boolean>>,
    pub get_string: Option<v1::GetValuesFn<v1::FmiString>>,

    // Model exchange.
    pub instantiate_model: Option<v1::InstantiateModelFn>,
    pub set_time: Option<v1::SetTimeFn>,
    pub set_continuous_states: Option<v1::SetRealsFn>,
    pub completed_integrator_step: Option<v1::CompletedIntegratorStepFn>,
    pub initialize: Option<v1::InitializeFn>,
    pub get_derivatives: Option<v1::GetRealsFn>,
    pub get_event_indicators: Option<v1::GetRealsFn>,
    pub event_update: Option<v1::EventUpdateFn>,
    pub get_continuous_states: Option<v1::GetRealsFn>,
    pub get_nominal_continuous_states: Option<v1::GetRealsFn>,
    pub get_state_value_references: Option<v1::GetStateValueReferencesFn>,

    // Co-simulation.
    pub instantiate_slave: Option<v1::InstantiateSlaveFn>,
    pub initialize_slave: Option<v1::InitializeSlaveFn>,
    pub reset_slave: Option<v1::ComponentFn>,
    pub do_step: Option<v1::DoStepFn>,
    pub cancel_step: Option<v1::ComponentFn>,
    pub get_status: Option<v1::GetStatusFn<RawStatus>>,
    pub get_real_status: Option<v1::GetStatusFn<v1::Real>>,
    pub get_integer_status: Option<v1::GetStatusFn<v1::Integer>>,
    pub get_boolean_status: Option<v1::GetStatusFn<v1::Boolean>>,
    pub get_string_status: Option<v1::GetStatusFn<v1::FmiString>>,
}

impl V1Operations {
    fn resolve(r: &mut Resolver<'_>, kind: FmuKind) -> Self {
        let me = kind == FmuKind::ModelExchange;
        let cs = kind == FmuKind::CoSimulation;
        Self {
            get_types_platform: if me {
                entry!(r, "GetModelTypesPlatform", true)
            } else {
                entry!(r, "GetTypesPlatform", true)
            },
            get_version: entry!(r, "GetVersion", true),
            set_debug_logging: entry!(r, "SetDebugLogging", true),
            free_instance: if me {
                entry!(r, "FreeModelInstance", true)
            } else {
                entry!(r, "FreeSlaveInstance", true)
            },
            terminate: if me {
                entry!(r, "Terminate", true)
            } else {
                entry!(r, "TerminateSlave", true)
            },
            set_real: entry!(r, "SetReal", true),
            set_integer: entry!(r, "SetInteger", true),
            set_boolean: entry!(r, "SetBoolean", true),
            set_string: entry!(r, "SetString", true),
            get_real: entry!(r, "GetReal", true),
            get_integer: entry!(r, "GetInteger", true),
            get_boolean: entry!(r, "GetBoolean", true),
            get_string: entry!(r, "GetString", true),

            instantiate_model: entry_if!(me, r, "InstantiateModel"),
            set_time: entry_if!(me, r, "SetTime"),
            set_continuous_states: entry_if!(me, r, "SetContinuousStates"),
            completed_integrator_step: entry_if!(me, r, "CompletedIntegratorStep"),
            initialize: entry_if!(me, r, "Initialize"),
            get_derivatives: entry_if!(me, r, "GetDerivatives"),
            get_event_indicators: entry_if!(me, r, "GetEventIndicators"),
            event_update: entry_if!(me, r, "EventUpdate"),
            get_continuous_states: entry_if!(me, r, "GetContinuousStates"),
            get_nominal_continuous_states: entry_if!(me, r, "GetNominalContinuousStates"),
            get_state_value_references: entry_if!(me, r, "GetStateValueReferences"),

            instantiate_slave: entry_if!(cs, r, "InstantiateSlave"),
            initialize_slave: entry_if!(cs, r, "InitializeSlave"),
            reset_slave: entry_if!(cs, r, "ResetSlave"),
            do_step: entry_if!(cs, r, "DoStep"),
            cancel_step: entry_if!(cs, r, "CancelStep"),
            get_status: entry_if!(cs, r, "GetStatus"),
            get_real_status: entry_if!(cs, r, "GetRealStatus"),
            get_integer_status: entry_if!(cs, r, "GetIntegerStatus"),
            get_boolean_status: entry_if!(cs, r, "GetBooleanStatus"),
            get_string_status: entry_if!(cs, r, "GetStringStatus"),
        }
    }
}

/// Generation-two entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Operations {
    pub get_types_platform: Option<v2::GetStringFn>,
    pub get_version: Option<v2::GetStringFn>,
    pub set_debug_logging: Option<v2::SetDebugLoggingFn>,
    pub instantiate: Option<v2::InstantiateFn>,
    pub free_instance: Option<v2::FreeInstanceFn>,
    pub setup_experiment: Option<v2::SetupExperimentFn>,
    pub enter_initialization_mode: Option<v2::ComponentFn>,
    pub exit_initialization_mode: Option<v2::ComponentFn>,
    pub terminate: Option<v2::ComponentFn>,
    pub reset: Option<v2::ComponentFn>,
    pub set_real: Option<v2::SetValuesFn<v2::Real>>,
    pub set_integer: Option<v2::SetValuesFn<v2::Integer>>,
    pub set_boolean: Option<v2::SetValuesFn<v2::Boolean>>,
    pub set_string: Option<v2::SetValuesFn<v2::FmiString>>,
    pub get_real: Option<v2::GetValuesFn<v2::Real>>,
    pub get_integer: Option<v2::GetValuesFn<v2::Integer>>,
    pub get_boolean: Option<v2::GetValuesFn<v2::Boolean>>,
    pub get_string: Option<v2::GetValuesFn<v2::FmiString>>,

    // State exchange and derivatives, mandatory per capability flag.
    pub get_fmu_state: Option<v2::GetFmuStateFn>,
    pub set_fmu_state: Option<v2::SetFmuStateFn>,
    pub free_fmu_state: Option<v2::FreeFmuStateFn>,
    pub serialized_fmu_state_size: Option<v2::SerializedSizeFn>,
    pub serialize_fmu_state: Option<v2::SerializeFn>,
    pub deserialize_fmu_state: Option<v2::DeserializeFn>,
    pub get_directional_derivative: Option<v2::GetDirectionalDerivativeFn>,

    // Model exchange.
    pub enter_event_mode: Option<v2::ComponentFn>,
    pub new_discrete_states: Option<v2::NewDiscreteStatesFn>,
    pub enter_continuous_time_mode: Option<v2::ComponentFn>,
    pub completed_integrator_step: Option<v2::CompletedIntegratorStepFn>,
    pub set_time: Option<v2::SetTimeFn>,
    pub set_continuous_states: Option<v2::SetRealsFn>,
    pub get_derivatives: Option<v2::GetRealsFn>,
    pub get_event_indicators: Option<v2::GetRealsFn>,
    pub get_continuous_states: Option<v2::GetRealsFn>,
    pub get_nominals_of_continuous_states: Option<v2::GetRealsFn>,

    // Co-simulation.
    pub do_step: Option<v2::DoStepFn>,
    pub cancel_step: Option<v2::ComponentFn>,
    pub get_status: Option<v2::GetStatusFn<RawStatus>>,
    pub get_real_status: Option<v2::GetStatusFn<v2::Real>>,
    pub get_integer_status: Option<v2::GetStatusFn<v2::Integer>>,
    pub get_boolean_status: Option<v2::GetStatusFn<v2::Boolean>>,
    pub get_string_status: Option<v2::GetStatusFn<v2::FmiString>>,
}

impl V2Operations {
    fn resolve(r: &mut Resolver<'_>, kind: FmuKind, caps: &KindCapabilities) -> Self {
        let me = kind == FmuKind::ModelExchange;
        let cs = kind == FmuKind::CoSimulation;
        let state = caps.can_get_and_set_fmu_state;
        let serialize = caps.can_serialize_fmu_state;
        let directional = caps.provides_directional_derivative;
        Self {
            get_types_platform: entry!(r, "GetTypesPlatform", true),
            get_version: entry!(r, "GetVersion", true),
            set_debug_logging: entry!(r, "SetDebugLogging", true),
            instantiate: entry!(r, "Instantiate", true),
            free_instance: entry!(r, "FreeInstance", true),
            setup_experiment: entry!(r, "SetupExperiment", true),
            enter_initialization_mode: entry!(r, "EnterInitializationMode", true),
            exit_initialization_mode: entry!(r, "ExitInitializationMode", true),
            terminate: entry!(r, "Terminate", true),
            reset: entry!(r, "Reset", true),
            set_real: entry!(r, "SetReal", true),
            set_integer: entry!(r, "SetInteger", true),
            set_boolean: entry!(r, "SetBoolean", true),
            set_string: entry!(r, "SetString", true),
            get_real: entry!(r, "GetReal", true),
            get_integer: entry!(r, "GetInteger", true),
            get_boolean: entry!(r, "GetBoolean", true),
            get_string: entry!(r, "GetString", true),

            get_fmu_state: entry!(r, "GetFMUstate", state),
            set_fmu_state: entry!(r, "SetFMUstate", state),
            free_fmu_state: entry!(r, "FreeFMUstate", state),
            serialized_fmu_state_size: entry!(r, "SerializedFMUstateSize", serialize),
            serialize_fmu_state: entry!(r, "SerializeFMUstate", serialize),
            deserialize_fmu_state: entry!(r, "DeSerializeFMUstate", serialize),
            get_directional_derivative: entry!(r, "GetDirectionalDerivative", directional),

            enter_event_mode: entry_if!(me, r, "EnterEventMode"),
            new_discrete_states: entry_if!(me, r, "NewDiscreteStates"),
            enter_continuous_time_mode: entry_if!(me, r, "EnterContinuousTimeMode"),
            completed_integrator_step: entry_if!(me, r, "CompletedIntegratorStep"),
            set_time: entry_if!(me, r, "SetTime"),
            set_continuous_states: entry_if!(me, r, "SetContinuousStates"),
            get_derivatives: entry_if!(me, r, "GetDerivatives"),
            get_event_indicators: entry_if!(me, r, "GetEventIndicators"),
            get_continuous_states: entry_if!(me, r, "GetContinuousStates"),
            get_nominals_of_continuous_states: entry_if!(me, r, "GetNominalsOfContinuousStates"),

            do_step: entry_if!(cs, r, "DoStep"),
            cancel_step: entry_if!(cs, r, "CancelStep"),
            get_status: entry_if!(cs, r, "GetStatus"),
            get_real_status: entry_if!(cs, r, "GetRealStatus"),
            get_integer_status: entry_if!(cs, r, "GetIntegerStatus"),
            get_boolean_status: entry_if!(cs, r, "GetBooleanStatus"),
            get_string_status: entry_if!(cs, r, "GetStringStatus"),
        }
    }
}

/// Resolved entry points of the bound generation.
#[derive(Debug, Clone, Copy)]
pub enum Operations {
    V1(V1Operations),
    V2(V2Operations),
}

impl Operations {
    pub fn generation(&self) -> InterfaceGeneration {
        match self {
            Self::V1(_) => InterfaceGeneration::V1,
            Self::V2(_) => InterfaceGeneration::V2,
        }
    }
}

/// A loaded binary and its resolved entry points.
pub struct BindingTable {
    target: BindingTarget,
    image: Option<Box<dyn NativeImage>>,
    operations: Option<Operations>,
}

impl BindingTable {
    /// An unbound table for `target`.
    pub fn new(target: BindingTarget) -> Self {
        Self {
            target,
            image: None,
            operations: None,
        }
    }

    /// Load the shared library at `path` and bind it.
    pub fn load(path: &Path, target: BindingTarget) -> Result<Self> {
        let mut table = Self::new(target);
        table.bind(Box::new(LibraryImage::load(path)?))?;
        Ok(table)
    }

    /// Resolve every entry point of the bound variant from `image`.
    ///
    /// On failure the image is dropped and the table stays unbound.
    pub fn bind(&mut self, image: Box<dyn NativeImage>) -> Result<()> {
        if self.image.is_some() {
            return Err(BindError::AlreadyBound);
        }

        let mut resolver = Resolver::new(image.as_ref(), &self.target);
        let operations = match self.target.generation {
            InterfaceGeneration::V1 => {
                Operations::V1(V1Operations::resolve(&mut resolver, self.target.kind))
            }
            InterfaceGeneration::V2 => Operations::V2(V2Operations::resolve(
                &mut resolver,
                self.target.kind,
                &self.target.capabilities,
            )),
        };
        if let Err(e) = resolver.finish() {
            tracing::warn!(
                location = %image.location().display(),
                error = %e,
                "binding failed"
            );
            image.unload();
            return Err(e);
        }

        tracing::info!(
            location = %image.location().display(),
            generation = %self.target.generation,
            kind = %self.target.kind,
            "bound binary"
        );
        self.image = Some(image);
        self.operations = Some(operations);
        Ok(())
    }

    /// Release the image. Safe to call on an unbound table.
    pub fn unload(&mut self) {
        self.operations = None;
        if let Some(image) = self.image.take() {
            tracing::debug!(location = %image.location().display(), "unloading binary");
            image.unload();
        }
    }

    pub fn is_bound(&self) -> bool {
        self.operations.is_some()
    }

    pub fn target(&self) -> &BindingTarget {
        &self.target
    }

    pub fn generation(&self) -> InterfaceGeneration {
        self.target.generation
    }

    pub fn kind(&self) -> FmuKind {
        self.target.kind
    }

    pub fn location(&self) -> Option<&Path> {
        self.image.as_ref().map(|image| image.location())
    }

    pub fn operations(&self) -> Option<&Operations> {
        self.operations.as_ref()
    }

    /// Run one raw call against the bound entry points.
    ///
    /// `call` returns `None` when the slot it needs is empty. That and an
    /// unbound table both yield `Status::Error` with a logged diagnostic.
    pub fn dispatch(
        &self,
        operation: &'static str,
        call: impl FnOnce(&Operations) -> Option<RawStatus>,
    ) -> Status {
        let Some(operations) = self.operations.as_ref() else {
            tracing::error!(operation, "call on a binding table with no image loaded");
            return Status::Error;
        };
        match call(operations) {
            Some(raw) => Status::from_raw(raw),
            None => {
                tracing::error!(
                    operation,
                    generation = %self.target.generation,
                    kind = %self.target.kind,
                    "entry point not available in the bound binary"
                );
                Status::Error
            }
        }
    }
}

impl Drop for BindingTable {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingTable")
            .field("target", &self.target)
            .field("location", &self.location())
            .field("bound", &self.is_bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{self, FakeImage};

    fn v2_target(kind: FmuKind) -> BindingTarget {
        BindingTarget {
            generation: InterfaceGeneration::V2,
            kind,
            model_identifier: "fake".into(),
            capabilities: KindCapabilities::default(),
        }
    }

    #[test]
    fn symbol_names_per_generation() {
        let mut target = v2_target(FmuKind::CoSimulation);
        assert_eq!(target.symbol_name("DoStep"), "fmi2DoStep");
        target.generation = InterfaceGeneration::V1;
        target.model_identifier = "bouncingBall".into();
        assert_eq!(target.symbol_name("DoStep"), "bouncingBall_fmiDoStep");
    }

    #[test]
    fn spec_from_model() {
        let md = fake::model_description(InterfaceGeneration::V2);
        let target = BindingTarget::for_model(&md, FmuKind::CoSimulation).unwrap();
        assert_eq!(target.model_identifier, "fake");

        assert!(BindingTarget::for_model(&md, FmuKind::ModelExchange).is_ok());

        let md = fake::model_description_cs_only(InterfaceGeneration::V2);
        let err = BindingTarget::for_model(&md, FmuKind::ModelExchange).unwrap_err();
        assert!(matches!(err, BindError::UnsupportedKind { .. }));
    }

    #[test]
    fn binds_complete_v2_binary() {
        let mut table = BindingTable::new(v2_target(FmuKind::CoSimulation));
        table.bind(Box::new(FakeImage::v2())).unwrap();
        assert!(table.is_bound());
        let Some(Operations::V2(ops)) = table.operations() else {
            panic!("expected generation two operations");
        };
        assert!(ops.do_step.is_some());
        // Model-exchange slots are not resolved for a co-simulation bind.
        assert!(ops.set_time.is_none());
    }

    #[test]
    fn missing_step_symbol_fails_bind() {
        let mut table = BindingTable::new(v2_target(FmuKind::CoSimulation));
        let image = FakeImage::v2().without("fmi2DoStep");
        let err = table.bind(Box::new(image)).unwrap_err();
        match err {
            BindError::SymbolMissing { symbol } => assert_eq!(symbol, "fmi2DoStep"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!table.is_bound());
        assert!(table.operations().is_none());
        assert_eq!(table.dispatch("DoStep", |_| Some(0)), Status::Error);
    }

    #[test]
    fn capability_flags_make_state_symbols_mandatory() {
        let mut target = v2_target(FmuKind::CoSimulation);
        let image = FakeImage::v2().without("fmi2GetFMUstate");

        // Without the capability the symbol is optional.
        let mut table = BindingTable::new(target.clone());
        table.bind(Box::new(image.clone())).unwrap();

        target.capabilities.can_get_and_set_fmu_state = true;
        let mut table = BindingTable::new(target);
        let err = table.bind(Box::new(image)).unwrap_err();
        assert!(matches!(err, BindError::SymbolMissing { symbol } if symbol == "fmi2GetFMUstate"));
    }

    #[test]
    fn second_bind_is_rejected() {
        let mut table = BindingTable::new(v2_target(FmuKind::CoSimulation));
        table.bind(Box::new(FakeImage::v2())).unwrap();
        let err = table.bind(Box::new(FakeImage::v2())).unwrap_err();
        assert!(matches!(err, BindError::AlreadyBound));
    }

    #[test]
    fn unload_is_idempotent() {
        let mut table = BindingTable::new(v2_target(FmuKind::CoSimulation));
        table.unload();
        table.bind(Box::new(FakeImage::v2())).unwrap();
        table.unload();
        table.unload();
        assert!(!table.is_bound());
        assert!(table.location().is_none());
    }

    #[test]
    fn dispatch_translates_status() {
        let mut table = BindingTable::new(v2_target(FmuKind::CoSimulation));
        assert_eq!(table.dispatch("Reset", |_| Some(0)), Status::Error);

        table.bind(Box::new(FakeImage::v2())).unwrap();
        assert_eq!(table.dispatch("Reset", |_| Some(1)), Status::Warning);
        assert_eq!(table.dispatch("SetTime", |_| None), Status::Error);
    }

    #[test]
    fn v1_slave_binds_prefixed_symbols() {
        let target = BindingTarget {
            generation: InterfaceGeneration::V1,
            kind: FmuKind::CoSimulation,
            model_identifier: "fake".into(),
            capabilities: KindCapabilities::default(),
        };
        let mut table = BindingTable::new(target.clone());
        table.bind(Box::new(FakeImage::v1_slave("fake"))).unwrap();
        assert_eq!(table.operations().unwrap().generation(), InterfaceGeneration::V1);

        // Wrong prefix: nothing resolves.
        let mut table = BindingTable::new(target);
        let err = table.bind(Box::new(FakeImage::v1_slave("other"))).unwrap_err();
        assert!(matches!(err, BindError::SymbolMissing { symbol } if symbol == "fake_fmiGetTypesPlatform"));
    }

    #[test]
    fn load_missing_library() {
        let err = BindingTable::load(
            Path::new("/nonexistent/binaries/linux64/fake.so"),
            v2_target(FmuKind::CoSimulation),
        )
        .unwrap_err();
        assert!(matches!(err, BindError::ImageNotFound { .. }));
    }
}
