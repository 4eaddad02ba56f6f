//! The model description aggregate.
//!
//! A [`ModelDescription`] is assembled once, at the end of parsing, from its
//! scalar metadata, the variable registry, and the model structure. It offers
//! read-only access afterwards.

use std::fmt;

use serde::Serialize;

use crate::dependency::{DependencyKind, DependencyTable};
use crate::registry::VariableRegistry;
use crate::variable::{Causality, Variable, VariableIndex};

/// Version of the binary call interface a model implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InterfaceGeneration {
    /// `fmiVersion="1.0"`: symbols prefixed with the model identifier.
    #[serde(rename = "1.0")]
    V1,
    /// `fmiVersion="2.0"`: fixed `fmi2*` symbol names.
    #[serde(rename = "2.0")]
    V2,
}

impl InterfaceGeneration {
    /// Parse the `fmiVersion` attribute.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "1.0" => Some(Self::V1),
            "2.0" => Some(Self::V2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
        }
    }
}

impl fmt::Display for InterfaceGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which binary variant to bind: state-exchange or step-based execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FmuKind {
    ModelExchange,
    CoSimulation,
}

impl FmuKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "me" | "model-exchange" => Some(Self::ModelExchange),
            "cs" | "co-simulation" => Some(Self::CoSimulation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelExchange => "model-exchange",
            Self::CoSimulation => "co-simulation",
        }
    }
}

impl fmt::Display for FmuKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags declared for one binary variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct KindCapabilities {
    /// Base name of the binary and, for generation one, the symbol prefix.
    pub model_identifier: String,
    pub needs_execution_tool: bool,
    pub can_handle_variable_communication_step_size: bool,
    pub can_interpolate_inputs: bool,
    pub max_output_derivative_order: u32,
    pub can_run_asynchronously: bool,
    pub can_be_instantiated_only_once_per_process: bool,
    pub can_not_use_memory_management_functions: bool,
    pub can_get_and_set_fmu_state: bool,
    pub can_serialize_fmu_state: bool,
    pub provides_directional_derivative: bool,
    pub completed_integrator_step_not_needed: bool,
}

/// Suggested experiment settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DefaultExperiment {
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub tolerance: Option<f64>,
    pub step_size: Option<f64>,
}

/// A logging category the binary understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogCategory {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Scalar metadata of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelMetadata {
    pub generation: InterfaceGeneration,
    pub model_name: String,
    /// Unique model id, passed back to the binary at instantiation.
    pub guid: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub generation_tool: Option<String>,
    pub generation_date_and_time: Option<String>,
    /// Generation one declares a single identifier on the root element.
    pub model_identifier: Option<String>,
    pub number_of_event_indicators: usize,
    /// Generation one declares the state count explicitly.
    pub number_of_continuous_states: Option<usize>,
    pub model_exchange: Option<KindCapabilities>,
    pub co_simulation: Option<KindCapabilities>,
    pub default_experiment: Option<DefaultExperiment>,
    pub log_categories: Vec<LogCategory>,
}

impl ModelMetadata {
    /// Empty metadata for the given interface generation.
    pub fn new(generation: InterfaceGeneration) -> Self {
        Self {
            generation,
            model_name: String::new(),
            guid: String::new(),
            description: None,
            author: None,
            version: None,
            generation_tool: None,
            generation_date_and_time: None,
            model_identifier: None,
            number_of_event_indicators: 0,
            number_of_continuous_states: None,
            model_exchange: None,
            co_simulation: None,
            default_experiment: None,
            log_categories: Vec::new(),
        }
    }
}

/// Row/column sets and the four structural dependency tables.
///
/// `outputs` and `derivatives` are the table rows, `inputs` and `states` the
/// columns, all as document-order variable indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelStructure {
    pub outputs: Vec<VariableIndex>,
    pub derivatives: Vec<VariableIndex>,
    pub inputs: Vec<VariableIndex>,
    pub states: Vec<VariableIndex>,
    pub derivatives_on_states: Option<DependencyTable>,
    pub derivatives_on_inputs: Option<DependencyTable>,
    pub outputs_on_states: Option<DependencyTable>,
    pub outputs_on_inputs: Option<DependencyTable>,
}

impl ModelStructure {
    /// The table of the given kind, `None` when it carries no information.
    pub fn table(&self, kind: DependencyKind) -> Option<&DependencyTable> {
        match kind {
            DependencyKind::DerivativesOnStates => self.derivatives_on_states.as_ref(),
            DependencyKind::DerivativesOnInputs => self.derivatives_on_inputs.as_ref(),
            DependencyKind::OutputsOnStates => self.outputs_on_states.as_ref(),
            DependencyKind::OutputsOnInputs => self.outputs_on_inputs.as_ref(),
        }
    }

    /// Row variables of a table kind.
    pub fn rows(&self, kind: DependencyKind) -> &[VariableIndex] {
        match kind {
            DependencyKind::DerivativesOnStates | DependencyKind::DerivativesOnInputs => {
                &self.derivatives
            }
            DependencyKind::OutputsOnStates | DependencyKind::OutputsOnInputs => &self.outputs,
        }
    }

    /// Column variables of a table kind.
    pub fn columns(&self, kind: DependencyKind) -> &[VariableIndex] {
        match kind {
            DependencyKind::DerivativesOnStates | DependencyKind::OutputsOnStates => &self.states,
            DependencyKind::DerivativesOnInputs | DependencyKind::OutputsOnInputs => &self.inputs,
        }
    }
}

/// A parsed and validated (or flagged invalid) model description.
#[derive(Debug, Clone)]
pub struct ModelDescription {
    metadata: ModelMetadata,
    variables: VariableRegistry,
    structure: ModelStructure,
    valid: bool,
}

impl ModelDescription {
    /// Assemble a description. `valid` is false when any error was reported
    /// while building it.
    pub fn new(
        metadata: ModelMetadata,
        variables: VariableRegistry,
        structure: ModelStructure,
        valid: bool,
    ) -> Self {
        Self {
            metadata,
            variables,
            structure,
            valid,
        }
    }

    /// Whether the description passed parsing and validation.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn generation(&self) -> InterfaceGeneration {
        self.metadata.generation
    }

    pub fn model_name(&self) -> &str {
        &self.metadata.model_name
    }

    pub fn guid(&self) -> &str {
        &self.metadata.guid
    }

    pub fn variables(&self) -> &VariableRegistry {
        &self.variables
    }

    pub fn structure(&self) -> &ModelStructure {
        &self.structure
    }

    /// A structural dependency table, `None` when absent or empty.
    pub fn dependencies(&self, kind: DependencyKind) -> Option<&DependencyTable> {
        self.structure.table(kind)
    }

    /// Capabilities of a binary variant, if the model provides it.
    pub fn capabilities(&self, kind: FmuKind) -> Option<&KindCapabilities> {
        match kind {
            FmuKind::ModelExchange => self.metadata.model_exchange.as_ref(),
            FmuKind::CoSimulation => self.metadata.co_simulation.as_ref(),
        }
    }

    pub fn supports(&self, kind: FmuKind) -> bool {
        self.capabilities(kind).is_some()
    }

    /// Model identifier used to locate and bind the binary of `kind`.
    pub fn model_identifier(&self, kind: FmuKind) -> Option<&str> {
        let caps = self.capabilities(kind)?;
        if !caps.model_identifier.is_empty() {
            return Some(&caps.model_identifier);
        }
        self.metadata.model_identifier.as_deref()
    }

    /// Number of continuous states, declared (generation one) or derived
    /// from the model structure.
    pub fn number_of_continuous_states(&self) -> usize {
        self.metadata
            .number_of_continuous_states
            .unwrap_or(self.structure.states.len())
    }

    pub fn number_of_event_indicators(&self) -> usize {
        self.metadata.number_of_event_indicators
    }

    /// Variables with the given causality, in document order.
    pub fn variables_with_causality(
        &self,
        causality: Causality,
    ) -> impl Iterator<Item = &Variable> + '_ {
        self.variables
            .iter()
            .map(|(_, v)| v)
            .filter(move |v| v.causality == causality)
    }

    /// Resolve a document-order index to its variable.
    pub fn variable(&self, index: VariableIndex) -> Option<&Variable> {
        self.variables.get(index)
    }

    /// Input variables, the columns of the `*OnInputs` tables.
    pub fn inputs(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.resolve(&self.structure.inputs)
    }

    /// Output variables, the rows of the `Outputs*` tables.
    pub fn outputs(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.resolve(&self.structure.outputs)
    }

    /// Continuous state variables, the columns of the `*OnStates` tables.
    pub fn states(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.resolve(&self.structure.states)
    }

    /// State derivatives, the rows of the `Derivatives*` tables.
    pub fn derivatives(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.resolve(&self.structure.derivatives)
    }

    fn resolve<'a>(&'a self, indices: &'a [VariableIndex]) -> impl Iterator<Item = &'a Variable> + 'a {
        indices.iter().filter_map(move |&i| self.variables.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{DependencyFactorKind, DependencyTableBuilder};
    use crate::variable::BaseType;

    fn sample() -> ModelDescription {
        let mut metadata = ModelMetadata::new(InterfaceGeneration::V2);
        metadata.model_name = "bouncing".into();
        metadata.guid = "{abc}".into();
        metadata.co_simulation = Some(KindCapabilities {
            model_identifier: "bouncing_cs".into(),
            ..Default::default()
        });

        let mut variables = VariableRegistry::new();
        let y = variables
            .insert(Variable::new("y", 7, BaseType::Real).with_causality(Causality::Output))
            .unwrap();
        let u = variables
            .insert(Variable::new("u", 2, BaseType::Real).with_causality(Causality::Input))
            .unwrap();

        let mut builder = DependencyTableBuilder::new();
        builder.push_row(0, [(0, DependencyFactorKind::Dependent)]);
        let structure = ModelStructure {
            outputs: vec![y],
            inputs: vec![u],
            outputs_on_inputs: builder.finish(),
            ..Default::default()
        };
        ModelDescription::new(metadata, variables, structure, true)
    }

    #[test]
    fn accessors() {
        let md = sample();
        assert!(md.is_valid());
        assert_eq!(md.generation(), InterfaceGeneration::V2);
        assert_eq!(md.model_name(), "bouncing");
        assert!(md.supports(FmuKind::CoSimulation));
        assert!(!md.supports(FmuKind::ModelExchange));
        assert_eq!(md.model_identifier(FmuKind::CoSimulation), Some("bouncing_cs"));
        assert_eq!(md.model_identifier(FmuKind::ModelExchange), None);
        assert_eq!(md.number_of_continuous_states(), 0);
        assert_eq!(md.variables_with_causality(Causality::Input).count(), 1);
        assert_eq!(md.inputs().map(|v| v.name.as_str()).collect::<Vec<_>>(), ["u"]);
        assert_eq!(md.outputs().map(|v| v.name.as_str()).collect::<Vec<_>>(), ["y"]);
        assert_eq!(md.states().count(), 0);
    }

    #[test]
    fn absent_tables_are_none() {
        let md = sample();
        assert!(md.dependencies(DependencyKind::OutputsOnInputs).is_some());
        assert!(md.dependencies(DependencyKind::OutputsOnStates).is_none());
        assert!(md.dependencies(DependencyKind::DerivativesOnStates).is_none());
        assert_eq!(md.structure().rows(DependencyKind::OutputsOnInputs).len(), 1);
        assert_eq!(md.structure().columns(DependencyKind::OutputsOnInputs).len(), 1);
    }

    #[test]
    fn generation_one_identifier_falls_back_to_root() {
        let mut metadata = ModelMetadata::new(InterfaceGeneration::V1);
        metadata.model_identifier = Some("legacy".into());
        metadata.model_exchange = Some(KindCapabilities::default());
        let md = ModelDescription::new(
            metadata,
            VariableRegistry::new(),
            ModelStructure::default(),
            true,
        );
        assert_eq!(md.model_identifier(FmuKind::ModelExchange), Some("legacy"));
        assert_eq!(InterfaceGeneration::parse("1.0"), Some(InterfaceGeneration::V1));
        assert_eq!(InterfaceGeneration::parse("3.0"), None);
    }
}
