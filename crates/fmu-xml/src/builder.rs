//! Event-driven construction of a [`ModelDescription`].
//!
//! [`ModelBuilder`] is fed one [`XmlEvent`] at a time and reports every
//! problem to a [`DiagnosticSink`] instead of stopping. References that may
//! point forward in the document (derivative targets, direct dependencies,
//! structure columns) are recorded raw and resolved by the closing pass in
//! [`ModelBuilder::finish`].

use std::str::FromStr;

use fmu_model::{
    AliasKind, BaseType, Causality, DefaultExperiment, DependencyFactorKind, DependencyTable,
    DependencyTableBuilder, Diagnostic, DiagnosticSink, InterfaceGeneration, KindCapabilities,
    LogCategory, ModelDescription, ModelMetadata, ModelStructure, ValueReference, Variability,
    Variable, VariableIndex, VariableRegistry,
};

use crate::event::{Attribute, XmlEvent};

const ROOT: &str = "fmiModelDescription";
const SCALAR_VARIABLE: &str = "ScalarVariable";
const UNKNOWN: &str = "Unknown";

/// A `ScalarVariable` whose children have not all been seen yet.
#[derive(Debug)]
struct PendingVariable {
    name: String,
    value_reference: ValueReference,
    causality: Causality,
    variability: Variability,
    alias_kind: AliasKind,
    explicit_alias: bool,
    description: Option<String>,
    base_type: Option<BaseType>,
    declared_type: Option<String>,
    start: Option<String>,
    unit: Option<String>,
    /// 1-based position of the state this variable is the derivative of.
    derivative: Option<usize>,
    direct_dependency: Option<Vec<String>>,
    /// A parse error was reported; the variable is not inserted.
    rejected: bool,
}

/// Which `ModelStructure` list an `Unknown` belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outputs,
    Derivatives,
}

impl Section {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Outputs => "Outputs",
            Self::Derivatives => "Derivatives",
        }
    }
}

/// One `<Unknown>` row with its dependencies as variable indices.
#[derive(Debug)]
struct UnknownRow {
    variable: VariableIndex,
    dependencies: Vec<(VariableIndex, DependencyFactorKind)>,
}

/// Builds a [`ModelDescription`] from XML events.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    metadata: Option<ModelMetadata>,
    registry: VariableRegistry,
    /// Names of the currently open elements, outermost first.
    path: Vec<String>,
    pending: Option<PendingVariable>,
    text: String,
    /// Registry index of each `ScalarVariable` in document order; `None`
    /// for variables that were rejected.
    positions: Vec<Option<VariableIndex>>,
    derivatives: Vec<(VariableIndex, usize)>,
    direct_dependencies: Vec<(VariableIndex, Vec<String>)>,
    output_rows: Option<Vec<UnknownRow>>,
    derivative_rows: Option<Vec<UnknownRow>>,
    errors: usize,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of errors reported so far.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// Consume one event.
    pub fn handle(&mut self, event: &XmlEvent, sink: &mut dyn DiagnosticSink) {
        match event {
            XmlEvent::StartElement { name, attributes } => {
                self.start_element(name, attributes, sink);
                self.path.push(name.clone());
            }
            XmlEvent::EndElement { name } => {
                self.path.pop();
                self.end_element(name, sink);
            }
            XmlEvent::Text(text) => {
                if self.path.last().map(String::as_str) == Some("Name") {
                    self.text.push_str(text);
                }
            }
        }
    }

    /// Run the closing validation pass and freeze the description.
    ///
    /// The returned description is flagged invalid if any error was
    /// reported, during event handling or here.
    pub fn finish(mut self, sink: &mut dyn DiagnosticSink) -> ModelDescription {
        if self.metadata.is_none() && self.errors == 0 {
            self.report(
                sink,
                Diagnostic::parse_error(ROOT, "document has no fmiModelDescription root element"),
            );
        }
        if let Some(pending) = self.pending.take() {
            self.report(
                sink,
                Diagnostic::parse_error(
                    SCALAR_VARIABLE,
                    format!("variable '{}' is never closed", pending.name),
                ),
            );
        }

        let mut diagnostics = Vec::new();
        self.resolve_derivatives(&mut diagnostics);
        self.check_aliases(&mut diagnostics);
        self.resolve_direct_dependencies(&mut diagnostics);
        let structure = self.build_structure(&mut diagnostics);
        for diagnostic in diagnostics {
            self.report(sink, diagnostic);
        }

        let metadata = self
            .metadata
            .take()
            .unwrap_or_else(|| ModelMetadata::new(InterfaceGeneration::V2));
        let valid = self.errors == 0;
        if valid {
            tracing::debug!(
                model = %metadata.model_name,
                variables = self.registry.len(),
                outputs = structure.outputs.len(),
                states = structure.states.len(),
                "model description built"
            );
        } else {
            tracing::warn!(errors = self.errors, "model description is invalid");
        }
        ModelDescription::new(metadata, self.registry, structure, valid)
    }

    fn report(&mut self, sink: &mut dyn DiagnosticSink, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.errors += 1;
        }
        sink.report(diagnostic);
    }

    /// Unwrap an attribute result, reporting the diagnostic if there is one.
    fn accept<T>(
        &mut self,
        sink: &mut dyn DiagnosticSink,
        result: Result<Option<T>, Diagnostic>,
    ) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(diagnostic) => {
                self.report(sink, diagnostic);
                None
            }
        }
    }

    fn generation(&self) -> InterfaceGeneration {
        self.metadata
            .as_ref()
            .map(|m| m.generation)
            .unwrap_or(InterfaceGeneration::V2)
    }

    fn start_element(&mut self, name: &str, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let parent = self.path.last().cloned();
        let generation = self.generation();
        match (parent.as_deref(), name) {
            (None, ROOT) => self.root(attributes, sink),
            (None, other) => self.report(
                sink,
                Diagnostic::parse_error(other, "expected fmiModelDescription as the root element"),
            ),
            // Nothing below a rejected root is interpreted.
            _ if self.metadata.is_none() => {}
            (Some(ROOT), "ModelExchange" | "CoSimulation")
                if generation == InterfaceGeneration::V2 =>
            {
                self.kind_capabilities(name, attributes, sink)
            }
            (Some(ROOT), "DefaultExperiment") => self.default_experiment(attributes, sink),
            (Some("LogCategories"), "Category") => self.log_category(attributes, sink),
            (Some("Implementation"), "CoSimulation_StandAlone" | "CoSimulation_Tool") => {
                self.implementation(name)
            }
            (Some("CoSimulation_StandAlone" | "CoSimulation_Tool"), "Capabilities") => {
                self.implementation_capabilities(attributes, sink)
            }
            (Some("ModelVariables"), SCALAR_VARIABLE) => self.begin_variable(attributes, sink),
            (Some(SCALAR_VARIABLE), "DirectDependency") => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.direct_dependency.get_or_insert_with(Vec::new);
                }
            }
            (Some(SCALAR_VARIABLE), type_name) if BaseType::from_element(type_name).is_some() => {
                self.variable_type(type_name, attributes, sink)
            }
            (Some("DirectDependency"), "Name") => self.text.clear(),
            (Some("ModelStructure"), "Outputs") => {
                self.output_rows.get_or_insert_with(Vec::new);
            }
            (Some("ModelStructure"), "Derivatives") => {
                self.derivative_rows.get_or_insert_with(Vec::new);
            }
            (Some("Outputs"), UNKNOWN) => self.unknown(Section::Outputs, attributes, sink),
            (Some("Derivatives"), UNKNOWN) => self.unknown(Section::Derivatives, attributes, sink),
            (parent, other) => {
                tracing::trace!(element = other, parent = ?parent, "ignoring element");
            }
        }
    }

    fn end_element(&mut self, name: &str, sink: &mut dyn DiagnosticSink) {
        match name {
            SCALAR_VARIABLE => self.finish_variable(sink),
            "Name" if self.path.last().map(String::as_str) == Some("DirectDependency") => {
                let text = std::mem::take(&mut self.text);
                if let Some(deps) = self
                    .pending
                    .as_mut()
                    .and_then(|p| p.direct_dependency.as_mut())
                {
                    deps.push(text.trim().to_string());
                }
            }
            _ => {}
        }
    }

    fn root(&mut self, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let Some(version) = attr(attributes, "fmiVersion") else {
            self.report(
                sink,
                Diagnostic::parse_error(ROOT, "missing fmiVersion").with_attribute("fmiVersion"),
            );
            return;
        };
        let Some(generation) = InterfaceGeneration::parse(version) else {
            self.report(
                sink,
                Diagnostic::parse_error(ROOT, format!("unsupported fmiVersion '{version}'"))
                    .with_attribute("fmiVersion"),
            );
            return;
        };

        let mut metadata = ModelMetadata::new(generation);
        for required in ["modelName", "guid"] {
            if attr(attributes, required).is_none() {
                self.report(
                    sink,
                    Diagnostic::parse_error(ROOT, format!("missing required attribute {required}"))
                        .with_attribute(required),
                );
            }
        }
        metadata.model_name = attr(attributes, "modelName").unwrap_or_default().to_string();
        metadata.guid = attr(attributes, "guid").unwrap_or_default().to_string();
        metadata.description = attr(attributes, "description").map(str::to_string);
        metadata.author = attr(attributes, "author").map(str::to_string);
        metadata.version = attr(attributes, "version").map(str::to_string);
        metadata.generation_tool = attr(attributes, "generationTool").map(str::to_string);
        metadata.generation_date_and_time =
            attr(attributes, "generationDateAndTime").map(str::to_string);
        metadata.number_of_event_indicators = self
            .accept(sink, number(ROOT, attributes, "numberOfEventIndicators"))
            .unwrap_or(0);

        if generation == InterfaceGeneration::V1 {
            match attr(attributes, "modelIdentifier") {
                Some(id) => {
                    metadata.model_identifier = Some(id.to_string());
                    // Model exchange unless an Implementation element says otherwise.
                    metadata.model_exchange = Some(KindCapabilities {
                        model_identifier: id.to_string(),
                        ..Default::default()
                    });
                }
                None => self.report(
                    sink,
                    Diagnostic::parse_error(ROOT, "missing required attribute modelIdentifier")
                        .with_attribute("modelIdentifier"),
                ),
            }
            metadata.number_of_continuous_states =
                self.accept(sink, number(ROOT, attributes, "numberOfContinuousStates"));
        }

        tracing::debug!(
            model = %metadata.model_name,
            generation = %generation,
            "parsing model description"
        );
        self.metadata = Some(metadata);
    }

    fn kind_capabilities(&mut self, element: &str, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let mut caps = KindCapabilities::default();
        let diagnostics = apply_capabilities(&mut caps, element, attributes);
        for diagnostic in diagnostics {
            self.report(sink, diagnostic);
        }
        if caps.model_identifier.is_empty() {
            self.report(
                sink,
                Diagnostic::parse_error(element, "missing required attribute modelIdentifier")
                    .with_attribute("modelIdentifier"),
            );
        }
        if let Some(metadata) = self.metadata.as_mut() {
            if element == "ModelExchange" {
                metadata.model_exchange = Some(caps);
            } else {
                metadata.co_simulation = Some(caps);
            }
        }
    }

    fn implementation(&mut self, element: &str) {
        if let Some(metadata) = self.metadata.as_mut() {
            let model_identifier = metadata.model_identifier.clone().unwrap_or_default();
            metadata.model_exchange = None;
            metadata.co_simulation = Some(KindCapabilities {
                model_identifier,
                needs_execution_tool: element == "CoSimulation_Tool",
                ..Default::default()
            });
        }
    }

    fn implementation_capabilities(&mut self, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let mut diagnostics = Vec::new();
        if let Some(caps) = self
            .metadata
            .as_mut()
            .and_then(|m| m.co_simulation.as_mut())
        {
            diagnostics = apply_capabilities(caps, "Capabilities", attributes);
        }
        for diagnostic in diagnostics {
            self.report(sink, diagnostic);
        }
    }

    fn default_experiment(&mut self, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        const ELEMENT: &str = "DefaultExperiment";
        let experiment = DefaultExperiment {
            start_time: self.accept(sink, number(ELEMENT, attributes, "startTime")),
            stop_time: self.accept(sink, number(ELEMENT, attributes, "stopTime")),
            tolerance: self.accept(sink, number(ELEMENT, attributes, "tolerance")),
            step_size: self.accept(sink, number(ELEMENT, attributes, "stepSize")),
        };
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.default_experiment = Some(experiment);
        }
    }

    fn log_category(&mut self, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let Some(name) = attr(attributes, "name") else {
            self.report(
                sink,
                Diagnostic::parse_error("Category", "missing required attribute name")
                    .with_attribute("name"),
            );
            return;
        };
        let category = LogCategory {
            name: name.to_string(),
            description: attr(attributes, "description").map(str::to_string),
        };
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.log_categories.push(category);
        }
    }

    fn begin_variable(&mut self, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let generation = self.generation();
        let mut rejected = false;

        let name = match attr(attributes, "name") {
            Some(name) => name.to_string(),
            None => {
                rejected = true;
                self.report(
                    sink,
                    Diagnostic::parse_error(SCALAR_VARIABLE, "missing required attribute name")
                        .with_attribute("name"),
                );
                String::new()
            }
        };

        let value_reference = match number::<ValueReference>(SCALAR_VARIABLE, attributes, "valueReference") {
            Ok(Some(vr)) => vr,
            Ok(None) => {
                rejected = true;
                self.report(
                    sink,
                    Diagnostic::parse_error(
                        SCALAR_VARIABLE,
                        format!("variable '{name}' has no valueReference"),
                    )
                    .with_attribute("valueReference"),
                );
                0
            }
            Err(diagnostic) => {
                rejected = true;
                self.report(sink, diagnostic);
                0
            }
        };

        let causality = match enumerated(&name, attributes, "causality", |s| {
            parse_causality(generation, s)
        }) {
            Ok(value) => value.unwrap_or(Causality::Local),
            Err(diagnostic) => {
                rejected = true;
                self.report(sink, diagnostic);
                Causality::Local
            }
        };

        let variability = match enumerated(&name, attributes, "variability", |s| {
            parse_variability(generation, s)
        }) {
            Ok(value) => value.unwrap_or(Variability::Continuous),
            Err(diagnostic) => {
                rejected = true;
                self.report(sink, diagnostic);
                Variability::Continuous
            }
        };

        let (alias_kind, explicit_alias) =
            match enumerated(&name, attributes, "alias", AliasKind::parse) {
                Ok(Some(kind)) => (kind, true),
                Ok(None) => (AliasKind::NoAlias, false),
                Err(diagnostic) => {
                    rejected = true;
                    self.report(sink, diagnostic);
                    (AliasKind::NoAlias, true)
                }
            };

        self.pending = Some(PendingVariable {
            name,
            value_reference,
            causality,
            variability,
            alias_kind,
            explicit_alias,
            description: attr(attributes, "description").map(str::to_string),
            base_type: None,
            declared_type: None,
            start: None,
            unit: None,
            derivative: None,
            direct_dependency: None,
            rejected,
        });
    }

    fn variable_type(&mut self, type_name: &str, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        if pending.base_type.is_some() {
            pending.rejected = true;
            self.report(
                sink,
                Diagnostic::parse_error(
                    type_name,
                    format!("variable '{}' has more than one type element", pending.name),
                ),
            );
        } else {
            pending.base_type = BaseType::from_element(type_name);
            pending.declared_type = attr(attributes, "declaredType").map(str::to_string);
            pending.start = attr(attributes, "start").map(str::to_string);
            pending.unit = attr(attributes, "unit").map(str::to_string);
            match number::<usize>(type_name, attributes, "derivative") {
                Ok(Some(0)) => {
                    pending.rejected = true;
                    self.report(
                        sink,
                        Diagnostic::parse_error(
                            type_name,
                            format!("variable '{}': derivative index is 1-based", pending.name),
                        )
                        .with_attribute("derivative"),
                    );
                }
                Ok(derivative) => pending.derivative = derivative,
                Err(diagnostic) => {
                    pending.rejected = true;
                    self.report(sink, diagnostic);
                }
            }
        }
        self.pending = Some(pending);
    }

    fn finish_variable(&mut self, sink: &mut dyn DiagnosticSink) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let index = self.insert_variable(pending, sink);
        self.positions.push(index);
    }

    fn insert_variable(
        &mut self,
        pending: PendingVariable,
        sink: &mut dyn DiagnosticSink,
    ) -> Option<VariableIndex> {
        let Some(base_type) = pending.base_type else {
            self.report(
                sink,
                Diagnostic::parse_error(
                    SCALAR_VARIABLE,
                    format!("variable '{}' has no type element", pending.name),
                ),
            );
            return None;
        };
        if pending.rejected {
            return None;
        }

        let mut alias_kind = pending.alias_kind;
        if self.generation() == InterfaceGeneration::V2
            && !pending.explicit_alias
            && self
                .registry
                .canonical(base_type, pending.value_reference)
                .is_some()
        {
            tracing::trace!(
                variable = %pending.name,
                value_reference = pending.value_reference,
                "shared value reference, recording as alias"
            );
            alias_kind = AliasKind::Alias;
        }

        let variable = Variable {
            name: pending.name,
            value_reference: pending.value_reference,
            base_type,
            causality: pending.causality,
            variability: pending.variability,
            alias_kind,
            description: pending.description,
            declared_type: pending.declared_type,
            start: pending.start,
            unit: pending.unit,
            derivative_of: None,
            direct_dependencies: None,
        };
        match self.registry.insert(variable) {
            Ok(index) => {
                if let Some(derivative) = pending.derivative {
                    self.derivatives.push((index, derivative));
                }
                if let Some(names) = pending.direct_dependency {
                    self.direct_dependencies.push((index, names));
                }
                Some(index)
            }
            Err(e) => {
                self.report(
                    sink,
                    Diagnostic::validation_error(e.to_string()).with_element(SCALAR_VARIABLE),
                );
                None
            }
        }
    }

    fn unknown(&mut self, section: Section, attributes: &[Attribute], sink: &mut dyn DiagnosticSink) {
        let index = match number::<usize>(UNKNOWN, attributes, "index") {
            Ok(Some(index)) => index,
            Ok(None) => {
                self.report(
                    sink,
                    Diagnostic::parse_error(
                        UNKNOWN,
                        format!("{} entry without index", section.as_str()),
                    )
                    .with_attribute("index"),
                );
                return;
            }
            Err(diagnostic) => {
                self.report(sink, diagnostic);
                return;
            }
        };

        let variable = match self.position(index) {
            Ok(Some(variable)) => variable,
            Ok(None) => return,
            Err(count) => {
                self.report(
                    sink,
                    Diagnostic::validation_error(format!(
                        "{} index {index} is out of range (model has {count} variables)",
                        section.as_str()
                    ))
                    .with_element(UNKNOWN)
                    .with_attribute("index"),
                );
                return;
            }
        };

        let dependencies = match list::<usize>(attributes, "dependencies", |s| s.parse().ok()) {
            Ok(deps) => deps,
            Err(token) => {
                self.report(
                    sink,
                    Diagnostic::parse_error(UNKNOWN, format!("invalid dependency index '{token}'"))
                        .with_attribute("dependencies"),
                );
                return;
            }
        };
        let kinds = match list(attributes, "dependenciesKind", DependencyFactorKind::parse) {
            Ok(kinds) => kinds,
            Err(token) => {
                self.report(
                    sink,
                    Diagnostic::parse_error(UNKNOWN, format!("unknown dependency kind '{token}'"))
                        .with_attribute("dependenciesKind"),
                );
                return;
            }
        };

        let dependencies = dependencies.unwrap_or_default();
        let kinds = match kinds {
            Some(kinds) if kinds.len() != dependencies.len() => {
                self.report(
                    sink,
                    Diagnostic::parse_error(
                        UNKNOWN,
                        format!(
                            "{} index {index}: {} dependencies but {} dependency kinds",
                            section.as_str(),
                            dependencies.len(),
                            kinds.len()
                        ),
                    )
                    .with_attribute("dependenciesKind"),
                );
                return;
            }
            Some(kinds) => kinds,
            None => vec![DependencyFactorKind::Dependent; dependencies.len()],
        };

        let mut row = UnknownRow {
            variable,
            dependencies: Vec::with_capacity(dependencies.len()),
        };
        for (dependency, kind) in dependencies.into_iter().zip(kinds) {
            match self.position(dependency) {
                Ok(Some(column)) => row.dependencies.push((column, kind)),
                Ok(None) => {}
                Err(count) => {
                    self.report(
                        sink,
                        Diagnostic::validation_error(format!(
                            "{} index {index}: dependency {dependency} is out of range \
                             (model has {count} variables)",
                            section.as_str()
                        ))
                        .with_element(UNKNOWN)
                        .with_attribute("dependencies"),
                    );
                    return;
                }
            }
        }

        let rows = match section {
            Section::Outputs => self.output_rows.get_or_insert_with(Vec::new),
            Section::Derivatives => self.derivative_rows.get_or_insert_with(Vec::new),
        };
        rows.push(row);
    }

    /// Resolve a 1-based document position. `Ok(None)` for a variable that
    /// was rejected earlier, `Err(count)` when out of range.
    fn position(&self, one_based: usize) -> Result<Option<VariableIndex>, usize> {
        one_based
            .checked_sub(1)
            .and_then(|i| self.positions.get(i))
            .copied()
            .ok_or(self.positions.len())
    }

    fn resolve_derivatives(&mut self, diagnostics: &mut Vec<Diagnostic>) {
        for (index, derivative) in std::mem::take(&mut self.derivatives) {
            let name = self.variable_name(index);
            match self.position(derivative) {
                Ok(Some(state)) => {
                    let is_real = self
                        .registry
                        .get(state)
                        .is_some_and(|v| v.base_type == BaseType::Real);
                    if !is_real {
                        diagnostics.push(
                            Diagnostic::validation_error(format!(
                                "variable '{name}' is the derivative of '{}', which is not a Real",
                                self.variable_name(state)
                            ))
                            .with_element("Real")
                            .with_attribute("derivative"),
                        );
                    }
                    self.registry.set_derivative_of(index, state);
                }
                Ok(None) => {}
                Err(count) => diagnostics.push(
                    Diagnostic::validation_error(format!(
                        "variable '{name}' declares derivative {derivative}, \
                         out of range (model has {count} variables)"
                    ))
                    .with_element("Real")
                    .with_attribute("derivative"),
                ),
            }
        }
    }

    fn check_aliases(&self, diagnostics: &mut Vec<Diagnostic>) {
        for alias in self.registry.unresolved_aliases() {
            diagnostics.push(
                Diagnostic::validation_error(format!(
                    "{} '{}' has no canonical {} variable with valueReference {}",
                    alias.alias_kind, alias.name, alias.base_type, alias.value_reference
                ))
                .with_element(SCALAR_VARIABLE),
            );
        }
    }

    fn resolve_direct_dependencies(&mut self, diagnostics: &mut Vec<Diagnostic>) {
        for (index, names) in std::mem::take(&mut self.direct_dependencies) {
            let owner = self.variable_name(index);
            let mut resolved = Vec::with_capacity(names.len());
            for name in names {
                match self.registry.index_of(&name) {
                    Some(dep) if self.registry.get(dep).map(|v| v.causality) == Some(Causality::Input) => {
                        resolved.push(dep)
                    }
                    Some(_) => diagnostics.push(
                        Diagnostic::validation_error(format!(
                            "variable '{owner}' has a direct dependency on '{name}', which is not an input"
                        ))
                        .with_element("DirectDependency"),
                    ),
                    None => diagnostics.push(
                        Diagnostic::validation_error(format!(
                            "variable '{owner}' has a direct dependency on unknown variable '{name}'"
                        ))
                        .with_element("DirectDependency"),
                    ),
                }
            }
            self.registry.set_direct_dependencies(index, resolved);
        }
    }

    fn build_structure(&self, diagnostics: &mut Vec<Diagnostic>) -> ModelStructure {
        let registry = &self.registry;
        let with_causality = |causality: Causality| -> Vec<VariableIndex> {
            registry
                .iter()
                .filter(|(_, v)| v.causality == causality)
                .map(|(i, _)| i)
                .collect()
        };

        let inputs = with_causality(Causality::Input);
        let outputs = match &self.output_rows {
            Some(rows) => rows.iter().map(|r| r.variable).collect(),
            None => with_causality(Causality::Output),
        };
        let derivatives: Vec<VariableIndex> = match &self.derivative_rows {
            Some(rows) => rows.iter().map(|r| r.variable).collect(),
            None => registry
                .iter()
                .filter(|(_, v)| v.derivative_of.is_some())
                .map(|(i, _)| i)
                .collect(),
        };
        let states: Vec<VariableIndex> = derivatives
            .iter()
            .filter_map(|&d| registry.get(d).and_then(|v| v.derivative_of))
            .collect();

        for &output in &outputs {
            if let Some(v) = registry.get(output) {
                if v.causality != Causality::Output {
                    diagnostics.push(
                        Diagnostic::validation_error(format!(
                            "Outputs lists '{}', whose causality is {}",
                            v.name, v.causality
                        ))
                        .with_element(UNKNOWN),
                    );
                }
            }
        }
        for &derivative in &derivatives {
            if let Some(v) = registry.get(derivative) {
                if v.derivative_of.is_none() {
                    diagnostics.push(
                        Diagnostic::validation_error(format!(
                            "Derivatives lists '{}', which declares no derivative attribute",
                            v.name
                        ))
                        .with_element(UNKNOWN),
                    );
                }
            }
        }

        let mut structure = ModelStructure {
            outputs,
            derivatives,
            inputs,
            states,
            ..Default::default()
        };

        match &self.output_rows {
            Some(rows) => {
                let (on_states, on_inputs) = split_rows(registry, rows, &structure, diagnostics);
                structure.outputs_on_states = on_states;
                structure.outputs_on_inputs = on_inputs;
            }
            None => {
                structure.outputs_on_inputs =
                    direct_dependency_table(registry, &structure.outputs, &structure.inputs);
            }
        }
        if let Some(rows) = &self.derivative_rows {
            let (on_states, on_inputs) = split_rows(registry, rows, &structure, diagnostics);
            structure.derivatives_on_states = on_states;
            structure.derivatives_on_inputs = on_inputs;
        }
        structure
    }

    fn variable_name(&self, index: VariableIndex) -> String {
        self.registry
            .get(index)
            .map(|v| v.name.clone())
            .unwrap_or_else(|| index.to_string())
    }
}

/// Split each row's dependencies between the states and inputs columns.
fn split_rows(
    registry: &VariableRegistry,
    rows: &[UnknownRow],
    structure: &ModelStructure,
    diagnostics: &mut Vec<Diagnostic>,
) -> (Option<DependencyTable>, Option<DependencyTable>) {
    let mut on_states = DependencyTableBuilder::new();
    let mut on_inputs = DependencyTableBuilder::new();
    for (row, unknown) in rows.iter().enumerate() {
        on_states.start_row(row);
        on_inputs.start_row(row);
        for &(dependency, kind) in &unknown.dependencies {
            if let Some(column) = structure.inputs.iter().position(|&i| i == dependency) {
                on_inputs.add(column, kind);
            } else if let Some(column) = structure.states.iter().position(|&s| s == dependency) {
                on_states.add(column, kind);
            } else {
                let name = |i: VariableIndex| {
                    registry
                        .get(i)
                        .map(|v| v.name.clone())
                        .unwrap_or_else(|| i.to_string())
                };
                diagnostics.push(
                    Diagnostic::validation_error(format!(
                        "'{}' depends on '{}', which is neither an input nor a state",
                        name(unknown.variable),
                        name(dependency)
                    ))
                    .with_element(UNKNOWN)
                    .with_attribute("dependencies"),
                );
            }
        }
        on_states.close_row();
        on_inputs.close_row();
    }
    (on_states.finish(), on_inputs.finish())
}

/// Outputs-on-inputs table derived from `DirectDependency` declarations.
fn direct_dependency_table(
    registry: &VariableRegistry,
    outputs: &[VariableIndex],
    inputs: &[VariableIndex],
) -> Option<DependencyTable> {
    let mut builder = DependencyTableBuilder::new();
    for (row, &output) in outputs.iter().enumerate() {
        let deps = registry
            .get(output)
            .and_then(|v| v.direct_dependencies.as_deref())
            .unwrap_or_default();
        builder.push_row(
            row,
            deps.iter().filter_map(|dep| {
                inputs
                    .iter()
                    .position(|i| i == dep)
                    .map(|column| (column, DependencyFactorKind::Dependent))
            }),
        );
    }
    builder.finish()
}

fn parse_causality(generation: InterfaceGeneration, s: &str) -> Option<Causality> {
    match (generation, s) {
        (InterfaceGeneration::V1, "internal" | "none") => Some(Causality::Local),
        (InterfaceGeneration::V2, "calculatedParameter") => Some(Causality::Parameter),
        _ => Causality::parse(s),
    }
}

fn parse_variability(generation: InterfaceGeneration, s: &str) -> Option<Variability> {
    match (generation, s) {
        (InterfaceGeneration::V1, "parameter") => Some(Variability::Fixed),
        _ => Variability::parse(s),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn attr<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.as_str())
}

/// A numeric attribute; present but unparsable is a parse error.
fn number<T: FromStr>(
    element: &str,
    attributes: &[Attribute],
    name: &str,
) -> Result<Option<T>, Diagnostic> {
    match attr(attributes, name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Diagnostic::parse_error(element, format!("invalid numeric value '{raw}'"))
                .with_attribute(name)
        }),
    }
}

/// A closed-enumeration attribute of a `ScalarVariable`.
fn enumerated<T>(
    variable: &str,
    attributes: &[Attribute],
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, Diagnostic> {
    match attr(attributes, name) {
        None => Ok(None),
        Some(raw) => parse(raw).map(Some).ok_or_else(|| {
            Diagnostic::parse_error(
                SCALAR_VARIABLE,
                format!("variable '{variable}': unknown {name} '{raw}'"),
            )
            .with_attribute(name)
        }),
    }
}

/// A whitespace-separated list attribute. `Err` carries the bad token.
fn list<T>(
    attributes: &[Attribute],
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<Vec<T>>, String> {
    let Some(raw) = attr(attributes, name) else {
        return Ok(None);
    };
    raw.split_whitespace()
        .map(|token| parse(token).ok_or_else(|| token.to_string()))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn apply_capabilities(
    caps: &mut KindCapabilities,
    element: &str,
    attributes: &[Attribute],
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for attribute in attributes {
        let value = attribute.value.as_str();
        let flag = match attribute.name.as_str() {
            "modelIdentifier" => {
                caps.model_identifier = value.to_string();
                continue;
            }
            "maxOutputDerivativeOrder" => {
                match value.trim().parse() {
                    Ok(order) => caps.max_output_derivative_order = order,
                    Err(_) => diagnostics.push(
                        Diagnostic::parse_error(element, format!("invalid numeric value '{value}'"))
                            .with_attribute("maxOutputDerivativeOrder"),
                    ),
                }
                continue;
            }
            "needsExecutionTool" => &mut caps.needs_execution_tool,
            "canHandleVariableCommunicationStepSize" => {
                &mut caps.can_handle_variable_communication_step_size
            }
            "canInterpolateInputs" => &mut caps.can_interpolate_inputs,
            "canRunAsynchronuously" | "canRunAsynchronously" => &mut caps.can_run_asynchronously,
            "canBeInstantiatedOnlyOncePerProcess" => {
                &mut caps.can_be_instantiated_only_once_per_process
            }
            "canNotUseMemoryManagementFunctions" => {
                &mut caps.can_not_use_memory_management_functions
            }
            "canGetAndSetFMUstate" => &mut caps.can_get_and_set_fmu_state,
            "canSerializeFMUstate" => &mut caps.can_serialize_fmu_state,
            "providesDirectionalDerivative" => &mut caps.provides_directional_derivative,
            "completedIntegratorStepNotNeeded" => &mut caps.completed_integrator_step_not_needed,
            other => {
                tracing::trace!(element, attribute = other, "ignoring capability attribute");
                continue;
            }
        };
        match parse_bool(value) {
            Some(b) => *flag = b,
            None => diagnostics.push(
                Diagnostic::parse_error(element, format!("invalid boolean value '{value}'"))
                    .with_attribute(attribute.name.clone()),
            ),
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmu_model::{DependencyKind, DiagnosticKind};

    fn variable(name: &str, vr: &str, extra: &[(&str, &str)], ty: &str, ty_attrs: &[(&str, &str)]) -> Vec<XmlEvent> {
        let mut attrs = vec![("name", name), ("valueReference", vr)];
        attrs.extend_from_slice(extra);
        vec![
            XmlEvent::start(SCALAR_VARIABLE, &attrs),
            XmlEvent::start(ty, ty_attrs),
            XmlEvent::end(ty),
            XmlEvent::end(SCALAR_VARIABLE),
        ]
    }

    fn document(variables: Vec<Vec<XmlEvent>>, structure: Vec<XmlEvent>) -> Vec<XmlEvent> {
        let mut events = vec![
            XmlEvent::start(ROOT, &[("fmiVersion", "2.0"), ("modelName", "m"), ("guid", "{g}")]),
            XmlEvent::start("ModelVariables", &[]),
        ];
        events.extend(variables.into_iter().flatten());
        events.push(XmlEvent::end("ModelVariables"));
        if !structure.is_empty() {
            events.push(XmlEvent::start("ModelStructure", &[]));
            events.extend(structure);
            events.push(XmlEvent::end("ModelStructure"));
        }
        events.push(XmlEvent::end(ROOT));
        events
    }

    fn build(events: &[XmlEvent]) -> (ModelDescription, Vec<Diagnostic>) {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut builder = ModelBuilder::new();
        for event in events {
            builder.handle(event, &mut diagnostics);
        }
        (builder.finish(&mut diagnostics), diagnostics)
    }

    fn section(name: &str, unknowns: &[&[(&str, &str)]]) -> Vec<XmlEvent> {
        let mut events = vec![XmlEvent::start(name, &[])];
        for attrs in unknowns {
            events.push(XmlEvent::start(UNKNOWN, attrs));
            events.push(XmlEvent::end(UNKNOWN));
        }
        events.push(XmlEvent::end(name));
        events
    }

    /// x (state), der(x), u (input), y (output).
    fn state_space() -> Vec<Vec<XmlEvent>> {
        vec![
            variable("x", "0", &[], "Real", &[]),
            variable("der(x)", "1", &[], "Real", &[("derivative", "1")]),
            variable("u", "2", &[("causality", "input")], "Real", &[]),
            variable("y", "3", &[("causality", "output")], "Real", &[]),
        ]
    }

    #[test]
    fn unknown_causality_names_the_attribute() {
        let events = document(
            vec![variable("x", "0", &[("causality", "sideways")], "Real", &[])],
            vec![],
        );
        let (md, diagnostics) = build(&events);
        assert!(!md.is_valid());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Parse);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("causality"));
        assert!(md.variables().is_empty());
    }

    #[test]
    fn attribute_order_and_defaults() {
        let events = document(
            vec![vec![
                XmlEvent::start(SCALAR_VARIABLE, &[("valueReference", "5"), ("vendorExtra", "x"), ("name", "k")]),
                XmlEvent::start("Integer", &[("start", "3")]),
                XmlEvent::end("Integer"),
                XmlEvent::end(SCALAR_VARIABLE),
            ]],
            vec![],
        );
        let (md, diagnostics) = build(&events);
        assert!(md.is_valid(), "{diagnostics:?}");
        let k = md.variables().lookup_by_name("k").unwrap();
        assert_eq!(k.base_type, BaseType::Integer);
        assert_eq!(k.causality, Causality::Local);
        assert_eq!(k.variability, Variability::Continuous);
        assert_eq!(k.alias_kind, AliasKind::NoAlias);
        assert_eq!(k.start.as_deref(), Some("3"));
    }

    #[test]
    fn shared_reference_without_alias_attribute_becomes_alias() {
        let events = document(
            vec![
                variable("a", "4", &[], "Real", &[]),
                variable("b", "4", &[], "Real", &[]),
            ],
            vec![],
        );
        let (md, diagnostics) = build(&events);
        assert!(md.is_valid(), "{diagnostics:?}");
        assert_eq!(md.variables().lookup_by_name("b").unwrap().alias_kind, AliasKind::Alias);
    }

    #[test]
    fn explicit_duplicate_canonical_is_a_validation_error() {
        let events = document(
            vec![
                variable("a", "4", &[("alias", "noAlias")], "Real", &[]),
                variable("b", "4", &[("alias", "noAlias")], "Real", &[]),
            ],
            vec![],
        );
        let (md, diagnostics) = build(&events);
        assert!(!md.is_valid());
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Validation);
    }

    #[test]
    fn structure_splits_inputs_and_states() {
        let structure = [
            section("Outputs", &[&[("index", "4"), ("dependencies", "1 3"), ("dependenciesKind", "dependent fixed")]]),
            section("Derivatives", &[&[("index", "2"), ("dependencies", "1")]]),
        ]
        .concat();
        let (md, diagnostics) = build(&document(state_space(), structure));
        assert!(md.is_valid(), "{diagnostics:?}");

        assert_eq!(md.states().map(|v| v.name.as_str()).collect::<Vec<_>>(), ["x"]);
        assert_eq!(md.derivatives().map(|v| v.name.as_str()).collect::<Vec<_>>(), ["der(x)"]);
        assert_eq!(md.number_of_continuous_states(), 1);

        let on_states = md.dependencies(DependencyKind::OutputsOnStates).unwrap();
        assert_eq!(on_states.dependencies_of_row(0).collect::<Vec<_>>(), vec![(0, DependencyFactorKind::Dependent)]);
        let on_inputs = md.dependencies(DependencyKind::OutputsOnInputs).unwrap();
        assert_eq!(on_inputs.dependencies_of_row(0).collect::<Vec<_>>(), vec![(0, DependencyFactorKind::Fixed)]);
        let der_on_states = md.dependencies(DependencyKind::DerivativesOnStates).unwrap();
        assert_eq!(der_on_states.row_count(), 1);
        assert!(md.dependencies(DependencyKind::DerivativesOnInputs).is_none());
    }

    #[test]
    fn rows_without_dependencies_collapse() {
        let structure = [
            section("Outputs", &[&[("index", "4")]]),
            section("Derivatives", &[&[("index", "2"), ("dependencies", "")]]),
        ]
        .concat();
        let (md, diagnostics) = build(&document(state_space(), structure));
        assert!(md.is_valid(), "{diagnostics:?}");
        for kind in DependencyKind::ALL {
            assert!(md.dependencies(kind).is_none(), "{kind} should be absent");
        }
        assert_eq!(md.structure().outputs.len(), 1);
    }

    #[test]
    fn mismatched_kind_list_is_rejected() {
        let structure = section(
            "Outputs",
            &[&[("index", "4"), ("dependencies", "1 3"), ("dependenciesKind", "dependent")]],
        );
        let (md, diagnostics) = build(&document(state_space(), structure));
        assert!(!md.is_valid());
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("dependenciesKind"));
    }

    #[test]
    fn out_of_range_dependency_is_fatal() {
        let structure = section("Outputs", &[&[("index", "4"), ("dependencies", "9")]]);
        let (md, diagnostics) = build(&document(state_space(), structure));
        assert!(!md.is_valid());
        assert!(diagnostics[0].message.contains("out of range"));

        let structure = section("Outputs", &[&[("index", "0")]]);
        let (md, _) = build(&document(state_space(), structure));
        assert!(!md.is_valid());
    }

    #[test]
    fn dependency_on_local_is_rejected() {
        // der(x) is neither an input nor a state.
        let structure = section("Outputs", &[&[("index", "4"), ("dependencies", "2")]]);
        let (md, diagnostics) = build(&document(state_space(), structure));
        assert!(!md.is_valid());
        assert!(diagnostics[0].message.contains("neither an input nor a state"));
    }

    #[test]
    fn unknown_elements_are_ignored() {
        let mut events = document(vec![variable("x", "0", &[], "Real", &[])], vec![]);
        events.insert(1, XmlEvent::start("VendorAnnotations", &[]));
        events.insert(2, XmlEvent::start("Tool", &[("name", "x")]));
        events.insert(3, XmlEvent::end("Tool"));
        events.insert(4, XmlEvent::end("VendorAnnotations"));
        let (md, diagnostics) = build(&events);
        assert!(md.is_valid());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unsupported_version_is_fatal() {
        let events = vec![
            XmlEvent::start(ROOT, &[("fmiVersion", "3.0")]),
            XmlEvent::end(ROOT),
        ];
        let (md, diagnostics) = build(&events);
        assert!(!md.is_valid());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("fmiVersion"));
    }

    #[test]
    fn empty_event_stream_is_invalid() {
        let (md, diagnostics) = build(&[]);
        assert!(!md.is_valid());
        assert_eq!(diagnostics.len(), 1);
    }
}
