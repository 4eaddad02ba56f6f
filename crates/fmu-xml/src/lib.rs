//! Model description XML parsing.
//!
//! Tokenization and model construction are separate: an [`XmlEventSource`]
//! turns bytes into [`XmlEvent`]s and a [`ModelBuilder`] turns events into a
//! [`ModelDescription`](fmu_model::ModelDescription).
//!
//! ## Modules
//!
//! - [`event`] — Generic XML events and the quick-xml tokenizer
//! - [`builder`] — Domain-specific model construction and closing validation
//! - [`error`] — Tokenizer errors

pub mod builder;
pub mod error;
pub mod event;

pub use builder::ModelBuilder;
pub use error::{Result, XmlError};
pub use event::{Attribute, QuickXmlSource, XmlEvent, XmlEventSource};

use fmu_model::{DiagnosticSink, ModelDescription};

/// Build a model description from any event source.
///
/// Only tokenizer failures are returned as errors. Everything else is
/// reported to `sink` and reflected in
/// [`ModelDescription::is_valid`](fmu_model::ModelDescription::is_valid).
pub fn build_model_description<S>(source: &S, sink: &mut dyn DiagnosticSink) -> Result<ModelDescription>
where
    S: XmlEventSource + ?Sized,
{
    let events = source.events()?;
    let mut builder = ModelBuilder::new();
    for event in &events {
        builder.handle(event, sink);
    }
    Ok(builder.finish(sink))
}

/// Parse a model description document.
pub fn parse_model_description(xml: &str, sink: &mut dyn DiagnosticSink) -> Result<ModelDescription> {
    build_model_description(&QuickXmlSource::new(xml), sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmu_model::{
        AliasKind, BaseType, Causality, DependencyFactorKind, DependencyKind, Diagnostic,
        DiagnosticKind, FmuKind, InterfaceGeneration,
    };

    fn scenario(alias_reference: u32) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<fmiModelDescription fmiVersion="2.0" modelName="gain" guid="{{8c4e810f-3df3-4a00-8276-176fa3c9f000}}">
  <CoSimulation modelIdentifier="gain" canHandleVariableCommunicationStepSize="true"/>
  <ModelVariables>
    <ScalarVariable name="y" valueReference="7" causality="output">
      <Real/>
    </ScalarVariable>
    <ScalarVariable name="y_alias" valueReference="{alias_reference}" causality="output" alias="alias">
      <Real/>
    </ScalarVariable>
    <ScalarVariable name="u" valueReference="2" causality="input">
      <Real start="0.0"/>
    </ScalarVariable>
  </ModelVariables>
  <ModelStructure>
    <Outputs>
      <Unknown index="1" dependencies="3" dependenciesKind="dependent"/>
    </Outputs>
  </ModelStructure>
</fmiModelDescription>
"#
        )
    }

    #[test]
    fn alias_with_canonical_is_valid() {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let md = parse_model_description(&scenario(7), &mut diagnostics).unwrap();
        assert!(md.is_valid(), "{diagnostics:?}");
        assert!(diagnostics.is_empty());
        assert_eq!(md.variables().len(), 3);

        let group = md.variables().lookup_by_reference(BaseType::Real, 7).unwrap();
        assert_eq!(group.canonical.name, "y");
        assert_eq!(group.aliases.len(), 1);

        let table = md.dependencies(DependencyKind::OutputsOnInputs).unwrap();
        let row: Vec<_> = table.dependencies_of_row(0).collect();
        assert_eq!(row, vec![(0, DependencyFactorKind::Dependent)]);
        assert!(md.dependencies(DependencyKind::OutputsOnStates).is_none());
        assert_eq!(md.model_identifier(FmuKind::CoSimulation), Some("gain"));
        assert!(md.capabilities(FmuKind::CoSimulation).unwrap().can_handle_variable_communication_step_size);
    }

    #[test]
    fn alias_without_canonical_is_invalid() {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let md = parse_model_description(&scenario(9), &mut diagnostics).unwrap();
        assert!(!md.is_valid());
        let error = diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::Validation)
            .unwrap();
        assert!(error.message.contains("valueReference 9"), "{error}");
        assert!(error.message.contains("y_alias"));
    }

    #[test]
    fn malformed_document_is_an_error() {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let err = parse_model_description("<fmiModelDescription><ModelVariables>", &mut diagnostics)
            .unwrap_err();
        assert!(matches!(err, XmlError::Malformed { .. }));
    }

    #[test]
    fn generation_one_document() {
        let xml = r#"
<fmiModelDescription fmiVersion="1.0" modelName="bouncingBall" modelIdentifier="bouncingBall"
    guid="{abc}" numberOfContinuousStates="2" numberOfEventIndicators="1">
  <DefaultExperiment startTime="0" stopTime="3" tolerance="1e-4"/>
  <ModelVariables>
    <ScalarVariable name="h" valueReference="0" variability="continuous">
      <Real start="1"/>
    </ScalarVariable>
    <ScalarVariable name="der(h)" valueReference="1" causality="internal">
      <Real/>
    </ScalarVariable>
    <ScalarVariable name="g" valueReference="2" variability="parameter">
      <Real start="9.81"/>
    </ScalarVariable>
    <ScalarVariable name="minus_h" valueReference="0" alias="negatedAlias">
      <Real/>
    </ScalarVariable>
    <ScalarVariable name="u" valueReference="3" causality="input">
      <Real/>
    </ScalarVariable>
    <ScalarVariable name="y" valueReference="4" causality="output">
      <Real/>
      <DirectDependency><Name>u</Name></DirectDependency>
    </ScalarVariable>
  </ModelVariables>
</fmiModelDescription>"#;
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let md = parse_model_description(xml, &mut diagnostics).unwrap();
        assert!(md.is_valid(), "{diagnostics:?}");
        assert_eq!(md.generation(), InterfaceGeneration::V1);
        assert_eq!(md.number_of_continuous_states(), 2);
        assert_eq!(md.number_of_event_indicators(), 1);
        assert_eq!(md.model_identifier(FmuKind::ModelExchange), Some("bouncingBall"));
        assert!(!md.supports(FmuKind::CoSimulation));

        let der = md.variables().lookup_by_name("der(h)").unwrap();
        assert_eq!(der.causality, Causality::Local);
        let neg = md.variables().lookup_by_name("minus_h").unwrap();
        assert_eq!(neg.alias_kind, AliasKind::NegatedAlias);

        let y = md.variables().lookup_by_name("y").unwrap();
        let u = md.variables().index_of("u").unwrap();
        assert_eq!(y.direct_dependencies.as_deref(), Some(&[u][..]));
        let table = md.dependencies(DependencyKind::OutputsOnInputs).unwrap();
        assert_eq!(table.dependencies_of_row(0).collect::<Vec<_>>(), vec![(0, DependencyFactorKind::Dependent)]);

        let experiment = md.metadata().default_experiment.as_ref().unwrap();
        assert_eq!(experiment.stop_time, Some(3.0));
    }

    #[test]
    fn generation_one_cosimulation_implementation() {
        let xml = r#"
<fmiModelDescription fmiVersion="1.0" modelName="slave" modelIdentifier="slave" guid="{x}">
  <ModelVariables/>
  <Implementation>
    <CoSimulation_StandAlone>
      <Capabilities canHandleVariableCommunicationStepSize="true" canRunAsynchronuously="false"/>
    </CoSimulation_StandAlone>
  </Implementation>
</fmiModelDescription>"#;
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let md = parse_model_description(xml, &mut diagnostics).unwrap();
        assert!(md.is_valid(), "{diagnostics:?}");
        assert!(!md.supports(FmuKind::ModelExchange));
        let caps = md.capabilities(FmuKind::CoSimulation).unwrap();
        assert_eq!(caps.model_identifier, "slave");
        assert!(caps.can_handle_variable_communication_step_size);
    }
}
