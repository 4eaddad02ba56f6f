//! `fmu inspect` — model metadata and capabilities.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use fmu_import::{ImportedModel, Importer};
use fmu_model::{FmuKind, KindCapabilities};

use super::OutputFormat;

pub fn run(importer: &Importer, package: &Path, format: OutputFormat) -> Result<()> {
    let model = super::import(importer, package)?;
    print!("{}", render(&model, format)?);
    Ok(())
}

pub fn render(model: &ImportedModel, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(model)),
        OutputFormat::Json => {
            let md = model.description();
            let value = serde_json::json!({
                "metadata": md.metadata(),
                "variables": md.variables().len(),
                "inputs": md.inputs().count(),
                "outputs": md.outputs().count(),
                "continuous-states": md.number_of_continuous_states(),
                "package-root": model.root(),
                "package-hash": model.hash().map(|h| h.as_str()),
                "warnings": model.warnings(),
            });
            Ok(format!("{}\n", serde_json::to_string_pretty(&value)?))
        }
    }
}

fn render_text(model: &ImportedModel) -> String {
    let md = model.description();
    let meta = md.metadata();
    let mut out = String::new();

    let _ = writeln!(out, "=== Model: {} ===", md.model_name());
    let _ = writeln!(out, "GUID:        {}", md.guid());
    let _ = writeln!(out, "Generation:  {}", md.generation());
    let optional = [
        ("Description", &meta.description),
        ("Author", &meta.author),
        ("Version", &meta.version),
        ("Tool", &meta.generation_tool),
        ("Generated", &meta.generation_date_and_time),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            let _ = writeln!(out, "{:<12} {value}", format!("{label}:"));
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "--- Interface ---");
    let _ = writeln!(out, "  Variables:         {}", md.variables().len());
    let _ = writeln!(out, "  Inputs:            {}", md.inputs().count());
    let _ = writeln!(out, "  Outputs:           {}", md.outputs().count());
    let _ = writeln!(out, "  Continuous states: {}", md.number_of_continuous_states());
    let _ = writeln!(out, "  Event indicators:  {}", md.number_of_event_indicators());
    let _ = writeln!(out);

    let _ = writeln!(out, "--- Binaries ---");
    for kind in [FmuKind::ModelExchange, FmuKind::CoSimulation] {
        match md.capabilities(kind) {
            Some(caps) => {
                let _ = writeln!(out, "  {:<15} {}", kind.as_str(), caps.model_identifier);
                let flags = flags(caps);
                if !flags.is_empty() {
                    let _ = writeln!(out, "  {:<15} {}", "", flags.join(", "));
                }
            }
            None => {
                let _ = writeln!(out, "  {:<15} (not provided)", kind.as_str());
            }
        }
    }

    if let Some(experiment) = &meta.default_experiment {
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Default experiment ---");
        let fields = [
            ("start", experiment.start_time),
            ("stop", experiment.stop_time),
            ("tolerance", experiment.tolerance),
            ("step", experiment.step_size),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                let _ = writeln!(out, "  {label:<10} {value}");
            }
        }
    }

    if !meta.log_categories.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Log categories ---");
        for category in &meta.log_categories {
            match &category.description {
                Some(description) => {
                    let _ = writeln!(out, "  {:<20} {description}", category.name);
                }
                None => {
                    let _ = writeln!(out, "  {}", category.name);
                }
            }
        }
    }

    if !model.warnings().is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Warnings ---");
        for warning in model.warnings() {
            let _ = writeln!(out, "  {warning}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Package: {}", model.root().display());
    out
}

fn flags(caps: &KindCapabilities) -> Vec<&'static str> {
    let named = [
        (caps.needs_execution_tool, "needs-execution-tool"),
        (
            caps.can_handle_variable_communication_step_size,
            "variable-step",
        ),
        (caps.can_interpolate_inputs, "interpolates-inputs"),
        (caps.can_run_asynchronously, "asynchronous"),
        (
            caps.can_be_instantiated_only_once_per_process,
            "single-instance",
        ),
        (caps.can_get_and_set_fmu_state, "state-get-set"),
        (caps.can_serialize_fmu_state, "state-serialize"),
        (
            caps.provides_directional_derivative,
            "directional-derivative",
        ),
        (
            caps.completed_integrator_step_not_needed,
            "no-completed-integrator-step",
        ),
    ];
    named
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
}
