//! `fmu variables` — the variable registry in value-reference order.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Result};
use fmu_import::{ImportedModel, Importer};
use fmu_model::{Causality, Variable};

use super::OutputFormat;

pub fn run(
    importer: &Importer,
    package: &Path,
    causality: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let model = super::import(importer, package)?;
    print!("{}", render(&model, causality, format)?);
    Ok(())
}

pub fn render(model: &ImportedModel, causality: Option<&str>, format: OutputFormat) -> Result<String> {
    let filter = match causality {
        None => None,
        Some(name) => match Causality::parse(name) {
            Some(c) => Some(c),
            None => bail!("unknown causality '{name}'"),
        },
    };
    let selected: Vec<&Variable> = model
        .description()
        .variables()
        .ordered_iter()
        .filter(|v| filter.map_or(true, |c| v.causality == c))
        .collect();

    match format {
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string_pretty(&selected)?)),
        OutputFormat::Text => {
            let width = selected.iter().map(|v| v.name.len()).max().unwrap_or(4).max(4);
            let mut out = String::new();
            let _ = writeln!(
                out,
                "{:>6}  {:<11} {:<10} {:<11} {:<12} {:<width$}  start",
                "vr", "type", "causality", "variability", "alias", "name"
            );
            for v in &selected {
                let start = match (&v.start, &v.unit) {
                    (Some(start), Some(unit)) => format!("{start} {unit}"),
                    (Some(start), None) => start.clone(),
                    _ => String::new(),
                };
                let line = format!(
                    "{:>6}  {:<11} {:<10} {:<11} {:<12} {:<width$}  {start}",
                    v.value_reference,
                    v.base_type.as_str(),
                    v.causality.as_str(),
                    v.variability.as_str(),
                    v.alias_kind.as_str(),
                    v.name,
                );
                let _ = writeln!(out, "{}", line.trim_end());
            }
            Ok(out)
        }
    }
}
