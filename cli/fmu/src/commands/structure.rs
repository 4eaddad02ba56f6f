//! `fmu structure` — the four structural dependency tables.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use fmu_import::{ImportedModel, Importer};
use fmu_model::{DependencyKind, ModelDescription, VariableIndex};

use super::OutputFormat;

pub fn run(importer: &Importer, package: &Path, format: OutputFormat) -> Result<()> {
    let model = super::import(importer, package)?;
    print!("{}", render(&model, format)?);
    Ok(())
}

fn name(md: &ModelDescription, index: VariableIndex) -> String {
    md.variable(index)
        .map(|v| v.name.clone())
        .unwrap_or_else(|| index.to_string())
}

pub fn render(model: &ImportedModel, format: OutputFormat) -> Result<String> {
    let md = model.description();
    let structure = md.structure();

    match format {
        OutputFormat::Json => {
            let mut tables = serde_json::Map::new();
            for kind in DependencyKind::ALL {
                let Some(table) = structure.table(kind) else {
                    tables.insert(kind.as_str().to_string(), serde_json::Value::Null);
                    continue;
                };
                let rows = structure.rows(kind);
                let columns = structure.columns(kind);
                let rendered: Vec<serde_json::Value> = rows
                    .iter()
                    .enumerate()
                    .map(|(row, &variable)| {
                        let dependencies: Vec<serde_json::Value> = table
                            .dependencies_of_row(row)
                            .map(|(column, factor)| {
                                serde_json::json!({
                                    "variable": columns.get(column).map(|&c| name(md, c)),
                                    "column": column,
                                    "kind": factor,
                                })
                            })
                            .collect();
                        serde_json::json!({
                            "variable": name(md, variable),
                            "dependencies": dependencies,
                        })
                    })
                    .collect();
                tables.insert(kind.as_str().to_string(), serde_json::Value::Array(rendered));
            }
            Ok(format!(
                "{}\n",
                serde_json::to_string_pretty(&serde_json::Value::Object(tables))?
            ))
        }
        OutputFormat::Text => {
            let mut out = String::new();
            let list = |indices: &[VariableIndex]| {
                indices
                    .iter()
                    .map(|&i| name(md, i))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let _ = writeln!(out, "Outputs:     {}", list(&structure.outputs));
            let _ = writeln!(out, "Derivatives: {}", list(&structure.derivatives));
            let _ = writeln!(out, "Inputs:      {}", list(&structure.inputs));
            let _ = writeln!(out, "States:      {}", list(&structure.states));

            for kind in DependencyKind::ALL {
                let _ = writeln!(out);
                let Some(table) = structure.table(kind) else {
                    let _ = writeln!(out, "--- {kind} --- (none)");
                    continue;
                };
                let _ = writeln!(
                    out,
                    "--- {kind} --- ({} rows, {} entries)",
                    table.row_count(),
                    table.len()
                );
                let columns = structure.columns(kind);
                for (row, &variable) in structure.rows(kind).iter().enumerate() {
                    let deps: Vec<String> = table
                        .dependencies_of_row(row)
                        .map(|(column, factor)| {
                            let target = columns
                                .get(column)
                                .map(|&c| name(md, c))
                                .unwrap_or_else(|| format!("column {column}"));
                            format!("{target} ({factor})")
                        })
                        .collect();
                    if !deps.is_empty() {
                        let _ = writeln!(out, "  {} <- {}", name(md, variable), deps.join(", "));
                    }
                }
            }
            Ok(out)
        }
    }
}
