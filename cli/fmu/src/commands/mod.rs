//! CLI command implementations.

pub mod cache;
pub mod inspect;
pub mod simulate;
pub mod structure;
pub mod variables;

use std::path::Path;

use anyhow::{bail, Context, Result};
use fmu_import::{ImportedModel, Importer};

/// `--format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(s: Option<&str>) -> Result<Self> {
        match s {
            None | Some("text") => Ok(OutputFormat::Text),
            Some("json") => Ok(OutputFormat::Json),
            Some(other) => bail!("unknown format '{other}' (expected text or json)"),
        }
    }
}

pub(crate) fn import(importer: &Importer, package: &Path) -> Result<ImportedModel> {
    importer
        .import_model(package)
        .with_context(|| format!("importing {}", package.display()))
}
