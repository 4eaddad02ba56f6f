//! Import error types.

use std::path::PathBuf;

use fmu_model::Diagnostic;
use fmu_xml::XmlError;

/// Failures while unpacking a package archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive file could not be opened or read.
    #[error("cannot read archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a readable zip archive.
    #[error("corrupt archive {}: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },

    /// An entry name points outside the destination directory.
    #[error("archive entry '{name}' escapes the extraction directory")]
    UnsafeEntry { name: String },

    /// Writing an extracted file failed.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while importing a package.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The package has no model description at its root.
    #[error("package has no modelDescription.xml (looked at {})", path.display())]
    MissingDescription { path: PathBuf },

    /// The model description exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model description is not well-formed XML.
    #[error(transparent)]
    Xml(#[from] XmlError),

    /// Parsing or validation reported errors. Carries every error diagnostic.
    #[error("invalid model description: {}", summarize(diagnostics))]
    Invalid { diagnostics: Vec<Diagnostic> },

    /// Extraction cache I/O error.
    #[error("cache error at {}: {detail}", path.display())]
    Cache { path: PathBuf, detail: String },

    /// `fmu.toml` could not be read or parsed.
    #[error("invalid configuration {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    match diagnostics {
        [] => "no diagnostics recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

impl ImportError {
    /// Diagnostics behind an `Invalid` error.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Invalid { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_summarizes_first_diagnostic() {
        let err = ImportError::Invalid {
            diagnostics: vec![
                Diagnostic::validation_error("alias 'y' has no canonical variable"),
                Diagnostic::validation_error("second"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid model description: [validation] alias 'y' has no canonical variable (and 1 more)"
        );
        assert_eq!(err.diagnostics().len(), 2);
    }
}
