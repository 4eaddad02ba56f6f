//! Diagnostics collected while building a model description.
//!
//! Parse and validation problems never abort parsing. They are reported to a
//! [`DiagnosticSink`] and collectively decide whether the resulting
//! description is valid.

use std::fmt;

use serde::Serialize;

/// Severity of a diagnostic. Any `Error` makes the model invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// The phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// The document does not conform to the expected element/attribute shape.
    Parse,
    /// The document is well formed but describes an inconsistent model.
    Validation,
}

/// One reported problem, with the element and attribute it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// A fatal parse error.
    pub fn parse_error(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind: DiagnosticKind::Parse,
            element: Some(element.into()),
            attribute: None,
            message: message.into(),
        }
    }

    /// A fatal validation error.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind: DiagnosticKind::Validation,
            element: None,
            attribute: None,
            message: message.into(),
        }
    }

    /// A non-fatal warning.
    pub fn warning(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind: DiagnosticKind::Parse,
            element: Some(element.into()),
            attribute: None,
            message: message.into(),
        }
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::Validation => "validation",
        };
        write!(f, "[{kind}]")?;
        match (&self.element, &self.attribute) {
            (Some(e), Some(a)) => write!(f, " <{e}> @{a}:")?,
            (Some(e), None) => write!(f, " <{e}>:")?,
            (None, Some(a)) => write!(f, " @{a}:")?,
            (None, None) => {}
        }
        write!(f, " {}", self.message)
    }
}

/// Receives diagnostics as they are produced.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// A collecting sink that also mirrors every entry to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics in report order.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Only the error-severity diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.entries.iter().filter(|d| d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::error!(%diagnostic, "model description error"),
            Severity::Warning => tracing::warn!(%diagnostic, "model description warning"),
        }
        self.entries.push(diagnostic);
    }
}
