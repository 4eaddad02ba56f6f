//! In-memory model description for packaged simulation units.
//!
//! ## Modules
//!
//! - [`variable`] — Scalar variable records and attribute enumerations
//! - [`registry`] — Variable table ordered by `(base type, value reference, alias kind)`
//! - [`dependency`] — Sparse structural dependency tables
//! - [`description`] — The `ModelDescription` aggregate and its metadata
//! - [`diagnostics`] — Parse/validation diagnostics and the sink they are reported to

pub mod dependency;
pub mod description;
pub mod diagnostics;
pub mod error;
pub mod registry;
pub mod variable;

// Re-export key types for convenience
pub use dependency::{DependencyFactorKind, DependencyKind, DependencyTable, DependencyTableBuilder};
pub use description::{
    DefaultExperiment, FmuKind, InterfaceGeneration, KindCapabilities, LogCategory,
    ModelDescription, ModelMetadata, ModelStructure,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Diagnostics, Severity};
pub use error::RegistryError;
pub use registry::{CanonicalWithAliases, VariableRegistry};
pub use variable::{
    compare_by_reference, AliasKind, BaseType, Causality, ValueReference, Variability, Variable,
    VariableIndex,
};
