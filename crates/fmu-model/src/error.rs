//! Model error types.

use crate::variable::{BaseType, ValueReference};

/// Errors raised while inserting into a [`VariableRegistry`](crate::VariableRegistry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A canonical variable already exists for this `(base type, value reference)`.
    #[error(
        "duplicate canonical {base_type} variable for valueReference {value_reference}: \
         '{rejected}' conflicts with '{existing}'"
    )]
    DuplicateKey {
        base_type: BaseType,
        value_reference: ValueReference,
        existing: String,
        rejected: String,
    },

    /// Another variable already uses this name.
    #[error("duplicate variable name '{name}'")]
    DuplicateName { name: String },
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
