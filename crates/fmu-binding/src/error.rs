//! Binding, instantiation and dispatch errors.

use std::path::PathBuf;

use fmu_model::FmuKind;

use crate::instance::InstanceState;
use crate::status::Status;

/// Errors raised while loading a binary and resolving its entry points.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// No file at the expected binary path.
    #[error("binary not found: {}", path.display())]
    ImageNotFound { path: PathBuf },

    /// The file exists but the loader rejected it.
    #[error("failed to load {}: {detail}", path.display())]
    ImageLoad { path: PathBuf, detail: String },

    /// A mandatory entry point is not exported.
    #[error("missing mandatory symbol '{symbol}'")]
    SymbolMissing { symbol: String },

    /// The table already holds a loaded image.
    #[error("binding table is already bound")]
    AlreadyBound,

    /// The model does not name a binary for this kind.
    #[error("model declares no model identifier for {kind}")]
    NoModelIdentifier { kind: FmuKind },

    /// The model does not provide this kind at all.
    #[error("model does not support {kind}")]
    UnsupportedKind { kind: FmuKind },
}

/// Errors raised by the binary's create-instance entry point.
#[derive(Debug, thiserror::Error)]
pub enum InstantiationError {
    #[error("cannot instantiate: {0}")]
    Bind(#[from] BindError),

    #[error("cannot instantiate a handle in state {state}")]
    InvalidState { state: InstanceState },

    /// The binary returned a null instance pointer.
    #[error("binary returned no instance for '{instance_name}'")]
    NullInstance { instance_name: String },

    /// A string argument could not be passed across the C boundary.
    #[error("invalid instantiation argument: {detail}")]
    InvalidArgument { detail: String },

    /// The platform to load the binary for could not be resolved.
    #[error("cannot select a binary platform: {detail}")]
    Platform { detail: String },
}

/// Errors returned from a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The binary returned `discard`, `error` or `fatal`.
    #[error("call returned {0}")]
    Failed(Status),

    /// The handle's state does not allow the call. The binary is not invoked.
    #[error("{operation} is not allowed: {detail}")]
    InvalidState {
        operation: &'static str,
        detail: String,
    },

    /// The bound generation or kind has no such operation.
    #[error("{operation} is not available for this binary")]
    Unsupported { operation: &'static str },

    /// No binary is bound.
    #[error("{operation} called with no binary bound")]
    NotBound { operation: &'static str },

    /// An argument cannot be passed across the C boundary.
    #[error("invalid argument to {operation}: {detail}")]
    InvalidArgument {
        operation: &'static str,
        detail: String,
    },
}

impl DispatchError {
    /// The translated status, for `Failed`.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Failed(status) => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, BindError>;
