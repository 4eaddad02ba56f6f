//! Dynamic binding and call dispatch for compiled model binaries.
//!
//! ## Modules
//!
//! - [`abi`] — C types and entry-point signatures of both interface generations
//! - [`image`] — The `NativeImage` loader seam and its `libloading` implementation
//! - [`table`] — Entry-point resolution into per-generation function tables
//! - [`status`] — Status translation and generation-neutral call results
//! - [`callbacks`] — Logger and memory functions handed to the binary
//! - [`active`] — Caller-owned registry of live instances
//! - [`instance`] — The instance lifecycle state machine and typed dispatch

pub mod abi;
pub mod active;
pub mod callbacks;
pub mod error;
pub mod image;
pub mod instance;
pub mod status;
pub mod table;

#[cfg(test)]
mod fake;

// Re-export key types for convenience
pub use active::{ActiveInstance, ActiveInstanceRegistry};
pub use callbacks::{HostContext, LogRecord};
pub use error::{BindError, DispatchError, InstantiationError};
pub use image::{LibraryImage, NativeImage};
pub use instance::{
    DispatchResult, FmuState, InstanceHandle, InstanceOptions, InstanceState,
};
pub use status::{EventInfo, ExperimentSetup, IntegratorStep, Status, StatusKind};
pub use table::{BindingTarget, BindingTable, Operations, V1Operations, V2Operations};
