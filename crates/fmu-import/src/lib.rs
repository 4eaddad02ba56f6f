//! Import pipeline for model packages.
//!
//! ## Modules
//!
//! - [`archive`] — The `ArchiveExtractor` seam and its zip implementation
//! - [`cache`] — Extraction cache keyed by the package digest
//! - [`integrity`] — SHA-256 content hashes
//! - [`platform`] — Platform tags and binary paths inside a package
//! - [`config`] — `fmu.toml` discovery and parsing
//! - [`import`] — `import_model` and `create_instance`

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod import;
pub mod integrity;
pub mod platform;

// Re-export key types for convenience
pub use archive::{ArchiveExtractor, ZipExtractor};
pub use cache::{CacheEntry, ExtractionCache};
pub use config::{ImportConfig, ImportSection, InstanceSection};
pub use error::{ArchiveError, ImportError, Result};
pub use import::{create_instance, import_model, ImportedModel, Importer, MODEL_DESCRIPTION_FILE};
pub use integrity::ContentHash;
pub use platform::{file_uri, Platform};
