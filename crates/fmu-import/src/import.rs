//! Package import and instance creation.
//!
//! [`Importer::import_model`] extracts a package (or accepts an already
//! extracted directory), parses its model description and refuses models
//! that did not validate. [`Importer::create_instance`] then locates the
//! binary for the requested kind and platform, binds it and instantiates it.

use std::path::{Path, PathBuf};

use fmu_binding::{
    ActiveInstanceRegistry, BindError, InstanceHandle, InstanceOptions, InstantiationError,
};
use fmu_model::{Diagnostic, Diagnostics, FmuKind, InterfaceGeneration, ModelDescription};

use crate::archive::{ArchiveExtractor, ZipExtractor};
use crate::cache::ExtractionCache;
use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::integrity::ContentHash;
use crate::platform::{file_uri, Platform};

pub const MODEL_DESCRIPTION_FILE: &str = "modelDescription.xml";
pub const RESOURCES_DIR: &str = "resources";

/// A parsed, valid model together with the directory it was extracted to.
///
/// The directory must outlive any instance created from the model on
/// platforms that keep the library file mapped.
#[derive(Debug)]
pub struct ImportedModel {
    description: ModelDescription,
    root: PathBuf,
    hash: Option<ContentHash>,
    warnings: Vec<Diagnostic>,
}

impl ImportedModel {
    pub fn description(&self) -> &ModelDescription {
        &self.description
    }

    pub fn into_description(self) -> ModelDescription {
        self.description
    }

    /// Extracted package root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Digest of the package archive. `None` for directory imports.
    pub fn hash(&self) -> Option<&ContentHash> {
        self.hash.as_ref()
    }

    /// Non-fatal diagnostics reported while parsing.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join(RESOURCES_DIR)
    }

    /// Location string passed to the binary at instantiation: the resources
    /// directory for generation two, the package root for generation-one
    /// co-simulation. Generation-one model exchange takes none.
    pub fn resource_location(&self, kind: FmuKind) -> Option<String> {
        match (self.description.generation(), kind) {
            (InterfaceGeneration::V2, _) => Some(file_uri(&self.resources_dir())),
            (InterfaceGeneration::V1, FmuKind::CoSimulation) => Some(file_uri(&self.root)),
            (InterfaceGeneration::V1, FmuKind::ModelExchange) => None,
        }
    }

    /// Where the binary for `kind` lives on `platform`.
    pub fn binary_path(&self, kind: FmuKind, platform: Platform) -> std::result::Result<PathBuf, BindError> {
        if !self.description.supports(kind) {
            return Err(BindError::UnsupportedKind { kind });
        }
        let identifier = self
            .description
            .model_identifier(kind)
            .ok_or(BindError::NoModelIdentifier { kind })?;
        Ok(platform.binary_path(&self.root, identifier))
    }
}

/// Imports packages and creates instances from them.
pub struct Importer {
    config: ImportConfig,
    cache: ExtractionCache,
    extractor: Box<dyn ArchiveExtractor>,
    registry: ActiveInstanceRegistry,
}

impl Importer {
    pub fn new(config: ImportConfig) -> Self {
        let cache = ExtractionCache::new(config.cache_dir());
        Self {
            config,
            cache,
            extractor: Box::new(ZipExtractor),
            registry: ActiveInstanceRegistry::new(),
        }
    }

    /// Use `fmu.toml` from `start_dir` or an ancestor, else defaults.
    pub fn discover(start_dir: &Path) -> Result<Self> {
        let config = ImportConfig::find_and_load(start_dir)?
            .map(|(config, _)| config)
            .unwrap_or_default();
        Ok(Self::new(config))
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Instances created with `[instance] register = true` are tracked here.
    pub fn registry(&self) -> &ActiveInstanceRegistry {
        &self.registry
    }

    /// The platform binaries are loaded for: the configured override, else
    /// the host.
    pub fn platform(&self) -> Result<Option<Platform>> {
        Ok(self.config.platform_override()?.or_else(Platform::host))
    }

    /// Extract, parse and validate a package.
    pub fn import_model(&self, package: &Path) -> Result<ImportedModel> {
        let (root, hash) = if package.is_dir() {
            (package.to_path_buf(), None)
        } else {
            let entry = self.cache.extract(
                package,
                self.extractor.as_ref(),
                self.config.import.reuse_extracted,
            )?;
            (entry.path, Some(entry.hash))
        };

        let xml_path = root.join(MODEL_DESCRIPTION_FILE);
        if !xml_path.is_file() {
            return Err(ImportError::MissingDescription { path: xml_path });
        }
        let xml = std::fs::read_to_string(&xml_path).map_err(|source| ImportError::Read {
            path: xml_path.clone(),
            source,
        })?;

        let mut sink = Diagnostics::new();
        let description = fmu_xml::parse_model_description(&xml, &mut sink)?;
        if !description.is_valid() || sink.has_errors() {
            let diagnostics: Vec<Diagnostic> = sink.errors().cloned().collect();
            tracing::warn!(
                package = %package.display(),
                errors = diagnostics.len(),
                "rejected invalid model description"
            );
            return Err(ImportError::Invalid { diagnostics });
        }

        tracing::info!(
            model = description.model_name(),
            generation = %description.generation(),
            variables = description.variables().len(),
            "imported model"
        );
        Ok(ImportedModel {
            description,
            root,
            hash,
            warnings: sink.into_vec(),
        })
    }

    /// Bind and instantiate the `kind` binary of an imported model. Nothing
    /// is returned unless both steps succeed.
    pub fn create_instance<'m>(
        &self,
        model: &'m ImportedModel,
        kind: FmuKind,
    ) -> std::result::Result<InstanceHandle<'m>, InstantiationError> {
        let options = InstanceOptions {
            instance_name: None,
            resource_location: model.resource_location(kind),
            logging_on: self.config.instance.logging_on,
            visible: self.config.instance.visible,
            registry: self
                .config
                .instance
                .register
                .then(|| self.registry.clone()),
        };
        self.create_instance_with(model, kind, options)
    }

    /// [`create_instance`](Self::create_instance) with explicit options.
    pub fn create_instance_with<'m>(
        &self,
        model: &'m ImportedModel,
        kind: FmuKind,
        options: InstanceOptions,
    ) -> std::result::Result<InstanceHandle<'m>, InstantiationError> {
        let binary = match self.platform() {
            Ok(Some(platform)) => model.binary_path(kind, platform)?,
            Ok(None) => {
                let path = model.root().join("binaries").join(format!(
                    "{}-{}",
                    std::env::consts::OS,
                    std::env::consts::ARCH
                ));
                return Err(BindError::ImageNotFound { path }.into());
            }
            Err(e) => {
                return Err(InstantiationError::Platform {
                    detail: e.to_string(),
                })
            }
        };

        let mut handle = InstanceHandle::new(model.description(), kind, options)?;
        handle.bind_library(&binary)?;
        handle.instantiate()?;
        tracing::debug!(
            instance = handle.instance_name(),
            binary = %binary.display(),
            "created instance"
        );
        Ok(handle)
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::new(ImportConfig::default())
    }
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("registered", &self.registry.len())
            .finish()
    }
}

/// Import a package with default settings.
pub fn import_model(package: &Path) -> Result<ImportedModel> {
    Importer::default().import_model(package)
}

/// Create an instance with default settings.
pub fn create_instance(
    model: &ImportedModel,
    kind: FmuKind,
) -> std::result::Result<InstanceHandle<'_>, InstantiationError> {
    Importer::default().create_instance(model, kind)
}
