//! `fmu.toml` importer configuration.
//!
//! Every section and key is optional:
//!
//! ```toml
//! [import]
//! cache-dir = "/var/cache/fmu"
//! reuse-extracted = true
//! platform = "linux64"
//!
//! [instance]
//! register = true
//! logging-on = false
//! visible = false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::platform::Platform;

pub const CONFIG_FILE: &str = "fmu.toml";

/// The parsed `fmu.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub import: ImportSection,
    pub instance: InstanceSection,
}

/// `[import]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ImportSection {
    /// Extraction cache root. Defaults to `<tmp>/fmu-cache`.
    pub cache_dir: Option<PathBuf>,
    /// Reuse an earlier extraction of identical package bytes.
    pub reuse_extracted: bool,
    /// Platform tag to load binaries for, instead of the host's.
    pub platform: Option<String>,
}

impl Default for ImportSection {
    fn default() -> Self {
        Self {
            cache_dir: None,
            reuse_extracted: true,
            platform: None,
        }
    }
}

/// `[instance]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstanceSection {
    /// Track created instances in the importer's registry.
    pub register: bool,
    pub logging_on: bool,
    pub visible: bool,
}

impl ImportConfig {
    /// Search upward from `start_dir` for `fmu.toml`, returning the parsed
    /// configuration and the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                let config = Self::load(&candidate)?;
                tracing::debug!(path = %candidate.display(), "loaded configuration");
                return Ok(Some((config, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ImportError::Config {
            path: path.to_path_buf(),
            detail: format!("reading: {e}"),
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ImportError::Config { detail, .. } => ImportError::Config {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })?;
        // Reject bad tags when loading rather than at first instantiation.
        config.platform_override()?;
        Ok(config)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ImportError::Config {
            path: PathBuf::from(CONFIG_FILE),
            detail: e.to_string(),
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.import
            .cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("fmu-cache"))
    }

    /// The configured platform tag, parsed.
    pub fn platform_override(&self) -> Result<Option<Platform>> {
        match &self.import.platform {
            None => Ok(None),
            Some(tag) => Platform::parse(tag).map(Some).ok_or_else(|| ImportError::Config {
                path: PathBuf::from(CONFIG_FILE),
                detail: format!(
                    "unknown platform '{tag}' (expected one of linux64, linux32, win64, win32, darwin64)"
                ),
            }),
        }
    }
}
