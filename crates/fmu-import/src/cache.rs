//! Content-addressed extraction cache.
//!
//! Packages are extracted once per distinct archive content.
//!
//! Layout:
//! ```text
//! <cache_root>/
//!   <sha256>/            extracted package
//!   <sha256>.toml        source record
//!   <sha256>.partial/    extraction in progress
//!   <sha256>-<n>/        further extraction of the same bytes
//!   <sha256>-<n>.toml
//! ```
//!
//! An entry directory only appears once extraction into its `.partial`
//! sibling has finished, so a present entry is always complete. Existing
//! entries are never overwritten: extracting again without reuse picks the
//! next free `<sha256>-<n>`, so instances still loaded from an earlier
//! extraction keep their files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveExtractor;
use crate::error::{ArchiveError, ImportError, Result};
use crate::integrity::ContentHash;

/// An extraction cache backed by the filesystem.
#[derive(Debug, Clone)]
pub struct ExtractionCache {
    root: PathBuf,
}

/// One extracted package.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub hash: ContentHash,
    /// Extracted package root.
    pub path: PathBuf,
    /// Archive the entry was extracted from, when recorded.
    pub source: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SourceRecord {
    source: PathBuf,
}

impl ExtractionCache {
    pub fn new(root: PathBuf) -> Self {
        ExtractionCache { root }
    }

    /// `<tmp>/fmu-cache`
    pub fn default_location() -> Self {
        ExtractionCache::new(std::env::temp_dir().join("fmu-cache"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entry_dir(hash).is_dir()
    }

    pub fn get(&self, hash: &ContentHash) -> Option<CacheEntry> {
        if !self.contains(hash) {
            return None;
        }
        Some(CacheEntry {
            hash: hash.clone(),
            path: self.entry_dir(hash),
            source: read_source(&self.entry_dir(hash)),
        })
    }

    /// Extract `package` into the cache, or return the existing extraction of
    /// the same bytes when `reuse` is set. Without reuse, a package already in
    /// the cache is extracted again next to the earlier copy.
    pub fn extract(
        &self,
        package: &Path,
        extractor: &dyn ArchiveExtractor,
        reuse: bool,
    ) -> Result<CacheEntry> {
        let hash = ContentHash::compute_file(package).map_err(|source| ArchiveError::Open {
            path: package.to_path_buf(),
            source,
        })?;

        if reuse {
            if let Some(entry) = self.get(&hash) {
                tracing::debug!(
                    package = %package.display(),
                    hash = hash.short(),
                    "reusing extracted package"
                );
                return Ok(entry);
            }
        }

        let primary = self.entry_dir(&hash);
        let dir = if primary.is_dir() {
            self.fresh_dir(&hash)
        } else {
            primary
        };
        let staging = dir.with_extension("partial");
        remove_if_present(&staging)?;
        std::fs::create_dir_all(&staging).map_err(|e| ImportError::Cache {
            path: staging.clone(),
            detail: format!("creating cache dir: {e}"),
        })?;

        if let Err(e) = extractor.extract_all(package, &staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        std::fs::rename(&staging, &dir).map_err(|e| ImportError::Cache {
            path: dir.clone(),
            detail: format!("publishing extraction: {e}"),
        })?;

        let source = std::fs::canonicalize(package).unwrap_or_else(|_| package.to_path_buf());
        let record_file = record_path(&dir);
        let record = toml::to_string(&SourceRecord {
            source: source.clone(),
        })
        .map_err(|e| ImportError::Cache {
            path: record_file.clone(),
            detail: format!("encoding source record: {e}"),
        })?;
        std::fs::write(&record_file, record).map_err(|e| ImportError::Cache {
            path: record_file.clone(),
            detail: format!("writing source record: {e}"),
        })?;

        tracing::info!(
            package = %package.display(),
            hash = hash.short(),
            dir = %dir.display(),
            "extracted package into cache"
        );
        Ok(CacheEntry {
            hash,
            path: dir,
            source: Some(source),
        })
    }

    /// Remove every extraction of one digest. Returns whether any existed.
    pub fn remove(&self, hash: &ContentHash) -> Result<bool> {
        let mut existed = false;
        for entry in self.list()?.iter().filter(|e| &e.hash == hash) {
            remove_entry(&entry.path)?;
            existed = true;
        }
        Ok(existed)
    }

    /// All complete entries, ordered by digest and then by path.
    pub fn list(&self) -> Result<Vec<CacheEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for item in std::fs::read_dir(&self.root).map_err(|e| ImportError::Cache {
            path: self.root.clone(),
            detail: format!("listing entries: {e}"),
        })? {
            let item = item.map_err(|e| ImportError::Cache {
                path: self.root.clone(),
                detail: format!("reading entry: {e}"),
            })?;
            if !item.path().is_dir() {
                continue;
            }
            let Some(hash) = item.file_name().to_str().and_then(parse_entry_name) else {
                continue;
            };
            let path = item.path();
            entries.push(CacheEntry {
                source: read_source(&path),
                path,
                hash,
            });
        }
        entries.sort_by(|a, b| a.hash.cmp(&b.hash).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    /// Remove every entry and any interrupted extraction. Returns the number
    /// of complete entries removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = self.list()?;
        for entry in &entries {
            remove_entry(&entry.path)?;
        }
        let removed = entries.len();
        if self.root.is_dir() {
            for item in std::fs::read_dir(&self.root).map_err(|e| ImportError::Cache {
                path: self.root.clone(),
                detail: format!("listing entries: {e}"),
            })? {
                let Ok(item) = item else { continue };
                if item.file_name().to_string_lossy().ends_with(".partial") {
                    remove_if_present(&item.path())?;
                }
            }
        }
        tracing::debug!(root = %self.root.display(), removed, "cleared extraction cache");
        Ok(removed)
    }

    fn entry_dir(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.as_str())
    }

    /// First `<hash>-<n>` with neither a finished nor a staged extraction.
    fn fresh_dir(&self, hash: &ContentHash) -> PathBuf {
        let mut n = 1u32;
        loop {
            let dir = self.root.join(format!("{hash}-{n}"));
            if !dir.exists() && !dir.with_extension("partial").exists() {
                return dir;
            }
            n += 1;
        }
    }
}

/// `<hash>` or `<hash>-<n>`.
fn parse_entry_name(name: &str) -> Option<ContentHash> {
    match name.split_once('-') {
        None => ContentHash::parse(name),
        Some((hash, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            ContentHash::parse(hash)
        }
        Some(_) => None,
    }
}

fn record_path(dir: &Path) -> PathBuf {
    dir.with_extension("toml")
}

fn read_source(dir: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(record_path(dir)).ok()?;
    toml::from_str::<SourceRecord>(&content)
        .ok()
        .map(|record| record.source)
}

fn remove_entry(dir: &Path) -> Result<()> {
    remove_if_present(dir)?;
    let record = record_path(dir);
    if record.is_file() {
        std::fs::remove_file(&record).map_err(|e| ImportError::Cache {
            path: record,
            detail: format!("removing source record: {e}"),
        })?;
    }
    Ok(())
}

fn remove_if_present(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        std::fs::remove_dir_all(dir).map_err(|e| ImportError::Cache {
            path: dir.to_path_buf(),
            detail: format!("removing cache entry: {e}"),
        })?;
    }
    Ok(())
}
