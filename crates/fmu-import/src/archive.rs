//! Package archive extraction.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::error::ArchiveError;

/// Unpacks a package archive into a directory.
pub trait ArchiveExtractor {
    fn extract_all(&self, archive: &Path, destination: &Path) -> Result<(), ArchiveError>;
}

/// Zip extraction with the `zip` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract_all(&self, archive: &Path, destination: &Path) -> Result<(), ArchiveError> {
        let file = File::open(archive).map_err(|source| ArchiveError::Open {
            path: archive.to_path_buf(),
            source,
        })?;
        let corrupt = |e: zip::result::ZipError| ArchiveError::Corrupt {
            path: archive.to_path_buf(),
            detail: e.to_string(),
        };
        let mut zip = zip::ZipArchive::new(file).map_err(corrupt)?;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(corrupt)?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(ArchiveError::UnsafeEntry {
                    name: entry.name().to_string(),
                });
            };
            let target = destination.join(relative);
            let write_error = |source| ArchiveError::Write {
                path: target.clone(),
                source,
            };

            if entry.is_dir() {
                fs::create_dir_all(&target).map_err(write_error)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }
            let mut out = File::create(&target).map_err(write_error)?;
            io::copy(&mut entry, &mut out).map_err(write_error)?;
        }

        tracing::debug!(
            archive = %archive.display(),
            destination = %destination.display(),
            entries = zip.len(),
            "extracted archive"
        );
        Ok(())
    }
}
