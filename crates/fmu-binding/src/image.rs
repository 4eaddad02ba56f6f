//! Loaded binary images.
//!
//! [`NativeImage`] is the only seam between binding and the platform
//! loader: it resolves an exported symbol name to an address and releases
//! the image when asked to.

use std::fmt;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::{BindError, Result};

/// A loaded image whose exported symbols can be resolved by name.
pub trait NativeImage {
    /// Where the image was loaded from, for diagnostics.
    fn location(&self) -> &Path;

    /// Address of an exported symbol.
    fn resolve(&self, symbol: &str) -> Option<*const c_void>;

    /// Release the image. Failures are logged, never propagated.
    fn unload(self: Box<Self>) {
        drop(self);
    }
}

/// A shared library loaded with `libloading`.
pub struct LibraryImage {
    library: Library,
    path: PathBuf,
}

impl LibraryImage {
    /// Load the shared library at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BindError::ImageNotFound {
                path: path.to_path_buf(),
            });
        }
        // SAFETY: loading runs the library's initializers. Model binaries are
        // trusted to the same degree as the package that ships them.
        let library = unsafe { Library::new(path) }.map_err(|e| BindError::ImageLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded binary");
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Unload explicitly, logging instead of propagating a failure.
    pub fn close(self) {
        let path = self.path;
        match self.library.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "unloaded binary"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to unload binary"),
        }
    }
}

impl NativeImage for LibraryImage {
    fn location(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, symbol: &str) -> Option<*const c_void> {
        let mut name = Vec::with_capacity(symbol.len() + 1);
        name.extend_from_slice(symbol.as_bytes());
        name.push(0);
        // SAFETY: the symbol is read as an untyped address; callers cast it
        // to the signature the interface generation prescribes.
        let address = unsafe { self.library.get::<*const c_void>(&name) }
            .ok()
            .map(|symbol| *symbol)?;
        (!address.is_null()).then_some(address)
    }

    fn unload(self: Box<Self>) {
        self.close();
    }
}

impl fmt::Debug for LibraryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryImage")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_image_not_found() {
        let err = LibraryImage::load(Path::new("/nonexistent/model.so")).unwrap_err();
        assert!(matches!(err, BindError::ImageNotFound { .. }));
    }

    #[test]
    fn non_library_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.so");
        std::fs::write(&path, b"not a shared object").unwrap();
        let err = LibraryImage::load(&path).unwrap_err();
        assert!(matches!(err, BindError::ImageLoad { .. }));
    }
}
