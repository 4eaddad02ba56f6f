//! Platform tags and binary locations inside an extracted package.

use std::fmt;
use std::path::{Path, PathBuf};

/// Directory name under `binaries/` a compiled variant is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux64,
    Linux32,
    Win64,
    Win32,
    Darwin64,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Linux64,
        Platform::Linux32,
        Platform::Win64,
        Platform::Win32,
        Platform::Darwin64,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux64 => "linux64",
            Platform::Linux32 => "linux32",
            Platform::Win64 => "win64",
            Platform::Win32 => "win32",
            Platform::Darwin64 => "darwin64",
        }
    }

    /// Shared-library file extension, without the dot.
    pub fn library_extension(&self) -> &'static str {
        match self {
            Platform::Linux64 | Platform::Linux32 => "so",
            Platform::Win64 | Platform::Win32 => "dll",
            Platform::Darwin64 => "dylib",
        }
    }

    /// The platform this process runs on, if packages ship binaries for it.
    pub fn host() -> Option<Self> {
        let wide = cfg!(target_pointer_width = "64");
        if cfg!(target_os = "linux") {
            Some(if wide { Platform::Linux64 } else { Platform::Linux32 })
        } else if cfg!(target_os = "windows") {
            Some(if wide { Platform::Win64 } else { Platform::Win32 })
        } else if cfg!(target_os = "macos") && wide {
            Some(Platform::Darwin64)
        } else {
            None
        }
    }

    /// `<root>/binaries/<platform>/<model_identifier>.<ext>`
    pub fn binary_path(&self, root: &Path, model_identifier: &str) -> PathBuf {
        root.join("binaries")
            .join(self.as_str())
            .join(format!("{model_identifier}.{}", self.library_extension()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `file://` URI for a local path.
pub fn file_uri(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let mut encoded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => encoded.push_str("%20"),
            '#' => encoded.push_str("%23"),
            '%' => encoded.push_str("%25"),
            _ => encoded.push(c),
        }
    }
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        // Drive-letter paths.
        format!("file:///{encoded}")
    }
}
