//! Host platform classification.

use std::fmt;

use serde::Serialize;

use crate::core::error::RunError;

/// Operating-system classification used to match `supported_platforms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Macos,
}

impl Platform {
    /// Identifier as written in definition files.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Macos => "macos",
        }
    }

    /// Map an `std::env::consts::OS` value onto a platform.
    pub fn from_os(os: &str) -> Result<Self, RunError> {
        match os {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::Macos),
            other => Err(RunError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform of the running host.
pub fn current_platform() -> Result<Platform, RunError> {
    Platform::from_os(std::env::consts::OS)
}
