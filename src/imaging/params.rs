//! Parameter types for engine operations.
//!
//! These describe *what* to do, not *how*. Configuration values arrive as
//! raw integers and strings; the constructors here apply defaults and clamp
//! so every engine call receives an in-range value.
//!
//! - [`Quality`]: lossy encoding quality, 1-100, `0` means 95.
//! - [`Compression`]: PNG deflate level, 1-9, `0` means 7.
//! - [`ContainerFormat`]: the four output containers and their type aliases.

use std::fmt;

/// Quality setting for lossy encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub const DEFAULT: u8 = 95;

    pub fn new(value: i32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    /// Configured value: `0` selects the default, anything else is clamped.
    pub fn from_setting(value: i32) -> Self {
        if value == 0 {
            Self(Self::DEFAULT)
        } else {
            Self::new(value)
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// PNG compression level (1-9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression(u8);

impl Compression {
    pub const DEFAULT: u8 = 7;

    pub fn new(value: i32) -> Self {
        Self(value.clamp(1, 9) as u8)
    }

    pub fn from_setting(value: i32) -> Self {
        if value == 0 {
            Self(Self::DEFAULT)
        } else {
            Self::new(value)
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Tiff,
    Webp,
}

impl ContainerFormat {
    /// Case-insensitive lookup of a requested type, including JPEG's
    /// historical extensions.
    pub fn from_type(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "jpe" | "jif" | "jfif" | "jfi" => Some(ContainerFormat::Jpeg),
            "png" => Some(ContainerFormat::Png),
            "tiff" | "tif" => Some(ContainerFormat::Tiff),
            "webp" => Some(ContainerFormat::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Jpeg => "jpeg",
            ContainerFormat::Png => "png",
            ContainerFormat::Tiff => "tiff",
            ContainerFormat::Webp => "webp",
        };
        f.write_str(name)
    }
}
