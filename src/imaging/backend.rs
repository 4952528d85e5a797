//! Imaging engine trait and shared error type.
//!
//! The [`ImagingEngine`] trait is the seam between rendition policy (which
//! profile, what scale, which container) and the libraries that touch
//! pixels. Policy code in [`transform`](crate::transform),
//! [`encode`](crate::encode) and [`process`](crate::process) only ever talks
//! to this trait.
//!
//! The production implementation is
//! [`RustEngine`](super::rust_backend::RustEngine). Tests use the recording
//! [`MockEngine`](tests::MockEngine) below.

use super::model::Image;
use super::params::{Compression, Quality};
use thiserror::Error;

/// A failed engine call, tagged with the operation that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{op}: {message}")]
pub struct EngineError {
    pub op: &'static str,
    pub message: String,
}

impl EngineError {
    pub fn new(op: &'static str, message: impl ToString) -> Self {
        Self {
            op,
            message: message.to_string(),
        }
    }
}

/// Every pixel-level operation the pipeline needs.
///
/// Implementations must be `Sync`: one engine is shared by all rayon workers.
/// No method mutates its input; each returns a new [`Image`].
pub trait ImagingEngine: Sync {
    /// Decode a complete file into pixels plus properties (ICC, EXIF, XMP,
    /// IPTC, orientation).
    fn decode(&self, bytes: &[u8]) -> Result<Image, EngineError>;

    /// Apply the orientation tag and drop it. Images without a tag pass
    /// through unchanged.
    fn auto_rotate(&self, image: &Image) -> Result<Image, EngineError>;

    /// Convert device pixels into the connection space using the attached
    /// ICC profile, relative colorimetric.
    fn import_from_profile(&self, image: &Image) -> Result<Image, EngineError>;

    /// Resample by independent horizontal and vertical factors.
    fn resize(&self, image: &Image, x_scale: f64, y_scale: f64) -> Result<Image, EngineError>;

    /// Convert connection-space pixels into the attached ICC profile,
    /// relative colorimetric, as 8-bit device pixels.
    fn export_to_profile(&self, image: &Image) -> Result<Image, EngineError>;

    fn encode_jpeg(&self, image: &Image, quality: Quality) -> Result<Vec<u8>, EngineError>;

    fn encode_png(&self, image: &Image, compression: Compression) -> Result<Vec<u8>, EngineError>;

    fn encode_tiff(&self, image: &Image) -> Result<Vec<u8>, EngineError>;

    fn encode_webp(
        &self,
        image: &Image,
        quality: Quality,
        lossless: bool,
    ) -> Result<Vec<u8>, EngineError>;

    /// Load ICC bytes for a name the engine understands (usually a path).
    fn load_profile(&self, name: &str) -> Result<Vec<u8>, EngineError>;
}
