//! Rendition encoder: an exported image plus container settings in, file
//! bytes out.
//!
//! Settings arrive raw from the configuration and are clamped here, so the
//! engine only ever sees valid values. Every container embeds the image's
//! ICC profile when one is attached.

use crate::imaging::{Compression, ContainerFormat, EngineError, Image, ImagingEngine, Quality};
use crate::types::RenditionSpec;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unsupported file type {0}, use jpg, png, webp or tiff")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Encoded bytes and the extension the output file should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRendition {
    pub bytes: Vec<u8>,
    /// The requested type, lowercased (`JPG` → `jpg`, `jpeg` stays `jpeg`).
    pub extension: String,
}

/// Container and output extension for a requested type.
///
/// Lets callers name the output file before doing any pixel work.
pub fn resolve_format(requested: &str) -> Result<(ContainerFormat, String), EncodeError> {
    let format = ContainerFormat::from_type(requested)
        .ok_or_else(|| EncodeError::UnsupportedFormat(requested.to_string()))?;
    Ok((format, requested.to_ascii_lowercase()))
}

/// Encode `image` into the container `spec.format` names.
pub fn encode<E: ImagingEngine>(
    engine: &E,
    image: &Image,
    spec: &RenditionSpec,
) -> Result<EncodedRendition, EncodeError> {
    let (format, extension) = resolve_format(&spec.format)?;

    let bytes = match format {
        ContainerFormat::Jpeg => engine.encode_jpeg(image, Quality::from_setting(spec.quality))?,
        ContainerFormat::Png => {
            engine.encode_png(image, Compression::from_setting(spec.compression))?
        }
        ContainerFormat::Tiff => engine.encode_tiff(image)?,
        ContainerFormat::Webp => {
            engine.encode_webp(image, Quality::from_setting(spec.quality), false)?
        }
    };

    Ok(EncodedRendition { bytes, extension })
}
