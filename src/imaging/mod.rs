//! Image model and the engine that touches pixels.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` + decoder metadata (ICC, EXIF, XMP, IPTC) |
//! | **Auto-rotate** | `image::DynamicImage::apply_orientation` |
//! | **Import / export** | `moxcms` float transforms |
//! | **Resize** | Lanczos3 via `image::imageops` |
//! | **Encode** | `image` (JPEG, PNG), `tiff`, `webp` + `img-parts` |
//!
//! The module is split into:
//! - **Model**: [`Image`], an immutable pixel buffer plus a property side-table
//! - **Calculations**: pure dimension math (unit testable)
//! - **Parameters**: clamped encoder settings and ICC options
//! - **Backend**: [`ImagingEngine`] trait + [`RustEngine`]

pub mod backend;
pub(crate) mod calculations;
pub mod model;
mod params;
pub mod rust_backend;

pub use backend::{EngineError, ImagingEngine};
pub use calculations::{scale_factor, scaled_dimensions};
pub use model::{
    EXIF_KEY, ICC_PROFILE_KEY, IPTC_KEY, Image, Interpretation, LinearBuffer, ORIENTATION_KEY,
    Pixels, Property, XMP_KEY,
};
pub use params::{Compression, ContainerFormat, Quality};
pub use rust_backend::RustEngine;
