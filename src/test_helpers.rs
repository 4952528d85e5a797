//! Shared fixture builders for the colorkeep test suite.
//!
//! Encoded test images are generated in memory rather than checked in, so
//! every fixture states exactly what it carries (profile, orientation,
//! channel layout).
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let bytes = jpeg_with_orientation(60, 40, 6);
//! let image = RustEngine::new().decode(&bytes).unwrap();
//! assert_eq!(image.orientation().and_then(Property::as_int), Some(6));
//! ```

use crate::profiles::BundledProfile;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, Luma, Rgb, RgbImage};

// =========================================================================
// ICC profiles
// =========================================================================

pub fn srgb_profile_bytes() -> Vec<u8> {
    BundledProfile::Srgb.icc_bytes().unwrap()
}

pub fn gray_profile_bytes() -> Vec<u8> {
    BundledProfile::Gray.icc_bytes().unwrap()
}

// =========================================================================
// EXIF
// =========================================================================

/// Little-endian TIFF structure with a single IFD0 Orientation entry, as
/// stored after the `Exif\0\0` marker.
pub fn exif_orientation(orientation: u8) -> Vec<u8> {
    vec![
        0x49, 0x49, 0x2A, 0x00, // "II", 42
        0x08, 0x00, 0x00, 0x00, // IFD0 at offset 8
        0x01, 0x00, // one entry
        0x12, 0x01, // tag 0x0112 Orientation
        0x03, 0x00, // SHORT
        0x01, 0x00, 0x00, 0x00, // count 1
        orientation, 0x00, 0x00, 0x00, // value
        0x00, 0x00, 0x00, 0x00, // no next IFD
    ]
}

// =========================================================================
// Encoded images
// =========================================================================

/// A `w`x`h` gradient JPEG with the bundled sRGB profile and an EXIF
/// orientation tag.
pub fn jpeg_with_orientation(w: u32, h: u32, orientation: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, 90);
    encoder.set_icc_profile(srgb_profile_bytes()).unwrap();
    encoder
        .set_exif_metadata(exif_orientation(orientation))
        .unwrap();
    encoder
        .write_image(img.as_raw(), w, h, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// An 8-bit grayscale PNG with no embedded profile.
pub fn png_gray(w: u32, h: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(w, h, |x, _| Luma([(x * 8) as u8]));
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), w, h, ExtendedColorType::L8)
        .unwrap();
    out
}
