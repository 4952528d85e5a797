//! In-memory image model shared by every engine operation.
//!
//! An [`Image`] is two things glued together:
//!
//! - **Pixels** behind an [`Arc`]. Either device-encoded samples straight from
//!   a decoder ([`Pixels::Device`]) or scene-linear samples in the connection
//!   space ([`Pixels::Linear`]) after an ICC import.
//! - A **property side-table**: ICC profile bytes, EXIF/XMP/IPTC blobs, one
//!   text entry per decoded EXIF field, and the orientation tag.
//!
//! Every operation returns a new `Image`. Attaching a profile or stripping
//! metadata clones the side-table and shares the pixel buffer, so the
//! decoded original stays valid for the next output profile.

use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb32FImage, Rgba32FImage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Embedded ICC profile (blob).
pub const ICC_PROFILE_KEY: &str = "icc-profile-data";
/// EXIF orientation tag, 1-8 (int).
pub const ORIENTATION_KEY: &str = "orientation";
/// Raw EXIF TIFF structure (blob).
pub const EXIF_KEY: &str = "exif-data";
/// Raw XMP packet (blob).
pub const XMP_KEY: &str = "xmp-data";
/// Raw IPTC-IIM block (blob).
pub const IPTC_KEY: &str = "iptc-data";

/// Key for one decoded EXIF field, e.g. `exif-ifd0-Make`.
pub fn exif_field_key(ifd: usize, tag: &str) -> String {
    format!("exif-ifd{ifd}-{tag}")
}

/// A single side-table value.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Int(i64),
    Text(String),
    Blob(Arc<[u8]>),
}

impl Property {
    pub fn blob(bytes: impl Into<Arc<[u8]>>) -> Self {
        Property::Blob(bytes.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Property::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Arc<[u8]>> {
        match self {
            Property::Blob(b) => Some(b),
            _ => None,
        }
    }
}

/// Scene-linear samples in the connection space.
///
/// RGB variants hold linear-light sRGB primaries (extended range, values may
/// leave 0..1); gray variants hold linear luminance.
#[derive(Debug, Clone)]
pub enum LinearBuffer {
    Gray(ImageBuffer<Luma<f32>, Vec<f32>>),
    GrayAlpha(ImageBuffer<LumaA<f32>, Vec<f32>>),
    Rgb(Rgb32FImage),
    Rgba(Rgba32FImage),
}

impl LinearBuffer {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            LinearBuffer::Gray(b) => b.dimensions(),
            LinearBuffer::GrayAlpha(b) => b.dimensions(),
            LinearBuffer::Rgb(b) => b.dimensions(),
            LinearBuffer::Rgba(b) => b.dimensions(),
        }
    }

    pub fn bands(&self) -> u8 {
        match self {
            LinearBuffer::Gray(_) => 1,
            LinearBuffer::GrayAlpha(_) => 2,
            LinearBuffer::Rgb(_) => 3,
            LinearBuffer::Rgba(_) => 4,
        }
    }

    pub fn is_gray(&self) -> bool {
        matches!(self, LinearBuffer::Gray(_) | LinearBuffer::GrayAlpha(_))
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, LinearBuffer::GrayAlpha(_) | LinearBuffer::Rgba(_))
    }

    /// Interleaved samples, channel order matching [`bands`](Self::bands).
    pub fn samples(&self) -> &[f32] {
        match self {
            LinearBuffer::Gray(b) => b.as_raw(),
            LinearBuffer::GrayAlpha(b) => b.as_raw(),
            LinearBuffer::Rgb(b) => b.as_raw(),
            LinearBuffer::Rgba(b) => b.as_raw(),
        }
    }
}

/// Pixel storage of an [`Image`].
#[derive(Debug, Clone)]
pub enum Pixels {
    Device(DynamicImage),
    Linear(LinearBuffer),
}

/// How the pixel values should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation {
    /// 8-bit device gray.
    BW,
    /// 16-bit device gray.
    Grey16,
    /// 8-bit device RGB.
    Srgb,
    /// 16-bit (or float) device RGB.
    Rgb16,
    /// Linear-light RGB in the connection space.
    Scrgb,
    /// Linear gray in the connection space.
    LinearGrey,
}

impl Interpretation {
    pub fn is_gray(self) -> bool {
        matches!(
            self,
            Interpretation::BW | Interpretation::Grey16 | Interpretation::LinearGrey
        )
    }
}

/// Immutable pixels plus an owned property side-table.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: Arc<Pixels>,
    properties: BTreeMap<String, Property>,
}

impl Image {
    pub fn new(pixels: Pixels) -> Self {
        Self {
            pixels: Arc::new(pixels),
            properties: BTreeMap::new(),
        }
    }

    pub fn from_device(image: DynamicImage) -> Self {
        Self::new(Pixels::Device(image))
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    /// `true` when both values share one pixel buffer.
    pub fn shares_pixels_with(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match &*self.pixels {
            Pixels::Device(d) => (d.width(), d.height()),
            Pixels::Linear(l) => l.dimensions(),
        }
    }

    pub fn bands(&self) -> u8 {
        match &*self.pixels {
            Pixels::Device(d) => d.color().channel_count(),
            Pixels::Linear(l) => l.bands(),
        }
    }

    pub fn interpretation(&self) -> Interpretation {
        match &*self.pixels {
            Pixels::Linear(l) if l.is_gray() => Interpretation::LinearGrey,
            Pixels::Linear(_) => Interpretation::Scrgb,
            Pixels::Device(d) => match d {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => Interpretation::BW,
                DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                    Interpretation::Grey16
                }
                DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Interpretation::Srgb,
                _ => Interpretation::Rgb16,
            },
        }
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Property keys in sorted order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn icc_profile(&self) -> Option<&Arc<[u8]>> {
        self.property(ICC_PROFILE_KEY).and_then(Property::as_blob)
    }

    pub fn orientation(&self) -> Option<&Property> {
        self.property(ORIENTATION_KEY)
    }

    /// Same pixels, one more (or replaced) property.
    pub fn with_property(&self, key: impl Into<String>, value: Property) -> Image {
        let mut properties = self.properties.clone();
        properties.insert(key.into(), value);
        Image {
            pixels: Arc::clone(&self.pixels),
            properties,
        }
    }

    pub fn with_icc_profile(&self, profile: Arc<[u8]>) -> Image {
        self.with_property(ICC_PROFILE_KEY, Property::Blob(profile))
    }

    /// Same pixels, every property matching `remove` dropped.
    pub fn without_properties(&self, remove: impl Fn(&str) -> bool) -> Image {
        let properties = self
            .properties
            .iter()
            .filter(|(k, _)| !remove(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Image {
            pixels: Arc::clone(&self.pixels),
            properties,
        }
    }

    /// New pixels, same side-table.
    pub fn with_pixels(&self, pixels: Pixels) -> Image {
        Image {
            pixels: Arc::new(pixels),
            properties: self.properties.clone(),
        }
    }
}
