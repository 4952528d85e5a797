//! Production imaging engine, built from pure-Rust crates plus libwebp.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` + `ImageDecoder` metadata accessors |
//! | TIFF ICC tag | `tiff::decoder::Decoder` (tag 34675) |
//! | EXIF side-table | `kamadak-exif` (`exif::Reader::read_raw`) |
//! | Auto-rotate | `image::DynamicImage::apply_orientation` |
//! | ICC import / export | `moxcms` float transforms, relative colorimetric |
//! | Resize | `image::imageops::resize` with `Lanczos3` |
//! | Encode → JPEG / PNG | `image` encoders with `set_icc_profile` |
//! | Encode → TIFF | `tiff` encoder, ICC written as tag 34675 |
//! | Encode → WebP (lossy) | `webp` (libwebp), ICC chunk added by `img-parts` |
//!
//! ## Connection space
//!
//! Imports land in a scene-linear working space: linear-light sRGB
//! primaries for colour profiles, linear luminance for gray profiles.
//! Transforms run in `f32` with extended range enabled, so wide-gamut input
//! survives the round trip until the final export clips to the target.

use super::backend::{EngineError, ImagingEngine};
use super::calculations::scaled_dimensions;
use super::model::{
    EXIF_KEY, ICC_PROFILE_KEY, IPTC_KEY, Image, LinearBuffer, ORIENTATION_KEY, Pixels, Property,
    XMP_KEY, exif_field_key,
};
use super::params::{Compression, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{self, CompressionType, PngEncoder};
use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageBuffer, ImageDecoder, ImageEncoder, ImageFormat, ImageReader};
use img_parts::ImageICC;
use moxcms::{
    ColorProfile, DataColorSpace, Layout, RenderingIntent, TransformOptions, curve_from_gamma,
};
use std::borrow::Cow;
use std::io::{Cursor, Seek, Write};
use std::path::PathBuf;
use tiff::encoder::{TiffEncoder, TiffValue, colortype};
use tiff::tags::Tag;
use tracing::{debug, warn};

/// Extensions tried after the bare name when searching profile directories.
const PROFILE_SUFFIXES: &[&str] = &["", ".icc", ".icm"];

/// Production engine.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone)]
pub struct RustEngine {
    profile_dirs: Vec<PathBuf>,
}

impl RustEngine {
    /// Engine that searches the platform's standard ICC directories.
    pub fn new() -> Self {
        Self {
            profile_dirs: system_profile_dirs(),
        }
    }

    /// Search `dirs` first, then the platform's standard ICC directories.
    pub fn with_profile_dirs(dirs: Vec<PathBuf>) -> Self {
        let mut profile_dirs = dirs;
        profile_dirs.extend(system_profile_dirs());
        Self { profile_dirs }
    }

    fn profile_candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(name)];
        for dir in &self.profile_dirs {
            for suffix in PROFILE_SUFFIXES {
                candidates.push(dir.join(format!("{name}{suffix}")));
            }
        }
        candidates
    }
}

impl Default for RustEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn system_profile_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/color/icc"),
        PathBuf::from("/usr/local/share/color/icc"),
        PathBuf::from("/Library/ColorSync/Profiles"),
    ];
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        dirs.push(home.join(".local/share/icc"));
        dirs.push(home.join(".color/icc"));
        dirs.push(home.join("Library/ColorSync/Profiles"));
    }
    if let Some(root) = std::env::var_os("SystemRoot").map(PathBuf::from) {
        dirs.push(root.join("System32").join("spool").join("drivers").join("color"));
    }
    dirs
}

// ============================================================================
// Working space and transforms
// ============================================================================

fn linear_rgb_profile() -> ColorProfile {
    let mut profile = ColorProfile::new_srgb();
    let linear = curve_from_gamma(1.0);
    profile.red_trc = Some(linear.clone());
    profile.green_trc = Some(linear.clone());
    profile.blue_trc = Some(linear);
    // The sRGB CICP tag would otherwise override the linear curves.
    profile.cicp = None;
    profile
}

fn linear_gray_profile() -> ColorProfile {
    ColorProfile::new_gray_with_gamma(1.0)
}

fn transform_options() -> TransformOptions {
    TransformOptions {
        rendering_intent: RenderingIntent::RelativeColorimetric,
        allow_use_cicp_transfer: false,
        prefer_fixed_point: false,
        allow_extended_range_rgb_xyz: true,
        ..Default::default()
    }
}

fn parse_profile(bytes: &[u8], op: &'static str) -> Result<ColorProfile, EngineError> {
    ColorProfile::new_from_slice(bytes).map_err(|e| EngineError::new(op, e))
}

/// Layout for a profile's colour space, with or without alpha.
fn layout_for(space: DataColorSpace, alpha: bool, op: &'static str) -> Result<Layout, EngineError> {
    match (space, alpha) {
        (DataColorSpace::Gray, false) => Ok(Layout::Gray),
        (DataColorSpace::Gray, true) => Ok(Layout::GrayAlpha),
        (DataColorSpace::Rgb, false) => Ok(Layout::Rgb),
        (DataColorSpace::Rgb, true) => Ok(Layout::Rgba),
        (other, _) => Err(EngineError::new(
            op,
            format!("unsupported profile colour space {other:?}"),
        )),
    }
}

fn run_transform(
    source: &ColorProfile,
    source_layout: Layout,
    target: &ColorProfile,
    target_layout: Layout,
    samples: &[f32],
    op: &'static str,
) -> Result<Vec<f32>, EngineError> {
    let transform = source
        .create_transform_f32(source_layout, target, target_layout, transform_options())
        .map_err(|e| EngineError::new(op, e))?;
    let pixel_count = samples.len() / source_layout.channels();
    let mut out = vec![0.0f32; pixel_count * target_layout.channels()];
    transform
        .transform(samples, &mut out)
        .map_err(|e| EngineError::new(op, e))?;
    Ok(out)
}

fn linear_buffer(
    layout: Layout,
    (w, h): (u32, u32),
    samples: Vec<f32>,
    op: &'static str,
) -> Result<LinearBuffer, EngineError> {
    let buffer = match layout {
        Layout::Gray => ImageBuffer::from_raw(w, h, samples).map(LinearBuffer::Gray),
        Layout::GrayAlpha => ImageBuffer::from_raw(w, h, samples).map(LinearBuffer::GrayAlpha),
        Layout::Rgb => ImageBuffer::from_raw(w, h, samples).map(LinearBuffer::Rgb),
        Layout::Rgba => ImageBuffer::from_raw(w, h, samples).map(LinearBuffer::Rgba),
        _ => None,
    };
    buffer.ok_or_else(|| EngineError::new(op, "transform produced a short buffer"))
}

/// Clip to the target gamut and round to 8-bit device pixels.
fn quantize(layout: Layout, (w, h): (u32, u32), samples: &[f32]) -> Option<DynamicImage> {
    let raw: Vec<u8> = samples
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    match layout {
        Layout::Gray => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
        Layout::GrayAlpha => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageLumaA8),
        Layout::Rgb => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
        Layout::Rgba => ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgba8),
        _ => None,
    }
}

// ============================================================================
// Decode helpers
// ============================================================================

/// Attach the EXIF blob, one text property per decoded field, and the
/// primary orientation tag.
fn with_exif(image: Image, mut raw: Vec<u8>) -> Image {
    if raw.starts_with(b"Exif\0\0") {
        raw.drain(..6);
    }
    let mut image = image.with_property(EXIF_KEY, Property::blob(raw.clone()));
    let exif = match exif::Reader::new().read_raw(raw) {
        Ok(exif) => exif,
        Err(e) => {
            debug!("unreadable EXIF block: {e}");
            return image;
        }
    };
    for field in exif.fields() {
        let key = exif_field_key(field.ifd_num.index() as usize, &field.tag.to_string());
        image = image.with_property(key, Property::Text(field.display_value().to_string()));
    }
    if let Some(orientation) = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
    {
        image = image.with_property(ORIENTATION_KEY, Property::Int(orientation as i64));
    }
    image
}

/// `image` looks the TIFF ICC tag up under a key that never matches, so
/// read it with `tiff` directly.
fn tiff_icc_profile(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = tiff::decoder::Decoder::new(Cursor::new(bytes)).ok()?;
    decoder.get_tag_u8_vec(Tag::IccProfile).ok()
}

/// Keep an embedded profile only if it can describe the decoded pixels.
///
/// Decoders hand back gray or RGB samples; a CMYK or Lab profile no longer
/// matches them, and the image falls back to its interpretation default.
fn usable_profile(icc: Vec<u8>) -> Option<Vec<u8>> {
    match ColorProfile::new_from_slice(&icc) {
        Ok(profile) if !matches!(profile.color_space, DataColorSpace::Rgb | DataColorSpace::Gray) => {
            warn!(
                colour_space = ?profile.color_space,
                "embedded profile does not match decoded pixels, ignoring it"
            );
            None
        }
        _ => Some(icc),
    }
}

fn device_pixels<'a>(image: &'a Image, op: &'static str) -> Result<&'a DynamicImage, EngineError> {
    match image.pixels() {
        Pixels::Device(d) => Ok(d),
        Pixels::Linear(_) => Err(EngineError::new(
            op,
            "image is still in the connection space",
        )),
    }
}

// ============================================================================
// Encode helpers
// ============================================================================

/// Float device pixels have no integer container representation; widen
/// them to 16 bits.
fn integer_pixels(device: &DynamicImage) -> Cow<'_, DynamicImage> {
    match device {
        DynamicImage::ImageRgb32F(_) => Cow::Owned(DynamicImage::ImageRgb16(device.to_rgb16())),
        DynamicImage::ImageRgba32F(_) => Cow::Owned(DynamicImage::ImageRgba16(device.to_rgba16())),
        other => Cow::Borrowed(other),
    }
}

fn write_tiff<W, C>(
    encoder: &mut TiffEncoder<W>,
    (w, h): (u32, u32),
    data: &[C::Inner],
    icc: Option<&[u8]>,
) -> tiff::TiffResult<()>
where
    W: Write + Seek,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(w, h)?;
    if let Some(icc) = icc {
        image.encoder().write_tag(Tag::IccProfile, icc)?;
    }
    image.write_data(data)
}

fn is_gray_profile(icc: &[u8]) -> bool {
    ColorProfile::new_from_slice(icc).is_ok_and(|p| p.color_space == DataColorSpace::Gray)
}

fn embed_icc_webp(encoded: Vec<u8>, icc: &[u8]) -> Result<Vec<u8>, EngineError> {
    use img_parts::Bytes;
    use img_parts::webp::WebP;

    let mut webp = WebP::from_bytes(Bytes::from(encoded))
        .map_err(|e| EngineError::new("encode_webp", format!("re-reading WebP: {e}")))?;
    webp.set_icc_profile(Some(Bytes::from(icc.to_vec())));

    let mut out = Vec::new();
    webp.encoder()
        .write_to(&mut out)
        .map_err(|e| EngineError::new("encode_webp", e))?;
    Ok(out)
}

impl ImagingEngine for RustEngine {
    fn decode(&self, bytes: &[u8]) -> Result<Image, EngineError> {
        const OP: &str = "decode";
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| EngineError::new(OP, e))?;
        let Some(format) = reader.format() else {
            return Err(EngineError::new(OP, "unrecognised image format"));
        };
        let mut decoder = reader.into_decoder().map_err(|e| EngineError::new(OP, e))?;

        // Metadata accessors must run before the decoder is consumed.
        let mut icc = decoder.icc_profile().ok().flatten();
        if icc.is_none() && format == ImageFormat::Tiff {
            icc = tiff_icc_profile(bytes);
        }
        let exif = decoder.exif_metadata().ok().flatten();
        let xmp = decoder.xmp_metadata().ok().flatten();
        let iptc = decoder.iptc_metadata().ok().flatten();

        let pixels = DynamicImage::from_decoder(decoder).map_err(|e| EngineError::new(OP, e))?;
        let mut image = Image::from_device(pixels);

        if let Some(icc) = icc.filter(|p| !p.is_empty()).and_then(usable_profile) {
            image = image.with_property(ICC_PROFILE_KEY, Property::blob(icc));
        }
        if let Some(exif) = exif.filter(|e| !e.is_empty()) {
            image = with_exif(image, exif);
        }
        if let Some(xmp) = xmp {
            image = image.with_property(XMP_KEY, Property::blob(xmp));
        }
        if let Some(iptc) = iptc {
            image = image.with_property(IPTC_KEY, Property::blob(iptc));
        }
        Ok(image)
    }

    fn auto_rotate(&self, image: &Image) -> Result<Image, EngineError> {
        const OP: &str = "auto_rotate";
        let Some(tag) = image.orientation() else {
            return Ok(image.clone());
        };
        let orientation = tag
            .as_int()
            .and_then(|v| u8::try_from(v).ok())
            .and_then(Orientation::from_exif)
            .ok_or_else(|| EngineError::new(OP, format!("invalid orientation tag {tag:?}")))?;
        let upright = image.without_properties(|k| k == ORIENTATION_KEY);
        if orientation == Orientation::NoTransforms {
            return Ok(upright);
        }
        let mut rotated = device_pixels(image, OP)?.clone();
        rotated.apply_orientation(orientation);
        Ok(upright.with_pixels(Pixels::Device(rotated)))
    }

    fn import_from_profile(&self, image: &Image) -> Result<Image, EngineError> {
        const OP: &str = "import_from_profile";
        let icc = image
            .icc_profile()
            .ok_or_else(|| EngineError::new(OP, "no input profile attached"))?;
        let source = parse_profile(icc, OP)?;
        let device = device_pixels(image, OP)?;
        let dims = (device.width(), device.height());
        let layout = layout_for(source.color_space, device.color().has_alpha(), OP)?;

        // Pixels are read in the profile's colour space, so a gray profile on
        // RGB data (or the reverse) is reconciled before the transform.
        let samples = match layout {
            Layout::Gray => device.to_luma32f().into_raw(),
            Layout::GrayAlpha => device.to_luma_alpha32f().into_raw(),
            Layout::Rgb => device.to_rgb32f().into_raw(),
            _ => device.to_rgba32f().into_raw(),
        };
        let working = match source.color_space {
            DataColorSpace::Gray => linear_gray_profile(),
            _ => linear_rgb_profile(),
        };
        let out = run_transform(&source, layout, &working, layout, &samples, OP)?;
        let linear = linear_buffer(layout, dims, out, OP)?;
        Ok(image.with_pixels(Pixels::Linear(linear)))
    }

    fn resize(&self, image: &Image, x_scale: f64, y_scale: f64) -> Result<Image, EngineError> {
        if !(x_scale.is_finite() && y_scale.is_finite() && x_scale > 0.0 && y_scale > 0.0) {
            return Err(EngineError::new(
                "resize",
                format!("invalid scale {x_scale}x{y_scale}"),
            ));
        }
        let (w, h) = scaled_dimensions(image.dimensions(), x_scale, y_scale);
        let filter = FilterType::Lanczos3;
        let pixels = match image.pixels() {
            Pixels::Device(d) => Pixels::Device(d.resize_exact(w, h, filter)),
            Pixels::Linear(l) => Pixels::Linear(match l {
                LinearBuffer::Gray(b) => LinearBuffer::Gray(imageops::resize(b, w, h, filter)),
                LinearBuffer::GrayAlpha(b) => {
                    LinearBuffer::GrayAlpha(imageops::resize(b, w, h, filter))
                }
                LinearBuffer::Rgb(b) => LinearBuffer::Rgb(imageops::resize(b, w, h, filter)),
                LinearBuffer::Rgba(b) => LinearBuffer::Rgba(imageops::resize(b, w, h, filter)),
            }),
        };
        Ok(image.with_pixels(pixels))
    }

    fn export_to_profile(&self, image: &Image) -> Result<Image, EngineError> {
        const OP: &str = "export_to_profile";
        let icc = image
            .icc_profile()
            .ok_or_else(|| EngineError::new(OP, "no output profile attached"))?;
        let target = parse_profile(icc, OP)?;
        let Pixels::Linear(linear) = image.pixels() else {
            return Err(EngineError::new(OP, "image is not in the connection space"));
        };
        let alpha = linear.has_alpha();
        let (working, source_layout) = if linear.is_gray() {
            (linear_gray_profile(), layout_for(DataColorSpace::Gray, alpha, OP)?)
        } else {
            (linear_rgb_profile(), layout_for(DataColorSpace::Rgb, alpha, OP)?)
        };
        let target_layout = layout_for(target.color_space, alpha, OP)?;

        let out = run_transform(
            &working,
            source_layout,
            &target,
            target_layout,
            linear.samples(),
            OP,
        )?;
        let device = quantize(target_layout, linear.dimensions(), &out)
            .ok_or_else(|| EngineError::new(OP, "transform produced a short buffer"))?;
        Ok(image.with_pixels(Pixels::Device(device)))
    }

    fn encode_jpeg(&self, image: &Image, quality: Quality) -> Result<Vec<u8>, EngineError> {
        const OP: &str = "encode_jpeg";
        let device = device_pixels(image, OP)?;
        // Baseline JPEG: 8-bit, no alpha.
        let flat = if device.color().has_color() {
            DynamicImage::ImageRgb8(device.to_rgb8())
        } else {
            DynamicImage::ImageLuma8(device.to_luma8())
        };

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.value());
        if let Some(icc) = image.icc_profile() {
            encoder
                .set_icc_profile(icc.to_vec())
                .map_err(|e| EngineError::new(OP, e))?;
        }
        encoder
            .write_image(flat.as_bytes(), flat.width(), flat.height(), flat.color().into())
            .map_err(|e| EngineError::new(OP, e))?;
        Ok(out)
    }

    fn encode_png(&self, image: &Image, compression: Compression) -> Result<Vec<u8>, EngineError> {
        const OP: &str = "encode_png";
        let device = integer_pixels(device_pixels(image, OP)?);

        let mut out = Vec::new();
        let mut encoder = PngEncoder::new_with_quality(
            &mut out,
            CompressionType::Level(compression.value()),
            png::FilterType::Adaptive,
        );
        if let Some(icc) = image.icc_profile() {
            encoder
                .set_icc_profile(icc.to_vec())
                .map_err(|e| EngineError::new(OP, e))?;
        }
        encoder
            .write_image(
                device.as_bytes(),
                device.width(),
                device.height(),
                device.color().into(),
            )
            .map_err(|e| EngineError::new(OP, e))?;
        Ok(out)
    }

    fn encode_tiff(&self, image: &Image) -> Result<Vec<u8>, EngineError> {
        const OP: &str = "encode_tiff";
        let device = device_pixels(image, OP)?;
        let dims = (device.width(), device.height());
        let icc = image.icc_profile().map(|p| &p[..]);

        let mut out = Cursor::new(Vec::new());
        let mut encoder = TiffEncoder::new(&mut out).map_err(|e| EngineError::new(OP, e))?;
        let written = match device {
            DynamicImage::ImageLuma8(b) => {
                write_tiff::<_, colortype::Gray8>(&mut encoder, dims, b.as_raw(), icc)
            }
            DynamicImage::ImageLuma16(b) => {
                write_tiff::<_, colortype::Gray16>(&mut encoder, dims, b.as_raw(), icc)
            }
            DynamicImage::ImageRgb8(b) => {
                write_tiff::<_, colortype::RGB8>(&mut encoder, dims, b.as_raw(), icc)
            }
            DynamicImage::ImageRgb16(b) => {
                write_tiff::<_, colortype::RGB16>(&mut encoder, dims, b.as_raw(), icc)
            }
            DynamicImage::ImageRgba16(b) => {
                write_tiff::<_, colortype::RGBA16>(&mut encoder, dims, b.as_raw(), icc)
            }
            other => {
                let rgba = other.to_rgba8();
                write_tiff::<_, colortype::RGBA8>(&mut encoder, dims, rgba.as_raw(), icc)
            }
        };
        written.map_err(|e| EngineError::new(OP, e))?;
        drop(encoder);
        Ok(out.into_inner())
    }

    fn encode_webp(
        &self,
        image: &Image,
        quality: Quality,
        lossless: bool,
    ) -> Result<Vec<u8>, EngineError> {
        const OP: &str = "encode_webp";
        let device = device_pixels(image, OP)?;
        let (w, h) = (device.width(), device.height());

        let encoded = if device.color().has_alpha() {
            let rgba = device.to_rgba8();
            webp::Encoder::from_rgba(rgba.as_raw(), w, h)
                .encode_simple(lossless, quality.value() as f32)
                .map(|mem| mem.to_vec())
        } else {
            let rgb = device.to_rgb8();
            webp::Encoder::from_rgb(rgb.as_raw(), w, h)
                .encode_simple(lossless, quality.value() as f32)
                .map(|mem| mem.to_vec())
        }
        .map_err(|e| EngineError::new(OP, format!("{e:?}")))?;

        // WebP always stores RGB; a gray profile would misdescribe it.
        match image.icc_profile() {
            Some(icc) if !is_gray_profile(icc) => embed_icc_webp(encoded, icc),
            Some(_) => {
                debug!("gray profile not embedded in RGB WebP");
                Ok(encoded)
            }
            None => Ok(encoded),
        }
    }

    fn load_profile(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        const OP: &str = "load_profile";
        for candidate in self.profile_candidates(name) {
            if !candidate.is_file() {
                continue;
            }
            let bytes = std::fs::read(&candidate).map_err(|e| {
                EngineError::new(OP, format!("{}: {e}", candidate.display()))
            })?;
            parse_profile(&bytes, OP).map_err(|e| {
                EngineError::new(OP, format!("{}: {}", candidate.display(), e.message))
            })?;
            debug!(profile = name, path = %candidate.display(), "loaded ICC profile");
            return Ok(bytes);
        }
        Err(EngineError::new(
            OP,
            format!("{name}: no such profile file or installed profile"),
        ))
    }
}
