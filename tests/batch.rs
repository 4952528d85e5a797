//! End-to-end runs through the public API with the real engine.
//!
//! Fixtures are encoded in memory with the `image` crate and written to a
//! temp directory; outputs are decoded again and checked for size,
//! orientation and embedded profile.

use colorkeep::config::{self, CliOverrides};
use colorkeep::imaging::{ImagingEngine, RustEngine};
use colorkeep::process::{self, ImageOutcome, RenditionReport, output_dir};
use colorkeep::profiles::BundledProfile;
use colorkeep::scan;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, Luma, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =========================================================================
// Fixtures
// =========================================================================

/// JPEG with the bundled sRGB profile and EXIF orientation 6 (rotate 90° CW).
fn rotated_jpeg(w: u32, h: u32) -> Vec<u8> {
    let exif = vec![
        0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x12, 0x01, 0x03, 0x00, 0x01,
        0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    let img = RgbImage::from_fn(w, h, |x, _| Rgb([(x % 256) as u8, 90, 160]));
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, 90);
    encoder
        .set_icc_profile(BundledProfile::Srgb.icc_bytes().unwrap())
        .unwrap();
    encoder.set_exif_metadata(exif).unwrap();
    encoder
        .write_image(img.as_raw(), w, h, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Grayscale PNG without an embedded profile.
fn gray_png(w: u32, h: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(w, h, |_, y| Luma([(y % 256) as u8]));
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), w, h, ExtendedColorType::L8)
        .unwrap();
    out
}

fn write_input(tmp: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let dir = tmp.path().join("in");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// Resolve `toml` as a `--config` file, with the output root under `tmp`.
fn job_config(tmp: &TempDir, toml: &str) -> config::JobConfig {
    let path = tmp.path().join("colorkeep.toml");
    fs::write(&path, toml).unwrap();
    let cli = CliOverrides {
        config: Some(path),
        output: Some(tmp.path().join("out").to_string_lossy().into_owned()),
        ..Default::default()
    };
    config::resolve(&cli, &[]).unwrap()
}

fn rendition(out: &Path, input: &Path, name: &str) -> PathBuf {
    output_dir(out, input).join(name)
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn rotated_jpeg_becomes_upright_thumbnail() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(&tmp, "photo.JPG", &rotated_jpeg(600, 400));
    let cfg = job_config(
        &tmp,
        r#"
[profiles.thumb]
width = 200
type = "jpg"
quality = 80
"#,
    );
    let job = config::build_job(&cfg, vec![input.clone()]).unwrap();
    let engine = RustEngine::new();

    let report = process::process(&engine, &job, None);

    let output = rendition(Path::new(&cfg.output), &input, "photo_thumb.jpg");
    assert_eq!(
        report.images[0].renditions(),
        &[RenditionReport::Written {
            profile: "thumb".into(),
            output: output.clone(),
        }]
    );
    let decoded = engine.decode(&fs::read(&output).unwrap()).unwrap();
    // 600x400 stored, 400x600 upright, 200 wide.
    assert_eq!(decoded.dimensions(), (200, 300));
    assert!(decoded.orientation().is_none());
    assert_eq!(
        decoded.icc_profile().map(|p| p.to_vec()),
        Some(BundledProfile::Srgb.icc_bytes().unwrap())
    );
}

#[test]
fn gray_png_gets_gray_profile() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(&tmp, "scan.png", &gray_png(400, 1000));
    let cfg = job_config(
        &tmp,
        r#"
[profiles.print]
height = 500
type = "png"
"#,
    );
    let job = config::build_job(&cfg, vec![input.clone()]).unwrap();
    let engine = RustEngine::new();

    let report = process::process(&engine, &job, None);
    assert!(!report.has_failures(), "{report:?}");

    let output = rendition(Path::new(&cfg.output), &input, "scan_print.png");
    let decoded = engine.decode(&fs::read(output).unwrap()).unwrap();
    assert_eq!(decoded.dimensions(), (200, 500));
    assert_eq!(decoded.bands(), 1);
    assert_eq!(
        decoded.icc_profile().map(|p| p.to_vec()),
        Some(BundledProfile::Gray.icc_bytes().unwrap())
    );
}

#[test]
fn unsupported_type_does_not_block_other_profiles() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(&tmp, "photo.jpg", &rotated_jpeg(64, 48));
    let cfg = job_config(
        &tmp,
        r#"
[profiles.legacy]
width = 32
type = "bmp"

[profiles.small]
width = 32
type = "webp"
quality = 70

[profiles.archive]
width = 32
type = "tiff"
"#,
    );
    let job = config::build_job(&cfg, vec![input.clone()]).unwrap();

    let report = process::process(&RustEngine::new(), &job, None);
    let renditions = report.images[0].renditions();

    assert!(matches!(&renditions[0], RenditionReport::Written { profile, .. } if profile == "archive"));
    match &renditions[1] {
        RenditionReport::Failed { profile, message } => {
            assert_eq!(profile, "legacy");
            assert!(message.contains("bmp"));
            assert!(message.contains("jpg, png, webp or tiff"));
        }
        other => panic!("expected legacy to fail, got {other:?}"),
    }
    assert!(matches!(&renditions[2], RenditionReport::Written { profile, .. } if profile == "small"));
    assert!(rendition(Path::new(&cfg.output), &input, "photo_small.webp").exists());
    assert!(rendition(Path::new(&cfg.output), &input, "photo_archive.tiff").exists());
}

#[test]
fn second_run_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    write_input(&tmp, "a.jpg", &rotated_jpeg(40, 30));
    write_input(&tmp, "b.png", &gray_png(30, 40));
    write_input(&tmp, "notes.txt", b"not an image");
    let cfg = job_config(
        &tmp,
        r#"
[profiles.thumb]
width = 10
type = "same"
"#,
    );

    let scanned = scan::collect_images(&[tmp.path().join("in")], false).unwrap();
    assert_eq!(scanned.images.len(), 2);
    assert_eq!(scanned.skipped.len(), 1);
    let job = config::build_job(&cfg, scanned.images).unwrap();
    let engine = RustEngine::new();

    let first = process::process(&engine, &job, None).summary();
    assert_eq!((first.written, first.existing), (2, 0));

    let second = process::process(&engine, &job, None);
    let summary = second.summary();
    assert_eq!((summary.written, summary.existing), (0, 2));
    assert_eq!(summary.failed_renditions, 0);
}

#[test]
fn corrupt_input_fails_alone() {
    let tmp = TempDir::new().unwrap();
    let broken = write_input(&tmp, "broken.jpg", b"\xFF\xD8 truncated");
    let good = write_input(&tmp, "good.png", &gray_png(20, 20));
    let cfg = job_config(&tmp, "[profiles.t]\nwidth = 10\ntype = \"png\"\n");
    let job = config::build_job(&cfg, vec![broken, good]).unwrap();

    let report = process::process(&RustEngine::new(), &job, None);
    assert!(matches!(report.images[0].outcome, ImageOutcome::Failed { .. }));
    assert_eq!(report.images[1].renditions().len(), 1);
    assert_eq!(report.summary().written, 1);
}
