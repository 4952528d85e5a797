//! CLI output formatting.
//!
//! # One line per unit
//!
//! Every file the run touches gets exactly one line per outcome, led by the
//! path the user would look at: the input for failures that happen before an
//! output name exists, the output for everything after.
//!
//! ```text
//! shoot/notes.txt: not an image, skipping
//! shoot/broken.jpg: decode: failed to fill whole buffer
//! shoot/a.jpg: error while processing profile print: profile print.icc not found: ...
//! out/shoot/a_thumb.jpg: already exists, skipping
//! out/shoot/a_web.webp: OK
//!
//! 2 images: 1 written, 1 existing, 1 failed, 1 image failed
//! Profiles: 3 cached, 2 loaded (5 total)
//! ```
//!
//! # Architecture
//!
//! Each message has a `format_*` function (returns `String` or
//! `Vec<String>`) for testability and, where main needs it, a `print_*`
//! wrapper that writes to stdout. Format functions are pure: no I/O, no
//! side effects.

use crate::process::{BatchReport, ImageOutcome, ImageReport, ProcessEvent, RenditionReport};
use std::path::{Path, PathBuf};

pub fn format_skipped(path: &Path) -> String {
    format!("{}: not an image, skipping", path.display())
}

pub fn format_no_images() -> String {
    "No images to process".to_string()
}

/// Lines for one finished image: its failure, or one line per profile.
pub fn format_image_report(report: &ImageReport) -> Vec<String> {
    let source = report.source.display();
    match &report.outcome {
        ImageOutcome::Failed { message } => vec![format!("{source}: {message}")],
        ImageOutcome::Processed { renditions } => renditions
            .iter()
            .map(|r| match r {
                RenditionReport::Written { output, .. } => format!("{}: OK", output.display()),
                RenditionReport::Exists { output, .. } => {
                    format!("{}: already exists, skipping", output.display())
                }
                RenditionReport::Failed { profile, message } => {
                    format!("{source}: error while processing profile {profile}: {message}")
                }
            })
            .collect(),
    }
}

pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::ImageProcessed { report } => format_image_report(report),
    }
}

/// Closing lines: counts, then profile cache activity.
pub fn format_summary(report: &BatchReport) -> Vec<String> {
    let s = report.summary();
    let mut counts = format!(
        "{} {}: {} written, {} existing, {} failed",
        s.images,
        plural(s.images, "image", "images"),
        s.written,
        s.existing,
        s.failed_renditions
    );
    if s.failed_images > 0 {
        counts.push_str(&format!(
            ", {} {} failed",
            s.failed_images,
            plural(s.failed_images, "image", "images")
        ));
    }
    vec![counts, format!("Profiles: {}", report.profile_cache)]
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}

pub fn print_skipped(paths: &[PathBuf]) {
    for path in paths {
        println!("{}", format_skipped(path));
    }
}

pub fn print_summary(report: &BatchReport) {
    println!();
    for line in format_summary(report) {
        println!("{}", line);
    }
}
