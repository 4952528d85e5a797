//! Batch driver: every output profile applied to every input image.
//!
//! ```text
//! per image (parallel):
//!   read → decode → auto-rotate (policy) → strip metadata
//!   per profile (sorted by name):
//!     name output → plan transform → [exists? skip] → transform → encode → write
//! ```
//!
//! ## Failure isolation
//!
//! Nothing in here returns early for the whole batch. A file that cannot be
//! read or decoded fails as one [`ImageReport`]; a profile that cannot be
//! rendered for one image fails as one [`RenditionReport`] and the next
//! profile still runs. Only configuration problems, caught before
//! [`process`] is called, stop a run.
//!
//! ## Output layout
//!
//! ```text
//! colorkeep -o out shoot/day1/photo.JPG   (profiles: thumb, web)
//!
//! out/
//! └── shoot/day1/
//!     ├── photo_thumb.jpg
//!     └── photo_web.webp
//! ```
//!
//! The input's directory is recreated under the output root. Only plain
//! name components are kept, so absolute paths and `..` never escape it.
//!
//! ## Idempotence
//!
//! The output name is computed before any pixel work. When the file exists
//! and overwriting is off, the pair is reported as
//! [`RenditionReport::Exists`] and skipped, so a second run over the same
//! tree writes nothing. Dimensions and profiles are still checked first, so
//! a profile that has gone missing since the last run is reported rather
//! than hidden behind the existing file.
//!
//! ## Parallel Processing
//!
//! Images are processed in parallel using [rayon](https://docs.rs/rayon);
//! profiles of one image run sequentially so the decoded source is shared.
//! The profile cache is prewarmed before fan-out. One [`ProcessEvent`] per
//! image goes to an optional channel for live output.

use crate::encode::{EncodeError, encode, resolve_format};
use crate::imaging::{EngineError, Image, ImagingEngine, ORIENTATION_KEY};
use crate::naming::TemplateValues;
use crate::profiles::{CacheStats, ProfileCache};
use crate::transform::{self, SAME, TransformError};
use crate::types::{BatchJob, OutputProfile, RotationPolicy};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};

/// Property key prefixes removed from every decoded image.
const METADATA_PREFIXES: &[&str] = &["exif", "iptc", "xmp"];

/// Terminal failure for one input image.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("{0}")]
    Read(#[from] io::Error),
    #[error("{0}")]
    Decode(EngineError),
    #[error("{0}")]
    Rotate(EngineError),
}

/// Terminal failure for one (image, profile) pair.
#[derive(Error, Debug)]
pub enum PairError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("{path}: {source}")]
    Path { path: PathBuf, source: io::Error },
    #[error("{0}: not a directory")]
    NotADirectory(PathBuf),
}

/// Outcome of one output profile for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RenditionReport {
    Written { profile: String, output: PathBuf },
    Exists { profile: String, output: PathBuf },
    Failed { profile: String, message: String },
}

impl RenditionReport {
    pub fn profile(&self) -> &str {
        match self {
            RenditionReport::Written { profile, .. }
            | RenditionReport::Exists { profile, .. }
            | RenditionReport::Failed { profile, .. } => profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ImageOutcome {
    /// Nothing was attempted for any profile.
    Failed { message: String },
    /// One entry per profile, in profile-name order.
    Processed { renditions: Vec<RenditionReport> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub source: PathBuf,
    #[serde(flatten)]
    pub outcome: ImageOutcome,
}

impl ImageReport {
    pub fn renditions(&self) -> &[RenditionReport] {
        match &self.outcome {
            ImageOutcome::Processed { renditions } => renditions,
            ImageOutcome::Failed { .. } => &[],
        }
    }
}

/// Per-image results in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub images: Vec<ImageReport>,
    pub profile_cache: CacheStats,
}

/// Counts over a [`BatchReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub images: usize,
    pub failed_images: usize,
    pub written: usize,
    pub existing: usize,
    pub failed_renditions: usize,
}

impl BatchReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            images: self.images.len(),
            ..Default::default()
        };
        for image in &self.images {
            if let ImageOutcome::Failed { .. } = image.outcome {
                summary.failed_images += 1;
            }
            for rendition in image.renditions() {
                match rendition {
                    RenditionReport::Written { .. } => summary.written += 1,
                    RenditionReport::Exists { .. } => summary.existing += 1,
                    RenditionReport::Failed { .. } => summary.failed_renditions += 1,
                }
            }
        }
        summary
    }

    /// True when any image or rendition failed.
    pub fn has_failures(&self) -> bool {
        let s = self.summary();
        s.failed_images > 0 || s.failed_renditions > 0
    }
}

/// Progress event sent once per finished image.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    ImageProcessed { report: ImageReport },
}

/// Run `job` to completion.
///
/// Never fails as a whole; see the [module docs](self) for how failures are
/// recorded.
pub fn process<E: ImagingEngine>(
    engine: &E,
    job: &BatchJob,
    events: Option<Sender<ProcessEvent>>,
) -> BatchReport {
    let ctx = ProcessContext::new(engine, job);

    let images: Vec<ImageReport> = job
        .inputs
        .par_iter()
        .map(|source| {
            let report = ctx.process_image(source);
            if let Some(tx) = &events {
                tx.send(ProcessEvent::ImageProcessed {
                    report: report.clone(),
                })
                .ok();
            }
            report
        })
        .collect();

    BatchReport {
        images,
        profile_cache: ctx.profiles.stats(),
    }
}

/// Shared, read-only state for one run.
struct ProcessContext<'a, E: ImagingEngine> {
    engine: &'a E,
    job: &'a BatchJob,
    profiles: ProfileCache,
}

impl<'a, E: ImagingEngine> ProcessContext<'a, E> {
    fn new(engine: &'a E, job: &'a BatchJob) -> Self {
        let profiles = ProfileCache::new();
        for err in profiles.prewarm(engine, job.profile_names()) {
            // Reported again by every pair that needs it.
            warn!("{err}");
        }
        Self {
            engine,
            job,
            profiles,
        }
    }

    fn process_image(&self, source: &Path) -> ImageReport {
        let outcome = match self.load(source) {
            Err(e) => {
                debug!(source = %source.display(), error = %e, "image failed");
                ImageOutcome::Failed {
                    message: e.to_string(),
                }
            }
            Ok((bytes, image)) => {
                let renditions = self
                    .job
                    .profiles
                    .values()
                    .map(|profile| self.process_pair(source, &bytes, &image, profile))
                    .collect();
                ImageOutcome::Processed { renditions }
            }
        };
        ImageReport {
            source: source.to_path_buf(),
            outcome,
        }
    }

    fn load(&self, source: &Path) -> Result<(Vec<u8>, Image), ImageError> {
        let bytes = fs::read(source)?;
        let decoded = self.engine.decode(&bytes).map_err(ImageError::Decode)?;
        let image = normalize(self.engine, &decoded, self.job.rotation)?;
        Ok((bytes, image))
    }

    fn process_pair(
        &self,
        source: &Path,
        bytes: &[u8],
        image: &Image,
        profile: &OutputProfile,
    ) -> RenditionReport {
        match self.render(source, bytes, image, profile) {
            Ok(report) => report,
            Err(e) => RenditionReport::Failed {
                profile: profile.name.clone(),
                message: e.to_string(),
            },
        }
    }

    fn render(
        &self,
        source: &Path,
        bytes: &[u8],
        image: &Image,
        profile: &OutputProfile,
    ) -> Result<RenditionReport, PairError> {
        let input_ext = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut rendition = profile.rendition.clone();
        if rendition.format.is_empty() || rendition.format.eq_ignore_ascii_case(SAME) {
            rendition.format = input_ext.clone();
        }
        let (_, extension) = resolve_format(&rendition.format)?;

        let name = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename = format!(
            "{}.{}",
            self.job.template.render(&TemplateValues {
                name: &name,
                profile: &profile.name,
                ext: &input_ext,
                source: bytes,
            }),
            extension
        );
        let dir = output_dir(&self.job.output_root, source);
        ensure_dir(&dir)?;
        let output = dir.join(filename);

        let plan = transform::plan(self.engine, &self.profiles, image, &profile.transform)?;
        if !self.job.overwrite && output.exists() {
            return Ok(RenditionReport::Exists {
                profile: profile.name.clone(),
                output,
            });
        }

        let transformed = transform::run(self.engine, image, plan)?;
        let encoded = encode(self.engine, &transformed, &rendition)?;
        drop(transformed);

        fs::write(&output, &encoded.bytes).map_err(|source| PairError::Path {
            path: output.clone(),
            source,
        })?;
        debug!(output = %output.display(), bytes = encoded.bytes.len(), "rendition written");
        Ok(RenditionReport::Written {
            profile: profile.name.clone(),
            output,
        })
    }
}

/// Apply the orientation tag, then drop all metadata properties.
///
/// The ICC profile survives; it describes the pixels, not the capture.
pub fn normalize<E: ImagingEngine>(
    engine: &E,
    image: &Image,
    policy: RotationPolicy,
) -> Result<Image, ImageError> {
    let rotated = match engine.auto_rotate(image) {
        Ok(rotated) => rotated,
        Err(e) => match policy {
            RotationPolicy::Fallback => {
                debug!(error = %e, "auto-rotate failed, keeping stored orientation");
                image.clone()
            }
            RotationPolicy::SkipImage => return Err(ImageError::Rotate(e)),
        },
    };
    Ok(rotated.without_properties(is_metadata_key))
}

/// Properties removed by [`normalize`].
pub fn is_metadata_key(key: &str) -> bool {
    key == ORIENTATION_KEY || METADATA_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Output directory for `source`: the root plus the source's directory,
/// keeping only plain name components.
pub fn output_dir(root: &Path, source: &Path) -> PathBuf {
    let mut dir = root.to_path_buf();
    if let Some(parent) = source.parent() {
        dir.extend(parent.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        }));
    }
    dir
}

fn ensure_dir(dir: &Path) -> Result<(), PairError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PairError::NotADirectory(dir.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|source| PairError::Path {
                path: dir.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(PairError::Path {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
