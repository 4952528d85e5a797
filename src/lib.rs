//! # colorkeep
//!
//! Color-managed batch renditions. Every configured output profile is
//! applied to every input image, producing thumbnails and re-encoded copies
//! whose colours match the source.
//!
//! # Pipeline
//!
//! ```text
//! paths ──scan──▶ worklist ──process (per image, parallel)──▶ BatchReport
//!                               │
//!                               ├─ decode → auto-rotate → strip metadata
//!                               └─ per profile:
//!                                    transform  (ICC import → resize → ICC export)
//!                                    encode     (JPEG / PNG / WebP / TIFF)
//!                                    write      (template name, skip existing)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Expands input paths into image files, one level or recursively |
//! | [`process`] | Batch driver: failure isolation, output routing, reports |
//! | [`transform`] | Profile policy and the color-managed resize |
//! | [`encode`] | Container selection and encoder settings |
//! | [`profiles`] | ICC profile resolution, bundled profiles, run-wide cache |
//! | [`imaging`] | Image model, engine trait, pure-Rust engine, dimension math |
//! | [`naming`] | Output filename templates |
//! | [`config`] | TOML job configuration and command-line resolution |
//! | [`types`] | Validated job types shared by all workers |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Resize in linear light
//!
//! Averaging gamma-encoded samples darkens edges and fine detail. Images are
//! imported through their ICC profile into a scene-linear working space,
//! resized there, and only then exported into the output profile, so a
//! thumbnail keeps the tonality of its source.
//!
//! ## Policy as data
//!
//! Which profile governs an image is decided by short ordered rule chains in
//! [`transform`], not by nested conditionals. The chains are constants that
//! tests can read and the docs can tabulate.
//!
//! ## Engine behind a trait
//!
//! All pixel work goes through [`imaging::ImagingEngine`]. Policy and
//! orchestration are tested against a recording mock; the production
//! [`imaging::RustEngine`] is tested on its own with real codecs.
//!
//! ## Idempotent by default
//!
//! Output names are computed before any pixel work and existing files are
//! skipped unless rewriting is enabled, so a second run over the same tree
//! writes nothing and a run interrupted half way can simply be restarted.

pub mod config;
pub mod encode;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod profiles;
pub mod scan;
pub mod transform;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
