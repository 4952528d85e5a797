//! Color-managed resize: one decoded image in, one rendition's pixels out.
//!
//! ```text
//! validate → choose profiles → [fast path: resize in device space]
//!          → attach input profile (copy, only if none embedded)
//!          → import (relative) → resize in connection space
//!          → attach output profile (only if different) → export (relative, 8 bit)
//! ```
//!
//! Resampling happens on scene-linear values so that edges and fine detail
//! don't darken the way gamma-encoded averaging does, and the output is
//! re-encoded into exactly the profile the rendition asks for.
//!
//! # Profile choice
//!
//! Input and output profiles each fall through a short ordered chain of
//! [`Rule`]s; the first rule that yields a choice wins.
//!
//! | Side | Chain |
//! |---|---|
//! | input | configured name → pixel interpretation (`gray` / `srgb`) |
//! | output | `same` with an embedded profile → configured name → inherit input |
//!
//! `same` as an output profile is a fast path: the image is resized without
//! leaving device space and keeps its embedded profile. Without an embedded
//! profile there is nothing to keep, and the chain moves on.

use crate::imaging::{EngineError, Image, ImagingEngine, scale_factor};
use crate::profiles::{BundledProfile, ProfileBytes, ProfileCache, ProfileError};
use crate::types::TransformSpec;
use thiserror::Error;
use tracing::debug;

/// Sentinel accepted for both profile fields.
pub const SAME: &str = "same";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("either width or height should be greater than zero")]
    InvalidDimensions,
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Outcome of a profile chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileChoice {
    /// Resolve this name through the [`ProfileCache`].
    Named(String),
    /// Keep the profile the source already embeds.
    Embedded,
}

/// One link of a defaulting chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// The configured name, when it is neither empty nor `same`.
    Configured,
    /// `same`, honoured only when the image embeds a profile.
    KeepEmbedded,
    /// Gray interpretations get `gray`, everything else `srgb`.
    ByInterpretation,
    /// The effective input profile.
    InheritInput,
}

pub const INPUT_CHAIN: &[Rule] = &[Rule::Configured, Rule::ByInterpretation];
pub const OUTPUT_CHAIN: &[Rule] = &[Rule::KeepEmbedded, Rule::Configured, Rule::InheritInput];

fn is_unset(name: &str) -> bool {
    name.is_empty() || name.eq_ignore_ascii_case(SAME)
}

fn apply(
    rule: Rule,
    configured: &str,
    image: &Image,
    inherited: Option<&ProfileChoice>,
) -> Option<ProfileChoice> {
    match rule {
        Rule::Configured => {
            (!is_unset(configured)).then(|| ProfileChoice::Named(configured.to_string()))
        }
        Rule::KeepEmbedded => (configured.eq_ignore_ascii_case(SAME)
            && image.icc_profile().is_some())
        .then_some(ProfileChoice::Embedded),
        Rule::ByInterpretation => {
            let bundled = if image.interpretation().is_gray() {
                BundledProfile::Gray
            } else {
                BundledProfile::Srgb
            };
            Some(ProfileChoice::Named(bundled.to_string()))
        }
        Rule::InheritInput => inherited.cloned(),
    }
}

fn choose(
    chain: &[Rule],
    configured: &str,
    image: &Image,
    inherited: Option<&ProfileChoice>,
) -> Option<ProfileChoice> {
    chain
        .iter()
        .find_map(|rule| apply(*rule, configured, image, inherited))
}

/// Effective `(input, output)` profile choices for `image` under `spec`.
///
/// The input choice is always a name.
pub fn effective_profiles(spec: &TransformSpec, image: &Image) -> (String, ProfileChoice) {
    let input = match choose(INPUT_CHAIN, &spec.input_profile, image, None) {
        Some(ProfileChoice::Named(name)) => name,
        _ => BundledProfile::Srgb.to_string(),
    };
    let inherited = ProfileChoice::Named(input.clone());
    let output = choose(OUTPUT_CHAIN, &spec.output_profile, image, Some(&inherited))
        .unwrap_or(inherited);
    (input, output)
}

/// Everything [`run`] needs that can fail without touching pixels.
///
/// Built by [`plan`] for one image and one spec; the profile bytes come out
/// of the [`ProfileCache`].
#[derive(Debug, Clone)]
pub struct TransformPlan {
    scale: f64,
    profiles: PlannedProfiles,
}

#[derive(Debug, Clone)]
enum PlannedProfiles {
    /// `same` fast path, no colour conversion.
    Embedded,
    Convert {
        /// Attached before import; `None` when the image embeds a profile.
        input: Option<ProfileBytes>,
        output: ProfileBytes,
    },
}

/// Validate `spec` and resolve every profile `image` will need.
///
/// Configuration errors surface here, so the driver can report them even
/// when the rendition already exists and no pixel work follows.
pub fn plan<E: ImagingEngine>(
    engine: &E,
    profiles: &ProfileCache,
    image: &Image,
    spec: &TransformSpec,
) -> Result<TransformPlan, TransformError> {
    let scale = scale_factor(image.dimensions(), (spec.width, spec.height))
        .ok_or(TransformError::InvalidDimensions)?;
    let (input, output) = effective_profiles(spec, image);
    debug!(input = %input, output = ?output, scale, "profile policy");

    let profiles = match output {
        ProfileChoice::Embedded => PlannedProfiles::Embedded,
        ProfileChoice::Named(output) => PlannedProfiles::Convert {
            input: match image.icc_profile() {
                Some(_) => None,
                None => Some(profiles.resolve(engine, &input)?),
            },
            output: profiles.resolve(engine, &output)?,
        },
    };
    Ok(TransformPlan { scale, profiles })
}

/// Carry out `plan` on the image it was built for.
pub fn run<E: ImagingEngine>(
    engine: &E,
    image: &Image,
    plan: TransformPlan,
) -> Result<Image, TransformError> {
    let TransformPlan { scale, profiles } = plan;
    let (input, output_bytes) = match profiles {
        PlannedProfiles::Embedded => return Ok(engine.resize(image, scale, scale)?),
        PlannedProfiles::Convert { input, output } => (input, output),
    };

    let tagged = match input {
        Some(bytes) => image.with_icc_profile(bytes),
        None => image.clone(),
    };
    let imported = engine.import_from_profile(&tagged)?;
    drop(tagged);
    let resized = engine.resize(&imported, scale, scale)?;
    drop(imported);

    let retagged = match resized.icc_profile() {
        Some(attached) if attached[..] == output_bytes[..] => resized,
        _ => resized.with_icc_profile(output_bytes),
    };
    Ok(engine.export_to_profile(&retagged)?)
}

/// Resize `image` for `spec` and export it into the chosen output profile.
///
/// `image` is never modified; it can be reused for the next output profile.
pub fn transform<E: ImagingEngine>(
    engine: &E,
    profiles: &ProfileCache,
    image: &Image,
    spec: &TransformSpec,
) -> Result<Image, TransformError> {
    let plan = plan(engine, profiles, image, spec)?;
    run(engine, image, plan)
}
