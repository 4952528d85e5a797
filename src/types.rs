//! Shared types describing one batch run.
//!
//! These are the validated, runtime form of the configuration: built once
//! by [`config`](crate::config) and read by every worker for the rest of
//! the run.

use crate::naming::FilenameTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Target size and profiles for one rendition.
///
/// A zero axis is unconstrained; at least one must be positive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSpec {
    pub width: u32,
    pub height: u32,
    /// Empty (or `same`) means "choose from the pixel interpretation".
    pub input_profile: String,
    /// Empty inherits the input profile; `same` keeps the embedded one.
    pub output_profile: String,
}

/// Container and encoder settings for one rendition.
///
/// `quality` and `compression` are raw configured values; `0` selects the
/// default and anything else is clamped when the encoder runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenditionSpec {
    pub format: String,
    pub quality: i32,
    pub compression: i32,
}

/// One named output profile ("thumbnail", "web", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputProfile {
    pub name: String,
    pub transform: TransformSpec,
    pub rendition: RenditionSpec,
}

/// What to do when an image carries an orientation tag that cannot be
/// applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationPolicy {
    /// Continue with the pixels as stored.
    #[default]
    Fallback,
    /// Report the image as failed and produce no renditions.
    SkipImage,
}

/// Everything a run needs, resolved and immutable.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub inputs: Vec<PathBuf>,
    /// Sorted by name, so reporting order is stable.
    pub profiles: BTreeMap<String, OutputProfile>,
    pub output_root: PathBuf,
    pub template: FilenameTemplate,
    pub overwrite: bool,
    pub rotation: RotationPolicy,
}

impl BatchJob {
    /// Every profile name the run will resolve, input and output, without
    /// the sentinel values that resolve per image.
    pub fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .profiles
            .values()
            .flat_map(|p| [p.transform.input_profile.as_str(), p.transform.output_profile.as_str()])
            .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case("same"))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, input: &str, output: &str) -> OutputProfile {
        OutputProfile {
            name: name.to_string(),
            transform: TransformSpec {
                width: 100,
                input_profile: input.to_string(),
                output_profile: output.to_string(),
                ..Default::default()
            },
            rendition: RenditionSpec::default(),
        }
    }

    #[test]
    fn profile_names_skip_sentinels_and_dedup() {
        let mut profiles = BTreeMap::new();
        profiles.insert("a".to_string(), profile("a", "srgb", "same"));
        profiles.insert("b".to_string(), profile("b", "", "srgb"));
        profiles.insert("c".to_string(), profile("c", "gray", "/icc/print.icc"));

        let job = BatchJob {
            inputs: vec![],
            profiles,
            output_root: PathBuf::from("."),
            template: FilenameTemplate::parse("{name}").unwrap(),
            overwrite: false,
            rotation: RotationPolicy::default(),
        };
        assert_eq!(job.profile_names(), vec!["/icc/print.icc", "gray", "srgb"]);
    }

    #[test]
    fn rotation_policy_serde_names() {
        #[derive(Deserialize)]
        struct Wrap {
            policy: RotationPolicy,
        }
        let w: Wrap = toml::from_str(r#"policy = "skip-image""#).unwrap();
        assert_eq!(w.policy, RotationPolicy::SkipImage);
        let w: Wrap = toml::from_str(r#"policy = "fallback""#).unwrap();
        assert_eq!(w.policy, RotationPolicy::Fallback);
    }
}
