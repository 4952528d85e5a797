//! Job configuration.
//!
//! A run is described by a TOML file or, for a quick one-off, by command-line
//! flags. The two are exclusive: flags that define a profile build a
//! single-profile job on their own, and combining them with `--config` is an
//! error rather than a silent merge.
//!
//! ## Resolution order
//!
//! 1. Profile flags (`--width`, `--height`, `--input-profile`,
//!    `--output-profile`) → one profile named `thumbnail`, type `same`.
//! 2. `--config <file>`.
//! 3. First existing of `colorkeep.toml`, `.colorkeep.toml`,
//!    `~/.colorkeep.toml`.
//!
//! Nothing found is fatal. `--output`, `--format` and `--rewrite` override
//! whatever the chosen source says.
//!
//! ## Configuration Options
//!
//! ```toml
//! output = "."                  # Output root
//! format = "{name}_{profile}"   # Filename template, see naming.rs
//! rewrite = false               # Overwrite existing outputs
//! on_rotate_error = "fallback"  # or "skip-image"
//! profile_dirs = []             # Extra ICC search directories
//!
//! [processing]
//! max_processes = 4             # Max parallel workers (omit for auto = CPU cores)
//!
//! [profiles.thumbnail]
//! width = 200                   # 0 = unconstrained
//! height = 0
//! input_profile = ""            # "" = by pixel interpretation
//! output_profile = ""           # "" = same as input, "same" = keep embedded
//! type = "jpg"                  # jpg, png, webp, tiff; "" or "same" = input's type
//! quality = 80                  # 1-100, 0 = 95
//! compression = 0               # PNG 1-9, 0 = 7
//! ```
//!
//! Unknown keys are rejected everywhere.

use crate::naming::{FilenameTemplate, TemplateError};
use crate::types::{BatchJob, OutputProfile, RenditionSpec, RotationPolicy, TransformSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_OUTPUT: &str = ".";
pub const DEFAULT_FORMAT: &str = "{name}_{profile}";
/// Profile name used when the job comes from command-line flags.
pub const CLI_PROFILE: &str = "thumbnail";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: TOML parse error: {source}", .path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("no config found, searched at: {}", display_paths(.0))]
    NotFound(Vec<PathBuf>),
    #[error("either external or cli config should be present, not both")]
    Conflict,
    #[error("invalid format: {0}")]
    Template(#[from] TemplateError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Job configuration as written in `colorkeep.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub output: String,
    pub format: String,
    pub rewrite: bool,
    pub on_rotate_error: RotationPolicy,
    /// Searched before the platform's ICC directories.
    pub profile_dirs: Vec<PathBuf>,
    pub processing: ProcessingConfig,
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            output: DEFAULT_OUTPUT.to_string(),
            format: DEFAULT_FORMAT.to_string(),
            rewrite: false,
            on_rotate_error: RotationPolicy::default(),
            profile_dirs: Vec::new(),
            processing: ProcessingConfig::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// One `[profiles.<name>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    pub width: u32,
    pub height: u32,
    pub input_profile: String,
    pub output_profile: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub quality: i32,
    pub compression: i32,
}

impl JobConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::Validation(
                "at least one profile must be configured".into(),
            ));
        }
        if let Some(name) = self.profiles.keys().find(|n| n.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "profile name {name:?} must not be blank"
            )));
        }
        Ok(())
    }

    /// Empty `output` / `format` fall back to the defaults.
    fn fill_defaults(&mut self) {
        if self.output.is_empty() {
            self.output = DEFAULT_OUTPUT.to_string();
        }
        if self.format.is_empty() {
            self.format = DEFAULT_FORMAT.to_string();
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Command-line values that take part in resolution.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub output: Option<String>,
    pub format: Option<String>,
    pub rewrite: bool,
    pub width: u32,
    pub height: u32,
    pub input_profile: String,
    pub output_profile: String,
}

impl CliOverrides {
    /// True when flags alone define a profile.
    pub fn defines_profile(&self) -> bool {
        self.width != 0
            || self.height != 0
            || !self.input_profile.is_empty()
            || !self.output_profile.is_empty()
    }

    fn profile_config(&self) -> JobConfig {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            CLI_PROFILE.to_string(),
            ProfileConfig {
                width: self.width,
                height: self.height,
                input_profile: self.input_profile.clone(),
                output_profile: self.output_profile.clone(),
                kind: "same".to_string(),
                ..Default::default()
            },
        );
        JobConfig {
            profiles,
            ..Default::default()
        }
    }
}

/// Default search locations, in order.
pub fn default_search_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("colorkeep.toml"),
        PathBuf::from(".colorkeep.toml"),
    ];
    if let Some(home) = home {
        paths.push(home.join(".colorkeep.toml"));
    }
    paths
}

/// Load and validate one config file.
pub fn load_config(path: &Path) -> Result<JobConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Pick the configuration source and apply command-line overrides.
///
/// `search` is only consulted when neither profile flags nor `--config` are
/// given; see [`default_search_paths`].
pub fn resolve(cli: &CliOverrides, search: &[PathBuf]) -> Result<JobConfig, ConfigError> {
    let mut config = match (cli.defines_profile(), &cli.config) {
        (true, Some(_)) => return Err(ConfigError::Conflict),
        (true, None) => cli.profile_config(),
        (false, Some(path)) => load_config(path)?,
        (false, None) => match search.iter().find(|p| p.is_file()) {
            Some(path) => load_config(path)?,
            None => return Err(ConfigError::NotFound(search.to_vec())),
        },
    };

    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if let Some(format) = &cli.format {
        config.format = format.clone();
    }
    if cli.rewrite {
        config.rewrite = true;
    }
    config.fill_defaults();
    config.validate()?;
    Ok(config)
}

/// Turn a resolved configuration and the scanned inputs into a job.
///
/// The filename template is parsed here, so a malformed one stops the run
/// before any image is touched.
pub fn build_job(config: &JobConfig, inputs: Vec<PathBuf>) -> Result<BatchJob, ConfigError> {
    let template = FilenameTemplate::parse(&config.format)?;
    let profiles = config
        .profiles
        .iter()
        .map(|(name, p)| {
            let profile = OutputProfile {
                name: name.clone(),
                transform: TransformSpec {
                    width: p.width,
                    height: p.height,
                    input_profile: p.input_profile.clone(),
                    output_profile: p.output_profile.clone(),
                },
                rendition: RenditionSpec {
                    format: p.kind.clone(),
                    quality: p.quality,
                    compression: p.compression,
                },
            };
            (name.clone(), profile)
        })
        .collect();

    Ok(BatchJob {
        inputs,
        profiles,
        output_root: PathBuf::from(&config.output),
        template,
        overwrite: config.rewrite,
        rotation: config.on_rotate_error,
    })
}

/// Returns a fully-commented stock `colorkeep.toml`.
///
/// Used by the `--print-config` flag.
pub fn stock_config_toml() -> &'static str {
    r##"# colorkeep configuration
# =======================
# Place this file at ./colorkeep.toml, ./.colorkeep.toml or ~/.colorkeep.toml,
# or pass it with --config. Unknown keys will cause an error.

# Root directory for renditions. The input's own directory is recreated below it.
output = "."

# Output filename, without extension. Tokens:
#   {name}     input basename without extension
#   {profile}  profile name
#   {ext}      input extension
#   {rand}     8 random lowercase letters and digits
#   {hash}     first 12 hex digits of the SHA-256 of the input file
# Use {{ and }} for literal braces.
format = "{name}_{profile}"

# Overwrite renditions that already exist. When false, existing files are
# skipped, so repeated runs only fill in what is missing.
rewrite = false

# What to do when an orientation tag cannot be applied:
#   "fallback"    keep the pixels as stored
#   "skip-image"  report the image as failed
on_rotate_error = "fallback"

# Extra directories searched for ICC profiles given by name.
profile_dirs = []

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Profiles: one rendition per profile per image
# ---------------------------------------------------------------------------
[profiles.thumbnail]
# Target box in pixels. 0 leaves an axis unconstrained; at least one must be set.
# With both set, the image covers the box (larger scale factor wins).
width = 200
height = 0

# ICC profiles: a path, a name found in the ICC directories, or one of the
# bundled profiles gray, srgb, srgb-v2, srgb-v4.
# input_profile: used only when the image has no embedded profile;
#   empty picks gray or srgb from the pixels.
# output_profile: empty reuses the input profile; "same" keeps the embedded
#   profile and skips colour conversion.
input_profile = ""
output_profile = "srgb"

# Container: jpg, png, webp or tiff. Empty or "same" keeps the input's type.
type = "jpg"

# JPEG/WebP quality 1-100 (0 = 95). WebP is always lossy.
quality = 85

# PNG compression 1-9 (0 = 7).
compression = 0
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const ONE_PROFILE: &str = r#"
[profiles.web]
width = 1200
type = "webp"
quality = 80
"#;

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn parse_full_config() {
        let toml = r#"
output = "renditions"
format = "{name}-{profile}"
rewrite = true
on_rotate_error = "skip-image"
profile_dirs = ["/opt/icc"]

[processing]
max_processes = 2

[profiles.thumb]
width = 200
height = 100
input_profile = "srgb"
output_profile = "same"
type = "jpg"
quality = 80
compression = 3
"#;
        let config: JobConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.output, "renditions");
        assert!(config.rewrite);
        assert_eq!(config.on_rotate_error, RotationPolicy::SkipImage);
        assert_eq!(config.profile_dirs, vec![PathBuf::from("/opt/icc")]);
        assert_eq!(config.processing.max_processes, Some(2));
        let thumb = &config.profiles["thumb"];
        assert_eq!(thumb.kind, "jpg");
        assert_eq!((thumb.width, thumb.height), (200, 100));
        assert_eq!(thumb.compression, 3);
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let config: JobConfig = toml::from_str(ONE_PROFILE).unwrap();
        assert_eq!(config.output, ".");
        assert_eq!(config.format, "{name}_{profile}");
        assert!(!config.rewrite);
        assert_eq!(config.on_rotate_error, RotationPolicy::Fallback);
        assert_eq!(config.profiles["web"].height, 0);
        assert_eq!(config.profiles["web"].input_profile, "");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<JobConfig>("outptu = \"x\"").is_err());
        assert!(toml::from_str::<JobConfig>("[profiles.a]\nwidht = 3").is_err());
    }

    #[test]
    fn stock_config_is_valid() {
        let config: JobConfig = toml::from_str(stock_config_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.output, DEFAULT_OUTPUT);
        assert_eq!(config.format, DEFAULT_FORMAT);
        let thumb = &config.profiles[CLI_PROFILE];
        assert_eq!(thumb.width, 200);
        assert_eq!(thumb.kind, "jpg");
        assert_eq!(thumb.output_profile, "srgb");
        build_job(&config, vec![]).unwrap();
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "bad.toml", "output = [");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().starts_with(&path.display().to_string()));
    }

    #[test]
    fn load_config_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("none.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    #[test]
    fn cli_flags_build_thumbnail_profile() {
        let cli = CliOverrides {
            width: 300,
            output_profile: "srgb".into(),
            ..Default::default()
        };
        let config = resolve(&cli, &[]).unwrap();
        let thumb = &config.profiles[CLI_PROFILE];
        assert_eq!(thumb.width, 300);
        assert_eq!(thumb.kind, "same");
        assert_eq!(thumb.output_profile, "srgb");
        assert_eq!(config.output, ".");
    }

    #[test]
    fn cli_flags_and_config_conflict() {
        let cli = CliOverrides {
            height: 10,
            config: Some(PathBuf::from("x.toml")),
            ..Default::default()
        };
        assert!(matches!(resolve(&cli, &[]), Err(ConfigError::Conflict)));
    }

    #[test]
    fn explicit_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "job.toml", ONE_PROFILE);
        let cli = CliOverrides {
            config: Some(path),
            ..Default::default()
        };
        let config = resolve(&cli, &[]).unwrap();
        assert!(config.profiles.contains_key("web"));
    }

    #[test]
    fn search_takes_first_existing() {
        let tmp = TempDir::new().unwrap();
        let second = write(tmp.path(), "second.toml", ONE_PROFILE);
        let third = write(tmp.path(), "third.toml", "[profiles.other]\nwidth = 1");
        let search = vec![tmp.path().join("first.toml"), second, third];

        let config = resolve(&CliOverrides::default(), &search).unwrap();
        assert!(config.profiles.contains_key("web"));
        assert!(!config.profiles.contains_key("other"));
    }

    #[test]
    fn nothing_found_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let search = default_search_paths(Some(tmp.path()));
        let search: Vec<PathBuf> = search.into_iter().map(|p| tmp.path().join(p)).collect();
        let err = resolve(&CliOverrides::default(), &search).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(ref paths) if paths.len() == 3));
        assert!(err.to_string().starts_with("no config found, searched at: "));
    }

    #[test]
    fn default_search_order() {
        let paths = default_search_paths(Some(Path::new("/home/u")));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("colorkeep.toml"),
                PathBuf::from(".colorkeep.toml"),
                PathBuf::from("/home/u/.colorkeep.toml"),
            ]
        );
        assert_eq!(default_search_paths(None).len(), 2);
    }

    #[test]
    fn cli_overrides_file_values() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "job.toml",
            &format!("output = \"a\"\nformat = \"{{name}}\"\n{ONE_PROFILE}"),
        );
        let cli = CliOverrides {
            config: Some(path),
            output: Some("b".into()),
            rewrite: true,
            ..Default::default()
        };
        let config = resolve(&cli, &[]).unwrap();
        assert_eq!(config.output, "b");
        assert_eq!(config.format, "{name}");
        assert!(config.rewrite);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            tmp.path(),
            "job.toml",
            &format!("output = \"\"\nformat = \"\"\n{ONE_PROFILE}"),
        );
        let cli = CliOverrides {
            config: Some(path),
            ..Default::default()
        };
        let config = resolve(&cli, &[]).unwrap();
        assert_eq!(config.output, ".");
        assert_eq!(config.format, "{name}_{profile}");
    }

    #[test]
    fn config_without_profiles_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "job.toml", "output = \"x\"");
        let cli = CliOverrides {
            config: Some(path),
            ..Default::default()
        };
        assert!(matches!(resolve(&cli, &[]), Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // build_job
    // =========================================================================

    #[test]
    fn build_job_maps_profiles() {
        let mut config: JobConfig = toml::from_str(ONE_PROFILE).unwrap();
        config.rewrite = true;
        let job = build_job(&config, vec![PathBuf::from("a.jpg")]).unwrap();

        let web = &job.profiles["web"];
        assert_eq!(web.name, "web");
        assert_eq!(web.transform.width, 1200);
        assert_eq!(web.rendition.format, "webp");
        assert_eq!(web.rendition.quality, 80);
        assert!(job.overwrite);
        assert_eq!(job.output_root, PathBuf::from("."));
        assert_eq!(job.inputs, vec![PathBuf::from("a.jpg")]);
    }

    #[test]
    fn malformed_template_is_fatal() {
        let mut config: JobConfig = toml::from_str(ONE_PROFILE).unwrap();
        config.format = "{name".into();
        let err = build_job(&config, vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::Template(TemplateError::Unclosed)));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn default_processing_config() {
        let config = ProcessingConfig::default();
        assert_eq!(config.max_processes, None);
    }

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_zero_means_one() {
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }
}
