//! ICC profile resolution with a process-lifetime cache.
//!
//! Every output profile of every image asks for one or two ICC profiles by
//! name. Loading and validating a profile file per request would dominate
//! small renditions, so resolved bytes are memoized for the life of the
//! [`ProfileCache`].
//!
//! # Resolution order
//!
//! 1. **Cache**: keyed by the name exactly as configured. `"sRGB"` and
//!    `"srgb"` are two entries that happen to hold the same bytes.
//! 2. **Bundled aliases** (case-insensitive): `gray`, `srgb`, `srgb-v2`,
//!    `srgb-v4`. These are synthesized with `moxcms` once per process, with
//!    a fixed header date, and never touch the filesystem.
//! 3. **Engine loader**: anything else goes to
//!    [`ImagingEngine::load_profile`], which treats the name as a path and
//!    then searches the platform's ICC directories.
//!
//! Failures are not cached; a missing profile is reported for every pair
//! that asks for it.
//!
//! # Concurrency
//!
//! The map sits behind one mutex held across the load, so a name is loaded
//! at most once even when rayon workers race for it. The batch driver
//! [`prewarm`](ProfileCache::prewarm)s every configured name before fan-out,
//! after which workers only take the lock for a lookup.

use crate::imaging::ImagingEngine;
use moxcms::{ColorProfile, DataColorSpace, LocalizableString, ProfileText, RenderingIntent};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Immutable ICC bytes shared between the cache and every image they are
/// attached to.
pub type ProfileBytes = Arc<[u8]>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("profile {name} not found: {reason}")]
    NotFound { name: String, reason: String },
    #[error("bundled profile {name} could not be built: {reason}")]
    Bundled { name: String, reason: String },
}

/// Creation date written into every bundled profile header, so an alias
/// yields the same bytes in every run.
const CREATION_DATE: [u16; 6] = [2024, 1, 1, 0, 0, 0];
/// Offset of the `dateTimeNumber` field in an ICC header.
const DATE_OFFSET: usize = 24;

static GRAY: OnceLock<Result<ProfileBytes, ProfileError>> = OnceLock::new();
static SRGB: OnceLock<Result<ProfileBytes, ProfileError>> = OnceLock::new();
static SRGB_V4: OnceLock<Result<ProfileBytes, ProfileError>> = OnceLock::new();

/// Profiles shipped inside the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundledProfile {
    /// Gray, gamma 2.2, D50.
    Gray,
    /// sRGB IEC 61966-2.1 with a CICP tag; answers to `srgb` and `srgb-v2`.
    Srgb,
    /// Plain ICC v4.0 sRGB: matrix and curves only, no CICP tag, perceptual
    /// header intent. Not the ICC's LUT-based v4 preference profile.
    SrgbV4,
}

impl BundledProfile {
    /// Case-insensitive alias lookup.
    pub fn from_alias(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gray" => Some(BundledProfile::Gray),
            "srgb" | "srgb-v2" => Some(BundledProfile::Srgb),
            "srgb-v4" => Some(BundledProfile::SrgbV4),
            _ => None,
        }
    }

    pub fn color_profile(self) -> ColorProfile {
        let (mut profile, description) = match self {
            BundledProfile::Gray => {
                let mut gray = ColorProfile::new_gray_with_gamma(2.2);
                gray.pcs = DataColorSpace::Xyz;
                (gray, "Gray gamma 2.2")
            }
            BundledProfile::Srgb => (ColorProfile::new_srgb(), "sRGB IEC61966-2.1"),
            BundledProfile::SrgbV4 => {
                let mut v4 = ColorProfile::new_srgb();
                // Without CICP the writer emits a v4.0 header.
                v4.cicp = None;
                v4.rendering_intent = RenderingIntent::Perceptual;
                (v4, "sRGB v4 matrix/TRC")
            }
        };
        profile.description = Some(ProfileText::Localizable(vec![LocalizableString::new(
            "en".to_string(),
            "US".to_string(),
            description.to_string(),
        )]));
        profile
    }

    /// Encoded ICC bytes, built once per process.
    pub fn shared(self) -> Result<ProfileBytes, ProfileError> {
        let cell = match self {
            BundledProfile::Gray => &GRAY,
            BundledProfile::Srgb => &SRGB,
            BundledProfile::SrgbV4 => &SRGB_V4,
        };
        cell.get_or_init(|| self.build()).clone()
    }

    /// Owned copy of [`shared`](Self::shared).
    pub fn icc_bytes(self) -> Result<Vec<u8>, ProfileError> {
        self.shared().map(|bytes| bytes.to_vec())
    }

    fn build(self) -> Result<ProfileBytes, ProfileError> {
        let mut bytes = self
            .color_profile()
            .encode()
            .map_err(|e| ProfileError::Bundled {
                name: self.to_string(),
                reason: e.to_string(),
            })?;
        pin_creation_date(&mut bytes);
        Ok(bytes.into())
    }
}

/// The encoder stamps the current time; the profile ID stays zero, so
/// nothing else depends on the date.
fn pin_creation_date(bytes: &mut [u8]) {
    for (i, part) in CREATION_DATE.iter().enumerate() {
        let at = DATE_OFFSET + 2 * i;
        if let Some(slot) = bytes.get_mut(at..at + 2) {
            slot.copy_from_slice(&part.to_be_bytes());
        }
    }
}

impl fmt::Display for BundledProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BundledProfile::Gray => "gray",
            BundledProfile::Srgb => "srgb",
            BundledProfile::SrgbV4 => "srgb-v4",
        })
    }
}

/// Lookup counters for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} loaded ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} loaded", self.misses)
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, ProfileBytes>,
    stats: CacheStats,
}

/// Name → ICC bytes, shared by all workers of a run.
#[derive(Debug, Default)]
pub struct ProfileCache {
    state: Mutex<CacheState>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` to ICC bytes. See the [module docs](self) for the order.
    pub fn resolve(
        &self,
        engine: &impl ImagingEngine,
        name: &str,
    ) -> Result<ProfileBytes, ProfileError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bytes) = state.entries.get(name) {
            let bytes = Arc::clone(bytes);
            state.stats.hits += 1;
            return Ok(bytes);
        }

        let bytes: ProfileBytes = match BundledProfile::from_alias(name) {
            Some(bundled) => bundled.shared()?,
            None => engine
                .load_profile(name)
                .map_err(|e| ProfileError::NotFound {
                    name: name.to_string(),
                    reason: e.message,
                })?
                .into(),
        };
        debug!(profile = name, bytes = bytes.len(), "profile cached");
        state.stats.misses += 1;
        state.entries.insert(name.to_string(), Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Resolve every name up front. Returns the failures; successes land in
    /// the cache.
    pub fn prewarm<'a>(
        &self,
        engine: &impl ImagingEngine,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<ProfileError> {
        names
            .into_iter()
            .filter_map(|name| self.resolve(engine, name).err())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockEngine, RecordedOp};

    fn loads(engine: &MockEngine) -> usize {
        engine
            .get_operations()
            .iter()
            .filter(|op| matches!(op, RecordedOp::LoadProfile(_)))
            .count()
    }

    #[test]
    fn aliases_are_case_insensitive() {
        assert_eq!(BundledProfile::from_alias("GRAY"), Some(BundledProfile::Gray));
        assert_eq!(BundledProfile::from_alias("sRGB"), Some(BundledProfile::Srgb));
        assert_eq!(BundledProfile::from_alias("srgb-V2"), Some(BundledProfile::Srgb));
        assert_eq!(BundledProfile::from_alias("SRGB-v4"), Some(BundledProfile::SrgbV4));
        assert_eq!(BundledProfile::from_alias("adobe"), None);
    }

    #[test]
    fn bundled_profiles_parse_back() {
        for bundled in [BundledProfile::Gray, BundledProfile::Srgb, BundledProfile::SrgbV4] {
            let bytes = bundled.icc_bytes().unwrap();
            let parsed = ColorProfile::new_from_slice(&bytes).unwrap();
            let expected = match bundled {
                BundledProfile::Gray => DataColorSpace::Gray,
                _ => DataColorSpace::Rgb,
            };
            assert_eq!(parsed.color_space, expected, "{bundled}");
        }
    }

    #[test]
    fn bundled_bytes_are_stable() {
        let first = BundledProfile::Srgb.shared().unwrap();
        let again = BundledProfile::Srgb.shared().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // A fresh encode differs only by the clock; pinning restores it.
        let mut rebuilt = BundledProfile::Srgb.color_profile().encode().unwrap();
        pin_creation_date(&mut rebuilt);
        assert_eq!(&rebuilt[..], &first[..]);
        assert_eq!(&first[DATE_OFFSET..DATE_OFFSET + 2], &2024u16.to_be_bytes());
    }

    #[test]
    fn srgb_v4_is_a_distinct_asset() {
        let v2 = BundledProfile::Srgb.shared().unwrap();
        let v4 = BundledProfile::SrgbV4.shared().unwrap();
        assert_ne!(v2, v4);

        let parsed = ColorProfile::new_from_slice(&v4).unwrap();
        assert_eq!(parsed.rendering_intent, RenderingIntent::Perceptual);
        assert!(parsed.cicp.is_none());
    }

    #[test]
    fn resolve_twice_loads_once() {
        let engine = MockEngine::new().with_profile("/icc/print.icc", b"print");
        let cache = ProfileCache::new();

        let first = cache.resolve(&engine, "/icc/print.icc").unwrap();
        let second = cache.resolve(&engine, "/icc/print.icc").unwrap();

        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads(&engine), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn bundled_alias_skips_engine() {
        let engine = MockEngine::new();
        let cache = ProfileCache::new();
        let upper = cache.resolve(&engine, "SRGB").unwrap();
        let lower = cache.resolve(&engine, "srgb").unwrap();

        assert_eq!(upper, lower);
        assert_eq!(loads(&engine), 0);
        // Keyed by the name as written: two misses.
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn missing_profile_is_not_cached() {
        let engine = MockEngine::new();
        let cache = ProfileCache::new();

        let err = cache.resolve(&engine, "nowhere.icc").unwrap_err();
        assert!(matches!(err, ProfileError::NotFound { ref name, .. } if name == "nowhere.icc"));
        assert!(cache.resolve(&engine, "nowhere.icc").is_err());
        assert_eq!(loads(&engine), 2);
    }

    #[test]
    fn prewarm_reports_failures_only() {
        let engine = MockEngine::new().with_profile("proof", b"p");
        let cache = ProfileCache::new();
        let failures = cache.prewarm(&engine, ["gray", "proof", "absent"]);

        assert_eq!(failures.len(), 1);
        assert!(cache.resolve(&engine, "proof").is_ok());
        assert_eq!(loads(&engine), 2);
    }

    #[test]
    fn cache_stats_display() {
        let s = CacheStats { hits: 5, misses: 2 };
        assert_eq!(s.to_string(), "5 cached, 2 loaded (7 total)");
        let s = CacheStats { hits: 0, misses: 3 };
        assert_eq!(s.to_string(), "3 loaded");
    }
}
