//! Calibration profile registry
//!
//! One JSON document per hardware revision:
//!
//! ```json
//! {
//!   "name": "adc-shunt-v2",
//!   "hardware_revision": "2.0",
//!   "description": "...",
//!   "calibration": { "revision": 2, "adc": { ... }, ... }
//! }
//! ```

use std::collections::BTreeMap;

use include_dir::{include_dir, Dir};
use inverter_core::CalibrationConfig;
use serde::{Deserialize, Serialize};

use crate::SchemaError;

static PROFILE_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/profiles");

/// Profile used when a deployment names none
pub const DEFAULT_PROFILE: &str = "adc-shunt-v2";

/// A named calibration for one hardware revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Registry key, matches the file stem
    pub name: String,
    /// Board revision the calibration was measured on
    pub hardware_revision: String,
    /// Free text
    #[serde(default)]
    pub description: String,
    /// Calibration values
    pub calibration: CalibrationConfig,
}

impl Profile {
    /// Parse and validate one profile document
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let profile: Profile = serde_json::from_str(json)?;
        profile
            .calibration
            .validate()
            .map_err(|source| SchemaError::InvalidProfile { profile: profile.name.clone(), source })?;
        Ok(profile)
    }
}

/// Validated profiles indexed by name
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every profile embedded in the binary
    ///
    /// Fails on the first profile that does not parse or validate.
    pub fn load_embedded() -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        for file in PROFILE_DIR.files() {
            if file.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = file
                .contents_utf8()
                .ok_or_else(|| SchemaError::NotFound(file.path().display().to_string()))?;
            registry.register(Profile::from_json(json)?);
        }
        Ok(registry)
    }

    /// Add or replace a profile
    pub fn register(&mut self, profile: Profile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Profile by name
    pub fn get(&self, name: &str) -> Result<&Profile, SchemaError> {
        self.profiles.get(name).ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }

    /// Calibration of the named profile
    pub fn calibration(&self, name: &str) -> Result<CalibrationConfig, SchemaError> {
        self.get(name).map(|profile| profile.calibration)
    }

    /// Registered profile names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// No profiles registered
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

lazy_static::lazy_static! {
    /// Embedded profiles, loaded on first use
    ///
    /// Empty if any embedded profile is broken; the unit tests load them
    /// through [`ProfileRegistry::load_embedded`] so that never ships.
    pub static ref BUILTIN_PROFILES: ProfileRegistry =
        ProfileRegistry::load_embedded().unwrap_or_default();
}
