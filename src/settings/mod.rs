//! Session settings
//!
//! Settings are persisted as a single JSON document. Loading overlays the
//! persisted document on the defaults, so missing fields keep their default
//! and unknown fields are ignored. A field holding a value of the wrong type
//! or out of range keeps its default. A document that is not a JSON object
//! is discarded in favour of the defaults.

mod store;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::memory;

pub use store::SettingsStore;

/// Key the settings document is stored under
pub const STORAGE_KEY: &str = "lexy_v2_core";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Cyan,
    Crimson,
    Emerald,
    Gold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub voice_enabled: bool,
    pub avatar_speed: f64,
    pub core_intensity: f64,
    pub user_name: String,
    pub memory_nodes: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Cyan,
            voice_enabled: true,
            avatar_speed: 1.2,
            core_intensity: 1.1,
            user_name: "Ryan Korir".to_string(),
            memory_nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Corrupt settings document: {0}")]
    Corrupt(String),

    #[error("Invalid setting: {0}")]
    Validation(String),

    #[error("Settings storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Settings {
    /// Overlay a persisted document on the defaults
    pub fn merge_over_defaults(document: &str) -> Result<Self, SettingsError> {
        let persisted: Value =
            serde_json::from_str(document).map_err(|e| SettingsError::Corrupt(e.to_string()))?;
        let Value::Object(persisted) = persisted else {
            return Err(SettingsError::Corrupt("expected a JSON object".into()));
        };

        let defaults = serde_json::to_value(Settings::default())?;
        let mut merged = defaults.clone();
        for (key, value) in persisted {
            if defaults.get(&key).is_none() {
                continue;
            }
            let mut candidate = defaults.clone();
            candidate[key.as_str()] = value.clone();
            match Self::from_value_checked(candidate) {
                Ok(_) => merged[key.as_str()] = value,
                Err(e) => tracing::warn!(field = %key, "keeping default setting: {}", e),
            }
        }

        let mut settings = Self::from_value_checked(merged)?;
        memory::truncate_to_capacity(&mut settings.memory_nodes);
        Ok(settings)
    }

    fn from_value_checked(value: Value) -> Result<Self, SettingsError> {
        let settings: Settings =
            serde_json::from_value(value).map_err(|e| SettingsError::Corrupt(e.to_string()))?;
        settings
            .validate()
            .map_err(|e| SettingsError::Corrupt(e.to_string()))?;
        Ok(settings)
    }

    /// Load from an optional persisted document, falling back to defaults
    pub fn load_or_default(document: Option<&str>) -> Self {
        let Some(document) = document else {
            return Self::default();
        };
        match Self::merge_over_defaults(document) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("discarding persisted settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.avatar_speed.is_finite() && self.avatar_speed > 0.0) {
            return Err(SettingsError::Validation(format!(
                "avatarSpeed must be greater than 0, got {}",
                self.avatar_speed
            )));
        }
        if !(self.core_intensity.is_finite() && self.core_intensity >= 0.0) {
            return Err(SettingsError::Validation(format!(
                "coreIntensity must be at least 0, got {}",
                self.core_intensity
            )));
        }
        Ok(())
    }

    /// Apply a partial update, rejecting it whole if any value is invalid
    pub fn apply(&mut self, patch: SettingsPatch) -> Result<SettingsChange, SettingsError> {
        let mut next = self.clone();
        if let Some(theme) = patch.theme {
            next.theme = theme;
        }
        if let Some(voice_enabled) = patch.voice_enabled {
            next.voice_enabled = voice_enabled;
        }
        if let Some(speed) = patch.avatar_speed {
            next.avatar_speed = speed;
        }
        if let Some(intensity) = patch.core_intensity {
            next.core_intensity = intensity;
        }
        if let Some(name) = patch.user_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(SettingsError::Validation("userName must not be empty".into()));
            }
            next.user_name = name.to_string();
        }
        next.validate()?;

        let change = SettingsChange {
            theme_changed: next.theme != self.theme,
        };
        *self = next;
        Ok(change)
    }
}

/// Partial settings update
///
/// Memory nodes are owned by the summarizer and cannot be patched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub voice_enabled: Option<bool>,
    #[serde(default)]
    pub avatar_speed: Option<f64>,
    #[serde(default)]
    pub core_intensity: Option<f64>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// What a patch changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsChange {
    /// The theme switched; the presentation plays its transition
    pub theme_changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_keep_defaults() {
        let settings =
            Settings::merge_over_defaults(r#"{"theme":"gold","userName":"Ada"}"#).unwrap();
        assert_eq!(settings.theme, Theme::Gold);
        assert_eq!(settings.user_name, "Ada");
        assert!(settings.voice_enabled);
        assert_eq!(settings.avatar_speed, 1.2);
        assert!(settings.memory_nodes.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let settings =
            Settings::merge_over_defaults(r#"{"voiceEnabled":false,"legacyFlag":42}"#).unwrap();
        assert!(!settings.voice_enabled);
    }

    #[test]
    fn test_corrupt_document_falls_back_to_defaults() {
        assert_eq!(Settings::load_or_default(Some("{not json")), Settings::default());
        assert_eq!(Settings::load_or_default(Some("[1,2,3]")), Settings::default());
        assert_eq!(Settings::load_or_default(Some(r#"{"theme":"purple"}"#)), Settings::default());
        assert_eq!(Settings::load_or_default(Some(r#"{"avatarSpeed":0}"#)), Settings::default());
        assert_eq!(Settings::load_or_default(None), Settings::default());
    }

    #[test]
    fn test_bad_field_keeps_its_default_only() {
        let doc = r#"{
            "theme": "purple",
            "avatarSpeed": 0,
            "userName": "Ada",
            "memoryNodes": ["Last discussed: tea..."]
        }"#;
        let settings = Settings::merge_over_defaults(doc).unwrap();
        assert_eq!(settings.theme, Theme::Cyan);
        assert_eq!(settings.avatar_speed, 1.2);
        assert_eq!(settings.user_name, "Ada");
        assert_eq!(settings.memory_nodes, vec!["Last discussed: tea..."]);
    }

    #[test]
    fn test_loaded_memory_is_bounded() {
        let doc = r#"{"memoryNodes":["a","b","c","d","e","f","g"]}"#;
        let settings = Settings::merge_over_defaults(doc).unwrap();
        assert_eq!(settings.memory_nodes, vec!["c", "d", "e", "f", "g"]);
    }

    #[test]
    fn test_round_trip_uses_camel_case() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(value["theme"], "cyan");
        assert_eq!(value["voiceEnabled"], true);
        assert_eq!(value["userName"], "Ryan Korir");
        assert!(value["memoryNodes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_apply_patch_reports_theme_change() {
        let mut settings = Settings::default();
        let patch = SettingsPatch {
            theme: Some(Theme::Crimson),
            avatar_speed: Some(2.0),
            ..Default::default()
        };
        let change = settings.apply(patch).unwrap();
        assert!(change.theme_changed);
        assert_eq!(settings.theme, Theme::Crimson);
        assert_eq!(settings.avatar_speed, 2.0);

        let change = settings.apply(SettingsPatch::default()).unwrap();
        assert!(!change.theme_changed);
    }

    #[test]
    fn test_invalid_patch_leaves_settings_untouched() {
        let mut settings = Settings::default();
        let patch = SettingsPatch {
            theme: Some(Theme::Emerald),
            core_intensity: Some(-0.5),
            ..Default::default()
        };
        assert!(matches!(settings.apply(patch), Err(SettingsError::Validation(_))));
        assert_eq!(settings, Settings::default());

        let patch = SettingsPatch {
            user_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(settings.apply(patch).is_err());
    }
}
