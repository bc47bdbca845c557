//! Detection thresholds and the removal policy table
//!
//! Both load from TOML:
//!
//! ```toml
//! [detection]
//! black_tolerance = 0.05
//! min_rect_size = 3.0
//!
//! [removal]
//! image = "never"
//! line_art = "if_touched"
//! text = "never"
//! ```

use crate::error::RedactError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub removal: RemovalPolicy,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RedactError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RedactError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(s: &str) -> Result<Self, RedactError> {
        let config: Config = toml::from_str(s).map_err(|e| RedactError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RedactError> {
        let tol = self.detection.black_tolerance;
        if !(0.0..=1.0).contains(&tol) {
            return Err(RedactError::Config(format!(
                "black_tolerance must be within [0, 1], got {}",
                tol
            )));
        }
        if !(self.detection.min_rect_size >= 0.0) {
            return Err(RedactError::Config(format!(
                "min_rect_size must be >= 0, got {}",
                self.detection.min_rect_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Maximum per-channel value still treated as black
    pub black_tolerance: f32,
    /// Rectangles must be strictly larger than this in both dimensions
    pub min_rect_size: f64,
    /// Non-alphanumeric characters kept in hidden-text previews
    pub preview_charset_extra: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            black_tolerance: 0.05,
            min_rect_size: 3.0,
            preview_charset_extra: " .-_".to_string(),
        }
    }
}

impl DetectionConfig {
    pub fn keeps_in_preview(&self, ch: char) -> bool {
        ch.is_alphanumeric() || self.preview_charset_extra.contains(ch)
    }
}

/// Kinds of drawn objects the removal policy distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Image,
    LineArt,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Never,
    IfTouched,
    Always,
}

impl Rule {
    pub fn removes(self, touches_marked_region: bool) -> bool {
        match self {
            Rule::Never => false,
            Rule::IfTouched => touches_marked_region,
            Rule::Always => true,
        }
    }
}

/// What happens to each kind of object when a page's redaction marks
/// are applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalPolicy {
    pub image: Rule,
    pub line_art: Rule,
    pub text: Rule,
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self {
            image: Rule::Never,
            line_art: Rule::IfTouched,
            text: Rule::Never,
        }
    }
}

impl RemovalPolicy {
    /// Rule for an object kind. Text is never removed whatever the table says.
    pub fn rule_for(&self, kind: ObjectKind) -> Rule {
        match kind {
            ObjectKind::Image => self.image,
            ObjectKind::LineArt => self.line_art,
            ObjectKind::Text => Rule::Never,
        }
    }
}
