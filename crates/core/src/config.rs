//! Feed configuration.

use std::collections::HashMap;
use std::time::Duration;

use chrono::FixedOffset;
use palette::Srgb;
use ridealong_transit::schedule::GridPalette;
use ridealong_transit::source::{parse_color, Theme};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid color {value:?} for {field}")]
    InvalidColor { field: String, value: String },

    #[error("utc offset of {0} minutes is out of range")]
    InvalidOffset(i32),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub endpoints: Endpoints,
    pub cache: CacheConfig,
    /// Route short code to hex tint.
    pub theme: HashMap<String, String>,
    pub palette: PaletteConfig,
    /// Agency time zone offset used for plan times.
    pub utc_offset_minutes: i32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub bustime: String,
    pub campus: String,
    pub planner: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bustime: "http://localhost:8080/bustime".into(),
            campus: "http://localhost:8080/campus".into(),
            planner: "http://localhost:8080/planner".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Routes, stops and timetables.
    pub static_stale_secs: u64,
    pub vehicles_refetch_secs: u64,
    pub estimates_stale_secs: u64,
    pub estimates_refetch_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            static_stale_secs: 60 * 60,
            vehicles_refetch_secs: 5,
            estimates_stale_secs: 15,
            estimates_refetch_secs: 30,
        }
    }
}

impl CacheConfig {
    pub fn static_stale(&self) -> Duration {
        Duration::from_secs(self.static_stale_secs)
    }

    pub fn vehicles_refetch(&self) -> Duration {
        Duration::from_secs(self.vehicles_refetch_secs)
    }

    pub fn estimates_stale(&self) -> Duration {
        Duration::from_secs(self.estimates_stale_secs)
    }

    pub fn estimates_refetch(&self) -> Duration {
        Duration::from_secs(self.estimates_refetch_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub future: String,
    pub muted: String,
    pub tint_alpha: u8,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        let defaults = GridPalette::default();
        Self {
            future: hex(defaults.future),
            muted: hex(defaults.muted),
            tint_alpha: defaults.tint_alpha,
        }
    }
}

fn hex(color: Srgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

fn color(field: &str, value: &str) -> Result<Srgb<u8>, ConfigError> {
    parse_color(value).ok_or_else(|| ConfigError::InvalidColor {
        field: field.to_string(),
        value: value.to_string(),
    })
}

impl FeedConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn theme(&self) -> Result<Theme, ConfigError> {
        let mut theme = Theme::new();
        for (short_code, value) in &self.theme {
            let tint = color(&format!("theme.{short_code}"), value)?;
            theme = theme.with_override(short_code.as_str(), tint);
        }
        Ok(theme)
    }

    pub fn grid_palette(&self) -> Result<GridPalette, ConfigError> {
        Ok(GridPalette {
            future: color("palette.future", &self.palette.future)?,
            muted: color("palette.muted", &self.palette.muted)?,
            tint_alpha: self.palette.tint_alpha,
        })
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_minutes))
    }
}
