//! Source adapters.
//!
//! Each backend gets one module translating its (already decoded) payloads
//! into the shared domain model. Adapters are pure: the same payloads always
//! produce the same entities, tagged with the adapter's [`SourceTag`].
//!
//! A join that cannot be resolved fails the whole derivation; adapters never
//! hand back a partially populated entity.
//!
//! [`SourceTag`]: crate::models::types::SourceTag

pub mod bustime;
pub mod campus;
pub mod places;
pub mod planner;

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use palette::Srgb;

use crate::identifiers::RouteIdentifier;
use crate::models::types::{Result, Stop, TransitError};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y%m%d %H:%M:%S",
    "%Y%m%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Route tint overrides keyed by public short code.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Theme {
    overrides: HashMap<String, Srgb<u8>>,
}

impl Theme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, short_code: impl Into<String>, tint: Srgb<u8>) -> Self {
        self.overrides.insert(short_code.into(), tint);
        self
    }

    /// The themed tint for a route, falling back to the source's line color.
    pub fn tint(
        &self,
        route: &RouteIdentifier,
        short_code: &str,
        source_color: &str,
    ) -> Result<Srgb<u8>> {
        if let Some(tint) = self.overrides.get(short_code) {
            return Ok(*tint);
        }

        parse_color(source_color).ok_or_else(|| TransitError::InvalidColor {
            route: route.clone(),
            value: source_color.to_string(),
        })
    }
}

/// Parse `#rrggbb`, `rrggbb` or the three-digit short forms.
pub fn parse_color(value: &str) -> Option<Srgb<u8>> {
    Srgb::from_str(value.trim()).ok()
}

/// Parse a source timestamp (local agency time).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Display name of a direction: a leading "to" token is dropped.
pub fn direction_display_name(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) if first.eq_ignore_ascii_case("to") => rest.trim(),
        _ => trimmed,
    }
}

/// Flag the final stop along a direction as its last.
pub(crate) fn mark_last_stop(mut stops: Vec<Stop>) -> Vec<Stop> {
    if let Some(last) = stops.last_mut() {
        last.last_on_direction = true;
    }
    stops
}
