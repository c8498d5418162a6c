//! On-time performance summary for a route direction.

use std::collections::HashMap;
use std::fmt;

use crate::identifiers::DirectionIdentifier;
use crate::models::types::TimeEstimate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviationStatus {
    /// The direction is not known yet.
    Loading,
    /// Nothing live to compare against.
    NoTimes,
    OnTime,
    /// Average minutes behind schedule.
    Late(i64),
    /// Average minutes ahead of schedule.
    Early(i64),
}

impl fmt::Display for DeviationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviationStatus::Loading => write!(f, "Loading"),
            DeviationStatus::NoTimes => write!(f, "No times to show"),
            DeviationStatus::OnTime => write!(f, "On time"),
            DeviationStatus::Late(minutes) => write!(f, "{} minutes late", minutes),
            DeviationStatus::Early(minutes) => write!(f, "{} minutes early", minutes),
        }
    }
}

/// Average `estimated - scheduled` across the direction's departures that
/// carry a parsed estimate, rounded to whole minutes.
pub fn deviation_status(
    direction: Option<&DirectionIdentifier>,
    departures: &HashMap<DirectionIdentifier, Vec<TimeEstimate>>,
) -> DeviationStatus {
    let Some(direction) = direction else {
        return DeviationStatus::Loading;
    };

    let offsets: Vec<f64> = departures
        .get(direction)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let estimated = entry.estimated.as_ref()?.time()?;
            Some((estimated - entry.scheduled).num_seconds() as f64 / 60.0)
        })
        .collect();

    if offsets.is_empty() {
        return DeviationStatus::NoTimes;
    }

    // Halves round toward positive infinity: -3.5 is 3 minutes early
    let average = (offsets.iter().sum::<f64>() / offsets.len() as f64 + 0.5).floor() as i64;
    match average {
        0 => DeviationStatus::OnTime,
        m if m > 0 => DeviationStatus::Late(m),
        m => DeviationStatus::Early(-m),
    }
}
