//! Core data types and enums for transit data.
//!
//! Every entity here is produced fresh by an adapter in [`crate::source`] and
//! never mutated afterwards; a refetch replaces it wholesale.

use std::sync::Arc;

use chrono::NaiveDateTime;
use geo::{Point, Rect};
use palette::Srgb;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::identifiers::*;

// ============================================================================
// Enums
// ============================================================================

/// Which backend adapter produced an entity.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Pattern-based feed: routes, directions, pattern paths, vehicles,
    /// stop times, predictions and service bulletins.
    Bustime,
    /// Campus shuttle feed: routes, stops, vehicles and announcements.
    Campus,
}

/// How a trip plan moves the rider during one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Movement {
    Bus,
    Walking,
    Waiting,
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaceKind {
    Stop,
    MyLocation,
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Stop {
    pub id: StopIdentifier,
    pub name: Arc<str>,
    pub location: Point,
    /// Set on exactly the final stop of the owning direction.
    pub last_on_direction: bool,
    pub source: SourceTag,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Direction {
    pub id: DirectionIdentifier,
    pub name: Arc<str>,
    /// Ordered path points along the direction of travel.
    pub path: Vec<Point>,
    /// Ordered along travel.
    pub stops: Vec<Stop>,
    pub only_direction: bool,
    pub source: SourceTag,
}

impl Direction {
    pub fn stop(&self, id: &StopIdentifier) -> Option<&Stop> {
        self.stops.iter().find(|stop| &stop.id == id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub id: RouteIdentifier,
    pub name: Arc<str>,
    /// Public short code shown to riders (e.g. "4", "NW").
    pub short_code: Arc<str>,
    pub tint: Srgb<u8>,
    /// Never empty.
    pub directions: Vec<Direction>,
    /// Box of the per-direction boxes. `None` only when no direction has a path.
    pub bounds: Option<Rect>,
    pub source: SourceTag,
}

impl Route {
    pub fn direction(&self, id: &DirectionIdentifier) -> Option<&Direction> {
        self.directions.iter().find(|direction| &direction.id == id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bus {
    pub id: VehicleIdentifier,
    pub location: Point,
    /// Degrees clockwise from north.
    pub heading: f64,
    pub speed: f64,
    /// Percentage full, when the source reports it.
    pub occupancy: Option<u8>,
    pub amenities: Vec<Arc<str>>,
    pub direction: DirectionIdentifier,
    pub source: SourceTag,
}

/// A live estimate as reported by the source.
///
/// A value the adapter could not parse is kept as `Unparsed` rather than
/// failing the derivation; consumers treat it as absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EstimatedTime {
    At(NaiveDateTime),
    Unparsed(Arc<str>),
}

impl EstimatedTime {
    pub fn time(&self) -> Option<NaiveDateTime> {
        match self {
            EstimatedTime::At(time) => Some(*time),
            EstimatedTime::Unparsed(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeEstimate {
    pub scheduled: NaiveDateTime,
    /// Present iff `realtime`.
    pub estimated: Option<EstimatedTime>,
    pub trip_point: Option<TripPointIdentifier>,
    pub realtime: bool,
    pub cancelled: bool,
    pub source: SourceTag,
}

impl TimeEstimate {
    /// A timetable entry with no live data attached.
    pub fn scheduled(
        scheduled: NaiveDateTime,
        trip_point: Option<TripPointIdentifier>,
        source: SourceTag,
    ) -> Self {
        Self {
            scheduled,
            estimated: None,
            trip_point,
            realtime: false,
            cancelled: false,
            source,
        }
    }

    /// Attach a live estimate, which makes the entry realtime.
    pub fn with_estimate(self, estimated: EstimatedTime) -> Self {
        Self {
            estimated: Some(estimated),
            realtime: true,
            ..self
        }
    }

    pub fn cancelled(self, cancelled: bool) -> Self {
        Self { cancelled, ..self }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StopSchedule {
    pub route: Arc<Route>,
    pub direction: DirectionIdentifier,
    pub stop: StopIdentifier,
    /// Ordered by scheduled time as the source lists it.
    pub timetable: Vec<TimeEstimate>,
    pub end_of_route: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    pub id: AlertIdentifier,
    pub title: Arc<str>,
    pub description: Arc<str>,
    pub affected: Vec<Arc<Route>>,
    /// The route the alert was fetched for.
    pub context: RouteIdentifier,
    pub source: SourceTag,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaceSuggestion {
    pub id: PlaceIdentifier,
    pub name: Arc<str>,
    pub description: Arc<str>,
    pub location: Option<Point>,
    pub kind: PlaceKind,
    pub source: SourceTag,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanItem {
    /// Epoch seconds.
    pub start: i64,
    /// Epoch seconds.
    pub end: i64,
    pub end_text: Arc<str>,
    pub instructions: Vec<PlanInstruction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanInstruction {
    pub movement: Movement,
    pub time_text: Arc<str>,
    pub text: Arc<str>,
    pub path: Vec<Point>,
    pub walking_steps: Vec<WalkingStep>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WalkingStep {
    pub text: Arc<str>,
    pub distance_m: f64,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Route not found: {0}")]
    RouteNotFound(RouteIdentifier),

    #[error("Direction not found: {0}")]
    DirectionNotFound(DirectionIdentifier),

    #[error("Stop not found: {0}")]
    StopNotFound(StopIdentifier),

    #[error("No pattern geometry for direction {direction} of route {route}")]
    MissingGeometry {
        route: RouteIdentifier,
        direction: DirectionIdentifier,
    },

    #[error("Route {0} has no directions")]
    NoDirections(RouteIdentifier),

    #[error("Invalid color {value:?} for route {route}")]
    InvalidColor { route: RouteIdentifier, value: String },

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Invalid polyline at byte {0}")]
    InvalidPolyline(usize),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },
}

pub type Result<T> = std::result::Result<T, TransitError>;
