//! Place search over a source's stop catalogue.

use std::collections::HashSet;
use std::sync::Arc;

use geo::Point;

use crate::identifiers::{PlaceIdentifier, StopIdentifier};
use crate::models::types::{PlaceKind, PlaceSuggestion, Route, SourceTag, Stop};
use crate::spatial::haversine_distance;

pub const MY_LOCATION_ID: &str = "my-location";

/// Every stop served by `routes`, first occurrence wins.
pub fn unique_stops(routes: &[Arc<Route>]) -> Vec<Stop> {
    let mut seen: HashSet<StopIdentifier> = HashSet::new();
    routes
        .iter()
        .flat_map(|route| route.directions.iter())
        .flat_map(|direction| direction.stops.iter())
        .filter(|stop| seen.insert(stop.id.clone()))
        .map(|stop| Stop {
            last_on_direction: false,
            ..stop.clone()
        })
        .collect()
}

/// Suggestions for a search box.
///
/// The rider's own location comes first when known, followed by stops whose
/// name contains `text` (case-insensitive). With a known location, stops are
/// ordered nearest first.
pub fn place_suggestions(
    source: SourceTag,
    text: &str,
    stops: &[Stop],
    my_location: Option<Point>,
) -> Vec<PlaceSuggestion> {
    let needle = text.trim().to_lowercase();

    let mut matches: Vec<&Stop> = stops
        .iter()
        .filter(|stop| stop.name.to_lowercase().contains(&needle))
        .collect();

    if let Some(origin) = my_location {
        matches.sort_by(|a, b| {
            haversine_distance(origin, a.location).total_cmp(&haversine_distance(origin, b.location))
        });
    }

    let mine = my_location.map(|location| PlaceSuggestion {
        id: PlaceIdentifier::new(MY_LOCATION_ID),
        name: "My Location".into(),
        description: "Current location".into(),
        location: Some(location),
        kind: PlaceKind::MyLocation,
        source,
    });

    mine.into_iter()
        .chain(matches.into_iter().map(|stop| PlaceSuggestion {
            id: PlaceIdentifier::new(stop.id.as_str()),
            name: stop.name.clone(),
            description: format!("Stop #{}", stop.id).into(),
            location: Some(stop.location),
            kind: PlaceKind::Stop,
            source,
        }))
        .collect()
}
