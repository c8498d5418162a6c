//! Adapter for the campus shuttle feed.
//!
//! Campus routes run a single direction each. Their geometry arrives as an
//! encoded polyline and their stops as ids into the separate stops payload.

use std::collections::HashMap;
use std::sync::Arc;

use geo::Point;
use serde::Deserialize;

use crate::identifiers::*;
use crate::models::types::*;
use crate::source::bustime::find_route;
use crate::source::{direction_display_name, mark_last_stop, Theme};
use crate::spatial::{bounding_box, bounds_of_bounds, decode_polyline};

const TAG: SourceTag = SourceTag::Campus;

/// Every campus route has exactly one direction, keyed like this.
const DIRECTION_KEY: &str = "0";

// ============================================================================
// Payloads
// ============================================================================

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CampusRoute {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub color: String,
    pub destination: String,
    pub polyline: String,
    pub stops: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CampusStop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CampusVehicle {
    pub id: String,
    pub route_id: String,
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    pub speed: f64,
    /// Occupancy percentage.
    #[serde(default)]
    pub load: Option<f64>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CampusAnnouncement {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Empty for network-wide announcements.
    #[serde(default)]
    pub routes: Vec<String>,
}

pub fn direction_id(route: &RouteIdentifier) -> DirectionIdentifier {
    DirectionIdentifier::scoped(route, DIRECTION_KEY)
}

// ============================================================================
// Routes and stops
// ============================================================================

pub fn routes(routes: &[CampusRoute], stops: &[CampusStop], theme: &Theme) -> Result<Vec<Route>> {
    let stop_index: HashMap<&str, &CampusStop> =
        stops.iter().map(|stop| (stop.id.as_str(), stop)).collect();

    routes
        .iter()
        .map(|raw| route(raw, &stop_index, theme))
        .collect()
}

fn route(raw: &CampusRoute, stops: &HashMap<&str, &CampusStop>, theme: &Theme) -> Result<Route> {
    let id = RouteIdentifier::new(&raw.id);

    let direction_stops = raw
        .stops
        .iter()
        .map(|stop_id| {
            stops
                .get(stop_id.as_str())
                .map(|raw_stop| stop(raw_stop))
                .ok_or_else(|| TransitError::StopNotFound(StopIdentifier::new(stop_id)))
        })
        .collect::<Result<Vec<_>>>()?;

    let direction = Direction {
        id: direction_id(&id),
        name: direction_display_name(&raw.destination).into(),
        path: decode_polyline(&raw.polyline)?,
        stops: mark_last_stop(direction_stops),
        only_direction: true,
        source: TAG,
    };

    Ok(Route {
        tint: theme.tint(&id, &raw.short_name, &raw.color)?,
        name: raw.name.as_str().into(),
        short_code: raw.short_name.as_str().into(),
        bounds: bounds_of_bounds(bounding_box(&direction.path)),
        directions: vec![direction],
        id,
        source: TAG,
    })
}

/// The stop catalogue, in payload order.
pub fn stops(stops: &[CampusStop]) -> Vec<Stop> {
    stops.iter().map(stop).collect()
}

fn stop(raw: &CampusStop) -> Stop {
    Stop {
        id: StopIdentifier::new(&raw.id),
        name: raw.name.as_str().into(),
        location: Point::new(raw.lon, raw.lat),
        last_on_direction: false,
        source: TAG,
    }
}

// ============================================================================
// Vehicles
// ============================================================================

pub fn vehicles(vehicles: &[CampusVehicle]) -> Vec<Bus> {
    vehicles
        .iter()
        .map(|raw| Bus {
            id: VehicleIdentifier::new(&raw.id),
            location: Point::new(raw.lon, raw.lat),
            heading: raw.heading,
            speed: raw.speed,
            occupancy: raw.load.map(|load| load.round().clamp(0.0, 100.0) as u8),
            amenities: raw.amenities.iter().map(|a| a.as_str().into()).collect(),
            direction: direction_id(&RouteIdentifier::new(&raw.route_id)),
            source: TAG,
        })
        .collect()
}

// ============================================================================
// Alerts
// ============================================================================

pub fn alerts(
    announcements: &[CampusAnnouncement],
    routes: &[Arc<Route>],
    context: &RouteIdentifier,
) -> Result<Vec<Alert>> {
    announcements
        .iter()
        .filter(|a| a.routes.is_empty() || a.routes.iter().any(|r| r == context.as_str()))
        .map(|a| {
            let affected = a
                .routes
                .iter()
                .map(|id| find_route(routes, id))
                .collect::<Result<Vec<_>>>()?;

            Ok(Alert {
                id: AlertIdentifier::new(&a.id),
                title: a.title.as_str().into(),
                description: a.body.as_str().into(),
                affected,
                context: context.clone(),
                source: TAG,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    fn fixture_stops() -> Vec<CampusStop> {
        serde_json::from_value(json!([
            { "id": "cc", "name": "Central Campus", "lat": 42.2780, "lon": -83.7382 },
            { "id": "nc", "name": "North Campus", "lat": 42.2910, "lon": -83.7170 },
            { "id": "mc", "name": "Medical Campus", "lat": 42.2840, "lon": -83.7290 }
        ]))
        .unwrap()
    }

    fn fixture_routes() -> Vec<CampusRoute> {
        serde_json::from_value(json!([
            {
                "id": "nw", "name": "Northwood", "short_name": "NW", "color": "00274c",
                "destination": "to North Campus",
                "polyline": "_p~iF~ps|U_ulLnnqC_mqNvxq`@",
                "stops": ["cc", "mc", "nc"]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_route_assembly() {
        let routes = routes(&fixture_routes(), &fixture_stops(), &Theme::new()).unwrap();
        assert_eq!(routes.len(), 1);

        let route = &routes[0];
        assert_eq!(route.short_code.as_ref(), "NW");
        assert_eq!(route.tint, palette::Srgb::new(0x00, 0x27, 0x4c));
        assert_eq!(route.directions.len(), 1);

        let direction = &route.directions[0];
        assert!(direction.only_direction);
        assert_eq!(direction.name.as_ref(), "North Campus");
        assert_eq!(direction.id, direction_id(&route.id));
        assert_eq!(direction.path.len(), 3);

        let flags: Vec<bool> = direction.stops.iter().map(|s| s.last_on_direction).collect();
        assert_eq!(flags, vec![false, false, true]);
        assert_eq!(direction.stops[2].name.as_ref(), "North Campus");

        let bounds = route.bounds.unwrap();
        assert_abs_diff_eq!(bounds.min().y, 38.5, epsilon = 1e-9);
        assert_abs_diff_eq!(bounds.max().x, -120.2, epsilon = 1e-9);
    }

    #[test]
    fn test_theme_override_by_short_code() {
        let theme = Theme::new().with_override("NW", palette::Srgb::new(255, 203, 5));
        let routes = routes(&fixture_routes(), &fixture_stops(), &theme).unwrap();
        assert_eq!(routes[0].tint, palette::Srgb::new(255, 203, 5));
    }

    #[test]
    fn test_unknown_stop_fails_route() {
        let mut stops = fixture_stops();
        stops.retain(|s| s.id != "mc");

        let err = routes(&fixture_routes(), &stops, &Theme::new()).unwrap_err();
        assert!(matches!(err, TransitError::StopNotFound(id) if id.as_str() == "mc"));
    }

    #[test]
    fn test_vehicle_occupancy() {
        let raw: Vec<CampusVehicle> = serde_json::from_value(json!([
            { "id": "b1", "route_id": "nw", "lat": 42.28, "lon": -83.73, "heading": 180.0,
              "speed": 12.0, "load": 42.6, "amenities": ["wifi"] },
            { "id": "b2", "route_id": "nw", "lat": 42.29, "lon": -83.72, "heading": 0.0,
              "speed": 0.0 }
        ]))
        .unwrap();

        let buses = vehicles(&raw);
        assert_eq!(buses[0].occupancy, Some(43));
        assert_eq!(buses[0].amenities, vec![Arc::<str>::from("wifi")]);
        assert_eq!(buses[1].occupancy, None);
        assert_eq!(buses[1].direction, direction_id(&RouteIdentifier::new("nw")));
    }

    #[test]
    fn test_announcements() {
        let routes: Vec<Arc<Route>> = routes(&fixture_routes(), &fixture_stops(), &Theme::new())
            .unwrap()
            .into_iter()
            .map(Arc::new)
            .collect();
        let announcements: Vec<CampusAnnouncement> = serde_json::from_value(json!([
            { "id": "a1", "title": "Snow", "body": "Delays expected" },
            { "id": "a2", "title": "Detour", "body": "Fuller Rd closed", "routes": ["nw"] }
        ]))
        .unwrap();

        let alerts = alerts(&announcements, &routes, &RouteIdentifier::new("nw")).unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].affected.is_empty());
        assert_eq!(alerts[1].affected[0].id.as_str(), "nw");
        assert_eq!(alerts[1].source, SourceTag::Campus);
    }
}
