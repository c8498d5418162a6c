//! Adapter for the pattern-based Bustime feed.
//!
//! Routes are assembled from three payloads: the route list, the directions
//! served by each route, and the pattern paths. A direction joins to the
//! pattern of the same route whose `rtdir` equals the direction's id.

use std::collections::HashMap;
use std::sync::Arc;

use geo::Point;
use serde::Deserialize;

use crate::identifiers::*;
use crate::models::types::*;
use crate::source::{direction_display_name, mark_last_stop, parse_timestamp, Theme};
use crate::spatial::{bounding_box, bounds_of_bounds};

const TAG: SourceTag = SourceTag::Bustime;

/// Bustime marks a dynamic-action cancelled trip with `dyn == 1`.
const DYN_CANCELLED: u8 = 1;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimeRoute {
    pub rt: String,
    pub rtnm: String,
    pub rtclr: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimeDirection {
    pub id: String,
    pub name: String,
}

/// Directions keyed by route (`rt`).
pub type BustimeDirections = HashMap<String, Vec<BustimeDirection>>;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimePattern {
    pub pid: i64,
    pub rt: String,
    pub rtdir: String,
    pub pt: Vec<BustimePatternPoint>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimePatternPoint {
    pub seq: u32,
    pub lat: f64,
    pub lon: f64,
    /// `S` for a stop, `W` for a waypoint.
    pub typ: String,
    #[serde(default)]
    pub stpid: Option<String>,
    #[serde(default)]
    pub stpnm: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimeVehicle {
    pub vid: String,
    pub lat: f64,
    pub lon: f64,
    pub hdg: f64,
    pub spd: f64,
    pub rt: String,
    pub rtdir: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimeStopTime {
    pub tatripid: String,
    pub rt: String,
    pub rtdir: String,
    pub stpid: String,
    pub schdtm: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimePrediction {
    pub tatripid: String,
    pub rt: String,
    pub rtdir: String,
    pub stpid: String,
    pub schdtm: String,
    pub prdtm: String,
    #[serde(default, rename = "dyn")]
    pub dynamic_action: u8,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimeBulletin {
    pub nm: String,
    pub sbj: String,
    pub dtl: String,
    #[serde(default)]
    pub srvc: Vec<BustimeService>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BustimeService {
    #[serde(default)]
    pub rt: Option<String>,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(
    routes: &[BustimeRoute],
    directions: &BustimeDirections,
    patterns: &[BustimePattern],
    theme: &Theme,
) -> Result<Vec<Route>> {
    routes
        .iter()
        .map(|raw| route(raw, directions, patterns, theme))
        .collect()
}

fn route(
    raw: &BustimeRoute,
    directions: &BustimeDirections,
    patterns: &[BustimePattern],
    theme: &Theme,
) -> Result<Route> {
    let id = RouteIdentifier::new(&raw.rt);
    let raw_directions = directions
        .get(&raw.rt)
        .filter(|dirs| !dirs.is_empty())
        .ok_or_else(|| TransitError::NoDirections(id.clone()))?;

    let only_direction = raw_directions.len() == 1;
    let directions = raw_directions
        .iter()
        .map(|dir| direction(&id, dir, patterns, only_direction))
        .collect::<Result<Vec<_>>>()?;

    let bounds = bounds_of_bounds(directions.iter().filter_map(|d| bounding_box(&d.path)));

    Ok(Route {
        tint: theme.tint(&id, &raw.rt, &raw.rtclr)?,
        name: raw.rtnm.as_str().into(),
        short_code: raw.rt.as_str().into(),
        id,
        directions,
        bounds,
        source: TAG,
    })
}

fn direction(
    route: &RouteIdentifier,
    raw: &BustimeDirection,
    patterns: &[BustimePattern],
    only_direction: bool,
) -> Result<Direction> {
    let id = DirectionIdentifier::scoped(route, &raw.id);
    let pattern = patterns
        .iter()
        .find(|p| p.rt == route.as_str() && p.rtdir == raw.id)
        .ok_or_else(|| TransitError::MissingGeometry {
            route: route.clone(),
            direction: id.clone(),
        })?;

    let mut points: Vec<&BustimePatternPoint> = pattern.pt.iter().collect();
    points.sort_by_key(|point| point.seq);

    let path = points.iter().map(|p| Point::new(p.lon, p.lat)).collect();
    let stops = points
        .iter()
        .filter_map(|p| {
            let stop_id = p.stpid.as_deref()?;
            Some(Stop {
                id: StopIdentifier::new(stop_id),
                name: p.stpnm.as_deref().unwrap_or(stop_id).into(),
                location: Point::new(p.lon, p.lat),
                last_on_direction: false,
                source: TAG,
            })
        })
        .collect();

    Ok(Direction {
        id,
        name: direction_display_name(&raw.name).into(),
        path,
        stops: mark_last_stop(stops),
        only_direction,
        source: TAG,
    })
}

// ============================================================================
// Vehicles
// ============================================================================

/// Bustime reports no occupancy or amenities; those stay empty.
pub fn vehicles(vehicles: &[BustimeVehicle]) -> Vec<Bus> {
    vehicles
        .iter()
        .map(|raw| Bus {
            id: VehicleIdentifier::new(&raw.vid),
            location: Point::new(raw.lon, raw.lat),
            heading: raw.hdg,
            speed: raw.spd,
            occupancy: None,
            amenities: Vec::new(),
            direction: DirectionIdentifier::scoped(&RouteIdentifier::new(&raw.rt), &raw.rtdir),
            source: TAG,
        })
        .collect()
}

// ============================================================================
// Schedules
// ============================================================================

/// The scheduled timetable for one route, direction and stop.
pub fn stop_schedule(
    route: Arc<Route>,
    direction: &DirectionIdentifier,
    stop: &StopIdentifier,
    stop_times: &[BustimeStopTime],
) -> Result<StopSchedule> {
    let end_of_route = route
        .direction(direction)
        .ok_or_else(|| TransitError::DirectionNotFound(direction.clone()))?
        .stop(stop)
        .ok_or_else(|| TransitError::StopNotFound(stop.clone()))?
        .last_on_direction;

    let timetable = stop_times
        .iter()
        .filter(|st| serves(&route.id, direction, stop, &st.rt, &st.rtdir, &st.stpid))
        .map(|st| {
            let scheduled = parse_timestamp(&st.schdtm)
                .ok_or_else(|| TransitError::InvalidTimestamp(st.schdtm.clone()))?;
            Ok(TimeEstimate::scheduled(
                scheduled,
                Some(TripPointIdentifier::new(&st.tatripid)),
                TAG,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StopSchedule {
        route,
        direction: direction.clone(),
        stop: stop.clone(),
        timetable,
        end_of_route,
    })
}

/// Live estimates for one route, direction and stop.
///
/// An unparseable prediction is kept as [`EstimatedTime::Unparsed`]; only a
/// bad scheduled time fails the derivation.
pub fn live_estimates(
    route: &RouteIdentifier,
    direction: &DirectionIdentifier,
    stop: &StopIdentifier,
    predictions: &[BustimePrediction],
) -> Result<Vec<TimeEstimate>> {
    predictions
        .iter()
        .filter(|p| serves(route, direction, stop, &p.rt, &p.rtdir, &p.stpid))
        .map(prediction_estimate)
        .collect()
}

/// Upcoming departures of a route, grouped by direction.
pub fn next_departures(
    route: &RouteIdentifier,
    predictions: &[BustimePrediction],
) -> Result<HashMap<DirectionIdentifier, Vec<TimeEstimate>>> {
    let mut grouped: HashMap<DirectionIdentifier, Vec<TimeEstimate>> = HashMap::new();
    for prediction in predictions.iter().filter(|p| p.rt == route.as_str()) {
        grouped
            .entry(DirectionIdentifier::scoped(route, &prediction.rtdir))
            .or_default()
            .push(prediction_estimate(prediction)?);
    }
    Ok(grouped)
}

fn prediction_estimate(raw: &BustimePrediction) -> Result<TimeEstimate> {
    let scheduled = parse_timestamp(&raw.schdtm)
        .ok_or_else(|| TransitError::InvalidTimestamp(raw.schdtm.clone()))?;
    let estimated = match parse_timestamp(&raw.prdtm) {
        Some(time) => EstimatedTime::At(time),
        None => EstimatedTime::Unparsed(raw.prdtm.as_str().into()),
    };

    Ok(
        TimeEstimate::scheduled(scheduled, Some(TripPointIdentifier::new(&raw.tatripid)), TAG)
            .with_estimate(estimated)
            .cancelled(raw.dynamic_action == DYN_CANCELLED),
    )
}

fn serves(
    route: &RouteIdentifier,
    direction: &DirectionIdentifier,
    stop: &StopIdentifier,
    rt: &str,
    rtdir: &str,
    stpid: &str,
) -> bool {
    rt == route.as_str()
        && stpid == stop.as_str()
        && DirectionIdentifier::scoped(route, rtdir) == *direction
}

// ============================================================================
// Alerts
// ============================================================================

/// Service bulletins affecting `context`. A bulletin without any service
/// entries applies system-wide.
pub fn alerts(
    bulletins: &[BustimeBulletin],
    routes: &[Arc<Route>],
    context: &RouteIdentifier,
) -> Result<Vec<Alert>> {
    bulletins
        .iter()
        .filter(|b| {
            let affected: Vec<&str> = b.srvc.iter().filter_map(|s| s.rt.as_deref()).collect();
            affected.is_empty() || affected.contains(&context.as_str())
        })
        .map(|b| {
            let affected = b
                .srvc
                .iter()
                .filter_map(|s| s.rt.as_deref())
                .map(|rt| find_route(routes, rt))
                .collect::<Result<Vec<_>>>()?;

            Ok(Alert {
                id: AlertIdentifier::new(&b.nm),
                title: b.sbj.as_str().into(),
                description: b.dtl.as_str().into(),
                affected,
                context: context.clone(),
                source: TAG,
            })
        })
        .collect()
}

pub(crate) fn find_route(routes: &[Arc<Route>], id: &str) -> Result<Arc<Route>> {
    routes
        .iter()
        .find(|route| route.id.as_str() == id)
        .cloned()
        .ok_or_else(|| TransitError::RouteNotFound(RouteIdentifier::new(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use palette::Srgb;
    use serde_json::json;

    fn fixture_routes() -> Vec<BustimeRoute> {
        serde_json::from_value(json!([
            { "rt": "4", "rtnm": "Washtenaw", "rtclr": "#1f77b4" },
        ]))
        .unwrap()
    }

    fn fixture_directions() -> BustimeDirections {
        serde_json::from_value(json!({
            "4": [
                { "id": "To Downtown", "name": "To Downtown" },
                { "id": "To Ypsilanti", "name": "To Ypsilanti" },
            ]
        }))
        .unwrap()
    }

    fn fixture_patterns() -> Vec<BustimePattern> {
        serde_json::from_value(json!([
            {
                "pid": 1, "rt": "4", "rtdir": "To Downtown",
                "pt": [
                    { "seq": 2, "lat": 42.26, "lon": -83.71, "typ": "W" },
                    { "seq": 1, "lat": 42.25, "lon": -83.70, "typ": "S", "stpid": "100", "stpnm": "Ypsi TC" },
                    { "seq": 3, "lat": 42.27, "lon": -83.73, "typ": "S", "stpid": "200", "stpnm": "Main St" },
                    { "seq": 4, "lat": 42.28, "lon": -83.74, "typ": "S", "stpid": "300", "stpnm": "Blake TC" },
                    { "seq": 5, "lat": 42.281, "lon": -83.745, "typ": "W" }
                ]
            },
            {
                "pid": 2, "rt": "4", "rtdir": "To Ypsilanti",
                "pt": [
                    { "seq": 1, "lat": 42.28, "lon": -83.74, "typ": "S", "stpid": "300", "stpnm": "Blake TC" },
                    { "seq": 2, "lat": 42.24, "lon": -83.60, "typ": "S", "stpid": "100", "stpnm": "Ypsi TC" }
                ]
            }
        ]))
        .unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn derived_route() -> Arc<Route> {
        let routes = routes(
            &fixture_routes(),
            &fixture_directions(),
            &fixture_patterns(),
            &Theme::new(),
        )
        .unwrap();
        Arc::new(routes.into_iter().next().unwrap())
    }

    #[test]
    fn test_route_assembly() {
        let route = derived_route();

        assert_eq!(route.id.as_str(), "4");
        assert_eq!(route.short_code.as_ref(), "4");
        assert_eq!(route.tint, Srgb::new(0x1f, 0x77, 0xb4));
        assert_eq!(route.source, SourceTag::Bustime);
        assert_eq!(route.directions.len(), 2);

        let downtown = &route.directions[0];
        assert_eq!(downtown.id.as_str(), "4:To Downtown");
        assert_eq!(downtown.name.as_ref(), "Downtown");
        assert!(!downtown.only_direction);
        assert_eq!(downtown.path.len(), 5);
        // Points follow sequence order
        assert_eq!(downtown.path[0], Point::new(-83.70, 42.25));

        let names: Vec<&str> = downtown.stops.iter().map(|s| s.name.as_ref()).collect();
        assert_eq!(names, vec!["Ypsi TC", "Main St", "Blake TC"]);
        let last: Vec<bool> = downtown.stops.iter().map(|s| s.last_on_direction).collect();
        assert_eq!(last, vec![false, false, true]);
    }

    #[test]
    fn test_route_bounds_cover_all_directions() {
        let route = derived_route();
        let bounds = route.bounds.unwrap();

        assert_eq!(bounds.min().x, -83.745);
        assert_eq!(bounds.min().y, 42.24);
        assert_eq!(bounds.max().x, -83.60);
        assert_eq!(bounds.max().y, 42.281);
    }

    #[test]
    fn test_missing_pattern_fails_whole_route() {
        let mut patterns = fixture_patterns();
        patterns.retain(|p| p.rtdir != "To Ypsilanti");

        let err = routes(&fixture_routes(), &fixture_directions(), &patterns, &Theme::new())
            .unwrap_err();
        assert!(matches!(err, TransitError::MissingGeometry { .. }));
    }

    #[test]
    fn test_route_without_directions() {
        let err = routes(
            &fixture_routes(),
            &BustimeDirections::new(),
            &fixture_patterns(),
            &Theme::new(),
        )
        .unwrap_err();
        assert!(matches!(err, TransitError::NoDirections(_)));
    }

    #[test]
    fn test_vehicles_have_no_occupancy() {
        let raw: Vec<BustimeVehicle> = serde_json::from_value(json!([
            { "vid": "1401", "lat": 42.27, "lon": -83.73, "hdg": 90.0, "spd": 21.0, "rt": "4", "rtdir": "To Downtown" }
        ]))
        .unwrap();

        let buses = vehicles(&raw);
        assert_eq!(buses.len(), 1);
        assert_eq!(buses[0].occupancy, None);
        assert!(buses[0].amenities.is_empty());
        assert_eq!(buses[0].direction.as_str(), "4:To Downtown");
    }

    #[test]
    fn test_stop_schedule() {
        let route = derived_route();
        let stop_times: Vec<BustimeStopTime> = serde_json::from_value(json!([
            { "tatripid": "t1", "rt": "4", "rtdir": "To Downtown", "stpid": "300", "schdtm": "20240301 09:00" },
            { "tatripid": "t2", "rt": "4", "rtdir": "To Downtown", "stpid": "300", "schdtm": "20240301 09:30" },
            { "tatripid": "t3", "rt": "4", "rtdir": "To Ypsilanti", "stpid": "300", "schdtm": "20240301 09:10" },
            { "tatripid": "t4", "rt": "4", "rtdir": "To Downtown", "stpid": "200", "schdtm": "20240301 08:50" }
        ]))
        .unwrap();

        let schedule = stop_schedule(
            route,
            &DirectionIdentifier::new("4:To Downtown"),
            &StopIdentifier::new("300"),
            &stop_times,
        )
        .unwrap();

        assert!(schedule.end_of_route);
        assert_eq!(schedule.timetable.len(), 2);
        assert_eq!(schedule.timetable[0].scheduled, at(9, 0));
        assert!(!schedule.timetable[0].realtime);
        assert_eq!(
            schedule.timetable[1].trip_point,
            Some(TripPointIdentifier::new("t2"))
        );
    }

    #[test]
    fn test_stop_schedule_unknown_stop() {
        let err = stop_schedule(
            derived_route(),
            &DirectionIdentifier::new("4:To Downtown"),
            &StopIdentifier::new("999"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, TransitError::StopNotFound(_)));
    }

    #[test]
    fn test_live_estimates_keep_unparsed_predictions() {
        let predictions: Vec<BustimePrediction> = serde_json::from_value(json!([
            { "tatripid": "t1", "rt": "4", "rtdir": "To Downtown", "stpid": "300",
              "schdtm": "20240301 09:00", "prdtm": "20240301 09:04" },
            { "tatripid": "t2", "rt": "4", "rtdir": "To Downtown", "stpid": "300",
              "schdtm": "20240301 09:30", "prdtm": "DLY", "dyn": 1 }
        ]))
        .unwrap();

        let live = live_estimates(
            &RouteIdentifier::new("4"),
            &DirectionIdentifier::new("4:To Downtown"),
            &StopIdentifier::new("300"),
            &predictions,
        )
        .unwrap();

        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|e| e.realtime));
        assert_eq!(live[0].estimated, Some(EstimatedTime::At(at(9, 4))));
        assert!(!live[0].cancelled);
        assert_eq!(live[1].estimated, Some(EstimatedTime::Unparsed("DLY".into())));
        assert!(live[1].cancelled);
    }

    #[test]
    fn test_next_departures_grouped_by_direction() {
        let predictions: Vec<BustimePrediction> = serde_json::from_value(json!([
            { "tatripid": "t1", "rt": "4", "rtdir": "To Downtown", "stpid": "300",
              "schdtm": "20240301 09:00", "prdtm": "20240301 09:04" },
            { "tatripid": "t9", "rt": "4", "rtdir": "To Ypsilanti", "stpid": "100",
              "schdtm": "20240301 09:00", "prdtm": "20240301 08:58" },
            { "tatripid": "t7", "rt": "5", "rtdir": "To Downtown", "stpid": "300",
              "schdtm": "20240301 09:00", "prdtm": "20240301 09:00" }
        ]))
        .unwrap();

        let grouped = next_departures(&RouteIdentifier::new("4"), &predictions).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&DirectionIdentifier::new("4:To Downtown")].len(), 1);
    }

    #[test]
    fn test_alerts_join_routes() {
        let route = derived_route();
        let bulletins: Vec<BustimeBulletin> = serde_json::from_value(json!([
            { "nm": "b1", "sbj": "Detour", "dtl": "Main St closed", "srvc": [{ "rt": "4" }] },
            { "nm": "b2", "sbj": "Holiday", "dtl": "Sunday service", "srvc": [] },
            { "nm": "b3", "sbj": "Other", "dtl": "Route 5 only", "srvc": [{ "rt": "5" }] }
        ]))
        .unwrap();

        let alerts = alerts(&bulletins, &[route.clone()], &route.id).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title.as_ref(), "Detour");
        assert_eq!(alerts[0].affected, vec![route.clone()]);
        assert!(alerts[1].affected.is_empty());
        assert_eq!(alerts[1].context, route.id);
    }

    #[test]
    fn test_alert_with_unknown_route_fails() {
        let route = derived_route();
        let bulletins: Vec<BustimeBulletin> = serde_json::from_value(json!([
            { "nm": "b1", "sbj": "Detour", "dtl": "", "srvc": [{ "rt": "4" }, { "rt": "22" }] }
        ]))
        .unwrap();

        let err = alerts(&bulletins, &[route.clone()], &route.id).unwrap_err();
        assert!(matches!(err, TransitError::RouteNotFound(_)));
    }
}
