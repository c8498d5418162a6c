//! Plain-text rendering of resolved queries.

use std::fmt::Write;

use geo::{Point, Rect};
use ridealong_core::transit::models::types::{Alert, Bus, PlaceSuggestion, PlanItem, Route};
use ridealong_core::transit::schedule::{CellTone, GridCell, ScheduleGrid};
use ridealong_core::transit::spatial::{haversine_distance, MarkerIcon, PathSegments};

pub fn bounds(rect: &Rect) -> String {
    let (min, max) = (rect.min(), rect.max());
    format!("bounds {:.5},{:.5} .. {:.5},{:.5}", min.y, min.x, max.y, max.x)
}

pub fn route(route: &Route) -> String {
    let tint = route.tint;
    let mut out = format!(
        "{:<6} {} #{:02x}{:02x}{:02x}\n",
        route.short_code, route.name, tint.red, tint.green, tint.blue
    );
    for direction in &route.directions {
        let last = direction
            .stops
            .iter()
            .find(|stop| stop.last_on_direction)
            .map_or("-", |stop| stop.name.as_ref());
        let _ = writeln!(
            out,
            "       {} ({}): {} stops, {} path points, ends at {}",
            direction.name,
            direction.id,
            direction.stops.len(),
            direction.path.len(),
            last
        );
    }
    if let Some(rect) = &route.bounds {
        let _ = writeln!(out, "       {}", bounds(rect));
    }
    out
}

pub fn vehicles(buses: &[Bus]) -> String {
    let mut out = String::new();
    for bus in buses {
        let occupancy = bus
            .occupancy
            .map_or_else(|| "-".to_string(), |full| format!("{full}%"));
        let _ = writeln!(
            out,
            "{:<8} {:.5},{:.5} heading {:>3.0} speed {:>4.1} occupancy {} on {}",
            bus.id,
            bus.location.y(),
            bus.location.x(),
            bus.heading,
            bus.speed,
            occupancy,
            bus.direction
        );
    }
    out
}

fn cell(cell: &GridCell) -> String {
    let mut text = cell.departure.format("%H:%M").to_string();
    if cell.cancelled {
        text = format!("x{text}");
    }
    if cell.realtime {
        text.push('~');
    }
    match cell.tone {
        CellTone::NextDeparture => format!("[{text}]"),
        CellTone::Future => format!(" {text} "),
        CellTone::Muted | CellTone::Translucent => format!("({text})"),
    }
}

/// One line per grid row. `>` marks the highlighted row, `[..]` the next
/// departure, `(..)` passed times, `~` live estimates and `x` cancellations.
pub fn grid(grid: &ScheduleGrid) -> String {
    let mut out = String::new();
    if grid.rows.is_empty() {
        out.push_str("No scheduled departures\n");
    }
    for row in &grid.rows {
        let cells: Vec<String> = row.cells.iter().map(cell).collect();
        let marker = if row.highlighted { '>' } else { ' ' };
        let _ = writeln!(out, "{marker} {}", cells.join(" "));
    }
    if grid.end_of_route {
        out.push_str("End of route\n");
    }
    out
}

pub fn alert(alert: &Alert) -> String {
    let routes: Vec<&str> = alert.affected.iter().map(|r| r.short_code.as_ref()).collect();
    let scope = if routes.is_empty() {
        "system-wide".to_string()
    } else {
        routes.join(", ")
    };
    format!("{} [{}]\n  {}\n", alert.title, scope, alert.description)
}

pub fn place(place: &PlaceSuggestion, near: Option<Point>) -> String {
    let distance = match (place.location, near) {
        (Some(location), Some(near)) => format!(" {:.0} m", haversine_distance(location, near)),
        _ => String::new(),
    };
    format!("{:<10} {}{}", place.id, place.name, distance)
}

pub fn plan(plan: &PlanItem) -> String {
    let minutes = (plan.end - plan.start) / 60;
    let mut out = format!("{} min, {}\n", minutes, plan.end_text);
    for (step, instruction) in plan.instructions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{step:>2}. {:<8} {:<8} {}",
            instruction.movement.to_string(),
            instruction.time_text,
            instruction.text
        );
        for walk in &instruction.walking_steps {
            let _ = writeln!(out, "      {} ({:.0} m)", walk.text, walk.distance_m);
        }
    }
    out
}

pub fn segments(segments: &PathSegments) -> String {
    let mut out = format!(
        "path: {} faded before, {} highlighted, {} faded after\n",
        segments.faded_before.len(),
        segments.highlighted.len(),
        segments.faded_after.len()
    );
    for marker in &segments.markers {
        let icon = match marker.icon {
            MarkerIcon::Point => "point",
            MarkerIcon::Wait => "wait",
        };
        let origin = if marker.origin { " (origin)" } else { "" };
        let _ = writeln!(
            out,
            "marker {icon} at {:.5},{:.5}{origin}",
            marker.location.y(),
            marker.location.x()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use palette::Srgba;
    use ridealong_core::transit::schedule::GridRow;

    fn cell_at(h: u32, m: u32, tone: CellTone) -> GridCell {
        GridCell {
            trip_point: None,
            departure: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
            tone,
            color: Srgba::new(0, 0, 0, 255),
            eligible: tone != CellTone::Muted,
            cancelled: false,
            realtime: false,
        }
    }

    #[test]
    fn test_grid_marks_next_departure() {
        let mut live = cell_at(8, 40, CellTone::Future);
        live.realtime = true;
        let board = ScheduleGrid {
            rows: vec![GridRow {
                cells: vec![
                    cell_at(8, 0, CellTone::Translucent),
                    cell_at(8, 20, CellTone::NextDeparture),
                    live,
                ],
                highlighted: true,
            }],
            end_of_route: true,
        };

        assert_eq!(grid(&board), "> (08:00) [08:20]  08:40~ \nEnd of route\n");
    }

    #[test]
    fn test_empty_grid() {
        assert_eq!(grid(&ScheduleGrid::default()), "No scheduled departures\n");
    }
}
