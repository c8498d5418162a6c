//! Schedule reconciliation.
//!
//! A stop's timetable is merged with whatever live estimates exist for it,
//! then laid out as a grid of fixed-width rows. Exactly one cell (the first
//! eligible departure in schedule order) is painted as the next departure,
//! and the row holding it is the only highlighted row.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use palette::{Srgb, Srgba};

use crate::identifiers::TripPointIdentifier;
use crate::models::types::{EstimatedTime, StopSchedule, TimeEstimate};

/// Cells per grid row.
pub const ROW_SIZE: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellTone {
    /// The first eligible departure, painted in the route's tint.
    NextDeparture,
    /// A later eligible departure.
    Future,
    /// Departed or otherwise not eligible.
    Muted,
    /// A muted cell sharing the highlighted row, painted in translucent tint.
    Translucent,
}

/// Colors for everything except the route tint itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPalette {
    pub future: Srgb<u8>,
    pub muted: Srgb<u8>,
    /// Alpha applied to the route tint for [`CellTone::Translucent`].
    pub tint_alpha: u8,
}

impl Default for GridPalette {
    fn default() -> Self {
        Self {
            future: Srgb::new(0x21, 0x21, 0x21),
            muted: Srgb::new(0x9e, 0x9e, 0x9e),
            tint_alpha: 0x4d,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridCell {
    pub trip_point: Option<TripPointIdentifier>,
    pub departure: NaiveDateTime,
    pub tone: CellTone,
    pub color: Srgba<u8>,
    pub eligible: bool,
    /// Rendered struck through.
    pub cancelled: bool,
    /// Rendered with a live indicator.
    pub realtime: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridRow {
    pub cells: Vec<GridCell>,
    pub highlighted: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScheduleGrid {
    pub rows: Vec<GridRow>,
    pub end_of_route: bool,
}

impl ScheduleGrid {
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.rows.iter().flat_map(|row| row.cells.iter())
    }

    pub fn next_departure(&self) -> Option<&GridCell> {
        self.cells().find(|cell| cell.tone == CellTone::NextDeparture)
    }
}

/// Merge `schedule` with optional (possibly partial) `live` estimates.
///
/// Live estimates join scheduled entries by trip point; entries without a
/// match keep their scheduled time and are not realtime.
pub fn reconcile(
    schedule: &StopSchedule,
    live: Option<&[TimeEstimate]>,
    now: NaiveDateTime,
    colors: &GridPalette,
) -> ScheduleGrid {
    let live_by_trip: HashMap<&TripPointIdentifier, &TimeEstimate> = live
        .unwrap_or_default()
        .iter()
        .filter_map(|estimate| estimate.trip_point.as_ref().map(|tp| (tp, estimate)))
        .collect();

    let tint = schedule.route.tint;
    let mut next_assigned = false;
    let cells: Vec<GridCell> = schedule
        .timetable
        .iter()
        .map(|entry| {
            let matched = entry
                .trip_point
                .as_ref()
                .and_then(|tp| live_by_trip.get(tp))
                .copied();
            let estimated = matched
                .and_then(|live| live.estimated.as_ref())
                .and_then(EstimatedTime::time);

            let departure = estimated.unwrap_or(entry.scheduled);
            let realtime = estimated.is_some();
            let cancelled = entry.cancelled || matched.is_some_and(|live| live.cancelled);

            // Live-confirmed trips stay eligible across the day boundary.
            let eligible = (departure.date() == now.date() && departure >= now)
                || (realtime && !cancelled);

            let tone = match (eligible, next_assigned) {
                (true, false) => {
                    next_assigned = true;
                    CellTone::NextDeparture
                }
                (true, true) => CellTone::Future,
                (false, _) => CellTone::Muted,
            };

            GridCell {
                trip_point: entry.trip_point.clone(),
                departure,
                tone,
                color: cell_color(tone, tint, colors),
                eligible,
                cancelled,
                realtime,
            }
        })
        .collect();

    let mut rows: Vec<GridRow> = cells
        .chunks(ROW_SIZE)
        .map(|chunk| GridRow {
            cells: chunk.to_vec(),
            highlighted: false,
        })
        .collect();

    if let Some(row) = rows
        .iter_mut()
        .find(|row| row.cells.iter().any(|cell| cell.eligible))
    {
        row.highlighted = true;
        for cell in row.cells.iter_mut().filter(|c| c.tone == CellTone::Muted) {
            cell.tone = CellTone::Translucent;
            cell.color = cell_color(CellTone::Translucent, tint, colors);
        }
    }

    ScheduleGrid {
        rows,
        end_of_route: schedule.end_of_route,
    }
}

fn cell_color(tone: CellTone, tint: Srgb<u8>, colors: &GridPalette) -> Srgba<u8> {
    let (rgb, alpha) = match tone {
        CellTone::NextDeparture => (tint, u8::MAX),
        CellTone::Future => (colors.future, u8::MAX),
        CellTone::Muted => (colors.muted, u8::MAX),
        CellTone::Translucent => (tint, colors.tint_alpha),
    };
    Srgba::new(rgb.red, rgb.green, rgb.blue, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate};

    use crate::identifiers::*;
    use crate::models::types::{Direction, Route, SourceTag};

    const TINT: Srgb<u8> = Srgb::new(0x1f, 0x77, 0xb4);

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn route() -> Arc<Route> {
        Arc::new(Route {
            id: RouteIdentifier::new("4"),
            name: "Washtenaw".into(),
            short_code: "4".into(),
            tint: TINT,
            directions: vec![Direction {
                id: DirectionIdentifier::new("4:in"),
                name: "Downtown".into(),
                path: Vec::new(),
                stops: Vec::new(),
                only_direction: true,
                source: SourceTag::Bustime,
            }],
            bounds: None,
            source: SourceTag::Bustime,
        })
    }

    fn entry(trip: &str, time: NaiveDateTime) -> TimeEstimate {
        TimeEstimate::scheduled(time, Some(TripPointIdentifier::new(trip)), SourceTag::Bustime)
    }

    /// Departures every 30 minutes from 06:00.
    fn schedule(count: usize) -> StopSchedule {
        StopSchedule {
            route: route(),
            direction: DirectionIdentifier::new("4:in"),
            stop: StopIdentifier::new("300"),
            timetable: (0..count)
                .map(|i| entry(&format!("t{i}"), at(6, 0) + Duration::minutes(30 * i as i64)))
                .collect(),
            end_of_route: false,
        }
    }

    fn live(trip: &str, scheduled: NaiveDateTime, estimated: EstimatedTime) -> TimeEstimate {
        entry(trip, scheduled).with_estimate(estimated)
    }

    fn tones(grid: &ScheduleGrid) -> Vec<CellTone> {
        grid.cells().map(|c| c.tone).collect()
    }

    #[test]
    fn test_chunking() {
        let grid = reconcile(&schedule(12), None, at(5, 0), &GridPalette::default());

        let sizes: Vec<usize> = grid.rows.iter().map(|r| r.cells.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[test]
    fn test_unmatched_entry_uses_schedule() {
        let grid = reconcile(&schedule(3), Some(&[]), at(5, 0), &GridPalette::default());
        let first = grid.cells().next().unwrap();

        assert_eq!(first.departure, at(6, 0));
        assert!(!first.realtime);
        assert!(!first.cancelled);
    }

    #[test]
    fn test_live_estimate_replaces_departure() {
        let estimates = [live("t1", at(6, 30), EstimatedTime::At(at(6, 37)))];
        let grid = reconcile(&schedule(3), Some(&estimates), at(5, 0), &GridPalette::default());
        let cells: Vec<&GridCell> = grid.cells().collect();

        assert_eq!(cells[1].departure, at(6, 37));
        assert!(cells[1].realtime);
        assert!(!cells[0].realtime);
    }

    #[test]
    fn test_malformed_estimate_falls_back() {
        let estimates = [live("t0", at(6, 0), EstimatedTime::Unparsed("DUE".into()))];
        let grid = reconcile(&schedule(2), Some(&estimates), at(5, 0), &GridPalette::default());
        let first = grid.cells().next().unwrap();

        assert_eq!(first.departure, at(6, 0));
        assert!(!first.realtime);
    }

    #[test]
    fn test_single_next_departure() {
        let grid = reconcile(&schedule(12), None, at(7, 10), &GridPalette::default());

        let next: Vec<&GridCell> = grid
            .cells()
            .filter(|c| c.tone == CellTone::NextDeparture)
            .collect();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].departure, at(7, 30));
        assert_eq!(next[0].color, Srgba::new(0x1f, 0x77, 0xb4, 0xff));
        assert_eq!(grid.next_departure().map(|c| c.departure), Some(at(7, 30)));
    }

    #[test]
    fn test_tones_and_highlighted_row() {
        let colors = GridPalette::default();
        // 06:00..11:30; at 07:10 the first three have departed
        let grid = reconcile(&schedule(12), None, at(7, 10), &colors);

        use CellTone::*;
        assert_eq!(
            tones(&grid),
            vec![
                Translucent, Translucent, Translucent, NextDeparture, Future,
                Future, Future, Future, Future, Future,
                Future, Future,
            ]
        );

        let highlighted: Vec<bool> = grid.rows.iter().map(|r| r.highlighted).collect();
        assert_eq!(highlighted, vec![true, false, false]);

        let translucent = grid.rows[0].cells[0].color;
        assert_eq!(translucent, Srgba::new(0x1f, 0x77, 0xb4, colors.tint_alpha));
    }

    #[test]
    fn test_later_rows_stay_muted() {
        // Every scheduled time has passed; only the live trips stay eligible.
        let estimates = [
            live("t6", at(9, 0), EstimatedTime::At(at(9, 5))),
            live("t11", at(11, 30), EstimatedTime::At(at(11, 31))),
        ];
        let grid = reconcile(&schedule(12), Some(&estimates), at(23, 0), &GridPalette::default());

        use CellTone::*;
        assert_eq!(
            tones(&grid),
            vec![
                Muted, Muted, Muted, Muted, Muted,
                Translucent, NextDeparture, Translucent, Translucent, Translucent,
                Muted, Future,
            ]
        );
        let highlighted: Vec<bool> = grid.rows.iter().map(|r| r.highlighted).collect();
        assert_eq!(highlighted, vec![false, true, false]);
    }

    #[test]
    fn test_cancelled_future_estimate_is_struck_through() {
        let estimates = [
            live("t2", at(7, 0), EstimatedTime::At(at(7, 2))).cancelled(true),
        ];
        let grid = reconcile(&schedule(5), Some(&estimates), at(5, 0), &GridPalette::default());
        let cells: Vec<&GridCell> = grid.cells().collect();

        assert!(cells[2].cancelled);
        assert!(cells[2].realtime);
        // Still same-day and upcoming, so still eligible
        assert!(cells[2].eligible);
        assert_eq!(cells[2].tone, CellTone::Future);
    }

    #[test]
    fn test_cancelled_past_estimate_is_struck_and_muted() {
        let estimates = [
            live("t0", at(6, 0), EstimatedTime::At(at(6, 1))).cancelled(true),
        ];
        let grid = reconcile(&schedule(5), Some(&estimates), at(6, 30), &GridPalette::default());
        let first = grid.cells().next().unwrap();

        assert!(first.cancelled);
        assert!(!first.eligible);
    }

    #[test]
    fn test_realtime_trip_eligible_across_day_boundary() {
        // A trip scheduled yesterday evening, confirmed live, viewed after
        // midnight: not same-day, yet still the next departure.
        let yesterday = at(23, 50) - Duration::days(1);
        let mut late_night = schedule(0);
        late_night.timetable = vec![entry("late", yesterday)];
        let estimates = [live("late", yesterday, EstimatedTime::At(yesterday + Duration::minutes(8)))];

        let now = at(0, 10);
        let grid = reconcile(&late_night, Some(&estimates), now, &GridPalette::default());
        let cell = grid.cells().next().unwrap();

        assert!(cell.departure < now);
        assert!(cell.eligible);
        assert_eq!(cell.tone, CellTone::NextDeparture);

        // Without the live confirmation the same entry is muted
        let grid = reconcile(&late_night, None, now, &GridPalette::default());
        assert_eq!(grid.cells().next().unwrap().tone, CellTone::Muted);
    }

    #[test]
    fn test_tomorrow_without_live_data_is_not_eligible() {
        let mut tomorrow = schedule(0);
        tomorrow.timetable = vec![entry("t", at(6, 0) + Duration::days(1))];

        let grid = reconcile(&tomorrow, None, at(22, 0), &GridPalette::default());
        let cell = grid.cells().next().unwrap();
        assert!(!cell.eligible);
        assert_eq!(cell.tone, CellTone::Muted);
        assert!(!grid.rows[0].highlighted);
    }

    #[test]
    fn test_end_of_route_passes_through() {
        let mut sched = schedule(1);
        sched.end_of_route = true;
        assert!(reconcile(&sched, None, at(5, 0), &GridPalette::default()).end_of_route);
    }
}
