//! Timetables, live estimates and the display grid built from them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use ridealong_transit::identifiers::{DirectionIdentifier, RouteIdentifier, StopIdentifier};
use ridealong_transit::models::types::{Route, SourceTag, StopSchedule, TimeEstimate};
use ridealong_transit::schedule::{deviation_status, reconcile, DeviationStatus, ScheduleGrid};
use ridealong_transit::source::bustime::{self, BustimePrediction, BustimeStopTime};
use tracing::warn;

use super::{find_route, CachePolicy, Request, TransitFeeds};
use crate::error::QueryError;
use crate::query::{Query, QueryState};
use crate::query_key;
use crate::selector::{SourceSelector, SourceTable};

/// Next departures of one route, grouped by direction.
pub type Departures = HashMap<DirectionIdentifier, Vec<TimeEstimate>>;

impl TransitFeeds {
    /// The scheduled timetable at one stop. Sources without timetables
    /// resolve to `None`.
    pub fn stop_schedule(
        &self,
        route: Option<&Route>,
        direction: &DirectionIdentifier,
        stop: &StopIdentifier,
    ) -> SourceSelector<Option<StopSchedule>> {
        let table = SourceTable::from_fn(|tag| {
            let route = route.filter(|route| route.source == tag)?;
            match tag {
                SourceTag::Bustime => Some(self.bustime_schedule(&route.id, direction, stop)),
                SourceTag::Campus => None,
            }
        });
        SourceSelector::new(route.map(|r| r.source), table, None)
    }

    /// Live estimates at one stop; empty for sources without predictions.
    pub fn live_estimates(
        &self,
        route: Option<&Route>,
        direction: &DirectionIdentifier,
        stop: &StopIdentifier,
    ) -> SourceSelector<Vec<TimeEstimate>> {
        let table = SourceTable::from_fn(|tag| {
            let route = route.filter(|route| route.source == tag)?;
            match tag {
                SourceTag::Bustime => Some(self.bustime_estimates(&route.id, direction, stop)),
                SourceTag::Campus => None,
            }
        });
        SourceSelector::new(route.map(|r| r.source), table, Vec::new())
    }

    pub fn next_departures(&self, route: Option<&Route>) -> SourceSelector<Departures> {
        let table = SourceTable::from_fn(|tag| {
            let route = route.filter(|route| route.source == tag)?;
            match tag {
                SourceTag::Bustime => Some(self.bustime_departures(&route.id)),
                SourceTag::Campus => None,
            }
        });
        SourceSelector::new(route.map(|r| r.source), table, HashMap::new())
    }

    /// The highlighted departure grid for one stop at `now`.
    ///
    /// Live estimates are optional: when they are missing or failed the grid
    /// falls back to the timetable alone.
    pub async fn board(
        &self,
        route: &Route,
        direction: &DirectionIdentifier,
        stop: &StopIdentifier,
        now: NaiveDateTime,
    ) -> QueryState<ScheduleGrid> {
        let schedule = self.stop_schedule(Some(route), direction, stop);
        let live = self.live_estimates(Some(route), direction, stop);
        let (schedule, live) = tokio::join!(schedule.resolve(), live.resolve());

        let schedule = match schedule {
            QueryState::Success(schedule) => schedule,
            QueryState::Idle => return QueryState::Idle,
            QueryState::Pending => return QueryState::Pending,
            QueryState::Error(error) => return QueryState::Error(error),
        };

        if let Some(error) = live.error() {
            warn!(route = %route.id, stop = %stop, error = %error, "showing timetable without live estimates");
        }

        let grid = match schedule.as_ref() {
            Some(schedule) => reconcile(
                schedule,
                live.data().map(|live| live.as_slice()),
                now,
                &self.palette,
            ),
            None => ScheduleGrid::default(),
        };
        QueryState::Success(Arc::new(grid))
    }

    /// How far `direction` of `route` runs off schedule.
    pub async fn deviation(
        &self,
        route: Option<&Route>,
        direction: Option<&DirectionIdentifier>,
    ) -> QueryState<DeviationStatus> {
        match self.next_departures(route).resolve().await {
            QueryState::Success(departures) => {
                QueryState::Success(Arc::new(deviation_status(direction, &departures)))
            }
            QueryState::Idle | QueryState::Pending => {
                QueryState::Success(Arc::new(DeviationStatus::Loading))
            }
            QueryState::Error(error) => QueryState::Error(error),
        }
    }

    fn bustime_schedule(
        &self,
        route: &RouteIdentifier,
        direction: &DirectionIdentifier,
        stop: &StopIdentifier,
    ) -> Query<Option<StopSchedule>> {
        let tag = SourceTag::Bustime;
        let routes = self.routes(tag);
        let stop_times: Query<Vec<BustimeStopTime>> = self.payload(
            Request {
                source: "bustime",
                base: self.base(tag),
                resource: "stoptimes",
                params: vec![("rt", route.to_string()), ("stpid", stop.to_string())],
                enabled: true,
            },
            self.static_policy(),
        );

        let (route, direction, stop) = (route.clone(), direction.clone(), stop.clone());
        self.derived(
            "bustime stop schedule",
            query_key!(tag, "schedule", &route, &direction, &stop),
            &[routes.upstream(), stop_times.upstream()],
            CachePolicy::default(),
            move |deps| {
                let (routes, stop_times) = (deps.get(&routes)?, deps.get(&stop_times)?);
                let route = find_route(&routes, &route)?;
                let schedule = bustime::stop_schedule(route, &direction, &stop, &stop_times)?;
                Ok(Some(schedule))
            },
        )
    }

    fn bustime_estimates(
        &self,
        route: &RouteIdentifier,
        direction: &DirectionIdentifier,
        stop: &StopIdentifier,
    ) -> Query<Vec<TimeEstimate>> {
        let tag = SourceTag::Bustime;
        let policy = self.estimates_policy();
        let predictions: Query<Vec<BustimePrediction>> = self.payload(
            Request {
                source: "bustime",
                base: self.base(tag),
                resource: "predictions",
                params: vec![("rt", route.to_string()), ("stpid", stop.to_string())],
                enabled: true,
            },
            policy,
        );

        let (route, direction, stop) = (route.clone(), direction.clone(), stop.clone());
        self.derived(
            "bustime live estimates",
            query_key!(tag, "estimates", &route, &direction, &stop),
            &[predictions.upstream()],
            policy,
            move |deps| {
                let predictions = deps.get(&predictions)?;
                bustime::live_estimates(&route, &direction, &stop, &predictions)
                    .map_err(QueryError::from)
            },
        )
    }

    fn bustime_departures(&self, route: &RouteIdentifier) -> Query<Departures> {
        let tag = SourceTag::Bustime;
        let policy = self.estimates_policy();
        let predictions: Query<Vec<BustimePrediction>> = self.payload(
            Request {
                source: "bustime",
                base: self.base(tag),
                resource: "predictions",
                params: vec![("rt", route.to_string())],
                enabled: true,
            },
            policy,
        );

        let route = route.clone();
        self.derived(
            "bustime next departures",
            query_key!(tag, "departures", &route),
            &[predictions.upstream()],
            policy,
            move |deps| {
                let predictions = deps.get(&predictions)?;
                bustime::next_departures(&route, &predictions).map_err(QueryError::from)
            },
        )
    }
}
