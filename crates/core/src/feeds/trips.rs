//! Place search and trip planning.

use geo::Point;
use ridealong_transit::models::types::{PlaceSuggestion, PlanItem, SourceTag};
use ridealong_transit::source::planner::{self, PlannerResponse};
use ridealong_transit::source::places;

use super::{CachePolicy, Request, TransitFeeds};
use crate::error::QueryError;
use crate::query::{Query, QueryState};
use crate::query_key;

fn coordinate(point: Option<Point>) -> String {
    match point {
        Some(point) => format!("{:.6},{:.6}", point.y(), point.x()),
        None => "unknown".to_string(),
    }
}

impl TransitFeeds {
    /// Search a source's stops, nearest first when `my_location` is known.
    pub async fn place_suggestions(
        &self,
        tag: SourceTag,
        text: &str,
        my_location: Option<Point>,
    ) -> QueryState<Vec<PlaceSuggestion>> {
        self.stops(tag)
            .resolve()
            .await
            .map(|stops| places::place_suggestions(tag, text, stops, my_location))
    }

    /// Trip plans between two points. Idle until both ends are known.
    pub fn trip_plans(&self, from: Option<Point>, to: Option<Point>) -> Query<Vec<PlanItem>> {
        let (from_text, to_text) = (coordinate(from), coordinate(to));
        let response: Query<PlannerResponse> = self.payload(
            Request {
                source: "planner",
                base: &self.config.endpoints.planner,
                resource: "plan",
                params: vec![("from", from_text.clone()), ("to", to_text.clone())],
                enabled: from.is_some() && to.is_some(),
            },
            self.static_policy(),
        );

        let offset = self.offset;
        self.derived(
            "trip plans",
            query_key!("planner", "plans", from_text, to_text),
            &[response.upstream()],
            CachePolicy::default(),
            move |deps| {
                let response = deps.get(&response)?;
                planner::plans(&response, offset).map_err(QueryError::from)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_text() {
        assert_eq!(coordinate(Some(Point::new(-83.7382, 42.2776))), "42.277600,-83.738200");
        assert_eq!(coordinate(None), "unknown");
    }
}
