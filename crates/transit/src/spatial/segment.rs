//! Trip-plan path partitioning for highlight/fade rendering.
//!
//! A plan's instruction paths are flattened into one sequence where every
//! point remembers which instruction produced it. Selecting an instruction
//! splits that sequence into the highlighted leg and the faded remainder on
//! either side, and decides where map markers go.

use geo::Point;

use crate::models::types::PlanItem;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathPoint {
    pub location: Point,
    /// Index of the plan instruction that produced this point.
    pub step: usize,
    /// Position in the flattened path.
    pub index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepSelection {
    /// Whole-trip overview.
    Overview,
    Step(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerIcon {
    Point,
    /// Waiting or transferring in place.
    Wait,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Marker {
    pub location: Point,
    pub icon: MarkerIcon,
    /// Trip origin; only set in the overview.
    pub origin: bool,
}

impl Marker {
    fn point(location: Point, origin: bool) -> Self {
        Self {
            location,
            icon: MarkerIcon::Point,
            origin,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathSegments {
    pub highlighted: Vec<PathPoint>,
    pub faded_before: Vec<PathPoint>,
    pub faded_after: Vec<PathPoint>,
    pub markers: Vec<Marker>,
}

/// Flatten every instruction path of a plan, in order.
pub fn flatten_plan(plan: &PlanItem) -> Vec<PathPoint> {
    plan.instructions
        .iter()
        .enumerate()
        .flat_map(|(step, instruction)| instruction.path.iter().map(move |p| (step, *p)))
        .enumerate()
        .map(|(index, (step, location))| PathPoint {
            location,
            step,
            index,
        })
        .collect()
}

pub fn segment_path(path: &[PathPoint], selection: StepSelection) -> PathSegments {
    let selected = match selection {
        StepSelection::Overview => return overview(path),
        StepSelection::Step(step) => step,
    };

    let mut segments = PathSegments::default();
    for point in path {
        match point.step.cmp(&selected) {
            std::cmp::Ordering::Less => segments.faded_before.push(*point),
            std::cmp::Ordering::Equal => segments.highlighted.push(*point),
            std::cmp::Ordering::Greater => segments.faded_after.push(*point),
        }
    }

    match (segments.highlighted.first(), segments.highlighted.last()) {
        (Some(first), Some(last)) => {
            segments.markers = vec![
                Marker::point(first.location, false),
                Marker::point(last.location, false),
            ];
        }
        _ => {
            // No geometry for this step (a wait or transfer): mark where the
            // previous step left the rider.
            let previous_end = selected
                .checked_sub(1)
                .and_then(|previous| path.iter().rev().find(|p| p.step == previous));
            if let Some(end) = previous_end {
                let terminus = path.last().map(|p| p.index) == Some(end.index);
                segments.markers.push(Marker {
                    location: end.location,
                    icon: if terminus {
                        MarkerIcon::Point
                    } else {
                        MarkerIcon::Wait
                    },
                    origin: false,
                });
            }
        }
    }

    segments
}

fn overview(path: &[PathPoint]) -> PathSegments {
    let markers = match (path.first(), path.last()) {
        (Some(first), Some(last)) => vec![
            Marker::point(first.location, true),
            Marker::point(last.location, false),
        ],
        _ => Vec::new(),
    };

    PathSegments {
        highlighted: path.to_vec(),
        faded_before: Vec::new(),
        faded_after: Vec::new(),
        markers,
    }
}
