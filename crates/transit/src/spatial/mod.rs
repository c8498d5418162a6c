//! Geometry: polyline decoding, bounding boxes, distances and plan path
//! segmentation.

pub mod bounds;
pub mod polyline;
pub mod queries;
pub mod segment;

pub use bounds::{bounding_box, bounds_of_bounds};
pub use polyline::decode_polyline;
pub use queries::{haversine_distance, path_length};
pub use segment::{
    flatten_plan, segment_path, Marker, MarkerIcon, PathPoint, PathSegments, StepSelection,
};
