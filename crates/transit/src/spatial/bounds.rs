//! Axis-aligned bounding boxes over `(lon, lat)` points.

use geo::{coord, Point, Rect};

/// The box spanning `(min lat, min lon)` to `(max lat, max lon)`.
///
/// Returns `None` for an empty set.
pub fn bounding_box(points: &[Point]) -> Option<Rect> {
    let (first, rest) = points.split_first()?;

    let (mut min_x, mut min_y) = (first.x(), first.y());
    let (mut max_x, mut max_y) = (min_x, min_y);
    for point in rest {
        min_x = min_x.min(point.x());
        min_y = min_y.min(point.y());
        max_x = max_x.max(point.x());
        max_y = max_y.max(point.y());
    }

    Some(Rect::new(
        coord! { x: min_x, y: min_y },
        coord! { x: max_x, y: max_y },
    ))
}

/// Reduce a set of boxes to the box containing their corners.
///
/// Routes are bounded this way (box of per-direction boxes) rather than by a
/// single pass over every path point; keep the two-level shape.
pub fn bounds_of_bounds(boxes: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    let corners: Vec<Point> = boxes
        .into_iter()
        .flat_map(|rect| [Point::from(rect.min()), Point::from(rect.max())])
        .collect();

    bounding_box(&corners)
}
