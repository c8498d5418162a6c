//! Distance calculations on Earth's surface.

use geo::{HaversineDistance, Point};

/// Calculate Haversine distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

/// Total length of a path in meters.
pub fn path_length(path: &[Point]) -> f64 {
    path.windows(2)
        .map(|pair| haversine_distance(pair[0], pair[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        // Distance from NYC to LA is approximately 3,936 km
        let nyc = Point::new(-74.0060, 40.7128);
        let la = Point::new(-118.2437, 34.0522);

        let dist = haversine_distance(nyc, la);
        assert!((dist - 3_936_000.0).abs() < 50_000.0); // Within 50km
    }

    #[test]
    fn test_path_length() {
        let a = Point::new(-83.7430, 42.2780);
        let b = Point::new(-83.7430, 42.2880);
        let c = Point::new(-83.7430, 42.2980);

        let total = path_length(&[a, b, c]);
        let direct = haversine_distance(a, c);
        assert!((total - direct).abs() < 1.0);
        assert_eq!(path_length(&[a]), 0.0);
    }
}
