//! Planar geometry for the simulated district.
//!
//! Positions are local `x`/`y` coordinates in metres at dashboard scale
//! (the default world is 2000 × 1200). Radii handed in by operators are in
//! kilometres; [`distance_km`] bridges the two.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Distance between two points in kilometres.
pub fn distance_km(a: Point, b: Point) -> f64 {
    a.distance(b) / 1000.0
}

/// Axis-aligned box, inclusive on the min edges and exclusive on the max edges
/// so that adjacent boxes never both contain a point on their shared border.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }
}

/// Circular area used for emergency closures and evacuations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergencyArea {
    pub center: Point,
    pub radius_km: f64,
}

impl EmergencyArea {
    pub fn new(center: Point, radius_km: f64) -> Self {
        Self { center, radius_km }
    }

    pub fn contains(&self, p: Point) -> bool {
        distance_km(self.center, p) <= self.radius_km
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_km * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_edges_are_half_open() {
        let b = BoundingBox::new(Point::new(0.0, 0.0), Point::new(200.0, 50.0));
        assert!(b.contains(Point::new(0.0, 0.0)));
        assert!(b.contains(Point::new(199.9, 49.9)));
        assert!(!b.contains(Point::new(200.0, 10.0)));
        assert!(!b.contains(Point::new(10.0, 50.0)));
    }

    #[test]
    fn emergency_area_uses_kilometres() {
        let area = EmergencyArea::new(Point::new(1000.0, 600.0), 0.25);
        assert!(area.contains(Point::new(1200.0, 600.0)));
        assert!(!area.contains(Point::new(1300.0, 600.0)));
        assert_eq!(area.radius_m(), 250.0);
    }

    #[test]
    fn distance_km_scales_metres() {
        let d = distance_km(Point::new(0.0, 0.0), Point::new(300.0, 400.0));
        assert!((d - 0.5).abs() < 1e-12);
    }
}
