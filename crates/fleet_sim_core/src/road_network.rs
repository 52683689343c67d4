//! Grid road network: intersections, Manhattan paths and speed limits.
//!
//! Intersections sit on a regular grid. Each one is classified by the named
//! arterial it lies on (if any), and that class drives the speed limit handed
//! to the motion model. Paths are axis-aligned (east-west leg first) and are
//! memoized because the motion model asks for the same corridor routes over
//! and over.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use bevy_ecs::prelude::Resource;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::scenario::NetworkConfig;
use crate::spatial::Point;

const PATH_CACHE_SIZE: usize = 1_024;
const COLLINEAR_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoadClass {
    Local,
    Sub,
    Main,
    Highway,
}

impl RoadClass {
    pub fn speed_limit_kmh(self) -> f64 {
        match self {
            RoadClass::Highway => 60.0,
            RoadClass::Main => 50.0,
            RoadClass::Sub => 40.0,
            RoadClass::Local => 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Runs along the x axis at a fixed `y`.
    EastWest,
    /// Runs along the y axis at a fixed `x`.
    NorthSouth,
}

/// A named road that upgrades the intersections along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arterial {
    pub name: String,
    pub class: RoadClass,
    pub orientation: Orientation,
    /// `y` for east-west roads, `x` for north-south roads.
    pub offset: f64,
    /// Extent along the road's own axis.
    pub from: f64,
    pub to: f64,
}

impl Arterial {
    pub fn new(
        name: &str,
        class: RoadClass,
        orientation: Orientation,
        offset: f64,
        from: f64,
        to: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            class,
            orientation,
            offset,
            from,
            to,
        }
    }

    /// Perpendicular distance from `p`, or `None` when `p` is outside the extent.
    fn distance_to(&self, p: Point) -> Option<f64> {
        let (along, across) = match self.orientation {
            Orientation::EastWest => (p.x, p.y),
            Orientation::NorthSouth => (p.y, p.x),
        };
        if along < self.from || along > self.to {
            return None;
        }
        Some((across - self.offset).abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Intersection {
    pub id: usize,
    pub position: Point,
    pub class: RoadClass,
}

/// Exact endpoint bits, so a hit always starts and ends where asked.
type PathKey = (u64, u64, u64, u64);

#[derive(Resource)]
pub struct RoadNetwork {
    spacing: f64,
    intersections: Vec<Intersection>,
    path_cache: Mutex<LruCache<PathKey, Vec<Point>>>,
}

impl RoadNetwork {
    pub fn new(config: &NetworkConfig) -> Self {
        let spacing = config.spacing;
        let columns = (config.width / spacing).floor() as usize;
        let rows = (config.height / spacing).floor() as usize;
        let mut intersections = Vec::with_capacity((columns + 1) * (rows + 1));
        for row in 0..=rows {
            for column in 0..=columns {
                let position = Point::new(column as f64 * spacing, row as f64 * spacing);
                intersections.push(Intersection {
                    id: intersections.len(),
                    position,
                    class: classify(position, &config.arterials, spacing),
                });
            }
        }
        Self::from_intersections(spacing, intersections)
    }

    /// A network without intersections; every lookup degrades gracefully.
    pub fn empty(spacing: f64) -> Self {
        Self::from_intersections(spacing, Vec::new())
    }

    fn from_intersections(spacing: f64, intersections: Vec<Intersection>) -> Self {
        let cache_size =
            NonZeroUsize::new(PATH_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            spacing,
            intersections,
            path_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    fn nearest(&self, p: Point) -> Option<&Intersection> {
        let mut best: Option<(&Intersection, f64)> = None;
        for node in &self.intersections {
            let d = node.position.distance(p);
            // Strict comparison keeps the first node found on ties.
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((node, d));
            }
        }
        best.map(|(node, _)| node)
    }

    /// Position of the nearest intersection, or `p` itself on an empty network.
    pub fn find_nearest_intersection(&self, p: Point) -> Point {
        self.nearest(p).map_or(p, |node| node.position)
    }

    pub fn road_class_at(&self, p: Point) -> RoadClass {
        self.nearest(p).map_or(RoadClass::Local, |node| node.class)
    }

    pub fn get_speed_limit(&self, p: Point) -> f64 {
        self.road_class_at(p).speed_limit_kmh()
    }

    /// Manhattan route from `start` to `end`: east-west leg, then north-south,
    /// in grid-spacing steps with collinear interior points removed.
    pub fn find_path(&self, start: Point, end: Point) -> Vec<Point> {
        let key = path_key(start, end);
        if let Ok(mut cache) = self.path_cache.lock() {
            if let Some(path) = cache.get(&key) {
                return path.clone();
            }
        }

        let path = simplify(manhattan_steps(start, end, self.spacing));

        if let Ok(mut cache) = self.path_cache.lock() {
            cache.put(key, path.clone());
        }
        path
    }
}

fn classify(p: Point, arterials: &[Arterial], spacing: f64) -> RoadClass {
    arterials
        .iter()
        .filter(|arterial| {
            arterial
                .distance_to(p)
                .is_some_and(|d| d < spacing / 2.0)
        })
        .map(|arterial| arterial.class)
        .max()
        .unwrap_or(RoadClass::Local)
}

fn path_key(start: Point, end: Point) -> PathKey {
    (start.x.to_bits(), start.y.to_bits(), end.x.to_bits(), end.y.to_bits())
}

fn manhattan_steps(start: Point, end: Point, spacing: f64) -> Vec<Point> {
    let mut points = vec![start];
    let mut current = start;
    while (end.x - current.x).abs() > COLLINEAR_EPSILON {
        let dx = end.x - current.x;
        current.x += dx.signum() * dx.abs().min(spacing);
        points.push(current);
    }
    while (end.y - current.y).abs() > COLLINEAR_EPSILON {
        let dy = end.y - current.y;
        current.y += dy.signum() * dy.abs().min(spacing);
        points.push(current);
    }
    points
}

fn simplify(points: Vec<Point>) -> Vec<Point> {
    if points.len() < 3 {
        return points;
    }
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        if i == 0 || i == points.len() - 1 {
            kept.push(*p);
            continue;
        }
        let Some(prev) = kept.last().copied() else {
            kept.push(*p);
            continue;
        };
        let next = points[i + 1];
        let cross = (p.x - prev.x) * (next.y - p.y) - (p.y - prev.y) * (next.x - p.x);
        if cross.abs() > COLLINEAR_EPSILON {
            kept.push(*p);
        }
    }
    kept
}
