//! Vehicle records and the id-keyed fleet registry.
//!
//! The fleet size is fixed at initialization: vehicles are never removed,
//! only repositioned or moved between [`VehicleStatus`] states.

use std::collections::BTreeMap;
use std::fmt;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::{InvariantViolation, VehicleError};
use crate::motion::Corridor;
use crate::spatial::{EmergencyArea, Point};

/// Distance kept between an evacuated vehicle and the edge of the closed area.
const EVACUATION_MARGIN_M: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AV-{:03}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    Idle,
    Moving,
    Parked,
    Picking,
    Dropping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Towards increasing `x`.
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub position: Point,
    pub status: VehicleStatus,
    /// State of charge, percent.
    pub battery: f64,
    /// Current speed, km/h.
    pub speed: f64,
    /// Randomized cruise speed before limits and congestion, km/h.
    pub base_speed: f64,
    pub direction: Direction,
    pub destination: Option<Point>,
    pub route: Vec<Point>,
    pub total_distance_km: f64,
    pub trip_count: u32,
    pub lane: usize,
    pub target_lane: Option<usize>,
    pub is_changing_lane: bool,
    /// Remaining time in the current pickup, drop-off or hold.
    pub dwell_remaining_secs: f64,
    pub has_passenger: bool,
}

impl Vehicle {
    pub fn new(id: VehicleId, position: Point, lane: usize, base_speed: f64) -> Self {
        Self {
            id,
            position,
            status: VehicleStatus::Moving,
            battery: 100.0,
            speed: 0.0,
            base_speed,
            direction: Direction::Forward,
            destination: None,
            route: Vec::new(),
            total_distance_km: 0.0,
            trip_count: 0,
            lane,
            target_lane: None,
            is_changing_lane: false,
            dwell_remaining_secs: 0.0,
            has_passenger: false,
        }
    }

    /// Parked vehicles have pulled to the curb and no longer block a lane.
    pub fn occupies_lane(&self) -> bool {
        self.status != VehicleStatus::Parked
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if !(0.0..=100.0).contains(&self.battery) {
            return Err(InvariantViolation::Battery {
                id: self.id,
                battery: self.battery,
            });
        }
        if self.speed.is_nan() || self.speed < 0.0 {
            return Err(InvariantViolation::Speed {
                id: self.id,
                speed: self.speed,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Resource)]
pub struct VehicleManager {
    vehicles: BTreeMap<VehicleId, Vehicle>,
}

impl VehicleManager {
    pub fn register_vehicle(&mut self, vehicle: Vehicle) -> Result<(), VehicleError> {
        if self.vehicles.contains_key(&vehicle.id) {
            return Err(VehicleError::DuplicateId(vehicle.id));
        }
        self.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    pub fn get_vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn get_vehicle_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(&id)
    }

    /// All vehicles in id order.
    pub fn get_all_vehicles(&self) -> Vec<&Vehicle> {
        self.vehicles.values().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vehicle> {
        self.vehicles.values_mut()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn vehicles_by_status(&self, status: VehicleStatus) -> Vec<&Vehicle> {
        self.vehicles
            .values()
            .filter(|v| v.status == status)
            .collect()
    }

    pub fn clear(&mut self) {
        self.vehicles.clear();
    }

    /// Moves every vehicle inside `area` to just outside it along the corridor
    /// and holds it idle for `hold_secs`. Returns the affected vehicles as they
    /// are after relocation.
    pub fn evacuate_area(
        &mut self,
        area: EmergencyArea,
        corridor: &Corridor,
        hold_secs: f64,
    ) -> Vec<Vehicle> {
        let mut affected = Vec::new();
        for vehicle in self.vehicles.values_mut() {
            if !area.contains(vehicle.position) {
                continue;
            }
            if let Some(x) = evacuation_x(area, corridor, vehicle.position) {
                vehicle.position.x = x;
            }
            vehicle.status = VehicleStatus::Idle;
            vehicle.speed = 0.0;
            vehicle.dwell_remaining_secs = hold_secs;
            vehicle.destination = None;
            vehicle.route.clear();
            vehicle.direction = if vehicle.position.x >= area.center.x {
                Direction::Forward
            } else {
                Direction::Backward
            };
            affected.push(vehicle.clone());
        }
        affected
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.vehicles.values().try_for_each(Vehicle::check_invariants)
    }
}

/// Nearest corridor `x` outside `area` for a vehicle at `p`, preferring the
/// closer side. `None` when neither side of the corridor leaves the area.
fn evacuation_x(area: EmergencyArea, corridor: &Corridor, p: Point) -> Option<f64> {
    let r = area.radius_m();
    let dy = p.y - area.center.y;
    let half_chord = (r * r - dy * dy).max(0.0).sqrt() + EVACUATION_MARGIN_M;
    let left = area.center.x - half_chord;
    let right = area.center.x + half_chord;
    let (first, second) = if (p.x - left).abs() <= (right - p.x).abs() {
        (left, right)
    } else {
        (right, left)
    };
    [first, second]
        .into_iter()
        .map(|x| x.clamp(0.0, corridor.length))
        .find(|x| !area.contains(Point::new(*x, p.y)))
}
