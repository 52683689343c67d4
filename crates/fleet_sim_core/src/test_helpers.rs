//! Test helpers for common test setup and utilities.
//!
//! Shared fixtures for unit tests, integration tests and benches so every
//! caller builds the same seeded corridor.

use crate::engine::SimulationEngine;
use crate::motion::Corridor;
use crate::scenario::{EngineConfig, MotionConfig};
use crate::spatial::{EmergencyArea, Point};
use crate::vehicles::{Vehicle, VehicleId};

/// Seed used by every helper so runs are reproducible.
pub const TEST_SEED: u64 = 42;

/// Default configuration with the test seed, starting at 07:00.
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_seed(TEST_SEED).with_start_hour(7)
}

/// A stopped engine built from [`test_config`].
///
/// # Panics
///
/// Panics if the default configuration is rejected (should never happen).
pub fn test_engine() -> SimulationEngine {
    SimulationEngine::new(test_config()).expect("default test config should be valid")
}

/// The corridor laid out by the default motion config.
pub fn test_corridor() -> Corridor {
    Corridor::from_config(&MotionConfig::default())
}

/// A cruising vehicle centred in `lane` at `x`.
pub fn test_vehicle(id: u32, x: f64, lane: usize) -> Vehicle {
    let corridor = test_corridor();
    Vehicle::new(
        VehicleId(id),
        Point::new(x, corridor.lane_center_y(lane)),
        lane,
        60.0,
    )
}

/// A 300 m emergency area centred on the middle of the corridor.
pub fn central_emergency_area() -> EmergencyArea {
    let corridor = test_corridor();
    let (north, south) = corridor.outer_edges();
    EmergencyArea::new(Point::new(corridor.length / 2.0, (north + south) / 2.0), 0.3)
}
