//! Scenario setup: configuration types and the world builder.
//!
//! [`build_scenario`] turns an [`EngineConfig`] into a populated `World`:
//! the road network, congestion segments, time-pattern table, a fixed fleet
//! spread over the corridor lanes and the initial curb-slot mix.

mod build;
mod params;

pub use build::{build_scenario, seed_slots, spawn_fleet};
pub use params::{CongestionConfig, EngineConfig, MotionConfig, NetworkConfig, SlotConfig};
