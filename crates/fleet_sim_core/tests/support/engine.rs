#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use fleet_sim_core::clock::SpeedMultiplier;
use fleet_sim_core::engine::SimulationEngine;
use fleet_sim_core::scenario::EngineConfig;
use fleet_sim_core::telemetry::Snapshot;
use fleet_sim_core::test_helpers::TEST_SEED;

/// Snapshots collected by a running engine's callback.
pub type SnapshotSink = Arc<Mutex<Vec<Snapshot>>>;

/// Builder for reproducible engines in integration tests.
#[derive(Debug, Clone)]
pub struct TestEngineBuilder {
    config: EngineConfig,
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default()
                .with_seed(TEST_SEED)
                .with_start_hour(7),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config = self.config.with_seed(seed);
        self
    }

    pub fn with_vehicles(mut self, count: usize) -> Self {
        self.config = self.config.with_vehicle_count(count);
        self
    }

    pub fn with_slots(mut self, count: usize) -> Self {
        self.config = self.config.with_slot_count(count);
        self
    }

    pub fn with_start_hour(mut self, hour: u32) -> Self {
        self.config = self.config.with_start_hour(hour);
        self
    }

    pub fn with_speed(mut self, speed: SpeedMultiplier) -> Self {
        self.config = self.config.with_speed(speed);
        self
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A stopped engine.
    pub fn build(self) -> SimulationEngine {
        SimulationEngine::new(self.config).expect("test config should be valid")
    }

    /// A running engine whose snapshots land in the returned sink.
    pub fn build_running(self) -> (SimulationEngine, SnapshotSink) {
        let mut engine = self.build();
        let sink: SnapshotSink = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&sink);
        engine.start(move |snapshot| {
            writer.lock().expect("snapshot sink").push(snapshot.clone());
        });
        (engine, sink)
    }
}

/// Number of snapshots delivered so far.
pub fn delivered(sink: &SnapshotSink) -> usize {
    sink.lock().expect("snapshot sink").len()
}
