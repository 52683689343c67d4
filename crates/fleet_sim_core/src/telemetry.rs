//! Snapshots handed to the dashboard after every tick.

use std::collections::BTreeMap;

use bevy_ecs::prelude::World;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::SimulationClock;
use crate::congestion::CongestionAnalyzer;
use crate::events::{EventLog, SimEvent};
use crate::slots::{ParkingSlot, SlotManager, SlotStats};
use crate::systems::TickContext;
use crate::vehicles::{Vehicle, VehicleManager};

/// Complete view of one finished tick.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub current_time: DateTime<Utc>,
    pub vehicles: Vec<Vehicle>,
    pub slots: Vec<ParkingSlot>,
    /// Events emitted since the previous snapshot.
    pub events: Vec<SimEvent>,
    /// Segment id to congestion score.
    pub congestion: BTreeMap<String, f64>,
    pub slot_stats: SlotStats,
}

/// The fleet and slots produced by `initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct InitialState {
    pub vehicles: Vec<Vehicle>,
    pub slots: Vec<ParkingSlot>,
}

impl InitialState {
    pub fn from_world(world: &World) -> Self {
        Self {
            vehicles: world
                .resource::<VehicleManager>()
                .iter()
                .cloned()
                .collect(),
            slots: world.resource::<SlotManager>().iter().cloned().collect(),
        }
    }
}

/// Builds a snapshot of the current world and takes the pending events.
pub fn capture_snapshot(world: &mut World) -> Snapshot {
    let events = world.resource_mut::<EventLog>().drain_pending();
    build_snapshot(world, events)
}

/// Builds a snapshot of the current world carrying `events`.
pub fn build_snapshot(world: &World, events: Vec<SimEvent>) -> Snapshot {
    let slots = world.resource::<SlotManager>();
    Snapshot {
        tick: world.resource::<TickContext>().tick,
        current_time: world.resource::<SimulationClock>().now(),
        vehicles: world
            .resource::<VehicleManager>()
            .iter()
            .cloned()
            .collect(),
        slots: slots.iter().cloned().collect(),
        events,
        congestion: world.resource::<CongestionAnalyzer>().scores().clone(),
        slot_stats: slots.generate_slot_stats(),
    }
}
