use bevy_ecs::prelude::World;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::clock::SimulationClock;
use crate::congestion::CongestionAnalyzer;
use crate::error::{ConfigError, EngineError};
use crate::events::EventLog;
use crate::motion::{assign_destination, Corridor};
use crate::patterns::TimePatternTable;
use crate::random::SimRng;
use crate::road_network::RoadNetwork;
use crate::scenario::params::{EngineConfig, MotionConfig, SlotConfig};
use crate::slots::{
    dynamic_priority, ParkingSlot, SlotDirection, SlotId, SlotKind, SlotManager, SlotStatus,
};
use crate::spatial::Point;
use crate::systems::{AlertLevels, TickContext};
use crate::vehicles::{Direction, Vehicle, VehicleId, VehicleManager};

/// Registers `count` vehicles with random lane, position, cruise speed,
/// direction and charge, each heading for the far end of the corridor.
pub fn spawn_fleet<R: Rng>(
    vehicles: &mut VehicleManager,
    count: usize,
    config: &MotionConfig,
    network: &RoadNetwork,
    rng: &mut R,
) -> Result<(), EngineError> {
    let corridor = Corridor::from_config(config);
    for i in 0..count {
        let lane = rng.gen_range(0..corridor.lane_count);
        let x = rng.gen_range(0.0..=corridor.length);
        let base_speed = rng.gen_range(config.base_speed_min_kmh..=config.base_speed_max_kmh);
        let mut vehicle = Vehicle::new(
            VehicleId(i as u32 + 1),
            Point::new(x, corridor.lane_center_y(lane)),
            lane,
            base_speed,
        );
        vehicle.speed = rng.gen_range(0.0..=base_speed);
        vehicle.battery = rng.gen_range(config.initial_battery_min..=100.0);
        vehicle.direction = if rng.gen_bool(0.5) {
            Direction::Forward
        } else {
            Direction::Backward
        };
        assign_destination(&mut vehicle, &corridor, network);
        vehicles.register_vehicle(vehicle)?;
    }
    Ok(())
}

/// Lays out `count` curb slots: `static_share` static, `dynamic_share`
/// dynamic, the remainder emergency. Static and dynamic slots start with a
/// random occupancy; emergency slots start empty at top priority.
pub fn seed_slots<R: Rng>(
    slots: &mut SlotManager,
    count: usize,
    config: &SlotConfig,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let static_count = ((count as f64 * config.static_share).round() as usize).min(count);
    let dynamic_count =
        ((count as f64 * config.dynamic_share).round() as usize).min(count - static_count);
    let (north, south) = slots.curb_lines();
    let length = slots.corridor().length;

    for i in 0..count {
        let kind = if i < static_count {
            SlotKind::Static
        } else if i < static_count + dynamic_count {
            SlotKind::Dynamic
        } else {
            SlotKind::Emergency
        };
        let x = rng.gen_range(0.0..=length);
        let (y, direction) = if rng.gen_bool(0.5) {
            (north, SlotDirection::North)
        } else {
            (south, SlotDirection::South)
        };
        let capacity = rng.gen_range(config.min_capacity..=config.max_capacity);
        let occupied_count = match kind {
            SlotKind::Emergency => 0,
            _ => rng.gen_range(0..=capacity),
        };
        let priority = match kind {
            SlotKind::Static => rng.gen_range(3..=7),
            SlotKind::Dynamic => dynamic_priority(1.0, 0.0),
            SlotKind::Emergency => 10,
        };
        let mut slot = ParkingSlot {
            id: SlotId(i as u32 + 1),
            position: Point::new(x, y),
            status: SlotStatus::Available,
            kind,
            capacity,
            occupied_count,
            priority,
            road_section: slots.road_section_at(x),
            direction,
            utilization_rate: 0.0,
            created_at: now,
        };
        slot.utilization_rate = slot.occupancy_percent();
        slot.sync_status();
        slots.register_slot(slot)?;
    }
    Ok(())
}

/// Replaces every simulation resource in `world` with a fresh scenario built
/// from `config`.
pub fn build_scenario(world: &mut World, config: &EngineConfig) -> Result<(), EngineError> {
    config.validate()?;
    let mut clock = SimulationClock::from_epoch_ms(config.start_epoch_ms)?;
    clock.set_speed(config.speed);
    let patterns = TimePatternTable::from_kind(&config.time_pattern).ok_or_else(|| {
        ConfigError::invalid("time_pattern", "custom tables need exactly 24 hourly entries")
    })?;

    let corridor = Corridor::from_config(&config.motion);
    let network = RoadNetwork::new(&config.network);
    let analyzer = CongestionAnalyzer::for_corridor(&config.congestion, &corridor);
    let mut rng = SimRng::new(config.seed);

    let mut vehicles = VehicleManager::default();
    spawn_fleet(
        &mut vehicles,
        config.vehicle_count,
        &config.motion,
        &network,
        &mut rng.0,
    )?;

    let mut slots = SlotManager::new(
        config.slots.clone(),
        corridor,
        config.congestion.segment_count,
    );
    seed_slots(&mut slots, config.slot_count, &config.slots, &mut rng.0, clock.now())?;

    log::info!(
        "Scenario built: {} vehicles, {} slots, {} intersections, start {}",
        vehicles.len(),
        slots.len(),
        network.intersections().len(),
        clock.now()
    );

    world.insert_resource(clock);
    world.insert_resource(config.motion.clone());
    world.insert_resource(config.congestion.clone());
    world.insert_resource(config.slots.clone());
    world.insert_resource(patterns);
    world.insert_resource(network);
    world.insert_resource(analyzer);
    world.insert_resource(vehicles);
    world.insert_resource(slots);
    world.insert_resource(rng);
    world.insert_resource(EventLog::default());
    world.insert_resource(AlertLevels::default());
    world.insert_resource(TickContext::default());
    Ok(())
}
