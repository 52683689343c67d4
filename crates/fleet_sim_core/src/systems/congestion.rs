//! Rate-limited congestion analysis with fault isolation.
//!
//! A failed analysis leaves the previous scores in place, records a
//! `SubsystemFault` event and lets the rest of the tick run.

use std::collections::BTreeMap;

use bevy_ecs::prelude::{Res, ResMut, Resource};

use crate::clock::SimulationClock;
use crate::congestion::{AlertSeverity, CongestionAnalyzer};
use crate::events::{EventKind, EventLog, Severity};
use crate::systems::TickContext;
use crate::vehicles::VehicleManager;

/// Last alert severity seen per segment, so an alert event is only emitted
/// when a segment escalates.
#[derive(Debug, Default, Resource)]
pub struct AlertLevels(pub BTreeMap<String, AlertSeverity>);

pub fn congestion_system(
    ctx: Res<TickContext>,
    clock: Res<SimulationClock>,
    vehicles: Res<VehicleManager>,
    mut analyzer: ResMut<CongestionAnalyzer>,
    mut levels: ResMut<AlertLevels>,
    mut events: ResMut<EventLog>,
) {
    let previous = analyzer.last_analysis_ms();
    if let Err(err) = analyzer.analyze_congestion(vehicles.iter(), ctx.wall_ms) {
        log::warn!("Congestion analysis skipped on tick {}: {err}", ctx.tick);
        events.push(
            clock.now(),
            Severity::Error,
            EventKind::SubsystemFault,
            format!("congestion analysis failed: {err}"),
        );
        return;
    }
    if analyzer.last_analysis_ms() == previous {
        return;
    }

    let alerts = analyzer.check_congestion_alerts();
    let mut current = BTreeMap::new();
    for alert in alerts {
        let escalated = levels
            .0
            .get(&alert.segment_id)
            .map_or(true, |last| alert.severity > *last);
        if escalated && alert.severity >= AlertSeverity::High {
            let severity = if alert.severity == AlertSeverity::Critical {
                Severity::Critical
            } else {
                Severity::Warning
            };
            events.push(clock.now(), severity, EventKind::CongestionAlert, alert.message);
        }
        current.insert(alert.segment_id, alert.severity);
    }
    levels.0 = current;
}

#[cfg(test)]
mod tests {
    use bevy_ecs::prelude::{Schedule, World};

    use super::*;
    use crate::scenario::{build_scenario, EngineConfig};
    use crate::spatial::Point;
    use crate::vehicles::{Vehicle, VehicleId};

    fn world_with_jam() -> World {
        let mut world = World::new();
        let config = EngineConfig::default().with_seed(5).with_vehicle_count(0);
        build_scenario(&mut world, &config).expect("build");
        let mut vehicles = world.resource_mut::<VehicleManager>();
        for i in 0..8 {
            let v = Vehicle::new(VehicleId(i + 1), Point::new(50.0, 595.0), 1, 40.0);
            vehicles.register_vehicle(v).expect("register");
        }
        world
    }

    fn run(world: &mut World, wall_ms: u64) {
        world.insert_resource(TickContext {
            tick: wall_ms / 100,
            dt_secs: 1.0,
            wall_ms,
        });
        let mut schedule = Schedule::default();
        schedule.add_systems(congestion_system);
        schedule.run(world);
    }

    #[test]
    fn escalation_emits_one_alert() {
        let mut world = world_with_jam();
        run(&mut world, 0);
        let events = world.resource_mut::<EventLog>().drain_pending();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::CongestionAlert);
        assert_eq!(events[0].severity, Severity::Critical);

        // Still critical on the next analysis: no repeat.
        run(&mut world, 5_000);
        assert!(world.resource_mut::<EventLog>().drain_pending().is_empty());
    }

    #[test]
    fn bad_sample_is_isolated() {
        let mut world = world_with_jam();
        run(&mut world, 0);
        world.resource_mut::<EventLog>().drain_pending();
        let scores = world.resource::<CongestionAnalyzer>().scores().clone();

        if let Some(v) = world.resource_mut::<VehicleManager>().get_vehicle_mut(VehicleId(1)) {
            v.position.x = f64::NAN;
        }
        run(&mut world, 10_000);

        let events = world.resource_mut::<EventLog>().drain_pending();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::SubsystemFault);
        assert_eq!(events[0].severity, Severity::Error);
        assert_eq!(world.resource::<CongestionAnalyzer>().scores(), &scores);
    }
}
