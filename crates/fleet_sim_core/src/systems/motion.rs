use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::congestion::CongestionAnalyzer;
use crate::events::{EventKind, EventLog, Severity};
use crate::motion::{advance, Corridor, MotionInputs};
use crate::patterns::TimePatternTable;
use crate::random::SimRng;
use crate::road_network::RoadNetwork;
use crate::scenario::MotionConfig;
use crate::systems::TickContext;
use crate::vehicles::VehicleManager;

/// Moves the fleet through the simulated interval of the current tick.
#[allow(clippy::too_many_arguments)]
pub fn motion_system(
    ctx: Res<TickContext>,
    clock: Res<SimulationClock>,
    config: Res<MotionConfig>,
    network: Res<RoadNetwork>,
    patterns: Res<TimePatternTable>,
    congestion: Res<CongestionAnalyzer>,
    mut vehicles: ResMut<VehicleManager>,
    mut rng: ResMut<SimRng>,
    mut events: ResMut<EventLog>,
) {
    if ctx.dt_secs <= 0.0 {
        return;
    }
    let inputs = MotionInputs {
        config: &config,
        corridor: Corridor::from_config(&config),
        network: &network,
        congestion: &congestion,
        pattern_speed_factor: patterns.level_at(clock.hour()).speed_factor,
    };
    let report = advance(&mut vehicles, &inputs, ctx.dt_secs, &mut rng.0);

    for id in report.depleted {
        events.push(
            clock.now(),
            Severity::Warning,
            EventKind::BatteryDepleted,
            format!("{id} battery depleted; parked to charge"),
        );
    }
}
