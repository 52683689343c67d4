use bevy_ecs::prelude::{Res, ResMut};
use rand::Rng;

use crate::clock::SimulationClock;
use crate::events::{EventKind, EventLog, Severity};
use crate::patterns::TimePatternTable;
use crate::random::SimRng;
use crate::scenario::SlotConfig;
use crate::slots::{DemandSignal, SlotManager};
use crate::systems::TickContext;

/// Updates slot occupancy for the tick and, with probability
/// `allocation_probability`, rebalances the dynamic slots to the current
/// hour's demand.
pub fn slot_system(
    ctx: Res<TickContext>,
    clock: Res<SimulationClock>,
    config: Res<SlotConfig>,
    patterns: Res<TimePatternTable>,
    mut slots: ResMut<SlotManager>,
    mut rng: ResMut<SimRng>,
    mut events: ResMut<EventLog>,
) {
    let demand = DemandSignal::from_pattern(&patterns, clock.hour());
    slots.update_occupancy(demand.level, ctx.dt_secs, &mut rng.0);

    if !rng.0.gen_bool(config.allocation_probability) {
        return;
    }
    let report = slots.allocate_dynamic_slots(&demand, &mut rng.0, clock.now());
    if !report.is_noop() {
        events.push(
            clock.now(),
            Severity::Info,
            EventKind::SlotReallocation,
            format!(
                "Dynamic slots rebalanced for hour {}: +{} / -{} ({} active, target {})",
                report.hour,
                report.created.len(),
                report.retired.len(),
                report.active_dynamic,
                report.target
            ),
        );
    }
}
