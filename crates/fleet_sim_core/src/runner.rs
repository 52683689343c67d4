//! Simulation runner: advances the clock and runs the tick schedule.
//!
//! Clock progression happens here, outside systems. Each tick advances
//! [`SimulationClock`], writes the [`TickContext`], then runs the schedule.
//! The schedule is chained and single-threaded, so subsystems always run in
//! the same order: motion, congestion, slots.

use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{ExecutorKind, IntoSystemConfigs};

use crate::clock::SimulationClock;
use crate::error::ClockError;
use crate::systems::{
    congestion::congestion_system, motion::motion_system, slots::slot_system, TickContext,
};

/// Builds the per-tick schedule.
pub fn tick_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems((motion_system, congestion_system, slot_system).chain());
    schedule
}

/// Runs one tick covering `sim_step_ms` of simulated time and `wall_step_ms`
/// of wall-clock time. The clock is advanced before the systems run; on
/// overflow nothing runs and the world is unchanged.
pub fn run_tick(
    world: &mut World,
    schedule: &mut Schedule,
    sim_step_ms: i64,
    wall_step_ms: u64,
) -> Result<TickContext, ClockError> {
    world
        .resource_mut::<SimulationClock>()
        .advance_ms(sim_step_ms)?;

    let ctx = {
        let mut ctx = world.resource_mut::<TickContext>();
        ctx.tick += 1;
        ctx.dt_secs = sim_step_ms as f64 / 1000.0;
        ctx.wall_ms = ctx.wall_ms.saturating_add(wall_step_ms);
        *ctx
    };

    schedule.run(world);
    Ok(ctx)
}
