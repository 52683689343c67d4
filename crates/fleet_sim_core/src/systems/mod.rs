//! Per-tick ECS systems, run in a fixed chain by [`crate::runner`]:
//! motion, then congestion, then slots.

pub mod congestion;
pub mod motion;
pub mod slots;

use bevy_ecs::prelude::Resource;

pub use congestion::AlertLevels;

/// Inputs of the tick being executed, written by the runner before the
/// schedule runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Resource)]
pub struct TickContext {
    pub tick: u64,
    /// Simulated seconds covered by this tick.
    pub dt_secs: f64,
    /// Monotonic wall-clock milliseconds since the engine was built. Fast
    /// forward advances it by the nominal tick interval per tick.
    pub wall_ms: u64,
}
