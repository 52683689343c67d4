//! The simulation engine: owns the world, the tick schedule and the
//! Stopped / Running / FastForwarding state machine.
//!
//! Every mutation goes through `&mut SimulationEngine`, so ticks cannot
//! interleave. Snapshots are assembled after the schedule has finished, so a
//! consumer never sees a partially updated tick. Cancellation from inside a
//! callback or from another task goes through a [`StopHandle`], which the
//! engine checks between ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bevy_ecs::prelude::{Schedule, World};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{SimulationClock, SpeedMultiplier, ONE_HOUR_MS};
use crate::congestion::CongestionAnalyzer;
use crate::error::EngineError;
use crate::events::{EventKind, EventLog, Severity};
use crate::patterns::TimePatternTable;
use crate::runner::{run_tick, tick_schedule};
use crate::scenario::{build_scenario, EngineConfig, MotionConfig};
use crate::scheduler::Scheduler;
use crate::slots::{ParkingSlot, SlotId, SlotManager, SlotRequest};
use crate::spatial::EmergencyArea;
use crate::telemetry::{build_snapshot, capture_snapshot, InitialState, Snapshot};
use crate::vehicles::{VehicleId, VehicleManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Stopped,
    Running,
    FastForwarding,
}

/// Cloneable stop request, observed by the engine between ticks.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FastForwardOutcome {
    /// The clock advanced by the full requested amount.
    Completed { ticks: usize },
    /// A stop request arrived between ticks.
    Cancelled { ticks: usize },
    /// A runtime fault stopped the simulation.
    Halted { ticks: usize, error: EngineError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyReport {
    pub disabled_slots: Vec<SlotId>,
    pub evacuated: Vec<VehicleId>,
}

type SnapshotCallback = Box<dyn FnMut(&Snapshot) + Send>;

/// Borrow of the engine for the duration of a fast-forward. If it is
/// dropped while the engine is still fast-forwarding, by a stop request or
/// by the future itself being dropped at a yield point, the run is
/// cancelled and the engine stops.
struct FastForwardRun<'a> {
    engine: &'a mut SimulationEngine,
    ticks: usize,
}

impl Drop for FastForwardRun<'_> {
    fn drop(&mut self) {
        let engine = &mut *self.engine;
        if engine.state != EngineState::FastForwarding {
            return;
        }
        engine.set_state(EngineState::Stopped);
        engine.push_event(
            Severity::Warning,
            EventKind::FastForwardCancelled,
            format!("Fast-forward cancelled after {} ticks", self.ticks),
        );
        log::info!("Fast-forward cancelled at {}", engine.current_time());
        engine.deliver_snapshot();
    }
}

pub struct SimulationEngine {
    config: EngineConfig,
    world: World,
    schedule: Schedule,
    state: EngineState,
    stop: StopHandle,
    callback: Option<SnapshotCallback>,
}

impl SimulationEngine {
    /// Validates `config` and builds the initial world.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let mut world = World::new();
        build_scenario(&mut world, &config)?;
        Ok(Self {
            config,
            world,
            schedule: tick_schedule(),
            state: EngineState::Stopped,
            stop: StopHandle::default(),
            callback: None,
        })
    }

    /// Rebuilds the world from the configuration: fresh fleet, slots,
    /// segments and clock. The engine state and speed are kept.
    pub fn initialize(&mut self) -> Result<InitialState, EngineError> {
        let mut world = World::new();
        build_scenario(&mut world, &self.config)?;
        world
            .resource_mut::<SimulationClock>()
            .set_running(self.state == EngineState::Running);
        self.world = world;
        self.schedule = tick_schedule();
        let initial = InitialState::from_world(&self.world);
        log::info!(
            "Engine initialized with {} vehicles and {} slots",
            initial.vehicles.len(),
            initial.slots.len()
        );
        Ok(initial)
    }

    /// Registers the snapshot callback and starts running.
    pub fn start<F>(&mut self, callback: F)
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self.stop.clear();
        self.set_state(EngineState::Running);
        log::info!("Simulation started at {}x", self.speed().factor());
    }

    /// Stops the simulation. Safe to call in any state.
    pub fn stop(&mut self) {
        self.stop.clear();
        if self.state != EngineState::Stopped {
            log::info!("Simulation stopped at {}", self.current_time());
        }
        self.set_state(EngineState::Stopped);
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Changes the simulated time per tick. Clock and vehicles are untouched.
    pub fn set_speed(&mut self, speed: SpeedMultiplier) {
        self.config.speed = speed;
        self.world
            .resource_mut::<SimulationClock>()
            .set_speed(speed);
        log::info!("Simulation speed set to {}x", speed.factor());
    }

    /// Runs one tick covering `real_elapsed` of wall-clock time, scaled by
    /// the speed multiplier and time compression. Returns whether a tick ran.
    pub fn tick(&mut self, real_elapsed: Duration) -> Result<bool, EngineError> {
        if self.stop.take() {
            self.stop();
            return Ok(false);
        }
        if self.state != EngineState::Running {
            return Ok(false);
        }
        let sim_ms = self
            .world
            .resource::<SimulationClock>()
            .scaled_step_ms(real_elapsed, self.config.time_compression);
        let wall_ms = u64::try_from(real_elapsed.as_millis()).unwrap_or(u64::MAX);
        let result = self.step(sim_ms, wall_ms);
        self.deliver_snapshot();
        result.map(|_| true)
    }

    /// Pulls ticks from `scheduler` until the engine stops or the scheduler
    /// runs out. Returns the number of ticks executed.
    pub async fn run<S: Scheduler>(&mut self, scheduler: &mut S) -> Result<u64, EngineError> {
        scheduler.start();
        let mut ticks = 0;
        let result = loop {
            if self.state != EngineState::Running {
                break Ok(ticks);
            }
            let Some(elapsed) = scheduler.tick().await else {
                break Ok(ticks);
            };
            match self.tick(elapsed) {
                Ok(true) => ticks += 1,
                Ok(false) => break Ok(ticks),
                Err(err) => break Err(err),
            }
        };
        scheduler.stop();
        result
    }

    /// Advances simulated time by exactly `hours`, running every
    /// intermediate tick in steps of `fast_forward_step_secs`.
    ///
    /// `on_progress` receives the simulated time and percent complete after
    /// every `fast_forward_batch_ticks` ticks and at the end; the engine
    /// yields to the runtime at the same points. A stop request is honoured
    /// before the next tick, and dropping the future cancels the run the same
    /// way. On completion the previous state is restored.
    pub async fn fast_forward<F>(
        &mut self,
        hours: f64,
        mut on_progress: F,
    ) -> Result<FastForwardOutcome, EngineError>
    where
        F: FnMut(DateTime<Utc>, f64),
    {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(EngineError::InvalidFastForward(hours));
        }
        let total_ms = (hours * ONE_HOUR_MS as f64).round();
        if total_ms < 1.0 || total_ms >= i64::MAX as f64 {
            return Err(EngineError::InvalidFastForward(hours));
        }
        let total_ms = total_ms as i64;

        let prior = self.state;
        self.stop.clear();
        self.set_state(EngineState::FastForwarding);
        log::info!("Fast-forwarding {hours} h from {}", self.current_time());

        let step_ms = (self.config.fast_forward_step_secs as i64).saturating_mul(1000);
        let batch = self.config.fast_forward_batch_ticks;
        let wall_ms = self.config.tick_interval_ms;
        let mut done_ms = 0i64;
        let mut run = FastForwardRun {
            engine: self,
            ticks: 0,
        };

        while done_ms < total_ms {
            if run.engine.stop.take() {
                return Ok(FastForwardOutcome::Cancelled { ticks: run.ticks });
            }

            let step = step_ms.min(total_ms - done_ms);
            if let Err(error) = run.engine.step(step, wall_ms) {
                run.engine.deliver_snapshot();
                return Ok(FastForwardOutcome::Halted {
                    ticks: run.ticks,
                    error,
                });
            }
            done_ms += step;
            run.ticks += 1;

            if run.ticks % batch == 0 || done_ms >= total_ms {
                let percent = done_ms as f64 / total_ms as f64 * 100.0;
                on_progress(run.engine.current_time(), percent);
                tokio::task::yield_now().await;
            }
        }

        let ticks = run.ticks;
        run.engine.set_state(prior);
        run.engine.push_event(
            Severity::Info,
            EventKind::FastForwardCompleted,
            format!("Fast-forwarded {hours} h in {ticks} ticks"),
        );
        log::info!(
            "Fast-forward complete at {} ({ticks} ticks)",
            run.engine.current_time()
        );
        run.engine.deliver_snapshot();
        Ok(FastForwardOutcome::Completed { ticks })
    }

    /// Runs the tick pipeline and checks invariants. Any failure halts the
    /// simulation with a single critical alert.
    fn step(&mut self, sim_ms: i64, wall_ms: u64) -> Result<(), EngineError> {
        let checked = run_tick(&mut self.world, &mut self.schedule, sim_ms, wall_ms)
            .map_err(EngineError::from)
            .and_then(|_| self.check_invariants());
        if let Err(err) = &checked {
            self.halt(err);
        }
        checked
    }

    fn halt(&mut self, err: &EngineError) {
        log::error!("Simulation halted: {err}");
        self.push_event(
            Severity::Critical,
            EventKind::SystemAlert,
            format!("Simulation halted: {err}"),
        );
        self.set_state(EngineState::Stopped);
    }

    pub fn check_invariants(&self) -> Result<(), EngineError> {
        self.world.resource::<VehicleManager>().check_invariants()?;
        self.world.resource::<SlotManager>().check_invariants()?;
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) {
        self.state = state;
        self.world
            .resource_mut::<SimulationClock>()
            .set_running(state != EngineState::Stopped);
    }

    fn push_event(&mut self, severity: Severity, kind: EventKind, message: String) {
        let now = self.current_time();
        self.world
            .resource_mut::<EventLog>()
            .push(now, severity, kind, message);
    }

    fn deliver_snapshot(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            let snapshot = capture_snapshot(&mut self.world);
            callback(&snapshot);
        }
    }

    pub fn create_slot(&mut self, request: SlotRequest) -> Result<SlotId, EngineError> {
        let now = self.current_time();
        let id = self
            .world
            .resource_mut::<SlotManager>()
            .create_slot(request, now)?;
        log::debug!("Slot {id} created");
        Ok(id)
    }

    pub fn remove_slot(&mut self, id: SlotId) -> Result<ParkingSlot, EngineError> {
        let slot = self.world.resource_mut::<SlotManager>().remove_slot(id)?;
        log::debug!("Slot {id} removed");
        Ok(slot)
    }

    /// Closes `area`: disables the dynamic slots inside it and evacuates the
    /// vehicles within the radius. A second call while an emergency is active
    /// reports the existing closure and changes nothing.
    pub fn activate_emergency(&mut self, area: EmergencyArea) -> EmergencyReport {
        let already_active = self.world.resource::<SlotManager>().is_emergency_active();
        let disabled_slots = self
            .world
            .resource_mut::<SlotManager>()
            .activate_emergency_mode(area);
        if already_active {
            return EmergencyReport {
                disabled_slots,
                evacuated: Vec::new(),
            };
        }

        let motion = self.world.resource::<MotionConfig>().clone();
        let corridor = crate::motion::Corridor::from_config(&motion);
        let evacuated: Vec<VehicleId> = self
            .world
            .resource_mut::<VehicleManager>()
            .evacuate_area(area, &corridor, motion.evacuation_hold_secs)
            .into_iter()
            .map(|v| v.id)
            .collect();

        log::warn!(
            "Emergency at ({:.0}, {:.0}) r={} km: {} slots disabled, {} vehicles evacuated",
            area.center.x,
            area.center.y,
            area.radius_km,
            disabled_slots.len(),
            evacuated.len()
        );
        self.push_event(
            Severity::Critical,
            EventKind::EmergencyActivated,
            format!(
                "Emergency mode active within {} km of ({:.0}, {:.0}); {} slots disabled",
                area.radius_km,
                area.center.x,
                area.center.y,
                disabled_slots.len()
            ),
        );
        if !evacuated.is_empty() {
            self.push_event(
                Severity::Warning,
                EventKind::Evacuation,
                format!("{} vehicles evacuated from the emergency area", evacuated.len()),
            );
        }
        EmergencyReport {
            disabled_slots,
            evacuated,
        }
    }

    /// Lifts the active emergency and returns the restored slots.
    pub fn deactivate_emergency(&mut self) -> Vec<SlotId> {
        if !self.slots().is_emergency_active() {
            return Vec::new();
        }
        let restored = self
            .world
            .resource_mut::<SlotManager>()
            .deactivate_emergency_mode();
        self.push_event(
            Severity::Info,
            EventKind::EmergencyDeactivated,
            format!("Emergency mode lifted; {} slots restored", restored.len()),
        );
        restored
    }

    /// Current state without consuming undelivered events.
    pub fn snapshot(&self) -> Snapshot {
        let events = self.world.resource::<EventLog>().pending().cloned().collect();
        build_snapshot(&self.world, events)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.world.resource::<SimulationClock>().now()
    }

    pub fn speed(&self) -> SpeedMultiplier {
        self.world.resource::<SimulationClock>().speed()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vehicles(&self) -> &VehicleManager {
        self.world.resource::<VehicleManager>()
    }

    pub fn slots(&self) -> &SlotManager {
        self.world.resource::<SlotManager>()
    }

    pub fn congestion(&self) -> &CongestionAnalyzer {
        self.world.resource::<CongestionAnalyzer>()
    }

    pub fn patterns(&self) -> &TimePatternTable {
        self.world.resource::<TimePatternTable>()
    }

    pub fn events(&self) -> &EventLog {
        self.world.resource::<EventLog>()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for tests and tooling. Changes made here bypass
    /// the tick pipeline.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::slots::{SlotDirection, SlotKind, SlotStatus};
    use crate::spatial::Point;

    fn engine() -> SimulationEngine {
        SimulationEngine::new(EngineConfig::default().with_seed(17)).expect("engine")
    }

    #[test]
    fn invalid_config_fails_fast() {
        let mut config = EngineConfig::default();
        config.congestion.segment_count = 0;
        assert!(matches!(
            SimulationEngine::new(config),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn reserved_slot_drains_without_halting() {
        let mut engine = engine();
        let now = engine.current_time();
        let (north, _) = engine.slots().curb_lines();
        let reserved = ParkingSlot {
            id: SlotId(9_999),
            position: Point::new(150.0, north),
            status: SlotStatus::Reserved,
            kind: SlotKind::Static,
            capacity: 1,
            occupied_count: 1,
            priority: 5,
            road_section: "SEG-01".to_string(),
            direction: SlotDirection::North,
            utilization_rate: 100.0,
            created_at: now,
        };
        engine
            .world_mut()
            .resource_mut::<SlotManager>()
            .register_slot(reserved)
            .expect("register");

        let outcome = engine.fast_forward(3.0, |_, _| {}).await.expect("fast-forward");

        assert_eq!(outcome, FastForwardOutcome::Completed { ticks: 180 });
        assert!(engine.check_invariants().is_ok());
        let slot = engine.slots().get_slot(SlotId(9_999)).expect("slot");
        assert!(slot.status != SlotStatus::Reserved || slot.occupied_count > 0);
        assert_eq!(engine.events().count_kind(EventKind::SystemAlert), 0);
    }

    #[test]
    fn ticks_only_run_while_running() {
        let mut engine = engine();
        assert_eq!(engine.tick(Duration::from_millis(100)), Ok(false));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.start(move |snapshot| {
            if let Ok(mut ticks) = sink.lock() {
                ticks.push(snapshot.tick);
            }
        });
        let start = engine.current_time();
        assert_eq!(engine.tick(Duration::from_millis(100)), Ok(true));
        assert_eq!(engine.tick(Duration::from_millis(100)), Ok(true));
        // 100 ms real at 1x with compression 10 is one simulated second.
        assert_eq!((engine.current_time() - start).num_milliseconds(), 2_000);
        assert_eq!(*seen.lock().expect("lock"), vec![1, 2]);

        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.tick(Duration::from_millis(100)), Ok(false));
    }

    #[test]
    fn speed_scales_simulated_step() {
        let mut engine = engine();
        engine.start(|_| {});
        engine.set_speed(SpeedMultiplier::X30);
        let start = engine.current_time();
        engine.tick(Duration::from_millis(100)).expect("tick");
        assert_eq!((engine.current_time() - start).num_milliseconds(), 30_000);
        assert_eq!(engine.vehicles().len(), 50);
    }

    #[test]
    fn stop_handle_stops_before_next_tick() {
        let mut engine = engine();
        engine.start(|_| {});
        engine.stop_handle().stop();
        assert_eq!(engine.tick(Duration::from_millis(100)), Ok(false));
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn emergency_disables_slots_and_evacuates() {
        let mut engine = engine();
        let area = EmergencyArea::new(Point::new(1000.0, 600.0), 0.3);
        let report = engine.activate_emergency(area);
        for id in &report.evacuated {
            let v = engine.vehicles().get_vehicle(*id).expect("vehicle");
            assert!(!area.contains(v.position));
        }
        let again = engine.activate_emergency(area);
        assert_eq!(again.disabled_slots, report.disabled_slots);
        assert!(again.evacuated.is_empty());

        assert_eq!(engine.deactivate_emergency(), report.disabled_slots);
        assert!(engine.deactivate_emergency().is_empty());
        let kinds: Vec<EventKind> = engine.snapshot().events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::EmergencyActivated));
        assert!(kinds.contains(&EventKind::EmergencyDeactivated));
    }

    #[test]
    fn clock_overflow_halts_with_one_alert() {
        let latest = DateTime::<Utc>::MAX_UTC.timestamp_millis();
        let mut engine = SimulationEngine::new(
            EngineConfig::default().with_seed(17).with_start_epoch_ms(latest),
        )
        .expect("engine");
        engine.start(|_| {});
        let result = engine.tick(Duration::from_millis(100));
        assert!(matches!(result, Err(EngineError::Clock(_))));
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.events().count_kind(EventKind::SystemAlert), 1);
        assert_eq!(engine.tick(Duration::from_millis(100)), Ok(false));
    }

    #[test]
    fn invariants_catch_out_of_range_battery() {
        let mut engine = engine();
        assert!(engine.check_invariants().is_ok());
        if let Some(v) = engine
            .world_mut()
            .resource_mut::<VehicleManager>()
            .get_vehicle_mut(VehicleId(1))
        {
            v.battery = 150.0;
        }
        assert!(matches!(
            engine.check_invariants(),
            Err(EngineError::Invariant(_))
        ));
    }
}
