//! Per-vehicle kinematics on the multi-lane corridor.
//!
//! Vehicles drive back and forth along a straight corridor on the x axis.
//! Every motion step they pick a target speed from the headway to the next
//! vehicle in their lane, accelerate towards it under a bounded rate, move,
//! bounce at the corridor ends (where they pick up or drop off), and
//! occasionally change lanes when the neighbouring lane has a safe gap.
//!
//! The model aims for visual plausibility, not traffic-engineering accuracy.

use rand::Rng;

use crate::congestion::CongestionAnalyzer;
use crate::road_network::RoadNetwork;
use crate::scenario::MotionConfig;
use crate::spatial::Point;
use crate::vehicles::{Direction, Vehicle, VehicleId, VehicleManager, VehicleStatus};

const KMH_PER_MS: f64 = 3.6;

/// Lane geometry of the corridor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corridor {
    pub length: f64,
    pub center_y: f64,
    pub lane_count: usize,
    pub lane_width: f64,
}

impl Corridor {
    pub fn from_config(config: &MotionConfig) -> Self {
        Self {
            length: config.corridor_length,
            center_y: config.corridor_y,
            lane_count: config.lane_count,
            lane_width: config.lane_width,
        }
    }

    pub fn lane_center_y(&self, lane: usize) -> f64 {
        let middle = (self.lane_count as f64 - 1.0) / 2.0;
        self.center_y + (lane as f64 - middle) * self.lane_width
    }

    /// `y` of the north (smaller `y`) and south outer lane edges.
    pub fn outer_edges(&self) -> (f64, f64) {
        let half = self.lane_count as f64 * self.lane_width / 2.0;
        (self.center_y - half, self.center_y + half)
    }

    /// The corridor end a vehicle heading in `direction` will reach.
    pub fn end_for(&self, direction: Direction, y: f64) -> Point {
        match direction {
            Direction::Forward => Point::new(self.length, y),
            Direction::Backward => Point::new(0.0, y),
        }
    }
}

/// Shared per-step inputs the motion model reads but never mutates.
pub struct MotionInputs<'a> {
    pub config: &'a MotionConfig,
    pub corridor: Corridor,
    pub network: &'a RoadNetwork,
    pub congestion: &'a CongestionAnalyzer,
    /// Speed factor of the current hour in the time-pattern table.
    pub pattern_speed_factor: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MotionReport {
    pub steps: usize,
    pub depleted: Vec<VehicleId>,
    pub trips_completed: u32,
}

impl MotionReport {
    fn merge(&mut self, other: MotionReport) {
        self.steps += other.steps;
        self.depleted.extend(other.depleted);
        self.trips_completed += other.trips_completed;
    }
}

#[derive(Debug, Clone, Copy)]
struct LaneSample {
    id: VehicleId,
    position: Point,
    occupies_lane: bool,
}

impl From<&Vehicle> for LaneSample {
    fn from(v: &Vehicle) -> Self {
        Self {
            id: v.id,
            position: v.position,
            occupies_lane: v.occupies_lane(),
        }
    }
}

/// Target speed from the headway to the vehicle ahead.
pub fn headway_target_speed(base_kmh: f64, headway: Option<f64>, config: &MotionConfig) -> f64 {
    match headway {
        Some(h) if h < config.close_headway => {
            (base_kmh * config.close_speed_factor).max(config.min_target_speed_kmh)
        }
        Some(h) if h < config.near_headway => base_kmh * config.near_speed_factor,
        _ => base_kmh,
    }
}

/// Moves `current` towards `target` by at most `max_rate * dt`; never negative.
pub fn approach_speed(current: f64, target: f64, max_rate: f64, dt: f64) -> f64 {
    let limit = max_rate * dt;
    (current + (target - current).clamp(-limit, limit)).max(0.0)
}

fn in_lane(sample: &LaneSample, lane_y: f64, lane_width: f64) -> bool {
    sample.occupies_lane && (sample.position.y - lane_y).abs() < lane_width / 2.0
}

/// Smallest positive gap to a vehicle ahead of `me` in `lane`.
fn min_headway(
    me: &Vehicle,
    samples: &[LaneSample],
    corridor: &Corridor,
) -> Option<f64> {
    let lane_y = corridor.lane_center_y(me.lane);
    samples
        .iter()
        .filter(|s| s.id != me.id && in_lane(s, lane_y, corridor.lane_width))
        .map(|s| (s.position.x - me.position.x) * me.direction.sign())
        .filter(|gap| *gap >= 0.0)
        .min_by(|a, b| a.total_cmp(b))
}

fn lane_gap_is_clear(
    me: &Vehicle,
    target_lane: usize,
    samples: &[LaneSample],
    corridor: &Corridor,
    window: f64,
) -> bool {
    let lane_y = corridor.lane_center_y(target_lane);
    !samples.iter().any(|s| {
        s.id != me.id
            && in_lane(s, lane_y, corridor.lane_width)
            && (s.position.x - me.position.x).abs() < window
    })
}

fn adjacent_lanes(lane: usize, lane_count: usize) -> impl Iterator<Item = usize> {
    [lane.checked_sub(1), Some(lane + 1).filter(|l| *l < lane_count)]
        .into_iter()
        .flatten()
}

fn try_begin_lane_change<R: Rng>(
    vehicle: &mut Vehicle,
    samples: &[LaneSample],
    inputs: &MotionInputs<'_>,
    rng: &mut R,
) {
    if !rng.gen_bool(inputs.config.lane_change_probability) {
        return;
    }
    let mut candidates: Vec<usize> =
        adjacent_lanes(vehicle.lane, inputs.corridor.lane_count).collect();
    if candidates.len() == 2 && rng.gen_bool(0.5) {
        candidates.swap(0, 1);
    }
    let chosen = candidates.into_iter().find(|lane| {
        lane_gap_is_clear(
            vehicle,
            *lane,
            samples,
            &inputs.corridor,
            inputs.config.lane_change_gap,
        )
    });
    if let Some(lane) = chosen {
        vehicle.target_lane = Some(lane);
        vehicle.is_changing_lane = true;
    }
}

/// Returns whether a lane change was in progress at the start of the step.
fn progress_lane_change(vehicle: &mut Vehicle, inputs: &MotionInputs<'_>, dt: f64) -> bool {
    let Some(target) = vehicle.target_lane.filter(|_| vehicle.is_changing_lane) else {
        return false;
    };
    let target_y = inputs.corridor.lane_center_y(target);
    let offset = target_y - vehicle.position.y;
    let step = inputs.config.lane_change_rate * dt;
    vehicle.position.y += offset.signum() * offset.abs().min(step);
    if (target_y - vehicle.position.y).abs() < inputs.config.lane_snap_epsilon {
        vehicle.position.y = target_y;
        vehicle.lane = target;
        vehicle.target_lane = None;
        vehicle.is_changing_lane = false;
    }
    true
}

/// Points the vehicle at the far end of the corridor and routes it there.
pub fn assign_destination(vehicle: &mut Vehicle, corridor: &Corridor, network: &RoadNetwork) {
    let destination = corridor.end_for(vehicle.direction, vehicle.position.y);
    vehicle.route = network.find_path(vehicle.position, destination);
    vehicle.destination = Some(destination);
}

fn effective_base_speed(vehicle: &Vehicle, inputs: &MotionInputs<'_>) -> f64 {
    let limit = inputs.network.get_speed_limit(vehicle.position);
    vehicle.base_speed.min(limit)
        * inputs.pattern_speed_factor
        * inputs
            .congestion
            .speed_factor_at(vehicle.position, inputs.config.congestion_slowdown)
}

fn step_dwell(vehicle: &mut Vehicle, inputs: &MotionInputs<'_>, dt: f64, report: &mut MotionReport) {
    vehicle.speed = 0.0;
    vehicle.dwell_remaining_secs = (vehicle.dwell_remaining_secs - dt).max(0.0);
    if vehicle.dwell_remaining_secs > 0.0 {
        return;
    }
    match vehicle.status {
        VehicleStatus::Picking => vehicle.has_passenger = true,
        VehicleStatus::Dropping => {
            vehicle.has_passenger = false;
            vehicle.trip_count += 1;
            report.trips_completed += 1;
        }
        _ => {}
    }
    vehicle.status = VehicleStatus::Moving;
    assign_destination(vehicle, &inputs.corridor, inputs.network);
}

fn step_parked(vehicle: &mut Vehicle, inputs: &MotionInputs<'_>, dt: f64) {
    let config = inputs.config;
    vehicle.speed = 0.0;
    vehicle.battery = (vehicle.battery + config.charge_rate_per_hour * dt / 3600.0).min(100.0);
    if vehicle.battery >= config.resume_battery_threshold && vehicle.dwell_remaining_secs <= 0.0 {
        vehicle.status = VehicleStatus::Moving;
        assign_destination(vehicle, &inputs.corridor, inputs.network);
    }
}

fn step_moving<R: Rng>(
    vehicle: &mut Vehicle,
    samples: &[LaneSample],
    inputs: &MotionInputs<'_>,
    dt: f64,
    lane_busy: bool,
    rng: &mut R,
    report: &mut MotionReport,
) {
    let config = inputs.config;
    let corridor = &inputs.corridor;

    let base = effective_base_speed(vehicle, inputs);
    let headway = min_headway(vehicle, samples, corridor);
    let target = headway_target_speed(base, headway, config);
    vehicle.speed = approach_speed(vehicle.speed, target, config.max_accel_kmh_per_s, dt);

    let start_x = vehicle.position.x;
    let next_x = start_x + vehicle.speed / KMH_PER_MS * dt * vehicle.direction.sign();
    vehicle.position.x = next_x.clamp(0.0, corridor.length);
    let travelled_km = (vehicle.position.x - start_x).abs() / 1000.0;
    vehicle.total_distance_km += travelled_km;
    vehicle.battery = (vehicle.battery - travelled_km * config.battery_drain_per_km).clamp(0.0, 100.0);

    if vehicle.battery <= config.low_battery_threshold {
        vehicle.status = VehicleStatus::Parked;
        vehicle.speed = 0.0;
        vehicle.destination = None;
        vehicle.route.clear();
        report.depleted.push(vehicle.id);
        return;
    }

    if next_x <= 0.0 || next_x >= corridor.length {
        vehicle.direction = vehicle.direction.reversed();
        vehicle.status = if vehicle.has_passenger {
            VehicleStatus::Dropping
        } else {
            VehicleStatus::Picking
        };
        vehicle.dwell_remaining_secs = config.dwell_secs;
        vehicle.speed = 0.0;
        return;
    }

    if !lane_busy {
        try_begin_lane_change(vehicle, samples, inputs, rng);
    }
}

/// One motion step of `dt` simulated seconds for the whole fleet.
///
/// Every vehicle sees the positions from the start of the step, so the
/// update is independent of iteration order apart from RNG draws.
pub fn step_vehicles<R: Rng>(
    vehicles: &mut VehicleManager,
    inputs: &MotionInputs<'_>,
    dt: f64,
    rng: &mut R,
) -> MotionReport {
    let samples: Vec<LaneSample> = vehicles.iter().map(LaneSample::from).collect();
    let mut report = MotionReport {
        steps: 1,
        ..Default::default()
    };

    for vehicle in vehicles.iter_mut() {
        let lane_busy = progress_lane_change(vehicle, inputs, dt);
        match vehicle.status {
            VehicleStatus::Moving => {
                step_moving(vehicle, &samples, inputs, dt, lane_busy, rng, &mut report)
            }
            VehicleStatus::Parked => step_parked(vehicle, inputs, dt),
            VehicleStatus::Idle | VehicleStatus::Picking | VehicleStatus::Dropping => {
                step_dwell(vehicle, inputs, dt, &mut report)
            }
        }
    }
    report
}

/// Integrates `total_secs` in steps no longer than the configured substep.
pub fn advance<R: Rng>(
    vehicles: &mut VehicleManager,
    inputs: &MotionInputs<'_>,
    total_secs: f64,
    rng: &mut R,
) -> MotionReport {
    let mut report = MotionReport::default();
    let mut remaining = total_secs;
    while remaining > 1e-9 {
        let dt = remaining.min(inputs.config.substep_secs);
        report.merge(step_vehicles(vehicles, inputs, dt, rng));
        remaining -= dt;
    }
    report
}
