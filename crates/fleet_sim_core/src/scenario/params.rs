use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::clock::{SimulationClock, SpeedMultiplier};
use crate::error::ConfigError;
use crate::patterns::{TimePatternKind, TimePatternTable};
use crate::road_network::{Arterial, Orientation, RoadClass};

/// Default start: Monday 2024-03-04 07:00 UTC, just before the morning peak.
const DEFAULT_START_EPOCH_MS: i64 = 1_709_535_600_000;

const DEFAULT_WORLD_WIDTH: f64 = 2000.0;
const DEFAULT_WORLD_HEIGHT: f64 = 1200.0;
const DEFAULT_CORRIDOR_Y: f64 = 600.0;

/// Upper bounds that keep a tick's work and the initial allocations finite.
const MAX_WORLD_EXTENT: f64 = 1_000_000.0;
const MAX_SPEED_KMH: f64 = 500.0;
const MIN_SUBSTEP_SECS: f64 = 0.01;
const MAX_INTERSECTIONS: f64 = 1_000_000.0;
const MAX_TIME_COMPRESSION: f64 = 1_000.0;
const MAX_FAST_FORWARD_STEP_SECS: u64 = 3_600;

/// Lane geometry and the car-following / lane-change / battery tuning.
#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub corridor_length: f64,
    pub corridor_y: f64,
    pub lane_count: usize,
    pub lane_width: f64,
    pub base_speed_min_kmh: f64,
    pub base_speed_max_kmh: f64,
    /// Floor applied to the close-headway target speed.
    pub min_target_speed_kmh: f64,
    pub close_headway: f64,
    pub near_headway: f64,
    pub close_speed_factor: f64,
    pub near_speed_factor: f64,
    /// Bound on speed change, km/h per simulated second (both directions).
    pub max_accel_kmh_per_s: f64,
    /// Longest simulated interval integrated in one motion step.
    pub substep_secs: f64,
    /// Chance per motion step that a vehicle considers changing lanes.
    pub lane_change_probability: f64,
    /// Longitudinal window that must be clear in the target lane.
    pub lane_change_gap: f64,
    /// Lateral speed while changing lanes, units per second.
    pub lane_change_rate: f64,
    pub lane_snap_epsilon: f64,
    /// Fraction of speed lost at a segment congestion score of 100.
    pub congestion_slowdown: f64,
    pub battery_drain_per_km: f64,
    pub low_battery_threshold: f64,
    pub resume_battery_threshold: f64,
    pub charge_rate_per_hour: f64,
    pub initial_battery_min: f64,
    /// Pickup / drop-off duration at the corridor ends.
    pub dwell_secs: f64,
    pub evacuation_hold_secs: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            corridor_length: DEFAULT_WORLD_WIDTH,
            corridor_y: DEFAULT_CORRIDOR_Y,
            lane_count: 4,
            lane_width: 10.0,
            base_speed_min_kmh: 30.0,
            base_speed_max_kmh: 60.0,
            min_target_speed_kmh: 10.0,
            close_headway: 40.0,
            near_headway: 80.0,
            close_speed_factor: 0.3,
            near_speed_factor: 0.7,
            max_accel_kmh_per_s: 5.0,
            substep_secs: 1.0,
            lane_change_probability: 0.001,
            lane_change_gap: 60.0,
            lane_change_rate: 5.0,
            lane_snap_epsilon: 2.0,
            congestion_slowdown: 0.5,
            battery_drain_per_km: 0.8,
            low_battery_threshold: 15.0,
            resume_battery_threshold: 80.0,
            charge_rate_per_hour: 60.0,
            initial_battery_min: 40.0,
            dwell_secs: 20.0,
            evacuation_hold_secs: 300.0,
        }
    }
}

/// Segment layout, scoring weights, prediction factors and alert thresholds.
#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionConfig {
    pub segment_count: usize,
    pub segment_capacity: u32,
    /// Extra height above and below the outer lanes covered by each segment.
    pub segment_margin: f64,
    /// Minimum wall-clock interval between two full recomputations.
    pub recompute_interval_ms: u64,
    pub free_flow_speed_kmh: f64,
    pub occupancy_weight: f64,
    pub speed_weight: f64,
    pub history_capacity: usize,
    pub global_history_capacity: usize,
    pub prediction_window: usize,
    pub cold_start_prediction: f64,
    pub rush_factor: f64,
    pub lunch_factor: f64,
    pub late_night_factor: f64,
    pub critical_threshold: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub low_threshold: f64,
    pub route_threshold: f64,
    pub route_limit: usize,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            segment_count: 10,
            segment_capacity: 8,
            segment_margin: 10.0,
            recompute_interval_ms: 5_000,
            free_flow_speed_kmh: 60.0,
            occupancy_weight: 0.7,
            speed_weight: 30.0,
            history_capacity: 100,
            global_history_capacity: 1_000,
            prediction_window: 5,
            cold_start_prediction: 50.0,
            rush_factor: 1.5,
            lunch_factor: 1.2,
            late_night_factor: 0.3,
            critical_threshold: 90.0,
            high_threshold: 70.0,
            medium_threshold: 50.0,
            low_threshold: 30.0,
            route_threshold: 70.0,
            route_limit: 3,
        }
    }
}

/// Initial slot mix, dynamic allocation and occupancy tuning.
#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    pub static_share: f64,
    pub dynamic_share: f64,
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// Distance between the outer lane edge and the curb slots.
    pub curb_offset: f64,
    pub base_dynamic_slots: usize,
    pub max_dynamic_slots: usize,
    /// Chance per tick that the engine runs the dynamic allocator.
    pub allocation_probability: f64,
    pub arrival_rate_per_min: f64,
    pub departure_rate_per_min: f64,
    pub utilization_smoothing: f64,
    pub hotspot_x: f64,
    pub hotspot_spread: f64,
    pub underutilized_threshold: f64,
    pub overutilized_threshold: f64,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            static_share: 0.7,
            dynamic_share: 0.25,
            min_capacity: 1,
            max_capacity: 4,
            curb_offset: 10.0,
            base_dynamic_slots: 30,
            max_dynamic_slots: 60,
            allocation_probability: 0.1,
            arrival_rate_per_min: 0.2,
            departure_rate_per_min: 0.1,
            utilization_smoothing: 0.1,
            hotspot_x: DEFAULT_WORLD_WIDTH / 2.0,
            hotspot_spread: 300.0,
            underutilized_threshold: 20.0,
            overutilized_threshold: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub width: f64,
    pub height: f64,
    pub spacing: f64,
    pub arterials: Vec<Arterial>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        use Orientation::*;
        use RoadClass::*;
        let w = DEFAULT_WORLD_WIDTH;
        let h = DEFAULT_WORLD_HEIGHT;
        Self {
            width: w,
            height: h,
            spacing: 200.0,
            arterials: vec![
                Arterial::new("Corridor Expressway", Highway, EastWest, DEFAULT_CORRIDOR_Y, 0.0, 1200.0),
                Arterial::new("Riverside Boulevard", Main, EastWest, DEFAULT_CORRIDOR_Y, 1200.0, w),
                Arterial::new("Harbor Road", Main, EastWest, 200.0, 0.0, w),
                Arterial::new("Central Avenue", Main, NorthSouth, 1000.0, 0.0, h),
                Arterial::new("Market Street", Sub, NorthSouth, 400.0, 0.0, h),
                Arterial::new("Station Street", Sub, NorthSouth, 1600.0, 0.0, h),
            ],
        }
    }
}

/// Everything needed to build and drive one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub vehicle_count: usize,
    pub slot_count: usize,
    /// Unix epoch (ms) of the simulated start time.
    pub start_epoch_ms: i64,
    pub speed: SpeedMultiplier,
    /// Real-time interval between ticks.
    pub tick_interval_ms: u64,
    /// Simulated seconds per real second at 1x.
    pub time_compression: f64,
    pub fast_forward_step_secs: u64,
    /// Ticks between two fast-forward progress reports.
    pub fast_forward_batch_ticks: usize,
    pub motion: MotionConfig,
    pub congestion: CongestionConfig,
    pub slots: SlotConfig,
    pub network: NetworkConfig,
    pub time_pattern: TimePatternKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            vehicle_count: 50,
            slot_count: 120,
            start_epoch_ms: DEFAULT_START_EPOCH_MS,
            speed: SpeedMultiplier::X1,
            tick_interval_ms: 100,
            time_compression: 10.0,
            fast_forward_step_secs: 60,
            fast_forward_batch_ticks: 10,
            motion: MotionConfig::default(),
            congestion: CongestionConfig::default(),
            slots: SlotConfig::default(),
            network: NetworkConfig::default(),
            time_pattern: TimePatternKind::default(),
        }
    }
}

fn require(condition: bool, field: &'static str, reason: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, reason))
    }
}

impl EngineConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_vehicle_count(mut self, count: usize) -> Self {
        self.vehicle_count = count;
        self
    }

    pub fn with_slot_count(mut self, count: usize) -> Self {
        self.slot_count = count;
        self
    }

    pub fn with_start_epoch_ms(mut self, epoch_ms: i64) -> Self {
        self.start_epoch_ms = epoch_ms;
        self
    }

    pub fn with_speed(mut self, speed: SpeedMultiplier) -> Self {
        self.speed = speed;
        self
    }

    /// Set the start time to `hour`:00 on the default start day.
    pub fn with_start_hour(mut self, hour: u32) -> Self {
        let midnight = DEFAULT_START_EPOCH_MS - 7 * crate::clock::ONE_HOUR_MS;
        self.start_epoch_ms = midnight + i64::from(hour % 24) * crate::clock::ONE_HOUR_MS;
        self
    }

    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_congestion(mut self, congestion: CongestionConfig) -> Self {
        self.congestion = congestion;
        self
    }

    pub fn with_slots(mut self, slots: SlotConfig) -> Self {
        self.slots = slots;
        self
    }

    fn float_fields(&self) -> Vec<(&'static str, f64)> {
        let (m, c, s, n) = (&self.motion, &self.congestion, &self.slots, &self.network);
        vec![
            ("motion.corridor_length", m.corridor_length),
            ("motion.corridor_y", m.corridor_y),
            ("motion.lane_width", m.lane_width),
            ("motion.base_speed_min_kmh", m.base_speed_min_kmh),
            ("motion.base_speed_max_kmh", m.base_speed_max_kmh),
            ("motion.min_target_speed_kmh", m.min_target_speed_kmh),
            ("motion.close_headway", m.close_headway),
            ("motion.near_headway", m.near_headway),
            ("motion.max_accel_kmh_per_s", m.max_accel_kmh_per_s),
            ("motion.substep_secs", m.substep_secs),
            ("motion.lane_change_gap", m.lane_change_gap),
            ("motion.lane_change_rate", m.lane_change_rate),
            ("motion.congestion_slowdown", m.congestion_slowdown),
            ("motion.battery_drain_per_km", m.battery_drain_per_km),
            ("motion.charge_rate_per_hour", m.charge_rate_per_hour),
            ("motion.dwell_secs", m.dwell_secs),
            ("motion.evacuation_hold_secs", m.evacuation_hold_secs),
            ("congestion.segment_margin", c.segment_margin),
            ("congestion.free_flow_speed_kmh", c.free_flow_speed_kmh),
            ("congestion.occupancy_weight", c.occupancy_weight),
            ("congestion.speed_weight", c.speed_weight),
            ("congestion.rush_factor", c.rush_factor),
            ("slots.curb_offset", s.curb_offset),
            ("slots.arrival_rate_per_min", s.arrival_rate_per_min),
            ("slots.departure_rate_per_min", s.departure_rate_per_min),
            ("slots.hotspot_x", s.hotspot_x),
            ("slots.hotspot_spread", s.hotspot_spread),
            ("network.width", n.width),
            ("network.height", n.height),
            ("network.spacing", n.spacing),
            ("time_compression", self.time_compression),
            ("slots.utilization_smoothing", s.utilization_smoothing),
        ]
    }

    /// Fails fast on values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in self.float_fields() {
            require(value.is_finite(), field, "must be a finite number")?;
        }
        SimulationClock::from_epoch_ms(self.start_epoch_ms)?;
        if TimePatternTable::from_kind(&self.time_pattern).is_none() {
            return Err(ConfigError::invalid(
                "time_pattern",
                "custom tables need exactly 24 hourly entries",
            ));
        }
        require(self.tick_interval_ms > 0, "tick_interval_ms", "must be positive")?;
        require(
            self.time_compression > 0.0 && self.time_compression <= MAX_TIME_COMPRESSION,
            "time_compression",
            "must be positive and at most 1000",
        )?;
        require(
            (1..=MAX_FAST_FORWARD_STEP_SECS).contains(&self.fast_forward_step_secs),
            "fast_forward_step_secs",
            "must be between 1 and 3600",
        )?;
        require(
            self.fast_forward_batch_ticks > 0,
            "fast_forward_batch_ticks",
            "must be positive",
        )?;

        let m = &self.motion;
        require(m.lane_count > 0, "motion.lane_count", "at least one lane is required")?;
        require(m.lane_width > 0.0, "motion.lane_width", "must be positive")?;
        require(
            m.corridor_length > 0.0 && m.corridor_length <= MAX_WORLD_EXTENT,
            "motion.corridor_length",
            "must be positive and at most 1000000",
        )?;
        require(
            m.base_speed_min_kmh > 0.0 && m.base_speed_min_kmh <= m.base_speed_max_kmh,
            "motion.base_speed_min_kmh",
            "must be positive and not above base_speed_max_kmh",
        )?;
        require(
            m.base_speed_max_kmh <= MAX_SPEED_KMH,
            "motion.base_speed_max_kmh",
            "must be at most 500",
        )?;
        require(
            m.substep_secs >= MIN_SUBSTEP_SECS,
            "motion.substep_secs",
            "must be at least 0.01",
        )?;
        require(
            m.close_headway < m.near_headway,
            "motion.close_headway",
            "must be below near_headway",
        )?;
        require(
            (0.0..=1.0).contains(&m.lane_change_probability),
            "motion.lane_change_probability",
            "must be within [0, 1]",
        )?;
        require(
            (0.0..=100.0).contains(&m.initial_battery_min),
            "motion.initial_battery_min",
            "must be within [0, 100]",
        )?;
        require(
            m.low_battery_threshold < m.resume_battery_threshold,
            "motion.low_battery_threshold",
            "must be below resume_battery_threshold",
        )?;

        let c = &self.congestion;
        require(c.segment_count > 0, "congestion.segment_count", "must be positive")?;
        require(c.segment_capacity > 0, "congestion.segment_capacity", "must be positive")?;
        require(c.free_flow_speed_kmh > 0.0, "congestion.free_flow_speed_kmh", "must be positive")?;
        require(c.history_capacity > 0, "congestion.history_capacity", "must be positive")?;
        require(c.prediction_window > 0, "congestion.prediction_window", "must be positive")?;

        let s = &self.slots;
        require(
            s.min_capacity >= 1 && s.min_capacity <= s.max_capacity,
            "slots.min_capacity",
            "must be at least 1 and not above max_capacity",
        )?;
        require(
            s.static_share >= 0.0 && s.dynamic_share >= 0.0 && s.static_share + s.dynamic_share <= 1.0,
            "slots.static_share",
            "static and dynamic shares must be non-negative and sum to at most 1",
        )?;
        require(
            (0.0..=1.0).contains(&s.allocation_probability),
            "slots.allocation_probability",
            "must be within [0, 1]",
        )?;
        require(
            (0.0..=1.0).contains(&s.utilization_smoothing),
            "slots.utilization_smoothing",
            "must be within [0, 1]",
        )?;

        let n = &self.network;
        require(n.spacing > 0.0, "network.spacing", "must be positive")?;
        require(
            n.width >= 0.0 && n.height >= 0.0,
            "network.width",
            "world bounds must be non-negative",
        )?;
        let intersections = (n.width / n.spacing + 1.0) * (n.height / n.spacing + 1.0);
        require(
            intersections <= MAX_INTERSECTIONS,
            "network.spacing",
            "grid would exceed one million intersections",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_lanes_fail_fast() {
        let mut config = EngineConfig::default();
        config.motion.lane_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "motion.lane_count",
                ..
            })
        ));
    }

    fn rejected_field(config: &EngineConfig) -> Option<&'static str> {
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn non_finite_and_oversized_values_fail_fast() {
        let mut config = EngineConfig::default();
        config.motion.corridor_length = f64::INFINITY;
        assert_eq!(rejected_field(&config), Some("motion.corridor_length"));

        let mut config = EngineConfig::default();
        config.motion.base_speed_max_kmh = f64::INFINITY;
        assert_eq!(rejected_field(&config), Some("motion.base_speed_max_kmh"));

        let mut config = EngineConfig::default();
        config.motion.base_speed_max_kmh = 10_000.0;
        assert_eq!(rejected_field(&config), Some("motion.base_speed_max_kmh"));

        let mut config = EngineConfig::default();
        config.motion.substep_secs = 1e-9;
        assert_eq!(rejected_field(&config), Some("motion.substep_secs"));

        let mut config = EngineConfig::default();
        config.network.spacing = 0.5;
        assert_eq!(rejected_field(&config), Some("network.spacing"));

        let mut config = EngineConfig::default();
        config.network.width = f64::MAX;
        assert_eq!(rejected_field(&config), Some("network.spacing"));

        let mut config = EngineConfig::default();
        config.slots.hotspot_x = f64::NAN;
        assert_eq!(rejected_field(&config), Some("slots.hotspot_x"));

        let mut config = EngineConfig::default();
        config.fast_forward_step_secs = u64::MAX;
        assert_eq!(rejected_field(&config), Some("fast_forward_step_secs"));
    }

    #[test]
    fn short_custom_pattern_is_rejected() {
        let config = EngineConfig {
            time_pattern: TimePatternKind::Custom(Vec::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn start_hour_builder_sets_hour() {
        let config = EngineConfig::default().with_start_hour(18);
        let clock = SimulationClock::from_epoch_ms(config.start_epoch_ms).expect("clock");
        assert_eq!(clock.hour(), 18);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"seed": 7, "speed": 5, "motion": {"lane_count": 3}}"#)
                .expect("parse");
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.speed, SpeedMultiplier::X5);
        assert_eq!(config.motion.lane_count, 3);
        assert_eq!(config.motion.lane_width, 10.0);
        assert_eq!(config.vehicle_count, 50);
    }
}
