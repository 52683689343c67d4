//! Hour-of-day congestion patterns.
//!
//! Each hour maps to a [`CongestionLevel`] carrying a vehicle-count multiplier
//! and a speed factor. The standard table is hand-tuned around the morning
//! rush, lunch, evening rush and the quiet night hours.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionLevel {
    pub level: Level,
    /// Scales the number of vehicles (and slot demand) relative to base.
    pub multiplier: f64,
    /// Scales free-flow speed; 1.0 = unimpeded.
    pub speed_factor: f64,
    pub label: String,
}

impl CongestionLevel {
    fn new(level: Level, multiplier: f64, speed_factor: f64, label: &str) -> Self {
        Self {
            level,
            multiplier,
            speed_factor,
            label: label.to_string(),
        }
    }
}

/// Pre-defined pattern tables.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub enum TimePatternKind {
    #[default]
    Standard,
    /// Custom per-hour descriptors (index 0 = midnight, index 23 = 11 PM).
    Custom(Vec<CongestionLevel>),
}

#[derive(Debug, Clone, Resource)]
pub struct TimePatternTable {
    hours: [CongestionLevel; 24],
}

impl TimePatternTable {
    pub fn standard() -> Self {
        use Level::*;
        let late_night = CongestionLevel::new(Low, 0.3, 1.0, "Late night");
        let daytime = CongestionLevel::new(Medium, 1.0, 0.85, "Daytime");
        let lunch = CongestionLevel::new(High, 1.2, 0.75, "Lunch");
        let afternoon = CongestionLevel::new(Medium, 1.0, 0.85, "Afternoon");
        let evening = CongestionLevel::new(Medium, 0.9, 0.9, "Evening");
        let night = CongestionLevel::new(Low, 0.6, 1.0, "Night");
        Self {
            hours: [
                late_night.clone(),
                late_night.clone(),
                late_night.clone(),
                late_night.clone(),
                late_night.clone(),
                late_night,
                CongestionLevel::new(Medium, 0.8, 0.9, "Early morning"),
                CongestionLevel::new(High, 1.3, 0.7, "Morning rush"),
                CongestionLevel::new(Extreme, 1.5, 0.5, "Morning peak"),
                CongestionLevel::new(High, 1.2, 0.7, "Morning rush"),
                daytime.clone(),
                daytime,
                lunch.clone(),
                lunch,
                afternoon.clone(),
                afternoon.clone(),
                afternoon,
                CongestionLevel::new(High, 1.3, 0.65, "Evening rush"),
                CongestionLevel::new(Extreme, 1.5, 0.5, "Evening peak"),
                CongestionLevel::new(High, 1.2, 0.7, "Evening rush"),
                evening.clone(),
                evening,
                night.clone(),
                night,
            ],
        }
    }

    /// Builds from a [`TimePatternKind`]. A custom table must have exactly
    /// 24 entries; anything else falls back to `None`.
    pub fn from_kind(kind: &TimePatternKind) -> Option<Self> {
        match kind {
            TimePatternKind::Standard => Some(Self::standard()),
            TimePatternKind::Custom(levels) => {
                let hours: [CongestionLevel; 24] = levels.clone().try_into().ok()?;
                Some(Self { hours })
            }
        }
    }

    pub fn level_at(&self, hour: u32) -> &CongestionLevel {
        &self.hours[(hour % 24) as usize]
    }

    pub fn calculate_vehicle_count(&self, base: u32, hour: u32) -> u32 {
        (f64::from(base) * self.level_at(hour).multiplier).round() as u32
    }

    pub fn adjust_speed_for_congestion(&self, base_kmh: f64, hour: u32) -> f64 {
        base_kmh * self.level_at(hour).speed_factor
    }

    pub fn is_rush_hour(&self, hour: u32) -> bool {
        matches!(self.level_at(hour).level, Level::High | Level::Extreme)
    }

    pub fn hours(&self) -> &[CongestionLevel; 24] {
        &self.hours
    }
}

impl Default for TimePatternTable {
    fn default() -> Self {
        Self::standard()
    }
}
