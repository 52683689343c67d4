//! Simulated wall clock and the speed multiplier that scales it.
//!
//! The engine is the only writer: it advances the clock once per tick before
//! running the schedule. Systems read it through `Res<SimulationClock>`.

use std::time::Duration;

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClockError, ConfigError};

pub const ONE_SEC_MS: i64 = 1000;
pub const ONE_HOUR_MS: i64 = 60 * 60 * ONE_SEC_MS;

/// Allowed simulation speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SpeedMultiplier {
    #[default]
    X1,
    X2,
    X5,
    X10,
    X30,
}

impl SpeedMultiplier {
    pub const ALL: [SpeedMultiplier; 5] = [
        SpeedMultiplier::X1,
        SpeedMultiplier::X2,
        SpeedMultiplier::X5,
        SpeedMultiplier::X10,
        SpeedMultiplier::X30,
    ];

    pub fn factor(self) -> u32 {
        match self {
            SpeedMultiplier::X1 => 1,
            SpeedMultiplier::X2 => 2,
            SpeedMultiplier::X5 => 5,
            SpeedMultiplier::X10 => 10,
            SpeedMultiplier::X30 => 30,
        }
    }
}

impl TryFrom<u32> for SpeedMultiplier {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        SpeedMultiplier::ALL
            .into_iter()
            .find(|speed| speed.factor() == value)
            .ok_or(ConfigError::UnsupportedSpeed(value))
    }
}

impl From<SpeedMultiplier> for u32 {
    fn from(speed: SpeedMultiplier) -> Self {
        speed.factor()
    }
}

#[derive(Debug, Clone, Resource)]
pub struct SimulationClock {
    current_time: DateTime<Utc>,
    speed: SpeedMultiplier,
    running: bool,
}

impl SimulationClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_time: start,
            speed: SpeedMultiplier::default(),
            running: false,
        }
    }

    /// Builds a clock from a Unix epoch in milliseconds.
    pub fn from_epoch_ms(epoch_ms: i64) -> Result<Self, ConfigError> {
        DateTime::from_timestamp_millis(epoch_ms)
            .map(Self::new)
            .ok_or(ConfigError::InvalidStartTime(epoch_ms))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.current_time
    }

    pub fn hour(&self) -> u32 {
        self.current_time.hour()
    }

    pub fn speed(&self) -> SpeedMultiplier {
        self.speed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_speed(&mut self, speed: SpeedMultiplier) {
        self.speed = speed;
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub(crate) fn advance_ms(&mut self, step_ms: i64) -> Result<(), ClockError> {
        let delta = TimeDelta::try_milliseconds(step_ms).ok_or(ClockError::Overflow)?;
        self.current_time = self
            .current_time
            .checked_add_signed(delta)
            .ok_or(ClockError::Overflow)?;
        Ok(())
    }

    /// Simulated milliseconds covered by `real_elapsed` at the current speed.
    pub fn scaled_step_ms(&self, real_elapsed: Duration, time_compression: f64) -> i64 {
        let real_ms = real_elapsed.as_secs_f64() * 1000.0;
        (real_ms * f64::from(self.speed.factor()) * time_compression).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_at_seven() -> SimulationClock {
        // 2024-03-04 07:00:00 UTC
        SimulationClock::from_epoch_ms(1_709_535_600_000).expect("valid epoch")
    }

    #[test]
    fn advance_moves_current_time_and_hour() {
        let mut clock = clock_at_seven();
        assert_eq!(clock.hour(), 7);
        clock.advance_ms(ONE_HOUR_MS + 30 * 60 * ONE_SEC_MS).expect("advance");
        assert_eq!(clock.hour(), 8);
        assert_eq!(clock.now().minute(), 30);
    }

    #[test]
    fn scaled_step_uses_speed_and_compression() {
        let mut clock = clock_at_seven();
        let interval = Duration::from_millis(100);
        assert_eq!(clock.scaled_step_ms(interval, 10.0), 1_000);
        clock.set_speed(SpeedMultiplier::X30);
        assert_eq!(clock.scaled_step_ms(interval, 10.0), 30_000);
    }

    #[test]
    fn speed_multiplier_accepts_only_listed_values() {
        assert_eq!(SpeedMultiplier::try_from(5), Ok(SpeedMultiplier::X5));
        assert_eq!(
            SpeedMultiplier::try_from(3),
            Err(ConfigError::UnsupportedSpeed(3))
        );
    }

    #[test]
    fn overflow_is_reported() {
        let mut clock = clock_at_seven();
        assert_eq!(clock.advance_ms(i64::MAX), Err(ClockError::Overflow));
    }

    #[test]
    fn invalid_epoch_is_rejected() {
        assert!(SimulationClock::from_epoch_ms(i64::MAX).is_err());
    }
}
