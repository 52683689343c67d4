//! Error types surfaced by the engine and its registries.

use std::fmt;

use crate::slots::{SlotId, SlotStatus};
use crate::vehicles::VehicleId;

/// Invalid configuration detected when the engine is constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidValue { field: &'static str, reason: String },
    InvalidStartTime(i64),
    UnsupportedSpeed(u32),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for `{field}`: {reason}")
            }
            ConfigError::InvalidStartTime(ms) => {
                write!(f, "start epoch {ms} ms is outside the representable range")
            }
            ConfigError::UnsupportedSpeed(n) => {
                write!(f, "unsupported speed multiplier {n} (expected 1, 2, 5, 10 or 30)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub enum VehicleError {
    DuplicateId(VehicleId),
}

impl fmt::Display for VehicleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleError::DuplicateId(id) => write!(f, "vehicle {id} is already registered"),
        }
    }
}

impl std::error::Error for VehicleError {}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotError {
    DuplicateId(SlotId),
    NotFound(SlotId),
    InvalidCapacity { id: SlotId, capacity: u32 },
    OverCapacity { id: SlotId, occupied: u32, capacity: u32 },
    InvalidPriority { id: SlotId, priority: u8 },
    StatusMismatch { id: SlotId, status: SlotStatus, occupied: u32 },
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotError::DuplicateId(id) => write!(f, "slot {id} is already registered"),
            SlotError::NotFound(id) => write!(f, "slot {id} does not exist"),
            SlotError::InvalidCapacity { id, capacity } => {
                write!(f, "slot {id} has capacity {capacity}; at least 1 is required")
            }
            SlotError::OverCapacity {
                id,
                occupied,
                capacity,
            } => write!(f, "slot {id} holds {occupied} vehicles but capacity is {capacity}"),
            SlotError::InvalidPriority { id, priority } => {
                write!(f, "slot {id} has priority {priority}; expected 1..=10")
            }
            SlotError::StatusMismatch {
                id,
                status,
                occupied,
            } => write!(f, "slot {id} is {status:?} while holding {occupied} vehicles"),
        }
    }
}

impl std::error::Error for SlotError {}

#[derive(Debug, Clone, PartialEq)]
pub enum CongestionError {
    NonFiniteSample(VehicleId),
    InvalidSegment { id: String, reason: String },
}

impl fmt::Display for CongestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionError::NonFiniteSample(id) => {
                write!(f, "vehicle {id} reported a non-finite position or speed")
            }
            CongestionError::InvalidSegment { id, reason } => {
                write!(f, "segment {id} rejected: {reason}")
            }
        }
    }
}

impl std::error::Error for CongestionError {}

/// The simulated clock could not be advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    Overflow,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::Overflow => write!(f, "simulated clock overflowed"),
        }
    }
}

impl std::error::Error for ClockError {}

/// A state invariant that must hold after every tick.
#[derive(Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    Battery { id: VehicleId, battery: f64 },
    Speed { id: VehicleId, speed: f64 },
    Occupancy { id: SlotId, occupied: u32, capacity: u32 },
    SlotStatus { id: SlotId },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::Battery { id, battery } => {
                write!(f, "vehicle {id} battery {battery} outside [0, 100]")
            }
            InvariantViolation::Speed { id, speed } => {
                write!(f, "vehicle {id} speed {speed} is negative or not a number")
            }
            InvariantViolation::Occupancy {
                id,
                occupied,
                capacity,
            } => write!(f, "slot {id} occupancy {occupied} exceeds capacity {capacity}"),
            InvariantViolation::SlotStatus { id } => {
                write!(f, "slot {id} status disagrees with its occupancy")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Config(ConfigError),
    Vehicle(VehicleError),
    Slot(SlotError),
    Clock(ClockError),
    Invariant(InvariantViolation),
    InvalidFastForward(f64),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(err) => write!(f, "configuration error: {err}"),
            EngineError::Vehicle(err) => write!(f, "vehicle registry error: {err}"),
            EngineError::Slot(err) => write!(f, "slot registry error: {err}"),
            EngineError::Clock(err) => write!(f, "clock error: {err}"),
            EngineError::Invariant(err) => write!(f, "invariant violated: {err}"),
            EngineError::InvalidFastForward(hours) => {
                write!(f, "cannot fast-forward by {hours} hours")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Config(err) => Some(err),
            EngineError::Vehicle(err) => Some(err),
            EngineError::Slot(err) => Some(err),
            EngineError::Clock(err) => Some(err),
            EngineError::Invariant(err) => Some(err),
            EngineError::InvalidFastForward(_) => None,
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}

impl From<VehicleError> for EngineError {
    fn from(err: VehicleError) -> Self {
        EngineError::Vehicle(err)
    }
}

impl From<SlotError> for EngineError {
    fn from(err: SlotError) -> Self {
        EngineError::Slot(err)
    }
}

impl From<ClockError> for EngineError {
    fn from(err: ClockError) -> Self {
        EngineError::Clock(err)
    }
}

impl From<InvariantViolation> for EngineError {
    fn from(err: InvariantViolation) -> Self {
        EngineError::Invariant(err)
    }
}
