//! Discrete events surfaced to the dashboard alongside each snapshot.

use std::collections::VecDeque;

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, Utc};
use serde::Serialize;

const RECENT_EVENTS_CAPACITY: usize = 200;
/// Undelivered events kept when nobody drains the log; oldest dropped first.
const PENDING_EVENTS_CAPACITY: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    CongestionAlert,
    SlotReallocation,
    EmergencyActivated,
    EmergencyDeactivated,
    Evacuation,
    BatteryDepleted,
    SubsystemFault,
    FastForwardCompleted,
    FastForwardCancelled,
    SystemAlert,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimEvent {
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub kind: EventKind,
    pub message: String,
}

/// Events emitted since the last snapshot, plus a bounded tail of recent ones.
#[derive(Debug, Default, Resource)]
pub struct EventLog {
    pending: VecDeque<SimEvent>,
    recent: VecDeque<SimEvent>,
}

impl EventLog {
    pub fn push(
        &mut self,
        time: DateTime<Utc>,
        severity: Severity,
        kind: EventKind,
        message: impl Into<String>,
    ) {
        let event = SimEvent {
            time,
            severity,
            kind,
            message: message.into(),
        };
        if self.recent.len() == RECENT_EVENTS_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(event.clone());
        if self.pending.len() == PENDING_EVENTS_CAPACITY {
            self.pending.pop_front();
        }
        self.pending.push_back(event);
    }

    /// Takes the events emitted since the previous call.
    pub fn drain_pending(&mut self) -> Vec<SimEvent> {
        self.pending.drain(..).collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &SimEvent> {
        self.pending.iter()
    }

    pub fn recent(&self) -> impl Iterator<Item = &SimEvent> {
        self.recent.iter()
    }

    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.recent.iter().filter(|e| e.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_pending_but_keeps_recent() {
        let mut log = EventLog::default();
        let t = DateTime::from_timestamp_millis(0).expect("epoch");
        log.push(t, Severity::Info, EventKind::SlotReallocation, "one");
        log.push(t, Severity::Warning, EventKind::CongestionAlert, "two");

        assert_eq!(log.drain_pending().len(), 2);
        assert!(log.drain_pending().is_empty());
        assert_eq!(log.recent().count(), 2);
    }

    #[test]
    fn recent_is_bounded() {
        let mut log = EventLog::default();
        let t = DateTime::from_timestamp_millis(0).expect("epoch");
        for i in 0..(RECENT_EVENTS_CAPACITY + 5) {
            log.push(t, Severity::Info, EventKind::SlotReallocation, format!("{i}"));
        }
        assert_eq!(log.recent().count(), RECENT_EVENTS_CAPACITY);
        assert_eq!(log.recent().next().map(|e| e.message.as_str()), Some("5"));
    }
}
