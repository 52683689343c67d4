//! Curb-slot registry, dynamic allocation and emergency closures.
//!
//! Slots sit on the two curbs of the corridor. Static and emergency slots are
//! laid out once at initialization; dynamic slots are created and retired at
//! runtime by [`SlotManager::allocate_dynamic_slots`]. Emergency mode
//! disables the dynamic slots inside an area and remembers exactly which ones
//! it touched so deactivation can restore them.

mod allocation;
mod stats;

use std::collections::BTreeMap;
use std::fmt;

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::congestion::segment_id;
use crate::error::{InvariantViolation, SlotError};
use crate::motion::Corridor;
use crate::scenario::SlotConfig;
use crate::spatial::{EmergencyArea, Point};

pub use allocation::{dynamic_priority, AllocationReport, DemandSignal, OccupancyChange};
pub use stats::{SlotEfficiency, SlotStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SLOT-{:03}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Occupied,
    Reserved,
    Disabled,
    Maintenance,
}

impl SlotStatus {
    /// Disabled and maintenance slots are out of service and keep their
    /// occupancy frozen.
    pub fn is_out_of_service(self) -> bool {
        matches!(self, SlotStatus::Disabled | SlotStatus::Maintenance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    Dynamic,
    Static,
    Emergency,
}

/// Side of the road the slot faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotDirection {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSlot {
    pub id: SlotId,
    pub position: Point,
    pub status: SlotStatus,
    pub kind: SlotKind,
    pub capacity: u32,
    pub occupied_count: u32,
    pub priority: u8,
    /// Congestion segment the slot sits beside.
    pub road_section: String,
    pub direction: SlotDirection,
    /// Smoothed occupancy, percent.
    pub utilization_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl ParkingSlot {
    fn validate(&self) -> Result<(), SlotError> {
        if self.capacity == 0 {
            return Err(SlotError::InvalidCapacity {
                id: self.id,
                capacity: self.capacity,
            });
        }
        if self.occupied_count > self.capacity {
            return Err(SlotError::OverCapacity {
                id: self.id,
                occupied: self.occupied_count,
                capacity: self.capacity,
            });
        }
        if !(1..=10).contains(&self.priority) {
            return Err(SlotError::InvalidPriority {
                id: self.id,
                priority: self.priority,
            });
        }
        if self.check_invariants().is_err() {
            return Err(SlotError::StatusMismatch {
                id: self.id,
                status: self.status,
                occupied: self.occupied_count,
            });
        }
        Ok(())
    }

    /// Re-derives Available/Occupied from the occupancy count. Out-of-service
    /// slots keep their status; a reserved slot keeps it until its last
    /// vehicle leaves.
    pub(crate) fn sync_status(&mut self) {
        match self.status {
            SlotStatus::Available | SlotStatus::Occupied => {
                self.status = if self.occupied_count == 0 {
                    SlotStatus::Available
                } else {
                    SlotStatus::Occupied
                };
            }
            SlotStatus::Reserved if self.occupied_count == 0 => {
                self.status = SlotStatus::Available;
            }
            _ => {}
        }
    }

    /// Empty, available and therefore safe to retire.
    pub fn is_idle(&self) -> bool {
        self.status == SlotStatus::Available && self.occupied_count == 0
    }

    pub fn occupancy_percent(&self) -> f64 {
        f64::from(self.occupied_count) / f64::from(self.capacity) * 100.0
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.occupied_count > self.capacity {
            return Err(InvariantViolation::Occupancy {
                id: self.id,
                occupied: self.occupied_count,
                capacity: self.capacity,
            });
        }
        if !self.status.is_out_of_service()
            && (self.status == SlotStatus::Available) != (self.occupied_count == 0)
        {
            return Err(InvariantViolation::SlotStatus { id: self.id });
        }
        Ok(())
    }
}

/// Parameters for a slot created through the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub position: Point,
    pub kind: SlotKind,
    pub capacity: u32,
    pub priority: u8,
    /// Derived from the curb side when absent.
    pub direction: Option<SlotDirection>,
}

impl SlotRequest {
    pub fn new(position: Point, kind: SlotKind, capacity: u32) -> Self {
        Self {
            position,
            kind,
            capacity,
            priority: 5,
            direction: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_direction(mut self, direction: SlotDirection) -> Self {
        self.direction = Some(direction);
        self
    }
}

#[derive(Debug, Clone)]
struct EmergencyState {
    area: EmergencyArea,
    /// Slots this activation disabled, with the status each had before.
    disabled: BTreeMap<SlotId, SlotStatus>,
}

#[derive(Debug, Clone, Resource)]
pub struct SlotManager {
    config: SlotConfig,
    corridor: Corridor,
    segment_count: usize,
    slots: BTreeMap<SlotId, ParkingSlot>,
    next_id: u32,
    emergency: Option<EmergencyState>,
}

impl SlotManager {
    pub fn new(config: SlotConfig, corridor: Corridor, segment_count: usize) -> Self {
        Self {
            config,
            corridor,
            segment_count: segment_count.max(1),
            slots: BTreeMap::new(),
            next_id: 1,
            emergency: None,
        }
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    pub fn corridor(&self) -> &Corridor {
        &self.corridor
    }

    /// `y` of the north and south curb lines.
    pub fn curb_lines(&self) -> (f64, f64) {
        let (north, south) = self.corridor.outer_edges();
        (north - self.config.curb_offset, south + self.config.curb_offset)
    }

    /// Segment id for the corridor stretch containing `x`.
    pub fn road_section_at(&self, x: f64) -> String {
        let width = self.corridor.length / self.segment_count as f64;
        let index = (x / width).floor().clamp(0.0, (self.segment_count - 1) as f64) as usize;
        segment_id(index)
    }

    fn curb_direction(&self, p: Point) -> SlotDirection {
        if p.y < self.corridor.center_y {
            SlotDirection::North
        } else {
            SlotDirection::South
        }
    }

    /// Inserts a fully specified slot. Fails on an invalid or duplicate slot.
    pub fn register_slot(&mut self, slot: ParkingSlot) -> Result<(), SlotError> {
        slot.validate()?;
        if self.slots.contains_key(&slot.id) {
            return Err(SlotError::DuplicateId(slot.id));
        }
        self.next_id = self.next_id.max(slot.id.0 + 1);
        self.slots.insert(slot.id, slot);
        Ok(())
    }

    /// Creates an empty slot with the next free id.
    pub fn create_slot(
        &mut self,
        request: SlotRequest,
        now: DateTime<Utc>,
    ) -> Result<SlotId, SlotError> {
        let id = SlotId(self.next_id);
        let slot = ParkingSlot {
            id,
            position: request.position,
            status: SlotStatus::Available,
            kind: request.kind,
            capacity: request.capacity,
            occupied_count: 0,
            priority: request.priority,
            road_section: self.road_section_at(request.position.x),
            direction: request
                .direction
                .unwrap_or_else(|| self.curb_direction(request.position)),
            utilization_rate: 0.0,
            created_at: now,
        };
        self.register_slot(slot)?;
        Ok(id)
    }

    pub fn remove_slot(&mut self, id: SlotId) -> Result<ParkingSlot, SlotError> {
        let slot = self.slots.remove(&id).ok_or(SlotError::NotFound(id))?;
        if let Some(state) = self.emergency.as_mut() {
            state.disabled.remove(&id);
        }
        Ok(slot)
    }

    pub fn get_slot(&self, id: SlotId) -> Option<&ParkingSlot> {
        self.slots.get(&id)
    }

    /// All slots in id order.
    pub fn get_all_slots(&self) -> Vec<&ParkingSlot> {
        self.slots.values().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParkingSlot> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next_id = 1;
        self.emergency = None;
    }

    pub fn is_emergency_active(&self) -> bool {
        self.emergency.is_some()
    }

    pub fn emergency_area(&self) -> Option<EmergencyArea> {
        self.emergency.as_ref().map(|state| state.area)
    }

    /// Ids currently held disabled by emergency mode.
    pub fn emergency_disabled(&self) -> Vec<SlotId> {
        self.emergency
            .as_ref()
            .map(|state| state.disabled.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Disables every in-service dynamic slot inside `area` and returns the
    /// disabled ids. While an emergency is active, further activations return
    /// the existing set and change nothing.
    pub fn activate_emergency_mode(&mut self, area: EmergencyArea) -> Vec<SlotId> {
        if self.emergency.is_none() {
            let mut disabled = BTreeMap::new();
            for slot in self.slots.values_mut() {
                if slot.kind == SlotKind::Dynamic
                    && !slot.status.is_out_of_service()
                    && area.contains(slot.position)
                {
                    disabled.insert(slot.id, slot.status);
                    slot.status = SlotStatus::Disabled;
                }
            }
            log::info!(
                "Emergency mode activated: {} dynamic slots disabled",
                disabled.len()
            );
            self.emergency = Some(EmergencyState { area, disabled });
        }
        self.emergency_disabled()
    }

    /// Restores the slots disabled by the active emergency to their previous
    /// status and returns their ids. A no-op without an active emergency.
    pub fn deactivate_emergency_mode(&mut self) -> Vec<SlotId> {
        let Some(state) = self.emergency.take() else {
            return Vec::new();
        };
        let mut restored = Vec::with_capacity(state.disabled.len());
        for (id, previous) in state.disabled {
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.status = previous;
                restored.push(id);
            }
        }
        log::info!("Emergency mode deactivated: {} slots restored", restored.len());
        restored
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.slots.values().try_for_each(ParkingSlot::check_invariants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::MotionConfig;

    pub(super) fn manager() -> SlotManager {
        SlotManager::new(
            SlotConfig::default(),
            Corridor::from_config(&MotionConfig::default()),
            10,
        )
    }

    pub(super) fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(0).expect("epoch")
    }

    fn slot(id: u32, kind: SlotKind) -> ParkingSlot {
        ParkingSlot {
            id: SlotId(id),
            position: Point::new(100.0, 570.0),
            status: SlotStatus::Available,
            kind,
            capacity: 2,
            occupied_count: 0,
            priority: 5,
            road_section: "SEG-01".to_string(),
            direction: SlotDirection::North,
            utilization_rate: 0.0,
            created_at: epoch(),
        }
    }

    #[test]
    fn registration_validates_slots() {
        let mut m = manager();
        let mut bad = slot(1, SlotKind::Static);
        bad.capacity = 0;
        assert!(matches!(
            m.register_slot(bad),
            Err(SlotError::InvalidCapacity { .. })
        ));

        let mut bad = slot(1, SlotKind::Static);
        bad.occupied_count = 3;
        assert!(matches!(
            m.register_slot(bad),
            Err(SlotError::OverCapacity { .. })
        ));

        let mut bad = slot(1, SlotKind::Static);
        bad.priority = 11;
        assert!(matches!(
            m.register_slot(bad),
            Err(SlotError::InvalidPriority { .. })
        ));

        let mut bad = slot(1, SlotKind::Static);
        bad.status = SlotStatus::Reserved;
        assert!(matches!(
            m.register_slot(bad),
            Err(SlotError::StatusMismatch { .. })
        ));

        let mut bad = slot(1, SlotKind::Static);
        bad.occupied_count = 1;
        assert!(matches!(
            m.register_slot(bad),
            Err(SlotError::StatusMismatch { .. })
        ));

        m.register_slot(slot(1, SlotKind::Static)).expect("valid");
        assert_eq!(
            m.register_slot(slot(1, SlotKind::Static)),
            Err(SlotError::DuplicateId(SlotId(1)))
        );
    }

    #[test]
    fn created_slots_get_sequential_ids_and_sections() {
        let mut m = manager();
        m.register_slot(slot(7, SlotKind::Static)).expect("register");
        let id = m
            .create_slot(
                SlotRequest::new(Point::new(1450.0, 630.0), SlotKind::Dynamic, 3),
                epoch(),
            )
            .expect("create");
        assert_eq!(id, SlotId(8));
        assert_eq!(id.to_string(), "SLOT-008");
        let created = m.get_slot(id).expect("slot");
        assert_eq!(created.road_section, "SEG-08");
        assert_eq!(created.direction, SlotDirection::South);
        assert_eq!(created.status, SlotStatus::Available);
    }

    #[test]
    fn removing_unknown_slot_fails() {
        let mut m = manager();
        assert_eq!(m.remove_slot(SlotId(3)), Err(SlotError::NotFound(SlotId(3))));
    }

    #[test]
    fn emergency_round_trip_restores_previous_status() {
        let mut m = manager();
        let mut occupied = slot(1, SlotKind::Dynamic);
        occupied.occupied_count = 1;
        occupied.status = SlotStatus::Occupied;
        m.register_slot(occupied).expect("register");
        m.register_slot(slot(2, SlotKind::Dynamic)).expect("register");
        m.register_slot(slot(3, SlotKind::Static)).expect("register");
        let mut far = slot(4, SlotKind::Dynamic);
        far.position = Point::new(1900.0, 570.0);
        m.register_slot(far).expect("register");

        let area = EmergencyArea::new(Point::new(100.0, 600.0), 0.2);
        let disabled = m.activate_emergency_mode(area);
        assert_eq!(disabled, vec![SlotId(1), SlotId(2)]);
        assert_eq!(m.get_slot(SlotId(3)).map(|s| s.status), Some(SlotStatus::Available));
        assert!(m.check_invariants().is_ok());

        // A second activation is idempotent.
        let again = m.activate_emergency_mode(EmergencyArea::new(Point::new(1900.0, 600.0), 1.0));
        assert_eq!(again, disabled);
        assert_eq!(m.get_slot(SlotId(4)).map(|s| s.status), Some(SlotStatus::Available));

        let restored = m.deactivate_emergency_mode();
        assert_eq!(restored, disabled);
        assert_eq!(m.get_slot(SlotId(1)).map(|s| s.status), Some(SlotStatus::Occupied));
        assert_eq!(m.get_slot(SlotId(2)).map(|s| s.status), Some(SlotStatus::Available));
        assert!(m.deactivate_emergency_mode().is_empty());
    }

    #[test]
    fn maintenance_slots_are_left_alone_by_emergencies() {
        let mut m = manager();
        let mut maintenance = slot(1, SlotKind::Dynamic);
        maintenance.status = SlotStatus::Maintenance;
        m.register_slot(maintenance).expect("register");

        let area = EmergencyArea::new(Point::new(100.0, 600.0), 0.2);
        assert!(m.activate_emergency_mode(area).is_empty());
        assert!(m.deactivate_emergency_mode().is_empty());
        assert_eq!(
            m.get_slot(SlotId(1)).map(|s| s.status),
            Some(SlotStatus::Maintenance)
        );
    }

    #[test]
    fn removed_slots_are_skipped_on_restore() {
        let mut m = manager();
        m.register_slot(slot(1, SlotKind::Dynamic)).expect("register");
        m.register_slot(slot(2, SlotKind::Dynamic)).expect("register");
        m.activate_emergency_mode(EmergencyArea::new(Point::new(100.0, 600.0), 0.2));
        m.remove_slot(SlotId(1)).expect("remove");
        assert_eq!(m.deactivate_emergency_mode(), vec![SlotId(2)]);
    }

    #[test]
    fn invariants_tie_status_to_occupancy() {
        let mut s = slot(1, SlotKind::Static);
        s.occupied_count = 1;
        assert!(s.check_invariants().is_err());
        s.sync_status();
        assert_eq!(s.status, SlotStatus::Occupied);
        assert!(s.check_invariants().is_ok());
        s.status = SlotStatus::Disabled;
        s.occupied_count = 0;
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn drained_reserved_slot_becomes_available() {
        let mut s = slot(1, SlotKind::Static);
        s.status = SlotStatus::Reserved;
        s.occupied_count = 2;
        s.sync_status();
        assert_eq!(s.status, SlotStatus::Reserved);

        s.occupied_count = 0;
        s.sync_status();
        assert_eq!(s.status, SlotStatus::Available);
        assert!(s.check_invariants().is_ok());
    }
}
