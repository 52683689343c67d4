//! Demand-driven occupancy and dynamic slot allocation.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use super::{SlotId, SlotKind, SlotManager, SlotRequest};
use crate::patterns::TimePatternTable;
use crate::spatial::Point;

/// Placement attempts before a new slot that keeps landing inside the
/// emergency area is skipped.
const PLACEMENT_ATTEMPTS: usize = 8;

/// Hour-of-day demand read from the time-pattern table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemandSignal {
    pub hour: u32,
    /// Relative demand; 1.0 is an ordinary daytime hour.
    pub level: f64,
    pub rush_hour: bool,
}

impl DemandSignal {
    pub fn from_pattern(table: &TimePatternTable, hour: u32) -> Self {
        Self {
            hour,
            level: table.level_at(hour).multiplier,
            rush_hour: table.is_rush_hour(hour),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyChange {
    pub arrivals: u32,
    pub departures: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationReport {
    pub hour: u32,
    pub target: usize,
    pub created: Vec<SlotId>,
    pub retired: Vec<SlotId>,
    /// In-service dynamic slots after the pass.
    pub active_dynamic: usize,
}

impl AllocationReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.retired.is_empty()
    }
}

/// Chance that at least one event of a Poisson process with `rate_per_min`
/// fires within `dt_secs`.
fn event_probability(rate_per_min: f64, dt_secs: f64) -> f64 {
    (1.0 - (-rate_per_min * dt_secs / 60.0).exp()).clamp(0.0, 1.0)
}

/// Priority of an in-service dynamic slot given demand and its utilization.
pub fn dynamic_priority(demand: f64, utilization: f64) -> u8 {
    (demand * 5.0 + utilization / 25.0).round().clamp(1.0, 10.0) as u8
}

impl SlotManager {
    /// Vehicles arrive at and leave in-service slots. Status follows occupancy
    /// and utilization is smoothed towards the instantaneous occupancy.
    pub fn update_occupancy<R: Rng>(
        &mut self,
        demand: f64,
        dt_secs: f64,
        rng: &mut R,
    ) -> OccupancyChange {
        let mut change = OccupancyChange::default();
        if dt_secs <= 0.0 {
            return change;
        }
        let arrive = event_probability(self.config.arrival_rate_per_min * demand.max(0.0), dt_secs);
        let depart = event_probability(self.config.departure_rate_per_min, dt_secs);
        let alpha = 1.0 - (1.0 - self.config.utilization_smoothing).powf(dt_secs);

        for slot in self.slots.values_mut() {
            if slot.status.is_out_of_service() {
                continue;
            }
            if slot.occupied_count < slot.capacity && rng.gen_bool(arrive) {
                slot.occupied_count += 1;
                change.arrivals += 1;
            }
            if slot.occupied_count > 0 && rng.gen_bool(depart) {
                slot.occupied_count -= 1;
                change.departures += 1;
            }
            slot.sync_status();
            let instant = slot.occupancy_percent();
            slot.utilization_rate =
                (slot.utilization_rate + alpha * (instant - slot.utilization_rate)).clamp(0.0, 100.0);
        }
        change
    }

    fn active_dynamic_ids(&self) -> Vec<SlotId> {
        self.slots
            .values()
            .filter(|s| s.kind == SlotKind::Dynamic && !s.status.is_out_of_service())
            .map(|s| s.id)
            .collect()
    }

    fn sample_dynamic_position<R: Rng>(&self, rush_hour: bool, rng: &mut R) -> Option<Point> {
        let (north, south) = self.curb_lines();
        let length = self.corridor.length;
        let area = self.emergency_area();
        (0..PLACEMENT_ATTEMPTS)
            .map(|_| {
                let x = if rush_hour {
                    // Triangular spread around the hotspot.
                    let offset = rng.gen::<f64>() - rng.gen::<f64>();
                    self.config.hotspot_x + offset * self.config.hotspot_spread
                } else {
                    rng.gen_range(0.0..=length)
                };
                let y = if rng.gen_bool(0.5) { north } else { south };
                Point::new(x.clamp(0.0, length), y)
            })
            .find(|p| area.map_or(true, |a| !a.contains(*p)))
    }

    /// Grows or shrinks the in-service dynamic slots towards
    /// `round(base_dynamic_slots × demand)`, capped at `max_dynamic_slots`.
    ///
    /// New slots cluster around the hotspot during rush hours and never land
    /// inside an active emergency area. Only idle slots are retired, lowest
    /// utilization first. Slots disabled by an emergency are never touched.
    pub fn allocate_dynamic_slots<R: Rng>(
        &mut self,
        demand: &DemandSignal,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> AllocationReport {
        let target = ((self.config.base_dynamic_slots as f64 * demand.level.max(0.0)).round()
            as usize)
            .min(self.config.max_dynamic_slots);
        let active = self.active_dynamic_ids();
        let mut report = AllocationReport {
            hour: demand.hour,
            target,
            created: Vec::new(),
            retired: Vec::new(),
            active_dynamic: active.len(),
        };

        if active.len() < target {
            for _ in active.len()..target {
                let Some(position) = self.sample_dynamic_position(demand.rush_hour, rng) else {
                    continue;
                };
                let capacity = rng.gen_range(self.config.min_capacity..=self.config.max_capacity);
                let request = SlotRequest::new(position, SlotKind::Dynamic, capacity)
                    .with_priority(dynamic_priority(demand.level, 0.0));
                match self.create_slot(request, now) {
                    Ok(id) => report.created.push(id),
                    Err(err) => log::warn!("Dynamic slot creation failed: {err}"),
                }
            }
        } else if active.len() > target {
            let mut idle: Vec<(SlotId, f64)> = active
                .iter()
                .filter_map(|id| self.slots.get(id))
                .filter(|s| s.is_idle())
                .map(|s| (s.id, s.utilization_rate))
                .collect();
            idle.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            for (id, _) in idle.into_iter().take(active.len() - target) {
                if self.slots.remove(&id).is_some() {
                    report.retired.push(id);
                }
            }
        }

        for slot in self.slots.values_mut() {
            if slot.kind == SlotKind::Dynamic && !slot.status.is_out_of_service() {
                slot.priority = dynamic_priority(demand.level, slot.utilization_rate);
            }
        }
        report.active_dynamic = self.active_dynamic_ids().len();

        log::debug!(
            "Slot allocation at hour {}: target {}, created {}, retired {}, active {}",
            report.hour,
            report.target,
            report.created.len(),
            report.retired.len(),
            report.active_dynamic
        );
        report
    }
}
