use serde::Serialize;

use super::{SlotId, SlotKind, SlotManager, SlotStatus};

/// Aggregate counts over the slot registry.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SlotStats {
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub reserved: usize,
    pub disabled: usize,
    pub maintenance: usize,
    pub dynamic: usize,
    pub static_slots: usize,
    pub emergency: usize,
    pub total_capacity: u64,
    pub occupied_units: u64,
    /// Occupied units over total capacity, percent.
    pub occupancy_rate: f64,
    pub average_utilization: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SlotEfficiency {
    pub underutilized: Vec<SlotId>,
    pub overutilized: Vec<SlotId>,
    /// Share of in-service slots inside the healthy utilization band, 0–100.
    pub efficiency_score: f64,
    pub recommendations: Vec<String>,
}

impl SlotManager {
    pub fn generate_slot_stats(&self) -> SlotStats {
        let mut stats = SlotStats::default();
        let mut utilization_sum = 0.0;
        for slot in self.slots.values() {
            stats.total += 1;
            match slot.status {
                SlotStatus::Available => stats.available += 1,
                SlotStatus::Occupied => stats.occupied += 1,
                SlotStatus::Reserved => stats.reserved += 1,
                SlotStatus::Disabled => stats.disabled += 1,
                SlotStatus::Maintenance => stats.maintenance += 1,
            }
            match slot.kind {
                SlotKind::Dynamic => stats.dynamic += 1,
                SlotKind::Static => stats.static_slots += 1,
                SlotKind::Emergency => stats.emergency += 1,
            }
            stats.total_capacity += u64::from(slot.capacity);
            stats.occupied_units += u64::from(slot.occupied_count);
            utilization_sum += slot.utilization_rate;
        }
        if stats.total_capacity > 0 {
            stats.occupancy_rate =
                stats.occupied_units as f64 / stats.total_capacity as f64 * 100.0;
        }
        if stats.total > 0 {
            stats.average_utilization = utilization_sum / stats.total as f64;
        }
        stats
    }

    /// Flags in-service slots outside the healthy utilization band.
    pub fn analyze_slot_efficiency(&self) -> SlotEfficiency {
        let under = self.config.underutilized_threshold;
        let over = self.config.overutilized_threshold;
        let mut report = SlotEfficiency::default();
        let mut in_service = 0usize;

        for slot in self.slots.values().filter(|s| !s.status.is_out_of_service()) {
            in_service += 1;
            if slot.utilization_rate < under {
                report.underutilized.push(slot.id);
            } else if slot.utilization_rate >= over {
                report.overutilized.push(slot.id);
            }
        }

        if in_service == 0 {
            report
                .recommendations
                .push("No slots in service; create slots or end the emergency".to_string());
            return report;
        }

        let flagged = report.underutilized.len() + report.overutilized.len();
        report.efficiency_score = (in_service - flagged) as f64 / in_service as f64 * 100.0;

        if report.underutilized.len() * 5 > in_service {
            report.recommendations.push(format!(
                "{} slots are below {under:.0}% utilization; retire or relocate them",
                report.underutilized.len()
            ));
        }
        if !report.overutilized.is_empty() {
            report.recommendations.push(format!(
                "{} slots are at or above {over:.0}% utilization; add capacity nearby",
                report.overutilized.len()
            ));
        }
        let held = self.emergency_disabled().len();
        if held > 0 {
            report
                .recommendations
                .push(format!("{held} dynamic slots are held by emergency mode"));
        }
        if report.recommendations.is_empty() {
            report
                .recommendations
                .push("Slot allocation is balanced".to_string());
        }
        report
    }
}
