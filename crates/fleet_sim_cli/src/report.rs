//! Text and JSON-lines rendering of engine output.

use fleet_sim_core::engine::EmergencyReport;
use fleet_sim_core::slots::{SlotEfficiency, SlotId};
use fleet_sim_core::telemetry::Snapshot;
use fleet_sim_core::vehicles::VehicleStatus;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(err) => log::warn!("Failed to serialize output: {err}"),
    }
}

fn average_congestion(snapshot: &Snapshot) -> f64 {
    if snapshot.congestion.is_empty() {
        return 0.0;
    }
    snapshot.congestion.values().sum::<f64>() / snapshot.congestion.len() as f64
}

pub fn print_snapshot(mode: OutputMode, snapshot: &Snapshot) {
    match mode {
        OutputMode::Json => print_json(snapshot),
        OutputMode::Text => {
            let moving = snapshot
                .vehicles
                .iter()
                .filter(|v| v.status == VehicleStatus::Moving)
                .count();
            println!(
                "tick {:>5}  {}  moving {:>3}/{:<3}  slots {:>3}/{:<3} free  congestion {:>5.1}",
                snapshot.tick,
                snapshot.current_time.format("%H:%M:%S"),
                moving,
                snapshot.vehicles.len(),
                snapshot.slot_stats.available,
                snapshot.slot_stats.total,
                average_congestion(snapshot),
            );
            for event in &snapshot.events {
                println!("    [{:?}] {:?}: {}", event.severity, event.kind, event.message);
            }
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    tick: u64,
    current_time: String,
    vehicles: usize,
    average_congestion: f64,
    slot_stats: &'a fleet_sim_core::slots::SlotStats,
    congestion: &'a std::collections::BTreeMap<String, f64>,
}

pub fn print_summary(mode: OutputMode, snapshot: &Snapshot) {
    let summary = Summary {
        tick: snapshot.tick,
        current_time: snapshot.current_time.to_rfc3339(),
        vehicles: snapshot.vehicles.len(),
        average_congestion: average_congestion(snapshot),
        slot_stats: &snapshot.slot_stats,
        congestion: &snapshot.congestion,
    };
    match mode {
        OutputMode::Json => print_json(&summary),
        OutputMode::Text => {
            let stats = summary.slot_stats;
            println!("--- {} after {} ticks ---", summary.current_time, summary.tick);
            println!("Vehicles: {}", summary.vehicles);
            println!(
                "Slots: {} total, {} available, {} occupied, {} disabled ({:.1}% occupied)",
                stats.total, stats.available, stats.occupied, stats.disabled, stats.occupancy_rate
            );
            println!("Average congestion: {:.1}", summary.average_congestion);
            for (segment, score) in summary.congestion {
                println!("  {segment}: {score:.1}");
            }
        }
    }
}

pub fn print_emergency(mode: OutputMode, report: &EmergencyReport) {
    match mode {
        OutputMode::Json => print_json(report),
        OutputMode::Text => println!(
            "Emergency active: {} dynamic slots disabled, {} vehicles evacuated",
            report.disabled_slots.len(),
            report.evacuated.len()
        ),
    }
}

#[derive(Serialize)]
struct Restored<'a> {
    restored: &'a [SlotId],
    efficiency: &'a SlotEfficiency,
}

pub fn print_restored(mode: OutputMode, restored: &[SlotId], efficiency: &SlotEfficiency) {
    match mode {
        OutputMode::Json => print_json(&Restored {
            restored,
            efficiency,
        }),
        OutputMode::Text => {
            println!(
                "Slot efficiency during the closure: {:.1}",
                efficiency.efficiency_score
            );
            for line in &efficiency.recommendations {
                println!("  - {line}");
            }
            println!("Emergency lifted: {} slots restored", restored.len());
        }
    }
}
