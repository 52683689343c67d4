//! Fast-forward a fleet through the morning peak and print slot and
//! congestion figures every simulated half hour.
//!
//! Run with: cargo run -p fleet_sim_core --example rush_hour

use fleet_sim_core::engine::{FastForwardOutcome, SimulationEngine};
use fleet_sim_core::scenario::EngineConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    const NUM_VEHICLES: usize = 150;
    const NUM_SLOTS: usize = 200;
    const HALF_HOURS: usize = 8;

    let mut engine = SimulationEngine::new(
        EngineConfig::default()
            .with_seed(123)
            .with_start_hour(6)
            .with_vehicle_count(NUM_VEHICLES)
            .with_slot_count(NUM_SLOTS),
    )
    .expect("default config with overrides should be valid");

    println!(
        "--- Rush hour ({} vehicles, {} slots, seed 123) ---",
        NUM_VEHICLES, NUM_SLOTS
    );
    for _ in 0..HALF_HOURS {
        let outcome = engine
            .fast_forward(0.5, |_, _| {})
            .await
            .expect("half an hour is a valid fast-forward");
        if let FastForwardOutcome::Halted { error, .. } = outcome {
            eprintln!("Simulation halted: {error}");
            return;
        }

        let snapshot = engine.snapshot();
        let stats = &snapshot.slot_stats;
        let busiest = snapshot
            .congestion
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(id, score)| format!("{id} at {score:.0}"))
            .unwrap_or_default();
        println!(
            "{}  dynamic slots {:>3}  occupancy {:>5.1}%  busiest {}",
            snapshot.current_time.format("%H:%M"),
            stats.dynamic,
            stats.occupancy_rate,
            busiest
        );
    }

    let efficiency = engine.slots().analyze_slot_efficiency();
    println!("\nEfficiency score: {:.1}", efficiency.efficiency_score);
    for line in efficiency.recommendations {
        println!("  - {line}");
    }
}
