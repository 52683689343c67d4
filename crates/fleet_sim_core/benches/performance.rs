//! Performance benchmarks for fleet_sim_core using Criterion.rs.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fleet_sim_core::congestion::CongestionAnalyzer;
use fleet_sim_core::engine::SimulationEngine;
use fleet_sim_core::patterns::TimePatternTable;
use fleet_sim_core::scenario::EngineConfig;
use fleet_sim_core::slots::{DemandSignal, SlotManager};
use fleet_sim_core::vehicles::VehicleManager;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn engine(vehicles: usize, slots: usize) -> SimulationEngine {
    SimulationEngine::new(
        EngineConfig::default()
            .with_seed(42)
            .with_start_hour(8)
            .with_vehicle_count(vehicles)
            .with_slot_count(slots),
    )
    .expect("engine")
}

fn bench_engine_tick(c: &mut Criterion) {
    let scenarios = vec![("small", 50, 120), ("medium", 200, 400), ("large", 1_000, 1_000)];

    let mut group = c.benchmark_group("engine_tick");
    for (name, vehicles, slots) in scenarios {
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(vehicles, slots),
            |b, &(vehicles, slots)| {
                let mut engine = engine(vehicles, slots);
                engine.start(|snapshot| {
                    black_box(snapshot.tick);
                });
                b.iter(|| black_box(engine.tick(Duration::from_millis(100))));
            },
        );
    }
    group.finish();
}

fn bench_congestion_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("congestion_analysis");
    for vehicles in [50usize, 500, 2_000] {
        let engine = engine(vehicles, 120);
        let fleet = engine.world().resource::<VehicleManager>().clone();
        let analyzer = engine.world().resource::<CongestionAnalyzer>().clone();
        group.bench_with_input(BenchmarkId::from_parameter(vehicles), &fleet, |b, fleet| {
            let mut analyzer = analyzer.clone();
            let mut now_ms = 0u64;
            b.iter(|| {
                // Step past the recompute interval so every call does the full pass.
                now_ms += analyzer.config().recompute_interval_ms;
                black_box(analyzer.analyze_congestion(fleet.iter(), now_ms).map(|s| s.len()))
            });
        });
    }
    group.finish();
}

fn bench_slot_allocation(c: &mut Criterion) {
    let table = TimePatternTable::standard();
    let engine = engine(50, 1_000);
    let base = engine.world().resource::<SlotManager>().clone();
    let now = engine.current_time();

    let mut group = c.benchmark_group("slot_allocation");
    for hour in [3u32, 8, 17] {
        let demand = DemandSignal::from_pattern(&table, hour);
        group.bench_with_input(BenchmarkId::new("hour", hour), &demand, |b, demand| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let mut slots = base.clone();
                black_box(slots.allocate_dynamic_slots(demand, &mut rng, now))
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_engine_tick,
    bench_congestion_analysis,
    bench_slot_allocation
);
criterion_main!(benches);
