mod support;

use fleet_sim_core::congestion::{congestion_score, segment_id};
use fleet_sim_core::scenario::CongestionConfig;
use support::engine::TestEngineBuilder;

#[test]
fn score_blends_occupancy_and_speed_loss() {
    let config = CongestionConfig::default();
    assert!((congestion_score(80.0, 0.5, &config) - 71.0).abs() < 1e-9);
    assert_eq!(congestion_score(100.0, 1.0, &config), 100.0);
}

#[tokio::test]
async fn scores_cover_every_segment_within_bounds() {
    let mut engine = TestEngineBuilder::new().with_vehicles(120).build();
    engine
        .fast_forward(1.0, |_, _| {})
        .await
        .expect("fast-forward");

    let analyzer = engine.congestion();
    assert_eq!(analyzer.scores().len(), 10);
    for (id, score) in analyzer.scores() {
        assert!((0.0..=100.0).contains(score), "{id} scored {score}");
    }
    assert_eq!(engine.snapshot().congestion, *analyzer.scores());
}

#[tokio::test]
async fn analysis_is_rate_limited_by_wall_time() {
    let mut engine = TestEngineBuilder::new().build();
    // 60 fast-forward ticks at a nominal 100 ms each span 6 s of wall time,
    // enough for two analyses with a 5 s interval.
    engine
        .fast_forward(1.0, |_, _| {})
        .await
        .expect("fast-forward");

    let details = engine
        .congestion()
        .get_segment_details(&segment_id(0))
        .expect("first segment");
    assert_eq!(details.history_len, 2);
    assert_eq!(engine.congestion().last_analysis_ms(), Some(5_100));
}

#[tokio::test]
async fn history_queries_respect_limits() {
    let mut engine = TestEngineBuilder::new().build();
    engine
        .fast_forward(3.0, |_, _| {})
        .await
        .expect("fast-forward");

    let analyzer = engine.congestion();
    let first = segment_id(0);
    let history = analyzer.get_history(Some(&first), 2);
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.segment_id == first));
    assert!(history[0].recorded_at_ms <= history[1].recorded_at_ms);

    assert_eq!(analyzer.get_history(None, 7).len(), 7);
    assert!(analyzer.get_history(Some("SEG-99"), 5).is_empty());
    assert!(analyzer.get_segment_details("SEG-99").is_none());
}

#[tokio::test]
async fn alerts_and_routes_are_consistent_with_scores() {
    let mut engine = TestEngineBuilder::new()
        .with_vehicles(200)
        .with_start_hour(8)
        .build();
    engine
        .fast_forward(0.5, |_, _| {})
        .await
        .expect("fast-forward");

    let analyzer = engine.congestion();
    let config = analyzer.config().clone();
    let alerts = analyzer.check_congestion_alerts();
    assert!(alerts
        .windows(2)
        .all(|w| w[0].severity >= w[1].severity));
    for alert in &alerts {
        assert!(alert.congestion >= config.low_threshold);
    }

    let route = analyzer.recommend_optimal_route();
    assert!(route.len() <= config.route_limit);
    for id in &route {
        let score = analyzer.scores()[id];
        assert!(score < config.route_threshold);
    }

    let prediction = analyzer.predict_future_congestion(&segment_id(0), 8);
    assert!((0.0..=100.0).contains(&prediction));
}
