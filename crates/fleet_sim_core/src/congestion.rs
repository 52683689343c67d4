//! Segment-level congestion measurement, prediction and alerting.
//!
//! The corridor is partitioned into fixed bounding boxes ("segments"). A full
//! analysis counts the vehicles inside each box, derives an occupancy rate
//! and a speed-degradation factor, and blends them into a 0–100 score. The
//! scan costs O(segments × vehicles), so it is throttled to one run per
//! `recompute_interval_ms` of wall-clock time; in between, callers get the
//! last computed scores.

use std::collections::{BTreeMap, VecDeque};

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::error::CongestionError;
use crate::motion::Corridor;
use crate::scenario::CongestionConfig;
use crate::spatial::{BoundingBox, Point};
use crate::vehicles::Vehicle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CongestionRecord {
    pub segment_id: String,
    /// Wall-clock time of the analysis that produced this record.
    pub recorded_at_ms: u64,
    pub congestion: f64,
    pub vehicle_count: u32,
    pub avg_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadSegment {
    pub id: String,
    pub bounds: BoundingBox,
    pub max_capacity: u32,
    pub current_vehicles: u32,
    pub avg_speed: f64,
    #[serde(skip)]
    pub congestion_history: VecDeque<CongestionRecord>,
}

impl RoadSegment {
    pub fn new(id: impl Into<String>, bounds: BoundingBox, max_capacity: u32) -> Self {
        Self {
            id: id.into(),
            bounds,
            max_capacity,
            current_vehicles: 0,
            avg_speed: 0.0,
            congestion_history: VecDeque::new(),
        }
    }

    pub fn occupancy_rate(&self) -> f64 {
        f64::from(self.current_vehicles) / f64::from(self.max_capacity) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CongestionAlert {
    pub segment_id: String,
    pub severity: AlertSeverity,
    pub congestion: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentDetails {
    pub id: String,
    pub bounds: BoundingBox,
    pub max_capacity: u32,
    pub current_vehicles: u32,
    pub avg_speed: f64,
    pub occupancy_rate: f64,
    pub congestion: f64,
    pub history_len: usize,
}

/// Weighted blend of density and speed loss, capped at 100.
pub fn congestion_score(occupancy_rate: f64, speed_factor: f64, config: &CongestionConfig) -> f64 {
    (occupancy_rate * config.occupancy_weight + speed_factor * config.speed_weight).min(100.0)
}

/// Speed degradation in `[0, 1]`: 0 at free flow, 1 at standstill.
pub fn speed_degradation(avg_speed: f64, free_flow_speed: f64) -> f64 {
    (1.0 - avg_speed / free_flow_speed).max(0.0)
}

pub fn alert_severity(score: f64, config: &CongestionConfig) -> Option<AlertSeverity> {
    if score >= config.critical_threshold {
        Some(AlertSeverity::Critical)
    } else if score >= config.high_threshold {
        Some(AlertSeverity::High)
    } else if score >= config.medium_threshold {
        Some(AlertSeverity::Medium)
    } else if score >= config.low_threshold {
        Some(AlertSeverity::Low)
    } else {
        None
    }
}

/// Static time-of-day scaling used by the prediction.
pub fn time_of_day_factor(hour: u32, config: &CongestionConfig) -> f64 {
    match hour % 24 {
        7..=9 | 17..=19 => config.rush_factor,
        12 | 13 => config.lunch_factor,
        0..=5 => config.late_night_factor,
        _ => 1.0,
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    while queue.len() >= capacity {
        queue.pop_front();
    }
    queue.push_back(item);
}

#[derive(Debug, Clone, Resource)]
pub struct CongestionAnalyzer {
    config: CongestionConfig,
    segments: Vec<RoadSegment>,
    scores: BTreeMap<String, f64>,
    last_analysis_ms: Option<u64>,
    global_history: VecDeque<CongestionRecord>,
}

impl CongestionAnalyzer {
    pub fn new(config: CongestionConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
            scores: BTreeMap::new(),
            last_analysis_ms: None,
            global_history: VecDeque::new(),
        }
    }

    /// Splits the corridor into `segment_count` equal boxes. The outer boxes
    /// reach past the corridor ends so vehicles dwelling exactly at an end
    /// are still counted.
    pub fn for_corridor(config: &CongestionConfig, corridor: &Corridor) -> Self {
        let mut analyzer = Self::new(config.clone());
        let count = config.segment_count;
        let width = corridor.length / count as f64;
        let (north, south) = corridor.outer_edges();
        let margin = config.segment_margin;
        for i in 0..count {
            let min_x = if i == 0 { -margin } else { i as f64 * width };
            let max_x = if i + 1 == count {
                corridor.length + margin
            } else {
                (i + 1) as f64 * width
            };
            let bounds = BoundingBox::new(
                Point::new(min_x, north - margin),
                Point::new(max_x, south + margin),
            );
            analyzer.segments.push(RoadSegment::new(
                segment_id(i),
                bounds,
                config.segment_capacity,
            ));
        }
        analyzer
    }

    pub fn register_segment(&mut self, segment: RoadSegment) -> Result<(), CongestionError> {
        let reject = |reason: &str| CongestionError::InvalidSegment {
            id: segment.id.clone(),
            reason: reason.to_string(),
        };
        if segment.max_capacity == 0 {
            return Err(reject("max capacity must be at least 1"));
        }
        if !segment.bounds.min.is_finite() || !segment.bounds.max.is_finite() {
            return Err(reject("bounds must be finite"));
        }
        if self.segments.iter().any(|s| s.id == segment.id) {
            return Err(reject("id already registered"));
        }
        self.segments.push(segment);
        Ok(())
    }

    pub fn config(&self) -> &CongestionConfig {
        &self.config
    }

    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }

    /// Scores from the most recent completed analysis.
    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    pub fn last_analysis_ms(&self) -> Option<u64> {
        self.last_analysis_ms
    }

    fn segment(&self, id: &str) -> Option<&RoadSegment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Recomputes every segment unless the previous run is younger than the
    /// recompute interval, in which case the cached scores are returned.
    pub fn analyze_congestion<'a>(
        &mut self,
        vehicles: impl IntoIterator<Item = &'a Vehicle>,
        now_ms: u64,
    ) -> Result<&BTreeMap<String, f64>, CongestionError> {
        if let Some(last) = self.last_analysis_ms {
            if now_ms.saturating_sub(last) < self.config.recompute_interval_ms {
                return Ok(&self.scores);
            }
        }

        let mut samples = Vec::new();
        for v in vehicles {
            if !v.position.is_finite() || !v.speed.is_finite() {
                return Err(CongestionError::NonFiniteSample(v.id));
            }
            samples.push((v.position, v.speed));
        }

        let mut scores = BTreeMap::new();
        for segment in &mut self.segments {
            let (count, speed_sum) = samples
                .iter()
                .filter(|(p, _)| segment.bounds.contains(*p))
                .fold((0u32, 0.0), |(n, sum), (_, speed)| (n + 1, sum + speed));
            segment.current_vehicles = count;
            segment.avg_speed = if count > 0 {
                speed_sum / f64::from(count)
            } else {
                0.0
            };

            let occupancy = segment.occupancy_rate();
            // An empty segment has a mean speed of 0 and so full speed loss.
            let speed_factor =
                speed_degradation(segment.avg_speed, self.config.free_flow_speed_kmh);
            let score = congestion_score(occupancy, speed_factor, &self.config);

            let record = CongestionRecord {
                segment_id: segment.id.clone(),
                recorded_at_ms: now_ms,
                congestion: score,
                vehicle_count: count,
                avg_speed: segment.avg_speed,
            };
            push_bounded(
                &mut segment.congestion_history,
                record.clone(),
                self.config.history_capacity,
            );
            push_bounded(
                &mut self.global_history,
                record,
                self.config.global_history_capacity,
            );
            scores.insert(segment.id.clone(), score);
        }

        self.scores = scores;
        self.last_analysis_ms = Some(now_ms);
        Ok(&self.scores)
    }

    /// Score of the segment containing `p`, if any analysis has run.
    pub fn score_at(&self, p: Point) -> Option<f64> {
        self.segments
            .iter()
            .find(|s| s.bounds.contains(p))
            .and_then(|s| self.scores.get(&s.id).copied())
    }

    /// Speed multiplier for a vehicle at `p`: `1 - score / 100 * slowdown`,
    /// or 1 where no score is known yet.
    pub fn speed_factor_at(&self, p: Point, slowdown: f64) -> f64 {
        let score = self.score_at(p).unwrap_or(0.0).clamp(0.0, 100.0);
        (1.0 - score / 100.0 * slowdown).clamp(0.0, 1.0)
    }

    pub fn average_congestion(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.values().sum::<f64>() / self.scores.len() as f64
    }

    /// Trailing mean of the last few records scaled by the time of day.
    /// Segments without enough history get the cold-start default.
    pub fn predict_future_congestion(&self, segment_id: &str, hour: u32) -> f64 {
        let window = self.config.prediction_window;
        let Some(segment) = self.segment(segment_id) else {
            return self.config.cold_start_prediction;
        };
        let history = &segment.congestion_history;
        if history.len() < window {
            return self.config.cold_start_prediction;
        }
        let mean = history
            .iter()
            .skip(history.len() - window)
            .map(|r| r.congestion)
            .sum::<f64>()
            / window as f64;
        (mean * time_of_day_factor(hour, &self.config)).min(100.0)
    }

    /// Alerts for every segment at or above the low threshold, most severe first.
    pub fn check_congestion_alerts(&self) -> Vec<CongestionAlert> {
        let mut alerts: Vec<CongestionAlert> = self
            .scores
            .iter()
            .filter_map(|(id, score)| {
                alert_severity(*score, &self.config).map(|severity| CongestionAlert {
                    segment_id: id.clone(),
                    severity,
                    congestion: *score,
                    message: format!("{id} congestion at {score:.0}% ({severity:?})"),
                })
            })
            .collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.congestion.total_cmp(&a.congestion))
        });
        alerts
    }

    /// Up to `route_limit` least-congested segments under the route threshold.
    pub fn recommend_optimal_route(&self) -> Vec<String> {
        let mut open: Vec<(&String, f64)> = self
            .scores
            .iter()
            .filter(|(_, score)| **score < self.config.route_threshold)
            .map(|(id, score)| (id, *score))
            .collect();
        open.sort_by(|a, b| a.1.total_cmp(&b.1));
        open.into_iter()
            .take(self.config.route_limit)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn get_segment_details(&self, segment_id: &str) -> Option<SegmentDetails> {
        let segment = self.segment(segment_id)?;
        Some(SegmentDetails {
            id: segment.id.clone(),
            bounds: segment.bounds,
            max_capacity: segment.max_capacity,
            current_vehicles: segment.current_vehicles,
            avg_speed: segment.avg_speed,
            occupancy_rate: segment.occupancy_rate(),
            congestion: self.scores.get(segment_id).copied().unwrap_or(0.0),
            history_len: segment.congestion_history.len(),
        })
    }

    /// The newest `limit` records, oldest first. `None` reads the global history.
    pub fn get_history(&self, segment_id: Option<&str>, limit: usize) -> Vec<CongestionRecord> {
        let history = match segment_id {
            Some(id) => match self.segment(id) {
                Some(segment) => &segment.congestion_history,
                None => return Vec::new(),
            },
            None => &self.global_history,
        };
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

pub fn segment_id(index: usize) -> String {
    format!("SEG-{:02}", index + 1)
}
