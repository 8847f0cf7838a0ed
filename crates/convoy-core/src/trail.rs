//! The leader's travel trail.
//!
//! Two halves: the write-side gate deciding which accepted samples extend
//! the stored trail, and the read-side splitter turning a stored trail into
//! the contiguous segments a map draws.

use convoy_shared::GeoPoint;

use crate::config::Tuning;
use crate::geo_filter::RawSample;

/// A run of trail points drawn as one polyline.  Always at least two points.
pub type TrailSegment = Vec<GeoPoint>;

/// Split `trail` wherever consecutive points are more than `gap_km` apart.
///
/// Such a jump means the leader dropped out of coverage, and connecting the
/// two ends would draw a line through places nobody drove.  Segments shorter
/// than two points cannot be drawn and are omitted.
pub fn build_segments(trail: &[GeoPoint], gap_km: f64) -> Vec<TrailSegment> {
    let mut segments = Vec::new();
    let mut current: TrailSegment = Vec::new();

    for point in trail {
        if let Some(prev) = current.last() {
            if prev.distance_km(point) > gap_km {
                let done = std::mem::take(&mut current);
                if done.len() >= 2 {
                    segments.push(done);
                }
            }
        }
        current.push(*point);
    }
    if current.len() >= 2 {
        segments.push(current);
    }
    segments
}

/// Decides which samples extend the leader's trail.
#[derive(Debug, Clone)]
pub struct TrailBuilder {
    min_step_km: f64,
    max_accuracy_m: f64,
    gap_km: f64,
    last_point: Option<GeoPoint>,
}

impl TrailBuilder {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            min_step_km: tuning.trail_min_step_km,
            max_accuracy_m: tuning.trail_max_accuracy_m,
            gap_km: tuning.trail_gap_km,
            last_point: None,
        }
    }

    /// The trail point to append alongside an accepted `sample`, if any.
    ///
    /// Only the leader records a trail.  A point must be further than the
    /// minimum step from the last recorded one.  Live fixes must also
    /// report an accuracy better than the limit; a fix with no accuracy
    /// fails that test.  Simulated samples skip the accuracy check.
    pub fn admit(&self, sample: &RawSample, is_leader: bool) -> Option<GeoPoint> {
        if !is_leader {
            return None;
        }

        let far_enough = self
            .last_point
            .map_or(true, |last| last.distance_km(&sample.position) > self.min_step_km);
        if !far_enough {
            return None;
        }

        let accurate = sample.is_simulated()
            || sample
                .accuracy_m
                .is_some_and(|accuracy| accuracy < self.max_accuracy_m);
        accurate.then_some(sample.position)
    }

    /// Record that `point` was appended to the stored trail.
    pub fn acknowledge(&mut self, point: GeoPoint) {
        self.last_point = Some(point);
    }

    /// Forget the last recorded point, e.g. after the trail was cleared.
    pub fn reset(&mut self) {
        self.last_point = None;
    }

    pub fn last_point(&self) -> Option<GeoPoint> {
        self.last_point
    }

    pub fn segments(&self, trail: &[GeoPoint]) -> Vec<TrailSegment> {
        build_segments(trail, self.gap_km)
    }
}
