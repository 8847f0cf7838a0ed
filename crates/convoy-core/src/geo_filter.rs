//! Adaptive publish throttling.
//!
//! Every raw position sample is checked against the last position that was
//! actually written to the store.  Fast samples publish on a short interval
//! or a longer distance, normal samples on a longer interval or a shorter
//! distance, and anything silent for longer than the heartbeat publishes
//! unconditionally so the participant never turns into a ghost while
//! stationary.
//!
//! The filter is two-phase.  [`GeoFilter::evaluate`] only decides;
//! [`GeoFilter::acknowledge`] advances the retained state once the write has
//! been accepted.  A write that fails therefore leaves the filter untouched
//! and the next sample is evaluated against the last position the store
//! really holds.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use convoy_shared::GeoPoint;

use crate::config::Tuning;

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleOrigin {
    /// A live device fix.
    Device,
    /// A point of a replayed route.
    Simulated,
}

/// One position sample, before filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub position: GeoPoint,
    /// Ground speed in m/s, if the source reports one.
    pub speed_mps: Option<f64>,
    /// Horizontal accuracy radius in metres, if the source reports one.
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub origin: SampleOrigin,
}

impl RawSample {
    pub fn device(
        position: GeoPoint,
        speed_mps: Option<f64>,
        accuracy_m: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            position,
            speed_mps,
            accuracy_m,
            timestamp,
            origin: SampleOrigin::Device,
        }
    }

    /// Simulated samples carry no speed or accuracy.
    pub fn simulated(position: GeoPoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            speed_mps: None,
            accuracy_m: None,
            timestamp,
            origin: SampleOrigin::Simulated,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.origin == SampleOrigin::Simulated
    }
}

/// Which rule let a sample through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishReason {
    /// Nothing has been published yet.
    First,
    Heartbeat,
    Interval,
    Distance,
}

/// A positive publish decision, awaiting acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Publish {
    pub position: GeoPoint,
    pub timestamp: DateTime<Utc>,
    pub reason: PublishReason,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LastUpload {
    at: DateTime<Utc>,
    position: GeoPoint,
}

/// Per-participation publish throttle.
#[derive(Debug, Clone)]
pub struct GeoFilter {
    fast_speed_mps: f64,
    fast_interval: Duration,
    fast_distance_km: f64,
    normal_interval: Duration,
    normal_distance_km: f64,
    heartbeat: Duration,
    last: Option<LastUpload>,
}

impl GeoFilter {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            fast_speed_mps: tuning.fast_speed_mps,
            fast_interval: tuning.fast_upload_interval,
            fast_distance_km: tuning.fast_upload_distance_km,
            normal_interval: tuning.normal_upload_interval,
            normal_distance_km: tuning.normal_upload_distance_km,
            heartbeat: tuning.heartbeat,
            last: None,
        }
    }

    /// Decide whether `sample` should be written.  Does not change state.
    pub fn evaluate(&self, sample: &RawSample) -> Option<Publish> {
        let publish = |reason| Publish {
            position: sample.position,
            timestamp: sample.timestamp,
            reason,
        };

        let Some(last) = self.last else {
            return Some(publish(PublishReason::First));
        };

        let elapsed = sample.timestamp - last.at;
        let moved_km = last.position.distance_km(&sample.position);

        // A missing speed counts as normal movement.
        let fast = sample
            .speed_mps
            .is_some_and(|speed| speed > self.fast_speed_mps);
        let (interval, distance_km) = if fast {
            (self.fast_interval, self.fast_distance_km)
        } else {
            (self.normal_interval, self.normal_distance_km)
        };

        if elapsed > self.heartbeat {
            Some(publish(PublishReason::Heartbeat))
        } else if elapsed > interval {
            Some(publish(PublishReason::Interval))
        } else if moved_km > distance_km {
            Some(publish(PublishReason::Distance))
        } else {
            None
        }
    }

    /// Record that `publish` was accepted by the store.
    pub fn acknowledge(&mut self, publish: &Publish) {
        self.last = Some(LastUpload {
            at: publish.timestamp,
            position: publish.position,
        });
    }

    /// When and where the last acknowledged publish happened.
    pub fn last_upload(&self) -> Option<(DateTime<Utc>, GeoPoint)> {
        self.last.map(|l| (l.at, l.position))
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Roughly `km` kilometres north of `origin`.
    fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
        GeoPoint::new(origin.lat + km / 111.195, origin.lng)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn primed(at: GeoPoint) -> GeoFilter {
        let mut filter = GeoFilter::new(&Tuning::default());
        let first = filter
            .evaluate(&RawSample::device(at, None, Some(5.0), t0()))
            .unwrap();
        assert_eq!(first.reason, PublishReason::First);
        filter.acknowledge(&first);
        filter
    }

    #[test]
    fn test_first_sample_always_publishes() {
        let filter = GeoFilter::new(&Tuning::default());
        let sample = RawSample::device(GeoPoint::new(10.0, 10.0), Some(0.0), None, t0());
        assert!(filter.evaluate(&sample).is_some());
    }

    #[test]
    fn test_fast_sample_needs_fifty_metres() {
        let origin = GeoPoint::new(27.0, 75.0);
        let filter = primed(origin);

        let short_hop = RawSample::device(
            north_of(origin, 0.04),
            Some(10.0),
            None,
            t0() + Duration::seconds(2),
        );
        assert!(filter.evaluate(&short_hop).is_none());

        let long_hop = RawSample::device(
            north_of(origin, 0.06),
            Some(10.0),
            None,
            t0() + Duration::seconds(1),
        );
        assert_eq!(
            filter.evaluate(&long_hop).map(|p| p.reason),
            Some(PublishReason::Distance)
        );
    }

    // 40 m at walking speed clears the 30 m normal threshold.
    #[test]
    fn test_normal_sample_needs_thirty_metres() {
        let origin = GeoPoint::new(27.0, 75.0);
        let filter = primed(origin);

        let creeping = RawSample::device(
            north_of(origin, 0.04),
            Some(2.0),
            None,
            t0() + Duration::seconds(2),
        );
        assert_eq!(
            filter.evaluate(&creeping).map(|p| p.reason),
            Some(PublishReason::Distance)
        );

        let tiny = RawSample::device(
            north_of(origin, 0.02),
            Some(2.0),
            None,
            t0() + Duration::seconds(2),
        );
        assert!(filter.evaluate(&tiny).is_none());
    }

    #[test]
    fn test_interval_rules() {
        let origin = GeoPoint::new(27.0, 75.0);
        let filter = primed(origin);

        let fast = RawSample::device(origin, Some(12.0), None, t0() + Duration::seconds(6));
        assert_eq!(
            filter.evaluate(&fast).map(|p| p.reason),
            Some(PublishReason::Interval)
        );

        let slow = RawSample::device(origin, Some(1.0), None, t0() + Duration::seconds(6));
        assert!(filter.evaluate(&slow).is_none());

        let slow_later = RawSample::device(origin, None, None, t0() + Duration::seconds(11));
        assert_eq!(
            filter.evaluate(&slow_later).map(|p| p.reason),
            Some(PublishReason::Interval)
        );
    }

    #[test]
    fn test_stationary_heartbeat() {
        let origin = GeoPoint::new(27.0, 75.0);
        let filter = primed(origin);

        let sample = RawSample::device(origin, Some(0.0), None, t0() + Duration::seconds(61));
        assert_eq!(
            filter.evaluate(&sample).map(|p| p.reason),
            Some(PublishReason::Heartbeat)
        );
    }

    #[test]
    fn test_unacknowledged_publish_is_reconsidered() {
        let origin = GeoPoint::new(27.0, 75.0);
        let filter = primed(origin);
        let moved = RawSample::device(
            north_of(origin, 0.1),
            None,
            None,
            t0() + Duration::seconds(1),
        );

        // Not acknowledged: the write failed, so the same movement is still due.
        assert!(filter.evaluate(&moved).is_some());
        assert!(filter.evaluate(&moved).is_some());
        assert_eq!(filter.last_upload(), Some((t0(), origin)));
    }

    #[test]
    fn test_acknowledged_sample_does_not_publish_twice() {
        let origin = GeoPoint::new(27.0, 75.0);
        let mut filter = primed(origin);
        let moved = RawSample::device(
            north_of(origin, 0.1),
            None,
            None,
            t0() + Duration::seconds(1),
        );

        let decision = filter.evaluate(&moved).unwrap();
        filter.acknowledge(&decision);
        assert!(filter.evaluate(&moved).is_none());
    }

    #[test]
    fn test_reset_forgets_last_upload() {
        let mut filter = primed(GeoPoint::new(0.0, 0.0));
        filter.reset();
        assert!(filter.last_upload().is_none());
    }
}
