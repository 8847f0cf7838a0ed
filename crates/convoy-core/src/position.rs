//! Position sources.
//!
//! A session is driven by exactly one source, chosen at join time: a live
//! device stream or a replayed route.  Both yield [`RawSample`]s through
//! [`PositionSource::next_sample`] and everything downstream is agnostic of
//! which one is active.

use std::future::Future;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};

use convoy_shared::GeoPoint;

use crate::error::PositionSourceError;
use crate::geo_filter::RawSample;

pub type SampleResult = std::result::Result<RawSample, PositionSourceError>;

pub trait PositionSource {
    /// The next sample, or `None` once the source is exhausted.
    fn next_sample(&mut self) -> impl Future<Output = Option<SampleResult>> + Send;
}

// ---------------------------------------------------------------------------
// Device stream
// ---------------------------------------------------------------------------

/// Samples pushed by a platform location adapter.
#[derive(Debug)]
pub struct DeviceStream {
    rx: mpsc::Receiver<SampleResult>,
}

/// The adapter's end of a [`DeviceStream`].
#[derive(Debug, Clone)]
pub struct DeviceFeed {
    tx: mpsc::Sender<SampleResult>,
}

impl DeviceStream {
    pub fn channel(capacity: usize) -> (DeviceFeed, DeviceStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (DeviceFeed { tx }, DeviceStream { rx })
    }
}

impl DeviceFeed {
    /// Push a fix.  Returns `false` once the stream has been dropped.
    pub async fn push(&self, sample: SampleResult) -> bool {
        self.tx.send(sample).await.is_ok()
    }
}

impl PositionSource for DeviceStream {
    async fn next_sample(&mut self) -> Option<SampleResult> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Route replay
// ---------------------------------------------------------------------------

/// Replays a precomputed route one point per tick.
///
/// The first point is the starting position used when joining; the replay
/// yields the remaining points and stops at the end of the route.
#[derive(Debug)]
pub struct RouteReplay {
    route: Vec<GeoPoint>,
    /// Index of the last point handed out.
    index: usize,
    ticker: Interval,
}

impl RouteReplay {
    /// `None` for an empty route.
    pub fn new(route: Vec<GeoPoint>, tick: Duration) -> Option<Self> {
        if route.is_empty() {
            return None;
        }
        let mut ticker = time::interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(Self {
            route,
            index: 0,
            ticker,
        })
    }

    pub fn start(&self) -> GeoPoint {
        self.route[0]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn route(&self) -> &[GeoPoint] {
        &self.route
    }

    pub fn is_finished(&self) -> bool {
        self.index + 1 >= self.route.len()
    }
}

impl PositionSource for RouteReplay {
    async fn next_sample(&mut self) -> Option<SampleResult> {
        if self.is_finished() {
            return None;
        }
        self.ticker.tick().await;
        self.index += 1;
        Some(Ok(RawSample::simulated(self.route[self.index], Utc::now())))
    }
}

// ---------------------------------------------------------------------------
// Active source
// ---------------------------------------------------------------------------

/// The source driving the current session.
#[derive(Debug)]
pub enum ActiveSource {
    Device(DeviceStream),
    Replay(RouteReplay),
    /// No automatic source: simulation setup failed, or the source ended.
    Idle,
}

impl ActiveSource {
    pub fn is_idle(&self) -> bool {
        matches!(self, ActiveSource::Idle)
    }

    pub fn replay(&self) -> Option<&RouteReplay> {
        match self {
            ActiveSource::Replay(r) => Some(r),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ActiveSource::Device(_) => "device",
            ActiveSource::Replay(_) => "simulation",
            ActiveSource::Idle => "idle",
        }
    }
}

impl PositionSource for ActiveSource {
    async fn next_sample(&mut self) -> Option<SampleResult> {
        match self {
            ActiveSource::Device(d) => d.next_sample().await,
            ActiveSource::Replay(r) => r.next_sample().await,
            ActiveSource::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_filter::SampleOrigin;

    #[tokio::test]
    async fn test_device_stream_forwards_fixes() {
        let (feed, mut stream) = DeviceStream::channel(4);
        let fix = RawSample::device(GeoPoint::new(1.0, 2.0), Some(3.0), Some(4.0), Utc::now());

        assert!(feed.push(Ok(fix)).await);
        assert!(feed.push(Err(PositionSourceError::PermissionDenied)).await);
        drop(feed);

        assert_eq!(stream.next_sample().await, Some(Ok(fix)));
        assert_eq!(
            stream.next_sample().await,
            Some(Err(PositionSourceError::PermissionDenied))
        );
        assert_eq!(stream.next_sample().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_ticks_and_stops() {
        let route = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.1),
            GeoPoint::new(0.0, 0.2),
        ];
        let mut replay = RouteReplay::new(route.clone(), Duration::from_secs(1)).unwrap();
        assert_eq!(replay.start(), route[0]);

        let started = Instant::now();
        let first = replay.next_sample().await.unwrap().unwrap();
        assert_eq!(first.position, route[1]);
        assert_eq!(first.origin, SampleOrigin::Simulated);
        assert!(started.elapsed() >= Duration::from_secs(1));

        let second = replay.next_sample().await.unwrap().unwrap();
        assert_eq!(second.position, route[2]);
        assert!(replay.is_finished());
        assert_eq!(replay.next_sample().await, None);
        assert_eq!(replay.index(), 2);
    }

    #[test]
    fn test_empty_route_has_no_replay() {
        assert!(RouteReplay::new(Vec::new(), Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn test_idle_source_is_exhausted() {
        let mut source = ActiveSource::Idle;
        assert!(source.is_idle());
        assert_eq!(source.next_sample().await, None);
    }
}
