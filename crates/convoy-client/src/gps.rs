//! Replays a JSON-lines file of device fixes as the live position source.
//!
//! Each line is either a fix:
//!
//! ```json
//! {"lat": 26.91, "lng": 75.78, "speed": 12.5, "accuracy": 8.0}
//! ```
//!
//! or a location error: `{"error": "denied" | "timeout" | "<message>"}`.
//! Fixes are timestamped on delivery.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use convoy_core::position::SampleResult;
use convoy_core::{DeviceFeed, PositionSourceError, RawSample};
use convoy_shared::GeoPoint;

#[derive(Debug, Deserialize)]
struct FixLine {
    lat: Option<f64>,
    lng: Option<f64>,
    speed: Option<f64>,
    accuracy: Option<f64>,
    error: Option<String>,
}

/// Parse one line of the feed.  `None` for blank lines.
pub fn parse_fix(line: &str) -> Option<SampleResult> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let fix: FixLine = match serde_json::from_str(line) {
        Ok(fix) => fix,
        Err(e) => {
            return Some(Err(PositionSourceError::Unavailable(format!(
                "bad fix: {e}"
            ))))
        }
    };

    if let Some(error) = fix.error {
        return Some(Err(match error.as_str() {
            "denied" => PositionSourceError::PermissionDenied,
            "timeout" => PositionSourceError::Timeout,
            _ => PositionSourceError::Unavailable(error),
        }));
    }

    let (Some(lat), Some(lng)) = (fix.lat, fix.lng) else {
        return Some(Err(PositionSourceError::Unavailable(
            "fix without coordinates".into(),
        )));
    };
    Some(
        GeoPoint::checked(lat, lng)
            .map(|at| RawSample::device(at, fix.speed, fix.accuracy, Utc::now()))
            .map_err(|e| PositionSourceError::Unavailable(e.to_string())),
    )
}

/// Push every fix in `path` into `feed`, one per `tick`.
pub async fn replay_file(path: PathBuf, feed: DeviceFeed, tick: Duration) {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot open GPS feed");
            feed.push(Err(PositionSourceError::Unavailable(e.to_string())))
                .await;
            return;
        }
    };

    let mut lines = BufReader::new(file).lines();
    let mut interval = tokio::time::interval(tick);
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "GPS feed read failed");
                break;
            }
        };
        let Some(sample) = parse_fix(&line) else {
            continue;
        };
        interval.tick().await;
        if !feed.push(sample).await {
            break;
        }
    }
    tracing::info!(path = %path.display(), "GPS feed exhausted");
}
