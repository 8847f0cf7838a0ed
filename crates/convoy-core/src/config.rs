//! Tunable heuristics of the synchronisation engine.
//!
//! Every threshold defaults to the value in [`convoy_shared::constants`];
//! embedders may override individual fields.

use std::time::Duration as StdDuration;

use chrono::Duration;

use convoy_shared::constants::*;

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    /// Speed above which a sample is "fast" (m/s).
    pub fast_speed_mps: f64,
    /// Fast samples publish after this much silence...
    pub fast_upload_interval: Duration,
    /// ...or after moving this far (km).
    pub fast_upload_distance_km: f64,
    /// Normal samples publish after this much silence...
    pub normal_upload_interval: Duration,
    /// ...or after moving this far (km).
    pub normal_upload_distance_km: f64,
    /// Unconditional publish after this much silence.
    pub heartbeat: Duration,

    /// Minimum spacing between trail points (km).
    pub trail_min_step_km: f64,
    /// Live fixes must report a better accuracy than this to enter the trail (m).
    pub trail_max_accuracy_m: f64,
    /// Trail gaps longer than this split the rendered trail (km).
    pub trail_gap_km: f64,

    /// Silence after which a participant is shown as a ghost.
    pub ghost_threshold: Duration,
    /// How often the roster view is re-derived so ghost flags age without
    /// waiting for a store change.
    pub roster_refresh: StdDuration,
    /// How often the store is checked for commits from other handles.
    pub store_poll: StdDuration,
    /// Maximum participants per session.
    pub max_participants: usize,

    /// Simulated replay tick.
    pub sim_tick: StdDuration,
    /// Route points the simulation companion trails the host by.
    pub companion_lag_points: usize,
    /// Zoom level of the one-shot "locate me" fly-to.
    pub locate_zoom: u8,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            fast_speed_mps: FAST_SPEED_MPS,
            fast_upload_interval: Duration::seconds(FAST_UPLOAD_INTERVAL_SECS),
            fast_upload_distance_km: FAST_UPLOAD_DISTANCE_KM,
            normal_upload_interval: Duration::seconds(NORMAL_UPLOAD_INTERVAL_SECS),
            normal_upload_distance_km: NORMAL_UPLOAD_DISTANCE_KM,
            heartbeat: Duration::seconds(HEARTBEAT_SECS),
            trail_min_step_km: TRAIL_MIN_STEP_KM,
            trail_max_accuracy_m: TRAIL_MAX_ACCURACY_M,
            trail_gap_km: TRAIL_GAP_KM,
            ghost_threshold: Duration::seconds(GHOST_THRESHOLD_SECS),
            roster_refresh: StdDuration::from_secs(30),
            store_poll: StdDuration::from_millis(STORE_POLL_MS),
            max_participants: MAX_PARTICIPANTS,
            sim_tick: StdDuration::from_millis(SIM_TICK_MS),
            companion_lag_points: COMPANION_LAG_POINTS,
            locate_zoom: LOCATE_ZOOM,
        }
    }
}
