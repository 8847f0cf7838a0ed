//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero
//! configuration: it hosts a new session from the equator using the
//! platform data directory.

use std::path::PathBuf;

use convoy_shared::constants::SIM_TICK_MS;
use convoy_shared::{Color, GeoPoint};
use convoy_store::Database;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite database shared by every client of this machine.
    /// Env: `CONVOY_DB_PATH`
    /// Default: `<platform data dir>/convoy.db`
    pub db_path: Option<PathBuf>,

    /// Directory holding this participant's identity.  Processes sharing
    /// one database on the same machine each need their own.
    /// Env: `CONVOY_DATA_DIR`
    /// Default: the platform data directory, whatever `CONVOY_DB_PATH` is.
    pub data_dir: Option<PathBuf>,

    /// Display name; falls back to the last name used on this device.
    /// Env: `CONVOY_NAME`
    pub display_name: Option<String>,

    /// Preferred marker colour (`#rrggbb`).
    /// Env: `CONVOY_COLOR`
    /// Default: first palette colour.
    pub color: Color,

    /// Session code to join.  Absent means host a new session.
    /// Env: `CONVOY_SESSION`
    pub session: Option<String>,

    /// Starting position as `lat,lng`.
    /// Env: `CONVOY_START`
    /// Default: `0,0`
    pub start: GeoPoint,

    /// Simulated drive origin and destination place names.  Both must be
    /// set to enable simulation.
    /// Env: `CONVOY_SIM_FROM`, `CONVOY_SIM_TO`
    pub sim_from: Option<String>,
    pub sim_to: Option<String>,

    /// Drive a companion behind the host during simulation.
    /// Env: `CONVOY_SIM_COMPANION` (true/false)
    /// Default: `false`
    pub sim_companion: bool,

    /// JSON place table used to resolve simulation place names.
    /// Env: `CONVOY_GAZETTEER`
    pub gazetteer: Option<PathBuf>,

    /// JSON-lines file of device fixes replayed as the live position source.
    /// Env: `CONVOY_GPS_FEED`
    pub gps_feed: Option<PathBuf>,

    /// Milliseconds between simulated route points and replayed fixes.
    /// Env: `CONVOY_TICK_MS`
    /// Default: `1000`
    pub tick_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            data_dir: None,
            display_name: None,
            color: Color::default(),
            session: None,
            start: GeoPoint::new(0.0, 0.0),
            sim_from: None,
            sim_to: None,
            sim_companion: false,
            gazetteer: None,
            gps_feed: None,
            tick_ms: SIM_TICK_MS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        config.db_path = non_empty("CONVOY_DB_PATH").map(PathBuf::from);
        config.data_dir = non_empty("CONVOY_DATA_DIR").map(PathBuf::from);
        config.display_name = non_empty("CONVOY_NAME");
        config.session = non_empty("CONVOY_SESSION");
        config.sim_from = non_empty("CONVOY_SIM_FROM");
        config.sim_to = non_empty("CONVOY_SIM_TO");
        config.gazetteer = non_empty("CONVOY_GAZETTEER").map(PathBuf::from);
        config.gps_feed = non_empty("CONVOY_GPS_FEED").map(PathBuf::from);

        if let Some(raw) = non_empty("CONVOY_COLOR") {
            match Color::parse(&raw) {
                Ok(color) => config.color = color,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Invalid CONVOY_COLOR, using default"),
            }
        }

        if let Some(raw) = non_empty("CONVOY_START") {
            match parse_lat_lng(&raw) {
                Some(start) => config.start = start,
                None => tracing::warn!(value = %raw, "Invalid CONVOY_START, using default"),
            }
        }

        if let Some(val) = non_empty("CONVOY_SIM_COMPANION") {
            config.sim_companion = val != "false" && val != "0";
        }

        if let Some(val) = non_empty("CONVOY_TICK_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.tick_ms = ms,
                _ => tracing::warn!(value = %val, "Invalid CONVOY_TICK_MS, using default"),
            }
        }

        config
    }

    /// Where the device identity lives.  Never derived from the database
    /// location, so two clients pointed at one shared file do not end up
    /// with the same participant id.
    pub fn identity_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Database::default_data_dir()?),
        }
    }

    /// Both simulation endpoints, if simulation is enabled.
    pub fn simulation(&self) -> Option<(&str, &str)> {
        match (&self.sim_from, &self.sim_to) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }
}

fn parse_lat_lng(raw: &str) -> Option<GeoPoint> {
    let (lat, lng) = raw.split_once(',')?;
    let lat = lat.trim().parse().ok()?;
    let lng = lng.trim().parse().ok()?;
    GeoPoint::checked(lat, lng).ok()
}
