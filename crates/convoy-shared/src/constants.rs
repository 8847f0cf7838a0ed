/// Application name
pub const APP_NAME: &str = "Convoy";

/// Mean Earth radius used by the haversine formula, in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Reported speed above which a sample counts as "fast", in m/s
pub const FAST_SPEED_MPS: f64 = 8.0;

/// Fast samples: upload when this many seconds passed since the last upload
pub const FAST_UPLOAD_INTERVAL_SECS: i64 = 5;

/// Fast samples: upload when moved further than this since the last upload
pub const FAST_UPLOAD_DISTANCE_KM: f64 = 0.05;

/// Normal samples: upload when this many seconds passed since the last upload
pub const NORMAL_UPLOAD_INTERVAL_SECS: i64 = 10;

/// Normal samples: upload when moved further than this since the last upload
pub const NORMAL_UPLOAD_DISTANCE_KM: f64 = 0.03;

/// Unconditional upload after this many seconds of silence
pub const HEARTBEAT_SECS: i64 = 60;

/// Minimum spacing between consecutive trail points, in kilometres
pub const TRAIL_MIN_STEP_KM: f64 = 0.03;

/// Live GPS fixes must report a strictly better accuracy than this to enter the trail
pub const TRAIL_MAX_ACCURACY_M: f64 = 20.0;

/// Consecutive trail points further apart than this split the trail
pub const TRAIL_GAP_KM: f64 = 1.0;

/// A participant silent for longer than this is a ghost (5 minutes)
pub const GHOST_THRESHOLD_SECS: i64 = 300;

/// Maximum number of participants in one session
pub const MAX_PARTICIPANTS: usize = 10;

/// Simulated replay advances one route point per tick
pub const SIM_TICK_MS: u64 = 1000;

/// How often a client checks the store for commits made by other handles
pub const STORE_POLL_MS: u64 = 1000;

/// Route points the simulation companion lags behind the host
pub const COMPANION_LAG_POINTS: usize = 15;

/// Map zoom used by the one-shot "locate me" fly-to
pub const LOCATE_ZOOM: u8 = 18;

/// Length of a generated session code
pub const SESSION_CODE_LEN: usize = 4;

/// Longest session code accepted from user input
pub const SESSION_CODE_MAX_LEN: usize = 12;

/// Prefix of generated participant ids
pub const PARTICIPANT_ID_PREFIX: &str = "user_";

/// Number of random characters after the participant id prefix
pub const PARTICIPANT_ID_RANDOM_LEN: usize = 9;
