/// Application name
pub const APP_NAME: &str = "Tat-Sahay";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Maximum accepted image size in bytes (10 MiB)
pub const MAX_MEDIA_SIZE: usize = 10 * 1024 * 1024;

/// Content-type prefix accepted by the media store
pub const MEDIA_CONTENT_PREFIX: &str = "image/";

/// Map point radius for a location with a single report, in metres
pub const BASE_RADIUS_METERS: f64 = 50_000.0;

/// Length of the hex-encoded map point identifier
pub const MAP_POINT_ID_LEN: usize = 16;

/// Random bytes in a session token before hex encoding
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Automatic retries granted to a store write that failed as unavailable
pub const STORE_WRITE_RETRIES: u32 = 1;

/// Buffered invalidation signals per subscriber
pub const INVALIDATION_CHANNEL_CAPACITY: usize = 256;

/// How long a finished submission stays pollable (15 minutes)
pub const SUBMISSION_RETENTION_SECS: u64 = 15 * 60;

/// Lifetime of a development session token (24 hours)
pub const SESSION_TTL_SECS: u64 = 24 * 60 * 60;
