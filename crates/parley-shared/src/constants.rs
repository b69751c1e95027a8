/// Application name
pub const APP_NAME: &str = "Parley";

/// Messages fetched per page when opening a thread or scrolling back
pub const MESSAGE_PAGE_SIZE: u32 = 20;

/// Connection code lifetime in minutes
pub const CODE_EXPIRY_MINUTES: i64 = 15;

/// Connection codes are single-use
pub const CODE_MAX_USES: u32 = 1;

/// Client-side deadline for code verification round-trips, in seconds
pub const VERIFY_TIMEOUT_SECS: u64 = 10;

/// Client-side deadline for signaling sends, in seconds
pub const SIGNALING_TIMEOUT_SECS: u64 = 10;

/// File name of the persisted session record
pub const SESSION_FILE: &str = "session.json";
