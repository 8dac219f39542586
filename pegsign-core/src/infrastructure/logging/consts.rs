/// Main log file name.
pub const LOG_FILE_NAME: &str = "pegsign.log";
/// Warn-and-above log file name.
pub const ERR_LOG_FILE_NAME: &str = "pegsign_err.log";

/// Console pattern: `timestamp [LEVEL] message [module] [thread-id]`.
pub const LOG_LINE_PATTERN_COLORED: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{h({l:5})}] {m} [{M}] [{I}]{n}";

pub const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l:5}] {m} [{M}] [{I}]{n}";

/// Rotate at 50 MB.
pub const LOG_FILE_MAX_SIZE: u64 = 50_000_000;

pub const LOG_FILE_MAX_ROLLS: u32 = 5;

/// Crates logged at the application level by default; everything else is off unless opted in.
pub const WHITELISTED_CRATES: &[&str] = &["pegsign_core"];
