// src/constants.rs

pub const USERNAME_REGEX: &str = r"^[a-zA-Z0-9_.\-]{1,32}$";

/// Longest control line accepted from a peer, terminator included.
pub const MAX_LINE_LENGTH: usize = 8192;

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DATA_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_CONTROL_PORT: u16 = 21;
pub const DEFAULT_MAX_LOGIN_FAILURES: u32 = 3;
pub const DEFAULT_GREETING: &str = "rouilleftpd ready.";
