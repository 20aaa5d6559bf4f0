//! Environment-variable keys carrying the worker's boot configuration.
//!
//! The supervisor serializes the configuration record into the worker's
//! environment at spawn time; worker implementations read these keys back.

/// Highest session id assigned before the worker (re)started.
pub const LAST_SESSION_ID: &str = "TERMHOST_LAST_SESSION_ID";

/// How long a disconnected session is kept alive, in milliseconds.
pub const RECONNECT_GRACE_MS: &str = "TERMHOST_RECONNECT_GRACE_MS";

/// Shortened grace period applied on clean shutdown, in milliseconds.
pub const RECONNECT_SHORT_GRACE_MS: &str = "TERMHOST_RECONNECT_SHORT_GRACE_MS";

/// Number of scrollback lines retained for reconnecting sessions.
pub const SCROLLBACK: &str = "TERMHOST_SCROLLBACK";

/// Forward worker console output over the pipe instead of stdio.
pub const PIPE_LOGGING: &str = "TERMHOST_PIPE_LOGGING";

/// Transmit verbose-level logs from the worker.
pub const VERBOSE_LOGGING: &str = "TERMHOST_VERBOSE_LOGGING";
