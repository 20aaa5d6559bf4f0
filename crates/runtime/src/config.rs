//! Boot configuration for the worker process.
//!
//! The configuration record is built once per `start` call, handed to the
//! worker through its environment, and never mutated afterwards.

use std::time::Duration;

use termhost_protocol::payload;

/// Timing and buffering constants governing session reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConstants {
    /// How long a disconnected session stays alive awaiting a reconnect.
    pub grace_time: Duration,
    /// Shortened grace period used when the host shuts down cleanly.
    pub short_grace_time: Duration,
    /// Scrollback lines replayed to a reconnecting session.
    pub scrollback: u32,
}

/// Logging behavior requested of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingFlags {
    /// Forward worker console output over the pipe to the host.
    pub pipe_logging: bool,
    /// Transmit verbose-level logs.
    pub verbose: bool,
}

impl Default for LoggingFlags {
    fn default() -> Self {
        Self {
            pipe_logging: true,
            verbose: false,
        }
    }
}

/// Immutable boot payload for one worker lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub last_session_id: u64,
    pub reconnect: ReconnectConstants,
    pub logging: LoggingFlags,
}

impl Configuration {
    /// Builds the configuration record. Pure and deterministic; every field
    /// the worker needs to reproduce reconnect/scrollback behavior is
    /// carried here.
    pub fn build(
        last_session_id: u64,
        reconnect: ReconnectConstants,
        logging: LoggingFlags,
    ) -> Self {
        Self {
            last_session_id,
            reconnect,
            logging,
        }
    }

    /// Serializes the record to the environment variables the worker reads
    /// at boot.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (payload::LAST_SESSION_ID, self.last_session_id.to_string()),
            (
                payload::RECONNECT_GRACE_MS,
                self.reconnect.grace_time.as_millis().to_string(),
            ),
            (
                payload::RECONNECT_SHORT_GRACE_MS,
                self.reconnect.short_grace_time.as_millis().to_string(),
            ),
            (payload::SCROLLBACK, self.reconnect.scrollback.to_string()),
            (
                payload::PIPE_LOGGING,
                self.logging.pipe_logging.to_string(),
            ),
            (payload::VERBOSE_LOGGING, self.logging.verbose.to_string()),
        ]
    }
}
