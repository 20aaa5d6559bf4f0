//! Terminal-host runtime - worker supervision and connection brokering
//!
//! This crate supervises the single long-lived worker process that hosts
//! interactive terminal sessions, and brokers additional communication
//! channels into that same worker on behalf of independent parts of the host
//! application:
//!
//! - **Worker management**: locating and launching the terminal-host worker
//! - **Multiplexer**: many independent message channels over the worker's
//!   stdio pipe
//! - **Client**: request/response correlation and event dispatch over the
//!   primary channel
//! - **Supervisor**: the one-worker lifecycle (`start`, `connect`, exit
//!   notification, dispose)
//! - **Broker**: serving third-party connection requests against the running
//!   worker
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐        ┌─────────────┐
//! │  host app    │──bus──▶│   Broker    │  token-correlated endpoints
//! └──────┬───────┘        └──────┬──────┘
//!        │ start/connect         │ connect
//! ┌──────▼─────────────────────────────┐
//! │            Supervisor              │  one worker, one lifetime
//! │  ┌────────┐ ┌────────┐ ┌────────┐  │
//! │  │ Client │ │  Mux   │ │ Worker │  │
//! │  └────────┘ └────────┘ └────────┘  │
//! └──────────────────┬─────────────────┘
//!                    │ stdio pipe, length-prefixed JSON frames
//!             ┌──────▼──────┐
//!             │   worker    │  external process
//!             └─────────────┘
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod debug;
pub mod error;
pub mod mux;
pub mod supervisor;
pub mod worker;

// Re-export key types at crate root
pub use broker::{ConnectionRequest, RequestBus, RequestOrigin, RequestSender};
pub use client::Client;
pub use config::{Configuration, LoggingFlags, ReconnectConstants};
pub use debug::{DebugRequest, launch_args};
pub use error::{Error, Result};
pub use mux::{Endpoint, EndpointSender};
pub use supervisor::{ConnectionHandle, PtyHostSupervisor};
pub use worker::{WorkerCommand, WorkerExit};
