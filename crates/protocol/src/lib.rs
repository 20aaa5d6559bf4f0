//! Wire types for the link between the supervisor and the terminal-host
//! worker process.
//!
//! Two layers share this crate:
//!
//! - **Mux frames** ([`Frame`]): every byte on the worker pipe is a
//!   length-prefixed JSON frame carrying either channel lifecycle control
//!   (`open`/`close`) or an opaque payload for one logical channel.
//! - **Client messages** ([`Request`], [`Response`], [`Event`]): the
//!   request/response and event framing the structured client speaks over a
//!   single channel.
//!
//! The crate is deliberately free of any I/O; the runtime crate owns the
//! pipes and tasks.

pub mod frame;
pub mod message;
pub mod payload;

pub use frame::{ChannelId, Frame, LENGTH_PREFIX_BYTES, MAX_FRAME_LEN, encode_frame, parse_frame};
pub use message::{ErrorPayload, Event, Message, Request, Response};
