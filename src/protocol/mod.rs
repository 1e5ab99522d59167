//! Riak wire protocol.
//!
//! This module turns a [`Command`](crate::Command) into bytes on a stream and
//! turns reply frames back into typed [`Response`] values or a [`ServerError`].
//!
//! # Binary Format
//!
//! Every message is a frame:
//!
//! - a 4-byte big-endian length covering the message code and payload,
//! - a 1-byte [`MessageCode`],
//! - the payload, protocol buffers for most messages or an External Term
//!   Format term for `TsTtbMsg`.
//!
//! A frame with an empty payload is valid; `PingReq` is exactly `[0, 0, 0, 1, 1]`.
//!
//! # Key Components
//!
//! - [`Frame`]: one length-prefixed unit on the wire.
//! - [`MessageWriter`] / [`MessageReader`]: command level framing, including
//!   streamed replies that span several frames.
//! - [`Request`] / [`Response`]: closed mappings between message codes and bodies.
//!
//! # See Also
//!
//! - [`erlang`](crate::erlang): the term codec behind TTB payloads.
//! - [`comms`](crate::comms): connections that carry these frames.
mod codes;
pub mod messages;
mod request;
mod response;
mod transport;

pub use codes::MessageCode;
pub use request::Request;
pub use response::{Response, ServerError};
pub use transport::{
    Frame, MAX_FRAME_LENGTH, MessageReader, MessageWriter, ReadOutcome, TransportError,
};
