//! The unit of work executed by the transport core.
//!
//! A [`Command`] describes a single request/reply exchange: which message code
//! it sends, which code it expects back, how to build its request body, and
//! what to do with the decoded reply. The core never looks past those pieces;
//! bucket, key and query validation belong to whoever builds the command.
//!
//! # Overview
//!
//! - [`Ping`]: parameterless request, also the default node health check.
//! - [`ServerInfo`]: node name and server version.
//! - [`FetchValue`], [`StoreValue`], [`DeleteValue`]: key/value operations.
//! - [`ListBuckets`], [`ListKeys`]: streamed replies spanning several frames.
//! - [`StoreRows`]: time-series store sent as a `term_to_binary` payload.
//!
//! # Example
//! ```rust
//! use riak_transport::{Command, command::Ping, protocol::MessageCode};
//!
//! let ping = Ping::new();
//! assert_eq!(ping.request_code(), MessageCode::PingReq);
//! assert!(ping.construct_request().is_none());
//! ```
use crate::protocol::{MessageCode, Request, Response, ServerError};

mod kv;
mod server;
mod timeseries;

pub use kv::{DeleteValue, FetchValue, ListBuckets, ListKeys, StoreValue};
pub use server::{Ping, ServerInfo};
pub use timeseries::{Cell, StoreRows};

/// A request/reply exchange that a node can execute.
///
/// The same command value is reused when an attempt is retried on another
/// node, so callbacks may observe more than one attempt's worth of streamed
/// chunks only if an earlier attempt failed part way through a stream.
pub trait Command: Send {
    fn request_code(&self) -> MessageCode;

    fn response_code(&self) -> MessageCode;

    /// The request body, or `None` for requests that are only a message code.
    fn construct_request(&self) -> Option<Request>;

    /// Streaming commands receive one [`Command::on_success`] call per frame
    /// until a response reports it is done.
    fn is_streaming(&self) -> bool {
        false
    }

    fn on_success(&mut self, response: Response);

    fn on_error(&mut self, error: ServerError);
}
