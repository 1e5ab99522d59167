//! Erlang External Term Format codec.
//!
//! Riak's time-series API can exchange payloads encoded with `term_to_binary`
//! (TTB) instead of protocol buffers. This module holds just enough of the
//! External Term Format to frame those requests and replies.
//!
//! # Key Components
//!
//! - [`ErlangTerm`]: the decoded value model.
//! - [`TermEncoder`]: incremental writer; picks the smallest integer tag and
//!   always writes floats as `NEW_FLOAT_EXT`.
//! - [`TermDecoder`]: cursor over a byte slice with `peek` support so callers
//!   can branch on the next tag before committing to a read.
//!
//! # Binary Format
//!
//! A top-level value starts with the version byte `131`, followed by one tagged
//! term. All multi-byte lengths and integers are big-endian, except big integer
//! magnitudes which are little-endian.
mod decoder;
mod encoder;
mod term;

use thiserror::Error;

pub use decoder::{TermDecoder, decode};
pub use encoder::{TermEncoder, encode};
pub use term::{BigInt, ErlangTerm};

pub(crate) mod tag {
    pub const VERSION: u8 = 131;
    pub const NEW_FLOAT_EXT: u8 = 70;
    pub const SMALL_INTEGER_EXT: u8 = 97;
    pub const INTEGER_EXT: u8 = 98;
    pub const FLOAT_EXT: u8 = 99;
    pub const ATOM_EXT: u8 = 100;
    pub const SMALL_TUPLE_EXT: u8 = 104;
    pub const LARGE_TUPLE_EXT: u8 = 105;
    pub const NIL_EXT: u8 = 106;
    pub const STRING_EXT: u8 = 107;
    pub const LIST_EXT: u8 = 108;
    pub const BINARY_EXT: u8 = 109;
    pub const SMALL_BIG_EXT: u8 = 110;
    pub const LARGE_BIG_EXT: u8 = 111;
    pub const SMALL_ATOM_EXT: u8 = 115;
    pub const ATOM_UTF8_EXT: u8 = 118;
    pub const SMALL_ATOM_UTF8_EXT: u8 = 119;
}

/// Nesting limit for tuples and lists while decoding.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErlangError {
    #[error("unexpected end of stream: needed {needed} byte(s), {remaining} remaining")]
    UnexpectedEndOfStream { needed: usize, remaining: usize },

    #[error("bad version byte {0}, expected 131")]
    BadVersion(u8),

    #[error("expected {expected}, found tag {found}")]
    UnexpectedTag { expected: &'static str, found: u8 },

    #[error("unsupported tag {0}")]
    UnsupportedTag(u8),

    #[error("atom '{0}' is not a boolean")]
    InvalidBoolean(String),

    #[error("atom is not valid utf-8")]
    InvalidAtom,

    #[error("integer does not fit in 64 bits")]
    IntegerOverflow,

    #[error("invalid float text '{0}'")]
    InvalidFloat(String),

    #[error("improper list tail with tag {0}")]
    ImproperList(u8),

    #[error("{kind} of length {length} cannot be encoded")]
    TooLong { kind: &'static str, length: usize },

    #[error("terms nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,

    #[error("{0} trailing byte(s) after term")]
    TrailingBytes(usize),
}
