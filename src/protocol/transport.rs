use std::io::{self, Read, Write};

use bincode::{
    Encode,
    config::{BigEndian, Configuration, Fixint},
};
use log::trace;
use thiserror::Error;

use crate::{Command, erlang::ErlangError};

use super::{MessageCode, Response, ServerError};

/// Largest frame body (message code + payload) accepted from the wire.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = size_of::<u32>();

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode frame header: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode frame header: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("stream ended before {expected} byte(s) could be read")]
    Truncated { expected: usize },
    #[error("frame declares zero length")]
    EmptyFrame,
    #[error("frame length {0} exceeds the maximum frame length")]
    FrameTooLarge(usize),
    #[error("unknown message code {0}")]
    UnknownMessageCode(u8),
    #[error("expected {expected}, received {found}")]
    UnexpectedMessageCode {
        expected: MessageCode,
        found: MessageCode,
    },
    #[error("invalid protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("invalid term payload: {0}")]
    Term(#[from] ErlangError),
    #[error("request cannot be encoded: {0}")]
    InvalidRequest(ErlangError),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Io(e)
            if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut))
    }

    /// Whether the stream may hold unread or half-written frame bytes after
    /// this error. Only request encoding fails before anything is written.
    pub fn desynchronizes(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

fn config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// `length` counts the message code plus the payload, never itself.
#[derive(Debug, Encode)]
struct FrameHeader {
    length: u32,
    code: u8,
}

/// One length-prefixed protocol unit: `[u32 length][u8 code][payload]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(code: MessageCode, payload: Vec<u8>) -> Self {
        Self {
            code: code.into(),
            payload,
        }
    }

    pub fn length(&self) -> usize {
        1 + self.payload.len()
    }

    pub fn message_code(&self) -> Result<MessageCode, TransportError> {
        MessageCode::try_from(self.code)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        let length = self.length();
        if length > MAX_FRAME_LENGTH {
            return Err(TransportError::FrameTooLarge(length));
        }
        let header = FrameHeader {
            length: length as u32,
            code: self.code,
        };
        let mut out = bincode::encode_to_vec(header, config())?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Writes the whole frame with a single `write_all`.
    pub fn write_to<W: Write>(&self, stream: &mut W) -> Result<(), TransportError> {
        let bytes = self.encode()?;
        stream.write_all(&bytes)?;
        stream.flush()?;
        trace!("wrote frame code={} length={}", self.code, self.length());
        Ok(())
    }

    /// Reads exactly four length bytes, then exactly `length` body bytes.
    pub fn read_from<R: Read>(stream: &mut R) -> Result<Self, TransportError> {
        let mut prefix = [0; LENGTH_PREFIX_SIZE];
        read_exact(stream, &mut prefix)?;
        let (length, _): (u32, usize) = bincode::decode_from_slice(&prefix, config())?;
        let length = length as usize;

        if length == 0 {
            return Err(TransportError::EmptyFrame);
        }
        if length > MAX_FRAME_LENGTH {
            return Err(TransportError::FrameTooLarge(length));
        }

        let mut body = vec![0; length];
        read_exact(stream, &mut body)?;
        let code = body[0];
        body.remove(0);
        trace!("read frame code={code} length={length}");

        Ok(Self {
            code,
            payload: body,
        })
    }
}

fn read_exact<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<(), TransportError> {
    stream.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => TransportError::Truncated {
            expected: buf.len(),
        },
        _ => TransportError::Io(e),
    })
}

/// Serialises a command's request onto a stream.
pub struct MessageWriter<W: Write> {
    stream: W,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    /// A command without a request body produces a frame holding only the
    /// message code.
    pub fn write(&mut self, command: &dyn Command) -> Result<(), TransportError> {
        let payload = match command.construct_request() {
            Some(request) => request.encode()?,
            None => Vec::new(),
        };
        Frame::new(command.request_code(), payload).write_to(&mut self.stream)
    }
}

/// How a command's reply ended, when the frames themselves were well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Success,
    ServerError(ServerError),
}

/// Reads reply frames and hands the decoded responses to the command.
pub struct MessageReader<R: Read> {
    stream: R,
}

impl<R: Read> MessageReader<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Reads one frame, or for a streaming command every frame up to the one
    /// flagged done. Server error replies are delivered through
    /// [`Command::on_error`]; a reply with an unexpected code means the
    /// stream is out of step and is returned as an error.
    pub fn read(&mut self, command: &mut dyn Command) -> Result<ReadOutcome, TransportError> {
        loop {
            let frame = Frame::read_from(&mut self.stream)?;
            let code = frame.message_code()?;

            if code == MessageCode::ErrorResp {
                let error = ServerError::from_protobuf(&frame.payload)?;
                command.on_error(error.clone());
                return Ok(ReadOutcome::ServerError(error));
            }

            let expected = command.response_code();
            if code != expected {
                return Err(TransportError::UnexpectedMessageCode {
                    expected,
                    found: code,
                });
            }

            let response = Response::decode(code, &frame.payload)?;
            if let Response::Ttb(term) = &response {
                if let Some(error) = ServerError::from_ttb(term) {
                    command.on_error(error.clone());
                    return Ok(ReadOutcome::ServerError(error));
                }
            }

            let done = !command.is_streaming() || response.is_done();
            command.on_success(response);
            if done {
                return Ok(ReadOutcome::Success);
            }
        }
    }
}
