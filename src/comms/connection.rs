use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::{
    Command,
    protocol::{Frame, MessageReader, MessageWriter, ReadOutcome, TransportError},
    state::{ManagedState, StateManager},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl ManagedState for ConnectionState {
    fn as_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ConnectionState::Created),
            1 => Some(ConnectionState::Connecting),
            2 => Some(ConnectionState::Connected),
            3 => Some(ConnectionState::Closing),
            4 => Some(ConnectionState::Closed),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ConnectionState::Created => "created",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("cannot {operation} a {state} connection")]
    IllegalState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ConnectionError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ConnectionError::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            ConnectionError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Whether this failure says something about the node rather than the
    /// command being executed.
    pub fn is_node_fault(&self) -> bool {
        match self {
            ConnectionError::Transport(e) => e.desynchronizes(),
            ConnectionError::Connect { .. } => true,
            _ => false,
        }
    }
}

/// Parses `ip:port` directly, falling back to resolving `host:port`. No socket
/// is opened.
pub fn resolve(address: &str) -> Result<SocketAddr, ConnectionError> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    address
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConnectionError::InvalidAddress(address.to_string()))
}

/// A single socket to a Riak node.
///
/// Lifecycle: created, connecting, connected, then closing and closed on a
/// graceful [`Connection::close`]. Any I/O or framing fault moves it straight
/// to closed; such a connection can never be reused.
#[derive(Debug)]
pub struct Connection {
    address: SocketAddr,
    connect_timeout: Duration,
    request_timeout: Duration,
    stream: Option<TcpStream>,
    state: StateManager<ConnectionState>,
}

impl Connection {
    pub fn new(
        address: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        Ok(Self::with_address(
            resolve(address)?,
            connect_timeout,
            request_timeout,
        ))
    }

    pub fn with_address(
        address: SocketAddr,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            address,
            connect_timeout,
            request_timeout,
            stream: None,
            state: StateManager::from_enum(ConnectionState::Created),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Upper bound on how long [`Connection::connect`] may block.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_current_state(ConnectionState::Connected)
    }

    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if !self
            .state
            .compare_and_set(ConnectionState::Created, ConnectionState::Connecting)
        {
            return Err(self.illegal("connect"));
        }

        let stream = TcpStream::connect_timeout(&self.address, self.connect_timeout)
            .and_then(|stream| stream.set_nodelay(true).map(|_| stream));
        match stream {
            Ok(stream) => {
                debug!("connected to {}", self.address);
                self.stream = Some(stream);
                self.state.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(source) => {
                self.state.set_state(ConnectionState::Closed);
                Err(ConnectionError::Connect {
                    address: self.address,
                    source,
                })
            }
        }
    }

    pub fn send(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + self.request_timeout;
        let result = {
            let stream = self.connected_stream("send")?;
            frame.write_to(&mut DeadlineStream::new(stream, deadline))
        };
        self.check(result)
    }

    pub fn receive(&mut self) -> Result<Frame, ConnectionError> {
        let deadline = Instant::now() + self.request_timeout;
        let result = {
            let stream = self.connected_stream("receive")?;
            Frame::read_from(&mut DeadlineStream::new(stream, deadline))
        };
        self.check(result)
    }

    /// Writes the command's request and reads its reply within one
    /// `request_timeout` budget.
    pub fn execute(&mut self, command: &mut dyn Command) -> Result<ReadOutcome, ConnectionError> {
        let deadline = Instant::now() + self.request_timeout;
        let result = {
            let stream = self.connected_stream("execute")?;
            round_trip(stream, deadline, command)
        };
        self.check(result)
    }

    pub fn close(&mut self) {
        if self.state.is_current_state(ConnectionState::Closed) {
            return;
        }
        self.state.set_state(ConnectionState::Closing);
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state.set_state(ConnectionState::Closed);
        debug!("closed connection to {}", self.address);
    }

    fn abort(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.state.set_state(ConnectionState::Closed);
    }

    fn check<T>(&mut self, result: Result<T, TransportError>) -> Result<T, ConnectionError> {
        result.map_err(|e| {
            if e.desynchronizes() {
                warn!("discarding connection to {}: {e}", self.address);
                self.abort();
            }
            ConnectionError::Transport(e)
        })
    }

    fn connected_stream(&self, operation: &'static str) -> Result<&TcpStream, ConnectionError> {
        match &self.stream {
            Some(stream) if self.is_connected() => Ok(stream),
            _ => Err(self.illegal(operation)),
        }
    }

    fn illegal(&self, operation: &'static str) -> ConnectionError {
        ConnectionError::IllegalState {
            operation,
            state: self.state.get_state().name(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn round_trip(
    stream: &TcpStream,
    deadline: Instant,
    command: &mut dyn Command,
) -> Result<ReadOutcome, TransportError> {
    trace!("sending {} to {:?}", command.request_code(), stream.peer_addr());
    MessageWriter::new(DeadlineStream::new(stream, deadline)).write(command)?;
    MessageReader::new(DeadlineStream::new(stream, deadline)).read(command)
}

/// Applies what is left of a round-trip budget as the socket timeout before
/// every read and write.
struct DeadlineStream<'a> {
    stream: &'a TcpStream,
    deadline: Instant,
}

impl<'a> DeadlineStream<'a> {
    fn new(stream: &'a TcpStream, deadline: Instant) -> Self {
        Self { stream, deadline }
    }

    fn remaining(&self) -> io::Result<Duration> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request deadline elapsed",
            ));
        }
        Ok(self.deadline - now)
    }
}

impl Read for DeadlineStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(Some(self.remaining()?))?;
        let mut stream = self.stream;
        stream.read(buf)
    }
}

impl Write for DeadlineStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(Some(self.remaining()?))?;
        let mut stream = self.stream;
        stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut stream = self.stream;
        stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;
    use crate::{
        command::{Ping, ServerInfo},
        comms::mock::{MockServer, Reply},
        protocol::{MessageCode, ServerError},
    };

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn connected(server: &MockServer) -> Connection {
        let mut connection = Connection::new(&server.address(), TIMEOUT, TIMEOUT).unwrap();
        connection.connect().unwrap();
        connection
    }

    #[test]
    fn unparsable_address_fails_before_connecting() {
        assert!(matches!(
            Connection::new("not an address", TIMEOUT, TIMEOUT),
            Err(ConnectionError::InvalidAddress(_))
        ));
        assert!(matches!(
            Connection::new("127.0.0.1", TIMEOUT, TIMEOUT),
            Err(ConnectionError::InvalidAddress(_))
        ));
    }

    #[test]
    fn io_requires_connected_state() {
        let mut connection =
            Connection::with_address("127.0.0.1:8087".parse().unwrap(), TIMEOUT, TIMEOUT);
        assert_eq!(connection.state(), ConnectionState::Created);
        assert!(matches!(
            connection.execute(&mut Ping::new()),
            Err(ConnectionError::IllegalState {
                operation: "execute",
                state: "created"
            })
        ));
        assert!(connection.receive().is_err());
    }

    #[test]
    fn connect_is_only_legal_once() {
        let server = MockServer::riak();
        let mut connection = connected(&server);
        assert!(matches!(
            connection.connect(),
            Err(ConnectionError::IllegalState {
                operation: "connect",
                ..
            })
        ));
        assert!(connection.is_connected());
    }

    #[test]
    fn refused_connect_closes() {
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut connection = Connection::with_address(address, TIMEOUT, TIMEOUT);
        let err = connection.connect().unwrap_err();
        assert!(err.is_node_fault());
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn execute_round_trip() {
        let server = MockServer::riak();
        let mut connection = connected(&server);

        let mut ping = Ping::new();
        assert_eq!(connection.execute(&mut ping).unwrap(), ReadOutcome::Success);
        assert!(ping.succeeded());

        let mut info = ServerInfo::new();
        connection.execute(&mut info).unwrap();
        assert_eq!(info.node(), Some("riak@127.0.0.1"));
        assert!(connection.is_connected());
    }

    #[test]
    fn send_and_receive_frames() {
        let server = MockServer::riak();
        let mut connection = connected(&server);

        connection
            .send(&Frame::new(MessageCode::PingReq, Vec::new()))
            .unwrap();
        let frame = connection.receive().unwrap();
        assert_eq!(frame.message_code().unwrap(), MessageCode::PingResp);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn server_error_keeps_connection_open() {
        let server = MockServer::start(|_| {
            Reply::Frames(vec![MockServer::error_frame(ServerError::new(5, "busy"))])
        });
        let mut connection = connected(&server);

        let outcome = connection.execute(&mut Ping::new()).unwrap();
        assert_eq!(outcome, ReadOutcome::ServerError(ServerError::new(5, "busy")));
        assert!(connection.is_connected());
    }

    #[test]
    fn mismatched_reply_discards_connection() {
        let server = MockServer::start(|_| {
            Reply::Frames(vec![Frame::new(MessageCode::GetResp, Vec::new())])
        });
        let mut connection = connected(&server);

        let err = connection.execute(&mut Ping::new()).unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Transport(TransportError::UnexpectedMessageCode { .. })
        ));
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn silent_server_times_out_and_closes() {
        let server = MockServer::start(|_| Reply::Silence);
        let mut connection =
            Connection::new(&server.address(), TIMEOUT, Duration::from_millis(100)).unwrap();
        connection.connect().unwrap();

        let started = Instant::now();
        let err = connection.execute(&mut Ping::new()).unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(started.elapsed() < TIMEOUT);
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[test]
    fn hangup_mid_request_is_a_truncated_frame() {
        let server = MockServer::start(|_| Reply::Hangup);
        let mut connection = connected(&server);

        let err = connection.execute(&mut Ping::new()).unwrap_err();
        assert!(err.is_node_fault());
        assert!(!connection.is_connected());
    }

    #[test]
    fn graceful_close() {
        let server = MockServer::riak();
        let mut connection = connected(&server);
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(connection.execute(&mut Ping::new()).is_err());
    }
}
