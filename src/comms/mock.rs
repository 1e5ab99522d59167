//! In-process stand-in for a Riak node, used by the networked tests.
use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use prost::Message;

use crate::protocol::{
    Frame, MessageCode, ServerError,
    messages::{RpbErrorResp, RpbGetServerInfoResp, RpbListKeysResp},
};

pub(crate) enum Reply {
    Frames(Vec<Frame>),
    /// Read the request and never answer.
    Silence,
    /// Close the socket without answering.
    Hangup,
}

type Handler = dyn Fn(&Frame) -> Reply + Send + Sync;

pub(crate) struct MockServer {
    address: SocketAddr,
    accepted: Arc<AtomicUsize>,
    healthy: Arc<AtomicBool>,
}

impl MockServer {
    pub(crate) fn start<F>(handler: F) -> Self
    where
        F: Fn(&Frame) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let healthy = Arc::new(AtomicBool::new(true));
        let handler: Arc<Handler> = Arc::new(handler);

        let server = Self {
            address,
            accepted: Arc::clone(&accepted),
            healthy: Arc::clone(&healthy),
        };

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                if !healthy.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                accepted.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                let healthy = Arc::clone(&healthy);
                thread::spawn(move || serve(stream, handler, healthy));
            }
        });

        server
    }

    /// Answers pings, server info and key listing like a healthy node.
    pub(crate) fn riak() -> Self {
        Self::start(riak_reply)
    }

    pub(crate) fn address(&self) -> String {
        self.address.to_string()
    }

    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// While unhealthy, new sockets are closed on accept and open ones are
    /// closed on their next request.
    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub(crate) fn error_frame(error: ServerError) -> Frame {
        let resp = RpbErrorResp {
            errmsg: error.message.into_bytes(),
            errcode: error.code,
        };
        Frame::new(MessageCode::ErrorResp, resp.encode_to_vec())
    }
}

/// Address with nothing listening on it.
pub(crate) fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

fn serve(mut stream: TcpStream, handler: Arc<Handler>, healthy: Arc<AtomicBool>) {
    while let Ok(request) = Frame::read_from(&mut stream) {
        if !healthy.load(Ordering::SeqCst) {
            return;
        }
        match handler(&request) {
            Reply::Frames(frames) => {
                for frame in frames {
                    if frame.write_to(&mut stream).is_err() {
                        return;
                    }
                }
            }
            Reply::Silence => {}
            Reply::Hangup => return,
        }
    }
}

fn riak_reply(request: &Frame) -> Reply {
    let Ok(code) = request.message_code() else {
        return Reply::Hangup;
    };
    let frames = match code {
        MessageCode::PingReq => vec![Frame::new(MessageCode::PingResp, Vec::new())],
        MessageCode::GetServerInfoReq => {
            let info = RpbGetServerInfoResp {
                node: Some(b"riak@127.0.0.1".to_vec()),
                server_version: Some(b"3.2.0".to_vec()),
            };
            vec![Frame::new(
                MessageCode::GetServerInfoResp,
                info.encode_to_vec(),
            )]
        }
        MessageCode::ListKeysReq => vec![
            Frame::new(MessageCode::ListKeysResp, keys_chunk(&["a", "b"], None)),
            Frame::new(MessageCode::ListKeysResp, keys_chunk(&["c"], Some(true))),
        ],
        _ => vec![MockServer::error_frame(ServerError::new(
            0,
            "unsupported by mock",
        ))],
    };
    Reply::Frames(frames)
}

fn keys_chunk(keys: &[&str], done: Option<bool>) -> Vec<u8> {
    RpbListKeysResp {
        keys: keys.iter().map(|k| k.as_bytes().to_vec()).collect(),
        done,
    }
    .encode_to_vec()
}
