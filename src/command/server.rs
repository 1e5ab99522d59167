use crate::protocol::{MessageCode, Request, Response, ServerError};

use super::Command;

#[derive(Debug, Default)]
pub struct Ping {
    succeeded: bool,
    error: Option<ServerError>,
}

impl Ping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }
}

impl Command for Ping {
    fn request_code(&self) -> MessageCode {
        MessageCode::PingReq
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::PingResp
    }

    fn construct_request(&self) -> Option<Request> {
        None
    }

    fn on_success(&mut self, _response: Response) {
        self.succeeded = true;
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}

#[derive(Debug, Default)]
pub struct ServerInfo {
    node: Option<String>,
    server_version: Option<String>,
    error: Option<ServerError>,
}

impl ServerInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }
}

impl Command for ServerInfo {
    fn request_code(&self) -> MessageCode {
        MessageCode::GetServerInfoReq
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::GetServerInfoResp
    }

    fn construct_request(&self) -> Option<Request> {
        None
    }

    fn on_success(&mut self, response: Response) {
        if let Response::ServerInfo(info) = response {
            self.node = info
                .node
                .map(|n| String::from_utf8_lossy(&n).into_owned());
            self.server_version = info
                .server_version
                .map(|v| String::from_utf8_lossy(&v).into_owned());
        }
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}
