use crate::{
    erlang::ErlangTerm,
    protocol::{MessageCode, Request, Response, ServerError},
};

use super::Command;

/// A single time-series cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Varchar(Vec<u8>),
    SInt64(i64),
    Double(f64),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Boolean(bool),
    Null,
}

impl Cell {
    fn to_term(&self) -> ErlangTerm {
        match self {
            Cell::Varchar(bytes) => ErlangTerm::Binary(bytes.clone()),
            Cell::SInt64(v) | Cell::Timestamp(v) => ErlangTerm::Integer(*v),
            Cell::Double(v) => ErlangTerm::Float(*v),
            Cell::Boolean(v) => ErlangTerm::boolean(*v),
            Cell::Null => ErlangTerm::Nil,
        }
    }
}

/// Writes rows into a time-series table.
///
/// The request travels as `{tsputreq, Table, [], [Row, ...]}` with each row a
/// tuple of cells, and the server answers with the atom `tsputresp`.
#[derive(Debug)]
pub struct StoreRows {
    table: String,
    rows: Vec<Vec<Cell>>,
    succeeded: bool,
    error: Option<ServerError>,
}

impl StoreRows {
    pub fn new(table: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            table: table.into(),
            rows,
            succeeded: false,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }

    fn request_term(&self) -> ErlangTerm {
        let rows = self
            .rows
            .iter()
            .map(|row| ErlangTerm::Tuple(row.iter().map(Cell::to_term).collect()))
            .collect();

        ErlangTerm::Tuple(vec![
            ErlangTerm::atom("tsputreq"),
            ErlangTerm::binary(self.table.as_bytes()),
            ErlangTerm::Nil,
            ErlangTerm::list(rows),
        ])
    }
}

impl Command for StoreRows {
    fn request_code(&self) -> MessageCode {
        MessageCode::TsTtbMsg
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::TsTtbMsg
    }

    fn construct_request(&self) -> Option<Request> {
        Some(Request::Ttb(self.request_term()))
    }

    fn on_success(&mut self, response: Response) {
        if let Response::Ttb(term) = response {
            self.succeeded = term.as_atom() == Some("tsputresp");
        }
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}
