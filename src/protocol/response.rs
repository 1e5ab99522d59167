use prost::Message;
use thiserror::Error;

use crate::erlang::{self, ErlangTerm};

use super::{
    MessageCode, TransportError,
    messages::{
        RpbErrorResp, RpbGetResp, RpbGetServerInfoResp, RpbListBucketsResp, RpbListKeysResp,
        RpbPutResp,
    },
};

/// Decoded reply body, selected by message code.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A known code with no body, e.g. `PingResp` or `DelResp`.
    Empty(MessageCode),
    ServerInfo(RpbGetServerInfoResp),
    Get(RpbGetResp),
    Put(RpbPutResp),
    ListBuckets(RpbListBucketsResp),
    ListKeys(RpbListKeysResp),
    Ttb(ErlangTerm),
    /// A body for a code the core does not model; decoding is left to the command.
    Raw { code: MessageCode, payload: Vec<u8> },
}

impl Response {
    pub fn decode(code: MessageCode, payload: &[u8]) -> Result<Self, TransportError> {
        let response = match code {
            MessageCode::GetServerInfoResp => {
                Response::ServerInfo(RpbGetServerInfoResp::decode(payload)?)
            }
            MessageCode::GetResp => Response::Get(RpbGetResp::decode(payload)?),
            MessageCode::PutResp => Response::Put(RpbPutResp::decode(payload)?),
            MessageCode::ListBucketsResp => {
                Response::ListBuckets(RpbListBucketsResp::decode(payload)?)
            }
            MessageCode::ListKeysResp => Response::ListKeys(RpbListKeysResp::decode(payload)?),
            MessageCode::TsTtbMsg => Response::Ttb(erlang::decode(payload)?),
            _ if payload.is_empty() => Response::Empty(code),
            _ => Response::Raw {
                code,
                payload: payload.to_vec(),
            },
        };
        Ok(response)
    }

    /// Whether this is the last chunk of a streamed reply. Non-streaming
    /// replies are always done.
    pub fn is_done(&self) -> bool {
        match self {
            Response::ListBuckets(resp) => resp.done.unwrap_or(false),
            Response::ListKeys(resp) => resp.done.unwrap_or(false),
            _ => true,
        }
    }
}

/// Application error reported by the server. The connection that carried it
/// stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("riak error {code}: {message}")]
pub struct ServerError {
    pub code: u32,
    pub message: String,
}

impl ServerError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_protobuf(payload: &[u8]) -> Result<Self, TransportError> {
        let resp = RpbErrorResp::decode(payload)?;
        Ok(Self {
            code: resp.errcode,
            message: String::from_utf8_lossy(&resp.errmsg).into_owned(),
        })
    }

    /// Recognises the TTB error reply `{rpberrorresp, Message, Code}`.
    pub fn from_ttb(term: &ErlangTerm) -> Option<Self> {
        let [name, message, code] = term.as_tuple()? else {
            return None;
        };
        if name.as_atom()? != "rpberrorresp" {
            return None;
        }
        let message = match message {
            ErlangTerm::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ErlangTerm::Atom(name) => name.clone(),
            _ => return None,
        };
        let code = u32::try_from(code.as_integer()?).ok()?;
        Some(Self { code, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_for_known_code() {
        assert_eq!(
            Response::decode(MessageCode::PingResp, &[]).unwrap(),
            Response::Empty(MessageCode::PingResp)
        );
    }

    #[test]
    fn empty_get_response_means_not_found() {
        let Response::Get(resp) = Response::decode(MessageCode::GetResp, &[]).unwrap() else {
            panic!("expected a get response");
        };
        assert!(resp.content.is_empty());
    }

    #[test]
    fn streaming_done_flag() {
        let chunk = RpbListKeysResp {
            keys: vec![b"k1".to_vec()],
            done: None,
        };
        let response =
            Response::decode(MessageCode::ListKeysResp, &chunk.encode_to_vec()).unwrap();
        assert!(!response.is_done());

        let last = RpbListKeysResp {
            keys: vec![],
            done: Some(true),
        };
        let response = Response::decode(MessageCode::ListKeysResp, &last.encode_to_vec()).unwrap();
        assert!(response.is_done());
    }

    #[test]
    fn malformed_protobuf_is_a_transport_error() {
        assert!(matches!(
            Response::decode(MessageCode::GetServerInfoResp, &[0x0a, 5, 1]),
            Err(TransportError::Protobuf(_))
        ));
    }

    #[test]
    fn server_error_from_protobuf() {
        let resp = RpbErrorResp {
            errmsg: b"not found".to_vec(),
            errcode: 7,
        };
        assert_eq!(
            ServerError::from_protobuf(&resp.encode_to_vec()).unwrap(),
            ServerError::new(7, "not found")
        );
    }

    #[test]
    fn server_error_from_ttb() {
        let term = ErlangTerm::Tuple(vec![
            ErlangTerm::atom("rpberrorresp"),
            ErlangTerm::binary("table not found"),
            ErlangTerm::Integer(1019),
        ]);
        assert_eq!(
            ServerError::from_ttb(&term),
            Some(ServerError::new(1019, "table not found"))
        );
        assert_eq!(ServerError::from_ttb(&ErlangTerm::atom("tsputresp")), None);
    }
}
