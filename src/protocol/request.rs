use prost::Message;

use crate::erlang::{self, ErlangTerm};

use super::{
    TransportError,
    messages::{RpbDelReq, RpbGetReq, RpbListBucketsReq, RpbListKeysReq, RpbPutReq},
};

/// Request bodies the core knows how to serialise.
///
/// Protocol buffer variants are encoded with `prost`; [`Request::Ttb`] is encoded
/// with the External Term Format and travels under
/// [`MessageCode::TsTtbMsg`](super::MessageCode::TsTtbMsg).
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get(RpbGetReq),
    Put(RpbPutReq),
    Delete(RpbDelReq),
    ListBuckets(RpbListBucketsReq),
    ListKeys(RpbListKeysReq),
    Ttb(ErlangTerm),
}

impl Request {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        let payload = match self {
            Request::Get(req) => req.encode_to_vec(),
            Request::Put(req) => req.encode_to_vec(),
            Request::Delete(req) => req.encode_to_vec(),
            Request::ListBuckets(req) => req.encode_to_vec(),
            Request::ListKeys(req) => req.encode_to_vec(),
            Request::Ttb(term) => erlang::encode(term).map_err(TransportError::InvalidRequest)?,
        };
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protobuf_request_encodes_fields() {
        let request = Request::ListKeys(RpbListKeysReq {
            bucket: b"b".to_vec(),
            timeout: None,
            r#type: None,
        });
        // field 1, wire type 2, length 1, 'b'
        assert_eq!(request.encode().unwrap(), vec![0x0a, 1, b'b']);
    }

    #[test]
    fn ttb_request_carries_version_byte() {
        let request = Request::Ttb(ErlangTerm::atom("ok"));
        assert_eq!(request.encode().unwrap(), vec![131, 100, 0, 2, b'o', b'k']);
    }

    #[test]
    fn unencodable_term_is_an_invalid_request() {
        let request = Request::Ttb(ErlangTerm::atom("x".repeat(70_000)));
        assert!(matches!(
            request.encode(),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
