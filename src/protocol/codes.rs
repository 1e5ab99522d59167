use std::fmt;

use super::TransportError;

macro_rules! message_codes {
    ($($name:ident = $value:literal,)*) => {
        /// Message codes of the Riak protocol buffers API.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum MessageCode {
            $($name = $value,)*
        }

        impl TryFrom<u8> for MessageCode {
            type Error = TransportError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(MessageCode::$name),)*
                    other => Err(TransportError::UnknownMessageCode(other)),
                }
            }
        }

        impl MessageCode {
            pub fn name(self) -> &'static str {
                match self {
                    $(MessageCode::$name => stringify!($name),)*
                }
            }
        }
    };
}

message_codes! {
    ErrorResp = 0,
    PingReq = 1,
    PingResp = 2,
    GetClientIdReq = 3,
    GetClientIdResp = 4,
    SetClientIdReq = 5,
    SetClientIdResp = 6,
    GetServerInfoReq = 7,
    GetServerInfoResp = 8,
    GetReq = 9,
    GetResp = 10,
    PutReq = 11,
    PutResp = 12,
    DelReq = 13,
    DelResp = 14,
    ListBucketsReq = 15,
    ListBucketsResp = 16,
    ListKeysReq = 17,
    ListKeysResp = 18,
    GetBucketReq = 19,
    GetBucketResp = 20,
    SetBucketReq = 21,
    SetBucketResp = 22,
    MapRedReq = 23,
    MapRedResp = 24,
    IndexReq = 25,
    IndexResp = 26,
    SearchQueryReq = 27,
    SearchQueryResp = 28,
    ResetBucketReq = 29,
    ResetBucketResp = 30,
    DtFetchReq = 80,
    DtFetchResp = 81,
    DtUpdateReq = 82,
    DtUpdateResp = 83,
    TsQueryReq = 90,
    TsQueryResp = 91,
    TsPutReq = 92,
    TsPutResp = 93,
    TsDelReq = 94,
    TsDelResp = 95,
    TsGetReq = 96,
    TsGetResp = 97,
    TsListKeysReq = 98,
    TsListKeysResp = 99,
    TsCoverageReq = 100,
    TsCoverageResp = 101,
    TsCoverageEntry = 102,
    TsRange = 103,
    TsTtbMsg = 104,
    AuthReq = 253,
    AuthResp = 254,
    StartTls = 255,
}

impl From<MessageCode> for u8 {
    fn from(code: MessageCode) -> Self {
        code as u8
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}
