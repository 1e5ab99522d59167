use std::time::Duration;

use crate::protocol::{
    MessageCode, Request, Response, ServerError,
    messages::{
        RpbContent, RpbDelReq, RpbGetReq, RpbGetResp, RpbListBucketsReq, RpbListKeysReq,
        RpbPutReq, RpbPutResp,
    },
};

use super::Command;

fn timeout_millis(timeout: Option<Duration>) -> Option<u32> {
    timeout.map(|t| u32::try_from(t.as_millis()).unwrap_or(u32::MAX))
}

/// Fetches the siblings stored under a bucket/key.
#[derive(Debug)]
pub struct FetchValue {
    bucket_type: Option<Vec<u8>>,
    bucket: Vec<u8>,
    key: Vec<u8>,
    timeout: Option<Duration>,
    response: Option<RpbGetResp>,
    error: Option<ServerError>,
}

impl FetchValue {
    pub fn new(bucket: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            bucket_type: None,
            bucket: bucket.into(),
            key: key.into(),
            timeout: None,
            response: None,
            error: None,
        }
    }

    pub fn with_bucket_type(mut self, bucket_type: impl Into<Vec<u8>>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `true` once a reply arrived without any sibling.
    pub fn is_not_found(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|resp| resp.content.is_empty())
    }

    pub fn values(&self) -> Vec<&[u8]> {
        self.response
            .iter()
            .flat_map(|resp| resp.content.iter().map(|c| c.value.as_slice()))
            .collect()
    }

    pub fn vclock(&self) -> Option<&[u8]> {
        self.response.as_ref()?.vclock.as_deref()
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }
}

impl Command for FetchValue {
    fn request_code(&self) -> MessageCode {
        MessageCode::GetReq
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::GetResp
    }

    fn construct_request(&self) -> Option<Request> {
        Some(Request::Get(RpbGetReq {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            r: None,
            head: None,
            timeout: timeout_millis(self.timeout),
            r#type: self.bucket_type.clone(),
        }))
    }

    fn on_success(&mut self, response: Response) {
        if let Response::Get(resp) = response {
            self.response = Some(resp);
        }
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}

/// Stores a single value. Without a key the server generates one.
#[derive(Debug)]
pub struct StoreValue {
    bucket_type: Option<Vec<u8>>,
    bucket: Vec<u8>,
    key: Option<Vec<u8>>,
    vclock: Option<Vec<u8>>,
    value: Vec<u8>,
    content_type: Option<Vec<u8>>,
    return_body: bool,
    response: Option<RpbPutResp>,
    error: Option<ServerError>,
}

impl StoreValue {
    pub fn new(bucket: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            bucket_type: None,
            bucket: bucket.into(),
            key: None,
            vclock: None,
            value: value.into(),
            content_type: None,
            return_body: false,
            response: None,
            error: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_bucket_type(mut self, bucket_type: impl Into<Vec<u8>>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn with_vclock(mut self, vclock: impl Into<Vec<u8>>) -> Self {
        self.vclock = Some(vclock.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_return_body(mut self, return_body: bool) -> Self {
        self.return_body = return_body;
        self
    }

    /// Key generated by the server when none was supplied.
    pub fn generated_key(&self) -> Option<&[u8]> {
        self.response.as_ref()?.key.as_deref()
    }

    pub fn stored(&self) -> bool {
        self.response.is_some()
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }
}

impl Command for StoreValue {
    fn request_code(&self) -> MessageCode {
        MessageCode::PutReq
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::PutResp
    }

    fn construct_request(&self) -> Option<Request> {
        Some(Request::Put(RpbPutReq {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            vclock: self.vclock.clone(),
            content: Some(RpbContent {
                value: self.value.clone(),
                content_type: self.content_type.clone(),
                ..Default::default()
            }),
            w: None,
            return_body: self.return_body.then_some(true),
            timeout: None,
            r#type: self.bucket_type.clone(),
        }))
    }

    fn on_success(&mut self, response: Response) {
        self.response = Some(match response {
            Response::Put(resp) => resp,
            _ => RpbPutResp::default(),
        });
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}

#[derive(Debug)]
pub struct DeleteValue {
    bucket_type: Option<Vec<u8>>,
    bucket: Vec<u8>,
    key: Vec<u8>,
    deleted: bool,
    error: Option<ServerError>,
}

impl DeleteValue {
    pub fn new(bucket: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            bucket_type: None,
            bucket: bucket.into(),
            key: key.into(),
            deleted: false,
            error: None,
        }
    }

    pub fn with_bucket_type(mut self, bucket_type: impl Into<Vec<u8>>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn deleted(&self) -> bool {
        self.deleted
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }
}

impl Command for DeleteValue {
    fn request_code(&self) -> MessageCode {
        MessageCode::DelReq
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::DelResp
    }

    fn construct_request(&self) -> Option<Request> {
        Some(Request::Delete(RpbDelReq {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            vclock: None,
            timeout: None,
            r#type: self.bucket_type.clone(),
        }))
    }

    fn on_success(&mut self, _response: Response) {
        self.deleted = true;
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}

/// Streams every bucket name of a bucket type.
#[derive(Debug, Default)]
pub struct ListBuckets {
    bucket_type: Option<Vec<u8>>,
    buckets: Vec<Vec<u8>>,
    done: bool,
    error: Option<ServerError>,
}

impl ListBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket_type(mut self, bucket_type: impl Into<Vec<u8>>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn buckets(&self) -> &[Vec<u8>] {
        &self.buckets
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }
}

impl Command for ListBuckets {
    fn request_code(&self) -> MessageCode {
        MessageCode::ListBucketsReq
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::ListBucketsResp
    }

    fn construct_request(&self) -> Option<Request> {
        Some(Request::ListBuckets(RpbListBucketsReq {
            timeout: None,
            stream: Some(true),
            r#type: self.bucket_type.clone(),
        }))
    }

    fn is_streaming(&self) -> bool {
        true
    }

    fn on_success(&mut self, response: Response) {
        if let Response::ListBuckets(chunk) = response {
            self.buckets.extend(chunk.buckets);
            self.done = chunk.done.unwrap_or(false);
        }
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}

/// Streams every key of a bucket.
#[derive(Debug)]
pub struct ListKeys {
    bucket_type: Option<Vec<u8>>,
    bucket: Vec<u8>,
    keys: Vec<Vec<u8>>,
    done: bool,
    error: Option<ServerError>,
}

impl ListKeys {
    pub fn new(bucket: impl Into<Vec<u8>>) -> Self {
        Self {
            bucket_type: None,
            bucket: bucket.into(),
            keys: Vec::new(),
            done: false,
            error: None,
        }
    }

    pub fn with_bucket_type(mut self, bucket_type: impl Into<Vec<u8>>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }
}

impl Command for ListKeys {
    fn request_code(&self) -> MessageCode {
        MessageCode::ListKeysReq
    }

    fn response_code(&self) -> MessageCode {
        MessageCode::ListKeysResp
    }

    fn construct_request(&self) -> Option<Request> {
        Some(Request::ListKeys(RpbListKeysReq {
            bucket: self.bucket.clone(),
            timeout: None,
            r#type: self.bucket_type.clone(),
        }))
    }

    fn is_streaming(&self) -> bool {
        true
    }

    fn on_success(&mut self, response: Response) {
        if let Response::ListKeys(chunk) = response {
            self.keys.extend(chunk.keys);
            self.done = chunk.done.unwrap_or(false);
        }
    }

    fn on_error(&mut self, error: ServerError) {
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::messages::RpbListBucketsResp;

    use super::*;

    #[test]
    fn fetch_request_carries_bucket_type_and_timeout() {
        let fetch = FetchValue::new("users", "alice")
            .with_bucket_type("maps")
            .with_timeout(Duration::from_secs(2));

        let Some(Request::Get(req)) = fetch.construct_request() else {
            panic!("expected a get request");
        };
        assert_eq!(req.bucket, b"users");
        assert_eq!(req.key, b"alice");
        assert_eq!(req.r#type.as_deref(), Some(&b"maps"[..]));
        assert_eq!(req.timeout, Some(2000));
    }

    #[test]
    fn fetch_not_found_and_values() {
        let mut fetch = FetchValue::new("b", "k");
        assert!(!fetch.is_not_found());

        fetch.on_success(Response::Get(RpbGetResp::default()));
        assert!(fetch.is_not_found());
        assert!(fetch.values().is_empty());

        fetch.on_success(Response::Get(RpbGetResp {
            content: vec![RpbContent {
                value: b"v".to_vec(),
                ..Default::default()
            }],
            vclock: Some(b"vc".to_vec()),
            unchanged: None,
        }));
        assert_eq!(fetch.values(), vec![&b"v"[..]]);
        assert_eq!(fetch.vclock(), Some(&b"vc"[..]));
    }

    #[test]
    fn store_without_key_reports_generated_key() {
        let mut store = StoreValue::new("b", "value").with_content_type("text/plain");
        let Some(Request::Put(req)) = store.construct_request() else {
            panic!("expected a put request");
        };
        assert_eq!(req.key, None);
        assert_eq!(req.return_body, None);
        assert_eq!(
            req.content.unwrap().content_type.as_deref(),
            Some(&b"text/plain"[..])
        );

        store.on_success(Response::Put(RpbPutResp {
            key: Some(b"generated".to_vec()),
            ..Default::default()
        }));
        assert!(store.stored());
        assert_eq!(store.generated_key(), Some(&b"generated"[..]));
    }

    #[test]
    fn empty_put_reply_still_counts_as_stored() {
        let mut store = StoreValue::new("b", "value").with_key("k");
        store.on_success(Response::Empty(MessageCode::PutResp));
        assert!(store.stored());
        assert_eq!(store.generated_key(), None);
    }

    #[test]
    fn list_buckets_accumulates_chunks() {
        let mut list = ListBuckets::new();
        assert!(list.is_streaming());
        list.on_success(Response::ListBuckets(RpbListBucketsResp {
            buckets: vec![b"a".to_vec()],
            done: None,
        }));
        assert!(!list.is_done());
        list.on_success(Response::ListBuckets(RpbListBucketsResp {
            buckets: vec![b"b".to_vec()],
            done: Some(true),
        }));
        assert!(list.is_done());
        assert_eq!(list.buckets(), &[b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn delete_records_server_error() {
        let mut delete = DeleteValue::new("b", "k");
        delete.on_error(ServerError::new(0, "timeout"));
        assert!(!delete.deleted());
        assert_eq!(delete.error(), Some(&ServerError::new(0, "timeout")));
    }
}
