use std::borrow::Cow;

use serde::de::DeserializeOwned;

use crate::headers::Headers;

/// The immutable result of one completed transfer.
///
/// A response existing means the transport succeeded; 4xx/5xx statuses are
/// carried here rather than raised as errors. Use the classifiers
/// ([`ok`](Self::ok), [`client_error`](Self::client_error), ...) to branch
/// on the status class.
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: u16,
    body: Vec<u8>,
    headers: Headers,
}

impl Response {
    pub fn new(status: u16, body: Vec<u8>, headers: Headers) -> Self {
        Self {
            status,
            body,
            headers,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// The body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    /// The parsed `Content-Length` header; `None` when absent or malformed.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("Content-Length")
            .and_then(|value| value.trim().parse().ok())
    }
}
