//! The seam between the engine and whatever actually moves bytes.
//!
//! Sessions, pools and the multi scheduler are generic over [`Transport`],
//! so the engine can run against the bundled reqwest backend, or against a
//! scripted fake in tests. A transport hands out opaque handles, performs
//! one resolved [`Transfer`] at a time on a handle, and (through
//! [`MultiTransport`]) drives many transfers concurrently behind a
//! step/wait/drain interface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::multipart::MultipartForm;
use crate::request::{Credentials, HttpVersion, Method, ProxyKind, Request};

/// Well-known transport error codes, numbered like curl's so downstream
/// handlers can match on familiar values.
pub mod code {
    pub const FAILED_INIT: i32 = 2;
    pub const URL_MALFORMAT: i32 = 3;
    pub const COULDNT_RESOLVE_HOST: i32 = 6;
    pub const COULDNT_CONNECT: i32 = 7;
    pub const WRITE_ERROR: i32 = 23;
    pub const READ_ERROR: i32 = 26;
    pub const OPERATION_TIMEDOUT: i32 = 28;
    pub const SSL_CONNECT_ERROR: i32 = 35;
    pub const ABORTED_BY_CALLBACK: i32 = 42;
    pub const BAD_FUNCTION_ARGUMENT: i32 = 43;
    pub const GOT_NOTHING: i32 = 52;
    pub const SEND_ERROR: i32 = 55;
    pub const RECV_ERROR: i32 = 56;
}

/// Proxy settings resolved from a request.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub kind: Option<ProxyKind>,
    pub auth: Option<Credentials>,
}

/// One fully resolved transfer: everything the transport needs to issue a
/// single HTTP call, with no reference back to the originating [`Request`].
#[derive(Debug, Clone)]
pub struct Transfer {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub follow_redirects: bool,
    pub max_redirects: Option<u32>,
    pub verify_ssl: bool,
    pub ca_path: Option<PathBuf>,
    pub ca_info: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub proxy: Option<ProxyConfig>,
    pub basic_auth: Option<Credentials>,
    /// Pre-rendered `Cookie` header from the request's own cookies.
    pub cookie_header: Option<String>,
    pub user_agent: Option<String>,
    pub accept_encoding: Option<String>,
    pub low_speed_limit: Option<u32>,
    pub low_speed_time: Option<Duration>,
    pub resume_from: Option<u64>,
    pub http_version: Option<HttpVersion>,
    pub form: Option<Arc<MultipartForm>>,
}

impl Transfer {
    /// Resolves a request into transport options. This is the single
    /// validation point for requests: setters never check anything.
    pub fn from_request(request: &Request) -> Result<Self> {
        if request.get_url().is_empty() {
            return Err(Error::transport(
                code::URL_MALFORMAT,
                "request has no URL",
            ));
        }
        if request.get_client_cert().is_some() != request.get_client_key().is_some() {
            return Err(Error::transport(
                code::BAD_FUNCTION_ARGUMENT,
                "client certificate requires a client key",
            ));
        }

        let cookie_header = if request.get_cookies().is_empty() {
            None
        } else {
            Some(
                request
                    .get_cookies()
                    .iter()
                    .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        let proxy = request.get_proxy().map(|url| ProxyConfig {
            url: url.to_string(),
            kind: request.get_proxy_kind(),
            auth: request.get_proxy_auth().cloned(),
        });

        Ok(Self {
            url: request.get_url().to_string(),
            method: request.get_method(),
            headers: request
                .get_headers()
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: request.get_body().to_vec(),
            timeout: request.get_timeout(),
            connect_timeout: request.get_connection_timeout(),
            follow_redirects: request.follows_redirects(),
            max_redirects: request.get_max_redirects(),
            verify_ssl: request.verifies_ssl(),
            ca_path: request.get_ca_path().map(Into::into),
            ca_info: request.get_ca_info().map(Into::into),
            client_cert: request.get_client_cert().map(Into::into),
            client_key: request.get_client_key().map(Into::into),
            proxy,
            basic_auth: request.get_basic_auth().cloned(),
            cookie_header,
            user_agent: request.get_user_agent().map(str::to_string),
            accept_encoding: request.get_accept_encoding().map(str::to_string),
            low_speed_limit: request.get_low_speed_limit(),
            low_speed_time: request.get_low_speed_time(),
            resume_from: request.get_resume_from(),
            http_version: request.get_http_version(),
            form: request.get_form().cloned(),
        })
    }

    /// Convenience for tests and logging: the value of a resolved header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Where a running transfer delivers its output.
///
/// The session points this at its scratch buffers (or at a file during a
/// download); the transport calls it as headers and body bytes arrive.
pub trait TransferSink {
    /// A chunk of response body. Returning an error aborts the transfer;
    /// the transport surfaces it as a write error.
    fn write_body(&mut self, chunk: &[u8]) -> Result<()>;

    /// One response header, already split and trimmed.
    fn write_header(&mut self, name: &str, value: &str);

    /// Progress report; return `false` to abort the transfer.
    fn progress(&mut self, dl_total: u64, dl_now: u64, ul_total: u64, ul_now: u64) -> bool {
        let _ = (dl_total, dl_now, ul_total, ul_now);
        true
    }
}

/// A synchronous HTTP transport.
pub trait Transport: Send + Sync + 'static {
    /// An opaque per-call resource. Exactly one owner at a time: the
    /// connection pool, a session, or an in-flight multi transfer.
    type Handle: Send + 'static;

    fn open(&self) -> Result<Self::Handle>;

    /// Returns a handle to its freshly-created state so it can be reused.
    fn reset(&self, handle: &mut Self::Handle);

    /// Blocks until the transfer completes, streaming output into `sink`.
    /// Returns the HTTP status code; transport-level failures are errors.
    fn perform(
        &self,
        handle: &mut Self::Handle,
        transfer: &Transfer,
        sink: &mut dyn TransferSink,
    ) -> Result<u16>;
}

/// Identity of a transfer inside a multi driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(pub u64);

/// The raw output of one completed multi transfer.
#[derive(Debug)]
pub struct RawReply {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// A finished multi transfer, successful or not.
#[derive(Debug)]
pub struct Completion {
    pub id: TransferId,
    pub result: Result<RawReply>,
}

/// Concurrent execution of many transfers on one driver.
///
/// The contract mirrors a poll loop: `step` starts queued work and reports
/// how many transfers are still running, `wait` blocks until something
/// finishes or the timeout passes, `drain` hands out completions. `add`
/// consumes the handle; the transport destroys it once the transfer ends.
pub trait MultiTransport: Transport {
    type Multi: Send;

    fn open_multi(&self) -> Result<Self::Multi>;

    fn add(
        &self,
        multi: &mut Self::Multi,
        handle: Self::Handle,
        transfer: Transfer,
    ) -> Result<TransferId>;

    fn step(&self, multi: &mut Self::Multi) -> Result<usize>;

    fn wait(&self, multi: &mut Self::Multi, timeout: Duration) -> Result<()>;

    fn drain(&self, multi: &mut Self::Multi) -> Vec<Completion>;
}

// Everything except ALPHA / DIGIT / "-" / "." / "_" / "~" is escaped,
// matching curl's escape rules.
const URL_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes a query-string component.
pub fn url_encode(input: &str) -> String {
    utf8_percent_encode(input, URL_ESCAPE).to_string()
}

/// Decodes a percent-encoded component, replacing invalid UTF-8.
pub fn url_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// The host part of a URL, used as the default cookie domain.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}
