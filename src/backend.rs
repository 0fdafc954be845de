//! The bundled transport, built on `reqwest`'s blocking client.
//!
//! One [`HttpHandle`] wraps one `reqwest` client. Client-level options
//! (connect timeout, redirect policy, TLS, proxy) are baked into the client
//! at build time, so the handle caches the client together with a
//! fingerprint of those options, rebuilding only when they change, so the
//! underlying connection pool is reused across transfers on the same
//! handle. The multi driver runs each transfer on its own worker thread
//! and funnels completions through a channel.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use lazy_static::lazy_static;
use reqwest::blocking::{Client, multipart};
use reqwest::redirect;

use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::multipart::{MultipartForm, PartBody};
use crate::request::{HttpVersion, Method, ProxyKind};
use crate::transport::{
    Completion, MultiTransport, ProxyConfig, RawReply, Transfer, TransferId, TransferSink,
    Transport, code,
};

lazy_static! {
    static ref SHARED: Arc<HttpTransport> = Arc::new(HttpTransport::new());
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// The process-wide transport used by `Session::new` and the module-level
/// helpers. Constructed once, on first use.
pub fn default_transport() -> Arc<HttpTransport> {
    SHARED.clone()
}

/// A blocking HTTP transport backed by `reqwest`.
#[derive(Debug, Default)]
pub struct HttpTransport;

impl HttpTransport {
    pub fn new() -> Self {
        Self
    }
}

/// One reusable transfer slot: a cached client plus the fingerprint of the
/// options it was built with.
#[derive(Debug)]
pub struct HttpHandle {
    id: u64,
    client: Option<(u64, Client)>,
}

impl HttpHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn client_for(&mut self, transfer: &Transfer) -> Result<Client> {
        let fingerprint = client_fingerprint(transfer);
        if let Some((cached, client)) = &self.client {
            if *cached == fingerprint {
                return Ok(client.clone());
            }
        }

        let client = build_client(transfer)?;
        self.client = Some((fingerprint, client.clone()));
        Ok(client)
    }
}

impl Transport for HttpTransport {
    type Handle = HttpHandle;

    fn open(&self) -> Result<HttpHandle> {
        Ok(HttpHandle {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            client: None,
        })
    }

    fn reset(&self, handle: &mut HttpHandle) {
        handle.client = None;
    }

    fn perform(
        &self,
        handle: &mut HttpHandle,
        transfer: &Transfer,
        sink: &mut dyn TransferSink,
    ) -> Result<u16> {
        run_transfer(handle, transfer, sink)
    }
}

fn run_transfer(
    handle: &mut HttpHandle,
    transfer: &Transfer,
    sink: &mut dyn TransferSink,
) -> Result<u16> {
    let client = handle.client_for(transfer)?;

    let mut builder = client.request(map_method(transfer.method), transfer.url.as_str());

    if let Some(timeout) = transfer.timeout {
        builder = builder.timeout(timeout);
    }
    builder = builder.headers(resolve_headers(transfer)?);
    if let Some(version) = transfer.http_version {
        builder = builder.version(match version {
            HttpVersion::Http11 => http::Version::HTTP_11,
            HttpVersion::Http2 => http::Version::HTTP_2,
            HttpVersion::Http3 => http::Version::HTTP_3,
        });
    }
    if !transfer.body.is_empty() {
        builder = builder.body(transfer.body.clone());
    }
    if let Some(form) = &transfer.form {
        builder = builder.multipart(build_form(form)?);
    }

    let mut response = builder.send().map_err(map_transfer_error)?;

    let status = response.status().as_u16();
    for (name, value) in response.headers() {
        sink.write_header(name.as_str(), value.to_str().unwrap_or_default());
    }

    let total = response.content_length().unwrap_or(0);
    let mut received = 0u64;
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let n = response
            .read(&mut chunk)
            .map_err(|err| Error::transport(code::RECV_ERROR, err.to_string()))?;
        if n == 0 {
            break;
        }
        received += n as u64;
        sink.write_body(&chunk[..n])?;
        if !sink.progress(total, received, 0, 0) {
            return Err(Error::transport(
                code::ABORTED_BY_CALLBACK,
                "transfer aborted by progress callback",
            ));
        }
    }

    Ok(status)
}

fn map_method(method: Method) -> http::Method {
    match method {
        Method::Get => http::Method::GET,
        Method::Post => http::Method::POST,
        Method::Put => http::Method::PUT,
        Method::Delete => http::Method::DELETE,
        Method::Patch => http::Method::PATCH,
        Method::Head => http::Method::HEAD,
        Method::Options => http::Method::OPTIONS,
    }
}

fn resolve_headers(transfer: &Transfer) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();

    for (name, value) in &transfer.headers {
        map.append(parse_header_name(name)?, parse_header_value(value)?);
    }
    if let Some(auth) = &transfer.basic_auth {
        map.insert(
            http::header::AUTHORIZATION,
            parse_header_value(&auth.basic_auth())?,
        );
    }
    if let Some(cookie) = &transfer.cookie_header {
        map.insert(http::header::COOKIE, parse_header_value(cookie)?);
    }
    if let Some(agent) = &transfer.user_agent {
        map.insert(http::header::USER_AGENT, parse_header_value(agent)?);
    }
    if let Some(encoding) = &transfer.accept_encoding {
        map.insert(http::header::ACCEPT_ENCODING, parse_header_value(encoding)?);
    }
    if let Some(offset) = transfer.resume_from {
        map.insert(
            http::header::RANGE,
            parse_header_value(&format!("bytes={offset}-"))?,
        );
    }

    Ok(map)
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| Error::transport(code::BAD_FUNCTION_ARGUMENT, err.to_string()))
}

fn parse_header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| Error::transport(code::BAD_FUNCTION_ARGUMENT, err.to_string()))
}

fn client_fingerprint(transfer: &Transfer) -> u64 {
    let mut hasher = std::hash::DefaultHasher::new();
    transfer.connect_timeout.hash(&mut hasher);
    transfer.follow_redirects.hash(&mut hasher);
    transfer.max_redirects.hash(&mut hasher);
    transfer.verify_ssl.hash(&mut hasher);
    transfer.ca_info.hash(&mut hasher);
    transfer.client_cert.hash(&mut hasher);
    transfer.client_key.hash(&mut hasher);
    if let Some(proxy) = &transfer.proxy {
        proxy.url.hash(&mut hasher);
        proxy.kind.map(|kind| kind as u8).hash(&mut hasher);
        if let Some(auth) = &proxy.auth {
            auth.username().hash(&mut hasher);
            auth.password().hash(&mut hasher);
        }
    }
    hasher.finish()
}

fn build_client(transfer: &Transfer) -> Result<Client> {
    let mut builder = Client::builder();

    if let Some(timeout) = transfer.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    builder = builder.redirect(if transfer.follow_redirects {
        redirect::Policy::limited(transfer.max_redirects.unwrap_or(10) as usize)
    } else {
        redirect::Policy::none()
    });
    if !transfer.verify_ssl {
        builder = builder.danger_accept_invalid_certs(true);
    }
    // Note: a CA *directory* (`ca_path`) cannot be expressed here; only the
    // bundle file is honored.
    if let Some(bundle) = &transfer.ca_info {
        let pem = std::fs::read(bundle)
            .map_err(|err| Error::transport(code::READ_ERROR, err.to_string()))?;
        let certificate = reqwest::Certificate::from_pem(&pem)
            .map_err(|err| Error::transport(code::SSL_CONNECT_ERROR, err.to_string()))?;
        builder = builder.add_root_certificate(certificate);
    }
    if let (Some(cert), Some(key)) = (&transfer.client_cert, &transfer.client_key) {
        let mut pem = std::fs::read(key)
            .map_err(|err| Error::transport(code::READ_ERROR, err.to_string()))?;
        let cert_pem = std::fs::read(cert)
            .map_err(|err| Error::transport(code::READ_ERROR, err.to_string()))?;
        pem.extend_from_slice(&cert_pem);
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|err| Error::transport(code::SSL_CONNECT_ERROR, err.to_string()))?;
        builder = builder.identity(identity);
    }
    if let Some(proxy) = &transfer.proxy {
        builder = builder.proxy(build_proxy(proxy)?);
    }
    // The low-speed abort (`low_speed_limit`/`low_speed_time`) has no
    // counterpart in this backend; the total timeout is the only watchdog.

    builder
        .build()
        .map_err(|err| Error::transport(code::FAILED_INIT, err.to_string()))
}

fn build_proxy(config: &ProxyConfig) -> Result<reqwest::Proxy> {
    let url = if config.url.contains("://") {
        config.url.clone()
    } else {
        let scheme = match config.kind {
            Some(ProxyKind::Https) => "https",
            Some(ProxyKind::Socks4) => "socks4",
            Some(ProxyKind::Socks5) => "socks5",
            Some(ProxyKind::Http) | None => "http",
        };
        format!("{scheme}://{}", config.url)
    };

    let mut proxy = reqwest::Proxy::all(url)
        .map_err(|err| Error::transport(code::COULDNT_RESOLVE_HOST, err.to_string()))?;
    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(auth.username(), auth.password());
    }
    Ok(proxy)
}

fn build_form(form: &MultipartForm) -> Result<multipart::Form> {
    let mut encoded = multipart::Form::new();

    for part in form.parts() {
        let mut piece = match part.body() {
            PartBody::Text(text) => multipart::Part::text(text.clone()),
            PartBody::Bytes(bytes) => multipart::Part::bytes(bytes.clone()),
            PartBody::File(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|err| Error::transport(code::READ_ERROR, err.to_string()))?;
                multipart::Part::reader(file)
            }
        };
        if let Some(filename) = part.filename() {
            piece = piece.file_name(filename.to_string());
        }
        if let Some(content_type) = part.content_type() {
            piece = piece
                .mime_str(content_type)
                .map_err(|err| Error::transport(code::BAD_FUNCTION_ARGUMENT, err.to_string()))?;
        }
        encoded = encoded.part(part.name().to_string(), piece);
    }

    Ok(encoded)
}

fn map_transfer_error(err: reqwest::Error) -> Error {
    let code = if err.is_timeout() {
        code::OPERATION_TIMEDOUT
    } else if err.is_connect() {
        code::COULDNT_CONNECT
    } else if err.is_builder() {
        code::URL_MALFORMAT
    } else if err.is_request() {
        code::SEND_ERROR
    } else {
        code::RECV_ERROR
    };
    Error::transport(code, err.to_string())
}

/// In-flight state for the worker-thread multi driver.
pub struct HttpMulti {
    queued: Vec<(TransferId, HttpHandle, Transfer)>,
    in_flight: usize,
    ready: VecDeque<Completion>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    next_id: u64,
}

impl HttpMulti {
    /// Moves every completion that already arrived into the ready queue.
    fn collect(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.in_flight -= 1;
            self.ready.push_back(completion);
        }
    }
}

impl MultiTransport for HttpTransport {
    type Multi = HttpMulti;

    fn open_multi(&self) -> Result<HttpMulti> {
        let (completions_tx, completions_rx) = channel();
        Ok(HttpMulti {
            queued: Vec::new(),
            in_flight: 0,
            ready: VecDeque::new(),
            completions_tx,
            completions_rx,
            next_id: 1,
        })
    }

    fn add(
        &self,
        multi: &mut HttpMulti,
        handle: HttpHandle,
        transfer: Transfer,
    ) -> Result<TransferId> {
        let id = TransferId(multi.next_id);
        multi.next_id += 1;
        multi.queued.push((id, handle, transfer));
        Ok(id)
    }

    fn step(&self, multi: &mut HttpMulti) -> Result<usize> {
        for (id, mut handle, transfer) in multi.queued.drain(..) {
            let tx = multi.completions_tx.clone();
            multi.in_flight += 1;
            thread::spawn(move || {
                let mut sink = CollectSink::default();
                let result = run_transfer(&mut handle, &transfer, &mut sink).map(|status| {
                    RawReply {
                        status,
                        headers: sink.headers,
                        body: sink.body,
                    }
                });
                // The receiver disappearing just means nobody wants the
                // result any more.
                let _ = tx.send(Completion { id, result });
            });
        }

        multi.collect();
        Ok(multi.in_flight)
    }

    fn wait(&self, multi: &mut HttpMulti, timeout: Duration) -> Result<()> {
        if !multi.ready.is_empty() || multi.in_flight == 0 {
            return Ok(());
        }
        match multi.completions_rx.recv_timeout(timeout) {
            Ok(completion) => {
                multi.in_flight -= 1;
                multi.ready.push_back(completion);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => Ok(()),
        }
    }

    fn drain(&self, multi: &mut HttpMulti) -> Vec<Completion> {
        multi.collect();
        multi.ready.drain(..).collect()
    }
}

#[derive(Default)]
struct CollectSink {
    body: Vec<u8>,
    headers: Headers,
}

impl TransferSink for CollectSink {
    fn write_body(&mut self, chunk: &[u8]) -> Result<()> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_get_distinct_ids() {
        let transport = HttpTransport::new();
        let a = transport.open().unwrap();
        let b = transport.open().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn fingerprint_tracks_client_level_options_only() {
        let base = Transfer::from_request(
            &crate::Request::new().url("http://example.com"),
        )
        .unwrap();

        let mut same = base.clone();
        same.body = b"different body".to_vec();
        assert_eq!(client_fingerprint(&base), client_fingerprint(&same));

        let mut different = base.clone();
        different.verify_ssl = false;
        assert_ne!(client_fingerprint(&base), client_fingerprint(&different));
    }

    #[test]
    fn proxy_urls_get_a_scheme_from_the_kind() {
        let config = ProxyConfig {
            url: "proxy.local:1080".to_string(),
            kind: Some(ProxyKind::Socks5),
            auth: None,
        };
        // Building succeeds only if the URL parsed with the socks scheme.
        assert!(build_proxy(&config).is_ok());
    }
}
