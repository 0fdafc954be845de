//! The single-request execution pipeline.
//!
//! A [`Session`] owns one transport handle (its own, or one borrowed from a
//! [`ConnectionPool`]) and drives requests through the full pipeline:
//! cache lookup, rate limiting, interceptors, the transport call, cookie
//! installation and cache maintenance. A session is externally
//! single-threaded; share work across threads with more sessions, a
//! [`SessionPool`](crate::SessionPool) or a
//! [`MultiSession`](crate::MultiSession).

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{Level, event};

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::interceptor::Interceptor;
use crate::multipart::MultipartForm;
use crate::pool::ConnectionPool;
use crate::rate_limit::RateLimiter;
use crate::request::{Method, Request};
use crate::response::Response;
use crate::transport::{self, Transfer, TransferSink, Transport, code, url_encode};

type ProgressFn = Box<dyn FnMut(u64, u64, u64, u64) -> bool + Send>;

/// Executes one request at a time against a transport.
pub struct Session<T: Transport> {
    transport: Arc<T>,
    handle: Option<T::Handle>,
    pool: Option<Arc<ConnectionPool<T>>>,
    cache: Option<Arc<Cache>>,
    limiter: Option<Arc<RateLimiter>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    // Scratch space reused across transfers.
    body_buf: Vec<u8>,
    header_buf: Headers,
    progress: Option<ProgressFn>,
}

impl<T: Transport> Session<T> {
    /// A session owning a freshly opened handle on `transport`.
    pub fn with_transport(transport: Arc<T>) -> Result<Self> {
        let handle = transport.open()?;
        Ok(Self {
            transport,
            handle: Some(handle),
            pool: None,
            cache: None,
            limiter: None,
            interceptors: Vec::new(),
            body_buf: Vec::new(),
            header_buf: Headers::new(),
            progress: None,
        })
    }

    /// A session whose handle is borrowed from `pool` and returned to it
    /// when the session is dropped.
    pub fn with_pool(pool: Arc<ConnectionPool<T>>) -> Result<Self> {
        let handle = pool.acquire()?;
        let transport = pool.transport().clone();
        Ok(Self {
            transport,
            handle: Some(handle),
            pool: Some(pool),
            cache: None,
            limiter: None,
            interceptors: Vec::new(),
            body_buf: Vec::new(),
            header_buf: Headers::new(),
            progress: None,
        })
    }

    /// Session-level interceptors run before per-request ones, in the
    /// order they were added.
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Serve and maintain GET responses through this cache.
    pub fn set_cache(&mut self, cache: Arc<Cache>) {
        self.cache = Some(cache);
    }

    /// Pace logical requests (not individual retries) through this limiter.
    pub fn set_rate_limiter(&mut self, limiter: Arc<RateLimiter>) {
        self.limiter = Some(limiter);
    }

    /// Called with `(dl_total, dl_now, ul_total, ul_now)` while a transfer
    /// runs; returning `false` aborts the transfer.
    pub fn set_progress_callback(
        &mut self,
        callback: impl FnMut(u64, u64, u64, u64) -> bool + Send + 'static,
    ) {
        self.progress = Some(Box::new(callback));
    }

    /// Runs the full pipeline for one request.
    ///
    /// For GETs with a cache attached: a fresh cached response short
    /// circuits the transport entirely; otherwise stale validators are
    /// merged into the outgoing headers, a 304 re-arms the cached entry,
    /// and any 2xx refreshes the cache.
    pub fn execute(&mut self, request: &Request) -> Result<Response> {
        let cache = match &self.cache {
            Some(cache) if request.get_method() == Method::Get => cache.clone(),
            _ => return self.execute_internal(request),
        };

        let url = request.get_url();
        if let Some(cached) = cache.get(url) {
            event!(Level::DEBUG, url, "serving cached response");
            return Ok(cached);
        }

        let mut conditional = request.clone();
        for (name, value) in &cache.get_validation_headers(url) {
            conditional = conditional.header(name, value);
        }

        let response = self.execute_internal(&conditional)?;

        if response.status() == 304 {
            cache.handle_not_modified(url);
            if let Some(refreshed) = cache.get(url) {
                return Ok(refreshed);
            }
        } else if response.ok() {
            cache.set(url, &response, None);
        }

        Ok(response)
    }

    /// Executes on a worker thread, leaving this session free. The worker
    /// opens its own handle and inherits the session's cache, limiter and
    /// interceptors.
    pub fn execute_async(&self, request: Request) -> PendingResponse {
        let transport = self.transport.clone();
        let cache = self.cache.clone();
        let limiter = self.limiter.clone();
        let interceptors = self.interceptors.clone();

        PendingResponse {
            worker: thread::spawn(move || {
                let mut session = Session::with_transport(transport)?;
                if let Some(cache) = cache {
                    session.set_cache(cache);
                }
                if let Some(limiter) = limiter {
                    session.set_rate_limiter(limiter);
                }
                for interceptor in interceptors {
                    session.add_interceptor(interceptor);
                }
                session.execute(&request)
            }),
        }
    }

    pub fn get(&mut self, url: &str) -> Result<Response> {
        self.execute(&Request::new().method(Method::Get).url(url))
    }

    /// GET with query parameters appended to the URL, each key and value
    /// percent-encoded.
    pub fn get_with_params<I, K, V>(&mut self, url: &str, params: I) -> Result<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.get(&append_query(url, params))
    }

    pub fn post(
        &mut self,
        url: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> Result<Response> {
        self.execute(
            &Request::new()
                .method(Method::Post)
                .url(url)
                .body(body)
                .header("Content-Type", content_type),
        )
    }

    /// POST with an `application/x-www-form-urlencoded` body built from
    /// the given pairs.
    pub fn post_form<I, K, V>(&mut self, url: &str, params: I) -> Result<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = encode_pairs(params);
        self.post(url, body, "application/x-www-form-urlencoded")
    }

    pub fn post_json(&mut self, url: &str, json: &str) -> Result<Response> {
        self.post(url, json, "application/json")
    }

    pub fn put(
        &mut self,
        url: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> Result<Response> {
        self.execute(
            &Request::new()
                .method(Method::Put)
                .url(url)
                .body(body)
                .header("Content-Type", content_type),
        )
    }

    pub fn del(&mut self, url: &str) -> Result<Response> {
        self.execute(&Request::new().method(Method::Delete).url(url))
    }

    pub fn patch(
        &mut self,
        url: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> Result<Response> {
        self.execute(
            &Request::new()
                .method(Method::Patch)
                .url(url)
                .body(body)
                .header("Content-Type", content_type),
        )
    }

    pub fn head(&mut self, url: &str) -> Result<Response> {
        self.execute(&Request::new().method(Method::Head).url(url))
    }

    pub fn options(&mut self, url: &str) -> Result<Response> {
        self.execute(&Request::new().method(Method::Options).url(url))
    }

    /// Streams the response body straight to `path` instead of memory; the
    /// returned response has an empty body. With `resume_from` the file is
    /// opened for append and the transfer asks the origin for the byte
    /// range starting at that offset.
    ///
    /// Bypasses cache and retry handling; local I/O failures surface as
    /// transport write errors.
    pub fn download(
        &mut self,
        url: &str,
        path: impl AsRef<Path>,
        resume_from: Option<u64>,
    ) -> Result<Response> {
        let path = path.as_ref();

        let mut request = Request::new().method(Method::Get).url(url);
        if let Some(offset) = resume_from {
            request = request.resume_from(offset);
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| write_error(path, &err))?;
            }
        }
        let file = if resume_from.is_some() {
            OpenOptions::new().create(true).append(true).open(path)
        } else {
            File::create(path)
        }
        .map_err(|err| write_error(path, &err))?;

        self.reset();
        let transfer = self.setup_request(&request)?;

        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::transport(code::FAILED_INIT, "session has no handle"))?;
        let status = {
            let mut sink = FileSink {
                file: BufWriter::new(file),
                path,
                headers: &mut self.header_buf,
                progress: self.progress.as_mut(),
            };
            let status = self.transport.perform(handle, &transfer, &mut sink)?;
            sink.file.flush().map_err(|err| write_error(path, &err))?;
            status
        };

        event!(Level::DEBUG, url, path = %path.display(), status, "download finished");
        Ok(Response::new(
            status,
            Vec::new(),
            std::mem::take(&mut self.header_buf),
        ))
    }

    /// Uploads a file as a one-part multipart POST.
    pub fn upload(
        &mut self,
        url: &str,
        path: impl AsRef<Path>,
        field_name: &str,
        resume_from: Option<u64>,
    ) -> Result<Response> {
        let mut form = MultipartForm::new();
        form.add_file(field_name, path.as_ref(), None);

        let mut request = Request::new()
            .method(Method::Post)
            .url(url)
            .multipart_form(form);
        if let Some(offset) = resume_from {
            request = request.resume_from(offset);
        }

        self.execute(&request)
    }

    /// Retry wrapper around one transport round trip. The rate limiter
    /// gates the logical request once, ahead of all attempts; retries wait
    /// a constant `retry_delay` between attempts. Interceptor failures
    /// abort immediately and are never retried.
    fn execute_internal(&mut self, request: &Request) -> Result<Response> {
        if let Some(limiter) = &self.limiter {
            limiter.wait();
        }

        let mut remaining = request.get_retries();
        loop {
            self.reset();
            let transfer = self.setup_request(request)?;

            match self.perform(&transfer) {
                Ok(response) => {
                    if let Some(jar) = request.get_cookie_jar() {
                        let domain = transport::host_of(request.get_url()).unwrap_or_default();
                        jar.parse_cookies_from_headers(response.headers(), &domain);
                    }

                    for interceptor in &self.interceptors {
                        interceptor.after_response(request, &response)?;
                    }
                    for interceptor in request.get_interceptors() {
                        interceptor.after_response(request, &response)?;
                    }

                    return Ok(response);
                }
                Err(err) if request.retries_on_error() && remaining > 0 => {
                    remaining -= 1;
                    event!(
                        Level::WARN,
                        url = request.get_url(),
                        error = %err,
                        remaining,
                        "transfer failed, retrying"
                    );
                    thread::sleep(request.get_retry_delay());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs the before-request hooks and resolves the request into
    /// transport options.
    fn setup_request(&mut self, request: &Request) -> Result<Transfer> {
        for interceptor in &self.interceptors {
            interceptor.before_request(request)?;
        }
        for interceptor in request.get_interceptors() {
            interceptor.before_request(request)?;
        }
        Transfer::from_request(request)
    }

    /// One blocking transport round trip into the scratch buffers.
    fn perform(&mut self, transfer: &Transfer) -> Result<Response> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::transport(code::FAILED_INIT, "session has no handle"))?;

        let status = {
            let mut sink = BufferSink {
                body: &mut self.body_buf,
                headers: &mut self.header_buf,
                progress: self.progress.as_mut(),
            };
            self.transport.perform(handle, transfer, &mut sink)?
        };

        Ok(Response::new(
            status,
            std::mem::take(&mut self.body_buf),
            std::mem::take(&mut self.header_buf),
        ))
    }

    fn reset(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            self.transport.reset(handle);
        }
        self.body_buf.clear();
        self.header_buf.clear();
    }
}

#[cfg(feature = "reqwest")]
impl Session<crate::backend::HttpTransport> {
    /// A session with its own handle on the shared default transport.
    pub fn new() -> Result<Self> {
        Self::with_transport(crate::backend::default_transport())
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let (Some(handle), Some(pool)) = (self.handle.take(), &self.pool) {
            pool.release(handle);
        }
    }
}

/// A response being produced on a worker thread by
/// [`Session::execute_async`].
pub struct PendingResponse {
    worker: JoinHandle<Result<Response>>,
}

impl PendingResponse {
    /// Blocks until the worker finishes and yields its result.
    pub fn wait(self) -> Result<Response> {
        self.worker.join().unwrap_or_else(|_| {
            Err(Error::transport(
                code::GOT_NOTHING,
                "request worker thread panicked",
            ))
        })
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

struct BufferSink<'a> {
    body: &'a mut Vec<u8>,
    headers: &'a mut Headers,
    progress: Option<&'a mut ProgressFn>,
}

impl TransferSink for BufferSink<'_> {
    fn write_body(&mut self, chunk: &[u8]) -> Result<()> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    fn progress(&mut self, dl_total: u64, dl_now: u64, ul_total: u64, ul_now: u64) -> bool {
        match self.progress.as_mut() {
            Some(callback) => callback(dl_total, dl_now, ul_total, ul_now),
            None => true,
        }
    }
}

struct FileSink<'a> {
    file: BufWriter<File>,
    path: &'a Path,
    headers: &'a mut Headers,
    progress: Option<&'a mut ProgressFn>,
}

impl TransferSink for FileSink<'_> {
    fn write_body(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .map_err(|err| write_error(self.path, &err))
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.headers.append(name, value);
    }

    fn progress(&mut self, dl_total: u64, dl_now: u64, ul_total: u64, ul_now: u64) -> bool {
        match self.progress.as_mut() {
            Some(callback) => callback(dl_total, dl_now, ul_total, ul_now),
            None => true,
        }
    }
}

fn write_error(path: &Path, err: &std::io::Error) -> Error {
    Error::transport(
        code::WRITE_ERROR,
        format!("{}: {err}", path.display()),
    )
}

pub(crate) fn append_query<I, K, V>(url: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let query = encode_pairs(params);
    if query.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

fn encode_pairs<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .into_iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                url_encode(key.as_ref()),
                url_encode(value.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
