use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose};
use secrecy::{ExposeSecret, SecretString};

use crate::cookie::{Cookie, CookieJar};
use crate::headers::Headers;
use crate::interceptor::Interceptor;
use crate::multipart::MultipartForm;

/// The HTTP methods the engine knows how to issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferred protocol version for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http11,
    Http2,
    Http3,
}

/// The proxy protocol to speak when a proxy URL is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Http,
    Https,
    Socks4,
    Socks5,
}

/// A username/password pair for basic or proxy authentication.
///
/// The password is held behind [`SecretString`] so it never shows up in
/// debug output or log records.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Renders the pair as an `Authorization: Basic ...` header value.
    pub fn basic_auth(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password.expose_secret());
        format!("Basic {}", general_purpose::STANDARD.encode(pair))
    }
}

/// A buildable description of one HTTP call.
///
/// Every setter consumes and returns the request so calls chain fluently:
///
/// ```
/// use httpkit::{Method, Request};
/// use std::time::Duration;
///
/// let request = Request::new()
///     .method(Method::Post)
///     .url("https://api.example.com/items")
///     .header("Content-Type", "application/json")
///     .body(br#"{"name":"widget"}"#.to_vec())
///     .timeout(Duration::from_secs(30))
///     .retries(2)
///     .retry_on_error(true);
/// # let _ = request;
/// ```
///
/// Once handed to a [`Session`](crate::Session) or
/// [`MultiSession`](crate::MultiSession) the request is treated as
/// immutable input. Setters never validate; validation happens when the
/// session resolves the request into a transfer.
#[derive(Clone)]
pub struct Request {
    url: String,
    method: Method,
    headers: Headers,
    body: Vec<u8>,
    timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
    follow_redirects: bool,
    max_redirects: Option<u32>,
    verify_ssl: bool,
    ca_path: Option<PathBuf>,
    ca_info: Option<PathBuf>,
    client_cert: Option<PathBuf>,
    client_key: Option<PathBuf>,
    proxy: Option<String>,
    proxy_kind: Option<ProxyKind>,
    proxy_auth: Option<Credentials>,
    basic_auth: Option<Credentials>,
    form: Option<Arc<MultipartForm>>,
    cookies: Vec<Cookie>,
    cookie_jar: Option<Arc<CookieJar>>,
    user_agent: Option<String>,
    accept_encoding: Option<String>,
    low_speed_limit: Option<u32>,
    low_speed_time: Option<Duration>,
    resume_from: Option<u64>,
    http_version: Option<HttpVersion>,
    retries: u32,
    retry_delay: Duration,
    retry_on_error: bool,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: Method::Get,
            headers: Headers::new(),
            body: Vec::new(),
            timeout: None,
            connection_timeout: None,
            follow_redirects: true,
            max_redirects: None,
            verify_ssl: true,
            ca_path: None,
            ca_info: None,
            client_cert: None,
            client_key: None,
            proxy: None,
            proxy_kind: None,
            proxy_auth: None,
            basic_auth: None,
            form: None,
            cookies: Vec::new(),
            cookie_jar: None,
            user_agent: None,
            accept_encoding: None,
            low_speed_limit: None,
            low_speed_time: None,
            resume_from: None,
            http_version: None,
            retries: 0,
            retry_delay: Duration::from_secs(1),
            retry_on_error: false,
            interceptors: Vec::new(),
        }
    }
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the whole header map.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Total time budget for the transfer, including the response body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    pub fn ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    pub fn ca_info(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_info = Some(path.into());
        self
    }

    /// Client certificate and private key for mutual TLS. The transport only
    /// honors the pair when both files are present.
    pub fn client_cert(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn proxy_type(mut self, kind: ProxyKind) -> Self {
        self.proxy_kind = Some(kind);
        self
    }

    pub fn proxy_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.proxy_auth = Some(Credentials::new(username, password));
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some(Credentials::new(username, password));
        self
    }

    /// Installs an `Authorization: Bearer <token>` header.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Attaches a multipart form as the request body. The form is shared
    /// with the transport for the duration of the transfer.
    pub fn multipart_form(mut self, form: MultipartForm) -> Self {
        self.form = Some(Arc::new(form));
        self
    }

    /// Adds a cookie sent with this request only.
    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Jar that receives `Set-Cookie` headers from the response.
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn accept_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.accept_encoding = Some(encoding.into());
        self
    }

    /// Abort the transfer when fewer than `limit` bytes/s flow for the
    /// configured [`low_speed_time`](Self::low_speed_time).
    pub fn low_speed_limit(mut self, limit: u32) -> Self {
        self.low_speed_limit = Some(limit);
        self
    }

    pub fn low_speed_time(mut self, time: Duration) -> Self {
        self.low_speed_time = Some(time);
        self
    }

    /// Byte offset to resume the transfer from (`Range` on the wire).
    pub fn resume_from(mut self, offset: u64) -> Self {
        self.resume_from = Some(offset);
        self
    }

    pub fn http_version(mut self, version: HttpVersion) -> Self {
        self.http_version = Some(version);
        self
    }

    pub fn http2(mut self, enabled: bool) -> Self {
        self.http_version = Some(if enabled {
            HttpVersion::Http2
        } else {
            HttpVersion::Http11
        });
        self
    }

    pub fn http3(mut self, enabled: bool) -> Self {
        self.http_version = Some(if enabled {
            HttpVersion::Http3
        } else {
            HttpVersion::Http11
        });
        self
    }

    /// How many times to retry after a transport failure. `0` disables
    /// retrying regardless of [`retry_on_error`](Self::retry_on_error).
    pub fn retries(mut self, count: u32) -> Self {
        self.retries = count;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn retry_on_error(mut self, retry: bool) -> Self {
        self.retry_on_error = retry;
        self
    }

    /// Adds a per-request interceptor, run after the session's own.
    pub fn add_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn get_url(&self) -> &str {
        &self.url
    }

    pub fn get_method(&self) -> Method {
        self.method
    }

    pub fn get_headers(&self) -> &Headers {
        &self.headers
    }

    pub fn get_body(&self) -> &[u8] {
        &self.body
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout
    }

    pub fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn get_max_redirects(&self) -> Option<u32> {
        self.max_redirects
    }

    pub fn verifies_ssl(&self) -> bool {
        self.verify_ssl
    }

    pub fn get_ca_path(&self) -> Option<&Path> {
        self.ca_path.as_deref()
    }

    pub fn get_ca_info(&self) -> Option<&Path> {
        self.ca_info.as_deref()
    }

    pub fn get_client_cert(&self) -> Option<&Path> {
        self.client_cert.as_deref()
    }

    pub fn get_client_key(&self) -> Option<&Path> {
        self.client_key.as_deref()
    }

    pub fn get_proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn get_proxy_kind(&self) -> Option<ProxyKind> {
        self.proxy_kind
    }

    pub fn get_proxy_auth(&self) -> Option<&Credentials> {
        self.proxy_auth.as_ref()
    }

    pub fn get_basic_auth(&self) -> Option<&Credentials> {
        self.basic_auth.as_ref()
    }

    pub fn get_form(&self) -> Option<&Arc<MultipartForm>> {
        self.form.as_ref()
    }

    pub fn get_cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn get_cookie_jar(&self) -> Option<&Arc<CookieJar>> {
        self.cookie_jar.as_ref()
    }

    pub fn get_user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn get_accept_encoding(&self) -> Option<&str> {
        self.accept_encoding.as_deref()
    }

    pub fn get_low_speed_limit(&self) -> Option<u32> {
        self.low_speed_limit
    }

    pub fn get_low_speed_time(&self) -> Option<Duration> {
        self.low_speed_time
    }

    pub fn get_resume_from(&self) -> Option<u64> {
        self.resume_from
    }

    pub fn get_http_version(&self) -> Option<HttpVersion> {
        self.http_version
    }

    pub fn get_retries(&self) -> u32 {
        self.retries
    }

    pub fn get_retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn retries_on_error(&self) -> bool {
        self.retry_on_error
    }

    pub fn get_interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}
