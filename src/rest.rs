//! Base-URL REST client plus module-level one-liners.

use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;

use crate::cache::Cache;
use crate::error::Result;
use crate::interceptor::LoggingInterceptor;
use crate::rate_limit::RateLimiter;
use crate::request::{Method, Request};
use crate::response::Response;
use crate::session::Session;
use crate::transport::Transport;

/// Tunables for a [`RestClient`].
///
/// ```
/// use httpkit::RestClientConfigBuilder;
///
/// let config = RestClientConfigBuilder::default()
///     .base_url("https://api.example.com")
///     .requests_per_second(25.0)
///     .build()
///     .unwrap();
/// # let _ = config;
/// ```
#[derive(Builder, Debug, Clone)]
pub struct RestClientConfig {
    /// Requests are issued relative to this URL.
    #[builder(setter(into))]
    base_url: String,

    /// Rate applied to every request through the client.
    #[builder(default = "10.0")]
    requests_per_second: f64,

    /// How long cached GET responses stay fresh.
    #[builder(default = "Duration::from_secs(300)")]
    cache_ttl: Duration,

    /// `User-Agent` sent with every request.
    #[builder(default)]
    user_agent: Option<String>,
}

impl RestClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            requests_per_second: 10.0,
            cache_ttl: Duration::from_secs(300),
            user_agent: None,
        }
    }
}

/// A convenience client for one REST API: caching, rate limiting, request
/// logging and default headers around a single [`Session`].
pub struct RestClient<T: Transport> {
    base_url: String,
    session: Session<T>,
    default_headers: Vec<(String, String)>,
    cache: Arc<Cache>,
    limiter: Arc<RateLimiter>,
    user_agent: Option<String>,
}

impl<T: Transport> RestClient<T> {
    pub fn with_transport(transport: Arc<T>, config: RestClientConfig) -> Result<Self> {
        let cache = Arc::new(Cache::new(config.cache_ttl));
        let limiter = Arc::new(RateLimiter::new(config.requests_per_second));

        let mut session = Session::with_transport(transport)?;
        session.set_cache(cache.clone());
        session.set_rate_limiter(limiter.clone());
        session.add_interceptor(Arc::new(LoggingInterceptor::new()));

        Ok(Self {
            base_url: config.base_url,
            session,
            default_headers: Vec::new(),
            cache,
            limiter,
            user_agent: config.user_agent,
        })
    }

    pub fn get(&mut self, path: &str) -> Result<Response> {
        let request = self.base_request(Method::Get, path);
        self.session.execute(&request)
    }

    pub fn get_with_params<I, K, V>(&mut self, path: &str, params: I) -> Result<Response>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let query: Vec<(String, String)> = params
            .into_iter()
            .map(|(key, value)| (key.as_ref().to_string(), value.as_ref().to_string()))
            .collect();
        let url = crate::session::append_query(&self.join_url(path), query);
        let request = self.request_for(Method::Get, url);
        self.session.execute(&request)
    }

    pub fn post(&mut self, path: &str, json: &str) -> Result<Response> {
        let request = self
            .base_request(Method::Post, path)
            .body(json.as_bytes().to_vec())
            .header("Content-Type", "application/json");
        self.session.execute(&request)
    }

    pub fn put(&mut self, path: &str, json: &str) -> Result<Response> {
        let request = self
            .base_request(Method::Put, path)
            .body(json.as_bytes().to_vec())
            .header("Content-Type", "application/json");
        self.session.execute(&request)
    }

    pub fn del(&mut self, path: &str) -> Result<Response> {
        let request = self.base_request(Method::Delete, path);
        self.session.execute(&request)
    }

    /// Sets a header sent with every request, replacing a previous default
    /// of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .default_headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.default_headers.push((name, value)),
        }
    }

    /// Shorthand for a default `Authorization: Bearer <token>` header.
    pub fn set_auth_token(&mut self, token: impl AsRef<str>) {
        self.set_header("Authorization", format!("Bearer {}", token.as_ref()));
    }

    pub fn set_rate_limit(&mut self, requests_per_second: f64) {
        self.limiter.set_rate(requests_per_second);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// The underlying session, for anything the convenience surface does
    /// not cover.
    pub fn session(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    fn base_request(&self, method: Method, path: &str) -> Request {
        self.request_for(method, self.join_url(path))
    }

    fn request_for(&self, method: Method, url: String) -> Request {
        let mut request = Request::new().method(method).url(url);
        if let Some(agent) = &self.user_agent {
            request = request.user_agent(agent);
        }
        for (name, value) in &self.default_headers {
            request = request.header(name, value);
        }
        request
    }

    fn join_url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Joins a base URL and a path with exactly one `/` between them; an empty
/// path yields the base URL verbatim.
fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

#[cfg(feature = "reqwest")]
mod default_backend {
    use std::cell::RefCell;

    use super::*;
    use crate::backend::{HttpTransport, default_transport};
    use crate::error::Error;
    use crate::transport::code;

    impl RestClient<HttpTransport> {
        /// A client on the shared default transport with stock settings:
        /// 10 requests/second and a five minute cache TTL.
        pub fn new(base_url: impl Into<String>) -> Result<Self> {
            Self::with_config(RestClientConfig::new(base_url))
        }

        pub fn with_config(config: RestClientConfig) -> Result<Self> {
            Self::with_transport(default_transport(), config)
        }
    }

    thread_local! {
        // One session per thread so the module-level helpers never contend
        // on a shared handle. Built on first use, dropped at thread exit.
        static LOCAL_SESSION: RefCell<Option<Session<HttpTransport>>> =
            const { RefCell::new(None) };
    }

    fn with_local_session<R>(
        f: impl FnOnce(&mut Session<HttpTransport>) -> Result<R>,
    ) -> Result<R> {
        LOCAL_SESSION.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                *slot = Some(Session::new()?);
            }
            match slot.as_mut() {
                Some(session) => f(session),
                None => Err(Error::transport(
                    code::FAILED_INIT,
                    "thread-local session unavailable",
                )),
            }
        })
    }

    /// GET through this thread's session.
    pub fn get(url: &str) -> Result<Response> {
        with_local_session(|session| session.get(url))
    }

    /// POST through this thread's session.
    pub fn post(url: &str, body: &str, content_type: &str) -> Result<Response> {
        with_local_session(|session| session.post(url, body.as_bytes().to_vec(), content_type))
    }

    /// PUT through this thread's session.
    pub fn put(url: &str, body: &str, content_type: &str) -> Result<Response> {
        with_local_session(|session| session.put(url, body.as_bytes().to_vec(), content_type))
    }

    /// DELETE through this thread's session.
    pub fn del(url: &str) -> Result<Response> {
        with_local_session(|session| session.del(url))
    }

    /// Executes a request and hands the outcome to one of the two
    /// callbacks instead of returning it.
    pub fn fetch<S, E>(request: &Request, on_success: S, on_error: E)
    where
        S: FnOnce(Response),
        E: FnOnce(&Error),
    {
        match with_local_session(|session| session.execute(request)) {
            Ok(response) => on_success(response),
            Err(err) => on_error(&err),
        }
    }
}

#[cfg(feature = "reqwest")]
pub use default_backend::{del, fetch, get, post, put};
