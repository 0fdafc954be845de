//! A blocking HTTP client engine with response caching, connection reuse,
//! rate limiting, cookies, interceptors and concurrent multi-transfer
//! execution.
//!
//! The pipeline for one call runs: cache lookup → rate limit → interceptor
//! hooks → transport → cookie jar update → cache maintenance. Everything is
//! generic over the [`Transport`] seam; the default backend (cargo feature
//! `reqwest`, enabled by default) drives `reqwest`'s blocking client.
//!
//! ```no_run
//! use httpkit::Session;
//!
//! # fn main() -> httpkit::Result<()> {
//! let mut session = Session::new()?;
//! let response = session.get("https://example.com")?;
//! println!("{} {}", response.status(), response.text());
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "reqwest")]
pub mod backend;
pub mod cache;
pub mod cookie;
pub mod error;
pub mod headers;
pub mod interceptor;
pub mod multi;
pub mod multipart;
pub mod pool;
pub mod rate_limit;
pub mod request;
pub mod response;
pub mod rest;
pub mod session;
pub mod transport;

#[cfg(feature = "reqwest")]
pub use backend::HttpTransport;
pub use cache::Cache;
pub use cookie::{Cookie, CookieJar};
pub use error::{Error, Result};
pub use headers::Headers;
pub use interceptor::{Interceptor, LoggingInterceptor};
pub use multi::MultiSession;
pub use multipart::{MultipartForm, Part, PartBody};
pub use pool::{ConnectionPool, SessionPool};
pub use rate_limit::RateLimiter;
pub use request::{Credentials, HttpVersion, Method, ProxyKind, Request};
pub use response::Response;
#[cfg(feature = "reqwest")]
pub use rest::{del, fetch, get, post, put};
pub use rest::{RestClient, RestClientConfig, RestClientConfigBuilder};
pub use session::{PendingResponse, Session};
pub use transport::{MultiTransport, Transport, url_decode, url_encode};
