use tracing::{Level, event};

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// Hooks that surround every transfer a session performs.
///
/// Session-level interceptors run before per-request ones, each group in
/// registration order. Returning an error from either hook aborts the call
/// immediately; the retry machinery only applies to transport failures.
///
/// Interceptors are shared via `Arc`, so one instance may be installed on
/// several sessions and requests at once.
pub trait Interceptor: Send + Sync {
    /// Called before the transfer is handed to the transport.
    fn before_request(&self, request: &Request) -> Result<()> {
        let _ = request;
        Ok(())
    }

    /// Called after the response has been assembled and the cookie jar
    /// (if any) has been updated.
    fn after_response(&self, request: &Request, response: &Response) -> Result<()> {
        let _ = (request, response);
        Ok(())
    }
}

/// Emits a `tracing` record for each request and response that passes
/// through, with a short body preview.
#[derive(Debug, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }

    fn preview(body: &[u8]) -> String {
        let cut = body.len().min(100);
        let mut text = String::from_utf8_lossy(&body[..cut]).into_owned();
        if body.len() > 100 {
            text.push_str("...");
        }
        text
    }
}

impl Interceptor for LoggingInterceptor {
    fn before_request(&self, request: &Request) -> Result<()> {
        event!(
            Level::DEBUG,
            method = %request.get_method(),
            url = request.get_url(),
            headers = request.get_headers().len(),
            body = %Self::preview(request.get_body()),
            "request"
        );
        Ok(())
    }

    fn after_response(&self, request: &Request, response: &Response) -> Result<()> {
        event!(
            Level::DEBUG,
            url = request.get_url(),
            status = response.status(),
            body = %Self::preview(response.body()),
            "response"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;

    #[test]
    fn default_hooks_are_no_ops() {
        struct Passive;
        impl Interceptor for Passive {}

        let request = Request::new().url("http://example.com");
        let response = Response::new(200, Vec::new(), Headers::new());

        let interceptor = Passive;
        assert!(interceptor.before_request(&request).is_ok());
        assert!(interceptor.after_response(&request, &response).is_ok());
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = vec![b'x'; 200];
        let preview = LoggingInterceptor::preview(&body);
        assert_eq!(preview.len(), 103);
        assert!(preview.ends_with("..."));
    }
}
