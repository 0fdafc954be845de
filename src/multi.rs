//! Concurrent execution of many requests through the transport's multi
//! interface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, event};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{MultiTransport, Transfer, TransferId};

type SuccessFn = Box<dyn FnOnce(Response) + Send>;
type ErrorFn = Box<dyn FnOnce(&Error) + Send>;

struct RequestContext {
    request: Request,
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
}

/// Fans a batch of requests out over the transport and dispatches each
/// completion to its callbacks.
///
/// Requests are set up exactly like a [`Session`](crate::Session) would,
/// minus caching and rate limiting, which the multi path does not have.
/// Completion callbacks run on the thread calling [`perform`](Self::perform),
/// in transport completion order, not in the order requests were added.
/// One failing transfer never aborts its siblings. Back-pressure is the
/// caller's job: nothing stops you from adding more requests than is wise.
pub struct MultiSession<T: MultiTransport> {
    transport: Arc<T>,
    multi: T::Multi,
    contexts: HashMap<TransferId, RequestContext>,
}

impl<T: MultiTransport> MultiSession<T> {
    pub fn with_transport(transport: Arc<T>) -> Result<Self> {
        let multi = transport.open_multi()?;
        Ok(Self {
            transport,
            multi,
            contexts: HashMap::new(),
        })
    }

    /// Queues a request. `on_success` receives the response when the
    /// transfer completes; `on_error` receives the failure. The transfer
    /// does not start until [`perform`](Self::perform) runs.
    pub fn add_request<S, E>(
        &mut self,
        request: Request,
        on_success: S,
        on_error: E,
    ) -> Result<TransferId>
    where
        S: FnOnce(Response) + Send + 'static,
        E: FnOnce(&Error) + Send + 'static,
    {
        let handle = self.transport.open()?;
        let transfer = Transfer::from_request(&request)?;

        // `add` consumes the handle either way; a rejected transfer is
        // destroyed by the transport.
        let id = self.transport.add(&mut self.multi, handle, transfer)?;

        self.contexts.insert(
            id,
            RequestContext {
                request,
                on_success: Some(Box::new(on_success)),
                on_error: Some(Box::new(on_error)),
            },
        );
        Ok(id)
    }

    /// Drives every queued transfer to completion, blocking until the last
    /// one finishes. Callbacks fire from this thread as transfers drain.
    pub fn perform(&mut self) -> Result<()> {
        let mut running = self.transport.step(&mut self.multi)?;

        while running > 0 {
            self.transport
                .wait(&mut self.multi, Duration::from_secs(1))?;
            running = self.transport.step(&mut self.multi)?;
            self.dispatch_completions();
        }

        self.dispatch_completions();
        Ok(())
    }

    /// How many transfers are queued or in flight.
    pub fn pending(&self) -> usize {
        self.contexts.len()
    }

    fn dispatch_completions(&mut self) {
        for completion in self.transport.drain(&mut self.multi) {
            let Some(mut context) = self.contexts.remove(&completion.id) else {
                continue;
            };

            match completion.result {
                Ok(reply) => {
                    event!(
                        Level::DEBUG,
                        url = context.request.get_url(),
                        status = reply.status,
                        "transfer completed"
                    );
                    if let Some(callback) = context.on_success.take() {
                        callback(Response::new(reply.status, reply.body, reply.headers));
                    }
                }
                Err(err) => {
                    event!(
                        Level::WARN,
                        url = context.request.get_url(),
                        error = %err,
                        "transfer failed"
                    );
                    if let Some(callback) = context.on_error.take() {
                        callback(&err);
                    }
                }
            }
        }
    }
}

#[cfg(feature = "reqwest")]
impl MultiSession<crate::backend::HttpTransport> {
    /// A multi session on the shared default transport.
    pub fn new() -> Result<Self> {
        Self::with_transport(crate::backend::default_transport())
    }
}
