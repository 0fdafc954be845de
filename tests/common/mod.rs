//! A scripted transport: replies are queued up front, every transfer that
//! reaches the transport is recorded for assertions.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpkit::transport::{
    Completion, MultiTransport, RawReply, Transfer, TransferId, TransferSink, Transport,
};
use httpkit::{Error, Headers, Result};

pub enum Outcome {
    Reply {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Fail {
        code: i32,
        message: String,
    },
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Outcome>,
    performed: Vec<Transfer>,
    opened: u64,
}

/// Shared scripted transport; clone the `Arc` freely.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    next_handle: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a successful reply for the next transfer.
    pub fn push_reply(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        self.state.lock().unwrap().script.push_back(Outcome::Reply {
            status,
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: body.to_vec(),
        });
    }

    /// Queues a transport failure for the next transfer.
    pub fn push_failure(&self, code: i32, message: &str) {
        self.state.lock().unwrap().script.push_back(Outcome::Fail {
            code,
            message: message.to_string(),
        });
    }

    /// Every transfer the transport has executed, in order.
    pub fn performed(&self) -> Vec<Transfer> {
        self.state.lock().unwrap().performed.clone()
    }

    pub fn perform_count(&self) -> usize {
        self.state.lock().unwrap().performed.len()
    }

    pub fn open_count(&self) -> u64 {
        self.state.lock().unwrap().opened
    }

    fn next_outcome(&self, transfer: &Transfer) -> Option<Outcome> {
        let mut state = self.state.lock().unwrap();
        state.performed.push(transfer.clone());
        state.script.pop_front()
    }
}

pub struct MockHandle {
    pub id: u64,
}

impl Transport for MockTransport {
    type Handle = MockHandle;

    fn open(&self) -> Result<MockHandle> {
        self.state.lock().unwrap().opened += 1;
        Ok(MockHandle {
            id: self.next_handle.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn reset(&self, _handle: &mut MockHandle) {}

    fn perform(
        &self,
        _handle: &mut MockHandle,
        transfer: &Transfer,
        sink: &mut dyn TransferSink,
    ) -> Result<u16> {
        match self.next_outcome(transfer) {
            Some(Outcome::Reply {
                status,
                headers,
                body,
            }) => {
                for (name, value) in &headers {
                    sink.write_header(name, value);
                }
                sink.write_body(&body)?;
                let len = body.len() as u64;
                if !sink.progress(len, len, 0, 0) {
                    return Err(Error::transport(42, "aborted by progress callback"));
                }
                Ok(status)
            }
            Some(Outcome::Fail { code, message }) => Err(Error::transport(code, message)),
            None => panic!("transport called with an empty script"),
        }
    }
}

#[derive(Default)]
pub struct MockMulti {
    queued: Vec<(TransferId, Transfer)>,
    done: Vec<Completion>,
    next_id: u64,
}

impl MultiTransport for MockTransport {
    type Multi = MockMulti;

    fn open_multi(&self) -> Result<MockMulti> {
        Ok(MockMulti {
            next_id: 1,
            ..MockMulti::default()
        })
    }

    fn add(
        &self,
        multi: &mut MockMulti,
        _handle: MockHandle,
        transfer: Transfer,
    ) -> Result<TransferId> {
        let id = TransferId(multi.next_id);
        multi.next_id += 1;
        multi.queued.push((id, transfer));
        Ok(id)
    }

    /// Runs every queued transfer synchronously; nothing is ever left
    /// running afterwards.
    fn step(&self, multi: &mut MockMulti) -> Result<usize> {
        for (id, transfer) in multi.queued.drain(..) {
            let result = match self.next_outcome(&transfer) {
                Some(Outcome::Reply {
                    status,
                    headers,
                    body,
                }) => Ok(RawReply {
                    status,
                    headers: headers.into_iter().collect::<Headers>(),
                    body,
                }),
                Some(Outcome::Fail { code, message }) => Err(Error::transport(code, message)),
                None => panic!("multi transport called with an empty script"),
            };
            multi.done.push(Completion { id, result });
        }
        Ok(0)
    }

    fn wait(&self, _multi: &mut MockMulti, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn drain(&self, multi: &mut MockMulti) -> Vec<Completion> {
        std::mem::take(&mut multi.done)
    }
}
