//! Free-lists for transport handles and whole sessions.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::session::Session;
use crate::transport::Transport;

/// A bounded LIFO of reusable transport handles.
///
/// `acquire` hands ownership of a handle out; `release` resets it and takes
/// it back, so a handle is never visible to two owners at once. With
/// `max = 0` the pool degenerates into plain open/drop.
pub struct ConnectionPool<T: Transport> {
    transport: Arc<T>,
    max: usize,
    idle: Mutex<Vec<T::Handle>>,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(transport: Arc<T>, max: usize) -> Self {
        Self {
            transport,
            max,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Pops an idle handle, or opens a fresh one when the pool is empty.
    pub fn acquire(&self) -> Result<T::Handle> {
        if let Some(handle) = self.idle.lock().unwrap().pop() {
            return Ok(handle);
        }
        self.transport.open()
    }

    /// Resets the handle and returns it to the pool; a full pool drops it.
    pub fn release(&self, mut handle: T::Handle) {
        self.transport.reset(&mut handle);
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max {
            idle.push(handle);
        }
    }
}

/// A bounded LIFO of reusable [`Session`]s, the same shape as
/// [`ConnectionPool`] one level up.
///
/// Sessions are not reset on release; each session already resets its own
/// handle before every transfer.
pub struct SessionPool<T: Transport> {
    transport: Arc<T>,
    max: usize,
    idle: Mutex<Vec<Session<T>>>,
}

impl<T: Transport> SessionPool<T> {
    pub fn new(transport: Arc<T>, max: usize) -> Self {
        Self {
            transport,
            max,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Pops an idle session, or builds a fresh one on the pool's transport.
    pub fn acquire(&self) -> Result<Session<T>> {
        if let Some(session) = self.idle.lock().unwrap().pop() {
            return Ok(session);
        }
        Session::with_transport(self.transport.clone())
    }

    pub fn release(&self, session: Session<T>) {
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max {
            idle.push(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::transport::{Transfer, TransferSink};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Counts opens and resets; handles are just their creation index.
    #[derive(Default)]
    struct StubTransport {
        opened: AtomicU64,
        resets: AtomicU64,
    }

    impl Transport for StubTransport {
        type Handle = u64;

        fn open(&self) -> Result<u64> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }

        fn reset(&self, _handle: &mut u64) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn perform(
            &self,
            _handle: &mut u64,
            _transfer: &Transfer,
            _sink: &mut dyn TransferSink,
        ) -> Result<u16> {
            Ok(200)
        }
    }

    #[test]
    fn released_handle_is_reused_after_reset() {
        let transport = Arc::new(StubTransport::default());
        let pool = ConnectionPool::new(transport.clone(), 4);

        let first = pool.acquire().unwrap();
        pool.release(first);
        let second = pool.acquire().unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
        assert_eq!(transport.resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_capacity_pool_never_retains_handles() {
        let transport = Arc::new(StubTransport::default());
        let pool = ConnectionPool::new(transport.clone(), 0);

        let handle = pool.acquire().unwrap();
        pool.release(handle);
        pool.acquire().unwrap();

        // The second acquire had to open fresh.
        assert_eq!(transport.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pool_is_lifo() {
        let transport = Arc::new(StubTransport::default());
        let pool = ConnectionPool::new(transport, 4);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a);
        pool.release(b);

        // Most recently released comes back first.
        assert_eq!(pool.acquire().unwrap(), b);
        assert_eq!(pool.acquire().unwrap(), a);
    }

    #[test]
    fn session_pool_reuses_sessions_up_to_capacity() {
        let transport = Arc::new(StubTransport::default());
        let pool = SessionPool::new(transport.clone(), 1);

        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        pool.release(first);
        pool.release(second); // over capacity, dropped

        pool.acquire().unwrap();
        // Only two sessions were ever built; the last acquire reused one.
        assert_eq!(transport.opened.load(Ordering::SeqCst), 2);
    }
}
