//! Handles for compiles running on the thread pool.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use shade_compiler::CompiledShader;

/// Future-like handle to a scheduled compile.
///
/// Dropping the handle does not cancel the work; the compile still runs
/// and still populates the cache.
#[derive(Debug)]
pub struct CompileTask {
    receiver: flume::Receiver<Arc<CompiledShader>>,
    result: Option<Arc<CompiledShader>>,
}

impl CompileTask {
    pub(crate) fn channel() -> (flume::Sender<Arc<CompiledShader>>, Self) {
        let (tx, rx) = flume::bounded(1);
        (
            tx,
            Self {
                receiver: rx,
                result: None,
            },
        )
    }

    /// A handle that is already complete.
    pub fn ready(result: Arc<CompiledShader>) -> Self {
        let (_, rx) = flume::bounded(1);
        Self {
            receiver: rx,
            result: Some(result),
        }
    }

    /// Non-blocking check; returns the result once the compile finished.
    pub fn poll(&mut self) -> Option<Arc<CompiledShader>> {
        if self.result.is_none() {
            match self.receiver.try_recv() {
                Ok(result) => self.result = Some(result),
                Err(flume::TryRecvError::Empty) => return None,
                Err(flume::TryRecvError::Disconnected) => self.result = Some(abandoned()),
            }
        }
        self.result.clone()
    }

    /// `true` once [`CompileTask::poll`] would return a result.
    pub fn is_ready(&mut self) -> bool {
        self.poll().is_some()
    }

    /// Blocks until the compile finishes.
    pub fn wait(self) -> Arc<CompiledShader> {
        match self.result {
            Some(result) => result,
            None => self.receiver.recv().unwrap_or_else(|_| abandoned()),
        }
    }
}

fn abandoned() -> Arc<CompiledShader> {
    Arc::new(CompiledShader::failure("compile task ended without a result"))
}

/// Counts scheduled compiles so shutdown can wait for them.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(crate) fn enter(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock() += 1;
        InFlightGuard(Arc::clone(self))
    }

    pub(crate) fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }

    pub(crate) fn count(&self) -> usize {
        *self.count.lock()
    }
}

/// Decrements the in-flight count on drop, including on panic.
pub(crate) struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}
