use std::future::Future;
use tokio::{runtime::Handle, task::JoinHandle};

/// Owns the tokio runtime that drives channel I/O. Components only keep a `Handle`,
/// so the runtime is never dropped from inside one of its own tasks.
pub struct AsyncRuntime {
    pub tokio: tokio::runtime::Runtime,
}

impl AsyncRuntime {
    pub fn new(tokio: tokio::runtime::Runtime) -> Self {
        Self { tokio }
    }

    pub fn with_worker_threads(threads: usize) -> std::io::Result<Self> {
        let tokio = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("Bootstrap I/O")
            .enable_time()
            .build()?;
        Ok(Self::new(tokio))
    }

    pub fn handle(&self) -> Handle {
        self.tokio.handle().clone()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tokio.spawn(future)
    }
}

impl Default for AsyncRuntime {
    fn default() -> Self {
        Self::with_worker_threads(2).unwrap()
    }
}
