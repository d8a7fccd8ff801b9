mod async_runtime;
mod thread_pool;

pub use async_runtime::AsyncRuntime;
pub use thread_pool::*;
