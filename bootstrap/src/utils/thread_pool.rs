use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use timer::Timer;

/// Executes background work: pull dispatches and the periodic connection population
pub trait ThreadPool: Send + Sync {
    fn push_task(&self, callback: Box<dyn FnMut() + Send>);
    fn add_delayed_task(&self, delay: Duration, callback: Box<dyn FnMut() + Send>);
    fn num_queued_tasks(&self) -> usize;
    fn stop(&self);
}

pub struct ThreadPoolImpl {
    data: Arc<Mutex<Option<ThreadPoolData>>>,
    stopped: Arc<Mutex<bool>>,
}

struct ThreadPoolData {
    pool: threadpool::ThreadPool,
    timer: Timer,
}

impl ThreadPoolData {
    fn push_task(&self, mut callback: Box<dyn FnMut() + Send>) {
        self.pool.execute(move || callback());
    }
}

impl ThreadPoolImpl {
    pub fn new(num_threads: usize, thread_name: impl Into<String>) -> Self {
        Self {
            stopped: Arc::new(Mutex::new(false)),
            data: Arc::new(Mutex::new(Some(ThreadPoolData {
                pool: threadpool::Builder::new()
                    .num_threads(num_threads.max(1))
                    .thread_name(thread_name.into())
                    .build(),
                timer: Timer::new(),
            }))),
        }
    }

    pub fn new_test_instance() -> Self {
        Self::new(2, "Bootstrap work")
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap()
    }

    /// Waits for queued tasks to finish. Delayed tasks that haven't fired yet are dropped.
    pub fn stop(&self) {
        let mut stopped_guard = self.stopped.lock().unwrap();
        if !*stopped_guard {
            let mut data_guard = self.data.lock().unwrap();
            *stopped_guard = true;
            drop(stopped_guard);
            let data = data_guard.take();
            drop(data_guard);
            if let Some(data) = data {
                data.pool.join();
            }
        }
    }
}

impl ThreadPool for ThreadPoolImpl {
    fn push_task(&self, callback: Box<dyn FnMut() + Send>) {
        let stopped_guard = self.stopped.lock().unwrap();
        if !*stopped_guard {
            let data_guard = self.data.lock().unwrap();
            drop(stopped_guard);
            if let Some(data) = data_guard.as_ref() {
                data.push_task(callback);
            }
        }
    }

    fn add_delayed_task(&self, delay: Duration, callback: Box<dyn FnMut() + Send>) {
        let stopped_guard = self.stopped.lock().unwrap();
        if *stopped_guard {
            return;
        }
        let data_guard = self.data.lock().unwrap();
        drop(stopped_guard);
        let mut option_callback = Some(callback);
        let data_clone = Arc::clone(&self.data);
        let stopped_clone = Arc::clone(&self.stopped);
        if let Some(data) = data_guard.as_ref() {
            let delay = chrono::Duration::milliseconds(delay.as_millis() as i64);
            data.timer
                .schedule_with_delay(delay, move || {
                    if let Some(cb) = option_callback.take() {
                        let stopped_guard = stopped_clone.lock().unwrap();
                        if !*stopped_guard {
                            let data_guard = data_clone.lock().unwrap();
                            drop(stopped_guard);
                            if let Some(data) = data_guard.as_ref() {
                                data.push_task(cb);
                            }
                        }
                    }
                })
                .ignore();
        }
    }

    fn num_queued_tasks(&self) -> usize {
        self.data
            .lock()
            .unwrap()
            .as_ref()
            .map(|data| data.pool.queued_count())
            .unwrap_or_default()
    }

    fn stop(&self) {
        ThreadPoolImpl::stop(self)
    }
}

impl Drop for ThreadPoolImpl {
    fn drop(&mut self) {
        self.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn runs_pushed_task() {
        let pool = ThreadPoolImpl::new_test_instance();
        let (tx, rx) = mpsc::channel();
        pool.push_task(Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn runs_delayed_task() {
        let pool = ThreadPoolImpl::new_test_instance();
        let (tx, rx) = mpsc::channel();
        pool.add_delayed_task(
            Duration::from_millis(10),
            Box::new(move || tx.send(1).unwrap()),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    }

    #[test]
    fn ignores_tasks_after_stop() {
        let pool = ThreadPoolImpl::new_test_instance();
        pool.stop();
        assert!(pool.is_stopped());
        let (tx, rx) = mpsc::channel::<i32>();
        pool.push_task(Box::new(move || tx.send(1).unwrap()));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn stop_is_idempotent() {
        let pool = ThreadPoolImpl::new_test_instance();
        pool.stop();
        pool.stop();
    }
}
