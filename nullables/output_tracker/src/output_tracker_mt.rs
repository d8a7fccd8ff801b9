use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, Weak,
};

/// Records everything a nullable component emitted since tracking started.
/// Safe to share between threads.
pub struct OutputTrackerMt<T: Clone + 'static> {
    output: Mutex<Vec<T>>,
}

impl<T: Clone + 'static> OutputTrackerMt<T> {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, t: T) {
        self.output.lock().unwrap().push(t);
    }

    pub fn output(&self) -> Vec<T> {
        self.output.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.output.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<T> {
        self.output.lock().unwrap().last().cloned()
    }

    pub fn clear(&self) {
        self.output.lock().unwrap().clear();
    }
}

impl<T: Clone + 'static> Default for OutputTrackerMt<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out point a nullable emits to. Trackers are held weakly and
/// forgotten once the test drops them.
pub struct OutputListenerMt<T: Clone + 'static> {
    trackers: Mutex<Vec<Weak<OutputTrackerMt<T>>>>,
    tracker_count: AtomicUsize,
}

impl<T: Clone + 'static> OutputListenerMt<T> {
    pub fn new() -> Self {
        Self {
            trackers: Mutex::new(Vec::new()),
            tracker_count: AtomicUsize::new(0),
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.tracker_count.load(Ordering::SeqCst) > 0
    }

    pub fn track(&self) -> Arc<OutputTrackerMt<T>> {
        let tracker = Arc::new(OutputTrackerMt::new());
        let mut guard = self.trackers.lock().unwrap();
        guard.push(Arc::downgrade(&tracker));
        self.tracker_count.store(guard.len(), Ordering::SeqCst);
        tracker
    }

    pub fn emit(&self, t: T) {
        // fast path for production code, where nothing is tracked
        if !self.is_tracked() {
            return;
        }

        let mut guard = self.trackers.lock().unwrap();
        guard.retain(|tracker| match tracker.upgrade() {
            Some(tracker) => {
                tracker.add(t.clone());
                true
            }
            None => false,
        });
        self.tracker_count.store(guard.len(), Ordering::SeqCst);
    }

    pub fn tracker_count(&self) -> usize {
        self.tracker_count.load(Ordering::SeqCst)
    }
}

impl<T: Clone + 'static> Default for OutputListenerMt<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_tracker() {
        let listener = OutputListenerMt::new();
        listener.emit(1);
        assert!(!listener.is_tracked());
    }

    #[test]
    fn tracker_sees_emitted_values_in_order() {
        let listener = OutputListenerMt::new();
        let tracker = listener.track();
        listener.emit(1);
        listener.emit(2);
        assert_eq!(tracker.output(), vec![1, 2]);
        assert_eq!(tracker.last(), Some(2));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn late_tracker_misses_earlier_values() {
        let listener = OutputListenerMt::new();
        let early = listener.track();
        listener.emit("a");
        let late = listener.track();
        listener.emit("b");
        assert_eq!(early.output(), vec!["a", "b"]);
        assert_eq!(late.output(), vec!["b"]);
    }

    #[test]
    fn dropped_tracker_is_forgotten() {
        let listener = OutputListenerMt::new();
        let tracker = listener.track();
        assert_eq!(listener.tracker_count(), 1);
        drop(tracker);
        listener.emit(());
        assert_eq!(listener.tracker_count(), 0);
    }

    #[test]
    fn clear_output() {
        let listener = OutputListenerMt::new();
        let tracker = listener.track();
        listener.emit(1);
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
