mod output_tracker_mt;
pub use output_tracker_mt::{OutputListenerMt, OutputTrackerMt};
