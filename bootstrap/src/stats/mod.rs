mod stats;
mod stats_enums;

pub use stats::*;
pub use stats_enums::*;
