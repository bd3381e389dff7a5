pub mod channels;
pub mod perf;

pub use channels::CompanionChannels;
pub use perf::{Stopwatch, TimingTracker, TurnMetrics};
