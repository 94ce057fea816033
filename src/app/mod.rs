mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::LiveFeed;
pub use types::{CaptureStatus, FeedStatus, FeedView, ShutdownReason};
