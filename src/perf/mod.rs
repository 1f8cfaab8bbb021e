//! Scroll performance monitoring.
//!
//! - `JankMonitor` - Classifies frame samples and keeps the jank rate
//! - `FrameClock` - Produces frame samples from timestamps or timed work

pub mod frame_clock;
pub mod jank;

pub use frame_clock::FrameClock;
pub use jank::{JankMonitor, JankReport};
