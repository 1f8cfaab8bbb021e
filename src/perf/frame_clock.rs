use std::time::{Duration, Instant};

use super::jank::FrameSample;

/// Turns frame timestamps into duration samples.
///
/// With a display refresh rate set, samples are pre-classified against that
/// display's frame budget instead of the monitor's fixed threshold.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: Option<Instant>,
    budget: Option<Duration>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify frames against `1 / hz`. Zero keeps the fixed threshold.
    pub fn with_refresh_rate(hz: u32) -> Self {
        Self {
            last: None,
            budget: (hz > 0).then(|| Duration::from_secs(1) / hz),
        }
    }

    /// Mark a frame boundary. The first tick only arms the clock.
    pub fn tick(&mut self, now: Instant) -> Option<FrameSample> {
        let sample = self.last.map(|prev| {
            let elapsed = now.saturating_duration_since(prev);
            let sample = FrameSample::from_duration(elapsed);
            match self.budget {
                Some(budget) => sample.classified(elapsed > budget),
                None => sample,
            }
        });
        self.last = Some(now);
        sample
    }

    /// Disarm until the next tick, e.g. after the loop waited on I/O.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
