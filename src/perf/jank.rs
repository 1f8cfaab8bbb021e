//! Frame jank accounting.
//!
//! Counts frames while running and classifies each against the 60 Hz budget.
//! Every 60th frame (about one second of scrolling) a running rate is
//! reported; `stop` produces the final verdict.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

/// Frames slower than this are janky (one 60 Hz frame).
pub const JANK_THRESHOLD: Duration = Duration::from_millis(16);

/// A running summary is emitted every this many frames.
pub const SUMMARY_INTERVAL: u64 = 60;

/// Jank rates at or below this pass.
pub const PASS_RATE_PERCENT: f32 = 5.0;
/// Jank rates at or below this (and above the pass rate) warn.
pub const WARN_RATE_PERCENT: f32 = 12.0;

/// Duration of one rendered frame, optionally pre-classified by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSample {
    pub duration_ns: u64,
    pub is_jank: Option<bool>,
}

impl FrameSample {
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            duration_ns: u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
            is_jank: None,
        }
    }

    #[cfg(test)]
    pub fn from_millis(ms: u64) -> Self {
        Self::from_duration(Duration::from_millis(ms))
    }

    pub fn classified(mut self, is_jank: bool) -> Self {
        self.is_jank = Some(is_jank);
        self
    }

    fn exceeds_budget(&self) -> bool {
        self.is_jank
            .unwrap_or(self.duration_ns > JANK_THRESHOLD.as_nanos() as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Warning,
    Fail,
}

impl Verdict {
    pub fn for_rate(rate_percent: f32) -> Self {
        if rate_percent <= PASS_RATE_PERCENT {
            Verdict::Pass
        } else if rate_percent <= WARN_RATE_PERCENT {
            Verdict::Warning
        } else {
            Verdict::Fail
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "PASSED",
            Verdict::Warning => "WARNING",
            Verdict::Fail => "FAILED",
        })
    }
}

/// A single janky frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JankEvent {
    /// 1-based count of janky frames so far.
    pub jank_number: u64,
    /// 1-based index of the frame in the run.
    pub frame_number: u64,
    pub duration_ns: u64,
}

/// What one recorded frame produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub jank: Option<JankEvent>,
    /// Running jank rate, present every [`SUMMARY_INTERVAL`] frames.
    pub running_rate: Option<f32>,
}

/// Counters and verdict at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JankReport {
    pub total_frames: u64,
    pub jank_frames: u64,
    pub jank_rate: f32,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Idle,
    Running,
}

/// Accumulates frame samples for one observed view.
#[derive(Debug)]
pub struct JankMonitor {
    state: MonitorState,
    total_frames: u64,
    jank_frames: u64,
}

impl Default for JankMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl JankMonitor {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Idle,
            total_frames: 0,
            jank_frames: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == MonitorState::Running
    }

    /// Reset counters and begin counting. Calling it while running restarts the run.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!(
                total_frames = self.total_frames,
                "Jank monitor restarted while running"
            );
        }
        self.total_frames = 0;
        self.jank_frames = 0;
        self.state = MonitorState::Running;
        info!("Jank monitor started");
    }

    /// Count one frame. Samples received while idle are ignored.
    pub fn record(&mut self, sample: FrameSample) -> Option<FrameReport> {
        if !self.is_running() {
            return None;
        }

        self.total_frames += 1;
        let frame_number = self.total_frames;

        let jank = if sample.exceeds_budget() {
            self.jank_frames += 1;
            let event = JankEvent {
                jank_number: self.jank_frames,
                frame_number,
                duration_ns: sample.duration_ns,
            };
            warn!(
                jank = event.jank_number,
                frame = frame_number,
                duration_ms = sample.duration_ns / 1_000_000,
                duration_ns = sample.duration_ns,
                "Jank frame"
            );
            Some(event)
        } else {
            None
        };

        let running_rate = if frame_number % SUMMARY_INTERVAL == 0 {
            let rate = self.rate();
            debug!(
                frame = frame_number,
                duration_ms = sample.duration_ns / 1_000_000,
                jank_rate = %format!("{rate:.2}%"),
                "Frame summary"
            );
            Some(rate)
        } else {
            None
        };

        Some(FrameReport {
            frame_number,
            jank,
            running_rate,
        })
    }

    /// Current counters without ending the run.
    pub fn snapshot(&self) -> JankReport {
        let jank_rate = self.rate();
        JankReport {
            total_frames: self.total_frames,
            jank_frames: self.jank_frames,
            jank_rate,
            verdict: Verdict::for_rate(jank_rate),
        }
    }

    /// Finish the run and classify it.
    pub fn stop(&mut self) -> JankReport {
        self.state = MonitorState::Idle;
        let report = self.snapshot();
        info!(
            total_frames = report.total_frames,
            jank_frames = report.jank_frames,
            jank_rate = %format!("{:.2}%", report.jank_rate),
            target = %format!("<= {PASS_RATE_PERCENT:.1}%"),
            verdict = %report.verdict,
            "Performance summary"
        );
        report
    }

    fn rate(&self) -> f32 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.jank_frames as f32 / self.total_frames as f32 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_percent_is_warning() {
        let mut monitor = JankMonitor::new();
        monitor.start();
        for i in 0..100 {
            let ms = if i % 16 == 0 && i < 96 { 20 } else { 8 };
            monitor.record(FrameSample::from_millis(ms));
        }
        let report = monitor.stop();

        assert_eq!(report.total_frames, 100);
        assert_eq!(report.jank_frames, 6);
        assert!((report.jank_rate - 6.0).abs() < 1e-4);
        assert_eq!(report.verdict, Verdict::Warning);
    }

    #[test]
    fn test_stop_without_frames_passes() {
        let mut monitor = JankMonitor::new();
        monitor.start();
        let report = monitor.stop();
        assert_eq!(report.jank_rate, 0.0);
        assert_eq!(report.verdict, Verdict::Pass);
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut monitor = JankMonitor::new();
        monitor.start();
        let at_budget = monitor.record(FrameSample::from_millis(16)).unwrap();
        let over_budget = monitor
            .record(FrameSample::from_duration(Duration::from_nanos(16_000_001)))
            .unwrap();

        assert_eq!(at_budget.jank, None);
        assert_eq!(
            over_budget.jank,
            Some(JankEvent {
                jank_number: 1,
                frame_number: 2,
                duration_ns: 16_000_001
            })
        );
    }

    #[test]
    fn test_producer_classification_wins() {
        let mut monitor = JankMonitor::new();
        monitor.start();
        let slow_but_ok = monitor.record(FrameSample::from_millis(40).classified(false));
        let fast_but_jank = monitor.record(FrameSample::from_millis(2).classified(true));

        assert!(slow_but_ok.unwrap().jank.is_none());
        assert!(fast_but_jank.unwrap().jank.is_some());
        assert_eq!(monitor.snapshot().jank_frames, 1);
    }

    #[test]
    fn test_idle_samples_are_ignored() {
        let mut monitor = JankMonitor::new();
        assert!(monitor.record(FrameSample::from_millis(50)).is_none());

        monitor.start();
        monitor.record(FrameSample::from_millis(50));
        monitor.stop();
        assert!(monitor.record(FrameSample::from_millis(50)).is_none());
        assert_eq!(monitor.snapshot().total_frames, 1);
    }

    #[test]
    fn test_running_rate_every_sixtieth_frame() {
        let mut monitor = JankMonitor::new();
        monitor.start();
        let mut summaries = Vec::new();
        for i in 1..=130u64 {
            let ms = if i <= 3 { 30 } else { 5 };
            let report = monitor.record(FrameSample::from_millis(ms)).unwrap();
            if let Some(rate) = report.running_rate {
                summaries.push((report.frame_number, rate));
            }
        }

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].0, 60);
        assert!((summaries[0].1 - 5.0).abs() < 1e-4);
        assert_eq!(summaries[1].0, 120);
        assert!((summaries[1].1 - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_summary_and_jank_on_same_frame() {
        let mut monitor = JankMonitor::new();
        monitor.start();
        for _ in 0..59 {
            monitor.record(FrameSample::from_millis(5));
        }
        let report = monitor.record(FrameSample::from_millis(33)).unwrap();
        assert!(report.jank.is_some());
        assert!(report.running_rate.is_some());
    }

    #[test]
    fn test_restart_resets_counters() {
        let mut monitor = JankMonitor::new();
        monitor.start();
        monitor.record(FrameSample::from_millis(40));
        monitor.start();

        assert!(monitor.is_running());
        assert_eq!(monitor.snapshot().total_frames, 0);
        assert_eq!(monitor.snapshot().jank_frames, 0);
    }

    #[test]
    fn test_verdict_boundaries() {
        assert_eq!(Verdict::for_rate(0.0), Verdict::Pass);
        assert_eq!(Verdict::for_rate(5.0), Verdict::Pass);
        assert_eq!(Verdict::for_rate(5.01), Verdict::Warning);
        assert_eq!(Verdict::for_rate(12.0), Verdict::Warning);
        assert_eq!(Verdict::for_rate(12.5), Verdict::Fail);
    }
}
