//! Session counters and the periodic throughput line.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counters for one monitoring session. Owned by the pipeline thread;
/// read-only snapshots go out through `Clone`.
#[derive(Debug, Clone)]
pub struct SessionStats {
    started_at: Instant,
    frames_processed: u64,
    detection_cycles: u64,
    alerts_sent: u64,
    last_alert_at: Option<DateTime<Local>>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_processed: 0,
            detection_cycles: 0,
            alerts_sent: 0,
            last_alert_at: None,
        }
    }

    pub fn record_frame(&mut self) {
        self.frames_processed += 1;
    }

    /// A cycle whose detector output contained at least one person.
    pub fn record_detection(&mut self) {
        self.detection_cycles += 1;
    }

    /// A granted alert (cooldown passed, alarm and fan-out fired).
    pub fn record_alert(&mut self) {
        self.alerts_sent += 1;
        self.last_alert_at = Some(Local::now());
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn detection_cycles(&self) -> u64 {
        self.detection_cycles
    }

    pub fn alerts_sent(&self) -> u64 {
        self.alerts_sent
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Local>> {
        self.last_alert_at
    }

    pub fn session_duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn alerts_per_minute(&self) -> f64 {
        per_minute(self.alerts_sent, self.session_duration())
    }

    /// Multi-line end-of-session report, printed when monitoring stops.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "=== session statistics ===".to_string(),
            format!("duration: {}s", self.session_duration().as_secs()),
            format!("frames processed: {}", self.frames_processed),
            format!("detection cycles: {}", self.detection_cycles),
            format!("alerts sent: {}", self.alerts_sent),
        ];
        if let Some(at) = self.last_alert_at {
            lines.push(format!("last alert: {}", at.format(TIMESTAMP_FORMAT)));
        }
        lines.push(format!(
            "alert rate: {:.2} per minute",
            self.alerts_per_minute()
        ));
        lines.join("\n")
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

fn per_minute(count: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds < 1.0 {
        return 0.0;
    }
    count as f64 / (seconds / 60.0)
}

/// Frames-per-second meter for the periodic health log line. `tick` returns
/// the measured rate once per window and `None` in between.
#[derive(Debug)]
pub struct ThroughputMeter {
    window_start: Instant,
    frames_in_window: u64,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames_in_window: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.frames_in_window += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < HEALTH_INTERVAL {
            return None;
        }
        let fps = self.frames_in_window as f64 / elapsed.as_secs_f64();
        self.window_start = Instant::now();
        self.frames_in_window = 0;
        Some(fps)
    }

    #[cfg(test)]
    fn backdate(&mut self, by: Duration) {
        if let Some(start) = self.window_start.checked_sub(by) {
            self.window_start = start;
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_updates_last_alert_time() {
        let mut stats = SessionStats::new();
        assert!(stats.last_alert_at().is_none());

        stats.record_alert();
        assert_eq!(stats.alerts_sent(), 1);
        assert!(stats.last_alert_at().is_some());
    }

    #[test]
    fn rate_is_zero_for_fresh_session() {
        assert_eq!(per_minute(3, Duration::ZERO), 0.0);
        assert_eq!(per_minute(0, Duration::from_secs(300)), 0.0);
    }

    #[test]
    fn rate_scales_to_minutes() {
        assert!((per_minute(4, Duration::from_secs(120)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn summary_mentions_counts() {
        let mut stats = SessionStats::new();
        stats.record_frame();
        stats.record_frame();
        stats.record_detection();
        stats.record_alert();

        let summary = stats.summary();
        assert!(summary.contains("frames processed: 2"));
        assert!(summary.contains("detection cycles: 1"));
        assert!(summary.contains("alerts sent: 1"));
        assert!(summary.contains("last alert: "));
    }

    #[test]
    fn meter_is_quiet_inside_the_window() {
        let mut meter = ThroughputMeter::new();
        assert!(meter.tick().is_none());
        assert!(meter.tick().is_none());
    }

    #[test]
    fn meter_reports_after_window_elapses() {
        let mut meter = ThroughputMeter::new();
        for _ in 0..9 {
            assert!(meter.tick().is_none());
        }
        meter.backdate(Duration::from_secs(5));
        let fps = meter.tick().expect("window elapsed");
        assert!(fps > 0.0);
        // Window resets, so the next tick is quiet again.
        assert!(meter.tick().is_none());
    }
}
