//! Encoder progress estimation.
//!
//! The encoder only reports progress as free-form text, so the percentage
//! is an estimate built from two signals:
//! - elapsed output time parsed from `time=`, `out_time=` or `out_time_us=`
//!   fields, scaled against the target duration and capped at 99;
//! - a heartbeat that nudges the estimate by 2 (capped at 98) whenever no
//!   time field has been seen for more than a second.
//!
//! The estimate never decreases and never reaches 100 on its own; only the
//! worker sets 100 after a zero exit status.

use std::time::{Duration, Instant};

/// Highest value the time-based signal may produce.
pub const TIME_CAP: u8 = 99;

/// Highest value the heartbeat may produce.
pub const HEARTBEAT_CAP: u8 = 98;

/// Heartbeat increment.
pub const HEARTBEAT_STEP: u8 = 2;

/// Silence after which the heartbeat kicks in.
pub const HEARTBEAT_AFTER: Duration = Duration::from_secs(1);

/// Monotonic progress estimate for one encoder run.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    duration_secs: f64,
    current: u8,
    last_signal: Instant,
}

impl ProgressEstimator {
    /// Create an estimator for a clip of `duration_secs`, starting at `floor`.
    pub fn new(duration_secs: f64, floor: u8, now: Instant) -> Self {
        Self {
            duration_secs,
            current: floor.min(TIME_CAP),
            last_signal: now,
        }
    }

    /// Current estimate.
    pub fn current(&self) -> u8 {
        self.current
    }

    /// Feed one line of encoder output.
    ///
    /// Returns the new estimate when it increased.
    pub fn observe_line(&mut self, line: &str, now: Instant) -> Option<u8> {
        let elapsed = parse_elapsed(line)?;
        self.last_signal = now;
        let estimate = self.time_estimate(elapsed);
        self.advance(estimate)
    }

    /// Liveness tick.
    ///
    /// Returns the new estimate when the silence window elapsed and the
    /// estimate was raised.
    pub fn heartbeat(&mut self, now: Instant) -> Option<u8> {
        if now.saturating_duration_since(self.last_signal) <= HEARTBEAT_AFTER {
            return None;
        }
        self.last_signal = now;
        let next = self.current.saturating_add(HEARTBEAT_STEP).min(HEARTBEAT_CAP);
        self.advance(next)
    }

    fn time_estimate(&self, elapsed_secs: f64) -> u8 {
        if self.duration_secs <= 0.0 {
            return 0;
        }
        let pct = (100.0 * elapsed_secs / self.duration_secs).floor();
        pct.clamp(0.0, TIME_CAP as f64) as u8
    }

    fn advance(&mut self, value: u8) -> Option<u8> {
        if value > self.current {
            self.current = value;
            Some(value)
        } else {
            None
        }
    }
}

/// Extract elapsed output time in seconds from an encoder output line.
///
/// Understands the `-progress` key/value records (`out_time_us=`,
/// `out_time_ms=`, `out_time=`) and the classic stats line
/// (`frame=... time=HH:MM:SS.xx ...`). `N/A` and negative values yield
/// `None`.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        // out_time_ms is reported in microseconds as well
        if key == "out_time_us" || key == "out_time_ms" {
            let micros = value.trim().parse::<i64>().ok()?;
            if micros < 0 {
                return None;
            }
            return Some(micros as f64 / 1_000_000.0);
        }
    }

    line.split_whitespace().find_map(|token| {
        token
            .strip_prefix("out_time=")
            .or_else(|| token.strip_prefix("time="))
            .and_then(parse_timestamp)
    })
}

/// Parse `HH:MM:SS[.frac]` into seconds.
fn parse_timestamp(value: &str) -> Option<f64> {
    if value.starts_with('-') {
        return None;
    }

    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    total.is_finite().then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_elapsed_formats() {
        assert_eq!(parse_elapsed("out_time_us=1500000"), Some(1.5));
        assert_eq!(parse_elapsed("out_time_ms=3000000"), Some(3.0));
        assert_eq!(parse_elapsed("out_time=00:00:02.500000"), Some(2.5));
        assert_eq!(
            parse_elapsed("frame=   60 fps= 30 q=28.0 size=     256kB time=00:01:02.00 bitrate= 33.8kbits/s"),
            Some(62.0)
        );
    }

    #[test]
    fn test_parse_elapsed_ignores_unusable_values() {
        assert_eq!(parse_elapsed("out_time_us=N/A"), None);
        assert_eq!(parse_elapsed("out_time=N/A"), None);
        assert_eq!(parse_elapsed("out_time_us=-9223372036854775807"), None);
        assert_eq!(parse_elapsed("out_time=-00:00:00.033333"), None);
        assert_eq!(parse_elapsed("progress=continue"), None);
        assert_eq!(parse_elapsed("Stream mapping:"), None);
        assert_eq!(parse_elapsed(""), None);
    }

    #[test]
    fn test_time_estimate_scales_and_caps() {
        let start = Instant::now();
        let mut est = ProgressEstimator::new(6.0, 5, start);

        assert_eq!(est.observe_line("out_time=00:00:03.000000", start), Some(50));
        assert_eq!(est.current(), 50);

        // Past the target duration still caps at 99
        assert_eq!(est.observe_line("out_time_us=9000000", start), Some(99));
        assert_eq!(est.observe_line("out_time_us=12000000", start), None);
        assert_eq!(est.current(), 99);
    }

    #[test]
    fn test_estimate_never_regresses() {
        let start = Instant::now();
        let mut est = ProgressEstimator::new(10.0, 5, start);

        assert_eq!(est.observe_line("out_time_us=4000000", start), Some(40));
        assert_eq!(est.observe_line("out_time_us=2000000", start), None);
        assert_eq!(est.current(), 40);

        // Below the floor
        let mut est = ProgressEstimator::new(10.0, 5, start);
        assert_eq!(est.observe_line("out_time_us=100000", start), None);
        assert_eq!(est.current(), 5);
    }

    #[test]
    fn test_heartbeat_after_silence() {
        let start = Instant::now();
        let mut est = ProgressEstimator::new(6.0, 5, start);

        assert_eq!(est.heartbeat(start + Duration::from_millis(500)), None);
        assert_eq!(est.heartbeat(start + Duration::from_millis(1100)), Some(7));
        // Window restarts after each bump
        assert_eq!(est.heartbeat(start + Duration::from_millis(1500)), None);
        assert_eq!(est.heartbeat(start + Duration::from_millis(2200)), Some(9));
    }

    #[test]
    fn test_time_signal_resets_heartbeat_window() {
        let start = Instant::now();
        let mut est = ProgressEstimator::new(6.0, 5, start);

        let t = start + Duration::from_millis(900);
        assert_eq!(est.observe_line("out_time_us=600000", t), Some(10));
        assert_eq!(est.heartbeat(start + Duration::from_millis(1500)), None);
        assert_eq!(est.heartbeat(start + Duration::from_millis(2000)), Some(12));
    }

    #[test]
    fn test_heartbeat_caps_at_98() {
        let start = Instant::now();
        let mut est = ProgressEstimator::new(6.0, 95, start);

        assert_eq!(est.heartbeat(start + Duration::from_secs(2)), Some(97));
        assert_eq!(est.heartbeat(start + Duration::from_secs(4)), Some(98));
        assert_eq!(est.heartbeat(start + Duration::from_secs(6)), None);
        assert_eq!(est.current(), 98);

        // Time signal may still go to 99
        assert_eq!(est.observe_line("out_time=00:00:06.000000", start + Duration::from_secs(7)), Some(99));
    }

    #[test]
    fn test_zero_duration_only_heartbeats() {
        let start = Instant::now();
        let mut est = ProgressEstimator::new(0.0, 5, start);
        assert_eq!(est.observe_line("out_time_us=1000000", start), None);
        assert_eq!(est.heartbeat(start + Duration::from_secs(2)), Some(7));
        assert_eq!(est.current(), 7);
    }
}
