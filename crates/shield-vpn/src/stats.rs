//! Traffic statistics simulation.
//!
//! Nothing is measured: each tick draws a fresh download/upload rate and
//! adds `rate / 8` to the running totals.

use rand::Rng;
use std::ops::Range;
use std::time::Duration;

/// Download rate range per tick (Mbit/s)
pub const DOWNLOAD_RATE: Range<f64> = 45.0..75.0;

/// Upload rate range per tick (Mbit/s)
pub const UPLOAD_RATE: Range<f64> = 12.0..22.0;

/// Rate to volume scaling per tick
const RATE_DIVISOR: f64 = 8.0;

/// Session traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrafficCounters {
    /// Downloaded volume (MB)
    pub download_total: f64,
    /// Uploaded volume (MB)
    pub upload_total: f64,
    /// Current download rate (Mbit/s)
    pub download_rate: f64,
    /// Current upload rate (Mbit/s)
    pub upload_rate: f64,
}

impl TrafficCounters {
    /// Check that every counter is zero
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Produces synthetic traffic for one session
#[derive(Debug)]
pub struct StatsSimulator<R> {
    counters: TrafficCounters,
    ticks: u64,
    rng: R,
}

impl<R: Rng> StatsSimulator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            counters: TrafficCounters::default(),
            ticks: 0,
            rng,
        }
    }

    /// Current counters
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    /// Number of ticks since the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance by one tick
    pub fn tick(&mut self) -> TrafficCounters {
        let down = self.rng.gen_range(DOWNLOAD_RATE);
        let up = self.rng.gen_range(UPLOAD_RATE);

        self.counters.download_rate = down;
        self.counters.upload_rate = up;
        self.counters.download_total += down / RATE_DIVISOR;
        self.counters.upload_total += up / RATE_DIVISOR;
        self.ticks += 1;

        self.counters
    }

    /// Drop all session data
    pub fn reset(&mut self) {
        self.counters = TrafficCounters::default();
        self.ticks = 0;
    }
}

/// Format a session duration as `HH:MM:SS`
///
/// Hours keep growing past 99.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Format a traffic volume given in MB
pub fn format_traffic(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else {
        format!("{:.1} MB", mb)
    }
}

/// Format a rate given in Mbit/s
pub fn format_rate(mbit: f64) -> String {
    format!("{:.1} Mbit/s", mbit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_tick_ranges_and_accumulation() {
        let mut sim = StatsSimulator::new(StdRng::seed_from_u64(1));
        let mut expected_down = 0.0;
        let mut expected_up = 0.0;

        for _ in 0..100 {
            let c = sim.tick();
            assert!(DOWNLOAD_RATE.contains(&c.download_rate));
            assert!(UPLOAD_RATE.contains(&c.upload_rate));

            expected_down += c.download_rate / 8.0;
            expected_up += c.upload_rate / 8.0;
            assert!((c.download_total - expected_down).abs() < 1e-9);
            assert!((c.upload_total - expected_up).abs() < 1e-9);
        }
        assert_eq!(sim.ticks(), 100);
    }

    #[test]
    fn test_totals_are_monotonic() {
        let mut sim = StatsSimulator::new(StdRng::seed_from_u64(2));
        let mut last = sim.counters();

        for _ in 0..50 {
            let c = sim.tick();
            assert!(c.download_total > last.download_total);
            assert!(c.upload_total > last.upload_total);
            last = c;
        }
    }

    #[test]
    fn test_reset() {
        let mut sim = StatsSimulator::new(StdRng::seed_from_u64(3));
        sim.tick();
        sim.tick();

        sim.reset();

        assert!(sim.counters().is_zero());
        assert_eq!(sim.ticks(), 0);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(61_999)), "00:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 7)), "03:00:07");
        assert_eq!(format_elapsed(Duration::from_secs(120 * 3600)), "120:00:00");
    }

    #[test]
    fn test_format_traffic() {
        assert_eq!(format_traffic(0.0), "0.0 MB");
        assert_eq!(format_traffic(512.34), "512.3 MB");
        assert_eq!(format_traffic(1536.0), "1.5 GB");
        assert_eq!(format_rate(58.04), "58.0 Mbit/s");
    }
}
