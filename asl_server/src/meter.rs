use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Request counters since the last reset.
#[derive(Default)]
pub struct Meter {
    predictions: AtomicU64,
    degraded: AtomicU64,
    failures: AtomicU64,
}

/// Counter values taken by [`Meter::get_reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeterSnapshot {
    pub predictions: u64,
    pub degraded: u64,
    pub failures: u64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            predictions: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn tick_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Prediction served on a degraded path (no detection, placeholders, no hand).
    pub fn tick_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset(&self) -> MeterSnapshot {
        MeterSnapshot {
            predictions: self.predictions.swap(0, Ordering::Relaxed),
            degraded: self.degraded.swap(0, Ordering::Relaxed),
            failures: self.failures.swap(0, Ordering::Relaxed),
        }
    }
}

pub fn spawn_meter_logger(period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut log_interval = interval(period);
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let counts = METER.get_reset();
            let elapsed = start.elapsed().as_secs_f32();

            if counts.predictions > 0 {
                log::info!(
                    "Predictions per second: {:.2} ({} degraded)",
                    counts.predictions as f32 / elapsed,
                    counts.degraded
                )
            }
            if counts.failures > 0 {
                log::info!("Failed requests per second: {:.2}", counts.failures as f32 / elapsed)
            }
        }
    })
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_get_reset() {
        let meter = Meter::new();
        meter.tick_prediction();
        meter.tick_prediction();
        meter.tick_degraded();
        meter.tick_failure();

        assert_eq!(
            meter.get_reset(),
            MeterSnapshot {
                predictions: 2,
                degraded: 1,
                failures: 1
            }
        );
        assert_eq!(meter.get_reset(), MeterSnapshot::default());
    }
}
