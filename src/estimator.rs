//! Elapsed-time extrapolation between daemon fetches.
//!
//! The daemon only reports the elapsed time when it is asked, and the monitor
//! only asks when something changes. While a song is playing the estimator
//! republishes the last daemon snapshot once per period with the elapsed time
//! advanced by the local monotonic clock.

use crate::subscription::Distributor;
use crate::types::PlayerStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct Baseline {
    status: PlayerStatus,
    recorded_at: Instant,
}

/// Publishes daemon snapshots and derived elapsed-time updates
pub struct Estimator {
    baseline: Mutex<Option<Baseline>>,
    out: Arc<Distributor<PlayerStatus>>,
}

impl Estimator {
    pub fn new(out: Arc<Distributor<PlayerStatus>>) -> Self {
        Self {
            baseline: Mutex::new(None),
            out,
        }
    }

    /// Record a daemon-sourced snapshot as the new baseline and publish it
    pub fn publish_authoritative(&self, status: PlayerStatus) {
        // Publishing under the baseline lock orders it against `tick`
        let mut baseline = self.baseline.lock();
        *baseline = Some(Baseline {
            status: status.clone(),
            recorded_at: Instant::now(),
        });
        self.out.publish(status);
    }

    /// Forget the baseline; ticks are silent until the next snapshot
    pub fn reset(&self) {
        *self.baseline.lock() = None;
    }

    /// Compute the extrapolated snapshot, if the player is playing
    pub fn estimate(&self) -> Option<PlayerStatus> {
        let baseline = self.baseline.lock();
        baseline.as_ref().and_then(extrapolate)
    }

    /// Publish an extrapolated snapshot if the player is playing
    ///
    /// Returns whether anything was published.
    pub fn tick(&self) -> bool {
        let baseline = self.baseline.lock();
        match baseline.as_ref().and_then(extrapolate) {
            Some(status) => {
                self.out.publish(status);
                true
            }
            None => false,
        }
    }

    /// Tick every `period` until `cancel` fires
    pub async fn run(&self, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }
}

fn extrapolate(baseline: &Baseline) -> Option<PlayerStatus> {
    if !baseline.status.is_playing() {
        return None;
    }

    let reported = baseline.status.elapsed;
    let mut elapsed = reported + baseline.recorded_at.elapsed().as_secs_f64();
    if let Some(duration) = baseline.status.duration.filter(|d| *d > 0.0) {
        elapsed = elapsed.min(duration);
    }

    let mut status = baseline.status.clone();
    status.elapsed = elapsed.max(reported);
    Some(status)
}
