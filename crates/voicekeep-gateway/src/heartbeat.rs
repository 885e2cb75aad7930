use std::future;

use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};

/// Owns the periodic heartbeat timer for the live connection and tracks
/// whether the last heartbeat sent has been acknowledged.
///
/// At most one timer exists at a time: `start` replaces any running one.
#[derive(Default)]
pub struct HeartbeatScheduler {
    interval: Option<Interval>,
    period: Option<Duration>,
    awaiting_ack: bool,
}

impl HeartbeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a timer firing every `period`, first tick one period from now.
    pub fn start(&mut self, period: Duration) {
        self.stop();
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.period = Some(period);
    }

    pub fn stop(&mut self) {
        self.interval = None;
        self.period = None;
        self.awaiting_ack = false;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Resolves on the next tick; never resolves while stopped. Cancel safe.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }

    pub fn mark_sent(&mut self) {
        self.awaiting_ack = true;
    }

    pub fn acknowledge(&mut self) {
        self.awaiting_ack = false;
    }

    /// True when a tick arrives while the previous heartbeat is still
    /// unacknowledged, i.e. no Ack within one full interval.
    pub fn ack_overdue(&self) -> bool {
        self.awaiting_ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_at_period() {
        let mut hb = HeartbeatScheduler::new();
        hb.start(Duration::from_millis(1000));
        let started = Instant::now();
        hb.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        hb.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_timer() {
        let mut hb = HeartbeatScheduler::new();
        hb.start(Duration::from_millis(1000));
        hb.start(Duration::from_millis(5000));
        assert_eq!(hb.period(), Some(Duration::from_millis(5000)));
        let started = Instant::now();
        hb.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_never_ticks() {
        let mut hb = HeartbeatScheduler::new();
        hb.start(Duration::from_millis(10));
        hb.stop();
        hb.stop();
        assert!(!hb.is_running());
        let fired = time::timeout(Duration::from_secs(60), hb.tick()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn ack_tracking() {
        let mut hb = HeartbeatScheduler::new();
        assert!(!hb.ack_overdue());
        hb.mark_sent();
        assert!(hb.ack_overdue());
        hb.acknowledge();
        assert!(!hb.ack_overdue());
        hb.mark_sent();
        hb.stop();
        assert!(!hb.ack_overdue());
    }
}
