use std::time::Duration;

/// Outcome of asking the policy for another automatic attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the attempt after `delay`.
    Scheduled { attempt: u32, delay: Duration },
    /// Automatic retries were switched off by a manual disconnect.
    Disabled,
    /// A rejoin is already waiting on its delay.
    InFlight,
    /// This request spent the last attempt.
    Exhausted { attempts: u32 },
    /// The budget was spent earlier; nothing is scheduled.
    Halted,
}

/// Bounded retry budget shared by transport reconnects and voice rejoins.
///
/// The delay is fixed. `attempts` only grows until a confirmed voice
/// placement calls [`reset`](Self::reset) or a manual disconnect calls
/// [`disable`](Self::disable).
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    enabled: bool,
    delay: Duration,
    max_retries: u32,
    attempts: u32,
    rejoin_in_flight: bool,
    exhausted: bool,
}

impl ReconnectPolicy {
    pub fn new(enabled: bool, delay: Duration, max_retries: u32) -> Self {
        Self {
            enabled,
            delay,
            max_retries,
            attempts: 0,
            rejoin_in_flight: false,
            exhausted: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn rejoin_in_flight(&self) -> bool {
        self.rejoin_in_flight
    }

    /// Request a transport reconnect.
    pub fn next_reconnect(&mut self) -> RetryDecision {
        if !self.enabled {
            return RetryDecision::Disabled;
        }
        self.consume_attempt()
    }

    /// Request a voice rejoin. On success the reentrancy guard is held until
    /// [`finish_rejoin`](Self::finish_rejoin).
    pub fn begin_rejoin(&mut self) -> RetryDecision {
        if !self.enabled {
            return RetryDecision::Disabled;
        }
        if self.rejoin_in_flight {
            return RetryDecision::InFlight;
        }
        let decision = self.consume_attempt();
        if matches!(decision, RetryDecision::Scheduled { .. }) {
            self.rejoin_in_flight = true;
        }
        decision
    }

    pub fn finish_rejoin(&mut self) {
        self.rejoin_in_flight = false;
    }

    /// A confirmed placement refills the budget.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
    }

    /// Stop all automatic scheduling until [`enable`](Self::enable).
    pub fn disable(&mut self) {
        self.enabled = false;
        self.rejoin_in_flight = false;
        self.reset();
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    fn consume_attempt(&mut self) -> RetryDecision {
        if self.exhausted {
            return RetryDecision::Halted;
        }
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts < self.max_retries {
            RetryDecision::Scheduled {
                attempt: self.attempts,
                delay: self.delay,
            }
        } else {
            self.exhausted = true;
            RetryDecision::Exhausted {
                attempts: self.attempts,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(5);

    #[test]
    fn reconnects_until_bound() {
        let mut policy = ReconnectPolicy::new(true, DELAY, 3);
        assert_eq!(
            policy.next_reconnect(),
            RetryDecision::Scheduled { attempt: 1, delay: DELAY }
        );
        assert_eq!(
            policy.next_reconnect(),
            RetryDecision::Scheduled { attempt: 2, delay: DELAY }
        );
        assert_eq!(policy.next_reconnect(), RetryDecision::Exhausted { attempts: 3 });
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_reconnect(), RetryDecision::Halted);
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn rejoin_and_reconnect_share_counter() {
        let mut policy = ReconnectPolicy::new(true, DELAY, 3);
        assert!(matches!(policy.begin_rejoin(), RetryDecision::Scheduled { attempt: 1, .. }));
        policy.finish_rejoin();
        assert!(matches!(policy.next_reconnect(), RetryDecision::Scheduled { attempt: 2, .. }));
        assert_eq!(policy.begin_rejoin(), RetryDecision::Exhausted { attempts: 3 });
        assert!(!policy.rejoin_in_flight());
    }

    #[test]
    fn guard_blocks_second_rejoin() {
        let mut policy = ReconnectPolicy::new(true, DELAY, 10);
        assert!(matches!(policy.begin_rejoin(), RetryDecision::Scheduled { .. }));
        assert_eq!(policy.begin_rejoin(), RetryDecision::InFlight);
        assert_eq!(policy.attempts(), 1);
        policy.finish_rejoin();
        assert!(matches!(policy.begin_rejoin(), RetryDecision::Scheduled { attempt: 2, .. }));
    }

    #[test]
    fn disable_is_sticky() {
        let mut policy = ReconnectPolicy::new(true, DELAY, 10);
        policy.next_reconnect();
        policy.disable();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_reconnect(), RetryDecision::Disabled);
        assert_eq!(policy.begin_rejoin(), RetryDecision::Disabled);
        policy.enable();
        assert!(matches!(policy.next_reconnect(), RetryDecision::Scheduled { attempt: 1, .. }));
    }

    #[test]
    fn reset_recovers_from_exhaustion() {
        let mut policy = ReconnectPolicy::new(true, DELAY, 1);
        assert_eq!(policy.next_reconnect(), RetryDecision::Exhausted { attempts: 1 });
        policy.reset();
        assert!(!policy.is_exhausted());
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn disabled_from_config() {
        let mut policy = ReconnectPolicy::new(false, DELAY, 10);
        assert_eq!(policy.next_reconnect(), RetryDecision::Disabled);
        assert_eq!(policy.attempts(), 0);
    }
}
