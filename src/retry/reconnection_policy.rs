use derive_more::Constructor;
#[cfg(test)]
use mockall::automock;
use rand::Rng;
use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Produces the delays between consecutive attempts of one reconnection
/// episode.
pub trait ReconnectionSchedule {
    /// Returns the next reconnect delay, or `None` if no further attempt
    /// should be made.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Creates reconnection schedules when the control connection is lost.
#[cfg_attr(test, automock)]
pub trait ReconnectionPolicy {
    /// Creates a fresh schedule for a new reconnection episode.
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync>;
}

/// Schedules reconnection at a constant interval.
#[derive(Copy, Clone, Constructor, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ConstantReconnectionPolicy {
    interval: Duration,
}

impl Default for ConstantReconnectionPolicy {
    fn default() -> Self {
        ConstantReconnectionPolicy::new(DEFAULT_BASE_DELAY)
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(ConstantReconnectionSchedule::new(self.interval))
    }
}

#[derive(Constructor)]
struct ConstantReconnectionSchedule {
    interval: Duration,
}

impl ReconnectionSchedule for ConstantReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// Never schedules reconnections.
#[derive(Default, Copy, Clone, Debug, PartialEq, Ord, PartialOrd, Eq, Hash)]
pub struct NeverReconnectionPolicy;

impl ReconnectionPolicy for NeverReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(NeverReconnectionSchedule)
    }
}

struct NeverReconnectionSchedule;

impl ReconnectionSchedule for NeverReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }
}

/// Doubles the delay on every attempt until a maximum is reached, with a
/// +/-15% jitter to keep reconnecting clients from thundering in unison.
#[derive(Copy, Clone, Constructor, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct ExponentialReconnectionPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for ExponentialReconnectionPolicy {
    fn default() -> Self {
        ExponentialReconnectionPolicy::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule + Send + Sync> {
        Box::new(ExponentialReconnectionSchedule {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            attempt: 0,
        })
    }
}

struct ExponentialReconnectionSchedule {
    base_delay: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl ReconnectionSchedule for ExponentialReconnectionSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        let delay = self
            .base_delay
            .saturating_mul(1u32.checked_shl(self.attempt).unwrap_or(u32::MAX))
            .min(self.max_delay);

        self.attempt = self.attempt.saturating_add(1);

        let jitter = rand::rng().random_range(85..116);

        Some(
            (delay / 100)
                .saturating_mul(jitter)
                .clamp(self.base_delay, self.max_delay),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_schedule_repeats_interval() {
        let mut schedule = ConstantReconnectionPolicy::new(Duration::from_secs(2)).new_schedule();

        for _ in 0..4 {
            assert_eq!(schedule.next_delay(), Some(Duration::from_secs(2)));
        }
    }

    #[test]
    fn never_schedule_stops_immediately() {
        assert_eq!(NeverReconnectionPolicy.new_schedule().next_delay(), None);
    }

    #[test]
    fn exponential_schedule_grows_and_caps() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(8);
        let mut schedule = ExponentialReconnectionPolicy::new(base, max).new_schedule();

        let mut previous = Duration::ZERO;
        for _ in 0..8 {
            let delay = schedule.next_delay().unwrap();
            assert!(delay >= base);
            assert!(delay <= max);
            assert!(delay >= previous || delay == max || previous >= max.mul_f64(0.85));
            previous = delay;
        }
    }

    #[test]
    fn exponential_schedule_survives_many_attempts() {
        let mut schedule = ExponentialReconnectionSchedule {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            attempt: u32::MAX,
        };

        assert!(schedule.next_delay().is_some());
    }
}
