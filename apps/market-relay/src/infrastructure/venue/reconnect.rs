//! Reconnection Policy
//!
//! Exponential backoff with additive jitter for venue reconnection.
//!
//! Delays grow as `initial_delay * multiplier^attempt`, plus a random
//! non-negative jitter, and are clamped to `max_delay`. The attempt counter
//! only resets once a connection has stayed `Ready` for the grace period,
//! so a link that flaps right after the handshake keeps backing off.
//!
//! The policy is a plain state machine driven with explicit instants; the
//! session's connection loop owns the timer.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay, jitter included.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles the delay each attempt).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 adds up to 10%).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
    /// How long a connection must stay ready before backoff resets.
    pub grace_period: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
            grace_period: Duration::from_secs(30),
        }
    }
}

/// Reconnection policy implementing exponential backoff with jitter.
///
/// # Example
///
/// ```rust
/// use market_relay::infrastructure::venue::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     jitter_factor: 0.0,
///     ..ReconnectConfig::default()
/// });
///
/// let now = Instant::now();
/// assert_eq!(policy.next_delay(now), Some(Duration::from_millis(500)));
/// assert_eq!(policy.next_delay(now), Some(Duration::from_secs(1)));
/// assert_eq!(policy.attempt_count(), 2);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
    ready_since: Option<Instant>,
    next_retry_at: Option<Instant>,
    stopped: bool,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
            ready_since: None,
            next_retry_at: None,
            stopped: false,
        }
    }

    /// Schedule the next attempt and return how long to wait for it.
    ///
    /// Returns `None` once stopped or when max attempts are exhausted.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        if !self.should_retry() {
            self.next_retry_at = None;
            return None;
        }

        self.attempt_count += 1;

        let delay = self.apply_jitter(self.current_delay).min(self.config.max_delay);
        self.current_delay = self.scaled(self.current_delay);
        self.next_retry_at = Some(now + delay);

        Some(delay)
    }

    /// Record that a connection reached `Ready` at `at`.
    pub const fn on_ready(&mut self, at: Instant) {
        self.ready_since = Some(at);
        self.next_retry_at = None;
    }

    /// Record that the connection was lost at `at`.
    ///
    /// Resets backoff if the connection had been ready for at least the
    /// grace period.
    pub fn on_disconnected(&mut self, at: Instant) {
        if let Some(since) = self.ready_since.take()
            && at.saturating_duration_since(since) >= self.config.grace_period
        {
            self.reset();
        }
    }

    /// Reset the attempt counter if the current ready period has already
    /// outlasted the grace period.
    pub fn settle(&mut self, now: Instant) {
        if let Some(since) = self.ready_since
            && now.saturating_duration_since(since) >= self.config.grace_period
            && self.attempt_count > 0
        {
            self.reset();
        }
    }

    /// Reset backoff to its initial state.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
        self.next_retry_at = None;
    }

    /// Suppress any further attempts.
    pub const fn stop(&mut self) {
        self.stopped = true;
        self.next_retry_at = None;
    }

    /// Whether [`stop`](Self::stop) was called.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Time remaining until the scheduled attempt, if any.
    #[must_use]
    pub fn next_retry_in(&self, now: Instant) -> Option<Duration> {
        self.next_retry_at
            .map(|at| at.saturating_duration_since(now))
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        !self.stopped
            && (self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts)
    }

    fn scaled(&self, delay: Duration) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    /// Add `0 ..= jitter_factor * duration` of random delay.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let jitter_range = duration.as_millis() as f64 * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(0.0..=jitter_range);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jitter_ms = jitter as u64;
        duration + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_ms: u64, max_ms: u64, max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
            grace_period: Duration::from_secs(30),
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 0);
    }

    #[test]
    fn policy_exponential_backoff_capped() {
        let mut policy = ReconnectPolicy::new(no_jitter(100, 1000, 0));
        let now = Instant::now();

        let delays: Vec<u128> = (0..7)
            .map(|_| policy.next_delay(now).unwrap().as_millis())
            .collect();

        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000, 1000]);
    }

    #[test]
    fn policy_jitter_is_additive_and_capped() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_millis(3000),
                multiplier: 2.0,
                jitter_factor: 0.5,
                max_attempts: 0,
                grace_period: Duration::from_secs(1),
            });
            let now = Instant::now();

            let mut previous = Duration::ZERO;
            for attempt in 0..6 {
                let delay = policy.next_delay(now).unwrap();
                assert!(delay <= Duration::from_millis(3000), "attempt {attempt}: {delay:?}");
                if attempt == 0 {
                    assert!(delay >= Duration::from_millis(1000));
                }
                assert!(delay >= previous, "delays must not decrease");
                previous = delay;
            }
        }
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy = ReconnectPolicy::new(no_jitter(100, 1000, 3));
        let now = Instant::now();

        for expected in 1..=3 {
            assert!(policy.next_delay(now).is_some());
            assert_eq!(policy.attempt_count(), expected);
        }

        assert!(policy.next_delay(now).is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn short_ready_period_does_not_reset_backoff() {
        let mut policy = ReconnectPolicy::new(no_jitter(100, 10_000, 0));
        let t0 = Instant::now();

        let _ = policy.next_delay(t0);
        let _ = policy.next_delay(t0);
        policy.on_ready(t0);
        policy.on_disconnected(t0 + Duration::from_secs(5));

        assert_eq!(policy.attempt_count(), 2);
        assert_eq!(policy.next_delay(t0), Some(Duration::from_millis(400)));
    }

    #[test]
    fn sustained_ready_period_resets_backoff() {
        let mut policy = ReconnectPolicy::new(no_jitter(100, 10_000, 0));
        let t0 = Instant::now();

        let _ = policy.next_delay(t0);
        let _ = policy.next_delay(t0);
        policy.on_ready(t0);
        policy.on_disconnected(t0 + Duration::from_secs(31));

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(t0), Some(Duration::from_millis(100)));
    }

    #[test]
    fn settle_resets_during_long_ready_period() {
        let mut policy = ReconnectPolicy::new(no_jitter(100, 10_000, 0));
        let t0 = Instant::now();

        let _ = policy.next_delay(t0);
        policy.on_ready(t0);

        policy.settle(t0 + Duration::from_secs(10));
        assert_eq!(policy.attempt_count(), 1);

        policy.settle(t0 + Duration::from_secs(30));
        assert_eq!(policy.attempt_count(), 0);
    }

    #[test]
    fn next_retry_eta_tracks_schedule() {
        let mut policy = ReconnectPolicy::new(no_jitter(1000, 10_000, 0));
        let t0 = Instant::now();

        assert_eq!(policy.next_retry_in(t0), None);
        let _ = policy.next_delay(t0);
        assert_eq!(
            policy.next_retry_in(t0 + Duration::from_millis(400)),
            Some(Duration::from_millis(600))
        );

        policy.on_ready(t0 + Duration::from_secs(1));
        assert_eq!(policy.next_retry_in(t0), None);
    }

    #[test]
    fn stop_suppresses_attempts() {
        let mut policy = ReconnectPolicy::new(no_jitter(100, 1000, 0));
        let now = Instant::now();

        let _ = policy.next_delay(now);
        policy.stop();

        assert!(policy.is_stopped());
        assert!(policy.next_delay(now).is_none());
        assert_eq!(policy.next_retry_in(now), None);
    }
}
