use crate::config::ReconnectConfig;
use std::time::Duration;

/// Doubling reconnect delay, capped, with an optional attempt limit.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempts: u32,
    next: Duration,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        let initial = Duration::from_millis(config.initial_backoff_ms);
        Self {
            initial,
            max: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            max_attempts: config.max_attempts,
            attempts: 0,
            next: initial,
        }
    }

    /// Delay before the next attempt, or `None` once the limit is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts != 0 && self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        Some(delay)
    }

    #[inline]
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next = self.initial;
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
