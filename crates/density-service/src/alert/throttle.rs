use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source for the throttle
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// The attempt may proceed; `at` is now the last alert time
    Permit { at: Instant },
    /// Still inside the cooldown window
    Suppressed { remaining: Duration },
}

/// Single-window cooldown shared by every alert the process sends.
///
/// Checking the window and recording the new attempt happen under one lock,
/// so two concurrent callers can never both be permitted inside a window.
pub struct AlertThrottle {
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    last_alert: Mutex<Option<Instant>>,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown,
            clock,
            last_alert: Mutex::new(None),
        }
    }

    pub fn with_system_clock(cooldown: Duration) -> Self {
        Self::new(cooldown, Arc::new(SystemClock))
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn try_acquire(&self) -> ThrottleDecision {
        let now = self.clock.now();
        let mut last_alert = match self.last_alert.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(last) = *last_alert {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return ThrottleDecision::Suppressed {
                    remaining: self.cooldown - elapsed,
                };
            }
        }

        *last_alert = Some(now);
        ThrottleDecision::Permit { at: now }
    }

    /// Time of the last permitted attempt
    pub fn last_alert(&self) -> Option<Instant> {
        match self.last_alert.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
