use chrono::{DateTime, Utc};

/// Time source for window promotion and date validation. Injected so the
/// lazy promotion rules can be tested without real delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
