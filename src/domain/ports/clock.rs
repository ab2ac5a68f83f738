//! An injectable clock source (`spec.md` §9: "Cached resolver TTL via wall
//! clock... inject a clock source for deterministic tests"), used by the
//! resolver's TTL check and the priority calculator's urgency term.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock, used everywhere outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
