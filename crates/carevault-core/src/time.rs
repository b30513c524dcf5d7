//! Injectable time source.
//!
//! Every expiry comparison and timestamp in CareVault reads "now" through a
//! [`Clock`] so tests can pin and advance time deterministically.

use std::sync::Arc;

use parking_lot::RwLock;
use time::{Duration, OffsetDateTime};
use time::format_description::well_known::Rfc3339;

use crate::error::{CoreError, Result};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Shared clock handle.
pub type DynClock = Arc<dyn Clock>;

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, instant: OffsetDateTime) {
        *self.now.write() = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.read()
    }
}

pub fn system_clock() -> DynClock {
    Arc::new(SystemClock)
}

pub fn format_rfc3339(instant: OffsetDateTime) -> String {
    instant.format(&Rfc3339).unwrap_or_default()
}

pub fn parse_rfc3339(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| CoreError::invalid_date_time(format!("Failed to parse date time '{s}': {e}")))
}
