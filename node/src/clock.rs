use std::{thread, time::Duration};

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

use smarthub_common::{Clock, ConfigError};

/// Anything before 2016-01-01 is the RTC counting up from zero after boot,
/// not a synchronised clock.
const SYNCED_AFTER_EPOCH: i64 = 1_451_606_400;

pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
}

pub fn local_time(now: DateTime<Utc>, timezone: Tz) -> Option<NaiveDateTime> {
    if now.timestamp() < SYNCED_AFTER_EPOCH {
        return None;
    }
    Some(now.with_timezone(&timezone).naive_local())
}

/// System time rendered in a fixed timezone; sleeps on the calling thread.
pub struct WallClock {
    timezone: Tz,
}

impl WallClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Clock for WallClock {
    fn now(&self) -> Option<NaiveDateTime> {
        local_time(Utc::now(), self.timezone)
    }

    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
