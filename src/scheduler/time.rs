//! Daily fire time

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike};
use rand::Rng;
use std::fmt;

use super::error::{SchedulerError, SchedulerResult};

/// Time of day (or window) at which the daily push fires
///
/// Written as `"HH:MM"` or `"HH:MM-HH:MM"`. For a window, one minute inside
/// it is drawn each time the scheduler starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    start: NaiveTime,
    end: NaiveTime,
}

impl Default for ScheduleTime {
    fn default() -> Self {
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN);
        Self {
            start: eight,
            end: eight,
        }
    }
}

fn parse_clock(value: &str, full: &str) -> SchedulerResult<NaiveTime> {
    let (hour, minute) = value
        .trim()
        .split_once(':')
        .ok_or_else(|| SchedulerError::invalid_time(full, "expected HH:MM"))?;

    let hour: u32 = hour
        .parse()
        .map_err(|_| SchedulerError::invalid_time(full, "hour is not a number"))?;
    let minute: u32 = minute
        .parse()
        .map_err(|_| SchedulerError::invalid_time(full, "minute is not a number"))?;

    if hour > 23 {
        return Err(SchedulerError::invalid_time(full, "hour must be 0-23"));
    }
    if minute > 59 {
        return Err(SchedulerError::invalid_time(full, "minute must be 0-59"));
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| SchedulerError::invalid_time(full, "not a valid time of day"))
}

impl ScheduleTime {
    /// Parse `"HH:MM"` or `"HH:MM-HH:MM"`
    pub fn parse(value: &str) -> SchedulerResult<Self> {
        match value.split_once('-') {
            Some((start, end)) => {
                let start = parse_clock(start, value)?;
                let end = parse_clock(end, value)?;
                if end < start {
                    return Err(SchedulerError::invalid_time(
                        value,
                        "window must not end before it starts",
                    ));
                }
                Ok(Self { start, end })
            }
            None => {
                let at = parse_clock(value, value)?;
                Ok(Self { start: at, end: at })
            }
        }
    }

    /// Parse, falling back to 08:00 on malformed input
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to 08:00 schedule");
            Self::default()
        })
    }

    /// Whether a random minute is drawn
    pub fn is_window(&self) -> bool {
        self.start != self.end
    }

    /// Earliest fire time
    pub fn start(&self) -> NaiveTime {
        self.start
    }

    /// Latest fire time
    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Draw the concrete fire time
    pub fn pick(&self) -> NaiveTime {
        if !self.is_window() {
            return self.start;
        }
        let first = self.start.num_seconds_from_midnight() / 60;
        let last = self.end.num_seconds_from_midnight() / 60;
        let minute = rand::thread_rng().gen_range(first..=last);
        NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap_or(self.start)
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_window() {
            write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
        } else {
            write!(f, "{}", self.start.format("%H:%M"))
        }
    }
}

/// Next instant strictly after `now` whose wall-clock time is `at`
///
/// Days where `at` does not exist (a DST gap) are skipped.
pub fn next_occurrence<Tz: TimeZone>(at: NaiveTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    for offset in 0..=2 {
        let candidate = (today + Duration::days(offset)).and_time(at);
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            if dt > *now {
                return dt;
            }
        }
    }
    now.clone() + Duration::days(1)
}

/// Next occurrence of `at` strictly after both `now` and the previous fire
///
/// A wall clock lagging the timer that just expired must not yield the same
/// slot again.
pub fn next_fire<Tz: TimeZone>(
    at: NaiveTime,
    now: &DateTime<Tz>,
    previous: Option<&DateTime<Tz>>,
) -> DateTime<Tz> {
    let floor = match previous {
        Some(prev) if prev.clone() + Duration::seconds(1) > *now => {
            prev.clone() + Duration::seconds(1)
        }
        _ => now.clone(),
    };
    next_occurrence(at, &floor)
}
