//! Update windows gate non-patch releases by time of day and day of week.
//!
//! A window is declared with a `from` and `to` time in `HH:MM` format and an optional list of
//! days. All times are evaluated in the time zone of the [`Zoned`] passed in.
//!
//! ```
//! use jiff::{civil::date, tz::TimeZone};
//! use release_rollout::window::{UpdateWindow, is_window_open};
//!
//! let windows = [UpdateWindow::parse("08:00", "10:00", ["Mon"]).expect("valid window")];
//!
//! // 2024-01-01 is a Monday
//! let monday = date(2024, 1, 1).at(9, 0, 0, 0).to_zoned(TimeZone::UTC).expect("valid time");
//! let tuesday = date(2024, 1, 2).at(9, 0, 0, 0).to_zoned(TimeZone::UTC).expect("valid time");
//!
//! assert!(is_window_open(&monday, &windows));
//! assert!(!is_window_open(&tuesday, &windows));
//! ```

use std::num::ParseIntError;

use jiff::{
    Zoned,
    civil::{Time, Weekday},
};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

/// Only used to find the start of the next window, a week always contains every window.
const LOOKAHEAD_DAYS: usize = 8;

#[derive(Debug, Snafu)]
pub enum ParseWindowError {
    #[snafu(display("invalid time {input:?}, expected HH:MM"))]
    InvalidTimeFormat { input: String },

    #[snafu(display("failed to parse time component of {input:?}"))]
    ParseTimeComponent {
        source: ParseIntError,
        input: String,
    },

    #[snafu(display("time {input:?} is out of range"))]
    TimeOutOfRange { source: jiff::Error, input: String },

    #[snafu(display("unknown day {day:?}, expected one of Mon, Tue, Wed, Thu, Fri, Sat, Sun"))]
    UnknownDay { day: String },

    #[snafu(display("window start {from} must be before window end {to}"))]
    InvertedWindow { from: Time, to: Time },
}

/// A recurring day/time range in which non-patch releases may be deployed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawUpdateWindow", into = "RawUpdateWindow")]
pub struct UpdateWindow {
    from: Time,
    to: Time,
    days: Vec<Weekday>,
}

impl UpdateWindow {
    /// Creates a new window. An empty list of `days` means every day.
    pub fn new(from: Time, to: Time, days: Vec<Weekday>) -> Result<Self, ParseWindowError> {
        ensure!(from < to, InvertedWindowSnafu { from, to });

        Ok(Self { from, to, days })
    }

    /// Parses a window from its textual representation, e.g. `("08:00", "10:00", ["Mon"])`.
    pub fn parse<'a>(
        from: &str,
        to: &str,
        days: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ParseWindowError> {
        let days = days
            .into_iter()
            .map(parse_weekday)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(parse_time(from)?, parse_time(to)?, days)
    }

    pub fn from(&self) -> Time {
        self.from
    }

    pub fn to(&self) -> Time {
        self.to
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    /// Returns `true` if the window is open on the given day.
    pub fn applies_on(&self, weekday: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&weekday)
    }

    /// Returns `true` if `now` lies within this window.
    pub fn contains(&self, now: &Zoned) -> bool {
        let time = now.time();
        self.applies_on(now.weekday()) && self.from <= time && time < self.to
    }
}

/// Returns `true` if no windows are configured or at least one of them contains `now`.
pub fn is_window_open(now: &Zoned, windows: &[UpdateWindow]) -> bool {
    windows.is_empty() || windows.iter().any(|window| window.contains(now))
}

/// Returns the earliest point in time, starting at `now`, at which one of the `windows` is open.
///
/// If a window is open right now, `now` is returned.
pub fn next_allowed_time(now: &Zoned, windows: &[UpdateWindow]) -> Zoned {
    if is_window_open(now, windows) {
        return now.clone();
    }

    let mut date = now.date();
    for _ in 0..LOOKAHEAD_DAYS {
        let next_start = windows
            .iter()
            .filter(|window| window.applies_on(date.weekday()))
            .filter_map(|window| {
                date.to_datetime(window.from)
                    .to_zoned(now.time_zone().clone())
                    .ok()
            })
            .filter(|start| start > now)
            .min();

        if let Some(next_start) = next_start {
            return next_start;
        }

        match date.tomorrow() {
            Ok(tomorrow) => date = tomorrow,
            Err(_) => break,
        }
    }

    now.clone()
}

fn parse_time(input: &str) -> Result<Time, ParseWindowError> {
    // A window may last until the end of the day.
    if input == "24:00" {
        return Ok(Time::MAX);
    }

    let (hour, minute) = input
        .split_once(':')
        .context(InvalidTimeFormatSnafu { input })?;
    let hour = hour
        .parse::<i8>()
        .context(ParseTimeComponentSnafu { input })?;
    let minute = minute
        .parse::<i8>()
        .context(ParseTimeComponentSnafu { input })?;

    Time::new(hour, minute, 0, 0).context(TimeOutOfRangeSnafu { input })
}

fn parse_weekday(day: &str) -> Result<Weekday, ParseWindowError> {
    let weekday = match day.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Weekday::Monday,
        "tue" | "tuesday" => Weekday::Tuesday,
        "wed" | "wednesday" => Weekday::Wednesday,
        "thu" | "thursday" => Weekday::Thursday,
        "fri" | "friday" => Weekday::Friday,
        "sat" | "saturday" => Weekday::Saturday,
        "sun" | "sunday" => Weekday::Sunday,
        _ => return UnknownDaySnafu { day }.fail(),
    };

    Ok(weekday)
}

fn weekday_abbreviation(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Monday => "Mon",
        Weekday::Tuesday => "Tue",
        Weekday::Wednesday => "Wed",
        Weekday::Thursday => "Thu",
        Weekday::Friday => "Fri",
        Weekday::Saturday => "Sat",
        Weekday::Sunday => "Sun",
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct RawUpdateWindow {
    from: String,
    to: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    days: Vec<String>,
}

impl TryFrom<RawUpdateWindow> for UpdateWindow {
    type Error = ParseWindowError;

    fn try_from(raw: RawUpdateWindow) -> Result<Self, Self::Error> {
        Self::parse(&raw.from, &raw.to, raw.days.iter().map(String::as_str))
    }
}

impl From<UpdateWindow> for RawUpdateWindow {
    fn from(window: UpdateWindow) -> Self {
        let format = |time: Time| {
            if time == Time::MAX {
                "24:00".to_owned()
            } else {
                format!("{:02}:{:02}", time.hour(), time.minute())
            }
        };

        Self {
            from: format(window.from),
            to: format(window.to),
            days: window
                .days
                .iter()
                .map(|day| weekday_abbreviation(*day).to_owned())
                .collect(),
        }
    }
}
