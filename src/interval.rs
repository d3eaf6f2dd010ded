use duration_string::DurationString;
use std::{fmt, str::FromStr, time::Duration};

const SECONDS_IN_HOUR: u64 = 60 * 60;

/// A duration given on the command line.
///
/// Can be a number postfixed with a unit (`90s`, `30m`, `8h`, `1d`), several of
/// these chained together (`2h30m`), or a bare number, which means hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval(Duration);

impl Interval {
    pub fn new(duration: Duration) -> Self {
        Interval(duration)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Interval> for Duration {
    fn from(value: Interval) -> Self {
        value.0
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(String::from("the duration cannot be empty"));
        }

        if let Ok(hours) = s.parse::<u64>() {
            return hours
                .checked_mul(SECONDS_IN_HOUR)
                .map(|secs| Interval(Duration::from_secs(secs)))
                .ok_or_else(|| format!("{s} hours is too long"));
        }

        let mut total = Duration::ZERO;
        for segment in split_segments(s) {
            let part: DurationString = segment.parse().map_err(|err| {
                format!("cannot parse {s:?}, use a number with s, m, h or d ({err})")
            })?;
            total = total
                .checked_add(part.into())
                .ok_or_else(|| format!("{s} is too long"))?;
        }

        Ok(Interval(total))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", DurationString::new(self.0))
    }
}

// Split "2h30m" into "2h" and "30m": a new segment starts where a digit follows a unit.
fn split_segments(s: &str) -> Vec<&str> {
    let mut segments = vec![];
    let mut start = 0;
    let mut previous: Option<char> = None;

    for (i, ch) in s.char_indices() {
        if ch.is_ascii_digit() && previous.is_some_and(|p| p.is_ascii_alphabetic()) {
            segments.push(&s[start..i]);
            start = i;
        }
        previous = Some(ch);
    }
    segments.push(&s[start..]);

    segments
}

/// Format a remaining time for humans, e.g. `6h 59m`, `4m 10s` or `12s`.
pub fn format_remaining(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
