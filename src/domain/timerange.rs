//! TAMS timerange strings.
//!
//! A timerange is written `[<secs>:<nanos>_<secs>:<nanos>)`. The leading and
//! trailing brackets select whether each bound is inclusive (`[`, `]`) or
//! exclusive (`(`, `)`); a missing bracket means inclusive. Either side of the
//! `_` may be left empty for an unbounded side. The literal `()` is the
//! all-time range.

use regex::{Captures, Regex};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const ALL_TIME: &str = "()";

static TIMERANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\[\(])?(?:([0-9]+):([0-9]+))?_(?:([0-9]+):([0-9]+))?([\]\)])?$")
        .expect("timerange pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerangeError {
    #[error("malformed timerange {0:?}")]
    Malformed(String),
    #[error("timerange {0:?} has a component out of range")]
    OutOfRange(String),
    #[error("timerange {0:?} ends before it starts")]
    Inverted(String),
}

/// A point on the TAMS timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeMoment {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl TimeMoment {
    pub fn new(seconds: u64, nanoseconds: u32) -> Result<Self, TimerangeError> {
        if u64::from(nanoseconds) >= NANOS_PER_SECOND {
            return Err(TimerangeError::OutOfRange(format!(
                "{}:{}",
                seconds, nanoseconds
            )));
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    /// Negative inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        let secs = secs.max(0.0);
        let whole = secs.trunc();
        let nanos = ((secs - whole) * NANOS_PER_SECOND as f64).round() as u64;
        if nanos >= NANOS_PER_SECOND {
            Self {
                seconds: whole as u64 + 1,
                nanoseconds: 0,
            }
        } else {
            Self {
                seconds: whole as u64,
                nanoseconds: nanos as u32,
            }
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + f64::from(self.nanoseconds) / NANOS_PER_SECOND as f64
    }

    fn as_duration(&self) -> Duration {
        Duration::new(self.seconds, self.nanoseconds)
    }
}

impl fmt::Display for TimeMoment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds, self.nanoseconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timerange {
    pub start: Option<TimeMoment>,
    pub end: Option<TimeMoment>,
    pub includes_start: bool,
    pub includes_end: bool,
}

impl Timerange {
    pub const fn all_time() -> Self {
        Self {
            start: None,
            end: None,
            includes_start: true,
            includes_end: true,
        }
    }

    /// Half-open range `[start_end)`.
    pub fn between(start: TimeMoment, end: TimeMoment) -> Result<Self, TimerangeError> {
        let range = Self {
            start: Some(start),
            end: Some(end),
            includes_start: true,
            includes_end: false,
        };
        if start > end {
            return Err(TimerangeError::Inverted(range.to_string()));
        }
        Ok(range)
    }

    pub fn is_all_time(&self) -> bool {
        *self == Self::all_time()
    }

    /// `None` when either side is unbounded.
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.start?, self.end?);
        end.as_duration().checked_sub(start.as_duration())
    }

    pub fn contains(&self, moment: TimeMoment) -> bool {
        let after_start = match self.start {
            Some(start) if self.includes_start => moment >= start,
            Some(start) => moment > start,
            None => true,
        };
        let before_end = match self.end {
            Some(end) if self.includes_end => moment <= end,
            Some(end) => moment < end,
            None => true,
        };
        after_start && before_end
    }
}

impl fmt::Display for Timerange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all_time() {
            return f.write_str(ALL_TIME);
        }
        f.write_str(if self.includes_start { "[" } else { "(" })?;
        if let Some(start) = self.start {
            write!(f, "{}", start)?;
        }
        f.write_str("_")?;
        if let Some(end) = self.end {
            write!(f, "{}", end)?;
        }
        f.write_str(if self.includes_end { "]" } else { ")" })
    }
}

impl FromStr for Timerange {
    type Err = TimerangeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input == ALL_TIME {
            return Ok(Self::all_time());
        }
        let caps = TIMERANGE_PATTERN
            .captures(input)
            .ok_or_else(|| TimerangeError::Malformed(input.to_owned()))?;

        let start = moment_at(&caps, 2, input)?;
        let end = moment_at(&caps, 4, input)?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(TimerangeError::Inverted(input.to_owned()));
            }
        }

        Ok(Self {
            start,
            end,
            includes_start: caps.get(1).map_or(true, |m| m.as_str() == "["),
            includes_end: caps.get(6).map_or(true, |m| m.as_str() == "]"),
        })
    }
}

fn moment_at(
    caps: &Captures<'_>,
    group: usize,
    input: &str,
) -> Result<Option<TimeMoment>, TimerangeError> {
    let (Some(seconds), Some(nanos)) = (caps.get(group), caps.get(group + 1)) else {
        return Ok(None);
    };
    let out_of_range = || TimerangeError::OutOfRange(input.to_owned());
    let seconds: u64 = seconds.as_str().parse().map_err(|_| out_of_range())?;
    let nanos: u64 = nanos.as_str().parse().map_err(|_| out_of_range())?;
    let nanos = u32::try_from(nanos).map_err(|_| out_of_range())?;
    TimeMoment::new(seconds, nanos)
        .map(Some)
        .map_err(|_| out_of_range())
}

impl Serialize for Timerange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timerange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moment(seconds: u64, nanoseconds: u32) -> TimeMoment {
        TimeMoment::new(seconds, nanoseconds).unwrap()
    }

    #[test]
    fn test_parse_half_open() {
        let range: Timerange = "[0:0_10:0)".parse().unwrap();
        assert_eq!(range.start, Some(moment(0, 0)));
        assert_eq!(range.end, Some(moment(10, 0)));
        assert!(range.includes_start);
        assert!(!range.includes_end);
    }

    #[test]
    fn test_canonical_input_formats_unchanged() {
        for input in ["[0:0_10:0)", "(5:40000000_6:0]", "[_100:0)", "(3:0_)", "(_)"] {
            let range: Timerange = input.parse().unwrap();
            assert_eq!(range.to_string(), input);
        }
    }

    #[test]
    fn test_missing_brackets_are_inclusive() {
        let range: Timerange = "1:0_2:0".parse().unwrap();
        assert!(range.includes_start);
        assert!(range.includes_end);
        assert_eq!(range.to_string(), "[1:0_2:0]");
    }

    #[test]
    fn test_all_time_round_trip() {
        let range: Timerange = "()".parse().unwrap();
        assert_eq!(range.start, None);
        assert_eq!(range.end, None);
        assert!(range.includes_start);
        assert!(range.includes_end);
        assert!(range.is_all_time());
        assert_eq!(range.to_string(), "()");
    }

    #[test]
    fn test_round_trip_for_every_bracket_combination() {
        let bounds = [
            (Some(moment(0, 0)), Some(moment(10, 0))),
            (Some(moment(1_700_000_000, 999_999_999)), None),
            (None, Some(moment(42, 1))),
        ];
        for (start, end) in bounds {
            for includes_start in [true, false] {
                for includes_end in [true, false] {
                    let range = Timerange {
                        start,
                        end,
                        includes_start,
                        includes_end,
                    };
                    let parsed: Timerange = range.to_string().parse().unwrap();
                    assert_eq!(parsed, range, "{}", range);
                }
            }
        }
    }

    #[test]
    fn test_nanoseconds_are_unscaled() {
        let range: Timerange = "[1:500000000_2:5)".parse().unwrap();
        assert_eq!(range.start.unwrap().as_secs_f64(), 1.5);
        assert!((range.end.unwrap().as_secs_f64() - 2.000000005).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_malformed_input() {
        for input in ["", "0:0-10:0", "[a:0_1:0)", "[0_1:0)", "[0:0_1:0)x", "{0:0_1:0}", "[0:0:0_1:0)"] {
            assert_eq!(
                input.parse::<Timerange>(),
                Err(TimerangeError::Malformed(input.to_string())),
                "{}",
                input
            );
        }
    }

    #[test]
    fn test_rejects_out_of_range_and_inverted() {
        assert!(matches!(
            "[0:1000000000_1:0)".parse::<Timerange>(),
            Err(TimerangeError::OutOfRange(_))
        ));
        assert!(matches!(
            "[99999999999999999999:0_)".parse::<Timerange>(),
            Err(TimerangeError::OutOfRange(_))
        ));
        assert!(matches!(
            "[10:0_5:0)".parse::<Timerange>(),
            Err(TimerangeError::Inverted(_))
        ));
        assert!(Timerange::between(moment(2, 0), moment(1, 0)).is_err());
    }

    #[test]
    fn test_contains_respects_inclusivity() {
        let range: Timerange = "[10:0_20:0)".parse().unwrap();
        assert!(range.contains(moment(10, 0)));
        assert!(range.contains(moment(19, 999_999_999)));
        assert!(!range.contains(moment(20, 0)));
        assert!(!range.contains(moment(9, 0)));
        assert!(Timerange::all_time().contains(moment(u64::MAX, 0)));
    }

    #[test]
    fn test_duration() {
        let range = Timerange::between(moment(1, 500_000_000), moment(3, 0)).unwrap();
        assert_eq!(range.duration(), Some(Duration::from_millis(1500)));
        assert_eq!("[1:0_)".parse::<Timerange>().unwrap().duration(), None);
    }

    #[test]
    fn test_from_secs_f64() {
        assert_eq!(TimeMoment::from_secs_f64(12.25), moment(12, 250_000_000));
        assert_eq!(TimeMoment::from_secs_f64(-3.0), moment(0, 0));
    }

    #[test]
    fn test_serde_uses_string_form() {
        let range: Timerange = serde_json::from_str("\"[0:0_10:0)\"").unwrap();
        assert_eq!(serde_json::to_string(&range).unwrap(), "\"[0:0_10:0)\"");
        assert!(serde_json::from_str::<Timerange>("\"bogus\"").is_err());
    }
}
