use crate::error::SubdictError;
use crate::parser;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A clock offset with millisecond precision, shown as `[HH:MM:SS.mmm]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(Duration::from_millis(millis))
    }

    /// Returns `None` when minutes, seconds or millis are out of range.
    pub fn from_parts(hours: u64, minutes: u64, seconds: u64, millis: u64) -> Option<Self> {
        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return None;
        }
        Some(Self::from_millis(
            millis + seconds * 1000 + minutes * 60 * 1000 + hours * 60 * 60 * 1000,
        ))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let total_secs = self.0.as_secs();
        write!(
            fmt,
            "[{:02}:{:02}:{:02}.{:03}]",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60,
            self.0.as_millis() % 1000
        )
    }
}

impl FromStr for Timestamp {
    type Err = SubdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_stored_timestamp(s).ok_or_else(|| SubdictError::InvalidTimestamp(s.to_string()))
    }
}

/// One subtitle entry. `number` always equals the index it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub number: u32,
    pub timestamp: Timestamp,
    pub en: String,
    pub zh: String,
}

impl Row {
    pub fn new(number: u32, timestamp: Timestamp, en: impl Into<String>) -> Self {
        Row {
            number,
            timestamp,
            en: en.into(),
            zh: String::new(),
        }
    }

    pub fn with_zh(&self, zh: impl Into<String>) -> Self {
        Row {
            zh: zh.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "#{} {} {} | {}", self.number, self.timestamp, self.en, self.zh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_display_ts {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (input, expected) = $value;

                assert_eq!(Timestamp::from_millis(input).to_string(), expected);
            }
        )*
        }
    }

    test_display_ts! {
        test_display_ts_0: (0, "[00:00:00.000]"),
        test_display_ts_1: (350, "[00:00:00.350]"),
        test_display_ts_2: (582_350, "[00:09:42.350]"),
        test_display_ts_3: (3_600_001, "[01:00:00.001]"),
        test_display_ts_4: (360_000_001, "[100:00:00.001]"),
    }

    #[test]
    fn from_parts_rejects_out_of_range_fields() {
        assert_eq!(Timestamp::from_parts(0, 60, 0, 0), None);
        assert_eq!(Timestamp::from_parts(0, 0, 60, 0), None);
        assert_eq!(Timestamp::from_parts(0, 0, 0, 1000), None);
        assert_eq!(
            Timestamp::from_parts(1, 1, 1, 200),
            Some(Timestamp::from_millis(3_661_200))
        );
    }

    #[test]
    fn stored_form_parses_back() {
        let ts: Timestamp = "[00:09:42.350]".parse().unwrap();
        assert_eq!(ts, Timestamp::from_millis(582_350));
        assert!("00:09:42.350".parse::<Timestamp>().is_err());
        assert!("[00:09:42.350] trailing".parse::<Timestamp>().is_err());
    }

    #[test]
    fn with_zh_keeps_other_fields() {
        let row = Row::new(3, Timestamp::from_millis(1000), "hello");
        let updated = row.with_zh("你好");
        assert_eq!(updated.number, 3);
        assert_eq!(updated.timestamp, row.timestamp);
        assert_eq!(updated.en, "hello");
        assert_eq!(updated.zh, "你好");
    }
}
