use crate::row::Timestamp;

use std::sync::OnceLock;

use nom::bytes::complete::{tag, take_while_m_n};
use nom::character::complete::one_of;
use nom::combinator::{all_consuming, map_res, opt};
use nom::error::{ErrorKind, VerboseError};
use nom::sequence::{delimited, preceded};
use nom::{error_position, Err, IResult};
use regex::Regex;

/// A pasted `[HH:MM:SS.mmm] English` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedLine {
    pub timestamp: Timestamp,
    pub en: String,
}

/// A pasted `<number> <Chinese>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationLine {
    pub number: u32,
    pub zh: String,
}

/// Returns `None` for anything that does not start with a bracketed timestamp.
pub fn parse_timed_line(line: &str) -> Option<TimedLine> {
    let (rest, timestamp) = bracketed_timestamp(line.trim()).ok()?;
    Some(TimedLine {
        timestamp,
        en: rest.trim().to_string(),
    })
}

/// Splits at the first whitespace run; the remainder is kept verbatim.
pub fn parse_translation_line(line: &str) -> Option<TranslationLine> {
    let caps = translation_line_regex().captures(line.trim())?;
    let number = caps[1].parse().ok()?;
    Some(TranslationLine {
        number,
        zh: caps[2].to_string(),
    })
}

/// Parses the persisted `[HH:MM:SS.mmm]` form, nothing before or after it.
pub fn parse_stored_timestamp(input: &str) -> Option<Timestamp> {
    all_consuming(bracketed_timestamp)(input)
        .ok()
        .map(|(_, ts)| ts)
}

fn translation_line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^([0-9]+)\s+(.+)$").expect("Invalid regex."))
}

fn bracketed_timestamp(input: &str) -> IResult<&str, Timestamp, VerboseError<&str>> {
    delimited(tag("["), timestamp, tag("]"))(input)
}

fn timestamp(input: &str) -> IResult<&str, Timestamp, VerboseError<&str>> {
    const MILLIS_MIN: usize = 1;
    const MILLIS_MAX: usize = 3;
    let take_millis = map_res(
        take_while_m_n(MILLIS_MIN, MILLIS_MAX, |c: char| c.is_ascii_digit()),
        // `.35` means 350ms, so pad on the right.
        |s: &str| format!("{:0<3}", s).parse::<u64>(),
    );

    const HMS_DIGITS: usize = 2;
    let take_hms = || {
        map_res(
            take_while_m_n(HMS_DIGITS, HMS_DIGITS, |c: char| c.is_ascii_digit()),
            |s: &str| s.parse::<u64>(),
        )
    };

    let (input, hours) = take_hms()(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, minutes) = take_hms()(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, seconds) = take_hms()(input)?;
    let (input, millis) = opt(preceded(one_of(".,"), take_millis))(input)?;

    match Timestamp::from_parts(hours, minutes, seconds, millis.unwrap_or(0)) {
        Some(ts) => Ok((input, ts)),
        None => Err(Err::Error(error_position!(input, ErrorKind::Verify))),
    }
}
