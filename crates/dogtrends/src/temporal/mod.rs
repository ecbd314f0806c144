use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::models::Weekday;

pub const MAX_OFFSET_HOURS: i8 = 23;

/// Whole-hour shift applied to UTC timestamps to approximate a local
/// timezone. `UTC-6` moves every instant six hours earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HourOffset {
    hours: i8,
}

impl HourOffset {
    pub const UTC: Self = Self { hours: 0 };

    pub fn new(hours: i8) -> Result<Self> {
        if !(-MAX_OFFSET_HOURS..=MAX_OFFSET_HOURS).contains(&hours) {
            bail!("utc offset must be within +/-{MAX_OFFSET_HOURS} hours, got {hours}");
        }
        Ok(Self { hours })
    }

    #[must_use]
    pub const fn hours(self) -> i8 {
        self.hours
    }

    #[must_use]
    pub const fn is_utc(self) -> bool {
        self.hours == 0
    }

    /// Modifier understood by SQLite's `datetime()`.
    #[must_use]
    pub fn sqlite_modifier(self) -> String {
        format!("{:+} hours", self.hours)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let candidate = raw.trim();
        if candidate.is_empty() {
            bail!("utc offset input is empty");
        }
        if candidate.eq_ignore_ascii_case("utc") || candidate.eq_ignore_ascii_case("z") {
            return Ok(Self::UTC);
        }

        let captures = offset_regex()
            .captures(candidate)
            .ok_or_else(|| anyhow!("unsupported utc offset format: {candidate}"))?;
        if let Some(minutes) = captures.get(3)
            && minutes.as_str() != "00"
        {
            bail!("utc offset must be whole hours: {candidate}");
        }

        let magnitude = captures
            .get(2)
            .map(|hours| hours.as_str())
            .unwrap_or_default()
            .parse::<i8>()
            .map_err(|_| anyhow!("utc offset hours are out of range: {candidate}"))?;
        let negative = captures.get(1).is_some_and(|sign| sign.as_str() == "-");
        Self::new(if negative { -magnitude } else { magnitude })
    }
}

impl FromStr for HourOffset {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl Display for HourOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_utc() {
            f.write_str("UTC")
        } else {
            write!(f, "UTC{:+}", self.hours)
        }
    }
}

/// A completion after the optional shift. `weekday` comes from the shifted
/// `instant`; `year` is the calendar year of the `recorded` UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedTimestamp {
    pub recorded: PrimitiveDateTime,
    pub instant: PrimitiveDateTime,
    pub weekday: Weekday,
    pub year: i32,
}

impl NormalizedTimestamp {
    #[must_use]
    pub const fn weekday_num(&self) -> u8 {
        self.weekday.number()
    }
}

#[must_use]
pub fn normalize(instant: PrimitiveDateTime, offset: HourOffset) -> Option<NormalizedTimestamp> {
    let shifted = shift(instant, offset)?;
    Some(NormalizedTimestamp {
        recorded: instant,
        instant: shifted,
        weekday: weekday_of(shifted),
        year: instant.year(),
    })
}

#[must_use]
pub fn shift(instant: PrimitiveDateTime, offset: HourOffset) -> Option<PrimitiveDateTime> {
    instant.checked_add(Duration::hours(i64::from(offset.hours())))
}

#[must_use]
pub fn weekday_of(instant: PrimitiveDateTime) -> Weekday {
    Weekday::from(instant.weekday())
}

/// Accepts `YYYY-MM-DD HH:MM[:SS[.fff]]` with a space or `T` separator, a
/// bare date, or RFC 3339 with an explicit offset (converted to UTC).
pub fn parse_created_at(raw: &str) -> Result<PrimitiveDateTime> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        bail!("timestamp input is empty");
    }

    let local_formats: [&[BorrowedFormatItem<'static>]; 6] = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    if let Some(parsed) = local_formats
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(candidate, *format).ok())
    {
        return Ok(parsed);
    }
    if let Ok(parsed) = OffsetDateTime::parse(candidate, &Rfc3339) {
        let utc = parsed.to_offset(UtcOffset::UTC);
        return Ok(PrimitiveDateTime::new(utc.date(), utc.time()));
    }
    if let Ok(date) = Date::parse(candidate, format_description!("[year]-[month]-[day]")) {
        return Ok(PrimitiveDateTime::new(date, Time::MIDNIGHT));
    }

    bail!("unsupported timestamp format: {candidate}");
}

/// Renders an instant the way SQLite's `datetime()` prints it.
#[must_use]
pub fn format_sqlite_datetime(instant: PrimitiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}",
        instant.date(),
        instant.hour(),
        instant.minute(),
        instant.second()
    )
}

#[must_use]
pub fn now_utc_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{}T{:02}:{:02}:{:02}Z",
        now.date(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn offset_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?i:utc|gmt)?\s*([+-]?)(\d{1,2})(?::?(\d{2}))?$")
            .expect("utc offset regex should compile")
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use time::{Duration, PrimitiveDateTime};

    use super::{
        HourOffset, format_sqlite_datetime, normalize, parse_created_at, shift, weekday_of,
    };
    use crate::models::Weekday;

    #[test]
    fn parses_mysql_datetime_text() {
        let parsed = parse_created_at("2013-10-06 15:06:03").expect("datetime should parse");
        assert_eq!(parsed, datetime!(2013-10-06 15:06:03));
        assert_eq!(weekday_of(parsed), Weekday::Sunday);
    }

    #[test]
    fn parses_fractional_seconds_and_t_separator() {
        let fractional =
            parse_created_at("2013-10-07 01:02:03.250").expect("fractional should parse");
        assert_eq!(fractional, datetime!(2013-10-07 01:02:03.250));

        let separated = parse_created_at("2013-10-07T01:02:03").expect("T separator should parse");
        assert_eq!(separated, datetime!(2013-10-07 01:02:03));

        let both = parse_created_at("2013-10-07T01:02:03.5").expect("T with fraction should parse");
        assert_eq!(both, datetime!(2013-10-07 01:02:03.5));
    }

    #[test]
    fn parses_minute_precision_timestamps() {
        let spaced = parse_created_at("2013-10-06 15:06").expect("minutes should parse");
        assert_eq!(spaced, datetime!(2013-10-06 15:06:00));
        assert_eq!(weekday_of(spaced), Weekday::Sunday);

        let separated = parse_created_at("2013-10-06T15:06").expect("T minutes should parse");
        assert_eq!(separated, spaced);
    }

    #[test]
    fn parses_rfc3339_into_utc() {
        let parsed =
            parse_created_at("2013-10-06T20:00:00-06:00").expect("rfc3339 should parse");
        assert_eq!(parsed, datetime!(2013-10-07 02:00:00));
        assert_eq!(weekday_of(parsed), Weekday::Monday);
    }

    #[test]
    fn parses_bare_date_as_midnight() {
        let parsed = parse_created_at("2015-03-01").expect("date should parse");
        assert_eq!(parsed, datetime!(2015-03-01 00:00:00));
    }

    #[test]
    fn rejects_unsupported_timestamp() {
        let err = parse_created_at("next sunday").expect_err("free text should fail");
        assert!(err.to_string().contains("unsupported timestamp format"));

        let err = parse_created_at("   ").expect_err("blank should fail");
        assert!(err.to_string().contains("timestamp input is empty"));
    }

    #[test]
    fn weekday_repeats_every_seven_days_and_covers_all_labels() {
        let anchor = datetime!(2013-02-03 12:00:00);
        let mut seen = Vec::new();
        for day in 0..28 {
            let instant = anchor + Duration::days(day);
            let label = weekday_of(instant);
            assert_eq!(weekday_of(instant + Duration::weeks(1)), label);
            assert_eq!(weekday_of(instant - Duration::weeks(3)), label);
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
        assert_eq!(seen, Weekday::ALL.to_vec());
    }

    #[test]
    fn offset_moves_instants_near_midnight_to_previous_day() {
        let central = HourOffset::new(-6).expect("offset should be valid");
        let just_after_midnight = datetime!(2013-10-07 03:30:00);
        let midday = datetime!(2013-10-07 12:00:00);

        let shifted = normalize(just_after_midnight, central).expect("shift should fit");
        assert_eq!(weekday_of(just_after_midnight), Weekday::Monday);
        assert_eq!(shifted.weekday, Weekday::Sunday);
        assert_eq!(shifted.weekday_num(), 1);
        assert_eq!(shifted.instant, datetime!(2013-10-06 21:30:00));

        let unaffected = normalize(midday, central).expect("shift should fit");
        assert_eq!(unaffected.weekday, Weekday::Monday);
    }

    #[test]
    fn year_stays_on_the_recorded_instant() {
        let central = HourOffset::new(-6).expect("offset should be valid");
        let new_year = datetime!(2015-01-01 02:00:00);
        let normalized = normalize(new_year, central).expect("shift should fit");
        assert_eq!(normalized.year, 2015);
        assert_eq!(normalized.weekday, Weekday::Wednesday);
        assert_eq!(normalized.recorded, new_year);
        assert_eq!(normalized.instant, datetime!(2014-12-31 20:00:00));
    }

    #[test]
    fn formats_like_sqlite_datetime() {
        assert_eq!(
            format_sqlite_datetime(datetime!(2013-10-06 21:30:05.750)),
            "2013-10-06 21:30:05"
        );
    }

    #[test]
    fn utc_offset_is_identity() {
        let instant = datetime!(2014-01-05 00:00:00);
        assert_eq!(shift(instant, HourOffset::UTC), Some(instant));
        let normalized = normalize(instant, HourOffset::UTC).expect("identity shift");
        assert_eq!(normalized.weekday, Weekday::Sunday);
        assert_eq!(normalized.year, 2014);
    }

    #[test]
    fn shift_reports_overflow_as_none() {
        let last = PrimitiveDateTime::MAX;
        let east = HourOffset::new(5).expect("offset should be valid");
        assert_eq!(shift(last, east), None);
    }

    #[test]
    fn parses_common_offset_spellings() {
        for (raw, hours) in [
            ("-6", -6),
            ("UTC-6", -6),
            ("utc-06:00", -6),
            ("-0600", -6),
            ("+5", 5),
            ("GMT+10", 10),
            ("3", 3),
            ("UTC", 0),
        ] {
            let parsed = HourOffset::parse(raw).expect("offset should parse");
            assert_eq!(parsed.hours(), hours, "offset {raw}");
        }
    }

    #[test]
    fn rejects_partial_hours_and_out_of_range_offsets() {
        let err = HourOffset::parse("+05:30").expect_err("half hour should fail");
        assert!(err.to_string().contains("whole hours"));

        let err = HourOffset::parse("-24").expect_err("out of range should fail");
        assert!(err.to_string().contains("within +/-23 hours"));

        let err = HourOffset::parse("central").expect_err("names should fail");
        assert!(err.to_string().contains("unsupported utc offset format"));
    }

    #[test]
    fn renders_offsets_and_sqlite_modifiers() {
        let central = HourOffset::new(-6).expect("offset should be valid");
        assert_eq!(central.to_string(), "UTC-6");
        assert_eq!(central.sqlite_modifier(), "-6 hours");

        let east = HourOffset::new(2).expect("offset should be valid");
        assert_eq!(east.to_string(), "UTC+2");
        assert_eq!(east.sqlite_modifier(), "+2 hours");
        assert_eq!(HourOffset::UTC.to_string(), "UTC");
    }
}
