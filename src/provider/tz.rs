//! Timezone engine: resolves zone names against a fixed table of POSIX-TZ
//! strings and computes UTC offsets with DST transitions applied.
//!
//! Offsets follow the geographic convention (positive = east of UTC), so
//! US Central in winter yields -21600. POSIX strings themselves count the
//! other way round; the parser negates.

use nom::character::complete::{alpha1, char, digit1, one_of};
use nom::combinator::{map_res, opt};
use nom::sequence::{preceded, tuple};
use nom::IResult;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt::Display;
use std::str::FromStr;

use super::civil;
use super::error::Error;
use super::{Instant, Result, SECS_PER_DAY};

/// POSIX-TZ strings for the zones the display is expected to run in.
/// Calendars referencing anything else fall back to UTC.
const ZONE_TABLE: &[(&str, &str)] = &[
    // US timezones
    ("America/New_York", "EST5EDT,M3.2.0,M11.1.0"),
    ("America/Chicago", "CST6CDT,M3.2.0,M11.1.0"),
    ("America/Denver", "MST7MDT,M3.2.0,M11.1.0"),
    ("America/Los_Angeles", "PST8PDT,M3.2.0,M11.1.0"),
    ("America/Anchorage", "AKST9AKDT,M3.2.0,M11.1.0"),
    ("America/Phoenix", "MST7"),
    ("Pacific/Honolulu", "HST10"),
    ("US/Eastern", "EST5EDT,M3.2.0,M11.1.0"),
    ("US/Central", "CST6CDT,M3.2.0,M11.1.0"),
    ("US/Mountain", "MST7MDT,M3.2.0,M11.1.0"),
    ("US/Pacific", "PST8PDT,M3.2.0,M11.1.0"),
    // Europe (last Sunday of March to last Sunday of October)
    ("Europe/London", "GMT0BST,M3.5.0/1,M10.5.0"),
    ("Europe/Paris", "CET-1CEST,M3.5.0,M10.5.0/3"),
    ("Europe/Berlin", "CET-1CEST,M3.5.0,M10.5.0/3"),
    // UTC
    ("UTC", "UTC0"),
    ("GMT", "GMT0"),
    ("Etc/UTC", "UTC0"),
];

/// A `Mm.w.d[/h]` transition rule: month 1-12, week 1-5 with 5 meaning the
/// last occurrence, weekday 0-6 with 0 = Sunday, transition hour local.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TransitionRule {
    month: u32,
    week: u32,
    weekday: u32,
    hour: u32,
}

impl TransitionRule {
    /// Zero-based day of year of the transition in the given year.
    fn day_of_year(&self, year: u32) -> u32 {
        if !(1..=12).contains(&self.month) {
            return 0;
        }
        let day = civil::nth_weekday_of_month(year, self.month, self.week as i32, self.weekday);
        let before_month =
            civil::days_from_epoch(year, self.month, 1) - civil::days_from_epoch(year, 1, 1);
        before_month + day.saturating_sub(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DstSpec {
    offset_secs: i32,
    start: TransitionRule,
    end: TransitionRule,
}

/// Parsed form of a POSIX-TZ string. A zone without DST rules carries only
/// the standard offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PosixTz {
    std_offset_secs: i32,
    dst: Option<DstSpec>,
}

impl PosixTz {
    pub fn utc() -> Self {
        PosixTz {
            std_offset_secs: 0,
            dst: None,
        }
    }

    fn parse_offset(input: &str) -> IResult<&str, i32> {
        let (input, sign) = opt(one_of("+-"))(input)?;
        let (input, hours) = map_res(digit1, str::parse::<i32>)(input)?;
        let (input, minutes) = opt(preceded(char(':'), map_res(digit1, str::parse::<i32>)))(input)?;
        let (input, seconds) = opt(preceded(char(':'), map_res(digit1, str::parse::<i32>)))(input)?;

        let magnitude = hours * 3600 + minutes.unwrap_or(0) * 60 + seconds.unwrap_or(0);
        // POSIX counts positive west of UTC.
        let geographic = if sign == Some('-') { magnitude } else { -magnitude };
        Ok((input, geographic))
    }

    fn parse_rule(input: &str) -> IResult<&str, TransitionRule> {
        let (input, _) = char('M')(input)?;
        let (input, (month, _, week, _, weekday)) = tuple((
            map_res(digit1, str::parse::<u32>),
            char('.'),
            map_res(digit1, str::parse::<u32>),
            char('.'),
            map_res(digit1, str::parse::<u32>),
        ))(input)?;
        let (input, hour) = opt(preceded(char('/'), map_res(digit1, str::parse::<u32>)))(input)?;

        Ok((
            input,
            TransitionRule {
                month,
                week,
                weekday,
                hour: hour.unwrap_or(2),
            },
        ))
    }

    fn parse(input: &str) -> IResult<&str, PosixTz> {
        let (input, _) = alpha1(input)?;
        let (input, std_offset_secs) = Self::parse_offset(input)?;

        let (input, dst_designator) = opt(alpha1)(input)?;
        if dst_designator.is_none() {
            return Ok((
                input,
                PosixTz {
                    std_offset_secs,
                    dst: None,
                },
            ));
        }

        let (input, dst_offset) = opt(Self::parse_offset)(input)?;
        let offset_secs = dst_offset.unwrap_or(std_offset_secs + 3600);

        let (input, rules) = opt(tuple((
            preceded(char(','), Self::parse_rule),
            preceded(char(','), Self::parse_rule),
        )))(input)?;

        // A DST designator without transition rules keeps standard time
        // year-round.
        Ok((
            input,
            PosixTz {
                std_offset_secs,
                dst: rules.map(|(start, end)| DstSpec {
                    offset_secs,
                    start,
                    end,
                }),
            },
        ))
    }

    /// UTC offset in seconds at the given instant.
    pub fn offset_at(&self, instant: Instant) -> i32 {
        let dst = match &self.dst {
            Some(dst) => dst,
            None => return self.std_offset_secs,
        };

        let days = instant / SECS_PER_DAY;
        let (year, _, _) = civil::civil_from_days(days);
        let day_of_year = days - civil::days_from_epoch(year, 1, 1);
        let second_of_day = (instant % SECS_PER_DAY) as i32;

        let start_doy = dst.start.day_of_year(year);
        let end_doy = dst.end.day_of_year(year);

        // Transitions happen at a local wall-clock hour: standard time going
        // in, daylight time going out. The `<` on the way out is what picks
        // one side of the ambiguous fall-back hour.
        let entering = second_of_day + self.std_offset_secs >= dst.start.hour as i32 * 3600;
        let leaving = second_of_day + dst.offset_secs < dst.end.hour as i32 * 3600;

        let in_dst = if dst.start.month < dst.end.month {
            // Northern hemisphere: DST from spring to fall.
            if day_of_year > start_doy && day_of_year < end_doy {
                true
            } else if day_of_year == start_doy {
                entering
            } else if day_of_year == end_doy {
                leaving
            } else {
                false
            }
        } else {
            // Southern hemisphere: the DST span wraps the year boundary.
            if day_of_year > start_doy || day_of_year < end_doy {
                true
            } else if day_of_year == start_doy {
                entering
            } else if day_of_year == end_doy {
                leaving
            } else {
                false
            }
        };

        if in_dst {
            dst.offset_secs
        } else {
            self.std_offset_secs
        }
    }
}

impl FromStr for PosixTz {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match Self::parse(s) {
            Ok((_, tz)) => Ok(tz),
            Err(_) => Err(Error::Timezone(s.to_owned())),
        }
    }
}

/// Maps a zone name to its POSIX-TZ string: exact table match first, then a
/// substring match so callers may pass e.g. `Chicago`, then pass-through for
/// names that already look like POSIX strings.
fn resolve(zone: &str) -> &str {
    if zone.is_empty() {
        return "UTC0";
    }

    for (name, posix) in ZONE_TABLE {
        if *name == zone || name.contains(zone) {
            return posix;
        }
    }

    let bytes = zone.as_bytes();
    let posix_shaped = zone.contains(',')
        || bytes[0].is_ascii_digit()
        || (bytes.len() >= 4 && bytes[3].is_ascii_digit());
    if posix_shaped {
        zone
    } else {
        "UTC0"
    }
}

/// UTC offset of the named zone at the given instant. Total: unknown zones
/// and unparseable POSIX strings fall back to UTC.
pub fn offset_seconds(zone: &str, instant: Instant) -> i32 {
    let tz = resolve(zone).parse::<PosixTz>().unwrap_or_else(|_| {
        log::debug!("timezone '{}' not understood, assuming UTC", zone);
        PosixTz::utc()
    });
    tz.offset_at(instant)
}

/// A configured zone name; resolution happens lazily per lookup so bare
/// POSIX strings and unknown names are both acceptable configuration.
#[derive(Clone, Debug, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn offset_at(&self, instant: Instant) -> i32 {
        offset_seconds(&self.0, instant)
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        ZoneId("UTC".to_owned())
    }
}

impl FromStr for ZoneId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(ZoneId(s.to_owned()))
    }
}

impl Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::civil::date_to_instant;

    #[test]
    fn parse_std_only() {
        let tz = "MST7".parse::<PosixTz>().unwrap();
        assert_eq!(tz.std_offset_secs, -7 * 3600);
        assert!(tz.dst.is_none());

        let tz = "UTC0".parse::<PosixTz>().unwrap();
        assert_eq!(tz.std_offset_secs, 0);
    }

    #[test]
    fn parse_with_dst_rules() {
        let tz = "CST6CDT,M3.2.0,M11.1.0".parse::<PosixTz>().unwrap();
        assert_eq!(tz.std_offset_secs, -6 * 3600);
        let dst = tz.dst.unwrap();
        assert_eq!(dst.offset_secs, -5 * 3600);
        assert_eq!(
            dst.start,
            TransitionRule {
                month: 3,
                week: 2,
                weekday: 0,
                hour: 2
            }
        );
        assert_eq!(
            dst.end,
            TransitionRule {
                month: 11,
                week: 1,
                weekday: 0,
                hour: 2
            }
        );
    }

    #[test]
    fn parse_east_of_utc_and_rule_hours() {
        let tz = "CET-1CEST,M3.5.0,M10.5.0/3".parse::<PosixTz>().unwrap();
        assert_eq!(tz.std_offset_secs, 3600);
        let dst = tz.dst.unwrap();
        assert_eq!(dst.offset_secs, 2 * 3600);
        assert_eq!(dst.end.hour, 3);

        let tz = "GMT0BST,M3.5.0/1,M10.5.0".parse::<PosixTz>().unwrap();
        assert_eq!(tz.dst.unwrap().start.hour, 1);
    }

    #[test]
    fn dst_designator_without_rules_stays_standard() {
        let tz = "CST6CDT".parse::<PosixTz>().unwrap();
        assert!(tz.dst.is_none());
        assert_eq!(tz.offset_at(date_to_instant(2024, 7, 15, 12, 0, 0)), -6 * 3600);
    }

    #[test]
    fn chicago_summer_and_winter() {
        let summer = date_to_instant(2024, 7, 15, 12, 0, 0);
        let winter = date_to_instant(2024, 1, 15, 12, 0, 0);
        assert_eq!(offset_seconds("America/Chicago", summer), -5 * 3600);
        assert_eq!(offset_seconds("America/Chicago", winter), -6 * 3600);
    }

    #[test]
    fn us_spring_forward_boundary() {
        // DST starts 2024-03-10 at 02:00 standard time, i.e. 08:00 UTC.
        let before = date_to_instant(2024, 3, 10, 7, 59, 59);
        let at = date_to_instant(2024, 3, 10, 8, 0, 0);
        assert_eq!(offset_seconds("America/Chicago", before), -6 * 3600);
        assert_eq!(offset_seconds("America/Chicago", at), -5 * 3600);
    }

    #[test]
    fn us_fall_back_boundary() {
        // DST ends 2024-11-03 at 02:00 daylight time, i.e. 07:00 UTC.
        let before = date_to_instant(2024, 11, 3, 6, 59, 59);
        let at = date_to_instant(2024, 11, 3, 7, 0, 0);
        assert_eq!(offset_seconds("America/Chicago", before), -5 * 3600);
        assert_eq!(offset_seconds("America/Chicago", at), -6 * 3600);
    }

    #[test]
    fn london_transitions() {
        // BST starts 2024-03-31 at 01:00 UTC and ends 2024-10-27 at 01:00 UTC.
        assert_eq!(
            offset_seconds("Europe/London", date_to_instant(2024, 3, 31, 0, 59, 59)),
            0
        );
        assert_eq!(
            offset_seconds("Europe/London", date_to_instant(2024, 3, 31, 1, 0, 0)),
            3600
        );
        assert_eq!(
            offset_seconds("Europe/London", date_to_instant(2024, 10, 27, 0, 59, 59)),
            3600
        );
        assert_eq!(
            offset_seconds("Europe/London", date_to_instant(2024, 10, 27, 1, 0, 0)),
            0
        );
    }

    #[test]
    fn southern_hemisphere_wraps_year() {
        // New Zealand: DST from late September to early April.
        let zone = "NZST-12NZDT,M9.5.0,M4.1.0/3";
        assert_eq!(
            offset_seconds(zone, date_to_instant(2024, 1, 15, 0, 0, 0)),
            13 * 3600
        );
        assert_eq!(
            offset_seconds(zone, date_to_instant(2024, 7, 15, 0, 0, 0)),
            12 * 3600
        );
        assert_eq!(
            offset_seconds(zone, date_to_instant(2024, 12, 15, 0, 0, 0)),
            13 * 3600
        );
    }

    #[test]
    fn zone_id_from_config_string() {
        let zone: ZoneId = "America/Chicago".parse().unwrap();
        assert_eq!(zone.as_str(), "America/Chicago");
        assert_eq!(
            zone.offset_at(date_to_instant(2024, 1, 15, 12, 0, 0)),
            -6 * 3600
        );
        assert_eq!(ZoneId::default().as_str(), "UTC");
    }

    #[test]
    fn resolution_rules() {
        let t = date_to_instant(2024, 1, 15, 12, 0, 0);
        // Aliases and partial names hit the table.
        assert_eq!(offset_seconds("US/Central", t), -6 * 3600);
        assert_eq!(offset_seconds("Chicago", t), -6 * 3600);
        assert_eq!(offset_seconds("Eastern", t), -5 * 3600);
        // POSIX-shaped names pass through.
        assert_eq!(offset_seconds("PST8PDT,M3.2.0,M11.1.0", t), -8 * 3600);
        assert_eq!(offset_seconds("HST10", t), -10 * 3600);
        // Everything else is UTC.
        assert_eq!(offset_seconds("Mars/Olympus_Mons", t), 0);
        assert_eq!(offset_seconds("", t), 0);
    }

    #[test]
    fn offsets_stay_in_sane_range() {
        let zones = [
            "America/Chicago",
            "America/Anchorage",
            "Pacific/Honolulu",
            "Europe/Berlin",
            "NZST-12NZDT,M9.5.0,M4.1.0/3",
            "UTC",
        ];
        for zone in zones {
            for month in 1..=12 {
                let t = date_to_instant(2024, month, 15, 12, 0, 0);
                let offset = offset_seconds(zone, t);
                assert!((-43_200..=50_400).contains(&offset), "{} in {}", offset, zone);
            }
        }
    }

    #[test]
    fn us_zone_changes_twice_a_year_by_one_hour() {
        let mut changes = Vec::new();
        let year_start = date_to_instant(2024, 1, 1, 0, 0, 0);
        let year_end = date_to_instant(2025, 1, 1, 0, 0, 0);
        let mut prev = offset_seconds("America/Chicago", year_start);
        let mut t = year_start;
        while t < year_end {
            let cur = offset_seconds("America/Chicago", t);
            if cur != prev {
                changes.push((t, (cur - prev).abs()));
                prev = cur;
            }
            t += 3600;
        }
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|(_, magnitude)| *magnitude == 3600));
        assert_eq!(changes[0].0, date_to_instant(2024, 3, 10, 8, 0, 0));
        assert_eq!(changes[1].0, date_to_instant(2024, 11, 3, 7, 0, 0));
    }
}
