//! Parsing of ICS date and date-time property values.
//!
//! Values arrive with their parameter section still attached
//! (`;TZID=America/Chicago:20240115T090000`), since the parameters decide
//! how the value is interpreted.

use crate::provider::{civil, tz, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct IcsDateTime {
    pub instant: Instant,
    pub all_day: bool,
}

/// Interprets a DTSTART/DTEND value, parameters included.
///
/// All-day dates become midnight UTC of the civil date. Timed values ending
/// in `Z` are UTC; a `TZID` parameter marks local time in that zone, which
/// is shifted by the zone's offset at the local instant; values with
/// neither are taken as UTC. Malformed values come back as instant 0 and
/// are dropped by the window filter upstream.
pub(crate) fn parse_date_time(raw: &str) -> IcsDateTime {
    let mut all_day = false;

    let tzid = raw.find("TZID=").and_then(|at| {
        let rest = &raw[at + 5..];
        rest.find(':').map(|end| &rest[..end])
    });

    let value = match raw.find(':') {
        Some(colon) => {
            if raw[..colon].contains("VALUE=DATE") {
                all_day = true;
            }
            &raw[colon + 1..]
        }
        None => raw,
    };

    let bytes = value.as_bytes();
    let is_utc = bytes.last() == Some(&b'Z');

    // Bare date: eight digits and no time part.
    if all_day || bytes.len() == 8 || (bytes.len() > 8 && bytes[8] != b'T') {
        let instant = match parse_ymd(value) {
            Some((year, month, day)) => civil::date_to_instant(year, month, day, 0, 0, 0),
            None => 0,
        };
        return IcsDateTime {
            instant,
            all_day: true,
        };
    }

    if bytes.len() >= 15 {
        if let Some((year, month, day, hour, min, sec)) = parse_ymd_hms(value) {
            let mut instant = civil::date_to_instant(year, month, day, hour, min, sec);
            if !is_utc {
                if let Some(zone) = tzid {
                    // The offset is looked up at the local instant. That is
                    // self-referential in principle but stable in practice;
                    // in the ambiguous fall-back hour the engine's canonical
                    // choice applies.
                    let offset = tz::offset_seconds(zone, instant);
                    instant = (i64::from(instant) - i64::from(offset)) as Instant;
                }
            }
            return IcsDateTime {
                instant,
                all_day: false,
            };
        }
    }

    IcsDateTime { instant: 0, all_day }
}

/// Midnight-UTC instant of the civil date starting a value, as used by
/// EXDATE, RECURRENCE-ID and UNTIL. 0 when no date can be read.
pub(crate) fn date_instant(value: &str) -> Instant {
    match parse_ymd(value) {
        Some((year, month, day)) => civil::date_to_instant(year, month, day, 0, 0, 0),
        None => 0,
    }
}

fn digits(bytes: &[u8]) -> Option<u32> {
    let mut acc: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        acc = acc * 10 + u32::from(b - b'0');
    }
    Some(acc)
}

fn parse_ymd(value: &str) -> Option<(u32, u32, u32)> {
    let bytes = value.as_bytes();
    if bytes.len() < 8 {
        return None;
    }
    Some((
        digits(&bytes[0..4])?,
        digits(&bytes[4..6])?,
        digits(&bytes[6..8])?,
    ))
}

fn parse_ymd_hms(value: &str) -> Option<(u32, u32, u32, u32, u32, u32)> {
    let bytes = value.as_bytes();
    if bytes.len() < 15 || bytes[8] != b'T' {
        return None;
    }
    let (year, month, day) = parse_ymd(value)?;
    Some((
        year,
        month,
        day,
        digits(&bytes[9..11])?,
        digits(&bytes[11..13])?,
        digits(&bytes[13..15])?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_datetime() {
        let dt = parse_date_time("20240115T150000Z");
        assert_eq!(dt.instant, 1_705_330_800);
        assert!(!dt.all_day);
    }

    #[test]
    fn floating_datetime_is_utc() {
        let dt = parse_date_time("20240115T150000");
        assert_eq!(dt.instant, 1_705_330_800);
        assert!(!dt.all_day);
    }

    #[test]
    fn tzid_in_daylight_time() {
        let dt = parse_date_time(";TZID=America/Chicago:20240715T090000");
        assert_eq!(dt.instant, 1_721_052_000);
        assert!(!dt.all_day);
    }

    #[test]
    fn tzid_in_standard_time() {
        let dt = parse_date_time(";TZID=America/Chicago:20240115T090000");
        assert_eq!(dt.instant, 1_705_330_800);
    }

    #[test]
    fn tzid_with_utc_marker_stays_utc() {
        let dt = parse_date_time(";TZID=America/Chicago:20240115T150000Z");
        assert_eq!(dt.instant, 1_705_330_800);
    }

    #[test]
    fn unknown_tzid_is_utc() {
        let dt = parse_date_time(";TZID=Atlantis/Reef:20240115T150000");
        assert_eq!(dt.instant, 1_705_330_800);
    }

    #[test]
    fn value_date_marks_all_day() {
        let dt = parse_date_time(";VALUE=DATE:20240704");
        assert_eq!(dt.instant, 1_720_051_200);
        assert!(dt.all_day);
    }

    #[test]
    fn bare_date_marks_all_day() {
        let dt = parse_date_time("20240704");
        assert_eq!(dt.instant, 1_720_051_200);
        assert!(dt.all_day);
    }

    #[test]
    fn value_date_with_time_part_is_clamped_to_midnight() {
        let dt = parse_date_time(";VALUE=DATE:20240704T120000");
        assert_eq!(dt.instant, 1_720_051_200);
        assert!(dt.all_day);
    }

    #[test]
    fn malformed_values_become_zero() {
        assert_eq!(parse_date_time("gibberish").instant, 0);
        assert_eq!(parse_date_time("202401").instant, 0);
        assert_eq!(parse_date_time("20240115T15").instant, 0);
        assert_eq!(parse_date_time("2024011XT150000Z").instant, 0);
    }

    #[test]
    fn date_instants() {
        assert_eq!(date_instant("20240726"), 1_721_952_000);
        assert_eq!(date_instant("20240220T160000Z"), 1_708_387_200);
        assert_eq!(date_instant("absent"), 0);
    }
}
