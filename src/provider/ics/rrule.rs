//! RRULE parsing and iterative recurrence expansion.

use std::str::FromStr;

use super::datetime;
use super::DateSet;
use crate::provider::error::Error;
use crate::provider::{civil, CalendarEvent, EventSink, Instant, Result, TimeWindow, SECS_PER_DAY};

/// Hard cap on generated instances per rule, counted across emitted and
/// excluded candidates alike.
pub(crate) const MAX_INSTANCES: u32 = 500;

const MAX_CANDIDATES: usize = 32;
const MAX_BY_ENTRIES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// One positional BYDAY entry such as `2MO` or `-1FR`. `week` 0 stands for
/// every occurrence of the weekday within the period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByDayEntry {
    pub week: i8,
    pub weekday: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RRule {
    pub freq: Freq,
    pub interval: u32,
    pub until: Option<Instant>,
    pub count: Option<u32>,
    /// Weekday bitmask (bit 0 = Sunday) for the plain weekly case.
    pub by_day_mask: u8,
    /// Positional entries for the monthly case.
    pub by_day: Vec<ByDayEntry>,
    /// Month bitmask, bit 0 = January.
    pub by_month_mask: u16,
    /// Days of month; negative counts from the month's end.
    pub by_month_day: Vec<i8>,
    /// 0 when unset; positive picks the nth candidate, negative from the end.
    pub by_set_pos: i32,
    /// Week start, 0 = Sunday. Business calendars overwhelmingly use Monday.
    pub wkst: u8,
}

fn weekday_from_abbrev(token: &str) -> Option<u8> {
    match token.get(..2)? {
        "SU" => Some(0),
        "MO" => Some(1),
        "TU" => Some(2),
        "WE" => Some(3),
        "TH" => Some(4),
        "FR" => Some(5),
        "SA" => Some(6),
        _ => None,
    }
}

impl FromStr for RRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut freq = None;
        let mut interval = 1;
        let mut until = None;
        let mut count = None;
        let mut by_day_mask = 0u8;
        let mut by_day = Vec::new();
        let mut by_month_mask = 0u16;
        let mut by_month_day = Vec::new();
        let mut by_set_pos = 0;
        let mut wkst = 1;

        for part in s.split(';') {
            let (key, value) = match part.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };

            match key {
                "FREQ" => {
                    freq = match value {
                        "DAILY" => Some(Freq::Daily),
                        "WEEKLY" => Some(Freq::Weekly),
                        "MONTHLY" => Some(Freq::Monthly),
                        "YEARLY" => Some(Freq::Yearly),
                        _ => None,
                    }
                }
                "INTERVAL" => {
                    interval = match value.parse::<u32>() {
                        Ok(0) | Err(_) => 1,
                        Ok(n) => n,
                    }
                }
                "COUNT" => count = value.parse::<u32>().ok().filter(|c| *c > 0),
                "UNTIL" => {
                    // Date-form UNTIL maps to midnight of the following day,
                    // which keeps the named day itself inclusive.
                    let date = datetime::date_instant(value);
                    if date != 0 {
                        until = Some(date + SECS_PER_DAY);
                    }
                }
                "BYDAY" => {
                    for token in value.split(',') {
                        let day_at = token
                            .find(|c: char| c.is_ascii_alphabetic())
                            .unwrap_or(token.len());
                        let week = token[..day_at].parse::<i8>().unwrap_or(0);
                        if let Some(weekday) = weekday_from_abbrev(&token[day_at..]) {
                            if week == 0 {
                                by_day_mask |= 1 << weekday;
                            }
                            if by_day.len() < MAX_BY_ENTRIES {
                                by_day.push(ByDayEntry { week, weekday });
                            }
                        }
                    }
                }
                "BYMONTH" => {
                    for token in value.split(',') {
                        if let Ok(month @ 1..=12) = token.parse::<u16>() {
                            by_month_mask |= 1 << (month - 1);
                        }
                    }
                }
                "BYMONTHDAY" => {
                    for token in value.split(',') {
                        if let Ok(day) = token.parse::<i8>() {
                            if day != 0 && by_month_day.len() < MAX_BY_ENTRIES {
                                by_month_day.push(day);
                            }
                        }
                    }
                }
                "BYSETPOS" => by_set_pos = value.parse().unwrap_or(0),
                "WKST" => {
                    if let Some(day) = weekday_from_abbrev(value) {
                        wkst = day;
                    }
                }
                _ => {}
            }
        }

        let freq =
            freq.ok_or_else(|| Error::RecurRule("missing or unsupported FREQ".to_owned()))?;

        Ok(RRule {
            freq,
            interval,
            until,
            count,
            by_day_mask,
            by_day,
            by_month_mask,
            by_month_day,
            by_set_pos,
            wkst,
        })
    }
}

/// Expands a recurring base event into instances inside the window. Dates in
/// `exdates` or `ledger` are suppressed but still count toward COUNT.
/// Returns how many instances reached the sink.
pub(crate) fn expand<S: EventSink>(
    base: &CalendarEvent,
    rule: &RRule,
    exdates: &DateSet,
    ledger: &DateSet,
    window: TimeWindow,
    sink: &mut S,
) -> u32 {
    let base_days = base.start_time / SECS_PER_DAY;
    let base_time_of_day = base.start_time % SECS_PER_DAY;
    let duration = base.end_time.saturating_sub(base.start_time);
    let (base_year, base_month, base_day) = civil::civil_from_days(base_days);

    let mut end_limit = window.end;
    if let Some(until) = rule.until {
        if until < end_limit {
            end_limit = until;
        }
    }

    let max_instances = rule.count.map_or(MAX_INSTANCES, |c| c.min(MAX_INSTANCES));

    // Period cursor: day-resolution for DAILY/WEEKLY, month-resolution above.
    let mut cursor_days = base_days;
    let mut cursor_year = base_year;
    let mut cursor_month = base_month;

    let mut total = 0u32;
    let mut emitted = 0u32;

    while total < max_instances {
        let (period_year, period_month) = match rule.freq {
            Freq::Daily | Freq::Weekly => {
                let (y, m, _) = civil::civil_from_days(cursor_days);
                (y, m)
            }
            Freq::Monthly | Freq::Yearly => (cursor_year, cursor_month),
        };

        // Nothing past this point can be emitted anymore.
        if civil::date_to_instant(period_year, period_month, 1, 0, 0, 0) > end_limit {
            break;
        }

        let mut candidates: [Instant; MAX_CANDIDATES] = [0; MAX_CANDIDATES];
        let mut n = 0usize;
        let push = |candidates: &mut [Instant; MAX_CANDIDATES], n: &mut usize, date| {
            if *n < MAX_CANDIDATES {
                candidates[*n] = date;
                *n += 1;
            }
        };

        match rule.freq {
            Freq::Daily => {
                push(&mut candidates, &mut n, cursor_days * SECS_PER_DAY);
            }
            Freq::Weekly => {
                if rule.by_day_mask != 0 {
                    let (cy, cm, cd) = civil::civil_from_days(cursor_days);
                    let dow = civil::day_of_week(cy, cm, cd);
                    let to_week_start = (dow + 7 - u32::from(rule.wkst)) % 7;
                    let week_start = cursor_days.saturating_sub(to_week_start);
                    for d in 0..7u32 {
                        let weekday = (u32::from(rule.wkst) + d) % 7;
                        if rule.by_day_mask & (1 << weekday) != 0 {
                            let date = (week_start + d) * SECS_PER_DAY;
                            // Days of this week before the base date are not
                            // part of the recurrence.
                            if date >= base_days * SECS_PER_DAY {
                                push(&mut candidates, &mut n, date);
                            }
                        }
                    }
                } else {
                    push(&mut candidates, &mut n, cursor_days * SECS_PER_DAY);
                }
            }
            Freq::Monthly => {
                let month_selected = rule.by_month_mask == 0
                    || rule.by_month_mask & (1 << (cursor_month - 1)) != 0;
                if !month_selected {
                    // Filtered period: no candidates, advance below.
                } else if !rule.by_day.is_empty() {
                    let max_day = civil::days_in_month(cursor_year, cursor_month);
                    for entry in &rule.by_day {
                        let weekday = u32::from(entry.weekday);
                        if entry.week == 0 {
                            let mut day =
                                civil::nth_weekday_of_month(cursor_year, cursor_month, 1, weekday);
                            while day != 0 && day <= max_day {
                                push(
                                    &mut candidates,
                                    &mut n,
                                    civil::date_to_instant(cursor_year, cursor_month, day, 0, 0, 0),
                                );
                                day += 7;
                            }
                        } else {
                            let day = civil::nth_weekday_of_month(
                                cursor_year,
                                cursor_month,
                                i32::from(entry.week),
                                weekday,
                            );
                            if day != 0 {
                                push(
                                    &mut candidates,
                                    &mut n,
                                    civil::date_to_instant(cursor_year, cursor_month, day, 0, 0, 0),
                                );
                            }
                        }
                    }
                } else if !rule.by_month_day.is_empty() {
                    let max_day = civil::days_in_month(cursor_year, cursor_month) as i32;
                    for &entry in &rule.by_month_day {
                        let day = if entry > 0 {
                            i32::from(entry)
                        } else {
                            max_day + i32::from(entry) + 1
                        };
                        if (1..=max_day).contains(&day) {
                            push(
                                &mut candidates,
                                &mut n,
                                civil::date_to_instant(cursor_year, cursor_month, day as u32, 0, 0, 0),
                            );
                        }
                    }
                } else {
                    let day = base_day.min(civil::days_in_month(cursor_year, cursor_month));
                    push(
                        &mut candidates,
                        &mut n,
                        civil::date_to_instant(cursor_year, cursor_month, day, 0, 0, 0),
                    );
                }
            }
            Freq::Yearly => {
                if rule.by_month_mask != 0 {
                    for month in 1..=12u32 {
                        if rule.by_month_mask & (1 << (month - 1)) != 0 {
                            let day = base_day.min(civil::days_in_month(cursor_year, month));
                            push(
                                &mut candidates,
                                &mut n,
                                civil::date_to_instant(cursor_year, month, day, 0, 0, 0),
                            );
                        }
                    }
                } else {
                    let day = base_day.min(civil::days_in_month(cursor_year, base_month));
                    push(
                        &mut candidates,
                        &mut n,
                        civil::date_to_instant(cursor_year, base_month, day, 0, 0, 0),
                    );
                }
            }
        }

        candidates[..n].sort_unstable();

        if rule.by_set_pos != 0 && n > 0 {
            let index = if rule.by_set_pos > 0 {
                rule.by_set_pos - 1
            } else {
                n as i32 + rule.by_set_pos
            };
            if (0..n as i32).contains(&index) {
                candidates[0] = candidates[index as usize];
                n = 1;
            } else {
                n = 0;
            }
        }

        for &date in &candidates[..n] {
            if total >= max_instances {
                break;
            }
            let start = date + base_time_of_day;
            if start < base.start_time {
                continue;
            }
            if start > end_limit {
                return emitted;
            }
            if exdates.contains(date) || ledger.contains(date) {
                total += 1;
                continue;
            }
            if window.contains(start, base.all_day) {
                let mut instance = base.clone();
                instance.start_time = start;
                instance.end_time = start + duration;
                sink.accept(&instance);
                emitted += 1;
            }
            total += 1;
        }

        match rule.freq {
            Freq::Daily => cursor_days += rule.interval,
            Freq::Weekly => cursor_days += 7 * rule.interval,
            Freq::Monthly => {
                cursor_month += rule.interval;
                while cursor_month > 12 {
                    cursor_month -= 12;
                    cursor_year += 1;
                }
            }
            Freq::Yearly => cursor_year += rule.interval,
        }
    }

    if total >= MAX_INSTANCES {
        log::warn!(
            "recurrence expansion for '{}' truncated at {} instances",
            base.title,
            MAX_INSTANCES
        );
    }

    emitted
}
