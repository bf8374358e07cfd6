use std::convert::From;
use std::fmt;
use std::ops::Deref;

pub mod civil;
pub mod error;
pub mod ics;
pub mod tz;

pub use error::*;

pub type Result<T> = std::result::Result<T, self::Error>;

/// Seconds since 1970-01-01 00:00:00 UTC.
pub type Instant = u32;

pub const SECS_PER_DAY: Instant = 86_400;

/// Owned string capped at `MAX` bytes. Everything past the cap is cut off
/// at the nearest character boundary when the value is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundedString<const MAX: usize>(String);

impl<const MAX: usize> BoundedString<MAX> {
    pub fn new() -> Self {
        BoundedString(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const MAX: usize> From<&str> for BoundedString<MAX> {
    fn from(s: &str) -> Self {
        let mut end = s.len().min(MAX);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        BoundedString(s[..end].to_owned())
    }
}

impl<const MAX: usize> Deref for BoundedString<MAX> {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl<const MAX: usize> fmt::Display for BoundedString<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type Title = BoundedString<64>;
pub type ColorCode = BoundedString<8>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalendarEvent {
    pub title: Title,
    pub start_time: Instant,
    pub end_time: Instant,
    pub all_day: bool,
    pub calendar_color: ColorCode,
    pub event_color: ColorCode,
}

impl CalendarEvent {
    /// Color the display layer should use: the per-event color when one is
    /// set, the owning calendar's color otherwise.
    pub fn display_color(&self) -> &str {
        if self.event_color.is_empty() {
            self.calendar_color.as_str()
        } else {
            self.event_color.as_str()
        }
    }

    pub fn start_day(&self) -> Instant {
        self.start_time / SECS_PER_DAY
    }
}

/// Inclusive time window events are filtered against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Instant,
    pub end: Instant,
}

impl TimeWindow {
    pub fn new(start: Instant, end: Instant) -> Self {
        TimeWindow { start, end }
    }

    /// All-day events are stored as midnight UTC of their civil date and
    /// compared by whole days, so an all-day event for "today" stays in the
    /// window even when the current time is already past midnight.
    pub fn contains(&self, start_time: Instant, all_day: bool) -> bool {
        if all_day {
            let event_day = start_time / SECS_PER_DAY;
            event_day >= self.start / SECS_PER_DAY && event_day <= self.end / SECS_PER_DAY
        } else {
            start_time >= self.start && start_time <= self.end
        }
    }
}

/// Receiver for parsed events. The event reference is only valid for the
/// duration of the call; implementations copy what they keep.
pub trait EventSink {
    fn accept(&mut self, event: &CalendarEvent);
}

impl<F: FnMut(&CalendarEvent)> EventSink for F {
    fn accept(&mut self, event: &CalendarEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_string_truncates() {
        let title = Title::from("x".repeat(100).as_str());
        assert_eq!(title.len(), 64);

        let short = Title::from("Standup");
        assert_eq!(short.as_str(), "Standup");
    }

    #[test]
    fn bounded_string_respects_char_boundaries() {
        // 'ä' is two bytes; a cut in the middle must back off.
        let s: String = "ä".repeat(40);
        let title = Title::from(s.as_str());
        assert!(title.len() <= 64);
        assert!(title.as_str().chars().all(|c| c == 'ä'));
    }

    #[test]
    fn display_color_falls_back_to_calendar() {
        let mut event = CalendarEvent::default();
        event.calendar_color = ColorCode::from("#00FF00");
        assert_eq!(event.display_color(), "#00FF00");

        event.event_color = ColorCode::from("#FF0000");
        assert_eq!(event.display_color(), "#FF0000");
    }

    #[test]
    fn window_compares_all_day_by_whole_days() {
        let window = TimeWindow::new(1_000, 90_000);
        // Midnight of day 0 is before the window start but on the same day.
        assert!(window.contains(0, true));
        assert!(!window.contains(0, false));
        // Day 2 is past the window end day.
        assert!(!window.contains(2 * SECS_PER_DAY, true));
    }
}
