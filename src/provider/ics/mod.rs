//! Streaming ICS parser.
//!
//! The parser consumes a calendar of arbitrary size in chunks, holding at
//! most one parse buffer of unresolved bytes. Complete `BEGIN:VEVENT` /
//! `END:VEVENT` blocks are cut out of the buffer as soon as they appear and
//! turned into [`CalendarEvent`]s for the configured sink; everything the
//! parser cannot make sense of is skipped, never fatal.

mod datetime;
pub mod rrule;

pub use rrule::RRule;

use super::{CalendarEvent, ColorCode, EventSink, Instant, TimeWindow, Title};

/// Scratch space for in-flight bytes. A single VEVENT larger than this is
/// dropped with a diagnostic.
pub const PARSE_BUFFER_SIZE: usize = 16 * 1024;

/// Bytes kept when discarding a buffer without any event marker, so a
/// marker split across two chunks is still found.
const MARKER_TAIL: usize = 20;

const BEGIN_VEVENT: &[u8] = b"BEGIN:VEVENT";
const END_VEVENT: &[u8] = b"END:VEVENT";

/// Upper bound for exclusion dates per rule and for RECURRENCE-ID overrides
/// per source.
const MAX_TRACKED_DATES: usize = 64;

/// Bounded set of civil dates, stored as midnight-UTC instants. Inserts
/// beyond the capacity are silently dropped.
#[derive(Clone, Debug)]
pub(crate) struct DateSet {
    dates: [Instant; MAX_TRACKED_DATES],
    len: usize,
}

impl Default for DateSet {
    fn default() -> Self {
        DateSet {
            dates: [0; MAX_TRACKED_DATES],
            len: 0,
        }
    }
}

impl DateSet {
    pub(crate) fn new() -> Self {
        DateSet::default()
    }

    pub(crate) fn insert(&mut self, date: Instant) {
        if self.len < MAX_TRACKED_DATES {
            self.dates[self.len] = date;
            self.len += 1;
        }
    }

    pub(crate) fn contains(&self, date: Instant) -> bool {
        self.dates[..self.len].contains(&date)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

enum BlockKind {
    Single(CalendarEvent),
    Override(CalendarEvent, Instant),
    Recurring(CalendarEvent, RRule, DateSet),
}

pub struct IcsStreamParser<S> {
    buf: Box<[u8; PARSE_BUFFER_SIZE]>,
    len: usize,
    calendar_color: ColorCode,
    window: TimeWindow,
    timezone_offset: i32,
    event_count: u32,
    skipped_count: u32,
    ledger: DateSet,
    sink: S,
}

impl<S: EventSink> IcsStreamParser<S> {
    pub fn new(sink: S) -> Self {
        IcsStreamParser {
            buf: Box::new([0; PARSE_BUFFER_SIZE]),
            len: 0,
            calendar_color: ColorCode::new(),
            window: TimeWindow::default(),
            timezone_offset: 0,
            event_count: 0,
            skipped_count: 0,
            ledger: DateSet::new(),
            sink,
        }
    }

    /// Color copied into every event emitted from this source.
    pub fn set_calendar_color(&mut self, color: &str) {
        self.calendar_color = ColorCode::from(color);
    }

    /// Inclusive window; events outside it are dropped.
    pub fn set_time_window(&mut self, start: Instant, end: Instant) {
        self.window = TimeWindow::new(start, end);
    }

    /// Reserved: display-local offset for consumers that want pre-shifted
    /// times. Nothing in the parse path reads it.
    pub fn set_timezone_offset(&mut self, offset_secs: i32) {
        self.timezone_offset = offset_secs;
    }

    pub fn timezone_offset(&self) -> i32 {
        self.timezone_offset
    }

    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    pub fn skipped_count(&self) -> u32 {
        self.skipped_count
    }

    /// Appends a chunk of calendar bytes and processes whatever became
    /// complete. May be called any number of times, with splits at arbitrary
    /// byte positions.
    pub fn feed_data(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let space = PARSE_BUFFER_SIZE - 1 - self.len;
            let take = data.len().min(space);
            self.buf[self.len..self.len + take].copy_from_slice(&data[..take]);
            self.len += take;
            data = &data[take..];

            self.process_buffer();

            // Buffer still full with input left over: one VEVENT exceeds the
            // buffer. Drop through the end of it and carry on.
            if self.len >= PARSE_BUFFER_SIZE - 1 && !data.is_empty() {
                log::warn!("event too large for parse buffer, skipping");
                match find_bytes(&self.buf[..self.len], END_VEVENT) {
                    Some(at) => {
                        let consumed = at + END_VEVENT.len();
                        self.buf.copy_within(consumed..self.len, 0);
                        self.len -= consumed;
                    }
                    None => self.len = 0,
                }
            }
        }
    }

    /// Signals end of stream and flushes any complete events still buffered.
    pub fn finish(&mut self) {
        self.process_buffer();

        log::info!(
            "parsed {} events, skipped {} out of window",
            self.event_count,
            self.skipped_count
        );
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn process_buffer(&mut self) {
        loop {
            let start = match find_bytes(&self.buf[..self.len], BEGIN_VEVENT) {
                Some(at) => at,
                None => {
                    // Keep a short tail in case the begin marker is split
                    // across chunks.
                    if self.len > MARKER_TAIL {
                        let from = self.len - MARKER_TAIL;
                        self.buf.copy_within(from..self.len, 0);
                        self.len = MARKER_TAIL;
                    }
                    return;
                }
            };

            let end = match find_bytes(&self.buf[start..self.len], END_VEVENT) {
                Some(at) => start + at,
                None => {
                    // Incomplete event: move it to the front and wait.
                    if start > 0 {
                        self.buf.copy_within(start..self.len, 0);
                        self.len -= start;
                    }
                    return;
                }
            };

            self.handle_block(start, end);

            let consumed = end + END_VEVENT.len();
            self.buf.copy_within(consumed..self.len, 0);
            self.len -= consumed;
        }
    }

    fn handle_block(&mut self, from: usize, to: usize) {
        let kind = match classify_block(&self.buf[from..to], &self.calendar_color) {
            Some(kind) => kind,
            None => {
                log::debug!("dropping event without SUMMARY or DTSTART");
                return;
            }
        };

        match kind {
            BlockKind::Override(event, date) => {
                if date != 0 {
                    self.ledger.insert(date);
                }
                if self.window.contains(event.start_time, event.all_day) {
                    self.emit(&event);
                }
            }
            BlockKind::Recurring(event, rule, exdates) => {
                // An override may trail its parent in the document. Anything
                // still sitting in the buffer can be seen now, so its
                // generated twin is never emitted.
                let mut overrides = self.ledger.clone();
                let rest = to + END_VEVENT.len();
                scan_recurrence_ids(&self.buf[rest..self.len], &mut overrides);

                let emitted = rrule::expand(
                    &event,
                    &rule,
                    &exdates,
                    &overrides,
                    self.window,
                    &mut self.sink,
                );
                self.event_count += emitted;
            }
            BlockKind::Single(event) => {
                if self.window.contains(event.start_time, event.all_day) {
                    self.emit(&event);
                } else {
                    self.skipped_count += 1;
                }
            }
        }
    }

    fn emit(&mut self, event: &CalendarEvent) {
        self.event_count += 1;
        self.sink.accept(event);
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Finds the first line of the block starting with `name` followed by `:`
/// or `;`. For a `:` the value alone is returned; for a `;` the whole tail
/// including the parameter section, so date parsing still sees `TZID=`.
fn find_property(block: &[u8], name: &str) -> Option<String> {
    let name = name.as_bytes();
    for line in block.split(|&b| b == b'\n') {
        let line = match line.last() {
            Some(&b'\r') => &line[..line.len() - 1],
            _ => line,
        };
        if line.len() <= name.len() || !line.starts_with(name) {
            continue;
        }
        let value = match line[name.len()] {
            b':' => &line[name.len() + 1..],
            b';' => &line[name.len()..],
            _ => continue,
        };
        return Some(String::from_utf8_lossy(value).into_owned());
    }
    None
}

/// All EXDATE dates of the block, one line per property, each line possibly
/// carrying a comma-separated list. Dates are normalized to midnight of
/// their civil day.
fn collect_exdates(block: &[u8]) -> DateSet {
    let mut exdates = DateSet::new();
    for line in block.split(|&b| b == b'\n') {
        if !line.starts_with(b"EXDATE") {
            continue;
        }
        match line.get(b"EXDATE".len()) {
            Some(&b':') | Some(&b';') => {}
            _ => continue,
        }
        let colon = match line.iter().position(|&b| b == b':') {
            Some(at) => at,
            None => continue,
        };
        let tail = String::from_utf8_lossy(&line[colon + 1..]);
        for entry in tail.trim_end().split(',') {
            let date = datetime::date_instant(entry);
            if date != 0 {
                exdates.insert(date);
            }
        }
    }
    exdates
}

/// Collects RECURRENCE-ID dates from the not-yet-consumed remainder of the
/// parse buffer. Real exporters place override VEVENTs right next to their
/// parent, so by the time a rule expands its overrides are normally already
/// buffered even though their blocks have not been processed yet.
fn scan_recurrence_ids(tail: &[u8], out: &mut DateSet) {
    for line in tail.split(|&b| b == b'\n') {
        if !line.starts_with(b"RECURRENCE-ID") {
            continue;
        }
        match line.get(b"RECURRENCE-ID".len()) {
            Some(&b':') | Some(&b';') => {}
            _ => continue,
        }
        let colon = match line.iter().position(|&b| b == b':') {
            Some(at) => at,
            None => continue,
        };
        let text = String::from_utf8_lossy(&line[colon + 1..]);
        let date = datetime::date_instant(text.trim_end());
        if date != 0 {
            out.insert(date);
        }
    }
}

fn classify_block(block: &[u8], calendar_color: &ColorCode) -> Option<BlockKind> {
    let title = find_property(block, "SUMMARY")?;
    let dtstart = find_property(block, "DTSTART")?;

    let start = datetime::parse_date_time(&dtstart);
    let mut event = CalendarEvent {
        title: Title::from(title.as_str()),
        start_time: start.instant,
        end_time: start.instant,
        all_day: start.all_day,
        calendar_color: calendar_color.clone(),
        event_color: ColorCode::new(),
    };

    if let Some(dtend) = find_property(block, "DTEND") {
        let end = datetime::parse_date_time(&dtend);
        // A broken DTEND must not produce an event that ends before it
        // starts.
        event.end_time = end.instant.max(event.start_time);
    }

    if let Some(recurrence_id) = find_property(block, "RECURRENCE-ID") {
        let text = recurrence_id
            .split_once(':')
            .map_or(recurrence_id.as_str(), |(_, tail)| tail);
        return Some(BlockKind::Override(event, datetime::date_instant(text)));
    }

    if let Some(rrule) = find_property(block, "RRULE") {
        match rrule.parse::<RRule>() {
            Ok(rule) => {
                return Some(BlockKind::Recurring(event, rule, collect_exdates(block)));
            }
            Err(err) => {
                log::warn!("treating '{}' as one-time event: {}", event.title, err);
            }
        }
    }

    Some(BlockKind::Single(event))
}
