//! The agenda collects events from every configured calendar source and
//! serves them to the display layer in chronological order.

use itertools::Itertools;

use crate::config::{CalendarConfig, Config};
use crate::fetch::Fetchlike;
use crate::provider::ics::IcsStreamParser;
use crate::provider::{CalendarEvent, EventSink, Instant, Result, TimeWindow, SECS_PER_DAY};

/// Feeding the parser in bounded chunks keeps its buffer management honest
/// even when a fetcher hands over the whole body at once.
const FEED_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Default)]
pub struct Agenda {
    events: Vec<CalendarEvent>,
}

impl EventSink for Agenda {
    fn accept(&mut self, event: &CalendarEvent) {
        self.events.push(event.clone());
    }
}

impl Agenda {
    pub fn new() -> Self {
        Agenda::default()
    }

    /// Fetches and parses every calendar in the config. Sources that fail to
    /// fetch are logged and skipped; the rest of the agenda still loads.
    pub fn from_config<F: Fetchlike>(
        config: &Config,
        fetcher: &F,
        window: TimeWindow,
    ) -> Result<Self> {
        let mut agenda = Agenda::new();
        for calendar in &config.calendars {
            if let Err(err) = agenda.add_source(fetcher, calendar, window) {
                log::warn!("skipping calendar '{}': {}", calendar.name, err);
            }
        }
        agenda.events.sort_by_key(|event| event.start_time);
        Ok(agenda)
    }

    /// Runs one fetch/parse cycle for a single source. Each source gets a
    /// fresh parser, which also scopes the RECURRENCE-ID ledger to it.
    pub fn add_source<F: Fetchlike>(
        &mut self,
        fetcher: &F,
        calendar: &CalendarConfig,
        window: TimeWindow,
    ) -> Result<()> {
        log::info!("fetching calendar '{}'", calendar.name);
        let body = fetcher.fetch(&calendar.url)?;
        log::info!("received {} bytes for '{}'", body.len(), calendar.name);

        let events = &mut self.events;
        let mut parser =
            IcsStreamParser::new(|event: &CalendarEvent| events.push(event.clone()));
        parser.set_calendar_color(&calendar.color);
        parser.set_time_window(window.start, window.end);
        for chunk in body.chunks(FEED_CHUNK_SIZE) {
            parser.feed_data(chunk);
        }
        parser.finish();

        log::info!(
            "calendar '{}': kept {} events, skipped {}",
            calendar.name,
            parser.event_count(),
            parser.skipped_count()
        );
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> impl Iterator<Item = &CalendarEvent> {
        self.events.iter()
    }

    /// Events grouped by their (UTC) start day, in order.
    pub fn events_by_day(&self) -> Vec<(Instant, Vec<&CalendarEvent>)> {
        let sorted = self.events.iter().sorted_by_key(|event| event.start_time);
        let groups = sorted.chunk_by(|event| event.start_day());
        groups
            .into_iter()
            .map(|(day, group)| (day * SECS_PER_DAY, group.collect()))
            .collect()
    }
}
