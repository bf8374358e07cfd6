extern crate glance as lib;

use chrono::{DateTime, Utc};
use flexi_logger::{Duplicate, FileSpec, Logger};
use lib::agenda::Agenda;
use lib::config::CalendarConfig;
use lib::fetch::FileFetcher;
use lib::provider::tz::ZoneId;
use lib::provider::{Instant, TimeWindow, SECS_PER_DAY};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "glance",
    about = "Glance - calendar agenda for a magic-mirror display."
)]
pub struct Args {
    #[structopt(
        help = "additional *.ics files to show alongside configured calendars",
        parse(from_os_str)
    )]
    pub input: Vec<PathBuf>,

    #[structopt(
        name = "CONFIG",
        short = "c",
        long = "config",
        help = "path to config file",
        parse(from_os_str)
    )]
    pub configfile: Option<PathBuf>,

    #[structopt(short = "d", long = "days", help = "override the lookahead window in days")]
    pub days: Option<u32>,

    #[structopt(long = "log-file", help = "path to log file", parse(from_os_str))]
    pub log_file: Option<PathBuf>,
}

/// Shifts an instant into the display zone and renders it as wall-clock
/// time.
fn format_instant(instant: Instant, zone: &ZoneId) -> String {
    let local = (i64::from(instant) + i64::from(zone.offset_at(instant))).max(0);
    match DateTime::<Utc>::from_timestamp(local, 0) {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "??:??".to_owned(),
    }
}

fn format_day(instant: Instant) -> String {
    match DateTime::<Utc>::from_timestamp(i64::from(instant), 0) {
        Some(dt) => dt.format("%A, %B %-d").to_string(),
        None => "unknown day".to_owned(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::from_args();

    let mut logger = Logger::try_with_env_or_str("info")?.duplicate_to_stderr(Duplicate::Warn);

    if let Some(log_file) = args.log_file {
        logger = logger
            .log_to_file(FileSpec::try_from(log_file)?)
            .print_message();
    }

    logger.start()?;

    let mut config = lib::config::load_suitable_config(args.configfile.as_deref())?;

    for path in &args.input {
        config.calendars.push(CalendarConfig {
            name: path.display().to_string(),
            url: path.display().to_string(),
            color: String::new(),
        });
    }

    let days = args.days.unwrap_or(config.lookahead_days);
    let now = Utc::now().timestamp() as Instant;
    let window = TimeWindow::new(now, now + days * SECS_PER_DAY);

    let agenda = Agenda::from_config(&config, &FileFetcher, window)?;

    if agenda.is_empty() {
        println!("No events in the next {} days.", days);
        return Ok(());
    }

    for (day, events) in agenda.events_by_day() {
        println!("{}", format_day(day));
        for event in events {
            if event.all_day {
                println!("  all day  {}", event.title);
            } else {
                println!(
                    "  {}-{}  {}",
                    format_instant(event.start_time, &config.timezone),
                    format_instant(event.end_time, &config.timezone),
                    event.title
                );
            }
        }
        println!();
    }

    Ok(())
}
