use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use clap::Args;
use chronos_core::{classify_with_grace, ActivityWindow, Config};

use super::{print_json, CommandResult};

#[derive(Args)]
pub struct ProgressArgs {
    /// Activity date (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,
    /// Window start (HH:MM)
    #[arg(long, value_parser = parse_time)]
    pub start: NaiveTime,
    /// Window end (HH:MM)
    #[arg(long, value_parser = parse_time)]
    pub end: NaiveTime,
    /// The activity was marked done
    #[arg(long)]
    pub completed: bool,
    /// Evaluate at this local time instead of now (YYYY-MM-DDTHH:MM[:SS])
    #[arg(long, value_parser = parse_now)]
    pub at: Option<NaiveDateTime>,
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("invalid time '{s}': {e}"))
}

fn parse_now(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| format!("invalid timestamp '{s}': {e}"))
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

pub fn run(args: ProgressArgs) -> CommandResult {
    let config = Config::load()?;
    let mut window = ActivityWindow::new(args.date, minute_of_day(args.start), minute_of_day(args.end))?;
    window.completed = args.completed;
    let now = args.at.unwrap_or_else(|| Local::now().naive_local());
    let status = classify_with_grace(&window, now, config.progress.grace_minutes);
    print_json(&status)
}
