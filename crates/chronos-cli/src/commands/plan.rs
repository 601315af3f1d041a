use clap::Args;
use chronos_core::{Config, PlanPayload, SessionDurations, SessionPlanner};

use super::{open_store, print_json, CommandResult};

#[derive(Args)]
pub struct PlanArgs {
    /// Activity window length in minutes
    #[arg(long)]
    pub window: u32,
    /// Focus/rest pair as FOCUS/REST minutes (repeatable, e.g. --session 25/5)
    #[arg(long = "session", value_parser = parse_pair)]
    pub sessions: Vec<SessionDurations>,
    /// Turn cycles off for the activity
    #[arg(long)]
    pub disabled: bool,
    /// Save the plan as the activity's cycle (or drop it when disabled)
    #[arg(long)]
    pub activity: Option<String>,
}

fn parse_pair(s: &str) -> Result<SessionDurations, String> {
    let (focus, rest) = s
        .split_once('/')
        .ok_or_else(|| format!("expected FOCUS/REST, got '{s}'"))?;
    let focus = focus
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("focus minutes: {e}"))?;
    let rest = rest
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("rest minutes: {e}"))?;
    Ok(SessionDurations::new(focus, rest))
}

pub async fn run(args: PlanArgs) -> CommandResult {
    let config = Config::load()?;
    let mut planner = if args.sessions.is_empty() {
        SessionPlanner::with_defaults(args.window, config.default_session())
    } else {
        SessionPlanner::with_sessions(args.window, &args.sessions)
    };
    let payload = planner.set_enabled(!args.disabled);

    if let Some(activity_id) = args.activity.as_deref() {
        let store = open_store(&config)?;
        match &payload {
            PlanPayload::Enabled(plan) => {
                let record = store.create(activity_id, plan).await?;
                eprintln!("cycle {} saved for activity {activity_id}", record.id);
            }
            PlanPayload::Disabled { .. } => {
                store.cancel(activity_id).await?;
                eprintln!("cycles disabled for activity {activity_id}");
            }
        }
    }

    if let Some(plan) = payload.plan() {
        if plan.is_over_window() {
            eprintln!(
                "warning: plan exceeds the window by {} minutes",
                -plan.strategic_reserve_minutes
            );
        }
    }
    print_json(&payload)
}
