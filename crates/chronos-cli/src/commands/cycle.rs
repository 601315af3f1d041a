use std::sync::Arc;

use clap::Subcommand;
use chronos_core::{Config, CycleLoader, Event, LoadOutcome, LoaderEvent, SystemClock};
use serde_json::json;
use tracing::info;

use super::{open_store, print_json, CommandResult};

#[derive(Subcommand)]
pub enum CycleAction {
    /// Print the reconciled state of an activity's cycle as JSON
    Status {
        /// Activity ID
        activity: String,
    },
    /// Start or resume the cycle
    Start {
        /// Activity ID
        activity: String,
    },
    /// Pause the cycle
    Pause {
        /// Activity ID
        activity: String,
    },
    /// Run the cycle in the foreground, printing events until it finishes
    Run {
        /// Activity ID
        activity: String,
    },
    /// Drop the cycle of a deleted or cancelled activity
    Cancel {
        /// Activity ID
        activity: String,
    },
    /// Remove completed cycles past the retention window
    Cleanup,
}

fn print_idle(activity_id: &str) -> CommandResult {
    print_json(&json!({ "activityId": activity_id, "state": "idle" }))
}

fn print_events(events: &[Event]) -> CommandResult {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

pub async fn run(action: CycleAction) -> CommandResult {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let loader = CycleLoader::new(Arc::clone(&store), Arc::new(SystemClock))
        .with_intervals(config.intervals());

    match action {
        CycleAction::Status { activity } => match loader.load(&activity).await? {
            LoadOutcome::Idle => print_idle(&activity)?,
            LoadOutcome::Completed(record) => print_json(&record)?,
            LoadOutcome::Ready(driver) => {
                let snapshot = driver.snapshot().await;
                driver.teardown().await;
                print_json(&snapshot)?;
            }
        },
        CycleAction::Start { activity } => match loader.load(&activity).await? {
            LoadOutcome::Idle => print_idle(&activity)?,
            LoadOutcome::Completed(record) => {
                eprintln!("cycle {} is already completed", record.id);
                print_json(&record)?;
            }
            LoadOutcome::Ready(driver) => {
                let events = driver.start().await?;
                let snapshot = driver.snapshot().await;
                driver.teardown().await;
                print_events(&events)?;
                print_json(&snapshot)?;
            }
        },
        CycleAction::Pause { activity } => match loader.load(&activity).await? {
            LoadOutcome::Idle => print_idle(&activity)?,
            LoadOutcome::Completed(record) => print_json(&record)?,
            LoadOutcome::Ready(driver) => {
                let events = driver.pause().await?;
                let snapshot = driver.snapshot().await;
                driver.teardown().await;
                print_events(&events)?;
                print_json(&snapshot)?;
            }
        },
        CycleAction::Run { activity } => run_foreground(&loader, &activity).await?,
        CycleAction::Cancel { activity } => {
            store.cancel(&activity).await?;
            println!("cycle for {activity} cancelled");
        }
        CycleAction::Cleanup => {
            let removed = store.cleanup().await?;
            println!("removed {removed} completed cycle(s)");
        }
    }
    Ok(())
}

async fn run_foreground(loader: &CycleLoader, activity_id: &str) -> CommandResult {
    let driver = match loader.load(activity_id).await? {
        LoadOutcome::Idle => return print_idle(activity_id),
        LoadOutcome::Completed(record) => return print_json(&record),
        LoadOutcome::Ready(driver) => driver,
    };
    // Events are buffered on the driver's channel, so the start event is
    // printed by the loop below.
    driver.start().await?;

    let print = |event: LoaderEvent| {
        let line = match &event {
            LoaderEvent::Engine(e) => serde_json::to_string(e),
            LoaderEvent::PhaseRecorded(record) => {
                serde_json::to_string(&json!({ "type": "PhaseRecorded", "record": record }))
            }
            LoaderEvent::Resynced(record) => {
                serde_json::to_string(&json!({ "type": "Resynced", "record": record }))
            }
            LoaderEvent::CycleFinished { activity_id, cycle_id } => serde_json::to_string(
                &json!({ "type": "CycleFinished", "activityId": activity_id, "cycleId": cycle_id }),
            ),
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("error: {e}"),
        }
    };

    tokio::select! {
        result = loader.run(&driver, print) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!(activity_id, "interrupted, pausing cycle");
            driver.pause().await?;
            driver.teardown().await;
        }
    }
    Ok(())
}
