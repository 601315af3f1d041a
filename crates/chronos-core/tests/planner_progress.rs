//! Integration tests for the session planner and the progress classifier.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use chronos_core::{
    classify, classify_with_grace, ActivityStatus, ActivityWindow, CycleError, PlanPayload,
    SessionField, SessionPlanner,
};
use proptest::prelude::*;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn minute(m: u32) -> NaiveDateTime {
    day().and_time(NaiveTime::from_num_seconds_from_midnight_opt(m * 60, 0).unwrap())
}

fn percent(status: ActivityStatus) -> f64 {
    match status {
        ActivityStatus::InProgress { percent } => percent,
        other => panic!("expected in-progress, got {other:?}"),
    }
}

#[test]
fn test_planner_edit_session_flow() {
    let mut planner = SessionPlanner::new(120);
    let payload = planner.add_session();
    let plan = payload.plan().unwrap();
    assert_eq!(plan.sessions.len(), 2);
    assert_eq!(plan.aggregate_focus_minutes, 50);
    assert_eq!(plan.strategic_reserve_minutes, 60);

    let second = plan.sessions[1].id.clone();
    let payload = planner.update_session(&second, SessionField::Focus, 75);
    assert_eq!(payload.plan().unwrap().sessions[1].focus_duration_minutes, 60);

    let payload = planner.update_session(&second, SessionField::Rest, 0);
    assert_eq!(payload.plan().unwrap().sessions[1].rest_duration_minutes, 1);

    let payload = planner.remove_session(&second);
    assert_eq!(payload.plan().unwrap().sessions.len(), 1);

    let only = planner.sessions()[0].id.clone();
    let payload = planner.remove_session(&only);
    assert_eq!(payload.plan().unwrap().sessions.len(), 1);
}

#[test]
fn test_disabled_plan_serializes_flag_only() {
    let mut planner = SessionPlanner::new(60);
    let payload = planner.set_enabled(false);
    assert_eq!(payload, PlanPayload::Disabled { enabled: false });
    assert_eq!(serde_json::to_value(&payload).unwrap(), serde_json::json!({ "enabled": false }));

    let payload = planner.set_enabled(true);
    assert!(payload.is_enabled());
}

#[test]
fn test_hand_built_plan_is_validated() {
    let mut plan = SessionPlanner::new(60).plan();
    plan.sessions[0].rest_duration_minutes = 45;
    match plan.validate() {
        Err(CycleError::InvalidSessionConfig { field, minutes, max, .. }) => {
            assert_eq!(field, "rest");
            assert_eq!(minutes, 45);
            assert_eq!(max, 30);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_window_change_moves_reserve() {
    let mut planner = SessionPlanner::new(60);
    let payload = planner.set_window_minutes(20);
    let plan = payload.plan().unwrap();
    assert_eq!(plan.strategic_reserve_minutes, -10);
    assert!(plan.is_over_window());
}

#[test]
fn test_classifier_reference_points() {
    let window = ActivityWindow::new(day(), 540, 600).unwrap();
    assert!((percent(classify(&window, minute(560))) - 33.33).abs() < 0.01);
    assert_eq!(percent(classify(&window, minute(604))), 100.0);
    assert_eq!(classify(&window, minute(605)), ActivityStatus::InProgress { percent: 100.0 });
    assert_eq!(classify(&window, minute(610)), ActivityStatus::AwaitingCompletion);
    assert_eq!(classify(&window, minute(500)), ActivityStatus::Upcoming);
    assert_eq!(classify_with_grace(&window, minute(604), 2), ActivityStatus::AwaitingCompletion);
}

#[test]
fn test_classifier_other_days_and_completion() {
    let window = ActivityWindow::new(day(), 540, 600).unwrap();
    let day_before = minute(560) - chrono::Duration::days(1);
    assert_eq!(classify(&window, day_before), ActivityStatus::Awaiting);
    let next_day = minute(300) + chrono::Duration::days(1);
    assert_eq!(classify(&window, next_day), ActivityStatus::AwaitingCompletion);

    let done = ActivityWindow { completed: true, ..window };
    assert_eq!(classify(&done, minute(560)), ActivityStatus::Completed);
}

proptest! {
    /// Any mix of edits keeps at least one session and every duration in range.
    #[test]
    fn prop_planner_edits_stay_in_range(
        edits in proptest::collection::vec((0u8..4, 0usize..8, 0u32..200), 0..40),
    ) {
        let mut planner = SessionPlanner::new(240);
        for (op, index, minutes) in edits {
            let ids: Vec<String> = planner.sessions().iter().map(|s| s.id.clone()).collect();
            let id = ids[index % ids.len()].clone();
            match op {
                0 => { planner.add_session(); }
                1 => { planner.remove_session(&id); }
                2 => { planner.update_session(&id, SessionField::Focus, minutes); }
                _ => { planner.update_session(&id, SessionField::Rest, minutes); }
            }
        }
        let plan = planner.plan();
        prop_assert!(!plan.sessions.is_empty());
        prop_assert!(plan.validate().is_ok());
        let total: u32 = plan.sessions.iter()
            .map(|s| s.focus_duration_minutes + s.rest_duration_minutes)
            .sum();
        prop_assert_eq!(plan.strategic_reserve_minutes, 240 - i64::from(total));
    }

    /// Progress inside today's window stays within 0..=100.
    #[test]
    fn prop_progress_is_bounded(start in 0u32..1200, len in 0u32..200, at in 0u32..1439) {
        let window = ActivityWindow::new(day(), start, start + len).unwrap();
        if let ActivityStatus::InProgress { percent } = classify(&window, minute(at)) {
            prop_assert!((0.0..=100.0).contains(&percent));
        }
    }
}
