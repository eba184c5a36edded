use chrono::{Duration, TimeZone, Utc};

use crate::workflows::eligibility::domain::{
    ApplicantId, ChangedByType, DecisionHistoryEntry, DecisionId, DecisionResult, DecisionType,
    RoutingTarget, SchemeId,
};
use crate::workflows::eligibility::metrics;

use super::common::scheme;

fn decision(idx: usize, decision_type: DecisionType, offset_minutes: i64) -> DecisionResult {
    let evaluated_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
        + Duration::minutes(offset_minutes);
    DecisionResult {
        id: DecisionId(format!("dec-m{idx:03}")),
        applicant_id: ApplicantId(format!("applicant-m{idx:03}")),
        scheme_id: scheme(),
        rule_version: 1,
        decision_type,
        status: decision_type.status(),
        evaluations: Vec::new(),
        risk: None,
        routing_target: RoutingTarget("officer-review:old-age-pension".to_string()),
        evaluated_at,
    }
}

fn initial_entry(decision: &DecisionResult) -> DecisionHistoryEntry {
    DecisionHistoryEntry::initial(decision)
}

fn override_entry(
    decision: &DecisionResult,
    to: DecisionType,
    seconds_later: i64,
) -> DecisionHistoryEntry {
    DecisionHistoryEntry {
        decision_id: decision.id.clone(),
        from_state: decision.decision_type.label().to_string(),
        to_state: to.label().to_string(),
        actor: "officer-9".to_string(),
        changed_by_type: ChangedByType::Officer,
        reason: Some("manual verification complete".to_string()),
        timestamp: decision.evaluated_at + Duration::seconds(seconds_later),
    }
}

#[test]
fn counts_and_rates_per_decision_type() {
    let d1 = decision(1, DecisionType::AutoApprove, 0);
    let d2 = decision(2, DecisionType::AutoApprove, 5);
    let d3 = decision(3, DecisionType::RouteToOfficer, 10);
    let d4 = decision(4, DecisionType::AutoReject, 15);
    let d5 = decision(5, DecisionType::RouteToFraud, 20);

    let records: Vec<_> = [&d1, &d2, &d3, &d4, &d5]
        .into_iter()
        .map(|d| ((*d).clone(), vec![initial_entry(d)]))
        .collect();

    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
    let metrics = metrics::aggregate(scheme(), start, end, &records);

    assert_eq!(metrics.total, 5);
    assert_eq!(metrics.auto_approved, 2);
    assert_eq!(metrics.auto_rejected, 1);
    assert_eq!(metrics.routed_to_officer, 1);
    assert_eq!(metrics.routed_to_fraud, 1);
    assert!((metrics.auto_approval_rate - 0.4).abs() < f64::EPSILON);
    assert!((metrics.straight_through_rate - 0.6).abs() < f64::EPSILON);
}

#[test]
fn empty_window_has_zero_rates() {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
    let metrics = metrics::aggregate(scheme(), start, end, &[]);

    assert_eq!(metrics.total, 0);
    assert_eq!(metrics.auto_approval_rate, 0.0);
    assert_eq!(metrics.straight_through_rate, 0.0);
    assert!(metrics.avg_seconds_to_final.is_none());
}

#[test]
fn average_time_to_final_spans_evaluation_to_first_final_transition() {
    // Auto decisions are final at evaluation time (0 seconds); the routed one
    // becomes final only when the officer override lands.
    let auto = decision(1, DecisionType::AutoApprove, 0);
    let routed = decision(2, DecisionType::RouteToOfficer, 0);

    let records = vec![
        (auto.clone(), vec![initial_entry(&auto)]),
        (
            routed.clone(),
            vec![
                initial_entry(&routed),
                override_entry(&routed, DecisionType::AutoApprove, 600),
            ],
        ),
    ];

    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
    let metrics = metrics::aggregate(scheme(), start, end, &records);

    let avg = metrics.avg_seconds_to_final.expect("two final decisions");
    assert!((avg - 300.0).abs() < 0.001);
}

#[test]
fn under_review_decisions_do_not_contribute_a_final_duration() {
    let routed = decision(1, DecisionType::RouteToOfficer, 0);
    let records = vec![(routed.clone(), vec![initial_entry(&routed)])];

    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
    let metrics = metrics::aggregate(scheme(), start, end, &records);

    assert_eq!(metrics.total, 1);
    assert!(metrics.avg_seconds_to_final.is_none());
}
