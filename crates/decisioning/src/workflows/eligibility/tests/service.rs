use std::time::Duration;

use chrono::Utc;

use super::common::*;
use crate::workflows::eligibility::domain::{DecisionStatus, DecisionType, FactValue, RiskBand};
use crate::workflows::eligibility::repository::FactProviderError;
use crate::workflows::eligibility::service::DecisionServiceError;
use crate::workflows::eligibility::worklist::WorklistCriteria;

#[tokio::test]
async fn low_risk_pass_auto_approves_and_dispatches() {
    let harness = harness_with(FixedScorer { score: 0.15 });
    let applicant_id = applicant("svc-approve");
    harness.provider.register(passing_facts(&applicant_id));

    let decision = harness
        .service
        .evaluate(&applicant_id, &scheme())
        .await
        .expect("evaluation succeeds");

    assert_eq!(decision.decision_type, DecisionType::AutoApprove);
    assert_eq!(decision.status, DecisionStatus::Approved);
    assert_eq!(decision.rule_version, 1);
    let risk = decision.risk.as_ref().expect("risk read present");
    assert_eq!(risk.band, RiskBand::Low);
    assert_eq!(decision.routing_target.0, "submissions:old-age-pension");

    let events = harness.dispatcher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, decision.id);

    let history = harness
        .service
        .decision_history(&decision.id)
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_state, "evaluating");
    assert_eq!(history[0].to_state, "auto_approve");
}

#[tokio::test]
async fn medium_risk_pass_routes_to_officer() {
    let harness = harness_with(FixedScorer { score: 0.5 });
    let applicant_id = applicant("svc-medium");
    harness.provider.register(passing_facts(&applicant_id));

    let decision = harness
        .service
        .evaluate(&applicant_id, &scheme())
        .await
        .expect("evaluation succeeds");

    assert_eq!(decision.decision_type, DecisionType::RouteToOfficer);
    assert_eq!(decision.status, DecisionStatus::UnderReview);
    assert_eq!(
        decision.routing_target.0,
        "officer-review:old-age-pension"
    );
}

#[tokio::test]
async fn duplicate_flag_routes_to_fraud_regardless_of_low_score() {
    let harness = harness_with(FixedScorer { score: 0.05 });
    let applicant_id = applicant("svc-fraud");
    harness.provider.register(
        passing_facts(&applicant_id).with_field("duplicate_flag", FactValue::Bool(true)),
    );

    let decision = harness
        .service
        .evaluate(&applicant_id, &scheme())
        .await
        .expect("evaluation succeeds");

    assert_eq!(decision.decision_type, DecisionType::RouteToFraud);
    assert_eq!(decision.routing_target.0, "fraud-review");
}

#[tokio::test]
async fn scorer_outage_forces_officer_review() {
    let harness = harness_with(UnavailableScorer);
    let applicant_id = applicant("svc-outage");
    harness.provider.register(passing_facts(&applicant_id));

    let decision = harness
        .service
        .evaluate(&applicant_id, &scheme())
        .await
        .expect("evaluation still succeeds");

    assert_eq!(decision.decision_type, DecisionType::RouteToOfficer);
    assert!(decision.risk.is_none());
}

#[tokio::test]
async fn scorer_timeout_is_treated_as_unavailable() {
    let harness = harness_with(SlowScorer {
        delay: Duration::from_secs(5),
        score: 0.1,
    });
    let applicant_id = applicant("svc-timeout");
    harness.provider.register(passing_facts(&applicant_id));

    let decision = harness
        .service
        .evaluate(&applicant_id, &scheme())
        .await
        .expect("evaluation still succeeds");

    assert_eq!(decision.decision_type, DecisionType::RouteToOfficer);
    assert!(decision.risk.is_none());
}

#[tokio::test]
async fn dispatch_failure_does_not_lose_the_decision() {
    let provider = std::sync::Arc::new(StaticFactProvider::default());
    let repository = std::sync::Arc::new(MemoryDecisionRepository::default());
    let service = std::sync::Arc::new(
        crate::workflows::eligibility::service::DecisionService::new(
            seeded_store(),
            provider.clone(),
            std::sync::Arc::new(FixedScorer { score: 0.15 }),
            repository.clone(),
            std::sync::Arc::new(FailingDispatcher),
            test_config(),
        ),
    );

    let applicant_id = applicant("svc-dispatch");
    provider.register(passing_facts(&applicant_id));

    let decision = service
        .evaluate(&applicant_id, &scheme())
        .await
        .expect("evaluation succeeds despite dispatch failure");
    assert_eq!(
        service.decision(&decision.id).expect("persisted"),
        decision
    );
}

#[tokio::test]
async fn unknown_applicant_fails_explicitly() {
    let harness = harness();
    let result = harness
        .service
        .evaluate(&applicant("svc-unknown"), &scheme())
        .await;
    assert!(matches!(
        result,
        Err(DecisionServiceError::Facts(
            FactProviderError::UnknownApplicant(_)
        ))
    ));
}

#[tokio::test]
async fn comparison_reports_divergence_after_a_rule_tightening() {
    let harness = harness_with(FixedScorer { score: 0.15 });
    let applicant_id = applicant("svc-compare");
    harness.provider.register(passing_facts(&applicant_id));

    // Tighten the income ceiling below the applicant's declared income and
    // publish v2.
    let store = harness.service.store();
    let mut draft = store
        .draft_rules(&scheme())
        .into_iter()
        .find(|rule| rule.name == "income-ceiling")
        .expect("income draft");
    draft.expr = crate::workflows::eligibility::expr::RuleExpr::compare(
        crate::workflows::eligibility::expr::CompareOp::Le,
        crate::workflows::eligibility::expr::RuleExpr::field("income"),
        crate::workflows::eligibility::expr::RuleExpr::number(40_000.0),
    );
    store.update_rule(draft).expect("tighten income rule");
    store.publish(&scheme()).expect("publish v2");

    let comparison = harness
        .service
        .compare_versions(&scheme(), 1, 2, &applicant_id)
        .await
        .expect("comparison runs");

    assert_eq!(comparison.old.decision_type, DecisionType::AutoApprove);
    assert_eq!(comparison.new.decision_type, DecisionType::RouteToOfficer);
    assert!(comparison.diverged);
}

#[tokio::test]
async fn comparison_of_identical_versions_does_not_diverge() {
    let harness = harness_with(FixedScorer { score: 0.15 });
    let applicant_id = applicant("svc-compare-same");
    harness.provider.register(passing_facts(&applicant_id));

    let store = harness.service.store();
    store.publish(&scheme()).expect("publish identical v2");

    let comparison = harness
        .service
        .compare_versions(&scheme(), 1, 2, &applicant_id)
        .await
        .expect("comparison runs");
    assert!(!comparison.diverged);
    assert_eq!(comparison.old.decision_type, comparison.new.decision_type);
}

#[tokio::test]
async fn rollback_restores_prior_evaluation_behavior() {
    let harness = harness_with(FixedScorer { score: 0.15 });
    let applicant_id = applicant("svc-rollback");
    harness.provider.register(passing_facts(&applicant_id));

    let store = harness.service.store();
    let mut draft = store
        .draft_rules(&scheme())
        .into_iter()
        .find(|rule| rule.name == "income-ceiling")
        .expect("income draft");
    draft.expr = crate::workflows::eligibility::expr::RuleExpr::compare(
        crate::workflows::eligibility::expr::CompareOp::Le,
        crate::workflows::eligibility::expr::RuleExpr::field("income"),
        crate::workflows::eligibility::expr::RuleExpr::number(40_000.0),
    );
    store.update_rule(draft).expect("tighten income rule");
    store.publish(&scheme()).expect("publish v2");

    let restored = store.rollback(&scheme(), 1).expect("rollback to v1");
    assert!(restored.version > 1);

    // The restored version decides exactly as version 1 did.
    let comparison = harness
        .service
        .compare_versions(&scheme(), 1, restored.version, &applicant_id)
        .await
        .expect("comparison runs");
    assert!(!comparison.diverged);
    assert_eq!(comparison.old.evaluations, comparison.new.evaluations);
}

#[tokio::test]
async fn stp_metrics_cover_the_evaluation_window() {
    let harness = harness_with(FixedScorer { score: 0.15 });
    let start = Utc::now();

    for suffix in ["stp-a", "stp-b"] {
        let applicant_id = applicant(suffix);
        harness.provider.register(passing_facts(&applicant_id));
        harness
            .service
            .evaluate(&applicant_id, &scheme())
            .await
            .expect("evaluation succeeds");
    }
    let routed = applicant("stp-c");
    harness.provider.register(
        passing_facts(&routed).with_field("residency_certificate", FactValue::Bool(false)),
    );
    harness
        .service
        .evaluate(&routed, &scheme())
        .await
        .expect("evaluation succeeds");

    let end = Utc::now() + chrono::Duration::seconds(1);
    let metrics = harness
        .service
        .stp_metrics(&scheme(), start, end)
        .expect("metrics aggregate");

    assert_eq!(metrics.total, 3);
    assert_eq!(metrics.auto_approved, 2);
    assert_eq!(metrics.routed_to_officer, 1);
    assert!((metrics.auto_approval_rate - 2.0 / 3.0).abs() < 0.001);
}

#[tokio::test]
async fn worklist_streams_officer_candidates_over_min_score() {
    let harness = harness_with(FixedScorer { score: 0.5 });
    for suffix in ["wl-a", "wl-b", "wl-c"] {
        let applicant_id = applicant(suffix);
        harness.provider.register(passing_facts(&applicant_id));
    }

    let handle = harness
        .service
        .generate_worklist(
            scheme(),
            WorklistCriteria {
                min_score: 0.4,
                district: None,
                limit: 10,
            },
        )
        .await
        .expect("worklist starts");

    let mut candidates = handle.collect().await;
    candidates.sort_by(|a, b| a.applicant_id.0.cmp(&b.applicant_id.0));
    assert_eq!(candidates.len(), 3);
    for candidate in &candidates {
        assert_eq!(candidate.decision_type, DecisionType::RouteToOfficer);
        assert!(candidate.risk_score >= 0.4);
    }
}

#[tokio::test]
async fn worklist_respects_limit_and_district_filter() {
    let harness = harness_with(FixedScorer { score: 0.5 });
    for (suffix, district) in [("wl-n1", "north"), ("wl-n2", "north"), ("wl-s1", "south")] {
        let applicant_id = applicant(suffix);
        harness.provider.register(
            passing_facts(&applicant_id)
                .with_field("district", FactValue::Text(district.to_string())),
        );
    }

    let handle = harness
        .service
        .generate_worklist(
            scheme(),
            WorklistCriteria {
                min_score: 0.0,
                district: Some("north".to_string()),
                limit: 1,
            },
        )
        .await
        .expect("worklist starts");

    let candidates = handle.collect().await;
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].applicant_id.0.starts_with("applicant-wl-n"));
}

#[tokio::test]
async fn worklist_skips_failing_applicants_without_aborting() {
    let harness = harness_with(FixedScorer { score: 0.5 });
    // "wl-broken" is on the roster with facts that fail the critical age rule.
    let ok = applicant("wl-ok");
    harness.provider.register(passing_facts(&ok));
    let broken = applicant("wl-broken");
    let mut broken_facts = passing_facts(&broken);
    broken_facts.fields.remove("age");
    harness.provider.register(broken_facts);

    let handle = harness
        .service
        .generate_worklist(
            scheme(),
            WorklistCriteria {
                min_score: 0.0,
                district: None,
                limit: 10,
            },
        )
        .await
        .expect("worklist starts");

    let candidates = handle.collect().await;
    // The broken applicant fails its critical rule (auto-reject) and never
    // qualifies; the healthy one streams through.
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].applicant_id, ok);
}

#[tokio::test]
async fn cancelled_worklist_stops_before_the_next_applicant() {
    let harness = harness_with(SlowScorer {
        delay: Duration::from_millis(50),
        score: 0.5,
    });
    for idx in 0..20 {
        let applicant_id = applicant(&format!("wl-cancel-{idx:02}"));
        harness.provider.register(passing_facts(&applicant_id));
    }

    let handle = harness
        .service
        .generate_worklist(
            scheme(),
            WorklistCriteria {
                min_score: 0.0,
                district: None,
                limit: 100,
            },
        )
        .await
        .expect("worklist starts");

    handle.cancel();
    let candidates = handle.collect().await;
    // Cancellation is checked between units of work; only applicants already
    // in flight may still stream.
    assert!(candidates.len() < 20);
}
