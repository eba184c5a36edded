use std::sync::Arc;

use chrono::Utc;
use clap::Args;

use crate::infra::{
    decision_config, InMemoryDecisionRepository, InMemoryFactProvider, LoggingQueueDispatcher,
    StubRiskScorer,
};
use decisioning::config::AppConfig;
use decisioning::error::AppError;
use decisioning::workflows::eligibility::{
    ApplicantFacts, ApplicantId, CompareOp, DecisionService, DecisionType, FactValue, NewRule,
    OfficerId, RuleCategory, RuleExpr, RuleStore, SchemeId, Severity, WorklistCriteria,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Scheme identifier used for the seeded demo data
    #[arg(long, default_value = "old-age-pension")]
    pub(crate) scheme: String,
    /// Also run a worklist scan over the seeded applicants
    #[arg(long)]
    pub(crate) worklist: bool,
}

type DemoService = DecisionService<
    InMemoryFactProvider,
    StubRiskScorer,
    InMemoryDecisionRepository,
    LoggingQueueDispatcher,
>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let scheme_id = SchemeId(args.scheme.clone());

    let store = Arc::new(RuleStore::new());
    seed_rules(&store, &scheme_id);
    let version = store
        .publish(&scheme_id)
        .expect("seeded demo rules always publish");
    println!(
        "published rule version {} with {} rules for scheme {}",
        version.version,
        version.rules.len(),
        scheme_id
    );

    let provider = Arc::new(InMemoryFactProvider::default());
    let service: Arc<DemoService> = Arc::new(DecisionService::new(
        store,
        provider.clone(),
        Arc::new(StubRiskScorer),
        Arc::new(InMemoryDecisionRepository::default()),
        Arc::new(LoggingQueueDispatcher),
        decision_config(&config.decisioning),
    ));

    let window_start = Utc::now();

    for (name, risk_hint, duplicate) in [
        ("applicant-001", 0.15, false),
        ("applicant-002", 0.15, true),
        ("applicant-003", 0.55, false),
    ] {
        provider.register(demo_facts(name, &scheme_id, risk_hint, duplicate));
        let decision = service
            .evaluate(&ApplicantId(name.to_string()), &scheme_id)
            .await?;
        println!(
            "{name}: {} -> queue {}",
            decision.decision_type.label(),
            decision.routing_target
        );

        if decision.decision_type == DecisionType::RouteToOfficer {
            let record = service
                .override_decision(
                    &decision.id,
                    DecisionType::AutoApprove,
                    "officer verified income documents in person",
                    OfficerId("officer-demo".to_string()),
                    0,
                )?;
            println!(
                "{name}: overridden to {} by {} (revision {})",
                record.decision_type.label(),
                record.officer_id,
                record.revision
            );
        }
    }

    if args.worklist {
        let handle = service
            .generate_worklist(
                scheme_id.clone(),
                WorklistCriteria {
                    min_score: 0.3,
                    district: None,
                    limit: 10,
                },
            )
            .await?;
        let candidates = handle.collect().await;
        println!("worklist candidates: {}", candidates.len());
        for candidate in candidates {
            println!(
                "  {} (score {:.2}) -> {}",
                candidate.applicant_id, candidate.risk_score, candidate.routing_target
            );
        }
    }

    let metrics = service
        .stp_metrics(
            &scheme_id,
            window_start,
            Utc::now() + chrono::Duration::seconds(1),
        )?;
    println!(
        "stp: {}/{} auto-approved ({:.0}% straight-through)",
        metrics.auto_approved,
        metrics.total,
        metrics.straight_through_rate * 100.0
    );

    Ok(())
}

fn seed_rules(store: &RuleStore, scheme_id: &SchemeId) {
    let rules = [
        NewRule {
            scheme_id: scheme_id.clone(),
            category: RuleCategory::Income,
            name: "income-ceiling".to_string(),
            expr: RuleExpr::compare(
                CompareOp::Le,
                RuleExpr::field("income"),
                RuleExpr::number(60_000.0),
            ),
            severity: Severity::Major,
            failure_message: "declared income exceeds the scheme ceiling".to_string(),
        },
        NewRule {
            scheme_id: scheme_id.clone(),
            category: RuleCategory::Demographic,
            name: "minimum-age".to_string(),
            expr: RuleExpr::compare(
                CompareOp::Ge,
                RuleExpr::field("age"),
                RuleExpr::number(65.0),
            ),
            severity: Severity::Critical,
            failure_message: "applicant is below the minimum age".to_string(),
        },
        NewRule {
            scheme_id: scheme_id.clone(),
            category: RuleCategory::DuplicateDetection,
            name: "duplicate-beneficiary".to_string(),
            expr: RuleExpr::compare(
                CompareOp::Eq,
                RuleExpr::field("duplicate_flag"),
                RuleExpr::boolean(false),
            ),
            severity: Severity::Critical,
            failure_message: "duplicate beneficiary record".to_string(),
        },
    ];

    for rule in rules {
        store
            .create_rule(rule)
            .expect("seeded demo rules always validate");
    }
}

fn demo_facts(
    applicant: &str,
    scheme_id: &SchemeId,
    risk_hint: f64,
    duplicate: bool,
) -> ApplicantFacts {
    ApplicantFacts::new(ApplicantId(applicant.to_string()), scheme_id.clone())
        .with_field("income", FactValue::Number(50_000.0))
        .with_field("age", FactValue::Number(70.0))
        .with_field("duplicate_flag", FactValue::Bool(duplicate))
        .with_field("risk_hint", FactValue::Number(risk_hint))
}
