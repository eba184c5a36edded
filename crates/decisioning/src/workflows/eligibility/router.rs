use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ApplicantId, DecisionId, DecisionType, OfficerId, Rule, RuleCategory, RuleId, SchemeId,
    Severity,
};
use super::expr::RuleExpr;
use super::overrides::OverrideError;
use super::repository::{
    DecisionRepository, FactProvider, FactProviderError, QueueDispatcher, RepositoryError,
};
use super::risk::RiskScorer;
use super::service::{DecisionService, DecisionServiceError};
use super::store::{NewRule, RuleStoreError};
use super::worklist::WorklistCriteria;

/// Router exposing the decisioning workflow: rule authoring and versioning,
/// evaluation, overrides, comparison, metrics, and worklist generation.
pub fn eligibility_router<P, S, R, Q>(service: Arc<DecisionService<P, S, R, Q>>) -> Router
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    Router::new()
        .route(
            "/api/v1/schemes/:scheme_id/rules",
            get(list_rules_handler::<P, S, R, Q>).post(create_rule_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/rules/:rule_id",
            put(update_rule_handler::<P, S, R, Q>).delete(delete_rule_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/rules/:rule_id/clone",
            post(clone_rule_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/schemes/:scheme_id/publish",
            post(publish_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/schemes/:scheme_id/rollback",
            post(rollback_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/schemes/:scheme_id/snapshots",
            post(snapshot_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/schemes/:scheme_id/evaluations",
            post(evaluate_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/decisions/:decision_id",
            get(decision_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/decisions/:decision_id/overrides",
            post(override_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/schemes/:scheme_id/comparisons",
            post(compare_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/schemes/:scheme_id/metrics/stp",
            get(stp_metrics_handler::<P, S, R, Q>),
        )
        .route(
            "/api/v1/schemes/:scheme_id/worklist",
            post(worklist_handler::<P, S, R, Q>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRuleRequest {
    pub(crate) category: RuleCategory,
    pub(crate) name: String,
    pub(crate) expr: RuleExpr,
    pub(crate) severity: Severity,
    pub(crate) failure_message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RollbackRequest {
    pub(crate) target_version: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotRequest {
    pub(crate) version: u32,
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateRequest {
    pub(crate) applicant_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverrideRequest {
    pub(crate) decision_type: DecisionType,
    pub(crate) reason: String,
    pub(crate) officer_id: String,
    #[serde(default)]
    pub(crate) expected_revision: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompareRequest {
    pub(crate) applicant_id: String,
    pub(crate) version_old: u32,
    pub(crate) version_new: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StpQuery {
    pub(crate) period_start: DateTime<Utc>,
    pub(crate) period_end: DateTime<Utc>,
}

type ServiceState<P, S, R, Q> = State<Arc<DecisionService<P, S, R, Q>>>;

pub(crate) async fn create_rule_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
    axum::Json(request): axum::Json<CreateRuleRequest>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    let new_rule = NewRule {
        scheme_id: SchemeId(scheme_id),
        category: request.category,
        name: request.name,
        expr: request.expr,
        severity: request.severity,
        failure_message: request.failure_message,
    };
    match service.store().create_rule(new_rule) {
        Ok(rule) => (StatusCode::CREATED, axum::Json(rule)).into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn list_rules_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    let rules = service.store().draft_rules(&SchemeId(scheme_id));
    (StatusCode::OK, axum::Json(rules)).into_response()
}

pub(crate) async fn update_rule_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(rule_id): Path<String>,
    axum::Json(mut rule): axum::Json<Rule>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    rule.id = RuleId(rule_id);
    match service.store().update_rule(rule) {
        Ok(rule) => (StatusCode::OK, axum::Json(rule)).into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn delete_rule_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(rule_id): Path<String>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service.store().delete_rule(&RuleId(rule_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn clone_rule_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(rule_id): Path<String>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service.store().clone_rule(&RuleId(rule_id)) {
        Ok(rule) => (StatusCode::CREATED, axum::Json(rule)).into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn publish_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service.store().publish(&SchemeId(scheme_id)) {
        Ok(version) => (StatusCode::CREATED, axum::Json(version)).into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn rollback_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
    axum::Json(request): axum::Json<RollbackRequest>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service
        .store()
        .rollback(&SchemeId(scheme_id), request.target_version)
    {
        Ok(version) => (StatusCode::CREATED, axum::Json(version)).into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn snapshot_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
    axum::Json(request): axum::Json<SnapshotRequest>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service
        .store()
        .snapshot(&SchemeId(scheme_id), request.version, request.name)
    {
        Ok(snapshot) => (StatusCode::CREATED, axum::Json(snapshot)).into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn evaluate_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
    axum::Json(request): axum::Json<EvaluateRequest>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    let applicant_id = ApplicantId(request.applicant_id);
    match service.evaluate(&applicant_id, &SchemeId(scheme_id)).await {
        Ok(decision) => (StatusCode::CREATED, axum::Json(decision)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn decision_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(decision_id): Path<String>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    let id = DecisionId(decision_id);
    let decision = match service.decision(&id) {
        Ok(decision) => decision,
        Err(err) => return service_error_response(err),
    };
    let overrides = match service.decision_overrides(&id) {
        Ok(overrides) => overrides,
        Err(err) => return service_error_response(err),
    };
    let history = match service.decision_history(&id) {
        Ok(history) => history,
        Err(err) => return service_error_response(err),
    };
    let effective = overrides
        .last()
        .map(|record| record.decision_type)
        .unwrap_or(decision.decision_type);

    let payload = json!({
        "decision": decision,
        "effective_decision_type": effective.label(),
        "overrides": overrides,
        "history": history,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn override_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(decision_id): Path<String>,
    axum::Json(request): axum::Json<OverrideRequest>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service.override_decision(
        &DecisionId(decision_id),
        request.decision_type,
        &request.reason,
        OfficerId(request.officer_id),
        request.expected_revision,
    ) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn compare_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
    axum::Json(request): axum::Json<CompareRequest>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service
        .compare_versions(
            &SchemeId(scheme_id),
            request.version_old,
            request.version_new,
            &ApplicantId(request.applicant_id),
        )
        .await
    {
        Ok(comparison) => (StatusCode::OK, axum::Json(comparison)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn stp_metrics_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
    Query(query): Query<StpQuery>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service.stp_metrics(&SchemeId(scheme_id), query.period_start, query.period_end) {
        Ok(metrics) => (StatusCode::OK, axum::Json(metrics)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn worklist_handler<P, S, R, Q>(
    State(service): ServiceState<P, S, R, Q>,
    Path(scheme_id): Path<String>,
    axum::Json(criteria): axum::Json<WorklistCriteria>,
) -> Response
where
    P: FactProvider + 'static,
    S: RiskScorer + 'static,
    R: DecisionRepository + 'static,
    Q: QueueDispatcher + 'static,
{
    match service
        .generate_worklist(SchemeId(scheme_id), criteria)
        .await
    {
        Ok(handle) => {
            let candidates = handle.collect().await;
            (StatusCode::OK, axum::Json(candidates)).into_response()
        }
        Err(err) => service_error_response(err),
    }
}

fn store_error_response(err: RuleStoreError) -> Response {
    let status = match &err {
        RuleStoreError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RuleStoreError::SnapshotNameTaken(_) => StatusCode::CONFLICT,
        RuleStoreError::NothingToPublish(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RuleStoreError::RuleNotFound(_)
        | RuleStoreError::VersionNotFound { .. }
        | RuleStoreError::SnapshotNotFound(_)
        | RuleStoreError::NoActiveVersion(_) => StatusCode::NOT_FOUND,
    };
    error_payload(status, &err)
}

fn service_error_response(err: DecisionServiceError) -> Response {
    let status = match &err {
        DecisionServiceError::Store(store) => match store {
            RuleStoreError::Validation { .. } | RuleStoreError::NothingToPublish(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RuleStoreError::SnapshotNameTaken(_) => StatusCode::CONFLICT,
            _ => StatusCode::NOT_FOUND,
        },
        DecisionServiceError::Facts(FactProviderError::UnknownApplicant(_))
        | DecisionServiceError::Facts(FactProviderError::UnknownScheme(_)) => {
            StatusCode::NOT_FOUND
        }
        DecisionServiceError::Facts(FactProviderError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        DecisionServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        DecisionServiceError::Repository(RepositoryError::Conflict)
        | DecisionServiceError::Repository(RepositoryError::RevisionConflict { .. }) => {
            StatusCode::CONFLICT
        }
        DecisionServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        DecisionServiceError::Override(OverrideError::EmptyReason) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DecisionServiceError::Override(OverrideError::Repository(repo)) => match repo {
            RepositoryError::NotFound => StatusCode::NOT_FOUND,
            RepositoryError::Conflict | RepositoryError::RevisionConflict { .. } => {
                StatusCode::CONFLICT
            }
            RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    };
    error_payload(status, &err)
}

fn error_payload(status: StatusCode, err: &dyn std::fmt::Display) -> Response {
    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}
