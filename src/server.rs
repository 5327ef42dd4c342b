use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::aggregate;
use crate::db::{self, BulkUpsertError};
use crate::models::{MonthlyKpiTarget, StageNode, Week, WeeklyDataEntry};
use crate::overview::MonthlyOverview;
use crate::period::{self, PeriodAnalysis};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid month {0:?}: expected YYYY-MM")]
    InvalidMonth(String),
    #[error("end date must not precede start date")]
    InvalidDateRange,
    #[error("unknown KPI ids: {}", join_uuids(.0))]
    MissingKpis(Vec<Uuid>),
    #[error("unknown week ids: {}", .0.join(", "))]
    MissingWeeks(Vec<String>),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn join_uuids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<BulkUpsertError> for ApiError {
    fn from(err: BulkUpsertError) -> Self {
        match err {
            BulkUpsertError::MissingKpis(ids) => ApiError::MissingKpis(ids),
            BulkUpsertError::MissingWeeks(ids) => ApiError::MissingWeeks(ids),
            BulkUpsertError::Db(err) => ApiError::Db(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidMonth(_) | ApiError::InvalidDateRange => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation")
            }
            ApiError::MissingKpis(_) | ApiError::MissingWeeks(_) => {
                (StatusCode::NOT_FOUND, "missing_reference")
            }
            ApiError::Db(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "error": { "code": code, "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/stages", get(list_stages))
        .route("/api/weeks", get(list_weeks).post(create_week))
        .route("/api/monthly-overview", get(monthly_overview))
        .route("/api/period-analysis", get(period_analysis))
        .route("/api/weekly-entries/bulk", post(bulk_weekly_entries))
        .route("/api/monthly-targets/bulk", post(bulk_monthly_targets))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(pool: PgPool, bind: &str) -> anyhow::Result<()> {
    let app = build_router(AppState { pool });
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(%bind, "kpi-scorecard API listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_stages(State(state): State<AppState>) -> Result<Json<Vec<StageNode>>, ApiError> {
    let stages = db::fetch_stage_tree(&state.pool).await?;
    Ok(Json(stages))
}

#[derive(Debug, Deserialize)]
struct WeeksParams {
    year: Option<i32>,
    month: Option<u32>,
}

async fn list_weeks(
    State(state): State<AppState>,
    Query(params): Query<WeeksParams>,
) -> Result<Json<Vec<Week>>, ApiError> {
    let weeks = db::fetch_weeks(&state.pool, params.year, params.month).await?;
    Ok(Json(weeks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWeekRequest {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

async fn create_week(
    State(state): State<AppState>,
    Json(request): Json<CreateWeekRequest>,
) -> Result<Json<Week>, ApiError> {
    if request.end_date < request.start_date {
        return Err(ApiError::InvalidDateRange);
    }
    let week = db::upsert_week(&state.pool, request.start_date, request.end_date).await?;
    Ok(Json(week))
}

#[derive(Debug, Deserialize)]
struct OverviewParams {
    month: String,
    stage_id: Option<Uuid>,
}

async fn monthly_overview(
    State(state): State<AppState>,
    Query(params): Query<OverviewParams>,
) -> Result<Json<MonthlyOverview>, ApiError> {
    if aggregate::parse_month_id(&params.month).is_none() {
        return Err(ApiError::InvalidMonth(params.month));
    }
    let overview = db::load_monthly_overview(&state.pool, &params.month, params.stage_id).await?;
    Ok(Json(overview))
}

#[derive(Debug, Deserialize)]
struct PeriodParams {
    start: NaiveDate,
    end: NaiveDate,
}

async fn period_analysis(
    Query(params): Query<PeriodParams>,
) -> Result<Json<PeriodAnalysis>, ApiError> {
    if params.end < params.start {
        return Err(ApiError::InvalidDateRange);
    }
    Ok(Json(period::analyze_period(params.start, params.end)))
}

#[derive(Debug, Deserialize)]
struct BulkEntriesRequest {
    entries: Vec<WeeklyDataEntry>,
}

async fn bulk_weekly_entries(
    State(state): State<AppState>,
    Json(request): Json<BulkEntriesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upserted = db::bulk_upsert_entries(&state.pool, &request.entries).await?;
    Ok(Json(json!({ "upserted": upserted })))
}

#[derive(Debug, Deserialize)]
struct BulkTargetsRequest {
    targets: Vec<MonthlyKpiTarget>,
}

async fn bulk_monthly_targets(
    State(state): State<AppState>,
    Json(request): Json<BulkTargetsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    for target in &request.targets {
        if aggregate::parse_month_id(&target.month_id).is_none() {
            return Err(ApiError::InvalidMonth(target.month_id.clone()));
        }
    }
    let upserted = db::bulk_upsert_targets(&state.pool, &request.targets).await?;
    Ok(Json(json!({ "upserted": upserted })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reference_errors_map_to_not_found() {
        let id = Uuid::new_v4();
        let err = ApiError::from(BulkUpsertError::MissingKpis(vec![id]));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_errors_map_to_unprocessable() {
        let err = ApiError::InvalidMonth("2024-5".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn missing_ids_are_named_in_the_message() {
        let id = Uuid::new_v4();
        let err = ApiError::MissingKpis(vec![id]);
        assert!(err.to_string().contains(&id.to_string()));

        let err = ApiError::MissingWeeks(vec!["Week 19 [05/06-05/12]".to_string()]);
        assert!(err.to_string().contains("Week 19 [05/06-05/12]"));
    }
}
