use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::routes::AppState;
use crate::db;
use crate::error::{EngineError, Result};
use crate::export;
use crate::models::{
    CandidateRecord, EntityMatch, Flag, InvoiceMatchOutcome, InvoiceMetadata, MatchStatus,
    ThresholdConfig,
};
use crate::service::InvoiceDiscrepancies;

/// 请求体: 匹配预览
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub invoice: InvoiceMetadata,
    #[serde(default)]
    pub candidates: Vec<CandidateRecord>,
    #[serde(default)]
    pub thresholds: Option<ThresholdConfig>,
}

/// 请求体: 发票ID列表
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub invoice_ids: Vec<i64>,
    /// 只用规则评分，不调用 AI
    #[serde(default)]
    pub skip_ai: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: MatchStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub resolved_by: String,
}

/// 统一响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn ok<T: Serialize>(message: String, data: T) -> Response {
    let response = ApiResponse {
        success: true,
        message,
        data: Some(data),
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn error_response(e: EngineError) -> Response {
    let status = match &e {
        EngineError::InvoiceNotFound(_)
        | EngineError::MatchNotFound(_)
        | EngineError::FlagNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidConfig(_) | EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Request failed: {}", e);
    }

    let response: ApiResponse<()> = ApiResponse {
        success: false,
        message: format!("Error: {}", e),
        data: None,
    };
    (status, Json(response)).into_response()
}

fn csv_response(written: Result<Vec<u8>>) -> Response {
    match written {
        Ok(buf) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            buf,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 匹配预览：对请求中给出的候选打分，不读写数据库
pub async fn preview_match(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> Response {
    let thresholds = req
        .thresholds
        .unwrap_or_else(|| *state.matcher.thresholds());
    if let Err(e) = thresholds.validate() {
        return error_response(e);
    }

    let result: EntityMatch = state
        .matcher
        .preview(&req.invoice, &req.candidates, &thresholds)
        .await;
    ok(result.recommendation.clone(), result)
}

async fn run_batch(state: &AppState, req: &BatchRequest) -> Result<Vec<InvoiceMatchOutcome>> {
    if req.skip_ai {
        state.matcher.rescore(&req.invoice_ids).await
    } else {
        state.matcher.batch_match(&req.invoice_ids).await
    }
}

/// 批量匹配并写入匹配结果
pub async fn batch_match(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Response {
    let outcomes: Vec<InvoiceMatchOutcome> = match run_batch(&state, &req).await {
        Ok(outcomes) => outcomes,
        Err(e) => return error_response(e),
    };

    match db::insert_match_results(&state.pool, &outcomes).await {
        Ok(rows) => ok(
            format!(
                "Successfully matched {} invoices, {} results saved",
                outcomes.len(),
                rows
            ),
            outcomes,
        ),
        Err(e) => error_response(e),
    }
}

/// 批量异常检测并写入标记
pub async fn check_discrepancies(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Response {
    let results: Vec<InvoiceDiscrepancies> = match state.checker.check_batch(&req.invoice_ids).await
    {
        Ok(results) => results,
        Err(e) => return error_response(e),
    };

    let flags: Vec<_> = results
        .iter()
        .flat_map(|r| r.report.flags.iter().cloned())
        .collect();

    match db::insert_flags(&state.pool, &flags).await {
        Ok(inserted) => ok(
            format!(
                "Checked {} invoices, {} flags raised, {} new",
                results.len(),
                flags.len(),
                inserted
            ),
            results,
        ),
        Err(e) => error_response(e),
    }
}

/// 批量匹配并导出 CSV，不写数据库
pub async fn export_matches(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Response {
    let outcomes = match run_batch(&state, &req).await {
        Ok(outcomes) => outcomes,
        Err(e) => return error_response(e),
    };
    tracing::info!("Exporting match results for {} invoices", outcomes.len());

    let mut buf = Vec::new();
    csv_response(export::export_matches_csv(&outcomes, &mut buf).map(|_| buf))
}

/// 批量异常检测并导出标记 CSV，不写数据库
pub async fn export_discrepancies(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Response {
    let flags: Vec<Flag> = match state.checker.check_batch(&req.invoice_ids).await {
        Ok(results) => results.into_iter().flat_map(|r| r.report.flags).collect(),
        Err(e) => return error_response(e),
    };

    let mut buf = Vec::new();
    csv_response(export::export_flags_csv(&flags, &mut buf).map(|_| buf))
}

/// 人工确认或驳回匹配结果
pub async fn update_match_status(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    Json(req): Json<StatusUpdateRequest>,
) -> Response {
    match db::update_match_status(&state.pool, match_id, req.status).await {
        Ok(status) => ok(format!("Match {} is now {}", match_id, status), status),
        Err(e) => error_response(e),
    }
}

/// 标记异常已处理
pub async fn resolve_flag(
    State(state): State<AppState>,
    Path(flag_id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> Response {
    if req.resolved_by.trim().is_empty() {
        return error_response(EngineError::InvalidRequest(
            "resolvedBy must not be empty".to_string(),
        ));
    }

    match db::resolve_flag(&state.pool, flag_id, req.resolved_by.trim()).await {
        Ok((flag, true)) => ok(format!("Flag {} resolved", flag_id), flag),
        Ok((flag, false)) => ok(format!("Flag {} was already resolved", flag_id), flag),
        Err(e) => error_response(e),
    }
}
