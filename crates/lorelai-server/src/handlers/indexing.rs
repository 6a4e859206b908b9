use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use lorelai_core::indexing::RunWithItems;
use lorelai_core::model::{IndexedItem, ItemDetails, Provider};
use serde::Deserialize;
use std::sync::Arc;

use crate::errors::ApiError;
use crate::security::tenant;
use crate::state::AppState;

const DEFAULT_RUN_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub source: Option<String>,
    pub limit: Option<u32>,
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RunsQuery>,
) -> Result<Json<Vec<RunWithItems>>, ApiError> {
    let tenant = tenant(&state, &headers)?;
    let source = query
        .source
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Provider::parse)
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, 500);
    let runs = state
        .indexing
        .list_runs_with_items(tenant.org_id, source, limit)?;
    Ok(Json(runs))
}

pub async fn run_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(run_id): Path<i64>,
) -> Result<Json<Vec<IndexedItem>>, ApiError> {
    let tenant = tenant(&state, &headers)?;
    Ok(Json(state.indexing.list_items(tenant.org_id, run_id)?))
}

pub async fn item_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Result<Json<ItemDetails>, ApiError> {
    let tenant = tenant(&state, &headers)?;
    Ok(Json(state.indexing.item_details(tenant.org_id, item_id)?))
}
