use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Html;
use axum::Json;
use lorelai_core::model::Provider;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::errors::ApiError;
use crate::security::tenant;
use crate::state::AppState;
use crate::views::{self, Connection, PanelView};

const HISTORY_RUNS: u32 = 50;

pub async fn panels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    let tenant = tenant(&state, &headers)?;
    let org_wide = state.vault.connected_providers(tenant.org_id)?;

    let mut panels = Vec::with_capacity(Provider::ALL.len());
    for provider in Provider::ALL {
        let connection = if state
            .vault
            .get(tenant.org_id, tenant.user_id, provider)?
            .is_some()
        {
            Connection::Connected
        } else if org_wide.contains(&provider) {
            Connection::ConnectedByTeammate
        } else {
            Connection::NotConnected
        };
        panels.push(PanelView {
            provider,
            connection,
        });
    }
    Ok(Html(views::integrations_page(&panels)))
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(provider): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let tenant = tenant(&state, &headers)?;
    let provider = Provider::parse(&provider)?;
    let outcome = state
        .revocation
        .revoke(tenant.org_id, tenant.user_id, provider)
        .await?;
    tracing::info!(
        event = "integration_revoked",
        org_id = tenant.org_id,
        provider = %outcome.provider
    );
    Ok(Json(json!({
        "status": "success",
        "message": outcome.message,
    })))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(provider): Path<String>,
) -> Result<Html<String>, ApiError> {
    let tenant = tenant(&state, &headers)?;
    let provider = Provider::parse(&provider)?;
    let runs = state
        .indexing
        .list_runs_with_items(tenant.org_id, Some(provider), HISTORY_RUNS)?;
    Ok(Html(views::history_page(provider, &runs)))
}
