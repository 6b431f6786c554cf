use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::constants::{DEFAULT_SYNC_WINDOW_DAYS, GRAPH_TIMEOUT_SECS};
use crate::db::Database;
use crate::error::ApiError;
use crate::facebook::{normalize_account_id, FacebookAPI};
use crate::models::Platform;
use crate::oauth::{ExchangeResult, TokenExchanger};
use crate::rate_limit::{ExchangeRateLimiter, RateLimitDecision};
use crate::sync::sync_campaigns;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub exchanger: Arc<TokenExchanger>,
    pub limiter: Arc<ExchangeRateLimiter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/meta-exchange-token", post(exchange_token))
        .route("/api/meta-campaigns", get(get_campaigns))
        .route("/api/sync-meta-campaigns", post(sync_meta_campaigns))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), std::io::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Deserialize)]
struct ExchangeTokenRequest {
    #[serde(default)]
    code: String,
    #[serde(default)]
    redirect_uri: String,
    workspace_id: Option<String>,
}

/// POST /api/meta-exchange-token — OAuth code for access token, guarded by
/// the per-IP limiter. When exactly one active ad account comes back and a
/// workspace scope was supplied, the integration row is persisted in the
/// same request; otherwise the caller drives an account-selection step.
async fn exchange_token(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<ExchangeTokenRequest>,
) -> Result<Json<Value>, ApiError> {
    if let RateLimitDecision::Blocked { retry_after } =
        state.limiter.check(peer.ip(), Instant::now())
    {
        let secs = retry_after.as_secs();
        return Err(ApiError::RateLimited {
            retry_after_secs: secs,
            wait_minutes: secs.div_ceil(60),
        });
    }

    let result = state.exchanger.exchange(&req.code, &req.redirect_uri).await?;

    let mut body = json!({
        "access_token": result.grant.access_token,
        "token_type": result.grant.token_type,
        "expires_in": result.grant.expires_in,
    });

    if let Some(profile) = &result.profile {
        body["user"] = json!({ "id": profile.id, "name": profile.name });
    }

    match &result.selected {
        Some(account) => {
            body["account_info"] = json!({
                "id": account.id,
                "name": account.name,
                "currency": account.currency,
            });

            if let Some(link) =
                integration_link(&result, req.workspace_id.as_deref(), Utc::now())
            {
                let integration_id = state
                    .db
                    .upsert_integration(
                        &link.workspace_id,
                        Platform::Meta,
                        &result.grant.access_token,
                        &link.account_id,
                        &link.account_name,
                        link.expires_at,
                        None,
                    )
                    .await?;
                body["integration_id"] = json!(integration_id);
                info!(workspace_id = %link.workspace_id, integration_id, "integration linked");
            }
        }
        None => {
            // Multiple accounts: the client must present a selection step.
            body["accounts"] = json!(result.accounts);
        }
    }

    Ok(Json(body))
}

#[derive(Debug, PartialEq)]
struct IntegrationLink {
    workspace_id: String,
    account_id: String,
    account_name: String,
    expires_at: Option<chrono::DateTime<Utc>>,
}

/// Decides whether a completed exchange links an integration in the same
/// request: only when an account was auto-selected and the caller supplied
/// a workspace scope. The account id is stored in normalized form.
fn integration_link(
    result: &ExchangeResult,
    workspace_id: Option<&str>,
    now: chrono::DateTime<Utc>,
) -> Option<IntegrationLink> {
    let account = result.selected.as_ref()?;
    let workspace_id = workspace_id.filter(|w| !w.is_empty())?;

    Some(IntegrationLink {
        workspace_id: workspace_id.to_string(),
        account_id: normalize_account_id(&account.id),
        account_name: account.name.clone(),
        expires_at: result
            .grant
            .expires_in
            .map(|secs| now + ChronoDuration::seconds(secs)),
    })
}

#[derive(Deserialize)]
struct CampaignsQuery {
    workspace_id: Option<String>,
}

/// GET /api/meta-campaigns?workspace_id= — live campaign list for the
/// workspace's active Meta integration.
async fn get_campaigns(
    State(state): State<AppState>,
    Query(query): Query<CampaignsQuery>,
) -> Result<Json<Value>, ApiError> {
    let workspace_id = query
        .workspace_id
        .filter(|w| !w.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("workspace_id is required".to_string()))?;

    let integration = state
        .db
        .get_active_integration(&workspace_id, Platform::Meta)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No Meta integration found for workspace {}", workspace_id))
        })?;

    let api = FacebookAPI::with_timeout(
        integration.access_token.clone(),
        Duration::from_secs(GRAPH_TIMEOUT_SECS),
    );
    let campaigns = api.get_campaigns(&integration.account_id).await?;
    let last_sync = state.db.last_sync(integration.id).await?;
    let total = campaigns.len();

    Ok(Json(json!({
        "success": true,
        "campaigns": campaigns,
        "account_id": integration.account_id,
        "account_name": integration.account_name,
        "total_campaigns": total,
        "last_sync": last_sync.map(|t| t.to_rfc3339()),
    })))
}

#[derive(Deserialize)]
struct SyncRequest {
    #[serde(default)]
    workspace_id: String,
    since: Option<chrono::NaiveDate>,
    until: Option<chrono::NaiveDate>,
}

/// POST /api/sync-meta-campaigns — one-shot reconcile of campaigns and
/// per-day metrics into storage. Idempotent: re-running with the same
/// inputs leaves the same rows.
async fn sync_meta_campaigns(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.workspace_id.is_empty() {
        return Err(ApiError::InvalidRequest("workspace_id is required".to_string()));
    }

    let until = req.until.unwrap_or_else(|| Utc::now().date_naive());
    let since = req
        .since
        .unwrap_or_else(|| until - ChronoDuration::days(DEFAULT_SYNC_WINDOW_DAYS));

    let integration = state
        .db
        .get_active_integration(&req.workspace_id, Platform::Meta)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No Meta integration found for workspace {}",
                req.workspace_id
            ))
        })?;

    let api = FacebookAPI::with_timeout(
        integration.access_token.clone(),
        Duration::from_secs(GRAPH_TIMEOUT_SECS),
    );
    let summary = sync_campaigns(&api, state.db.as_ref(), &integration, since, until).await?;

    Ok(Json(json!({
        "success": true,
        "summary": {
            "total": summary.total,
            "created": summary.created,
            "updated": summary.updated,
            "metrics_synced": summary.metrics_synced,
            "errors": summary.errors,
        },
        "details": summary.details,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdAccountInfo, TokenGrant};

    fn exchange_result(selected: Option<AdAccountInfo>, expires_in: Option<i64>) -> ExchangeResult {
        ExchangeResult {
            grant: TokenGrant {
                access_token: "EAAB-token".to_string(),
                token_type: "bearer".to_string(),
                expires_in,
            },
            profile: None,
            accounts: selected.iter().cloned().collect(),
            selected,
        }
    }

    fn account() -> AdAccountInfo {
        AdAccountInfo {
            id: "act_4242".to_string(),
            name: "Acme Ads".to_string(),
            account_status: 1,
            currency: Some("USD".to_string()),
        }
    }

    #[test]
    fn auto_selected_account_with_workspace_links_integration() {
        let now = Utc::now();
        let result = exchange_result(Some(account()), Some(3600));

        let link = integration_link(&result, Some("ws-1"), now).unwrap();
        assert_eq!(link.workspace_id, "ws-1");
        assert_eq!(link.account_id, "act_4242");
        assert_eq!(link.account_name, "Acme Ads");
        assert_eq!(link.expires_at, Some(now + ChronoDuration::seconds(3600)));
    }

    #[test]
    fn link_normalizes_unprefixed_account_ids() {
        let mut acct = account();
        acct.id = "4242".to_string();
        let result = exchange_result(Some(acct), None);

        let link = integration_link(&result, Some("ws-1"), Utc::now()).unwrap();
        assert_eq!(link.account_id, "act_4242");
        assert_eq!(link.expires_at, None);
    }

    #[test]
    fn no_workspace_scope_skips_linking() {
        let result = exchange_result(Some(account()), Some(3600));
        assert!(integration_link(&result, None, Utc::now()).is_none());
        assert!(integration_link(&result, Some(""), Utc::now()).is_none());
    }

    #[test]
    fn multiple_accounts_skip_linking() {
        let result = exchange_result(None, Some(3600));
        assert!(integration_link(&result, Some("ws-1"), Utc::now()).is_none());
    }
}
