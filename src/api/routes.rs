//! Axum router and handlers for the compliance review API.
//!
//! `build_router` is the single entry point; callers attach middleware
//! afterwards, so tests can drive the bare router in-process. The review
//! endpoint is stateless: every call re-runs rule resolution and the
//! evaluator against the caller-supplied snapshot, and never touches any
//! monitored account's anchor.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use crate::api::types::{
    BreachResponse, ComplianceRequest, ComplianceResponse, ComplianceStatus, ErrorResponse,
    HealthResponse,
};
use crate::application::resolver::{ResolveError, RuleResolver};
use crate::application::supervisor::StatusView;
use crate::domain::evaluator::evaluate;
use crate::domain::rules::BreachLevel;
use crate::domain::snapshot::{AccountSnapshot, Platform, Position, Side};
use crate::ports::rule_store::RuleStorePort;

/// Shared state for the API handlers. Assembled once in `main`.
pub struct AppState {
    pub resolver: RuleResolver,
    pub store: Option<Arc<dyn RuleStorePort>>,
    pub status_view: StatusView,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/compliance/review", post(review))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let accounts = state.status_view.snapshot().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: "guardian",
            version: env!("CARGO_PKG_VERSION"),
            accounts,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /compliance/review
// ---------------------------------------------------------------------------

async fn review(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComplianceRequest>,
) -> Response {
    let resolved = match state
        .resolver
        .resolve(&request.firm, request.program_id.as_deref(), None)
        .await
    {
        Ok(resolved) => resolved,
        Err(ResolveError::RuleSourceUnavailable { .. }) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("No rules found for firm '{}'", request.firm),
                }),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse { error: e.to_string() }),
            )
                .into_response();
        }
    };

    let snapshot = build_snapshot(&request);
    let starting_balance = request.account.starting_balance.unwrap_or(0.0);
    let breaches = evaluate(&resolved.rules, &snapshot, starting_balance);

    let hard_breaches: Vec<BreachResponse> = breaches
        .iter()
        .filter(|b| b.level == BreachLevel::Hard)
        .map(BreachResponse::from)
        .collect();
    let warnings: Vec<BreachResponse> = breaches
        .iter()
        .filter(|b| b.level == BreachLevel::Warn)
        .map(BreachResponse::from)
        .collect();

    let status = if !hard_breaches.is_empty() {
        ComplianceStatus::NonCompliant
    } else if !warnings.is_empty() {
        ComplianceStatus::NeedsAttention
    } else {
        ComplianceStatus::Compliant
    };

    let soft_rule_insights = if request.include_soft_rules {
        match &state.store {
            Some(store) => store
                .soft_rules(&request.firm, request.program_id.as_deref())
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(firm = %request.firm, error = %e, "soft rule lookup failed");
                    Vec::new()
                }),
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    (
        StatusCode::OK,
        Json(ComplianceResponse {
            account_id: request.account_id,
            firm: request.firm,
            program_id: request.program_id,
            rules_source: resolved.source,
            status,
            hard_breaches,
            warnings,
            soft_rule_insights,
        }),
    )
        .into_response()
}

/// Build an evaluator snapshot from caller-supplied account data. Day-start
/// fields default to the current balance/equity, which makes the daily
/// drawdown zero when the caller omits them.
fn build_snapshot(request: &ComplianceRequest) -> AccountSnapshot {
    let account = &request.account;
    let now = Utc::now();

    let positions = account
        .positions
        .iter()
        .map(|p| Position {
            id: p.position_id.clone(),
            symbol: p.symbol.clone(),
            side: if p.side.eq_ignore_ascii_case("buy") {
                Side::Long
            } else {
                Side::Short
            },
            volume_lots: p.volume,
            open_price: p.entry_price,
            current_price: p.current_price,
            stop_loss: p.stop_loss,
            take_profit: p.take_profit,
            unrealized_pl: p.profit_loss,
            open_time: now,
            commission: 0.0,
            swap: 0.0,
            contract_size: p.contract_size,
        })
        .collect();

    AccountSnapshot {
        account_id: request.account_id.clone().unwrap_or_default(),
        platform: Platform::Mt5,
        currency: "USD".to_string(),
        balance: account.balance,
        equity: account.equity,
        margin_used: account.margin_used,
        margin_free: account.margin_available,
        realized_pl_today: 0.0,
        day_start_balance: account.day_start_balance.unwrap_or(account.balance),
        day_start_equity: account.day_start_equity.unwrap_or(account.equity),
        positions,
        account_leverage: None,
        observed_at_server: now.naive_utc(),
        observed_at_wall: now,
    }
}
