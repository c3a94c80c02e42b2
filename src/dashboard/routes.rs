//! Dashboard API route handlers.
//!
//! All endpoints return JSON. The engine is shared with the keeper loop via
//! `Arc<DashboardState>`; handlers only take read locks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::keeper::KeeperReport;
use crate::engine::{Engine, EngineStatus, TimeframeStatus};
use crate::market::round::{Round, RoundPhase};
use crate::types::{Amount, Epoch, TimeframeId, TokenId};

/// Keeper reports kept for `/api/keeper`.
const KEEPER_LOG_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub engine: Arc<RwLock<Engine>>,
    pub keeper_log: RwLock<Vec<KeeperReport>>,
}

impl DashboardState {
    pub fn new(engine: Arc<RwLock<Engine>>) -> Self {
        Self {
            engine,
            keeper_log: RwLock::new(Vec::new()),
        }
    }

    /// Append a keeper report, dropping the oldest past the limit.
    pub async fn record_report(&self, report: KeeperReport) {
        let mut log = self.keeper_log.write().await;
        log.push(report);
        let excess = log.len().saturating_sub(KEEPER_LOG_LIMIT);
        log.drain(..excess);
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    pub epoch: Epoch,
    pub phase: RoundPhase,
    pub start_block: u64,
    pub lock_block: u64,
    pub close_block: u64,
    pub lock_price: Option<u128>,
    pub close_price: Option<u128>,
    pub total_bull_amount: Amount,
    pub total_bear_amount: Amount,
    pub outcome: Option<String>,
}

impl From<&Round> for RoundView {
    fn from(r: &Round) -> Self {
        Self {
            epoch: r.epoch,
            phase: r.phase(),
            start_block: r.start_block,
            lock_block: r.lock_block,
            close_block: r.close_block,
            lock_price: r.lock_price,
            close_price: r.close_price,
            total_bull_amount: r.total_bull_amount,
            total_bear_amount: r.total_bear_amount,
            outcome: r.outcome().map(|o| format!("{o:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultResponse {
    pub name: String,
    pub symbol: String,
    pub underlying_balance: Amount,
    pub reserved: Amount,
    pub total_share_supply: Amount,
    pub position_tokens: usize,
    pub next_token_id: TokenId,
    pub dust_floor: Amount,
    pub invariants_ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct RoundsQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    let engine = state.engine.read().await;
    Json(engine.status())
}

/// GET /api/timeframes
pub async fn get_timeframes(State(state): State<AppState>) -> Json<Vec<TimeframeStatus>> {
    let engine = state.engine.read().await;
    Json(engine.status().timeframes)
}

/// GET /api/rounds/:timeframe_id?limit=N (newest first, default 20)
pub async fn get_rounds(
    State(state): State<AppState>,
    Path(timeframe_id): Path<TimeframeId>,
    Query(query): Query<RoundsQuery>,
) -> Result<Json<Vec<RoundView>>, (StatusCode, Json<ErrorResponse>)> {
    let engine = state.engine.read().await;
    if let Err(e) = engine.market.timeframe(timeframe_id) {
        return Err((StatusCode::NOT_FOUND, Json(ErrorResponse { error: e.to_string() })));
    }
    let limit = query.limit.unwrap_or(20).min(500);
    let rounds = engine
        .market
        .recent_rounds(timeframe_id, limit)
        .into_iter()
        .map(RoundView::from)
        .collect();
    Ok(Json(rounds))
}

/// GET /api/executable
pub async fn get_executable(State(state): State<AppState>) -> Json<Vec<TimeframeId>> {
    let engine = state.engine.read().await;
    Json(engine.executable_timeframes())
}

/// GET /api/vault
pub async fn get_vault(State(state): State<AppState>) -> Json<VaultResponse> {
    let engine = state.engine.read().await;
    let vault = &engine.vault;
    Json(VaultResponse {
        name: vault.name.clone(),
        symbol: vault.symbol.clone(),
        underlying_balance: vault.underlying_balance(&engine.token),
        reserved: vault.total_reserved(),
        total_share_supply: vault.total_share_supply(),
        position_tokens: vault.total_supply(),
        next_token_id: vault.next_token_id(),
        dust_floor: vault.dust_floor(),
        invariants_ok: vault.check_invariants().is_ok() && vault.check_solvency(&engine.token).is_ok(),
    })
}

/// GET /api/keeper
pub async fn get_keeper_log(State(state): State<AppState>) -> Json<Vec<KeeperReport>> {
    let log = state.keeper_log.read().await;
    Json(log.clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
