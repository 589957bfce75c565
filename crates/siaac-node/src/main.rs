//! siaac-node — operator binary wiring the authorization service,
//! anonymity pool, and aggregator behind a thin HTTP surface.
//!
//! Deliberately thin: no auth middleware, no rate limiting beyond what
//! the authorization and anonymity pool layers already enforce, and no
//! chain-specific settlement logic (it runs the aggregator against
//! `NullExecutor` until a real `Executor` is wired in by a
//! deployment-specific build).
//!
//! data stored in ~/.siaac-node/

mod config;
mod error;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use siaac_aggregator::{
    Aggregator, BatchCommitment, NullExecutor, NullQuoteSolver, QuoteRequest, QuoteSolver, SettlementRecord,
    SettlementStatus, SolverQuote,
};
use siaac_auth::AuthorizationService;
use siaac_hash::HashDigest;
use siaac_intent::{Nullifier, ShieldedIntent};
use siaac_keypool::SignedAuthorization;
use siaac_pool::{AnonymityPool, DepositNote};
use siaac_wots::WOTSParams;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use config::{Args, NodeConfig};

struct AppState {
    auth: Arc<AuthorizationService>,
    pool: Mutex<AnonymityPool>,
    aggregator: Arc<Aggregator<NullExecutor>>,
    quote_solver: Arc<dyn QuoteSolver>,
    db: sled::Db,
    data_dir: PathBuf,
    started_at: Instant,
}

// === request/response types ===

fn hex32(bytes: &HashDigest) -> String {
    hex::encode(bytes)
}

fn settlement_status_label(status: SettlementStatus) -> &'static str {
    match status {
        SettlementStatus::Pending => "pending",
        SettlementStatus::Submitted => "submitted",
        SettlementStatus::Confirmed => "confirmed",
        SettlementStatus::Finalized => "finalized",
        SettlementStatus::Failed => "failed",
    }
}

/// error body shared by every fallible endpoint: `code` is a stable,
/// machine-readable discriminant (§7: "replay violations are surfaced
/// with a stable code"), `error` is the human-readable `Display` text.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, code: &'static str, message: impl std::fmt::Display) -> ApiError {
    (status, Json(ErrorBody { error: message.to_string(), code }))
}

fn parse_hex32(s: &str) -> Result<HashDigest, ApiError> {
    let decoded =
        hex::decode(s).map_err(|e| api_error(StatusCode::BAD_REQUEST, "BAD_ENCODING", format!("bad hex: {e}")))?;
    decoded
        .try_into()
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "BAD_ENCODING", "expected 32 bytes"))
}

#[derive(Deserialize)]
struct RegisterPoolRequest {
    merkle_root_hex: String,
    params: WOTSParams,
    total_keys: u32,
    owner: Option<String>,
}

#[derive(Serialize)]
struct RegisterPoolResponse {
    ok: bool,
    merkle_root_hex: String,
}

#[derive(Serialize)]
struct PoolStatusResponse {
    merkle_root_hex: String,
    total_keys: u32,
    used_keys: u32,
}

#[derive(Deserialize)]
struct SubmitIntentRequest {
    shielded: ShieldedIntent,
    sig: SignedAuthorization,
}

#[derive(Serialize)]
struct SubmitIntentResponse {
    intent_id: String,
    batch_position: usize,
    chain: String,
}

#[derive(Serialize)]
struct BatchStatusResponse {
    batch: BatchCommitment,
    settlement: SettlementRecord,
}

#[derive(Deserialize)]
struct SettlementUpdateRequest {
    status: SettlementStatus,
    block_number: Option<u64>,
    gas_used: Option<u64>,
}

#[derive(Deserialize)]
struct DepositRequest {
    secret_hex: String,
    amount: u128,
    token: String,
    chain: String,
}

#[derive(Serialize)]
struct DepositResponse {
    leaf_index: usize,
    root_hex: String,
    commitment_hex: String,
}

#[derive(Deserialize)]
struct WithdrawRequest {
    nullifier_hex: String,
    claimed_root_hex: String,
    commitment_hex: String,
    proof: siaac_merkle::MerkleProof,
}

#[derive(Serialize)]
struct WithdrawResponse {
    ok: bool,
}

#[derive(Serialize)]
struct AnonymityPoolStatusResponse {
    depth: usize,
    num_deposits: usize,
    anonymity_set_size: usize,
    current_root_hex: String,
}

#[derive(Serialize)]
struct NodeInfoResponse {
    version: String,
    uptime_secs: u64,
    data_dir: String,
}

// === handlers ===

async fn node_info(State(state): State<Arc<AppState>>) -> Json<NodeInfoResponse> {
    Json(NodeInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        data_dir: state.data_dir.display().to_string(),
    })
}

async fn health() -> &'static str {
    "ok"
}

async fn register_pool(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterPoolRequest>,
) -> Result<Json<RegisterPoolResponse>, ApiError> {
    let start = Instant::now();
    counter!("siaac_requests_total", "endpoint" => "register_pool").increment(1);

    let merkle_root = parse_hex32(&req.merkle_root_hex)?;
    state
        .auth
        .register_pool(merkle_root, req.params, req.total_keys, req.owner)
        .await
        .map_err(|e| {
            counter!("siaac_errors_total", "endpoint" => "register_pool").increment(1);
            api_error(StatusCode::CONFLICT, e.code(), e)
        })?;

    gauge!("siaac_pools_registered").increment(1.0);
    histogram!("siaac_request_duration_seconds", "endpoint" => "register_pool").record(start.elapsed().as_secs_f64());
    info!(root = %req.merkle_root_hex, "pool registered");

    Ok(Json(RegisterPoolResponse { ok: true, merkle_root_hex: req.merkle_root_hex }))
}

async fn pool_status(
    State(state): State<Arc<AppState>>,
    Path(root_hex): Path<String>,
) -> Result<Json<PoolStatusResponse>, ApiError> {
    let root = parse_hex32(&root_hex)?;
    let (total_keys, used_keys) = state
        .auth
        .pool_info(&root)
        .await
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.code(), e))?;

    Ok(Json(PoolStatusResponse { merkle_root_hex: root_hex, total_keys, used_keys }))
}

/// maps a submission failure onto an HTTP status: replay violations
/// and bad crypto are the caller's/an
/// adversary's fault (`409`/`422`), unknown pools and expiry are plain
/// input errors (`404`/`410`), everything else is a `500`.
fn submit_error_status(err: &siaac_aggregator::Error) -> StatusCode {
    use siaac_aggregator::Error as AggError;
    match err {
        AggError::Expired { .. } => StatusCode::GONE,
        AggError::Auth(auth_err) => match auth_err {
            siaac_auth::Error::UnknownPool(_) => StatusCode::NOT_FOUND,
            siaac_auth::Error::KeyReused { .. } => StatusCode::CONFLICT,
            siaac_auth::Error::HashMismatch
            | siaac_auth::Error::IndexOutOfRange { .. }
            | siaac_auth::Error::BadSignature
            | siaac_auth::Error::BadInclusionProof => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn submit_intent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitIntentRequest>,
) -> Result<Json<SubmitIntentResponse>, ApiError> {
    let start = Instant::now();
    counter!("siaac_requests_total", "endpoint" => "submit_intent").increment(1);

    let outcome = state.aggregator.submit_intent(req.shielded, req.sig).await.map_err(|e| {
        let status = submit_error_status(&e);
        if status == StatusCode::CONFLICT {
            counter!("siaac_critical_events_total", "kind" => "key_reused").increment(1);
            error!(error = %e, code = e.code(), "CRITICAL: key reuse attempt rejected");
        } else {
            counter!("siaac_errors_total", "endpoint" => "submit_intent").increment(1);
            warn!(error = %e, code = e.code(), "intent submission rejected");
        }
        api_error(status, e.code(), e)
    })?;

    counter!("siaac_intents_submitted_total").increment(1);
    histogram!("siaac_request_duration_seconds", "endpoint" => "submit_intent").record(start.elapsed().as_secs_f64());

    Ok(Json(SubmitIntentResponse {
        intent_id: outcome.intent_id,
        batch_position: outcome.batch_position,
        chain: outcome.chain,
    }))
}

async fn batch_status(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<uuid::Uuid>,
) -> Result<Json<BatchStatusResponse>, ApiError> {
    let batch = state
        .aggregator
        .batch_commitment(batch_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "UNKNOWN_BATCH", "unknown batch"))?;
    let settlement = state
        .aggregator
        .settlement_record(batch_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "UNKNOWN_BATCH", "unknown batch"))?;

    Ok(Json(BatchStatusResponse { batch, settlement }))
}

async fn settlement_update(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<uuid::Uuid>,
    Json(req): Json<SettlementUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .aggregator
        .on_settlement_update(batch_id, req.status, req.block_number, req.gas_used)
        .await
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.code(), e))?;

    counter!("siaac_settlement_updates_total", "status" => settlement_status_label(req.status)).increment(1);
    Ok(StatusCode::NO_CONTENT)
}

async fn anonymity_deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    let secret = parse_hex32(&req.secret_hex)?;
    let note = DepositNote { secret, amount: req.amount, token: &req.token, chain: &req.chain };
    let commitment = siaac_pool::commitment_for(&note);

    let mut pool = state.pool.lock().await;
    let (leaf_index, root) = pool
        .deposit(&note)
        .map_err(|e| api_error(StatusCode::INSUFFICIENT_STORAGE, e.code(), e))?;

    counter!("siaac_deposits_total").increment(1);
    gauge!("siaac_anonymity_set_size").set(pool.anonymity_set_size() as f64);

    Ok(Json(DepositResponse { leaf_index, root_hex: hex32(&root), commitment_hex: hex32(&commitment) }))
}

async fn anonymity_withdraw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let nullifier = Nullifier(parse_hex32(&req.nullifier_hex)?);
    let claimed_root = parse_hex32(&req.claimed_root_hex)?;
    let commitment = parse_hex32(&req.commitment_hex)?;

    let mut pool = state.pool.lock().await;
    pool.withdraw(nullifier, claimed_root, &req.proof, &commitment).map_err(|e| {
        if matches!(e, siaac_pool::Error::NullifierAlreadyUsed(_)) {
            counter!("siaac_critical_events_total", "kind" => "nullifier_reused").increment(1);
            error!(nullifier = %nullifier, code = e.code(), "CRITICAL: nullifier reuse attempt rejected");
        }
        api_error(StatusCode::CONFLICT, e.code(), e)
    })?;

    counter!("siaac_withdrawals_total").increment(1);
    gauge!("siaac_anonymity_set_size").set(pool.anonymity_set_size() as f64);

    Ok(Json(WithdrawResponse { ok: true }))
}

/// advisory pricing only, per the quote-solver interface (spec §6.3): the
/// aggregator never consults this endpoint's result and authorization
/// never bypasses it. Callers shop a quote before building and signing
/// their own intent, entirely outside the authorize/enqueue/flush path.
async fn get_quotes(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<Vec<SolverQuote>>, ApiError> {
    counter!("siaac_requests_total", "endpoint" => "get_quotes").increment(1);
    let quotes = state
        .quote_solver
        .get_quotes(&req)
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.code(), e))?;
    Ok(Json(quotes))
}

async fn anonymity_status(State(state): State<Arc<AppState>>) -> Json<AnonymityPoolStatusResponse> {
    let pool = state.pool.lock().await;
    Json(AnonymityPoolStatusResponse {
        depth: pool.depth(),
        num_deposits: pool.num_deposits(),
        anonymity_set_size: pool.anonymity_set_size(),
        current_root_hex: hex32(&pool.current_root()),
    })
}

/// snapshot every component's persisted-state slice to disk: the pool
/// registry + anonymity pool as the JSON blob, the aggregator's
/// queues/settlement records into the embedded sled tree. Called on
/// shutdown and available for an operator-triggered checkpoint.
async fn checkpoint(state: &AppState) -> Result<(), error::NodeError> {
    let auth_state = state.auth.export_state().await;
    let pool_state = state.pool.lock().await.export_state();
    let node_state = state::new_state(auth_state, pool_state);
    state::write_state_atomic(&state::state_path(&state.data_dir), &node_state)?;

    let snapshot = state.aggregator.snapshot().await;
    state::save_aggregator_snapshot(&state.db, &snapshot)?;

    info!("checkpoint written");
    Ok(())
}

fn exit_with(err: error::NodeError) -> ! {
    error!("{err}");
    std::process::exit(err.exit_code());
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("siaac_node=info".parse().expect("valid directive")),
        )
        .init();

    let args = Args::parse();

    let node_config = match NodeConfig::load(&args) {
        Ok(c) => c,
        Err(e) => exit_with(e),
    };

    let metrics_port = args.metrics_port.unwrap_or(args.port + 1000);
    let metrics_addr: std::net::SocketAddr = format!("{}:{}", args.bind, metrics_port)
        .parse()
        .expect("invalid metrics address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("failed to install prometheus metrics exporter");

    let data_dir = args.data_dir.clone().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(format!("{home}/.siaac-node"))
    });
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        exit_with(error::NodeError::Io(e));
    }

    let db = match sled::open(data_dir.join("queues")) {
        Ok(db) => db,
        Err(e) => exit_with(error::NodeError::Sled(e)),
    };

    let persisted = match state::read_state(&state::state_path(&data_dir)) {
        Ok(p) => p,
        Err(e) => exit_with(e),
    };

    let (auth, pool) = match persisted {
        Some(p) => {
            let auth = match AuthorizationService::from_state(p.auth) {
                Ok(a) => a,
                Err(e) => exit_with(error::NodeError::StateCorrupt(e.to_string())),
            };
            let pool = match AnonymityPool::from_state(p.anonymity_pool) {
                Ok(p) => p,
                Err(e) => exit_with(error::NodeError::StateCorrupt(e.to_string())),
            };
            info!("restored persisted state");
            (auth, pool)
        }
        None => (AuthorizationService::new(), AnonymityPool::new(node_config.anonymity_pool)),
    };

    let auth = Arc::new(auth);
    let aggregator = Arc::new(Aggregator::new(
        node_config.aggregator,
        auth.clone(),
        Arc::new(NullExecutor),
        node_config.default_chain.clone(),
    ));

    match state::load_aggregator_snapshot(&db) {
        Ok(Some(snapshot)) => {
            aggregator.restore(snapshot).await;
            info!("restored aggregator queues/batches from sled");
        }
        Ok(None) => {}
        Err(e) => exit_with(e),
    }

    let _flush_loop = aggregator.clone().spawn_flush_loop();

    info!("siaac-node v{}", env!("CARGO_PKG_VERSION"));
    info!("  data: {}", data_dir.display());
    info!("  bind: {}:{}", args.bind, args.port);
    info!("  metrics: {}:{}", args.bind, metrics_port);
    info!("  default chain: {}", node_config.default_chain);

    let app_state = Arc::new(AppState {
        auth,
        pool: Mutex::new(pool),
        aggregator,
        quote_solver: Arc::new(NullQuoteSolver),
        db,
        data_dir,
        started_at: Instant::now(),
    });

    let app = Router::new()
        .route("/", get(node_info))
        .route("/health", get(health))
        .route("/pools", post(register_pool))
        .route("/pools/:root", get(pool_status))
        .route("/intents", post(submit_intent))
        .route("/quotes", post(get_quotes))
        .route("/batches/:batch_id", get(batch_status))
        .route("/settlement/:batch_id", post(settlement_update))
        .route("/anonymity/deposit", post(anonymity_deposit))
        .route("/anonymity/withdraw", post(anonymity_withdraw))
        .route("/anonymity/status", get(anonymity_status))
        .layer(CorsLayer::permissive())
        .with_state(app_state.clone());

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => exit_with(error::NodeError::Io(e)),
    };
    info!("listening on {}", addr);

    let shutdown_state = app_state.clone();
    let shutdown_signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        if let Err(e) = checkpoint(&shutdown_state).await {
            error!("checkpoint on shutdown failed: {e}");
        }
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await {
        error!("server error: {e}");
        std::process::exit(1);
    }
}
