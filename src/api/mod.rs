//! # Observer API
//!
//! HTTP/WebSocket view on the ledger and the deposit progress, plus the entry
//! point for starting a deposit.

use crate::deposit::DepositError;
use crate::state::AppState;
use crate::storage::LedgerFilter;
use crate::utils::constants::MAX_EVENTS_PER_PAGE;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use num_bigint::BigUint;
use serde::Deserialize;
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/progress", get(get_progress))
        .route("/api/v1/events", get(get_events))
        .route("/api/v1/pending", get(get_pending))
        .route("/api/v1/deposit", post(begin_deposit))
        .route("/ws/progress", get(progress_socket_handler))
        .layer(cors)
        .with_state(state)
}

/// Serves the observer API on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> Result<(), anyhow::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Observer API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    log::info!("Observer API stopped");
    Ok(())
}

async fn get_progress(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.progress.snapshot())
}

#[derive(Deserialize)]
struct EventQuery {
    token: Option<String>,
    block: Option<u64>,
    #[serde(default)]
    unresolved: bool,
    limit: Option<usize>,
}

async fn get_events(
    State(state): State<AppState>,
    Query(params): Query<EventQuery>,
) -> impl IntoResponse {
    let filter = LedgerFilter {
        token: params.token,
        block_number: params.block,
        unresolved_only: params.unresolved,
        limit: Some(
            params
                .limit
                .unwrap_or(MAX_EVENTS_PER_PAGE)
                .min(MAX_EVENTS_PER_PAGE),
        ),
    };
    match state.storage.find_token_events(&filter) {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            log::error!("Ledger query failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage error").into_response()
        }
    }
}

async fn get_pending(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tracker.get_pending_transactions())
}

#[derive(Deserialize)]
struct DepositRequest {
    /// Base-10 amount in the token's smallest unit
    amount: String,
}

async fn begin_deposit(
    State(state): State<AppState>,
    Json(payload): Json<DepositRequest>,
) -> impl IntoResponse {
    let Some(amount) = BigUint::parse_bytes(payload.amount.trim().as_bytes(), 10) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Invalid amount: {}", payload.amount),
        )
            .into_response();
    };

    match state.deposits.begin(amount).await {
        Ok(attempt) => Json(serde_json::json!({
            "status": "started",
            "attempt": attempt,
        }))
        .into_response(),
        Err(e @ DepositError::ZeroAmount) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        Err(e @ DepositError::Submission(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn progress_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| progress_socket(socket, state))
}

/// Pushes the progress state on connect and after every change.
async fn progress_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.progress.subscribe();
    loop {
        let json = match serde_json::to_string(&*rx.borrow_and_update()) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Progress serialization failed: {}", e);
                break;
            }
        };
        if let Err(e) = socket.send(Message::Text(json)).await {
            log::debug!("WS send error: {}", e);
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, MockToken};
    use crate::chain::{ChainError, EventKind, TokenEventRecord, TxKind};
    use crate::deposit::progress::{DepositPhase, ProgressHandle};
    use crate::deposit::tracker::TransactionTracker;
    use crate::deposit::{spawn_deposit_orchestrator, DepositOrchestrator, DepositSettings};
    use crate::state::AppSettings;
    use crate::storage::temp_storage;
    use axum::body::Body;
    use axum::http::Request;
    use futures::StreamExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApi {
        state: AppState,
        wrapper: Arc<MockToken>,
    }

    fn test_api() -> TestApi {
        let storage = temp_storage();
        let chain = MockChain::new();
        chain.add_token("GNT", "0xgnt");
        let wrapper = chain.add_token("W-GNT", "0xwgnt");

        let (tracker, outcomes) = TransactionTracker::new(storage.clone());
        let progress = ProgressHandle::new();
        let orchestrator = DepositOrchestrator::new(
            chain,
            tracker.clone(),
            progress.clone(),
            storage.clone(),
            DepositSettings::from(&AppSettings::default()),
        );
        let (deposits, _task) = spawn_deposit_orchestrator(orchestrator, outcomes);
        TestApi {
            state: AppState {
                storage,
                tracker,
                progress,
                deposits,
            },
            wrapper,
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn get_json(state: &AppState, uri: &str) -> Value {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        serde_json::from_slice(&body).unwrap()
    }

    fn deposit_request(amount: &str) -> Request<Body> {
        Request::post("/api/v1/deposit")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "amount": amount }).to_string()))
            .unwrap()
    }

    fn record(block: u64, token: &str, timestamp: Option<u64>) -> TokenEventRecord {
        TokenEventRecord {
            block_number: block,
            transaction_hash: format!("0x{}", block),
            timestamp,
            token: token.to_string(),
            kind: EventKind::Transfer,
            from: Some("0xa".to_string()),
            to: Some("0xb".to_string()),
            amount: Some("1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_progress_starts_idle() {
        let api = test_api();
        let progress = get_json(&api.state, "/api/v1/progress").await;
        assert_eq!(progress["progress"], 0);
        assert_eq!(progress["progress_message"], "");
        assert_eq!(progress["error_message"], "");
        assert_eq!(progress["phase"], "idle");
    }

    #[tokio::test]
    async fn test_deposit_rejects_bad_amounts() {
        let api = test_api();

        let (status, body) = send(&api.state, deposit_request("1.5")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(String::from_utf8(body).unwrap(), "Invalid amount: 1.5");

        let (status, _) = send(&api.state, deposit_request("0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(api.state.tracker.is_empty());
        assert_eq!(api.state.progress.snapshot().phase, DepositPhase::Idle);
    }

    #[tokio::test]
    async fn test_deposit_submission_failure_is_unprocessable() {
        let api = test_api();
        api.wrapper
            .fail_next(ChainError::Rejected("user denied transaction signature".to_string()));

        let (status, body) = send(&api.state, deposit_request("1000")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let message = String::from_utf8(body).unwrap();
        assert!(message.contains("rejected"), "{}", message);
        assert_eq!(api.state.progress.snapshot().error_message, message);
    }

    #[tokio::test]
    async fn test_deposit_starts_and_is_pending() {
        let api = test_api();

        let (status, body) = send(&api.state, deposit_request("1000")).await;
        assert_eq!(status, StatusCode::OK);
        let started: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(started["status"], "started");

        let pending = get_json(&api.state, "/api/v1/pending").await;
        let pending = pending.as_array().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0]["kind"], TxKind::CreateBroker.as_str());
        assert_eq!(pending[0]["context"]["attempt"], started["attempt"]);

        let progress = get_json(&api.state, "/api/v1/progress").await;
        assert_eq!(progress["phase"], "creating_broker");
        assert_eq!(progress["attempt"], started["attempt"]);
    }

    #[tokio::test]
    async fn test_events_filters_and_limit() {
        let api = test_api();
        for block in 1..=3 {
            api.state
                .storage
                .insert_token_event(&record(block, "W-GNT", None))
                .unwrap();
        }
        api.state
            .storage
            .insert_token_event(&record(2, "W-ETH", Some(1_000)))
            .unwrap();

        let all = get_json(&api.state, "/api/v1/events").await;
        assert_eq!(all.as_array().unwrap().len(), 4);

        let eth = get_json(&api.state, "/api/v1/events?token=W-ETH").await;
        assert_eq!(eth.as_array().unwrap().len(), 1);
        assert_eq!(eth[0]["timestamp"], 1_000);

        let block_two = get_json(&api.state, "/api/v1/events?block=2").await;
        assert_eq!(block_two.as_array().unwrap().len(), 2);

        let unresolved = get_json(&api.state, "/api/v1/events?unresolved=true").await;
        assert_eq!(unresolved.as_array().unwrap().len(), 3);

        let limited = get_json(&api.state, "/api/v1/events?limit=2").await;
        assert_eq!(limited.as_array().unwrap().len(), 2);
        assert_eq!(limited[0]["block_number"], 1);
    }

    #[tokio::test]
    async fn test_events_limit_is_capped() {
        let api = test_api();
        for block in 0..(MAX_EVENTS_PER_PAGE as u64 + 5) {
            api.state
                .storage
                .insert_token_event(&record(block, "W-GNT", None))
                .unwrap();
        }
        let page = get_json(&api.state, "/api/v1/events?limit=100000").await;
        assert_eq!(page.as_array().unwrap().len(), MAX_EVENTS_PER_PAGE);
    }

    #[tokio::test]
    async fn test_progress_socket_pushes_current_state() {
        let api = test_api();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(api.state.clone());
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/progress", addr))
            .await
            .unwrap();
        let first = socket.next().await.unwrap().unwrap();
        let state: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(state["phase"], "idle");
        assert_eq!(state["progress"], 0);

        let (status, _) = send(&api.state, deposit_request("5")).await;
        assert_eq!(status, StatusCode::OK);
        let next = socket.next().await.unwrap().unwrap();
        let state: Value = serde_json::from_str(next.to_text().unwrap()).unwrap();
        assert_eq!(state["phase"], "creating_broker");

        server.abort();
    }
}
