//! Exchange service: REST API and WebSocket streams over the matching
//! engine. Built with Axum; one process hosts every symbol's book.

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use matchbook::{now_iso, Engine, EngineError, Order, OrderType, Side};
use rust_decimal::Decimal;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

mod feed;
mod types;
mod websocket;

use feed::MarketFeed;
use types::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let feed = MarketFeed::new();
    let engine = Engine::with_broadcaster(Arc::new(feed.clone()));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/symbols", get(list_symbols))
        .route("/orders", post(submit_order))
        .route("/orders/:order_id", put(modify_order))
        .route("/order/:order_id", delete(cancel_order))
        .route("/stoporder/:order_id", delete(cancel_stop).put(modify_stop))
        .route("/book/:symbol", get(get_book))
        .route("/bbo/:symbol", get(get_bbo))
        .route("/demo/fill", post(demo_fill))
        .route("/ws/marketdata/:symbol", get(marketdata_stream))
        .route("/ws/trades/:symbol", get(trade_stream))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine, feed });

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .unwrap();

    info!("exchange service listening on http://0.0.0.0:8080");
    info!("  POST /orders - submit order");
    info!("  DEL  /order/:id - cancel resting order");
    info!("  PUT  /orders/:id - modify resting order");
    info!("  DEL  /stoporder/:id - cancel stop order");
    info!("  PUT  /stoporder/:id - modify stop order");
    info!("  GET  /book/:symbol - depth and pending stops");
    info!("  GET  /bbo/:symbol - best bid and offer");
    info!("  WS   /ws/marketdata/:symbol - depth stream");
    info!("  WS   /ws/trades/:symbol - trade stream");

    axum::serve(listener, app).await.unwrap();
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub feed: MarketFeed,
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "exchange-service",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": now_iso(),
    }))
}

async fn list_symbols(State(state): State<AppState>) -> impl IntoResponse {
    Json(SymbolsResponse {
        symbols: state.engine.symbols(),
    })
}

/// Submits a new order. Stops are queued for triggering; everything else
/// goes straight to the matcher.
async fn submit_order(
    State(state): State<AppState>,
    Json(payload): Json<OrderSubmission>,
) -> Result<Response, AppError> {
    let is_stop = payload.order_type == OrderType::StopLoss;
    let order = payload.into_order().map_err(AppError::Invalid)?;

    if is_stop {
        let placed = state.engine.place_stop(order).await?;
        return Ok((StatusCode::CREATED, Json(placed)).into_response());
    }

    let result = state.engine.submit(order).await?;
    Ok((StatusCode::CREATED, Json(result)).into_response())
}

async fn cancel_order(
    Path(order_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.cancel_order(&order_id).await?;
    Ok(Json(CancelResponse {
        order_id,
        status: "canceled".into(),
    }))
}

async fn cancel_stop(
    Path(order_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.cancel_stop(&order_id).await?;
    Ok(Json(CancelResponse {
        order_id,
        status: "canceled".into(),
    }))
}

/// Modifies a resting order. The order keeps its id, is re-matched at its
/// new price, and loses time priority at its level.
async fn modify_order(
    Path(order_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ModifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (price, quantity) = payload.parsed().map_err(AppError::Invalid)?;
    let result = state.engine.modify_order(&order_id, price, quantity).await?;
    Ok(Json(result))
}

async fn modify_stop(
    Path(order_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ModifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (price, quantity) = payload.parsed().map_err(AppError::Invalid)?;
    let stop = state.engine.modify_stop(&order_id, price, quantity).await?;
    Ok(Json(StopModifiedResponse {
        order_id: stop.id,
        status: "modified".into(),
        new_trigger_price: stop.price.map(|p| p.to_string()).unwrap_or_default(),
        new_quantity: stop.remaining.to_string(),
    }))
}

async fn get_book(
    Path(symbol): Path<String>,
    Query(params): Query<DepthQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let snapshot = state
        .engine
        .book_snapshot(&symbol, params.depth.unwrap_or(10))
        .await;
    Json(snapshot)
}

async fn get_bbo(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    Json(state.engine.bbo(&symbol).await)
}

/// Seeds demo resting liquidity around a fixed mid price, for manual
/// testing against an empty process.
async fn demo_fill(
    State(state): State<AppState>,
    Query(params): Query<DemoFillQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mid = Decimal::new(30_000, 0);
    let step = Decimal::new(10, 0);
    let qty = Decimal::new(1, 1);

    for i in 0..params.bids.unwrap_or(5) {
        let price = mid - step * Decimal::from(i as u64 + 1);
        let order = Order::new(
            params.symbol.clone(),
            Side::Buy,
            OrderType::Limit,
            qty,
            Some(price),
        );
        state.engine.submit(order).await?;
    }
    for i in 0..params.asks.unwrap_or(5) {
        let price = mid + step * Decimal::from(i as u64 + 1);
        let order = Order::new(
            params.symbol.clone(),
            Side::Sell,
            OrderType::Limit,
            qty,
            Some(price),
        );
        state.engine.submit(order).await?;
    }

    let bbo = state.engine.bbo(&params.symbol).await;
    Ok(Json(serde_json::json!({ "status": "ok", "bbo": bbo })))
}

async fn trade_stream(
    Path(symbol): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| websocket::handle_trade_stream(socket, symbol, state))
}

async fn marketdata_stream(
    Path(symbol): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| websocket::handle_depth_stream(socket, symbol, state))
}

/// HTTP error envelope.
#[derive(Debug)]
enum AppError {
    Invalid(String),
    NotFound(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidOrder(msg) => AppError::Invalid(msg),
            EngineError::OrderNotFound(_) => AppError::NotFound("Order not found".into()),
            EngineError::StopOrderNotFound(_) => {
                AppError::NotFound("Stop-loss order not found".into())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
