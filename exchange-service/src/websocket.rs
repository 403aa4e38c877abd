//! WebSocket handlers for the per-symbol streaming channels.
//!
//! Each connection subscribes to the shared fan-out, filters frames by its
//! symbol and forwards them as JSON. A failed send or a lagging receiver
//! ends only that connection. Uses tokio::select! for concurrent handling
//! of client messages, broadcast frames and heartbeats.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use matchbook::now_iso;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info};

use crate::types::StreamFrame;
use crate::AppState;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// Streams trade prints for one symbol.
pub async fn handle_trade_stream(socket: WebSocket, symbol: String, state: AppState) {
    info!(%symbol, "trade stream connected");

    let (mut sender, mut receiver) = socket.split();
    let mut trades = state.feed.subscribe_trades();
    let mut heartbeat = interval(HEARTBEAT_PERIOD);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                if !handle_client_message(msg, &mut sender).await {
                    break;
                }
            }

            trade = trades.recv() => {
                match trade {
                    Ok(trade) if trade.symbol == symbol => {
                        if send_frame(&mut sender, &StreamFrame::Trade(trade)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {} // other symbol
                    Err(_) => break, // channel closed or this receiver lagged
                }
            }

            _ = heartbeat.tick() => {
                let ping = StreamFrame::Ping { timestamp: now_iso() };
                if send_frame(&mut sender, &ping).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%symbol, "trade stream disconnected");
}

/// Streams depth updates for one symbol, starting with a snapshot of the
/// current book.
pub async fn handle_depth_stream(socket: WebSocket, symbol: String, state: AppState) {
    info!(%symbol, "market data stream connected");

    let (mut sender, mut receiver) = socket.split();
    let mut depth = state.feed.subscribe_depth();
    let mut heartbeat = interval(HEARTBEAT_PERIOD);

    let snapshot = state.engine.depth(&symbol, 10).await;
    if send_frame(&mut sender, &StreamFrame::L2Update(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                if !handle_client_message(msg, &mut sender).await {
                    break;
                }
            }

            update = depth.recv() => {
                match update {
                    Ok(update) if update.symbol == symbol => {
                        if send_frame(&mut sender, &StreamFrame::L2Update(update)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }

            _ = heartbeat.tick() => {
                let ping = StreamFrame::Ping { timestamp: now_iso() };
                if send_frame(&mut sender, &ping).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%symbol, "market data stream disconnected");
}

/// Answers client pings and reports whether the connection is still alive.
async fn handle_client_message(
    msg: Option<Result<Message, axum::Error>>,
    sender: &mut (impl SinkExt<Message> + Unpin),
) -> bool {
    match msg {
        Some(Ok(Message::Text(text))) => {
            if let Ok(StreamFrame::Ping { timestamp }) = serde_json::from_str(&text) {
                let pong = StreamFrame::Pong { timestamp };
                if let Ok(json) = serde_json::to_string(&pong) {
                    let _ = sender.send(Message::Text(json)).await;
                }
            }
            true
        }
        Some(Ok(Message::Ping(data))) => {
            let _ = sender.send(Message::Pong(data)).await;
            true
        }
        Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => true,
        Some(Ok(Message::Close(_))) | None => false,
        Some(Err(e)) => {
            debug!(error = %e, "websocket receive error");
            false
        }
    }
}

async fn send_frame(
    sender: &mut (impl SinkExt<Message> + Unpin),
    frame: &StreamFrame,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sender.send(Message::Text(json)).await.map_err(|_| ())
}
