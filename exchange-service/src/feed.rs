//! Market-data fan-out.
//!
//! One broadcast channel carries trade prints, another carries depth
//! snapshots; every frame names its symbol and websocket tasks filter on
//! it. Sending never blocks the matcher, and a receiver that falls behind
//! or disappears only affects its own connection.

use matchbook::{Broadcaster, DepthSnapshot, Trade};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1000;

/// Hub for both streaming channels. Cloning shares the underlying channels.
#[derive(Clone)]
pub struct MarketFeed {
    trades: broadcast::Sender<Trade>,
    depth: broadcast::Sender<DepthSnapshot>,
}

impl MarketFeed {
    pub fn new() -> Self {
        let (trades, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (depth, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { trades, depth }
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<Trade> {
        self.trades.subscribe()
    }

    pub fn subscribe_depth(&self) -> broadcast::Receiver<DepthSnapshot> {
        self.depth.subscribe()
    }
}

impl Broadcaster for MarketFeed {
    fn on_trade(&self, trade: &Trade) {
        // send only errors when no subscriber exists, which is fine
        let _ = self.trades.send(trade.clone());
    }

    fn on_depth(&self, _symbol: &str, depth: &DepthSnapshot) {
        let _ = self.depth.send(depth.clone());
    }
}
