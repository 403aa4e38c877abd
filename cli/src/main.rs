use clap::{Parser, Subcommand};
use matchbook::{OrderType, Side, SubmitResult};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "matchbook-cli")]
#[command(about = "Command line client for the matchbook exchange service")]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    server: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an order (market, limit, ioc, fok or stoploss)
    Submit {
        #[arg(short = 's', long)]
        symbol: String,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(short = 't', long, default_value = "limit", value_parser = parse_order_type)]
        order_type: OrderType,
        #[arg(short = 'q', long)]
        quantity: String,
        #[arg(short = 'p', long)]
        price: Option<String>,
    },
    /// Cancel a resting order
    Cancel {
        #[arg(short, long)]
        order_id: String,
    },
    /// Cancel a pending stop order
    CancelStop {
        #[arg(short, long)]
        order_id: String,
    },
    /// Modify a resting order's price and/or quantity
    Modify {
        #[arg(short, long)]
        order_id: String,
        #[arg(short = 'p', long)]
        price: Option<String>,
        #[arg(short = 'q', long)]
        quantity: Option<String>,
    },
    /// Modify a pending stop order's trigger and/or quantity
    ModifyStop {
        #[arg(short, long)]
        order_id: String,
        #[arg(short = 'p', long)]
        price: Option<String>,
        #[arg(short = 'q', long)]
        quantity: Option<String>,
    },
    /// Show book depth and pending stops for a symbol
    Book {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long, default_value = "10")]
        depth: usize,
    },
    /// Show best bid and offer for a symbol
    Bbo {
        #[arg(short, long)]
        symbol: String,
    },
    Health,
    Symbols,
}

#[derive(Serialize)]
struct SubmitOrderRequest {
    symbol: String,
    order_type: OrderType,
    side: Side,
    quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
}

#[derive(Serialize)]
struct ModifyOrderRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
}

#[derive(Deserialize)]
struct StopPlacedResponse {
    order_id: String,
    status: String,
    trigger_price: String,
}

#[derive(Deserialize)]
struct BookResponse {
    symbol: String,
    order_book: DepthResponse,
    stop_orders: Vec<StopOrderEntry>,
}

#[derive(Deserialize)]
struct DepthResponse {
    asks: Vec<(String, String)>,
    bids: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct StopOrderEntry {
    order_id: String,
    side: Side,
    quantity: String,
    trigger_price: String,
}

#[derive(Deserialize)]
struct BboResponse {
    symbol: String,
    best_bid: Option<(String, String)>,
    best_ask: Option<(String, String)>,
}

#[derive(Deserialize)]
struct SymbolsResponse {
    symbols: Vec<String>,
}

fn parse_side(s: &str) -> Result<Side, String> {
    match s.to_lowercase().as_str() {
        "buy" | "bid" => Ok(Side::Buy),
        "sell" | "ask" => Ok(Side::Sell),
        _ => Err(format!("Invalid side: {}. Use 'buy' or 'sell'", s)),
    }
}

fn parse_order_type(s: &str) -> Result<OrderType, String> {
    match s.to_lowercase().as_str() {
        "market" => Ok(OrderType::Market),
        "limit" => Ok(OrderType::Limit),
        "ioc" => Ok(OrderType::Ioc),
        "fok" => Ok(OrderType::Fok),
        "stoploss" | "stop" => Ok(OrderType::StopLoss),
        _ => Err(format!(
            "Invalid order type: {}. Use market, limit, ioc, fok or stoploss",
            s
        )),
    }
}

fn print_submit_result(result: &SubmitResult) {
    println!("Order ID: {}", result.order_id);
    println!("Status: {:?}", result.status);
    if let Some(reason) = &result.reason {
        println!("Reason: {}", reason);
    }
    if !result.trades.is_empty() {
        println!("Trades executed: {}", result.trades.len());
        for trade in &result.trades {
            println!(
                "  {} @ {} (value {}, taker fee {})",
                trade.quantity, trade.price, trade.trade_value, trade.taker_fee
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Submit {
            symbol,
            side,
            order_type,
            quantity,
            price,
        } => {
            let is_stop = order_type == OrderType::StopLoss;
            let request = SubmitOrderRequest {
                symbol,
                order_type,
                side,
                quantity,
                price,
            };

            let response = client
                .post(format!("{}/orders", cli.server))
                .json(&request)
                .send()
                .await?;

            if response.status().is_success() {
                if is_stop {
                    let placed: StopPlacedResponse = response.json().await?;
                    println!("Order ID: {}", placed.order_id);
                    println!("Status: {}", placed.status);
                    println!("Trigger price: {}", placed.trigger_price);
                } else {
                    let result: SubmitResult = response.json().await?;
                    print_submit_result(&result);
                }
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::Cancel { order_id } => {
            let response = client
                .delete(format!("{}/order/{}", cli.server, order_id))
                .send()
                .await?;

            if response.status().is_success() {
                let result: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::CancelStop { order_id } => {
            let response = client
                .delete(format!("{}/stoporder/{}", cli.server, order_id))
                .send()
                .await?;

            if response.status().is_success() {
                let result: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::Modify {
            order_id,
            price,
            quantity,
        } => {
            let request = ModifyOrderRequest { quantity, price };
            let response = client
                .put(format!("{}/orders/{}", cli.server, order_id))
                .json(&request)
                .send()
                .await?;

            if response.status().is_success() {
                let result: SubmitResult = response.json().await?;
                print_submit_result(&result);
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::ModifyStop {
            order_id,
            price,
            quantity,
        } => {
            let request = ModifyOrderRequest { quantity, price };
            let response = client
                .put(format!("{}/stoporder/{}", cli.server, order_id))
                .json(&request)
                .send()
                .await?;

            if response.status().is_success() {
                let result: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::Book { symbol, depth } => {
            let response = client
                .get(format!("{}/book/{}?depth={}", cli.server, symbol, depth))
                .send()
                .await?;

            if response.status().is_success() {
                let book: BookResponse = response.json().await?;

                println!("Order book for {}", book.symbol);
                println!("\nAsks:");
                for (i, (price, qty)) in book.order_book.asks.iter().enumerate() {
                    println!("  {}: {} @ {}", i + 1, qty, price);
                }
                println!("\nBids:");
                for (i, (price, qty)) in book.order_book.bids.iter().enumerate() {
                    println!("  {}: {} @ {}", i + 1, qty, price);
                }
                if !book.stop_orders.is_empty() {
                    println!("\nPending stops:");
                    for stop in &book.stop_orders {
                        println!(
                            "  {} {:?} {} trigger {}",
                            stop.order_id, stop.side, stop.quantity, stop.trigger_price
                        );
                    }
                }
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Bbo { symbol } => {
            let response = client
                .get(format!("{}/bbo/{}", cli.server, symbol))
                .send()
                .await?;

            if response.status().is_success() {
                let bbo: BboResponse = response.json().await?;
                println!("Symbol: {}", bbo.symbol);
                match bbo.best_bid {
                    Some((price, qty)) => println!("Best bid: {} ({} available)", price, qty),
                    None => println!("Best bid: none"),
                }
                match bbo.best_ask {
                    Some((price, qty)) => println!("Best ask: {} ({} available)", price, qty),
                    None => println!("Best ask: none"),
                }
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Health => {
            let response = client.get(format!("{}/health", cli.server)).send().await?;

            if response.status().is_success() {
                let health: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Symbols => {
            let response = client.get(format!("{}/symbols", cli.server)).send().await?;

            if response.status().is_success() {
                let symbols: SymbolsResponse = response.json().await?;
                for symbol in symbols.symbols {
                    println!("{}", symbol);
                }
            } else {
                println!("Error: {}", response.status());
            }
        }
    }

    Ok(())
}
