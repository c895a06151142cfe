//! Order-taking engine for prediction markets
//!
//! A fill first trades against the resting orders of a market, then decides
//! what to do with whatever was not filled: rest a bid, an ask, a short-ask,
//! an ask plus short-ask, or short sell into matching bids.
//!
//! # Architecture
//!
//! - [`types`] - Requests, execution results and fill reports
//! - [`errors`] - Fill error type
//! - [`lock`] - Commit lock and fill observer
//! - [`matching`] - Selection of matchable counter-orders
//! - [`executor`] - Chain collaborator traits (mockable for testing)
//! - [`filler`] - Buy, sell and short-sell fill cycles
//! - [`queue`] - Per trader and market serialisation of fills
//! - [`paper`] - In-memory exchange
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rust_decimal_macros::dec;
//! use take_order_engine::take_order::{Market, OrderFiller, PaperExchange, TradeRequest};
//!
//! let exchange = Arc::new(PaperExchange::new("0x1"));
//! let filler = OrderFiller::new(exchange.clone(), exchange.clone(), exchange);
//!
//! let request = TradeRequest::new(Market::new("0xa1"), "1", dec!(10), dec!(0.5), "0x1");
//! let report = filler.fill_buy(&request).await?;
//! ```
//!
//! # Testing
//!
//! ```rust,ignore
//! use take_order_engine::take_order::executor::mock::{MockBooks, MockExecutor, MockGateway};
//!
//! let executor = MockExecutor::new(Ok(TradeExecution::bought(dec!(4), dec!(3))));
//! let gateway = MockGateway::new(dec!(0));
//! ```

pub mod errors;
pub mod executor;
pub mod filler;
pub mod lock;
pub mod matching;
pub mod paper;
pub mod queue;
pub mod types;

pub use errors::{FillError, FillResult};
pub use executor::{OrderBookSource, OrderGateway, TradeContext, TradeExecutor};
pub use filler::OrderFiller;
pub use lock::{CommitLock, FillObserver, NoOpObserver};
pub use matching::{calculate_buy_trade_ids, calculate_sell_trade_ids, BookMatcher, TradeMatcher};
pub use paper::{PaperConfig, PaperExchange, PaperPlacement, PlacementKind};
pub use queue::FillQueue;
pub use types::{
    AskAndShortAsk, FillKind, FillReport, LimitOrder, Market, OrderBook, OrderBooks, OrderSide,
    PositionQuery, ResidualAction, ResidualStatus, RestingOrder, TradeCommitment, TradeExecution,
    TradeGroupId, TradeParams, TradeRequest,
};
