//! Collaborator abstractions for taking orders - enables mocking for tests
//!
//! The chain-facing layer is split in three: [`TradeExecutor`] matches a
//! trade against the book, [`OrderGateway`] submits passive orders and
//! answers position queries, and [`OrderBookSource`] hands out book
//! snapshots.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::FillResult;
use super::lock::FillObserver;
use super::matching::TradeMatcher;
use super::types::{
    AskAndShortAsk, LimitOrder, OrderBooks, OrderSide, PositionQuery, TradeCommitment,
    TradeExecution, TradeParams,
};

/// Read-only access to the current order books
pub trait OrderBookSource: Send + Sync {
    /// Snapshot of every book, keyed by market id
    fn order_books(&self) -> OrderBooks;
}

/// Trade execution against the order book - can be mocked for testing
///
/// Each method is invoked exactly once per fill attempt. An `Err` is
/// terminal for the attempt.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Take resting orders for a buy or a sell
    async fn execute_trade(
        &self,
        params: &TradeParams,
        ctx: &TradeContext<'_>,
    ) -> FillResult<TradeExecution>;

    /// Take resting buy orders with borrowed shares
    async fn execute_short_sell(
        &self,
        params: &TradeParams,
        ctx: &TradeContext<'_>,
    ) -> FillResult<TradeExecution>;
}

/// Passive order submission and position lookup - can be mocked for testing
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_bid(&self, order: &LimitOrder) -> FillResult<()>;

    async fn place_ask(&self, order: &LimitOrder) -> FillResult<()>;

    async fn place_short_ask(&self, order: &LimitOrder) -> FillResult<()>;

    /// Ask and short-ask submitted as one combined order
    async fn place_ask_and_short_ask(&self, order: &AskAndShortAsk) -> FillResult<()>;

    /// Long shares the trader owns in a market outcome
    async fn participant_shares_purchased(&self, query: &PositionQuery) -> FillResult<Decimal>;
}

/// What an executor may consult while a trade is in flight
pub struct TradeContext<'a> {
    market_id: &'a str,
    outcome: &'a str,
    limit_price: Decimal,
    address: &'a str,
    side: OrderSide,
    books: &'a dyn OrderBookSource,
    matcher: &'a dyn TradeMatcher,
    observer: &'a dyn FillObserver,
}

impl<'a> TradeContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market_id: &'a str,
        outcome: &'a str,
        limit_price: Decimal,
        address: &'a str,
        side: OrderSide,
        books: &'a dyn OrderBookSource,
        matcher: &'a dyn TradeMatcher,
        observer: &'a dyn FillObserver,
    ) -> Self {
        Self {
            market_id,
            outcome,
            limit_price,
            address,
            side,
            books,
            matcher,
            observer,
        }
    }

    /// Side of the trade being taken
    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Fresh order book snapshot
    pub fn order_books(&self) -> OrderBooks {
        self.books.order_books()
    }

    /// Counter-order ids currently matchable for this trade
    pub fn trade_ids(&self) -> Vec<String> {
        let books = self.order_books();
        match self.side {
            OrderSide::Buy => self.matcher.buy_trade_ids(
                self.market_id,
                self.outcome,
                self.limit_price,
                &books,
                self.address,
            ),
            OrderSide::Sell => self.matcher.sell_trade_ids(
                self.market_id,
                self.outcome,
                self.limit_price,
                &books,
                self.address,
            ),
        }
    }

    /// Report that a blockchain commitment was made
    pub fn commit(&self, commitment: &TradeCommitment) {
        self.observer.on_trade_commitment(commitment);
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

/// Mock collaborators for exercising fills without a chain connection.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use tokio::sync::Mutex;

    use crate::take_order::errors::FillError;
    use crate::take_order::matching::BookMatcher;

    /// Scripted trade executor that records every call
    pub struct MockExecutor {
        pub trades: Arc<Mutex<Vec<TradeParams>>>,
        pub short_sells: Arc<Mutex<Vec<TradeParams>>>,
        pub trade_response: Arc<Mutex<FillResult<TradeExecution>>>,
        pub short_sell_response: Arc<Mutex<FillResult<TradeExecution>>>,
        /// Consult the trade id accessor while executing
        pub query_trade_ids: bool,
        pub seen_trade_ids: Arc<Mutex<Vec<Vec<String>>>>,
        /// Simulated confirmation latency
        pub delay: Option<Duration>,
    }

    impl MockExecutor {
        pub fn new(response: FillResult<TradeExecution>) -> Self {
            Self {
                trades: Arc::new(Mutex::new(Vec::new())),
                short_sells: Arc::new(Mutex::new(Vec::new())),
                trade_response: Arc::new(Mutex::new(response.clone())),
                short_sell_response: Arc::new(Mutex::new(response)),
                query_trade_ids: true,
                seen_trade_ids: Arc::new(Mutex::new(Vec::new())),
                delay: None,
            }
        }

        /// Executor that fails every call with the given code and message
        pub fn failing(code: i64, message: &str) -> Self {
            Self::new(Err(FillError::execution(code, message)))
        }

        /// Builder: skip the trade id accessor
        pub fn without_trade_id_queries(mut self) -> Self {
            self.query_trade_ids = false;
            self
        }

        /// Builder: wait before answering, as a chain confirmation would
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub async fn set_short_sell_response(&self, response: FillResult<TradeExecution>) {
            *self.short_sell_response.lock().await = response;
        }

        pub async fn trade_count(&self) -> usize {
            self.trades.lock().await.len()
        }

        pub async fn short_sell_count(&self) -> usize {
            self.short_sells.lock().await.len()
        }

        async fn respond(
            &self,
            ctx: &TradeContext<'_>,
            params: &TradeParams,
            response: &Mutex<FillResult<TradeExecution>>,
        ) -> FillResult<TradeExecution> {
            if self.query_trade_ids {
                let ids = ctx.trade_ids();
                self.seen_trade_ids.lock().await.push(ids.clone());
                ctx.commit(&TradeCommitment {
                    market_id: params.market_id.clone(),
                    outcome: params.outcome.clone(),
                    trade_ids: ids,
                    trade_group_id: params.trade_group_id.clone(),
                });
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            response.lock().await.clone()
        }
    }

    #[async_trait]
    impl TradeExecutor for MockExecutor {
        async fn execute_trade(
            &self,
            params: &TradeParams,
            ctx: &TradeContext<'_>,
        ) -> FillResult<TradeExecution> {
            self.trades.lock().await.push(params.clone());
            self.respond(ctx, params, &self.trade_response).await
        }

        async fn execute_short_sell(
            &self,
            params: &TradeParams,
            ctx: &TradeContext<'_>,
        ) -> FillResult<TradeExecution> {
            self.short_sells.lock().await.push(params.clone());
            self.respond(ctx, params, &self.short_sell_response).await
        }
    }

    /// Order submission recorded by [`MockGateway`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Placement {
        Bid(LimitOrder),
        Ask(LimitOrder),
        ShortAsk(LimitOrder),
        AskAndShortAsk(AskAndShortAsk),
    }

    /// Gateway that records submissions and answers with a fixed position
    pub struct MockGateway {
        pub placements: Arc<Mutex<Vec<Placement>>>,
        pub position_queries: Arc<Mutex<Vec<PositionQuery>>>,
        pub owned_shares: Arc<Mutex<FillResult<Decimal>>>,
        pub should_fail: Arc<Mutex<bool>>,
    }

    impl MockGateway {
        pub fn new(owned_shares: Decimal) -> Self {
            Self {
                placements: Arc::new(Mutex::new(Vec::new())),
                position_queries: Arc::new(Mutex::new(Vec::new())),
                owned_shares: Arc::new(Mutex::new(Ok(owned_shares))),
                should_fail: Arc::new(Mutex::new(false)),
            }
        }

        pub async fn set_should_fail(&self, fail: bool) {
            *self.should_fail.lock().await = fail;
        }

        pub async fn set_position_error(&self, message: &str) {
            *self.owned_shares.lock().await = Err(FillError::Position(message.to_string()));
        }

        pub async fn placements(&self) -> Vec<Placement> {
            self.placements.lock().await.clone()
        }

        pub async fn position_query_count(&self) -> usize {
            self.position_queries.lock().await.len()
        }

        async fn record(&self, placement: Placement) -> FillResult<()> {
            self.placements.lock().await.push(placement);
            if *self.should_fail.lock().await {
                return Err(FillError::Placement("Mock failure".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl OrderGateway for MockGateway {
        async fn place_bid(&self, order: &LimitOrder) -> FillResult<()> {
            self.record(Placement::Bid(order.clone())).await
        }

        async fn place_ask(&self, order: &LimitOrder) -> FillResult<()> {
            self.record(Placement::Ask(order.clone())).await
        }

        async fn place_short_ask(&self, order: &LimitOrder) -> FillResult<()> {
            self.record(Placement::ShortAsk(order.clone())).await
        }

        async fn place_ask_and_short_ask(&self, order: &AskAndShortAsk) -> FillResult<()> {
            self.record(Placement::AskAndShortAsk(order.clone())).await
        }

        async fn participant_shares_purchased(&self, query: &PositionQuery) -> FillResult<Decimal> {
            self.position_queries.lock().await.push(query.clone());
            self.owned_shares.lock().await.clone()
        }
    }

    /// Fixed order book snapshot
    #[derive(Debug, Clone, Default)]
    pub struct MockBooks(pub OrderBooks);

    impl OrderBookSource for MockBooks {
        fn order_books(&self) -> OrderBooks {
            self.0.clone()
        }
    }

    /// Book matcher that counts how often each side is consulted
    #[derive(Debug, Default)]
    pub struct CountingMatcher {
        pub buy_calls: AtomicUsize,
        pub sell_calls: AtomicUsize,
    }

    impl CountingMatcher {
        pub fn buy_calls(&self) -> usize {
            self.buy_calls.load(Ordering::SeqCst)
        }

        pub fn sell_calls(&self) -> usize {
            self.sell_calls.load(Ordering::SeqCst)
        }
    }

    impl TradeMatcher for CountingMatcher {
        fn buy_trade_ids(
            &self,
            market_id: &str,
            outcome: &str,
            limit_price: Decimal,
            books: &OrderBooks,
            address: &str,
        ) -> Vec<String> {
            self.buy_calls.fetch_add(1, Ordering::SeqCst);
            BookMatcher.buy_trade_ids(market_id, outcome, limit_price, books, address)
        }

        fn sell_trade_ids(
            &self,
            market_id: &str,
            outcome: &str,
            limit_price: Decimal,
            books: &OrderBooks,
            address: &str,
        ) -> Vec<String> {
            self.sell_calls.fetch_add(1, Ordering::SeqCst);
            BookMatcher.sell_trade_ids(market_id, outcome, limit_price, books, address)
        }
    }

    /// Observer that records lock transitions and commitments in order
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        pub locks: StdMutex<Vec<bool>>,
        pub commitments: StdMutex<Vec<TradeCommitment>>,
    }

    impl RecordingObserver {
        pub fn lock_signals(&self) -> Vec<bool> {
            self.locks.lock().map(|l| l.clone()).unwrap_or_default()
        }

        pub fn commitment_count(&self) -> usize {
            self.commitments.lock().map(|c| c.len()).unwrap_or_default()
        }
    }

    impl FillObserver for RecordingObserver {
        fn on_commit_lock(&self, locked: bool) {
            if let Ok(mut locks) = self.locks.lock() {
                locks.push(locked);
            }
        }

        fn on_trade_commitment(&self, commitment: &TradeCommitment) {
            if let Ok(mut commitments) = self.commitments.lock() {
                commitments.push(commitment.clone());
            }
        }
    }
}
