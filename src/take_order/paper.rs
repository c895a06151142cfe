//! Paper exchange: in-memory order books and positions
//!
//! Implements the executor, gateway and book source against local state so
//! fills can be tried without a chain connection. Trades take resting orders
//! best price first; placed bids, asks and short-asks rest on the local book
//! under the exchange's trader address.
//!
//! Sells only part with shares the trader owns. Short sells borrow, so they
//! are tracked as a separate short balance.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{FillError, FillResult};
use super::executor::{OrderBookSource, OrderGateway, TradeContext, TradeExecutor};
use super::types::{
    AskAndShortAsk, LimitOrder, OrderBook, OrderBooks, OrderSide, PositionQuery, RestingOrder,
    TradeCommitment, TradeExecution, TradeGroupId, TradeParams,
};

/// Kind of passive order booked by the paper exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    Bid,
    Ask,
    ShortAsk,
}

/// Passive order booked by the paper exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperPlacement {
    pub kind: PlacementKind,
    pub order_id: String,
    pub market_id: String,
    pub outcome: String,
    pub shares: Decimal,
    pub price: Decimal,
    pub trade_group_id: TradeGroupId,
}

/// Resting order to preload into a paper book
#[derive(Debug, Clone, Deserialize)]
pub struct SeedOrder {
    pub market: String,
    pub side: OrderSide,
    pub id: String,
    pub outcome: String,
    pub owner: String,
    pub amount: Decimal,
    pub price: Decimal,
}

/// Owned shares to preload for the paper trader
#[derive(Debug, Clone, Deserialize)]
pub struct SeedPosition {
    pub market: String,
    pub outcome: String,
    pub shares: Decimal,
}

/// Initial paper exchange state
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperConfig {
    #[serde(default)]
    pub orders: Vec<SeedOrder>,
    #[serde(default)]
    pub positions: Vec<SeedPosition>,
}

/// Order id, shares taken, price
type Taken = (String, Decimal, Decimal);

#[derive(Debug, Default)]
struct PaperState {
    books: OrderBooks,
    /// Long shares by (market, trader, outcome)
    positions: HashMap<PositionQuery, Decimal>,
    /// Borrowed shares sold short by (market, trader, outcome)
    shorts: HashMap<PositionQuery, Decimal>,
    placements: Vec<PaperPlacement>,
    next_order_id: u64,
}

impl PaperState {
    fn book_order(
        &mut self,
        kind: PlacementKind,
        trader: &str,
        order: &LimitOrder,
        shares: Decimal,
    ) {
        if shares <= Decimal::ZERO {
            return;
        }

        self.next_order_id += 1;
        let order_id = format!("paper-{}", self.next_order_id);
        let side = match kind {
            PlacementKind::Bid => OrderSide::Buy,
            PlacementKind::Ask | PlacementKind::ShortAsk => OrderSide::Sell,
        };

        self.books.entry(order.market.id.clone()).or_default().insert(
            side,
            RestingOrder::new(&order_id, &order.outcome, trader, shares, order.limit_price),
        );
        self.placements.push(PaperPlacement {
            kind,
            order_id,
            market_id: order.market.id.clone(),
            outcome: order.outcome.clone(),
            shares,
            price: order.limit_price,
            trade_group_id: order.trade_group_id.clone(),
        });
    }

    /// Take up to `wanted(order)` shares from each listed order, in list order
    fn take(
        &mut self,
        market_id: &str,
        side: OrderSide,
        ids: &[String],
        mut wanted: impl FnMut(&RestingOrder) -> Decimal,
    ) -> Vec<Taken> {
        let mut taken = Vec::new();
        let Some(book) = self.books.get_mut(market_id) else {
            return taken;
        };

        for id in ids {
            let Some(order) = book.side_mut(side).get_mut(id) else {
                continue;
            };
            let shares = wanted(&*order).min(order.amount);
            if shares <= Decimal::ZERO {
                break;
            }
            order.amount -= shares;
            taken.push((id.clone(), shares, order.price));
            if order.amount.is_zero() {
                book.side_mut(side).remove(id);
            }
        }

        taken
    }
}

/// In-memory exchange for paper fills
pub struct PaperExchange {
    trader: String,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    /// Create an empty exchange acting for `trader`
    pub fn new(trader: impl Into<String>) -> Self {
        Self {
            trader: trader.into(),
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Create an exchange preloaded with orders and positions
    pub fn from_config(trader: impl Into<String>, config: &PaperConfig) -> Self {
        let exchange = Self::new(trader);
        for seed in &config.orders {
            exchange.seed_order(
                &seed.market,
                seed.side,
                RestingOrder::new(&seed.id, &seed.outcome, &seed.owner, seed.amount, seed.price),
            );
        }
        for seed in &config.positions {
            exchange.set_position(&seed.market, &seed.outcome, seed.shares);
        }
        info!(
            "Paper exchange for {} seeded with {} orders and {} positions",
            exchange.trader,
            config.orders.len(),
            config.positions.len()
        );
        exchange
    }

    /// Rest an order on a market's book
    pub fn seed_order(&self, market_id: &str, side: OrderSide, order: RestingOrder) {
        self.state()
            .books
            .entry(market_id.to_string())
            .or_default()
            .insert(side, order);
    }

    /// Set the trader's owned shares
    pub fn set_position(&self, market_id: &str, outcome: &str, shares: Decimal) {
        let key = self.key(market_id, &self.trader, outcome);
        self.state().positions.insert(key, shares);
    }

    /// Owned shares of the trader
    pub fn position(&self, market_id: &str, outcome: &str) -> Decimal {
        let key = self.key(market_id, &self.trader, outcome);
        self.state().positions.get(&key).copied().unwrap_or_default()
    }

    /// Shares the trader has sold short
    pub fn short_position(&self, market_id: &str, outcome: &str) -> Decimal {
        let key = self.key(market_id, &self.trader, outcome);
        self.state().shorts.get(&key).copied().unwrap_or_default()
    }

    pub fn book(&self, market_id: &str) -> Option<OrderBook> {
        self.state().books.get(market_id).cloned()
    }

    pub fn placements(&self) -> Vec<PaperPlacement> {
        self.state().placements.clone()
    }

    fn key(&self, market_id: &str, trader: &str, outcome: &str) -> PositionQuery {
        PositionQuery::new(market_id, trader.to_lowercase(), outcome)
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        // State stays consistent between statements, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(
        &self,
        ctx: &TradeContext<'_>,
        params: &TradeParams,
        taken: &[Taken],
    ) {
        if taken.is_empty() {
            return;
        }
        ctx.commit(&TradeCommitment {
            market_id: params.market_id.clone(),
            outcome: params.outcome.clone(),
            trade_ids: taken.iter().map(|(id, _, _)| id.clone()).collect(),
            trade_group_id: params.trade_group_id.clone(),
        });
    }

    fn buy(
        &self,
        params: &TradeParams,
        ids: &[String],
    ) -> FillResult<(TradeExecution, Vec<Taken>)> {
        let fee_factor = Decimal::ONE
            .checked_add(params.fee_rate)
            .ok_or_else(|| FillError::execution(2, "fee rate out of range"))?;
        let mut budget = params.value_with_fee;
        let mut state = self.state();

        let taken = state.take(&params.market_id, OrderSide::Sell, ids, |order| {
            let cost_per_share = match order.price.checked_mul(fee_factor) {
                Some(cost) if cost > Decimal::ZERO => cost,
                _ => return Decimal::ZERO,
            };
            let shares = budget
                .checked_div(cost_per_share)
                .map_or(order.amount, |affordable| affordable.min(order.amount));
            let spent = shares.checked_mul(cost_per_share).unwrap_or(budget);
            budget = (budget - spent).max(Decimal::ZERO);
            shares
        });

        let filled: Decimal = taken.iter().map(|(_, shares, _)| *shares).sum();
        let key = self.key(&params.market_id, &params.address, &params.outcome);
        *state.positions.entry(key).or_default() += filled;

        debug!(
            "Paper buy took {} shares from {} orders, {} left to spend",
            filled,
            taken.len(),
            budget
        );
        Ok((TradeExecution::bought(filled, budget), taken))
    }
}

#[async_trait]
impl TradeExecutor for PaperExchange {
    async fn execute_trade(
        &self,
        params: &TradeParams,
        ctx: &TradeContext<'_>,
    ) -> FillResult<TradeExecution> {
        // Read matchable ids before locking: the accessor snapshots our own books
        let ids = ctx.trade_ids();

        match ctx.side() {
            OrderSide::Buy => {
                if params.value_with_fee <= Decimal::ZERO {
                    return Err(FillError::execution(1, "buy has no value to spend"));
                }
                let (execution, taken) = self.buy(params, &ids)?;
                self.commit(ctx, params, &taken);
                Ok(execution)
            }
            OrderSide::Sell => {
                let key = self.key(&params.market_id, &params.address, &params.outcome);
                let taken = {
                    let mut state = self.state();
                    let mut sellable = state
                        .positions
                        .get(&key)
                        .copied()
                        .unwrap_or_default()
                        .min(params.shares);
                    let taken = state.take(&params.market_id, OrderSide::Buy, &ids, |order| {
                        let shares = sellable.min(order.amount);
                        sellable -= shares;
                        shares
                    });
                    let sold: Decimal = taken.iter().map(|(_, shares, _)| *shares).sum();
                    if let Some(owned) = state.positions.get_mut(&key) {
                        *owned -= sold;
                    }
                    taken
                };

                let sold: Decimal = taken.iter().map(|(_, shares, _)| *shares).sum();
                debug!("Paper sell took {} shares from {} orders", sold, taken.len());
                self.commit(ctx, params, &taken);
                Ok(TradeExecution::sold(params.shares, params.shares - sold))
            }
        }
    }

    async fn execute_short_sell(
        &self,
        params: &TradeParams,
        ctx: &TradeContext<'_>,
    ) -> FillResult<TradeExecution> {
        let ids = ctx.trade_ids();
        let key = self.key(&params.market_id, &params.address, &params.outcome);

        let taken = {
            let mut state = self.state();
            let mut wanted = params.shares;
            let taken = state.take(&params.market_id, OrderSide::Buy, &ids, |order| {
                let shares = wanted.min(order.amount);
                wanted -= shares;
                shares
            });
            let sold: Decimal = taken.iter().map(|(_, shares, _)| *shares).sum();
            *state.shorts.entry(key).or_default() += sold;
            taken
        };

        let sold: Decimal = taken.iter().map(|(_, shares, _)| *shares).sum();
        debug!("Paper short sell took {} shares from {} orders", sold, taken.len());
        self.commit(ctx, params, &taken);
        Ok(TradeExecution::sold(params.shares, params.shares - sold))
    }
}

#[async_trait]
impl OrderGateway for PaperExchange {
    async fn place_bid(&self, order: &LimitOrder) -> FillResult<()> {
        self.state()
            .book_order(PlacementKind::Bid, &self.trader, order, order.shares);
        Ok(())
    }

    async fn place_ask(&self, order: &LimitOrder) -> FillResult<()> {
        self.state()
            .book_order(PlacementKind::Ask, &self.trader, order, order.shares);
        Ok(())
    }

    async fn place_short_ask(&self, order: &LimitOrder) -> FillResult<()> {
        self.state()
            .book_order(PlacementKind::ShortAsk, &self.trader, order, order.shares);
        Ok(())
    }

    async fn place_ask_and_short_ask(&self, order: &AskAndShortAsk) -> FillResult<()> {
        let limit = LimitOrder {
            market: order.market.clone(),
            outcome: order.outcome.clone(),
            shares: order.ask_shares,
            limit_price: order.limit_price,
            trade_group_id: order.trade_group_id.clone(),
        };
        let mut state = self.state();
        state.book_order(PlacementKind::Ask, &self.trader, &limit, order.ask_shares);
        state.book_order(PlacementKind::ShortAsk, &self.trader, &limit, order.short_ask_shares);
        Ok(())
    }

    async fn participant_shares_purchased(&self, query: &PositionQuery) -> FillResult<Decimal> {
        let key = self.key(&query.market, &query.trader, &query.outcome);
        Ok(self.state().positions.get(&key).copied().unwrap_or_default())
    }
}

impl OrderBookSource for PaperExchange {
    fn order_books(&self) -> OrderBooks {
        self.state().books.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::take_order::executor::mock::RecordingObserver;
    use crate::take_order::filler::OrderFiller;
    use crate::take_order::types::{FillKind, Market, ResidualAction, TradeRequest};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    type PaperFiller = OrderFiller<PaperExchange, PaperExchange>;

    fn setup() -> (Arc<PaperExchange>, PaperFiller, Arc<RecordingObserver>) {
        let exchange = Arc::new(PaperExchange::new("0x1"));
        let observer = Arc::new(RecordingObserver::default());
        let filler = OrderFiller::new(exchange.clone(), exchange.clone(), exchange.clone())
            .with_observer(observer.clone());
        (exchange, filler, observer)
    }

    fn resting(id: &str, owner: &str, amount: Decimal, price: Decimal) -> RestingOrder {
        RestingOrder::new(id, "1", owner, amount, price)
    }

    fn request(shares: Decimal) -> TradeRequest {
        TradeRequest::new(Market::new("0xa1"), "1", shares, dec!(0.5), "0x1")
            .with_trade_group("0x000abc123")
    }

    #[tokio::test]
    async fn test_buy_takes_asks_then_rests_bid() {
        let (exchange, filler, observer) = setup();
        exchange.seed_order("0xa1", OrderSide::Sell, resting("0xs1", "0x2", dec!(30), dec!(0.4)));
        exchange.seed_order("0xa1", OrderSide::Sell, resting("0xs2", "0x2", dec!(30), dec!(0.6)));

        let report = filler.fill_buy(&request(dec!(100))).await.unwrap();

        assert_eq!(report.filled_shares, dec!(30));
        assert_eq!(report.residual, ResidualAction::Bid { shares: dec!(70) });
        assert_eq!(exchange.position("0xa1", "1"), dec!(30));

        let book = exchange.book("0xa1").unwrap();
        assert!(!book.sell.contains_key("0xs1"));
        assert!(book.sell.contains_key("0xs2"));
        let bids: Vec<_> = book.buy.values().collect();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].amount, dec!(70));
        assert_eq!(bids[0].owner, "0x1");
        assert_eq!(observer.commitment_count(), 1);
        assert_eq!(observer.lock_signals(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_buy_budget_includes_fees() {
        let (exchange, filler, _) = setup();
        exchange.seed_order("0xa1", OrderSide::Sell, resting("0xs1", "0x2", dec!(100), dec!(0.5)));

        let request = request(dec!(100)).with_total_cost(dec!(22)).with_fee_rate(dec!(0.1));
        let report = filler.fill_buy(&request).await.unwrap();

        // 22 / (0.5 * 1.1) = 40 shares
        assert_eq!(report.filled_shares, dec!(40));
        assert_eq!(report.remaining_shares, dec!(60));
    }

    #[tokio::test]
    async fn test_buy_with_unbounded_budget_takes_what_rests() {
        let (exchange, filler, _) = setup();
        let cheap = resting("0xs1", "0x2", dec!(10), dec!(0.0001));
        exchange.seed_order("0xa1", OrderSide::Sell, cheap);

        let request = request(dec!(10)).with_total_cost(Decimal::MAX);
        let report = filler.fill_buy(&request).await.unwrap();

        assert!(report.is_fully_filled());
        assert_eq!(exchange.position("0xa1", "1"), dec!(10));
    }

    #[tokio::test]
    async fn test_sell_without_position_short_sells_into_bids() {
        let (exchange, filler, observer) = setup();
        exchange.seed_order("0xa1", OrderSide::Buy, resting("0xb1", "0x2", dec!(40), dec!(0.5)));

        let report = filler.fill(FillKind::Sell, &request(dec!(100))).await.unwrap();

        assert_eq!(report.filled_shares, Decimal::ZERO);
        match &report.residual {
            ResidualAction::ShortSell { report } => {
                assert_eq!(report.filled_shares, dec!(40));
                assert_eq!(report.residual, ResidualAction::ShortAsk { shares: dec!(60) });
            }
            other => panic!("expected short sell, got {:?}", other),
        }
        assert_eq!(exchange.short_position("0xa1", "1"), dec!(40));
        let placements = exchange.placements();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].kind, PlacementKind::ShortAsk);
        assert_eq!(placements[0].shares, dec!(60));
        assert_eq!(observer.lock_signals(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_sell_with_partial_position_splits_residual() {
        let (exchange, filler, _) = setup();
        exchange.set_position("0xa1", "1", dec!(10));

        let report = filler.fill_sell(&request(dec!(100))).await.unwrap();

        assert_eq!(
            report.residual,
            ResidualAction::AskAndShortAsk {
                ask_shares: dec!(10),
                short_ask_shares: dec!(90)
            }
        );
        let kinds: Vec<_> = exchange.placements().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PlacementKind::Ask, PlacementKind::ShortAsk]);
        assert_eq!(exchange.book("0xa1").unwrap().sell.len(), 2);
    }

    #[tokio::test]
    async fn test_sell_uses_owned_shares_first() {
        let (exchange, filler, _) = setup();
        exchange.set_position("0xa1", "1", dec!(60));
        exchange.seed_order("0xa1", OrderSide::Buy, resting("0xb1", "0x2", dec!(20), dec!(0.55)));

        let report = filler.fill_sell(&request(dec!(50))).await.unwrap();

        assert_eq!(report.filled_shares, dec!(20));
        assert_eq!(exchange.position("0xa1", "1"), dec!(40));
        assert_eq!(report.residual, ResidualAction::Ask { shares: dec!(30) });
    }

    #[tokio::test]
    async fn test_own_orders_are_never_taken() {
        let (exchange, filler, _) = setup();
        exchange.seed_order("0xa1", OrderSide::Sell, resting("0xs1", "0x1", dec!(30), dec!(0.4)));

        let report = filler.fill_buy(&request(dec!(10)).do_not_make_orders(true)).await.unwrap();

        assert_eq!(report.filled_shares, Decimal::ZERO);
        assert!(exchange.placements().is_empty());
        assert_eq!(exchange.book("0xa1").unwrap().sell["0xs1"].amount, dec!(30));
    }

    #[test]
    fn test_from_config() {
        let config: PaperConfig = serde_json::from_str(
            r#"{
                "orders": [
                    { "market": "0xa1", "side": "buy", "id": "0xb1", "outcome": "1",
                      "owner": "0x2", "amount": "40", "price": "0.5" }
                ],
                "positions": [ { "market": "0xa1", "outcome": "1", "shares": "12.5" } ]
            }"#,
        )
        .unwrap();

        let exchange = PaperExchange::from_config("0x1", &config);

        assert_eq!(exchange.position("0xa1", "1"), dec!(12.5));
        assert_eq!(exchange.book("0xa1").unwrap().buy["0xb1"].amount, dec!(40));
    }
}
