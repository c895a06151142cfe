//! Core data types for taking orders

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{FillError, FillResult};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Which fill operation produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillKind {
    Buy,
    Sell,
    ShortSell,
}

impl fmt::Display for FillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillKind::Buy => write!(f, "buy"),
            FillKind::Sell => write!(f, "sell"),
            FillKind::ShortSell => write!(f, "short-sell"),
        }
    }
}

/// A market; only its identifier matters while a fill is running
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
}

impl Market {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Correlates every call that originates from one user action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeGroupId(String);

impl TradeGroupId {
    /// Generate a fresh `0x`-prefixed id
    pub fn generate() -> Self {
        Self(format!("0x{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TradeGroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TradeGroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Order resting on the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub id: String,
    pub amount: Decimal,
    pub price: Decimal,
    pub outcome: String,
    pub owner: String,
}

impl RestingOrder {
    pub fn new(
        id: impl Into<String>,
        outcome: impl Into<String>,
        owner: impl Into<String>,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            amount,
            price,
            outcome: outcome.into(),
            owner: owner.into(),
        }
    }
}

/// Resting orders of one market, keyed by order id on each side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub buy: BTreeMap<String, RestingOrder>,
    #[serde(default)]
    pub sell: BTreeMap<String, RestingOrder>,
}

impl OrderBook {
    pub fn side(&self, side: OrderSide) -> &BTreeMap<String, RestingOrder> {
        match side {
            OrderSide::Buy => &self.buy,
            OrderSide::Sell => &self.sell,
        }
    }

    pub fn side_mut(&mut self, side: OrderSide) -> &mut BTreeMap<String, RestingOrder> {
        match side {
            OrderSide::Buy => &mut self.buy,
            OrderSide::Sell => &mut self.sell,
        }
    }

    /// Rest an order on the given side
    pub fn insert(&mut self, side: OrderSide, order: RestingOrder) {
        self.side_mut(side).insert(order.id.clone(), order);
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}

/// Snapshot of every known book, keyed by market id
pub type OrderBooks = HashMap<String, OrderBook>;

/// Input to a fill operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub market: Market,
    pub outcome: String,
    /// Requested share quantity
    pub shares: Decimal,
    pub limit_price: Decimal,
    /// Trader address
    pub address: String,
    /// Total cost / escrow budget
    pub total_cost: Decimal,
    pub fee_rate: Decimal,
    pub trade_group_id: TradeGroupId,
    /// Suppress placing any residual passive order
    #[serde(default)]
    pub do_not_make_orders: bool,
}

impl TradeRequest {
    /// Create a request with a fresh trade group, zero fee and order making enabled
    pub fn new(
        market: Market,
        outcome: impl Into<String>,
        shares: Decimal,
        limit_price: Decimal,
        address: impl Into<String>,
    ) -> Self {
        Self {
            market,
            outcome: outcome.into(),
            shares,
            limit_price,
            address: address.into(),
            // Saturates; validate rejects a notional that does not fit
            total_cost: shares.checked_mul(limit_price).unwrap_or(Decimal::MAX),
            fee_rate: Decimal::ZERO,
            trade_group_id: TradeGroupId::generate(),
            do_not_make_orders: false,
        }
    }

    /// Builder: set the escrow budget
    pub fn with_total_cost(mut self, total_cost: Decimal) -> Self {
        self.total_cost = total_cost;
        self
    }

    /// Builder: set the trading-fee rate
    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    /// Builder: set the trade group id
    pub fn with_trade_group(mut self, trade_group_id: impl Into<TradeGroupId>) -> Self {
        self.trade_group_id = trade_group_id.into();
        self
    }

    /// Builder: forbid residual passive orders
    pub fn do_not_make_orders(mut self, do_not_make_orders: bool) -> Self {
        self.do_not_make_orders = do_not_make_orders;
        self
    }

    /// Validate the request before any collaborator is touched
    pub fn validate(&self) -> FillResult<()> {
        if self.market.id.is_empty() {
            return Err(FillError::InvalidRequest("market id cannot be empty".into()));
        }

        if self.outcome.is_empty() {
            return Err(FillError::InvalidRequest("outcome cannot be empty".into()));
        }

        if self.address.is_empty() {
            return Err(FillError::InvalidRequest("address cannot be empty".into()));
        }

        if self.shares <= Decimal::ZERO {
            return Err(FillError::InvalidRequest(format!(
                "shares must be positive, got {}",
                self.shares
            )));
        }

        if self.limit_price <= Decimal::ZERO {
            return Err(FillError::InvalidRequest(format!(
                "limit_price must be positive, got {}",
                self.limit_price
            )));
        }

        if self.shares.checked_mul(self.limit_price).is_none() {
            return Err(FillError::InvalidRequest(format!(
                "{} shares at {} overflows the order value",
                self.shares, self.limit_price
            )));
        }

        if self.total_cost.is_sign_negative() || self.fee_rate.is_sign_negative() {
            return Err(FillError::InvalidRequest(
                "total_cost and fee_rate cannot be negative".into(),
            ));
        }

        Ok(())
    }
}

/// Parameters handed to the trade executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeParams {
    pub market_id: String,
    pub outcome: String,
    /// Zero for buys: buys are costed in value, not share count
    pub shares: Decimal,
    /// Zero for sells: sells are costed in share count
    pub value_with_fee: Decimal,
    pub fee_rate: Decimal,
    pub trade_group_id: TradeGroupId,
    pub address: String,
}

/// Result reported by the trade executor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeExecution {
    pub filled_shares: Decimal,
    /// Unfilled shares, reported for sells and short sells
    pub remaining_shares: Decimal,
    /// Unspent value, reported for buys
    pub remaining_value: Decimal,
}

impl TradeExecution {
    /// Buy-side result: the executor only knows what it bought and what is left to spend
    pub fn bought(filled_shares: Decimal, remaining_value: Decimal) -> Self {
        Self {
            filled_shares,
            remaining_shares: Decimal::ZERO,
            remaining_value,
        }
    }

    /// Sell-side result derived from the requested and unfilled share counts
    pub fn sold(requested: Decimal, remaining_shares: Decimal) -> Self {
        Self {
            filled_shares: (requested - remaining_shares).max(Decimal::ZERO),
            remaining_shares,
            remaining_value: Decimal::ZERO,
        }
    }
}

/// Emitted by the executor once a blockchain commitment is made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeCommitment {
    pub market_id: String,
    pub outcome: String,
    pub trade_ids: Vec<String>,
    pub trade_group_id: TradeGroupId,
}

/// A passive limit order for the unfilled remainder of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub market: Market,
    pub outcome: String,
    pub shares: Decimal,
    pub limit_price: Decimal,
    pub trade_group_id: TradeGroupId,
}

impl LimitOrder {
    pub(crate) fn residual(request: &TradeRequest, shares: Decimal) -> Self {
        Self {
            market: request.market.clone(),
            outcome: request.outcome.clone(),
            shares,
            limit_price: request.limit_price,
            trade_group_id: request.trade_group_id.clone(),
        }
    }
}

/// Ask backed by owned shares plus a short-ask for the rest, submitted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskAndShortAsk {
    pub market: Market,
    pub outcome: String,
    pub ask_shares: Decimal,
    pub short_ask_shares: Decimal,
    pub limit_price: Decimal,
    pub trade_group_id: TradeGroupId,
}

/// Lookup key for a trader's owned shares
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionQuery {
    pub market: String,
    pub trader: String,
    pub outcome: String,
}

impl PositionQuery {
    pub fn new(
        market: impl Into<String>,
        trader: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            market: market.into(),
            trader: trader.into(),
            outcome: outcome.into(),
        }
    }
}

/// What was done with the unfilled remainder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResidualAction {
    None,
    Bid { shares: Decimal },
    Ask { shares: Decimal },
    ShortAsk { shares: Decimal },
    AskAndShortAsk {
        ask_shares: Decimal,
        short_ask_shares: Decimal,
    },
    /// The remainder was short sold; carries the short-sell report
    ShortSell { report: Box<FillReport> },
}

impl ResidualAction {
    pub fn is_none(&self) -> bool {
        matches!(self, ResidualAction::None)
    }
}

/// Outcome of the residual submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ResidualStatus {
    NotPlaced,
    Placed,
    Failed(String),
}

/// Success value of every fill operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub kind: FillKind,
    pub market_id: String,
    pub outcome: String,
    pub requested_shares: Decimal,
    pub filled_shares: Decimal,
    pub remaining_shares: Decimal,
    pub residual: ResidualAction,
    pub residual_status: ResidualStatus,
    pub trade_group_id: TradeGroupId,
    pub completed_at: DateTime<Utc>,
}

impl FillReport {
    pub(crate) fn new(
        kind: FillKind,
        request: &TradeRequest,
        filled_shares: Decimal,
        remaining_shares: Decimal,
    ) -> Self {
        Self {
            kind,
            market_id: request.market.id.clone(),
            outcome: request.outcome.clone(),
            requested_shares: request.shares,
            filled_shares,
            remaining_shares,
            residual: ResidualAction::None,
            residual_status: ResidualStatus::NotPlaced,
            trade_group_id: request.trade_group_id.clone(),
            completed_at: Utc::now(),
        }
    }

    /// Whether the request was filled in full by the trade itself
    pub fn is_fully_filled(&self) -> bool {
        self.remaining_shares.is_zero()
    }
}
