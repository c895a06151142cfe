//! Order fulfillment: take what the book offers, then decide what to do
//! with the remainder.

use std::sync::Arc;

use log::{debug, info, warn};
use rust_decimal::Decimal;

use super::errors::FillResult;
use super::executor::{OrderBookSource, OrderGateway, TradeContext, TradeExecutor};
use super::lock::{CommitLock, FillObserver, NoOpObserver};
use super::matching::{BookMatcher, TradeMatcher};
use super::types::{
    AskAndShortAsk, FillKind, FillReport, LimitOrder, OrderSide, PositionQuery, ResidualAction,
    ResidualStatus, TradeParams, TradeRequest,
};

/// Executes buys, sells and short sells against the book and places
/// residual orders for whatever is left.
///
/// Every top-level fill signals the commit lock exactly twice, `true` then
/// `false`, on success and on error alike.
pub struct OrderFiller<E, G> {
    executor: Arc<E>,
    gateway: Arc<G>,
    books: Arc<dyn OrderBookSource>,
    matcher: Arc<dyn TradeMatcher>,
    observer: Arc<dyn FillObserver>,
}

impl<E: TradeExecutor, G: OrderGateway> OrderFiller<E, G> {
    /// Create a filler using the default book matcher and no observer
    pub fn new(executor: Arc<E>, gateway: Arc<G>, books: Arc<dyn OrderBookSource>) -> Self {
        Self {
            executor,
            gateway,
            books,
            matcher: Arc::new(BookMatcher),
            observer: Arc::new(NoOpObserver),
        }
    }

    /// Builder: replace the counter-order matcher
    pub fn with_matcher(mut self, matcher: Arc<dyn TradeMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Builder: receive lock transitions and trade commitments
    pub fn with_observer(mut self, observer: Arc<dyn FillObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Dispatch to the fill operation for `kind`
    pub async fn fill(&self, kind: FillKind, request: &TradeRequest) -> FillResult<FillReport> {
        match kind {
            FillKind::Buy => self.fill_buy(request).await,
            FillKind::Sell => self.fill_sell(request).await,
            FillKind::ShortSell => self.fill_short_sell(request).await,
        }
    }

    /// Buy against the sell side, then bid for the remainder
    pub async fn fill_buy(&self, request: &TradeRequest) -> FillResult<FillReport> {
        let lock = CommitLock::acquire(self.observer.as_ref());
        request.validate()?;

        info!(
            "Filling buy of {} shares of {}/{} at {} (group {})",
            request.shares,
            request.market.id,
            request.outcome,
            request.limit_price,
            request.trade_group_id
        );

        // Buys are costed in value; the executor sizes the fill itself
        let params = trade_params(request, Decimal::ZERO, request.total_cost);
        let ctx = self.context(request, OrderSide::Buy);
        let execution = self
            .executor
            .execute_trade(&params, &ctx)
            .await
            .inspect_err(|e| warn!("Buy execution failed for {}: {}", request.market.id, e))?;

        let filled = bounded(execution.filled_shares, request.shares, "filled");
        let remaining = request.shares - filled;
        debug!(
            "Buy filled {} shares, {} remaining, {} value unspent",
            filled, remaining, execution.remaining_value
        );

        let mut report = FillReport::new(FillKind::Buy, request, filled, remaining);
        if remaining > Decimal::ZERO && !request.do_not_make_orders {
            let order = LimitOrder::residual(request, remaining);
            report.residual = ResidualAction::Bid { shares: remaining };
            report.residual_status = residual_status("bid", self.gateway.place_bid(&order).await);
        }

        lock.release();
        Ok(report)
    }

    /// Sell against the buy side, then ask, short-ask or short sell the remainder
    pub async fn fill_sell(&self, request: &TradeRequest) -> FillResult<FillReport> {
        let lock = CommitLock::acquire(self.observer.as_ref());
        request.validate()?;

        info!(
            "Filling sell of {} shares of {}/{} at {} (group {})",
            request.shares,
            request.market.id,
            request.outcome,
            request.limit_price,
            request.trade_group_id
        );

        // Sells are costed in shares
        let params = trade_params(request, request.shares, Decimal::ZERO);
        let ctx = self.context(request, OrderSide::Sell);
        let execution = self
            .executor
            .execute_trade(&params, &ctx)
            .await
            .inspect_err(|e| warn!("Sell execution failed for {}: {}", request.market.id, e))?;

        let remaining = bounded(execution.remaining_shares, request.shares, "remaining");
        let filled = request.shares - remaining;
        let mut report = FillReport::new(FillKind::Sell, request, filled, remaining);

        if remaining.is_zero() {
            debug!("Sell filled completely");
            lock.release();
            return Ok(report);
        }

        let query = PositionQuery::new(&request.market.id, &request.address, &request.outcome);
        let owned = self
            .gateway
            .participant_shares_purchased(&query)
            .await
            .inspect_err(|e| warn!("Position lookup failed for {}: {}", request.address, e))?;
        debug!("Sell left {} shares, trader owns {}", remaining, owned);

        let (residual, status) = self.sell_remainder(request, remaining, owned).await?;
        report.residual = residual;
        report.residual_status = status;

        lock.release();
        Ok(report)
    }

    /// Short sell against the buy side, then short-ask the remainder
    pub async fn fill_short_sell(&self, request: &TradeRequest) -> FillResult<FillReport> {
        let lock = CommitLock::acquire(self.observer.as_ref());
        request.validate()?;

        info!(
            "Filling short sell of {} shares of {}/{} at {} (group {})",
            request.shares,
            request.market.id,
            request.outcome,
            request.limit_price,
            request.trade_group_id
        );

        let report = self.short_sell_cycle(request).await?;

        lock.release();
        Ok(report)
    }

    async fn sell_remainder(
        &self,
        request: &TradeRequest,
        remaining: Decimal,
        owned: Decimal,
    ) -> FillResult<(ResidualAction, ResidualStatus)> {
        if owned >= remaining {
            if request.do_not_make_orders {
                return Ok((ResidualAction::None, ResidualStatus::NotPlaced));
            }
            let order = LimitOrder::residual(request, remaining);
            let status = residual_status("ask", self.gateway.place_ask(&order).await);
            return Ok((ResidualAction::Ask { shares: remaining }, status));
        }

        if owned <= Decimal::ZERO {
            // Nothing owned: short sell if the book has takers, otherwise rest a short-ask
            let books = self.books.order_books();
            let trade_ids = self.matcher.sell_trade_ids(
                &request.market.id,
                &request.outcome,
                request.limit_price,
                &books,
                &request.address,
            );

            if !trade_ids.is_empty() {
                info!(
                    "{} matchable buy orders for remaining {} shares, short selling",
                    trade_ids.len(),
                    remaining
                );
                let mut short_request = request.clone();
                short_request.shares = remaining;
                let report = self.short_sell_cycle(&short_request).await?;
                return Ok((
                    ResidualAction::ShortSell {
                        report: Box::new(report),
                    },
                    ResidualStatus::Placed,
                ));
            }

            if request.do_not_make_orders {
                return Ok((ResidualAction::None, ResidualStatus::NotPlaced));
            }
            let order = LimitOrder::residual(request, remaining);
            let status = residual_status("short-ask", self.gateway.place_short_ask(&order).await);
            return Ok((ResidualAction::ShortAsk { shares: remaining }, status));
        }

        if request.do_not_make_orders {
            return Ok((ResidualAction::None, ResidualStatus::NotPlaced));
        }

        // Partially covered: ask what we own, short-ask the rest, in one submission
        let short_ask_shares = remaining - owned;
        let order = AskAndShortAsk {
            market: request.market.clone(),
            outcome: request.outcome.clone(),
            ask_shares: owned,
            short_ask_shares,
            limit_price: request.limit_price,
            trade_group_id: request.trade_group_id.clone(),
        };
        let status = residual_status(
            "ask and short-ask",
            self.gateway.place_ask_and_short_ask(&order).await,
        );
        Ok((
            ResidualAction::AskAndShortAsk {
                ask_shares: owned,
                short_ask_shares,
            },
            status,
        ))
    }

    /// Execute a short sell and short-ask the remainder, without lock signals
    async fn short_sell_cycle(&self, request: &TradeRequest) -> FillResult<FillReport> {
        let params = trade_params(request, request.shares, Decimal::ZERO);
        let ctx = self.context(request, OrderSide::Sell);
        let execution = self
            .executor
            .execute_short_sell(&params, &ctx)
            .await
            .inspect_err(|e| {
                warn!("Short sell execution failed for {}: {}", request.market.id, e)
            })?;

        let remaining = bounded(execution.remaining_shares, request.shares, "remaining");
        let filled = request.shares - remaining;
        debug!("Short sell filled {} shares, {} remaining", filled, remaining);

        let mut report = FillReport::new(FillKind::ShortSell, request, filled, remaining);
        if remaining > Decimal::ZERO && !request.do_not_make_orders {
            let order = LimitOrder::residual(request, remaining);
            report.residual = ResidualAction::ShortAsk { shares: remaining };
            report.residual_status =
                residual_status("short-ask", self.gateway.place_short_ask(&order).await);
        }

        Ok(report)
    }

    fn context<'a>(&'a self, request: &'a TradeRequest, side: OrderSide) -> TradeContext<'a> {
        TradeContext::new(
            &request.market.id,
            &request.outcome,
            request.limit_price,
            &request.address,
            side,
            self.books.as_ref(),
            self.matcher.as_ref(),
            self.observer.as_ref(),
        )
    }
}

fn trade_params(request: &TradeRequest, shares: Decimal, value_with_fee: Decimal) -> TradeParams {
    TradeParams {
        market_id: request.market.id.clone(),
        outcome: request.outcome.clone(),
        shares,
        value_with_fee,
        fee_rate: request.fee_rate,
        trade_group_id: request.trade_group_id.clone(),
        address: request.address.clone(),
    }
}

/// Keep an executor-reported share count within [0, requested]
fn bounded(value: Decimal, requested: Decimal, what: &str) -> Decimal {
    let clamped = value.clamp(Decimal::ZERO, requested);
    if clamped != value {
        warn!(
            "Executor reported {} {} shares for a {} share request, using {}",
            value, what, requested, clamped
        );
    }
    clamped
}

/// Residual placement failures are logged and recorded, never returned
fn residual_status(kind: &str, result: FillResult<()>) -> ResidualStatus {
    match result {
        Ok(()) => {
            debug!("Placed residual {}", kind);
            ResidualStatus::Placed
        }
        Err(e) => {
            warn!("Residual {} placement failed: {}", kind, e);
            ResidualStatus::Failed(e.to_string())
        }
    }
}
