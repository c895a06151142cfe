use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use rust_decimal::Decimal;

use crate::config::Settings;
use crate::take_order::{
    FillError, FillKind, FillQueue, FillReport, FillResult, Market, OrderFiller, PaperExchange,
    PaperPlacement, TradeRequest,
};

/// One fill to run, as given on the command line
#[derive(Debug, Clone)]
pub struct FillOrder {
    pub kind: FillKind,
    pub market: String,
    pub outcome: String,
    pub shares: Decimal,
    pub price: Decimal,
}

impl FillOrder {
    /// Parse `<kind> <market> <outcome> <shares> <price>`
    pub fn from_args(args: &[String]) -> FillResult<Self> {
        let [kind, market, outcome, shares, price] = args else {
            return Err(FillError::InvalidRequest(format!(
                "expected <buy|sell|short-sell> <market> <outcome> <shares> <price>, got {} args",
                args.len()
            )));
        };

        let kind = match kind.as_str() {
            "buy" => FillKind::Buy,
            "sell" => FillKind::Sell,
            "short-sell" | "short_sell" => FillKind::ShortSell,
            other => {
                return Err(FillError::InvalidRequest(format!("unknown fill kind: {}", other)))
            }
        };
        let decimal = |name: &str, value: &str| {
            value.parse::<Decimal>().map_err(|e| {
                FillError::InvalidRequest(format!("invalid {} '{}': {}", name, value, e))
            })
        };

        Ok(Self {
            kind,
            market: market.clone(),
            outcome: outcome.clone(),
            shares: decimal("shares", shares.as_str())?,
            price: decimal("price", price.as_str())?,
        })
    }
}

/// Result of a paper fill run
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub report: FillReport,
    pub placements: Vec<PaperPlacement>,
}

impl RunOutcome {
    pub fn to_json(&self) -> FillResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs fills against the paper exchange
pub struct FillRunner {
    config: Settings,
}

impl FillRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>) -> FillResult<Self> {
        let config = Settings::new(&config_path.as_ref().to_string_lossy())?;
        Ok(Self { config })
    }

    /// Run one fill and report what happened
    pub async fn run(self, order: FillOrder) -> FillResult<RunOutcome> {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &self.config.log.level);
        }
        env_logger::try_init().ok();

        info!("Starting FillRunner for {}...", self.config.trader.address);

        let exchange = Arc::new(PaperExchange::from_config(
            &self.config.trader.address,
            &self.config.paper,
        ));
        let filler = OrderFiller::new(exchange.clone(), exchange.clone(), exchange.clone());
        let queue = FillQueue::new(filler);

        let engine = &self.config.engine;
        // Buys spend up to shares * price plus the trading fee on it
        let total_cost = Decimal::ONE
            .checked_add(engine.fee_rate)
            .and_then(|fee_factor| order.shares.checked_mul(order.price)?.checked_mul(fee_factor))
            .ok_or_else(|| {
                FillError::InvalidRequest(format!(
                    "{} shares at {} overflows the order value",
                    order.shares, order.price
                ))
            })?;
        let request = TradeRequest::new(
            Market::new(&order.market),
            &order.outcome,
            order.shares,
            order.price,
            &self.config.trader.address,
        )
        .with_total_cost(total_cost)
        .with_fee_rate(engine.fee_rate)
        .do_not_make_orders(engine.do_not_make_orders);

        let report = queue.fill(order.kind, &request).await?;
        if !report.is_fully_filled() && report.residual.is_none() {
            warn!(
                "{} of {} shares left unfilled with no residual order",
                report.remaining_shares, report.requested_shares
            );
        }
        info!(
            "{} fill done: {} of {} shares filled",
            report.kind, report.filled_shares, report.requested_shares
        );

        Ok(RunOutcome {
            report,
            placements: exchange.placements(),
        })
    }
}
