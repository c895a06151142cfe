//! Matchable counter-order lookup
//!
//! A buy matches resting sell orders priced at or below its limit; a sell
//! matches resting buy orders priced at or above it. The trader's own orders
//! never match. Ids come back best price first, ties broken by order id.

use rust_decimal::Decimal;

use super::types::{OrderBooks, OrderSide, RestingOrder};

/// Finds counter-orders a trade could be matched against
pub trait TradeMatcher: Send + Sync {
    /// Sell-side order ids a buy at `limit_price` would take
    fn buy_trade_ids(
        &self,
        market_id: &str,
        outcome: &str,
        limit_price: Decimal,
        books: &OrderBooks,
        address: &str,
    ) -> Vec<String>;

    /// Buy-side order ids a sell at `limit_price` would take
    fn sell_trade_ids(
        &self,
        market_id: &str,
        outcome: &str,
        limit_price: Decimal,
        books: &OrderBooks,
        address: &str,
    ) -> Vec<String>;
}

/// Matcher that reads the order book snapshot directly
#[derive(Debug, Default, Clone, Copy)]
pub struct BookMatcher;

impl TradeMatcher for BookMatcher {
    fn buy_trade_ids(
        &self,
        market_id: &str,
        outcome: &str,
        limit_price: Decimal,
        books: &OrderBooks,
        address: &str,
    ) -> Vec<String> {
        calculate_buy_trade_ids(market_id, outcome, limit_price, books, address)
    }

    fn sell_trade_ids(
        &self,
        market_id: &str,
        outcome: &str,
        limit_price: Decimal,
        books: &OrderBooks,
        address: &str,
    ) -> Vec<String> {
        calculate_sell_trade_ids(market_id, outcome, limit_price, books, address)
    }
}

/// Sell orders a buy can take, cheapest first
pub fn calculate_buy_trade_ids(
    market_id: &str,
    outcome: &str,
    limit_price: Decimal,
    books: &OrderBooks,
    address: &str,
) -> Vec<String> {
    let mut matches = matchable(books, market_id, OrderSide::Sell, outcome, address, |price| {
        price <= limit_price
    });
    matches.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
    matches.into_iter().map(|o| o.id.clone()).collect()
}

/// Buy orders a sell can take, richest first
pub fn calculate_sell_trade_ids(
    market_id: &str,
    outcome: &str,
    limit_price: Decimal,
    books: &OrderBooks,
    address: &str,
) -> Vec<String> {
    let mut matches = matchable(books, market_id, OrderSide::Buy, outcome, address, |price| {
        price >= limit_price
    });
    matches.sort_by(|a, b| b.price.cmp(&a.price).then_with(|| a.id.cmp(&b.id)));
    matches.into_iter().map(|o| o.id.clone()).collect()
}

fn matchable<'a>(
    books: &'a OrderBooks,
    market_id: &str,
    side: OrderSide,
    outcome: &str,
    address: &str,
    crosses: impl Fn(Decimal) -> bool,
) -> Vec<&'a RestingOrder> {
    let Some(book) = books.get(market_id) else {
        return Vec::new();
    };

    book.side(side)
        .values()
        .filter(|o| o.outcome == outcome)
        .filter(|o| !o.owner.eq_ignore_ascii_case(address))
        .filter(|o| o.amount > Decimal::ZERO)
        .filter(|o| crosses(o.price))
        .collect()
}
