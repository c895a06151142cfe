//! Per trader and market serialization of fills
//!
//! [`OrderFiller`] does not keep two fills for the same trader and market
//! apart. `FillQueue` does: fills sharing a key run one after the other,
//! fills with different keys still run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

use super::errors::FillResult;
use super::executor::{OrderGateway, TradeExecutor};
use super::filler::OrderFiller;
use super::types::{FillKind, FillReport, TradeRequest};

/// Queue key: trader address and market id
pub type FillKey = (String, String);

/// Serializes fills per (trader, market)
pub struct FillQueue<E, G> {
    filler: OrderFiller<E, G>,
    slots: Mutex<HashMap<FillKey, Arc<Mutex<()>>>>,
}

impl<E: TradeExecutor, G: OrderGateway> FillQueue<E, G> {
    pub fn new(filler: OrderFiller<E, G>) -> Self {
        Self {
            filler,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Run a fill once every earlier fill with the same key has finished
    pub async fn fill(&self, kind: FillKind, request: &TradeRequest) -> FillResult<FillReport> {
        let key = (request.address.to_lowercase(), request.market.id.clone());
        let slot = self.slots.lock().await.entry(key.clone()).or_default().clone();

        let result = {
            let _turn = slot.lock().await;
            debug!(
                "Running queued {} for {} on {}",
                kind, request.address, request.market.id
            );
            self.filler.fill(kind, request).await
        };

        // Waiters clone the slot under the map lock, so two owners means nobody is queued
        let mut slots = self.slots.lock().await;
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&key);
        }

        result
    }

    pub async fn fill_buy(&self, request: &TradeRequest) -> FillResult<FillReport> {
        self.fill(FillKind::Buy, request).await
    }

    pub async fn fill_sell(&self, request: &TradeRequest) -> FillResult<FillReport> {
        self.fill(FillKind::Sell, request).await
    }

    pub async fn fill_short_sell(&self, request: &TradeRequest) -> FillResult<FillReport> {
        self.fill(FillKind::ShortSell, request).await
    }

    /// Number of keys with a fill running or waiting
    pub async fn key_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::take_order::executor::mock::{
        MockBooks, MockExecutor, MockGateway, RecordingObserver,
    };
    use crate::take_order::types::{Market, TradeExecution};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn filler(observer: Arc<RecordingObserver>) -> OrderFiller<MockExecutor, MockGateway> {
        let executor = MockExecutor::new(Ok(TradeExecution::bought(dec!(10), dec!(0))))
            .with_delay(Duration::from_millis(20));
        OrderFiller::new(
            Arc::new(executor),
            Arc::new(MockGateway::new(Decimal::ZERO)),
            Arc::new(MockBooks::default()),
        )
        .with_observer(observer)
    }

    fn request(address: &str, market: &str) -> TradeRequest {
        TradeRequest::new(Market::new(market), "1", dec!(10), dec!(0.5), address)
    }

    #[tokio::test]
    async fn test_unqueued_fills_overlap() {
        let observer = Arc::new(RecordingObserver::default());
        let filler = filler(observer.clone());
        let (a, b) = (request("0x1", "0xa1"), request("0x1", "0xa1"));

        let (ra, rb) = tokio::join!(filler.fill_buy(&a), filler.fill_buy(&b));

        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(observer.lock_signals(), vec![true, true, false, false]);
    }

    #[tokio::test]
    async fn test_same_key_fills_run_in_turn() {
        let observer = Arc::new(RecordingObserver::default());
        let queue = FillQueue::new(filler(observer.clone()));
        let (a, b) = (request("0x1", "0xa1"), request("0X1", "0xa1"));

        let (ra, rb) = tokio::join!(queue.fill_buy(&a), queue.fill_buy(&b));

        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(observer.lock_signals(), vec![true, false, true, false]);
        assert_eq!(queue.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_different_markets_run_concurrently() {
        let observer = Arc::new(RecordingObserver::default());
        let queue = FillQueue::new(filler(observer.clone()));
        let (a, b) = (request("0x1", "0xa1"), request("0x1", "0xa2"));

        let (ra, rb) = tokio::join!(queue.fill_buy(&a), queue.fill_buy(&b));

        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(observer.lock_signals(), vec![true, true, false, false]);
        assert_eq!(queue.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_finished_keys_are_dropped() {
        let observer = Arc::new(RecordingObserver::default());
        let queue = FillQueue::new(filler(observer.clone()));

        for i in 0..100 {
            let request = request("0x1", &format!("0xa{}", i));
            queue.fill_buy(&request).await.unwrap();
        }

        assert_eq!(queue.key_count().await, 0);
        assert_eq!(observer.lock_signals().len(), 200);
    }

    #[tokio::test]
    async fn test_waiting_fill_keeps_its_key() {
        let observer = Arc::new(RecordingObserver::default());
        let queue = FillQueue::new(filler(observer.clone()));
        let (a, b) = (request("0x1", "0xa1"), request("0x1", "0xa1"));

        let check = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            queue.key_count().await
        };
        let (ra, rb, in_flight) = tokio::join!(queue.fill_buy(&a), queue.fill_buy(&b), check);

        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(in_flight, 1);
        assert_eq!(queue.key_count().await, 0);
    }
}
