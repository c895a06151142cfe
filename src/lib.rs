#![deny(unreachable_pub)]
pub mod config;
pub mod runner;
pub mod take_order;

pub use runner::{FillOrder, FillRunner, RunOutcome};
pub use take_order::{
    FillError, FillKind, FillQueue, FillReport, FillResult, OrderFiller, PaperExchange,
    TradeRequest,
};
