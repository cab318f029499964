use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use kestrel_data::{Symbol, bar::{Bar, Timeframe}, books::OrderBook, ticker::Ticker};
use kestrel_execution::{
    balance::AccountSnapshot,
    error::ExecutionError,
    order::{Order, OrderId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market metadata needed before trading a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct MarketInfo {
    pub symbol: Symbol,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub min_quantity: Decimal,
    pub min_notional: Decimal,
}

/// Periodic funding payment snapshot for a perpetual symbol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct FundingRate {
    pub symbol: Symbol,
    pub rate: Decimal,
    pub time: DateTime<Utc>,
}

/// Outstanding contracts for a derivatives symbol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct OpenInterest {
    pub symbol: Symbol,
    pub value: Decimal,
    pub time: DateTime<Utc>,
}

/// Exchange connector interface, one implementation per venue. The core
/// ships no live connectors; they plug in from outside. Rate-limit tokens
/// are exposed so the executor can pace submissions.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn load_markets(&self) -> Result<Vec<MarketInfo>, ExecutionError>;

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExecutionError>;

    async fn fetch_orderbook(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBook, ExecutionError>;

    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Bar>, ExecutionError>;

    async fn fetch_funding_rate_history(
        &self,
        symbol: &Symbol,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FundingRate>, ExecutionError>;

    async fn fetch_open_interest_history(
        &self,
        symbol: &Symbol,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<OpenInterest>, ExecutionError>;

    async fn fetch_balance(&self) -> Result<AccountSnapshot, ExecutionError>;

    async fn create_order(&self, order: Order) -> Result<Order, ExecutionError>;

    async fn cancel_order(&self, id: &OrderId) -> Result<(), ExecutionError>;

    /// Remaining request tokens before the venue rate limit bites.
    fn rate_limit_tokens(&self) -> u32;
}
