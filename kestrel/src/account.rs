use chrono::{DateTime, Utc};
use kestrel_data::{Symbol, Venue};
use kestrel_execution::{
    balance::{AccountId, AccountSnapshot, Position},
    order::Fill,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Account state folded from fills: positions, realised PnL and equity.
/// Readers take cheap copy-on-write style snapshots; the single writer
/// (the engine's fill path) never blocks them for long.
#[derive(Debug)]
pub struct AccountState {
    inner: Arc<RwLock<AccountInner>>,
}

#[derive(Debug, Clone)]
struct AccountInner {
    account: AccountId,
    venue: Venue,
    /// Deposited capital plus realised PnL.
    cash: Decimal,
    positions: BTreeMap<Symbol, Position>,
    marks: BTreeMap<Symbol, Decimal>,
    updated_at: DateTime<Utc>,
}

impl AccountState {
    pub fn new(
        account: AccountId,
        venue: Venue,
        starting_cash: Decimal,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AccountInner {
                account,
                venue,
                cash: starting_cash,
                positions: BTreeMap::new(),
                marks: BTreeMap::new(),
                updated_at: time,
            })),
        }
    }

    /// Fold one fill into the position set and realised cash. Returns the
    /// realised-PnL delta this fill produced.
    pub fn apply_fill(&self, fill: &Fill) -> Decimal {
        let mut inner = self.inner.write();
        let venue = inner.venue;
        let position = inner
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::flat(fill.symbol.clone(), venue, fill.time));
        let realised_before = position.realised_pnl;
        position.apply_fill(fill);
        let realised_delta = position.realised_pnl - realised_before;
        inner.cash += realised_delta;
        inner.marks.insert(fill.symbol.clone(), fill.price);
        inner.updated_at = fill.time;
        realised_delta
    }

    /// Update the mark price for a symbol and re-mark its position.
    pub fn mark(&self, symbol: &Symbol, price: Decimal, time: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.marks.insert(symbol.clone(), price);
        if let Some(position) = inner.positions.get_mut(symbol) {
            position.mark(price, time);
        }
        inner.updated_at = time;
    }

    /// Consistent snapshot for gates and monitors. Equity is cash plus
    /// unrealised PnL; used margin is the gross exposure at marks.
    pub fn snapshot(&self) -> AccountSnapshot {
        let inner = self.inner.read();
        let unrealised: Decimal = inner
            .positions
            .values()
            .map(|position| position.unrealised_pnl)
            .sum();
        let used_margin: Decimal = inner
            .positions
            .values()
            .map(|position| {
                let mark = inner
                    .marks
                    .get(&position.symbol)
                    .copied()
                    .unwrap_or(position.average_entry_price);
                position.notional(mark)
            })
            .sum();
        let equity = inner.cash + unrealised;
        AccountSnapshot::new(
            inner.account.clone(),
            inner.venue,
            equity,
            equity - used_margin,
            used_margin,
            inner.positions.values().cloned().collect(),
            inner.updated_at,
        )
    }

    pub fn position(&self, symbol: &Symbol) -> Option<Position> {
        self.inner.read().positions.get(symbol).cloned()
    }

    /// Sum of unrealised PnL across positions.
    pub fn unrealised_pnl(&self) -> Decimal {
        self.inner
            .read()
            .positions
            .values()
            .map(|position| position.unrealised_pnl)
            .sum()
    }
}
