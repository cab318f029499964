use crate::{
    error::ExecutionError,
    order::{Fill, Order, OrderId, OrderStatus},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use kestrel_data::Symbol;
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};

/// Working-order map sharded by symbol hash so executor workers owning
/// disjoint symbol sets never contend on the same lock.
#[derive(Debug)]
pub struct OrderTracker {
    shards: Vec<Mutex<FnvHashMap<OrderId, Order>>>,
}

impl OrderTracker {
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards)
                .map(|_| Mutex::new(FnvHashMap::default()))
                .collect(),
        }
    }

    fn shard(&self, symbol: &Symbol) -> &Mutex<FnvHashMap<OrderId, Order>> {
        let mut hasher = fnv::FnvHasher::default();
        symbol.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Track a newly acknowledged order.
    pub fn insert(&self, order: Order) {
        self.shard(&order.symbol).lock().insert(order.id.clone(), order);
    }

    /// Fold a fill into its order. Terminal orders are removed from the map
    /// and returned so post-trade bookkeeping can run.
    pub fn apply_fill(&self, fill: &Fill) -> Result<Order, ExecutionError> {
        let shard = self.shard(&fill.symbol);
        let mut orders = shard.lock();
        let order = orders
            .get_mut(&fill.order_id)
            .ok_or_else(|| ExecutionError::UnknownOrder(fill.order_id.clone()))?;
        order.apply_fill(fill)?;
        let updated = order.clone();
        if updated.status.is_terminal() {
            orders.remove(&fill.order_id);
        }
        Ok(updated)
    }

    /// Cancel one order; removed from the map and returned.
    pub fn cancel(
        &self,
        symbol: &Symbol,
        id: &OrderId,
        time: DateTime<Utc>,
    ) -> Result<Order, ExecutionError> {
        let shard = self.shard(symbol);
        let mut orders = shard.lock();
        let mut order = orders
            .remove(id)
            .ok_or_else(|| ExecutionError::UnknownOrder(id.clone()))?;
        order.cancel(time)?;
        Ok(order)
    }

    /// Mark one order venue-rejected; removed from the map and returned.
    pub fn reject(
        &self,
        symbol: &Symbol,
        id: &OrderId,
        time: DateTime<Utc>,
    ) -> Result<Order, ExecutionError> {
        let shard = self.shard(symbol);
        let mut orders = shard.lock();
        let mut order = orders
            .remove(id)
            .ok_or_else(|| ExecutionError::UnknownOrder(id.clone()))?;
        order.reject(time)?;
        Ok(order)
    }

    /// Snapshot of working orders, optionally scoped to one symbol.
    pub fn working(&self, symbol: Option<&Symbol>) -> Vec<Order> {
        let mut result = Vec::new();
        for shard in &self.shards {
            for order in shard.lock().values() {
                if symbol.is_none_or(|symbol| &order.symbol == symbol)
                    && !order.status.is_terminal()
                {
                    result.push(order.clone());
                }
            }
        }
        result
    }

    /// Drain every working order (optionally per symbol) as cancelled,
    /// returning them for event publication.
    pub fn drain_cancelled(&self, symbol: Option<&Symbol>, time: DateTime<Utc>) -> Vec<Order> {
        let mut result = Vec::new();
        for shard in &self.shards {
            let mut orders = shard.lock();
            let ids: Vec<OrderId> = orders
                .values()
                .filter(|order| symbol.is_none_or(|symbol| &order.symbol == symbol))
                .map(|order| order.id.clone())
                .collect();
            for id in ids {
                if let Some(mut order) = orders.remove(&id) {
                    if order.cancel(time).is_ok() {
                        result.push(order);
                    }
                }
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of working orders with the given status.
    pub fn count_status(&self, status: OrderStatus) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .values()
                    .filter(|order| order.status == status)
                    .count()
            })
            .sum()
    }
}

impl Default for OrderTracker {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{ClientOrderId, OrderKind, SignalId, StrategyId};
    use kestrel_data::{Side, Venue};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn order(id: &str, symbol: &str, quantity: Decimal) -> Order {
        Order::new(
            OrderId::new(id),
            ClientOrderId::new(id),
            Symbol::new(symbol),
            Venue::Mock,
            Side::Buy,
            OrderKind::Market,
            None,
            quantity,
            StrategyId::new("test"),
            SignalId::new("s-1"),
            DateTime::from_timestamp(0, 0).unwrap(),
        )
        .unwrap()
    }

    fn fill(order_id: &str, symbol: &str, quantity: Decimal) -> Fill {
        Fill::new(
            OrderId::new(order_id),
            Symbol::new(symbol),
            Side::Buy,
            dec!(100),
            quantity,
            dec!(0),
            DateTime::from_timestamp(5, 0).unwrap(),
        )
    }

    #[test]
    fn partial_fill_keeps_order_working() {
        let tracker = OrderTracker::default();
        tracker.insert(order("o-1", "BTC/USDT", dec!(2)));

        let updated = tracker.apply_fill(&fill("o-1", "BTC/USDT", dec!(1))).unwrap();
        assert_eq!(updated.status, OrderStatus::PartiallyFilled);
        assert_eq!(tracker.len(), 1);

        let updated = tracker.apply_fill(&fill("o-1", "BTC/USDT", dec!(1))).unwrap();
        assert_eq!(updated.status, OrderStatus::Filled);
        assert!(tracker.is_empty());
    }

    #[test]
    fn drain_cancelled_scopes_by_symbol() {
        let tracker = OrderTracker::default();
        tracker.insert(order("o-1", "BTC/USDT", dec!(1)));
        tracker.insert(order("o-2", "ETH/USDT", dec!(1)));

        let cancelled = tracker.drain_cancelled(
            Some(&Symbol::new("BTC/USDT")),
            DateTime::from_timestamp(9, 0).unwrap(),
        );
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].status, OrderStatus::Cancelled);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn unknown_fill_is_an_error() {
        let tracker = OrderTracker::default();
        assert!(matches!(
            tracker.apply_fill(&fill("nope", "BTC/USDT", dec!(1))),
            Err(ExecutionError::UnknownOrder(_))
        ));
    }
}
