use crate::limits::RiskLimits;
use kestrel_execution::balance::AccountSnapshot;
use kestrel_strategy::signal::Signal;
use rust_decimal::Decimal;

/// Final order quantity for an accepted signal.
///
/// Risk-per-trade rule: `qty = equity * risk_per_trade / |entry - stop|`,
/// clamped by the `position_percent` equity fraction and by the
/// concentration cap; a strategy-supplied quantity acts as a further
/// ceiling. Without a stop-loss the risk rule is undefined and only the
/// clamps apply.
pub fn size_signal(
    signal: &Signal,
    account: &AccountSnapshot,
    limits: &RiskLimits,
    entry_price: Decimal,
) -> Decimal {
    if entry_price <= Decimal::ZERO || account.equity <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let position_clamp = limits.position_percent * account.equity / entry_price;
    let concentration_clamp = limits.concentration_max * account.equity / entry_price;

    let risk_quantity = signal.stop_loss_price.and_then(|stop| {
        let stop_distance = (entry_price - stop).abs();
        if stop_distance.is_zero() {
            return None;
        }
        Some(account.equity * limits.risk_per_trade / stop_distance)
    });

    let mut quantity = match risk_quantity {
        Some(risk_quantity) => risk_quantity.min(position_clamp),
        None => position_clamp,
    };
    quantity = quantity.min(concentration_clamp);
    if let Some(requested) = signal.quantity {
        quantity = quantity.min(requested);
    }
    quantity.max(Decimal::ZERO)
}
