use crate::order::Fill;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display, From};
use kestrel_data::{Side, Symbol, Venue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Trading account identifier.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct AccountId(pub SmolStr);

impl AccountId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }
}

/// Net position per (account, venue, symbol), folded from terminal fills.
/// Positive quantity is long, negative is short.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub venue: Venue,
    pub quantity: Decimal,
    pub average_entry_price: Decimal,
    pub realised_pnl: Decimal,
    pub unrealised_pnl: Decimal,
    pub margin_used: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn flat(symbol: Symbol, venue: Venue, time: DateTime<Utc>) -> Self {
        Self {
            symbol,
            venue,
            quantity: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            realised_pnl: Decimal::ZERO,
            unrealised_pnl: Decimal::ZERO,
            margin_used: Decimal::ZERO,
            liquidation_price: None,
            updated_at: time,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        if self.quantity > Decimal::ZERO {
            Some(Side::Buy)
        } else if self.quantity < Decimal::ZERO {
            Some(Side::Sell)
        } else {
            None
        }
    }

    /// Fold one fill in. Fills in the position's direction extend it at a
    /// blended entry price; opposite fills realise PnL against the average
    /// entry and may flip the position through flat.
    pub fn apply_fill(&mut self, fill: &Fill) {
        let signed_fill = match fill.side {
            Side::Buy => fill.quantity,
            Side::Sell => -fill.quantity,
        };
        self.realised_pnl -= fill.fee;

        let same_direction =
            self.quantity.is_zero() || (self.quantity.is_sign_positive() == signed_fill.is_sign_positive());

        if same_direction {
            let notional_before = self.average_entry_price * self.quantity.abs();
            let quantity_after = self.quantity + signed_fill;
            self.average_entry_price = if quantity_after.is_zero() {
                Decimal::ZERO
            } else {
                (notional_before + fill.price * fill.quantity) / quantity_after.abs()
            };
            self.quantity = quantity_after;
        } else {
            let closing = fill.quantity.min(self.quantity.abs());
            let direction = if self.quantity.is_sign_positive() {
                Decimal::ONE
            } else {
                Decimal::NEGATIVE_ONE
            };
            self.realised_pnl += (fill.price - self.average_entry_price) * closing * direction;

            let remainder = fill.quantity - closing;
            self.quantity += signed_fill;
            if self.quantity.is_zero() {
                self.average_entry_price = Decimal::ZERO;
            } else if !remainder.is_zero() {
                // Flipped through flat: the remainder opens at the fill price.
                self.average_entry_price = fill.price;
            }
        }
        self.updated_at = fill.time;
    }

    /// Recompute unrealised PnL from a mark price.
    pub fn mark(&mut self, price: Decimal, time: DateTime<Utc>) {
        self.unrealised_pnl = (price - self.average_entry_price) * self.quantity;
        self.updated_at = time;
    }

    /// Absolute notional at a mark price.
    pub fn notional(&self, price: Decimal) -> Decimal {
        self.quantity.abs() * price
    }
}

/// Point-in-time account state: equity, margins, open positions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct AccountSnapshot {
    pub account: AccountId,
    pub venue: Venue,
    pub equity: Decimal,
    pub free_margin: Decimal,
    pub used_margin: Decimal,
    pub positions: Vec<Position>,
    pub time: DateTime<Utc>,
}

impl AccountSnapshot {
    /// Free margin over equity; lower is more at risk.
    pub fn margin_rate(&self) -> Decimal {
        if self.equity.is_zero() {
            Decimal::ZERO
        } else {
            self.free_margin / self.equity
        }
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.iter().find(|p| &p.symbol == symbol)
    }

    /// Total absolute exposure across positions at their entry marks.
    pub fn gross_exposure(&self) -> Decimal {
        self.positions
            .iter()
            .map(|p| p.quantity.abs() * p.average_entry_price)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderId;
    use rust_decimal_macros::dec;

    fn fill(side: Side, quantity: Decimal, price: Decimal) -> Fill {
        Fill::new(
            OrderId::new("o-1"),
            Symbol::new("BTC/USDT"),
            side,
            price,
            quantity,
            dec!(0),
            DateTime::from_timestamp(10, 0).unwrap(),
        )
    }

    #[test]
    fn extend_blends_entry_price() {
        let mut position = Position::flat(
            Symbol::new("BTC/USDT"),
            Venue::Mock,
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        position.apply_fill(&fill(Side::Buy, dec!(1), dec!(100)));
        position.apply_fill(&fill(Side::Buy, dec!(1), dec!(110)));
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.average_entry_price, dec!(105));
    }

    #[test]
    fn close_realises_pnl() {
        let mut position = Position::flat(
            Symbol::new("BTC/USDT"),
            Venue::Mock,
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        position.apply_fill(&fill(Side::Buy, dec!(2), dec!(100)));
        position.apply_fill(&fill(Side::Sell, dec!(2), dec!(110)));
        assert!(position.is_flat());
        assert_eq!(position.realised_pnl, dec!(20));
        assert_eq!(position.average_entry_price, dec!(0));
    }

    #[test]
    fn flip_through_flat_reopens_at_fill_price() {
        let mut position = Position::flat(
            Symbol::new("BTC/USDT"),
            Venue::Mock,
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        position.apply_fill(&fill(Side::Buy, dec!(1), dec!(100)));
        position.apply_fill(&fill(Side::Sell, dec!(3), dec!(90)));
        assert_eq!(position.quantity, dec!(-2));
        assert_eq!(position.average_entry_price, dec!(90));
        assert_eq!(position.realised_pnl, dec!(-10));
        assert_eq!(position.side(), Some(Side::Sell));
    }

    #[test]
    fn short_mark_to_market() {
        let mut position = Position::flat(
            Symbol::new("BTC/USDT"),
            Venue::Mock,
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        position.apply_fill(&fill(Side::Sell, dec!(2), dec!(100)));
        position.mark(dec!(90), DateTime::from_timestamp(20, 0).unwrap());
        assert_eq!(position.unrealised_pnl, dec!(20));
    }
}
