//! FIFO Lot Matcher
//!
//! Matches a sell against the open lots of one ticker, oldest purchase first.
//! The input lots are never modified: the result carries the consumed slices
//! and a fresh residual lot set.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TaxError, TaxResult};
use crate::lot::{lot_totals, HoldingPeriod, Lot, SellRequest, TaxRules};

/// Part of a lot consumed by a sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedLot {
    /// The lot as it was before the sell
    pub lot: Lot,
    /// Shares taken from the lot
    pub quantity: u64,
    pub holding_days: i64,
    pub holding_period: HoldingPeriod,
}

impl ConsumedLot {
    /// Cost basis of the shares taken
    pub fn cost_basis(&self) -> TaxResult<Decimal> {
        self.lot.with_quantity(self.quantity).cost_basis()
    }

    pub fn is_full(&self) -> bool {
        self.quantity == self.lot.quantity
    }
}

/// Outcome of a FIFO match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotMatch {
    pub ticker: String,
    pub sell_date: NaiveDate,
    /// Consumed lots in buy-date order
    pub consumed: Vec<ConsumedLot>,
    /// Open lots after the sell, in buy-date order
    pub remaining: Vec<Lot>,
}

impl LotMatch {
    pub fn quantity_sold(&self) -> u64 {
        self.consumed.iter().map(|c| c.quantity).sum()
    }

    pub fn remaining_quantity(&self) -> u64 {
        self.remaining.iter().map(|l| l.quantity).sum()
    }

    /// Cost basis of everything sold
    pub fn cost_basis(&self) -> TaxResult<Decimal> {
        let sold: Vec<Lot> = self
            .consumed
            .iter()
            .map(|c| c.lot.with_quantity(c.quantity))
            .collect();
        let (_, cost) = lot_totals(&sold)?;
        Ok(cost)
    }
}

/// Match a sell request against the open lots of its ticker (FIFO).
///
/// Fails with [`TaxError::InsufficientHoldings`] when the request exceeds the
/// open quantity. Lots are ordered by buy date before matching; lots sharing
/// a buy date keep their input order.
pub fn match_sell(lots: &[Lot], request: &SellRequest, rules: &TaxRules) -> TaxResult<LotMatch> {
    request.validate()?;

    for lot in lots {
        lot.validate()?;
        if lot.ticker != request.ticker {
            return Err(TaxError::InvalidLot(format!(
                "{} lot passed to a {} sell",
                lot.ticker, request.ticker
            )));
        }
    }

    let (held, _) = lot_totals(lots)?;
    if request.quantity > held {
        return Err(TaxError::InsufficientHoldings {
            ticker: request.ticker.clone(),
            requested: request.quantity,
            held,
        });
    }

    let mut ordered: Vec<&Lot> = lots.iter().collect();
    ordered.sort_by_key(|lot| lot.buy_date);

    let mut unfilled = request.quantity;
    let mut consumed = Vec::new();
    let mut remaining = Vec::new();

    for lot in ordered {
        if unfilled == 0 {
            remaining.push(lot.clone());
            continue;
        }

        let holding_days = (request.sell_date - lot.buy_date).num_days();
        if holding_days < 0 {
            return Err(TaxError::InvalidSell(format!(
                "sell of {} on {} precedes purchase on {}",
                request.ticker, request.sell_date, lot.buy_date
            )));
        }

        let take = unfilled.min(lot.quantity);
        consumed.push(ConsumedLot {
            lot: lot.clone(),
            quantity: take,
            holding_days,
            holding_period: rules.classify(holding_days),
        });

        if take < lot.quantity {
            // Partial close: a new record holds what is left
            remaining.push(lot.with_quantity(lot.quantity - take));
        }
        unfilled -= take;
    }

    debug!(
        ticker = %request.ticker,
        sold = request.quantity,
        lots_touched = consumed.len(),
        lots_left = remaining.len(),
        "matched sell FIFO"
    );

    Ok(LotMatch {
        ticker: request.ticker.clone(),
        sell_date: request.sell_date,
        consumed,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(n - 1)
    }

    fn three_lots() -> Vec<Lot> {
        vec![
            Lot::new("AAPL", 10, dec!(100), day(1)).unwrap(),
            Lot::new("AAPL", 5, dec!(110), day(2)).unwrap(),
            Lot::new("AAPL", 5, dec!(120), day(3)).unwrap(),
        ]
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let lots = three_lots();
        let request = SellRequest::new("AAPL", 12, day(10), dec!(130)).unwrap();
        let matched = match_sell(&lots, &request, &TaxRules::default()).unwrap();

        assert_eq!(matched.consumed.len(), 2);
        assert_eq!(matched.consumed[0].lot, lots[0]);
        assert_eq!(matched.consumed[0].quantity, 10);
        assert!(matched.consumed[0].is_full());
        assert_eq!(matched.consumed[1].lot, lots[1]);
        assert_eq!(matched.consumed[1].quantity, 2);
        assert!(!matched.consumed[1].is_full());

        assert_eq!(matched.remaining.len(), 2);
        assert_eq!(matched.remaining[0].quantity, 3);
        assert_eq!(matched.remaining[0].buy_date, day(2));
        assert_eq!(matched.remaining[0].buy_price, dec!(110));
        assert_eq!(matched.remaining[1], lots[2]);

        assert_eq!(matched.quantity_sold(), 12);
        assert_eq!(matched.remaining_quantity(), 8);
        assert_eq!(matched.cost_basis().unwrap(), dec!(1220));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut lots = three_lots();
        lots.reverse();
        let request = SellRequest::new("AAPL", 12, day(10), dec!(130)).unwrap();
        let matched = match_sell(&lots, &request, &TaxRules::default()).unwrap();

        assert_eq!(matched.consumed[0].lot.buy_date, day(1));
        assert_eq!(matched.consumed[1].lot.buy_date, day(2));
        assert_eq!(matched.remaining[0].quantity, 3);
        assert_eq!(matched.remaining[1].buy_date, day(3));
    }

    #[test]
    fn test_insufficient_holdings() {
        let lots = three_lots();
        let before = lots.clone();
        let request = SellRequest::new("AAPL", 21, day(10), dec!(130)).unwrap();

        let err = match_sell(&lots, &request, &TaxRules::default()).unwrap_err();
        assert_eq!(
            err,
            TaxError::InsufficientHoldings {
                ticker: "AAPL".to_string(),
                requested: 21,
                held: 20,
            }
        );
        assert_eq!(lots, before);
    }

    #[test]
    fn test_open_quantity_out_of_range() {
        let lots = vec![
            Lot::new("X", u64::MAX, dec!(1), day(1)).unwrap(),
            Lot::new("X", 2, dec!(1), day(2)).unwrap(),
        ];
        let request = SellRequest::new("X", 5, day(10), dec!(1)).unwrap();
        assert!(matches!(
            match_sell(&lots, &request, &TaxRules::default()),
            Err(TaxError::InvalidLot(_))
        ));
    }

    #[test]
    fn test_selling_everything_leaves_no_lots() {
        let lots = three_lots();
        let request = SellRequest::new("AAPL", 20, day(10), dec!(90)).unwrap();
        let matched = match_sell(&lots, &request, &TaxRules::default()).unwrap();
        assert_eq!(matched.consumed.len(), 3);
        assert!(matched.remaining.is_empty());
    }

    #[test]
    fn test_classification_uses_threshold() {
        let sell_date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let lots = vec![
            Lot::new("MSFT", 1, dec!(50), sell_date - Duration::days(730)).unwrap(),
            Lot::new("MSFT", 1, dec!(50), sell_date - Duration::days(729)).unwrap(),
        ];
        let request = SellRequest::new("MSFT", 2, sell_date, dec!(60)).unwrap();
        let matched = match_sell(&lots, &request, &TaxRules::default()).unwrap();

        assert_eq!(matched.consumed[0].holding_days, 730);
        assert_eq!(matched.consumed[0].holding_period, HoldingPeriod::LongTerm);
        assert_eq!(matched.consumed[1].holding_days, 729);
        assert_eq!(matched.consumed[1].holding_period, HoldingPeriod::ShortTerm);

        let matched = match_sell(&lots, &request, &TaxRules::one_year()).unwrap();
        assert!(matched
            .consumed
            .iter()
            .all(|c| c.holding_period == HoldingPeriod::LongTerm));
    }

    #[test]
    fn test_rejects_foreign_lots_and_backdated_sells() {
        let mut lots = three_lots();
        lots.push(Lot::new("MSFT", 1, dec!(10), day(1)).unwrap());
        let request = SellRequest::new("AAPL", 1, day(10), dec!(130)).unwrap();
        assert!(matches!(
            match_sell(&lots, &request, &TaxRules::default()),
            Err(TaxError::InvalidLot(_))
        ));

        let lots = three_lots();
        let backdated = SellRequest::new("AAPL", 1, day(1) - Duration::days(1), dec!(130)).unwrap();
        assert!(matches!(
            match_sell(&lots, &backdated, &TaxRules::default()),
            Err(TaxError::InvalidSell(_))
        ));
    }

    #[test]
    fn test_zero_quantity_lot_is_an_error() {
        let mut lots = three_lots();
        lots[1].quantity = 0;
        let request = SellRequest::new("AAPL", 1, day(10), dec!(130)).unwrap();
        assert!(matches!(
            match_sell(&lots, &request, &TaxRules::default()),
            Err(TaxError::InvalidLot(_))
        ));
    }
}
