//! Tax Calculator
//!
//! Per-lot gain and tax estimates, bucketed into short-term and long-term.
//! Works on realized sells (a [`LotMatch`] and its sell price) or on open
//! lots valued at a current price.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{TaxError, TaxResult};
use crate::lot::{checked_value, HoldingPeriod, Lot, TaxRules};
use crate::lot_matcher::LotMatch;

/// Tax detail for a single lot (or the consumed part of one)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotTaxDetail {
    pub ticker: String,
    pub buy_date: NaiveDate,
    pub quantity: u64,
    pub buy_price: Decimal,
    /// Sell price, or current price for an unrealized estimate
    pub exit_price: Decimal,
    pub cost_basis: Decimal,
    pub exit_value: Decimal,
    /// Not clamped: losses stay negative
    pub gain: Decimal,
    pub holding_days: i64,
    pub holding_period: HoldingPeriod,
    pub tax_rate: Decimal,
    /// Zero unless the gain is positive
    pub tax: Decimal,
}

/// Aggregate estimate over a set of lots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxEstimate {
    pub lots: Vec<LotTaxDetail>,
    /// Net short-term gain/loss
    pub short_term_gain: Decimal,
    /// Net long-term gain/loss
    pub long_term_gain: Decimal,
    /// Sum of positive short-term lot gains
    pub taxable_short_term_gain: Decimal,
    /// Sum of positive long-term lot gains
    pub taxable_long_term_gain: Decimal,
    pub short_term_tax: Decimal,
    pub long_term_tax: Decimal,
    pub total_tax: Decimal,
}

impl TaxEstimate {
    fn from_details(lots: Vec<LotTaxDetail>) -> TaxResult<Self> {
        let mut estimate = lots
            .iter()
            .try_fold(Self::default(), |acc, detail| acc.add_detail(detail))?;
        estimate.lots = lots;
        Ok(estimate)
    }

    fn add_detail(mut self, detail: &LotTaxDetail) -> TaxResult<Self> {
        let taxable = detail.gain.max(Decimal::ZERO);
        let (gain, taxable_gain, tax) = match detail.holding_period {
            HoldingPeriod::ShortTerm => (
                &mut self.short_term_gain,
                &mut self.taxable_short_term_gain,
                &mut self.short_term_tax,
            ),
            HoldingPeriod::LongTerm => (
                &mut self.long_term_gain,
                &mut self.taxable_long_term_gain,
                &mut self.long_term_tax,
            ),
        };
        *gain = checked_add(*gain, detail.gain, "gain")?;
        *taxable_gain = checked_add(*taxable_gain, taxable, "taxable gain")?;
        *tax = checked_add(*tax, detail.tax, "tax")?;
        self.total_tax = checked_add(self.short_term_tax, self.long_term_tax, "total tax")?;
        Ok(self)
    }

    /// Merge several estimates (e.g. one per position) into a portfolio total.
    pub fn combine<'a>(estimates: impl IntoIterator<Item = &'a TaxEstimate>) -> TaxResult<Self> {
        let lots = estimates
            .into_iter()
            .flat_map(|e| e.lots.iter().cloned())
            .collect();
        Self::from_details(lots)
    }

    /// Net gain over both buckets
    pub fn total_gain(&self) -> TaxResult<Decimal> {
        checked_add(self.short_term_gain, self.long_term_gain, "total gain")
    }
}

fn checked_add(a: Decimal, b: Decimal, what: &str) -> TaxResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| TaxError::Overflow(format!("{} exceeds the decimal range", what)))
}

/// How far a ticker's next short-term lot is from long-term treatment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTermOutlook {
    pub ticker: String,
    pub buy_date: NaiveDate,
    pub days_held: i64,
    pub days_until_long_term: i64,
    pub months_until_long_term: i64,
    /// Inside the rules' approaching window
    pub approaching: bool,
}

/// Tax calculator for a fixed set of rules
#[derive(Debug, Clone, Default)]
pub struct TaxCalculator {
    rules: TaxRules,
}

impl TaxCalculator {
    /// Create with custom rules
    pub fn with_rules(rules: TaxRules) -> TaxResult<Self> {
        rules.validate()?;
        Ok(Self { rules })
    }

    /// Get the tax rules
    pub fn rules(&self) -> &TaxRules {
        &self.rules
    }

    /// Gain and tax for `quantity` shares of `lot` exited at `exit_price`.
    ///
    /// Fails with [`TaxError::Overflow`] when a value leaves the decimal range.
    pub fn estimate_lot(
        &self,
        lot: &Lot,
        quantity: u64,
        exit_price: Decimal,
        holding_days: i64,
    ) -> TaxResult<LotTaxDetail> {
        let out_of_range = |what: &str| {
            TaxError::Overflow(format!(
                "{} of {} {} lot bought {}",
                what, quantity, lot.ticker, lot.buy_date
            ))
        };
        let cost_basis =
            checked_value(quantity, lot.buy_price).ok_or_else(|| out_of_range("cost basis"))?;
        let exit_value =
            checked_value(quantity, exit_price).ok_or_else(|| out_of_range("exit value"))?;
        let gain = exit_value
            .checked_sub(cost_basis)
            .ok_or_else(|| out_of_range("gain"))?;
        let holding_period = self.rules.classify(holding_days);
        let tax_rate = self.rules.rate_for(holding_period);
        // Rates are within [0, 1], so the tax never exceeds the gain
        let tax = if gain > Decimal::ZERO {
            gain * tax_rate
        } else {
            Decimal::ZERO
        };

        Ok(LotTaxDetail {
            ticker: lot.ticker.clone(),
            buy_date: lot.buy_date,
            quantity,
            buy_price: lot.buy_price,
            exit_price,
            cost_basis,
            exit_value,
            gain,
            holding_days,
            holding_period,
            tax_rate,
            tax,
        })
    }

    /// Realized tax for a matched sell.
    pub fn estimate_realized(
        &self,
        matched: &LotMatch,
        sell_price: Decimal,
    ) -> TaxResult<TaxEstimate> {
        let details = matched
            .consumed
            .iter()
            .map(|c| self.estimate_lot(&c.lot, c.quantity, sell_price, c.holding_days))
            .collect::<TaxResult<Vec<_>>>()?;
        TaxEstimate::from_details(details)
    }

    /// Unrealized tax for open lots valued at `current_price` on `as_of`.
    pub fn estimate_unrealized(
        &self,
        lots: &[Lot],
        current_price: Decimal,
        as_of: NaiveDate,
    ) -> TaxResult<TaxEstimate> {
        let details = lots
            .iter()
            .map(|lot| self.estimate_lot(lot, lot.quantity, current_price, lot.days_held(as_of)))
            .collect::<TaxResult<Vec<_>>>()?;
        TaxEstimate::from_details(details)
    }

    /// Outlook for the oldest lot still short-term, `None` when every lot
    /// already qualifies.
    pub fn long_term_outlook(&self, lots: &[Lot], as_of: NaiveDate) -> Option<LongTermOutlook> {
        let lot = lots
            .iter()
            .filter(|lot| lot.days_until_long_term(as_of, &self.rules).is_some())
            .min_by_key(|lot| lot.buy_date)?;
        let days_until_long_term = lot.days_until_long_term(as_of, &self.rules)?;

        Some(LongTermOutlook {
            ticker: lot.ticker.clone(),
            buy_date: lot.buy_date,
            days_held: lot.days_held(as_of),
            days_until_long_term,
            months_until_long_term: (days_until_long_term + 29) / 30,
            approaching: days_until_long_term <= self.rules.approaching_window_days as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lot::SellRequest;
    use crate::lot_matcher::match_sell;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_realized_estimate_buckets() {
        let sell_date = date(2025, 6, 1);
        let lots = vec![
            Lot::new("AAPL", 10, dec!(100), sell_date - Duration::days(800)).unwrap(),
            Lot::new("AAPL", 10, dec!(150), sell_date - Duration::days(100)).unwrap(),
        ];
        let request = SellRequest::new("AAPL", 15, sell_date, dec!(160)).unwrap();
        let calculator = TaxCalculator::default();
        let matched = match_sell(&lots, &request, calculator.rules()).unwrap();
        let estimate = calculator
            .estimate_realized(&matched, request.sell_price)
            .unwrap();

        assert_eq!(estimate.lots.len(), 2);
        // 10 x (160 - 100) long-term, 5 x (160 - 150) short-term
        assert_eq!(estimate.long_term_gain, dec!(600));
        assert_eq!(estimate.short_term_gain, dec!(50));
        assert_eq!(estimate.long_term_tax, dec!(90.00));
        assert_eq!(estimate.short_term_tax, dec!(11.00));
        assert_eq!(estimate.total_tax, dec!(101.00));
        assert_eq!(estimate.total_gain().unwrap(), dec!(650));
    }

    #[test]
    fn test_losses_are_not_taxed() {
        let calculator = TaxCalculator::default();
        let lot = Lot::new("TSLA", 4, dec!(250), date(2024, 1, 1)).unwrap();

        let loss = calculator.estimate_lot(&lot, 4, dec!(200), 30).unwrap();
        assert_eq!(loss.gain, dec!(-200));
        assert_eq!(loss.tax, Decimal::ZERO);

        let flat = calculator.estimate_lot(&lot, 4, dec!(250), 30).unwrap();
        assert_eq!(flat.gain, Decimal::ZERO);
        assert_eq!(flat.tax, Decimal::ZERO);
    }

    #[test]
    fn test_losses_do_not_offset_other_lots() {
        let as_of = date(2025, 1, 1);
        let lots = vec![
            Lot::new("NVDA", 1, dec!(100), as_of - Duration::days(10)).unwrap(),
            Lot::new("NVDA", 1, dec!(300), as_of - Duration::days(20)).unwrap(),
        ];
        let estimate = TaxCalculator::default()
            .estimate_unrealized(&lots, dec!(200), as_of)
            .unwrap();

        assert_eq!(estimate.short_term_gain, Decimal::ZERO);
        assert_eq!(estimate.taxable_short_term_gain, dec!(100));
        assert_eq!(estimate.short_term_tax, dec!(22.00));
    }

    #[test]
    fn test_unrealized_uses_as_of_date() {
        let lot = Lot::new("AAPL", 10, dec!(100), date(2023, 1, 1)).unwrap();
        let calculator = TaxCalculator::default();

        let lots = std::slice::from_ref(&lot);

        let early = calculator
            .estimate_unrealized(lots, dec!(120), date(2024, 1, 1))
            .unwrap();
        assert_eq!(early.short_term_tax, dec!(44.00));
        assert_eq!(early.long_term_tax, Decimal::ZERO);

        let later = calculator
            .estimate_unrealized(lots, dec!(120), date(2025, 1, 1))
            .unwrap();
        assert_eq!(later.lots[0].holding_days, 731);
        assert_eq!(later.long_term_tax, dec!(30.00));
        assert_eq!(later.short_term_tax, Decimal::ZERO);
    }

    #[test]
    fn test_estimate_is_idempotent() {
        let as_of = date(2025, 1, 1);
        let lots = vec![
            Lot::new("AMD", 7, dec!(80.15), date(2022, 3, 4)).unwrap(),
            Lot::new("AMD", 3, dec!(140.33), date(2024, 8, 9)).unwrap(),
        ];
        let calculator = TaxCalculator::with_rules(TaxRules::one_year()).unwrap();
        let first = calculator.estimate_unrealized(&lots, dec!(121.07), as_of).unwrap();
        let second = calculator.estimate_unrealized(&lots, dec!(121.07), as_of).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_combine_sums_buckets() {
        let as_of = date(2025, 1, 1);
        let calculator = TaxCalculator::default();
        let a = calculator.estimate_unrealized(
            &[Lot::new("A", 1, dec!(10), date(2020, 1, 1)).unwrap()],
            dec!(20),
            as_of,
        )
        .unwrap();
        let b = calculator.estimate_unrealized(
            &[Lot::new("B", 2, dec!(10), date(2024, 12, 1)).unwrap()],
            dec!(15),
            as_of,
        )
        .unwrap();
        let total = TaxEstimate::combine([&a, &b]).unwrap();

        assert_eq!(total.lots.len(), 2);
        assert_eq!(total.long_term_tax, dec!(1.50));
        assert_eq!(total.short_term_tax, dec!(2.20));
        assert_eq!(total.total_tax, dec!(3.70));
    }

    #[test]
    fn test_out_of_range_exit_value_is_an_error() {
        let calculator = TaxCalculator::default();
        let lot = Lot::new("X", u64::MAX, dec!(1), date(2024, 1, 1)).unwrap();
        let lots = std::slice::from_ref(&lot);

        assert!(matches!(
            calculator.estimate_unrealized(lots, dec!(10000000000), date(2025, 1, 1)),
            Err(TaxError::Overflow(_))
        ));
        assert!(calculator
            .estimate_unrealized(lots, dec!(2), date(2025, 1, 1))
            .is_ok());
    }

    #[test]
    fn test_combine_out_of_range_is_an_error() {
        let as_of = date(2025, 1, 1);
        let calculator = TaxCalculator::default();
        let lot = Lot::new("X", 1, dec!(0), date(2020, 1, 1)).unwrap();
        let estimate = calculator
            .estimate_unrealized(std::slice::from_ref(&lot), Decimal::MAX, as_of)
            .unwrap();

        assert!(matches!(
            TaxEstimate::combine([&estimate, &estimate]),
            Err(TaxError::Overflow(_))
        ));
    }

    #[test]
    fn test_long_term_outlook() {
        let as_of = date(2025, 1, 1);
        let calculator = TaxCalculator::default();
        let lots = vec![
            Lot::new("AAPL", 1, dec!(10), as_of - Duration::days(900)).unwrap(),
            Lot::new("AAPL", 1, dec!(10), as_of - Duration::days(650)).unwrap(),
            Lot::new("AAPL", 1, dec!(10), as_of - Duration::days(20)).unwrap(),
        ];

        let outlook = calculator.long_term_outlook(&lots, as_of).unwrap();
        assert_eq!(outlook.days_held, 650);
        assert_eq!(outlook.days_until_long_term, 80);
        assert_eq!(outlook.months_until_long_term, 3);
        assert!(outlook.approaching);

        let young = vec![Lot::new("AAPL", 1, dec!(10), as_of - Duration::days(20)).unwrap()];
        let outlook = calculator.long_term_outlook(&young, as_of).unwrap();
        assert_eq!(outlook.days_until_long_term, 710);
        assert!(!outlook.approaching);

        assert!(calculator.long_term_outlook(&lots[..1], as_of).is_none());
    }
}
