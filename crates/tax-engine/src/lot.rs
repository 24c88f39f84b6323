//! Lots, sell requests and the holding-period rules applied to them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{TaxError, TaxResult};

/// Holding period classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldingPeriod {
    ShortTerm,
    LongTerm,
}

impl std::fmt::Display for HoldingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldingPeriod::ShortTerm => write!(f, "SHORT_TERM"),
            HoldingPeriod::LongTerm => write!(f, "LONG_TERM"),
        }
    }
}

/// Capital gains rules used for classification and tax estimates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRules {
    /// Short-term capital gains tax rate, in [0, 1]
    pub short_term_rate: Decimal,
    /// Long-term capital gains tax rate, in [0, 1]
    pub long_term_rate: Decimal,
    /// Days to qualify for long-term treatment
    pub long_term_threshold_days: u32,
    /// A short-term lot this close to the threshold is reported as approaching
    pub approaching_window_days: u32,
}

impl Default for TaxRules {
    /// 22% short-term, 15% long-term, two-year holding threshold.
    fn default() -> Self {
        Self {
            short_term_rate: Decimal::new(22, 2),
            long_term_rate: Decimal::new(15, 2),
            long_term_threshold_days: 730,
            approaching_window_days: 180,
        }
    }
}

impl TaxRules {
    /// Build rules with explicit rates and threshold.
    pub fn new(
        short_term_rate: Decimal,
        long_term_rate: Decimal,
        long_term_threshold_days: u32,
    ) -> TaxResult<Self> {
        let rules = Self {
            short_term_rate,
            long_term_rate,
            long_term_threshold_days,
            ..Self::default()
        };
        rules.validate()?;
        Ok(rules)
    }

    /// Same rates as the default, with the common one-year holding threshold.
    pub fn one_year() -> Self {
        Self {
            long_term_threshold_days: 365,
            ..Self::default()
        }
    }

    pub fn with_approaching_window(mut self, days: u32) -> Self {
        self.approaching_window_days = days;
        self
    }

    pub fn validate(&self) -> TaxResult<()> {
        for (name, rate) in [
            ("short_term_rate", self.short_term_rate),
            ("long_term_rate", self.long_term_rate),
        ] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(TaxError::InvalidRate(format!(
                    "{} must be within [0, 1], got {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }

    /// Classify a holding period given in whole days.
    pub fn classify(&self, holding_days: i64) -> HoldingPeriod {
        if holding_days >= self.long_term_threshold_days as i64 {
            HoldingPeriod::LongTerm
        } else {
            HoldingPeriod::ShortTerm
        }
    }

    pub fn rate_for(&self, period: HoldingPeriod) -> Decimal {
        match period {
            HoldingPeriod::ShortTerm => self.short_term_rate,
            HoldingPeriod::LongTerm => self.long_term_rate,
        }
    }
}

/// A tax lot representing the unsold remainder of one purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub ticker: String,
    pub quantity: u64,
    /// Price paid per share
    pub buy_price: Decimal,
    pub buy_date: NaiveDate,
}

impl Lot {
    /// Create a validated lot
    pub fn new(
        ticker: impl Into<String>,
        quantity: u64,
        buy_price: Decimal,
        buy_date: NaiveDate,
    ) -> TaxResult<Self> {
        let lot = Self {
            ticker: ticker.into(),
            quantity,
            buy_price,
            buy_date,
        };
        lot.validate()?;
        Ok(lot)
    }

    pub fn validate(&self) -> TaxResult<()> {
        if self.ticker.trim().is_empty() {
            return Err(TaxError::InvalidLot("ticker is empty".to_string()));
        }
        if self.quantity == 0 {
            return Err(TaxError::InvalidLot(format!(
                "{} lot bought {} has zero quantity",
                self.ticker, self.buy_date
            )));
        }
        if self.buy_price < Decimal::ZERO {
            return Err(TaxError::InvalidLot(format!(
                "{} lot bought {} has negative price {}",
                self.ticker, self.buy_date, self.buy_price
            )));
        }
        self.cost_basis()?;
        Ok(())
    }

    /// Total cost basis (quantity x buy price)
    pub fn cost_basis(&self) -> TaxResult<Decimal> {
        checked_value(self.quantity, self.buy_price).ok_or_else(|| {
            TaxError::InvalidLot(format!(
                "{} lot bought {}: {} x {} is out of range",
                self.ticker, self.buy_date, self.quantity, self.buy_price
            ))
        })
    }

    /// Days held as of a date
    pub fn days_held(&self, as_of: NaiveDate) -> i64 {
        (as_of - self.buy_date).num_days()
    }

    pub fn holding_period(&self, as_of: NaiveDate, rules: &TaxRules) -> HoldingPeriod {
        rules.classify(self.days_held(as_of))
    }

    /// Days until long-term, `None` once the lot already qualifies
    pub fn days_until_long_term(&self, as_of: NaiveDate, rules: &TaxRules) -> Option<i64> {
        let remaining = rules.long_term_threshold_days as i64 - self.days_held(as_of);
        (remaining > 0).then_some(remaining)
    }

    /// Same purchase with a reduced quantity
    pub fn with_quantity(&self, quantity: u64) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }
}

/// A request to sell shares of one ticker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellRequest {
    pub ticker: String,
    pub quantity: u64,
    pub sell_date: NaiveDate,
    /// Realized price per share
    pub sell_price: Decimal,
}

impl SellRequest {
    pub fn new(
        ticker: impl Into<String>,
        quantity: u64,
        sell_date: NaiveDate,
        sell_price: Decimal,
    ) -> TaxResult<Self> {
        let request = Self {
            ticker: ticker.into(),
            quantity,
            sell_date,
            sell_price,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> TaxResult<()> {
        if self.ticker.trim().is_empty() {
            return Err(TaxError::InvalidSell("ticker is empty".to_string()));
        }
        if self.quantity == 0 {
            return Err(TaxError::InvalidSell(format!(
                "sell of {} has zero quantity",
                self.ticker
            )));
        }
        if self.sell_price < Decimal::ZERO {
            return Err(TaxError::InvalidSell(format!(
                "sell of {} has negative price {}",
                self.ticker, self.sell_price
            )));
        }
        self.proceeds()?;
        Ok(())
    }

    /// Sale proceeds (quantity x sell price)
    pub fn proceeds(&self) -> TaxResult<Decimal> {
        checked_value(self.quantity, self.sell_price).ok_or_else(|| {
            TaxError::InvalidSell(format!(
                "sell of {}: {} x {} is out of range",
                self.ticker, self.quantity, self.sell_price
            ))
        })
    }
}

/// `quantity x price`, `None` outside the decimal range
pub fn checked_value(quantity: u64, price: Decimal) -> Option<Decimal> {
    Decimal::from(quantity).checked_mul(price)
}

/// Open quantity and cost basis of a set of lots.
///
/// Fails with [`TaxError::InvalidLot`] when either total leaves its range.
pub fn lot_totals<'a>(lots: impl IntoIterator<Item = &'a Lot>) -> TaxResult<(u64, Decimal)> {
    lots.into_iter()
        .try_fold((0u64, Decimal::ZERO), |(quantity, cost), lot| {
            let quantity = quantity.checked_add(lot.quantity).ok_or_else(|| {
                TaxError::InvalidLot(format!("open {} quantity is out of range", lot.ticker))
            })?;
            let cost = cost.checked_add(lot.cost_basis()?).ok_or_else(|| {
                TaxError::InvalidLot(format!("open {} cost basis is out of range", lot.ticker))
            })?;
            Ok((quantity, cost))
        })
}
