use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tax_engine::{HoldingPeriod, Lot, LotMatch, SellRequest, TaxEstimate};

use crate::holdings::Holdings;

/// A recorded buy or sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transaction {
    Buy(Lot),
    Sell(SellRequest),
}

impl Transaction {
    pub fn ticker(&self) -> &str {
        match self {
            Transaction::Buy(lot) => &lot.ticker,
            Transaction::Sell(sale) => &sale.ticker,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Transaction::Buy(lot) => lot.buy_date,
            Transaction::Sell(sale) => sale.sell_date,
        }
    }

    /// Replay order: by date, buys before sells on the same day
    pub fn replay_key(&self) -> (NaiveDate, bool) {
        (self.date(), matches!(self, Transaction::Sell(_)))
    }
}

/// Holding-period mix of a position's lots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxClassification {
    LongTerm,
    ShortTerm,
    Mixed,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl TaxClassification {
    /// Order-independent: only which periods occur matters.
    pub fn from_periods(periods: impl IntoIterator<Item = HoldingPeriod>) -> Self {
        let (any_long, any_short) =
            periods
                .into_iter()
                .fold((false, false), |(long, short), period| match period {
                    HoldingPeriod::LongTerm => (true, short),
                    HoldingPeriod::ShortTerm => (long, true),
                });
        match (any_long, any_short) {
            (true, false) => TaxClassification::LongTerm,
            (false, true) => TaxClassification::ShortTerm,
            (true, true) => TaxClassification::Mixed,
            (false, false) => TaxClassification::NotApplicable,
        }
    }
}

impl std::fmt::Display for TaxClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxClassification::LongTerm => write!(f, "LONG_TERM"),
            TaxClassification::ShortTerm => write!(f, "SHORT_TERM"),
            TaxClassification::Mixed => write!(f, "MIXED"),
            TaxClassification::NotApplicable => write!(f, "N/A"),
        }
    }
}

/// All open lots of one ticker, valued at the current price when known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub quantity: u64,
    pub cost_basis: Decimal,
    pub average_price: Decimal,
    pub current_price: Option<Decimal>,
    pub market_value: Option<Decimal>,
    pub unrealized_gain: Option<Decimal>,
    pub unrealized_gain_percent: Option<f64>,
    pub classification: TaxClassification,
    pub earliest_buy_date: Option<NaiveDate>,
    /// Compound annual growth since the earliest buy
    pub annualized_return: Option<f64>,
    /// Unrealized tax if sold at the current price
    pub tax: Option<TaxEstimate>,
    /// Sorted by buy date
    pub lots: Vec<Lot>,
}

impl Position {
    pub fn is_priced(&self) -> bool {
        self.current_price.is_some()
    }
}

/// Per-ticker money-weighted return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerReturn {
    pub ticker: String,
    pub market_value: Option<Decimal>,
    /// `None` when undetermined
    pub xirr_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    /// Market value of priced positions
    pub total_value: Decimal,
    /// Cost basis of every position
    pub total_cost: Decimal,
    /// Cost basis of priced positions
    pub priced_cost: Decimal,
    /// total_value - priced_cost
    pub total_profit: Decimal,
    pub short_term_tax: Decimal,
    pub long_term_tax: Decimal,
    pub total_tax_liability: Decimal,
    /// Tickers left out of value, profit, tax and weighted return
    pub unpriced_tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub as_of: NaiveDate,
    pub total_positions: usize,
    pub totals: PortfolioTotals,
    pub positions: Vec<Position>,
    pub returns: Vec<TickerReturn>,
    /// Market-value weighted average of per-ticker XIRR
    pub weighted_xirr: Option<f64>,
    /// XIRR over the combined flows of every priced or closed ticker
    pub portfolio_xirr: Option<f64>,
}

/// Result of applying a sell to a ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellOutcome {
    pub holdings: Holdings,
    pub matched: LotMatch,
    pub realized: TaxEstimate,
}

/// A sell applied during a replay, with the tax it realized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedSale {
    pub sell: SellRequest,
    pub matched: LotMatch,
    pub tax: TaxEstimate,
}

/// Ledger rebuilt from a transaction history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    pub holdings: Holdings,
    /// Sells in the order they were applied
    pub realized: Vec<RealizedSale>,
}
