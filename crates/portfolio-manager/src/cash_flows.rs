//! Dated cash flows for return calculations.
//!
//! Buys are outflows (negative), sells are inflows (positive) and the value
//! still held is appended as a final inflow on the valuation date. A flow
//! whose amount cannot be expressed leaves the series undetermined (`None`).

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tax_engine::Lot;

use crate::models::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

impl CashFlow {
    /// `None` when the amount has no finite `f64` form
    pub fn new(date: NaiveDate, amount: Decimal) -> Option<Self> {
        let amount = amount.to_f64().filter(|a| a.is_finite())?;
        Some(Self { date, amount })
    }

    /// Outflow for a buy, inflow for a sell
    pub fn from_transaction(transaction: &Transaction) -> Option<Self> {
        match transaction {
            Transaction::Buy(lot) => Self::new(lot.buy_date, -lot.cost_basis().ok()?),
            Transaction::Sell(sale) => Self::new(sale.sell_date, sale.proceeds().ok()?),
        }
    }
}

/// Flows for open lots valued at `market_value` on `as_of`.
/// Without a market value there is nothing to solve for.
pub fn from_lots(
    lots: &[Lot],
    market_value: Option<Decimal>,
    as_of: NaiveDate,
) -> Option<Vec<CashFlow>> {
    let market_value = market_value?;
    lots.iter()
        .map(|lot| CashFlow::new(lot.buy_date, -lot.cost_basis().ok()?))
        .chain(std::iter::once(CashFlow::new(as_of, market_value)))
        .collect()
}

/// Flows for a transaction history plus the value still held on `as_of`.
pub fn from_transactions<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    market_value: Option<Decimal>,
    as_of: NaiveDate,
) -> Option<Vec<CashFlow>> {
    let market_value = market_value?;
    transactions
        .into_iter()
        .map(CashFlow::from_transaction)
        .chain(std::iter::once(CashFlow::new(as_of, market_value)))
        .collect()
}
