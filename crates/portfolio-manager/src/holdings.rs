//! Holdings ledger
//!
//! Open lots per ticker plus the transaction history they came from. Every
//! operation returns a new ledger; the receiver is left as it was.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tax_engine::{lot_totals, match_sell, Lot, LotMatch, SellRequest, TaxRules};
use tracing::info;

use crate::error::PortfolioResult;
use crate::models::Transaction;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holdings {
    open: BTreeMap<String, Vec<Lot>>,
    history: Vec<Transaction>,
}

impl Holdings {
    /// Ledger holding the given lots as buys
    pub fn from_lots(lots: impl IntoIterator<Item = Lot>) -> PortfolioResult<Self> {
        lots.into_iter()
            .try_fold(Self::default(), |holdings, lot| holdings.with_buy(lot))
    }

    /// Ledger with one more lot.
    ///
    /// Fails when the ticker's open quantity or cost basis would leave its
    /// numeric range, so per-ticker totals of a ledger always fit.
    pub fn with_buy(&self, lot: Lot) -> PortfolioResult<Self> {
        lot.validate()?;

        let mut next = self.clone();
        let lots = next.open.entry(lot.ticker.clone()).or_default();
        lots.push(lot.clone());
        lot_totals(lots.iter())?;
        lots.sort_by_key(|l| l.buy_date);
        next.history.push(Transaction::Buy(lot));
        Ok(next)
    }

    /// Ledger after a FIFO sell, with the match that produced it.
    ///
    /// Fails without side effects when the sell exceeds the open quantity.
    pub fn with_sell(
        &self,
        request: &SellRequest,
        rules: &TaxRules,
    ) -> PortfolioResult<(Self, LotMatch)> {
        let matched = match_sell(self.lots_for(&request.ticker), request, rules)?;

        let mut next = self.clone();
        if matched.remaining.is_empty() {
            next.open.remove(&request.ticker);
        } else {
            next.open
                .insert(request.ticker.clone(), matched.remaining.clone());
        }
        next.history.push(Transaction::Sell(request.clone()));

        info!(
            ticker = %request.ticker,
            quantity = request.quantity,
            remaining = matched.remaining_quantity(),
            "sell applied"
        );
        Ok((next, matched))
    }

    /// Open lots of a ticker, oldest first
    pub fn lots_for(&self, ticker: &str) -> &[Lot] {
        self.open.get(ticker).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every open lot, grouped by ticker
    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.open.values().flatten()
    }

    /// Open quantity of a ticker, bounded by [`Holdings::with_buy`]
    pub fn quantity(&self, ticker: &str) -> u64 {
        self.lots_for(ticker).iter().map(|l| l.quantity).sum()
    }

    /// Tickers with open lots
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.open.keys().map(String::as_str)
    }

    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    pub fn transactions_for<'a>(
        &'a self,
        ticker: &'a str,
    ) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.history.iter().filter(move |t| t.ticker() == ticker)
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
