use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use tax_engine::{
    checked_value, lot_totals, HoldingPeriod, LongTermOutlook, Lot, SellRequest, TaxCalculator,
    TaxError, TaxEstimate, TaxRules,
};
use tracing::{debug, warn};

use crate::cash_flows::{self, CashFlow};
use crate::error::PortfolioResult;
use crate::holdings::Holdings;
use crate::models::*;
use crate::shared_math;

fn out_of_range(what: String) -> TaxError {
    TaxError::Overflow(format!("{} exceeds the decimal range", what))
}

fn checked_add(a: Decimal, b: Decimal, what: &str) -> PortfolioResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| out_of_range(what.to_string()).into())
}

/// Holding-period mix while folding one ticker's lots into a position
#[derive(Default)]
struct PeriodMix {
    earliest_buy_date: Option<NaiveDate>,
    has_long_term: bool,
    has_short_term: bool,
}

impl PeriodMix {
    fn add(mut self, lot: &Lot, period: HoldingPeriod) -> Self {
        self.earliest_buy_date = Some(match self.earliest_buy_date {
            Some(earliest) => earliest.min(lot.buy_date),
            None => lot.buy_date,
        });
        match period {
            HoldingPeriod::LongTerm => self.has_long_term = true,
            HoldingPeriod::ShortTerm => self.has_short_term = true,
        }
        self
    }

    fn classification(&self) -> TaxClassification {
        let periods = [
            self.has_long_term.then_some(HoldingPeriod::LongTerm),
            self.has_short_term.then_some(HoldingPeriod::ShortTerm),
        ];
        TaxClassification::from_periods(periods.into_iter().flatten())
    }
}

/// Aggregates lots into positions and values them for tax and return.
#[derive(Debug, Clone, Default)]
pub struct PortfolioManager {
    calculator: TaxCalculator,
}

impl PortfolioManager {
    pub fn new(rules: TaxRules) -> PortfolioResult<Self> {
        Ok(Self {
            calculator: TaxCalculator::with_rules(rules)?,
        })
    }

    pub fn calculator(&self) -> &TaxCalculator {
        &self.calculator
    }

    pub fn rules(&self) -> &TaxRules {
        self.calculator.rules()
    }

    /// Group lots by ticker into positions, sorted by ticker.
    ///
    /// Input order does not affect the result. A ticker whose price lookup
    /// returns `None` gets a position without market value or tax. Fails
    /// when a ticker's quantity or value leaves its numeric range.
    pub fn build_positions<F>(
        &self,
        lots: &[Lot],
        price_lookup: F,
        as_of: NaiveDate,
    ) -> PortfolioResult<Vec<Position>>
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        let grouped: BTreeMap<&str, Vec<&Lot>> =
            lots.iter().fold(BTreeMap::new(), |mut acc, lot| {
                acc.entry(lot.ticker.as_str()).or_default().push(lot);
                acc
            });

        grouped
            .into_iter()
            .map(|(ticker, lots)| {
                let price = price_lookup(ticker);
                if price.is_none() {
                    warn!(ticker, "no current price, position left unvalued");
                }
                self.build_position(ticker, lots, price, as_of)
            })
            .collect()
    }

    fn build_position(
        &self,
        ticker: &str,
        mut lots: Vec<&Lot>,
        current_price: Option<Decimal>,
        as_of: NaiveDate,
    ) -> PortfolioResult<Position> {
        lots.sort_by(|a, b| {
            (a.buy_date, a.buy_price, a.quantity).cmp(&(b.buy_date, b.buy_price, b.quantity))
        });
        let lots: Vec<Lot> = lots.into_iter().cloned().collect();

        let (quantity, cost_basis) = lot_totals(&lots)?;
        let mix = lots.iter().fold(PeriodMix::default(), |acc, lot| {
            acc.add(lot, lot.holding_period(as_of, self.rules()))
        });

        let average_price = if quantity > 0 {
            cost_basis / Decimal::from(quantity)
        } else {
            Decimal::ZERO
        };
        let market_value = current_price
            .map(|price| {
                checked_value(quantity, price)
                    .ok_or_else(|| out_of_range(format!("{} market value", ticker)))
            })
            .transpose()?;
        let unrealized_gain = market_value
            .map(|value| {
                value
                    .checked_sub(cost_basis)
                    .ok_or_else(|| out_of_range(format!("{} unrealized gain", ticker)))
            })
            .transpose()?;
        let unrealized_gain_percent = unrealized_gain
            .filter(|_| cost_basis > Decimal::ZERO)
            .and_then(|gain| gain.checked_div(cost_basis))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .and_then(|percent| percent.to_f64());
        let annualized_return = match (market_value, mix.earliest_buy_date) {
            (Some(value), Some(earliest)) => match (cost_basis.to_f64(), value.to_f64()) {
                (Some(cost), Some(value)) => {
                    shared_math::annualized_return(cost, value, (as_of - earliest).num_days())
                }
                _ => None,
            },
            _ => None,
        };
        let tax = current_price
            .map(|price| self.calculator.estimate_unrealized(&lots, price, as_of))
            .transpose()?;

        Ok(Position {
            ticker: ticker.to_string(),
            quantity,
            cost_basis,
            average_price,
            current_price,
            market_value,
            unrealized_gain,
            unrealized_gain_percent,
            classification: mix.classification(),
            earliest_buy_date: mix.earliest_buy_date,
            annualized_return,
            tax,
            lots,
        })
    }

    /// Per-ticker XIRR for each position, using the ledger's full history
    /// so that shares already sold still count.
    pub fn ticker_returns(
        &self,
        holdings: &Holdings,
        positions: &[Position],
        as_of: NaiveDate,
    ) -> Vec<TickerReturn> {
        positions
            .iter()
            .map(|position| {
                let xirr_percent = cash_flows::from_transactions(
                    holdings.transactions_for(&position.ticker),
                    position.market_value,
                    as_of,
                )
                .and_then(|flows| shared_math::xirr(&flows));
                if xirr_percent.is_none() {
                    debug!(ticker = %position.ticker, "xirr undetermined");
                }
                TickerReturn {
                    ticker: position.ticker.clone(),
                    market_value: position.market_value,
                    xirr_percent,
                }
            })
            .collect()
    }

    /// Market-value weighted average of the determined per-ticker XIRRs.
    /// Tickers without a price or without an XIRR carry no weight.
    pub fn weighted_xirr(returns: &[TickerReturn]) -> Option<f64> {
        shared_math::weighted_average(returns.iter().filter_map(|r| {
            let xirr = r.xirr_percent?;
            let weight = r.market_value?.to_f64()?;
            Some((xirr, weight))
        }))
    }

    /// XIRR over every ticker's history, skipping tickers still held without
    /// a price. Fully closed tickers contribute their buys and sells.
    pub fn portfolio_xirr(
        &self,
        holdings: &Holdings,
        positions: &[Position],
        as_of: NaiveDate,
    ) -> Option<f64> {
        let unpriced: Vec<&str> = positions
            .iter()
            .filter(|p| !p.is_priced())
            .map(|p| p.ticker.as_str())
            .collect();
        let held_value = positions
            .iter()
            .filter_map(|p| p.market_value)
            .try_fold(Decimal::ZERO, Decimal::checked_add)?;

        let flows = holdings
            .history()
            .iter()
            .filter(|t| !unpriced.contains(&t.ticker()))
            .map(CashFlow::from_transaction)
            .chain(std::iter::once(CashFlow::new(as_of, held_value)))
            .collect::<Option<Vec<_>>>()?;
        shared_math::xirr(&flows)
    }

    /// Full valuation of a ledger on `as_of`.
    pub fn summarize<F>(
        &self,
        holdings: &Holdings,
        price_lookup: F,
        as_of: NaiveDate,
    ) -> PortfolioResult<PortfolioSummary>
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        let lots: Vec<Lot> = holdings.lots().cloned().collect();
        let positions = self.build_positions(&lots, price_lookup, as_of)?;
        let returns = self.ticker_returns(holdings, &positions, as_of);
        let weighted_xirr = Self::weighted_xirr(&returns);
        let portfolio_xirr = self.portfolio_xirr(holdings, &positions, as_of);

        let mut totals = PortfolioTotals::default();
        for position in &positions {
            totals.total_cost = checked_add(totals.total_cost, position.cost_basis, "total cost")?;
            match position.market_value {
                Some(value) => {
                    totals.total_value = checked_add(totals.total_value, value, "total value")?;
                    totals.priced_cost =
                        checked_add(totals.priced_cost, position.cost_basis, "priced cost")?;
                }
                None => totals.unpriced_tickers.push(position.ticker.clone()),
            }
        }
        totals.total_profit = totals
            .total_value
            .checked_sub(totals.priced_cost)
            .ok_or_else(|| out_of_range("total profit".to_string()))?;

        let tax = TaxEstimate::combine(positions.iter().filter_map(|p| p.tax.as_ref()))?;
        totals.short_term_tax = tax.short_term_tax;
        totals.long_term_tax = tax.long_term_tax;
        totals.total_tax_liability = tax.total_tax;

        Ok(PortfolioSummary {
            as_of,
            total_positions: positions.len(),
            totals,
            positions,
            returns,
            weighted_xirr,
            portfolio_xirr,
        })
    }

    /// Apply a FIFO sell and estimate the tax it realizes.
    pub fn sell(&self, holdings: &Holdings, request: &SellRequest) -> PortfolioResult<SellOutcome> {
        let (holdings, matched) = holdings.with_sell(request, self.rules())?;
        let realized = self
            .calculator
            .estimate_realized(&matched, request.sell_price)?;
        Ok(SellOutcome {
            holdings,
            matched,
            realized,
        })
    }

    /// Replay transactions in date order, buys before sells on the same day,
    /// collecting the tax realized by each sell.
    pub fn replay(
        &self,
        transactions: impl IntoIterator<Item = Transaction>,
    ) -> PortfolioResult<Replay> {
        let mut ordered: Vec<Transaction> = transactions.into_iter().collect();
        ordered.sort_by_key(Transaction::replay_key);

        ordered
            .into_iter()
            .try_fold(Replay::default(), |mut replay, transaction| -> PortfolioResult<Replay> {
                match transaction {
                    Transaction::Buy(lot) => replay.holdings = replay.holdings.with_buy(lot)?,
                    Transaction::Sell(sell) => {
                        let outcome = self.sell(&replay.holdings, &sell)?;
                        replay.holdings = outcome.holdings;
                        replay.realized.push(RealizedSale {
                            sell,
                            matched: outcome.matched,
                            tax: outcome.realized,
                        });
                    }
                }
                Ok(replay)
            })
    }

    /// Days until the ticker's next short-term lot turns long-term.
    pub fn long_term_outlook(
        &self,
        holdings: &Holdings,
        ticker: &str,
        as_of: NaiveDate,
    ) -> Option<LongTermOutlook> {
        self.calculator.long_term_outlook(holdings.lots_for(ticker), as_of)
    }
}
