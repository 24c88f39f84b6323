use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use portfolio_manager::{
    evaluate_targets, PortfolioManager, PortfolioSummary, PriceTarget, RealizedSale, Replay,
    ShownAlerts, Transaction, TriggeredAlert,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tax_engine::{LongTermOutlook, Lot, SellRequest, TaxEstimate};

/// Everything loaded from disk for one report run
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub lots: Vec<Lot>,
    pub prices: HashMap<String, Option<Decimal>>,
    pub sells: Vec<SellRequest>,
    pub targets: Vec<PriceTarget>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: PortfolioSummary,
    pub realized_sales: Vec<RealizedSale>,
    pub realized_tax: TaxEstimate,
    pub long_term_outlooks: Vec<LongTermOutlook>,
    pub alerts: Vec<TriggeredAlert>,
}

/// Replay buys and sells, value what is left and evaluate price targets.
pub fn build_report(
    manager: &PortfolioManager,
    inputs: ReportInputs,
    shown: &mut ShownAlerts,
    as_of: NaiveDate,
) -> Result<Report> {
    for target in &inputs.targets {
        target.validate()?;
    }

    let transactions = inputs
        .lots
        .into_iter()
        .map(Transaction::Buy)
        .chain(inputs.sells.into_iter().map(Transaction::Sell));
    let Replay { holdings, realized } = manager
        .replay(transactions)
        .context("failed to replay lots and sells")?;

    let prices = inputs.prices;
    let price_lookup = |ticker: &str| prices.get(ticker).copied().flatten();

    let summary = manager
        .summarize(&holdings, price_lookup, as_of)
        .context("failed to value holdings")?;
    let realized_tax = TaxEstimate::combine(realized.iter().map(|s| &s.tax))
        .context("failed to total realized tax")?;
    let long_term_outlooks = holdings
        .tickers()
        .filter_map(|ticker| manager.long_term_outlook(&holdings, ticker, as_of))
        .collect();
    let alerts = evaluate_targets(&inputs.targets, price_lookup, shown);

    Ok(Report {
        summary,
        realized_sales: realized,
        realized_tax,
        long_term_outlooks,
        alerts,
    })
}
