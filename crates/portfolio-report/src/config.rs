use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tax_engine::TaxRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    // Inputs
    pub lots_path: PathBuf,                     // JSON array of lots
    pub prices_path: Option<PathBuf>,           // JSON map ticker -> price | null
    pub sells_path: Option<PathBuf>,            // JSON array of sell requests
    pub targets_path: Option<PathBuf>,          // JSON array of price targets
    pub shown_alerts_path: Option<PathBuf>,     // read and rewritten after evaluation

    // Valuation date, today when unset
    pub as_of: Option<NaiveDate>,

    // Tax rules
    pub tax_rules: TaxRules,
}

impl ReportConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TaxRules::default();

        let short_term_rate: Decimal = var("SHORT_TERM_TAX_RATE")
            .unwrap_or_else(|| defaults.short_term_rate.to_string())
            .parse()
            .context("SHORT_TERM_TAX_RATE is not a decimal")?;
        let long_term_rate: Decimal = var("LONG_TERM_TAX_RATE")
            .unwrap_or_else(|| defaults.long_term_rate.to_string())
            .parse()
            .context("LONG_TERM_TAX_RATE is not a decimal")?;
        let long_term_threshold_days: u32 = var("LONG_TERM_THRESHOLD_DAYS")
            .unwrap_or_else(|| defaults.long_term_threshold_days.to_string())
            .parse()
            .context("LONG_TERM_THRESHOLD_DAYS is not a day count")?;
        let approaching_window_days: u32 = var("APPROACHING_WINDOW_DAYS")
            .unwrap_or_else(|| defaults.approaching_window_days.to_string())
            .parse()
            .context("APPROACHING_WINDOW_DAYS is not a day count")?;

        let tax_rules = TaxRules::new(short_term_rate, long_term_rate, long_term_threshold_days)?
            .with_approaching_window(approaching_window_days);

        let as_of = var("AS_OF_DATE")
            .map(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d"))
            .transpose()
            .context("AS_OF_DATE must be YYYY-MM-DD")?;

        let config = Self {
            lots_path: var("LOTS_PATH")
                .context("LOTS_PATH not set")?
                .into(),
            prices_path: var("PRICES_PATH").map(PathBuf::from),
            sells_path: var("SELLS_PATH").map(PathBuf::from),
            targets_path: var("TARGETS_PATH").map(PathBuf::from),
            shown_alerts_path: var("SHOWN_ALERTS_PATH").map(PathBuf::from),
            as_of,
            tax_rules,
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ReportConfig::from_lookup(lookup(&[("LOTS_PATH", "lots.json")])).unwrap();
        assert_eq!(config.lots_path, PathBuf::from("lots.json"));
        assert_eq!(config.tax_rules, TaxRules::default());
        assert!(config.as_of.is_none());
        assert!(config.prices_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ReportConfig::from_lookup(lookup(&[
            ("LOTS_PATH", "lots.json"),
            ("PRICES_PATH", "prices.json"),
            ("SHORT_TERM_TAX_RATE", "0.30"),
            ("LONG_TERM_TAX_RATE", "0.10"),
            ("LONG_TERM_THRESHOLD_DAYS", "365"),
            ("APPROACHING_WINDOW_DAYS", "60"),
            ("AS_OF_DATE", "2025-01-31"),
        ]))
        .unwrap();

        assert_eq!(config.tax_rules.short_term_rate, dec!(0.30));
        assert_eq!(config.tax_rules.long_term_rate, dec!(0.10));
        assert_eq!(config.tax_rules.long_term_threshold_days, 365);
        assert_eq!(config.tax_rules.approaching_window_days, 60);
        assert_eq!(config.as_of, NaiveDate::from_ymd_opt(2025, 1, 31));
        assert_eq!(config.prices_path, Some(PathBuf::from("prices.json")));
    }

    #[test]
    fn test_invalid_values() {
        assert!(ReportConfig::from_lookup(lookup(&[])).is_err());
        let bad_rate = lookup(&[("LOTS_PATH", "l"), ("SHORT_TERM_TAX_RATE", "1.5")]);
        assert!(ReportConfig::from_lookup(bad_rate).is_err());
        let bad_date = lookup(&[("LOTS_PATH", "l"), ("AS_OF_DATE", "31/01/2025")]);
        assert!(ReportConfig::from_lookup(bad_date).is_err());
    }
}
