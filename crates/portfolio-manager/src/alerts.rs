//! Price-target alerts.
//!
//! Which alerts were already shown is caller state: evaluation reads and
//! updates a [`ShownAlerts`] store handed in by the caller.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PortfolioError, PortfolioResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TargetAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetAction::Buy => write!(f, "BUY"),
            TargetAction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTarget {
    pub ticker: String,
    pub target_price: Decimal,
    pub action: TargetAction,
}

impl PriceTarget {
    pub fn new(
        ticker: impl Into<String>,
        target_price: Decimal,
        action: TargetAction,
    ) -> PortfolioResult<Self> {
        let target = Self {
            ticker: ticker.into(),
            target_price,
            action,
        };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> PortfolioResult<()> {
        if self.ticker.trim().is_empty() {
            return Err(PortfolioError::InvalidTarget("ticker is empty".to_string()));
        }
        if self.target_price <= Decimal::ZERO {
            return Err(PortfolioError::InvalidTarget(format!(
                "{} target price must be positive, got {}",
                self.ticker, self.target_price
            )));
        }
        Ok(())
    }

    /// BUY fires at or below the target, SELL at or above it.
    pub fn is_hit(&self, current_price: Decimal) -> bool {
        match self.action {
            TargetAction::Buy => current_price <= self.target_price,
            TargetAction::Sell => current_price >= self.target_price,
        }
    }

    /// Store key: ticker, action and target price
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.ticker, self.action, self.target_price.normalize())
    }
}

/// Alerts already shown, keyed by [`PriceTarget::key`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShownAlerts {
    shown: BTreeMap<String, bool>,
}

impl ShownAlerts {
    pub fn is_shown(&self, target: &PriceTarget) -> bool {
        self.shown.get(&target.key()).copied().unwrap_or(false)
    }

    pub fn mark_shown(&mut self, target: &PriceTarget) {
        self.shown.insert(target.key(), true);
    }

    /// Allow a target to fire again
    pub fn reset(&mut self, target: &PriceTarget) {
        self.shown.remove(&target.key());
    }

    pub fn len(&self) -> usize {
        self.shown.values().filter(|shown| **shown).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredAlert {
    pub ticker: String,
    pub action: TargetAction,
    pub target_price: Decimal,
    pub current_price: Decimal,
    pub message: String,
}

/// Evaluate targets against current prices.
///
/// Targets without a price are skipped. A hit target is reported once:
/// it is marked in `shown` and ignored on later evaluations.
pub fn evaluate_targets<F>(
    targets: &[PriceTarget],
    price_lookup: F,
    shown: &mut ShownAlerts,
) -> Vec<TriggeredAlert>
where
    F: Fn(&str) -> Option<Decimal>,
{
    let mut triggered = Vec::new();

    for target in targets {
        let Some(current_price) = price_lookup(&target.ticker) else {
            continue;
        };
        if !target.is_hit(current_price) || shown.is_shown(target) {
            continue;
        }

        shown.mark_shown(target);
        let message = format!(
            "Target {} {} hit: current {} target {}",
            target.ticker,
            target.action,
            current_price.normalize(),
            target.target_price.normalize()
        );
        info!("{}", message);

        triggered.push(TriggeredAlert {
            ticker: target.ticker.clone(),
            action: target.action,
            target_price: target.target_price,
            current_price,
            message,
        });
    }

    triggered
}
