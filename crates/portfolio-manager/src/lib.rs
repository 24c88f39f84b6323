pub mod alerts;
pub mod cash_flows;
pub mod error;
pub mod holdings;
pub mod models;
pub mod portfolio;
pub mod shared_math;

pub use alerts::{evaluate_targets, PriceTarget, ShownAlerts, TargetAction, TriggeredAlert};
pub use cash_flows::CashFlow;
pub use error::{PortfolioError, PortfolioResult};
pub use holdings::Holdings;
pub use models::*;
pub use portfolio::PortfolioManager;
