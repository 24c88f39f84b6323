//! Tax Engine
//!
//! Lot-level capital gains accounting: FIFO sell matching, holding-period
//! classification and short/long-term tax estimates.

pub mod error;
pub mod lot;
pub mod lot_matcher;
pub mod tax_calculator;

pub use error::{TaxError, TaxResult};
pub use lot::{checked_value, lot_totals, HoldingPeriod, Lot, SellRequest, TaxRules};
pub use lot_matcher::{match_sell, ConsumedLot, LotMatch};
pub use tax_calculator::{LongTermOutlook, LotTaxDetail, TaxCalculator, TaxEstimate};
