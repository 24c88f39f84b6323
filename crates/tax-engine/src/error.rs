use thiserror::Error;

pub type TaxResult<T> = Result<T, TaxError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxError {
    #[error("Insufficient holdings for {ticker}: requested {requested}, held {held}")]
    InsufficientHoldings {
        ticker: String,
        requested: u64,
        held: u64,
    },

    #[error("Invalid lot: {0}")]
    InvalidLot(String),

    #[error("Invalid sell request: {0}")]
    InvalidSell(String),

    #[error("Invalid tax rate: {0}")]
    InvalidRate(String),

    #[error("Amount out of range: {0}")]
    Overflow(String),
}
