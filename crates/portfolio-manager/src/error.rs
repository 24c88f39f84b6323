use tax_engine::TaxError;
use thiserror::Error;

pub type PortfolioResult<T> = Result<T, PortfolioError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortfolioError {
    #[error(transparent)]
    Tax(#[from] TaxError),

    #[error("Invalid price target: {0}")]
    InvalidTarget(String),
}
