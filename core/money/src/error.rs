use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("ConversionError - Negative: {0}")]
    Negative(Decimal),
    #[error("ConversionError - FractionalCents: {0}")]
    FractionalCents(Decimal),
    #[error("ConversionError - Overflow: {0}")]
    Overflow(Decimal),
}
