//! Contract validation errors.

use thiserror::Error;

/// Errors raised when a command or event is constructed with invalid fields.
#[derive(Debug, Error)]
pub enum ContractError {
    /// A required string field was empty.
    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// The order had no line items.
    #[error("Order must contain at least one item")]
    NoItems,

    /// A line item had a zero quantity.
    #[error("Item '{0}' has zero quantity")]
    ZeroQuantity(String),

    /// The order total did not match the sum of line totals.
    #[error("Order total {declared} does not match item sum {computed}")]
    TotalMismatch { declared: String, computed: String },

    /// A monetary amount was not positive.
    #[error("Amount for '{0}' must be positive")]
    NonPositiveAmount(&'static str),

    /// Line totals exceeded the representable amount.
    #[error("Order amounts overflow the representable range")]
    AmountOverflow,
}

/// Result type for contract construction.
pub type Result<T> = std::result::Result<T, ContractError>;
