//! ## Custom Errors for Customer Features
//!
//! This module defines custom error types for the Customer Features library.
//! It uses the `thiserror` crate to derive the `Error` trait for custom error types.
//! The `CustomerFeaturesError` enum includes variants representing the failure modes
//! of the feature-building and fit/transform stages, making error handling
//! straightforward and clear.
//!
//! The `CustomerFeaturesResult` type alias simplifies error handling by providing a
//! convenient alias for results returned by the library.
//!
//! ### Example
//!
//! ```rust
//! use customer_features::exceptions::{CustomerFeaturesError, CustomerFeaturesResult};
//!
//! fn check_rows(row_count: usize) -> CustomerFeaturesResult<()> {
//!     if row_count == 0 {
//!         return Err(CustomerFeaturesError::EmptyDataset(
//!             "no order rows to aggregate".into(),
//!         ));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Errors specific to the Customer Features library.
#[derive(Debug, Error)]
pub enum CustomerFeaturesError {
    /// Wraps errors from DataFusion.
    #[error("DataFusion error: {0}")]
    DataFusionError(#[from] datafusion::error::DataFusionError),

    /// Wraps errors from Arrow.
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Indicates that `fit` or `transform` was invoked with zero input rows.
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// Indicates that an order-finalize value could not be parsed as a date-time.
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),

    /// Indicates that an expected input column is absent from the data being processed.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Indicates that the feature columns learned at fit time do not match the columns
    /// produced for the current dataset.
    #[error("Schema drift: {0}")]
    SchemaDrift(String),

    /// Indicates that a category value seen at transform time was never seen during fit.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// Indicates the transform method was called before a successful fit.
    #[error("Transform called before fit")]
    NotFitted,

    /// Indicates that an invalid parameter was provided (e.g., unsupported value or incorrect data type).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// A convenient result type for Customer Features operations.
pub type CustomerFeaturesResult<T> = std::result::Result<T, CustomerFeaturesError>;
