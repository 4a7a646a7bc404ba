//! # Customer Features
//!
//! Customer Features is a small feature-engineering library that converts order-level
//! transaction records into a customer-level feature table suitable for downstream
//! modeling (segmentation, churn prediction, and similar tasks). It is built on
//! [Apache DataFusion](https://datafusion.apache.org/) and Arrow.
//!
//! The library has two components, used in strict order:
//!
//! 1. [`features::CustomerFeatureBuilder`] — a deterministic aggregation that turns
//!    many order rows into one RFM-style (Recency, Frequency, Monetary) feature row
//!    per customer, returning the reference timestamp it used for recency alongside
//!    the table.
//! 2. [`preprocessor::Preprocessor`] — a stateful fit/transform wrapper that learns a
//!    city encoding and per-feature standardization statistics from training data
//!    (`fit`) and applies those same parameters to any compatible dataset
//!    (`transform`).
//!
//! Transformers implement the [`pipeline::Transformer`] trait and can be chained with
//! [`pipeline::Pipeline`].
//!
//! ### Example
//!
//! ```rust,no_run
//! use customer_features::exceptions::CustomerFeaturesResult;
//! use customer_features::preprocessor::Preprocessor;
//! use datafusion::prelude::*;
//!
//! async fn run(orders: &DataFrame) -> CustomerFeaturesResult<()> {
//!     let mut preprocessor = Preprocessor::new();
//!     preprocessor.fit(orders).await?;
//!     let customer_table = preprocessor.transform(orders).await?;
//!     let batches = customer_table.collect().await?;
//!     println!("{} batches of customer features", batches.len());
//!     Ok(())
//! }
//! ```

pub mod exceptions;
pub mod features;
pub mod logging;
pub mod pipeline;
pub mod preprocessor;
