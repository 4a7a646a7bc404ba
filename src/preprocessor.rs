//! ## Fit/Transform Preprocessor
//!
//! This module implements the stateful preprocessor that prepares the customer feature
//! table for downstream modeling. It follows the fit/transform contract:
//!
//! - **`fit`** invokes the [`CustomerFeatureBuilder`] on training data and learns two
//!   sets of parameters from the resulting customer table: an integer encoding for the
//!   city column (codes assigned in lexicographic order of the raw values) and
//!   per-column standardization statistics (mean and population standard deviation)
//!   for every numeric feature column except the customer identifier.
//! - **`transform`** invokes the builder again on arbitrary data (the training set or
//!   new data) and applies the previously learned parameters: the city column is
//!   replaced by its integer code and every learned feature column is rescaled as
//!   `(value - mean) / std_dev`.
//!
//! The encoding is strict: a city value never seen during `fit` fails the call with
//! [`CustomerFeaturesError::UnknownCategory`] rather than falling into an
//! "unseen" bucket. The feature-column list is fixed at fit time and validated (not
//! re-derived) on every transform; a learned column missing from the current table
//! fails with [`CustomerFeaturesError::SchemaDrift`]. A learned standard deviation of
//! zero is applied as-is, so the affected column surfaces non-finite values instead of
//! being silently patched.
//!
//! A second `fit` call re-learns both parameter sets and replaces the previous state.

use std::collections::BTreeMap;
use std::ops::{Div, Sub};

use arrow::array::Array;
use datafusion::prelude::*;
use datafusion_expr::{col, lit, Case as DFCase, Expr};
use tracing::debug;

use crate::exceptions::{CustomerFeaturesError, CustomerFeaturesResult};
use crate::features::{self, CustomerFeatureBuilder, CITY, CUSTOMER_ID};
use crate::impl_transformer;

/// Standardization statistics for one feature column, learned at fit time.
#[derive(Debug, Clone)]
pub struct FeatureStats {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
}

/// Stateful preprocessor turning order rows into a model-ready customer feature table.
///
/// Both learned-parameter fields are `None` until a successful [`Preprocessor::fit`];
/// calling [`Preprocessor::transform`] before that fails with
/// [`CustomerFeaturesError::NotFitted`].
pub struct Preprocessor {
    /// City value -> integer code, ordered lexicographically over the fit-time values.
    pub city_mapping: Option<BTreeMap<String, i64>>,
    /// Mean and standard deviation per feature column, in the fixed fit-time order.
    pub feature_stats: Option<Vec<FeatureStats>>,
}

impl Preprocessor {
    /// Creates an unfitted preprocessor.
    pub fn new() -> Self {
        Self {
            city_mapping: None,
            feature_stats: None,
        }
    }

    /// Learns the city encoding and the standardization statistics from the customer
    /// feature table built from `df`.
    ///
    /// The feature-column list is every numeric column of the customer table except
    /// the customer identifier; it is fixed here and reused verbatim by every
    /// subsequent [`Preprocessor::transform`].
    ///
    /// # Errors
    ///
    /// - [`CustomerFeaturesError::EmptyDataset`] if `df` has no rows.
    /// - [`CustomerFeaturesError::MalformedTimestamp`] and the other feature-builder
    ///   errors, propagated unchanged.
    pub async fn fit(&mut self, df: &DataFrame) -> CustomerFeaturesResult<()> {
        let (customer_df, _reference) = CustomerFeatureBuilder::build(df).await?;

        let mut cities = distinct_city_values(&customer_df).await?;
        cities.sort();
        cities.dedup();
        let mapping: BTreeMap<String, i64> = cities
            .into_iter()
            .enumerate()
            .map(|(code, city)| (city, code as i64))
            .collect();

        let feature_columns: Vec<String> = customer_df
            .schema()
            .fields()
            .iter()
            .filter(|field| field.data_type().is_numeric() && field.name() != CUSTOMER_ID)
            .map(|field| field.name().clone())
            .collect();

        let batches = customer_df.collect().await?;
        let mut stats = Vec::with_capacity(feature_columns.len());
        for name in &feature_columns {
            let mut values = Vec::new();
            for batch in &batches {
                values.extend(features::f64_column(batch, name)?);
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            stats.push(FeatureStats {
                name: name.clone(),
                mean,
                std_dev: variance.sqrt(),
            });
        }

        debug!(
            categories = mapping.len(),
            features = stats.len(),
            "learned preprocessing parameters"
        );

        self.city_mapping = Some(mapping);
        self.feature_stats = Some(stats);
        Ok(())
    }

    /// Builds the customer feature table from `df` and applies the learned city
    /// encoding and standardization, returning a lazy DataFrame.
    ///
    /// # Errors
    ///
    /// - [`CustomerFeaturesError::NotFitted`] if called before a successful fit.
    /// - [`CustomerFeaturesError::UnknownCategory`] if a city value was never seen
    ///   during fit (the message names the value).
    /// - [`CustomerFeaturesError::SchemaDrift`] if a learned feature column is missing
    ///   from the current customer table.
    /// - Feature-builder errors, propagated unchanged.
    pub async fn transform(&self, df: &DataFrame) -> CustomerFeaturesResult<DataFrame> {
        let mapping = self
            .city_mapping
            .as_ref()
            .ok_or(CustomerFeaturesError::NotFitted)?;
        let stats = self
            .feature_stats
            .as_ref()
            .ok_or(CustomerFeaturesError::NotFitted)?;

        let (customer_df, _reference) = CustomerFeatureBuilder::build(df).await?;

        // Strict encoding: every category must have been seen during fit.
        for city in distinct_city_values(&customer_df).await? {
            if !mapping.contains_key(&city) {
                return Err(CustomerFeaturesError::UnknownCategory(city));
            }
        }

        // The learned feature list is validated against the current schema, never
        // re-derived from it.
        for stat in stats {
            if customer_df.schema().field_with_name(None, &stat.name).is_err() {
                return Err(CustomerFeaturesError::SchemaDrift(format!(
                    "feature column '{}' learned at fit time is missing from the current dataset",
                    stat.name
                )));
            }
        }

        let exprs: Vec<Expr> = customer_df
            .schema()
            .fields()
            .iter()
            .map(|field| {
                let name = field.name();
                if name == CITY {
                    city_code_expr(mapping).alias(name)
                } else if let Some(stat) = stats.iter().find(|s| &s.name == name) {
                    ident(name)
                        .sub(lit(stat.mean))
                        .div(lit(stat.std_dev))
                        .alias(name)
                } else {
                    ident(name)
                }
            })
            .collect();
        customer_df.select(exprs).map_err(CustomerFeaturesError::from)
    }

    /// The preprocessor carries learned parameters, so it must be fitted before use.
    pub fn inherent_is_stateful(&self) -> bool {
        true
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl_transformer!(Preprocessor);

/// Builds a CASE WHEN expression replacing each city value with its learned code.
/// The mapping was validated beforehand, so the ELSE branch is never reached.
fn city_code_expr(mapping: &BTreeMap<String, i64>) -> Expr {
    let when_then_expr = mapping
        .iter()
        .map(|(city, code)| {
            (
                Box::new(col(CITY).eq(lit(city.clone()))),
                Box::new(lit(*code)),
            )
        })
        .collect();
    Expr::Case(DFCase {
        expr: None,
        when_then_expr,
        else_expr: None,
    })
}

/// Extracts the distinct city values from a customer feature table.
async fn distinct_city_values(df: &DataFrame) -> CustomerFeaturesResult<Vec<String>> {
    let distinct_df = df.clone().select(vec![col(CITY)])?.distinct()?;
    let batches = distinct_df
        .collect()
        .await
        .map_err(CustomerFeaturesError::from)?;
    let mut values = Vec::new();
    for batch in batches {
        let array = batch
            .column(0)
            .as_any()
            .downcast_ref::<datafusion::arrow::array::StringArray>()
            .ok_or_else(|| {
                CustomerFeaturesError::DataFusionError(datafusion::error::DataFusionError::Plan(
                    format!("Expected Utf8 array for column {}", CITY),
                ))
            })?;
        for i in 0..array.len() {
            if !array.is_null(i) {
                values.push(array.value(i).to_string());
            }
        }
    }
    Ok(values)
}
