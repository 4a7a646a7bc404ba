//! ## Preprocessing Pipeline
//!
//! This module provides core abstractions for building, fitting, and transforming data using
//! composable pipelines of transformers in the Customer Features library.
//!
//! ### Overview
//!
//! - The [`Transformer`] trait defines a common interface for implementing data transformation steps,
//!   supporting both stateful (requiring fitting) and stateless transformations. Both `fit` and
//!   `transform` are asynchronous because transformers collect DataFusion batches to learn and
//!   validate their parameters.
//! - The [`Pipeline`] struct enables chaining multiple transformers into a cohesive data
//!   transformation pipeline, supporting both fitting and transforming operations.
//! - Macros [`crate::impl_transformer`] and [`crate::make_pipeline`] simplify the creation and
//!   implementation of transformers and pipelines.

use crate::exceptions::{CustomerFeaturesError, CustomerFeaturesResult};
use async_trait::async_trait;
use datafusion::prelude::*;
use std::time::Instant;

/// Trait for components used in the data transformation pipeline.
///
/// Every transformer must provide a `fit` method (which may collect data to compute parameters)
/// and a `transform` method (which produces a new DataFrame with the transformation applied).
#[async_trait]
pub trait Transformer {
    /// Fit the transformer given a DataFrame.
    ///
    /// # Arguments
    ///
    /// * `df` - The input DataFrame.
    ///
    /// # Returns
    ///
    /// * `CustomerFeaturesResult<()>` - Returns Ok if successful, or an error otherwise.
    async fn fit(&mut self, df: &DataFrame) -> CustomerFeaturesResult<()>;

    /// Transform the input DataFrame, returning a new DataFrame with the transformation applied.
    ///
    /// # Arguments
    ///
    /// * `df` - The input DataFrame.
    ///
    /// # Returns
    ///
    /// * `CustomerFeaturesResult<DataFrame>` - The transformed DataFrame or an error if
    ///   transformation fails.
    async fn transform(&self, df: &DataFrame) -> CustomerFeaturesResult<DataFrame>;

    /// Returns true if the transformer is stateful (i.e. requires a call to fit before transform
    /// can be called).
    fn is_stateful(&self) -> bool;
}

/// Macro to implement the [`Transformer`] trait for Customer Features transformers.
///
/// The type must already have inherent methods:
/// - `async fn fit(&mut self, &DataFrame) -> CustomerFeaturesResult<()>`
/// - `async fn transform(&self, &DataFrame) -> CustomerFeaturesResult<DataFrame>`
/// - **`fn inherent_is_stateful(&self) -> bool`**
///
/// # Example
///
/// ```rust,no_run
/// use customer_features::exceptions::CustomerFeaturesResult;
/// use datafusion::prelude::DataFrame;
/// // Import the macro.
/// use customer_features::impl_transformer;
///
/// // Suppose you have a transformer type `MyTransformer` defined elsewhere:
/// pub struct MyTransformer { /* ... */ }
///
/// impl MyTransformer {
///     pub async fn fit(&mut self, df: &DataFrame) -> CustomerFeaturesResult<()> {
///         // Implementation here...
///         Ok(())
///     }
///
///     pub async fn transform(&self, df: &DataFrame) -> CustomerFeaturesResult<DataFrame> {
///         // Implementation here...
///         Ok(df.clone())
///     }
///
///     // Note the different name for the inherent method.
///     pub fn inherent_is_stateful(&self) -> bool {
///         true // or false
///     }
/// }
///
/// // Then simply invoke the macro to implement the Transformer trait:
/// impl_transformer!(MyTransformer);
/// ```
#[macro_export]
macro_rules! impl_transformer {
    ($ty:ty) => {
        #[async_trait::async_trait]
        impl $crate::pipeline::Transformer for $ty {
            async fn fit(
                &mut self,
                df: &datafusion::prelude::DataFrame,
            ) -> $crate::exceptions::CustomerFeaturesResult<()> {
                <$ty>::fit(self, df).await
            }
            async fn transform(
                &self,
                df: &datafusion::prelude::DataFrame,
            ) -> $crate::exceptions::CustomerFeaturesResult<datafusion::prelude::DataFrame> {
                <$ty>::transform(self, df).await
            }
            fn is_stateful(&self) -> bool {
                <$ty>::inherent_is_stateful(self)
            }
        }
    };
}

/// A pipeline that chains a sequence of transformers.
///
/// Each transformer's output is passed as input to the next transformer, so a fitted
/// pipeline applies its steps in declaration order.
pub struct Pipeline {
    steps: Vec<(String, Box<dyn Transformer + Send + Sync>)>,
    verbose: bool,
}

impl Pipeline {
    /// Creates a new pipeline.
    ///
    /// # Arguments
    ///
    /// * `steps` - A vector of (name, transformer) pairs (each transformer is already boxed).
    /// * `verbose` - If true, prints timing information.
    pub fn new(steps: Vec<(String, Box<dyn Transformer + Send + Sync>)>, verbose: bool) -> Self {
        Self { steps, verbose }
    }

    /// Fits each transformer (sequentially), feeding each step the output of the previous one.
    pub async fn fit(&mut self, df: &DataFrame) -> CustomerFeaturesResult<DataFrame> {
        if self.steps.is_empty() {
            return Err(CustomerFeaturesError::InvalidParameter(
                "Pipeline must have at least one transformer.".to_string(),
            ));
        }
        let mut current_df = df.clone();
        for (name, step) in self.steps.iter_mut() {
            if self.verbose {
                println!("Fitting step: {}", name);
            }
            let start = Instant::now();
            step.fit(&current_df).await.map_err(|e| {
                CustomerFeaturesError::InvalidParameter(format!(
                    "Error fitting transformer '{}': {:?}",
                    name, e
                ))
            })?;
            current_df = step.transform(&current_df).await.map_err(|e| {
                CustomerFeaturesError::InvalidParameter(format!(
                    "Error transforming in '{}': {:?}",
                    name, e
                ))
            })?;
            if self.verbose {
                println!("Step '{}' completed in {:?}", name, start.elapsed());
            }
        }
        Ok(current_df)
    }

    /// Applies the `transform` method of each transformer (without fitting).
    pub async fn transform(&self, df: &DataFrame) -> CustomerFeaturesResult<DataFrame> {
        if self.steps.is_empty() {
            return Err(CustomerFeaturesError::InvalidParameter(
                "Pipeline must have at least one transformer.".to_string(),
            ));
        }
        let mut current_df = df.clone();
        for (name, step) in self.steps.iter() {
            if self.verbose {
                println!("Applying transformer: {}", name);
            }
            current_df = step.transform(&current_df).await.map_err(|e| {
                CustomerFeaturesError::InvalidParameter(format!(
                    "Error in transformer '{}': {:?}",
                    name, e
                ))
            })?;
        }
        Ok(current_df)
    }

    /// Convenience method to call `fit` and then return the final transformed DataFrame.
    pub async fn fit_transform(&mut self, df: &DataFrame) -> CustomerFeaturesResult<DataFrame> {
        self.fit(df).await
    }
}

/// Macro to simplify pipeline creation by automatically boxing transformers.
///
/// # Example
///
/// ```rust,no_run
/// use customer_features::make_pipeline;
/// use customer_features::preprocessor::Preprocessor;
///
/// // Create a pipeline with a single step.
/// let pipeline = make_pipeline!(false,
///     ("preprocess", Preprocessor::new()),
/// );
/// ```
#[macro_export]
macro_rules! make_pipeline {
    ($verbose:expr, $(($name:expr, $transformer:expr)),+ $(,)?) => {
        {
            let steps: Vec<(String, Box<dyn $crate::pipeline::Transformer + Send + Sync>)> = vec![
                $(
                    ($name.to_string(), Box::new($transformer)),
                )+
            ];
            $crate::pipeline::Pipeline::new(steps, $verbose)
        }
    };
}
