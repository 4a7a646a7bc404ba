//! ## Customer Feature Construction
//!
//! This module turns order-level transaction rows into a customer-level feature table
//! with RFM-style (Recency, Frequency, Monetary) features.
//!
//! The builder consumes a DataFrame of order line items (one row per line item, so an
//! order identifier and a customer identifier may repeat across rows) and produces one
//! row per distinct customer with the following columns:
//!
//! - `order_count`: number of distinct orders.
//! - `unique_item_count`: number of distinct items across all orders.
//! - `total_quantity`: sum of line-item quantities.
//! - `total_spent`: sum of gross amounts over line items (not de-duplicated per order).
//! - `max_order_value`: maximum gross amount observed.
//! - `city_name_fa`: first-observed city value.
//! - `average_order_value`, `average_quantity_per_order`, `item_variety_ratio`:
//!   derived ratios; a non-finite `item_variety_ratio` is replaced with `0`.
//! - `days_since_last_order`: whole days between the reference timestamp and the
//!   customer's most recent order.
//!
//! The reference timestamp ("now") is the maximum order-finalize timestamp in the
//! dataset being processed, and it is returned alongside the table rather than stored,
//! so repeated invocations cannot interfere with each other.
//!
//! Errors are returned as [`CustomerFeaturesError`] and results are wrapped in
//! [`CustomerFeaturesResult`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampNanosecondArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use datafusion::prelude::*;
use tracing::debug;

use crate::exceptions::{CustomerFeaturesError, CustomerFeaturesResult};

/// Name of the customer identifier column in the order-level input.
pub const CUSTOMER_ID: &str = "ID_Customer";
/// Name of the order identifier column in the order-level input.
pub const ORDER_ID: &str = "ID_Order";
/// Name of the item identifier column in the order-level input.
pub const ITEM_ID: &str = "ID_Item";
/// Name of the line-item quantity column in the order-level input.
pub const QUANTITY: &str = "Quantity_item";
/// Name of the order gross-amount column in the order-level input.
pub const GROSS_AMOUNT: &str = "Amount_Gross_Order";
/// Name of the order-finalize timestamp column in the order-level input.
pub const CART_FINALIZE: &str = "DateTime_CartFinalize";
/// Name of the city column, both in the input and in the customer feature table.
pub const CITY: &str = "city_name_fa";

/// Timestamp formats accepted for a string-typed `DateTime_CartFinalize` column.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Running aggregation state for one customer.
struct CustomerAccumulator {
    orders: HashSet<i64>,
    items: HashSet<i64>,
    total_quantity: i64,
    total_spent: f64,
    max_order_value: f64,
    last_order: NaiveDateTime,
    city: String,
}

impl CustomerAccumulator {
    fn new(city: String, first_seen: NaiveDateTime) -> Self {
        Self {
            orders: HashSet::new(),
            items: HashSet::new(),
            total_quantity: 0,
            total_spent: 0.0,
            max_order_value: f64::MIN,
            last_order: first_seen,
            city,
        }
    }

    fn update(&mut self, order: i64, item: i64, quantity: i64, amount: f64, ts: NaiveDateTime) {
        self.orders.insert(order);
        self.items.insert(item);
        self.total_quantity += quantity;
        self.total_spent += amount;
        self.max_order_value = self.max_order_value.max(amount);
        if ts > self.last_order {
            self.last_order = ts;
        }
    }
}

/// Builds the customer-level feature table from order-level rows.
///
/// The builder is stateless: every call to [`CustomerFeatureBuilder::build`] recomputes
/// everything, including the reference timestamp, from the dataset it is given.
pub struct CustomerFeatureBuilder;

impl CustomerFeatureBuilder {
    /// Aggregates the order rows into one feature row per distinct customer and returns
    /// the resulting DataFrame together with the reference timestamp used for the
    /// recency computation.
    ///
    /// Customer rows are emitted in ascending order of customer identifier.
    ///
    /// # Errors
    ///
    /// - [`CustomerFeaturesError::EmptyDataset`] if the input has no rows.
    /// - [`CustomerFeaturesError::MissingColumn`] if a consumed column is absent.
    /// - [`CustomerFeaturesError::MalformedTimestamp`] if any `DateTime_CartFinalize`
    ///   value cannot be parsed.
    /// - [`CustomerFeaturesError::InvalidParameter`] if a consumed column has an
    ///   unusable type or contains nulls.
    pub async fn build(df: &DataFrame) -> CustomerFeaturesResult<(DataFrame, NaiveDateTime)> {
        let batches = df.clone().collect().await?;
        let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        if total_rows == 0 {
            return Err(CustomerFeaturesError::EmptyDataset(
                "no order rows to aggregate".to_string(),
            ));
        }

        let mut groups: BTreeMap<i64, CustomerAccumulator> = BTreeMap::new();
        let mut reference: Option<NaiveDateTime> = None;

        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let customers = i64_column(batch, CUSTOMER_ID)?;
            let orders = i64_column(batch, ORDER_ID)?;
            let items = i64_column(batch, ITEM_ID)?;
            let quantities = i64_column(batch, QUANTITY)?;
            let amounts = f64_column(batch, GROSS_AMOUNT)?;
            let timestamps = timestamp_column(batch, CART_FINALIZE)?;
            let cities = string_column(batch, CITY)?;

            for i in 0..batch.num_rows() {
                let ts = timestamps[i];
                if reference.map_or(true, |r| ts > r) {
                    reference = Some(ts);
                }
                groups
                    .entry(customers[i])
                    .or_insert_with(|| CustomerAccumulator::new(cities[i].clone(), ts))
                    .update(orders[i], items[i], quantities[i], amounts[i], ts);
            }
        }

        let reference = reference.ok_or_else(|| {
            CustomerFeaturesError::EmptyDataset("no order rows to aggregate".to_string())
        })?;

        debug!(
            rows = total_rows,
            customers = groups.len(),
            reference = %reference,
            "aggregated order rows into customer features"
        );

        let customer_count = groups.len();
        let mut customer_ids = Vec::with_capacity(customer_count);
        let mut order_counts = Vec::with_capacity(customer_count);
        let mut unique_item_counts = Vec::with_capacity(customer_count);
        let mut total_quantities = Vec::with_capacity(customer_count);
        let mut total_spents = Vec::with_capacity(customer_count);
        let mut max_order_values = Vec::with_capacity(customer_count);
        let mut city_names = Vec::with_capacity(customer_count);
        let mut average_order_values = Vec::with_capacity(customer_count);
        let mut average_quantities = Vec::with_capacity(customer_count);
        let mut variety_ratios = Vec::with_capacity(customer_count);
        let mut days_since = Vec::with_capacity(customer_count);

        for (customer, acc) in groups {
            let order_count = acc.orders.len() as i64;
            let unique_item_count = acc.items.len() as i64;

            customer_ids.push(customer);
            order_counts.push(order_count);
            unique_item_counts.push(unique_item_count);
            total_quantities.push(acc.total_quantity);
            total_spents.push(acc.total_spent);
            max_order_values.push(acc.max_order_value);
            city_names.push(acc.city);
            average_order_values.push(acc.total_spent / order_count as f64);
            average_quantities.push(acc.total_quantity as f64 / order_count as f64);

            // Division by a zero total quantity is the one sanctioned numeric edge
            // case: the ratio collapses to 0 instead of surfacing inf/NaN.
            let ratio = unique_item_count as f64 / acc.total_quantity as f64;
            variety_ratios.push(if ratio.is_finite() { ratio } else { 0.0 });

            days_since.push((reference - acc.last_order).num_days());
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new(CUSTOMER_ID, DataType::Int64, false),
            Field::new("order_count", DataType::Int64, false),
            Field::new("unique_item_count", DataType::Int64, false),
            Field::new("total_quantity", DataType::Int64, false),
            Field::new("total_spent", DataType::Float64, false),
            Field::new("max_order_value", DataType::Float64, false),
            Field::new(CITY, DataType::Utf8, false),
            Field::new("average_order_value", DataType::Float64, false),
            Field::new("average_quantity_per_order", DataType::Float64, false),
            Field::new("item_variety_ratio", DataType::Float64, false),
            Field::new("days_since_last_order", DataType::Int64, false),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(customer_ids)),
            Arc::new(Int64Array::from(order_counts)),
            Arc::new(Int64Array::from(unique_item_counts)),
            Arc::new(Int64Array::from(total_quantities)),
            Arc::new(Float64Array::from(total_spents)),
            Arc::new(Float64Array::from(max_order_values)),
            Arc::new(StringArray::from(city_names)),
            Arc::new(Float64Array::from(average_order_values)),
            Arc::new(Float64Array::from(average_quantities)),
            Arc::new(Float64Array::from(variety_ratios)),
            Arc::new(Int64Array::from(days_since)),
        ];
        let batch = RecordBatch::try_new(schema, columns)?;

        let ctx = SessionContext::new();
        let customer_df = ctx.read_batch(batch)?;
        Ok((customer_df, reference))
    }
}

/// Looks up a column by name, mapping an absent column to `MissingColumn`.
fn column_by_name<'a>(batch: &'a RecordBatch, name: &str) -> CustomerFeaturesResult<&'a ArrayRef> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| CustomerFeaturesError::MissingColumn(name.to_string()))?;
    Ok(batch.column(index))
}

/// Reads an integer-typed column as `i64` values, widening narrower integer types.
fn i64_column(batch: &RecordBatch, name: &str) -> CustomerFeaturesResult<Vec<i64>> {
    let array = column_by_name(batch, name)?;
    if !array.data_type().is_integer() {
        return Err(CustomerFeaturesError::InvalidParameter(format!(
            "column '{}' is not integer-typed (found {:?})",
            name,
            array.data_type()
        )));
    }
    let array = cast(array, &DataType::Int64)?;
    let array = array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| {
            CustomerFeaturesError::InvalidParameter(format!(
                "column '{}' is not integer-typed",
                name
            ))
        })?;
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Err(CustomerFeaturesError::InvalidParameter(format!(
                    "null value in column '{}'",
                    name
                )))
            } else {
                Ok(array.value(i))
            }
        })
        .collect()
}

/// Reads a numeric column as `f64` values, widening integer types.
pub(crate) fn f64_column(batch: &RecordBatch, name: &str) -> CustomerFeaturesResult<Vec<f64>> {
    let array = column_by_name(batch, name)?;
    if !array.data_type().is_numeric() {
        return Err(CustomerFeaturesError::InvalidParameter(format!(
            "column '{}' is not numeric (found {:?})",
            name,
            array.data_type()
        )));
    }
    let array = cast(array, &DataType::Float64)?;
    let array = array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| {
            CustomerFeaturesError::InvalidParameter(format!("column '{}' is not numeric", name))
        })?;
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Err(CustomerFeaturesError::InvalidParameter(format!(
                    "null value in column '{}'",
                    name
                )))
            } else {
                Ok(array.value(i))
            }
        })
        .collect()
}

/// Reads a string-typed column as owned `String` values.
fn string_column(batch: &RecordBatch, name: &str) -> CustomerFeaturesResult<Vec<String>> {
    let array = column_by_name(batch, name)?;
    if !matches!(array.data_type(), DataType::Utf8 | DataType::LargeUtf8) {
        return Err(CustomerFeaturesError::InvalidParameter(format!(
            "column '{}' is not string-typed (found {:?})",
            name,
            array.data_type()
        )));
    }
    let array = cast(array, &DataType::Utf8)?;
    let array = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            CustomerFeaturesError::InvalidParameter(format!(
                "column '{}' is not string-typed",
                name
            ))
        })?;
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Err(CustomerFeaturesError::InvalidParameter(format!(
                    "null value in column '{}'",
                    name
                )))
            } else {
                Ok(array.value(i).to_string())
            }
        })
        .collect()
}

/// Reads the order-finalize column as date-time values.
///
/// Accepts either a string column (parsed with [`TIMESTAMP_FORMATS`], plus a date-only
/// fallback) or an Arrow timestamp column of any unit.
fn timestamp_column(batch: &RecordBatch, name: &str) -> CustomerFeaturesResult<Vec<NaiveDateTime>> {
    let array = column_by_name(batch, name)?;
    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => {
            let array = cast(array, &DataType::Utf8)?;
            let array = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    CustomerFeaturesError::MalformedTimestamp(format!(
                        "column '{}' could not be read as strings",
                        name
                    ))
                })?;
            (0..array.len())
                .map(|i| {
                    if array.is_null(i) {
                        Err(CustomerFeaturesError::MalformedTimestamp(format!(
                            "null timestamp in column '{}'",
                            name
                        )))
                    } else {
                        parse_timestamp(array.value(i))
                    }
                })
                .collect()
        }
        DataType::Timestamp(_, _) => {
            let array = cast(array, &DataType::Timestamp(TimeUnit::Nanosecond, None))?;
            let array = array
                .as_any()
                .downcast_ref::<TimestampNanosecondArray>()
                .ok_or_else(|| {
                    CustomerFeaturesError::MalformedTimestamp(format!(
                        "column '{}' could not be read as timestamps",
                        name
                    ))
                })?;
            (0..array.len())
                .map(|i| {
                    if array.is_null(i) {
                        Err(CustomerFeaturesError::MalformedTimestamp(format!(
                            "null timestamp in column '{}'",
                            name
                        )))
                    } else {
                        array.value_as_datetime(i).ok_or_else(|| {
                            CustomerFeaturesError::MalformedTimestamp(format!(
                                "timestamp value {} is out of range",
                                array.value(i)
                            ))
                        })
                    }
                })
                .collect()
        }
        other => Err(CustomerFeaturesError::InvalidParameter(format!(
            "column '{}' must be a string or timestamp column, found {:?}",
            name, other
        ))),
    }
}

/// Parses a raw timestamp string into a date-time, accepting a date-only value as
/// midnight of that day.
fn parse_timestamp(raw: &str) -> CustomerFeaturesResult<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(CustomerFeaturesError::MalformedTimestamp(raw.to_string()))
}
