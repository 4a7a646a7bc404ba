use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use datafusion::datasource::memory::MemTable;
use datafusion::prelude::*;

use customer_features::exceptions::CustomerFeaturesError;
use customer_features::make_pipeline;
use customer_features::pipeline::Pipeline;
use customer_features::preprocessor::Preprocessor;

/// Helper to build an order-level DataFrame from
/// (customer, order, item, quantity, amount, finalize timestamp, city) tuples.
async fn orders_df(rows: &[(i64, i64, i64, i64, f64, &str, &str)]) -> DataFrame {
    let schema = Arc::new(Schema::new(vec![
        Field::new("ID_Customer", DataType::Int64, false),
        Field::new("ID_Order", DataType::Int64, false),
        Field::new("ID_Item", DataType::Int64, false),
        Field::new("Quantity_item", DataType::Int64, false),
        Field::new("Amount_Gross_Order", DataType::Float64, false),
        Field::new("DateTime_CartFinalize", DataType::Utf8, false),
        Field::new("city_name_fa", DataType::Utf8, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.4).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.5).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.6).collect::<Vec<_>>())),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
    let mem_table = MemTable::try_new(schema, vec![vec![batch]]).unwrap();
    let ctx = SessionContext::new();
    ctx.register_table("orders", Arc::new(mem_table)).unwrap();
    ctx.table("orders").await.unwrap()
}

async fn sample_df() -> DataFrame {
    orders_df(&[
        (1, 10, 100, 5, 100.0, "2024-03-10 12:00:00", "Tehran"),
        (1, 11, 101, 2, 200.0, "2024-03-15 09:30:00", "Tehran"),
        (2, 20, 300, 1, 50.0, "2024-03-01 08:00:00", "Isfahan"),
    ])
    .await
}

#[tokio::test]
async fn test_pipeline_fit_produces_customer_features() {
    let df = sample_df().await;
    let mut pipeline = make_pipeline!(false, ("preprocess", Preprocessor::new()));

    let fitted = pipeline.fit(&df).await.unwrap();
    let batches = fitted.collect().await.unwrap();
    let batch = batches.first().expect("Expected at least one batch");

    // One row per customer, with the city encoded as an integer code.
    assert_eq!(batch.num_rows(), 2);
    let schema = batch.schema();
    let city_index = schema.index_of("city_name_fa").unwrap();
    assert_eq!(schema.field(city_index).data_type(), &DataType::Int64);
}

#[tokio::test]
async fn test_fitted_pipeline_transforms_new_data() {
    let train = sample_df().await;
    let fresh = orders_df(&[(9, 90, 900, 2, 80.0, "2024-03-12 10:00:00", "Tehran")]).await;

    let mut pipeline = make_pipeline!(false, ("preprocess", Preprocessor::new()));
    pipeline.fit(&train).await.unwrap();

    let transformed = pipeline.transform(&fresh).await.unwrap();
    let batches = transformed.collect().await.unwrap();
    let batch = batches.first().expect("Expected at least one batch");
    assert_eq!(batch.num_rows(), 1);
}

#[tokio::test]
async fn test_pipeline_transform_before_fit_fails() {
    let df = sample_df().await;
    let pipeline = make_pipeline!(false, ("preprocess", Preprocessor::new()));

    let err = pipeline.transform(&df).await.unwrap_err();
    match err {
        CustomerFeaturesError::InvalidParameter(msg) => assert!(msg.contains("NotFitted")),
        other => panic!("expected wrapped NotFitted error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_pipeline_is_rejected() {
    let df = sample_df().await;
    let mut pipeline = Pipeline::new(vec![], false);
    let err = pipeline.fit(&df).await.unwrap_err();
    assert!(matches!(err, CustomerFeaturesError::InvalidParameter(_)));
}

#[tokio::test]
async fn test_fit_transform_convenience() {
    let df = sample_df().await;
    let mut pipeline = make_pipeline!(false, ("preprocess", Preprocessor::new()));
    let transformed = pipeline.fit_transform(&df).await.unwrap();
    let batches = transformed.collect().await.unwrap();
    assert_eq!(batches.first().map(|b| b.num_rows()), Some(2));
}
