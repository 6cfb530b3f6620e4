mod common;

use std::sync::Arc;

use anyhow::Result;
use polars::prelude::*;
use salesflow_core::config::RunConfig;
use salesflow_core::db::{DatabaseClient, Dialect};
use salesflow_core::model::DestinationSchema;
use salesflow_core::{run_pipeline, RunContext, Stage};

use common::{
    parser_fixture, put_object, registry, sales_frame, MemoryDatabase, RecordingWarehouse,
};

const JAPAN_AND_INDIA: &str = r#"
[rates]
Japan = 0.57
India = 1.0

[[sources]]
kind = "file"
format = "csv"
bucket = "landing"
key = "japan.csv"

[[sources]]
kind = "database"
connection = "mssql_india"
table = "india_sales"
"#;

const HEADER: &str = "SaleId,Country,Category,Product,Qty,Price,Amount\n";

fn india_client() -> Arc<MemoryDatabase> {
    Arc::new(MemoryDatabase::new(Dialect::MsSql).with_table(
        "india_sales",
        sales_frame(&[2], &["India"], &[Some(1)], &[5.0], &[5.0]),
    ))
}

fn inr_values(df: &DataFrame) -> Vec<f64> {
    df.column("INR_Amount")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap())
        .collect()
}

#[tokio::test]
async fn file_and_database_rows_are_converted_and_appended() -> Result<()> {
    let root = tempfile::tempdir()?;
    put_object(
        root.path(),
        "landing",
        "japan.csv",
        format!("{HEADER}1,Japan,A,P,2,10,20\n").as_bytes(),
    );
    let india = india_client();
    let readers = registry(root.path(), vec![india.clone() as Arc<dyn DatabaseClient>]);
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str(JAPAN_AND_INDIA)?;

    let summary = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-1")).await?;

    assert_eq!(warehouse.calls(), 1);
    let batch = warehouse.last_batch().unwrap();
    assert_eq!(
        batch.get_column_names_str(),
        DestinationSchema::sales_output().column_names()
    );
    let inr = inr_values(&batch);
    assert!((inr[0] - 11.4).abs() < 1e-9);
    assert_eq!(inr[1], 5.0);

    assert_eq!(
        india.statements(),
        vec![("mssql_india".to_string(), "SELECT * FROM india_sales".to_string())]
    );
    assert_eq!(summary.rows_combined, 2);
    assert_eq!(summary.load.map(|receipt| receipt.rows), Some(2));
    assert_eq!(summary.destination, "salesdataset.output");
    Ok(())
}

#[tokio::test]
async fn null_quantity_row_is_dropped_before_load() -> Result<()> {
    let root = tempfile::tempdir()?;
    put_object(
        root.path(),
        "landing",
        "japan.csv",
        &parser_fixture("japan_sales_data.csv"),
    );
    let readers = registry(root.path(), vec![india_client() as Arc<dyn DatabaseClient>]);
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str(JAPAN_AND_INDIA)?;

    let summary = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-2")).await?;

    assert_eq!(summary.rows_combined, 4);
    assert_eq!(summary.cleaning.dropped_null, 1);
    assert_eq!(summary.cleaning.rows_out, 3);
    let batch = warehouse.last_batch().unwrap();
    let ids: Vec<Option<i64>> = batch.column("SaleId")?.i64()?.into_iter().collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(2)]);
    Ok(())
}

#[tokio::test]
async fn unreachable_source_aborts_before_load() -> Result<()> {
    let root = tempfile::tempdir()?;
    put_object(
        root.path(),
        "landing",
        "japan.csv",
        format!("{HEADER}1,Japan,A,P,2,10,20\n").as_bytes(),
    );
    let unreachable = Arc::new(MemoryDatabase::new(Dialect::MsSql));
    let readers = registry(root.path(), vec![unreachable as Arc<dyn DatabaseClient>]);
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str(JAPAN_AND_INDIA)?;

    let failure = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-3"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Extract);
    assert_eq!(failure.kind(), "source_unavailable");
    assert_eq!(warehouse.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_object_aborts_before_load() -> Result<()> {
    let root = tempfile::tempdir()?;
    let readers = registry(root.path(), vec![india_client() as Arc<dyn DatabaseClient>]);
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str(JAPAN_AND_INDIA)?;

    let failure = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-4"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Extract);
    assert_eq!(failure.kind(), "source_unavailable");
    assert_eq!(warehouse.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn nothing_left_after_cleaning_never_reaches_the_warehouse() -> Result<()> {
    let root = tempfile::tempdir()?;
    put_object(
        root.path(),
        "landing",
        "japan.csv",
        format!("{HEADER}1,Japan,A,P,,10,20\n").as_bytes(),
    );
    let readers = registry(root.path(), Vec::new());
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str(
        r#"
        [[sources]]
        kind = "file"
        format = "csv"
        bucket = "landing"
        key = "japan.csv"
        "#,
    )?;

    let failure = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-5"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Clean);
    assert_eq!(failure.kind(), "no_data_after_cleaning");
    assert_eq!(warehouse.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_format_is_reported_at_extract() -> Result<()> {
    let root = tempfile::tempdir()?;
    let readers = registry(root.path(), Vec::new());
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str(
        r#"
        [[sources]]
        kind = "file"
        format = "parquet"
        bucket = "landing"
        key = "japan.parquet"
        "#,
    )?;

    let failure = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-6"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Extract);
    assert_eq!(failure.kind(), "unsupported_format");
    assert_eq!(warehouse.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn empty_source_list_is_empty_input() -> Result<()> {
    let root = tempfile::tempdir()?;
    let readers = registry(root.path(), Vec::new());
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str("sources = []")?;

    let failure = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-7"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Combine);
    assert_eq!(failure.kind(), "empty_input");
    Ok(())
}

#[tokio::test]
async fn quota_errors_surface_from_the_load_stage() -> Result<()> {
    let root = tempfile::tempdir()?;
    put_object(
        root.path(),
        "landing",
        "japan.csv",
        format!("{HEADER}1,Japan,A,P,2,10,20\n").as_bytes(),
    );
    let readers = registry(root.path(), vec![india_client() as Arc<dyn DatabaseClient>]);
    let warehouse = RecordingWarehouse {
        fail_with_quota: true,
        ..RecordingWarehouse::default()
    };
    let config = RunConfig::from_toml_str(JAPAN_AND_INDIA)?;

    let failure = run_pipeline(&config, &readers, &warehouse, &RunContext::new("run-8"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Load);
    assert_eq!(failure.kind(), "quota_exceeded");
    Ok(())
}

#[tokio::test]
async fn dry_run_validates_without_appending() -> Result<()> {
    let root = tempfile::tempdir()?;
    put_object(
        root.path(),
        "landing",
        "japan.csv",
        format!("{HEADER}1,Japan,A,P,2,10,20\n").as_bytes(),
    );
    let readers = registry(root.path(), vec![india_client() as Arc<dyn DatabaseClient>]);
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::from_toml_str(JAPAN_AND_INDIA)?;

    let summary = run_pipeline(
        &config,
        &readers,
        &warehouse,
        &RunContext::new("run-9").dry_run(true),
    )
    .await?;

    assert!(summary.dry_run);
    assert!(summary.load.is_none());
    assert_eq!(summary.rows_normalized, 2);
    assert_eq!(warehouse.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn default_deployment_reads_all_eight_sources() -> Result<()> {
    let root = tempfile::tempdir()?;
    put_object(
        root.path(),
        "sales_analysis_japan",
        "japan_sales_data.csv",
        &parser_fixture("japan_sales_data.csv"),
    );
    put_object(
        root.path(),
        "sales_analysis_srilanka",
        "sri_lanka_sales_data.json",
        &parser_fixture("sri_lanka_sales_data.json"),
    );
    put_object(
        root.path(),
        "sales_analysis_hongkong",
        "hong_kong_sales_data.xlsx",
        &parser_fixture("hong_kong_sales_data.xlsx"),
    );

    let mysql = Arc::new(
        MemoryDatabase::new(Dialect::MySql)
            .with_table(
                "oman_sales_data",
                sales_frame(&[301], &["Oman"], &[Some(1)], &[2.0], &[2.0]),
            )
            .with_table(
                "germany_sales_data",
                sales_frame(&[501], &["Germany"], &[Some(2)], &[3.0], &[6.0]),
            )
            .with_table(
                "qatar_sales_data",
                sales_frame(&[601], &["Qatar"], &[Some(1)], &[10.0], &[10.0]),
            ),
    );
    let norway_columns = DataFrame::new(vec![
        Series::new("saleid".into(), &[401i32]).into(),
        Series::new("country".into(), &["Norway"]).into(),
        Series::new("category".into(), &["Outdoor"]).into(),
        Series::new("product".into(), &["Tent"]).into(),
        Series::new("qty".into(), &[1i32]).into(),
        Series::new("price".into(), &[100.0f64]).into(),
        Series::new("amount".into(), &[100.0f64]).into(),
    ])?;
    let postgres = Arc::new(
        MemoryDatabase::new(Dialect::Postgres).with_table("norway_sales_data", norway_columns),
    );
    let mssql = Arc::new(MemoryDatabase::new(Dialect::MsSql).with_table(
        "india_sales",
        sales_frame(&[701], &["India"], &[Some(3)], &[5.0], &[15.0]),
    ));

    let readers = registry(
        root.path(),
        vec![
            mysql as Arc<dyn DatabaseClient>,
            postgres.clone() as Arc<dyn DatabaseClient>,
            mssql as Arc<dyn DatabaseClient>,
        ],
    );
    let warehouse = RecordingWarehouse::default();
    let config = RunConfig::builtin()?;

    let summary = run_pipeline(
        &config,
        &readers,
        &warehouse,
        &RunContext::new("scheduled__2024-01-01"),
    )
    .await?;

    let per_source: Vec<usize> = summary.sources.iter().map(|s| s.rows).collect();
    assert_eq!(per_source, vec![3, 2, 2, 1, 1, 1, 1, 1]);
    assert_eq!(summary.cleaning.rows_out, 11);
    assert_eq!(
        postgres.statements()[0].1,
        r#"SELECT * FROM "norway_sales_data""#
    );

    let batch = warehouse.last_batch().unwrap();
    let countries: Vec<&str> = batch.column("Country")?.str()?.into_iter().flatten().collect();
    let inr = inr_values(&batch);
    let norway = countries.iter().position(|c| *c == "Norway").unwrap();
    assert!((inr[norway] - 821.0).abs() < 1e-9);
    let oman = countries.iter().position(|c| *c == "Oman").unwrap();
    assert!((inr[oman] - 431.08).abs() < 1e-9);
    Ok(())
}
