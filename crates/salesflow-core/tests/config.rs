use std::path::Path;

use anyhow::Result;
use salesflow_core::config::{ObjectStoreBackend, RunConfig, WarehouseBackend};

#[test]
fn sample_config_matches_builtin_deployment() -> Result<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../salesflow.toml");
    let sample = RunConfig::load(&path)?;
    let builtin = RunConfig::builtin()?;

    assert_eq!(sample.sources, builtin.sources);
    assert_eq!(sample.rates, builtin.rates);
    assert_eq!(sample.aliases, builtin.aliases);
    assert_eq!(sample.destination, builtin.destination);
    assert_eq!(sample.object_store.backend, ObjectStoreBackend::S3);
    assert_eq!(sample.warehouse.backend, WarehouseBackend::Postgres);
    assert_eq!(sample.schedule.interval, "@daily");
    assert!(!sample.schedule.catchup);
    Ok(())
}
