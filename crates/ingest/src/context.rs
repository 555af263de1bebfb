use bronze_core::{Config, SchemaRegistry, SourceSpec};
use bronze_table::Warehouse;

use crate::error::IngestError;

/// Everything a run needs, built once and passed explicitly.
#[derive(Debug, Clone)]
pub struct BronzeContext {
    pub config: Config,
    pub registry: SchemaRegistry,
    pub warehouse: Warehouse,
}

impl BronzeContext {
    pub fn new(config: Config) -> Result<Self, IngestError> {
        config.validate()?;
        let registry = SchemaRegistry::bronze()?;
        let warehouse = Warehouse::from_config(&config);
        Ok(Self {
            config,
            registry,
            warehouse,
        })
    }

    pub fn sources(&self) -> Result<Vec<SourceSpec>, IngestError> {
        Ok(SourceSpec::bronze_sources(&self.config, &self.registry)?)
    }
}
