pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod source;

pub use config::Config;
pub use error::*;
pub use record::*;
pub use schema::{
    Field, FieldList, FieldType, SchemaCastError, SchemaRegistry, GYM_LOGINS, KAFKA_MULTIPLEX,
    REGISTERED_USERS,
};
pub use source::{SchedulerPool, SourceSpec, UnitFormat};
