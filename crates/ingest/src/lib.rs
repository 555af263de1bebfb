pub mod context;
pub mod enrich;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod validate;

// Re-export key types
pub use context::BronzeContext;
pub use enrich::{DateLookup, Enricher};
pub use error::{IngestError, RecordError};
pub use orchestrator::{Bronze, IngestionRun, RunReport};
pub use pipeline::{PipelineReport, PipelineState, PipelineStats, RunMode};
pub use source::{RawUnit, SourceReader, UnitRecords};
pub use validate::{CountCheck, ExpectedCount, ValidationExpectation, Validator};
