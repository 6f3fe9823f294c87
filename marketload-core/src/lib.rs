//! marketload core: daily OHLCV extract, schema normalization, full-refresh load.
//!
//! A run moves through three strictly sequential stages:
//! - `extract`: fetch a lookback window of bars per instrument, write a staging CSV
//! - `normalize`: classify the staging layout (flat or nested), unpivot into
//!   canonical records, write the canonical CSV
//! - `load`: replace the target table's contents inside one transaction
//!
//! At most one run per target table may be in flight. The crate does not
//! lock; the scheduler driving it must not overlap runs.

pub mod artifact;
pub mod config;
pub mod extract;
pub mod load;
pub mod normalize;
pub mod pipeline;
pub mod record;

pub use artifact::{ArtifactError, CanonicalManifest};
pub use config::{ConfigError, PipelineConfig};
pub use extract::{ExtractRequest, ExtractionError, Extractor, StagingArtifact};
pub use load::{LoadCoordinator, LoadError, LoadSummary, TableName};
pub use normalize::{CanonicalArtifact, NormalizationError, NormalizeOptions, SchemaNormalizer};
pub use pipeline::{run_pipeline, PipelineError, RunReport};
pub use record::CanonicalRecord;
