//! Error types, one enum per subsystem.

pub mod analysis_error;
pub mod canonical_error;
pub mod ingest_error;
pub mod store_error;

pub use analysis_error::AnalysisError;
pub use canonical_error::CanonicalError;
pub use ingest_error::IngestError;
pub use store_error::StoreError;
