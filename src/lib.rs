// Log Quality Engine - Core Library
// Schema-driven validation of log records: every record is either accepted
// or quarantined with one precise reason, and each batch yields a report.

pub mod record;        // Raw records as handed over by a source
pub mod schema;        // Schema Registry - declared fields + compiled rules
pub mod validators;    // Field Validators - one pure check per semantic type
pub mod classifier;    // Record Classifier - accept or quarantine
pub mod data_quality;  // Quality Aggregator - batch report + merge
pub mod loader;        // CSV / JSON / JSONL sources, structural failures
pub mod pipeline;      // Load + aggregate across many files

// Re-export commonly used types
pub use record::{is_missing, RawRecord};
pub use schema::{
    FieldSpec, Schema, SchemaConfig, SchemaError, SemanticType,
};
pub use validators::{validate, FieldFailure};
pub use classifier::{
    CleanRecord, ErrorKind, QuarantineEntry, RecordClassifier, Rejection, Verdict,
};
pub use data_quality::{
    CleanRows, CleanRowsMode, QualityAggregator, QualityReport, ReportDocument,
};
pub use loader::{
    detect_format, load_all_logs, load_logs, load_logs_from_directory,
    LoadError, LoadErrorCode, LoadedLogs, SourceFormat, StructuralFailure, DEFAULT_PATTERN,
};
pub use pipeline::{run_directory, run_files, BatchDocument, BatchResult, ErrorEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
