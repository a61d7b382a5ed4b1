// 🔗 Pipeline - load sources, number rows, aggregate one batch
// Rows are numbered 0..n across the combined source order, so a row index
// identifies the same record however many files fed the batch.

use crate::classifier::QuarantineEntry;
use crate::data_quality::{CleanRowsMode, QualityAggregator, QualityReport, ReportDocument};
use crate::loader::{self, LoadedLogs, StructuralFailure};
use crate::schema::Schema;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One entry of the combined error list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorEntry {
    Structural(StructuralFailure),
    Quarantine(QuarantineEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub report: QualityReport,
    pub failures: Vec<StructuralFailure>,
}

impl BatchResult {
    /// Structural failures first, then quarantined rows in row order
    pub fn errors(&self) -> Vec<ErrorEntry> {
        self.failures
            .iter()
            .cloned()
            .map(ErrorEntry::Structural)
            .chain(self.report.quarantine().iter().cloned().map(ErrorEntry::Quarantine))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty() || self.report.bad_count() > 0
    }

    pub fn to_document(&self, mode: CleanRowsMode) -> BatchDocument {
        BatchDocument {
            report: self.report.to_document(mode),
            errors: self.errors(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchDocument {
    #[serde(flatten)]
    pub report: ReportDocument,
    pub errors: Vec<ErrorEntry>,
}

pub fn run_files<P: AsRef<Path>>(schema: &Schema, paths: &[P]) -> BatchResult {
    run_loaded(schema, loader::load_all_logs(paths))
}

pub fn run_directory(schema: &Schema, dir: &Path, pattern: &str) -> BatchResult {
    run_loaded(schema, loader::load_logs_from_directory(dir, pattern))
}

fn run_loaded(schema: &Schema, loaded: LoadedLogs) -> BatchResult {
    let mut aggregator = QualityAggregator::new(schema);
    aggregator.ingest_all(loaded.records.into_iter().enumerate());
    let report = aggregator.finish();

    info!(
        schema = schema.name(),
        unreadable_sources = loaded.failures.len(),
        "{}",
        report.summary()
    );

    BatchResult {
        report,
        failures: loaded.failures,
    }
}

// ============================================================================
// TESTS
// ============================================================================
