// 📊 Data Quality Aggregator - folds per-record verdicts into a batch report
//
// One linear pass: classify, route to clean rows or quarantine, count error
// kinds and per-field nulls. Running counters are consistent after every
// record, so stopping early still yields a valid (partial) report.

use crate::classifier::{CleanRecord, ErrorKind, QuarantineEntry, RecordClassifier, Verdict};
use crate::record::{is_missing, RawRecord};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// QUALITY AGGREGATOR
// ============================================================================

pub struct QualityAggregator<'a> {
    classifier: RecordClassifier<'a>,
    total_rows: usize,
    clean_rows: Vec<CleanRecord>,
    quarantine: Vec<QuarantineEntry>,
    error_counts: BTreeMap<ErrorKind, usize>,
    /// Every declared field, including optional ones
    null_counts: BTreeMap<String, usize>,
}

impl<'a> QualityAggregator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        let null_counts = schema
            .fields()
            .iter()
            .map(|field| (field.name().to_string(), 0))
            .collect();

        QualityAggregator {
            classifier: RecordClassifier::new(schema),
            total_rows: 0,
            clean_rows: Vec::new(),
            quarantine: Vec::new(),
            error_counts: BTreeMap::new(),
            null_counts,
        }
    }

    /// Classify and fold one record. Returns the quarantine reason, or
    /// `None` when the record was accepted.
    pub fn ingest(&mut self, row_index: usize, record: RawRecord) -> Option<ErrorKind> {
        self.total_rows += 1;

        for (field, count) in self.null_counts.iter_mut() {
            if is_missing(&record, field) {
                *count += 1;
            }
        }

        match self.classifier.classify(row_index, record) {
            Verdict::Accepted(clean) => {
                self.clean_rows.push(clean);
                None
            }
            Verdict::Quarantined(entry) => {
                let kind = entry.error_kind;
                debug!(
                    row = entry.row_index,
                    kind = %kind,
                    field = entry.failed_field.as_deref().unwrap_or("-"),
                    "quarantined: {}",
                    entry.message
                );
                *self.error_counts.entry(kind).or_insert(0) += 1;
                self.quarantine.push(entry);
                Some(kind)
            }
        }
    }

    /// Fold a whole sequence of `(row_index, record)` pairs
    pub fn ingest_all<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (usize, RawRecord)>,
    {
        for (row_index, record) in records {
            self.ingest(row_index, record);
        }
    }

    pub fn rows_seen(&self) -> usize {
        self.total_rows
    }

    pub fn clean_count(&self) -> usize {
        self.clean_rows.len()
    }

    pub fn quarantined_count(&self) -> usize {
        self.quarantine.len()
    }

    /// Close the batch and compute null rates over every row seen
    pub fn finish(self) -> QualityReport {
        QualityReport::from_parts(
            self.classifier.schema().name().to_string(),
            self.total_rows,
            self.clean_rows,
            self.quarantine,
            self.error_counts,
            self.null_counts,
        )
    }
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

/// Result of one batch. Read-only once built.
///
/// Always holds `total_rows == clean + quarantined` and
/// `sum(error_counts) == quarantined`.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    schema: String,
    total_rows: usize,
    clean_rows: Vec<CleanRecord>,
    quarantine: Vec<QuarantineEntry>,
    error_counts: BTreeMap<ErrorKind, usize>,
    null_counts: BTreeMap<String, usize>,
    null_rates: BTreeMap<String, f64>,
}

impl QualityReport {
    fn from_parts(
        schema: String,
        total_rows: usize,
        clean_rows: Vec<CleanRecord>,
        quarantine: Vec<QuarantineEntry>,
        error_counts: BTreeMap<ErrorKind, usize>,
        null_counts: BTreeMap<String, usize>,
    ) -> Self {
        let null_rates = null_counts
            .iter()
            .map(|(field, &nulls)| (field.clone(), percentage(nulls, total_rows)))
            .collect();

        QualityReport {
            schema,
            total_rows,
            clean_rows,
            quarantine,
            error_counts,
            null_counts,
            null_rates,
        }
    }

    /// Combine reports of disjoint partitions of one batch.
    ///
    /// Counts are summed, rows re-ordered by row index, and null rates are
    /// recomputed from the summed null counts (never averaged).
    pub fn merge<I>(parts: I) -> QualityReport
    where
        I: IntoIterator<Item = QualityReport>,
    {
        let mut schema = String::new();
        let mut total_rows = 0;
        let mut clean_rows = Vec::new();
        let mut quarantine = Vec::new();
        let mut error_counts: BTreeMap<ErrorKind, usize> = BTreeMap::new();
        let mut null_counts: BTreeMap<String, usize> = BTreeMap::new();

        for part in parts {
            if schema.is_empty() {
                schema = part.schema;
            }
            total_rows += part.total_rows;
            clean_rows.extend(part.clean_rows);
            quarantine.extend(part.quarantine);
            for (kind, count) in part.error_counts {
                *error_counts.entry(kind).or_insert(0) += count;
            }
            for (field, count) in part.null_counts {
                *null_counts.entry(field).or_insert(0) += count;
            }
        }

        clean_rows.sort_by_key(|clean| clean.row_index);
        quarantine.sort_by_key(|entry| entry.row_index);

        QualityReport::from_parts(schema, total_rows, clean_rows, quarantine, error_counts, null_counts)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn clean_rows(&self) -> &[CleanRecord] {
        &self.clean_rows
    }

    pub fn quarantine(&self) -> &[QuarantineEntry] {
        &self.quarantine
    }

    /// Only kinds that occurred at least once
    pub fn error_counts(&self) -> &BTreeMap<ErrorKind, usize> {
        &self.error_counts
    }

    pub fn error_count(&self, kind: ErrorKind) -> usize {
        self.error_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn null_counts(&self) -> &BTreeMap<String, usize> {
        &self.null_counts
    }

    /// Percentage (0-100) of all rows where the field is missing or null
    pub fn null_rates(&self) -> &BTreeMap<String, f64> {
        &self.null_rates
    }

    pub fn null_rate(&self, field: &str) -> Option<f64> {
        self.null_rates.get(field).copied()
    }

    pub fn clean_count(&self) -> usize {
        self.clean_rows.len()
    }

    pub fn bad_count(&self) -> usize {
        self.quarantine.len()
    }

    /// Share of rows accepted, 0.0-1.0 (1.0 for an empty batch)
    pub fn clean_ratio(&self) -> f64 {
        if self.total_rows == 0 {
            1.0
        } else {
            self.clean_count() as f64 / self.total_rows as f64
        }
    }

    pub fn summary(&self) -> String {
        let kinds: Vec<String> = self
            .error_counts
            .iter()
            .map(|(kind, count)| format!("{}={}", kind, count))
            .collect();

        format!(
            "{} rows: {} clean, {} quarantined ({:.1}% clean){}",
            self.total_rows,
            self.clean_count(),
            self.bad_count(),
            self.clean_ratio() * 100.0,
            if kinds.is_empty() {
                String::new()
            } else {
                format!(" | {}", kinds.join(", "))
            }
        )
    }

    /// Serializable document form of the report
    pub fn to_document(&self, mode: CleanRowsMode) -> ReportDocument {
        let clean_rows = match mode {
            CleanRowsMode::Count => CleanRows::Count(self.clean_count()),
            CleanRowsMode::Materialized => CleanRows::Records(
                self.clean_rows.iter().map(|clean| clean.record.clone()).collect(),
            ),
        };

        ReportDocument {
            total_rows: self.total_rows,
            clean_rows,
            bad_rows: self.bad_count(),
            bad_rows_list: self.quarantine.clone(),
            error_counts: self
                .error_counts
                .iter()
                .map(|(kind, &count)| (kind.as_str().to_string(), count))
                .collect(),
            null_rates: self.null_rates.clone(),
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

// ============================================================================
// REPORT DOCUMENT
// ============================================================================

/// How `clean_rows` appears in a [`ReportDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanRowsMode {
    #[default]
    Count,
    Materialized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CleanRows {
    Count(usize),
    Records(Vec<RawRecord>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub total_rows: usize,
    pub clean_rows: CleanRows,
    pub bad_rows: usize,
    pub bad_rows_list: Vec<QuarantineEntry>,
    pub error_counts: BTreeMap<String, usize>,
    pub null_rates: BTreeMap<String, f64>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn scenario_records() -> Vec<RawRecord> {
        vec![
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "alice"})),
            record(json!({"user": "alice"})),
            record(json!({"timestamp": "2025-01-01 12:00:00"})),
            record(json!({"timestamp": null, "user": "alice"})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "alice", "event_id": "ev123"})),
        ]
    }

    fn aggregate(schema: &Schema, records: Vec<RawRecord>) -> QualityReport {
        let mut aggregator = QualityAggregator::new(schema);
        aggregator.ingest_all(records.into_iter().enumerate());
        aggregator.finish()
    }

    fn assert_invariants(report: &QualityReport) {
        assert_eq!(report.total_rows(), report.clean_count() + report.bad_count());
        assert_eq!(report.error_counts().values().sum::<usize>(), report.bad_count());
    }

    #[test]
    fn test_end_to_end_scenario() {
        let schema = Schema::auth_log().unwrap();
        let report = aggregate(&schema, scenario_records());

        println!("Report: {}", report.summary());

        let clean: Vec<usize> = report.clean_rows().iter().map(|c| c.row_index).collect();
        let bad: Vec<usize> = report.quarantine().iter().map(|q| q.row_index).collect();

        assert_eq!(clean, vec![0, 4]);
        assert_eq!(bad, vec![1, 2, 3]);
        assert!(report
            .quarantine()
            .iter()
            .all(|q| q.error_kind == ErrorKind::MissingRequiredField));
        assert_eq!(report.error_count(ErrorKind::MissingRequiredField), 3);
        assert_eq!(report.error_count(ErrorKind::InvalidUser), 0);
        assert_invariants(&report);
    }

    #[test]
    fn test_clean_rows_keep_extra_fields() {
        let schema = Schema::auth_log().unwrap();
        let report = aggregate(&schema, scenario_records());

        let last = &report.clean_rows()[1];
        assert_eq!(last.record["event_id"], json!("ev123"));
    }

    #[test]
    fn test_null_rate_over_full_batch() {
        let schema = Schema::auth_log().unwrap();
        let records = vec![
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "alice", "src_ip": "10.0.0.1"})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "bob"})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "carol", "src_ip": null})),
            record(json!({"user": "dave"})),
        ];

        let report = aggregate(&schema, records);

        assert_eq!(report.null_rate("src_ip"), Some(75.0));
        assert_eq!(report.null_rate("timestamp"), Some(25.0));
        assert_eq!(report.null_rate("user"), Some(0.0));
        assert_eq!(report.null_rate("action"), Some(100.0));
        assert_eq!(report.null_rate("undeclared"), None);
        assert_eq!(report.null_rates().len(), schema.count());
    }

    #[test]
    fn test_empty_batch() {
        let schema = Schema::auth_log().unwrap();
        let report = aggregate(&schema, vec![]);

        assert_eq!(report.total_rows(), 0);
        assert_eq!(report.null_rate("user"), Some(0.0));
        assert_eq!(report.clean_ratio(), 1.0);
        assert!(report.error_counts().is_empty());
        assert_invariants(&report);
    }

    #[test]
    fn test_mixed_error_kinds_counted() {
        let schema = Schema::auth_log().unwrap();
        let records = vec![
            record(json!({"timestamp": "not-a-timestamp", "user": "alice"})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": ""})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "a".repeat(257)})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": 12345})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "alice", "action": "denied"})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "alice", "src_ip": "1.2.3"})),
            record(json!({"timestamp": "2025-01-01 12:00:00", "user": "alice"})),
        ];

        let report = aggregate(&schema, records);

        assert_eq!(report.error_count(ErrorKind::InvalidTimestamp), 1);
        assert_eq!(report.error_count(ErrorKind::InvalidUser), 3);
        assert_eq!(report.error_count(ErrorKind::InvalidEnum), 1);
        assert_eq!(report.error_count(ErrorKind::InvalidPattern), 1);
        assert_eq!(report.clean_count(), 1);
        assert_invariants(&report);
    }

    #[test]
    fn test_external_row_indices_preserved() {
        let schema = Schema::auth_log().unwrap();
        let mut aggregator = QualityAggregator::new(&schema);

        let accepted = aggregator.ingest(10, record(json!({"timestamp": "2025-01-01 12:00:00", "user": "a"})));
        let rejected = aggregator.ingest(42, record(json!({"user": "b"})));

        assert_eq!(accepted, None);
        assert_eq!(rejected, Some(ErrorKind::MissingRequiredField));

        let report = aggregator.finish();
        assert_eq!(report.clean_rows()[0].row_index, 10);
        assert_eq!(report.quarantine()[0].row_index, 42);
    }

    #[test]
    fn test_running_counters_consistent_midway() {
        let schema = Schema::auth_log().unwrap();
        let mut aggregator = QualityAggregator::new(&schema);

        for (i, rec) in scenario_records().into_iter().enumerate().take(3) {
            aggregator.ingest(i, rec);
            assert_eq!(
                aggregator.rows_seen(),
                aggregator.clean_count() + aggregator.quarantined_count()
            );
        }

        // Stopping early still gives a valid report
        let partial = aggregator.finish();
        assert_eq!(partial.total_rows(), 3);
        assert_invariants(&partial);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let schema = Schema::auth_log().unwrap();
        let mut records: Vec<RawRecord> = scenario_records();
        records.push(record(json!({"timestamp": "2025-01-01 12:00:00", "user": "eve", "src_ip": "10.0.0.9"})));
        records.push(record(json!({"timestamp": "bad", "user": "frank"})));

        let whole = aggregate(&schema, records.clone());

        // Interleaved partitions, as a worker pool would produce
        let mut even = QualityAggregator::new(&schema);
        let mut odd = QualityAggregator::new(&schema);
        for (i, rec) in records.into_iter().enumerate() {
            if i % 2 == 0 {
                even.ingest(i, rec);
            } else {
                odd.ingest(i, rec);
            }
        }

        let merged = QualityReport::merge(vec![odd.finish(), even.finish()]);

        assert_eq!(merged, whole);
        assert_invariants(&merged);
    }

    #[test]
    fn test_merge_recomputes_rates_instead_of_averaging() {
        let schema = Schema::auth_log().unwrap();
        let small = aggregate(&schema, vec![record(json!({"user": "a"}))]);
        let large = aggregate(
            &schema,
            vec![
                record(json!({"timestamp": "2025-01-01 12:00:00", "user": "b"})),
                record(json!({"timestamp": "2025-01-01 12:00:00", "user": "c"})),
                record(json!({"timestamp": "2025-01-01 12:00:00", "user": "d"})),
            ],
        );

        let merged = QualityReport::merge(vec![small, large]);

        // 1 of 4 rows lacks a timestamp; averaging would give 50%
        assert_eq!(merged.null_rate("timestamp"), Some(25.0));
    }

    #[test]
    fn test_document_shape() {
        let schema = Schema::auth_log().unwrap();
        let report = aggregate(&schema, scenario_records());

        let doc = serde_json::to_value(report.to_document(CleanRowsMode::Count)).unwrap();

        assert_eq!(doc["total_rows"], json!(5));
        assert_eq!(doc["clean_rows"], json!(2));
        assert_eq!(doc["bad_rows"], json!(3));
        assert_eq!(doc["bad_rows_list"].as_array().unwrap().len(), 3);
        assert_eq!(doc["bad_rows_list"][0]["error_kind"], json!("MissingRequiredField"));
        assert_eq!(doc["error_counts"]["MissingRequiredField"], json!(3));
        assert_eq!(doc["null_rates"]["event_id"], json!(80.0));
    }

    #[test]
    fn test_document_materialized_clean_rows() {
        let schema = Schema::auth_log().unwrap();
        let report = aggregate(&schema, scenario_records());

        let doc = report.to_document(CleanRowsMode::Materialized);
        match &doc.clean_rows {
            CleanRows::Records(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0]["user"], json!("alice"));
            }
            CleanRows::Count(_) => panic!("expected materialized rows"),
        }

        let text = serde_json::to_string(&doc).unwrap();
        let back: ReportDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let schema = Schema::auth_log().unwrap();
        let report = aggregate(&schema, scenario_records());

        let summary = report.summary();
        assert!(summary.starts_with("5 rows: 2 clean, 3 quarantined"));
        assert!(summary.contains("MissingRequiredField=3"));
    }
}
