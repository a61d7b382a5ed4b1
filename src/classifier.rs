// 🚦 Record Classifier - accept a record or quarantine it with a reason
// Required-field check first, then validators in schema precedence, fail-fast

use crate::record::{is_missing, preview_value, RawRecord};
use crate::schema::Schema;
use crate::validators::{self, FieldFailure};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// At most this many declared fields are copied into a quarantine preview
const PREVIEW_FIELDS: usize = 5;

/// String values longer than this are cut in a quarantine preview
const PREVIEW_VALUE_CHARS: usize = 64;

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// Every reason a row can end up outside the clean set.
///
/// `StructuralReadFailure` is reported by record sources for a whole file;
/// the classifier never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    MissingRequiredField,
    InvalidTimestamp,
    /// Bounded string out of range or not a string (user is the main case)
    InvalidUser,
    InvalidEnum,
    InvalidPattern,
    StructuralReadFailure,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::MissingRequiredField,
        ErrorKind::InvalidTimestamp,
        ErrorKind::InvalidUser,
        ErrorKind::InvalidEnum,
        ErrorKind::InvalidPattern,
        ErrorKind::StructuralReadFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingRequiredField => "MissingRequiredField",
            ErrorKind::InvalidTimestamp => "InvalidTimestamp",
            ErrorKind::InvalidUser => "InvalidUser",
            ErrorKind::InvalidEnum => "InvalidEnum",
            ErrorKind::InvalidPattern => "InvalidPattern",
            ErrorKind::StructuralReadFailure => "StructuralReadFailure",
        }
    }

    /// File-level failure rather than a row-level schema violation
    pub fn is_structural(&self) -> bool {
        matches!(self, ErrorKind::StructuralReadFailure)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// VERDICT
// ============================================================================

/// A record that passed every applicable validator, unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub row_index: usize,
    pub record: RawRecord,
}

/// A record set aside, with the first defect found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub row_index: usize,
    pub failed_field: Option<String>,
    pub error_kind: ErrorKind,
    pub message: String,
    /// Small subset of the original fields, for diagnosis
    pub record_preview: RawRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(CleanRecord),
    Quarantined(QuarantineEntry),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    pub fn row_index(&self) -> usize {
        match self {
            Verdict::Accepted(clean) => clean.row_index,
            Verdict::Quarantined(entry) => entry.row_index,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Verdict::Accepted(_) => None,
            Verdict::Quarantined(entry) => Some(entry.error_kind),
        }
    }
}

/// The field that stopped classification and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub field: String,
    pub failure: FieldFailure,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.failure.kind, self.field, self.failure.message)
    }
}

// ============================================================================
// RECORD CLASSIFIER
// ============================================================================

/// Stateless per record: the verdict depends only on the record and the
/// schema, so the same record always gets the same verdict.
pub struct RecordClassifier<'a> {
    schema: &'a Schema,
}

impl<'a> RecordClassifier<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        RecordClassifier { schema }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Find the first defect of a record, if any.
    ///
    /// 1. Required fields, in declaration order, must be present and non-null.
    /// 2. Present fields are validated in precedence order (timestamp,
    ///    identity, then declaration order). Absent or null optional fields
    ///    are skipped; undeclared fields are ignored.
    pub fn diagnose(&self, record: &RawRecord) -> Option<Rejection> {
        for field in self.schema.fields().iter().filter(|f| f.is_required()) {
            if is_missing(record, field.name()) {
                return Some(Rejection {
                    field: field.name().to_string(),
                    failure: FieldFailure::new(
                        ErrorKind::MissingRequiredField,
                        format!("Required field '{}' is missing or null", field.name()),
                    ),
                });
            }
        }

        for field in self.schema.validation_order() {
            if is_missing(record, field.name()) {
                continue;
            }

            if let Err(failure) = validators::validate(record.get(field.name()), field.rule()) {
                return Some(Rejection {
                    field: field.name().to_string(),
                    failure,
                });
            }
        }

        None
    }

    /// Classify one record. Accepted records are returned untouched.
    pub fn classify(&self, row_index: usize, record: RawRecord) -> Verdict {
        match self.diagnose(&record) {
            None => Verdict::Accepted(CleanRecord { row_index, record }),
            Some(rejection) => Verdict::Quarantined(QuarantineEntry {
                row_index,
                failed_field: Some(rejection.field),
                error_kind: rejection.failure.kind,
                message: rejection.failure.message,
                record_preview: self.preview(&record),
            }),
        }
    }

    fn preview(&self, record: &RawRecord) -> RawRecord {
        self.schema
            .fields()
            .iter()
            .filter_map(|field| record.get(field.name()).map(|value| (field.name(), value)))
            .take(PREVIEW_FIELDS)
            .map(|(name, value)| {
                let value = match value {
                    Value::String(_) => Value::String(preview_value(value, PREVIEW_VALUE_CHARS)),
                    other => other.clone(),
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
