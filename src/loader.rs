// 📂 Log Loader - reads CSV / JSON / JSONL log files into raw records
// One bad file never aborts a batch: it becomes a StructuralFailure and the
// remaining files still load.

use crate::classifier::ErrorKind;
use crate::record::RawRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Pattern used when a directory scan names none
pub const DEFAULT_PATTERN: &str = "*.csv";

// ============================================================================
// SOURCE FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Csv,
    Json,
    JsonLines,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 3] = [SourceFormat::Csv, SourceFormat::Json, SourceFormat::JsonLines];

    pub fn name(&self) -> &str {
        match self {
            SourceFormat::Csv => "CSV",
            SourceFormat::Json => "JSON",
            SourceFormat::JsonLines => "JSON Lines",
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Json => "json",
            SourceFormat::JsonLines => "jsonl",
        }
    }
}

/// Pick the reader from the file extension, before touching the file
///
/// Examples:
/// detect_format("auth_2025-01.csv") → SourceFormat::Csv
/// detect_format("events.JSONL") → SourceFormat::JsonLines
/// detect_format("notes.txt") → Err(unsupported_format)
pub fn detect_format(path: &Path) -> Result<SourceFormat, LoadError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    SourceFormat::ALL
        .into_iter()
        .find(|format| extension.as_deref() == Some(format.extension()))
        .ok_or_else(|| {
            let expected: Vec<String> = SourceFormat::ALL
                .iter()
                .map(|format| format!(".{}", format.extension()))
                .collect();
            LoadError::new(
                path,
                LoadErrorCode::UnsupportedFormat,
                format!("Unsupported format. Expected one of {}", expected.join(", ")),
            )
        })
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadErrorCode {
    FileNotFound,
    UnsupportedFormat,
    ParsingError,
    EncodingError,
    Unknown,
}

impl LoadErrorCode {
    /// Machine-readable code carried into the report
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadErrorCode::FileNotFound => "file_not_found",
            LoadErrorCode::UnsupportedFormat => "unsupported_format",
            LoadErrorCode::ParsingError => "parsing_error",
            LoadErrorCode::EncodingError => "encoding_error",
            LoadErrorCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LoadErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A whole source that could not be read
#[derive(Debug, Error)]
#[error("{file}: {message} [{code}]")]
pub struct LoadError {
    pub file: String,
    pub code: LoadErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl LoadError {
    pub fn new(file: impl AsRef<Path>, code: LoadErrorCode, message: impl Into<String>) -> Self {
        LoadError {
            file: file.as_ref().display().to_string(),
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    fn from_io(file: &Path, err: io::Error) -> Self {
        let (code, message) = match err.kind() {
            io::ErrorKind::NotFound => (LoadErrorCode::FileNotFound, "File not found"),
            _ => (LoadErrorCode::Unknown, "Failed to read file"),
        };
        LoadError::new(file, code, message).with_source(err)
    }

    /// Report-facing form, original error flattened to text
    pub fn to_failure(&self) -> StructuralFailure {
        StructuralFailure {
            file: self.file.clone(),
            kind: ErrorKind::StructuralReadFailure,
            error_code: self.code.as_str().to_string(),
            message: self.message.clone(),
            original_error: self.source.as_ref().map(|err| err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFailure {
    pub file: String,
    pub kind: ErrorKind,
    pub error_code: String,
    pub message: String,
    pub original_error: Option<String>,
}

// ============================================================================
// SINGLE FILE
// ============================================================================

/// Load every record from one file
pub fn load_logs(path: &Path) -> Result<Vec<RawRecord>, LoadError> {
    let format = detect_format(path)?;

    let bytes = fs::read(path).map_err(|err| LoadError::from_io(path, err))?;
    let text = String::from_utf8(bytes).map_err(|err| {
        LoadError::new(path, LoadErrorCode::EncodingError, "File is not valid UTF-8").with_source(err)
    })?;

    let records = match format {
        SourceFormat::Csv => parse_csv(path, &text)?,
        SourceFormat::Json => parse_json(path, &text)?,
        SourceFormat::JsonLines => parse_json_lines(path, &text)?,
    };

    debug!(
        file = %path.display(),
        format = format.name(),
        records = records.len(),
        "loaded"
    );
    Ok(records)
}

fn parsing_error(path: &Path, message: impl Into<String>) -> LoadError {
    LoadError::new(path, LoadErrorCode::ParsingError, message)
}

/// Header row names the fields. Every cell stays text and empty cells are
/// null, so a row reads the same whatever the other rows hold.
fn parse_csv(path: &Path, text: &str) -> Result<Vec<RawRecord>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|err| parsing_error(path, "Failed to read CSV header").with_source(err))?
        .clone();

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let row = result.map_err(|err| {
            parsing_error(path, format!("Malformed CSV row {}", i + 1)).with_source(err)
        })?;

        let record: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| (name.to_string(), csv_cell(cell)))
            .collect();
        records.push(record);
    }

    Ok(records)
}

fn csv_cell(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}

/// Top-level array of objects
fn parse_json(path: &Path, text: &str) -> Result<Vec<RawRecord>, LoadError> {
    let document: Value = serde_json::from_str(text)
        .map_err(|err| parsing_error(path, "Invalid JSON").with_source(err))?;

    let items = match document {
        Value::Array(items) => items,
        _ => return Err(parsing_error(path, "Expected a top-level array of objects")),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(parsing_error(path, format!("Element {} is not an object", i))),
        })
        .collect()
}

/// One object per non-blank line
fn parse_json_lines(path: &Path, text: &str) -> Result<Vec<RawRecord>, LoadError> {
    let mut records = Vec::new();

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line).map_err(|err| {
            parsing_error(path, format!("Invalid JSON on line {}", i + 1)).with_source(err)
        })?;

        match value {
            Value::Object(record) => records.push(record),
            _ => return Err(parsing_error(path, format!("Line {} is not an object", i + 1))),
        }
    }

    Ok(records)
}

// ============================================================================
// MULTIPLE FILES
// ============================================================================

/// Records from every readable source, plus one failure per unreadable one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedLogs {
    pub records: Vec<RawRecord>,
    pub failures: Vec<StructuralFailure>,
}

impl LoadedLogs {
    fn push_failure(&mut self, err: &LoadError) {
        warn!("Skipping {}", err);
        self.failures.push(err.to_failure());
    }
}

/// Load each path in turn, concatenating records in source order
pub fn load_all_logs<P: AsRef<Path>>(paths: &[P]) -> LoadedLogs {
    let mut loaded = LoadedLogs::default();

    for path in paths {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            debug!("Ignoring empty path");
            continue;
        }

        match load_logs(path) {
            Ok(records) => loaded.records.extend(records),
            Err(err) => loaded.push_failure(&err),
        }
    }

    info!(
        files = paths.len(),
        records = loaded.records.len(),
        failures = loaded.failures.len(),
        "load complete"
    );
    loaded
}

/// Load every file in `dir` matching a glob `pattern`, in sorted path order
pub fn load_logs_from_directory(dir: &Path, pattern: &str) -> LoadedLogs {
    match matching_files(dir, pattern) {
        Ok((paths, failures)) => {
            let mut loaded = load_all_logs(&paths);
            // Unreadable directory entries were found first
            let mut all_failures = failures;
            all_failures.append(&mut loaded.failures);
            loaded.failures = all_failures;
            loaded
        }
        Err(err) => {
            let mut loaded = LoadedLogs::default();
            loaded.push_failure(&err);
            loaded
        }
    }
}

fn matching_files(
    dir: &Path,
    pattern: &str,
) -> Result<(Vec<PathBuf>, Vec<StructuralFailure>), LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::new(dir, LoadErrorCode::FileNotFound, "Directory not found"));
    }

    let pattern_path = Path::new(pattern);
    if pattern_path.is_absolute()
        || pattern_path
            .components()
            .any(|part| matches!(part, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(LoadError::new(
            dir,
            LoadErrorCode::Unknown,
            format!("File pattern '{}' must stay inside the directory", pattern),
        ));
    }

    let dir_text = dir.to_str().ok_or_else(|| {
        LoadError::new(dir, LoadErrorCode::EncodingError, "Directory path is not valid UTF-8")
    })?;

    let full_pattern = Path::new(&glob::Pattern::escape(dir_text)).join(pattern);
    let full_pattern = full_pattern.to_string_lossy();

    let entries = glob::glob(&full_pattern).map_err(|err| {
        LoadError::new(
            dir,
            LoadErrorCode::Unknown,
            format!("Invalid file pattern '{}'", pattern),
        )
        .with_source(err)
    })?;

    let mut paths = Vec::new();
    let mut failures = Vec::new();

    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(err) => {
                let file = err.path().to_path_buf();
                let err = LoadError::from_io(&file, err.into_error());
                warn!("Skipping {}", err);
                failures.push(err.to_failure());
            }
        }
    }

    paths.sort();
    Ok((paths, failures))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("a.csv")).unwrap(), SourceFormat::Csv);
        assert_eq!(detect_format(Path::new("a.JSON")).unwrap(), SourceFormat::Json);
        assert_eq!(detect_format(Path::new("dir/a.jsonl")).unwrap(), SourceFormat::JsonLines);

        let err = detect_format(Path::new("notes.txt")).unwrap_err();
        assert_eq!(err.code, LoadErrorCode::UnsupportedFormat);

        let err = detect_format(Path::new("no_extension")).unwrap_err();
        assert_eq!(err.code, LoadErrorCode::UnsupportedFormat);
        assert!(err.message.contains(".csv, .json, .jsonl"));

        for format in SourceFormat::ALL {
            let name = format!("log.{}", format.extension().to_uppercase());
            assert_eq!(detect_format(Path::new(&name)).unwrap(), format);
        }
    }

    #[test]
    fn test_unsupported_format_checked_before_opening() {
        // The file does not exist, yet the format error wins
        let err = load_logs(Path::new("/definitely/missing/file.xml")).unwrap_err();
        assert_eq!(err.code, LoadErrorCode::UnsupportedFormat);
    }

    #[test]
    fn test_missing_file() {
        let err = load_logs(Path::new("/definitely/missing/file.csv")).unwrap_err();
        assert_eq!(err.code, LoadErrorCode::FileNotFound);
        assert!(err.source.is_some());

        let failure = err.to_failure();
        assert_eq!(failure.kind, ErrorKind::StructuralReadFailure);
        assert_eq!(failure.error_code, "file_not_found");
        assert!(failure.original_error.is_some());
    }

    #[test]
    fn test_load_csv_cells_as_text() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "auth.csv",
            b"timestamp,user,event_id,src_ip\n\
              2025-01-01 12:00:00,alice,1,10.0.0.1\n\
              2025-01-01 12:00:01,bob,2,\n",
        );

        let records = load_logs(&path).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["user"], json!("alice"));
        assert_eq!(records[0]["event_id"], json!("1"));
        assert_eq!(records[1]["src_ip"], json!(null));

        let keys: Vec<&str> = records[0].keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["timestamp", "user", "event_id", "src_ip"]);
    }

    #[test]
    fn test_csv_cell_does_not_depend_on_other_rows() {
        let dir = TempDir::new().unwrap();
        let numeric = write(&dir, "numeric.csv", b"event_id\n1001\n1002\n");
        let mixed = write(&dir, "mixed.csv", b"event_id\n1001\nNULL\n");

        let numeric = load_logs(&numeric).unwrap();
        let mixed = load_logs(&mixed).unwrap();

        assert_eq!(numeric[0]["event_id"], json!("1001"));
        assert_eq!(numeric[0], mixed[0]);
    }

    #[test]
    fn test_csv_ragged_row_is_parsing_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ragged.csv", b"a,b\n1,2\n3,4,5\n");

        let err = load_logs(&path).unwrap_err();
        assert_eq!(err.code, LoadErrorCode::ParsingError);
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "latin1.csv", b"user\ncaf\xe9\n");

        let err = load_logs(&path).unwrap_err();
        assert_eq!(err.code, LoadErrorCode::EncodingError);
    }

    #[test]
    fn test_load_json_array() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "auth.json",
            br#"[{"timestamp": "2025-01-01 12:00:00", "user": "alice"}, {"user": null}]"#,
        );

        let records = load_logs(&path).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["user"], json!(null));
    }

    #[test]
    fn test_json_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let object = write(&dir, "object.json", br#"{"user": "alice"}"#);
        let scalars = write(&dir, "scalars.json", b"[1, 2]");
        let broken = write(&dir, "broken.json", b"[{\"user\": ");

        for path in [object, scalars, broken] {
            assert_eq!(load_logs(&path).unwrap_err().code, LoadErrorCode::ParsingError);
        }
    }

    #[test]
    fn test_load_json_lines_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "auth.jsonl",
            b"{\"user\": \"alice\"}\n\n{\"user\": \"bob\"}\n",
        );

        let records = load_logs(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["user"], json!("bob"));

        let bad = write(&dir, "bad.jsonl", b"{\"user\": \"alice\"}\nnot json\n");
        let err = load_logs(&bad).unwrap_err();
        assert_eq!(err.code, LoadErrorCode::ParsingError);
        assert!(err.message.contains("line 2"));
    }

    #[test]
    fn test_load_all_logs_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        let first = write(&dir, "a.csv", b"user\nalice\n");
        let second = write(&dir, "b.jsonl", b"{\"user\": \"bob\"}\n");
        let missing = dir.path().join("missing.csv");
        let unsupported = write(&dir, "c.txt", b"user\ncarol\n");

        let loaded = load_all_logs(&[
            first,
            missing,
            PathBuf::new(),
            unsupported,
            second,
        ]);

        let users: Vec<&Value> = loaded.records.iter().map(|r| &r["user"]).collect();
        assert_eq!(users, vec![&json!("alice"), &json!("bob")]);

        let codes: Vec<&str> = loaded.failures.iter().map(|f| f.error_code.as_str()).collect();
        assert_eq!(codes, vec!["file_not_found", "unsupported_format"]);
    }

    #[test]
    fn test_load_from_directory_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.csv", b"user\nbob\n");
        write(&dir, "a.csv", b"user\nalice\n");
        write(&dir, "c.json", br#"[{"user": "carol"}]"#);

        let loaded = load_logs_from_directory(dir.path(), DEFAULT_PATTERN);

        let users: Vec<&Value> = loaded.records.iter().map(|r| &r["user"]).collect();
        assert_eq!(users, vec![&json!("alice"), &json!("bob")]);
        assert!(loaded.failures.is_empty());

        let everything = load_logs_from_directory(dir.path(), "*");
        assert_eq!(everything.records.len(), 3);
    }

    #[test]
    fn test_load_from_directory_invalid_pattern() {
        let dir = TempDir::new().unwrap();

        let loaded = load_logs_from_directory(dir.path(), "[");

        assert!(loaded.records.is_empty());
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].file, dir.path().display().to_string());
    }

    #[test]
    fn test_load_from_directory_rejects_escaping_patterns() {
        let parent = TempDir::new().unwrap();
        let inner = parent.path().join("logs");
        fs::create_dir(&inner).unwrap();
        fs::write(parent.path().join("outside.csv"), "user\nmallory\n").unwrap();

        let outside = parent.path().join("*.csv");
        for pattern in ["../*.csv", "sub/../../*.csv", outside.to_str().unwrap()] {
            let loaded = load_logs_from_directory(&inner, pattern);

            assert!(loaded.records.is_empty(), "{} escaped the directory", pattern);
            assert_eq!(loaded.failures.len(), 1);
            assert_eq!(loaded.failures[0].error_code, "unknown");
            assert_eq!(loaded.failures[0].file, inner.display().to_string());
        }
    }

    #[test]
    fn test_load_from_missing_directory() {
        let loaded = load_logs_from_directory(Path::new("/definitely/missing/dir"), DEFAULT_PATTERN);

        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].error_code, "file_not_found");
    }

    #[test]
    fn test_structural_failure_serializes_kind() {
        let failure = LoadError::new("x.txt", LoadErrorCode::UnsupportedFormat, "nope").to_failure();
        let value = serde_json::to_value(&failure).unwrap();

        assert_eq!(value["kind"], json!("StructuralReadFailure"));
        assert_eq!(value["error_code"], json!("unsupported_format"));
        assert_eq!(value["original_error"], json!(null));
    }
}
