// 📐 Schema Registry - declarative description of recognized log fields
// Built once at startup, validated on construction, immutable afterwards

use anyhow::Context;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Accepted timestamp layouts for authentication logs
pub const AUTH_LOG_TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S.%f",
];

/// Dotted-quad IPv4 address, 0-255 per octet
pub const IPV4_PATTERN: &str =
    r"((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";

// ============================================================================
// SEMANTIC TYPES
// ============================================================================

/// Validation strategy family of a field, carrying its own constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SemanticType {
    /// Text timestamp matching one of `formats` (strftime syntax)
    Datetime { formats: Vec<String> },

    /// Text whose length (in characters) lies in `[min_length, max_length]`
    String {
        #[serde(default)]
        min_length: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },

    /// Text that is exactly one of `allowed_values` (case-sensitive)
    Enum { allowed_values: Vec<String> },

    /// Value whose text form fully matches `regex`
    Pattern { regex: String },
}

impl SemanticType {
    pub fn name(&self) -> &'static str {
        match self {
            SemanticType::Datetime { .. } => "datetime",
            SemanticType::String { .. } => "string",
            SemanticType::Enum { .. } => "enum",
            SemanticType::Pattern { .. } => "pattern",
        }
    }
}

// ============================================================================
// FIELD SPEC
// ============================================================================

/// FieldSpec - one entry of the registry, as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, unique within a schema
    pub name: String,

    /// Must be present and non-null in every record
    #[serde(default)]
    pub required: bool,

    /// What the field means
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// How the field is validated
    #[serde(flatten)]
    pub semantic_type: SemanticType,
}

impl FieldSpec {
    /// Create an optional field of the given semantic type
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        FieldSpec {
            name: name.into(),
            required: false,
            description: String::new(),
            semantic_type,
        }
    }

    pub fn datetime(name: impl Into<String>, formats: &[&str]) -> Self {
        Self::new(
            name,
            SemanticType::Datetime {
                formats: formats.iter().map(|f| f.to_string()).collect(),
            },
        )
    }

    pub fn string(name: impl Into<String>, min_length: usize, max_length: Option<usize>) -> Self {
        Self::new(name, SemanticType::String { min_length, max_length })
    }

    pub fn enumeration(name: impl Into<String>, allowed_values: &[&str]) -> Self {
        Self::new(
            name,
            SemanticType::Enum {
                allowed_values: allowed_values.iter().map(|v| v.to_string()).collect(),
            },
        )
    }

    pub fn pattern(name: impl Into<String>, regex: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Pattern { regex: regex.into() })
    }

    /// Builder: mark field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

// ============================================================================
// COMPILED FIELDS
// ============================================================================

/// Validation rule compiled from a [`SemanticType`].
///
/// Only a [`Schema`] builds these, so every rule is known to be consistent.
#[derive(Debug, Clone)]
pub enum Rule {
    Datetime { formats: Vec<String> },
    BoundedString { min_length: usize, max_length: Option<usize> },
    Enum { allowed_values: Vec<String> },
    Pattern { source: String, regex: Regex },
}

/// A declared field together with its compiled rule
#[derive(Debug, Clone)]
pub struct Field {
    spec: FieldSpec,
    rule: Rule,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_required(&self) -> bool {
        self.spec.required
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    fn compile(spec: FieldSpec) -> Result<Self, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidConstraint {
            field: spec.name.clone(),
            semantic_type: spec.semantic_type.name(),
            reason,
        };

        let rule = match &spec.semantic_type {
            SemanticType::Datetime { formats } => {
                if formats.is_empty() {
                    return Err(invalid("at least one format is required".to_string()));
                }
                for format in formats {
                    if format.trim().is_empty() {
                        return Err(invalid("format strings must not be empty".to_string()));
                    }
                    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                        return Err(invalid(format!("malformed format '{}'", format)));
                    }
                }
                Rule::Datetime { formats: formats.clone() }
            }

            SemanticType::String { min_length, max_length } => {
                if let Some(max) = max_length {
                    if min_length > max {
                        return Err(invalid(format!(
                            "min_length {} exceeds max_length {}",
                            min_length, max
                        )));
                    }
                }
                Rule::BoundedString {
                    min_length: *min_length,
                    max_length: *max_length,
                }
            }

            SemanticType::Enum { allowed_values } => {
                if allowed_values.is_empty() {
                    return Err(invalid("allowed_values must not be empty".to_string()));
                }
                Rule::Enum { allowed_values: allowed_values.clone() }
            }

            SemanticType::Pattern { regex } => {
                // Anchored so that only whole-value matches count
                let compiled = Regex::new(&format!("^(?:{})$", regex))
                    .map_err(|e| invalid(format!("regex does not compile: {}", e)))?;
                Rule::Pattern {
                    source: regex.clone(),
                    regex: compiled,
                }
            }
        };

        Ok(Field { spec, rule })
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Misconfigured schema. Fatal: the engine must not start with one.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema '{schema}' declares no fields")]
    Empty { schema: String },

    #[error("schema '{schema}' declares no required field")]
    NoRequiredField { schema: String },

    #[error("schema '{schema}' declares field '{field}' more than once")]
    DuplicateField { schema: String, field: String },

    #[error("schema '{schema}' has a field with an empty name")]
    InvalidField { schema: String },

    #[error("field '{field}' ({semantic_type}): {reason}")]
    InvalidConstraint {
        field: String,
        semantic_type: &'static str,
        reason: String,
    },
}

// ============================================================================
// SCHEMA CONFIG
// ============================================================================

/// On-disk form of a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Schema - the registry of recognized fields.
///
/// Construction checks every spec against its semantic type and fails with a
/// [`SchemaError`] instead of accepting an inconsistent schema. There is no
/// mutation API, so several schemas (e.g. versioned log formats) can be
/// shared freely in one process.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    /// Field indices in validation order
    precedence: Vec<usize>,
}

impl Schema {
    pub fn new(name: impl Into<String>, specs: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let name = name.into();

        if specs.is_empty() {
            return Err(SchemaError::Empty { schema: name });
        }

        let mut fields = Vec::with_capacity(specs.len());
        let mut by_name = HashMap::with_capacity(specs.len());

        for spec in specs {
            if spec.name.trim().is_empty() {
                return Err(SchemaError::InvalidField { schema: name });
            }
            if by_name.contains_key(&spec.name) {
                return Err(SchemaError::DuplicateField {
                    schema: name,
                    field: spec.name,
                });
            }
            by_name.insert(spec.name.clone(), fields.len());
            fields.push(Field::compile(spec)?);
        }

        if !fields.iter().any(Field::is_required) {
            return Err(SchemaError::NoRequiredField { schema: name });
        }

        let precedence = validation_precedence(&fields);

        Ok(Schema {
            name,
            fields,
            by_name,
            precedence,
        })
    }

    pub fn from_config(config: SchemaConfig) -> Result<Self, SchemaError> {
        Self::new(config.name, config.fields)
    }

    /// Parse and validate a schema from its JSON form
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: SchemaConfig =
            serde_json::from_str(json).context("Failed to parse schema JSON")?;
        Ok(Self::from_config(config)?)
    }

    /// Load schema from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read schema file: {:?}", path.as_ref()))?;

        Self::from_json_str(&content)
            .with_context(|| format!("Invalid schema file: {:?}", path.as_ref()))
    }

    /// Built-in schema for authentication/security logs
    pub fn auth_log() -> Result<Self, SchemaError> {
        Self::new(
            "auth_log",
            vec![
                FieldSpec::datetime("timestamp", &AUTH_LOG_TIMESTAMP_FORMATS)
                    .required()
                    .with_description("When the auth event occurred"),
                FieldSpec::string("user", 1, Some(256))
                    .required()
                    .with_description("The user account that performed the action"),
                FieldSpec::string("event_id", 0, None)
                    .with_description("Unique identifier for the event, used for tracking and deduplication"),
                FieldSpec::pattern("src_ip", IPV4_PATTERN)
                    .with_description("The IP address from which the login/action originated"),
                FieldSpec::string("dest_host", 1, Some(255))
                    .with_description("The target host or service that was accessed"),
                FieldSpec::enumeration("action", &["success", "failure", "blocked"])
                    .with_description("The outcome of the auth attempt"),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get field spec by name
    pub fn lookup(&self, name: &str) -> Option<&FieldSpec> {
        self.field(name).map(Field::spec)
    }

    /// Get compiled field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Names of required fields, in declaration order
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.is_required())
            .map(Field::name)
            .collect()
    }

    /// All field specs, in declaration order
    pub fn all_fields(&self) -> Vec<&FieldSpec> {
        self.fields.iter().map(Field::spec).collect()
    }

    /// Compiled fields, in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Compiled fields in the order the classifier validates them:
    /// primary timestamp, primary identity, then the rest as declared.
    pub fn validation_order(&self) -> impl Iterator<Item = &Field> + '_ {
        self.precedence.iter().map(move |&i| &self.fields[i])
    }

    pub fn count(&self) -> usize {
        self.fields.len()
    }

    pub fn to_config(&self) -> SchemaConfig {
        SchemaConfig {
            name: self.name.clone(),
            fields: self.fields.iter().map(|f| f.spec.clone()).collect(),
        }
    }
}

/// Primary timestamp = first datetime field, primary identity = first
/// required bounded string. Everything else keeps declaration order.
fn validation_precedence(fields: &[Field]) -> Vec<usize> {
    let timestamp = fields
        .iter()
        .position(|f| matches!(f.rule, Rule::Datetime { .. }));
    let identity = fields
        .iter()
        .position(|f| f.is_required() && matches!(f.rule, Rule::BoundedString { .. }));

    let head: Vec<usize> = timestamp.into_iter().chain(identity).collect();
    let rest = (0..fields.len()).filter(|i| !head.contains(i));
    head.iter().copied().chain(rest).collect()
}

// ============================================================================
// TESTS
// ============================================================================
