// ✅ Field Validators - one pure check per semantic type
// validate(value, rule) → Ok, or the ErrorKind + message that quarantines the row

use crate::classifier::ErrorKind;
use crate::record::{preview_value, value_type_name};
use crate::schema::Rule;
use chrono::format::{Item, Numeric, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

/// Longest slice of an offending value quoted in a message
const MESSAGE_VALUE_CHARS: usize = 40;

// ============================================================================
// FIELD FAILURE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl FieldFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        FieldFailure {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

pub type FieldResult = Result<(), FieldFailure>;

// ============================================================================
// DISPATCH
// ============================================================================

/// Check one value against one compiled rule.
///
/// `None` means the key is absent. Only the datetime validator and the
/// required-field check care about that distinction; the classifier never
/// calls a validator for an absent optional field.
pub fn validate(value: Option<&Value>, rule: &Rule) -> FieldResult {
    match rule {
        Rule::Datetime { formats } => validate_datetime(value, formats),
        Rule::BoundedString {
            min_length,
            max_length,
        } => validate_bounded_string(value, *min_length, *max_length),
        Rule::Enum { allowed_values } => validate_enum(value, allowed_values),
        Rule::Pattern { source, regex } => validate_pattern(value, source, regex),
    }
}

// ============================================================================
// VALIDATION RULES
// ============================================================================

/// Succeeds on the first format that parses. Order never changes the verdict.
pub fn validate_datetime(value: Option<&Value>, formats: &[String]) -> FieldResult {
    let text = match value {
        Some(Value::String(s)) => s,
        None | Some(Value::Null) => {
            return Err(FieldFailure::new(ErrorKind::InvalidTimestamp, "Timestamp is missing"));
        }
        Some(other) => {
            return Err(FieldFailure::new(
                ErrorKind::InvalidTimestamp,
                format!("Timestamp must be a string, got {}", value_type_name(other)),
            ));
        }
    };

    if text.trim().is_empty() {
        return Err(FieldFailure::new(ErrorKind::InvalidTimestamp, "Timestamp is empty"));
    }

    if formats.iter().any(|format| parses_as(text, format)) {
        return Ok(());
    }

    Err(FieldFailure::new(
        ErrorKind::InvalidTimestamp,
        format!(
            "Invalid timestamp '{}': matches none of {}",
            preview_value(&Value::String(text.clone()), MESSAGE_VALUE_CHARS),
            formats.join(" | ")
        ),
    ))
}

fn parses_as(text: &str, format: &str) -> bool {
    if !matches_layout(text, format) {
        return false;
    }
    // Date-only layouts never yield a NaiveDateTime
    NaiveDateTime::parse_from_str(text, format).is_ok()
        || NaiveDate::parse_from_str(text, format).is_ok()
}

/// Shape check chrono's parser is too forgiving for: numbers start right
/// away (no padding spaces) with bounded width, format whitespace needs at
/// least one whitespace character, literals match exactly, nothing trails.
fn matches_layout(text: &str, format: &str) -> bool {
    let mut rest = text;

    for item in StrftimeItems::new(format) {
        match item {
            Item::Literal(literal) => match rest.strip_prefix(literal) {
                Some(tail) => rest = tail,
                None => return false,
            },
            Item::OwnedLiteral(ref literal) => match rest.strip_prefix(&**literal) {
                Some(tail) => rest = tail,
                None => return false,
            },
            Item::Space(_) | Item::OwnedSpace(_) => {
                let tail = rest.trim_start();
                if tail.len() == rest.len() {
                    return false;
                }
                rest = tail;
            }
            Item::Numeric(ref numeric, _) => {
                let digits = rest
                    .chars()
                    .take(max_digits(numeric))
                    .take_while(|c| c.is_ascii_digit())
                    .count();
                if digits == 0 {
                    return false;
                }
                rest = &rest[digits..];
            }
            Item::Error => return false,
            // Names, offsets and other fixed items are left to chrono
            _ => return true,
        }
    }

    rest.is_empty()
}

fn max_digits(numeric: &Numeric) -> usize {
    match numeric {
        Numeric::Year | Numeric::IsoYear => 4,
        Numeric::Ordinal => 3,
        // Microsecond precision at most
        Numeric::Nanosecond => 6,
        Numeric::Timestamp => 20,
        _ => 2,
    }
}

/// Length counted in characters, bounds inclusive
pub fn validate_bounded_string(
    value: Option<&Value>,
    min_length: usize,
    max_length: Option<usize>,
) -> FieldResult {
    let text = match value {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(FieldFailure::new(
                ErrorKind::InvalidUser,
                format!("Expected a string, got {}", value_type_name(other)),
            ));
        }
        None => return Err(FieldFailure::new(ErrorKind::InvalidUser, "Value is missing")),
    };

    let length = text.chars().count();

    if length < min_length {
        return Err(FieldFailure::new(
            ErrorKind::InvalidUser,
            format!("Length {} is below minimum {}", length, min_length),
        ));
    }

    if let Some(max) = max_length {
        if length > max {
            return Err(FieldFailure::new(
                ErrorKind::InvalidUser,
                format!("Length {} exceeds maximum {}", length, max),
            ));
        }
    }

    Ok(())
}

/// Case-sensitive exact membership. Non-strings never match.
pub fn validate_enum(value: Option<&Value>, allowed_values: &[String]) -> FieldResult {
    match value {
        Some(Value::String(s)) if allowed_values.iter().any(|allowed| allowed == s) => Ok(()),
        Some(other) => Err(FieldFailure::new(
            ErrorKind::InvalidEnum,
            format!(
                "'{}' is not one of: {}",
                preview_value(other, MESSAGE_VALUE_CHARS),
                allowed_values.join(", ")
            ),
        )),
        None => Err(FieldFailure::new(ErrorKind::InvalidEnum, "Value is missing")),
    }
}

/// Whole-value match of the value's text form (`regex` is pre-anchored)
pub fn validate_pattern(value: Option<&Value>, source: &str, regex: &Regex) -> FieldResult {
    let text: Cow<'_, str> = match value {
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(Value::Number(n)) => Cow::Owned(n.to_string()),
        Some(Value::Bool(b)) => Cow::Owned(b.to_string()),
        Some(other) => {
            return Err(FieldFailure::new(
                ErrorKind::InvalidPattern,
                format!("Expected a scalar, got {}", value_type_name(other)),
            ));
        }
        None => return Err(FieldFailure::new(ErrorKind::InvalidPattern, "Value is missing")),
    };

    if regex.is_match(&text) {
        Ok(())
    } else {
        Err(FieldFailure::new(
            ErrorKind::InvalidPattern,
            format!(
                "'{}' does not match pattern {}",
                preview_value(&Value::String(text.into_owned()), MESSAGE_VALUE_CHARS),
                source
            ),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
