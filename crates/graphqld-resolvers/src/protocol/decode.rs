//! Turns resolver output into a typed value.
//!
//! Output may start with a preamble of `Name: value` lines ended by a blank
//! line. The preamble becomes [`ResponseMetadata`]; the remainder is decoded
//! according to the declared return type:
//!
//! - `String` and `ID` take the raw text minus one trailing line break.
//! - `Int`, `Float`, and `Boolean` parse the trimmed text.
//! - `DateTime` must be an RFC 3339 timestamp.
//! - Object and list types are parsed as JSON.
//!
//! Empty output decodes to `null` for nullable types.

use serde_json::{Number, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ResolverError;
use crate::signature::{FieldSignature, ScalarType, TypeRef};

/// Headers from a response preamble, in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    headers: Vec<(String, String)>,
}

impl ResponseMetadata {
    /// First value for `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether no preamble was present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl FromIterator<(String, String)> for ResponseMetadata {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            headers: iter.into_iter().collect(),
        }
    }
}

/// A decoded resolver answer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    /// Value typed according to the declared return type.
    pub value: Value,
    /// Preamble headers, empty when there was none.
    pub metadata: ResponseMetadata,
}

/// Splits a leading header block from `raw`.
///
/// The head is only treated as a preamble when every line before the first
/// blank line has the form `Token: value`. Otherwise the whole output is
/// returned as the body.
#[must_use]
pub fn split_preamble(raw: &[u8]) -> (ResponseMetadata, &[u8]) {
    let Some((head, body)) = split_at_blank_line(raw) else {
        return (ResponseMetadata::default(), raw);
    };
    let Ok(head) = std::str::from_utf8(head) else {
        return (ResponseMetadata::default(), raw);
    };
    if head.is_empty() {
        return (ResponseMetadata::default(), raw);
    }

    let mut headers = Vec::new();
    for line in head.lines() {
        match parse_header(line) {
            Some(header) => headers.push(header),
            None => return (ResponseMetadata::default(), raw),
        }
    }
    (ResponseMetadata { headers }, body)
}

fn split_at_blank_line(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let lf = find(raw, b"\n\n").map(|at| (at, 2));
    let crlf = find(raw, b"\r\n\r\n").map(|at| (at, 4));
    let (at, width) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(found), None) | (None, Some(found)) => found,
        (None, None) => return None,
    };
    Some((raw.get(..at)?, raw.get(at + width..)?))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_header(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let is_token = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    is_token.then(|| (name.to_owned(), value.trim().to_owned()))
}

/// Decodes a resolver's standard output for `signature`.
///
/// # Errors
///
/// Returns [`ResolverError::MalformedResponse`] when the output does not
/// match the declared return type.
pub fn decode_response(
    raw: &[u8],
    signature: &FieldSignature,
) -> Result<DecodedResponse, ResolverError> {
    let (metadata, body) = split_preamble(raw);
    let value = decode_value(body, signature.return_type()).map_err(|message| {
        ResolverError::MalformedResponse {
            resolver: signature.path(),
            message,
        }
    })?;
    Ok(DecodedResponse { value, metadata })
}

fn decode_value(body: &[u8], ty: &TypeRef) -> Result<Value, String> {
    let text =
        std::str::from_utf8(body).map_err(|_| "output is not valid UTF-8".to_owned())?;
    let required = ty.is_non_null();
    match ty.scalar() {
        Some(scalar) if scalar.is_text() => Ok(decode_text(text, required)),
        Some(scalar) => decode_scalar(text.trim(), scalar, required),
        None if ty.is_list() => decode_json(text.trim(), required, "array", Value::is_array),
        None => decode_json(text.trim(), required, "object", Value::is_object),
    }
}

fn decode_text(text: &str, required: bool) -> Value {
    let line = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text);
    if line.is_empty() && !required {
        Value::Null
    } else {
        Value::String(line.to_owned())
    }
}

fn decode_scalar(text: &str, scalar: ScalarType, required: bool) -> Result<Value, String> {
    if text.is_empty() {
        return empty_output(required, scalar.name());
    }
    match scalar {
        ScalarType::Int => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|err| format!("expected Int, found {text:?}: {err}")),
        ScalarType::Float => {
            let parsed = text
                .parse::<f64>()
                .map_err(|err| format!("expected Float, found {text:?}: {err}"))?;
            Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| format!("Float {text:?} is not finite"))
        }
        ScalarType::Boolean => match text {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            other => Err(format!("expected Boolean, found {other:?}")),
        },
        ScalarType::DateTime => OffsetDateTime::parse(text, &Rfc3339)
            .map(|_| Value::String(text.to_owned()))
            .map_err(|err| format!("expected an RFC 3339 DateTime, found {text:?}: {err}")),
        ScalarType::String | ScalarType::Id => Ok(Value::String(text.to_owned())),
    }
}

fn decode_json(
    text: &str,
    required: bool,
    expected: &str,
    matches: fn(&Value) -> bool,
) -> Result<Value, String> {
    if text.is_empty() {
        return empty_output(required, expected);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|err| format!("expected JSON {expected}: {err}"))?;
    if value.is_null() {
        return if required {
            Err(format!("non-null {expected} resolved to null"))
        } else {
            Ok(Value::Null)
        };
    }
    if matches(&value) {
        Ok(value)
    } else {
        Err(format!("expected JSON {expected}, found {}", json_kind(&value)))
    }
}

fn empty_output(required: bool, expected: &str) -> Result<Value, String> {
    if required {
        Err(format!("non-null {expected} produced no output"))
    } else {
        Ok(Value::Null)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
