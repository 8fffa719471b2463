//! JSON encoding of the filter list stored in an object's index map.

use serde_json::Value;

use crate::error::{Error, Result};

/// Encodes filters as a JSON array of strings.
pub(crate) fn encode_filters(filters: &[String]) -> String {
    Value::Array(filters.iter().cloned().map(Value::String).collect()).to_string()
}

/// Decodes an index map entry.
///
/// Strings are taken as-is and numbers as their JSON text. Anything else,
/// including malformed JSON, is [`Error::CorruptIndexMap`].
pub(crate) fn decode_filters(key: &str, field: &str, encoded: &str) -> Result<Vec<String>> {
    let corrupt = |message: String| Error::CorruptIndexMap {
        key: key.to_string(),
        field: field.to_string(),
        message,
    };

    let value: Value =
        serde_json::from_str(encoded).map_err(|e| corrupt(format!("{e}: {encoded}")))?;
    let Value::Array(items) = value else {
        return Err(corrupt(format!("expected a JSON array: {encoded}")));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(corrupt(format!("unsupported filter value {other}"))),
        })
        .collect()
}
