//! Quota-pressure payload sanitization.
//!
//! When a commit fails with a quota-exceeded error, the store rewrites the
//! value with [`strip_image_payloads`] and retries the write once. This is the
//! single lossy transform in the persistence layer and it never runs on the
//! normal write path.

use serde_json::Value;

/// Replaces oversized embedded image payloads in `value` with `placeholder`.
///
/// Walks objects and arrays to at most `max_depth` nesting levels; values
/// buried deeper pass through untouched. A string is replaced when it starts
/// with the image data-URI marker and its length exceeds `threshold`. Returns
/// the rewritten value and the number of replacements made.
pub fn strip_image_payloads(
    value: &Value,
    max_depth: usize,
    threshold: usize,
    placeholder: &str,
) -> (Value, usize) {
    let mut replaced = 0;
    let stripped = strip(value, 0, max_depth, threshold, placeholder, &mut replaced);
    (stripped, replaced)
}

fn is_image_payload(text: &str, threshold: usize) -> bool {
    text.starts_with(loandesk_config::IMAGE_DATA_URI_MARKER) && text.len() > threshold
}

fn strip(
    value: &Value,
    depth: usize,
    max_depth: usize,
    threshold: usize,
    placeholder: &str,
    replaced: &mut usize,
) -> Value {
    match value {
        Value::String(text) if is_image_payload(text, threshold) => {
            *replaced += 1;
            Value::String(placeholder.to_string())
        }
        Value::Object(map) if depth < max_depth => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        strip(v, depth + 1, max_depth, threshold, placeholder, replaced),
                    )
                })
                .collect(),
        ),
        Value::Array(items) if depth < max_depth => Value::Array(
            items
                .iter()
                .map(|v| strip(v, depth + 1, max_depth, threshold, placeholder, replaced))
                .collect(),
        ),
        other => other.clone(),
    }
}
