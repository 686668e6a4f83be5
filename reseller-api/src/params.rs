//! Request parameter flattening.
//!
//! The API expects nested parameters as bracket-notation form fields:
//!
//! ```json
//! { "filter": { "status": "active", "ids": [4, 7] }, "notify": true }
//! ```
//!
//! becomes
//!
//! ```text
//! filter[ids][0] = 4
//! filter[ids][1] = 7
//! filter[status] = active
//! notify         = true
//! ```
//!
//! Parameter trees are plain [`serde_json::Value`]s, usually built with
//! [`serde_json::json!`].

use serde_json::Value;

/// Flattened form fields, in a stable order.
///
/// Object keys follow `serde_json`'s map order, array elements follow
/// their index, so flattening the same tree twice yields identical output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatParams(Vec<(String, String)>);

impl FlatParams {
    /// Look up the value recorded for a bracket key such as `filter[status]`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of form fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the tree produced no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields as `(key, value)` pairs, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl IntoIterator for FlatParams {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Flatten a parameter tree into bracket-notation form fields.
///
/// Objects and arrays recurse (array indices become path segments);
/// booleans become `"true"`/`"false"`, numbers their decimal form and
/// strings are kept as-is. `null` contributes no field. A scalar at the
/// root has no key to live under and yields nothing.
pub fn flatten(tree: &Value) -> FlatParams {
    let mut out = Vec::new();
    flatten_into(tree, None, &mut out);
    FlatParams(out)
}

fn flatten_into(current: &Value, prefix: Option<&str>, out: &mut Vec<(String, String)>) {
    match current {
        Value::Object(map) => {
            for (k, v) in map {
                visit(v, &nested_key(prefix, k), out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                visit(v, &nested_key(prefix, &i.to_string()), out);
            }
        }
        _ => {}
    }
}

fn visit(value: &Value, key: &str, out: &mut Vec<(String, String)>) {
    let scalar = match value {
        Value::Object(_) | Value::Array(_) | Value::Null => {
            flatten_into(value, Some(key), out);
            return;
        }
        Value::Bool(true) => "true".to_owned(),
        Value::Bool(false) => "false".to_owned(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
    };
    out.push((key.to_owned(), scalar));
}

fn nested_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) => format!("{p}[{key}]"),
        None => key.to_owned(),
    }
}
