//! Expected response body predicate.
//!
//! A health check may declare the fields its response body must contain.
//! The declaration is a JSON (or TOML) object; nested objects are flattened
//! into dotted field paths at load time so matching is a walk over a fixed
//! list instead of a structural comparison of whole documents.
//!
//! ```text
//! expected_response = { status = "ok", db = { connected = true } }
//!     → status        == "ok"
//!     → db.connected  == true
//! ```
//!
//! Fields present in the body but not declared are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One required field and its expected value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExpectation {
    pub path: Vec<String>,
    pub expected: Value,
}

impl FieldExpectation {
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// The body did not satisfy a declared field.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("field `{field}` expected {expected}, found {}", describe(.found))]
pub struct BodyMismatch {
    pub field: String,
    pub expected: Value,
    pub found: Option<Value>,
}

fn describe(found: &Option<Value>) -> String {
    match found {
        Some(value) => value.to_string(),
        None => "nothing".to_string(),
    }
}

/// Typed partial-match predicate over a response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct BodyExpectation {
    fields: Vec<FieldExpectation>,
}

impl BodyExpectation {
    /// Flatten a declaration object into field expectations.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let mut fields = Vec::new();
        flatten(Vec::new(), object, &mut fields);
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldExpectation] {
        &self.fields
    }

    /// Check a parsed body; returns the first field that does not match.
    pub fn check(&self, body: &Value) -> Result<(), BodyMismatch> {
        for field in &self.fields {
            let found = lookup(body, &field.path);
            let matches = match (&field.expected, found) {
                // `{}` only asks for an object to be present.
                (Value::Object(expected), Some(Value::Object(_))) if expected.is_empty() => true,
                (expected, Some(actual)) => expected == actual,
                (_, None) => false,
            };

            if !matches {
                return Err(BodyMismatch {
                    field: field.dotted_path(),
                    expected: field.expected.clone(),
                    found: found.cloned(),
                });
            }
        }
        Ok(())
    }
}

fn flatten(prefix: Vec<String>, object: Map<String, Value>, out: &mut Vec<FieldExpectation>) {
    for (name, value) in object {
        let mut path = prefix.clone();
        path.push(name);
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten(path, nested, out),
            expected => out.push(FieldExpectation { path, expected }),
        }
    }
}

fn lookup<'a>(body: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(body, |current, segment| current.as_object()?.get(segment))
}

impl TryFrom<Value> for BodyExpectation {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(object) => Ok(Self::from_object(object)),
            other => Err(format!(
                "expected_response must be an object of fields, got {other}"
            )),
        }
    }
}

impl From<BodyExpectation> for Value {
    fn from(expectation: BodyExpectation) -> Self {
        let mut root = Map::new();
        for field in expectation.fields {
            insert_path(&mut root, &field.path, field.expected);
        }
        Value::Object(root)
    }
}

fn insert_path(map: &mut Map<String, Value>, path: &[String], value: Value) {
    match path {
        [] => {}
        [last] => {
            map.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(child) => insert_path(child, rest, value),
                other => {
                    let mut child = Map::new();
                    insert_path(&mut child, rest, value);
                    *other = Value::Object(child);
                }
            }
        }
    }
}
