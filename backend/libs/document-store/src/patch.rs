//! Field transforms applied to a document on write

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// A single field transform
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Replace the field value
    Set(Value),
    /// Write-time UTC timestamp (RFC 3339, millisecond precision)
    ServerTimestamp,
    /// Append each value not already present; a non-array field becomes an array
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value
    ArrayRemove(Vec<Value>),
    /// Add to a numeric field; a missing or non-numeric field starts from 0
    Increment(i64),
    /// Remove the field
    Delete,
}

/// Ordered list of field transforms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, FieldOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, field: impl Into<String>, op: FieldOp) -> Self {
        self.ops.push((field.into(), op));
        self
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(field, FieldOp::Set(value.into()))
    }

    /// `set` for any serializable value
    pub fn set_serialized<T: Serialize>(
        self,
        field: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(self.op(field, FieldOp::Set(serde_json::to_value(value)?)))
    }

    pub fn server_timestamp(self, field: impl Into<String>) -> Self {
        self.op(field, FieldOp::ServerTimestamp)
    }

    pub fn array_union(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.op(field, FieldOp::ArrayUnion(values))
    }

    pub fn array_remove(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.op(field, FieldOp::ArrayRemove(values))
    }

    pub fn increment(self, field: impl Into<String>, by: i64) -> Self {
        self.op(field, FieldOp::Increment(by))
    }

    pub fn delete(self, field: impl Into<String>) -> Self {
        self.op(field, FieldOp::Delete)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[(String, FieldOp)] {
        &self.ops
    }

    /// Apply every transform in order
    pub fn apply(&self, fields: &mut Map<String, Value>, now: DateTime<Utc>) {
        for (field, op) in &self.ops {
            match op {
                FieldOp::Set(value) => {
                    fields.insert(field.clone(), value.clone());
                }
                FieldOp::ServerTimestamp => {
                    fields.insert(field.clone(), Value::String(format_timestamp(now)));
                }
                FieldOp::ArrayUnion(values) => {
                    let mut array = take_array(fields, field);
                    for value in values {
                        if !array.contains(value) {
                            array.push(value.clone());
                        }
                    }
                    fields.insert(field.clone(), Value::Array(array));
                }
                FieldOp::ArrayRemove(values) => {
                    let mut array = take_array(fields, field);
                    array.retain(|existing| !values.contains(existing));
                    fields.insert(field.clone(), Value::Array(array));
                }
                FieldOp::Increment(by) => {
                    let next = match fields.get(field) {
                        Some(Value::Number(n)) if n.is_i64() => {
                            Value::from(n.as_i64().unwrap_or(0).saturating_add(*by))
                        }
                        Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or(0.0) + *by as f64),
                        _ => Value::from(*by),
                    };
                    fields.insert(field.clone(), next);
                }
                FieldOp::Delete => {
                    fields.remove(field);
                }
            }
        }
    }

    /// Build a fresh document from this patch
    pub fn into_fields(&self, now: DateTime<Utc>) -> Map<String, Value> {
        let mut fields = Map::new();
        self.apply(&mut fields, now);
        fields
    }
}

/// Timestamps are stored as fixed-width RFC 3339 strings so that lexical
/// order matches chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn take_array(fields: &mut Map<String, Value>, field: &str) -> Vec<Value> {
    match fields.remove(field) {
        Some(Value::Array(array)) => array,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_server_timestamp_format() {
        let fields = Patch::new().server_timestamp("createdAt").into_fields(now());
        assert_eq!(fields["createdAt"], json!("2024-05-01T12:00:00.000Z"));
    }

    #[test]
    fn test_array_union_skips_duplicates() {
        let mut fields = Map::new();
        fields.insert("likes".into(), json!(["u1"]));

        Patch::new()
            .array_union("likes", vec![json!("u1"), json!("u2")])
            .apply(&mut fields, now());

        assert_eq!(fields["likes"], json!(["u1", "u2"]));
    }

    #[test]
    fn test_array_union_replaces_non_array() {
        let mut fields = Map::new();
        fields.insert("likes".into(), json!("oops"));

        Patch::new()
            .array_union("likes", vec![json!("u1")])
            .apply(&mut fields, now());

        assert_eq!(fields["likes"], json!(["u1"]));
    }

    #[test]
    fn test_array_remove_all_occurrences() {
        let mut fields = Map::new();
        fields.insert("likes".into(), json!(["u1", "u2", "u1"]));

        Patch::new()
            .array_remove("likes", vec![json!("u1")])
            .apply(&mut fields, now());

        assert_eq!(fields["likes"], json!(["u2"]));
    }

    #[test]
    fn test_increment_missing_and_existing() {
        let mut fields = Map::new();
        Patch::new().increment("shares", 1).apply(&mut fields, now());
        assert_eq!(fields["shares"], json!(1));

        Patch::new().increment("shares", 2).apply(&mut fields, now());
        assert_eq!(fields["shares"], json!(3));
    }

    #[test]
    fn test_ops_apply_in_order() {
        let fields = Patch::new()
            .set("status", "pending")
            .set("status", "connected")
            .set("temp", 1)
            .delete("temp")
            .into_fields(now());

        assert_eq!(fields["status"], json!("connected"));
        assert!(!fields.contains_key("temp"));
    }
}
