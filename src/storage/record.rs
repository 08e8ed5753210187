//! Record representation
//!
//! A Record is one entity instance: a required `id`, an optional `Sno`
//! display sequence, and a schema-less bag of scalar attributes. On the
//! wire and on disk the three parts are flattened into a single object.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the identity field
pub const ID_FIELD: &str = "id";

/// Name of the display sequence field
pub const SNO_FIELD: &str = "Sno";

/// Attributes stamped by the repository rather than the caller
pub const AUDIT_FIELDS: &[&str] = &["createdBy", "createdAt", "updatedBy", "updatedAt"];

/// A record in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier, assigned at creation and never reassigned
    pub id: String,

    /// Display sequence for ordered collections, never mutated after creation
    #[serde(rename = "Sno", default, skip_serializing_if = "Option::is_none")]
    pub sno: Option<i64>,

    /// Everything else
    #[serde(flatten)]
    pub fields: Fields,
}

/// Scalar attribute values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Case-insensitive substring match against the value's text form.
    ///
    /// `needle` must already be lowercase. Null never matches.
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => s.to_lowercase().contains(needle),
            other => other.to_string().to_lowercase().contains(needle),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A map of attribute names to values
pub type Fields = BTreeMap<String, Value>;

impl Record {
    /// Create an empty record with the given ID
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sno: None,
            fields: Fields::new(),
        }
    }

    /// Generate a fresh, never-before-seen record ID
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Build a record from caller-supplied attributes.
    ///
    /// `id` and `Sno` keys are dropped; those are owned by the repository.
    pub fn with_attributes(id: impl Into<String>, attributes: Fields) -> Self {
        let mut record = Self::new(id);
        record.fields = attributes
            .into_iter()
            .filter(|(key, _)| key != ID_FIELD && key != SNO_FIELD)
            .collect();
        record
    }

    /// Set an attribute value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get an attribute value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up any field by name, including `id` and `Sno`
    pub fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            ID_FIELD => Some(Value::String(self.id.clone())),
            SNO_FIELD => self.sno.map(Value::Int),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Attributes supplied by callers, without repository audit stamps
    pub fn user_fields(&self) -> Fields {
        self.fields
            .iter()
            .filter(|(key, _)| !AUDIT_FIELDS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Drop null attributes; a relational NULL means the attribute is absent
    pub fn without_nulls(mut self) -> Self {
        self.fields.retain(|_, v| !v.is_null());
        self
    }

    /// True if any field (including `id`) contains `term`, case-insensitively
    pub fn matches_any_field(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        self.id.to_lowercase().contains(&needle)
            || self.sno.is_some_and(|sno| sno.to_string().contains(&needle))
            || self.fields.values().any(|v| v.contains_lowercase(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let mut record = Record::new("p-1");
        record
            .set("name", "Asha Rao")
            .set("age", 42i64)
            .set("insured", false);

        assert_eq!(record.id, "p-1");
        assert_eq!(record.get("name"), Some(&Value::String("Asha Rao".into())));
        assert_eq!(record.get_field("id"), Some(Value::String("p-1".into())));
        assert_eq!(record.get_field("Sno"), None);
    }

    #[test]
    fn test_flattened_json_shape() {
        let mut record = Record::new("rx-1");
        record.sno = Some(7);
        record.set("medicine", "Amoxicillin");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "rx-1");
        assert_eq!(json["Sno"], 7);
        assert_eq!(json["medicine"], "Amoxicillin");

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_null_sno_and_attributes() {
        let json = serde_json::json!({"id": "a", "Sno": null, "note": null, "n": 1.5});
        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.sno, None);
        assert_eq!(parsed.get("note"), Some(&Value::Null));
        assert_eq!(parsed.get("n"), Some(&Value::Float(1.5)));

        let stripped = parsed.without_nulls();
        assert!(stripped.get("note").is_none());
    }

    #[test]
    fn test_reserved_attributes_dropped() {
        let mut attrs = Fields::new();
        attrs.insert("id".into(), "spoofed".into());
        attrs.insert("Sno".into(), Value::Int(99));
        attrs.insert("name".into(), "Ravi".into());

        let record = Record::with_attributes("real", attrs);
        assert_eq!(record.id, "real");
        assert_eq!(record.sno, None);
        assert_eq!(record.fields.len(), 1);
    }

    #[test]
    fn test_matches_any_field() {
        let mut record = Record::new("s-1");
        record.set("name", "Meera").set("notes", "Allergic to PENICILLIN");

        assert!(record.matches_any_field("penicillin"));
        assert!(record.matches_any_field("MEE"));
        assert!(!record.matches_any_field("ibuprofen"));
    }

    #[test]
    fn test_user_fields_skip_audit() {
        let mut record = Record::new("x");
        record.set("name", "A").set("createdBy", "admin");
        let user = record.user_fields();
        assert_eq!(user.len(), 1);
        assert!(user.contains_key("name"));
    }
}
