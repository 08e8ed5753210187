//! Filter and ordering evaluation
//!
//! The same [`Query`] is sent to the remote service and, on fail-over,
//! evaluated in memory against the local collection.

use crate::storage::record::{Record, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single row predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Field equals value
    Eq { field: String, value: Value },
    /// Case-insensitive substring match on any of the listed fields
    Search { fields: Vec<String>, term: String },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn search(fields: &[&str], term: impl Into<String>) -> Self {
        Filter::Search {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            term: term.into(),
        }
    }

    /// Evaluate the predicate against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq { field, value } => match record.get_field(field) {
                Some(found) => values_equal(&found, value),
                None => value.is_null(),
            },
            Filter::Search { fields, term } => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    record
                        .get_field(field)
                        .map(|v| v.contains_lowercase(&needle))
                        .unwrap_or(false)
                })
            }
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filters, ordering and limit for a select
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if every filter accepts the record
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Apply filters, ordering and limit to an in-memory record set
    pub fn apply(&self, mut records: Vec<Record>) -> Vec<Record> {
        records.retain(|r| self.matches(r));

        if !self.order_by.is_empty() {
            records.sort_by(|a, b| {
                for order in &self.order_by {
                    let cmp = compare_values(
                        a.get_field(&order.field).as_ref(),
                        b.get_field(&order.field).as_ref(),
                    );
                    if cmp != Ordering::Equal {
                        return match order.direction {
                            Direction::Asc => cmp,
                            Direction::Desc => cmp.reverse(),
                        };
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        records
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => a == b,
    }
}

/// Missing and null sort before everything else
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Int(a)), Some(Value::Int(b))) => a.cmp(b),
        (Some(Value::Float(a)), Some(Value::Float(b))) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Int(a)), Some(Value::Float(b))) => {
            (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Float(a)), Some(Value::Int(b))) => {
            a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}
