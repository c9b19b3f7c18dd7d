//! Parsed statements and predicate evaluation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// What a condition checks on its column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Test {
    Compare(CompareOp, Value),
    IsNull,
    IsNotNull,
}

/// One `WHERE` conjunct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub test: Test,
}

impl Condition {
    /// Evaluate against a record. A missing column reads as `NULL`, and `NULL`
    /// satisfies no comparison, only `IS NULL`.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        let value = record.get(&self.column).unwrap_or(&Value::Null);
        match &self.test {
            Test::IsNull => value.is_null(),
            Test::IsNotNull => !value.is_null(),
            Test::Compare(op, literal) => {
                if value.is_null() || literal.is_null() {
                    return false;
                }
                match op {
                    CompareOp::Eq => values_equal(value, literal),
                    CompareOp::NotEq => !values_equal(value, literal),
                    CompareOp::Lt => compare(value, literal) == Some(Ordering::Less),
                    CompareOp::LtEq => matches!(
                        compare(value, literal),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    CompareOp::Gt => compare(value, literal) == Some(Ordering::Greater),
                    CompareOp::GtEq => matches!(
                        compare(value, literal),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                }
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Order two values of the same kind; `None` if they are not comparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// `SELECT` column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    /// One value per column, per row.
    pub rows: Vec<Vec<Value>>,
}

impl Insert {
    /// The rows as records keyed by column name.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub table: String,
    pub projection: Projection,
    /// Conjuncts; an empty list matches every record.
    pub conditions: Vec<Condition>,
    pub limit: Option<usize>,
}

impl Select {
    /// Whether `record` satisfies every condition.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Keep only the projected columns. A projected column the record lacks
    /// comes back as `NULL`.
    pub fn project(&self, record: Map<String, Value>) -> Map<String, Value> {
        match &self.projection {
            Projection::All => record,
            Projection::Columns(columns) => columns
                .iter()
                .map(|c| (c.clone(), record.get(c).cloned().unwrap_or(Value::Null)))
                .collect(),
        }
    }

    /// Filter, limit and project `records`, in order.
    pub fn apply(&self, records: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
        let limit = self.limit.unwrap_or(usize::MAX);
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .take(limit)
            .map(|r| self.project(r))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Insert(Insert),
    Select(Select),
}

impl Statement {
    /// Target table.
    pub fn table(&self) -> &str {
        match self {
            Statement::Insert(insert) => &insert.table,
            Statement::Select(select) => &select.table,
        }
    }
}
