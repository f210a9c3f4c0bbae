//! Fixtures shared by unit tests

use crate::error::Result;
use crate::feature_builder::{FeatureAdapter, FeatureBuilder};
use crate::models::inference::Scorer;
use crate::models::schema::{FeatureField, FeatureKind, FeatureSchema};
use crate::source::{create_table_sql, SOURCE_COLUMNS};
use crate::store::{quote_ident, Store};
use crate::types::record::{Frame, Value};
use rusqlite::{params_from_iter, Connection};
use tempfile::TempDir;

const CATEGORICAL_COLUMNS: [&str; 16] = [
    "name",
    "job",
    "marital",
    "education",
    "phone",
    "email",
    "housing",
    "loan",
    "status",
    "notes",
    "contacted_at",
    "default",
    "contact",
    "month",
    "day_of_week",
    "poutcome",
];

pub fn create_source_table(conn: &Connection, table: &str) {
    conn.execute_batch(&create_table_sql(table)).unwrap();
}

/// A customer row with realistic defaults.
#[derive(Debug, Clone)]
pub struct Customer {
    pub id: i64,
    pub age: Option<i64>,
    pub pdays: Option<i64>,
    pub job: &'static str,
}

impl Customer {
    pub fn new(id: i64, age: Option<i64>, pdays: Option<i64>) -> Self {
        Self {
            id,
            age,
            pdays,
            job: "admin.",
        }
    }

    fn values(&self) -> Vec<Value> {
        SOURCE_COLUMNS
            .iter()
            .map(|&column| match column {
                "nasabah_id" => Value::Int(self.id),
                "user_id" => Value::Int(self.id * 10),
                "name" => Value::Text(format!("Nasabah {}", self.id)),
                "age" => self.age.into(),
                "job" => Value::from(self.job),
                "marital" => Value::from("married"),
                "education" => Value::from("university.degree"),
                "balance" => Value::Int(1200),
                "phone" => Value::from("081234567890"),
                "email" => Value::Text(format!("nasabah{}@example.com", self.id)),
                "housing" => Value::from("yes"),
                "loan" => Value::from("no"),
                "status" => Value::from("baru"),
                "notes" => Value::Null,
                "contacted_at" => Value::Null,
                "default" => Value::from("no"),
                "contact" => Value::from("cellular"),
                "month" => Value::from("may"),
                "day_of_week" => Value::from("mon"),
                "duration" => Value::Int(180),
                "campaign" => Value::Int(1),
                "pdays" => self.pdays.into(),
                "previous" => Value::Int(0),
                "poutcome" => Value::from("nonexistent"),
                "emp.var.rate" => Value::Float(1.1),
                "cons.price.idx" => Value::Float(93.994),
                "cons.conf.idx" => Value::Float(-36.4),
                "euribor3m" => Value::Float(4.857),
                "nr.employed" => Value::Float(5191.0),
                _ => Value::Null,
            })
            .collect()
    }
}

pub fn insert_customer(conn: &Connection, table: &str, customer: &Customer) {
    let columns = SOURCE_COLUMNS
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=SOURCE_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns,
        placeholders
    );

    let values = customer.values().into_iter().map(|value| match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Int(i) => rusqlite::types::Value::Integer(i),
        Value::Float(f) => rusqlite::types::Value::Real(f),
        Value::Text(s) => rusqlite::types::Value::Text(s),
    });
    conn.execute(&sql, params_from_iter(values)).unwrap();
}

/// A file-backed store holding an empty `nasabah` table.
pub fn temp_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("leads.db");
    let conn = Connection::open(&path).unwrap();
    create_source_table(&conn, "nasabah");
    (dir, Store::new(path))
}

/// Schema of the feature table `adapter` produces from the customer table.
pub fn feature_schema(adapter: FeatureAdapter) -> FeatureSchema {
    let builder = FeatureBuilder::new(adapter);
    let excluded = builder.excluded_columns();

    let mut fields: Vec<FeatureField> = SOURCE_COLUMNS
        .iter()
        .filter(|c| !excluded.contains(*c))
        .map(|&c| {
            let kind = if CATEGORICAL_COLUMNS.contains(&c) {
                FeatureKind::Categorical
            } else {
                FeatureKind::Numeric
            };
            FeatureField::new(c, kind)
        })
        .collect();
    fields.extend(
        builder
            .derived_columns()
            .iter()
            .map(|&c| FeatureField::new(c, FeatureKind::Numeric)),
    );
    FeatureSchema::new(fields)
}

/// Scorer returning canned probabilities regardless of input.
pub struct FixedScorer {
    scores: Vec<f64>,
    schema: FeatureSchema,
}

impl FixedScorer {
    pub fn new(scores: Vec<f64>) -> Self {
        Self::with_schema(scores, feature_schema(FeatureAdapter::Engineered))
    }

    pub fn with_schema(scores: Vec<f64>, schema: FeatureSchema) -> Self {
        Self { scores, schema }
    }
}

impl Scorer for FixedScorer {
    fn name(&self) -> &str {
        "fixed"
    }

    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict_proba(&self, _features: &Frame) -> Result<Vec<f64>> {
        Ok(self.scores.clone())
    }
}
