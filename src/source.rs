//! Full-table reads of the customers to score

use crate::error::{PipelineError, Result};
use crate::store::quote_ident;
use crate::types::record::{Frame, Value};
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::{debug, info};

/// Columns read from the source table, in the order they are selected.
pub const SOURCE_COLUMNS: [&str; 29] = [
    "nasabah_id",
    "user_id",
    "name",
    "age",
    "job",
    "marital",
    "education",
    "balance",
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
    "duration",
    "campaign",
    "pdays",
    "previous",
    "poutcome",
    "emp.var.rate",
    "cons.price.idx",
    "cons.conf.idx",
    "euribor3m",
    "nr.employed",
];

/// SQLite column types of [`SOURCE_COLUMNS`], used when creating the table.
const SOURCE_COLUMN_TYPES: [&str; 29] = [
    "INTEGER PRIMARY KEY",
    "INTEGER",
    "TEXT",
    "INTEGER",
    "TEXT",
    "TEXT",
    "TEXT",
    "INTEGER",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "INTEGER",
    "INTEGER",
    "INTEGER",
    "INTEGER",
    "TEXT",
    "REAL",
    "REAL",
    "REAL",
    "REAL",
    "REAL",
];

/// `CREATE TABLE IF NOT EXISTS` statement for a customer table.
pub fn create_table_sql(table: &str) -> String {
    let columns = SOURCE_COLUMNS
        .iter()
        .zip(SOURCE_COLUMN_TYPES)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty))
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(table),
        columns
    )
}

/// Reads every row of the source table with a fixed column list.
pub struct RecordSource {
    table: String,
    columns: Vec<String>,
}

impl RecordSource {
    /// Source over `table` with the standard customer columns.
    pub fn new(table: &str) -> Self {
        Self::with_columns(table, &SOURCE_COLUMNS)
    }

    pub fn with_columns<S: AsRef<str>>(table: &str, columns: &[S]) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fetch the full current row set. No filtering and no pagination.
    pub fn fetch(&self, conn: &Connection) -> Result<Frame> {
        self.check_schema(conn)?;

        let select = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", select, quote_ident(&self.table));

        let read_error = |source| PipelineError::Connectivity {
            context: format!("read {}", self.table),
            source,
        };

        let mut stmt = conn.prepare(&sql).map_err(read_error)?;
        let mut rows = stmt.query([]).map_err(read_error)?;
        let mut frame = Frame::with_columns(&self.columns);

        while let Some(row) = rows.next().map_err(read_error)? {
            let mut values = Vec::with_capacity(self.columns.len());
            for idx in 0..self.columns.len() {
                values.push(Value::from_sql(row.get_ref(idx).map_err(read_error)?));
            }
            frame.push_row(values);
        }

        info!(table = %self.table, rows = frame.len(), "Fetched source rows");
        Ok(frame)
    }

    /// Fail with a schema error when expected columns are absent.
    fn check_schema(&self, conn: &Connection) -> Result<()> {
        let present = table_columns(conn, &self.table).map_err(|source| {
            PipelineError::Connectivity {
                context: format!("inspect {}", self.table),
                source,
            }
        })?;

        let missing: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !present.contains(c.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(PipelineError::Schema {
                table: self.table.clone(),
                missing,
            });
        }

        debug!(table = %self.table, columns = present.len(), "Source schema verified");
        Ok(())
    }
}

/// Column names of `table`; empty when the table does not exist.
fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt.query_map([table], |row| row.get::<_, String>(0))?;
    names.collect()
}
