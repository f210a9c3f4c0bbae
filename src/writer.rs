//! Transactional upsert of score batches

use crate::error::{PipelineError, Result};
use crate::store::quote_ident;
use crate::types::score::ScoreRecord;
use chrono::SecondsFormat;
use rusqlite::{params, Connection};
use tracing::{debug, info};

/// Writes score batches into the results table, one row per customer.
pub struct ResultWriter {
    table: String,
}

impl ResultWriter {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the results table when it does not exist yet.
    pub fn ensure_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                nasabah_id PRIMARY KEY,
                predicted_score REAL NOT NULL,
                calculation_date TEXT NOT NULL,
                model_version TEXT NOT NULL
            )",
            quote_ident(&self.table)
        );
        conn.execute_batch(&sql).map_err(|source| self.persistence(source))?;
        debug!(table = %self.table, "Results table ensured");
        Ok(())
    }

    /// Upsert the whole batch in one transaction.
    ///
    /// Either every record is committed or none is: the transaction rolls
    /// back when it is dropped on an error path.
    pub fn write(&self, conn: &mut Connection, records: &[ScoreRecord]) -> Result<usize> {
        let tx = conn.transaction().map_err(|source| self.persistence(source))?;

        {
            let sql = format!(
                "INSERT INTO {} (nasabah_id, predicted_score, calculation_date, model_version)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(nasabah_id) DO UPDATE SET
                    predicted_score = excluded.predicted_score,
                    calculation_date = excluded.calculation_date,
                    model_version = excluded.model_version",
                quote_ident(&self.table)
            );
            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(|source| self.persistence(source))?;

            for record in records {
                stmt.execute(params![
                    record.entity_id,
                    record.predicted_score,
                    record
                        .calculated_at
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                    record.model_version,
                ])
                .map_err(|source| self.persistence(source))?;
            }
        }

        tx.commit().map_err(|source| self.persistence(source))?;

        info!(table = %self.table, records = records.len(), "Score batch committed");
        Ok(records.len())
    }

    fn persistence(&self, source: rusqlite::Error) -> PipelineError {
        PipelineError::Persistence {
            table: self.table.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::EntityId;
    use chrono::{DateTime, Duration, Utc};

    fn records(scores: &[(i64, f64)], at: DateTime<Utc>, version: &str) -> Vec<ScoreRecord> {
        scores
            .iter()
            .map(|(id, score)| ScoreRecord {
                entity_id: EntityId::Int(*id),
                predicted_score: *score,
                calculated_at: at,
                model_version: version.to_string(),
            })
            .collect()
    }

    fn stored(conn: &Connection) -> Vec<(i64, f64, String, String)> {
        let mut stmt = conn
            .prepare(
                "SELECT nasabah_id, predicted_score, calculation_date, model_version
                 FROM hasil_perhitungan_probabilitas ORDER BY nasabah_id",
            )
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_write_inserts_batch() {
        let mut conn = Connection::open_in_memory().unwrap();
        let writer = ResultWriter::new("hasil_perhitungan_probabilitas");
        writer.ensure_table(&conn).unwrap();

        let at = Utc::now();
        let written = writer
            .write(&mut conn, &records(&[(1, 0.2), (2, 0.9)], at, "LightGBM_SMOTE_v1"))
            .unwrap();

        assert_eq!(written, 2);
        let rows = stored(&conn);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].1, 0.9);
        assert_eq!(rows[0].3, "LightGBM_SMOTE_v1");

        let parsed = DateTime::parse_from_rfc3339(&rows[0].2).unwrap();
        assert_eq!(parsed.with_timezone(&Utc).timestamp_micros(), at.timestamp_micros());
    }

    #[test]
    fn test_rewrite_overwrites_instead_of_duplicating() {
        let mut conn = Connection::open_in_memory().unwrap();
        let writer = ResultWriter::new("hasil_perhitungan_probabilitas");
        writer.ensure_table(&conn).unwrap();

        let first = Utc::now();
        writer
            .write(&mut conn, &records(&[(1, 0.2), (2, 0.9)], first, "SVM_RBF"))
            .unwrap();

        let second = first + Duration::hours(1);
        writer
            .write(&mut conn, &records(&[(1, 0.4), (2, 0.7)], second, "LightGBM_SMOTE_v1"))
            .unwrap();

        let rows = stored(&conn);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, 0.4);
        assert_eq!(rows[1].1, 0.7);
        let rewritten = second.to_rfc3339_opts(SecondsFormat::Micros, true);
        assert!(rows.iter().all(|r| r.2 == rewritten));
        assert!(rows.iter().all(|r| r.3 == "LightGBM_SMOTE_v1"));
    }

    #[test]
    fn test_text_identifiers_are_supported() {
        let mut conn = Connection::open_in_memory().unwrap();
        let writer = ResultWriter::new("hasil_perhitungan_probabilitas");
        writer.ensure_table(&conn).unwrap();

        let record = ScoreRecord {
            entity_id: EntityId::Text("N-001".to_string()),
            predicted_score: 0.5,
            calculated_at: Utc::now(),
            model_version: "SVM_RBF".to_string(),
        };
        writer.write(&mut conn, &[record]).unwrap();

        let id: String = conn
            .query_row("SELECT nasabah_id FROM hasil_perhitungan_probabilitas", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, "N-001");
    }

    #[test]
    fn test_failed_batch_persists_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        let writer = ResultWriter::new("hasil_perhitungan_probabilitas");
        writer.ensure_table(&conn).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_three BEFORE INSERT ON hasil_perhitungan_probabilitas
             WHEN NEW.nasabah_id = 3
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let err = writer
            .write(&mut conn, &records(&[(1, 0.1), (2, 0.2), (3, 0.3)], Utc::now(), "v"))
            .unwrap_err();

        assert_eq!(err.kind(), "persistence");
        assert!(stored(&conn).is_empty());
    }

    #[test]
    fn test_missing_table_is_a_persistence_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        let writer = ResultWriter::new("hasil_perhitungan_probabilitas");

        let err = writer
            .write(&mut conn, &records(&[(1, 0.1)], Utc::now(), "v"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence { .. }));
    }
}
