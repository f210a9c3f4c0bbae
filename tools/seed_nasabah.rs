//! Customer Seeder
//!
//! Creates the `nasabah` table if needed and fills it with synthetic
//! customers so the scoring pipeline can be tried locally.

use anyhow::Context;
use lead_scoring_pipeline::source::{create_table_sql, SOURCE_COLUMNS};
use lead_scoring_pipeline::store::quote_ident;
use rand::Rng;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::info;

/// Synthetic customer generator
struct CustomerGenerator {
    rng: rand::rngs::ThreadRng,
    next_id: i64,
}

impl CustomerGenerator {
    fn new(next_id: i64) -> Self {
        Self {
            rng: rand::thread_rng(),
            next_id,
        }
    }

    /// One row in `SOURCE_COLUMNS` order
    fn generate(&mut self, never_contacted: bool) -> Vec<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let pdays = if never_contacted {
            999
        } else {
            self.rng.gen_range(0..30)
        };
        let previous = if never_contacted {
            0
        } else {
            self.rng.gen_range(1..6)
        };
        let poutcome = if never_contacted {
            "nonexistent"
        } else {
            self.random_choice(&["failure", "success"])
        };

        SOURCE_COLUMNS
            .iter()
            .map(|&column| match column {
                "nasabah_id" => Value::Integer(id),
                "user_id" => Value::Integer(self.rng.gen_range(1..50)),
                "name" => Value::Text(format!("Nasabah {:05}", id)),
                "age" => Value::Integer(self.rng.gen_range(18..90)),
                "job" => self.text(&[
                    "admin.",
                    "blue-collar",
                    "entrepreneur",
                    "management",
                    "retired",
                    "services",
                    "student",
                    "technician",
                ]),
                "marital" => self.text(&["married", "single", "divorced"]),
                "education" => self.text(&[
                    "basic.9y",
                    "high.school",
                    "professional.course",
                    "university.degree",
                ]),
                "balance" => Value::Integer(self.rng.gen_range(-500..20_000)),
                "phone" => Value::Text(format!("08{:010}", self.rng.gen_range(0..10_000_000_000u64))),
                "email" => Value::Text(format!("nasabah{}@example.com", id)),
                "housing" => self.text(&["yes", "no"]),
                "loan" => self.text(&["yes", "no"]),
                "status" => self.text(&["baru", "dihubungi", "tertarik"]),
                "notes" => Value::Null,
                "contacted_at" => Value::Null,
                "default" => self.text(&["no", "unknown"]),
                "contact" => self.text(&["cellular", "telephone"]),
                "month" => self.text(&["mar", "apr", "may", "jun", "jul", "aug", "nov"]),
                "day_of_week" => self.text(&["mon", "tue", "wed", "thu", "fri"]),
                "duration" => Value::Integer(self.rng.gen_range(0..900)),
                "campaign" => Value::Integer(self.rng.gen_range(1..8)),
                "pdays" => Value::Integer(pdays),
                "previous" => Value::Integer(previous),
                "poutcome" => Value::Text(poutcome.to_string()),
                "emp.var.rate" => self.real(&[-3.4, -1.8, -0.1, 1.1, 1.4]),
                "cons.price.idx" => self.real(&[92.893, 93.2, 93.994, 94.465]),
                "cons.conf.idx" => self.real(&[-46.2, -42.0, -36.4, -41.8]),
                "euribor3m" => Value::Real(self.rng.gen_range(0.6..5.0)),
                "nr.employed" => self.real(&[4963.6, 5099.1, 5191.0, 5228.1]),
                _ => Value::Null,
            })
            .collect()
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    fn text(&mut self, choices: &[&str]) -> Value {
        Value::Text(self.random_choice(choices).to_string())
    }

    fn real(&mut self, choices: &[f64]) -> Value {
        Value::Real(choices[self.rng.gen_range(0..choices.len())])
    }
}

/// Share of never-contacted customers, clamped to `[0, 1]`. Defaults to 0.8.
fn parse_rate(arg: Option<&str>) -> f64 {
    arg.and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.8)
        .clamp(0.0, 1.0)
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seed_nasabah=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let db_path = args.get(1).map(|s| s.as_str()).unwrap_or("data/leads.db");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let never_contacted_rate = parse_rate(args.get(3).map(|s| s.as_str()));

    info!(
        db_path = %db_path,
        count = count,
        never_contacted_rate = never_contacted_rate,
        "Configuration loaded"
    );

    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let mut conn =
        Connection::open(db_path).with_context(|| format!("Failed to open {}", db_path))?;
    conn.execute_batch(&create_table_sql("nasabah"))
        .context("Failed to create nasabah table")?;

    let next_id: i64 = conn.query_row(
        "SELECT COALESCE(MAX(nasabah_id), 0) + 1 FROM nasabah",
        [],
        |row| row.get(0),
    )?;

    let columns = SOURCE_COLUMNS
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=SOURCE_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("INSERT INTO nasabah ({}) VALUES ({})", columns, placeholders);

    let mut generator = CustomerGenerator::new(next_id);
    let mut rng = rand::thread_rng();
    let mut never_contacted = 0;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(&sql)?;
        for i in 0..count {
            let fresh = rng.gen_bool(never_contacted_rate);
            if fresh {
                never_contacted += 1;
            }
            stmt.execute(params_from_iter(generator.generate(fresh)))?;

            if (i + 1) % 100 == 0 {
                info!("Inserted {}/{} customers", i + 1, count);
            }
        }
    }
    tx.commit()?;

    info!(
        "Completed! Inserted {} customers starting at id {} ({} never contacted)",
        count, next_id, never_contacted
    );

    Ok(())
}
