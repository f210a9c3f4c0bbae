//! Configuration management for the scoring pipeline

use crate::feature_builder::FeatureAdapter;
use crate::models::schema::FeatureField;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file. It must already exist.
    pub path: String,
    /// Table holding the customers to score
    #[serde(default = "default_source_table")]
    pub source_table: String,
    /// Table receiving one score row per customer
    #[serde(default = "default_results_table")]
    pub results_table: String,
    /// How long to wait on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Create the results table when it does not exist yet
    #[serde(default = "default_true")]
    pub create_results_table: bool,
}

fn default_source_table() -> String {
    "nasabah".to_string()
}

fn default_results_table() -> String {
    "hasil_perhitungan_probabilitas".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

/// ML models configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing ONNX model files
    pub models_dir: String,
    /// Key of the variant used for scoring
    #[serde(default = "default_active_model")]
    pub active: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Known model variants, keyed by name
    #[serde(default = "default_variants")]
    pub variants: HashMap<String, ModelVariant>,
}

/// One trained artifact and how to feed it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelVariant {
    /// Artifact file, relative to `models_dir` unless absolute
    pub artifact: String,
    /// Label written next to every score this artifact produces
    pub version: String,
    /// Feature preparation the artifact was trained with
    #[serde(default)]
    pub adapter: FeatureAdapter,
    /// Expected input columns, required for single-input (dense) graphs
    #[serde(default)]
    pub schema: Vec<FeatureField>,
}

fn default_active_model() -> String {
    "lightgbm_smote".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

fn default_variants() -> HashMap<String, ModelVariant> {
    let mut variants = HashMap::new();
    variants.insert(
        "lightgbm_smote".to_string(),
        ModelVariant {
            artifact: "LightGBM_Smote.onnx".to_string(),
            version: "LightGBM_SMOTE_v1".to_string(),
            adapter: FeatureAdapter::Engineered,
            schema: Vec::new(),
        },
    );
    variants.insert(
        "svm_rbf".to_string(),
        ModelVariant {
            artifact: "SVM_RBF_model.onnx".to_string(),
            version: "SVM_RBF".to_string(),
            adapter: FeatureAdapter::Passthrough,
            schema: Vec::new(),
        },
    );
    variants
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Identifier column of the source table
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Seconds between runs in schedule mode
    #[serde(default = "default_schedule_interval")]
    pub schedule_interval_secs: u64,
}

fn default_id_column() -> String {
    "nasabah_id".to_string()
}

fn default_schedule_interval() -> u64 {
    3_600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            schedule_interval_secs: default_schedule_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `LEAD_SCORING__*`
    /// environment variables layered on top
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("LEAD_SCORING").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.active_variant()?;
        Ok(config)
    }

    /// The variant selected by `models.active`
    pub fn active_variant(&self) -> Result<&ModelVariant> {
        self.models.variants.get(&self.models.active).with_context(|| {
            let mut known: Vec<&str> = self.models.variants.keys().map(String::as_str).collect();
            known.sort_unstable();
            format!(
                "Unknown model variant '{}' (known: {})",
                self.models.active,
                known.join(", ")
            )
        })
    }

    /// Full path to the active variant's artifact
    pub fn artifact_path(&self) -> Result<PathBuf> {
        let artifact = Path::new(&self.active_variant()?.artifact);
        if artifact.is_absolute() {
            Ok(artifact.to_path_buf())
        } else {
            Ok(Path::new(&self.models.models_dir).join(artifact))
        }
    }

    /// Switch the active variant, failing on an unknown key
    pub fn select_variant(&mut self, key: &str) -> Result<()> {
        let previous = std::mem::replace(&mut self.models.active, key.to_string());
        if let Err(e) = self.active_variant() {
            self.models.active = previous;
            return Err(e);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "data/leads.db".to_string(),
                source_table: default_source_table(),
                results_table: default_results_table(),
                busy_timeout_ms: default_busy_timeout_ms(),
                create_results_table: true,
            },
            models: ModelsConfig {
                models_dir: "models".to_string(),
                active: default_active_model(),
                onnx_threads: 1,
                variants: default_variants(),
            },
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.source_table, "nasabah");
        assert_eq!(config.database.results_table, "hasil_perhitungan_probabilitas");
        assert_eq!(config.models.variants.len(), 2);

        let variant = config.active_variant().unwrap();
        assert_eq!(variant.version, "LightGBM_SMOTE_v1");
        assert_eq!(variant.adapter, FeatureAdapter::Engineered);
        assert_eq!(
            config.artifact_path().unwrap(),
            Path::new("models").join("LightGBM_Smote.onnx")
        );
    }

    #[test]
    fn test_select_variant() {
        let mut config = AppConfig::default();
        config.select_variant("svm_rbf").unwrap();
        assert_eq!(config.active_variant().unwrap().version, "SVM_RBF");
        assert_eq!(
            config.active_variant().unwrap().adapter,
            FeatureAdapter::Passthrough
        );

        assert!(config.select_variant("xgboost").is_err());
        assert_eq!(config.models.active, "svm_rbf");
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[database]
path = "/var/lib/leads/leads.db"

[models]
models_dir = "/opt/models"
active = "dense_lr"

[models.variants.dense_lr]
artifact = "lr.onnx"
version = "LR_v2"
adapter = "passthrough"
schema = [
    {{ name = "age", kind = "numeric" }},
    {{ name = "balance", kind = "numeric" }},
]
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.pipeline.id_column, "nasabah_id");

        let variant = config.active_variant().unwrap();
        assert_eq!(variant.version, "LR_v2");
        assert_eq!(variant.schema.len(), 2);
        assert_eq!(config.artifact_path().unwrap(), Path::new("/opt/models/lr.onnx"));
    }

    #[test]
    fn test_unknown_active_variant_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[database]\npath = \"leads.db\"\n\n[models]\nmodels_dir = \"models\"\nactive = \"xgboost\"\n",
        )
        .unwrap();

        let err = AppConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("xgboost"));
    }
}
