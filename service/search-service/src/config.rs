//! Service configuration.
//!
//! Loaded once at startup from a TOML file and immutable afterwards. The
//! defaults describe the sample rental-marketplace deployment so a fresh
//! checkout can run against seeded data without writing any config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use embedding_provider::config::default_onnx_config;
use embedding_provider::{Embedder, HashEmbedder, OnnxConfig, OnnxEmbedder};
use record_model::{
    FilterDataType, FilterDescriptor, FilterKind, SchemaRegistry, TableSchema,
};
use serde::Deserialize;

use crate::error::{Result, ServiceError};

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/search.db")
}

fn default_indexes_dir() -> PathBuf {
    PathBuf::from("indexes")
}

fn default_request_timeout() -> u64 {
    30
}

fn default_dimension() -> usize {
    384
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_indexes_dir")]
    pub indexes_dir: PathBuf,
    /// Per-request deadline in seconds, enforced at the HTTP edge.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default = "ServiceConfig::sample_tables")]
    pub tables: Vec<TableSchema>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database_path: default_database_path(),
            indexes_dir: default_indexes_dir(),
            request_timeout_secs: default_request_timeout(),
            embedder: EmbedderConfig::default(),
            tables: Self::sample_tables(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Configuration(format!("cannot read `{}`: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            ServiceError::Configuration(format!("cannot parse `{}`: {e}", path.display()))
        })
    }

    /// Validates the declared tables and builds the immutable registry.
    pub fn schema_registry(&self) -> Result<SchemaRegistry> {
        Ok(SchemaRegistry::new(self.tables.clone())?)
    }

    /// The sample deployment: a lexical-only `users` table and a hybrid
    /// `items` table with the full filter surface.
    pub fn sample_tables() -> Vec<TableSchema> {
        vec![
            TableSchema {
                name: "users".into(),
                text_columns: vec!["nome".into()],
                hybrid: false,
                filters: vec![
                    FilterDescriptor::new("tipo_usuario", FilterKind::In, FilterDataType::Enum),
                    FilterDescriptor::new("data_criacao", FilterKind::Range, FilterDataType::Date),
                    FilterDescriptor::new("status", FilterKind::In, FilterDataType::Enum)
                        .with_enum_values(vec!["ativo".into(), "inativo".into()]),
                ],
                latitude_column: None,
                longitude_column: None,
            },
            TableSchema {
                name: "items".into(),
                text_columns: vec!["titulo".into(), "descricao".into(), "condicoes_uso".into()],
                hybrid: true,
                filters: vec![
                    FilterDescriptor::new("categoria_id", FilterKind::Exact, FilterDataType::Int),
                    FilterDescriptor::new("categoria", FilterKind::In, FilterDataType::String),
                    FilterDescriptor::new("status", FilterKind::In, FilterDataType::Enum)
                        .with_enum_values(vec![
                            "disponivel".into(),
                            "alugado".into(),
                            "manutencao".into(),
                        ]),
                    FilterDescriptor::new("localizacao", FilterKind::Distance, FilterDataType::Geo),
                    FilterDescriptor::new(
                        "preco_diario",
                        FilterKind::Range,
                        FilterDataType::Decimal,
                    ),
                    FilterDescriptor::new("usuario_id", FilterKind::Exact, FilterDataType::Int),
                    FilterDescriptor::new("data_criacao", FilterKind::Range, FilterDataType::Date),
                ],
                latitude_column: Some("items_lat".into()),
                longitude_column: Some("items_lon".into()),
            },
        ]
    }
}

/// Which embedding provider to run. The hash provider needs no model
/// assets and keeps local runs and tests deterministic.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbedderConfig {
    Onnx {
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        runtime_library_path: PathBuf,
        #[serde(default = "default_dimension")]
        dimension: usize,
        #[serde(default = "EmbedderConfig::default_max_input_length")]
        max_input_length: usize,
        #[serde(default = "EmbedderConfig::default_model_id")]
        model_id: String,
    },
    Hash {
        #[serde(default = "default_dimension")]
        dimension: usize,
        #[serde(default = "EmbedderConfig::default_hash_id")]
        model_id: String,
    },
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        EmbedderConfig::Hash {
            dimension: default_dimension(),
            model_id: Self::default_hash_id(),
        }
    }
}

impl EmbedderConfig {
    fn default_max_input_length() -> usize {
        512
    }

    fn default_model_id() -> String {
        default_onnx_config().model_id
    }

    fn default_hash_id() -> String {
        "hash-dev".to_string()
    }

    /// Builds the embedder. Failure here is fatal at startup.
    pub fn build(&self) -> Result<Arc<dyn Embedder>> {
        match self {
            EmbedderConfig::Onnx {
                model_path,
                tokenizer_path,
                runtime_library_path,
                dimension,
                max_input_length,
                model_id,
            } => {
                let config = OnnxConfig {
                    model_path: model_path.clone(),
                    tokenizer_path: tokenizer_path.clone(),
                    runtime_library_path: runtime_library_path.clone(),
                    dimension: *dimension,
                    max_input_length: *max_input_length,
                    model_id: model_id.clone(),
                };
                Ok(Arc::new(OnnxEmbedder::new(config)?))
            }
            EmbedderConfig::Hash {
                dimension,
                model_id,
            } => Ok(Arc::new(HashEmbedder::new(*dimension, model_id.clone())?)),
        }
    }
}
