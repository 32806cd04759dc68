use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no schema configured for table `{0}`")]
    TableNotFound(String),
    #[error("record {id} not found in table `{table}`")]
    RecordNotFound { table: String, id: i64 },
    #[error("store error: {0}")]
    Store(#[from] record_store::StoreError),
    #[error("embedding error: {0}")]
    Embedding(#[from] embedding_provider::EmbeddingError),
    #[error("schema error: {0}")]
    Schema(#[from] record_model::SchemaError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
