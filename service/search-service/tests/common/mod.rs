#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use embedding_provider::{Embedder, EmbedderInfo, EmbeddingError, ProviderKind};
use record_model::{
    FilterDataType, FilterDescriptor, FilterKind, SchemaRegistry, TableSchema,
};
use record_store::SqliteStore;
use search_service::IndexRegistry;
use tempfile::TempDir;

/// Embedder with hand-placed vectors so nearest-neighbor outcomes are
/// fully predictable: camera rows sit on the query for "camera", the
/// drill sits far from everything, fillers cluster in between.
pub struct StubEmbedder {
    info: EmbedderInfo,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            info: EmbedderInfo {
                provider: ProviderKind::Hash,
                model_id: "stub-test".into(),
                dimension: 4,
            },
        }
    }
}

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let t = text.to_lowercase();
        let v = if t.contains("camera") {
            [0.0, 0.0, 0.0, 1.0]
        } else if t.contains("furadeira") {
            [10.0, 10.0, 10.0, 10.0]
        } else if t.contains("projetor") {
            [0.0, 5.0, 0.0, 0.0]
        } else {
            [3.0, 3.0, 3.0, 3.0]
        };
        Ok(v.to_vec())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

pub fn items_schema() -> TableSchema {
    TableSchema {
        name: "items".into(),
        text_columns: vec!["titulo".into(), "descricao".into()],
        hybrid: true,
        filters: vec![
            FilterDescriptor::new("status", FilterKind::In, FilterDataType::Enum)
                .with_enum_values(vec!["ativo".into(), "inativo".into()]),
            FilterDescriptor::new("preco_diario", FilterKind::Range, FilterDataType::Decimal),
            FilterDescriptor::new("localizacao", FilterKind::Distance, FilterDataType::Geo),
        ],
        latitude_column: Some("items_lat".into()),
        longitude_column: Some("items_lon".into()),
    }
}

pub fn users_schema() -> TableSchema {
    TableSchema {
        name: "users".into(),
        text_columns: vec!["nome".into()],
        hybrid: false,
        filters: vec![
            FilterDescriptor::new("status", FilterKind::In, FilterDataType::Enum)
                .with_enum_values(vec!["ativo".into(), "inativo".into()]),
        ],
        latitude_column: None,
        longitude_column: None,
    }
}

pub fn seed_store(db_path: &Path) -> SqliteStore {
    let store = SqliteStore::open(db_path).unwrap();
    store
        .execute_batch(
            "CREATE TABLE items (
                id INTEGER PRIMARY KEY,
                titulo TEXT,
                descricao TEXT,
                status TEXT,
                preco_diario REAL,
                items_lat REAL,
                items_lon REAL,
                embedding BLOB,
                created_at TEXT,
                updated_at TEXT,
                last_embedding_generated_at TEXT
            );
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                nome TEXT,
                status TEXT
            );",
        )
        .unwrap();
    store
        .ensure_fts("items", &["titulo".into(), "descricao".into()])
        .unwrap();
    store.ensure_fts("users", &["nome".into()]).unwrap();
    store
        .execute_batch(
            "INSERT INTO items
                (id, titulo, descricao, status, preco_diario, items_lat, items_lon,
                 embedding, created_at, updated_at, last_embedding_generated_at)
             VALUES
                (1, 'Camera DSLR', 'otima para fotos com zoom', 'ativo', 30.0, 40.1, -74.1,
                 x'0011', '2024-01-01 08:00:00', '2024-01-02 08:00:00', '2024-01-02 08:00:00'),
                (2, 'Camera Mirrorless', 'compacta para photo', 'inativo', 30.0, 41.0, -75.0,
                 NULL, '2024-01-03 08:00:00', NULL, NULL),
                (3, 'Barraca Familiar', 'resistente para acampamento', 'ativo', 100.0, NULL, NULL,
                 NULL, NULL, NULL, NULL),
                (4, 'Mochila de Trilha', 'espacosa com 60 litros', 'ativo', 60.0, NULL, NULL,
                 NULL, NULL, NULL, NULL),
                (5, 'Violao Classico', 'cordas de nylon suaves', 'ativo', 75.0, NULL, NULL,
                 NULL, NULL, NULL, NULL),
                (6, 'Alto Falante Portatil', 'som de alta fidelidade', 'ativo', 80.0, NULL, NULL,
                 NULL, NULL, NULL, NULL),
                (7, 'Bicicleta Urbana', 'leve para passeios', 'ativo', 90.0, NULL, NULL,
                 NULL, NULL, NULL, NULL),
                (8, 'Furadeira de Impacto', 'potente para trabalho pesado', 'ativo', 100.0, NULL, NULL,
                 NULL, NULL, NULL, NULL);
            INSERT INTO users (id, nome, status) VALUES
                (1, 'Ana Silva', 'ativo'),
                (2, 'Bruno Costa', 'inativo');",
        )
        .unwrap();
    store
}

pub struct TestService {
    pub dir: TempDir,
    pub store: SqliteStore,
    pub registry: Arc<IndexRegistry>,
}

impl TestService {
    pub fn db_path(&self) -> std::path::PathBuf {
        self.dir.path().join("search.db")
    }
}

pub fn start_service() -> TestService {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("search.db");
    let store = seed_store(&db_path);

    let schemas = SchemaRegistry::new(vec![users_schema(), items_schema()]).unwrap();
    let registry = Arc::new(IndexRegistry::new(
        schemas,
        dir.path().join("indexes"),
        Arc::new(StubEmbedder::new()),
    ));
    registry.initialize(&store).unwrap();

    TestService {
        dir,
        store,
        registry,
    }
}

pub fn result_ids(rows: &[record_model::Row]) -> Vec<i64> {
    rows.iter()
        .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
        .collect()
}
