use std::path::{Path, PathBuf};
use std::sync::Arc;

use record_store::SqliteStore;
use search_service::hybrid;
use search_service::{IndexRegistry, ServiceConfig};

fn print_usage() {
    eprintln!(
        "Usage:\n\
         search-cli seed [db_path]\n\
         search-cli search [db_path] --table T --query Q [--top N] [--filters F] [--indexes DIR]\n\
         search-cli reindex [db_path] [--table T] [--indexes DIR]\n\
         \n\
         Notes: db_path defaults to data/search.db; indexes defaults to indexes/.\n\
         The CLI runs the hash embedder, so no model assets are required.\n"
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        std::process::exit(2);
    }
    let command = args.remove(0);
    let result = match command.as_str() {
        "seed" => do_seed(args),
        "search" => do_search(args),
        "reindex" => do_reindex(args),
        _ => {
            print_usage();
            Err(format!("unknown command `{command}`"))
        }
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn split_db_path(mut tail: Vec<String>) -> (PathBuf, Vec<String>) {
    if !tail.is_empty() && !tail[0].starts_with('-') {
        let path = PathBuf::from(tail.remove(0));
        (path, tail)
    } else {
        (PathBuf::from("data/search.db"), tail)
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn build_registry(indexes_dir: PathBuf) -> Result<IndexRegistry, String> {
    let config = ServiceConfig::default();
    let schemas = config
        .schema_registry()
        .map_err(|e| format!("schema validation failed: {e}"))?;
    let embedder = config
        .embedder
        .build()
        .map_err(|e| format!("embedder init failed: {e}"))?;
    Ok(IndexRegistry::new(schemas, indexes_dir, embedder))
}

/// Creates the sample tables and seeds deterministic marketplace rows so a
/// fresh checkout can exercise search end-to-end.
fn do_seed(tail: Vec<String>) -> Result<(), String> {
    let (db_path, _rest) = split_db_path(tail);
    ensure_parent_dir(&db_path).map_err(|e| e.to_string())?;

    let store = SqliteStore::open(&db_path).map_err(|e| e.to_string())?;
    store
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                titulo TEXT,
                descricao TEXT,
                categoria_id INTEGER,
                categoria TEXT,
                status TEXT,
                preco_diario REAL,
                condicoes_uso TEXT,
                usuario_id INTEGER,
                items_lat REAL,
                items_lon REAL,
                data_criacao TEXT,
                created_at TEXT,
                updated_at TEXT
            );
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                nome TEXT,
                email TEXT,
                tipo_usuario TEXT,
                status TEXT,
                data_criacao TEXT
            );",
        )
        .map_err(|e| e.to_string())?;

    let schemas = ServiceConfig::sample_tables();
    for schema in &schemas {
        store
            .ensure_fts(&schema.name, &schema.text_columns)
            .map_err(|e| e.to_string())?;
    }

    for (id, row) in sample_items().into_iter().enumerate() {
        let mut json = record_model::Row::new();
        json.insert("id".into(), serde_json::json!(id as i64 + 1));
        for (key, value) in row {
            json.insert(key.to_string(), value);
        }
        store.upsert_row("items", &json).map_err(|e| e.to_string())?;
    }
    for (id, (nome, email, tipo, status)) in sample_users().into_iter().enumerate() {
        let mut json = record_model::Row::new();
        json.insert("id".into(), serde_json::json!(id as i64 + 1));
        json.insert("nome".into(), serde_json::json!(nome));
        json.insert("email".into(), serde_json::json!(email));
        json.insert("tipo_usuario".into(), serde_json::json!(tipo));
        json.insert("status".into(), serde_json::json!(status));
        json.insert("data_criacao".into(), serde_json::json!("2024-01-01 09:00:00"));
        store.upsert_row("users", &json).map_err(|e| e.to_string())?;
    }

    println!("seeded {} at {}", "items + users", db_path.display());
    Ok(())
}

fn do_search(tail: Vec<String>) -> Result<(), String> {
    let (db_path, rest) = split_db_path(tail);
    let table = flag_value(&rest, "--table").ok_or("--table is required")?;
    let query = flag_value(&rest, "--query").unwrap_or_default();
    let top: usize = flag_value(&rest, "--top")
        .map(|v| v.parse().map_err(|_| "--top must be a number"))
        .transpose()?
        .unwrap_or(10);
    let filters = flag_value(&rest, "--filters").unwrap_or_default();
    let indexes_dir = flag_value(&rest, "--indexes")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("indexes"));

    let store = SqliteStore::open_existing(&db_path)
        .map_err(|e| format!("cannot open {}: {e}", db_path.display()))?;
    let registry = build_registry(indexes_dir)?;
    registry
        .initialize(&store)
        .map_err(|e| format!("index init failed: {e}"))?;

    let rows = hybrid::search(&registry, &store, &table, &query, top, &filters)
        .map_err(|e| format!("search failed: {e}"))?;
    println!("{} result(s)", rows.len());
    for row in rows {
        println!("{}", serde_json::Value::Object(row));
    }
    Ok(())
}

fn do_reindex(tail: Vec<String>) -> Result<(), String> {
    let (db_path, rest) = split_db_path(tail);
    let table = flag_value(&rest, "--table");
    let indexes_dir = flag_value(&rest, "--indexes")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("indexes"));

    let store = SqliteStore::open_existing(&db_path)
        .map_err(|e| format!("cannot open {}: {e}", db_path.display()))?;
    let registry = build_registry(indexes_dir)?;
    registry
        .initialize(&store)
        .map_err(|e| format!("index init failed: {e}"))?;

    match table {
        Some(table) => {
            registry
                .rebuild(&store, &table)
                .map_err(|e| format!("reindex failed: {e}"))?;
            println!("{table} reindexed");
        }
        None => {
            registry
                .rebuild_all(&store)
                .map_err(|e| format!("reindex failed: {e}"))?;
            println!("all tables reindexed");
        }
    }
    Ok(())
}

type SampleRow = Vec<(&'static str, serde_json::Value)>;

fn sample_items() -> Vec<SampleRow> {
    use serde_json::json;
    let rows: [(&str, &str, i64, &str, &str, f64, f64, f64); 8] = [
        ("Camera Fotografica DSLR", "excelente para fotos de alta qualidade, acompanha lente 18-55mm", 1, "Eletronicos", "disponivel", 45.0, -23.5505, -46.6333),
        ("Furadeira de Impacto", "potente e versatil para diversos tipos de trabalho", 2, "Ferramentas", "disponivel", 30.0, -23.5520, -46.6400),
        ("Barraca de Camping Familiar", "espacosa, ideal para 4 pessoas, resistente a agua", 3, "Esportes e Lazer", "alugado", 35.0, -23.6000, -46.7000),
        ("Caixa de Som Portatil", "som de alta fidelidade, conexao bluetooth", 1, "Audio e Video", "disponivel", 20.0, -23.5400, -46.6200),
        ("Projetor Multimidia", "resolucao full hd, ideal para filmes e apresentacoes", 1, "Audio e Video", "manutencao", 60.0, -23.5600, -46.6500),
        ("Violao Classico", "cordas de nylon, sonoridade suave, perfeito para iniciantes", 4, "Instrumentos Musicais", "disponivel", 25.0, -23.5450, -46.6350),
        ("Mochila de Trilha", "capacidade 60l, confortavel e com multiplos compartimentos", 3, "Viagem", "disponivel", 18.0, -23.5700, -46.6600),
        ("Bicicleta Urbana", "leve e confortavel para passeios na cidade", 3, "Esportes e Lazer", "alugado", 28.0, -23.5350, -46.6250),
    ];

    rows.iter()
        .enumerate()
        .map(|(i, (titulo, descricao, categoria_id, categoria, status, preco, lat, lon))| {
            vec![
                ("titulo", json!(titulo)),
                ("descricao", json!(descricao)),
                ("categoria_id", json!(categoria_id)),
                ("categoria", json!(categoria)),
                ("status", json!(status)),
                ("preco_diario", json!(preco)),
                ("condicoes_uso", json!("devolver limpo e nas mesmas condicoes")),
                ("usuario_id", json!((i % 4) as i64 + 1)),
                ("items_lat", json!(lat)),
                ("items_lon", json!(lon)),
                ("data_criacao", json!(format!("2024-0{}-10 12:00:00", i % 6 + 1))),
                ("created_at", json!("2024-01-01 00:00:00")),
                ("updated_at", json!("2024-01-01 00:00:00")),
            ]
        })
        .collect()
}

fn sample_users() -> Vec<(&'static str, &'static str, &'static str, &'static str)> {
    vec![
        ("Ana Silva", "ana@example.com", "locador", "ativo"),
        ("Bruno Costa", "bruno@example.com", "locatario", "ativo"),
        ("Carlos Dias", "carlos@example.com", "locatario", "inativo"),
        ("Daniela Lima", "daniela@example.com", "locador", "ativo"),
    ]
}
