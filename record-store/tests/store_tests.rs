use record_model::{FilterDataType, FilterDescriptor, FilterKind, TableSchema};
use record_store::{compile_filters, SqliteStore};

fn items_schema() -> TableSchema {
    TableSchema {
        name: "items".into(),
        text_columns: vec!["titulo".into(), "descricao".into()],
        hybrid: true,
        filters: vec![
            FilterDescriptor::new("categoria_id", FilterKind::Exact, FilterDataType::Int),
            FilterDescriptor::new("status", FilterKind::In, FilterDataType::Enum).with_enum_values(
                vec!["disponivel".into(), "alugado".into(), "manutencao".into()],
            ),
            FilterDescriptor::new("preco_diario", FilterKind::Range, FilterDataType::Decimal),
            FilterDescriptor::new("data_criacao", FilterKind::Range, FilterDataType::Date),
            FilterDescriptor::new("localizacao", FilterKind::Distance, FilterDataType::Geo),
        ],
        latitude_column: Some("items_lat".into()),
        longitude_column: Some("items_lon".into()),
    }
}

fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .execute_batch(
            "CREATE TABLE items (
                id INTEGER PRIMARY KEY,
                titulo TEXT,
                descricao TEXT,
                categoria_id INTEGER,
                status TEXT,
                preco_diario REAL,
                data_criacao TEXT,
                items_lat REAL,
                items_lon REAL,
                embedding BLOB
            );",
        )
        .unwrap();
    store
        .ensure_fts("items", &["titulo".into(), "descricao".into()])
        .unwrap();
    store
        .execute_batch(
            "INSERT INTO items VALUES
                (1, 'Camera DSLR', 'excelente para fotos com zoom', 1, 'disponivel', 30.0,
                 '2024-01-15 10:00:00', 40.1, -74.1, x'00112233'),
                (2, 'Camera Mirrorless', 'compacta para photo e video', 1, 'alugado', 45.0,
                 '2024-03-20 09:30:00', 41.0, -75.0, NULL),
                (3, 'Furadeira de Impacto', 'potente para trabalho pesado', 2, 'disponivel', 100.0,
                 '2024-06-01 18:00:00', NULL, NULL, NULL);",
        )
        .unwrap();
    store
}

#[test]
fn natural_language_search_matches_any_token() {
    let store = seeded_store();
    let cols = items_schema().text_columns;

    let ids = store
        .lexical_search("items", &cols, "camera zoom", 10)
        .unwrap();
    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
    assert!(!ids.contains(&3));
}

#[test]
fn short_query_uses_prefix_matching() {
    let store = seeded_store();
    let cols = items_schema().text_columns;

    let ids = store.lexical_search("items", &cols, "ca", 10).unwrap();
    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
    assert!(!ids.contains(&3));

    // Operator characters in short queries must not break the query; the
    // quoted token degrades to a plain "c" prefix under the tokenizer.
    let ids = store.lexical_search("items", &cols, "c++", 10).unwrap();
    assert!(!ids.contains(&3));
}

#[test]
fn lexical_limit_is_respected() {
    let store = seeded_store();
    let cols = items_schema().text_columns;
    let ids = store.lexical_search("items", &cols, "camera", 1).unwrap();
    assert_eq!(ids.len(), 1);
}

#[test]
fn filtered_lexical_search_is_subset_of_filtered_ids() {
    let store = seeded_store();
    let schema = items_schema();
    let filters = compile_filters("status:disponivel", &schema);

    let filtered = store.filtered_ids("items", &filters).unwrap();
    let lexical = store
        .lexical_search_filtered("items", &schema.text_columns, "camera", &filters, 10)
        .unwrap();

    assert_eq!(lexical, vec![1]);
    for id in &lexical {
        assert!(filtered.contains(id));
    }
}

#[test]
fn filtered_ids_combines_enum_and_range() {
    let store = seeded_store();
    let schema = items_schema();

    let filters = compile_filters("status:disponivel;preco_diario:20-50", &schema);
    let ids = store.filtered_ids("items", &filters).unwrap();
    assert_eq!(ids, vec![1]);
}

#[test]
fn date_range_filter_selects_by_creation_time() {
    let store = seeded_store();
    let schema = items_schema();

    let filters = compile_filters("data_criacao:2024-03-01-2024-12-31", &schema);
    let ids = store.filtered_ids("items", &filters).unwrap();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn distance_filter_uses_great_circle_radius() {
    let store = seeded_store();
    let schema = items_schema();

    // Row 1 is ~14 km from the center; row 2 ~140 km; row 3 has no
    // coordinates and must be excluded.
    let filters = compile_filters("localizacao:40.0,-74.0,50", &schema);
    let ids = store.filtered_ids("items", &filters).unwrap();
    assert_eq!(ids, vec![1]);

    let wide = compile_filters("localizacao:40.0,-74.0,500", &schema);
    let ids = store.filtered_ids("items", &wide).unwrap();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn filtered_ids_limited_caps_results() {
    let store = seeded_store();

    let all = store.filtered_ids_limited("items", &[], 10).unwrap();
    assert_eq!(all.len(), 3);

    let capped = store.filtered_ids_limited("items", &[], 2).unwrap();
    assert_eq!(capped.len(), 2);
}

#[test]
fn fetch_by_ids_hydrates_rows_and_nulls_blobs() {
    let store = seeded_store();

    let rows = store.fetch_by_ids("items", &[2, 1]).unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        let id = row.get("id").and_then(|v| v.as_i64()).unwrap();
        assert!(id == 1 || id == 2);
        if id == 1 {
            assert_eq!(
                row.get("titulo").and_then(|v| v.as_str()),
                Some("Camera DSLR")
            );
            // Blob columns have no JSON representation.
            assert!(row.get("embedding").unwrap().is_null());
        }
    }

    assert!(store.fetch_by_ids("items", &[]).unwrap().is_empty());
    assert!(store.fetch_by_id("items", 99).unwrap().is_none());
}

#[test]
fn triggers_keep_fts_mirror_in_sync() {
    let store = seeded_store();
    let cols = items_schema().text_columns;

    let mut row = record_model::Row::new();
    row.insert("id".into(), serde_json::json!(4));
    row.insert("titulo".into(), serde_json::json!("Projetor Multimidia"));
    row.insert("descricao".into(), serde_json::json!("full hd para filmes"));
    row.insert("status".into(), serde_json::json!("disponivel"));
    store.upsert_row("items", &row).unwrap();

    let ids = store.lexical_search("items", &cols, "projetor", 10).unwrap();
    assert_eq!(ids, vec![4]);

    // Replacing the row re-indexes the new text.
    row.insert("titulo".into(), serde_json::json!("Caixa de Som"));
    store.upsert_row("items", &row).unwrap();
    assert!(store
        .lexical_search("items", &cols, "projetor", 10)
        .unwrap()
        .is_empty());

    store.delete_row("items", 4).unwrap();
    assert!(store
        .lexical_search("items", &cols, "caixa", 10)
        .unwrap()
        .is_empty());
}

#[test]
fn invalid_table_names_are_rejected() {
    let store = seeded_store();
    assert!(store.fetch_all("items; DROP TABLE items").is_err());
    assert!(store.lexical_search("bad`name", &[], "x", 5).is_err());
}
