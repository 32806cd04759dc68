mod common;

use common::{result_ids, start_service};
use search_service::hybrid::{self, RESPONSE_FIELD_DENYLIST};
use search_service::ServiceError;

#[test]
fn query_fuses_lexical_and_semantic_streams() {
    let svc = start_service();

    let rows = hybrid::search(&svc.registry, &svc.store, "items", "camera", 5, "").unwrap();
    let ids = result_ids(&rows);

    // Both camera rows surface; the drill is in neither stream's top-5.
    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
    assert!(!ids.contains(&8));
    // Lexical hits lead the fused order.
    assert!(ids.iter().position(|&id| id == 1).unwrap() < 2);
    assert!(ids.iter().position(|&id| id == 2).unwrap() < 2);
}

#[test]
fn short_query_runs_in_prefix_mode() {
    let svc = start_service();

    let rows = hybrid::search(&svc.registry, &svc.store, "items", "ca", 5, "").unwrap();
    let ids = result_ids(&rows);
    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
    assert!(!ids.contains(&8));
}

#[test]
fn no_query_with_filters_matches_filtered_scan() {
    let svc = start_service();

    let rows = hybrid::search(
        &svc.registry,
        &svc.store,
        "items",
        "",
        10,
        "status:ativo;preco_diario:20-50",
    )
    .unwrap();
    assert_eq!(result_ids(&rows), vec![1]);
}

#[test]
fn no_query_no_filters_returns_rows_in_store_order() {
    let svc = start_service();

    let rows = hybrid::search(&svc.registry, &svc.store, "items", "", 4, "").unwrap();
    assert_eq!(result_ids(&rows), vec![1, 2, 3, 4]);
}

#[test]
fn filters_prefilter_both_retrievers() {
    let svc = start_service();

    // Row 2 matches "camera" in both streams but is inativo; it must not
    // appear through either retriever.
    let rows = hybrid::search(
        &svc.registry,
        &svc.store,
        "items",
        "camera",
        5,
        "status:ativo",
    )
    .unwrap();
    let ids = result_ids(&rows);
    assert!(ids.contains(&1));
    assert!(!ids.contains(&2));
}

#[test]
fn distance_filter_keeps_only_rows_inside_radius() {
    let svc = start_service();

    let rows = hybrid::search(
        &svc.registry,
        &svc.store,
        "items",
        "",
        10,
        "localizacao:40.0,-74.0,50",
    )
    .unwrap();
    assert_eq!(result_ids(&rows), vec![1]);

    // Out-of-range coordinates drop the clause instead of failing, so the
    // scan falls back to unfiltered.
    let rows = hybrid::search(
        &svc.registry,
        &svc.store,
        "items",
        "",
        10,
        "localizacao:95.0,-74.0,50",
    )
    .unwrap();
    assert_eq!(rows.len(), 8);
}

#[test]
fn unknown_table_is_not_found() {
    let svc = start_service();
    let err = hybrid::search(&svc.registry, &svc.store, "missing", "camera", 5, "").unwrap_err();
    assert!(matches!(err, ServiceError::TableNotFound(_)));
}

#[test]
fn lexical_only_table_never_consults_a_vector_index() {
    let svc = start_service();

    let rows = hybrid::search(&svc.registry, &svc.store, "users", "ana silva", 10, "").unwrap();
    assert_eq!(result_ids(&rows), vec![1]);
    assert!(svc.registry.index_for("users").is_none());
}

#[test]
fn response_rows_never_carry_denylisted_fields() {
    let svc = start_service();

    let rows = hybrid::search(&svc.registry, &svc.store, "items", "camera", 5, "").unwrap();
    assert!(!rows.is_empty());
    for row in &rows {
        for field in RESPONSE_FIELD_DENYLIST {
            assert!(!row.contains_key(field), "row leaked `{field}`");
        }
        assert!(row.contains_key("titulo"));
    }
}

#[test]
fn upsert_makes_new_record_searchable_and_is_idempotent() {
    let svc = start_service();

    svc.store
        .execute_batch(
            "INSERT INTO items (id, titulo, descricao, status, preco_diario)
             VALUES (9, 'Projetor Multimidia', 'full hd para filmes', 'ativo', 40.0);",
        )
        .unwrap();
    svc.registry
        .upsert_record(&svc.store, "items", 9)
        .unwrap();

    let rows = hybrid::search(&svc.registry, &svc.store, "items", "projetor", 3, "").unwrap();
    let first = result_ids(&rows);
    assert!(first.contains(&9));

    // Repeating the upsert must not duplicate the entry or change results.
    let before = svc.registry.index_for("items").unwrap().read().len();
    svc.registry
        .upsert_record(&svc.store, "items", 9)
        .unwrap();
    let after = svc.registry.index_for("items").unwrap().read().len();
    assert_eq!(before, after);

    let rows = hybrid::search(&svc.registry, &svc.store, "items", "projetor", 3, "").unwrap();
    assert_eq!(result_ids(&rows), first);
}

#[test]
fn upsert_errors_are_not_found_shaped() {
    let svc = start_service();

    let err = svc
        .registry
        .upsert_record(&svc.store, "items", 999)
        .unwrap_err();
    assert!(matches!(err, ServiceError::RecordNotFound { .. }));

    let err = svc
        .registry
        .upsert_record(&svc.store, "missing", 1)
        .unwrap_err();
    assert!(matches!(err, ServiceError::TableNotFound(_)));

    // Lexical-only tables accept the call as a no-op.
    svc.registry.upsert_record(&svc.store, "users", 1).unwrap();
}

#[test]
fn rebuild_tracks_the_store_exactly() {
    let svc = start_service();

    svc.store
        .execute_batch(
            "DELETE FROM items WHERE id = 7;
             INSERT INTO items (id, titulo, descricao, status, preco_diario)
             VALUES (10, 'Jogo de Xadrez', 'pecas de madeira', 'ativo', 25.0);",
        )
        .unwrap();
    svc.registry.rebuild(&svc.store, "items").unwrap();

    let handle = svc.registry.index_for("items").unwrap();
    let mut indexed: Vec<i64> = handle.read().ids().collect();
    indexed.sort_unstable();
    assert_eq!(indexed, vec![1, 2, 3, 4, 5, 6, 8, 10]);
}

#[test]
fn restart_loads_the_persisted_index_without_rebuild() {
    let svc = start_service();

    let query_rows =
        hybrid::search(&svc.registry, &svc.store, "items", "camera", 5, "").unwrap();

    // A second registry over the same indexes dir loads the saved file.
    let schemas = record_model::SchemaRegistry::new(vec![
        common::users_schema(),
        common::items_schema(),
    ])
    .unwrap();
    let reloaded = search_service::IndexRegistry::new(
        schemas,
        svc.dir.path().join("indexes"),
        std::sync::Arc::new(common::StubEmbedder::new()),
    );
    reloaded.initialize(&svc.store).unwrap();

    let rows = hybrid::search(&reloaded, &svc.store, "items", "camera", 5, "").unwrap();
    assert_eq!(result_ids(&rows), result_ids(&query_rows));
}

#[test]
fn corrupt_index_file_triggers_a_rebuild() {
    let svc = start_service();
    let index_path = svc.dir.path().join("indexes").join("items.index");
    assert!(index_path.exists());
    std::fs::write(&index_path, b"scrambled bytes").unwrap();

    let schemas = record_model::SchemaRegistry::new(vec![
        common::users_schema(),
        common::items_schema(),
    ])
    .unwrap();
    let recovered = search_service::IndexRegistry::new(
        schemas,
        svc.dir.path().join("indexes"),
        std::sync::Arc::new(common::StubEmbedder::new()),
    );
    recovered.initialize(&svc.store).unwrap();

    let handle = recovered.index_for("items").unwrap();
    assert_eq!(handle.read().len(), 8);
}
