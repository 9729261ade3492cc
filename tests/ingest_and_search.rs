//! End-to-end coverage of the ingest -> index -> search path against the
//! sqlite reference port, one collection/document set per test.

use std::collections::{BTreeMap, BTreeSet};

use lattice_core::config::EngineConfig;
use lattice_core::ingest::{IngestRequest, Ingestor};
use lattice_core::model::{Collection, FieldConstraint, IndexingMode, SchemaEnforcementMode};
use lattice_core::port::sqlite::SqlitePort;
use lattice_core::port::RepositoryPort;
use lattice_core::search::{Filter, FilterCondition, SearchQuery};
use lattice_core::search::planner::SearchPlanner;
use lattice_core::{Engine, LatticeError};

async fn new_collection(port: &SqlitePort, dir: &std::path::Path, mode: IndexingMode) -> Collection {
    let collection = Collection::new(
        "widgets",
        dir.to_path_buf(),
        SchemaEnforcementMode::None,
        mode,
    )
    .unwrap();
    port.collections().create(&collection).await.unwrap();
    collection
}

#[tokio::test]
async fn filter_narrows_to_the_matching_document() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = Collection::new(
        "widgets",
        dir.path().to_path_buf(),
        SchemaEnforcementMode::None,
        IndexingMode::All,
    )
    .unwrap();
    port.collections().create(&collection).await.unwrap();

    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);
    let acme = ingestor
        .ingest(IngestRequest::new(
            collection.id.clone(),
            r#"{"name": "Acme Widget", "price": 9.5}"#,
        ))
        .await
        .unwrap();
    ingestor
        .ingest(IngestRequest::new(
            collection.id.clone(),
            r#"{"name": "Other Widget", "price": 2.0}"#,
        ))
        .await
        .unwrap();

    let mut query = SearchQuery::new(Some(collection.id.clone()));
    query.filters.push(Filter {
        field: "name".into(),
        condition: FilterCondition::Equals("Acme Widget".into()),
    });

    let planner = SearchPlanner::new(&port);
    let result = planner.search(&query).await.unwrap();
    assert_eq!(result.total_records, 1);
    assert_eq!(result.records[0].document.id, acme.id);
    assert!(result.end_of_results);
}

#[tokio::test]
async fn numeric_range_filter_compares_as_numbers_not_strings() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = new_collection(&port, dir.path(), IndexingMode::All).await;
    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);

    // Lexically "9" > "10", but numerically 10 > 9 -- this exercises the
    // CAST(value AS REAL) comparison path rather than a text comparison.
    ingestor
        .ingest(IngestRequest::new(collection.id.clone(), r#"{"price": 9}"#))
        .await
        .unwrap();
    let ten = ingestor
        .ingest(IngestRequest::new(collection.id.clone(), r#"{"price": 10}"#))
        .await
        .unwrap();

    let mut query = SearchQuery::new(Some(collection.id.clone()));
    query.filters.push(Filter {
        field: "price".into(),
        condition: FilterCondition::GreaterThan("9".into()),
    });

    let planner = SearchPlanner::new(&port);
    let result = planner.search(&query).await.unwrap();
    assert_eq!(result.total_records, 1);
    assert_eq!(result.records[0].document.id, ten.id);
}

#[tokio::test]
async fn labels_are_matched_with_and_semantics() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = new_collection(&port, dir.path(), IndexingMode::All).await;
    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);

    let mut both = IngestRequest::new(collection.id.clone(), r#"{"name": "a"}"#);
    both.labels = BTreeSet::from(["red".to_string(), "large".to_string()]);
    let both_doc = ingestor.ingest(both).await.unwrap();

    let mut one = IngestRequest::new(collection.id.clone(), r#"{"name": "b"}"#);
    one.labels = BTreeSet::from(["red".to_string()]);
    ingestor.ingest(one).await.unwrap();

    let mut query = SearchQuery::new(Some(collection.id.clone()));
    query.labels = BTreeSet::from(["red".to_string(), "large".to_string()]);

    let planner = SearchPlanner::new(&port);
    let result = planner.search(&query).await.unwrap();
    assert_eq!(result.total_records, 1);
    assert_eq!(result.records[0].document.id, both_doc.id);
}

#[tokio::test]
async fn tags_are_matched_as_exact_key_value_pairs() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = new_collection(&port, dir.path(), IndexingMode::All).await;
    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);

    let mut matching = IngestRequest::new(collection.id.clone(), r#"{"name": "a"}"#);
    matching.tags = BTreeMap::from([("env".to_string(), "prod".to_string())]);
    let matching_doc = ingestor.ingest(matching).await.unwrap();

    let mut other = IngestRequest::new(collection.id.clone(), r#"{"name": "b"}"#);
    other.tags = BTreeMap::from([("env".to_string(), "dev".to_string())]);
    ingestor.ingest(other).await.unwrap();

    let mut query = SearchQuery::new(Some(collection.id.clone()));
    query.tags = BTreeMap::from([("env".to_string(), "prod".to_string())]);

    let planner = SearchPlanner::new(&port);
    let result = planner.search(&query).await.unwrap();
    assert_eq!(result.total_records, 1);
    assert_eq!(result.records[0].document.id, matching_doc.id);
}

#[tokio::test]
async fn vacuous_query_returns_every_document_in_the_collection() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = new_collection(&port, dir.path(), IndexingMode::All).await;
    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);

    for i in 0..3 {
        ingestor
            .ingest(IngestRequest::new(collection.id.clone(), format!(r#"{{"n": {i}}}"#)))
            .await
            .unwrap();
    }

    let query = SearchQuery::new(Some(collection.id.clone()));
    let planner = SearchPlanner::new(&port);
    let result = planner.search(&query).await.unwrap();
    assert_eq!(result.total_records, 3);
}

#[tokio::test]
async fn filter_on_a_field_with_no_index_mapping_yields_no_matches_not_an_error() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = new_collection(&port, dir.path(), IndexingMode::All).await;
    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);
    ingestor
        .ingest(IngestRequest::new(collection.id.clone(), r#"{"name": "a"}"#))
        .await
        .unwrap();

    let mut query = SearchQuery::new(Some(collection.id.clone()));
    query.filters.push(Filter {
        field: "never_indexed_field".into(),
        condition: FilterCondition::Equals("x".into()),
    });

    let planner = SearchPlanner::new(&port);
    let result = planner.search(&query).await.unwrap();
    assert_eq!(result.total_records, 0);
}

#[tokio::test]
async fn strict_enforcement_rejects_a_field_with_no_constraint() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = Collection::new(
        "widgets",
        dir.path().to_path_buf(),
        SchemaEnforcementMode::Strict,
        IndexingMode::All,
    )
    .unwrap();
    port.collections().create(&collection).await.unwrap();

    let mut constraint = FieldConstraint::new(collection.id.clone(), "name");
    constraint.required = true;
    port.field_constraints().upsert(&constraint).await.unwrap();

    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);

    let err = ingestor
        .ingest(IngestRequest::new(
            collection.id.clone(),
            r#"{"name": "a", "unexpected": 1}"#,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LatticeError::SchemaValidation(_)));

    ingestor
        .ingest(IngestRequest::new(collection.id.clone(), r#"{"name": "a"}"#))
        .await
        .unwrap();
}

#[tokio::test]
async fn selective_indexing_only_indexes_named_fields() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = new_collection(&port, dir.path(), IndexingMode::Selective).await;

    let indexed = lattice_core::model::IndexedField {
        id: lattice_core::id::Id::new(lattice_core::id::IdKind::IndexedField),
        collection_id: collection.id.clone(),
        field_path: "name".to_string(),
    };
    port.indexed_fields().upsert(&indexed).await.unwrap();

    let config = EngineConfig::default();
    let ingestor = Ingestor::new(&port, &config);
    ingestor
        .ingest(IngestRequest::new(
            collection.id.clone(),
            r#"{"name": "a", "secret": "z"}"#,
        ))
        .await
        .unwrap();

    let mut by_name = SearchQuery::new(Some(collection.id.clone()));
    by_name.filters.push(Filter {
        field: "name".into(),
        condition: FilterCondition::Equals("a".into()),
    });
    let planner = SearchPlanner::new(&port);
    assert_eq!(planner.search(&by_name).await.unwrap().total_records, 1);

    let mut by_secret = SearchQuery::new(Some(collection.id.clone()));
    by_secret.filters.push(Filter {
        field: "secret".into(),
        condition: FilterCondition::Equals("z".into()),
    });
    assert_eq!(planner.search(&by_secret).await.unwrap().total_records, 0);
}

#[tokio::test]
async fn engine_search_sql_resolves_the_named_collection() {
    let port = SqlitePort::open_in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let collection = new_collection(&port, dir.path(), IndexingMode::All).await;
    let engine = Engine::new(&port, EngineConfig::default());

    engine
        .ingest(IngestRequest::new(collection.id.clone(), r#"{"name": "Acme Widget"}"#))
        .await
        .unwrap();

    let result = engine
        .search_sql("SELECT * FROM widgets WHERE name = 'Acme Widget' LIMIT 5")
        .await
        .unwrap();
    assert_eq!(result.total_records, 1);

    let missing = engine.search_sql("SELECT * FROM nonexistent").await.unwrap_err();
    assert!(matches!(missing, LatticeError::NotFound(_)));
}
