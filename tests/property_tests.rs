//! Property-based coverage of the testable invariants in spec §8
//! (P1, P5, P6, P7, P8). Each property runs against the sqlite reference
//! port inside a one-off `tokio::runtime::Runtime`, since `proptest!`
//! test bodies are synchronous.

use std::collections::BTreeSet;

use proptest::prelude::*;
use tokio::runtime::Runtime;

use lattice_core::config::EngineConfig;
use lattice_core::ingest::{IngestRequest, Ingestor};
use lattice_core::model::{Collection, IndexedField, IndexingMode, SchemaEnforcementMode};
use lattice_core::port::sqlite::SqlitePort;
use lattice_core::port::RepositoryPort;
use lattice_core::rebuild::rebuild_indexes;

fn rt() -> Runtime {
    Runtime::new().expect("tokio runtime")
}

fn field_name() -> impl Strategy<Value = String> {
    "[a-z]{3,8}"
}

fn scalar_json(value: &str) -> String {
    format!("{{\"value\": \"{value}\"}}")
}

proptest! {
    /// P1: ingesting the same JSON shape N times creates exactly one Schema row.
    #[test]
    fn p1_repeated_ingest_dedups_schema(
        key in field_name(),
        values in prop::collection::vec("[a-z]{1,6}", 1..6),
    ) {
        let runtime = rt();
        runtime.block_on(async {
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

            let mut schema_ids = BTreeSet::new();
            for v in &values {
                let json = format!("{{\"{key}\": \"{v}\"}}");
                let doc = ingestor
                    .ingest(IngestRequest::new(collection.id.clone(), json))
                    .await
                    .unwrap();
                schema_ids.insert(doc.schema_id.clone());
            }
            prop_assert_eq!(schema_ids.len(), 1);
        });
    }

    /// P5: in Selective mode, a flattened key outside the indexed set never
    /// produces a row in any index table for that document.
    #[test]
    fn p5_selective_indexing_excludes_unlisted_keys(
        indexed_key in field_name(),
        other_key in field_name(),
    ) {
        prop_assume!(indexed_key != other_key);
        let runtime = rt();
        runtime.block_on(async {
            let port = SqlitePort::open_in_memory().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let collection = Collection::new(
                "widgets",
                dir.path().to_path_buf(),
                SchemaEnforcementMode::None,
                IndexingMode::Selective,
            )
            .unwrap();
            port.collections().create(&collection).await.unwrap();
            port.indexed_fields()
                .upsert(&IndexedField {
                    id: lattice_core::id::Id::new(lattice_core::id::IdKind::IndexedField),
                    collection_id: collection.id.clone(),
                    field_path: indexed_key.clone(),
                })
                .await
                .unwrap();

            let config = EngineConfig::default();
            let ingestor = Ingestor::new(&port, &config);
            let json = format!("{{\"{indexed_key}\": \"a\", \"{other_key}\": \"b\"}}");
            ingestor
                .ingest(IngestRequest::new(collection.id.clone(), json))
                .await
                .unwrap();

            // The unindexed key must never have earned a table mapping at all.
            let mapping = port.indexes().get_mapping(&other_key).await.unwrap();
            prop_assert!(mapping.is_none());
        });
    }

    /// P6: a document rejected under Strict for only UNEXPECTED_FIELD
    /// reasons is accepted under Flexible; any other error code still
    /// rejects it.
    #[test]
    fn p6_flexible_accepts_what_strict_rejects_only_for_unexpected_fields(
        extra_value in "[a-z]{1,6}",
    ) {
        let errors = lattice_core::validate::validate(
            &scalar_json(&extra_value),
            SchemaEnforcementMode::Strict,
            &[],
        )
        .err()
        .unwrap_or_default();
        prop_assert!(errors
            .iter()
            .all(|e| e.code == lattice_core::validate::ValidationErrorCode::UnexpectedField));

        let flexible = lattice_core::validate::validate(
            &scalar_json(&extra_value),
            SchemaEnforcementMode::Flexible,
            &[],
        );
        prop_assert!(flexible.is_ok());
    }

    /// P7: two concurrent TryAcquire calls on the same (collection, name)
    /// pair yield exactly one success, regardless of hostname.
    #[test]
    fn p7_lock_acquisition_is_exclusive(
        name in field_name(),
        host_a in "[a-z]{1,6}",
        host_b in "[a-z]{1,6}",
    ) {
        let runtime = rt();
        runtime.block_on(async {
            let port = SqlitePort::open_in_memory().unwrap();
            let registry = lattice_core::lockreg::ObjectLockRegistry::new(&port);
            let collection_id = lattice_core::id::Id::from_raw("col_fixed");

            let first = registry.try_acquire(&collection_id, &name, &host_a).await.unwrap();
            let second = registry.try_acquire(&collection_id, &name, &host_b).await.unwrap();

            let successes = [first.is_ok(), second.is_ok()].into_iter().filter(|b| *b).count();
            prop_assert_eq!(successes, 1);
        });
    }

    /// P8: calling RebuildIndexes twice back-to-back yields identical
    /// DocumentValue multisets (observed here as identical row counts per
    /// populated table, ignoring ids/timestamps).
    #[test]
    fn p8_rebuild_is_idempotent(
        key in field_name(),
        values in prop::collection::vec("[a-z]{1,6}", 1..6),
    ) {
        let runtime = rt();
        runtime.block_on(async {
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
            for v in &values {
                let json = format!("{{\"{key}\": \"{v}\"}}");
                ingestor
                    .ingest(IngestRequest::new(collection.id.clone(), json))
                    .await
                    .unwrap();
            }

            let first = rebuild_indexes(&port, &collection.id, false, config.index_table_hash_len)
                .await
                .unwrap();
            let second = rebuild_indexes(&port, &collection.id, false, config.index_table_hash_len)
                .await
                .unwrap();

            prop_assert!(first.errors.is_empty());
            prop_assert!(second.errors.is_empty());
            prop_assert_eq!(first.rows_indexed, second.rows_indexed);
        });
    }
}
