//! Index Rebuilder (C10, §4.8).
//!
//! Drives `Scanning -> Dropping? -> Clearing -> Indexing` over a
//! collection. Per-document failures are captured rather than aborting the
//! whole run; the operation returns a result, not an error, unless
//! cancelled.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::catalog::IndexCatalog;
use crate::error::Result;
use crate::flatten::flatten;
use crate::id::{Id, IdKind};
use crate::model::{Collection, DocumentValue, IndexingMode};
use crate::port::RepositoryPort;

/// Progress phase names, reported in order (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPhase {
    Scanning,
    Dropping,
    Clearing,
    Indexing,
}

/// One per-document failure captured during the Indexing phase.
#[derive(Debug, Clone)]
pub struct RebuildError {
    pub document_id: Id,
    pub message: String,
}

/// Outcome of [`rebuild_indexes`].
#[derive(Debug, Clone, Default)]
pub struct RebuildResult {
    pub documents_scanned: u64,
    pub indexes_dropped: u64,
    pub indexes_created: u64,
    pub rows_indexed: u64,
    pub errors: Vec<RebuildError>,
}

/// `RebuildIndexes(collection_id, drop_unused)`.
#[tracing::instrument(skip(port, hash_len), fields(%collection_id, drop_unused))]
pub async fn rebuild_indexes(
    port: &dyn RepositoryPort,
    collection_id: &Id,
    drop_unused: bool,
    hash_len: usize,
) -> Result<RebuildResult> {
    let collection = port
        .collections()
        .get(collection_id)
        .await?
        .ok_or_else(|| crate::error::LatticeError::NotFound(format!("collection {collection_id}")))?;

    let catalog = IndexCatalog::new(port, hash_len);
    let mut result = RebuildResult::default();

    // Scanning.
    tracing::info!(phase = ?RebuildPhase::Scanning, "rebuild: scanning");
    let documents = port.documents().list_by_collection(collection_id).await?;
    result.documents_scanned = documents.len() as u64;

    // Dropping (only Selective + drop_unused).
    let selective_keys: BTreeSet<String> = if collection.indexing_mode == IndexingMode::Selective {
        port.indexed_fields()
            .list_for_collection(collection_id)
            .await?
            .into_iter()
            .map(|f| f.field_path.to_lowercase())
            .collect()
    } else {
        BTreeSet::new()
    };

    if collection.indexing_mode == IndexingMode::Selective && drop_unused {
        tracing::info!(phase = ?RebuildPhase::Dropping, "rebuild: dropping unused index tables");
        let mappings = catalog.all_mappings().await?;
        let populated = catalog.populated_tables_for_collection(collection_id).await?;
        let populated: BTreeSet<&String> = populated.iter().collect();

        for (key, table_name) in &mappings {
            if !populated.contains(table_name) {
                continue;
            }
            if selective_keys.contains(&key.to_lowercase()) {
                continue;
            }
            catalog
                .delete_for_collection(collection_id, std::slice::from_ref(table_name))
                .await?;
            result.indexes_dropped += 1;
        }
    }

    // Clearing: every DocumentValue for this collection, across every
    // table it currently populates.
    tracing::info!(phase = ?RebuildPhase::Clearing, "rebuild: clearing existing values");
    let populated_now = catalog.populated_tables_for_collection(collection_id).await?;
    if !populated_now.is_empty() {
        catalog.delete_for_collection(collection_id, &populated_now).await?;
    }

    // Indexing.
    if collection.indexing_mode == IndexingMode::None {
        return Ok(result);
    }
    tracing::info!(phase = ?RebuildPhase::Indexing, "rebuild: reindexing documents");

    for document in &documents {
        match reindex_one(&catalog, &collection, document, &selective_keys).await {
            Ok((created, rows)) => {
                result.indexes_created += created;
                result.rows_indexed += rows;
            },
            Err(e) => result.errors.push(RebuildError {
                document_id: document.id.clone(),
                message: e.to_string(),
            }),
        }
    }

    Ok(result)
}

async fn reindex_one(
    catalog: &IndexCatalog<'_>,
    collection: &Collection,
    document: &crate::model::Document,
    selective_keys: &BTreeSet<String>,
) -> Result<(u64, u64)> {
    let path = collection.document_path(&document.id);
    let bytes = tokio::fs::read(&path).await?;
    let text = String::from_utf8(bytes).map_err(|e| crate::error::LatticeError::Backend(anyhow::Error::new(e)))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| crate::error::LatticeError::Backend(anyhow::anyhow!("stored blob is not valid JSON: {e}")))?;

    let tuples = flatten(&value);
    let mut grouped: BTreeMap<&str, Vec<&crate::flatten::FlattenedValue>> = BTreeMap::new();
    for tuple in &tuples {
        grouped.entry(tuple.key.as_str()).or_default().push(tuple);
    }

    let mut created = 0u64;
    let mut rows_indexed = 0u64;
    let mut by_table: BTreeMap<String, Vec<DocumentValue>> = BTreeMap::new();

    for (key, values) in grouped {
        if collection.indexing_mode == IndexingMode::Selective && !selective_keys.contains(&key.to_lowercase()) {
            continue;
        }
        let (table_name, was_created) = catalog.resolve_table_tracked(key).await?;
        if was_created {
            created += 1;
        }
        let rows = by_table.entry(table_name).or_default();
        for tuple in values {
            rows.push(DocumentValue {
                id: Id::new(IdKind::DocumentValue),
                document_id: document.id.clone(),
                schema_id: document.schema_id.clone(),
                schema_element_id: None,
                position: tuple.position,
                value: tuple.value.clone(),
                created_utc: chrono::Utc::now(),
            });
            rows_indexed += 1;
        }
    }

    catalog.insert_many(by_table).await?;
    Ok((created, rows_indexed))
}
