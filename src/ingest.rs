//! Ingestion Pipeline (C7, §4.5).
//!
//! `Ingest` is the engine's only write path for document content: it
//! validates, infers/dedups a schema, persists metadata, indexes, and
//! writes the blob, in that order, returning on the first failing step
//! (§4.5's failure semantics).

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::catalog::IndexCatalog;
use crate::config::EngineConfig;
use crate::error::{LatticeError, Result};
use crate::id::{Id, IdKind};
use crate::infer::infer;
use crate::flatten::flatten;
use crate::model::{
    Document,
    DocumentValue,
    IndexingMode,
    Label,
    Schema,
    SchemaElement,
    Tag,
};
use crate::port::{PortError, RepositoryPort};
use crate::validate::validate;

/// Input to [`Ingestor::ingest`] (§4.5's `Ingest(collection_id, json, name?,
/// labels?, tags?)`).
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub collection_id: Id,
    pub json: String,
    pub name: Option<String>,
    pub labels: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
}

impl IngestRequest {
    pub fn new(collection_id: Id, json: impl Into<String>) -> Self {
        Self {
            collection_id,
            json: json.into(),
            name: None,
            labels: BTreeSet::new(),
            tags: BTreeMap::new(),
        }
    }
}

pub struct Ingestor<'a> {
    port: &'a dyn RepositoryPort,
    config: &'a EngineConfig,
}

impl<'a> Ingestor<'a> {
    pub fn new(port: &'a dyn RepositoryPort, config: &'a EngineConfig) -> Self {
        Self { port, config }
    }

    /// Executes the nine steps of §4.5 in order.
    #[tracing::instrument(skip(self, request), fields(collection_id = %request.collection_id))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<Document> {
        // 1. Load collection.
        let collection = self
            .port
            .collections()
            .get(&request.collection_id)
            .await?
            .ok_or_else(|| LatticeError::NotFound(format!("collection {}", request.collection_id)))?;

        // 2. Validate under the collection's enforcement mode.
        if collection.schema_enforcement_mode != crate::model::SchemaEnforcementMode::None {
            let constraints = self
                .port
                .field_constraints()
                .list_for_collection(&collection.id)
                .await?;
            if let Err(errors) =
                validate(&request.json, collection.schema_enforcement_mode, &constraints)
            {
                return Err(LatticeError::SchemaValidation(errors));
            }
        }

        let value: serde_json::Value = serde_json::from_str(&request.json)
            .map_err(|e| LatticeError::InvalidArgument(format!("invalid JSON: {e}")))?;

        // 3. Infer schema, reuse by hash or create.
        let tuples = flatten(&value);
        let inferred = infer(&tuples);
        let schema = self.resolve_schema(&inferred).await?;

        tracing::debug!(schema_hash = %schema.hash, "ingest: resolved schema");

        // 4. Ensure index mappings exist for every schema element, when
        // indexing is on. Under Selective, only elements in the
        // collection's IndexedField set earn a mapping — an unindexed key
        // must never acquire a table at all, matching step 8's own filter.
        let catalog = IndexCatalog::new(self.port, self.config.index_table_hash_len);
        if collection.indexing_mode != IndexingMode::None {
            let selective_set: Option<BTreeSet<String>> = if collection.indexing_mode
                == IndexingMode::Selective
            {
                Some(
                    self.port
                        .indexed_fields()
                        .list_for_collection(&collection.id)
                        .await?
                        .into_iter()
                        .map(|f| f.field_path.to_lowercase())
                        .collect(),
                )
            } else {
                None
            };

            for element in self.port.schema_elements().list_by_schema(&schema.id).await? {
                if let Some(set) = &selective_set {
                    if !set.contains(&element.key.to_lowercase()) {
                        continue;
                    }
                }
                catalog.resolve_table(&element.key).await?;
            }
        }

        // 5. Hash + length of the raw bytes.
        let bytes = request.json.as_bytes();
        let content_length = bytes.len() as u64;
        let sha256_hash = {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            format!("{:x}", hasher.finalize())
        };

        // 6. Persist the Document row.
        let now = Utc::now();
        let document = Document {
            id: Id::new(IdKind::Document),
            collection_id: collection.id.clone(),
            schema_id: schema.id.clone(),
            name: request.name.clone(),
            content_length,
            sha256_hash,
            labels: request.labels.clone(),
            tags: request.tags.clone(),
            created_utc: now,
            last_update_utc: now,
        };
        self.port.documents().create(&document).await?;

        // 7. Document-level labels/tags.
        if !document.labels.is_empty() {
            let rows: Vec<Label> = document
                .labels
                .iter()
                .map(|label_value| Label {
                    id: Id::new(IdKind::Label),
                    collection_id: Some(collection.id.clone()),
                    document_id: Some(document.id.clone()),
                    label_value: label_value.clone(),
                })
                .collect();
            self.port.labels().create_many(&rows).await?;
        }
        if !document.tags.is_empty() {
            let rows: Vec<Tag> = document
                .tags
                .iter()
                .map(|(key, value)| Tag {
                    id: Id::new(IdKind::Tag),
                    collection_id: Some(collection.id.clone()),
                    document_id: Some(document.id.clone()),
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();
            self.port.tags().create_many(&rows).await?;
        }

        // 8. Flatten and index, honoring the indexing mode.
        if collection.indexing_mode != IndexingMode::None {
            self.index_document(&collection, &schema, &document, &tuples, &catalog)
                .await?;
        }

        // 9. Write the blob last.
        let path = collection.document_path(&document.id);
        tokio::fs::write(&path, bytes).await?;

        tracing::info!(document_id = %document.id, "ingest: complete");
        Ok(document)
    }

    /// Ingest several documents, sharing one object-lock acquisition pass
    /// per named document and reporting partial failures per item (§10.6)
    /// rather than the all-or-nothing semantics the Non-goals exclude.
    pub async fn ingest_many(
        &self,
        requests: Vec<IngestRequest>,
        lock_registry: Option<&crate::lockreg::ObjectLockRegistry<'_>>,
        hostname: &str,
    ) -> Vec<Result<Document>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let lock_name = request.name.clone();
            let acquired = match (&lock_registry, &lock_name) {
                (Some(registry), Some(name)) => {
                    match registry.try_acquire(&request.collection_id, name, hostname).await {
                        Ok(Ok(())) => Some((registry, request.collection_id.clone(), name.clone())),
                        Ok(Err(existing)) => {
                            results.push(Err(LatticeError::Conflict(format!(
                                "document name {name:?} locked by {}",
                                existing.hostname
                            ))));
                            continue;
                        },
                        Err(e) => {
                            results.push(Err(e));
                            continue;
                        },
                    }
                },
                _ => None,
            };

            let outcome = self.ingest(request).await;
            if let Some((registry, collection_id, name)) = acquired {
                let _ = registry.release(&collection_id, &name).await;
            }
            results.push(outcome);
        }
        results
    }

    async fn resolve_schema(&self, inferred: &crate::infer::InferredSchema) -> Result<Schema> {
        if let Some(existing) = self.port.schemas().get_by_hash(&inferred.hash).await? {
            return Ok(existing);
        }

        let schema = Schema {
            id: Id::new(IdKind::Schema),
            name: None,
            hash: inferred.hash.clone(),
            created_utc: Utc::now(),
        };

        match self.port.schemas().create(&schema).await {
            Ok(()) => {
                let elements: Vec<SchemaElement> = inferred
                    .elements
                    .iter()
                    .map(|e| SchemaElement {
                        id: Id::new(IdKind::SchemaElement),
                        schema_id: schema.id.clone(),
                        position: e.position,
                        key: e.key.clone(),
                        data_type: e.data_type,
                        nullable: e.nullable,
                    })
                    .collect();
                self.port.schema_elements().create_many(&elements).await?;
                tracing::debug!(schema_id = %schema.id, "ingest: created new schema");
                Ok(schema)
            },
            Err(PortError::AlreadyExists) => {
                // Lost the race; the winner's row is authoritative (§5).
                self.port
                    .schemas()
                    .get_by_hash(&inferred.hash)
                    .await?
                    .ok_or_else(|| {
                        LatticeError::Backend(anyhow::anyhow!(
                            "schema hash {} reported AlreadyExists but is now absent",
                            inferred.hash
                        ))
                    })
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn index_document(
        &self,
        collection: &crate::model::Collection,
        schema: &Schema,
        document: &Document,
        tuples: &[crate::flatten::FlattenedValue],
        catalog: &IndexCatalog<'_>,
    ) -> Result<()> {
        let selective_set: Option<BTreeSet<String>> = if collection.indexing_mode
            == IndexingMode::Selective
        {
            Some(
                self.port
                    .indexed_fields()
                    .list_for_collection(&collection.id)
                    .await?
                    .into_iter()
                    .map(|f| f.field_path.to_lowercase())
                    .collect(),
            )
        } else {
            None
        };

        let elements = self.port.schema_elements().list_by_schema(&schema.id).await?;
        let element_by_key: BTreeMap<&str, &SchemaElement> =
            elements.iter().map(|e| (e.key.as_str(), e)).collect();

        let mut grouped: BTreeMap<&str, Vec<&crate::flatten::FlattenedValue>> = BTreeMap::new();
        for tuple in tuples {
            grouped.entry(tuple.key.as_str()).or_default().push(tuple);
        }

        let mut by_table: BTreeMap<String, Vec<DocumentValue>> = BTreeMap::new();
        for (key, values) in grouped {
            if let Some(set) = &selective_set {
                if !set.contains(&key.to_lowercase()) {
                    continue;
                }
            }
            let table_name = catalog.resolve_table(key).await?;
            let schema_element_id = element_by_key.get(key).map(|e| e.id.clone());
            let rows = by_table.entry(table_name).or_default();
            for tuple in values {
                rows.push(DocumentValue {
                    id: Id::new(IdKind::DocumentValue),
                    document_id: document.id.clone(),
                    schema_id: schema.id.clone(),
                    schema_element_id: schema_element_id.clone(),
                    position: tuple.position,
                    value: tuple.value.clone(),
                    created_utc: Utc::now(),
                });
            }
        }

        catalog.insert_many(by_table).await
    }
}
