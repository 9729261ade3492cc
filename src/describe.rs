//! Collection introspection (§10.6, supplemental).
//!
//! Surfaces the field set a collection's documents actually use, for
//! callers deciding which fields to expose as search filters. Read-only;
//! adds no persisted state.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::id::Id;
use crate::model::SchemaElement;
use crate::port::RepositoryPort;

pub struct CollectionIntrospector<'a> {
    port: &'a dyn RepositoryPort,
}

impl<'a> CollectionIntrospector<'a> {
    pub fn new(port: &'a dyn RepositoryPort) -> Self {
        Self { port }
    }

    /// The union of `SchemaElement`s observed across every schema used by
    /// `collection_id`'s documents, one entry per distinct key (first
    /// schema encountered wins on a key collision), ordered by key.
    pub async fn describe(&self, collection_id: &Id) -> Result<Vec<SchemaElement>> {
        let documents = self.port.documents().list_by_collection(collection_id).await?;

        let mut seen_schemas = BTreeSet::new();
        let mut by_key: std::collections::BTreeMap<String, SchemaElement> = std::collections::BTreeMap::new();
        for document in &documents {
            if !seen_schemas.insert(document.schema_id.clone()) {
                continue;
            }
            for element in self.port.schema_elements().list_by_schema(&document.schema_id).await? {
                by_key.entry(element.key.clone()).or_insert(element);
            }
        }

        Ok(by_key.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Collection, IndexingMode, SchemaEnforcementMode};
    use crate::port::sqlite::SqlitePort;
    use crate::config::EngineConfig;
    use crate::ingest::{IngestRequest, Ingestor};

    #[tokio::test]
    async fn describe_unions_fields_across_schemas() {
        let port = SqlitePort::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::new(
            "widgets",
            dir.path().to_path_buf(),
            SchemaEnforcementMode::None,
            IndexingMode::All,
        )
        .unwrap();
        port.collections().create(&collection).await.unwrap();

        let ingestor = Ingestor::new(&port, &config);
        ingestor
            .ingest(IngestRequest::new(collection.id.clone(), r#"{"name": "a"}"#))
            .await
            .unwrap();
        ingestor
            .ingest(IngestRequest::new(collection.id.clone(), r#"{"color": "red"}"#))
            .await
            .unwrap();

        let introspector = CollectionIntrospector::new(&port);
        let elements = introspector.describe(&collection.id).await.unwrap();
        let keys: Vec<&str> = elements.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["color", "name"]);
    }
}
