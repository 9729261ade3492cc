//! Lattice: a JSON document store engine.
//!
//! Lattice sits between a caller and a generic relational backend,
//! providing ingestion, dynamic per-key indexing, schema inference and
//! enforcement, and search planning over arbitrary JSON documents. It
//! owns none of the backend's storage directly — every read and write
//! crosses the [`port::RepositoryPort`] trait, so the engine is agnostic
//! to which relational store actually holds the rows. This crate ships a
//! `rusqlite`-backed [`port::sqlite::SqlitePort`] as a reference
//! implementation and the vehicle for its own test suite.
//!
//! The moving pieces, in the order a document flows through them:
//!
//! - [`flatten`] decomposes a JSON document into `(key, position, value)`
//!   tuples.
//! - [`infer`] derives a deduplicated [`model::Schema`] from those tuples.
//! - [`validate`] checks a document against a collection's
//!   [`model::FieldConstraint`]s, when schema enforcement is on.
//! - [`catalog`] resolves a flattened key to its dynamic index table,
//!   allocating the mapping on first sight.
//! - [`ingest`] drives the nine-step write path end to end.
//! - [`search`] (with [`search::planner`] and [`search::sql`]) answers
//!   queries, either built programmatically or parsed from the
//!   restricted SQL-like grammar.
//! - [`rebuild`] recomputes a collection's index tables from its stored
//!   documents.
//! - [`lockreg`] provides advisory per-document-name mutual exclusion.
//! - [`describe`] exposes read-only introspection over a collection's
//!   observed field set.

pub mod catalog;
pub mod config;
pub mod describe;
pub mod error;
pub mod flatten;
pub mod id;
pub mod infer;
pub mod ingest;
pub mod lockreg;
pub mod model;
pub mod port;
pub mod rebuild;
pub mod search;
pub mod timestamp;
pub mod validate;

pub use config::EngineConfig;
pub use error::{LatticeError, Result};
pub use id::{Id, IdKind};

/// A convenience façade bundling an [`EngineConfig`] with a borrowed
/// [`port::RepositoryPort`], so callers don't thread both through every
/// call site by hand. Each method simply delegates to the matching
/// component (`Ingestor`, `SearchPlanner`, ...); holding your own
/// component directly works just as well.
pub struct Engine<'a> {
    port: &'a dyn port::RepositoryPort,
    config: EngineConfig,
}

impl<'a> Engine<'a> {
    pub fn new(port: &'a dyn port::RepositoryPort, config: EngineConfig) -> Self {
        Self { port, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn port(&self) -> &'a dyn port::RepositoryPort {
        self.port
    }

    /// Runs the Ingestion Pipeline (§4.5) for one document.
    pub async fn ingest(&self, request: ingest::IngestRequest) -> Result<model::Document> {
        ingest::Ingestor::new(self.port, &self.config).ingest(request).await
    }

    /// Runs the Ingestion Pipeline over several documents, sharing one
    /// lock-acquisition pass and reporting partial failures per item
    /// (§10.6).
    pub async fn ingest_many(
        &self,
        requests: Vec<ingest::IngestRequest>,
        hostname: &str,
    ) -> Vec<Result<model::Document>> {
        let registry = lockreg::ObjectLockRegistry::new(self.port);
        ingest::Ingestor::new(self.port, &self.config)
            .ingest_many(requests, Some(&registry), hostname)
            .await
    }

    /// Runs the Search Planner (§4.6) for a programmatically built query.
    pub async fn search(&self, query: &search::SearchQuery) -> Result<search::SearchResult> {
        search::planner::SearchPlanner::new(self.port).search(query).await
    }

    /// Parses the restricted SQL-like grammar (§4.7) and executes the
    /// resulting query, scoped to the named collection.
    pub async fn search_sql(&self, sql: &str) -> Result<search::SearchResult> {
        let parsed = search::sql::parse(sql)?;
        let collection = self
            .port
            .collections()
            .get_by_name(&parsed.from)
            .await?
            .ok_or_else(|| LatticeError::NotFound(format!("collection {:?}", parsed.from)))?;

        let mut query = search::SearchQuery::new(Some(collection.id));
        query.filters = parsed.filters;
        query.ordering = parsed.ordering;
        if let Some(limit) = parsed.limit {
            query = query.with_max_results(limit, self.config.max_results_ceiling);
        } else {
            query = query.with_max_results(self.config.max_results_ceiling, self.config.max_results_ceiling);
        }
        query.skip = parsed.offset.unwrap_or(0);
        query.include_content = true;

        self.search(&query).await
    }

    /// Runs the Index Rebuilder (§4.8) for one collection.
    pub async fn rebuild_indexes(
        &self,
        collection_id: &Id,
        drop_unused: bool,
    ) -> Result<rebuild::RebuildResult> {
        rebuild::rebuild_indexes(self.port, collection_id, drop_unused, self.config.index_table_hash_len).await
    }

    /// Returns the union of `SchemaElement`s observed across a
    /// collection's documents (§10.6).
    pub async fn describe_collection(&self, collection_id: &Id) -> Result<Vec<model::SchemaElement>> {
        describe::CollectionIntrospector::new(self.port).describe(collection_id).await
    }

    pub fn lock_registry(&self) -> lockreg::ObjectLockRegistry<'a> {
        lockreg::ObjectLockRegistry::new(self.port)
    }

    pub fn index_catalog(&self) -> catalog::IndexCatalog<'a> {
        catalog::IndexCatalog::new(self.port, self.config.index_table_hash_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Collection, IndexingMode, SchemaEnforcementMode};
    use crate::port::sqlite::SqlitePort;

    #[tokio::test]
    async fn engine_round_trips_ingest_and_search() {
        let sqlite_port = SqlitePort::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::new(
            "widgets",
            dir.path().to_path_buf(),
            SchemaEnforcementMode::None,
            IndexingMode::All,
        )
        .unwrap();
        sqlite_port.collections().create(&collection).await.unwrap();

        let engine = Engine::new(&sqlite_port, EngineConfig::default());
        let document = engine
            .ingest(ingest::IngestRequest::new(collection.id.clone(), r#"{"name": "Acme Widget"}"#))
            .await
            .unwrap();
        assert_eq!(document.collection_id, collection.id);

        let result = engine
            .search_sql("SELECT * FROM widgets WHERE name = 'Acme Widget'")
            .await
            .unwrap();
        assert_eq!(result.total_records, 1);
        assert_eq!(result.records[0].document.id, document.id);
    }
}
