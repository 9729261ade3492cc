//! Search Planner (C8, §4.6).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::id::Id;
use crate::model::Collection;
use crate::port::RepositoryPort;
use crate::timestamp::Timestamp;

use super::{SearchHit, SearchQuery, SearchResult};

pub struct SearchPlanner<'a> {
    port: &'a dyn RepositoryPort,
}

impl<'a> SearchPlanner<'a> {
    pub fn new(port: &'a dyn RepositoryPort) -> Self {
        Self { port }
    }

    /// Executes the ten steps of §4.6.
    #[tracing::instrument(skip(self, query), fields(collection_id = ?query.collection_id))]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let started = Timestamp::start();

        // Steps 2-4: intersect per-filter, per-label, per-tag candidate sets.
        let mut candidates: Option<BTreeSet<Id>> = None;

        for filter in &query.filters {
            let matched = match self.port.indexes().get_mapping(&filter.field).await? {
                Some(mapping) => {
                    self.port
                        .values()
                        .find_document_ids(&mapping.table_name, &filter.condition)
                        .await?
                },
                // §9 open question: a field whose index was dropped (or
                // never existed) yields no matches rather than an error.
                None => BTreeSet::new(),
            };
            candidates = Some(intersect(candidates, matched));
        }

        if !query.labels.is_empty() {
            let matched = self
                .port
                .labels()
                .document_ids_with_labels(query.collection_id.as_ref(), &query.labels)
                .await?;
            candidates = Some(intersect(candidates, matched));
        }

        if !query.tags.is_empty() {
            let matched = self
                .port
                .tags()
                .document_ids_with_tags(query.collection_id.as_ref(), &query.tags)
                .await?;
            candidates = Some(intersect(candidates, matched));
        }

        // Steps 5-6: establish final order and collection scope together —
        // a collection's document listing is already ordered per
        // `query.ordering`, so filtering it by the candidate set both
        // intersects and orders in one pass.
        let ordered_ids: Vec<Id> = if let Some(collection_id) = &query.collection_id {
            let scoped = self
                .port
                .collections()
                .list_document_ids(collection_id, query.ordering)
                .await?;
            match &candidates {
                Some(set) => scoped.into_iter().filter(|id| set.contains(id)).collect(),
                None => scoped,
            }
        } else {
            let mut ids: Vec<Id> = candidates.unwrap_or_default().into_iter().collect();
            ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            ids
        };

        // Step 7: paginate.
        let total_records = ordered_ids.len() as u64;
        let skip = query.skip as usize;
        let window: Vec<Id> = ordered_ids
            .into_iter()
            .skip(skip)
            .take(query.max_results as usize)
            .collect();

        // Step 8: hydrate.
        let records = self.hydrate(query, &window).await?;

        // Step 10.
        let records_remaining = total_records.saturating_sub(skip as u64 + records.len() as u64);
        let end_of_results = records_remaining == 0;

        Ok(SearchResult {
            records,
            total_records,
            records_remaining,
            end_of_results,
            timestamp: started.finish(),
        })
    }

    async fn hydrate(&self, query: &SearchQuery, ids: &[Id]) -> Result<Vec<SearchHit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetched = self.port.documents().get_many(ids).await?;
        let mut collection_cache: BTreeMap<Id, Collection> = BTreeMap::new();
        // Preserve the id order requested (step 9), not the Port's return order.
        let mut doc_by_id: BTreeMap<String, crate::model::Document> =
            fetched.into_iter().map(|d| (d.id.as_str().to_string(), d)).collect();

        let mut hits = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(mut document) = doc_by_id.remove(id.as_str()) else {
                continue;
            };

            if query.include_labels {
                document.labels = self
                    .port
                    .labels()
                    .for_document(&document.id)
                    .await?
                    .into_iter()
                    .map(|l| l.label_value)
                    .collect();
            }
            if query.include_tags {
                document.tags = self
                    .port
                    .tags()
                    .for_document(&document.id)
                    .await?
                    .into_iter()
                    .map(|t| (t.key, t.value))
                    .collect();
            }

            let content = if query.include_content {
                let collection = match collection_cache.get(&document.collection_id) {
                    Some(c) => c.clone(),
                    None => {
                        let c = self
                            .port
                            .collections()
                            .get(&document.collection_id)
                            .await?
                            .ok_or_else(|| {
                                crate::error::LatticeError::NotFound(format!(
                                    "collection {} for document {}",
                                    document.collection_id, document.id
                                ))
                            })?;
                        collection_cache.insert(document.collection_id.clone(), c.clone());
                        c
                    },
                };
                let path = collection.document_path(&document.id);
                Some(String::from_utf8(tokio::fs::read(&path).await?)
                    .map_err(|e| crate::error::LatticeError::Backend(anyhow::Error::new(e)))?)
            } else {
                None
            };

            hits.push(SearchHit { document, content });
        }

        Ok(hits)
    }
}

fn intersect(existing: Option<BTreeSet<Id>>, matched: BTreeSet<Id>) -> BTreeSet<Id> {
    match existing {
        None => matched,
        Some(set) => set.intersection(&matched).cloned().collect(),
    }
}
