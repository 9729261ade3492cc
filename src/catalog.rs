//! Index Catalog (C6, §4.4).
//!
//! Resolves a flattened key to its dynamic index table, allocating the
//! mapping and the physical table on first sight, and fans batched
//! [`DocumentValue`] rows out across the tables of the keys they belong
//! to.

use std::collections::BTreeMap;

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{LatticeError, Result};
use crate::id::{Id, IdKind};
use crate::model::{DocumentValue, IndexTableMapping};
use crate::port::{PortError, RepositoryPort};

fn table_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static pattern"))
}

/// Deterministic table name for a key: `index_` followed by the first
/// `hash_len` hex characters of `sha256(key)` (§4.4).
pub fn table_name_for_key(key: &str, hash_len: usize) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    format!("index_{}", &full[..hash_len.min(full.len())])
}

/// The Index Catalog, scoped to one [`RepositoryPort`] and one process-wide
/// hash length (`index_table_hash_len`, §4.4: "fixed per process").
pub struct IndexCatalog<'a> {
    port: &'a dyn RepositoryPort,
    hash_len: usize,
}

impl<'a> IndexCatalog<'a> {
    pub fn new(port: &'a dyn RepositoryPort, hash_len: usize) -> Self {
        Self { port, hash_len }
    }

    /// Resolve `key`'s table, creating the mapping and table if this is the
    /// first time the process has seen the key. Races on `key` are
    /// resolved by the Port's unique constraint: the loser discards its
    /// `AlreadyExists` and re-fetches the winner's mapping (§5).
    pub async fn resolve_table(&self, key: &str) -> Result<String> {
        self.resolve_table_tracked(key).await.map(|(name, _created)| name)
    }

    /// Like [`Self::resolve_table`], but also reports whether this call
    /// created the mapping (used by the rebuilder to count
    /// `indexes_created`, §4.8).
    pub async fn resolve_table_tracked(&self, key: &str) -> Result<(String, bool)> {
        if let Some(mapping) = self.port.indexes().get_mapping(key).await? {
            return Ok((mapping.table_name, false));
        }

        let table_name = table_name_for_key(key, self.hash_len);
        if !table_name_re().is_match(&table_name) {
            return Err(LatticeError::InvalidArgument(format!(
                "computed table name {table_name:?} fails the allow-list check"
            )));
        }

        let mapping = IndexTableMapping {
            id: Id::new(IdKind::IndexTableMapping),
            key: key.to_string(),
            table_name: table_name.clone(),
        };

        match self.port.indexes().create_mapping(&mapping).await {
            Ok(()) => Ok((table_name, true)),
            Err(PortError::AlreadyExists) => {
                let existing = self
                    .port
                    .indexes()
                    .get_mapping(key)
                    .await?
                    .ok_or_else(|| {
                        LatticeError::Backend(anyhow::anyhow!(
                            "mapping for {key:?} reported AlreadyExists but is now absent"
                        ))
                    })?;
                Ok((existing.table_name, false))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Batch-insert rows already grouped by table name, under one atomic
    /// commit (§4.4 contract).
    pub async fn insert_many(&self, by_table: BTreeMap<String, Vec<DocumentValue>>) -> Result<()> {
        if by_table.is_empty() {
            return Ok(());
        }
        self.port.values().insert_values_multi_table(by_table).await?;
        Ok(())
    }

    pub async fn delete_for_document(&self, document_id: &Id, table_names: &[String]) -> Result<()> {
        if table_names.is_empty() {
            return Ok(());
        }
        self.port
            .values()
            .delete_by_document(document_id, table_names)
            .await?;
        Ok(())
    }

    pub async fn delete_for_collection(
        &self,
        collection_id: &Id,
        table_names: &[String],
    ) -> Result<()> {
        if table_names.is_empty() {
            return Ok(());
        }
        self.port
            .values()
            .delete_by_collection(collection_id, table_names)
            .await?;
        Ok(())
    }

    /// The subset of index tables actually populated by rows belonging to
    /// `collection_id` (§4.4, used by the rebuilder's Dropping phase).
    pub async fn populated_tables_for_collection(&self, collection_id: &Id) -> Result<Vec<String>> {
        Ok(self
            .port
            .indexes()
            .populated_tables_for_collection(collection_id)
            .await?)
    }

    /// All known `key -> table_name` mappings, keyed by field key.
    pub async fn all_mappings(&self) -> Result<BTreeMap<String, String>> {
        let mappings = self.port.indexes().list_mappings().await?;
        Ok(mappings.into_iter().map(|m| (m.key, m.table_name)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_is_deterministic_and_allow_listed() {
        let a = table_name_for_key("user.name", 16);
        let b = table_name_for_key("user.name", 16);
        assert_eq!(a, b);
        assert!(table_name_re().is_match(&a));
        assert!(a.starts_with("index_"));
    }

    #[test]
    fn different_keys_produce_different_tables() {
        let a = table_name_for_key("user.name", 16);
        let b = table_name_for_key("user.email", 16);
        assert_ne!(a, b);
    }
}
