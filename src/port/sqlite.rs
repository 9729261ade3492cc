//! Reference Repository Port implementation (§10.5, supplemental).
//!
//! A `rusqlite`-backed adapter kept for this crate's own tests and
//! doctests — not a claim that MySQL/Postgres/SQL Server adapters live
//! here. Every value crosses the SQL boundary as a bound parameter;
//! [`exec`] is the single place a table name is ever spliced into query
//! text, and only after [`super::IndexesPort::create_mapping`] has run it
//! through the `[A-Za-z0-9_]` allow-list (§9).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, ToSql};
use tokio::sync::Mutex;

use crate::id::Id;
use crate::model::{
    Collection,
    ConstraintType,
    Document,
    FieldConstraint,
    IndexTableMapping,
    IndexedField,
    IndexingMode,
    Label,
    ObjectLock,
    Schema,
    SchemaEnforcementMode,
    SchemaElement,
    Tag,
};
use crate::search::FilterCondition;

use super::{
    CollectionsPort,
    DocumentsPort,
    FieldConstraintsPort,
    IndexedFieldsPort,
    IndexesPort,
    LabelsPort,
    ObjectLocksPort,
    Ordering,
    PortError,
    PortResult,
    RepositoryPort,
    SchemaElementsPort,
    SchemasPort,
    TagsPort,
    ValuesPort,
};

const DDL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    description TEXT,
    documents_directory TEXT NOT NULL,
    schema_enforcement_mode TEXT NOT NULL,
    indexing_mode TEXT NOT NULL,
    labels TEXT NOT NULL,
    tags TEXT NOT NULL,
    created_utc TEXT NOT NULL,
    last_update_utc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL,
    schema_id TEXT NOT NULL,
    name TEXT,
    content_length INTEGER NOT NULL,
    sha256_hash TEXT NOT NULL,
    labels TEXT NOT NULL,
    tags TEXT NOT NULL,
    created_utc TEXT NOT NULL,
    last_update_utc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_id);

CREATE TABLE IF NOT EXISTS schemas (
    id TEXT PRIMARY KEY,
    name TEXT,
    hash TEXT UNIQUE NOT NULL,
    created_utc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_elements (
    id TEXT PRIMARY KEY,
    schema_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    key TEXT NOT NULL,
    data_type TEXT NOT NULL,
    nullable INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_schema_elements_schema ON schema_elements(schema_id);

CREATE TABLE IF NOT EXISTS index_table_mappings (
    id TEXT PRIMARY KEY,
    key TEXT UNIQUE NOT NULL,
    table_name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS labels (
    id TEXT PRIMARY KEY,
    collection_id TEXT,
    document_id TEXT,
    label_value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_labels_document ON labels(document_id);
CREATE INDEX IF NOT EXISTS idx_labels_collection ON labels(collection_id);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    collection_id TEXT,
    document_id TEXT,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tags_document ON tags(document_id);
CREATE INDEX IF NOT EXISTS idx_tags_collection ON tags(collection_id);

CREATE TABLE IF NOT EXISTS field_constraints (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL,
    field_path TEXT NOT NULL,
    data_type TEXT,
    required INTEGER NOT NULL,
    nullable INTEGER NOT NULL,
    regex_pattern TEXT,
    min_value REAL,
    max_value REAL,
    min_length INTEGER,
    max_length INTEGER,
    allowed_values TEXT NOT NULL,
    array_element_type TEXT,
    UNIQUE(collection_id, field_path)
);

CREATE TABLE IF NOT EXISTS indexed_fields (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL,
    field_path TEXT NOT NULL,
    UNIQUE(collection_id, field_path)
);

CREATE TABLE IF NOT EXISTS object_locks (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL,
    document_name TEXT NOT NULL,
    hostname TEXT NOT NULL,
    created_utc TEXT NOT NULL,
    UNIQUE(collection_id, document_name)
);
"#;

/// A `rusqlite`-backed [`RepositoryPort`]. Holds its connection behind a
/// `tokio::sync::Mutex` — the single-process reader/writer guard of §5,
/// simplified to full serialization since `rusqlite::Connection` is
/// `!Sync`; good enough for a reference/testing adapter, not a claim about
/// production throughput.
pub struct SqlitePort {
    conn: Mutex<Connection>,
}

impl SqlitePort {
    pub fn open(path: &Path) -> PortResult<Self> {
        let conn = Connection::open(path).map_err(|e| PortError::Backend(e.into()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> PortResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| PortError::Backend(e.into()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> PortResult<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| PortError::Backend(e.into()))?;
        conn.execute_batch(DDL).map_err(|e| PortError::Backend(e.into()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates the physical table for a dynamic index, if absent. The
    /// table name has already passed the allow-list check in
    /// [`IndexesPort::create_mapping`] — this is the one place it is
    /// spliced into SQL text (§9).
    fn create_index_table(conn: &Connection, table_name: &str) -> rusqlite::Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table_name} (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                schema_id TEXT NOT NULL,
                schema_element_id TEXT,
                position INTEGER,
                value TEXT,
                created_utc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {table_name}_document_id ON {table_name}(document_id);
            CREATE INDEX IF NOT EXISTS {table_name}_value ON {table_name}(value);
            CREATE INDEX IF NOT EXISTS {table_name}_position ON {table_name}(position);
            CREATE INDEX IF NOT EXISTS {table_name}_doc_pos ON {table_name}(document_id, position);"
        ))
    }
}

fn map_err(e: rusqlite::Error) -> PortError {
    if let rusqlite::Error::SqliteFailure(ref ffi_err, _) = e {
        if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation {
            return PortError::AlreadyExists;
        }
    }
    PortError::Backend(e.into())
}

fn parse_ts(s: &str) -> PortResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PortError::Backend(anyhow::Error::new(e)))
}

fn json_col<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn from_json_col<T: serde::de::DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

fn order_clause(ordering: Ordering) -> &'static str {
    match ordering {
        Ordering::CreatedAscending => "created_utc ASC",
        Ordering::CreatedDescending => "created_utc DESC",
        Ordering::LastUpdateAscending => "last_update_utc ASC",
        Ordering::LastUpdateDescending => "last_update_utc DESC",
        Ordering::NameAscending => "name ASC",
        Ordering::NameDescending => "name DESC",
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Translate a [`FilterCondition`] into a `(clause, bound value)` pair for
/// `... WHERE value {clause}`, where `{clause}` already contains its own
/// `?1` placeholder.
fn condition_clause(condition: &FilterCondition) -> (&'static str, Option<String>) {
    match condition {
        FilterCondition::Equals(v) => ("value = ?1", Some(v.clone())),
        FilterCondition::NotEquals(v) => ("value != ?1", Some(v.clone())),
        FilterCondition::GreaterThan(v) => ("CAST(value AS REAL) > CAST(?1 AS REAL)", Some(v.clone())),
        FilterCondition::GreaterThanOrEqualTo(v) => {
            ("CAST(value AS REAL) >= CAST(?1 AS REAL)", Some(v.clone()))
        },
        FilterCondition::LessThan(v) => ("CAST(value AS REAL) < CAST(?1 AS REAL)", Some(v.clone())),
        FilterCondition::LessThanOrEqualTo(v) => {
            ("CAST(value AS REAL) <= CAST(?1 AS REAL)", Some(v.clone()))
        },
        FilterCondition::IsNull => ("value IS NULL", None),
        FilterCondition::IsNotNull => ("value IS NOT NULL", None),
        FilterCondition::Contains(v) => ("value LIKE ?1 ESCAPE '\\'", Some(format!("%{}%", escape_like(v)))),
        FilterCondition::StartsWith(v) => ("value LIKE ?1 ESCAPE '\\'", Some(format!("{}%", escape_like(v)))),
        FilterCondition::EndsWith(v) => ("value LIKE ?1 ESCAPE '\\'", Some(format!("%{}", escape_like(v)))),
        FilterCondition::Like(v) => ("value LIKE ?1", Some(v.clone())),
    }
}

#[async_trait]
impl CollectionsPort for SqlitePort {
    async fn create(&self, collection: &Collection) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO collections (id, name, description, documents_directory, schema_enforcement_mode, indexing_mode, labels, tags, created_utc, last_update_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                collection.id.as_str(),
                collection.name,
                collection.description,
                collection.documents_directory.to_string_lossy(),
                serde_json::to_value(collection.schema_enforcement_mode).unwrap().as_str().unwrap(),
                serde_json::to_value(collection.indexing_mode).unwrap().as_str().unwrap(),
                json_col(&collection.labels),
                json_col(&collection.tags),
                collection.created_utc.to_rfc3339(),
                collection.last_update_utc.to_rfc3339(),
            ],
        )
        .map_err(map_err)?;
        Ok(())
    }

    async fn get(&self, id: &Id) -> PortResult<Option<Collection>> {
        let conn = self.conn.lock().await;
        row_to_collection_opt(&conn, "id = ?1", id.as_str())
    }

    async fn get_by_name(&self, name: &str) -> PortResult<Option<Collection>> {
        let conn = self.conn.lock().await;
        row_to_collection_opt(&conn, "name = ?1", name)
    }

    async fn delete(&self, id: &Id) -> PortResult<()> {
        let conn = self.conn.lock().await;
        let id = id.as_str();
        conn.execute("DELETE FROM documents WHERE collection_id = ?1", [id])
            .map_err(map_err)?;
        conn.execute("DELETE FROM labels WHERE collection_id = ?1", [id])
            .map_err(map_err)?;
        conn.execute("DELETE FROM tags WHERE collection_id = ?1", [id])
            .map_err(map_err)?;
        conn.execute("DELETE FROM field_constraints WHERE collection_id = ?1", [id])
            .map_err(map_err)?;
        conn.execute("DELETE FROM indexed_fields WHERE collection_id = ?1", [id])
            .map_err(map_err)?;
        conn.execute("DELETE FROM object_locks WHERE collection_id = ?1", [id])
            .map_err(map_err)?;
        conn.execute("DELETE FROM collections WHERE id = ?1", [id])
            .map_err(map_err)?;
        Ok(())
    }

    async fn update_indexing_mode(&self, id: &Id, mode: IndexingMode) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE collections SET indexing_mode = ?1 WHERE id = ?2",
            rusqlite::params![
                serde_json::to_value(mode).unwrap().as_str().unwrap(),
                id.as_str()
            ],
        )
        .map_err(map_err)?;
        Ok(())
    }

    async fn list_document_ids(&self, collection_id: &Id, order: Ordering) -> PortResult<Vec<Id>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT id FROM documents WHERE collection_id = ?1 ORDER BY {}",
            order_clause(order)
        );
        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let rows = stmt
            .query_map([collection_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(Id::from_raw(r.map_err(map_err)?));
        }
        Ok(out)
    }
}

fn row_to_collection_opt(conn: &Connection, predicate: &str, param: &str) -> PortResult<Option<Collection>> {
    let sql = format!(
        "SELECT id, name, description, documents_directory, schema_enforcement_mode, indexing_mode, labels, tags, created_utc, last_update_utc
         FROM collections WHERE {predicate}"
    );
    conn.query_row(&sql, [param], |row| {
        Ok(Collection {
            id: Id::from_raw(row.get::<_, String>(0)?),
            name: row.get(1)?,
            description: row.get(2)?,
            documents_directory: std::path::PathBuf::from(row.get::<_, String>(3)?),
            schema_enforcement_mode: parse_enforcement_mode(&row.get::<_, String>(4)?),
            indexing_mode: parse_indexing_mode(&row.get::<_, String>(5)?),
            labels: from_json_col(&row.get::<_, String>(6)?),
            tags: from_json_col(&row.get::<_, String>(7)?),
            created_utc: row.get::<_, String>(8)?.parse().unwrap_or_else(|_| Utc::now()),
            last_update_utc: row.get::<_, String>(9)?.parse().unwrap_or_else(|_| Utc::now()),
        })
    })
    .optional()
    .map_err(map_err)
}

fn parse_enforcement_mode(s: &str) -> SchemaEnforcementMode {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(SchemaEnforcementMode::None)
}

fn parse_indexing_mode(s: &str) -> IndexingMode {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(IndexingMode::All)
}

#[async_trait]
impl DocumentsPort for SqlitePort {
    async fn create(&self, document: &Document) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO documents (id, collection_id, schema_id, name, content_length, sha256_hash, labels, tags, created_utc, last_update_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                document.id.as_str(),
                document.collection_id.as_str(),
                document.schema_id.as_str(),
                document.name,
                document.content_length as i64,
                document.sha256_hash,
                json_col(&document.labels),
                json_col(&document.tags),
                document.created_utc.to_rfc3339(),
                document.last_update_utc.to_rfc3339(),
            ],
        )
        .map_err(map_err)?;
        Ok(())
    }

    async fn get(&self, id: &Id) -> PortResult<Option<Document>> {
        let conn = self.conn.lock().await;
        row_to_document_opt(&conn, "id = ?1", id.as_str())
    }

    async fn get_many(&self, ids: &[Id]) -> PortResult<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT id, collection_id, schema_id, name, content_length, sha256_hash, labels, tags, created_utc, last_update_utc
             FROM documents WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let params: Vec<&dyn ToSql> = ids.iter().map(|id| id.as_str() as &dyn ToSql).collect();
        let rows = stmt
            .query_map(params.as_slice(), document_from_row)
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn list_by_collection(&self, collection_id: &Id) -> PortResult<Vec<Document>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, collection_id, schema_id, name, content_length, sha256_hash, labels, tags, created_utc, last_update_utc
                 FROM documents WHERE collection_id = ?1",
            )
            .map_err(map_err)?;
        let rows = stmt
            .query_map([collection_id.as_str()], document_from_row)
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn delete(&self, id: &Id) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM documents WHERE id = ?1", [id.as_str()])
            .map_err(map_err)?;
        Ok(())
    }
}

fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: Id::from_raw(row.get::<_, String>(0)?),
        collection_id: Id::from_raw(row.get::<_, String>(1)?),
        schema_id: Id::from_raw(row.get::<_, String>(2)?),
        name: row.get(3)?,
        content_length: row.get::<_, i64>(4)? as u64,
        sha256_hash: row.get(5)?,
        labels: from_json_col(&row.get::<_, String>(6)?),
        tags: from_json_col(&row.get::<_, String>(7)?),
        created_utc: row.get::<_, String>(8)?.parse().unwrap_or_else(|_| Utc::now()),
        last_update_utc: row.get::<_, String>(9)?.parse().unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_document_opt(conn: &Connection, predicate: &str, param: &str) -> PortResult<Option<Document>> {
    let sql = format!(
        "SELECT id, collection_id, schema_id, name, content_length, sha256_hash, labels, tags, created_utc, last_update_utc
         FROM documents WHERE {predicate}"
    );
    conn.query_row(&sql, [param], document_from_row).optional().map_err(map_err)
}

#[async_trait]
impl SchemasPort for SqlitePort {
    async fn get_by_hash(&self, hash: &str) -> PortResult<Option<Schema>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, name, hash, created_utc FROM schemas WHERE hash = ?1",
            [hash],
            schema_from_row,
        )
        .optional()
        .map_err(map_err)
    }

    async fn create(&self, schema: &Schema) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO schemas (id, name, hash, created_utc) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![schema.id.as_str(), schema.name, schema.hash, schema.created_utc.to_rfc3339()],
        )
        .map_err(map_err)?;
        Ok(())
    }

    async fn get(&self, id: &Id) -> PortResult<Option<Schema>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, name, hash, created_utc FROM schemas WHERE id = ?1",
            [id.as_str()],
            schema_from_row,
        )
        .optional()
        .map_err(map_err)
    }
}

fn schema_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schema> {
    Ok(Schema {
        id: Id::from_raw(row.get::<_, String>(0)?),
        name: row.get(1)?,
        hash: row.get(2)?,
        created_utc: row.get::<_, String>(3)?.parse().unwrap_or_else(|_| Utc::now()),
    })
}

#[async_trait]
impl SchemaElementsPort for SqlitePort {
    async fn create_many(&self, elements: &[SchemaElement]) -> PortResult<()> {
        if elements.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(map_err)?;
        for e in elements {
            tx.execute(
                "INSERT INTO schema_elements (id, schema_id, position, key, data_type, nullable) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    e.id.as_str(),
                    e.schema_id.as_str(),
                    e.position as i64,
                    e.key,
                    e.data_type.as_str(),
                    e.nullable,
                ],
            )
            .map_err(map_err)?;
        }
        tx.commit().map_err(map_err)?;
        Ok(())
    }

    async fn list_by_schema(&self, schema_id: &Id) -> PortResult<Vec<SchemaElement>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, schema_id, position, key, data_type, nullable FROM schema_elements WHERE schema_id = ?1 ORDER BY position")
            .map_err(map_err)?;
        let rows = stmt
            .query_map([schema_id.as_str()], schema_element_from_row)
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn get_by_key(&self, schema_id: &Id, key: &str) -> PortResult<Option<SchemaElement>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, schema_id, position, key, data_type, nullable FROM schema_elements WHERE schema_id = ?1 AND key = ?2",
            rusqlite::params![schema_id.as_str(), key],
            schema_element_from_row,
        )
        .optional()
        .map_err(map_err)
    }
}

fn schema_element_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SchemaElement> {
    let data_type: String = row.get(4)?;
    Ok(SchemaElement {
        id: Id::from_raw(row.get::<_, String>(0)?),
        schema_id: Id::from_raw(row.get::<_, String>(1)?),
        position: row.get::<_, i64>(2)? as usize,
        key: row.get(3)?,
        data_type: serde_json::from_value(serde_json::Value::String(data_type)).unwrap_or(crate::model::DataType::String),
        nullable: row.get(5)?,
    })
}

#[async_trait]
impl IndexesPort for SqlitePort {
    async fn get_mapping(&self, key: &str) -> PortResult<Option<IndexTableMapping>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, key, table_name FROM index_table_mappings WHERE key = ?1",
            [key],
            |row| {
                Ok(IndexTableMapping {
                    id: Id::from_raw(row.get::<_, String>(0)?),
                    key: row.get(1)?,
                    table_name: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(map_err)
    }

    async fn create_mapping(&self, mapping: &IndexTableMapping) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO index_table_mappings (id, key, table_name) VALUES (?1, ?2, ?3)",
            rusqlite::params![mapping.id.as_str(), mapping.key, mapping.table_name],
        )
        .map_err(map_err)?;
        SqlitePort::create_index_table(&conn, &mapping.table_name).map_err(map_err)?;
        Ok(())
    }

    async fn list_mappings(&self) -> PortResult<Vec<IndexTableMapping>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, key, table_name FROM index_table_mappings").map_err(map_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(IndexTableMapping {
                    id: Id::from_raw(row.get::<_, String>(0)?),
                    key: row.get(1)?,
                    table_name: row.get(2)?,
                })
            })
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn populated_tables_for_collection(&self, collection_id: &Id) -> PortResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mappings = {
            let mut stmt = conn.prepare("SELECT table_name FROM index_table_mappings").map_err(map_err)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(map_err)?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r.map_err(map_err)?);
            }
            out
        };

        let mut populated = Vec::new();
        for table_name in mappings {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM {table_name} t JOIN documents d ON d.id = t.document_id WHERE d.collection_id = ?1)"
            );
            let exists: bool = conn
                .query_row(&sql, [collection_id.as_str()], |row| row.get(0))
                .map_err(map_err)?;
            if exists {
                populated.push(table_name);
            }
        }
        Ok(populated)
    }

    async fn drop_rows_for_collection(&self, table_name: &str, collection_id: &Id) -> PortResult<u64> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "DELETE FROM {table_name} WHERE document_id IN (SELECT id FROM documents WHERE collection_id = ?1)"
        );
        let affected = conn.execute(&sql, [collection_id.as_str()]).map_err(map_err)?;
        Ok(affected as u64)
    }
}

#[async_trait]
impl ValuesPort for SqlitePort {
    async fn insert_values_multi_table(
        &self,
        by_table: BTreeMap<String, Vec<crate::model::DocumentValue>>,
    ) -> PortResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(map_err)?;
        for (table_name, rows) in &by_table {
            let sql = format!(
                "INSERT INTO {table_name} (id, document_id, schema_id, schema_element_id, position, value, created_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            );
            let mut stmt = tx.prepare(&sql).map_err(map_err)?;
            for v in rows {
                stmt.execute(rusqlite::params![
                    v.id.as_str(),
                    v.document_id.as_str(),
                    v.schema_id.as_str(),
                    v.schema_element_id.as_ref().map(|id| id.as_str()),
                    v.position,
                    v.value,
                    v.created_utc.to_rfc3339(),
                ])
                .map_err(map_err)?;
            }
        }
        tx.commit().map_err(map_err)?;
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &Id, table_names: &[String]) -> PortResult<()> {
        let conn = self.conn.lock().await;
        for table_name in table_names {
            let sql = format!("DELETE FROM {table_name} WHERE document_id = ?1");
            conn.execute(&sql, [document_id.as_str()]).map_err(map_err)?;
        }
        Ok(())
    }

    async fn delete_by_collection(&self, collection_id: &Id, table_names: &[String]) -> PortResult<()> {
        let conn = self.conn.lock().await;
        for table_name in table_names {
            let sql = format!(
                "DELETE FROM {table_name} WHERE document_id IN (SELECT id FROM documents WHERE collection_id = ?1)"
            );
            conn.execute(&sql, [collection_id.as_str()]).map_err(map_err)?;
        }
        Ok(())
    }

    async fn find_document_ids(&self, table_name: &str, condition: &FilterCondition) -> PortResult<BTreeSet<Id>> {
        let conn = self.conn.lock().await;
        let (clause, bound) = condition_clause(condition);
        let sql = format!("SELECT DISTINCT document_id FROM {table_name} WHERE {clause}");
        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let params: Vec<&dyn ToSql> = match &bound {
            Some(v) => vec![v as &dyn ToSql],
            None => vec![],
        };
        let rows = stmt
            .query_map(params.as_slice(), |row| row.get::<_, String>(0))
            .map_err(map_err)?;
        let mut out = BTreeSet::new();
        for r in rows {
            out.insert(Id::from_raw(r.map_err(map_err)?));
        }
        Ok(out)
    }
}

#[async_trait]
impl LabelsPort for SqlitePort {
    async fn create_many(&self, labels: &[Label]) -> PortResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(map_err)?;
        for l in labels {
            tx.execute(
                "INSERT INTO labels (id, collection_id, document_id, label_value) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    l.id.as_str(),
                    l.collection_id.as_ref().map(|id| id.as_str()),
                    l.document_id.as_ref().map(|id| id.as_str()),
                    l.label_value,
                ],
            )
            .map_err(map_err)?;
        }
        tx.commit().map_err(map_err)?;
        Ok(())
    }

    async fn document_ids_with_labels(
        &self,
        collection_id: Option<&Id>,
        labels: &BTreeSet<String>,
    ) -> PortResult<BTreeSet<Id>> {
        if labels.is_empty() {
            return Ok(BTreeSet::new());
        }
        let conn = self.conn.lock().await;
        let placeholders = (1..=labels.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let mut sql = format!(
            "SELECT document_id FROM labels WHERE document_id IS NOT NULL AND label_value IN ({placeholders})"
        );
        let mut params: Vec<&dyn ToSql> = labels.iter().map(|l| l as &dyn ToSql).collect();
        if let Some(cid) = collection_id {
            sql.push_str(&format!(" AND collection_id = ?{}", labels.len() + 1));
            params.push(cid.as_str() as &dyn ToSql);
        }
        sql.push_str(&format!(
            " GROUP BY document_id HAVING COUNT(DISTINCT label_value) = {}",
            labels.len()
        ));

        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let rows = stmt
            .query_map(params.as_slice(), |row| row.get::<_, String>(0))
            .map_err(map_err)?;
        let mut out = BTreeSet::new();
        for r in rows {
            out.insert(Id::from_raw(r.map_err(map_err)?));
        }
        Ok(out)
    }

    async fn for_document(&self, document_id: &Id) -> PortResult<Vec<Label>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, collection_id, document_id, label_value FROM labels WHERE document_id = ?1")
            .map_err(map_err)?;
        let rows = stmt
            .query_map([document_id.as_str()], |row| {
                Ok(Label {
                    id: Id::from_raw(row.get::<_, String>(0)?),
                    collection_id: row.get::<_, Option<String>>(1)?.map(Id::from_raw),
                    document_id: row.get::<_, Option<String>>(2)?.map(Id::from_raw),
                    label_value: row.get(3)?,
                })
            })
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn delete_for_document(&self, document_id: &Id) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM labels WHERE document_id = ?1", [document_id.as_str()])
            .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl TagsPort for SqlitePort {
    async fn create_many(&self, tags: &[Tag]) -> PortResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(map_err)?;
        for t in tags {
            tx.execute(
                "INSERT INTO tags (id, collection_id, document_id, key, value) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    t.id.as_str(),
                    t.collection_id.as_ref().map(|id| id.as_str()),
                    t.document_id.as_ref().map(|id| id.as_str()),
                    t.key,
                    t.value,
                ],
            )
            .map_err(map_err)?;
        }
        tx.commit().map_err(map_err)?;
        Ok(())
    }

    async fn document_ids_with_tags(
        &self,
        collection_id: Option<&Id>,
        tags: &BTreeMap<String, String>,
    ) -> PortResult<BTreeSet<Id>> {
        if tags.is_empty() {
            return Ok(BTreeSet::new());
        }
        let conn = self.conn.lock().await;
        let pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{k}\u{1}{v}")).collect();
        let placeholders = (1..=pairs.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let mut sql = format!(
            "SELECT document_id FROM tags WHERE document_id IS NOT NULL AND (key || char(1) || value) IN ({placeholders})"
        );
        let mut params: Vec<&dyn ToSql> = pairs.iter().map(|p| p as &dyn ToSql).collect();
        if let Some(cid) = collection_id {
            sql.push_str(&format!(" AND collection_id = ?{}", pairs.len() + 1));
            params.push(cid.as_str() as &dyn ToSql);
        }
        sql.push_str(&format!(
            " GROUP BY document_id HAVING COUNT(DISTINCT key || char(1) || value) = {}",
            pairs.len()
        ));

        let mut stmt = conn.prepare(&sql).map_err(map_err)?;
        let rows = stmt
            .query_map(params.as_slice(), |row| row.get::<_, String>(0))
            .map_err(map_err)?;
        let mut out = BTreeSet::new();
        for r in rows {
            out.insert(Id::from_raw(r.map_err(map_err)?));
        }
        Ok(out)
    }

    async fn for_document(&self, document_id: &Id) -> PortResult<Vec<Tag>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, collection_id, document_id, key, value FROM tags WHERE document_id = ?1")
            .map_err(map_err)?;
        let rows = stmt
            .query_map([document_id.as_str()], |row| {
                Ok(Tag {
                    id: Id::from_raw(row.get::<_, String>(0)?),
                    collection_id: row.get::<_, Option<String>>(1)?.map(Id::from_raw),
                    document_id: row.get::<_, Option<String>>(2)?.map(Id::from_raw),
                    key: row.get(3)?,
                    value: row.get(4)?,
                })
            })
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn delete_for_document(&self, document_id: &Id) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM tags WHERE document_id = ?1", [document_id.as_str()])
            .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl FieldConstraintsPort for SqlitePort {
    async fn list_for_collection(&self, collection_id: &Id) -> PortResult<Vec<FieldConstraint>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, collection_id, field_path, data_type, required, nullable, regex_pattern, min_value, max_value, min_length, max_length, allowed_values, array_element_type
                 FROM field_constraints WHERE collection_id = ?1",
            )
            .map_err(map_err)?;
        let rows = stmt
            .query_map([collection_id.as_str()], field_constraint_from_row)
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn upsert(&self, constraint: &FieldConstraint) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO field_constraints (id, collection_id, field_path, data_type, required, nullable, regex_pattern, min_value, max_value, min_length, max_length, allowed_values, array_element_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(collection_id, field_path) DO UPDATE SET
                data_type = excluded.data_type, required = excluded.required, nullable = excluded.nullable,
                regex_pattern = excluded.regex_pattern, min_value = excluded.min_value, max_value = excluded.max_value,
                min_length = excluded.min_length, max_length = excluded.max_length,
                allowed_values = excluded.allowed_values, array_element_type = excluded.array_element_type",
            rusqlite::params![
                constraint.id.as_str(),
                constraint.collection_id.as_str(),
                constraint.field_path,
                constraint.data_type.map(constraint_type_to_str),
                constraint.required,
                constraint.nullable,
                constraint.regex_pattern,
                constraint.min_value,
                constraint.max_value,
                constraint.min_length.map(|v| v as i64),
                constraint.max_length.map(|v| v as i64),
                json_col(&constraint.allowed_values),
                constraint.array_element_type.map(constraint_type_to_str),
            ],
        )
        .map_err(map_err)?;
        Ok(())
    }
}

fn field_constraint_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FieldConstraint> {
    Ok(FieldConstraint {
        id: Id::from_raw(row.get::<_, String>(0)?),
        collection_id: Id::from_raw(row.get::<_, String>(1)?),
        field_path: row.get(2)?,
        data_type: row.get::<_, Option<String>>(3)?.map(|s| constraint_type_from_str(&s)),
        required: row.get(4)?,
        nullable: row.get(5)?,
        regex_pattern: row.get(6)?,
        min_value: row.get(7)?,
        max_value: row.get(8)?,
        min_length: row.get::<_, Option<i64>>(9)?.map(|v| v as usize),
        max_length: row.get::<_, Option<i64>>(10)?.map(|v| v as usize),
        allowed_values: from_json_col(&row.get::<_, String>(11)?),
        array_element_type: row.get::<_, Option<String>>(12)?.map(|s| constraint_type_from_str(&s)),
    })
}

fn constraint_type_from_str(s: &str) -> ConstraintType {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(ConstraintType::String)
}

fn constraint_type_to_str(t: ConstraintType) -> &'static str {
    match t {
        ConstraintType::String => "string",
        ConstraintType::Integer => "integer",
        ConstraintType::Number => "number",
        ConstraintType::Boolean => "boolean",
        ConstraintType::Array => "array",
        ConstraintType::Object => "object",
    }
}

#[async_trait]
impl IndexedFieldsPort for SqlitePort {
    async fn list_for_collection(&self, collection_id: &Id) -> PortResult<Vec<IndexedField>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, collection_id, field_path FROM indexed_fields WHERE collection_id = ?1")
            .map_err(map_err)?;
        let rows = stmt
            .query_map([collection_id.as_str()], |row| {
                Ok(IndexedField {
                    id: Id::from_raw(row.get::<_, String>(0)?),
                    collection_id: Id::from_raw(row.get::<_, String>(1)?),
                    field_path: row.get(2)?,
                })
            })
            .map_err(map_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(map_err)?);
        }
        Ok(out)
    }

    async fn upsert(&self, field: &IndexedField) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO indexed_fields (id, collection_id, field_path) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection_id, field_path) DO NOTHING",
            rusqlite::params![field.id.as_str(), field.collection_id.as_str(), field.field_path],
        )
        .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectLocksPort for SqlitePort {
    async fn try_acquire(&self, lock: &ObjectLock) -> PortResult<std::result::Result<(), ObjectLock>> {
        let conn = self.conn.lock().await;
        let insert = conn.execute(
            "INSERT INTO object_locks (id, collection_id, document_name, hostname, created_utc) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                lock.id.as_str(),
                lock.collection_id.as_str(),
                lock.document_name,
                lock.hostname,
                lock.created_utc.to_rfc3339(),
            ],
        );
        match insert {
            Ok(_) => Ok(Ok(())),
            Err(e) => match map_err(e) {
                PortError::AlreadyExists => {
                    let existing = conn
                        .query_row(
                            "SELECT id, collection_id, document_name, hostname, created_utc FROM object_locks WHERE collection_id = ?1 AND document_name = ?2",
                            rusqlite::params![lock.collection_id.as_str(), lock.document_name],
                            |row| {
                                Ok(ObjectLock {
                                    id: Id::from_raw(row.get::<_, String>(0)?),
                                    collection_id: Id::from_raw(row.get::<_, String>(1)?),
                                    document_name: row.get(2)?,
                                    hostname: row.get(3)?,
                                    created_utc: row.get::<_, String>(4)?.parse().unwrap_or_else(|_| Utc::now()),
                                })
                            },
                        )
                        .map_err(map_err)?;
                    Ok(Err(existing))
                },
                other => Err(other),
            },
        }
    }

    async fn release(&self, collection_id: &Id, document_name: &str) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM object_locks WHERE collection_id = ?1 AND document_name = ?2",
            rusqlite::params![collection_id.as_str(), document_name],
        )
        .map_err(map_err)?;
        Ok(())
    }

    async fn release_by_id(&self, id: &Id) -> PortResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM object_locks WHERE id = ?1", [id.as_str()])
            .map_err(map_err)?;
        Ok(())
    }

    async fn delete_expired(&self, older_than_secs: u64) -> PortResult<u64> {
        let conn = self.conn.lock().await;
        let cutoff = (Utc::now() - chrono::Duration::seconds(older_than_secs as i64)).to_rfc3339();
        let affected = conn
            .execute("DELETE FROM object_locks WHERE created_utc < ?1", [cutoff])
            .map_err(map_err)?;
        Ok(affected as u64)
    }
}

impl RepositoryPort for SqlitePort {
    fn collections(&self) -> &dyn CollectionsPort {
        self
    }
    fn documents(&self) -> &dyn DocumentsPort {
        self
    }
    fn schemas(&self) -> &dyn SchemasPort {
        self
    }
    fn schema_elements(&self) -> &dyn SchemaElementsPort {
        self
    }
    fn indexes(&self) -> &dyn IndexesPort {
        self
    }
    fn values(&self) -> &dyn ValuesPort {
        self
    }
    fn labels(&self) -> &dyn LabelsPort {
        self
    }
    fn tags(&self) -> &dyn TagsPort {
        self
    }
    fn field_constraints(&self) -> &dyn FieldConstraintsPort {
        self
    }
    fn indexed_fields(&self) -> &dyn IndexedFieldsPort {
        self
    }
    fn object_locks(&self) -> &dyn ObjectLocksPort {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_collection() {
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

        let fetched = port.collections().get(&collection.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "widgets");
        assert_eq!(fetched.indexing_mode, IndexingMode::All);

        let by_name = port.collections().get_by_name("widgets").await.unwrap().unwrap();
        assert_eq!(by_name.id, collection.id);
    }

    #[tokio::test]
    async fn index_mapping_creation_races_resolve_to_the_same_table() {
        let port = SqlitePort::open_in_memory().unwrap();
        let catalog = crate::catalog::IndexCatalog::new(&port, 16);
        let a = catalog.resolve_table("name").await.unwrap();
        let b = catalog.resolve_table("name").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn object_lock_try_acquire_is_exclusive() {
        let port = SqlitePort::open_in_memory().unwrap();
        let registry = crate::lockreg::ObjectLockRegistry::new(&port);
        let collection_id = Id::from_raw("col_x");

        let first = registry.try_acquire(&collection_id, "report.json", "host-a").await.unwrap();
        assert!(first.is_ok());

        let second = registry.try_acquire(&collection_id, "report.json", "host-b").await.unwrap();
        assert!(second.is_err());
    }
}
