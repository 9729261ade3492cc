//! Object Lock Registry (C11, §4.9).
//!
//! Existence of an [`ObjectLock`] row *is* the lock: `Free -> Held -> Free`
//! per `(collection_id, document_name)`, with the `Free -> Held` edge made
//! atomic by the Port's unique constraint on that pair.

use chrono::Utc;

use crate::error::Result;
use crate::id::{Id, IdKind};
use crate::model::ObjectLock;
use crate::port::{PortError, RepositoryPort};

pub struct ObjectLockRegistry<'a> {
    port: &'a dyn RepositoryPort,
}

impl<'a> ObjectLockRegistry<'a> {
    pub fn new(port: &'a dyn RepositoryPort) -> Self {
        Self { port }
    }

    /// `Ok(Ok(()))` on success; `Ok(Err(existing))` when the pair is
    /// already held by someone else (§4.9: "returns the existing lock as
    /// blocked").
    #[tracing::instrument(skip(self), fields(%collection_id, %document_name))]
    pub async fn try_acquire(
        &self,
        collection_id: &Id,
        document_name: &str,
        hostname: &str,
    ) -> Result<std::result::Result<(), ObjectLock>> {
        let lock = ObjectLock {
            id: Id::new(IdKind::ObjectLock),
            collection_id: collection_id.clone(),
            document_name: document_name.to_string(),
            hostname: hostname.to_string(),
            created_utc: Utc::now(),
        };

        match self.port.object_locks().try_acquire(&lock).await {
            Ok(Ok(())) => {
                tracing::debug!("lock acquired");
                Ok(Ok(()))
            },
            Ok(Err(existing)) => {
                tracing::warn!(held_by = %existing.hostname, "lock contention");
                Ok(Err(existing))
            },
            Err(PortError::AlreadyExists) => {
                // The Port may surface the race as AlreadyExists instead of
                // returning the winner's row directly; either is valid per
                // §5, so fetch nothing further and treat it as contention
                // without a known holder.
                Ok(Err(ObjectLock {
                    id: Id::from_raw(""),
                    collection_id: collection_id.clone(),
                    document_name: document_name.to_string(),
                    hostname: "unknown".to_string(),
                    created_utc: Utc::now(),
                }))
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn release(&self, collection_id: &Id, document_name: &str) -> Result<()> {
        self.port.object_locks().release(collection_id, document_name).await?;
        Ok(())
    }

    pub async fn release_by_id(&self, id: &Id) -> Result<()> {
        self.port.object_locks().release_by_id(id).await?;
        Ok(())
    }

    /// Removes locks older than `expiration_seconds`. Returns the number
    /// removed.
    pub async fn delete_expired(&self, expiration_seconds: u64) -> Result<u64> {
        Ok(self.port.object_locks().delete_expired(expiration_seconds).await?)
    }
}
