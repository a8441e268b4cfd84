//! Record persistence as seen by the gate, plus an in-memory implementation.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::{
    auth::{Authenticator, Session},
    config::PluginSettings,
    native,
    record::{AuthRecord, NewRecord, RecordFilter, RecordId, RecordPatch},
    schema::{CollectionConfig, HostConfig},
};

/// Errors returned by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No authenticatable collection with this slug exists.
    #[error("unknown collection `{0}`")]
    UnknownCollection(String),
    /// The record does not exist.
    #[error("record {0} not found")]
    NotFound(RecordId),
    /// Another record already uses this identifier.
    #[error("identifier `{0}` is already taken")]
    DuplicateIdentifier(String),
    /// The caller may not write this field.
    #[error("field `{0}` cannot be updated by this caller")]
    Forbidden(String),
    /// The patch precondition no longer holds.
    #[error("record {0} was changed concurrently")]
    Conflict(RecordId),
    /// The patch would leave the migration fields inconsistent.
    #[error("invalid patch for record {0}: {1}")]
    Invalid(RecordId, &'static str),
    /// Hashing the new native credential failed.
    #[error("failed to hash credential: {0}")]
    Hashing(password_hash::Error),
    /// Any other backend failure.
    #[error("record store failure: {0}")]
    Backend(String),
}

/// Options for [`RecordStore::find`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Return hidden fields such as the legacy hash.
    pub include_hidden: bool,
    /// Relationship population depth.
    pub depth: u8,
}

/// Who is asking for a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Caller {
    /// Trusted server-side code; field access rules do not apply.
    #[default]
    System,
    /// An end user going through the regular update API.
    User,
}

/// Options for [`RecordStore::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Return hidden fields in the updated record.
    pub include_hidden: bool,
    /// Relationship population depth.
    pub depth: u8,
    /// Whose access rules apply.
    pub caller: Caller,
}

/// The record operations the migration gate needs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every record of `collection` that matches `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lookup itself fails.
    async fn find(
        &self,
        collection: &str,
        filter: &RecordFilter,
        options: FindOptions,
    ) -> Result<Vec<AuthRecord>, StoreError>;

    /// Applies `patch` to one record and returns the result. A plaintext
    /// password in the patch is stored in native form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the patch precondition fails and
    /// other [`StoreError`]s when the write is rejected or fails.
    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: RecordPatch,
        options: WriteOptions,
    ) -> Result<AuthRecord, StoreError>;
}

/// Argon2 is slow on purpose; keep it off the executor threads.
async fn hash_credential(password: Zeroizing<String>) -> Result<String, StoreError> {
    tokio::task::spawn_blocking(move || native::hash_password(&password))
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))?
        .map_err(StoreError::Hashing)
}

async fn verify_credential(password: &str, credential: String) -> Result<bool, StoreError> {
    let password = Zeroizing::new(password.to_owned());
    tokio::task::spawn_blocking(move || native::verify_password(&password, &credential))
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))
}

struct Collection {
    schema: CollectionConfig,
    records: HashMap<RecordId, AuthRecord>,
}

/// Keeps authenticatable collections in memory.
pub struct InMemoryRecordStore {
    collections: RwLock<HashMap<String, Collection>>,
    migrate_field: String,
    hash_field: String,
    updates: AtomicUsize,
}

impl InMemoryRecordStore {
    /// Creates an empty store for every collection in `config` with
    /// authentication enabled.
    #[must_use]
    pub fn new(config: &HostConfig, settings: &PluginSettings) -> Self {
        let collections = config
            .collections
            .iter()
            .filter(|collection| collection.auth)
            .map(|schema| {
                let collection = Collection {
                    schema: schema.clone(),
                    records: HashMap::new(),
                };
                (schema.slug.clone(), collection)
            })
            .collect();

        Self {
            collections: RwLock::new(collections),
            migrate_field: settings.migrate_field.clone(),
            hash_field: settings.hash_field.clone(),
            updates: AtomicUsize::new(0),
        }
    }

    /// Adds a record. A non-empty legacy hash marks it for migration.
    ///
    /// # Errors
    ///
    /// Fails for unknown collections, duplicate identifiers and hashing
    /// errors.
    pub async fn insert(
        &self,
        collection: &str,
        record: NewRecord,
    ) -> Result<AuthRecord, StoreError> {
        let credential = match record.password {
            Some(password) => hash_credential(Zeroizing::new(password)).await?,
            None => String::new(),
        };
        let legacy_hash = record.legacy_hash.filter(|hash| !hash.is_empty());

        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_owned()))?;

        if target
            .records
            .values()
            .any(|existing| existing.identifier == record.identifier)
        {
            return Err(StoreError::DuplicateIdentifier(record.identifier));
        }

        let created = AuthRecord {
            id: RecordId::new(),
            identifier: record.identifier,
            credential,
            migration_pending: legacy_hash.is_some(),
            legacy_hash,
        };
        target.records.insert(created.id, created.clone());

        Ok(created)
    }

    /// Reads one record including hidden fields.
    pub async fn get(&self, collection: &str, id: RecordId) -> Option<AuthRecord> {
        let collections = self.collections.read().await;
        collections.get(collection)?.records.get(&id).cloned()
    }

    /// Number of successful updates since creation.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check_access(&self, schema: &CollectionConfig, patch: &RecordPatch) -> Result<(), StoreError> {
        let touched = [
            (&self.migrate_field, patch.migration_pending.is_some()),
            (&self.hash_field, patch.legacy_hash.is_some()),
        ];

        for (name, is_touched) in touched {
            let allowed = schema.field(name).is_some_and(|field| field.access.update);
            if is_touched && !allowed {
                return Err(StoreError::Forbidden(name.clone()));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find(
        &self,
        collection: &str,
        filter: &RecordFilter,
        options: FindOptions,
    ) -> Result<Vec<AuthRecord>, StoreError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_owned()))?;

        let found = target
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .map(|record| {
                if options.include_hidden {
                    record
                } else {
                    record.without_hidden()
                }
            })
            .collect();

        Ok(found)
    }

    async fn update(
        &self,
        collection: &str,
        id: RecordId,
        patch: RecordPatch,
        options: WriteOptions,
    ) -> Result<AuthRecord, StoreError> {
        // Hash outside the lock.
        let credential = match &patch.password {
            Some(password) => Some(hash_credential(password.clone()).await?),
            None => None,
        };

        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_owned()))?;

        if options.caller == Caller::User && patch.touches_migration_fields() {
            self.check_access(&target.schema, &patch)?;
        }

        let record = target.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if let Some(expected) = patch.expect_migration_pending {
            if record.migration_pending != expected {
                return Err(StoreError::Conflict(id));
            }
        }

        // A migrated record keeps no legacy hash; a pending one must have one.
        let migration_pending = patch.migration_pending.unwrap_or(record.migration_pending);
        let legacy_hash = match patch.legacy_hash {
            Some(hash) => Some(hash).filter(|hash| !hash.is_empty()),
            None => record.legacy_hash.clone(),
        }
        .filter(|_| migration_pending);
        if migration_pending && legacy_hash.is_none() {
            return Err(StoreError::Invalid(id, "pending migration without a legacy hash"));
        }

        if let Some(credential) = credential {
            record.credential = credential;
        }
        record.migration_pending = migration_pending;
        record.legacy_hash = legacy_hash;
        self.updates.fetch_add(1, Ordering::SeqCst);

        let updated = record.clone();
        Ok(if options.include_hidden {
            updated
        } else {
            updated.without_hidden()
        })
    }
}

#[async_trait]
impl Authenticator for InMemoryRecordStore {
    async fn login(
        &self,
        collection: &str,
        identifier: &str,
        password: &str,
    ) -> Result<Option<Session>, StoreError> {
        let record = {
            let collections = self.collections.read().await;
            let target = collections
                .get(collection)
                .ok_or_else(|| StoreError::UnknownCollection(collection.to_owned()))?;
            target
                .records
                .values()
                .find(|record| record.identifier == identifier)
                .cloned()
        };

        let Some(record) = record else {
            return Ok(None);
        };
        if !verify_credential(password, record.credential).await? {
            return Ok(None);
        }

        Ok(Some(Session::issue(record.id)))
    }
}
