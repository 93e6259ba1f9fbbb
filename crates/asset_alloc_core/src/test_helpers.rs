//! In-memory collaborators for tests of this crate and its dependents.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use crate::alert::{AlertPublisher, PublishError};
use crate::catalog::{CatalogError, GlueCatalog, Partition, TableDescriptor};
use crate::object_store::{ObjectStore, ObjectSummary, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    copies: AtomicUsize,
    corrupt_copies: bool,
}

impl MemoryObjectStore {
    /// Every copy writes altered bytes, so digest verification fails.
    pub fn corrupt_copies(mut self) -> Self {
        self.corrupt_copies = true;
        self
    }

    pub fn insert(&self, key: &str, body: &[u8]) {
        lock(&self.objects).insert(key.to_string(), body.to_vec());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.object(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        lock(&self.objects).insert(key.to_string(), body);
        Ok(())
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StoreError> {
        Ok(lock(&self.objects)
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, body)| summary(key, body))
            .collect())
    }

    fn head_object(&self, key: &str) -> Result<Option<ObjectSummary>, StoreError> {
        Ok(lock(&self.objects).get(key).map(|body| summary(key, body)))
    }

    fn copy_object(&self, source_key: &str, destination_key: &str) -> Result<(), StoreError> {
        let mut objects = lock(&self.objects);
        let mut body = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(source_key.to_string()))?;
        if self.corrupt_copies {
            body.push(0);
        }
        objects.insert(destination_key.to_string(), body);
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.objects).remove(key);
        Ok(())
    }
}

fn summary(key: &str, body: &[u8]) -> ObjectSummary {
    ObjectSummary {
        key: key.to_string(),
        size: body.len() as u64,
        etag: Some(format!("{:x}", Sha256::digest(body))),
    }
}

type TableId = (String, String);

#[derive(Default)]
struct CatalogState {
    databases: BTreeSet<String>,
    tables: BTreeMap<TableId, TableDescriptor>,
    /// Keyed by the raw registered values, as Glue addresses partitions.
    partitions: BTreeMap<TableId, BTreeMap<Vec<String>, Partition>>,
}

/// Glue stand-in. Clones share state, so a clone with a lookup fault can
/// play a racing writer against the original.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
    hide_tables: bool,
    stale_listings: Arc<AtomicUsize>,
    failure: Option<CatalogError>,
}

impl MemoryCatalog {
    /// `table_exists` always answers false, so every create races.
    pub fn hide_tables_from_lookup(mut self) -> Self {
        self.hide_tables = true;
        self
    }

    /// A view whose first partition listing comes back empty, as if taken
    /// just before another writer registered its partitions.
    pub fn with_stale_partition_listing(&self) -> Self {
        Self {
            stale_listings: Arc::new(AtomicUsize::new(1)),
            ..self.clone()
        }
    }

    /// Every existence check fails with `error`.
    pub fn fail_with(mut self, error: CatalogError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn replace_table(&self, descriptor: TableDescriptor) {
        lock(&self.state).tables.insert(
            (descriptor.database.clone(), descriptor.table_name.clone()),
            descriptor,
        );
    }

    pub fn table_ids(&self) -> Vec<(String, String)> {
        lock(&self.state).tables.keys().cloned().collect()
    }

    fn check_failure(&self) -> Result<(), CatalogError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn table_id(database: &str, table: &str) -> TableId {
    (database.to_string(), table.to_string())
}

impl GlueCatalog for MemoryCatalog {
    fn database_exists(&self, database: &str) -> Result<bool, CatalogError> {
        self.check_failure()?;
        Ok(lock(&self.state).databases.contains(database))
    }

    fn create_database(&self, database: &str) -> Result<(), CatalogError> {
        if !lock(&self.state).databases.insert(database.to_string()) {
            return Err(CatalogError::AlreadyExists(database.to_string()));
        }
        Ok(())
    }

    fn table_exists(&self, database: &str, table: &str) -> Result<bool, CatalogError> {
        self.check_failure()?;
        if self.hide_tables {
            return Ok(false);
        }
        Ok(lock(&self.state).tables.contains_key(&table_id(database, table)))
    }

    fn create_table(&self, descriptor: &TableDescriptor) -> Result<(), CatalogError> {
        let mut state = lock(&self.state);
        if !state.databases.contains(&descriptor.database) {
            return Err(CatalogError::NotFound(descriptor.database.clone()));
        }
        let id = table_id(&descriptor.database, &descriptor.table_name);
        if state.tables.contains_key(&id) {
            return Err(CatalogError::AlreadyExists(descriptor.table_name.clone()));
        }
        state.tables.insert(id, descriptor.clone());
        Ok(())
    }

    fn get_table(&self, database: &str, table: &str) -> Result<TableDescriptor, CatalogError> {
        lock(&self.state)
            .tables
            .get(&table_id(database, table))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("{database}.{table}")))
    }

    fn list_partitions(&self, database: &str, table: &str) -> Result<Vec<Partition>, CatalogError> {
        let state = lock(&self.state);
        let id = table_id(database, table);
        if !state.tables.contains_key(&id) {
            return Err(CatalogError::NotFound(format!("{database}.{table}")));
        }
        let stale = self
            .stale_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(Vec::new());
        }
        Ok(state
            .partitions
            .get(&id)
            .map(|partitions| partitions.values().cloned().collect())
            .unwrap_or_default())
    }

    fn create_partition(
        &self,
        database: &str,
        table: &str,
        partition: &Partition,
    ) -> Result<(), CatalogError> {
        let mut state = lock(&self.state);
        let partitions = state.partitions.entry(table_id(database, table)).or_default();
        if partitions.contains_key(&partition.values) {
            return Err(CatalogError::AlreadyExists(format!("{:?}", partition.values)));
        }
        partitions.insert(partition.values.clone(), partition.clone());
        Ok(())
    }

    fn update_partition(
        &self,
        database: &str,
        table: &str,
        partition: &Partition,
    ) -> Result<(), CatalogError> {
        let mut state = lock(&self.state);
        let existing = state
            .partitions
            .get_mut(&table_id(database, table))
            .and_then(|partitions| partitions.get_mut(&partition.values))
            .ok_or_else(|| CatalogError::NotFound(format!("{:?}", partition.values)))?;
        *existing = partition.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// `(subject, message)` pairs in publish order.
    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.published).clone()
    }
}

impl AlertPublisher for RecordingPublisher {
    fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError> {
        if self.failing {
            return Err(PublishError::Request("topic unavailable".to_string()));
        }
        lock(&self.published).push((subject.to_string(), message.to_string()));
        Ok(())
    }
}
