//! Table and partition registration against a Glue-style metadata catalog.
//!
//! The catalog itself is an external collaborator behind [`GlueCatalog`];
//! this module owns the create-or-skip decision for tables and the
//! create-or-update decision for partitions.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::file_date::FileDate;
use crate::storage_keys::{partition_suffix, table_location};

pub const PARQUET_INPUT_FORMAT: &str = "org.apache.hadoop.hive.ql.io.parquet.MapredParquetInputFormat";
pub const PARQUET_OUTPUT_FORMAT: &str =
    "org.apache.hadoop.hive.ql.io.parquet.MapredParquetOutputFormat";
pub const PARQUET_SERDE: &str = "org.apache.hadoop.hive.ql.io.parquet.serde.ParquetHiveSerDe";
pub const EXTERNAL_TABLE: &str = "EXTERNAL_TABLE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageDescriptor {
    pub columns: Vec<ColumnDef>,
    pub location: String,
    pub input_format: String,
    pub output_format: String,
    pub serialization_library: String,
    pub serde_parameters: BTreeMap<String, String>,
    pub number_of_buckets: i32,
}

impl StorageDescriptor {
    pub fn parquet(columns: Vec<ColumnDef>, location: String) -> Self {
        Self {
            columns,
            location,
            input_format: PARQUET_INPUT_FORMAT.to_string(),
            output_format: PARQUET_OUTPUT_FORMAT.to_string(),
            serialization_library: PARQUET_SERDE.to_string(),
            serde_parameters: BTreeMap::from([(
                "serialization.format".to_string(),
                "1".to_string(),
            )]),
            number_of_buckets: -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDescriptor {
    pub database: String,
    pub table_name: String,
    pub storage: StorageDescriptor,
    pub partition_keys: Vec<ColumnDef>,
    pub table_type: String,
    pub parameters: BTreeMap<String, String>,
}

impl TableDescriptor {
    fn external_parquet(
        database: &str,
        table_name: &str,
        columns: Vec<ColumnDef>,
        location: String,
        partition_keys: Vec<ColumnDef>,
    ) -> Self {
        Self {
            database: database.to_string(),
            table_name: table_name.to_string(),
            storage: StorageDescriptor::parquet(columns, location),
            partition_keys,
            table_type: EXTERNAL_TABLE.to_string(),
            parameters: BTreeMap::from([("classification".to_string(), "parquet".to_string())]),
        }
    }
}

pub fn date_version_partition_keys() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("yyyy", "int"),
        ColumnDef::new("mm", "int"),
        ColumnDef::new("dd", "int"),
        ColumnDef::new("version_number", "int"),
    ]
}

/// Converted allocation rows, partitioned by file date and load version.
pub fn asset_alloc_table(
    database: &str,
    table_name: &str,
    bucket: &str,
    base_location: &str,
) -> TableDescriptor {
    TableDescriptor::external_parquet(
        database,
        table_name,
        vec![
            ColumnDef::new("amount", "double"),
            ColumnDef::new("amount_type", "varchar(75)"),
            ColumnDef::new("level", "double"),
            ColumnDef::new("wal_nm", "int"),
            ColumnDef::new("pfg_ast_clss_nm", "varchar(75)"),
            ColumnDef::new("pfg_sblvl_1_nm", "varchar(75)"),
            ColumnDef::new("pfg_sblvl_1_5_nm", "varchar(75)"),
            ColumnDef::new("pfg_sblvl_2_nm", "varchar(75)"),
            ColumnDef::new("pfg_sblvl_3_nm", "varchar(75)"),
            ColumnDef::new("pfg_sblvl_4_nm", "varchar(75)"),
        ],
        table_location(bucket, base_location),
        date_version_partition_keys(),
    )
}

/// One row per successful load. Unpartitioned; `version_number` is a plain
/// column here.
pub fn load_metadata_table(
    database: &str,
    table_name: &str,
    bucket: &str,
    base_location: &str,
) -> TableDescriptor {
    TableDescriptor::external_parquet(
        database,
        table_name,
        vec![
            ColumnDef::new("file_name", "varchar"),
            ColumnDef::new("version_number", "int"),
            ColumnDef::new("insertion_date", "timestamp"),
            ColumnDef::new("etag", "varchar"),
            ColumnDef::new("file_date", "date"),
            ColumnDef::new("status", "varchar"),
        ],
        table_location(bucket, base_location),
        Vec::new(),
    )
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub version_number: u32,
}

impl PartitionKey {
    pub fn new(date: FileDate, version_number: u32) -> Self {
        Self {
            year: date.year,
            month: date.month,
            day: date.day,
            version_number,
        }
    }

    pub fn date(&self) -> FileDate {
        FileDate {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    /// Catalog partition values, in partition-key order.
    pub fn values(&self) -> Vec<String> {
        vec![
            format!("{:04}", self.year),
            format!("{:02}", self.month),
            format!("{:02}", self.day),
            self.version_number.to_string(),
        ]
    }

    /// Parses catalog values numerically, so `"01"` and `"1"` name the same
    /// partition.
    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Result<Self, CatalogError> {
        let [year, month, day, version] = values else {
            return Err(CatalogError::Invalid(format!(
                "expected 4 partition values, found {}",
                values.len()
            )));
        };
        Ok(Self {
            year: parse_value(year.as_ref())?,
            month: parse_value(month.as_ref())?,
            day: parse_value(day.as_ref())?,
            version_number: parse_value(version.as_ref())?,
        })
    }
}

fn parse_value<T: FromStr>(raw: &str) -> Result<T, CatalogError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| CatalogError::Invalid(format!("partition value '{raw}'")))
}

pub const OWNER_OBJECT_PARAMETER: &str = "source_object_key";
pub const OWNER_ETAG_PARAMETER: &str = "source_etag";

/// The upload a partition version was reserved for, stored as partition
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionOwner {
    pub object_key: String,
    pub etag: String,
}

impl PartitionOwner {
    pub fn new(object_key: impl Into<String>, etag: impl Into<String>) -> Self {
        Self {
            object_key: object_key.into(),
            etag: etag.into(),
        }
    }

    pub fn to_parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (OWNER_OBJECT_PARAMETER.to_string(), self.object_key.clone()),
            (OWNER_ETAG_PARAMETER.to_string(), self.etag.clone()),
        ])
    }

    pub fn from_parameters<'a>(
        parameters: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Option<Self> {
        let mut object_key = None;
        let mut etag = None;
        for (name, value) in parameters {
            match name.as_str() {
                OWNER_OBJECT_PARAMETER => object_key = Some(value.clone()),
                OWNER_ETAG_PARAMETER => etag = Some(value.clone()),
                _ => {}
            }
        }
        Some(Self {
            object_key: object_key?,
            etag: etag?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partition {
    pub key: PartitionKey,
    /// Values exactly as registered; updates must address the partition by
    /// these rather than by the padded form of `key`.
    pub values: Vec<String>,
    pub storage: StorageDescriptor,
    pub owner: Option<PartitionOwner>,
}

impl Partition {
    pub fn new(key: PartitionKey, storage: StorageDescriptor, owner: Option<PartitionOwner>) -> Self {
        Self {
            key,
            values: key.values(),
            storage,
            owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog entity already exists: {0}")]
    AlreadyExists(String),
    #[error("catalog entity not found: {0}")]
    NotFound(String),
    #[error("catalog request failed: {0}")]
    Transient(String),
    #[error("invalid catalog data: {0}")]
    Invalid(String),
    #[error("partition conflict: {0}")]
    Conflict(String),
}

pub trait GlueCatalog {
    fn database_exists(&self, database: &str) -> Result<bool, CatalogError>;
    fn create_database(&self, database: &str) -> Result<(), CatalogError>;
    fn table_exists(&self, database: &str, table: &str) -> Result<bool, CatalogError>;
    fn create_table(&self, descriptor: &TableDescriptor) -> Result<(), CatalogError>;
    fn get_table(&self, database: &str, table: &str) -> Result<TableDescriptor, CatalogError>;
    fn list_partitions(&self, database: &str, table: &str) -> Result<Vec<Partition>, CatalogError>;
    /// Must fail with [`CatalogError::AlreadyExists`] when the key is taken.
    fn create_partition(
        &self,
        database: &str,
        table: &str,
        partition: &Partition,
    ) -> Result<(), CatalogError>;
    fn update_partition(
        &self,
        database: &str,
        table: &str,
        partition: &Partition,
    ) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TableProvision {
    CreatedDatabaseAndTable,
    CreatedTable,
    Existing,
    /// A concurrent create won between the existence check and our create.
    AlreadyExisted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartitionWrite {
    Created,
    Updated,
}

pub fn ensure_table(
    catalog: &impl GlueCatalog,
    descriptor: &TableDescriptor,
) -> Result<TableProvision, CatalogError> {
    let database = descriptor.database.as_str();
    let table = descriptor.table_name.as_str();

    if !catalog.database_exists(database)? {
        match catalog.create_database(database) {
            Ok(()) => info!(database, "glue database created"),
            Err(CatalogError::AlreadyExists(_)) => {
                warn!(database, "glue database appeared concurrently")
            }
            Err(error) => return Err(error),
        }
        return Ok(match create_table_tolerant(catalog, descriptor)? {
            TableProvision::CreatedTable => TableProvision::CreatedDatabaseAndTable,
            other => other,
        });
    }

    if !catalog.table_exists(database, table)? {
        return create_table_tolerant(catalog, descriptor);
    }

    Ok(TableProvision::Existing)
}

fn create_table_tolerant(
    catalog: &impl GlueCatalog,
    descriptor: &TableDescriptor,
) -> Result<TableProvision, CatalogError> {
    match catalog.create_table(descriptor) {
        Ok(()) => {
            info!(
                database = %descriptor.database,
                table = %descriptor.table_name,
                "glue table created"
            );
            Ok(TableProvision::CreatedTable)
        }
        Err(CatalogError::AlreadyExists(_)) => {
            warn!(
                database = %descriptor.database,
                table = %descriptor.table_name,
                "glue table already exists"
            );
            Ok(TableProvision::AlreadyExisted)
        }
        Err(error) => Err(error),
    }
}

fn partition_at(table: &TableDescriptor, key: PartitionKey, owner: &PartitionOwner) -> Partition {
    let mut storage = table.storage.clone();
    storage.location = format!(
        "{}/{}",
        table.storage.location.trim_end_matches('/'),
        partition_suffix(&key)
    );
    Partition::new(key, storage, Some(owner.clone()))
}

fn find_partition(
    catalog: &impl GlueCatalog,
    database: &str,
    table: &str,
    key: PartitionKey,
) -> Result<Option<Partition>, CatalogError> {
    Ok(catalog
        .list_partitions(database, table)?
        .into_iter()
        .find(|existing| existing.key == key))
}

fn ensure_owner(existing: &Partition, owner: &PartitionOwner) -> Result<(), CatalogError> {
    if existing.owner.as_ref() == Some(owner) {
        return Ok(());
    }
    let holder = existing
        .owner
        .as_ref()
        .map_or("an unknown load", |holder| holder.object_key.as_str());
    Err(CatalogError::Conflict(format!(
        "partition {:?} belongs to {holder}, not {}",
        existing.values, owner.object_key
    )))
}

/// Registers `key` on the table for `owner`, copying the table's live
/// storage descriptor with the location rewritten to the partition path.
///
/// An existing partition is only updated when `owner` reserved it. Creation
/// is a conditional write: when another writer creates the key between our
/// listing and our create, its owner decides between an update and a
/// [`CatalogError::Conflict`].
pub fn upsert_partition(
    catalog: &impl GlueCatalog,
    descriptor: &TableDescriptor,
    key: PartitionKey,
    owner: &PartitionOwner,
) -> Result<PartitionWrite, CatalogError> {
    let database = descriptor.database.as_str();
    let table_name = descriptor.table_name.as_str();

    let table = catalog.get_table(database, table_name)?;
    let mut partition = partition_at(&table, key, owner);

    let existing = match find_partition(catalog, database, table_name, key)? {
        Some(existing) => existing,
        None => match catalog.create_partition(database, table_name, &partition) {
            Ok(()) => {
                info!(database, table = table_name, ?key, "partition created");
                return Ok(PartitionWrite::Created);
            }
            Err(CatalogError::AlreadyExists(_)) => {
                warn!(database, table = table_name, ?key, "partition created concurrently");
                find_partition(catalog, database, table_name, key)?.ok_or_else(|| {
                    CatalogError::NotFound(format!("{database}.{table_name} {key:?}"))
                })?
            }
            Err(error) => return Err(error),
        },
    };

    ensure_owner(&existing, owner)?;
    partition.values = existing.values;
    catalog.update_partition(database, table_name, &partition)?;
    info!(database, table = table_name, ?key, "partition updated");
    Ok(PartitionWrite::Updated)
}

/// Fresh reservations give up after this many versions were taken by
/// concurrent loads.
pub const MAX_RESERVATION_ATTEMPTS: usize = 5;

/// Claims a load version for `date` by creating its partition for `owner`.
///
/// A `requested` version (a re-run that already holds one) is re-claimed
/// through [`upsert_partition`]. Otherwise the next free version is created
/// conditionally; losing the create to a concurrent load moves on to the
/// version after it.
pub fn reserve_partition(
    catalog: &impl GlueCatalog,
    descriptor: &TableDescriptor,
    date: FileDate,
    requested: Option<u32>,
    owner: &PartitionOwner,
) -> Result<PartitionKey, CatalogError> {
    if let Some(version) = requested {
        let key = PartitionKey::new(date, version);
        upsert_partition(catalog, descriptor, key, owner)?;
        return Ok(key);
    }

    let database = descriptor.database.as_str();
    let table_name = descriptor.table_name.as_str();
    let table = catalog.get_table(database, table_name)?;

    for _ in 0..MAX_RESERVATION_ATTEMPTS {
        let partitions = catalog.list_partitions(database, table_name)?;
        let key = PartitionKey::new(date, next_version(&partitions, date));
        match catalog.create_partition(database, table_name, &partition_at(&table, key, owner)) {
            Ok(()) => {
                info!(database, table = table_name, ?key, "partition version reserved");
                return Ok(key);
            }
            Err(CatalogError::AlreadyExists(_)) => {
                warn!(database, table = table_name, ?key, "version taken concurrently, retrying");
            }
            Err(error) => return Err(error),
        }
    }

    Err(CatalogError::Conflict(format!(
        "no free version for {} after {MAX_RESERVATION_ATTEMPTS} attempts",
        date.iso()
    )))
}

/// Next load version for `date`: one past the highest registered version,
/// starting at 1.
pub fn next_version(partitions: &[Partition], date: FileDate) -> u32 {
    partitions
        .iter()
        .filter(|partition| partition.key.date() == date)
        .map(|partition| partition.key.version_number)
        .max()
        .map_or(1, |latest| latest.saturating_add(1))
}
