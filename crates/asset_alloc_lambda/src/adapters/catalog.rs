use std::collections::{BTreeMap, HashMap};

use asset_alloc_core::catalog::{
    CatalogError, ColumnDef, GlueCatalog, Partition, PartitionKey, PartitionOwner,
    StorageDescriptor, TableDescriptor,
};
use aws_sdk_glue::error::DisplayErrorContext;
use aws_sdk_glue::types;

use super::block_on;

/// AWS Glue Data Catalog as a [`GlueCatalog`].
#[derive(Clone)]
pub struct GlueCatalogClient {
    client: aws_sdk_glue::Client,
}

impl GlueCatalogClient {
    pub fn new(client: aws_sdk_glue::Client) -> Self {
        Self { client }
    }
}

fn transient(action: &str, target: &str, error: impl std::error::Error) -> CatalogError {
    CatalogError::Transient(format!(
        "glue {action} '{target}' failed: {}",
        DisplayErrorContext(error)
    ))
}

fn invalid(error: impl std::fmt::Display) -> CatalogError {
    CatalogError::Invalid(error.to_string())
}

fn to_glue_columns(columns: &[ColumnDef]) -> Result<Vec<types::Column>, CatalogError> {
    columns
        .iter()
        .map(|column| {
            types::Column::builder()
                .name(&column.name)
                .r#type(&column.data_type)
                .build()
                .map_err(invalid)
        })
        .collect()
}

fn to_glue_storage(storage: &StorageDescriptor) -> Result<types::StorageDescriptor, CatalogError> {
    let serde_info = types::SerDeInfo::builder()
        .serialization_library(&storage.serialization_library)
        .set_parameters(Some(
            storage
                .serde_parameters
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect::<HashMap<_, _>>(),
        ))
        .build();

    Ok(types::StorageDescriptor::builder()
        .set_columns(Some(to_glue_columns(&storage.columns)?))
        .location(&storage.location)
        .input_format(&storage.input_format)
        .output_format(&storage.output_format)
        .serde_info(serde_info)
        .number_of_buckets(storage.number_of_buckets)
        .build())
}

fn from_glue_columns(columns: &[types::Column]) -> Vec<ColumnDef> {
    columns
        .iter()
        .map(|column| ColumnDef {
            name: column.name().to_string(),
            data_type: column.r#type().unwrap_or_default().to_string(),
        })
        .collect()
}

fn from_glue_storage(storage: Option<&types::StorageDescriptor>) -> StorageDescriptor {
    let Some(storage) = storage else {
        return StorageDescriptor::parquet(Vec::new(), String::new());
    };
    let serde_info = storage.serde_info();
    StorageDescriptor {
        columns: from_glue_columns(storage.columns()),
        location: storage.location().unwrap_or_default().to_string(),
        input_format: storage.input_format().unwrap_or_default().to_string(),
        output_format: storage.output_format().unwrap_or_default().to_string(),
        serialization_library: serde_info
            .and_then(|info| info.serialization_library())
            .unwrap_or_default()
            .to_string(),
        serde_parameters: serde_info
            .and_then(|info| info.parameters())
            .map(|parameters| {
                parameters
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default(),
        number_of_buckets: storage.number_of_buckets(),
    }
}

fn partition_input(partition: &Partition) -> Result<types::PartitionInput, CatalogError> {
    Ok(types::PartitionInput::builder()
        .set_values(Some(partition.values.clone()))
        .storage_descriptor(to_glue_storage(&partition.storage)?)
        .set_parameters(partition.owner.as_ref().map(|owner| {
            owner
                .to_parameters()
                .into_iter()
                .collect::<HashMap<_, _>>()
        }))
        .build())
}

fn from_glue_partition(partition: &types::Partition) -> Result<Partition, CatalogError> {
    Ok(Partition {
        key: PartitionKey::from_values(partition.values())?,
        values: partition.values().to_vec(),
        storage: from_glue_storage(partition.storage_descriptor()),
        owner: partition
            .parameters()
            .and_then(|parameters| PartitionOwner::from_parameters(parameters)),
    })
}

impl GlueCatalog for GlueCatalogClient {
    fn database_exists(&self, database: &str) -> Result<bool, CatalogError> {
        let request = self.client.get_database().name(database);
        block_on(async move {
            match request.send().await {
                Ok(_) => Ok(true),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_entity_not_found_exception()) =>
                {
                    Ok(false)
                }
                Err(error) => Err(transient("get_database", database, error)),
            }
        })
    }

    fn create_database(&self, database: &str) -> Result<(), CatalogError> {
        let input = types::DatabaseInput::builder()
            .name(database)
            .build()
            .map_err(invalid)?;
        let request = self.client.create_database().database_input(input);
        block_on(async move {
            match request.send().await {
                Ok(_) => Ok(()),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_already_exists_exception()) =>
                {
                    Err(CatalogError::AlreadyExists(database.to_string()))
                }
                Err(error) => Err(transient("create_database", database, error)),
            }
        })
    }

    fn table_exists(&self, database: &str, table: &str) -> Result<bool, CatalogError> {
        match self.get_table(database, table) {
            Ok(_) => Ok(true),
            Err(CatalogError::NotFound(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn create_table(&self, descriptor: &TableDescriptor) -> Result<(), CatalogError> {
        let input = types::TableInput::builder()
            .name(&descriptor.table_name)
            .storage_descriptor(to_glue_storage(&descriptor.storage)?)
            .set_partition_keys(Some(to_glue_columns(&descriptor.partition_keys)?))
            .table_type(&descriptor.table_type)
            .set_parameters(Some(
                descriptor
                    .parameters
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect::<HashMap<_, _>>(),
            ))
            .build()
            .map_err(invalid)?;
        let request = self
            .client
            .create_table()
            .database_name(&descriptor.database)
            .table_input(input);
        let target = format!("{}.{}", descriptor.database, descriptor.table_name);
        block_on(async move {
            match request.send().await {
                Ok(_) => Ok(()),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_already_exists_exception()) =>
                {
                    Err(CatalogError::AlreadyExists(target))
                }
                Err(error) => Err(transient("create_table", &target, error)),
            }
        })
    }

    fn get_table(&self, database: &str, table: &str) -> Result<TableDescriptor, CatalogError> {
        let request = self.client.get_table().database_name(database).name(table);
        let target = format!("{database}.{table}");
        let output = block_on(async {
            match request.send().await {
                Ok(output) => Ok(output),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_entity_not_found_exception()) =>
                {
                    Err(CatalogError::NotFound(target.clone()))
                }
                Err(error) => Err(transient("get_table", &target, error)),
            }
        })?;
        let found = output
            .table()
            .ok_or_else(|| CatalogError::NotFound(target.clone()))?;

        Ok(TableDescriptor {
            database: database.to_string(),
            table_name: found.name().to_string(),
            storage: from_glue_storage(found.storage_descriptor()),
            partition_keys: from_glue_columns(found.partition_keys()),
            table_type: found.table_type().unwrap_or_default().to_string(),
            parameters: found
                .parameters()
                .map(|parameters| {
                    parameters
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    fn list_partitions(&self, database: &str, table: &str) -> Result<Vec<Partition>, CatalogError> {
        let client = self.client.clone();
        let target = format!("{database}.{table}");
        let pages = block_on(async {
            let mut pages = Vec::new();
            let mut next_token: Option<String> = None;
            loop {
                let output = client
                    .get_partitions()
                    .database_name(database)
                    .table_name(table)
                    .set_next_token(next_token.take())
                    .send()
                    .await
                    .map_err(|error| transient("get_partitions", &target, error))?;
                next_token = output.next_token().map(str::to_string);
                pages.push(output);
                if next_token.is_none() {
                    break;
                }
            }
            Ok::<_, CatalogError>(pages)
        })?;

        pages
            .iter()
            .flat_map(|page| page.partitions())
            .map(from_glue_partition)
            .collect()
    }

    fn create_partition(
        &self,
        database: &str,
        table: &str,
        partition: &Partition,
    ) -> Result<(), CatalogError> {
        let request = self
            .client
            .create_partition()
            .database_name(database)
            .table_name(table)
            .partition_input(partition_input(partition)?);
        let target = format!("{database}.{table} {:?}", partition.values);
        block_on(async move {
            match request.send().await {
                Ok(_) => Ok(()),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_already_exists_exception()) =>
                {
                    Err(CatalogError::AlreadyExists(target))
                }
                Err(error) => Err(transient("create_partition", &target, error)),
            }
        })
    }

    fn update_partition(
        &self,
        database: &str,
        table: &str,
        partition: &Partition,
    ) -> Result<(), CatalogError> {
        let request = self
            .client
            .update_partition()
            .database_name(database)
            .table_name(table)
            .set_partition_value_list(Some(partition.values.clone()))
            .partition_input(partition_input(partition)?);
        let target = format!("{database}.{table} {:?}", partition.values);
        block_on(async move {
            match request.send().await {
                Ok(_) => Ok(()),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_entity_not_found_exception()) =>
                {
                    Err(CatalogError::NotFound(target))
                }
                Err(error) => Err(transient("update_partition", &target, error)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(values: &[&str]) -> types::Partition {
        let owner = PartitionOwner::new("asset_allocation_data/inbound/TAA_010124.csv", "abc");
        types::Partition::builder()
            .set_values(Some(values.iter().map(|value| value.to_string()).collect()))
            .set_parameters(Some(owner.to_parameters().into_iter().collect()))
            .build()
    }

    #[test]
    fn listed_partition_keeps_registered_values_and_owner() {
        let partition = from_glue_partition(&registered(&["2024", "1", "1", "2"])).expect("partition");

        assert_eq!(partition.key.values(), vec!["2024", "01", "01", "2"]);
        assert_eq!(partition.values, vec!["2024", "1", "1", "2"]);
        assert_eq!(
            partition.owner,
            Some(PartitionOwner::new(
                "asset_allocation_data/inbound/TAA_010124.csv",
                "abc"
            ))
        );
    }

    #[test]
    fn partition_input_addresses_registered_values() {
        let partition = from_glue_partition(&registered(&["2024", "1", "1", "2"])).expect("partition");

        let input = partition_input(&partition).expect("input");

        assert_eq!(input.values(), ["2024", "1", "1", "2"]);
        assert_eq!(
            input
                .parameters()
                .and_then(|parameters| parameters.get("source_etag"))
                .map(String::as_str),
            Some("abc")
        );
    }

    #[test]
    fn listed_partition_without_owner_parameters_has_no_owner() {
        let bare = types::Partition::builder()
            .set_values(Some(vec!["2024".into(), "01".into(), "01".into(), "1".into()]))
            .build();

        assert_eq!(from_glue_partition(&bare).expect("partition").owner, None);
    }
}
