//! CSV to Parquet conversion for the catalog tables.
//!
//! Arrow column types follow the catalog column types: `double` -> Float64,
//! `int` -> Int32, `date` -> Date32, `timestamp` -> Timestamp(us), anything
//! else -> Utf8. Source headers match catalog columns case-insensitively.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int32Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use asset_alloc_core::catalog::{ColumnDef, PartitionKey};
use asset_alloc_core::contract::PipelineMessage;
use asset_alloc_core::error::ConversionError;
use asset_alloc_core::file_date::FileDate;
use asset_alloc_core::table::AllocationTable;
use chrono::{DateTime, NaiveDate, Utc};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

pub const LOADED_STATUS: &str = "loaded";

/// One row of the load-metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMetadataRecord {
    pub file_name: String,
    pub version_number: u32,
    pub insertion_date: DateTime<Utc>,
    pub etag: String,
    pub file_date: FileDate,
    pub status: String,
}

impl LoadMetadataRecord {
    pub fn loaded(message: &PipelineMessage, key: PartitionKey, insertion_date: DateTime<Utc>) -> Self {
        Self {
            file_name: message.file_name.clone(),
            version_number: key.version_number,
            insertion_date,
            etag: message.etag.clone(),
            file_date: key.date(),
            status: LOADED_STATUS.to_string(),
        }
    }
}

fn arrow_type(data_type: &str) -> DataType {
    match data_type.to_ascii_lowercase().as_str() {
        "double" | "float" => DataType::Float64,
        "int" | "integer" => DataType::Int32,
        "date" => DataType::Date32,
        "timestamp" => DataType::Timestamp(TimeUnit::Microsecond, None),
        _ => DataType::Utf8,
    }
}

fn blank_to_none(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn coercion_error(column: &ColumnDef, row: usize, value: &str) -> ConversionError {
    ConversionError::Coercion {
        column: column.name.clone(),
        row,
        value: value.to_string(),
        data_type: column.data_type.clone(),
    }
}

fn parse_double(column: &ColumnDef, row: usize, value: &str) -> Result<f64, ConversionError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| coercion_error(column, row, value))
}

/// Accepts `"3"` and whole-valued floats such as `"3.0"`.
fn parse_int(column: &ColumnDef, row: usize, value: &str) -> Result<i32, ConversionError> {
    if let Ok(parsed) = value.parse::<i32>() {
        return Ok(parsed);
    }
    let parsed = parse_double(column, row, value)?;
    if parsed.fract() == 0.0 && parsed >= i32::MIN as f64 && parsed <= i32::MAX as f64 {
        Ok(parsed as i32)
    } else {
        Err(coercion_error(column, row, value))
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn typed_column<'a>(
    column: &ColumnDef,
    values: impl Iterator<Item = &'a str>,
) -> Result<ArrayRef, ConversionError> {
    let cells = values
        .enumerate()
        .map(|(index, value)| (index + 1, blank_to_none(value)))
        .collect::<Vec<_>>();

    let array: ArrayRef = match arrow_type(&column.data_type) {
        DataType::Float64 => Arc::new(Float64Array::from(
            cells
                .iter()
                .map(|(row, cell)| cell.map(|value| parse_double(column, *row, value)).transpose())
                .collect::<Result<Vec<_>, _>>()?,
        )),
        DataType::Int32 => Arc::new(Int32Array::from(
            cells
                .iter()
                .map(|(row, cell)| cell.map(|value| parse_int(column, *row, value)).transpose())
                .collect::<Result<Vec<_>, _>>()?,
        )),
        DataType::Date32 => Arc::new(Date32Array::from(
            cells
                .iter()
                .map(|(row, cell)| {
                    cell.map(|value| {
                        NaiveDate::parse_from_str(value, "%Y-%m-%d")
                            .map(days_since_epoch)
                            .map_err(|_| coercion_error(column, *row, value))
                    })
                    .transpose()
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        DataType::Timestamp(TimeUnit::Microsecond, None) => Arc::new(TimestampMicrosecondArray::from(
            cells
                .iter()
                .map(|(row, cell)| {
                    cell.map(|value| {
                        DateTime::parse_from_rfc3339(value)
                            .map(|parsed| parsed.timestamp_micros())
                            .map_err(|_| coercion_error(column, *row, value))
                    })
                    .transpose()
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        _ => Arc::new(StringArray::from(
            cells.iter().map(|(_, cell)| *cell).collect::<Vec<_>>(),
        )),
    };
    Ok(array)
}

fn write_parquet(schema: Arc<Schema>, columns: Vec<ArrayRef>) -> Result<Vec<u8>, ConversionError> {
    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|error| ConversionError::Encode(format!("record batch: {error}")))?;

    let mut buffer = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))
        .map_err(|error| ConversionError::Encode(error.to_string()))?;
    writer
        .write(&batch)
        .map_err(|error| ConversionError::Encode(format!("write batch: {error}")))?;
    writer
        .close()
        .map_err(|error| ConversionError::Encode(format!("close writer: {error}")))?;
    Ok(buffer)
}

/// Encodes the uploaded rows as Parquet with one column per catalog column.
/// Extra source columns are dropped.
pub fn encode_allocation_parquet(
    table: &AllocationTable,
    columns: &[ColumnDef],
) -> Result<Vec<u8>, ConversionError> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());

    for column in columns {
        let header = table
            .headers()
            .iter()
            .find(|header| header.eq_ignore_ascii_case(&column.name))
            .ok_or_else(|| ConversionError::Csv(format!("column '{}' not found", column.name)))?;
        let values = table
            .column(header)
            .ok_or_else(|| ConversionError::Csv(format!("column '{}' not found", column.name)))?;

        fields.push(Field::new(&column.name, arrow_type(&column.data_type), true));
        arrays.push(typed_column(column, values)?);
    }

    write_parquet(Arc::new(Schema::new(fields)), arrays)
}

pub fn encode_load_metadata_parquet(record: &LoadMetadataRecord) -> Result<Vec<u8>, ConversionError> {
    let file_date = NaiveDate::from_ymd_opt(
        record.file_date.year,
        record.file_date.month,
        record.file_date.day,
    )
    .ok_or_else(|| ConversionError::Encode(format!("invalid file date {}", record.file_date.iso())))?;
    let version_number = i32::try_from(record.version_number).map_err(|_| {
        ConversionError::Encode(format!("version {} exceeds int", record.version_number))
    })?;

    let schema = Arc::new(Schema::new(vec![
        Field::new("file_name", DataType::Utf8, false),
        Field::new("version_number", DataType::Int32, false),
        Field::new(
            "insertion_date",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("etag", DataType::Utf8, false),
        Field::new("file_date", DataType::Date32, false),
        Field::new("status", DataType::Utf8, false),
    ]));

    write_parquet(
        schema,
        vec![
            Arc::new(StringArray::from(vec![record.file_name.clone()])) as ArrayRef,
            Arc::new(Int32Array::from(vec![version_number])),
            Arc::new(TimestampMicrosecondArray::from(vec![
                record.insertion_date.timestamp_micros(),
            ])),
            Arc::new(StringArray::from(vec![record.etag.clone()])),
            Arc::new(Date32Array::from(vec![days_since_epoch(file_date)])),
            Arc::new(StringArray::from(vec![record.status.clone()])),
        ],
    )
}
