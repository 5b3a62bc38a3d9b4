//! Parquet encoding for silver partitions
//!
//! Column layout:
//!
//! | column             | type                  |
//! |--------------------|-----------------------|
//! | `run_id`           | Utf8                  |
//! | `ingestion_time`   | Timestamp(us, "UTC")  |
//! | `temperature`      | Float64               |
//! | `windspeed`        | Float64               |
//! | `winddirection`    | Float64               |
//! | `weathercode`      | Int32                 |
//! | `observation_time` | Timestamp(us, "UTC")  |
//!
//! Every column is non-nullable. Decoding rejects files that do not match.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, Int32Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use uuid::Uuid;
use wxp_common::types::{from_micros, to_micros};
use wxp_common::StructuredRecord;

use crate::error::{PipelineError, PipelineResult};

const UTC: &str = "UTC";

fn utc_micros() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into()))
}

pub fn partition_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("run_id", DataType::Utf8, false),
        Field::new("ingestion_time", utc_micros(), false),
        Field::new("temperature", DataType::Float64, false),
        Field::new("windspeed", DataType::Float64, false),
        Field::new("winddirection", DataType::Float64, false),
        Field::new("weathercode", DataType::Int32, false),
        Field::new("observation_time", utc_micros(), false),
    ]))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_created_by(format!("wxp {}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Encode records as a single-row-group Parquet file
pub fn encode_partition(records: &[StructuredRecord]) -> PipelineResult<Vec<u8>> {
    let schema = partition_schema();

    let run_ids = StringArray::from(
        records
            .iter()
            .map(|r| r.run_id.to_string())
            .collect::<Vec<_>>(),
    );
    let ingestion_times = TimestampMicrosecondArray::from(
        records
            .iter()
            .map(|r| to_micros(&r.ingestion_time))
            .collect::<Vec<_>>(),
    )
    .with_timezone(UTC);
    let temperatures = Float64Array::from(records.iter().map(|r| r.temperature).collect::<Vec<_>>());
    let windspeeds = Float64Array::from(records.iter().map(|r| r.windspeed).collect::<Vec<_>>());
    let winddirections =
        Float64Array::from(records.iter().map(|r| r.winddirection).collect::<Vec<_>>());
    let weathercodes = Int32Array::from(records.iter().map(|r| r.weathercode).collect::<Vec<_>>());
    let observation_times = TimestampMicrosecondArray::from(
        records
            .iter()
            .map(|r| to_micros(&r.observation_time))
            .collect::<Vec<_>>(),
    )
    .with_timezone(UTC);

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(run_ids),
            Arc::new(ingestion_times),
            Arc::new(temperatures),
            Arc::new(windspeeds),
            Arc::new(winddirections),
            Arc::new(weathercodes),
            Arc::new(observation_times),
        ],
    )?;

    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, schema, Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(cursor.into_inner())
}

/// Decode a partition written by [`encode_partition`]
pub fn decode_partition(data: Vec<u8>) -> PipelineResult<Vec<StructuredRecord>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;

        let run_ids = column::<StringArray>(&batch, "run_id")?;
        let ingestion_times = column::<TimestampMicrosecondArray>(&batch, "ingestion_time")?;
        let temperatures = column::<Float64Array>(&batch, "temperature")?;
        let windspeeds = column::<Float64Array>(&batch, "windspeed")?;
        let winddirections = column::<Float64Array>(&batch, "winddirection")?;
        let weathercodes = column::<Int32Array>(&batch, "weathercode")?;
        let observation_times = column::<TimestampMicrosecondArray>(&batch, "observation_time")?;

        records.reserve(batch.num_rows());
        for row in 0..batch.num_rows() {
            let run_id = Uuid::parse_str(run_ids.value(row)).map_err(|e| {
                PipelineError::codec(format!("row {} has invalid run_id: {}", row, e))
            })?;

            records.push(StructuredRecord {
                run_id,
                ingestion_time: from_micros(ingestion_times.value(row))?,
                temperature: temperatures.value(row),
                windspeed: windspeeds.value(row),
                winddirection: winddirections.value(row),
                weathercode: weathercodes.value(row),
                observation_time: from_micros(observation_times.value(row))?,
            });
        }
    }

    Ok(records)
}

/// Look up a non-null column by name and downcast it
fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> PipelineResult<&'a T> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|e| PipelineError::codec(format!("missing column '{}': {}", name, e)))?;

    let array = batch.column(idx);
    if array.null_count() > 0 {
        return Err(PipelineError::codec(format!(
            "column '{}' contains {} null values",
            name,
            array.null_count()
        )));
    }

    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        PipelineError::codec(format!(
            "column '{}' has unexpected type {}",
            name,
            array.data_type()
        ))
    })
}
