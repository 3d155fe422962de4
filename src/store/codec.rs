//! Frame <-> Parquet bytes. Every column is a nullable Utf8 field.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, ArrayRef, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::frame::Frame;

pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(
        frame
            .columns()
            .iter()
            .map(|c| Field::new(c, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let arrays: Vec<ArrayRef> = (0..frame.columns().len())
        .map(|i| {
            let values: Vec<Option<&str>> = frame.rows().iter().map(|r| r[i].as_deref()).collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays).context("Failed to build record batch")?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(Vec::new(), schema, Some(props))
        .context("Failed to create Parquet writer")?;
    writer.write(&batch).context("Failed to write batch to Parquet")?;
    writer.into_inner().context("Failed to close Parquet writer")
}

pub fn decode(data: Vec<u8>) -> Result<Frame> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))
        .context("Not a readable Parquet file")?
        .build()?;

    let mut frame: Option<Frame> = None;
    for batch in reader {
        let batch = batch.context("Failed to read Parquet batch")?;
        let frame = frame.get_or_insert_with(|| {
            Frame::new(
                batch
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().to_string())
                    .collect(),
            )
        });

        let columns = batch
            .columns()
            .iter()
            .map(|col| cast(col, &DataType::Utf8).context("Column cannot be read as text"))
            .collect::<Result<Vec<_>>>()?;
        let strings = columns
            .iter()
            .map(|col| {
                col.as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| anyhow!("Column did not cast to Utf8"))
            })
            .collect::<Result<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            frame.push_row(
                strings
                    .iter()
                    .map(|col| (!col.is_null(row)).then(|| col.value(row).to_string()))
                    .collect(),
            );
        }
    }
    Ok(frame.unwrap_or_default())
}
