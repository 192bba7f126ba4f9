use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::types::{Chunk, Hit, HitMetadata};

pub const VECTOR_COLUMN: &str = "vector";
pub const DISTANCE_COLUMN: &str = "_distance";

pub fn vector_width(dim: usize) -> Result<i32> {
    match i32::try_from(dim) {
        Ok(width) if width > 0 => Ok(width),
        _ => Err(Error::InvalidConfig(format!("unsupported embedding dimension {dim}"))),
    }
}

pub fn build_chunk_schema(dim: usize) -> Result<SchemaRef> {
    let width = vector_width(dim)?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("source_path", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), width),
            true,
        ),
    ])))
}

pub fn build_meta_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
        Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
    ]))
}

/// Converts chunks into one Arrow batch. Every embedding must already have
/// length `dim`.
pub fn chunks_to_record_batch(chunks: &[Chunk], dim: usize) -> Result<RecordBatch> {
    let width = vector_width(dim)?;
    let mut ids = Vec::with_capacity(chunks.len());
    let mut paths = Vec::with_capacity(chunks.len());
    let mut indices = Vec::with_capacity(chunks.len());
    let mut texts = Vec::with_capacity(chunks.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
    for c in chunks {
        if c.embedding.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: c.embedding.len() });
        }
        let index = i32::try_from(c.chunk_index)
            .map_err(|_| Error::Storage(format!("chunk_index {} does not fit in int32", c.chunk_index)))?;
        ids.push(c.id.as_str());
        paths.push(c.source_path.as_str());
        indices.push(index);
        texts.push(c.text.as_str());
        vectors.push(Some(c.embedding.iter().copied().map(Some).collect()));
    }

    RecordBatch::try_new(
        build_chunk_schema(dim)?,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(paths)),
            Arc::new(Int32Array::from(indices)),
            Arc::new(StringArray::from(texts)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, width)),
        ],
    )
    .map_err(Error::storage)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::Storage(format!("result column '{name}' is missing or has an unexpected type")))
}

/// Reads hits out of a vector search result batch.
pub fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<Hit>> {
    let texts = column::<StringArray>(batch, "text")?;
    let paths = column::<StringArray>(batch, "source_path")?;
    let indices = column::<Int32Array>(batch, "chunk_index")?;
    let distances = column::<Float32Array>(batch, DISTANCE_COLUMN)?;

    (0..batch.num_rows())
        .map(|i| {
            let chunk_index = usize::try_from(indices.value(i))
                .map_err(|_| Error::Storage(format!("negative chunk_index {}", indices.value(i))))?;
            Ok(Hit {
                text: texts.value(i).to_string(),
                metadata: HitMetadata { source_path: paths.value(i).to_string(), chunk_index },
                distance: distances.value(i),
            })
        })
        .collect()
}
