use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

/// Upper bound on rows per yielded batch. This also bounds the number of bind
/// parameters in the single insert statement built from one batch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// A lazy, finite, read-once sequence of record batches from one Parquet file.
pub struct ParquetBatchSource {
    path: PathBuf,
    reader: ParquetRecordBatchReader,
}

impl std::fmt::Debug for ParquetBatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetBatchSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ParquetBatchSource {
    /// Opens `path` for reading. Fails if the file is missing or is not valid
    /// Parquet; no row data is decoded until the source is iterated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("Invalid parquet file at {}", path.display()))?
            .with_batch_size(DEFAULT_BATCH_SIZE)
            .build()
            .with_context(|| format!("Failed to read parquet file at {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for ParquetBatchSource {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.reader.next()?;
        Some(batch.with_context(|| format!("Failed to decode batch from {}", self.path.display())))
    }
}
