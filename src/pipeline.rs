use std::path::Path;

use anyhow::Result;
use arrow::array::RecordBatch;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    documents::batch_to_documents,
    sinks::StagingSink,
    sources::{listing::list_parquet_files, parquet::ParquetBatchSource},
};

/// Outcome of one load run, accumulated across all files.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadReport {
    pub files_found: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_committed: u64,
}

/// Drives one load run: enumerate files, read batches, insert, commit once
/// per file. Files are processed strictly one at a time over a single sink
/// connection.
pub struct Loader<S> {
    sink: S,
}

impl<S: StagingSink> Loader<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Runs the full pipeline against `data_dir`.
    ///
    /// Failing to prepare the staging table is fatal. A file that cannot be
    /// opened is skipped with a warning. A failed batch insert rolls back the
    /// file's open transaction and the loop continues with the next batch;
    /// any other error while reading a file rolls back and moves on to the
    /// next file. A directory with no matching files is a successful,
    /// zero-row run.
    pub async fn run(&mut self, data_dir: &Path) -> Result<LoadReport> {
        self.sink.prepare().await?;

        let files = list_parquet_files(data_dir)?;
        info!("Found {} parquet files", files.len());

        let mut report = LoadReport {
            files_found: files.len(),
            ..LoadReport::default()
        };

        for path in &files {
            info!("Loading {}", path.display());

            let source = match ParquetBatchSource::open(path) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Skipping file (read error) {}: {e:#}", path.display());
                    report.files_skipped += 1;
                    continue;
                }
            };

            match self.load_file(path, source).await {
                Ok(rows) => {
                    info!("Committed {rows} rows from {}", path.display());
                    report.files_loaded += 1;
                    report.rows_committed += rows;
                }
                Err(e) => {
                    error!("Failed processing {}: {e:#}", path.display());
                    self.sink.rollback().await?;
                    report.files_failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Inserts every batch of one file inside a single transaction and
    /// commits at the end, returning the number of rows the commit covers.
    ///
    /// The transaction is file-scoped, not batch-scoped: when an insert
    /// fails, the rollback discards every batch inserted for this file so
    /// far, processing resumes with the next batch, and the committed count
    /// covers only rows inserted after the last rollback.
    async fn load_file<I>(&mut self, path: &Path, batches: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<RecordBatch>>,
    {
        let mut rows = 0;

        for batch in batches {
            let documents = batch_to_documents(&batch?)?;
            if documents.is_empty() {
                continue;
            }

            match self.sink.insert(&documents).await {
                Ok(inserted) => rows += inserted,
                Err(e) => {
                    self.sink.rollback().await?;
                    rows = 0;
                    error!("Batch insert failed for {}: {e:#}", path.display());
                }
            }
        }

        self.sink.commit().await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, bail};
    use arrow::{
        array::{Int32Array, StringArray},
        datatypes::{DataType, Field, Schema},
    };
    use async_trait::async_trait;
    use parquet::arrow::ArrowWriter;
    use serde_json::Value;
    use std::{fs::File, io::Write, ops::Range, sync::Arc};
    use tempfile::tempdir;

    /// In-memory stand-in for the Postgres sink with scripted insert
    /// failures, keyed by insert call number (1-based).
    #[derive(Default)]
    struct MemorySink {
        prepared: bool,
        fail_prepare: bool,
        fail_inserts: Vec<usize>,
        insert_calls: usize,
        pending: Vec<Value>,
        committed: Vec<Value>,
        commits: usize,
        rollbacks: usize,
    }

    #[async_trait]
    impl StagingSink for MemorySink {
        async fn prepare(&mut self) -> Result<()> {
            if self.fail_prepare {
                bail!("permission denied for schema raw");
            }
            self.prepared = true;
            self.pending.clear();
            self.committed.clear();
            Ok(())
        }

        async fn insert(&mut self, documents: &[Value]) -> Result<u64> {
            self.insert_calls += 1;
            if self.fail_inserts.contains(&self.insert_calls) {
                bail!("invalid input syntax for type json");
            }
            self.pending.extend_from_slice(documents);
            Ok(documents.len() as u64)
        }

        async fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            self.committed.append(&mut self.pending);
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            self.rollbacks += 1;
            self.pending.clear();
            Ok(())
        }
    }

    fn write_parquet(path: &Path, ids: Range<i32>) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        let names: Vec<String> = ids.clone().map(|id| format!("row-{id}")).collect();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(ids.collect::<Vec<_>>())),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap();

        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn write_corrupt(path: &Path) {
        let mut file = File::create(path).unwrap();
        file.write_all(b"this is not parquet").unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_skipped_and_good_file_commits() {
        let temp_dir = tempdir().unwrap();
        write_parquet(&temp_dir.path().join("a.parquet"), 0..5);
        write_corrupt(&temp_dir.path().join("b.parquet"));

        let mut loader = Loader::new(MemorySink::default());
        let report = loader.run(temp_dir.path()).await.unwrap();

        assert_eq!(report.files_found, 2);
        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_failed, 0);
        assert_eq!(report.rows_committed, 5);
        assert_eq!(loader.sink.committed.len(), 5);
    }

    #[tokio::test]
    async fn test_corrupt_file_first_leaves_later_files_intact() {
        let temp_dir = tempdir().unwrap();
        write_corrupt(&temp_dir.path().join("a.parquet"));
        write_parquet(&temp_dir.path().join("b.parquet"), 0..4);

        let mut loader = Loader::new(MemorySink::default());
        let report = loader.run(temp_dir.path()).await.unwrap();

        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.rows_committed, 4);
        assert_eq!(loader.sink.committed.len(), 4);
        assert_eq!(loader.sink.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_empty_directory_is_a_successful_run() {
        let temp_dir = tempdir().unwrap();

        let mut loader = Loader::new(MemorySink::default());
        let report = loader.run(temp_dir.path()).await.unwrap();

        assert_eq!(report.files_found, 0);
        assert_eq!(report.rows_committed, 0);
        assert!(loader.sink.prepared);
        assert_eq!(loader.sink.insert_calls, 0);
        assert!(loader.sink.committed.is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_rolls_back_earlier_batches_of_the_file() {
        // 2560 rows read in batches of 1024: [1024, 1024, 512]. The second
        // insert fails, the rollback discards the first batch with it, so
        // only the third batch survives to the commit.
        let temp_dir = tempdir().unwrap();
        write_parquet(&temp_dir.path().join("a.parquet"), 0..2560);

        let mut loader = Loader::new(MemorySink {
            fail_inserts: vec![2],
            ..MemorySink::default()
        });
        let report = loader.run(temp_dir.path()).await.unwrap();

        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.files_failed, 0);
        assert_eq!(report.rows_committed, 512);
        assert_eq!(loader.sink.rollbacks, 1);
        assert_eq!(loader.sink.committed.len(), 512);
        assert_eq!(loader.sink.committed[0]["id"], 2048);
    }

    #[tokio::test]
    async fn test_mid_stream_reader_error_fails_the_file() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int32, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1, 2]))]).unwrap();
        let batches = vec![Ok(batch), Err(anyhow!("page decode failed"))];

        let mut loader = Loader::new(MemorySink::default());
        let result = loader
            .load_file(Path::new("events.parquet"), batches)
            .await;

        assert!(result.is_err());
        assert_eq!(loader.sink.commits, 0);
        assert_eq!(loader.sink.pending.len(), 2);
    }

    #[tokio::test]
    async fn test_prepare_failure_aborts_before_any_file() {
        let temp_dir = tempdir().unwrap();
        write_parquet(&temp_dir.path().join("a.parquet"), 0..3);

        let mut loader = Loader::new(MemorySink {
            fail_prepare: true,
            ..MemorySink::default()
        });
        let result = loader.run(temp_dir.path()).await;

        assert!(result.is_err());
        assert_eq!(loader.sink.insert_calls, 0);
    }

    #[tokio::test]
    async fn test_rerun_replaces_previous_rows() {
        let temp_dir = tempdir().unwrap();
        write_parquet(&temp_dir.path().join("a.parquet"), 0..3);

        let mut loader = Loader::new(MemorySink::default());
        loader.run(temp_dir.path()).await.unwrap();
        assert_eq!(loader.sink.committed.len(), 3);

        let mut loader = Loader::new(loader.sink);
        loader.run(temp_dir.path()).await.unwrap();

        assert_eq!(loader.sink.committed.len(), 3);
    }

    #[tokio::test]
    async fn test_file_with_no_rows_commits_zero() {
        let temp_dir = tempdir().unwrap();
        write_parquet(&temp_dir.path().join("a.parquet"), 0..0);

        let mut loader = Loader::new(MemorySink::default());
        let report = loader.run(temp_dir.path()).await.unwrap();

        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.rows_committed, 0);
        assert_eq!(loader.sink.insert_calls, 0);
    }
}
