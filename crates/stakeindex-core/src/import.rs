//! Batched, idempotent persistence of ingested rows.
//!
//! The importer only splits and stamps; the actual upsert statement belongs
//! to the storage backend through [`BatchSink`].

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::IndexerError;
use crate::model::{Account, Block, FeeTransfer, Job, Snarker, Transaction, Validator};

/// Default number of rows per bulk statement.
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// A row with a natural key used for upsert-on-conflict.
pub trait ImportRow: Clone + Send + Sync {
    /// Entity name used in errors and logs.
    const ENTITY: &'static str;

    type Key: Eq + Hash;

    fn key(&self) -> Self::Key;
}

/// A backend able to upsert one batch of `T` in a single statement.
///
/// `stamp` is the created/updated timestamp shared by the whole batch.
/// Conflicting rows update their mutable columns but keep `created_at`
/// and their canonicity.
#[async_trait]
pub trait BatchSink<T: ImportRow>: Send + Sync {
    async fn write_batch(&self, rows: &[T], stamp: DateTime<Utc>) -> Result<(), IndexerError>;
}

/// Outcome of one `BulkImporter::import` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub entity: &'static str,
    /// Rows written after collapsing duplicate keys.
    pub rows: usize,
    pub batches: usize,
}

/// Splits rows into fixed-size batches and writes them in order.
#[derive(Debug, Clone, Copy)]
pub struct BulkImporter {
    batch_size: usize,
}

impl Default for BulkImporter {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BulkImporter {
    /// A zero batch size is treated as one row per batch.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Upsert `rows` through `sink`.
    ///
    /// Stops at the first failing batch with `ImportFailed`; batches before
    /// it stay committed. Re-running the same rows is harmless.
    pub async fn import<T, S>(&self, sink: &S, rows: &[T]) -> Result<ImportReport, IndexerError>
    where
        T: ImportRow,
        S: BatchSink<T> + ?Sized,
    {
        let rows = collapse(rows);
        let mut batches = 0;

        for (index, batch) in rows.chunks(self.batch_size).enumerate() {
            let stamp = Utc::now();
            sink.write_batch(batch, stamp).await.map_err(|e| {
                tracing::error!(entity = T::ENTITY, batch = index, error = %e, "batch import failed");
                IndexerError::ImportFailed {
                    entity: T::ENTITY,
                    batch: index,
                    reason: e.to_string(),
                }
            })?;
            batches += 1;
        }

        tracing::debug!(entity = T::ENTITY, rows = rows.len(), batches, "imported");
        Ok(ImportReport {
            entity: T::ENTITY,
            rows: rows.len(),
            batches,
        })
    }
}

/// Keep one row per key: the last one seen, at the first one's position.
///
/// A single statement cannot upsert the same key twice, so duplicates must
/// not share a batch.
fn collapse<T: ImportRow>(rows: &[T]) -> Vec<T> {
    let mut positions: HashMap<T::Key, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows {
        match positions.get(&row.key()) {
            Some(&i) => out[i] = row.clone(),
            None => {
                positions.insert(row.key(), out.len());
                out.push(row.clone());
            }
        }
    }
    out
}

// ─── Natural keys ─────────────────────────────────────────────────────────────

impl ImportRow for Block {
    const ENTITY: &'static str = "blocks";
    type Key = String;

    fn key(&self) -> String {
        self.hash.clone()
    }
}

impl ImportRow for Account {
    const ENTITY: &'static str = "accounts";
    type Key = String;

    fn key(&self) -> String {
        self.public_key.clone()
    }
}

impl ImportRow for Validator {
    const ENTITY: &'static str = "validators";
    type Key = String;

    fn key(&self) -> String {
        self.public_key.clone()
    }
}

impl ImportRow for Transaction {
    const ENTITY: &'static str = "transactions";
    type Key = (String, String);

    fn key(&self) -> (String, String) {
        (self.hash.clone(), self.block_hash.clone())
    }
}

impl ImportRow for Job {
    const ENTITY: &'static str = "jobs";
    type Key = (String, u32);

    fn key(&self) -> (String, u32) {
        (self.block_hash.clone(), self.position)
    }
}

impl ImportRow for Snarker {
    const ENTITY: &'static str = "snarkers";
    type Key = String;

    fn key(&self) -> String {
        self.public_key.clone()
    }
}

impl ImportRow for FeeTransfer {
    const ENTITY: &'static str = "fee_transfers";
    type Key = (String, u32);

    fn key(&self) -> (String, u32) {
        (self.block_hash.clone(), self.position)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::data::fixtures;

    /// Records every batch; fails on the configured batch index.
    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<(Vec<String>, DateTime<Utc>)>>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl BatchSink<Transaction> for RecordingSink {
        async fn write_batch(
            &self,
            rows: &[Transaction],
            stamp: DateTime<Utc>,
        ) -> Result<(), IndexerError> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_at == Some(batches.len()) {
                return Err(IndexerError::Storage("connection reset".into()));
            }
            batches.push((rows.iter().map(|r| r.hash.clone()).collect(), stamp));
            Ok(())
        }
    }

    fn txs(n: usize) -> Vec<Transaction> {
        let block = fixtures::block(10, "3NKa", "3NK9", "B62qcreator");
        (0..n)
            .map(|i| fixtures::transaction(&format!("Ckp{i}"), &block))
            .collect()
    }

    #[tokio::test]
    async fn splits_into_batches() {
        let sink = RecordingSink::default();
        let report = BulkImporter::new(250).import(&sink, &txs(600)).await.unwrap();

        assert_eq!(report.rows, 600);
        assert_eq!(report.batches, 3);
        let batches = sink.batches.lock().unwrap();
        let sizes: Vec<_> = batches.iter().map(|(rows, _)| rows.len()).collect();
        assert_eq!(sizes, vec![250, 250, 100]);
    }

    #[tokio::test]
    async fn failure_reports_batch_index_and_keeps_earlier_batches() {
        let sink = RecordingSink {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = BulkImporter::new(2).import(&sink, &txs(5)).await.unwrap_err();

        match err {
            IndexerError::ImportFailed { entity, batch, .. } => {
                assert_eq!(entity, "transactions");
                assert_eq!(batch, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_keys_collapse_to_last() {
        let mut rows = txs(3);
        let mut updated = rows[0].clone();
        updated.memo = "second".into();
        rows.push(updated);

        let collapsed = collapse(&rows);
        assert_eq!(collapsed.len(), 3);
        assert_eq!(collapsed[0].memo, "second");

        let sink = RecordingSink::default();
        let report = BulkImporter::new(250).import(&sink, &rows).await.unwrap();
        assert_eq!(report.rows, 3);
    }

    #[tokio::test]
    async fn same_hash_in_other_block_is_distinct() {
        let mut rows = txs(1);
        let mut forked = rows[0].clone();
        forked.block_hash = "3NKb".into();
        rows.push(forked);
        assert_eq!(collapse(&rows).len(), 2);
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let sink = RecordingSink::default();
        let report = BulkImporter::default().import(&sink, &txs(0)).await.unwrap();
        assert_eq!(report.batches, 0);
        assert!(sink.batches.lock().unwrap().is_empty());
    }
}
