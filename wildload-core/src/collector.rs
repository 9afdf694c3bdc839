// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Metrics collector: the single writer of the record file.
//!
//! Dispatcher tasks send [`ExecutionRecord`]s over a bounded channel; one
//! collector task appends them to a CSV file in receive order. The collector
//! signals ready before the driver issues the first invocation and finishes
//! only once every sender is gone and the file is flushed to disk.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{LoadError, LoadResult};
use crate::record::ExecutionRecord;

/// Default capacity of the record channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Records between intermediate flushes of the sink.
const FLUSH_INTERVAL: u64 = 1024;

/// Handle to a running collector task.
pub struct MetricsCollector {
    path: PathBuf,
    handle: JoinHandle<LoadResult<u64>>,
}

impl MetricsCollector {
    /// Open the sink at `path`, spawn the collector, and wait until it listens.
    ///
    /// Returns the collector handle and the producer side of the record channel.
    pub async fn start(
        path: impl Into<PathBuf>,
        capacity: usize,
    ) -> LoadResult<(Self, mpsc::Sender<ExecutionRecord>)> {
        let path = path.into();
        let writer = open_sink(&path)?;

        let (record_tx, record_rx) = mpsc::channel(capacity.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = tokio::spawn(collect(writer, record_rx, ready_tx));

        ready_rx.await.map_err(|_| LoadError::Collector {
            reason: "collector exited before signalling ready".to_string(),
        })?;

        tracing::debug!(path = %path.display(), "Metrics collector ready");

        Ok((Self { path, handle }, record_tx))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the channel is drained and the sink is durable.
    ///
    /// Every `Sender` must be dropped first or this never returns.
    /// Returns the number of records written.
    pub async fn finish(self) -> LoadResult<u64> {
        let written = self.handle.await.map_err(|e| LoadError::Collector {
            reason: e.to_string(),
        })??;

        tracing::info!(
            path = %self.path.display(),
            records = written,
            "Metrics collector finished"
        );

        Ok(written)
    }
}

fn open_sink(path: &Path) -> LoadResult<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LoadError::Persistence {
            context: "creating output directory",
            source: e,
        })?;
    }

    let file = File::create(path).map_err(|e| LoadError::Persistence {
        context: "creating record file",
        source: e,
    })?;

    Ok(csv::WriterBuilder::new().has_headers(true).from_writer(file))
}

async fn collect(
    mut writer: csv::Writer<File>,
    mut records: mpsc::Receiver<ExecutionRecord>,
    ready: oneshot::Sender<()>,
) -> LoadResult<u64> {
    let _ = ready.send(());

    let mut written = 0u64;
    while let Some(record) = records.recv().await {
        tracing::trace!(invocation_id = %record.invocation_id, phase = %record.phase, "Persisting record");
        writer.serialize(&record)?;
        written += 1;

        if written % FLUSH_INTERVAL == 0 {
            writer.flush().map_err(|e| LoadError::Persistence {
                context: "flushing record file",
                source: e,
            })?;
        }
    }

    writer.flush().map_err(|e| LoadError::Persistence {
        context: "flushing record file",
        source: e,
    })?;
    let file = writer.into_inner().map_err(|e| LoadError::Persistence {
        context: "closing record file",
        source: e.into_error(),
    })?;
    file.sync_all().map_err(|e| LoadError::Persistence {
        context: "syncing record file",
        source: e,
    })?;

    Ok(written)
}

/// Read a record file back, in file order.
pub fn read_records(path: impl AsRef<Path>) -> LoadResult<Vec<ExecutionRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}
