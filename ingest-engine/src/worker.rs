// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use barrier_queue::{BarrierQueue, BarrierWait};
use core_types::{Bucket, BucketSpan, IngestMessage};
use log::{debug, error, info, warn};
use mapped_window::{MappedWindow, OpenMode, WindowError};
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;

pub type IngestQueue = BarrierQueue<IngestMessage>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    EndOfFile,
    Cancelled,
    /// The consumer went away while the worker waited on the barrier.
    BarrierClosed,
    /// An unrecoverable window error stopped the read loop.
    Failed,
}

#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub id: usize,
    pub symbol: Arc<str>,
    pub path: PathBuf,
    pub enqueued: u64,
    pub empty_lines: u64,
    pub oversized_lines: u64,
    pub unparseable_lines: u64,
    pub transitions: u64,
    pub last_bucket: Option<Bucket>,
    pub exit: ExitReason,
    pub error: Option<String>,
}

impl WorkerReport {
    fn new(id: usize, symbol: Arc<str>, path: PathBuf) -> Self {
        Self {
            id,
            symbol,
            path,
            enqueued: 0,
            empty_lines: 0,
            oversized_lines: 0,
            unparseable_lines: 0,
            transitions: 0,
            last_bucket: None,
            exit: ExitReason::EndOfFile,
            error: None,
        }
    }

    pub fn skipped(&self) -> u64 {
        self.empty_lines + self.oversized_lines + self.unparseable_lines
    }
}

/// Streams one file into the shared queue, stopping at every bucket boundary until all
/// other active workers have reached it too.
///
/// A worker stands for one of the producers its queue was built for and deregisters
/// from the barrier exactly once, when it is dropped (after [`run`](Self::run) returns
/// or if it never runs).
pub struct IngestWorker {
    id: usize,
    path: PathBuf,
    symbol: Arc<str>,
    queue: Arc<IngestQueue>,
    window_size: usize,
    span: BucketSpan,
    cancel: CancellationToken,
}

impl IngestWorker {
    pub fn new(
        id: usize,
        path: impl Into<PathBuf>,
        symbol: Arc<str>,
        queue: Arc<IngestQueue>,
        window_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            symbol,
            queue,
            window_size: window_size.max(1),
            span: BucketSpan::default(),
            cancel,
        }
    }

    pub fn with_bucket_span(mut self, span: BucketSpan) -> Self {
        self.span = span;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn symbol(&self) -> &Arc<str> {
        &self.symbol
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file to the end (or until cancelled), enqueueing every accepted line.
    ///
    /// Fails only if the file cannot be opened; a window failure mid-file ends the run
    /// with [`ExitReason::Failed`] and the error recorded in the report.
    pub fn run(self) -> Result<WorkerReport, IngestError> {
        let mut report = WorkerReport::new(self.id, Arc::clone(&self.symbol), self.path.clone());
        let mut window =
            match MappedWindow::open_window(&self.path, self.window_size, OpenMode::ReadOnly) {
                Ok(window) => window,
                Err(source) => {
                    error!(
                        "[{}] worker {} failed to open {}: {source}",
                        self.symbol,
                        self.id,
                        self.path.display()
                    );
                    return Err(IngestError::Window {
                        path: self.path.clone(),
                        source,
                    });
                }
            };
        info!(
            "[{}] worker {} ingesting {} ({} bytes, {} byte window)",
            self.symbol,
            self.id,
            self.path.display(),
            window.file_len(),
            self.window_size
        );

        let mut current: Option<Bucket> = None;
        report.exit = loop {
            if self.cancel.is_cancelled() {
                break ExitReason::Cancelled;
            }
            if self.queue.is_closed() {
                break ExitReason::BarrierClosed;
            }
            let line = match window.read_line_view(true) {
                Ok(Some(line)) => line,
                Ok(None) => break ExitReason::EndOfFile,
                Err(WindowError::LineTooLong { offset, len, .. }) => {
                    warn!(
                        "[{}] skipping {len} byte line at offset {offset} of {}",
                        self.symbol,
                        self.path.display()
                    );
                    report.oversized_lines += 1;
                    continue;
                }
                Err(err) => {
                    error!(
                        "[{}] worker {} stopped reading {}: {err}",
                        self.symbol,
                        self.id,
                        self.path.display()
                    );
                    report.error = Some(err.to_string());
                    break ExitReason::Failed;
                }
            };

            if line.is_empty() {
                report.empty_lines += 1;
                continue;
            }
            if line.len() >= self.window_size {
                warn!(
                    "[{}] skipping {} byte line at offset {} of {}",
                    self.symbol,
                    line.len(),
                    line.file_offset(),
                    self.path.display()
                );
                report.oversized_lines += 1;
                continue;
            }
            let Some(bucket) = Bucket::from_line(&line, self.span) else {
                warn!(
                    "[{}] no timestamp at offset {} of {}",
                    self.symbol,
                    line.file_offset(),
                    self.path.display()
                );
                report.unparseable_lines += 1;
                continue;
            };

            match current {
                None => current = Some(bucket),
                Some(previous) if previous != bucket => {
                    let check_in = self.queue.mark_producer_done();
                    current = Some(bucket);
                    report.transitions += 1;
                    debug!(
                        "[{}] finished bucket {previous}; waiting to enter {bucket}",
                        self.symbol
                    );
                    match self.queue.wait_for_barrier_reset(check_in, &self.cancel) {
                        BarrierWait::Released => {}
                        BarrierWait::Cancelled => break ExitReason::Cancelled,
                        BarrierWait::Closed => break ExitReason::BarrierClosed,
                    }
                }
                Some(_) => {}
            }

            self.queue.enqueue(IngestMessage::new(
                Arc::clone(&self.symbol),
                &line,
                bucket,
            ));
            report.enqueued += 1;
        };
        report.last_bucket = current;

        info!(
            "[{}] worker {} finished ({:?}): {} enqueued, {} skipped, {} transitions",
            self.symbol,
            self.id,
            report.exit,
            report.enqueued,
            report.skipped(),
            report.transitions
        );
        Ok(report)
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        self.queue.deregister_producer();
    }
}
