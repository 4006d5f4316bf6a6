use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use barrier_queue::BarrierConsumer;
use core_types::{
    config::{IngestConfig, SourceConfig},
    BucketSpan, IngestMessage,
};
use engine_api::{Engine, EngineError, EngineHealth, EngineResult, HealthStatus};
use log::{error, info, warn};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    error::IngestError,
    symbol::resolve_symbol,
    worker::{ExitReason, IngestQueue, IngestWorker, WorkerReport},
};

enum EngineRuntimeState {
    Idle,
    Running(ThreadBundle),
    Joining,
    Finished,
}

impl EngineRuntimeState {
    fn take_running(&mut self) -> Option<ThreadBundle> {
        match std::mem::replace(self, EngineRuntimeState::Joining) {
            EngineRuntimeState::Running(bundle) => Some(bundle),
            other => {
                *self = other;
                None
            }
        }
    }
}

type WorkerHandle = (String, thread::JoinHandle<Result<WorkerReport, IngestError>>);

struct ThreadBundle {
    handles: Vec<WorkerHandle>,
}

/// Runs one [`IngestWorker`] thread per source, all feeding a single barrier queue.
///
/// The engine runs once: after its workers finish (via [`join`](Self::join)) or are
/// stopped, it cannot be started again.
pub struct HourGateEngine {
    sources: Vec<SourceConfig>,
    window_size: usize,
    span: BucketSpan,
    queue: Arc<IngestQueue>,
    consumer: Mutex<Option<BarrierConsumer<IngestMessage>>>,
    cancel: CancellationToken,
    state: Mutex<EngineRuntimeState>,
    failures: Arc<AtomicUsize>,
    reports: Mutex<Vec<WorkerReport>>,
}

impl HourGateEngine {
    pub fn new(config: &IngestConfig, sources: Vec<SourceConfig>) -> Self {
        let (queue, consumer) =
            IngestQueue::with_poll_interval(sources.len(), config.barrier_poll_interval());
        Self {
            window_size: config.window_size(),
            span: config.bucket_span(),
            sources,
            queue,
            consumer: Mutex::new(Some(consumer)),
            cancel: CancellationToken::new(),
            state: Mutex::new(EngineRuntimeState::Idle),
            failures: Arc::new(AtomicUsize::new(0)),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Builds the engine for the sources listed in `config`.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config, config.sources.clone())
    }

    /// Hands out the queue's only consumer; `None` once taken.
    pub fn take_consumer(&self) -> Option<BarrierConsumer<IngestMessage>> {
        self.consumer.lock().take()
    }

    pub fn queue(&self) -> &Arc<IngestQueue> {
        &self.queue
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Waits for every worker to reach the end of its file and returns their reports.
    pub fn join(&self) -> EngineResult<Vec<WorkerReport>> {
        let bundle = {
            let mut guard = self.state.lock();
            match guard.take_running() {
                Some(bundle) => bundle,
                None => return Err(EngineError::NotRunning),
            }
        };
        Ok(self.collect(bundle))
    }

    /// Cancels every worker, waits for them to exit and returns their reports.
    pub fn shutdown(&self) -> EngineResult<Vec<WorkerReport>> {
        let bundle = {
            let mut guard = self.state.lock();
            match &*guard {
                EngineRuntimeState::Idle | EngineRuntimeState::Finished => {
                    return Err(EngineError::NotRunning)
                }
                EngineRuntimeState::Joining => {
                    // Another caller is joining; it collects the reports.
                    self.cancel_workers();
                    return Ok(Vec::new());
                }
                EngineRuntimeState::Running(_) => {}
            }
            guard.take_running()
        };
        self.cancel_workers();
        let reports = match bundle {
            Some(bundle) => self.collect(bundle),
            None => Vec::new(),
        };
        info!("hourgate engine stopped");
        Ok(reports)
    }

    /// Asks every worker to stop without waiting for them; pair with [`join`](Self::join).
    pub fn cancel(&self) {
        self.cancel_workers();
    }

    /// Reports of every worker that has been joined so far.
    pub fn reports(&self) -> Vec<WorkerReport> {
        self.reports.lock().clone()
    }

    fn cancel_workers(&self) {
        self.cancel.cancel();
        self.queue.wake_all();
    }

    fn spawn_worker(&self, id: usize, source: &SourceConfig) -> EngineResult<WorkerHandle> {
        let symbol = resolve_symbol(source);
        let name = format!("ingest-{symbol}");
        let worker = IngestWorker::new(
            id,
            source.path.clone(),
            symbol,
            Arc::clone(&self.queue),
            self.window_size,
            self.cancel.child_token(),
        )
        .with_bucket_span(self.span);
        let failures = Arc::clone(&self.failures);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let result = worker.run();
                let failed = match &result {
                    Ok(report) => report.exit == ExitReason::Failed,
                    Err(_) => true,
                };
                if failed {
                    failures.fetch_add(1, Ordering::AcqRel);
                }
                result
            })
            .map_err(|source| {
                EngineError::failure(IngestError::Spawn {
                    name: name.clone(),
                    source,
                })
            })?;
        Ok((name, handle))
    }

    fn collect(&self, bundle: ThreadBundle) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(bundle.handles.len());
        for (name, handle) in bundle.handles {
            match handle.join() {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => warn!("{name} ended without a report: {err}"),
                Err(_) => {
                    self.failures.fetch_add(1, Ordering::AcqRel);
                    error!("{}", IngestError::WorkerPanicked { name });
                }
            }
        }
        reports.sort_by_key(|report| report.id);
        self.reports.lock().extend(reports.iter().cloned());
        *self.state.lock() = EngineRuntimeState::Finished;
        reports
    }
}

impl Engine for HourGateEngine {
    fn start(&self) -> EngineResult<()> {
        let mut guard = self.state.lock();
        match &*guard {
            EngineRuntimeState::Running(_) | EngineRuntimeState::Joining => {
                return Err(EngineError::AlreadyRunning)
            }
            EngineRuntimeState::Finished => return Err(EngineError::Finished),
            EngineRuntimeState::Idle => {}
        }

        let mut handles = Vec::with_capacity(self.sources.len());
        for (id, source) in self.sources.iter().enumerate() {
            match self.spawn_worker(id, source) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // The failed worker deregistered when dropped; the rest were never built.
                    for _ in id + 1..self.sources.len() {
                        self.queue.deregister_producer();
                    }
                    self.cancel_workers();
                    *guard = EngineRuntimeState::Finished;
                    drop(guard);
                    for (name, handle) in handles {
                        if handle.join().is_err() {
                            error!("{}", IngestError::WorkerPanicked { name });
                        }
                    }
                    return Err(err);
                }
            }
        }
        info!(
            "hourgate engine started ({} workers, {} byte windows, {}s buckets)",
            handles.len(),
            self.window_size,
            self.span.secs()
        );
        *guard = EngineRuntimeState::Running(ThreadBundle { handles });
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        self.shutdown().map(|_| ())
    }

    fn health(&self) -> EngineHealth {
        let failures = self.failures.load(Ordering::Acquire);
        let guard = self.state.lock();
        let running = matches!(
            *guard,
            EngineRuntimeState::Running(_) | EngineRuntimeState::Joining
        );
        if failures > 0 {
            return EngineHealth::degraded(failures);
        }
        if running {
            EngineHealth::new(HealthStatus::Ready, None)
        } else {
            EngineHealth::default()
        }
    }
}

impl Drop for HourGateEngine {
    fn drop(&mut self) {
        let bundle = self.state.get_mut().take_running();
        if let Some(bundle) = bundle {
            self.cancel_workers();
            self.collect(bundle);
        }
    }
}
