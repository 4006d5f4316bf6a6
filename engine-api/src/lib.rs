use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// A background engine the binary drives through start, stop and health checks.
pub trait Engine: Send + Sync {
    fn start(&self) -> EngineResult<()>;
    fn stop(&self) -> EngineResult<()>;
    fn health(&self) -> EngineHealth;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Ready,
    Degraded,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct EngineHealth {
    pub status: HealthStatus,
    pub detail: Option<String>,
}

impl EngineHealth {
    pub fn new(status: HealthStatus, detail: Option<String>) -> Self {
        Self { status, detail }
    }

    /// Degraded health carrying how many workers failed.
    pub fn degraded(failures: usize) -> Self {
        Self::new(
            HealthStatus::Degraded,
            Some(format!("{failures} worker(s) failed")),
        )
    }
}

impl Default for EngineHealth {
    fn default() -> Self {
        Self::new(HealthStatus::Stopped, None)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine already running")]
    AlreadyRunning,
    #[error("engine is not running")]
    NotRunning,
    /// Engines run once; a finished engine is rebuilt rather than restarted.
    #[error("engine has already run to completion")]
    Finished,
    #[error("engine encountered an error: {source}")]
    Failure {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EngineError {
    pub fn failure(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::Failure {
            source: Box::new(source),
        }
    }
}
