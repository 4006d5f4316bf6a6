use std::{io, path::PathBuf};

use mapped_window::WindowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("window error on {path}: {source}")]
    Window {
        path: PathBuf,
        #[source]
        source: WindowError,
    },
    #[error("failed to spawn worker thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("worker thread {name} panicked")]
    WorkerPanicked { name: String },
}
