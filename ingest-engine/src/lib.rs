//! Per-file ingest workers and the engine that runs them.
//!
//! Every source file gets its own [`IngestWorker`] thread that streams lines through a
//! [`mapped_window::MappedWindow`], tags them with a symbol and time bucket, and pushes
//! them onto one shared [`barrier_queue::BarrierQueue`]. Workers stop at each bucket
//! boundary until every other active worker has reached it, so the consumer sees the
//! buckets hand off cleanly across symbols.

pub mod engine;
pub mod error;
pub mod symbol;
pub mod worker;

pub use engine::HourGateEngine;
pub use engine_api::{Engine, EngineError, EngineHealth, EngineResult, HealthStatus};
pub use error::IngestError;
pub use symbol::{resolve_symbol, symbol_from_path};
pub use worker::{ExitReason, IngestQueue, IngestWorker, WorkerReport};
