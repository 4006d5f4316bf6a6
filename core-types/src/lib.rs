//! Shared value types, bucket derivation, window sizing and configuration.

pub mod bucket;
pub mod config;
pub mod message;
pub mod sizing;

pub use bucket::{Bucket, BucketSpan};
pub use message::IngestMessage;
