//! Ingestion pipeline for retail spreadsheet uploads.
//!
//! An upload (weekly actuals, promotions or budget) becomes one batch. The
//! payload is decoded, its header resolved against the kind's aliases, and
//! every row mapped into facts, account keys and row errors. The result is
//! committed atomically and the batch ends `processed` or `failed`, with one
//! audit event either way.

pub mod audit;
pub mod config;
pub mod decode;
pub mod dimension;
pub mod error;
pub mod headers;
pub mod mapping;
pub mod model;
pub mod orchestrator;
pub mod store;
pub mod telemetry;
pub mod values;

pub use audit::{AuditEvent, AuditSource};
pub use config::{Config, ConfigError};
pub use error::{DecodeError, IngestError, SchemaError};
pub use model::{BatchStatus, RowError, UploadBatch, UploadKind, Uploader};
pub use orchestrator::{IngestOutcome, IngestRequest, Ingestor};
pub use store::{AuditSink, IngestStore, MemoryStore, PgStore, StoreError};
