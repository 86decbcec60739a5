//! Batch orchestration: one upload in, one terminal batch and one audit event out.

use crate::audit::{AuditEvent, AuditSource};
use crate::decode::{read_table, Table};
use crate::error::{IngestError, SchemaError};
use crate::headers::HeaderIndex;
use crate::mapping::{build_mapper, BatchAccumulator};
use crate::model::{BatchStatus, UploadBatch, UploadKind, Uploader};
use crate::store::{AuditSink, IngestStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub kind: UploadKind,
    pub filename: Option<String>,
    pub uploader: Uploader,
    pub payload: Vec<u8>,
    /// Propagated request id. A fresh one is generated when absent.
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub batch_id: Uuid,
    pub correlation_id: String,
    pub status: BatchStatus,
    pub row_count: i64,
    pub error_count: i64,
    /// Batch-level failure message, set only when `status` is `Failed`.
    pub error: Option<String>,
}

impl IngestOutcome {
    pub fn is_processed(&self) -> bool {
        self.status == BatchStatus::Processed
    }
}

/// Resolve the header and feed every data row through the kind's mapper.
pub fn map_table(kind: UploadKind, table: &Table, batch_id: Uuid) -> Result<BatchAccumulator, SchemaError> {
    let header = HeaderIndex::new(&table.header);
    let mapper = build_mapper(kind, &header)?;
    let mut acc = BatchAccumulator::new(batch_id);
    for (row_number, row) in table.numbered_rows() {
        mapper.map_row(row_number, row, &mut acc);
    }
    Ok(acc)
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn IngestStore>,
    audit: Arc<dyn AuditSink>,
    max_upload_bytes: usize,
    source: AuditSource,
}

impl Ingestor {
    pub fn new(store: Arc<dyn IngestStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            source: AuditSource::Upload,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn with_source(mut self, source: AuditSource) -> Self {
        self.source = source;
        self
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn store(&self) -> &Arc<dyn IngestStore> {
        &self.store
    }

    /// Run one upload to a terminal batch.
    ///
    /// Returns `Err` only when no terminal batch could be recorded: the
    /// payload is over the size limit, or the store rejected creating or
    /// failing the batch. Every other failure comes back as a `Failed` outcome.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        if request.payload.len() > self.max_upload_bytes {
            return Err(IngestError::TooLarge {
                size: request.payload.len(),
                limit: self.max_upload_bytes,
            });
        }

        let correlation_id = request
            .correlation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let batch = UploadBatch::processing(request.kind, request.filename.clone(), &request.uploader);

        let span = info_span!(
            "ingest",
            batch_id = %batch.id,
            correlation_id = %correlation_id,
            kind = %request.kind,
        );
        self.run(batch, request, correlation_id).instrument(span).await
    }

    async fn run(
        &self,
        batch: UploadBatch,
        request: IngestRequest,
        correlation_id: String,
    ) -> Result<IngestOutcome, IngestError> {
        self.store.create_batch(&batch).await?;
        info!(
            filename = ?request.filename,
            bytes = request.payload.len(),
            uploaded_by = ?batch.uploaded_by,
            "batch created"
        );

        let (finished, error) = match self.process(&request, batch.id).await {
            Ok(committed) => {
                info!(rows = committed.row_count, errors = committed.error_count, "batch processed");
                (committed, None)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "batch failed");
                match self.store.fail_batch(batch.id, &message).await {
                    Ok(failed) => (failed, Some(message)),
                    Err(store_err) => {
                        error!(error = %store_err, "could not mark batch failed");
                        self.record_audit(&batch, &request.uploader, &correlation_id).await;
                        return Err(store_err.into());
                    }
                }
            }
        };

        self.record_audit(&finished, &request.uploader, &correlation_id).await;

        Ok(IngestOutcome {
            batch_id: finished.id,
            correlation_id,
            status: finished.status,
            row_count: finished.row_count,
            error_count: finished.error_count,
            error,
        })
    }

    /// Audit failures are logged and swallowed; the batch state is already settled.
    async fn record_audit(&self, batch: &UploadBatch, uploader: &Uploader, correlation_id: &str) {
        let event = AuditEvent::upload(batch, uploader, self.source, correlation_id);
        if let Err(err) = self.audit.record(&event).await {
            warn!(error = %err, "audit write failed");
        }
    }

    async fn process(&self, request: &IngestRequest, batch_id: Uuid) -> Result<UploadBatch, IngestError> {
        let table = read_table(&request.payload, request.filename.as_deref())?;
        let acc = map_table(request.kind, &table, batch_id)?;
        Ok(self.store.commit_batch(&acc).await?)
    }
}
