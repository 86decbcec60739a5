//! Audit trail for uploads. One event per batch, written once the batch is terminal.

use crate::model::{UploadBatch, Uploader};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use uuid::Uuid;

pub const ACTION_UPLOAD: &str = "UPLOAD";
pub const ENTITY_UPLOAD_BATCH: &str = "upload_batch";

/// Where an audited action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSource {
    Ui,
    Upload,
    System,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::Ui => "ui",
            AuditSource::Upload => "upload",
            AuditSource::System => "system",
        }
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor_subject: Option<String>,
    pub actor_email: Option<String>,
    pub source: AuditSource,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub correlation_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// The event for a batch that has reached `Processed` or `Failed`.
    pub fn upload(batch: &UploadBatch, uploader: &Uploader, source: AuditSource, correlation_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_subject: uploader.subject.clone(),
            actor_email: uploader.email.as_ref().map(|e| e.to_lowercase()),
            source,
            action: ACTION_UPLOAD,
            entity_type: ENTITY_UPLOAD_BATCH,
            entity_id: batch.id,
            correlation_id: correlation_id.to_string(),
            metadata: json!({
                "kind": batch.kind,
                "filename": batch.original_filename,
                "row_count": batch.row_count,
                "error_count": batch.error_count,
                "status": batch.status,
            }),
            created_at: Utc::now(),
        }
    }
}
