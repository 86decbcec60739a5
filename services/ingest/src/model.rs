//! Batch, error and fact records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which upload shape a batch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadKind {
    /// Weekly retailer actuals, one column per week ending date.
    #[serde(rename = "actuals_circana")]
    ActualsWide,
    #[serde(rename = "promotions")]
    Promotions,
    #[serde(rename = "budget")]
    Budget,
}

impl UploadKind {
    pub const ALL: [UploadKind; 3] = [
        UploadKind::ActualsWide,
        UploadKind::Promotions,
        UploadKind::Budget,
    ];

    /// Stored and wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::ActualsWide => "actuals_circana",
            UploadKind::Promotions => "promotions",
            UploadKind::Budget => "budget",
        }
    }

    /// Name used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            UploadKind::ActualsWide => "Actuals",
            UploadKind::Promotions => "Promotions",
            UploadKind::Budget => "Budget",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid kind: {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for UploadKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "actuals_circana" | "actuals" | "actualswide" | "actuals_wide" => {
                Ok(UploadKind::ActualsWide)
            }
            "promotions" => Ok(UploadKind::Promotions),
            "budget" => Ok(UploadKind::Budget),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Batch lifecycle. `Processing` moves exactly once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Processed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Processed => "processed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Processing)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown batch status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for BatchStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(BatchStatus::Processing),
            "processed" => Ok(BatchStatus::Processed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Authenticated caller, as handed over by the identity layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Uploader {
    /// Stable subject identifier from the identity provider.
    pub subject: Option<String>,
    pub email: Option<String>,
}

impl Uploader {
    pub fn new(subject: Option<String>, email: Option<String>) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            subject: clean(subject),
            email: clean(email),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.subject.is_none() && self.email.is_none()
    }

    /// Identity recorded on the batch: lower-cased email, falling back to subject.
    pub fn recorded_identity(&self) -> Option<String> {
        self.email
            .as_ref()
            .map(|e| e.to_lowercase())
            .or_else(|| self.subject.clone())
    }
}

/// One ingestion attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadBatch {
    pub id: Uuid,
    pub kind: UploadKind,
    pub original_filename: Option<String>,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub row_count: i64,
    pub error_count: i64,
}

impl UploadBatch {
    /// A fresh batch in `Processing`, created before any parsing happens.
    pub fn processing(kind: UploadKind, original_filename: Option<String>, uploader: &Uploader) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            original_filename,
            uploaded_by: uploader.recorded_identity(),
            uploaded_at: Utc::now(),
            status: BatchStatus::Processing,
            row_count: 0,
            error_count: 0,
        }
    }
}

/// A row-level problem found while mapping. `row_number` is `None` for
/// batch-level failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowErrorDraft {
    pub row_number: Option<i64>,
    pub message: String,
    pub row_json: Option<serde_json::Value>,
}

/// A persisted error attached to a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub row_number: Option<i64>,
    pub message: String,
    pub row_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl RowError {
    pub fn from_draft(batch_id: Uuid, draft: &RowErrorDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            row_number: draft.row_number,
            message: draft.message.clone(),
            row_json: draft.row_json.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn is_batch_level(&self) -> bool {
        self.row_number.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualsWeeklyFact {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub geography: String,
    pub product: String,
    pub week_end_date: NaiveDate,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionRaw {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub deal_id: Option<String>,
    pub promo_status: Option<String>,
    pub promo_type: Option<String>,
    pub call_point: Option<String>,
    pub ppg: Option<String>,
    pub promo_start_date: Option<NaiveDate>,
    pub promo_end_date: Option<NaiveDate>,
    pub cost_start_date: Option<NaiveDate>,
    pub cost_end_date: Option<NaiveDate>,
    pub scan_back_per_cs: Option<f64>,
    pub tr_share_of_discount: Option<f64>,
    pub forecasted_volume: Option<f64>,
    pub circana_geography: Option<String>,
    pub route_to_market: Option<String>,
    pub row_json: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetRaw {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub call_point: String,
    pub ppg_item: String,
    pub weeks_text: Option<String>,
    pub weekly_volume_per_store: Option<f64>,
    pub total_cases_budgeted: Option<f64>,
    pub tr_share_of_discount: Option<f64>,
    pub scan_back_per_case: Option<f64>,
    pub tr_net_revenue: Option<f64>,
    pub row_json: serde_json::Value,
}
