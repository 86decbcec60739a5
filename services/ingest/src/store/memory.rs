use super::{AuditSink, IngestStore, StoreError};
use crate::audit::AuditEvent;
use crate::dimension::Account;
use crate::mapping::BatchAccumulator;
use crate::model::{ActualsWeeklyFact, BatchStatus, BudgetRaw, PromotionRaw, RowError, RowErrorDraft, UploadBatch};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    batches: Vec<UploadBatch>,
    errors: Vec<RowError>,
    accounts: Vec<Account>,
    account_index: HashMap<String, usize>,
    actuals: Vec<ActualsWeeklyFact>,
    promotions: Vec<PromotionRaw>,
    budget: Vec<BudgetRaw>,
    audit: Vec<AuditEvent>,
}

impl Tables {
    fn batch_mut(&mut self, batch_id: Uuid) -> Result<&mut UploadBatch, StoreError> {
        self.batches
            .iter_mut()
            .find(|b| b.id == batch_id)
            .ok_or(StoreError::UnknownBatch(batch_id))
    }

    /// Like `batch_mut`, but refuses a batch that already reached a terminal state.
    fn processing_batch_mut(&mut self, batch_id: Uuid) -> Result<&mut UploadBatch, StoreError> {
        let batch = self.batch_mut(batch_id)?;
        if batch.status.is_terminal() {
            return Err(StoreError::BatchFinished {
                id: batch_id,
                status: batch.status,
            });
        }
        Ok(batch)
    }
}

/// In-process store with the same commit semantics as [`super::PgStore`].
///
/// `fail_commits`, `fail_failures` and `fail_audit` make the next writes of
/// that kind fail, for exercising the failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_commits: AtomicBool,
    fail_failures: AtomicBool,
    fail_audit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make `fail_batch` error, as if the store went away mid-upload.
    pub fn fail_failures(&self, fail: bool) {
        self.fail_failures.store(fail, Ordering::SeqCst);
    }

    pub fn fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.tables.lock().await.accounts.clone()
    }

    pub async fn account_count(&self) -> usize {
        self.tables.lock().await.accounts.len()
    }

    pub async fn actuals(&self) -> Vec<ActualsWeeklyFact> {
        self.tables.lock().await.actuals.clone()
    }

    pub async fn promotions(&self) -> Vec<PromotionRaw> {
        self.tables.lock().await.promotions.clone()
    }

    pub async fn budget(&self) -> Vec<BudgetRaw> {
        self.tables.lock().await.budget.clone()
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.tables.lock().await.audit.clone()
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn create_batch(&self, batch: &UploadBatch) -> Result<(), StoreError> {
        self.tables.lock().await.batches.push(batch.clone());
        Ok(())
    }

    async fn commit_batch(&self, acc: &BatchAccumulator) -> Result<UploadBatch, StoreError> {
        let mut tables = self.tables.lock().await;
        // Validate before touching anything so a failure leaves no partial state.
        tables.processing_batch_mut(acc.batch_id())?;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }

        for key in acc.accounts.as_slice() {
            if !tables.account_index.contains_key(key) {
                let idx = tables.accounts.len();
                tables.accounts.push(Account::unnamed(key.clone()));
                tables.account_index.insert(key.clone(), idx);
            }
        }
        tables.actuals.extend(acc.facts.actuals.iter().cloned());
        tables.promotions.extend(acc.facts.promotions.iter().cloned());
        tables.budget.extend(acc.facts.budget.iter().cloned());

        let errors: Vec<RowError> = acc
            .errors
            .iter()
            .map(|draft| RowError::from_draft(acc.batch_id(), draft))
            .collect();
        tables.errors.extend(errors);

        let batch = tables.batch_mut(acc.batch_id())?;
        batch.status = BatchStatus::Processed;
        batch.row_count = acc.row_count();
        batch.error_count = acc.error_count();
        Ok(batch.clone())
    }

    async fn fail_batch(&self, batch_id: Uuid, message: &str) -> Result<UploadBatch, StoreError> {
        let mut tables = self.tables.lock().await;
        let batch = tables.processing_batch_mut(batch_id)?;
        if self.fail_failures.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("status update rejected".to_string()));
        }
        batch.status = BatchStatus::Failed;
        batch.row_count = 0;
        batch.error_count = 0;
        let failed = batch.clone();

        let draft = RowErrorDraft {
            row_number: None,
            message: message.to_string(),
            row_json: None,
        };
        tables.errors.push(RowError::from_draft(batch_id, &draft));
        Ok(failed)
    }

    async fn list_batches(&self, limit: i64) -> Result<Vec<UploadBatch>, StoreError> {
        let tables = self.tables.lock().await;
        let mut batches = tables.batches.clone();
        // Stable sort keeps insertion order for equal timestamps; reverse it for newest first.
        batches.reverse();
        batches.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        batches.truncate(limit.max(0) as usize);
        Ok(batches)
    }

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<UploadBatch>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.batches.iter().find(|b| b.id == batch_id).cloned())
    }

    async fn batch_errors(&self, batch_id: Uuid) -> Result<Vec<RowError>, StoreError> {
        let tables = self.tables.lock().await;
        let mut errors: Vec<RowError> = tables
            .errors
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .cloned()
            .collect();
        // None sorts before Some, so batch-level errors come first.
        errors.sort_by(|a, b| {
            a.row_number
                .cmp(&b.row_number)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(errors)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, event: &AuditEvent) -> Result<(), StoreError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log rejected".to_string()));
        }
        self.tables.lock().await.audit.push(event.clone());
        Ok(())
    }
}
