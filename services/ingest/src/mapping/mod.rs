//! Kind-specific row mapping.
//!
//! A mapper is built once per batch from the resolved header and then fed
//! every data row. It writes facts, account keys and row errors into a
//! [`BatchAccumulator`] owned by the caller; nothing is written to storage
//! until the accumulator is committed as a whole.

mod actuals;
mod budget;
mod promotions;

pub use actuals::{ActualsMapper, WeekColumn};
pub use budget::BudgetMapper;
pub use promotions::PromotionsMapper;

use crate::dimension::AccountKeys;
use crate::error::SchemaError;
use crate::headers::HeaderIndex;
use crate::model::{ActualsWeeklyFact, BudgetRaw, PromotionRaw, RowErrorDraft, UploadKind};
use uuid::Uuid;

/// Maps one raw data row into the accumulator.
pub trait RowMapper: Send + Sync {
    /// `row_number` is the spreadsheet line (header is line 1).
    fn map_row(&self, row_number: i64, row: &[String], acc: &mut BatchAccumulator);
}

/// Resolve the header for `kind` and build its mapper. Fails fast on missing
/// required columns, before any row is read.
pub fn build_mapper(kind: UploadKind, header: &HeaderIndex) -> Result<Box<dyn RowMapper>, SchemaError> {
    Ok(match kind {
        UploadKind::ActualsWide => Box::new(ActualsMapper::resolve(header)?),
        UploadKind::Promotions => Box::new(PromotionsMapper::resolve(header)?),
        UploadKind::Budget => Box::new(BudgetMapper::resolve(header)?),
    })
}

/// Fact rows produced by a batch. Only the vector matching the batch kind is filled.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    pub actuals: Vec<ActualsWeeklyFact>,
    pub promotions: Vec<PromotionRaw>,
    pub budget: Vec<BudgetRaw>,
}

impl FactSet {
    pub fn len(&self) -> usize {
        self.actuals.len() + self.promotions.len() + self.budget.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything one batch produced, held in memory until the single commit.
#[derive(Debug, Clone)]
pub struct BatchAccumulator {
    batch_id: Uuid,
    pub facts: FactSet,
    pub accounts: AccountKeys,
    pub errors: Vec<RowErrorDraft>,
}

impl BatchAccumulator {
    pub fn new(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            facts: FactSet::default(),
            accounts: AccountKeys::new(),
            errors: Vec::new(),
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn row_count(&self) -> i64 {
        self.facts.len() as i64
    }

    pub fn error_count(&self) -> i64 {
        self.errors.len() as i64
    }

    pub fn push_error(&mut self, row_number: i64, message: impl Into<String>, row_json: serde_json::Value) {
        self.errors.push(RowErrorDraft {
            row_number: Some(row_number),
            message: message.into(),
            row_json: Some(row_json),
        });
    }
}

/// Trimmed cell text; missing trailing cells read as empty.
pub(crate) fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or("")
}

/// Cell for an optional column; `None` when the column is unresolved.
pub(crate) fn optional_cell(row: &[String], idx: Option<usize>) -> Option<&str> {
    idx.map(|i| cell(row, i))
}

/// Trimmed cell as an owned string, `None` when blank.
pub(crate) fn text(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Full `header -> raw value` snapshot kept with each row for audit and replay.
/// Cells past the end of a short row are recorded as null.
pub(crate) fn row_snapshot(header: &[String], row: &[String]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = header
        .iter()
        .enumerate()
        .map(|(j, h)| {
            let value = row
                .get(j)
                .map(|v| serde_json::Value::String(v.clone()))
                .unwrap_or(serde_json::Value::Null);
            (h.clone(), value)
        })
        .collect();
    serde_json::Value::Object(map)
}

#[cfg(test)]
pub(crate) fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}
