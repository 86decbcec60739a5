//! Error types for the ingestion pipeline.
//!
//! Only batch-level failures are errors. Row-level problems are collected as
//! data in the batch accumulator and never surface through these types.

use crate::store::StoreError;

/// The upload's header row cannot be mapped to the kind's canonical fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{upload} CSV missing required columns ({})", .fields.join(", "))]
    MissingColumns {
        upload: &'static str,
        fields: Vec<&'static str>,
    },

    #[error("Actuals CSV must contain columns like \"Week Ending 01-07-24\"")]
    NoWeekColumns,
}

/// The payload cannot be turned into a header row plus data rows.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("CSV appears empty")]
    Empty,

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read spreadsheet: {0}")]
    Workbook(String),
}

/// Batch-level failure. Every variant ends the batch as `failed`, except
/// `TooLarge`, which rejects the upload before a batch exists.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("File too large (max {} MB).", .limit / (1024 * 1024))]
    TooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_fields() {
        let err = SchemaError::MissingColumns {
            upload: "Budget",
            fields: vec!["Call Point", "Total Cases"],
        };
        assert_eq!(
            err.to_string(),
            "Budget CSV missing required columns (Call Point, Total Cases)"
        );
    }

    #[test]
    fn test_too_large_message() {
        let err = IngestError::TooLarge {
            size: 11 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        assert_eq!(err.to_string(), "File too large (max 10 MB).");
    }
}
