//! Account dimension keyed by the external key found in source files.
//!
//! Accounts are only ever created here; display name and retailer grouping are
//! filled in later by admin workflows.

use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub external_key: String,
    pub name: Option<String>,
    pub retailer_id: Option<Uuid>,
}

impl Account {
    pub fn unnamed(external_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_key: external_key.into(),
            name: None,
            retailer_id: None,
        }
    }
}

/// Account keys discovered within one batch, deduplicated, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct AccountKeys {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl AccountKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a key. Returns `true` the first time a key is seen in this batch.
    /// Blank keys are ignored.
    pub fn register(&mut self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() || self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.to_string());
        self.ordered.push(key.to_string());
        true
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_dedupes_and_trims() {
        let mut keys = AccountKeys::new();
        assert!(keys.register("Publix — Atlanta Division"));
        assert!(!keys.register("  Publix — Atlanta Division "));
        assert!(keys.register("Kroger"));
        assert!(!keys.register("   "));
        assert_eq!(keys.as_slice(), ["Publix — Atlanta Division", "Kroger"]);
    }
}
