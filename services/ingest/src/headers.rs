//! Header normalization and alias-based column resolution.
//!
//! Source exports drift in column naming (`Call Point` vs `Callpoint` vs
//! `Customer`), padding and non-breaking spaces. Columns are resolved against
//! alias lists after normalization, first alias wins.

use crate::error::SchemaError;

/// How a [`ColumnSpec`] alias is compared against a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    /// Header starts with the alias, for labels with a variable suffix.
    Prefix,
}

/// A logical field and the header aliases it may appear under, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
    pub mode: MatchMode,
}

impl ColumnSpec {
    pub const fn exact(field: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            field,
            aliases,
            mode: MatchMode::Exact,
        }
    }

    pub const fn prefix(field: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            field,
            aliases,
            mode: MatchMode::Prefix,
        }
    }
}

/// Collapse whitespace variants (NBSP, thin/ideographic spaces, zero-width
/// space) into single ASCII spaces and trim. A leading BOM is dropped.
pub fn normalize_header(raw: &str) -> String {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let spaced: String = raw
        .chars()
        .map(|c| if c == '\u{200b}' { ' ' } else { c })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold(raw: &str) -> String {
    normalize_header(raw).to_lowercase()
}

/// A header row prepared for lookups.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    names: Vec<String>,
    folded: Vec<String>,
}

impl HeaderIndex {
    pub fn new<S: AsRef<str>>(header: &[S]) -> Self {
        let names: Vec<String> = header.iter().map(|h| normalize_header(h.as_ref())).collect();
        let folded = names.iter().map(|h| h.to_lowercase()).collect();
        Self { names, folded }
    }

    /// Normalized header names, in column order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// First column equal to any alias, trying aliases in order.
    pub fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            let alias = fold(alias);
            self.folded.iter().position(|h| *h == alias)
        })
    }

    /// First column starting with any prefix, trying prefixes in order.
    pub fn find_prefix(&self, prefixes: &[&str]) -> Option<usize> {
        prefixes.iter().find_map(|prefix| {
            let prefix = fold(prefix);
            self.folded.iter().position(|h| h.starts_with(&prefix))
        })
    }

    pub fn resolve(&self, spec: &ColumnSpec) -> Option<usize> {
        match spec.mode {
            MatchMode::Exact => self.find(spec.aliases),
            MatchMode::Prefix => self.find_prefix(spec.aliases),
        }
    }

    /// Resolve every required column or report all of the missing ones at once.
    pub fn require<const N: usize>(
        &self,
        upload: &'static str,
        specs: [&ColumnSpec; N],
    ) -> Result<[usize; N], SchemaError> {
        let mut found = [0usize; N];
        let mut missing = Vec::new();
        for (slot, spec) in found.iter_mut().zip(specs) {
            match self.resolve(spec) {
                Some(idx) => *slot = idx,
                None => missing.push(spec.field),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(SchemaError::MissingColumns {
                upload,
                fields: missing,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CALL_POINT: ColumnSpec =
        ColumnSpec::exact("Call Point", &["Call Point", "Callpoint", "Account", "Customer"]);

    #[test]
    fn test_normalize_collapses_unicode_spaces() {
        assert_eq!(normalize_header("  Call\u{00a0}\u{00a0}Point "), "Call Point");
        assert_eq!(normalize_header("Week\u{2009}Ending\u{3000}01-07-24"), "Week Ending 01-07-24");
        assert_eq!(normalize_header("Deal\u{200b}ID"), "Deal ID");
        assert_eq!(normalize_header("\u{feff}Geography"), "Geography");
    }

    #[test]
    fn test_find_is_case_and_space_insensitive() {
        let idx = HeaderIndex::new(&["Deal ID", "  call   POINT ", "PPG"]);
        assert_eq!(idx.resolve(&CALL_POINT), Some(1));
    }

    #[test]
    fn test_find_alias_priority() {
        // "Account" and "Customer" both present: the earlier alias wins.
        let idx = HeaderIndex::new(&["Customer", "Account"]);
        assert_eq!(idx.resolve(&CALL_POINT), Some(1));
    }

    #[test]
    fn test_find_unresolved() {
        let idx = HeaderIndex::new(&["Deal ID", "PPG"]);
        assert_eq!(idx.resolve(&CALL_POINT), None);
    }

    #[test]
    fn test_prefix_resolution() {
        let spec = ColumnSpec::prefix("Promo Type", &["Promo Type"]);
        let idx = HeaderIndex::new(&["Deal ID", "Promo Type (Q3 Calendar)"]);
        assert_eq!(idx.resolve(&spec), Some(1));
        // Exact mode would not see it.
        assert_eq!(idx.find(&["Promo Type"]), None);
    }

    #[test]
    fn test_require_reports_every_missing_field() {
        let ppg = ColumnSpec::exact("PPG", &["PPG"]);
        let deal = ColumnSpec::exact("Deal ID", &["Deal ID"]);
        let idx = HeaderIndex::new(&["Status"]);
        let err = idx.require("Promotions", [&deal, &CALL_POINT, &ppg]).unwrap_err();
        match err {
            SchemaError::MissingColumns { fields, .. } => {
                assert_eq!(fields, vec!["Deal ID", "Call Point", "PPG"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_require_returns_indices_in_spec_order() {
        let ppg = ColumnSpec::exact("PPG", &["PPG"]);
        let idx = HeaderIndex::new(&["PPG", "Callpoint"]);
        let [call_point, ppg] = idx.require("Budget", [&CALL_POINT, &ppg]).unwrap();
        assert_eq!((call_point, ppg), (1, 0));
    }

    proptest! {
        #[test]
        fn prop_padding_and_case_do_not_matter(
            left in "[ \u{00a0}\u{3000}]{0,4}",
            mid in "[ \u{00a0}\u{2009}]{1,4}",
            right in "[ \u{00a0}]{0,4}",
            upper in any::<bool>(),
        ) {
            let base = format!("{left}Call{mid}Point{right}");
            let header = if upper { base.to_uppercase() } else { base };
            let idx = HeaderIndex::new(&["Deal ID".to_string(), header]);
            prop_assert_eq!(idx.resolve(&CALL_POINT), Some(1));
        }

        #[test]
        fn prop_alias_order_irrelevant_when_one_alias_present(
            present in 0usize..4,
            shuffle in Just(vec!["Call Point", "Callpoint", "Account", "Customer"]).prop_shuffle(),
        ) {
            let aliases = ["Call Point", "Callpoint", "Account", "Customer"];
            let idx = HeaderIndex::new(&["PPG", aliases[present]]);
            prop_assert_eq!(idx.find(&aliases), Some(1));
            prop_assert_eq!(idx.find(&shuffle), Some(1));
        }
    }
}
