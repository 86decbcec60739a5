//! Budget plans, one call point and PPG per row.

use super::promotions::{CALL_POINT, TR_SHARE};
use super::{cell, optional_cell, row_snapshot, text, BatchAccumulator, RowMapper};
use crate::error::SchemaError;
use crate::headers::{ColumnSpec, HeaderIndex};
use crate::model::BudgetRaw;
use crate::values::{parse_money, parse_number};
use uuid::Uuid;

const PPG_ITEM: ColumnSpec = ColumnSpec::exact("PPG - Item", &["PPG - Item", "PPG", "Product"]);
const TOTAL_CASES: ColumnSpec =
    ColumnSpec::exact("Total Cases Budgeted", &["Total Cases Budgeted", "Total Cases"]);
const WEEKS: ColumnSpec = ColumnSpec::exact("Weeks", &["Weeks"]);
const WEEKLY_VOLUME: ColumnSpec = ColumnSpec::exact(
    "Weekly Volume",
    &["Weekly Volume (cases per store)", "Weekly Volume"],
);
const SCAN_BACK: ColumnSpec = ColumnSpec::exact("Scan Back", &["Scan Back $ (per case)", "Scan Back"]);
const TR_NET_REVENUE: ColumnSpec = ColumnSpec::exact("TR Net Revenue", &["TR Net Revenue", "Net Revenue"]);

#[derive(Debug, Clone)]
pub struct BudgetMapper {
    header: Vec<String>,
    call_point: usize,
    ppg_item: usize,
    total_cases: usize,
    weeks: Option<usize>,
    weekly_volume: Option<usize>,
    tr_share: Option<usize>,
    scan_back: Option<usize>,
    tr_net_revenue: Option<usize>,
}

impl BudgetMapper {
    pub fn resolve(header: &HeaderIndex) -> Result<Self, SchemaError> {
        let [call_point, ppg_item, total_cases] =
            header.require("Budget", [&CALL_POINT, &PPG_ITEM, &TOTAL_CASES])?;

        Ok(Self {
            header: header.names().to_vec(),
            call_point,
            ppg_item,
            total_cases,
            weeks: header.resolve(&WEEKS),
            weekly_volume: header.resolve(&WEEKLY_VOLUME),
            tr_share: header.resolve(&TR_SHARE),
            scan_back: header.resolve(&SCAN_BACK),
            tr_net_revenue: header.resolve(&TR_NET_REVENUE),
        })
    }
}

impl RowMapper for BudgetMapper {
    fn map_row(&self, _row_number: i64, row: &[String], acc: &mut BatchAccumulator) {
        let call_point = cell(row, self.call_point);
        let ppg_item = cell(row, self.ppg_item);
        if call_point.is_empty() || ppg_item.is_empty() {
            return;
        }

        acc.accounts.register(call_point);

        let money = |idx| optional_cell(row, idx).and_then(parse_money);

        let batch_id = acc.batch_id();
        acc.facts.budget.push(BudgetRaw {
            id: Uuid::new_v4(),
            batch_id,
            call_point: call_point.to_string(),
            ppg_item: ppg_item.to_string(),
            weeks_text: optional_cell(row, self.weeks).and_then(text),
            weekly_volume_per_store: optional_cell(row, self.weekly_volume).and_then(parse_number),
            total_cases_budgeted: parse_number(cell(row, self.total_cases)),
            tr_share_of_discount: money(self.tr_share),
            scan_back_per_case: money(self.scan_back),
            tr_net_revenue: money(self.tr_net_revenue),
            row_json: row_snapshot(&self.header, row),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::strings;

    const HEADER: &[&str] = &[
        "Call Point",
        "PPG - Item",
        "Weeks",
        "Weekly Volume (cases per store)",
        "Total Cases Budgeted",
        "TR Share of Discount",
        "Scan Back $ (per case)",
        "TR Net Revenue",
    ];

    fn mapper() -> BudgetMapper {
        BudgetMapper::resolve(&HeaderIndex::new(HEADER)).unwrap()
    }

    #[test]
    fn test_full_row() {
        let mut acc = BatchAccumulator::new(Uuid::new_v4());
        let row = strings(&[
            "Kroger",
            "12oz Cans",
            "1-4, 9-12",
            "2.5",
            "1,000",
            "$0.50",
            "$1.10",
            "$12,345.67",
        ]);
        mapper().map_row(2, &row, &mut acc);

        let b = &acc.facts.budget[0];
        assert_eq!(b.call_point, "Kroger");
        assert_eq!(b.ppg_item, "12oz Cans");
        assert_eq!(b.weeks_text.as_deref(), Some("1-4, 9-12"));
        assert_eq!(b.weekly_volume_per_store, Some(2.5));
        assert_eq!(b.total_cases_budgeted, Some(1000.0));
        assert_eq!(b.tr_share_of_discount, Some(0.5));
        assert_eq!(b.scan_back_per_case, Some(1.1));
        assert_eq!(b.tr_net_revenue, Some(12345.67));
        assert_eq!(b.row_json["Weeks"], "1-4, 9-12");
        assert_eq!(acc.accounts.as_slice(), ["Kroger"]);
    }

    #[test]
    fn test_skip_without_call_point_or_ppg() {
        let mut acc = BatchAccumulator::new(Uuid::new_v4());
        let m = mapper();
        m.map_row(2, &strings(&["", "12oz Cans", "", "", "10"]), &mut acc);
        m.map_row(3, &strings(&["Kroger", " ", "", "", "10"]), &mut acc);
        assert_eq!(acc.row_count(), 0);
        assert!(acc.accounts.is_empty());
    }

    #[test]
    fn test_unparsable_total_is_null() {
        let mut acc = BatchAccumulator::new(Uuid::new_v4());
        mapper().map_row(2, &strings(&["Kroger", "PPG1", "", "", "TBD"]), &mut acc);
        let b = &acc.facts.budget[0];
        assert_eq!(b.total_cases_budgeted, None);
        assert_eq!(b.tr_net_revenue, None);
        assert_eq!(acc.error_count(), 0);
    }

    #[test]
    fn test_aliases() {
        let header = HeaderIndex::new(&["Customer", "Product", "Total Cases", "DA", "Net Revenue"]);
        let m = BudgetMapper::resolve(&header).unwrap();
        let mut acc = BatchAccumulator::new(Uuid::new_v4());
        m.map_row(2, &strings(&["Publix", "PPG2", "40", "$0.25", "$900"]), &mut acc);
        let b = &acc.facts.budget[0];
        assert_eq!(b.total_cases_budgeted, Some(40.0));
        assert_eq!(b.tr_share_of_discount, Some(0.25));
        assert_eq!(b.tr_net_revenue, Some(900.0));
        assert_eq!(b.weeks_text, None);
    }

    #[test]
    fn test_missing_required_columns() {
        let err = BudgetMapper::resolve(&HeaderIndex::new(&["Call Point", "Weeks"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Budget CSV missing required columns (PPG - Item, Total Cases Budgeted)"
        );
    }
}
