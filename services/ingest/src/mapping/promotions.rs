//! Promotion event exports, one deal per row.

use super::{cell, optional_cell, row_snapshot, text, BatchAccumulator, RowMapper};
use crate::error::SchemaError;
use crate::headers::{ColumnSpec, HeaderIndex};
use crate::model::PromotionRaw;
use crate::values::{parse_date_mdyyyy, parse_money, parse_number};
use uuid::Uuid;

pub(crate) const CALL_POINT: ColumnSpec =
    ColumnSpec::exact("Call Point", &["Call Point", "Callpoint", "Account", "Customer"]);
pub(crate) const TR_SHARE: ColumnSpec = ColumnSpec::exact(
    "TR Share of Discount",
    &["TR Share of Discount", "DA", "Depletion Allowance", "TR Share"],
);

const DEAL_ID: ColumnSpec = ColumnSpec::exact("Deal ID", &["Deal ID", "DealID", "Deal Id"]);
const PROMO_STATUS: ColumnSpec = ColumnSpec::exact("Promo Status", &["Promo Status", "Status"]);
const PPG: ColumnSpec = ColumnSpec::exact("PPG", &["PPG", "PPG - Item", "Product", "PPG Item"]);
const PROMO_TYPE: ColumnSpec = ColumnSpec::prefix("Promo Type", &["Promo Type"]);
const COST_START: ColumnSpec = ColumnSpec::exact("Cost Start Date", &["Cost Start Date", "Cost Start"]);
const COST_END: ColumnSpec = ColumnSpec::exact("Cost End Date", &["Cost End Date", "Cost End"]);
const PROMO_START: ColumnSpec = ColumnSpec::exact("Promo Start Date", &["Promo Start Date", "Promo Start"]);
const PROMO_END: ColumnSpec = ColumnSpec::exact("Promo End Date", &["Promo End Date", "Promo End"]);
const SCAN_BACK: ColumnSpec = ColumnSpec::exact(
    "Scan Back",
    &["Scan Back (per cs)", "Scan Back", "Scan Back $ (per case)"],
);
const FORECAST_VOLUME: ColumnSpec = ColumnSpec::exact(
    "Forecasted Volume",
    &["Forecasted Volume", "Forecast Volume", "Forecast"],
);
const CIRCANA_GEOGRAPHY: ColumnSpec =
    ColumnSpec::exact("Circana Geography", &["Circana Geography", "Geography"]);
const ROUTE_TO_MARKET: ColumnSpec = ColumnSpec::exact("Route to Market", &["Route to Market", "RTM"]);

#[derive(Debug, Clone)]
pub struct PromotionsMapper {
    header: Vec<String>,
    deal_id: usize,
    call_point: usize,
    promo_status: usize,
    ppg: usize,
    promo_type: Option<usize>,
    cost_start: Option<usize>,
    cost_end: Option<usize>,
    promo_start: Option<usize>,
    promo_end: Option<usize>,
    scan_back: Option<usize>,
    tr_share: Option<usize>,
    forecast_volume: Option<usize>,
    circana_geography: Option<usize>,
    route_to_market: Option<usize>,
}

impl PromotionsMapper {
    pub fn resolve(header: &HeaderIndex) -> Result<Self, SchemaError> {
        let [deal_id, call_point, promo_status, ppg] =
            header.require("Promotions", [&DEAL_ID, &CALL_POINT, &PROMO_STATUS, &PPG])?;

        Ok(Self {
            header: header.names().to_vec(),
            deal_id,
            call_point,
            promo_status,
            ppg,
            promo_type: header.resolve(&PROMO_TYPE),
            cost_start: header.resolve(&COST_START),
            cost_end: header.resolve(&COST_END),
            promo_start: header.resolve(&PROMO_START),
            promo_end: header.resolve(&PROMO_END),
            scan_back: header.resolve(&SCAN_BACK),
            tr_share: header.resolve(&TR_SHARE),
            forecast_volume: header.resolve(&FORECAST_VOLUME),
            circana_geography: header.resolve(&CIRCANA_GEOGRAPHY),
            route_to_market: header.resolve(&ROUTE_TO_MARKET),
        })
    }
}

impl RowMapper for PromotionsMapper {
    fn map_row(&self, _row_number: i64, row: &[String], acc: &mut BatchAccumulator) {
        let deal_id = cell(row, self.deal_id);
        let call_point = cell(row, self.call_point);
        let ppg = cell(row, self.ppg);
        if deal_id.is_empty() && call_point.is_empty() && ppg.is_empty() {
            return;
        }

        acc.accounts.register(call_point);

        let date = |idx| optional_cell(row, idx).and_then(parse_date_mdyyyy);
        let money = |idx| optional_cell(row, idx).and_then(parse_money);
        let label = |idx| optional_cell(row, idx).and_then(text);

        let batch_id = acc.batch_id();
        acc.facts.promotions.push(PromotionRaw {
            id: Uuid::new_v4(),
            batch_id,
            deal_id: text(deal_id),
            promo_status: text(cell(row, self.promo_status)),
            promo_type: label(self.promo_type),
            call_point: text(call_point),
            ppg: text(ppg),
            promo_start_date: date(self.promo_start),
            promo_end_date: date(self.promo_end),
            cost_start_date: date(self.cost_start),
            cost_end_date: date(self.cost_end),
            scan_back_per_cs: money(self.scan_back),
            tr_share_of_discount: money(self.tr_share),
            forecasted_volume: optional_cell(row, self.forecast_volume).and_then(parse_number),
            circana_geography: label(self.circana_geography),
            route_to_market: label(self.route_to_market),
            row_json: row_snapshot(&self.header, row),
        });
    }
}
