//! Wide-format weekly actuals: `Geography, Product, Week Ending MM-DD-YY, ...`.
//!
//! Each data row is unpivoted into one fact per non-blank week cell.

use super::{cell, BatchAccumulator, RowMapper};
use crate::error::SchemaError;
use crate::headers::{ColumnSpec, HeaderIndex};
use crate::model::ActualsWeeklyFact;
use crate::values::{parse_date_mmddyy, parse_number};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use uuid::Uuid;

const GEOGRAPHY: ColumnSpec = ColumnSpec::exact("Geography", &["Geography"]);
const PRODUCT: ColumnSpec = ColumnSpec::exact("Product", &["Product"]);

pub const NEGATIVE_VOLUME: &str = "Negative volume not allowed";

fn week_ending_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^Week Ending\s+([0-9]{1,2}-[0-9]{1,2}-[0-9]{2})$")
            .expect("week ending pattern is valid")
    })
}

/// A `Week Ending MM-DD-YY` column with its date parsed once at resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekColumn {
    pub index: usize,
    pub header: String,
    pub week_end: NaiveDate,
}

/// Week columns in header order. Headers whose date does not parse are ignored.
pub fn week_columns(header: &HeaderIndex) -> Vec<WeekColumn> {
    header
        .names()
        .iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let caps = week_ending_pattern().captures(name)?;
            let week_end = parse_date_mmddyy(&caps[1])?;
            Some(WeekColumn {
                index,
                header: name.clone(),
                week_end,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ActualsMapper {
    geography: usize,
    product: usize,
    weeks: Vec<WeekColumn>,
}

impl ActualsMapper {
    pub fn resolve(header: &HeaderIndex) -> Result<Self, SchemaError> {
        let [geography, product] = header.require("Actuals", [&GEOGRAPHY, &PRODUCT])?;
        let weeks = week_columns(header);
        if weeks.is_empty() {
            return Err(SchemaError::NoWeekColumns);
        }
        Ok(Self {
            geography,
            product,
            weeks,
        })
    }

    pub fn weeks(&self) -> &[WeekColumn] {
        &self.weeks
    }
}

impl RowMapper for ActualsMapper {
    fn map_row(&self, row_number: i64, row: &[String], acc: &mut BatchAccumulator) {
        let geography = cell(row, self.geography);
        let product = cell(row, self.product);
        // Blank trailing lines, not malformed data.
        if geography.is_empty() || product.is_empty() {
            return;
        }

        acc.accounts.register(geography);

        for week in &self.weeks {
            let Some(volume) = parse_number(cell(row, week.index)) else {
                continue;
            };

            if volume < 0.0 {
                acc.push_error(
                    row_number,
                    NEGATIVE_VOLUME,
                    json!({
                        "geography": geography,
                        "product": product,
                        "column": week.header,
                        "week_end_date": week.week_end,
                        "volume": volume,
                    }),
                );
                continue;
            }

            let batch_id = acc.batch_id();
            acc.facts.actuals.push(ActualsWeeklyFact {
                id: Uuid::new_v4(),
                batch_id,
                geography: geography.to_string(),
                product: product.to_string(),
                week_end_date: week.week_end,
                volume,
            });
        }
    }
}
