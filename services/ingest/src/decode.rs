//! Turns an uploaded payload into a header row plus data rows.
//!
//! CSV is the primary format. Spreadsheet exports (xlsx, xls, ods) are read
//! from their first sheet so users do not have to re-save them as CSV.

use crate::error::DecodeError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use tracing::debug;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Raw string cells. Rows keep their original widths; nothing is trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Data rows paired with their spreadsheet line number (header is line 1).
    pub fn numbered_rows(&self) -> impl Iterator<Item = (i64, &[String])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i as i64 + 2, row.as_slice()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Workbook,
}

/// Pick the reader by extension, falling back to the file signature.
pub fn detect_format(filename: Option<&str>, bytes: &[u8]) -> Format {
    let by_extension = filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match by_extension.as_deref() {
        Some(ext) if WORKBOOK_EXTENSIONS.contains(&ext) => Format::Workbook,
        Some("csv") | Some("txt") => Format::Csv,
        _ if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => Format::Workbook,
        _ => Format::Csv,
    }
}

/// Read `bytes` into a [`Table`]. A table needs a header and at least one data row.
pub fn read_table(bytes: &[u8], filename: Option<&str>) -> Result<Table, DecodeError> {
    let records = match detect_format(filename, bytes) {
        Format::Csv => read_csv(bytes)?,
        Format::Workbook => read_workbook(bytes)?,
    };

    let mut records = records.into_iter();
    let header = records.next().ok_or(DecodeError::Empty)?;
    let rows: Vec<Vec<String>> = records.collect();
    if rows.is_empty() {
        return Err(DecodeError::Empty);
    }

    debug!(columns = header.len(), rows = rows.len(), "decoded table");
    Ok(Table { header, rows })
}

/// UTF-8 with a Windows-1252 fallback, which is what desktop Excel writes
/// for "CSV (Comma delimited)". A leading BOM is dropped.
pub fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, DecodeError> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>, DecodeError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| DecodeError::Workbook(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names
        .first()
        .ok_or_else(|| DecodeError::Workbook("workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| DecodeError::Workbook(e.to_string()))?;

    debug!(sheet = %first, size = ?range.get_size(), "reading first sheet");

    Ok(range
        .rows()
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Render a workbook cell the way it would appear in a CSV export.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string().to_uppercase(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%-m/%-d/%Y").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_basic() {
        let table = read_table(b"Geography,Product\nStoreA,SKU1\n", Some("a.csv")).unwrap();
        assert_eq!(table.header, ["Geography", "Product"]);
        assert_eq!(table.rows, vec![vec!["StoreA".to_string(), "SKU1".to_string()]]);
    }

    #[test]
    fn test_csv_with_bom() {
        let table = read_table("\u{feff}Deal ID,PPG\nD-1,X\n".as_bytes(), None).unwrap();
        assert_eq!(table.header[0], "Deal ID");
    }

    #[test]
    fn test_csv_ragged_rows_kept() {
        let table = read_table(b"a,b,c\n1\n1,2,3,4\n", None).unwrap();
        assert_eq!(table.rows[0].len(), 1);
        assert_eq!(table.rows[1].len(), 4);
    }

    #[test]
    fn test_csv_quoted_fields() {
        let table = read_table(b"Call Point,Volume\n\"Publix, Atlanta\",\"1,250\"\n", None).unwrap();
        assert_eq!(table.rows[0], ["Publix, Atlanta", "1,250"]);
    }

    #[test]
    fn test_csv_windows_1252_fallback() {
        // "Café" with 0xE9 for é
        let bytes = b"Call Point,PPG\nCaf\xe9,X\n";
        let table = read_table(bytes, Some("budget.csv")).unwrap();
        assert_eq!(table.rows[0][0], "Café");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(matches!(read_table(b"", None), Err(DecodeError::Empty)));
        assert!(matches!(read_table(b"Geography,Product\n", None), Err(DecodeError::Empty)));
        assert!(matches!(read_table(b"\n\n", None), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_numbered_rows_start_at_two() {
        let table = read_table(b"h\n1\n2\n", None).unwrap();
        let numbers: Vec<i64> = table.numbered_rows().map(|(n, _)| n).collect();
        assert_eq!(numbers, [2, 3]);
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Some("Actuals.XLSX"), b""), Format::Workbook);
        assert_eq!(detect_format(Some("promos.csv"), b"PK\x03\x04"), Format::Csv);
        assert_eq!(detect_format(Some("upload"), b"PK\x03\x04rest"), Format::Workbook);
        assert_eq!(detect_format(None, b"a,b\n"), Format::Csv);
    }

    #[test]
    fn test_garbage_workbook_is_decode_error() {
        let err = read_table(b"not a workbook", Some("x.xlsx")).unwrap_err();
        assert!(matches!(err, DecodeError::Workbook(_)));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(1250.0)), "1250");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(-5)), "-5");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String(" Publix ".into())), " Publix ");
    }
}
