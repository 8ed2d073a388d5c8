//! Spreadsheet output for one run.

use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::error::{MusterError, Result};
use crate::core::types::FieldRecord;

pub const SHEET_NAME: &str = "Muster Rolls";

/// `mnrega_<code>.xlsx`, with path separators and whitespace in the code
/// replaced by `_`.
pub fn artifact_file_name(work_identifier: &str) -> String {
    let safe: String = work_identifier
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("mnrega_{}.xlsx", safe)
}

pub fn artifact_path(output_dir: &Path, work_identifier: &str) -> PathBuf {
    output_dir.join(artifact_file_name(work_identifier))
}

/// Every distinct header across `records`, in the order first seen.
pub fn column_order(records: &[FieldRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in records.iter().flat_map(|r| r.keys()) {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.to_string());
        }
    }
    columns
}

/// Write `records` as one sheet at `path`: a bold header row, then one row
/// per record with empty cells for headers the record lacks. No records
/// gives a workbook with an empty sheet.
pub fn write_records(path: &Path, records: &[FieldRecord]) -> Result<()> {
    let columns = column_order(records);
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    if !columns.is_empty() {
        for (col, name) in columns.iter().enumerate() {
            worksheet.write_string_with_format(0, column_index(col)?, name, &header_format)?;
        }
        worksheet.set_freeze_panes(1, 0)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = u32::try_from(i + 1)
            .map_err(|_| MusterError::Artifact("too many rows for one sheet".to_string()))?;
        for (col, name) in columns.iter().enumerate() {
            if let Some(value) = record.get(name) {
                worksheet.write_string(row, column_index(col)?, value)?;
            }
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    workbook.save(path)?;
    info!(
        "💾 Wrote {} row(s) × {} column(s) to {}",
        records.len(),
        columns.len(),
        path.display()
    );
    Ok(())
}

fn column_index(col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| MusterError::Artifact("too many columns for one sheet".to_string()))
}
