// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! xlsx export of an analytics report

use anyhow::{anyhow, Result};
use retailpivot_core::{ResultTable, Value};
use retailpivot_query::AnalyticsReport;
use std::io::Cursor;
use umya_spreadsheet::Worksheet;

pub const DETAIL_SHEET: &str = "Analytics";
pub const TOTAL_SHEET: &str = "Total";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Header row, then one row per table row. Null cells stay blank.
fn fill_sheet(sheet: &mut Worksheet, table: &ResultTable) {
    for (col, name) in table.columns().iter().enumerate() {
        sheet
            .get_cell_mut((col as u32 + 1, 1))
            .set_value(name.clone());
    }

    for (r, row) in table.rows().iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            let coordinate = (c as u32 + 1, r as u32 + 2);
            match value {
                Value::Null => {}
                Value::Int(v) => {
                    sheet.get_cell_mut(coordinate).set_value_number(*v as f64);
                }
                Value::Float(v) => {
                    sheet.get_cell_mut(coordinate).set_value_number(*v);
                }
                Value::Date(_) | Value::Text(_) => {
                    sheet.get_cell_mut(coordinate).set_value(value.to_string());
                }
            }
        }
    }
}

/// Write the detail rows to `Analytics` and a non-empty total to `Total`
pub fn write_workbook(report: &AnalyticsReport) -> Result<Vec<u8>> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();

    let sheet = book
        .new_sheet(DETAIL_SHEET)
        .map_err(|e| anyhow!("Failed to add sheet '{}': {}", DETAIL_SHEET, e))?;
    fill_sheet(sheet, &report.data);

    if let Some(total) = report.total_row() {
        let sheet = book
            .new_sheet(TOTAL_SHEET)
            .map_err(|e| anyhow!("Failed to add sheet '{}': {}", TOTAL_SHEET, e))?;
        fill_sheet(sheet, total);
    }

    let mut out = Cursor::new(Vec::<u8>::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut out)
        .map_err(|e| anyhow!("Failed to write workbook: {}", e))?;
    Ok(out.into_inner())
}
