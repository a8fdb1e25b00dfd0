//! Spreadsheet layout of a changelog page, rendered to CSV.
//!
//! The layout keeps every cell's style so a binary workbook writer can be
//! driven from the same rows.

use super::extract::TrackedField;
use super::merge::{ChangeRow, ChangelogPage};
use crate::core::Result;
use serde::Serialize;
use std::io::Write;

pub const CONTENT_TYPE: &str = "application/vnd.ms-excel";
pub const SHEET_NAME: &str = "Issue Changelog";
pub const DATE_FORMAT: &str = "%m/%d/%Y";

pub const HEADERS: [&str; 7] = [
    "Date",
    "Title",
    "Issue Disposition",
    "Issue Type",
    "Issue Project",
    "Reported By",
    "Tickets",
];

pub const COLUMN_WIDTHS: [u32; 7] = [3000, 12000, 7000, 3500, 3000, 3000, 7000];

const COLUMNS: [Column; 7] = [
    Column::EntryDate,
    Column::Field(TrackedField::Title),
    Column::Field(TrackedField::IssueDisposition),
    Column::Field(TrackedField::IssueType),
    Column::Field(TrackedField::Project),
    Column::Field(TrackedField::ReportedBy),
    Column::Field(TrackedField::Tickets),
];

#[derive(Debug, Clone, Copy)]
enum Column {
    EntryDate,
    Field(TrackedField),
}

/// `Content-Disposition` header value for a download named `filename`.
pub fn content_disposition(filename: &str) -> String {
    format!("attachment; filename={}", filename)
}

/// Where a cell sits in its issue's block of change rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Border {
    Middle,
    Left,
    Right,
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Border {
    /// Corners win over edges; the first row wins over the last.
    pub fn for_cell(row: usize, col: usize, total_rows: usize, total_cols: usize) -> Self {
        let first_row = row == 0;
        let last_row = row + 1 == total_rows;

        if col == 0 {
            if first_row {
                Border::TopLeft
            } else if last_row {
                Border::BottomLeft
            } else {
                Border::Left
            }
        } else if col + 1 == total_cols {
            if first_row {
                Border::TopRight
            } else if last_row {
                Border::BottomRight
            } else {
                Border::Right
            }
        } else if first_row {
            Border::Top
        } else if last_row {
            Border::Bottom
        } else {
            Border::Middle
        }
    }

    /// Header cells only draw the outer vertical edges.
    fn for_header(col: usize, total_cols: usize) -> Self {
        if col == 0 {
            Border::Left
        } else if col + 1 == total_cols {
            Border::Right
        } else {
            Border::Middle
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "font")]
pub enum CellStyle {
    /// Bold, thick frame, spans all columns
    Label,
    Header { border: Border },
    /// Black text: a value this row changed
    Changed { border: Border, date: bool },
    /// Grey text: a value carried forward
    History { border: Border, date: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub text: String,
    pub style: CellStyle,
    /// Columns covered, 1 unless merged
    pub span: usize,
}

impl Cell {
    fn new(text: impl Into<String>, style: CellStyle) -> Self {
        Self {
            text: text.into(),
            style,
            span: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetRow {
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workbook {
    pub sheet_name: String,
    pub column_widths: Vec<u32>,
    pub rows: Vec<SheetRow>,
}

/// Lays out every issue of `page`: a blank row, the merged label, the
/// header, then one row per change.
pub fn render_workbook(page: &ChangelogPage) -> Workbook {
    let total_cols = COLUMNS.len();
    let mut rows = Vec::new();

    for issue in &page.issues {
        rows.push(SheetRow::default());

        let mut label = Cell::new(issue.label.clone(), CellStyle::Label);
        label.span = total_cols;
        rows.push(SheetRow { cells: vec![label] });

        rows.push(SheetRow {
            cells: HEADERS
                .iter()
                .enumerate()
                .map(|(col, header)| {
                    let border = Border::for_header(col, total_cols);
                    Cell::new(*header, CellStyle::Header { border })
                })
                .collect(),
        });

        let total_rows = issue.changes.len();
        for (row, change) in issue.changes.iter().enumerate() {
            rows.push(SheetRow {
                cells: COLUMNS
                    .iter()
                    .enumerate()
                    .map(|(col, column)| {
                        let border = Border::for_cell(row, col, total_rows, total_cols);
                        change_cell(change, *column, border)
                    })
                    .collect(),
            });
        }
    }

    Workbook {
        sheet_name: SHEET_NAME.to_string(),
        column_widths: COLUMN_WIDTHS.to_vec(),
        rows,
    }
}

fn change_cell(change: &ChangeRow, column: Column, border: Border) -> Cell {
    let field = match column {
        Column::EntryDate => {
            let text = change.entry_date.format(DATE_FORMAT).to_string();
            return Cell::new(text, CellStyle::Changed { border, date: true });
        }
        Column::Field(field) => field,
    };

    let (mut text, style) = match change.field(field) {
        Some(value) if !value.changed.is_empty() => (
            value.changed.clone(),
            CellStyle::Changed {
                border,
                date: false,
            },
        ),
        value => (
            value.map(|v| v.history.clone()).unwrap_or_default(),
            CellStyle::History {
                border,
                date: false,
            },
        ),
    };

    if field == TrackedField::Title && !text.is_empty() {
        text = format!("{} - {}", change.issue_id, text);
    }

    Cell::new(text, style)
}

/// Writes the workbook's text as CSV, one record per sheet row. Merged
/// cells are padded so every record has the same width.
pub fn write_csv<W: Write>(workbook: &Workbook, output: W) -> Result<()> {
    let width = workbook.column_widths.len();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);

    for row in &workbook.rows {
        let mut record: Vec<&str> = Vec::with_capacity(width);
        for cell in &row.cells {
            record.push(&cell.text);
            record.extend(std::iter::repeat_n("", cell.span.saturating_sub(1)));
        }
        record.resize(width.max(record.len()), "");
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
