//! Workbook rendering.
//!
//! Records are sorted newest-revision first and split into one sheet per
//! workflow state:
//!
//! ```text
//! Sheet: To Do | Doing | Done
//! | ID | Title | State | Priority | Start Date | Target Date | Description |
//! |----|-------|-------|----------|------------|-------------|-------------|
//! | 42 | ...   | Doing | 2        | 2024-01-15 |             | ...         |
//! ```

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};

use crate::error::ReportResult;
use crate::model::work_item::{WorkItemId, WorkItemRecord, WorkflowState};

pub const HEADERS: [&str; 7] = [
    "ID",
    "Title",
    "State",
    "Priority",
    "Start Date",
    "Target Date",
    "Description",
];

const HEADER_FILL: u32 = 0xFFFF00;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

#[derive(Debug, Clone)]
pub struct SheetRows {
    pub state: WorkflowState,
    pub records: Vec<WorkItemRecord>,
}

/// Records routed to their sheets, plus whatever could not be placed.
#[derive(Debug, Clone)]
pub struct ReportSheets {
    sheets: [SheetRows; 3],
    pub dropped: Vec<WorkItemId>,
}

impl ReportSheets {
    pub fn sheet(&self, state: WorkflowState) -> &SheetRows {
        &self.sheets[state.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SheetRows> {
        self.sheets.iter()
    }
}

#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub path: PathBuf,
    pub rows: Vec<(WorkflowState, usize)>,
    pub dropped: Vec<WorkItemId>,
}

impl ReportSummary {
    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|(_, n)| n).sum()
    }
}

/// Sort by revision date (newest first, stable for ties) and route every
/// record to its state's sheet. Records with an unknown state are logged
/// and dropped.
pub fn partition(mut records: Vec<WorkItemRecord>) -> ReportSheets {
    records.sort_by(|a, b| b.revised_date.cmp(&a.revised_date));

    let mut sheets = WorkflowState::ALL.map(|state| SheetRows {
        state,
        records: Vec::new(),
    });
    let mut dropped = Vec::new();

    for record in records {
        match WorkflowState::parse(&record.state) {
            Ok(state) => sheets[state.index()].records.push(record),
            Err(e) => {
                tracing::warn!(id = %record.id, error = %e, "dropping work item from report");
                dropped.push(record.id);
            }
        }
    }

    ReportSheets { sheets, dropped }
}

/// The seven cells written for one record, in `HEADERS` order.
pub fn row_cells(record: &WorkItemRecord) -> [Cell; 7] {
    let text = |value: &Option<String>| match value {
        Some(v) if !v.is_empty() => Cell::Text(v.clone()),
        _ => Cell::Empty,
    };

    [
        Cell::Number(record.id.0 as f64),
        Cell::Text(record.title.clone()),
        Cell::Text(record.state.clone()),
        record.priority.map_or(Cell::Empty, |p| Cell::Number(f64::from(p))),
        text(&record.start_date),
        text(&record.target_date),
        text(&record.description),
    ]
}

/// Build the workbook for `records` and save it at `path`.
pub fn build_report(records: Vec<WorkItemRecord>, path: &Path) -> ReportResult<ReportSummary> {
    let sheets = partition(records);
    write_workbook(&sheets, path)?;

    let rows: Vec<(WorkflowState, usize)> = WorkflowState::ALL
        .into_iter()
        .map(|state| (state, sheets.sheet(state).records.len()))
        .collect();
    for (state, count) in &rows {
        tracing::info!(sheet = %state, rows = count, "wrote sheet");
    }
    tracing::info!(path = %path.display(), dropped = sheets.dropped.len(), "saved report");

    Ok(ReportSummary {
        path: path.to_path_buf(),
        rows,
        dropped: sheets.dropped,
    })
}

pub fn write_workbook(sheets: &ReportSheets, path: &Path) -> ReportResult<()> {
    let header = Format::new()
        .set_bold()
        .set_background_color(HEADER_FILL)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap();

    let mut workbook = Workbook::new();
    for rows in sheets.iter() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(rows.state.as_str())?;
        write_sheet(sheet, &rows.records, &header)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    workbook.save(path)?;
    Ok(())
}

fn write_sheet(
    sheet: &mut Worksheet,
    records: &[WorkItemRecord],
    header: &Format,
) -> ReportResult<()> {
    for (col, title) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, header)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, cell) in row_cells(record).iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Number(n) => {
                    sheet.write_number(row, col, *n)?;
                }
                Cell::Text(s) => {
                    sheet.write_string(row, col, s)?;
                }
                Cell::Empty => {}
            }
        }
    }

    sheet.autofit();
    Ok(())
}
