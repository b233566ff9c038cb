//! Issue number -> sheet row lookup over a point-in-time column snapshot.

use issuesheet_services::{Sheet, SheetResult};
use std::collections::HashMap;

/// Snapshot of the issue-id column, indexed by issue number.
///
/// Scanned top to bottom; when an id appears twice the upper row wins.
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    positions: HashMap<u64, u32>,
}

impl RowIndex {
    /// Index `cells`, the first of which sits at `first_row`.
    pub fn from_column(first_row: u32, cells: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (row, cell) in (first_row..).zip(cells) {
            if let Some(id) = parse_issue_id(cell) {
                positions.entry(id).or_insert(row);
            }
        }
        Self { positions }
    }

    /// Read `column` from row 1 down to the sheet's last used row.
    pub fn snapshot(sheet: &dyn Sheet, column: u32) -> SheetResult<Self> {
        let last_row = sheet.last_row()?;
        if last_row == 0 {
            return Ok(Self::default());
        }
        let cells = sheet.get_column(column, 1, last_row)?;
        Ok(Self::from_column(1, &cells))
    }

    /// Row holding `id`, or `None` when no row matches.
    pub fn find_row_by_issue_id(&self, id: u64) -> Option<u32> {
        self.positions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Issue number held in a cell. Spreadsheets hand integers back as `42` or
/// `42.0`; anything else (headers, blanks) is not an id.
pub fn parse_issue_id(cell: &str) -> Option<u64> {
    let cell = cell.trim();
    if let Ok(id) = cell.parse::<u64>() {
        return Some(id);
    }
    cell.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}
