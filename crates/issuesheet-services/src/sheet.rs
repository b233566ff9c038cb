//! Spreadsheet storage collaborator.
//!
//! A `Sheet` is a grid of string cells addressed by 1-based row and column.
//! An empty string is an empty cell. Implementations use interior mutability
//! so one sheet can be shared between the sync engine and the HTTP surface.

use issuesheet_core::SheetError;
use parking_lot::RwLock;

pub type SheetResult<T> = Result<T, SheetError>;

pub trait Sheet: Send + Sync {
    fn name(&self) -> &str;

    /// Last row holding a non-empty cell, 0 for an empty sheet.
    fn last_row(&self) -> SheetResult<u32>;

    /// Last column holding a non-empty cell, 0 for an empty sheet.
    fn last_column(&self) -> SheetResult<u32>;

    fn get_value(&self, row: u32, column: u32) -> SheetResult<String>;

    /// Rectangular read; cells outside the used area come back empty.
    fn get_rows(
        &self,
        row: u32,
        column: u32,
        num_rows: u32,
        num_columns: u32,
    ) -> SheetResult<Vec<Vec<String>>>;

    fn set_value(&self, row: u32, column: u32, value: &str) -> SheetResult<()>;

    /// Rectangular write anchored at (row, column).
    fn set_values(&self, row: u32, column: u32, values: &[Vec<String>]) -> SheetResult<()>;

    /// Insert an empty row at `row`, shifting it and everything below down.
    fn insert_row_before(&self, row: u32) -> SheetResult<()>;

    /// Remove `row`, shifting everything below up.
    fn delete_row(&self, row: u32) -> SheetResult<()>;

    /// Restrict `num_rows` cells of `column` starting at `row` to `allowed`.
    fn set_validation_list(
        &self,
        row: u32,
        column: u32,
        num_rows: u32,
        allowed: &[String],
    ) -> SheetResult<()>;

    /// Allowed values for a cell, if a validation list covers it.
    fn validation_list(&self, row: u32, column: u32) -> SheetResult<Option<Vec<String>>>;

    fn clear_value(&self, row: u32, column: u32) -> SheetResult<()> {
        self.set_value(row, column, "")
    }

    /// One column, top to bottom.
    fn get_column(&self, column: u32, row: u32, num_rows: u32) -> SheetResult<Vec<String>> {
        Ok(self
            .get_rows(row, column, num_rows, 1)?
            .into_iter()
            .map(|mut r| r.pop().unwrap_or_default())
            .collect())
    }

    /// Write `values` into the first row below the used area.
    fn append_row(&self, values: &[String]) -> SheetResult<()> {
        let row = self.last_row()? + 1;
        self.set_values(row, 1, &[values.to_vec()])
    }
}

pub(crate) fn check_cell(row: u32, column: u32) -> SheetResult<()> {
    if row == 0 || column == 0 {
        return Err(SheetError::InvalidCell {
            row,
            column,
            reason: "rows and columns are 1-based".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Validation {
    row: u32,
    column: u32,
    num_rows: u32,
    allowed: Vec<String>,
}

#[derive(Debug, Default)]
struct Grid {
    cells: Vec<Vec<String>>,
    validations: Vec<Validation>,
}

impl Grid {
    fn cell_mut(&mut self, row: u32, column: u32) -> &mut String {
        let (r, c) = ((row - 1) as usize, (column - 1) as usize);
        if self.cells.len() <= r {
            self.cells.resize_with(r + 1, Vec::new);
        }
        let line = &mut self.cells[r];
        if line.len() <= c {
            line.resize_with(c + 1, String::new);
        }
        &mut line[c]
    }

    fn get(&self, row: u32, column: u32) -> String {
        self.cells
            .get((row - 1) as usize)
            .and_then(|line| line.get((column - 1) as usize))
            .cloned()
            .unwrap_or_default()
    }
}

/// In-memory sheet.
#[derive(Debug)]
pub struct MemorySheet {
    name: String,
    grid: RwLock<Grid>,
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grid: RwLock::new(Grid::default()),
        }
    }

    /// Sheet pre-filled from row 1, column 1.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            grid: RwLock::new(Grid {
                cells: rows,
                validations: Vec::new(),
            }),
        }
    }

    /// Copy of the used area.
    pub fn rows(&self) -> Vec<Vec<String>> {
        let grid = self.grid.read();
        let last = last_used_row(&grid.cells);
        grid.cells[..last]
            .iter()
            .map(|line| {
                let end = line.iter().rposition(|v| !v.is_empty()).map_or(0, |i| i + 1);
                line[..end].to_vec()
            })
            .collect()
    }
}

fn last_used_row(cells: &[Vec<String>]) -> usize {
    cells
        .iter()
        .rposition(|line| line.iter().any(|v| !v.is_empty()))
        .map_or(0, |i| i + 1)
}

impl Sheet for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_row(&self) -> SheetResult<u32> {
        Ok(last_used_row(&self.grid.read().cells) as u32)
    }

    fn last_column(&self) -> SheetResult<u32> {
        let grid = self.grid.read();
        let last = grid
            .cells
            .iter()
            .filter_map(|line| line.iter().rposition(|v| !v.is_empty()))
            .max()
            .map_or(0, |i| i + 1);
        Ok(last as u32)
    }

    fn get_value(&self, row: u32, column: u32) -> SheetResult<String> {
        check_cell(row, column)?;
        Ok(self.grid.read().get(row, column))
    }

    fn get_rows(
        &self,
        row: u32,
        column: u32,
        num_rows: u32,
        num_columns: u32,
    ) -> SheetResult<Vec<Vec<String>>> {
        check_cell(row, column)?;
        let grid = self.grid.read();
        Ok((row..row + num_rows)
            .map(|r| (column..column + num_columns).map(|c| grid.get(r, c)).collect())
            .collect())
    }

    fn set_value(&self, row: u32, column: u32, value: &str) -> SheetResult<()> {
        check_cell(row, column)?;
        *self.grid.write().cell_mut(row, column) = value.to_string();
        Ok(())
    }

    fn set_values(&self, row: u32, column: u32, values: &[Vec<String>]) -> SheetResult<()> {
        check_cell(row, column)?;
        let mut grid = self.grid.write();
        for (r, line) in (row..).zip(values) {
            for (c, value) in (column..).zip(line) {
                *grid.cell_mut(r, c) = value.clone();
            }
        }
        Ok(())
    }

    fn insert_row_before(&self, row: u32) -> SheetResult<()> {
        check_cell(row, 1)?;
        let mut grid = self.grid.write();
        let index = (row - 1) as usize;
        if grid.cells.len() < index {
            grid.cells.resize_with(index, Vec::new);
        }
        grid.cells.insert(index, Vec::new());
        Ok(())
    }

    fn delete_row(&self, row: u32) -> SheetResult<()> {
        check_cell(row, 1)?;
        let mut grid = self.grid.write();
        let index = (row - 1) as usize;
        if index < grid.cells.len() {
            grid.cells.remove(index);
        }
        Ok(())
    }

    fn set_validation_list(
        &self,
        row: u32,
        column: u32,
        num_rows: u32,
        allowed: &[String],
    ) -> SheetResult<()> {
        check_cell(row, column)?;
        let mut grid = self.grid.write();
        grid.validations
            .retain(|v| !(v.row == row && v.column == column));
        grid.validations.push(Validation {
            row,
            column,
            num_rows,
            allowed: allowed.to_vec(),
        });
        Ok(())
    }

    fn validation_list(&self, row: u32, column: u32) -> SheetResult<Option<Vec<String>>> {
        check_cell(row, column)?;
        let grid = self.grid.read();
        Ok(grid
            .validations
            .iter()
            .rev()
            .find(|v| v.column == column && v.row <= row && row < v.row + v.num_rows)
            .map(|v| v.allowed.clone()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_empty_sheet() {
        let sheet = MemorySheet::new("Issues");
        assert_eq!(sheet.last_row().unwrap(), 0);
        assert_eq!(sheet.last_column().unwrap(), 0);
        assert_eq!(sheet.get_value(5, 5).unwrap(), "");
    }

    #[test]
    fn test_zero_based_address_rejected() {
        let sheet = MemorySheet::new("Issues");
        assert!(matches!(
            sheet.set_value(0, 1, "x"),
            Err(SheetError::InvalidCell { .. })
        ));
    }

    #[test]
    fn test_set_values_and_bounds() {
        let sheet = MemorySheet::new("Issues");
        sheet
            .set_values(3, 2, &[row(&["a", "b"]), row(&["c", "", "e"])])
            .unwrap();
        assert_eq!(sheet.last_row().unwrap(), 4);
        assert_eq!(sheet.last_column().unwrap(), 4);
        assert_eq!(sheet.get_value(4, 4).unwrap(), "e");
        assert_eq!(sheet.get_column(2, 2, 3).unwrap(), row(&["", "a", "c"]));
    }

    #[test]
    fn test_cleared_trailing_row_not_counted() {
        let sheet = MemorySheet::from_rows("Issues", vec![row(&["1"]), row(&["2"])]);
        sheet.clear_value(2, 1).unwrap();
        assert_eq!(sheet.last_row().unwrap(), 1);
    }

    #[test]
    fn test_insert_and_delete_shift_rows() {
        let sheet = MemorySheet::from_rows("Issues", vec![row(&["1"]), row(&["2"]), row(&["3"])]);
        sheet.insert_row_before(2).unwrap();
        assert_eq!(sheet.rows(), vec![row(&["1"]), row(&[]), row(&["2"]), row(&["3"])]);

        sheet.delete_row(1).unwrap();
        assert_eq!(sheet.rows(), vec![row(&[]), row(&["2"]), row(&["3"])]);
    }

    #[test]
    fn test_insert_past_end_pads() {
        let sheet = MemorySheet::new("Issues");
        sheet.insert_row_before(3).unwrap();
        sheet.set_value(3, 1, "7").unwrap();
        assert_eq!(sheet.last_row().unwrap(), 3);
    }

    #[test]
    fn test_append_row() {
        let sheet = MemorySheet::from_rows("log", vec![row(&["first"])]);
        sheet.append_row(&row(&["second", "detail"])).unwrap();
        assert_eq!(sheet.get_value(2, 2).unwrap(), "detail");
    }

    #[test]
    fn test_validation_list_range() {
        let sheet = MemorySheet::new("Issues");
        let labels = row(&["bug", "docs"]);
        sheet.set_validation_list(3, 7, 10, &labels).unwrap();
        assert_eq!(sheet.validation_list(3, 7).unwrap(), Some(labels.clone()));
        assert_eq!(sheet.validation_list(12, 7).unwrap(), Some(labels));
        assert_eq!(sheet.validation_list(13, 7).unwrap(), None);
        assert_eq!(sheet.validation_list(3, 6).unwrap(), None);
    }
}
