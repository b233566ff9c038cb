// crates/issuesheet-services/src/sheet_store.rs

use issuesheet_core::SheetError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::sheet::{check_cell, Sheet, SheetResult};

/// Local SQLite workbook holding any number of named sheets
#[derive(Clone)]
pub struct SqliteWorkbook {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWorkbook {
    /// Open or create the workbook
    pub fn open(path: &Path) -> SheetResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SheetError::Storage(format!(
                        "Failed to create workbook directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Workbook that lives only as long as the process
    pub fn in_memory() -> SheetResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SheetResult<Self> {
        let workbook = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        workbook.init_schema()?;
        Ok(workbook)
    }

    /// Initialize database schema
    fn init_schema(&self) -> SheetResult<()> {
        self.conn.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS cells (
                sheet TEXT NOT NULL,
                row INTEGER NOT NULL,
                col INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (sheet, row, col)
            );

            CREATE TABLE IF NOT EXISTS validations (
                sheet TEXT NOT NULL,
                row INTEGER NOT NULL,
                col INTEGER NOT NULL,
                num_rows INTEGER NOT NULL,
                allowed TEXT NOT NULL,
                PRIMARY KEY (sheet, row, col)
            );

            CREATE INDEX IF NOT EXISTS idx_cells_sheet_col ON cells(sheet, col);",
        )?;
        Ok(())
    }

    /// Handle to one sheet; the sheet exists as soon as a cell is written
    pub fn sheet(&self, name: &str) -> SqliteSheet {
        SqliteSheet {
            name: name.to_string(),
            conn: Arc::clone(&self.conn),
        }
    }

    /// Names of sheets that hold at least one cell
    pub fn sheet_names(&self) -> SheetResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT sheet FROM cells ORDER BY sheet")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

/// One sheet of a `SqliteWorkbook`. Empty cells are not stored.
pub struct SqliteSheet {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

fn write_cell(
    conn: &Connection,
    sheet: &str,
    row: u32,
    column: u32,
    value: &str,
) -> rusqlite::Result<()> {
    if value.is_empty() {
        conn.execute(
            "DELETE FROM cells WHERE sheet = ?1 AND row = ?2 AND col = ?3",
            params![sheet, row, column],
        )?;
    } else {
        conn.execute(
            "INSERT INTO cells (sheet, row, col, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sheet, row, col) DO UPDATE SET value = excluded.value",
            params![sheet, row, column, value],
        )?;
    }
    Ok(())
}

impl Sheet for SqliteSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_row(&self) -> SheetResult<u32> {
        let row: u32 = self.conn.lock().query_row(
            "SELECT COALESCE(MAX(row), 0) FROM cells WHERE sheet = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(row)
    }

    fn last_column(&self) -> SheetResult<u32> {
        let column: u32 = self.conn.lock().query_row(
            "SELECT COALESCE(MAX(col), 0) FROM cells WHERE sheet = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(column)
    }

    fn get_value(&self, row: u32, column: u32) -> SheetResult<String> {
        check_cell(row, column)?;
        let value: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM cells WHERE sheet = ?1 AND row = ?2 AND col = ?3",
                params![self.name, row, column],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or_default())
    }

    fn get_rows(
        &self,
        row: u32,
        column: u32,
        num_rows: u32,
        num_columns: u32,
    ) -> SheetResult<Vec<Vec<String>>> {
        check_cell(row, column)?;
        let mut grid = vec![vec![String::new(); num_columns as usize]; num_rows as usize];
        if num_rows == 0 || num_columns == 0 {
            return Ok(grid);
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT row, col, value FROM cells
             WHERE sheet = ?1 AND row >= ?2 AND row < ?3 AND col >= ?4 AND col < ?5",
        )?;
        let cells = stmt.query_map(
            params![self.name, row, row + num_rows, column, column + num_columns],
            |r| Ok((r.get::<_, u32>(0)?, r.get::<_, u32>(1)?, r.get::<_, String>(2)?)),
        )?;
        for cell in cells {
            let (r, c, value) = cell?;
            grid[(r - row) as usize][(c - column) as usize] = value;
        }
        Ok(grid)
    }

    fn set_value(&self, row: u32, column: u32, value: &str) -> SheetResult<()> {
        check_cell(row, column)?;
        write_cell(&self.conn.lock(), &self.name, row, column, value)?;
        Ok(())
    }

    fn set_values(&self, row: u32, column: u32, values: &[Vec<String>]) -> SheetResult<()> {
        check_cell(row, column)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (r, line) in (row..).zip(values) {
            for (c, value) in (column..).zip(line) {
                write_cell(&tx, &self.name, r, c, value)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_row_before(&self, row: u32) -> SheetResult<()> {
        check_cell(row, 1)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        // Park shifted rows at negative positions so the primary key never collides
        tx.execute(
            "UPDATE cells SET row = -(row + 1) WHERE sheet = ?1 AND row >= ?2",
            params![self.name, row],
        )?;
        tx.execute(
            "UPDATE cells SET row = -row WHERE sheet = ?1 AND row < 0",
            params![self.name],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_row(&self, row: u32) -> SheetResult<()> {
        check_cell(row, 1)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM cells WHERE sheet = ?1 AND row = ?2",
            params![self.name, row],
        )?;
        tx.execute(
            "UPDATE cells SET row = -(row - 1) WHERE sheet = ?1 AND row > ?2",
            params![self.name, row],
        )?;
        tx.execute(
            "UPDATE cells SET row = -row WHERE sheet = ?1 AND row < 0",
            params![self.name],
        )?;
        tx.commit()?;
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
        let allowed = serde_json::to_string(allowed)
            .map_err(|e| SheetError::Storage(format!("Failed to encode validation list: {}", e)))?;
        self.conn.lock().execute(
            "INSERT INTO validations (sheet, row, col, num_rows, allowed) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(sheet, row, col) DO UPDATE SET num_rows = excluded.num_rows, allowed = excluded.allowed",
            params![self.name, row, column, num_rows, allowed],
        )?;
        Ok(())
    }

    fn validation_list(&self, row: u32, column: u32) -> SheetResult<Option<Vec<String>>> {
        check_cell(row, column)?;
        let allowed: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT allowed FROM validations
                 WHERE sheet = ?1 AND col = ?2 AND row <= ?3 AND ?3 < row + num_rows
                 ORDER BY row DESC LIMIT 1",
                params![self.name, column, row],
                |r| r.get(0),
            )
            .optional()?;

        allowed
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| {
                    SheetError::Storage(format!("Corrupt validation list: {}", e))
                })
            })
            .transpose()
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
    fn test_cells_round_trip() {
        let book = SqliteWorkbook::in_memory().unwrap();
        let sheet = book.sheet("Issues");
        sheet.set_values(3, 1, &[row(&["42", "title"])]).unwrap();

        assert_eq!(sheet.get_value(3, 2).unwrap(), "title");
        assert_eq!(sheet.last_row().unwrap(), 3);
        assert_eq!(sheet.last_column().unwrap(), 2);
        assert_eq!(book.sheet_names().unwrap(), vec!["Issues"]);
    }

    #[test]
    fn test_sheets_are_isolated() {
        let book = SqliteWorkbook::in_memory().unwrap();
        book.sheet("Issues").set_value(1, 1, "a").unwrap();
        assert_eq!(book.sheet("log").last_row().unwrap(), 0);
    }

    #[test]
    fn test_empty_value_deletes_cell() {
        let book = SqliteWorkbook::in_memory().unwrap();
        let sheet = book.sheet("Issues");
        sheet.set_value(4, 1, "x").unwrap();
        sheet.clear_value(4, 1).unwrap();
        assert_eq!(sheet.last_row().unwrap(), 0);
    }

    #[test]
    fn test_insert_row_shifts_down() {
        let book = SqliteWorkbook::in_memory().unwrap();
        let sheet = book.sheet("Issues");
        sheet
            .set_values(1, 1, &[row(&["1"]), row(&["2"]), row(&["3"])])
            .unwrap();

        sheet.insert_row_before(2).unwrap();
        assert_eq!(
            sheet.get_column(1, 1, 4).unwrap(),
            row(&["1", "", "2", "3"])
        );
    }

    #[test]
    fn test_delete_row_shifts_up() {
        let book = SqliteWorkbook::in_memory().unwrap();
        let sheet = book.sheet("Issues");
        sheet
            .set_values(1, 1, &[row(&["1", "a"]), row(&["2", "b"]), row(&["3", "c"])])
            .unwrap();

        sheet.delete_row(2).unwrap();
        assert_eq!(
            sheet.get_rows(1, 1, 3, 2).unwrap(),
            vec![row(&["1", "a"]), row(&["3", "c"]), row(&["", ""])]
        );
        assert_eq!(sheet.last_row().unwrap(), 2);
    }

    #[test]
    fn test_validation_list_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.db");
        {
            let book = SqliteWorkbook::open(&path).unwrap();
            book.sheet("Issues")
                .set_validation_list(3, 7, 300, &row(&["bug", "docs"]))
                .unwrap();
        }

        let book = SqliteWorkbook::open(&path).unwrap();
        let sheet = book.sheet("Issues");
        assert_eq!(
            sheet.validation_list(100, 7).unwrap(),
            Some(row(&["bug", "docs"]))
        );
        assert_eq!(sheet.validation_list(303, 7).unwrap(), None);
    }
}
