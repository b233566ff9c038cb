pub mod github;
pub mod sheet;
pub mod sheet_store;

pub use github::*;
pub use sheet::{MemorySheet, Sheet, SheetResult};
pub use sheet_store::{SqliteSheet, SqliteWorkbook};
