//! Process wiring: config -> tracker client, workbook sheets, column map,
//! engine and dispatcher.

use anyhow::{Context, Result};
use issuesheet_core::{AppError, ColumnMap, Config};
use issuesheet_services::{GitHubClient, Sheet, SqliteWorkbook};
use issuesheet_sync::{EventDispatcher, SheetSyncEngine};
use std::path::Path;
use std::sync::Arc;

/// Everything one invocation needs, built once at startup.
pub struct App {
    pub config: Config,
    pub columns: ColumnMap,
    pub dispatcher: EventDispatcher,
}

impl App {
    /// Load and validate the config, open the workbook and resolve the
    /// column map. Fails fast on any missing setting or column binding.
    pub fn build(config_path: Option<&Path>) -> Result<Self> {
        let (config, _) = Config::load_validated(config_path)?;

        let workbook = SqliteWorkbook::open(Path::new(&config.spreadsheet.id))
            .with_context(|| format!("Failed to open workbook {}", config.spreadsheet.id))?;
        let columns = resolve_columns(&config, &workbook.sheet(&config.spreadsheet.columns_sheet))?;

        let tracker = Arc::new(GitHubClient::new(&config.github)?);
        let engine = SheetSyncEngine::new(
            tracker,
            Arc::new(workbook.sheet(&config.spreadsheet.issues_sheet)),
            Arc::new(workbook.sheet(&config.spreadsheet.log_sheet)),
            &columns,
            &config.layout,
        );
        let dispatcher = EventDispatcher::new(engine, config.spreadsheet.issues_sheet.clone());

        tracing::info!(
            "Syncing {}/{} into {}",
            config.github.owner,
            config.github.repository,
            config.spreadsheet.id
        );

        Ok(Self {
            config,
            columns,
            dispatcher,
        })
    }
}

/// Column bindings from the `[columns]` table when present, otherwise from
/// the workbook's column-mapping sheet.
pub fn resolve_columns(config: &Config, columns_sheet: &dyn Sheet) -> Result<ColumnMap, AppError> {
    if let Some(bindings) = config.column_map() {
        return Ok(bindings?);
    }

    tracing::debug!("Reading column bindings from sheet {}", columns_sheet.name());
    let last_row = columns_sheet.last_row()?;
    let last_column = columns_sheet.last_column()?.max(3);
    let rows = if last_row == 0 {
        Vec::new()
    } else {
        columns_sheet.get_rows(1, 1, last_row, last_column)?
    };
    Ok(ColumnMap::from_rows(&rows)?)
}
