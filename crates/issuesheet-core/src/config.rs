use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a single-line message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracker credentials and repository
    pub github: GitHubConfig,

    /// Workbook identity and sheet names
    pub spreadsheet: SpreadsheetConfig,

    /// Fixed row positions of the issues sheet
    #[serde(default)]
    pub layout: SheetLayout,

    /// Symbolic column name -> 1-based column number.
    /// When absent the bindings are read from the workbook's columns sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<BTreeMap<String, u32>>,

    /// Inbound HTTP surface
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Repository owner (user or organisation)
    pub owner: String,

    /// Repository name
    pub repository: String,

    /// Personal access token; `GITHUB_ACCESS_TOKEN` overrides it
    #[serde(default)]
    pub access_token: String,

    /// REST API root
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

impl GitHubConfig {
    /// `{api_url}/repos/{owner}/{repository}`
    pub fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_url.trim_end_matches('/'),
            self.owner,
            self.repository
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadsheetConfig {
    /// Workbook identifier (path of the SQLite workbook)
    pub id: String,

    #[serde(default = "default_issues_sheet")]
    pub issues_sheet: String,

    #[serde(default = "default_log_sheet")]
    pub log_sheet: String,

    #[serde(default = "default_columns_sheet")]
    pub columns_sheet: String,
}

fn default_issues_sheet() -> String {
    "Issues".to_string()
}

fn default_log_sheet() -> String {
    "log".to_string()
}

fn default_columns_sheet() -> String {
    "columns".to_string()
}

/// Row positions baked into the issues sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    /// Row whose execution cell triggers a full refresh
    #[serde(default = "default_setup_row")]
    pub setup_row: u32,

    /// First data row written by a full refresh
    #[serde(default = "default_start_row")]
    pub start_row: u32,

    /// Row before which unseen issues are inserted
    #[serde(default = "default_anchor_row")]
    pub anchor_row: u32,

    /// First column written by a full refresh
    #[serde(default = "default_start_column")]
    pub start_column: u32,

    /// Number of rows that receive the label dropdown
    #[serde(default = "default_validation_rows")]
    pub validation_rows: u32,

    /// Only insert unseen issues when the sheet already reaches `anchor_row`
    #[serde(default)]
    pub require_anchor_populated: bool,
}

fn default_setup_row() -> u32 {
    2
}

fn default_start_row() -> u32 {
    3
}

fn default_anchor_row() -> u32 {
    3
}

fn default_start_column() -> u32 {
    1
}

fn default_validation_rows() -> u32 {
    300
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            setup_row: default_setup_row(),
            start_row: default_start_row(),
            anchor_row: default_anchor_row(),
            start_column: default_start_column(),
            validation_rows: default_validation_rows(),
            require_anchor_populated: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret for `X-Hub-Signature-256`; `ISSUESHEET_WEBHOOK_SECRET` overrides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_secret: None,
        }
    }
}

/// Resolved column positions of the issues sheet.
///
/// Built once at startup and shared by reference; every row operation
/// addresses cells through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub issue_id: u32,
    pub title: u32,
    pub labels: u32,
    pub assignees: u32,
    pub comment: u32,
    pub url: u32,
    pub send_labels: u32,
    pub send_mention: u32,
    pub send_comment: u32,
    pub execution: u32,
}

impl ColumnMap {
    pub const ISSUE_ID: &'static str = "ISSUE_ID";
    pub const TITLE: &'static str = "TITLE";
    pub const LABELS: &'static str = "LABELS";
    pub const ASSIGNEES: &'static str = "ASSIGNEES";
    pub const COMMENT: &'static str = "COMMENT";
    pub const URL: &'static str = "URL";
    pub const SEND_LABELS: &'static str = "SEND_LABELS";
    pub const SEND_MENTION: &'static str = "SEND_MENTION";
    pub const SEND_COMMENT: &'static str = "SEND_COMMENT";
    pub const EXECUTION: &'static str = "EXECUTION";

    pub const REQUIRED: [&'static str; 10] = [
        Self::ISSUE_ID,
        Self::TITLE,
        Self::LABELS,
        Self::ASSIGNEES,
        Self::COMMENT,
        Self::URL,
        Self::SEND_LABELS,
        Self::SEND_MENTION,
        Self::SEND_COMMENT,
        Self::EXECUTION,
    ];

    /// Resolve every required name, failing on the first one that is absent or zero.
    pub fn from_bindings(bindings: &BTreeMap<String, u32>) -> Result<Self, ConfigError> {
        let get = |name: &str| -> Result<u32, ConfigError> {
            match bindings.get(name) {
                Some(0) => Err(ConfigError::Invalid(format!(
                    "column {} must be 1 or greater",
                    name
                ))),
                Some(column) => Ok(*column),
                None => Err(ConfigError::MissingColumn(name.to_string())),
            }
        };

        let map = Self {
            issue_id: get(Self::ISSUE_ID)?,
            title: get(Self::TITLE)?,
            labels: get(Self::LABELS)?,
            assignees: get(Self::ASSIGNEES)?,
            comment: get(Self::COMMENT)?,
            url: get(Self::URL)?,
            send_labels: get(Self::SEND_LABELS)?,
            send_mention: get(Self::SEND_MENTION)?,
            send_comment: get(Self::SEND_COMMENT)?,
            execution: get(Self::EXECUTION)?,
        };
        map.check_distinct()?;
        Ok(map)
    }

    /// Parse the rows of a column-mapping sheet.
    ///
    /// The first row is a header. Each following row carries the symbolic
    /// name in its second cell and the column number in its third.
    pub fn from_rows(rows: &[Vec<String>]) -> Result<Self, ConfigError> {
        let mut bindings = BTreeMap::new();
        for (offset, row) in rows.iter().enumerate().skip(1) {
            let name = row.get(1).map(|s| s.trim()).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let raw = row.get(2).map(|s| s.trim()).unwrap_or_default();
            let column = parse_column_number(raw).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "column mapping row {} binds {} to non-numeric value {:?}",
                    offset + 1,
                    name,
                    raw
                ))
            })?;
            bindings.insert(name.to_string(), column);
        }
        Self::from_bindings(&bindings)
    }

    /// Bindings as a name -> column table, e.g. for writing a default config.
    pub fn to_bindings(&self) -> BTreeMap<String, u32> {
        self.entries()
            .into_iter()
            .map(|(name, column)| (name.to_string(), column))
            .collect()
    }

    /// Right-most bound column.
    pub fn max_column(&self) -> u32 {
        self.entries()
            .into_iter()
            .map(|(_, column)| column)
            .max()
            .unwrap_or(0)
    }

    fn entries(&self) -> [(&'static str, u32); 10] {
        [
            (Self::ISSUE_ID, self.issue_id),
            (Self::TITLE, self.title),
            (Self::LABELS, self.labels),
            (Self::ASSIGNEES, self.assignees),
            (Self::COMMENT, self.comment),
            (Self::URL, self.url),
            (Self::SEND_LABELS, self.send_labels),
            (Self::SEND_MENTION, self.send_mention),
            (Self::SEND_COMMENT, self.send_comment),
            (Self::EXECUTION, self.execution),
        ]
    }

    fn check_distinct(&self) -> Result<(), ConfigError> {
        let mut seen: HashMap<u32, &str> = HashMap::new();
        for (name, column) in self.entries() {
            if let Some(other) = seen.insert(column, name) {
                return Err(ConfigError::Invalid(format!(
                    "columns {} and {} both bound to column {}",
                    other, name, column
                )));
            }
        }
        Ok(())
    }
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            issue_id: 1,
            title: 2,
            labels: 3,
            assignees: 4,
            comment: 5,
            url: 6,
            send_labels: 7,
            send_mention: 8,
            send_comment: 9,
            execution: 10,
        }
    }
}

/// Spreadsheet cells often hold whole numbers as `3` or `3.0`.
fn parse_column_number(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
        .map(|f| f as u32)
}

impl Default for Config {
    fn default() -> Self {
        let workbook = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("issuesheet")
            .join("workbook.db");

        Self {
            github: GitHubConfig {
                owner: String::new(),
                repository: String::new(),
                access_token: String::new(),
                api_url: default_api_url(),
            },
            spreadsheet: SpreadsheetConfig {
                id: workbook.to_string_lossy().into_owned(),
                issues_sheet: default_issues_sheet(),
                log_sheet: default_log_sheet(),
                columns_sheet: default_columns_sheet(),
            },
            layout: SheetLayout::default(),
            columns: Some(ColumnMap::default().to_bindings()),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location), creating a
    /// default file if it doesn't exist, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            Self::from_toml_str(&contents)?
        } else {
            tracing::warn!(
                "No config at {}, writing a default one",
                config_path.display()
            );
            let config = Self::default();
            config.save(&config_path)?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = Self::load(path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(owner) = std::env::var("GITHUB_OWNER") {
            self.github.owner = owner;
        }
        if let Ok(repository) = std::env::var("GITHUB_REPOSITORY") {
            self.github.repository = repository;
        }
        if let Ok(token) = std::env::var("GITHUB_ACCESS_TOKEN") {
            self.github.access_token = token;
        }
        if let Ok(secret) = std::env::var("ISSUESHEET_WEBHOOK_SECRET") {
            self.server.webhook_secret = Some(secret);
        }
    }

    /// Column bindings from the config file, if the file carries them.
    pub fn column_map(&self) -> Option<Result<ColumnMap, ConfigError>> {
        self.columns.as_ref().map(ColumnMap::from_bindings)
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.github.owner.trim().is_empty() {
            result.add_error("github.owner", "Repository owner must be set");
        }
        if self.github.repository.trim().is_empty() {
            result.add_error("github.repository", "Repository name must be set");
        }
        if self.github.access_token.trim().is_empty() {
            result.add_warning(
                "github.access_token",
                "No access token - private repositories and all writes will fail",
            );
        }
        self.validate_url(&self.github.api_url, "github.api_url", &mut result);

        if self.spreadsheet.id.trim().is_empty() {
            result.add_error("spreadsheet.id", "Spreadsheet identifier must be set");
        }
        if self.spreadsheet.issues_sheet == self.spreadsheet.log_sheet {
            result.add_error(
                "spreadsheet.log_sheet",
                "Log sheet must differ from the issues sheet",
            );
        }

        let layout = &self.layout;
        if layout.setup_row == 0 || layout.start_row == 0 || layout.anchor_row == 0 {
            result.add_error("layout", "Row positions are 1-based and cannot be 0");
        }
        if layout.start_column == 0 {
            result.add_error("layout.start_column", "Columns are 1-based and cannot be 0");
        }
        if layout.start_row <= layout.setup_row {
            result.add_error(
                "layout.start_row",
                format!(
                    "Data must start below the setup row ({} <= {})",
                    layout.start_row, layout.setup_row
                ),
            );
        }
        if layout.anchor_row < layout.start_row {
            result.add_warning(
                "layout.anchor_row",
                "Anchor row is above the first data row; inserted rows will land in the header",
            );
        }

        if let Some(Err(e)) = self.column_map() {
            result.add_error("columns", e.to_string());
        }

        match &self.server.webhook_secret {
            None => result.add_warning(
                "server.webhook_secret",
                "Webhook secret not set - deliveries will not be authenticated",
            ),
            Some(secret) if secret.is_empty() => {
                result.add_error("server.webhook_secret", "Webhook secret cannot be empty")
            }
            Some(_) => {}
        }
        if self.server.port == 0 {
            result.add_error("server.port", "Port cannot be 0");
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the default path of the configuration file
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("issuesheet");

        Ok(config_dir.join("config.toml"))
    }
}
