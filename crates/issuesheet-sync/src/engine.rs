//! Reconciliation core.
//!
//! Every operation reads the tracker first and writes the sheet last, so a
//! failed remote call leaves the sheet untouched. Only `full_refresh`
//! swallows its errors (into the audit log); everything else propagates.

use chrono::Utc;
use issuesheet_core::{AppError, ColumnMap, SheetError, SheetLayout};
use issuesheet_services::{latest_comment, Issue, IssueTracker, Sheet};
use serde::Serialize;
use std::sync::Arc;

use crate::format::{compose_comment, hyperlink_formula, join_list, merge_labels, parse_label_input};
use crate::row_index::{parse_issue_id, RowIndex};

/// What an operation did to the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SyncOutcome {
    Refreshed { rows: usize },
    RefreshFailed { error: String },
    LabelVocabulary { labels: usize },
    LabelVocabularyFailed { error: String },
    Deleted { row: u32 },
    Updated { row: u32 },
    Inserted { row: u32 },
    LabelsPushed { row: u32, labels: Vec<String> },
    CommentPosted { row: u32 },
    /// No row carries the issue
    NoRow,
    /// The transient input cells were empty
    NothingToSend,
    /// Unseen issue on a sheet shorter than the anchor row
    NotInserted,
}

pub struct SheetSyncEngine {
    tracker: Arc<dyn IssueTracker>,
    issues: Arc<dyn Sheet>,
    log: Arc<dyn Sheet>,
    columns: ColumnMap,
    layout: SheetLayout,
}

impl SheetSyncEngine {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        issues: Arc<dyn Sheet>,
        log: Arc<dyn Sheet>,
        columns: &ColumnMap,
        layout: &SheetLayout,
    ) -> Self {
        Self {
            tracker,
            issues,
            log,
            columns: *columns,
            layout: *layout,
        }
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    /// Append a timestamped line to the audit log sheet.
    pub fn record(&self, message: &str, detail: &str) -> Result<(), SheetError> {
        self.log.append_row(&[
            Utc::now().to_rfc3339(),
            message.to_string(),
            detail.to_string(),
        ])
    }

    /// Pull every open issue into the sheet, newest first, starting at the
    /// start row. Errors are written to the audit log instead of returned.
    pub async fn full_refresh(&self) -> SyncOutcome {
        match self.try_full_refresh().await {
            Ok(rows) => {
                tracing::info!("Full refresh wrote {} rows", rows);
                SyncOutcome::Refreshed { rows }
            }
            Err(e) => {
                tracing::error!("Full refresh failed: {}", e);
                if let Err(log_err) = self.record("Error populating sheet with issues:", &e.to_string()) {
                    tracing::error!("Could not record refresh failure: {}", log_err);
                }
                SyncOutcome::RefreshFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_full_refresh(&self) -> Result<usize, AppError> {
        let mut issues = self.tracker.list_open_issues().await?;
        issues.sort_by(|a, b| b.number.cmp(&a.number));

        let first_column = self.layout.start_column;
        let last_column = self.issues.last_column()?.max(self.columns.max_column());
        let width = last_column.saturating_sub(first_column) + 1;

        // Fetch everything before touching the sheet
        let mut data = Vec::with_capacity(issues.len());
        for issue in &issues {
            let comments = self.tracker.list_comments(issue.number).await?;
            let latest = latest_comment(&comments)
                .map(|c| c.body_text())
                .filter(|body| !body.is_empty())
                .unwrap_or(issue.body_text());
            data.push(self.render_row(issue, latest, first_column, width));
        }

        if !data.is_empty() {
            self.issues
                .set_values(self.layout.start_row, first_column, &data)?;
        }
        Ok(data.len())
    }

    /// One full row; transient input cells are written empty.
    fn render_row(&self, issue: &Issue, comment: &str, first_column: u32, width: u32) -> Vec<String> {
        let mut row = vec![String::new(); width as usize];
        let cells = [
            (self.columns.issue_id, issue.number.to_string()),
            (self.columns.title, hyperlink_formula(&issue.html_url, &issue.title)),
            (self.columns.labels, join_list(&issue.label_names())),
            (self.columns.assignees, join_list(&issue.assignee_logins())),
            (self.columns.comment, comment.to_string()),
            (self.columns.url, issue.html_url.clone()),
        ];
        for (column, value) in cells {
            if let Some(slot) = column
                .checked_sub(first_column)
                .and_then(|offset| row.get_mut(offset as usize))
            {
                *slot = value;
            }
        }
        row
    }

    fn snapshot(&self) -> Result<RowIndex, SheetError> {
        RowIndex::snapshot(self.issues.as_ref(), self.columns.issue_id)
    }

    /// Remove the closed issue's row, if any.
    pub async fn on_issue_closed(&self, id: u64) -> Result<SyncOutcome, AppError> {
        let Some(row) = self.snapshot()?.find_row_by_issue_id(id) else {
            tracing::debug!("Closed issue #{} has no row", id);
            return Ok(SyncOutcome::NoRow);
        };
        self.issues.delete_row(row)?;
        tracing::info!("Deleted row {} for closed issue #{}", row, id);
        Ok(SyncOutcome::Deleted { row })
    }

    /// Upsert from the issue snapshot carried by the event: update the
    /// existing row in place, or insert a fresh row at the anchor.
    pub async fn on_issue_opened_or_reopened(&self, issue: &Issue) -> Result<SyncOutcome, AppError> {
        if let Some(row) = self.snapshot()?.find_row_by_issue_id(issue.number) {
            self.write_issue_fields(row, issue)?;
            tracing::info!("Updated row {} for issue #{}", row, issue.number);
            return Ok(SyncOutcome::Updated { row });
        }

        let anchor = self.layout.anchor_row;
        if self.layout.require_anchor_populated && self.issues.last_row()? < anchor {
            tracing::warn!(
                "Issue #{} not inserted: sheet ends above anchor row {}",
                issue.number,
                anchor
            );
            return Ok(SyncOutcome::NotInserted);
        }

        self.issues.insert_row_before(anchor)?;
        self.issues
            .set_value(anchor, self.columns.issue_id, &issue.number.to_string())?;
        self.write_issue_fields(anchor, issue)?;
        tracing::info!("Inserted row {} for issue #{}", anchor, issue.number);
        Ok(SyncOutcome::Inserted { row: anchor })
    }

    fn write_issue_fields(&self, row: u32, issue: &Issue) -> Result<(), SheetError> {
        let sheet = &self.issues;
        sheet.set_value(
            row,
            self.columns.title,
            &hyperlink_formula(&issue.html_url, &issue.title),
        )?;
        sheet.set_value(row, self.columns.labels, &join_list(&issue.label_names()))?;
        sheet.set_value(row, self.columns.assignees, &join_list(&issue.assignee_logins()))?;
        sheet.set_value(row, self.columns.comment, issue.body_text())?;
        sheet.set_value(row, self.columns.url, &issue.html_url)?;
        Ok(())
    }

    /// Mirror the newest comment into the comment column. `fallback_body`
    /// is used when the issue turns out to have no comments.
    pub async fn on_comment_created(
        &self,
        id: u64,
        fallback_body: Option<&str>,
    ) -> Result<SyncOutcome, AppError> {
        let comments = self.tracker.list_comments(id).await?;
        let body = latest_comment(&comments)
            .map(|c| c.body_text())
            .or(fallback_body)
            .unwrap_or_default();

        self.overwrite_cell(id, self.columns.comment, body)
    }

    /// Mirror the tracker's current label set into the labels column.
    pub async fn on_labels_changed(&self, id: u64) -> Result<SyncOutcome, AppError> {
        let issue = self.tracker.get_issue(id).await?;
        self.overwrite_cell(id, self.columns.labels, &join_list(&issue.label_names()))
    }

    /// Mirror the tracker's current assignees into the assignees column.
    pub async fn on_assignees_changed(&self, id: u64) -> Result<SyncOutcome, AppError> {
        let issue = self.tracker.get_issue(id).await?;
        self.overwrite_cell(
            id,
            self.columns.assignees,
            &join_list(&issue.assignee_logins()),
        )
    }

    fn overwrite_cell(&self, id: u64, column: u32, value: &str) -> Result<SyncOutcome, AppError> {
        let Some(row) = self.snapshot()?.find_row_by_issue_id(id) else {
            tracing::debug!("Issue #{} has no row, nothing to update", id);
            return Ok(SyncOutcome::NoRow);
        };
        self.issues.set_value(row, column, value)?;
        tracing::info!("Updated column {} of row {} for issue #{}", column, row, id);
        Ok(SyncOutcome::Updated { row })
    }

    /// Add the row's "send labels" input to the issue's labels on the
    /// tracker, mirror the resulting label set into the row and clear the
    /// input.
    pub async fn push_label_edit(&self, row: u32) -> Result<SyncOutcome, AppError> {
        let submitted = parse_label_input(&self.issues.get_value(row, self.columns.send_labels)?);
        if submitted.is_empty() {
            return Ok(SyncOutcome::NothingToSend);
        }
        let id = self.issue_id_at(row)?;

        let current = self.tracker.get_issue(id).await?.label_names();
        let labels = merge_labels(&current, &submitted);
        // The tracker's reply is authoritative for what the row shows
        let applied = self.tracker.set_labels(id, &labels).await?;

        self.issues
            .set_value(row, self.columns.labels, &join_list(&applied))?;
        self.issues.clear_value(row, self.columns.send_labels)?;

        tracing::info!("Pushed labels {:?} to issue #{}", applied, id);
        Ok(SyncOutcome::LabelsPushed {
            row,
            labels: applied,
        })
    }

    /// Post the row's staged comment, prefixed by the staged mention, then
    /// clear both input cells.
    pub async fn push_comment(&self, row: u32) -> Result<SyncOutcome, AppError> {
        let mention = self.issues.get_value(row, self.columns.send_mention)?;
        let body = self.issues.get_value(row, self.columns.send_comment)?;
        if mention.trim().is_empty() && body.trim().is_empty() {
            return Ok(SyncOutcome::NothingToSend);
        }
        let id = self.issue_id_at(row)?;

        self.tracker
            .post_comment(id, &compose_comment(&mention, &body))
            .await?;

        self.issues.clear_value(row, self.columns.send_mention)?;
        self.issues.clear_value(row, self.columns.send_comment)?;

        tracing::info!("Posted comment from row {} to issue #{}", row, id);
        Ok(SyncOutcome::CommentPosted { row })
    }

    /// Restrict the "send labels" input cells to the repository's labels.
    pub async fn load_label_vocabulary(&self) -> Result<SyncOutcome, AppError> {
        let labels = self.tracker.list_all_label_names().await?;
        self.issues.set_validation_list(
            self.layout.start_row,
            self.columns.send_labels,
            self.layout.validation_rows,
            &labels,
        )?;
        tracing::info!("Loaded {} labels into the input dropdown", labels.len());
        Ok(SyncOutcome::LabelVocabulary {
            labels: labels.len(),
        })
    }

    fn issue_id_at(&self, row: u32) -> Result<u64, SheetError> {
        let column = self.columns.issue_id;
        let cell = self.issues.get_value(row, column)?;
        parse_issue_id(&cell).ok_or_else(|| SheetError::InvalidCell {
            row,
            column,
            reason: format!("expected an issue number, found {:?}", cell),
        })
    }
}
