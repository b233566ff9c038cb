//! Routing of sheet edits and webhook deliveries onto engine operations.

use issuesheet_core::AppError;
use serde::{Deserialize, Serialize};

use crate::engine::{SheetSyncEngine, SyncOutcome};
use crate::webhook::{IssueAction, WebhookPayload};

/// A cell written by the user: the trigger for sheet-side operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetEdit {
    pub sheet: String,
    pub column: u32,
    pub row: u32,
}

/// Result of one dispatched invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Dispatch {
    Ignored { reason: String },
    Handled { event: String, outcomes: Vec<SyncOutcome> },
}

impl Dispatch {
    fn ignored(reason: impl Into<String>) -> Self {
        Dispatch::Ignored {
            reason: reason.into(),
        }
    }

    fn handled(event: impl Into<String>, outcomes: Vec<SyncOutcome>) -> Self {
        Dispatch::Handled {
            event: event.into(),
            outcomes,
        }
    }
}

pub struct EventDispatcher {
    engine: SheetSyncEngine,
    issues_sheet: String,
}

impl EventDispatcher {
    pub fn new(engine: SheetSyncEngine, issues_sheet: impl Into<String>) -> Self {
        Self {
            engine,
            issues_sheet: issues_sheet.into(),
        }
    }

    pub fn engine(&self) -> &SheetSyncEngine {
        &self.engine
    }

    /// Sheet-edit surface.
    ///
    /// Only the execution column of the issues sheet triggers anything: the
    /// setup row reloads the whole sheet, rows below it push that row's
    /// staged comment and labels.
    pub async fn on_sheet_edit(&self, edit: &SheetEdit) -> Result<Dispatch, AppError> {
        if edit.sheet != self.issues_sheet {
            return Ok(Dispatch::ignored(format!("sheet {:?} is not tracked", edit.sheet)));
        }
        if edit.column != self.engine.columns().execution {
            return Ok(Dispatch::ignored(format!(
                "column {} is not the execution column",
                edit.column
            )));
        }

        let setup_row = self.engine.layout().setup_row;
        if edit.row == setup_row {
            tracing::info!("Setup row triggered, reloading sheet");
            // A vocabulary failure is logged but does not block the reload
            let labels = match self.engine.load_label_vocabulary().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Loading label vocabulary failed: {}", e);
                    self.engine.record("Error loading labels:", &e.to_string())?;
                    SyncOutcome::LabelVocabularyFailed {
                        error: e.to_string(),
                    }
                }
            };
            let refresh = self.engine.full_refresh().await;
            return Ok(Dispatch::handled("refresh", vec![labels, refresh]));
        }
        if edit.row < setup_row {
            return Ok(Dispatch::ignored(format!("row {} is above the data rows", edit.row)));
        }

        tracing::info!("Row {} triggered, pushing staged input", edit.row);
        let comment = self.engine.push_comment(edit.row).await?;
        let labels = self.engine.push_label_edit(edit.row).await?;
        Ok(Dispatch::handled("push", vec![comment, labels]))
    }

    /// Webhook surface. Unknown actions are acknowledged and ignored.
    pub async fn on_webhook(&self, payload: &WebhookPayload) -> Result<Dispatch, AppError> {
        let issue = &payload.issue;
        let id = issue.number;
        tracing::info!("Webhook {:?} for issue #{}", payload.action, id);

        let (event, outcome) = match payload.action {
            IssueAction::Closed => ("closed", self.engine.on_issue_closed(id).await?),
            IssueAction::Opened => ("opened", self.engine.on_issue_opened_or_reopened(issue).await?),
            IssueAction::Reopened => {
                self.engine
                    .record("Issue reopened:", &format!("#{} {}", id, issue.title))?;
                ("reopened", self.engine.on_issue_opened_or_reopened(issue).await?)
            }
            IssueAction::Created => (
                "comment_created",
                self.engine
                    .on_comment_created(id, payload.comment_body())
                    .await?,
            ),
            IssueAction::Labeled | IssueAction::Unlabeled => {
                ("labels_changed", self.engine.on_labels_changed(id).await?)
            }
            IssueAction::Assigned | IssueAction::Unassigned => {
                ("assignees_changed", self.engine.on_assignees_changed(id).await?)
            }
            IssueAction::Other => return Ok(Dispatch::ignored("unhandled action")),
        };

        Ok(Dispatch::handled(event, vec![outcome]))
    }
}
