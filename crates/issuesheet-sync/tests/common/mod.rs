//! Shared fixtures: an in-process tracker that records calls, and an
//! issues sheet laid out with the default column map.

#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use issuesheet_core::{ColumnMap, SheetLayout, TrackerError};
use issuesheet_services::{Comment, Issue, IssueTracker, Label, MemorySheet, User};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use issuesheet_sync::SheetSyncEngine;

pub const ISSUES: &str = "Issues";

/// Call log entry, e.g. `set_labels 42 bug,urgent`.
pub type Call = String;

#[derive(Default)]
pub struct FakeTracker {
    issues: Mutex<BTreeMap<u64, Issue>>,
    comments: Mutex<BTreeMap<u64, Vec<Comment>>>,
    vocabulary: Mutex<Vec<String>>,
    calls: Mutex<Vec<Call>>,
    unavailable: Mutex<bool>,
    vocabulary_down: Mutex<bool>,
    auto_labels: Mutex<Vec<String>>,
}

impl FakeTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_issue(&self, issue: Issue) {
        self.issues.lock().insert(issue.number, issue);
    }

    pub fn remove_issue(&self, number: u64) {
        self.issues.lock().remove(&number);
    }

    pub fn add_comment(&self, number: u64, id: u64, body: &str, minute: u32) {
        self.comments.lock().entry(number).or_default().push(Comment {
            id,
            body: Some(body.to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
        });
    }

    pub fn set_vocabulary(&self, labels: &[&str]) {
        *self.vocabulary.lock() = labels.iter().map(|l| l.to_string()).collect();
    }

    pub fn go_offline(&self) {
        *self.unavailable.lock() = true;
    }

    /// Only the label listing fails; every other call still succeeds.
    pub fn break_vocabulary(&self) {
        *self.vocabulary_down.lock() = true;
    }

    /// Labels the tracker adds on its own whenever labels are replaced.
    pub fn add_auto_label(&self, label: &str) {
        self.auto_labels.lock().push(label.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn labels_of(&self, number: u64) -> Vec<String> {
        self.issues
            .lock()
            .get(&number)
            .map(|i| i.label_names())
            .unwrap_or_default()
    }

    pub fn comments_of(&self, number: u64) -> Vec<String> {
        self.comments
            .lock()
            .get(&number)
            .map(|c| c.iter().map(|c| c.body_text().to_string()).collect())
            .unwrap_or_default()
    }

    fn enter(&self, call: String) -> Result<(), TrackerError> {
        self.calls.lock().push(call);
        if *self.unavailable.lock() {
            return Err(TrackerError::RemoteUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn not_found(number: u64) -> TrackerError {
        TrackerError::RemoteRejected {
            status: 404,
            message: format!("issue {} not found", number),
        }
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn list_open_issues(&self) -> Result<Vec<Issue>, TrackerError> {
        self.enter("list_open_issues".to_string())?;
        Ok(self.issues.lock().values().cloned().collect())
    }

    async fn get_issue(&self, number: u64) -> Result<Issue, TrackerError> {
        self.enter(format!("get_issue {}", number))?;
        self.issues
            .lock()
            .get(&number)
            .cloned()
            .ok_or_else(|| Self::not_found(number))
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, TrackerError> {
        self.enter(format!("list_comments {}", number))?;
        Ok(self.comments.lock().get(&number).cloned().unwrap_or_default())
    }

    async fn set_labels(&self, number: u64, labels: &[String]) -> Result<Vec<String>, TrackerError> {
        self.enter(format!("set_labels {} {}", number, labels.join(",")))?;
        let mut applied = labels.to_vec();
        for extra in self.auto_labels.lock().iter() {
            if !applied.contains(extra) {
                applied.push(extra.clone());
            }
        }
        let mut issues = self.issues.lock();
        let issue = issues.get_mut(&number).ok_or_else(|| Self::not_found(number))?;
        issue.labels = applied
            .iter()
            .map(|name| Label {
                name: name.clone(),
                color: None,
            })
            .collect();
        Ok(applied)
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<Comment, TrackerError> {
        self.enter(format!("post_comment {}", number))?;
        let mut comments = self.comments.lock();
        let thread = comments.entry(number).or_default();
        let comment = Comment {
            id: 1000 + thread.len() as u64,
            body: Some(body.to_string()),
            created_at: Utc::now(),
        };
        thread.push(comment.clone());
        Ok(comment)
    }

    async fn list_all_label_names(&self) -> Result<Vec<String>, TrackerError> {
        self.enter("list_all_label_names".to_string())?;
        if *self.vocabulary_down.lock() {
            return Err(TrackerError::RemoteRejected {
                status: 403,
                message: "resource not accessible".to_string(),
            });
        }
        Ok(self.vocabulary.lock().clone())
    }
}

pub fn issue(number: u64, title: &str, labels: &[&str], assignees: &[&str]) -> Issue {
    Issue {
        number,
        title: title.to_string(),
        body: Some(format!("Body of {}", number)),
        html_url: format!("https://github.com/octo/tracker/issues/{}", number),
        state: "open".to_string(),
        labels: labels
            .iter()
            .map(|name| Label {
                name: name.to_string(),
                color: None,
            })
            .collect(),
        assignees: assignees
            .iter()
            .map(|login| User {
                login: login.to_string(),
            })
            .collect(),
        pull_request: None,
    }
}

pub fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Header in row 1, empty setup row 2, data from row 3.
pub fn issues_sheet() -> Arc<MemorySheet> {
    let header = ColumnMap::REQUIRED.iter().map(|n| n.to_string()).collect();
    Arc::new(MemorySheet::from_rows(ISSUES, vec![header, Vec::new()]))
}

pub struct Fixture {
    pub tracker: Arc<FakeTracker>,
    pub sheet: Arc<MemorySheet>,
    pub log: Arc<MemorySheet>,
    pub columns: ColumnMap,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_sheet(issues_sheet())
    }

    pub fn with_sheet(sheet: Arc<MemorySheet>) -> Self {
        Self {
            tracker: FakeTracker::new(),
            sheet,
            log: Arc::new(MemorySheet::new("log")),
            columns: ColumnMap::default(),
        }
    }

    pub fn engine(&self) -> SheetSyncEngine {
        self.engine_with_layout(&SheetLayout::default())
    }

    pub fn engine_with_layout(&self, layout: &SheetLayout) -> SheetSyncEngine {
        SheetSyncEngine::new(
            self.tracker.clone(),
            self.sheet.clone(),
            self.log.clone(),
            &self.columns,
            layout,
        )
    }

    /// Issue ids of the data rows, top to bottom.
    pub fn ids(&self) -> Vec<String> {
        self.sheet
            .rows()
            .iter()
            .skip(2)
            .map(|r| r.first().cloned().unwrap_or_default())
            .collect()
    }

    pub fn cell(&self, row: u32, column: u32) -> String {
        use issuesheet_services::Sheet;
        self.sheet.get_value(row, column).unwrap()
    }

    pub fn set(&self, row: u32, column: u32, value: &str) {
        use issuesheet_services::Sheet;
        self.sheet.set_value(row, column, value).unwrap();
    }
}
