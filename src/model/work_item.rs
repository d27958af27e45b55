use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReportError, ReportResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub u64);

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The workflow states the report has a sheet for, in sheet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    ToDo,
    Doing,
    Done,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 3] = [
        WorkflowState::ToDo,
        WorkflowState::Doing,
        WorkflowState::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::ToDo => "To Do",
            WorkflowState::Doing => "Doing",
            WorkflowState::Done => "Done",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            WorkflowState::ToDo => 0,
            WorkflowState::Doing => 1,
            WorkflowState::Done => 2,
        }
    }

    /// Map a tracker state label onto a sheet. Labels outside the closed set
    /// come back as a `Data` error instead of panicking.
    pub fn parse(label: &str) -> ReportResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == label)
            .ok_or_else(|| ReportError::Data(format!("unrecognized workflow state '{label}'")))
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemRecord {
    pub id: WorkItemId,
    pub title: String,
    /// State label exactly as the tracker reported it.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
    pub revised_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Parse a tracker timestamp into UTC.
///
/// Accepts RFC 3339 (`2024-03-01T10:20:30.5Z`, `+02:00` offsets) as well as
/// naive ISO-8601 text, with or without a trailing `Z`, and bare dates.
pub fn parse_timestamp(text: &str) -> ReportResult<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = text.trim_end_matches(['Z', 'z']);
    if let Ok(dt) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(dt.and_utc());
    }
    if let Some(dt) = NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(dt.and_utc());
    }

    Err(ReportError::Data(format!("unparseable timestamp '{text}'")))
}
