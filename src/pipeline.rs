use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::config::RetentionPolicy;
use crate::error::ReportResult;
use crate::notify::{self, DeliveryOutcome, Mailer};
use crate::report::{self, ReportSummary};
use crate::tracker::{self, WorkItemSource};

/// Who gets the report, and through what.
pub struct Delivery<'a> {
    pub mailer: &'a dyn Mailer,
    pub sender: String,
    pub recipients: Vec<String>,
}

pub struct RunOptions<'a> {
    pub output: PathBuf,
    pub retention: RetentionPolicy,
    pub concurrency: usize,
    /// `None` builds the report without emailing it; the file is then kept.
    pub delivery: Option<Delivery<'a>>,
    pub date: NaiveDate,
}

#[derive(Debug)]
pub struct RunSummary {
    pub listed: usize,
    pub fetched: usize,
    pub report: ReportSummary,
    pub delivery: Option<DeliveryOutcome>,
    pub report_kept: bool,
}

impl RunSummary {
    /// 0 on success; the delivery error's code when the email did not go out.
    pub fn exit_code(&self) -> u8 {
        match &self.delivery {
            Some(DeliveryOutcome::Failed { error }) => error.exit_code(),
            _ => 0,
        }
    }
}

/// Owns a report the run has written and applies the retention policy when
/// dropped, whichever way the rest of the run ended. Only created once the
/// workbook is on disk, so a file already sitting at the output path is
/// never touched by a run that failed before writing.
pub struct ReportFile {
    path: PathBuf,
    retention: RetentionPolicy,
    delivered: bool,
}

impl ReportFile {
    pub fn new(path: PathBuf, retention: RetentionPolicy) -> Self {
        Self {
            path,
            retention,
            delivered: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mark_delivered(&mut self) {
        self.delivered = true;
    }

    pub fn will_remove(&self) -> bool {
        match self.retention {
            RetentionPolicy::AlwaysDelete => true,
            RetentionPolicy::KeepOnFailure => self.delivered,
            RetentionPolicy::KeepAlways => false,
        }
    }
}

impl Drop for ReportFile {
    fn drop(&mut self) {
        if !self.will_remove() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed report file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not remove report file"),
        }
    }
}

/// List epics, fetch them, build the workbook, email it, clean up.
///
/// Listing failures abort the run. Per-item fetch failures and unknown
/// states only drop the affected item. A failed delivery is reported in the
/// summary rather than as an error.
#[tracing::instrument(
    name = "epic report",
    skip_all,
    fields(source = source.name(), output = %options.output.display())
)]
pub async fn run(source: &dyn WorkItemSource, options: RunOptions<'_>) -> ReportResult<RunSummary> {
    let retention = if options.delivery.is_some() {
        options.retention
    } else {
        RetentionPolicy::KeepAlways
    };

    // Stage 1: list epic IDs; nothing to report without them
    let ids = source.list_epic_ids().await.map_err(|e| {
        tracing::error!(source = source.name(), error = %e, "could not list epics");
        e
    })?;

    // Stage 2: fetch details, skipping failures
    let records = tracker::fetch_records(source, &ids, options.concurrency).await;
    let fetched = records.len();

    // Stage 3: write the workbook
    let report = report::build_report(records, &options.output).map_err(|e| {
        tracing::error!(path = %options.output.display(), error = %e, "could not build report");
        e
    })?;
    let mut file = ReportFile::new(report.path.clone(), retention);

    // Stage 4: email it; `file` applies retention when it drops
    let delivery = match &options.delivery {
        Some(d) => {
            let outcome =
                notify::send_report(d.mailer, file.path(), &d.sender, &d.recipients, options.date)
                    .await;
            if outcome.is_sent() {
                file.mark_delivered();
            }
            Some(outcome)
        }
        None => {
            tracing::info!(path = %file.path().display(), "email disabled, report kept");
            None
        }
    };

    Ok(RunSummary {
        listed: ids.len(),
        fetched,
        report_kept: !file.will_remove(),
        report,
        delivery,
    })
}
