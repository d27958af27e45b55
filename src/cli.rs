use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{RetentionPolicy, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "epic-report",
    about = "Export Azure DevOps epics to a spreadsheet grouped by state and email it",
    version
)]
pub struct Cli {
    /// Config file (default: ~/.epic-report/config.toml)
    #[arg(long, env = "EPIC_REPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where to write the workbook
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Build the report only; skip email and keep the file
    #[arg(long)]
    pub no_email: bool,

    /// What to do with the workbook after the run
    #[arg(long, value_enum)]
    pub retention: Option<RetentionPolicy>,

    /// Maximum detail requests in flight
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Per-request timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    /// Command-line flags take precedence over file and environment values.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(output) = &self.output {
            settings.report.output = output.clone();
        }
        if let Some(retention) = self.retention {
            settings.report.retention = retention;
        }
        if let Some(n) = self.concurrency {
            settings.tracker.concurrency = usize::from(n);
        }
        if let Some(secs) = self.timeout_secs {
            settings.tracker.timeout = Duration::from_secs(secs);
            if let Some(mail) = settings.mail.as_mut() {
                mail.timeout = Duration::from_secs(secs);
            }
        }
    }
}
