mod cli;
mod config;
mod error;
mod model;
mod notify;
mod pipeline;
mod report;
mod tracker;
mod util;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use error::ReportError;
use notify::{DeliveryOutcome, SmtpMailer};
use pipeline::{Delivery, RunOptions, RunSummary};
use tracker::azure::AzureDevOpsClient;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,epic_report=info")),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::from(summary.exit_code())
        }
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("epic-report: {err:#}");
            let code = err.downcast_ref::<ReportError>().map_or(1, ReportError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary> {
    let mut settings = config::load(cli.config.as_deref(), !cli.no_email)?;
    cli.apply(&mut settings);

    let client = AzureDevOpsClient::new(&settings.tracker)?;
    let mailer = settings.mail.as_ref().map(SmtpMailer::new);

    let delivery = match (&mailer, &settings.mail) {
        (Some(mailer), Some(mail)) => Some(Delivery {
            mailer,
            sender: mail.sender.clone(),
            recipients: mail.recipients.clone(),
        }),
        _ => None,
    };

    let options = RunOptions {
        output: settings.report.output.clone(),
        retention: settings.report.retention,
        concurrency: settings.tracker.concurrency,
        delivery,
        date: chrono::Local::now().date_naive(),
    };

    let summary = pipeline::run(&client, options)
        .await
        .context("epic report run failed")?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    let rows: Vec<String> = summary
        .report
        .rows
        .iter()
        .map(|(state, n)| format!("{state}: {n}"))
        .collect();
    println!(
        "Fetched {} of {} epics, {} rows written ({})",
        summary.fetched,
        summary.listed,
        summary.report.total_rows(),
        rows.join(", ")
    );
    if !summary.report.dropped.is_empty() {
        let ids: Vec<String> = summary.report.dropped.iter().map(ToString::to_string).collect();
        println!("  Skipped (unrecognized state): {}", ids.join(", "));
    }
    match &summary.delivery {
        Some(DeliveryOutcome::Sent { recipients }) => {
            println!("Email sent successfully to: {}", recipients.join(", "));
        }
        Some(DeliveryOutcome::Failed { error }) => {
            eprintln!("Error sending email: {error}");
        }
        None => {}
    }
    if summary.report_kept {
        println!("  Report: {}", summary.report.path.display());
    }
}
