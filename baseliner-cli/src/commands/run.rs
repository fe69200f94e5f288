//! `baseliner run`: reconcile every project in the configured namespace.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use baseliner_sync::{pipeline, BaselinePlan, RunReport, Termination};
use baseliner_vault::VaultCredentialProvider;

use super::{cancellation, gitlab_connector, load_settings, runtime};
use crate::{exit, GlobalArgs};

/// Arguments for `baseliner run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let settings = load_settings(global)?;
        let plan = BaselinePlan::new(&settings).context("failed to prepare baseline templates")?;
        let provider = VaultCredentialProvider::from_settings(&settings)
            .context("failed to configure Vault client")?;

        let rt = runtime()?;
        let report = rt.block_on(async {
            let controller = cancellation(&settings);
            pipeline::run(
                &settings,
                plan,
                &provider,
                gitlab_connector(&settings),
                controller.handle(),
            )
            .await
        })?;

        if self.json {
            print_json(&report)?;
        } else {
            print_table(&settings.namespace, &report);
        }
        Ok(exit_code(&report))
    }
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.is_cancelled() {
        ExitCode::from(exit::CANCELLED)
    } else if report.summary.failed() > 0 {
        ExitCode::from(exit::PARTIAL)
    } else {
        ExitCode::from(exit::SUCCESS)
    }
}

fn print_json(report: &RunReport) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(report).context("failed to serialize run report")?
    );
    Ok(())
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Cause")]
    cause: String,
}

fn print_table(namespace: &str, report: &RunReport) {
    let summary = &report.summary;
    println!(
        "Baseliner v{} | {} | {} listed | {} attempted | {} succeeded | {} failed",
        env!("CARGO_PKG_VERSION"),
        namespace,
        report.listed,
        summary.attempted(),
        summary.succeeded().to_string().green(),
        summary.failed().to_string().red(),
    );

    if let Termination::Cancelled(reason) = &report.termination {
        println!("{} {reason}", "Run cancelled:".yellow().bold());
    }

    if summary.errors().is_empty() {
        if !report.is_cancelled() {
            println!("{}", "All projects match the baseline.".green());
        }
        return;
    }

    let rows: Vec<FailureRow> = summary
        .errors()
        .iter()
        .flat_map(|outcome| {
            outcome.failures.iter().map(move |failure| FailureRow {
                project: outcome.project.to_string(),
                operation: failure.operation.to_string(),
                cause: if failure.cancelled {
                    "cancelled".to_string()
                } else {
                    failure.cause.clone()
                },
            })
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
