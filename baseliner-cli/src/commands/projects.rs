//! `baseliner projects`: list what a run would touch, without writing.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use baseliner_core::types::ProjectDescriptor;
use baseliner_sync::{pipeline, RunError};
use baseliner_vault::VaultCredentialProvider;

use super::{cancellation, gitlab_connector, load_settings, runtime};
use crate::{exit, GlobalArgs};

/// Arguments for `baseliner projects`.
#[derive(Args, Debug)]
pub struct ProjectsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled, Serialize)]
struct ProjectRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<ProjectDescriptor> for ProjectRow {
    fn from(p: ProjectDescriptor) -> Self {
        Self {
            id: p.id.0,
            name: p.name.0,
        }
    }
}

impl ProjectsArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let settings = load_settings(global)?;
        let provider = VaultCredentialProvider::from_settings(&settings)
            .context("failed to configure Vault client")?;

        let rt = runtime()?;
        let discovered = rt.block_on(async {
            let controller = cancellation(&settings);
            let shutdown = controller.handle();
            pipeline::discover(&settings, &provider, gitlab_connector(&settings), &shutdown).await
        });
        let projects = match discovered {
            Ok(discovery) => discovery.projects,
            Err(RunError::Cancelled(reason)) => {
                eprintln!("cancelled: {reason}");
                return Ok(ExitCode::from(exit::CANCELLED));
            }
            Err(err) => return Err(err.into()),
        };

        let rows: Vec<ProjectRow> = projects.into_iter().map(ProjectRow::from).collect();
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize project list")?
            );
        } else if rows.is_empty() {
            println!("No projects in {}.", settings.namespace);
        } else {
            println!("{} projects in {}", rows.len(), settings.namespace);
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        Ok(ExitCode::from(exit::SUCCESS))
    }
}
