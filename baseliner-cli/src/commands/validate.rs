//! `baseliner validate`: resolve settings and render templates offline.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use baseliner_core::types::ProjectDescriptor;
use baseliner_sync::BaselinePlan;

use super::load_settings;
use crate::{exit, GlobalArgs};

/// Arguments for `baseliner validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Project name used for the sample README render.
    #[arg(long, default_value = "example")]
    pub project: String,

    /// Print the rendered README.
    #[arg(long)]
    pub show_readme: bool,
}

impl ValidateArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let settings = load_settings(global)?;
        let plan = BaselinePlan::new(&settings).context("failed to prepare baseline templates")?;
        let sample = ProjectDescriptor::new("0", self.project.as_str());
        let readme = plan
            .readme_for(&sample)
            .context("failed to render README template")?;

        let baseline = plan.baseline();
        let deadline = settings
            .deadline
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "none".to_string());
        println!("{}", "Configuration OK".green().bold());
        println!("  product line   {}", settings.product_line);
        println!("  namespace      {}", settings.namespace);
        println!("  cluster        {}", plan.cluster_name());
        println!("  vault          {} ({})", settings.credential.address(), settings.credential.method());
        println!("  secret path    {}", settings.credential.secret_path());
        println!("  workers        {}", settings.workers);
        println!("  deadline       {deadline}");
        println!("  branch         {}", baseline.branch);
        println!("  pipeline       {} ({} bytes)", baseline.pipeline_path, plan.pipeline().len());
        println!("  readme         {} ({} bytes)", baseline.readme_path, readme.len());
        println!("  variables      {} declared", baseline.variables.len());
        if self.show_readme {
            println!();
            print!("{readme}");
        }
        Ok(ExitCode::from(exit::SUCCESS))
    }
}
