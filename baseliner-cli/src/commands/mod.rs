pub mod projects;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use baseliner_core::config::{self, Environment};
use baseliner_core::host::HostError;
use baseliner_core::Settings;
use baseliner_gitlab::{GitlabClient, DEFAULT_TIMEOUT};
use baseliner_sync::{CancellationController, Shutdown};

use crate::GlobalArgs;

/// YAML base, TOML overlays, flags, then the process environment.
pub fn load_settings(global: &GlobalArgs) -> Result<Settings> {
    let file = config::load_file_config(&global.config, &global.overlays)
        .with_context(|| format!("failed to load {}", global.config.display()))?;
    let settings = config::resolve(file, &global.overrides(), &Environment::from_process())
        .context("invalid configuration")?;
    Ok(settings)
}

pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}

/// Signal listeners plus the optional run deadline. Call inside the runtime.
pub fn cancellation(settings: &Settings) -> CancellationController {
    let mut controller = CancellationController::new(Shutdown::new());
    controller.listen_for_signals();
    if let Some(deadline) = settings.deadline {
        controller.arm_deadline(deadline);
    }
    controller
}

/// Builds the GitLab client once the host token is known.
pub fn gitlab_connector(settings: &Settings) -> impl FnOnce(&str) -> Result<GitlabClient, HostError> {
    let url = settings.gitlab_url.clone();
    move |token: &str| GitlabClient::new(&url, token, DEFAULT_TIMEOUT)
}
