//! # baseliner-gitlab
//!
//! GitLab REST v4 implementation of [`baseliner_core::RepositoryHost`].
//! Authentication is a personal or project access token sent as
//! `PRIVATE-TOKEN`; list endpoints are drained page by page.

pub mod client;
mod model;

pub use client::{GitlabClient, DEFAULT_TIMEOUT};
