//! # baseliner-renderer
//!
//! Tera-based rendering of the files every repository must carry: the
//! pipeline definition and the README.
//!
//! README templates use tera syntax with snake_case keys
//! (`{{ project_name }}`, `{{ cluster_name }}`, ...). Go-template
//! placeholders such as `{{.ProjectName}}` do not parse and fail
//! [`BaselineRenderer::new`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use baseliner_core::Baseline;
//! use baseliner_renderer::{BaselineRenderer, ReadmeContext};
//!
//! fn readme_for(baseline: &Baseline, ctx: &ReadmeContext) -> Option<String> {
//!     let renderer = BaselineRenderer::new(baseline).ok()?;
//!     renderer.render_readme(ctx).ok()
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::ReadmeContext;
pub use engine::BaselineRenderer;
pub use error::RenderError;
