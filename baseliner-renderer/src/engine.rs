//! Tera rendering of the baseline files.
//!
//! | File            | Source                                                    |
//! |-----------------|-----------------------------------------------------------|
//! | pipeline        | `gitlab-ci-content` verbatim, else embedded default       |
//! | README          | `gitlab-readme-content` as a tera template, else embedded |

use tera::Tera;

use baseliner_core::Baseline;

use crate::context::ReadmeContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates, baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const DEFAULT_README: &str = include_str!("templates/readme.md.tera");
const DEFAULT_PIPELINE: &str = include_str!("templates/gitlab-ci.yml");

const README_TEMPLATE: &str = "readme.md.tera";

/// Normalizes line endings so content comparisons do not flap on CRLF input.
fn normalize(content: &str) -> String {
    content.replace("\r\n", "\n")
}

// ---------------------------------------------------------------------------
// BaselineRenderer
// ---------------------------------------------------------------------------

/// Produces file contents for the baseline. Build once per run and share.
#[derive(Debug)]
pub struct BaselineRenderer {
    tera: Tera,
    pipeline: String,
}

impl BaselineRenderer {
    /// Parses the README template eagerly; a syntax error surfaces here, before
    /// any repository is touched.
    pub fn new(baseline: &Baseline) -> Result<Self, RenderError> {
        let readme = baseline.readme_template.as_deref().unwrap_or(DEFAULT_README);
        let mut tera = Tera::default();
        tera.add_raw_template(README_TEMPLATE, &normalize(readme))?;

        let pipeline = baseline
            .pipeline_content
            .as_deref()
            .map(normalize)
            .unwrap_or_else(|| DEFAULT_PIPELINE.to_string());

        Ok(Self { tera, pipeline })
    }

    pub fn render_readme(&self, ctx: &ReadmeContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        Ok(self.tera.render(README_TEMPLATE, &tera_ctx)?)
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
