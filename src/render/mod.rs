//! Body template rendering.
//!
//! [`Renderer`] turns a template file plus a JSON render context into the
//! message body. Two engines are available:
//!
//! - [`TeraRenderer`] (default): full Tera syntax, HTML autoescaping
//! - [`PlaceholderRenderer`]: plain `{{variable}}` replacement

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::template::{substitute_text, ContextError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid render context: {0}")]
    Context(#[from] ContextError),

    #[error("Template {path} failed to render: {reason}")]
    Template { path: PathBuf, reason: String },
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, template: &Path, context: &serde_json::Value) -> Result<String, RenderError>;
}

async fn read_template(path: &Path) -> Result<String, RenderError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Tera engine, templates are read from disk on every render
pub struct TeraRenderer {
    autoescape: bool,
}

impl Default for TeraRenderer {
    fn default() -> Self {
        Self { autoescape: true }
    }
}

#[async_trait]
impl Renderer for TeraRenderer {
    async fn render(&self, template: &Path, context: &serde_json::Value) -> Result<String, RenderError> {
        let source = read_template(template).await?;

        let context = tera::Context::from_value(context.clone()).map_err(|e| RenderError::Template {
            path: template.to_path_buf(),
            reason: e.to_string(),
        })?;

        tera::Tera::one_off(&source, &context, self.autoescape).map_err(|e| RenderError::Template {
            path: template.to_path_buf(),
            reason: render_chain(&e),
        })
    }
}

// Tera nests the useful message in the error source chain
fn render_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = std::error::Error::source(inner);
    }
    message
}

/// `{{variable}}` replacement over top-level context fields
#[derive(Default)]
pub struct PlaceholderRenderer;

#[async_trait]
impl Renderer for PlaceholderRenderer {
    async fn render(&self, template: &Path, context: &serde_json::Value) -> Result<String, RenderError> {
        let source = read_template(template).await?;
        Ok(substitute_text(&source, context)?)
    }
}

/// Create a renderer by engine name: `"placeholder"` or `"tera"` (default)
pub fn create_renderer(engine: &str) -> Arc<dyn Renderer> {
    match engine {
        "placeholder" => {
            tracing::info!(engine = "placeholder", "Creating template renderer");
            Arc::new(PlaceholderRenderer)
        }
        other => {
            if other != "tera" {
                tracing::warn!(engine = %other, "Unknown template engine, falling back to tera");
            }
            tracing::info!(engine = "tera", "Creating template renderer");
            Arc::new(TeraRenderer::default())
        }
    }
}
