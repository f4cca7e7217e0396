use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::ResolvedAttachment;

use super::context::ContextBuilder;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Cannot read template definitions {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template definitions {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Attachment as registered, with a path relative to the registry base path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    pub filename: String,
    pub path: PathBuf,
    #[serde(alias = "contentType")]
    pub content_type: String,
}

impl AttachmentSpec {
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            content_type: content_type.into(),
        }
    }

    /// Join the relative path onto `base_path`. The registered entry is left untouched.
    pub fn resolve(&self, base_path: &Path) -> ResolvedAttachment {
        ResolvedAttachment {
            filename: self.filename.clone(),
            path: base_path.join(&self.path),
            content_type: self.content_type.clone(),
        }
    }
}

/// Registered template metadata for one event category
#[derive(Debug, Clone)]
pub struct TemplateDescriptor {
    /// `type:spec`
    pub key: String,
    /// Literal subject line
    pub subject: String,
    /// Body template path, relative to the registry base path
    pub body_template: PathBuf,
    pub attachments: Vec<AttachmentSpec>,
    pub context_builder: ContextBuilder,
}

/// Templates supplied by the embedding application at startup
#[derive(Debug, Clone, Default)]
pub struct TemplatesDefinition {
    pub base_path: PathBuf,
    pub templates: Vec<TemplateRegistration>,
}

#[derive(Debug, Clone)]
pub struct TemplateRegistration {
    /// `type:spec`
    pub name: String,
    pub params: TemplateParams,
}

#[derive(Debug, Clone)]
pub struct TemplateParams {
    pub html_template: PathBuf,
    pub subject: String,
    pub attachments: Vec<AttachmentSpec>,
    pub template_data: ContextBuilder,
}

impl TemplateRegistration {
    /// Validate the registration
    pub fn validate(&self) -> TemplateResult<()> {
        if self.name.is_empty() || self.name.len() > 256 {
            return Err(TemplateError::InvalidTemplate(
                "Name must be 1-256 characters".to_string(),
            ));
        }

        if !self.name.contains(':') {
            return Err(TemplateError::InvalidTemplate(format!(
                "Name \"{}\" must have the form <type>:<spec>",
                self.name
            )));
        }

        if self.params.subject.is_empty() {
            return Err(TemplateError::InvalidTemplate(format!(
                "Template \"{}\" has an empty subject",
                self.name
            )));
        }

        if self.params.html_template.as_os_str().is_empty() {
            return Err(TemplateError::InvalidTemplate(format!(
                "Template \"{}\" has no html template",
                self.name
            )));
        }

        Ok(())
    }
}

impl From<TemplateRegistration> for TemplateDescriptor {
    fn from(registration: TemplateRegistration) -> Self {
        TemplateDescriptor {
            key: registration.name,
            subject: registration.params.subject,
            body_template: registration.params.html_template,
            attachments: registration.params.attachments,
            context_builder: registration.params.template_data,
        }
    }
}
