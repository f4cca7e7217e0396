//! JSON template definition files.
//!
//! ```json
//! {
//!   "base_path": "templates",
//!   "templates": [{
//!     "name": "NewUser:NormalUser",
//!     "params": {
//!       "html_template": "new-user.html",
//!       "subject": "User registration",
//!       "attachments": [
//!         {"filename": "Privacy.pdf", "path": "attachments/Privacy.pdf", "content_type": "application/pdf"}
//!       ],
//!       "template_data": {"username": "{{username}}", "name": "{{name}} {{surname}}"}
//!     }
//!   }]
//! }
//! ```
//!
//! A relative `base_path` is resolved against the directory holding the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::context::ContextBuilder;
use super::types::{
    AttachmentSpec, TemplateError, TemplateParams, TemplateRegistration, TemplateResult,
    TemplatesDefinition,
};

#[derive(Debug, Deserialize)]
struct TemplatesFile {
    #[serde(default, alias = "basePath")]
    base_path: Option<PathBuf>,
    templates: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    name: String,
    params: TemplateEntryParams,
}

#[derive(Debug, Deserialize)]
struct TemplateEntryParams {
    #[serde(alias = "htmlTemplate")]
    html_template: PathBuf,
    subject: String,
    #[serde(default)]
    attachments: Vec<AttachmentSpec>,
    #[serde(default, alias = "templateData")]
    template_data: Option<serde_json::Value>,
}

impl TemplatesDefinition {
    /// Load and validate a definition file
    pub fn from_file(path: impl AsRef<Path>) -> TemplateResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&raw, dir).map_err(|e| match e {
            TemplateError::Parse { source, .. } => TemplateError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse definitions, resolving a relative base path against `dir`
    pub fn from_json(raw: &str, dir: &Path) -> TemplateResult<Self> {
        let file: TemplatesFile = serde_json::from_str(raw).map_err(|source| TemplateError::Parse {
            path: dir.to_path_buf(),
            source,
        })?;

        let base_path = match file.base_path {
            Some(base) if base.is_absolute() => base,
            Some(base) => dir.join(base),
            None => dir.to_path_buf(),
        };

        let templates = file
            .templates
            .into_iter()
            .map(|entry| -> TemplateResult<TemplateRegistration> {
                let registration = TemplateRegistration {
                    name: entry.name,
                    params: TemplateParams {
                        html_template: entry.params.html_template,
                        subject: entry.params.subject,
                        attachments: entry.params.attachments,
                        template_data: entry
                            .params
                            .template_data
                            .map(ContextBuilder::Mapping)
                            .unwrap_or_default(),
                    },
                };
                registration.validate()?;
                Ok(registration)
            })
            .collect::<TemplateResult<Vec<_>>>()?;

        tracing::debug!(
            base_path = %base_path.display(),
            count = templates.len(),
            "Template definitions loaded"
        );

        Ok(Self { base_path, templates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEFINITION: &str = r#"{
        "base_path": "templates",
        "templates": [{
            "name": "NewUser:NormalUser",
            "params": {
                "html_template": "new-user.html",
                "subject": "User registration",
                "attachments": [
                    {"filename": "Privacy.pdf", "path": "attachments/Privacy.pdf", "content_type": "application/pdf"}
                ],
                "template_data": {"username": "{{username}}", "name": "{{name}} {{surname}}"}
            }
        }]
    }"#;

    #[test]
    fn test_parse_definition() {
        let definition = TemplatesDefinition::from_json(DEFINITION, Path::new("/srv/app")).unwrap();

        assert_eq!(definition.base_path, Path::new("/srv/app").join("templates"));
        assert_eq!(definition.templates.len(), 1);

        let params = &definition.templates[0].params;
        assert_eq!(params.subject, "User registration");
        assert_eq!(params.attachments[0].content_type, "application/pdf");

        let context = params
            .template_data
            .build(&json!({"username": "joe", "name": "Joe", "surname": "Doe"}))
            .unwrap();
        assert_eq!(context, json!({"username": "joe", "name": "Joe Doe"}));
    }

    #[test]
    fn test_camel_case_aliases_and_passthrough() {
        let raw = r#"{
            "basePath": "/abs/templates",
            "templates": [{
                "name": "Reset:Password",
                "params": {
                    "htmlTemplate": "reset.html",
                    "subject": "Reset your password",
                    "attachments": [{"filename": "a.txt", "path": "a.txt", "contentType": "text/plain"}]
                }
            }]
        }"#;

        let definition = TemplatesDefinition::from_json(raw, Path::new("/ignored")).unwrap();
        assert_eq!(definition.base_path, PathBuf::from("/abs/templates"));
        assert!(matches!(
            definition.templates[0].params.template_data,
            ContextBuilder::Passthrough
        ));
    }

    #[test]
    fn test_invalid_entry_rejected() {
        let raw = r#"{"templates": [{"name": "missing-separator", "params": {"html_template": "a.html", "subject": "s"}}]}"#;

        let err = TemplatesDefinition::from_json(raw, Path::new(".")).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidTemplate(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        std::fs::write(&path, DEFINITION).unwrap();

        let definition = TemplatesDefinition::from_file(&path).unwrap();
        assert_eq!(definition.base_path, dir.path().join("templates"));
    }

    #[test]
    fn test_from_missing_file() {
        let err = TemplatesDefinition::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
