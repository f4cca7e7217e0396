//! Mail template registry.
//!
//! This module provides:
//! - Template descriptors keyed by `type:spec`
//! - A registry built once at startup and read concurrently afterwards
//! - Context builders mapping event payloads to render variables
//! - A `{{variable}}` substitution engine
//! - JSON definition file loading
//!
//! # Example
//!
//! ```ignore
//! let registry = TemplateRegistry::new("/srv/mailer/templates");
//!
//! registry.register("NewUser:NormalUser", TemplateDescriptor {
//!     key: String::new(),
//!     subject: "User registration".to_string(),
//!     body_template: "new-user.html".into(),
//!     attachments: vec![AttachmentSpec::new("Privacy.pdf", "attachments/Privacy.pdf", "application/pdf")],
//!     context_builder: ContextBuilder::function(|p| {
//!         Ok(json!({ "username": require_str(p, "username")? }))
//!     }),
//! });
//!
//! let descriptor = registry.lookup("NewUser:NormalUser");
//! ```

mod context;
mod loader;
mod registry;
mod substitution;
mod types;

pub use context::{require_str, ContextBuilder, ContextError, ContextFn};
pub use registry::TemplateRegistry;
pub use substitution::{substitute_text, substitute_variables};
pub use types::{
    AttachmentSpec, TemplateDescriptor, TemplateError, TemplateParams, TemplateRegistration,
    TemplateResult, TemplatesDefinition,
};
