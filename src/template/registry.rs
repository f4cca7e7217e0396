use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use super::types::{TemplateDescriptor, TemplateRegistration, TemplatesDefinition};

/// Key to template lookup, built once at startup.
///
/// Lookups are exact matches on `type:spec`; a miss means no template.
/// Registering an existing key replaces the previous descriptor.
pub struct TemplateRegistry {
    base_path: PathBuf,
    templates: DashMap<String, Arc<TemplateDescriptor>>,
}

impl TemplateRegistry {
    /// Create an empty registry resolving paths against `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            templates: DashMap::new(),
        }
    }

    /// Create a registry holding every template of `definition`
    pub fn from_definition(definition: TemplatesDefinition) -> Self {
        let registry = Self::new(definition.base_path);
        registry.register_all(definition.templates);
        registry
    }

    pub fn register_all(&self, templates: Vec<TemplateRegistration>) {
        for registration in templates {
            let key = registration.name.clone();
            self.register(key, registration.into());
        }
    }

    /// Insert or overwrite the descriptor for `key`, returning the replaced one
    pub fn register(
        &self,
        key: impl Into<String>,
        mut descriptor: TemplateDescriptor,
    ) -> Option<Arc<TemplateDescriptor>> {
        let key = key.into();
        descriptor.key = key.clone();

        let previous = self.templates.insert(key.clone(), Arc::new(descriptor));
        if previous.is_some() {
            tracing::warn!(key = %key, "Template re-registered, previous entry replaced");
        } else {
            tracing::info!(key = %key, "Template registered");
        }
        previous
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<TemplateDescriptor>> {
        self.templates.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve a registered relative path against the base path
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.base_path.join(relative)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn keys(&self) -> Vec<String> {
        self.templates.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
