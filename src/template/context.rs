//! Payload to render-context mapping

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::substitution::substitute_variables;

/// Failure while turning an event payload into a render context
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Payload must be an object, got {0}")]
    PayloadNotObject(&'static str),

    #[error("Missing or invalid payload field: {0}")]
    MissingField(String),

    #[error("Context build failed: {0}")]
    Failed(String),
}

pub type ContextFn =
    dyn Fn(&serde_json::Value) -> Result<serde_json::Value, ContextError> + Send + Sync;

/// Maps an event payload to the variables available to the body template.
///
/// Builders are pure: no I/O, and a failure surfaces as a [`ContextError`].
#[derive(Clone, Default)]
pub enum ContextBuilder {
    /// Arbitrary mapping function supplied at registration
    Function(Arc<ContextFn>),
    /// Declarative mapping whose string leaves are `{{field}}` templates over the payload
    Mapping(serde_json::Value),
    /// The payload itself is the context
    #[default]
    Passthrough,
}

impl ContextBuilder {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<serde_json::Value, ContextError> + Send + Sync + 'static,
    {
        ContextBuilder::Function(Arc::new(f))
    }

    pub fn mapping(mapping: serde_json::Value) -> Self {
        ContextBuilder::Mapping(mapping)
    }

    pub fn build(&self, payload: &serde_json::Value) -> Result<serde_json::Value, ContextError> {
        match self {
            ContextBuilder::Function(f) => f(payload),
            ContextBuilder::Mapping(mapping) => substitute_variables(mapping, payload),
            ContextBuilder::Passthrough => Ok(payload.clone()),
        }
    }
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextBuilder::Function(_) => f.write_str("ContextBuilder::Function(..)"),
            ContextBuilder::Mapping(m) => f.debug_tuple("ContextBuilder::Mapping").field(m).finish(),
            ContextBuilder::Passthrough => f.write_str("ContextBuilder::Passthrough"),
        }
    }
}

/// Fetch a string field from a payload, for use inside context functions.
pub fn require_str<'a>(payload: &'a serde_json::Value, field: &str) -> Result<&'a str, ContextError> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ContextError::MissingField(field.to_string()))
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
