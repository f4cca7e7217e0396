//! Application events consumed from the broker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Build the registry lookup key for an event category.
pub fn template_key(event_type: &str, spec: &str) -> String {
    format!("{}:{}", event_type, spec)
}

/// Event message format received from the broker queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailEvent {
    /// Event category (e.g. "NewUser")
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event subtype (e.g. "NormalUser")
    pub spec: String,
    /// Informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
    /// Destination address(es)
    pub mailto: Recipients,
    /// Data handed to the template context builder
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl MailEvent {
    /// Registry key, `type:spec`. No other field takes part in it.
    pub fn lookup_key(&self) -> String {
        template_key(&self.event_type, &self.spec)
    }
}

/// One or many destination addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    Single(String),
    Multiple(Vec<String>),
}

impl Recipients {
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            Recipients::Single(address) => vec![address.as_str()],
            Recipients::Multiple(addresses) => addresses.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for Recipients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addresses().join(", "))
    }
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Recipients::Single(address.to_string())
    }
}
