mod settings;

pub use settings::{
    BrokerConfig, LogConfig, MessageDefaults, ServiceConfig, Settings, SmtpConfig, TemplatesConfig,
};
