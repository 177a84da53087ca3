mod environment;
mod settings;

pub use environment::Environment;
pub use settings::{
    ConfigError, ExportSettings, InboxSettings, LoggingSettings, RetrySettings, ServerSettings,
    Settings, StageSettings, StorageProvider, StorageSettings,
};
