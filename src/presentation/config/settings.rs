use std::time::Duration;

use config::{Config, File};
use serde::Deserialize;

use super::Environment;
use crate::application::services::{OrchestratorConfig, RetryPolicy, StageLimits};
use crate::infrastructure::stages::StageEndpoint;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub asr: StageSettings,
    pub ml: StageSettings,
    pub retry: RetrySettings,
    pub storage: StorageSettings,
    pub export: ExportSettings,
    pub inbox: InboxSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL of this service, used to build the
    /// callback addresses handed to stages.
    pub public_url: String,
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageSettings {
    pub endpoint: String,
    pub limit: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub provider: StorageProvider,
    pub audio_dir: String,
    pub delete_after_transcription: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    pub out_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboxSettings {
    pub dir: Option<String>,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Short variable names honoured on top of `APP__SECTION__KEY`.
const LEGACY_OVERRIDES: &[(&str, &[&str])] = &[
    ("server.port", &["SERVER_PORT"]),
    ("server.public_url", &["PUBLIC_URL"]),
    ("asr.endpoint", &["ASR_URL", "WHISPER_URL"]),
    ("asr.limit", &["ASR_LIMIT"]),
    ("asr.timeout_secs", &["ASR_TIMEOUT_SECS"]),
    ("ml.endpoint", &["ML_URL"]),
    ("ml.limit", &["ML_LIMIT"]),
    ("ml.timeout_secs", &["ML_TIMEOUT_SECS"]),
    ("retry.max_attempts", &["DISPATCH_RETRIES"]),
    ("retry.base_delay_ms", &["DISPATCH_BASE_DELAY_MS"]),
    ("storage.audio_dir", &["AUDIO_DIR"]),
    ("export.out_dir", &["OUT_DIR"]),
    ("inbox.dir", &["INBOX_DIR"]),
];

impl Settings {
    /// Defaults, then `appsettings.{env}`, then `APP__*` variables, then the
    /// short legacy variables.
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        let env_lookup = |name: &str| std::env::var(name).ok();
        Self::load_with(environment, env_lookup)
    }

    pub fn load_with(
        environment: Environment,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?
            .add_source(
                File::with_name(&environment.settings_file()).required(false),
            )
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("inbox.extensions")
                    .try_parsing(true),
            );

        for (key, names) in LEGACY_OVERRIDES {
            let value = names.iter().find_map(|name| lookup(name));
            builder = builder.set_override_option(*key, value)?;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            builder = builder.set_override("logging.json", format.eq_ignore_ascii_case("json"))?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("server.public_url", "http://localhost:8080")?
            .set_default("server.max_upload_mb", 100_i64)?
            .set_default("asr.endpoint", "http://localhost:8000/transcribe")?
            .set_default("asr.limit", 1_i64)?
            .set_default("asr.timeout_secs", 120_i64)?
            .set_default("ml.endpoint", "http://localhost:8010/infer")?
            .set_default("ml.limit", 1_i64)?
            .set_default("ml.timeout_secs", 60_i64)?
            .set_default("retry.max_attempts", 3_i64)?
            .set_default("retry.base_delay_ms", 500_i64)?
            .set_default("storage.provider", "local")?
            .set_default("storage.audio_dir", "audio_in")?
            .set_default("storage.delete_after_transcription", false)?
            .set_default("inbox.extensions", vec!["wav"])?
            .set_default("logging.level", "info,raai=debug,tower_http=info")?
            .set_default("logging.json", false)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, stage) in [("asr", &self.asr), ("ml", &self.ml)] {
            if stage.limit == 0 {
                return Err(ConfigError::Invalid(format!("{}.limit must be at least 1", name)));
            }
            reqwest::Url::parse(&stage.endpoint).map_err(|e| {
                ConfigError::Invalid(format!("{}.endpoint '{}': {}", name, stage.endpoint, e))
            })?;
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        reqwest::Url::parse(&self.server.public_url).map_err(|e| {
            ConfigError::Invalid(format!("server.public_url '{}': {}", self.server.public_url, e))
        })?;

        Ok(())
    }

    pub fn stage_limits(&self) -> StageLimits {
        StageLimits {
            asr: self.asr.limit,
            ml: self.ml.limit,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            limits: self.stage_limits(),
            retry: self.retry_policy(),
            callback_base_url: self.server.public_url.clone(),
            delete_audio_after_transcription: self.storage.delete_after_transcription,
        }
    }

    pub fn asr_endpoint(&self) -> StageEndpoint {
        self.asr.endpoint()
    }

    pub fn ml_endpoint(&self) -> StageEndpoint {
        self.ml.endpoint()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl StageSettings {
    fn endpoint(&self) -> StageEndpoint {
        StageEndpoint {
            url: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
