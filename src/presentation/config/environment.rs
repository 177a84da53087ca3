use std::fmt;
use std::str::FromStr;

/// Deployment the process runs in; picks the optional settings file layered
/// over the built-in defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Test,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Test => "test",
            Environment::Prod => "prod",
        }
    }

    /// `appsettings.local`, `appsettings.test` or `appsettings.prod`, with any
    /// extension the `config` crate understands.
    pub fn settings_file(&self) -> String {
        format!("appsettings.{}", self.as_str())
    }

    /// `APP_ENV`, or local when unset.
    pub fn from_env() -> Result<Self, String> {
        match std::env::var("APP_ENV") {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Local),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "dev" | "development" => Ok(Environment::Local),
            "test" => Ok(Environment::Test),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!(
                "unknown APP_ENV '{}' (expected local, test or prod)",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
