use serde;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub app_host: String,
    pub app_port: u16,
    /// Shared bearer secret every connection must present
    pub auth_token: String,
    /// Fixture document; the built-in one is used when unset
    #[serde(default)]
    pub fixtures_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub handler_timeout_secs: u64,
    pub server_name: String,
    pub environment: String,
}

impl Settings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.app_host, self.app_port)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.auth_token.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "auth_token must be set (TESTBED__AUTH_TOKEN or MCP_AUTH_TOKEN)".to_string(),
            ));
        }
        if self.handler_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "handler_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    config::Config::builder()
        .set_default("app_host", "127.0.0.1")?
        .set_default("app_port", 8000)?
        .set_default("auth_token", "")?
        .set_default("data_dir", "data")?
        .set_default("handler_timeout_secs", 5)?
        .set_default("server_name", "mcp-testbed")?
        .set_default("environment", "development")
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = builder()?
        // Add configuration values from an optional file named `configuration`
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("TESTBED")
                .prefix_separator("__")
                .separator("__"),
        )
        // Conventional variables set by the hosting platform
        .set_override_option("app_port", std::env::var("PORT").ok())?
        .set_override_option("auth_token", std::env::var("MCP_AUTH_TOKEN").ok())?
        .build()?;

    let config: Settings = settings.try_deserialize()?;
    config.validate()?;

    Ok(config)
}
