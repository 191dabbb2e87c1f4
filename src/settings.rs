//! Handles settings for the application.
//!
//! Values are layered: built-in defaults, then an optional `settings.toml`
//! next to the binary, then `SPLITSETTLE__*` environment variables
//! (`SPLITSETTLE__DATABASE__URI`, `SPLITSETTLE__AUTH__SECRET`, ...).
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    pub uri: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Auth {
    /// Shared secret members' requests are signed with.
    pub secret: String,
    /// Key trusted backend services send verbatim.
    pub service_key: String,
    pub max_age_secs: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub auth: Auth,
    pub log: Log,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        defaults(Config::builder())?
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("SPLITSETTLE").separator("__"))
            .build()?
            .try_deserialize()
    }
}

fn defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.uri", "mongodb://localhost:27017")?
        .set_default("database.name", "SplitSettle")?
        .set_default("auth.max_age_secs", 86_400)?
        .set_default("log.level", "info")
}
