use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub nlu: NluConfig,
    pub market: MarketConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    /// An empty bot token selects the no-op transport. Useful for local
    /// development where the bot should run against the database only.
    pub fn has_token(&self) -> bool {
        !self.bot_token.expose_secret().trim().is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct NluConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub language: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MarketConfig {
    pub search_radius_m: f64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub nlu_base_url: Option<String>,
    pub nlu_token: Option<String>,
    pub search_radius_m: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("config file references undefined environment variable `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated `${{...}}` interpolation in config file")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://sokoni.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
            },
            nlu: NluConfig {
                base_url: "http://localhost:5000".to_string(),
                token: None,
                language: "en".to_string(),
                timeout_secs: 10,
            },
            market: MarketConfig { search_radius_m: 2_000.0 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("sokoni.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            merge(&mut self.database.url, database.url);
            merge(&mut self.database.max_connections, database.max_connections);
            merge(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(telegram) = patch.telegram {
            merge(&mut self.telegram.bot_token, telegram.bot_token.map(secret_value));
            merge(&mut self.telegram.api_base, telegram.api_base);
            merge(&mut self.telegram.poll_timeout_secs, telegram.poll_timeout_secs);
        }

        if let Some(nlu) = patch.nlu {
            merge(&mut self.nlu.base_url, nlu.base_url);
            if let Some(token) = nlu.token {
                self.nlu.token = Some(secret_value(token));
            }
            merge(&mut self.nlu.language, nlu.language);
            merge(&mut self.nlu.timeout_secs, nlu.timeout_secs);
        }

        if let Some(market) = patch.market {
            merge(&mut self.market.search_radius_m, market.search_radius_m);
        }

        if let Some(server) = patch.server {
            merge(&mut self.server.bind_address, server.bind_address);
            merge(&mut self.server.health_check_port, server.health_check_port);
            merge(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            merge(&mut self.logging.level, logging.level);
            merge(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SOKONI_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SOKONI_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("SOKONI_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SOKONI_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("SOKONI_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOKONI_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("SOKONI_TELEGRAM_API_BASE") {
            self.telegram.api_base = value;
        }
        if let Some(value) = read_env("SOKONI_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_env("SOKONI_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOKONI_NLU_BASE_URL") {
            self.nlu.base_url = value;
        }
        if let Some(value) = read_env("SOKONI_NLU_TOKEN") {
            self.nlu.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOKONI_NLU_LANGUAGE") {
            self.nlu.language = value;
        }
        if let Some(value) = read_env("SOKONI_NLU_TIMEOUT_SECS") {
            self.nlu.timeout_secs = parse_env("SOKONI_NLU_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOKONI_MARKET_SEARCH_RADIUS_M") {
            self.market.search_radius_m = parse_env("SOKONI_MARKET_SEARCH_RADIUS_M", &value)?;
        }

        if let Some(value) = read_env("SOKONI_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SOKONI_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_env("SOKONI_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SOKONI_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("SOKONI_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("SOKONI_LOGGING_LEVEL").or_else(|| read_env("SOKONI_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SOKONI_LOGGING_FORMAT").or_else(|| read_env("SOKONI_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(telegram_bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(telegram_bot_token);
        }
        if let Some(nlu_base_url) = overrides.nlu_base_url {
            self.nlu.base_url = nlu_base_url;
        }
        if let Some(nlu_token) = overrides.nlu_token {
            self.nlu.token = Some(secret_value(nlu_token));
        }
        if let Some(search_radius_m) = overrides.search_radius_m {
            self.market.search_radius_m = search_radius_m;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_telegram(&self.telegram)?;
        validate_nlu(&self.nlu)?;
        validate_market(&self.market)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("sokoni.toml"), PathBuf::from("config/sokoni.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

// Substitutes `${VAR}` markers with their environment values before the TOML
// parse, so secrets never need to live in the config file itself.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let expr = &rest[start + 2..];

        let end = expr.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &expr[..end];
        let value =
            env::var(var).map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);

        rest = &expr[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_string()))
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    require(
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
        "database.url must point at SQLite (`sqlite://...`, `sqlite::...`, or `:memory:`)",
    )?;
    require(database.max_connections > 0, "database.max_connections must be greater than zero")?;
    require(
        (1..=300).contains(&database.timeout_secs),
        "database.timeout_secs must be in range 1..=300",
    )
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    // An empty bot token is allowed and selects the no-op transport.
    let bot_token = telegram.bot_token.expose_secret().trim();
    require(
        bot_token.is_empty() || bot_token.contains(':'),
        "telegram.bot_token must look like `<bot-id>:<secret>`. Get it from @BotFather",
    )?;
    require(
        is_http_url(&telegram.api_base),
        "telegram.api_base must start with http:// or https://",
    )?;
    require(
        (1..=50).contains(&telegram.poll_timeout_secs),
        "telegram.poll_timeout_secs must be in range 1..=50",
    )
}

fn validate_nlu(nlu: &NluConfig) -> Result<(), ConfigError> {
    require(is_http_url(&nlu.base_url), "nlu.base_url must start with http:// or https://")?;
    require(!nlu.language.trim().is_empty(), "nlu.language must not be empty")?;
    require((1..=300).contains(&nlu.timeout_secs), "nlu.timeout_secs must be in range 1..=300")
}

fn validate_market(market: &MarketConfig) -> Result<(), ConfigError> {
    require(
        market.search_radius_m.is_finite() && market.search_radius_m > 0.0,
        "market.search_radius_m must be a positive number of meters",
    )
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    require(server.health_check_port > 0, "server.health_check_port must be greater than zero")?;
    require(
        server.graceful_shutdown_secs > 0,
        "server.graceful_shutdown_secs must be greater than zero",
    )
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    require(
        matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"),
        "logging.level must be one of trace|debug|info|warn|error",
    )
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    telegram: Option<TelegramPatch>,
    nlu: Option<NluPatch>,
    market: Option<MarketPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NluPatch {
    base_url: Option<String>,
    token: Option<String>,
    language: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MarketPatch {
    search_radius_m: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
