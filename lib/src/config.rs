use std::net::SocketAddr;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::Result;

pub static CONFIG_FILE: &'static str = "mailshot.toml";

/// Application configuration.
///
/// # Sensible defaults
///
/// `Config::default()` gives a working local setup: formatted logs, a `./db`
/// store, the standard dispatch policy and an http api on `127.0.0.1:8080`.
/// Only the smtp section has to be filled in before real sends can happen.
///
/// ```ignore
/// let cfg = Config {
///     dispatch: Dispatch {
///         delay_ms: 0,
///         ..Default::default()
///     },
///     ..Default::default()
/// }
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub name: String,
    pub version: String,

    /// Address on which to serve the http api. Defaults to `127.0.0.1:8080`.
    pub address: SocketAddr,

    pub tracing: Tracing,
    pub email: Email,
    pub dispatch: Dispatch,
    pub db: Db,

    /// Development mode configuration.
    pub dev: DevMode,

    /// Selectively enable/disable pre-made routes
    pub routes: Routes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            tracing: Tracing::default(),
            email: Email::default(),
            dispatch: Dispatch::default(),
            db: Db::default(),
            dev: DevMode::default(),
            routes: Routes::default(),
        }
    }
}

/// Loads application config from toml file at default location.
pub fn load<T: DeserializeOwned>() -> Result<T> {
    load_from(CONFIG_FILE)
}

/// Loads application config from toml file at standard path using provided
/// name.
///
/// For example for `name` == `mailshot.toml` we will load both
/// `mailshot.toml` and `secret.mailshot.toml` from the working directory.
/// Environment variables override both, e.g. `EMAIL__SMTP_PASSWORD`.
pub fn load_from<T: DeserializeOwned>(name: impl AsRef<str>) -> Result<T> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(name.as_ref()))
        .add_source(config::File::with_name(&format!("secret.{}", name.as_ref())).required(false))
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix_separator("__"),
        )
        .build()?;

    let config: T = config.try_deserialize()?;

    Ok(config)
}

/// Loads application config from multiple toml files at given paths.
pub fn load_from_many<T: DeserializeOwned>(paths: &[impl AsRef<str>]) -> Result<T> {
    let mut builder = config::Config::builder().add_source(
        config::Environment::default()
            .separator("__")
            .prefix_separator("__"),
    );

    for path in paths {
        builder = builder.add_source(config::File::with_name(path.as_ref()));
    }
    let config = builder.build()?;

    let config: T = config.try_deserialize()?;

    Ok(config)
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Tracing {
    pub enabled: bool,

    pub mode: crate::tracing::Mode,
    pub level: crate::tracing::Level,

    pub loki_address: String,
}

impl Default for Tracing {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: crate::tracing::Mode::default(),
            level: crate::tracing::Level::default(),
            loki_address: "".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Email {
    /// Address the batch is sent from.
    pub address: String,
    /// Optional display name for the sender address.
    pub from_name: String,

    // Smtp server and credentials.
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
}

/// Dispatch policy.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Dispatch {
    /// Pause between finishing one entry and starting the next, in
    /// milliseconds. Zero disables the pause.
    pub delay_ms: u64,
    /// Substrings marking a send failure as systemic. Matching is
    /// case-sensitive.
    pub systemic_signals: Vec<String>,
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            systemic_signals: crate::dispatch::DEFAULT_SYSTEMIC_SIGNALS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Dispatch {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Db {
    /// Path to the store directory, relative to the working directory.
    pub path: String,
    /// Use a throwaway store that is removed on drop.
    pub temporary: bool,
}

impl Default for Db {
    fn default() -> Self {
        Self {
            path: "db".to_string(),
            temporary: false,
        }
    }
}

/// NOTE: make sure to disable on production.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DevMode {
    /// Global switch for all dev mode items. Sends are only logged.
    pub enabled: bool,
    /// Seed an empty store with sample entries and a template.
    pub mock: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Routes {
    pub enable: Vec<String>,
    pub disable: Vec<String>,
}
