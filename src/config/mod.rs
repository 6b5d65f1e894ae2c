//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{
    CliArgs, Command, InvalidateArgs, RemoteArgs, ServeArgs, ServeOverrides, SyncArgs,
    VersionsArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "inkshop";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_CACHE_TTL_MS: u64 = 86_400_000;
const DEFAULT_REVALIDATE_TIMEOUT_MS: u64 = 5_000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
    pub invalidation: InvalidationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub products_ttl: Duration,
    pub artists_ttl: Duration,
    pub gallery_ttl: Duration,
    pub categories_ttl: Duration,
}

#[derive(Clone)]
pub struct InvalidationSettings {
    /// Shared secret for `POST /api/cache/invalidate`. `None` rejects every request.
    pub secret: Option<String>,
    pub revalidate_url: Option<Url>,
    pub revalidate_timeout: Duration,
}

impl fmt::Debug for InvalidationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field(
                "revalidate_url",
                &self.revalidate_url.as_ref().map(Url::as_str),
            )
            .field("revalidate_timeout", &self.revalidate_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("INKSHOP").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Invalidate(_) | Command::Versions(_) | Command::Sync(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    cache: RawCacheSettings,
    invalidation: RawInvalidationSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(dir) = overrides.store_data_dir.as_ref() {
            self.store.data_dir = Some(dir.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(url) = overrides.revalidate_url.as_ref() {
            self.invalidation.revalidate_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            store,
            cache,
            invalidation,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            store: build_store_settings(store)?,
            cache: build_cache_settings(cache)?,
            invalidation: build_invalidation_settings(invalidation)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let data_dir = store
        .data_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    if data_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "store.data_dir",
            "path must not be empty",
        ));
    }
    Ok(StoreSettings { data_dir })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        products_ttl: ttl(cache.products_ttl_ms, "cache.products_ttl_ms")?,
        artists_ttl: ttl(cache.artists_ttl_ms, "cache.artists_ttl_ms")?,
        gallery_ttl: ttl(cache.gallery_ttl_ms, "cache.gallery_ttl_ms")?,
        categories_ttl: ttl(cache.categories_ttl_ms, "cache.categories_ttl_ms")?,
    })
}

fn build_invalidation_settings(
    invalidation: RawInvalidationSettings,
) -> Result<InvalidationSettings, LoadError> {
    let secret = non_blank(invalidation.secret);

    let revalidate_url = match non_blank(invalidation.revalidate_url) {
        Some(value) => {
            let url = Url::parse(&value).map_err(|err| {
                LoadError::invalid("invalidation.revalidate_url", format!("invalid url: {err}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "invalidation.revalidate_url",
                    "scheme must be http or https",
                ));
            }
            Some(url)
        }
        None => None,
    };

    let timeout_ms = invalidation
        .revalidate_timeout_ms
        .unwrap_or(DEFAULT_REVALIDATE_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "invalidation.revalidate_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(InvalidationSettings {
        secret,
        revalidate_url,
        revalidate_timeout: Duration::from_millis(timeout_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    products_ttl_ms: Option<u64>,
    artists_ttl_ms: Option<u64>,
    gallery_ttl_ms: Option<u64>,
    categories_ttl_ms: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawInvalidationSettings {
    secret: Option<String>,
    revalidate_url: Option<String>,
    revalidate_timeout_ms: Option<u64>,
}

impl fmt::Debug for RawInvalidationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawInvalidationSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("revalidate_url", &self.revalidate_url)
            .field("revalidate_timeout_ms", &self.revalidate_timeout_ms)
            .finish()
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn ttl(value: Option<u64>, key: &'static str) -> Result<Duration, LoadError> {
    let millis = value.unwrap_or(DEFAULT_CACHE_TTL_MS);
    if millis == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(millis))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
