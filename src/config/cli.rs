use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use inkshop_api_types::ResourceType;
use url::Url;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Command-line arguments for the inkshop binary.
#[derive(Debug, Parser)]
#[command(name = "inkshop", version, about = "Inkshop catalog server and cache tools")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INKSHOP_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the catalog HTTP service.
    Serve(Box<ServeArgs>),
    /// Invalidate one resource type on a running server.
    Invalidate(InvalidateArgs),
    /// Print a running server's invalidation registry.
    Versions(VersionsArgs),
    /// Advance a local version file to a running server's registry and list
    /// the resource types that changed since the last sync. No cache is held
    /// here, so nothing is evicted.
    Sync(SyncArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the catalog data directory.
    #[arg(long = "store-data-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub store_data_dir: Option<PathBuf>,

    /// Toggle the server-side listing cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the page regeneration webhook URL.
    #[arg(long = "invalidation-revalidate-url", value_name = "URL")]
    pub revalidate_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RemoteArgs {
    /// Base URL of the inkshop server.
    #[arg(long = "server", value_name = "URL", default_value = DEFAULT_SERVER_URL)]
    pub server: Url,

    /// Request timeout in milliseconds.
    #[arg(long = "timeout-ms", value_name = "MILLIS", default_value_t = 5_000)]
    pub timeout_ms: u64,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Resource type to invalidate (products|artists|galeria|categories|all).
    #[arg(long = "type", value_name = "TYPE")]
    pub resource: ResourceType,

    /// Shared invalidation secret.
    #[arg(
        long = "secret",
        env = "INKSHOP__INVALIDATION__SECRET",
        hide_env_values = true,
        value_name = "SECRET"
    )]
    pub secret: String,
}

#[derive(Debug, Args, Clone)]
pub struct VersionsArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// File holding the last reconciled registry snapshot.
    #[arg(long = "state-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub state_file: PathBuf,
}
