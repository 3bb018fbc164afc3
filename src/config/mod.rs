//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::load_with_cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use time::Duration;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "lettura";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_MEMORY_CAPACITY: usize = 5000;
const DEFAULT_RECENT_READS_WINDOW_DAYS: u32 = 183;
const DEFAULT_ACTIVE_MEMBERS_WINDOW_DAYS: u32 = 365;
const DEFAULT_READ_DEDUPE_WINDOW_DAYS: u32 = 7;
const DEFAULT_BLOG_BASE_URL: &str = "http://127.0.0.1:3000/blog";
const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/";
const DEFAULT_DISCORD_TIMEOUT_SECS: u64 = 5;

/// Command-line arguments for the Lettura binary.
#[derive(Debug, Parser)]
#[command(name = "lettura", version, about = "Lettura read-tracking server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LETTURA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Lettura HTTP service.
    Serve(Box<ServeArgs>),
    /// Force-refresh every cached ranking snapshot.
    #[command(name = "recompute")]
    Recompute(RecomputeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the public blog base URL used in links and listings.
    #[arg(long = "site-blog-base-url", value_name = "URL")]
    pub site_blog_base_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RecomputeArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Maximum number of concurrent snapshot refreshes.
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(usize))]
    pub concurrency: usize,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub ranking: RankingSettings,
    pub tracking: TrackingSettings,
    pub site: SiteSettings,
    pub discord: Option<DiscordSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingsCacheBackend {
    /// The shared `cache_entries` table; survives restarts.
    Durable,
    /// The per-process LRU tier; fastest, no cross-instance consistency.
    Memory,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub memory_capacity: NonZeroUsize,
    pub rankings_backend: RankingsCacheBackend,
}

#[derive(Debug, Clone)]
pub struct RankingSettings {
    pub recent_reads_window: Duration,
    pub active_members_window: Duration,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub dedupe_window: Duration,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub blog_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DiscordSettings {
    pub bot_token: String,
    pub leaderboard_channel_id: String,
    pub api_base: String,
    pub timeout_seconds: NonZeroU64,
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

    builder = builder.add_source(Environment::with_prefix("LETTURA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Recompute(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    ranking: RawRankingSettings,
    tracking: RawTrackingSettings,
    site: RawSiteSettings,
    discord: RawDiscordSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    memory_capacity: Option<usize>,
    rankings_backend: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRankingSettings {
    recent_reads_window_days: Option<u32>,
    active_members_window_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTrackingSettings {
    dedupe_window_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    blog_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDiscordSettings {
    bot_token: Option<String>,
    leaderboard_channel_id: Option<String>,
    api_base: Option<String>,
    timeout_seconds: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.site_blog_base_url.as_ref() {
            self.site.blog_base_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            ranking,
            tracking,
            site,
            discord,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            ranking: build_ranking_settings(ranking)?,
            tracking: build_tracking_settings(tracking)?,
            site: build_site_settings(site)?,
            discord: build_discord_settings(discord)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;

    Ok(ServerSettings { public_addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        None => LevelFilter::INFO,
        Some(raw) => LevelFilter::from_str(&raw)
            .map_err(|err| LoadError::invalid("logging.level", err.to_string()))?,
    };
    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_connections).ok_or_else(|| {
        LoadError::invalid("database.max_connections", "must be greater than zero")
    })?;

    Ok(DatabaseSettings {
        url: database.url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let memory_capacity = cache
        .memory_capacity
        .unwrap_or(DEFAULT_CACHE_MEMORY_CAPACITY);
    let memory_capacity = NonZeroUsize::new(memory_capacity)
        .ok_or_else(|| LoadError::invalid("cache.memory_capacity", "must be greater than zero"))?;

    let rankings_backend = match cache.rankings_backend.as_deref() {
        None | Some("durable") => RankingsCacheBackend::Durable,
        Some("memory") => RankingsCacheBackend::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.rankings_backend",
                format!("unknown backend `{other}`, expected `durable` or `memory`"),
            ));
        }
    };

    Ok(CacheSettings {
        memory_capacity,
        rankings_backend,
    })
}

fn build_ranking_settings(ranking: RawRankingSettings) -> Result<RankingSettings, LoadError> {
    let recent = ranking
        .recent_reads_window_days
        .unwrap_or(DEFAULT_RECENT_READS_WINDOW_DAYS);
    if recent == 0 {
        return Err(LoadError::invalid(
            "ranking.recent_reads_window_days",
            "must be greater than zero",
        ));
    }
    let active = ranking
        .active_members_window_days
        .unwrap_or(DEFAULT_ACTIVE_MEMBERS_WINDOW_DAYS);
    if active == 0 {
        return Err(LoadError::invalid(
            "ranking.active_members_window_days",
            "must be greater than zero",
        ));
    }

    Ok(RankingSettings {
        recent_reads_window: Duration::days(recent as i64),
        active_members_window: Duration::days(active as i64),
    })
}

fn build_tracking_settings(tracking: RawTrackingSettings) -> Result<TrackingSettings, LoadError> {
    let days = tracking
        .dedupe_window_days
        .unwrap_or(DEFAULT_READ_DEDUPE_WINDOW_DAYS);
    if days == 0 {
        return Err(LoadError::invalid(
            "tracking.dedupe_window_days",
            "must be greater than zero",
        ));
    }
    Ok(TrackingSettings {
        dedupe_window: Duration::days(days as i64),
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let blog_base_url = site
        .blog_base_url
        .unwrap_or_else(|| DEFAULT_BLOG_BASE_URL.to_string());
    url::Url::parse(&blog_base_url)
        .map_err(|err| LoadError::invalid("site.blog_base_url", err.to_string()))?;
    Ok(SiteSettings { blog_base_url })
}

fn build_discord_settings(
    discord: RawDiscordSettings,
) -> Result<Option<DiscordSettings>, LoadError> {
    let timeout_seconds = discord
        .timeout_seconds
        .unwrap_or(DEFAULT_DISCORD_TIMEOUT_SECS);
    let timeout_seconds = NonZeroU64::new(timeout_seconds)
        .ok_or_else(|| LoadError::invalid("discord.timeout_seconds", "must be greater than zero"))?;

    match (discord.bot_token, discord.leaderboard_channel_id) {
        (None, None) => Ok(None),
        (Some(bot_token), Some(leaderboard_channel_id)) => Ok(Some(DiscordSettings {
            bot_token,
            leaderboard_channel_id,
            api_base: discord
                .api_base
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string()),
            timeout_seconds,
        })),
        (Some(_), None) => Err(LoadError::invalid(
            "discord.leaderboard_channel_id",
            "required when discord.bot_token is set",
        )),
        (None, Some(_)) => Err(LoadError::invalid(
            "discord.bot_token",
            "required when discord.leaderboard_channel_id is set",
        )),
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    candidate
        .parse()
        .map_err(|err| format!("invalid listener address `{candidate}`: {err}"))
}
