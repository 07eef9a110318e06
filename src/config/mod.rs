//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "umlpipe";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8440";
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_JAVA_PATH: &str = "java";
const DEFAULT_PLANTUML_PATH: &str = "/usr/share/java/plantuml/plantuml.jar";
const DEFAULT_SEARCH_PATH: &str = ".";
const DEFAULT_PIPE_DELIMITER: &str = "XXXPUMLXXX";
const DEFAULT_CACHE_MAX_BYTES: u64 = 10_000_000;
pub(crate) const DEFAULT_RENDER_OUTPUT_NAME: &str = "diagram";
pub(crate) const DEFAULT_RENDER_OUTPUT_SEP: &str = "---UMLPIPE---";

/// Command-line arguments for the umlpipe binary.
#[derive(Debug, Parser)]
#[command(
    name = "umlpipe",
    version,
    about = "PlantUML rendering proxy and client"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "UMLPIPE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    /// Proxy address: the listen address for `daemon`, the server to talk
    /// to for client commands.
    #[arg(long, env = "UMLPIPE_ADDR", value_name = "HOST:PORT", global = true)]
    pub addr: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the rendering proxy daemon.
    Daemon(DaemonArgs),
    /// Encode diagram text into a shorter, portable string.
    Shorten(ShortenArgs),
    /// Decode a short string back into diagram source text.
    Expand(ExpandArgs),
    /// Render diagram(s) as images (PNG or SVG).
    Render(RenderArgs),
    /// Extract the original diagram text from a rendered image.
    Extract(ExtractArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub overrides: DaemonOverrides,
}

#[derive(Debug, Args, Clone, Default)]
pub struct DaemonOverrides {
    /// Number of renderer subprocesses used for rendering.
    #[arg(long, value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Max time to wait on a diagram render before killing the job.
    #[arg(long = "render-timeout", value_name = "SECONDS")]
    pub render_timeout: Option<u64>,

    /// Path to the java binary.
    #[arg(long = "java-path", value_name = "PATH")]
    pub java_path: Option<PathBuf>,

    /// Path to the PlantUML jar.
    #[arg(long = "plantuml-path", value_name = "PATH")]
    pub plantuml_path: Option<PathBuf>,

    /// Directory PlantUML searches for includes and themes; created on start.
    #[arg(long = "search-path", value_name = "PATH")]
    pub search_path: Option<PathBuf>,

    /// Separator the renderer emits between images. Override only if the
    /// default could appear in your users' diagrams.
    #[arg(long = "pipe-delimiter", value_name = "STRING")]
    pub pipe_delimiter: Option<String>,

    /// Enables the peer cache and sets the HTTP socket it listens on.
    #[arg(long = "cache-addr", short = 'c', value_name = "HOST:PORT")]
    pub cache_addr: Option<String>,

    /// Another cache group member; repeat for each peer.
    #[arg(long = "group-member", short = 'g', value_name = "HOST:PORT")]
    pub group_member: Vec<String>,

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
}

#[derive(Debug, Args, Clone)]
pub struct ShortenArgs {
    /// File to read; stdin when omitted.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ExpandArgs {
    /// Short code to expand; stdin when omitted.
    #[arg(value_name = "SHORTCODE")]
    pub shortcode: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Diagram file or shortcode; stdin when omitted. Stdin holding both
    /// `@start` and `@end` is treated as source, otherwise as a shortcode.
    #[arg(value_name = "FILE|SHORTCODE")]
    pub input: Option<String>,

    /// Format to render diagrams as (png or svg).
    #[arg(long, short = 'f', default_value = "png", value_name = "FORMAT")]
    pub format: String,

    /// Write diagram(s) to disk instead of stdout.
    #[arg(long = "output-to-disk", short = 'o')]
    pub output_to_disk: bool,

    /// Output file name, sans extension; numbered when the source holds
    /// multiple diagrams.
    #[arg(
        long = "output-name",
        short = 'n',
        default_value = DEFAULT_RENDER_OUTPUT_NAME,
        value_name = "NAME"
    )]
    pub output_name: String,

    /// Separator written between multiple diagrams on stdout.
    #[arg(long, default_value = DEFAULT_RENDER_OUTPUT_SEP, value_name = "STRING")]
    pub sep: String,
}

#[derive(Debug, Args, Clone)]
pub struct ExtractArgs {
    /// Image file to read; `-` reads stdin.
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Print the short code instead of the full text.
    #[arg(long, short = 's')]
    pub short: bool,

    /// Print the macro-expanded diagram when the image carries one.
    #[arg(long = "expand-macros")]
    pub expand_macros: bool,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub cache: CacheSettings,
    pub client: ClientSettings,
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
pub struct RenderSettings {
    pub workers: NonZeroUsize,
    pub timeout: Duration,
    pub java_path: PathBuf,
    pub plantuml_path: PathBuf,
    pub search_path: PathBuf,
    pub pipe_delimiter: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Cache listener address; `None` disables the cache.
    pub addr: Option<String>,
    pub members: Vec<String>,
    pub max_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub addr: Option<String>,
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

    builder = builder.add_source(Environment::with_prefix("UMLPIPE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Daemon(args) => {
            if let Some(addr) = cli.addr.as_ref() {
                raw.server.addr = Some(addr.clone());
            }
            raw.apply_daemon_overrides(&args.overrides);
        }
        _ => {
            if let Some(addr) = cli.addr.as_ref() {
                raw.client.addr = Some(addr.clone());
            }
        }
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the parsed CLI arguments, returning both
/// for downstream use.
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
    render: RawRenderSettings,
    cache: RawCacheSettings,
    client: RawClientSettings,
}

impl RawSettings {
    fn apply_daemon_overrides(&mut self, overrides: &DaemonOverrides) {
        if let Some(workers) = overrides.workers {
            self.render.workers = Some(workers);
        }
        if let Some(timeout) = overrides.render_timeout {
            self.render.timeout_seconds = Some(timeout);
        }
        if let Some(path) = overrides.java_path.as_ref() {
            self.render.java_path = Some(path.clone());
        }
        if let Some(path) = overrides.plantuml_path.as_ref() {
            self.render.plantuml_path = Some(path.clone());
        }
        if let Some(path) = overrides.search_path.as_ref() {
            self.render.search_path = Some(path.clone());
        }
        if let Some(delimiter) = overrides.pipe_delimiter.as_ref() {
            self.render.pipe_delimiter = Some(delimiter.clone());
        }
        if let Some(addr) = overrides.cache_addr.as_ref() {
            self.cache.addr = Some(addr.clone());
        }
        if !overrides.group_member.is_empty() {
            self.cache.members = Some(overrides.group_member.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            cache,
            client,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            cache: build_cache_settings(cache)?,
            client: build_client_settings(client),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let addr = server
        .addr
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    let addr: SocketAddr = addr
        .parse()
        .map_err(|err| LoadError::invalid("server.addr", format!("`{addr}`: {err}")))?;

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

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let workers_value = match render.workers {
        Some(workers) => workers,
        None => std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(2),
    };
    let workers = NonZeroUsize::new(workers_value)
        .ok_or_else(|| LoadError::invalid("render.workers", "must be greater than zero"))?;

    let timeout_seconds = render
        .timeout_seconds
        .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "render.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let pipe_delimiter = render
        .pipe_delimiter
        .unwrap_or_else(|| DEFAULT_PIPE_DELIMITER.to_string());
    if pipe_delimiter.trim().is_empty() {
        return Err(LoadError::invalid(
            "render.pipe_delimiter",
            "must not be empty",
        ));
    }

    Ok(RenderSettings {
        workers,
        timeout: Duration::from_secs(timeout_seconds),
        java_path: render
            .java_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_JAVA_PATH)),
        plantuml_path: render
            .plantuml_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLANTUML_PATH)),
        search_path: render
            .search_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SEARCH_PATH)),
        pipe_delimiter,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let addr = cache.addr.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    if let Some(addr) = addr.as_ref() {
        addr.parse::<SocketAddr>()
            .map_err(|err| LoadError::invalid("cache.addr", format!("`{addr}`: {err}")))?;
    }

    let members = cache.members.unwrap_or_default();
    if members.iter().any(|member| member.trim().is_empty()) {
        return Err(LoadError::invalid(
            "cache.members",
            "members must not be empty strings",
        ));
    }

    let max_bytes_value = cache.max_bytes.unwrap_or(DEFAULT_CACHE_MAX_BYTES);
    let max_bytes = NonZeroU64::new(max_bytes_value)
        .ok_or_else(|| LoadError::invalid("cache.max_bytes", "must be greater than zero"))?;

    Ok(CacheSettings {
        addr,
        members,
        max_bytes,
    })
}

fn build_client_settings(client: RawClientSettings) -> ClientSettings {
    ClientSettings {
        addr: client.addr.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    addr: Option<String>,
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
struct RawRenderSettings {
    workers: Option<usize>,
    timeout_seconds: Option<u64>,
    java_path: Option<PathBuf>,
    plantuml_path: Option<PathBuf>,
    search_path: Option<PathBuf>,
    pipe_delimiter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    addr: Option<String>,
    members: Option<Vec<String>>,
    max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawClientSettings {
    addr: Option<String>,
}
