//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "conteggio";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_EPOCH_START: &str = "2020-01-01";
const DEFAULT_ACTIVITY_THRESHOLD: u64 = 10;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the conteggio binary.
#[derive(Debug, Parser)]
#[command(
    name = "conteggio",
    version,
    about = "Calendar-aligned rollups of categorized forum activity"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "CONTEGGIO_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Aggregate and publish changed artifacts to the object store.
    Run(RunArgs),
    /// Aggregate and write the full artifact set to a local directory.
    Export(ExportArgs),
    /// Aggregate and report which artifacts would upload, without publishing.
    Diff(DiffArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: PipelineOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub overrides: PipelineOverrides,

    /// Directory to write artifacts into.
    #[arg(value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub out: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DiffArgs {
    #[command(flatten)]
    pub overrides: PipelineOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct PipelineOverrides {
    /// Override the event source connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the event source pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the source time zone (IANA name).
    #[arg(long = "source-timezone", value_name = "ZONE")]
    pub source_timezone: Option<String>,

    /// Override the first date of recorded history (YYYY-MM-DD).
    #[arg(long = "source-epoch-start", value_name = "DATE")]
    pub source_epoch_start: Option<String>,

    /// Override the post-count threshold for the active new-poster report.
    #[arg(long = "source-activity-threshold", value_name = "COUNT")]
    pub source_activity_threshold: Option<u64>,

    /// Override the object store base URL (HTTP backend).
    #[arg(long = "store-url", value_name = "URL")]
    pub store_url: Option<String>,

    /// Override the object store directory (filesystem backend).
    #[arg(long = "store-directory", value_name = "PATH")]
    pub store_directory: Option<PathBuf>,

    /// Override the object store request timeout.
    #[arg(long = "store-timeout-seconds", value_name = "SECONDS")]
    pub store_timeout_seconds: Option<u64>,

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

/// Fully-resolved run settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub source: SourceSettings,
    pub store: Option<StoreSettings>,
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

/// Semantics of the event source: the civil time zone truncation happens in,
/// the dataset's beginning of history, and the activity threshold for the
/// `new_<N>plus` poster report.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub timezone: Tz,
    pub epoch_start: NaiveDate,
    pub activity_threshold: u64,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum StoreBackend {
    Http { base: Url },
    Filesystem { directory: PathBuf },
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

    builder = builder.add_source(Environment::with_prefix("CONTEGGIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    let overrides = match &cli.command {
        Command::Run(args) => &args.overrides,
        Command::Export(args) => &args.overrides,
        Command::Diff(args) => &args.overrides,
    };
    raw.apply_overrides(overrides);

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
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    source: RawSourceSettings,
    store: RawStoreSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &PipelineOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(zone) = overrides.source_timezone.as_ref() {
            self.source.timezone = Some(zone.clone());
        }
        if let Some(epoch) = overrides.source_epoch_start.as_ref() {
            self.source.epoch_start = Some(epoch.clone());
        }
        if let Some(threshold) = overrides.source_activity_threshold {
            self.source.activity_threshold = Some(threshold);
        }
        if let Some(url) = overrides.store_url.as_ref() {
            self.store.url = Some(url.clone());
        }
        if let Some(directory) = overrides.store_directory.as_ref() {
            self.store.directory = Some(directory.clone());
        }
        if let Some(timeout) = overrides.store_timeout_seconds {
            self.store.request_timeout_seconds = Some(timeout);
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
            logging,
            database,
            source,
            store,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            source: build_source_settings(source)?,
            store: build_store_settings(store)?,
        })
    }
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_value).ok_or_else(|| {
        LoadError::invalid("database.max_connections", "must be greater than zero")
    })?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_source_settings(source: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let zone_name = source
        .timezone
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(zone_name.as_str())
        .map_err(|_| LoadError::invalid("source.timezone", format!("unknown zone `{zone_name}`")))?;

    let epoch_value = source
        .epoch_start
        .unwrap_or_else(|| DEFAULT_EPOCH_START.to_string());
    let epoch_start = NaiveDate::parse_from_str(epoch_value.as_str(), "%Y-%m-%d").map_err(|_| {
        LoadError::invalid(
            "source.epoch_start",
            format!("`{epoch_value}` is not a YYYY-MM-DD date"),
        )
    })?;

    let activity_threshold = source
        .activity_threshold
        .unwrap_or(DEFAULT_ACTIVITY_THRESHOLD);
    if activity_threshold == 0 {
        return Err(LoadError::invalid(
            "source.activity_threshold",
            "must be greater than zero",
        ));
    }

    Ok(SourceSettings {
        timezone,
        epoch_start,
        activity_threshold,
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<Option<StoreSettings>, LoadError> {
    let request_timeout = Duration::from_secs(
        store
            .request_timeout_seconds
            .unwrap_or(DEFAULT_STORE_TIMEOUT_SECS),
    );

    let backend = match (store.url, store.directory) {
        (Some(_), Some(_)) => {
            return Err(LoadError::invalid(
                "store",
                "`url` and `directory` are mutually exclusive",
            ));
        }
        (Some(url), None) => {
            let mut base = Url::parse(url.as_str())
                .map_err(|err| LoadError::invalid("store.url", format!("{err}")))?;
            // Join semantics drop the last path segment without this.
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            Some(StoreBackend::Http { base })
        }
        (None, Some(directory)) => Some(StoreBackend::Filesystem { directory }),
        (None, None) => None,
    };

    Ok(backend.map(|backend| StoreSettings {
        backend,
        request_timeout,
    }))
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
struct RawSourceSettings {
    timezone: Option<String>,
    epoch_start: Option<String>,
    activity_threshold: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    url: Option<String>,
    directory: Option<PathBuf>,
    request_timeout_seconds: Option<u64>,
}
