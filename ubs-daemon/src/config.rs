//! Load config from file and environment.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ubs_core::{IpRange, ScheduleWindow, Span, TaskDescriptor};

use crate::logging::LoggerConfig;

/// Daemon configuration. File: `--config`, `$UBS_CONFIG`, ~/.config/ubs/config.toml or
/// /etc/ubs/config.toml. Env overrides: UBS_FILE_SHARE_PORT, UBS_LOG_LEVEL.
/// Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit peers; also the fallback when the range is disabled or invalid.
    pub target_ips: Vec<Ipv4Addr>,
    /// Receiver listen port and sender destination port (default 8888).
    #[serde(default = "default_file_share_port")]
    pub file_share_port: u16,
    pub active_hours: ScheduleWindow,
    pub scheduled_tasks: ScheduledTasks,
    pub ip_range: IpRange,
    /// Random mode: sessions per day (default 3).
    #[serde(default = "default_daily_sessions")]
    pub daily_sessions: u32,
    /// Random mode: session length in minutes (default [30, 90]).
    #[serde(default = "default_session_duration")]
    pub session_duration_minutes: Span,
    /// Random mode: pause after each activity in minutes (default [2, 8]).
    #[serde(default = "default_task_wait")]
    pub task_wait_minutes: Span,
    /// Echo requests per address in the ping activity (default 4).
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    /// Documents written per run of the text file activity (default 5).
    #[serde(default = "default_files_to_create")]
    pub files_to_create_per_day: u32,
    /// HTTP endpoints returning text for generated documents.
    pub text_apis: Vec<String>,
    pub save_paths: SavePaths,
    /// Commands bound to external task names (browse_websites, send_smtp_email, ...).
    pub external: BTreeMap<String, ExternalTask>,
    pub log: LoggerConfig,
}

/// Scheduled mode switch and task list. Enabled selects the scheduled driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduledTasks {
    pub enabled: bool,
    pub tasks: Vec<TaskDescriptor>,
}

/// Output directories. Unset entries resolve under the user's home.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SavePaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_files: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_logs: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_files: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_logs: Option<PathBuf>,
}

impl SavePaths {
    pub fn text_files(&self) -> PathBuf {
        self.text_files
            .clone()
            .unwrap_or_else(|| home_dir().join("Documents"))
    }

    pub fn ping_logs(&self) -> PathBuf {
        self.ping_logs
            .clone()
            .unwrap_or_else(|| desktop_dir().join("ping_logs"))
    }

    pub fn received_files(&self) -> PathBuf {
        self.received_files
            .clone()
            .unwrap_or_else(|| desktop_dir().join("received"))
    }

    pub fn transfer_logs(&self) -> PathBuf {
        self.transfer_logs
            .clone()
            .unwrap_or_else(|| desktop_dir().join("transfer_logs"))
    }
}

/// External command run for a task name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTask {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound on one run; the process is killed past it (default 1800).
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

fn default_file_share_port() -> u16 {
    8888
}
fn default_daily_sessions() -> u32 {
    3
}
fn default_session_duration() -> Span {
    Span(30, 90)
}
fn default_task_wait() -> Span {
    Span(2, 8)
}
fn default_ping_count() -> u32 {
    4
}
fn default_files_to_create() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_external_timeout() -> u64 {
    1800
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_ips: vec![Ipv4Addr::new(192, 168, 1, 100)],
            file_share_port: default_file_share_port(),
            active_hours: ScheduleWindow::default(),
            scheduled_tasks: ScheduledTasks::default(),
            ip_range: IpRange::default(),
            daily_sessions: default_daily_sessions(),
            session_duration_minutes: default_session_duration(),
            task_wait_minutes: default_task_wait(),
            ping_count: default_ping_count(),
            files_to_create_per_day: default_files_to_create(),
            text_apis: Vec::new(),
            save_paths: SavePaths::default(),
            external: BTreeMap::new(),
            log: LoggerConfig::default(),
        }
    }
}

impl Config {
    /// Render as TOML (for `--print-config`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Render)
    }
}

/// Where the effective configuration came from. Reported once logging is up.
#[derive(Debug)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
    /// A file was found but could not be used; defaults apply.
    Rejected(ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Load config: defaults, then the first config file found, then env vars.
/// Never fails; a broken file is reported through `ConfigSource::Rejected`.
pub fn load(explicit: Option<&Path>) -> (Config, ConfigSource) {
    let (mut c, source) = match find_file(explicit) {
        None => (Config::default(), ConfigSource::Defaults),
        Some(path) => match load_file(&path) {
            Ok(c) => (c, ConfigSource::File(path)),
            Err(e) => (Config::default(), ConfigSource::Rejected(e)),
        },
    };
    apply_env(&mut c, |k| std::env::var(k).ok());
    (c, source)
}

pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<Config>(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("UBS_FILE_SHARE_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.file_share_port = p;
    }
    if let Some(level) = var("UBS_LOG_LEVEL") {
        c.log.level = level;
    }
}

fn find_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os("UBS_CONFIG") {
        return Some(PathBuf::from(p));
    }
    config_paths().into_iter().find(|p| p.exists())
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(h) = home_var() {
        out.push(h.join(".config/ubs/config.toml"));
    }
    out.push(PathBuf::from("/etc/ubs/config.toml"));
    out
}

fn home_var() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

pub fn home_dir() -> PathBuf {
    home_var().unwrap_or_else(|| PathBuf::from("."))
}

/// ~/Desktop when it exists, else the home directory.
pub fn desktop_dir() -> PathBuf {
    let home = home_dir();
    let desktop = home.join("Desktop");
    if desktop.is_dir() {
        desktop
    } else {
        home
    }
}
