//! Run configuration.
//!
//! Loaded once from an optional TOML file, merged with command-line
//! overrides, validated, and then passed read-only to every component.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use punt_logs::{DEFAULT_EXCEPTION_PATTERN, ExceptionScanner, LogLevel, RuleSet};

// Default configuration constants
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_ROTATE_LINES: u64 = 10_000;
pub const DEFAULT_LEVELS: &str = "VDIWEFA";
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_ADB: &str = "adb";
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 2_000;

/// Invalid configuration; the run does not start
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid `{key}` pattern: {source}")]
    InvalidPattern {
        key: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("unknown level code `{0}` in `levels` (expected some of VDIWEFA)")]
    UnknownLevel(char),

    #[error("`levels` must retain at least one level")]
    NoLevels,

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("invalid package name `{0}` (allowed: letters, digits, `.`, `_`, `:`)")]
    InvalidPackage(String),
}

/// A comma-separated string or an array of strings
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    fn into_items(self) -> Vec<String> {
        let items = match self {
            Self::One(s) => s.split(',').map(str::to_string).collect(),
            Self::Many(v) => v,
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// On-disk configuration; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    packages: Option<StringList>,
    select: Option<StringList>,
    reject: Option<StringList>,
    log_dir: Option<String>,
    rotate_lines: Option<u64>,
    levels: Option<String>,
    save: Option<bool>,
    sample_interval_secs: Option<u64>,
    exception_pattern: Option<String>,
    adb: Option<String>,
    serial: Option<String>,
    command_timeout_ms: Option<u64>,
    trace: Option<bool>,
}

/// Command-line settings that take precedence over the file
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub packages: Option<String>,
    pub no_save: bool,
    pub trace: bool,
    pub quiet: bool,
}

/// Validated run configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Watched package names (empty = track everything)
    pub packages: Vec<String>,
    pub select: Option<RuleSet>,
    pub reject: Option<RuleSet>,

    /// Levels that pass the level gate
    pub levels: HashSet<LogLevel>,

    /// Base directory for session output, home-expanded
    pub log_dir: PathBuf,

    /// Lines per output file
    pub rotate_lines: u64,

    /// Persist kept records
    pub save: bool,

    pub sample_interval: Duration,
    pub exceptions: ExceptionScanner,
    pub exception_pattern: String,

    /// Device bridge program and optional device serial
    pub adb: String,
    pub serial: Option<String>,
    pub command_timeout: Duration,

    /// Debug-level diagnostics
    pub trace: bool,

    /// One dot per kept record instead of the record; no status line
    pub quiet: bool,
}

impl Config {
    /// Load from `path`, falling back to defaults when no file exists
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Some(path) => {
                warn!(path = %path.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
            None => ConfigFile::default(),
        };
        Self::build(file, overrides)
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::build(file, overrides)
    }

    fn build(file: ConfigFile, overrides: &Overrides) -> Result<Self, ConfigError> {
        let packages = match &overrides.packages {
            Some(list) => StringList::One(list.clone()).into_items(),
            None => file.packages.map(StringList::into_items).unwrap_or_default(),
        };
        // Package names reach the device shell unquoted
        if let Some(bad) = packages.iter().find(|p| !is_package_name(p)) {
            return Err(ConfigError::InvalidPackage(bad.clone()));
        }

        let select = compile_rules("select", file.select)?;
        let reject = compile_rules("reject", file.reject)?;

        let levels = parse_levels(file.levels.as_deref().unwrap_or(DEFAULT_LEVELS))?;

        let rotate_lines = file.rotate_lines.unwrap_or(DEFAULT_ROTATE_LINES);
        if rotate_lines == 0 {
            return Err(ConfigError::Zero("rotate_lines"));
        }

        let sample_interval_secs = file
            .sample_interval_secs
            .unwrap_or(DEFAULT_SAMPLE_INTERVAL_SECS);
        if sample_interval_secs == 0 {
            return Err(ConfigError::Zero("sample_interval_secs"));
        }

        let command_timeout_ms = file
            .command_timeout_ms
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS);
        if command_timeout_ms == 0 {
            return Err(ConfigError::Zero("command_timeout_ms"));
        }

        let exception_pattern = file
            .exception_pattern
            .unwrap_or_else(|| DEFAULT_EXCEPTION_PATTERN.to_string());
        let exceptions = ExceptionScanner::new(&exception_pattern).map_err(|source| {
            ConfigError::InvalidPattern {
                key: "exception_pattern",
                source,
            }
        })?;

        Ok(Self {
            packages,
            select,
            reject,
            levels,
            log_dir: expand_home(file.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR)),
            rotate_lines,
            save: file.save.unwrap_or(true) && !overrides.no_save,
            sample_interval: Duration::from_secs(sample_interval_secs),
            exceptions,
            exception_pattern,
            adb: file.adb.unwrap_or_else(|| DEFAULT_ADB.to_string()),
            serial: file.serial,
            command_timeout: Duration::from_millis(command_timeout_ms),
            trace: file.trace.unwrap_or(false) || overrides.trace,
            quiet: overrides.quiet,
        })
    }

    /// Serializable view of the effective settings
    pub fn summary(&self) -> ConfigSummary {
        let mut levels: Vec<LogLevel> = self.levels.iter().copied().collect();
        levels.sort();
        ConfigSummary {
            packages: self.packages.clone(),
            select: self.select.as_ref().map(RuleSet::patterns),
            reject: self.reject.as_ref().map(RuleSet::patterns),
            levels: levels.iter().map(LogLevel::code).collect(),
            log_dir: self.log_dir.clone(),
            rotate_lines: self.rotate_lines,
            save: self.save,
            sample_interval_secs: self.sample_interval.as_secs(),
            exception_pattern: self.exception_pattern.clone(),
        }
    }
}

/// Effective configuration as recorded in the session summary
#[derive(Clone, Debug, Serialize)]
pub struct ConfigSummary {
    pub packages: Vec<String>,
    pub select: Option<Vec<String>>,
    pub reject: Option<Vec<String>>,
    pub levels: String,
    pub log_dir: PathBuf,
    pub rotate_lines: u64,
    pub save: bool,
    pub sample_interval_secs: u64,
    pub exception_pattern: String,
}

fn compile_rules(
    key: &'static str,
    list: Option<StringList>,
) -> Result<Option<RuleSet>, ConfigError> {
    let Some(list) = list else {
        return Ok(None);
    };
    RuleSet::compile(list.into_items())
        .map_err(|source| ConfigError::InvalidPattern { key, source })
}

fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':'))
}

fn parse_levels(codes: &str) -> Result<HashSet<LogLevel>, ConfigError> {
    let levels = codes
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| LogLevel::from_code(c.to_ascii_uppercase()).ok_or(ConfigError::UnknownLevel(c)))
        .collect::<Result<HashSet<_>, _>>()?;

    if levels.is_empty() {
        return Err(ConfigError::NoLevels);
    }
    Ok(levels)
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config, ConfigError> {
        Config::from_toml_str(content, &Overrides::default())
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert!(config.packages.is_empty());
        assert!(config.select.is_none());
        assert!(config.reject.is_none());
        assert_eq!(config.levels.len(), LogLevel::ALL.len());
        assert_eq!(config.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(config.rotate_lines, DEFAULT_ROTATE_LINES);
        assert!(config.save);
        assert_eq!(config.sample_interval, Duration::from_secs(5));
        assert_eq!(config.adb, "adb");
    }

    #[test]
    fn test_comma_separated_and_array_lists() {
        let config = parse(
            r#"
            packages = "com.example.app, com.example.service"
            select = ["error", "crash"]
            reject = "chatty"
            "#,
        )
        .unwrap();
        assert_eq!(config.packages, vec!["com.example.app", "com.example.service"]);
        assert_eq!(config.select.unwrap().patterns(), vec!["error", "crash"]);
        assert_eq!(config.reject.unwrap().patterns(), vec!["chatty"]);
    }

    #[test]
    fn test_wildcard_rules() {
        let config = parse("select = \"*\"\nreject = \"*\"").unwrap();
        assert!(config.select.unwrap().is_wildcard());
        assert!(config.reject.unwrap().is_wildcard());
    }

    #[test]
    fn test_levels() {
        let config = parse("levels = \"EF\"").unwrap();
        assert_eq!(
            config.levels,
            HashSet::from([LogLevel::Error, LogLevel::Fatal])
        );
        assert!(matches!(
            parse("levels = \"EQ\""),
            Err(ConfigError::UnknownLevel('Q'))
        ));
        assert!(matches!(parse("levels = \"\""), Err(ConfigError::NoLevels)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            parse("select = \"(unclosed\""),
            Err(ConfigError::InvalidPattern { key: "select", .. })
        ));
        assert!(matches!(parse("rotate_lines = 0"), Err(ConfigError::Zero(_))));
        assert!(matches!(
            parse("command_timeout_ms = 0"),
            Err(ConfigError::Zero("command_timeout_ms"))
        ));
        assert!(matches!(parse("colour = true"), Err(ConfigError::Parse { .. })));
        assert!(matches!(parse("packages = 3"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_package_names_are_checked() {
        let config = parse("packages = \"com.example.app, com.example:remote, my_app2\"").unwrap();
        assert_eq!(config.packages.len(), 3);

        for bad in ["com.example; reboot", "$(id)", "com example"] {
            let toml = format!("packages = [{:?}]", bad);
            assert!(
                matches!(parse(&toml), Err(ConfigError::InvalidPackage(ref name)) if name == bad),
                "{} was accepted",
                bad
            );
        }

        let overrides = Overrides {
            packages: Some("com.ok,`rm`".to_string()),
            ..Overrides::default()
        };
        assert!(matches!(
            Config::from_toml_str("", &overrides),
            Err(ConfigError::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let overrides = Overrides {
            packages: Some("com.cli".to_string()),
            no_save: true,
            trace: true,
            quiet: true,
        };
        let config = Config::from_toml_str("packages = \"com.file\"", &overrides).unwrap();
        assert_eq!(config.packages, vec!["com.cli"]);
        assert!(!config.save);
        assert!(config.trace);
        assert!(config.quiet);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&tmp.path().join("absent.toml")), &Overrides::default())
            .unwrap();
        assert_eq!(config.rotate_lines, DEFAULT_ROTATE_LINES);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("punt.toml");
        fs::write(&path, "rotate_lines = 2\nsave = false\n").unwrap();
        let config = Config::load(Some(&path), &Overrides::default()).unwrap();
        assert_eq!(config.rotate_lines, 2);
        assert!(!config.save);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("logs"), PathBuf::from("logs"));
        assert_eq!(expand_home("~user/logs"), PathBuf::from("~user/logs"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/punt"), home.join("punt"));
            assert_eq!(expand_home("~"), home);
        }
    }

    #[test]
    fn test_summary_serializes() {
        let config = parse("levels = \"WE\"\nselect = \"boom\"").unwrap();
        let json = serde_json::to_string(&config.summary()).unwrap();
        assert!(json.contains("\"levels\":\"WE\""));
        assert!(json.contains("boom"));
    }
}
