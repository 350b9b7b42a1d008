//! Configuration loading and root folder resolution
//!
//! Missing or unreadable TOML files never abort startup: the loader logs a
//! warning and falls back to compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LINGO_ROOT_FOLDER";

/// Environment variable pointing at an explicit config file
pub const CONFIG_FILE_ENV: &str = "LINGO_CONFIG";

/// Cache directory name under the root folder
pub const SPEECH_CACHE_DIR: &str = "speech-cache";

/// Default synthesis request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file path
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Speech section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Synthesis endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Identity token sent as bearer auth
    #[serde(default)]
    pub id_token: Option<String>,
    /// Maximum number of cached utterances (None = unbounded)
    #[serde(default)]
    pub cache_capacity: Option<usize>,
    /// Synthesis request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            id_token: None,
            cache_capacity: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// On-disk configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl TomlConfig {
    /// Speech cache directory for a resolved root folder
    pub fn speech_cache_dir(root_folder: &Path) -> PathBuf {
        root_folder.join(SPEECH_CACHE_DIR)
    }
}

/// Load a TOML config file
///
/// Returns defaults (with a warning) if the file is missing. A file that
/// exists but fails to parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str::<TomlConfig>(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Load the config from an explicit path, `LINGO_CONFIG`, or the platform
/// default location, in that order
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        return load_toml_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return load_toml_config(Path::new(&path));
    }

    match default_config_path() {
        Some(path) => load_toml_config(&path),
        None => {
            warn!("Could not determine config directory, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Write config atomically (temp file + rename)
///
/// The file holds an identity token, so on Unix it is created with 0600.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Platform config file path: `<config dir>/lingo/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lingo").join("config.toml"))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/lingo
        dirs::data_local_dir()
            .map(|d| d.join("lingo"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/lingo"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/lingo
        dirs::data_dir()
            .map(|d| d.join("lingo"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/lingo"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\lingo
        dirs::data_local_dir()
            .map(|d| d.join("lingo"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\lingo"))
    } else {
        PathBuf::from("./lingo_data")
    }
}
