//! Configuration for VISE.
//!
//! VISE_ROOT resolution order:
//! 1. Explicit path passed to Config::with_root()
//! 2. VISE_ROOT environment variable
//! 3. Default: ~/.local/share/vise

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// VISE configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for all VISE data.
    pub vise_root: PathBuf,

    /// Calendar months ("YYYY-MM") dropped from the derived view.
    /// 2019-11 is a known bad-data window in the source exports.
    #[serde(default = "default_exclude_months")]
    pub exclude_months: Vec<String>,

    /// Remote drive connection settings.
    #[serde(default)]
    pub drive: DriveConfig,

    /// CSV column names and formats.
    #[serde(default)]
    pub columns: ColumnConfig,

    /// Machine tokens embedded in file names, with display codes.
    #[serde(default = "default_machines")]
    pub machines: Vec<MachineSpec>,
}

/// Microsoft Graph connection settings for the drive holding the exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Account whose drive holds the CSV folder.
    #[serde(default)]
    pub user: String,

    /// Folder path under the drive root.
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            user: String::new(),
            folder: default_folder(),
        }
    }
}

/// Names and formats of the columns the press exports carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// Mandatory date column.
    #[serde(default = "default_date_column")]
    pub date: String,

    /// Mandatory time column.
    #[serde(default = "default_time_column")]
    pub time: String,

    /// strptime format of the date column.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// strptime format of the time column.
    #[serde(default = "default_time_format")]
    pub time_format: String,

    /// Duration columns recorded in seconds, reported in minutes.
    #[serde(default = "default_durations")]
    pub durations: Vec<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            date: default_date_column(),
            time: default_time_column(),
            date_format: default_date_format(),
            time_format: default_time_format(),
            durations: default_durations(),
        }
    }
}

/// One machine: the token found in file names and its report display code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSpec {
    pub token: String,
    pub code: String,
}

fn default_folder() -> String {
    "Press".to_string()
}

fn default_date_column() -> String {
    "Date".to_string()
}

fn default_time_column() -> String {
    "Time".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_time_format() -> String {
    "%H:%M:%S".to_string()
}

fn default_durations() -> Vec<String> {
    vec!["Cycle Time".to_string(), "Press Time".to_string()]
}

fn default_machines() -> Vec<MachineSpec> {
    vec![
        MachineSpec {
            token: "Presse1".to_string(),
            code: "P1".to_string(),
        },
        MachineSpec {
            token: "Presse2".to_string(),
            code: "P2".to_string(),
        },
    ]
}

fn default_exclude_months() -> Vec<String> {
    vec!["2019-11".to_string()]
}

impl Config {
    /// Create a new config with the given VISE_ROOT.
    pub fn with_root(vise_root: impl Into<PathBuf>) -> Self {
        Self {
            vise_root: vise_root.into(),
            drive: DriveConfig::default(),
            columns: ColumnConfig::default(),
            machines: default_machines(),
            exclude_months: default_exclude_months(),
        }
    }

    /// Create a config using default VISE_ROOT resolution.
    pub fn default_location() -> Result<Self> {
        let vise_root = resolve_vise_root()?;
        Ok(Self::with_root(vise_root))
    }

    /// Load config from VISE_ROOT/config.toml, or create default.
    pub fn load() -> Result<Self> {
        let vise_root = resolve_vise_root()?;
        Self::load_from(&vise_root)
    }

    /// Load config from a specific VISE_ROOT.
    pub fn load_from(vise_root: &Path) -> Result<Self> {
        let config_path = vise_root.join("config.toml");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let mut config: Config = toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
            // Ensure vise_root matches the actual location
            config.vise_root = vise_root.to_path_buf();
            Ok(config)
        } else {
            Ok(Self::with_root(vise_root))
        }
    }

    /// Save config to VISE_ROOT/config.toml.
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(config_path, contents)?;
        Ok(())
    }

    // Path helpers

    /// Path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.vise_root.join("config.toml")
    }

    /// Path to the cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.vise_root.join("cache")
    }

    /// Path to the Parquet snapshot of all ingested rows.
    pub fn snapshot_path(&self) -> PathBuf {
        self.cache_dir().join("cycles.parquet")
    }

    /// Path to the per-file fingerprint index.
    pub fn index_path(&self) -> PathBuf {
        self.cache_dir().join("file_index.json")
    }

    /// Machine tokens in config order.
    pub fn machine_tokens(&self) -> Vec<String> {
        self.machines.iter().map(|m| m.token.clone()).collect()
    }
}

/// Resolve VISE_ROOT using the standard resolution order.
fn resolve_vise_root() -> Result<PathBuf> {
    // 1. Environment variable
    if let Ok(path) = std::env::var("VISE_ROOT") {
        return Ok(PathBuf::from(path));
    }

    // 2. XDG data directory (via directories crate)
    if let Some(proj_dirs) = ProjectDirs::from("", "", "vise") {
        return Ok(proj_dirs.data_dir().to_path_buf());
    }

    // 3. Fallback to ~/.local/share/vise
    let home = std::env::var("HOME")
        .map_err(|_| Error::Config("Could not determine home directory".to_string()))?;
    Ok(PathBuf::from(home).join(".local/share/vise"))
}
