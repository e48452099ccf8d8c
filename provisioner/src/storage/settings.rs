//! Settings loaded from the environment and an optional `.env` file

use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File as ConfigFile, FileFormat};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::ProvisionError;
use crate::logs::LogLevel;
use crate::utils::expand_home;

/// Document store of the xochitl UI on the device
pub const DEFAULT_DOCUMENTS_DIR: &str = "/home/root/.local/share/remarkable/xochitl/";

/// Plan file name looked up in the local script directory
pub const DEFAULT_PLAN_FILE_NAME: &str = "remarkable_scripts_config.json";

/// Which network path is tried first when connecting to the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointPreference {
    /// Wireless address first, USB networking as fallback
    #[default]
    WifiFirst,
    /// USB networking first, wireless as fallback
    UsbFirst,
}

impl EndpointPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointPreference::WifiFirst => "wifi_first",
            EndpointPreference::UsbFirst => "usb_first",
        }
    }
}

impl FromStr for EndpointPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "wifi_first" | "wifi" => Ok(EndpointPreference::WifiFirst),
            "usb_first" | "usb" => Ok(EndpointPreference::UsbFirst),
            _ => Err(format!("Invalid endpoint preference: {}", s)),
        }
    }
}

impl Serialize for EndpointPreference {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EndpointPreference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Tool settings.
///
/// Keys are the lowercase `.env` names: `remarkable_ip` is the
/// USB networking address and `remarkable_wifi_ip` the wireless one.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Wired (USB networking) address
    pub remarkable_ip: String,

    /// Wireless address
    pub remarkable_wifi_ip: String,

    pub remarkable_user: String,

    #[serde(deserialize_with = "deserialize_secret")]
    pub remarkable_password: SecretString,

    /// SSH port used for both addresses unless an address carries its own
    #[serde(default = "default_ssh_port")]
    pub remarkable_ssh_port: u16,

    /// Local directory holding the scripts named in the plan
    pub local_script_dir: String,

    /// Remote directory created before installing
    pub remote_base_dir: String,

    /// Local root under which timestamped backups are created
    pub remarkable_backups: String,

    /// Install plan path, defaults to a file inside `local_script_dir`
    #[serde(default)]
    pub remarkable_script_config_json: Option<String>,

    /// Remote directory mirrored by the backup
    #[serde(default = "default_documents_dir")]
    pub remarkable_documents_dir: String,

    #[serde(default)]
    pub remarkable_endpoint_preference: EndpointPreference,

    /// Timeout of the first connection attempt
    #[serde(default = "default_connect_timeout")]
    pub remarkable_connect_timeout_secs: u64,

    /// Program used to run installed scripts on the device
    #[serde(default = "default_interpreter")]
    pub remote_interpreter: String,

    /// Limit for a single remote script run, unbounded when unset
    #[serde(default)]
    pub script_timeout_secs: Option<u64>,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for a rolling log file, terminal only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_window_size")]
    pub window_width: u32,

    #[serde(default = "default_window_size")]
    pub window_height: u32,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_ssh_port() -> u16 {
    22
}

fn default_documents_dir() -> String {
    DEFAULT_DOCUMENTS_DIR.to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_window_size() -> u32 {
    800
}

impl Settings {
    /// Load settings from `env_file` (optional) overlaid by process environment
    /// variables. Environment keys are matched case-insensitively.
    pub fn load(env_file: &Path) -> Result<Self, ProvisionError> {
        let config = Config::builder()
            .add_source(
                ConfigFile::new(&env_file.to_string_lossy(), FileFormat::Ini).required(false),
            )
            .add_source(Environment::default())
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if self.remarkable_ip.trim().is_empty() && self.remarkable_wifi_ip.trim().is_empty() {
            return Err(ProvisionError::ConfigError(
                "remarkable_ip and remarkable_wifi_ip are both empty".to_string(),
            ));
        }
        if self.remarkable_user.trim().is_empty() {
            return Err(ProvisionError::ConfigError(
                "remarkable_user is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn local_script_dir(&self) -> PathBuf {
        expand_home(&self.local_script_dir)
    }

    /// Remote base directory. `~` is left for the remote shell to expand.
    pub fn remote_base_dir(&self) -> String {
        self.remote_base_dir.clone()
    }

    pub fn backups_dir(&self) -> PathBuf {
        expand_home(&self.remarkable_backups)
    }

    pub fn plan_file(&self) -> PathBuf {
        match &self.remarkable_script_config_json {
            Some(path) => expand_home(path),
            None => self.local_script_dir().join(DEFAULT_PLAN_FILE_NAME),
        }
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().map(expand_home)
    }
}
