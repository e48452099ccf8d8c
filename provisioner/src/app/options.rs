//! Per-component options derived from settings

use std::path::PathBuf;
use std::time::Duration;

use crate::backup::engine::BackupOptions;
use crate::install::orchestrator::InstallOptions;
use crate::logs::LogOptions;
use crate::remote::resolver::ConnectionTarget;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Device endpoints and credentials
    pub connection: ConnectionTarget,

    /// Install plan JSON file
    pub plan_file: PathBuf,

    /// Install orchestrator options
    pub install: InstallOptions,

    /// Backup engine options
    pub backup: BackupOptions,

    /// Logging options
    pub logging: LogOptions,
}

impl AppOptions {
    /// Build every component's options from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            connection: ConnectionTarget::from_settings(settings),
            plan_file: settings.plan_file(),
            install: InstallOptions {
                script_dir: settings.local_script_dir(),
                remote_base_dir: settings.remote_base_dir(),
                interpreter: settings.remote_interpreter.clone(),
                script_timeout: settings.script_timeout_secs.map(Duration::from_secs),
            },
            backup: BackupOptions {
                source_dir: settings.remarkable_documents_dir.clone(),
                backups_root: settings.backups_dir(),
            },
            logging: LogOptions {
                log_level: settings.log_level.clone(),
                log_dir: settings.log_dir(),
                ..Default::default()
            },
        }
    }
}

/// Status server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}
