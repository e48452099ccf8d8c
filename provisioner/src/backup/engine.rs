//! Backup engine: mirrors the device document store into a fresh local directory

use std::path::{Component, Path, PathBuf};

use chrono::Local;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::errors::ProvisionError;
use crate::filesys::dir::Dir;
use crate::observer::RunObserver;
use crate::remote::resolver::ConnectionResolver;
use crate::remote::{shell_path, Connector, RemoteSession};
use crate::storage::settings::DEFAULT_DOCUMENTS_DIR;
use crate::utils::{backup_stamp, percent};

/// Prefix of every backup directory name
pub const BACKUP_DIR_PREFIX: &str = "remarkable_backup_";

/// Backup run options
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Remote directory to mirror
    pub source_dir: String,

    /// Local directory under which each run creates its own directory
    pub backups_root: PathBuf,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            source_dir: DEFAULT_DOCUMENTS_DIR.to_string(),
            backups_root: PathBuf::from("backups"),
        }
    }
}

/// A file that could not be copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFailure {
    pub remote_path: String,
    pub reason: String,
}

/// Outcome of a backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Directory created for this run
    pub destination: PathBuf,

    /// Files found on the device
    pub discovered: usize,

    /// Files copied successfully
    pub copied: usize,

    pub failures: Vec<BackupFailure>,
}

impl BackupReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Copies every file under the source directory, best effort
pub struct BackupEngine {
    options: BackupOptions,
}

impl BackupEngine {
    pub fn new(options: BackupOptions) -> Self {
        Self { options }
    }

    /// Run one backup.
    ///
    /// Connection and listing failures end the run; a file that fails to copy
    /// is logged and recorded, and the run moves on to the next one. The
    /// session is closed before this returns.
    pub async fn run<C: Connector>(
        &self,
        resolver: &ConnectionResolver<C>,
        observer: &dyn RunObserver,
    ) -> Result<BackupReport, ProvisionError> {
        observer.on_progress(0.0);
        observer.on_status("Connecting to reMarkable...");

        let session = match resolver.resolve().await {
            Ok(session) => session,
            Err(e) => {
                error!("Backup failed ({}): {}", e.kind(), e);
                observer.on_status(&format!("Backup failed: {}", e));
                return Err(e);
            }
        };

        let result = self.copy_all(session.as_ref(), observer).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close session: {}", e);
        }

        match &result {
            Ok(report) => {
                observer.on_progress(100.0);
                observer.on_status(&format!(
                    "Backup completed: {} of {} files copied to {}",
                    report.copied,
                    report.discovered,
                    report.destination.display()
                ));
                info!(
                    "Backup completed at {} ({} copied, {} failed)",
                    report.destination.display(),
                    report.copied,
                    report.failed()
                );
            }
            Err(e) => {
                error!("Backup failed ({}): {}", e.kind(), e);
                observer.on_status(&format!("Backup failed: {}", e));
            }
        }
        result
    }

    async fn copy_all(
        &self,
        session: &dyn RemoteSession,
        observer: &dyn RunObserver,
    ) -> Result<BackupReport, ProvisionError> {
        let source_root = self.resolve_source_root(session).await?;
        let files = self.list_remote_files(session, &source_root).await?;
        let total = files.len();
        info!("Found {} files to back up in {}", total, source_root);

        let destination = Dir::create_fresh(
            &self.options.backups_root,
            &format!("{}{}", BACKUP_DIR_PREFIX, backup_stamp(Local::now())),
        )
        .await?;
        info!("Backing up to {}", destination.path().display());

        let mut report = BackupReport {
            destination: destination.path().to_path_buf(),
            discovered: total,
            copied: 0,
            failures: Vec::new(),
        };

        for (idx, remote_file) in files.iter().enumerate() {
            observer.on_status(&format!(
                "Copying file {}/{}: {}",
                idx + 1,
                total,
                remote_file.rsplit('/').next().unwrap_or(remote_file)
            ));

            match self
                .copy_one(session, &source_root, remote_file, destination.path())
                .await
            {
                Ok(bytes) => {
                    debug!("Copied {} ({} bytes)", remote_file, bytes);
                    report.copied += 1;
                }
                Err(e) => {
                    error!("Error copying {}: {}", remote_file, e);
                    report.failures.push(BackupFailure {
                        remote_path: remote_file.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            observer.on_progress(percent(idx + 1, total));
        }

        Ok(report)
    }

    /// Absolute path of the source directory as the device sees it, so a
    /// `~` or a symlink in the configured path matches what `find` prints
    async fn resolve_source_root(
        &self,
        session: &dyn RemoteSession,
    ) -> Result<String, ProvisionError> {
        let command = format!("cd {} && pwd -P", shell_path(&self.options.source_dir));
        let output = session.exec(&command).await?;
        let root = output.stdout.trim();
        if !output.success() || !root.starts_with('/') {
            return Err(ProvisionError::RemoteExecutionError {
                command,
                reason: format!("exit code {}: {}", output.exit_status, output.stderr.trim()),
            });
        }
        Ok(root.to_string())
    }

    /// Regular files under `root`.
    ///
    /// `find` exits non-zero when an entry vanishes or is unreadable during
    /// the walk; whatever it did list is still backed up. Only a failed walk
    /// that listed nothing ends the run.
    async fn list_remote_files(
        &self,
        session: &dyn RemoteSession,
        root: &str,
    ) -> Result<Vec<String>, ProvisionError> {
        let command = format!("find {} -type f", shell_path(root));
        let output = session.exec(&command).await?;

        let files: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if !output.success() {
            if files.is_empty() {
                return Err(ProvisionError::RemoteExecutionError {
                    command,
                    reason: format!("exit code {}: {}", output.exit_status, output.stderr.trim()),
                });
            }
            warn!(
                "Listing of {} incomplete (exit code {}): {}",
                root,
                output.exit_status,
                output.stderr.trim()
            );
        }
        Ok(files)
    }

    async fn copy_one(
        &self,
        session: &dyn RemoteSession,
        source_root: &str,
        remote_file: &str,
        destination: &Path,
    ) -> Result<u64, ProvisionError> {
        let relative = relative_to_source(source_root, remote_file)?;
        let local_path = destination.join(relative);

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        session.get_file(remote_file, &local_path).await
    }
}

/// Path of `remote_file` relative to `source_dir`.
///
/// Rejects files outside the source and paths that would climb out of the
/// local destination.
pub fn relative_to_source(source_dir: &str, remote_file: &str) -> Result<PathBuf, ProvisionError> {
    let root = source_dir.trim_end_matches('/');
    let rest = remote_file
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| ProvisionError::TransferError {
            path: remote_file.to_string(),
            reason: format!("not under {}", source_dir),
        })?;

    let relative = PathBuf::from(rest);
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(ProvisionError::TransferError {
            path: remote_file.to_string(),
            reason: "unsafe relative path".to_string(),
        });
    }
    Ok(relative)
}
