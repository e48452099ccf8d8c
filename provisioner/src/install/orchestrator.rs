//! Install orchestrator: uploads the plan's scripts in order and runs them

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::errors::ProvisionError;
use crate::install::fsm::{InstallEvent, InstallFsm, InstallState};
use crate::install::plan::{InstallPlan, ScriptDescriptor};
use crate::observer::RunObserver;
use crate::remote::resolver::ConnectionResolver;
use crate::remote::{shell_path, Connector, RemoteSession};
use crate::utils::percent;

/// Install run options
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Directory that plan `local_path` values are relative to
    pub script_dir: PathBuf,

    /// Remote directory created before the first transfer
    pub remote_base_dir: String,

    /// Program that runs scripts on the device
    pub interpreter: String,

    /// Limit for one script run; `None` waits indefinitely
    pub script_timeout: Option<Duration>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from("."),
            remote_base_dir: "/home/root/remarkable_scripts".to_string(),
            interpreter: "python3".to_string(),
            script_timeout: None,
        }
    }
}

/// Outcome of a successful install run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Script names in the order they were uploaded
    pub transferred: Vec<String>,

    /// Script names in the order they were run
    pub executed: Vec<String>,
}

/// State of the current (or last) install run
#[derive(Debug, Clone)]
struct InstallRun {
    fsm: InstallFsm,
    progress: f64,
    status: String,
    done_units: usize,
    total_units: usize,
}

impl InstallRun {
    fn new(total_units: usize) -> Self {
        Self {
            fsm: InstallFsm::new(),
            progress: 0.0,
            status: "Ready to install".to_string(),
            done_units: 0,
            total_units,
        }
    }
}

/// Runs install plans against the device
pub struct Installer {
    options: InstallOptions,
    run: InstallRun,
}

impl Installer {
    pub fn new(options: InstallOptions) -> Self {
        Self {
            options,
            run: InstallRun::new(0),
        }
    }

    pub fn state(&self) -> InstallState {
        self.run.fsm.state()
    }

    pub fn progress(&self) -> f64 {
        self.run.progress
    }

    pub fn status(&self) -> &str {
        &self.run.status
    }

    /// Cause of the last failed run
    pub fn error(&self) -> Option<&str> {
        self.run.fsm.error()
    }

    /// Install `plan` on the device.
    ///
    /// Scripts are handled one at a time in plan order. The first failed
    /// transfer or script run aborts the whole run. The session is closed
    /// before this returns, whatever the outcome.
    pub async fn run<C: Connector>(
        &mut self,
        resolver: &ConnectionResolver<C>,
        plan: &InstallPlan,
        observer: &dyn RunObserver,
    ) -> Result<InstallReport, ProvisionError> {
        self.run = InstallRun::new(plan.work_units());
        self.transition(InstallEvent::Start)?;
        self.set_progress(0.0, observer);
        self.set_status("Connecting to reMarkable...".to_string(), observer);
        info!("Starting installation of {} scripts", plan.len());

        let session = match resolver.resolve().await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e, observer)),
        };

        let result = self.run_plan(session.as_ref(), plan, observer).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close session: {}", e);
        }

        match result {
            Ok(report) => {
                self.transition(InstallEvent::Finish)?;
                self.set_progress(100.0, observer);
                self.set_status("Installation completed successfully".to_string(), observer);
                info!(
                    "Installation completed: {} transferred, {} executed",
                    report.transferred.len(),
                    report.executed.len()
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(e, observer)),
        }
    }

    async fn run_plan(
        &mut self,
        session: &dyn RemoteSession,
        plan: &InstallPlan,
        observer: &dyn RunObserver,
    ) -> Result<InstallReport, ProvisionError> {
        self.transition(InstallEvent::Connected)?;
        self.ensure_base_dir(session, observer).await?;

        let mut report = InstallReport::default();
        for script in plan.ordered() {
            self.transfer(session, script, observer)
                .await
                .map_err(|e| script_error(script, e))?;
            report.transferred.push(script.name.clone());

            if script.execute {
                self.execute(session, script, observer)
                    .await
                    .map_err(|e| script_error(script, e))?;
                report.executed.push(script.name.clone());
            }
        }

        Ok(report)
    }

    async fn ensure_base_dir(
        &mut self,
        session: &dyn RemoteSession,
        observer: &dyn RunObserver,
    ) -> Result<(), ProvisionError> {
        let base = self.options.remote_base_dir.clone();
        self.set_status(format!("Preparing {}", base), observer);

        let command = format!("mkdir -p {}", shell_path(&base));
        let output = session.exec(&command).await?;
        if !output.success() {
            return Err(ProvisionError::RemoteExecutionError {
                command,
                reason: exit_reason(output.exit_status, &output.stderr),
            });
        }
        Ok(())
    }

    async fn transfer(
        &mut self,
        session: &dyn RemoteSession,
        script: &ScriptDescriptor,
        observer: &dyn RunObserver,
    ) -> Result<(), ProvisionError> {
        self.transition(InstallEvent::Transfer)?;
        let local_path = self.options.script_dir.join(&script.local_path);
        self.set_status(format!("Transferring {}", file_name(&local_path)), observer);

        let bytes = session.put_file(&local_path, &script.remote_path).await?;
        debug!(
            "Transferred {} ({} bytes) to {}",
            local_path.display(),
            bytes,
            script.remote_path
        );

        self.complete_unit(observer);
        Ok(())
    }

    async fn execute(
        &mut self,
        session: &dyn RemoteSession,
        script: &ScriptDescriptor,
        observer: &dyn RunObserver,
    ) -> Result<(), ProvisionError> {
        self.transition(InstallEvent::Execute)?;
        self.set_status(
            format!("Running {}", file_name(Path::new(&script.remote_path))),
            observer,
        );

        let command = format!("{} {}", self.options.interpreter, shell_path(&script.remote_path));
        let output = match self.options.script_timeout {
            Some(limit) => session.exec_with_timeout(&command, limit).await?,
            None => session.exec(&command).await?,
        };

        if !output.success() {
            return Err(ProvisionError::RemoteExecutionError {
                command,
                reason: exit_reason(output.exit_status, &output.stderr),
            });
        }
        debug!("{} finished: {}", command, output.stdout.trim());

        self.complete_unit(observer);
        Ok(())
    }

    fn complete_unit(&mut self, observer: &dyn RunObserver) {
        self.run.done_units += 1;
        let pct = percent(self.run.done_units, self.run.total_units);
        self.set_progress(pct, observer);
    }

    fn fail(&mut self, err: ProvisionError, observer: &dyn RunObserver) -> ProvisionError {
        error!("Installation failed ({}): {}", err.kind(), err);
        if let Err(e) = self.run.fsm.process(InstallEvent::Fail(err.to_string())) {
            warn!("{}", e);
        }
        self.set_status(format!("Installation failed: {}", err), observer);
        err
    }

    fn transition(&mut self, event: InstallEvent) -> Result<(), ProvisionError> {
        self.run.fsm.process(event).map_err(ProvisionError::StateError)
    }

    fn set_status(&mut self, message: String, observer: &dyn RunObserver) {
        observer.on_status(&message);
        self.run.status = message;
    }

    fn set_progress(&mut self, value: f64, observer: &dyn RunObserver) {
        self.run.progress = value;
        observer.on_progress(value);
    }
}

fn script_error(script: &ScriptDescriptor, cause: ProvisionError) -> ProvisionError {
    ProvisionError::ScriptError {
        script: script.name.clone(),
        cause: Box::new(cause),
    }
}

fn exit_reason(exit_status: i32, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit code {}", exit_status)
    } else {
        format!("exit code {}: {}", exit_status, stderr)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
