//! Entry points wiring settings, the connection resolver and the run engines

use tracing::{error, info};

use crate::app::options::{AppOptions, ServerOptions};
use crate::backup::engine::{BackupEngine, BackupReport};
use crate::bootstrap::setup::setup_directory_structure;
use crate::errors::ProvisionError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::install::orchestrator::{InstallReport, Installer};
use crate::install::plan::InstallPlan;
use crate::observer::RunObserver;
use crate::remote::resolver::ConnectionResolver;
use crate::remote::Connector;
use crate::server::serve::serve;

/// Load the install plan and run it on the device.
///
/// A missing or malformed plan fails the run before any connection attempt.
pub async fn install<C: Connector>(
    connector: C,
    options: AppOptions,
    observer: &dyn RunObserver,
) -> Result<InstallReport, ProvisionError> {
    let plan = match InstallPlan::load(&File::new(options.plan_file.clone())).await {
        Ok(plan) => plan,
        Err(e) => {
            error!("Not starting installation: {}", e);
            observer.on_status(&format!("Installation failed: {}", e));
            return Err(e);
        }
    };

    let resolver = ConnectionResolver::new(connector, options.connection);
    let mut installer = Installer::new(options.install);
    installer.run(&resolver, &plan, observer).await
}

/// Back up the device document store into a fresh local directory
pub async fn backup<C: Connector>(
    connector: C,
    options: AppOptions,
    observer: &dyn RunObserver,
) -> Result<BackupReport, ProvisionError> {
    let resolver = ConnectionResolver::new(connector, options.connection);
    BackupEngine::new(options.backup).run(&resolver, observer).await
}

/// Run the status service until SIGINT/SIGTERM
pub async fn serve_status(options: ServerOptions) -> Result<(), ProvisionError> {
    serve(&options, await_shutdown_signal()).await
}

/// Create the script directory layout on the device this runs on
pub async fn setup_dirs(base: Dir) -> Result<(), ProvisionError> {
    setup_directory_structure(&base).await?;
    info!("Directory structure set up at {}", base.path().display());
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
