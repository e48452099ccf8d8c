//! On-device directory bootstrap for the scripts base directory

use tracing::{debug, info};

use crate::errors::ProvisionError;
use crate::filesys::dir::Dir;

/// Default base directory on the device
pub const DEFAULT_BASE_DIR: &str = "/home/root/remarkable_scripts";

/// Subdirectories created under the base directory
pub const SUBDIRECTORIES: [&str; 3] = ["webserver", "utils", "logs"];

/// Subdirectories that are Python packages
const PACKAGES: [&str; 2] = ["webserver", "utils"];

/// Python requirements of the on-device scripts
pub const REQUIREMENTS: [&str; 4] = ["fastapi", "uvicorn", "requests", "paramiko"];

/// Create the base directory layout.
///
/// Existing directories are left untouched; package markers are only added
/// to directories created by this call. `requirements.txt` is always rewritten.
pub async fn setup_directory_structure(base: &Dir) -> Result<(), ProvisionError> {
    base.create().await?;

    for name in SUBDIRECTORIES {
        let dir = base.subdir(name);
        if dir.exists().await {
            debug!("{} already exists", dir.path().display());
            continue;
        }

        dir.create().await?;
        if PACKAGES.contains(&name) {
            dir.file("__init__.py").touch().await?;
        }
        info!("Created {}", dir.path().display());
    }

    base.file("requirements.txt")
        .write_string(&REQUIREMENTS.join("\n"))
        .await?;
    Ok(())
}
