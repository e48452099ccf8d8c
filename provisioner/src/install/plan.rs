//! Install plan: the scripts to put on the device and the order to do it in

use std::collections::BTreeMap;
use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::ProvisionError;
use crate::filesys::file::File;

/// One script of the install plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    /// Plan key; filled in from the JSON object key
    #[serde(skip)]
    pub name: String,

    /// Rank in the install sequence, lowest first
    pub order: i64,

    /// Source file, relative to the local script directory
    pub local_path: String,

    /// Absolute destination on the device
    pub remote_path: String,

    /// Run the script on the device after the transfer
    pub execute: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Scripts keyed by unique name.
///
/// Stored as a `BTreeMap` so iteration, and therefore tie-breaking between
/// equal `order` values, is by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallPlan {
    scripts: BTreeMap<String, ScriptDescriptor>,
}

impl InstallPlan {
    /// Parse a plan from its JSON object form
    pub fn from_json_str(contents: &str) -> Result<Self, ProvisionError> {
        let mut plan: InstallPlan = serde_json::from_str(contents)
            .map_err(|e| ProvisionError::ConfigError(format!("invalid install plan JSON: {e}")))?;
        for (name, script) in plan.scripts.iter_mut() {
            script.name = name.clone();
        }
        plan.validate()?;
        Ok(plan)
    }

    /// Load the plan file. A missing or malformed file is a configuration error.
    pub async fn load(file: &File) -> Result<Self, ProvisionError> {
        let contents = match file.read_string().await {
            Ok(contents) => contents,
            Err(ProvisionError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(ProvisionError::ConfigError(format!(
                    "install plan not found: {}",
                    file.path().display()
                )));
            }
            Err(e) => {
                return Err(ProvisionError::ConfigError(format!(
                    "cannot read install plan {}: {e}",
                    file.path().display()
                )));
            }
        };

        let plan = Self::from_json_str(&contents).map_err(|e| match e {
            ProvisionError::ConfigError(msg) => {
                ProvisionError::ConfigError(format!("{} ({})", msg, file.path().display()))
            }
            other => other,
        })?;
        info!(
            "Loaded install plan with {} scripts from {}",
            plan.len(),
            file.path().display()
        );
        Ok(plan)
    }

    /// Load the plan file, falling back to an empty plan on any error.
    ///
    /// The error is logged and handed back so the caller can show it.
    pub async fn load_or_empty(file: &File) -> (Self, Option<ProvisionError>) {
        match Self::load(file).await {
            Ok(plan) => (plan, None),
            Err(e) => {
                error!("{}", e);
                (Self::default(), Some(e))
            }
        }
    }

    /// Write the plan back to `file` as indented JSON
    pub async fn save(&self, file: &File) -> Result<(), ProvisionError> {
        file.write_json(self).await
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        for script in self.scripts.values() {
            if script.local_path.trim().is_empty() {
                return Err(ProvisionError::ConfigError(format!(
                    "script '{}' has an empty local_path",
                    script.name
                )));
            }
            if !script.remote_path.starts_with('/') {
                return Err(ProvisionError::ConfigError(format!(
                    "script '{}' remote_path must be absolute, got '{}'",
                    script.name, script.remote_path
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ScriptDescriptor> {
        self.scripts.get(name)
    }

    /// Scripts in install order: ascending `order`, ties by name
    pub fn ordered(&self) -> Vec<&ScriptDescriptor> {
        let mut scripts: Vec<&ScriptDescriptor> = self.scripts.values().collect();
        // stable sort keeps the map's name order for equal ranks
        scripts.sort_by_key(|script| script.order);
        scripts
    }

    /// Progress units of a full run: one per transfer plus one per execution
    pub fn work_units(&self) -> usize {
        self.scripts
            .values()
            .map(|script| if script.execute { 2 } else { 1 })
            .sum()
    }
}
