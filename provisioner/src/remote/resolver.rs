//! Connection resolution over the wireless and wired paths

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::errors::ProvisionError;
use crate::remote::{Connector, Credentials, Endpoint, RemoteSession};
use crate::storage::settings::{EndpointPreference, Settings};

/// Where and how to reach the device.
///
/// Built once from settings; endpoints are kept in the order they are tried.
#[derive(Debug)]
pub struct ConnectionTarget {
    pub endpoints: Vec<Endpoint>,
    pub credentials: Credentials,

    /// Timeout of the first attempt. Later attempts use the transport default.
    pub primary_timeout: Duration,
}

impl ConnectionTarget {
    /// Build the target from settings, ordering endpoints by the configured
    /// preference. Empty addresses are skipped.
    pub fn from_settings(settings: &Settings) -> Self {
        let port = settings.remarkable_ssh_port;
        let wifi = Endpoint::new("wifi", settings.remarkable_wifi_ip.trim(), port);
        let usb = Endpoint::new("usb", settings.remarkable_ip.trim(), port);

        let ordered = match settings.remarkable_endpoint_preference {
            EndpointPreference::WifiFirst => [wifi, usb],
            EndpointPreference::UsbFirst => [usb, wifi],
        };

        Self {
            endpoints: ordered
                .into_iter()
                .filter(|e| !e.address.is_empty())
                .collect(),
            credentials: Credentials {
                username: settings.remarkable_user.clone(),
                password: SecretString::from(
                    settings.remarkable_password.expose_secret().to_string(),
                ),
            },
            primary_timeout: Duration::from_secs(settings.remarkable_connect_timeout_secs),
        }
    }
}

/// Opens one session by trying each endpoint in order
pub struct ConnectionResolver<C: Connector> {
    connector: C,
    target: ConnectionTarget,
}

impl<C: Connector> ConnectionResolver<C> {
    pub fn new(connector: C, target: ConnectionTarget) -> Self {
        Self { connector, target }
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Return the first session that connects and authenticates.
    ///
    /// Fails with [`ProvisionError::ConnectionError`] carrying the last cause
    /// when every endpoint fails.
    pub async fn resolve(&self) -> Result<Box<dyn RemoteSession>, ProvisionError> {
        if self.target.endpoints.is_empty() {
            return Err(ProvisionError::ConfigError(
                "no device endpoint configured".to_string(),
            ));
        }

        let mut last_error = None;
        for (idx, endpoint) in self.target.endpoints.iter().enumerate() {
            let timeout = (idx == 0).then_some(self.target.primary_timeout);
            info!("Connecting to {}...", endpoint);

            match self
                .connector
                .connect(endpoint, &self.target.credentials, timeout)
                .await
            {
                Ok(session) => {
                    info!("Connected to {}", endpoint);
                    return Ok(session);
                }
                Err(e) => {
                    warn!("Connection via {} failed: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        let cause = last_error.unwrap_or_else(|| {
            ProvisionError::Internal("no connection attempt was made".to_string())
        });
        Err(ProvisionError::ConnectionError {
            endpoints: self.target.endpoints.iter().map(|e| e.to_string()).collect(),
            cause: Box::new(cause),
        })
    }
}
