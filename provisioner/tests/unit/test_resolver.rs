//! Connection resolver tests

mod common;

use std::io::Write;
use std::time::Duration;

use common::{FakeDevice, Op, USB_ADDR, WIFI_ADDR};
use rmprov::errors::ProvisionError;
use rmprov::remote::resolver::{ConnectionResolver, ConnectionTarget};
use rmprov::storage::settings::Settings;

#[tokio::test]
async fn test_primary_endpoint_used_when_reachable() {
    let device = FakeDevice::new();

    let session = common::resolver(&device).resolve().await.unwrap();

    assert_eq!(session.endpoint().label, "wifi");
    assert_eq!(
        device.ops(),
        vec![Op::Connect {
            address: WIFI_ADDR.to_string(),
            timeout: Some(Duration::from_secs(5)),
        }]
    );
}

#[tokio::test]
async fn test_fallback_after_primary_failure() {
    let device = FakeDevice::new();
    device.set_unreachable(WIFI_ADDR);

    let session = common::resolver(&device).resolve().await.unwrap();

    assert_eq!(session.endpoint().label, "usb");
    assert_eq!(session.endpoint().address, USB_ADDR);
    assert_eq!(device.open_sessions(), 1);

    // only the first attempt is bounded
    assert_eq!(
        device.ops(),
        vec![
            Op::Connect {
                address: WIFI_ADDR.to_string(),
                timeout: Some(Duration::from_secs(5)),
            },
            Op::Connect {
                address: USB_ADDR.to_string(),
                timeout: None,
            },
        ]
    );
}

#[tokio::test]
async fn test_all_endpoints_fail() {
    let device = FakeDevice::new();
    device.set_unreachable(WIFI_ADDR);
    device.set_unreachable(USB_ADDR);

    let err = match common::resolver(&device).resolve().await {
        Ok(_) => panic!("expected a connection error"),
        Err(e) => e,
    };

    match &err {
        ProvisionError::ConnectionError { endpoints, cause } => {
            assert_eq!(endpoints.len(), 2);
            // last cause is kept
            assert!(cause.to_string().contains(USB_ADDR));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), "connection");
    assert_eq!(device.open_sessions(), 0);
}

#[tokio::test]
async fn test_no_endpoints_is_config_error() {
    let device = FakeDevice::new();
    let mut target = common::target();
    target.endpoints.clear();

    let result = ConnectionResolver::new(device.connector(), target)
        .resolve()
        .await;

    assert!(matches!(result, Err(ProvisionError::ConfigError(_))));
    assert!(device.ops().is_empty());
}

fn load_settings(extra: &str) -> Settings {
    let mut file = tempfile::Builder::new().suffix(".env").tempfile().unwrap();
    write!(
        file,
        "remarkable_ip=10.11.99.1\n\
         remarkable_wifi_ip={extra}\n\
         remarkable_user=root\n\
         remarkable_password=secret\n\
         local_script_dir=/tmp/scripts\n\
         remote_base_dir=/home/root/remarkable_scripts\n\
         remarkable_backups=/tmp/backups\n\
         remarkable_endpoint_preference=usb_first\n\
         remarkable_connect_timeout_secs=3\n"
    )
    .unwrap();
    Settings::load(file.path()).unwrap()
}

#[test]
fn test_target_follows_endpoint_preference() {
    let target = ConnectionTarget::from_settings(&load_settings("192.168.1.40"));

    let labels: Vec<&str> = target.endpoints.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["usb", "wifi"]);
    assert_eq!(target.primary_timeout, Duration::from_secs(3));
    assert_eq!(target.credentials.username, "root");
}

#[test]
fn test_target_skips_empty_address() {
    let target = ConnectionTarget::from_settings(&load_settings(""));

    assert_eq!(target.endpoints.len(), 1);
    assert_eq!(target.endpoints[0].address, "10.11.99.1");
}
