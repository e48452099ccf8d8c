//! FSM unit tests

use rmprov::install::fsm::{InstallEvent, InstallFsm, InstallState};

#[test]
fn test_fsm_initial_state() {
    let fsm = InstallFsm::new();
    assert_eq!(fsm.state(), InstallState::Idle);
    assert!(fsm.error().is_none());
    assert!(!fsm.state().is_terminal());
}

#[test]
fn test_fsm_install_success_flow() {
    let mut fsm = InstallFsm::new();

    // Idle -> Connecting -> Transferring
    fsm.process(InstallEvent::Start).unwrap();
    assert_eq!(fsm.state(), InstallState::Connecting);
    fsm.process(InstallEvent::Connected).unwrap();
    assert_eq!(fsm.state(), InstallState::Transferring);

    // Transfer, run, transfer the next one
    fsm.process(InstallEvent::Transfer).unwrap();
    fsm.process(InstallEvent::Execute).unwrap();
    assert_eq!(fsm.state(), InstallState::Executing);
    fsm.process(InstallEvent::Transfer).unwrap();
    assert_eq!(fsm.state(), InstallState::Transferring);

    fsm.process(InstallEvent::Finish).unwrap();
    assert_eq!(fsm.state(), InstallState::Completed);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_failure_flow() {
    let mut fsm = InstallFsm::new();

    fsm.process(InstallEvent::Start).unwrap();
    fsm.process(InstallEvent::Fail("no route to host".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), InstallState::Failed);
    assert_eq!(fsm.error(), Some("no route to host"));
}

#[test]
fn test_fsm_restart_clears_error() {
    let mut fsm = InstallFsm::new();

    fsm.process(InstallEvent::Start).unwrap();
    fsm.process(InstallEvent::Fail("error 1".to_string())).unwrap();

    // Retry
    fsm.process(InstallEvent::Start).unwrap();
    assert_eq!(fsm.state(), InstallState::Connecting);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = InstallFsm::new();

    // Cannot transfer before connecting
    assert!(fsm.process(InstallEvent::Transfer).is_err());
    assert!(fsm.process(InstallEvent::Finish).is_err());
    assert_eq!(fsm.state(), InstallState::Idle);

    // No script run while connecting, no second start
    fsm.process(InstallEvent::Start).unwrap();
    assert!(fsm.process(InstallEvent::Execute).is_err());
    assert!(fsm.process(InstallEvent::Start).is_err());

    // A finished run cannot fail afterwards
    fsm.process(InstallEvent::Connected).unwrap();
    fsm.process(InstallEvent::Finish).unwrap();
    assert!(fsm.process(InstallEvent::Fail("late".to_string())).is_err());
    assert_eq!(fsm.state(), InstallState::Completed);
}

#[test]
fn test_state_serializes_lowercase() {
    let json = serde_json::to_string(&InstallState::Transferring).unwrap();
    assert_eq!(json, "\"transferring\"");
}
