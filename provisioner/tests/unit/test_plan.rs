//! Install plan loading and ordering tests

use rmprov::errors::ProvisionError;
use rmprov::filesys::file::File;
use rmprov::install::plan::InstallPlan;

const PLAN_JSON: &str = r#"{
    "webserver": {
        "order": 2,
        "local_path": "webserver/server.py",
        "remote_path": "/home/root/remarkable_scripts/webserver/server.py",
        "execute": false,
        "description": "Status web service"
    },
    "setup": {
        "order": 1,
        "local_path": "setup_directories.py",
        "remote_path": "/home/root/remarkable_scripts/setup_directories.py",
        "execute": true
    },
    "utils": {
        "order": 2,
        "local_path": "utils/helpers.py",
        "remote_path": "/home/root/remarkable_scripts/utils/helpers.py",
        "execute": false
    }
}"#;

fn names(plan: &InstallPlan) -> Vec<&str> {
    plan.ordered().into_iter().map(|s| s.name.as_str()).collect()
}

#[tokio::test]
async fn test_load_plan_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("remarkable_scripts_config.json"));
    file.write_string(PLAN_JSON).await.unwrap();

    let plan = InstallPlan::load(&file).await.unwrap();

    assert_eq!(plan.len(), 3);
    let setup = plan.get("setup").unwrap();
    assert_eq!(setup.name, "setup");
    assert!(setup.execute);
    assert!(setup.description.is_empty());
    assert_eq!(plan.get("webserver").unwrap().description, "Status web service");
}

#[test]
fn test_ordered_breaks_ties_by_name() {
    let plan = InstallPlan::from_json_str(PLAN_JSON).unwrap();
    assert_eq!(names(&plan), vec!["setup", "utils", "webserver"]);
}

#[test]
fn test_ordered_handles_gaps_and_negative_ranks() {
    let plan = InstallPlan::from_json_str(
        r#"{
            "late": {"order": 100, "local_path": "l.py", "remote_path": "/r/l.py", "execute": false},
            "early": {"order": -5, "local_path": "e.py", "remote_path": "/r/e.py", "execute": false},
            "mid": {"order": 7, "local_path": "m.py", "remote_path": "/r/m.py", "execute": true}
        }"#,
    )
    .unwrap();

    assert_eq!(names(&plan), vec!["early", "mid", "late"]);
    assert_eq!(plan.work_units(), 4);
}

#[test]
fn test_empty_plan() {
    let plan = InstallPlan::from_json_str("{}").unwrap();
    assert!(plan.is_empty());
    assert!(plan.ordered().is_empty());
    assert_eq!(plan.work_units(), 0);
}

#[test]
fn test_missing_plan_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("absent.json"));

    let err = tokio_test::block_on(InstallPlan::load(&file)).unwrap_err();

    assert!(matches!(err, ProvisionError::ConfigError(_)));
    assert!(err.to_string().contains("absent.json"));
}

#[tokio::test]
async fn test_malformed_plan_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("plan.json"));
    file.write_string("{ \"a\": { \"order\": 1, ").await.unwrap();

    let err = InstallPlan::load(&file).await.unwrap_err();
    assert!(matches!(err, ProvisionError::ConfigError(_)));
}

#[test]
fn test_invalid_descriptors_rejected() {
    // missing field
    let err = InstallPlan::from_json_str(
        r#"{"a": {"order": 1, "local_path": "a.py", "execute": true}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, ProvisionError::ConfigError(_)));

    // relative remote path
    let err = InstallPlan::from_json_str(
        r#"{"a": {"order": 1, "local_path": "a.py", "remote_path": "a.py", "execute": true}}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("must be absolute"));

    // empty local path
    let err = InstallPlan::from_json_str(
        r#"{"a": {"order": 1, "local_path": " ", "remote_path": "/r/a.py", "execute": true}}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("empty local_path"));
}

#[tokio::test]
async fn test_load_or_empty_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("plan.json"));
    file.write_string("not json").await.unwrap();

    let (plan, err) = InstallPlan::load_or_empty(&file).await;

    assert!(plan.is_empty());
    assert!(matches!(err, Some(ProvisionError::ConfigError(_))));
}

#[tokio::test]
async fn test_save_writes_indented_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("plan.json"));
    let plan = InstallPlan::from_json_str(PLAN_JSON).unwrap();

    plan.save(&file).await.unwrap();

    let text = file.read_string().await.unwrap();
    assert!(text.contains("\n    \"setup\": {\n        \"order\": 1,"));
    // names come from keys and are not written back
    assert!(!text.contains("\"name\""));
    assert_eq!(text.matches("\"description\"").count(), 1);
    assert_eq!(InstallPlan::load(&file).await.unwrap(), plan);
}
