//! Integration tests for `ksr resolve`, `ksr settings` and `ksr profiler`.

mod common;

use common::{TestEnv, consumer_attrs, keystone_attrs};
use predicates::prelude::*;
use serde_json::{Value, json};

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ==================== Resolve Tests ====================

#[test]
fn test_resolve_json() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    let output = env
        .ksr()
        .args(["resolve", "--node", "glance1", "--generation", "g1", "--fleet"])
        .arg(&fleet)
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["node"], "ks1");
    assert_eq!(result["instance"], "default");
    assert_eq!(result["is_local"], false);
    assert_eq!(
        result["query"],
        concat!(
            "roles:keystone-server AND ",
            "keystone_config_environment:keystone-config-default AND ",
            "NOT state:crowbar_upgrade"
        )
    );
}

#[test]
fn test_resolve_logs_to_stderr() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    env.ksr()
        .args(["resolve", "-n", "glance1", "-f"])
        .arg(&fleet)
        .assert()
        .success()
        .stderr(predicate::str::contains("Keystone server found at ks1"));
}

#[test]
fn test_resolve_unknown_instance_falls_back_to_local() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    env.ksr()
        .args(["-H", "resolve", "-n", "glance1", "--instance", "cloud9", "-f"])
        .arg(&fleet)
        .assert()
        .success()
        .stdout(predicate::str::contains("served by glance1 (local)"));
}

#[test]
fn test_resolve_instance_flag_overrides_config() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();
    env.write_config("default-instance \"cloud2\"\n");

    let output = env
        .ksr()
        .args(["resolve", "-n", "glance1", "--instance", "default", "-f"])
        .arg(&fleet)
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["instance"], "default");
    assert_eq!(result["instance_source"], "cli");
    assert_eq!(result["node"], "ks1");
}

#[test]
fn test_resolve_rejects_blank_instance() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    env.ksr()
        .args(["resolve", "-n", "glance1", "--instance", " ", "-f"])
        .arg(&fleet)
        .assert()
        .failure()
        .stderr(predicate::str::contains("default-instance must not be empty"));
}

#[test]
fn test_resolve_uses_configured_default_instance() {
    let env = TestEnv::new();
    let mut other = keystone_attrs("ks2", "10.0.0.6");
    other["keystone"]["config_environment"] = json!("keystone-config-cloud2");
    let snapshot = json!({
        "nodes": [
            { "name": "ks1", "attributes": keystone_attrs("ks1", "10.0.0.5") },
            { "name": "ks2", "attributes": other },
            { "name": "glance1", "attributes": consumer_attrs("glance1") }
        ]
    });
    let fleet = env.write_fleet("fleet.json", &snapshot.to_string());
    env.write_config("default-instance \"cloud2\"\n");

    let output = env
        .ksr()
        .args(["resolve", "-n", "glance1", "-f"])
        .arg(&fleet)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["node"], "ks2");
}

#[test]
fn test_resolve_toml_fleet() {
    let env = TestEnv::new();
    let fleet = env.write_fleet(
        "fleet.toml",
        r#"
[[nodes]]
name = "ks1"

[nodes.attributes]
roles = ["keystone-server"]

[nodes.attributes.keystone]
config_environment = "keystone-config-default"

[[nodes]]
name = "glance1"

[nodes.attributes]
roles = ["glance-server"]
"#,
    );

    let output = env
        .ksr()
        .args(["resolve", "-n", "glance1", "-f"])
        .arg(&fleet)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["node"], "ks1");
}

#[test]
fn test_resolve_missing_node_errors_as_json() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    env.ksr()
        .args(["resolve", "-n", "nova9", "-f"])
        .arg(&fleet)
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""error""#))
        .stderr(predicate::str::contains("nova9"));
}

#[test]
fn test_resolve_missing_fleet_errors_human() {
    let env = TestEnv::new();

    env.ksr()
        .args(["-H", "resolve", "-n", "glance1", "-f", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

// ==================== Settings Tests ====================

#[test]
fn test_settings_for_cookbook() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    let output = env
        .ksr()
        .args(["settings", "-n", "glance1", "--cookbook", "glance", "-f"])
        .arg(&fleet)
        .output()
        .unwrap();
    assert!(output.status.success());

    let settings = stdout_json(&output);
    assert_eq!(settings["admin_auth_url"], "http://10.0.0.5:35357");
    assert_eq!(settings["internal_auth_url"], "http://10.0.0.5:5000/v3/");
    assert_eq!(settings["public_auth_url"], "http://192.168.126.5:5000/v3/");
    assert_eq!(settings["api_version_for_middleware"], "v3.0");
    assert_eq!(settings["service_user"], "glance");
    assert_eq!(settings["service_password"], "glance-pw");
    assert_eq!(settings["admin_domain"], "Default");
    assert_eq!(settings["default_user"], "crowbar");
}

#[test]
fn test_settings_without_cookbook_has_no_service_account() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    let output = env
        .ksr()
        .args(["settings", "-n", "glance1", "-f"])
        .arg(&fleet)
        .output()
        .unwrap();
    assert!(output.status.success());

    let settings = stdout_json(&output);
    assert!(settings["service_user"].is_null());
    assert_eq!(settings["instance"], "default");
}

#[test]
fn test_settings_invalid_keystone_node_errors() {
    let env = TestEnv::new();
    let mut broken = keystone_attrs("ks1", "10.0.0.5");
    broken["keystone"]["api"]
        .as_object_mut()
        .unwrap()
        .remove("service_port");
    let snapshot = json!({
        "nodes": [
            { "name": "ks1", "attributes": broken },
            { "name": "glance1", "attributes": consumer_attrs("glance1") }
        ]
    });
    let fleet = env.write_fleet("fleet.json", &snapshot.to_string());

    env.ksr()
        .args(["settings", "-n", "glance1", "-f"])
        .arg(&fleet)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ks1"));
}

// ==================== Profiler Tests ====================

#[test]
fn test_profiler_returns_osprofiler_subtree() {
    let env = TestEnv::new();
    let fleet = env.standard_fleet();

    let output = env
        .ksr()
        .args(["profiler", "-n", "glance1", "-c", "glance", "-f"])
        .arg(&fleet)
        .output()
        .unwrap();
    assert!(output.status.success());

    let result = stdout_json(&output);
    assert_eq!(result["osprofiler"]["enabled"], true);
    assert_eq!(result["osprofiler"]["hmac_keys"][0], "SECRET_KEY");
}
