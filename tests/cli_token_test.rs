//! Integration tests for `ksr token` against a mocked identity API.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::TestEnv;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};

fn token_args(server: &MockServer) -> Vec<String> {
    [
        "token",
        "--host",
        "127.0.0.1",
        "--port",
        &server.port().to_string(),
        "--user",
        "admin",
        "--password",
        "crowbar",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn token_cmd(env: &TestEnv, server: &MockServer) -> assert_cmd::Command {
    let mut cmd = env.ksr();
    cmd.args(token_args(server))
        .args(["--retry-delay", "0", "--timeout", "5"]);
    cmd
}

fn wait_for_hits(hits: impl Fn() -> usize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while hits() < expected {
        assert!(Instant::now() < deadline, "timed out waiting for request");
        thread::sleep(Duration::from_millis(10));
    }
}

// ==================== Token Issue Tests ====================

#[test]
fn test_token_obtained() {
    let env = TestEnv::new();
    let server = MockServer::start();
    let issue = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/auth/tokens")
            .header("content-type", "application/json")
            .json_body(json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": {
                            "user": {
                                "name": "admin",
                                "password": "crowbar",
                                "domain": { "name": "Default" }
                            }
                        }
                    },
                    "scope": {
                        "project": {
                            "name": "admin",
                            "domain": { "name": "Default" }
                        }
                    }
                }
            }));
        then.status(201).header("X-Subject-Token", "tok-123");
    });

    let output = token_cmd(&env, &server)
        .args(["--project", "admin"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["state"], "authenticated");
    assert_eq!(result["token"], "tok-123");
    assert_eq!(issue.hits(), 1);
}

#[test]
fn test_token_revoke() {
    let env = TestEnv::new();
    let server = MockServer::start();
    let issue = server.mock(|when, then| {
        when.method(POST).path("/v3/auth/tokens");
        then.status(201).header("X-Subject-Token", "tok-123");
    });
    let revoke = server.mock(|when, then| {
        when.method(DELETE)
            .path("/v3/auth/tokens")
            .header("X-Subject-Token", "tok-123")
            .header("X-Auth-Token", "tok-123");
        then.status(204);
    });

    let output = token_cmd(&env, &server).arg("--revoke").output().unwrap();
    assert!(output.status.success());

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["state"], "revoked");
    assert_eq!(result["revoke_status"], 204);
    assert_eq!(issue.hits(), 1);
    assert_eq!(revoke.hits(), 1);
}

// ==================== Retry Tests ====================

#[test]
fn test_token_retries_server_errors() {
    let env = TestEnv::new();
    let server = MockServer::start();
    let mut unavailable = server.mock(|when, then| {
        when.method(POST).path("/v3/auth/tokens");
        then.status(503);
    });

    let mut args = token_args(&server);
    args.extend(["--retry-delay", "1", "--timeout", "5", "--verbose"].map(String::from));
    let child = env.ksr_process().args(&args).spawn().unwrap();

    wait_for_hits(|| unavailable.hits(), 1);
    unavailable.delete();
    let issue = server.mock(|when, then| {
        when.method(POST).path("/v3/auth/tokens");
        then.status(201).header("X-Subject-Token", "tok-456");
    });

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Retrying request POST /v3/auth/tokens : 1"));

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["token"], "tok-456");
    assert_eq!(issue.hits(), 1);
}

#[test]
fn test_token_server_errors_exhaust_attempts() {
    let env = TestEnv::new();
    let server = MockServer::start();
    let unavailable = server.mock(|when, then| {
        when.method(POST).path("/v3/auth/tokens");
        then.status(500);
    });

    token_cmd(&env, &server)
        .args(["--retry-attempts", "3", "--verbose"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Retrying request POST /v3/auth/tokens : 2"))
        .stderr(predicate::str::contains("Response Code: 500"));

    assert_eq!(unavailable.hits(), 3);
}

#[test]
fn test_token_client_error_not_retried() {
    let env = TestEnv::new();
    let server = MockServer::start();
    let missing = server.mock(|when, then| {
        when.method(POST).path("/v3/auth/tokens");
        then.status(404);
    });

    token_cmd(&env, &server)
        .args(["--retry-attempts", "5"])
        .assert()
        .failure();

    assert_eq!(missing.hits(), 1);
}

// ==================== Failure Tests ====================

#[test]
fn test_token_rejected_credentials() {
    let env = TestEnv::new();
    let server = MockServer::start();
    let rejected = server.mock(|when, then| {
        when.method(POST).path("/v3/auth/tokens");
        then.status(401);
    });

    token_cmd(&env, &server)
        .args(["--project", "admin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Failed to get token for User 'admin' Project 'admin'",
        ))
        .stderr(predicate::str::contains("Response Code: 401"))
        .stderr(predicate::str::contains("Response Message: Unauthorized"))
        .stderr(predicate::str::contains("not authenticated"));

    assert_eq!(rejected.hits(), 1);
}

#[test]
fn test_token_rejects_zero_timeout() {
    let env = TestEnv::new();
    let server = MockServer::start();
    let issue = server.mock(|when, then| {
        when.method(POST).path("/v3/auth/tokens");
        then.status(201).header("X-Subject-Token", "tok-123");
    });

    env.ksr()
        .args(token_args(&server))
        .args(["--timeout", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout-secs must be at least 1"));

    assert_eq!(issue.hits(), 0);
}

#[test]
fn test_token_connection_refused() {
    let env = TestEnv::new();

    env.ksr()
        .args([
            "-H",
            "token",
            "--host",
            "127.0.0.1",
            "--port",
            "9",
            "--user",
            "admin",
            "--password",
            "x",
            "--timeout",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Transport error"))
        .stderr(predicate::str::contains("Error:"));
}
