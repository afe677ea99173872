//! Common test utilities for ksr integration tests.
//!
//! Provides `TestEnv` for isolated config directories and fleet snapshots,
//! plus attribute fixtures for keystone and consumer nodes.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::Stdio;

use assert_cmd::Command;
use serde_json::{Value, json};
pub use tempfile::TempDir;

/// A test environment with an isolated config directory.
///
/// The `ksr()` method sets `KSR_CONFIG_DIR` per-invocation, making tests
/// parallel-safe.
pub struct TestEnv {
    pub config_dir: TempDir,
    pub work_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            config_dir: TempDir::new().unwrap(),
            work_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the ksr binary with isolated config.
    pub fn ksr(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ksr"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("KSR_CONFIG_DIR", self.config_dir.path());
        cmd.env_remove("RUST_LOG");
        cmd.env_remove("KSR_PASSWORD");
        cmd
    }

    /// Like `ksr()`, but a plain `std::process::Command` with piped output,
    /// for tests that act on a server while the command is still running.
    pub fn ksr_process(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_ksr"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("KSR_CONFIG_DIR", self.config_dir.path());
        cmd.env_remove("RUST_LOG");
        cmd.env_remove("KSR_PASSWORD");
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("config.kdl")
    }

    pub fn write_config(&self, content: &str) {
        std::fs::write(self.config_path(), content).unwrap();
    }

    /// Write a fleet snapshot into the work dir and return its path.
    pub fn write_fleet(&self, file_name: &str, content: &str) -> PathBuf {
        let path = self.work_dir.path().join(file_name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// The standard fleet: one keystone node and one glance consumer.
    pub fn standard_fleet(&self) -> PathBuf {
        let snapshot = json!({
            "nodes": [
                { "name": "ks1", "attributes": keystone_attrs("ks1", "10.0.0.5") },
                { "name": "glance1", "attributes": consumer_attrs("glance1") }
            ]
        });
        self.write_fleet("fleet.json", &snapshot.to_string())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute tree for a standalone keystone node.
pub fn keystone_attrs(name: &str, admin_ip: &str) -> Value {
    json!({
        "fqdn": format!("{}.example.com", name),
        "roles": ["keystone-server"],
        "crowbar": {
            "network": {
                "admin": { "address": admin_ip },
                "public": { "address": "192.168.126.5" }
            }
        },
        "keystone": {
            "config_environment": "keystone-config-default",
            "api": {
                "protocol": "http",
                "version": "3",
                "service_port": 5000,
                "admin_port": 35357,
                "region": "RegionOne"
            },
            "ha": { "enabled": false },
            "ssl": { "insecure": false },
            "service": { "token": "s3cr3t", "project": "service" },
            "admin": { "project": "admin", "username": "admin", "password": "crowbar" },
            "default": {
                "create_user": true,
                "project": "openstack",
                "username": "crowbar",
                "password": "crowbar"
            },
            "federation": {
                "openidc": { "enabled": false },
                "trusted_dashboards": [],
                "websso_keystone_url": ""
            },
            "osprofiler": { "enabled": true, "hmac_keys": ["SECRET_KEY"] }
        }
    })
}

/// Attribute tree for a glance consumer node.
pub fn consumer_attrs(name: &str) -> Value {
    json!({
        "fqdn": format!("{}.example.com", name),
        "roles": ["glance-server"],
        "crowbar": { "network": { "admin": { "address": "10.0.0.20" } } },
        "glance": {
            "keystone_instance": "default",
            "service_user": "glance",
            "service_password": "glance-pw"
        }
    })
}
