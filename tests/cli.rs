//! `vhostctl` exit codes and diagnostics.

use std::path::Path;
use std::process::{Command, Output};

mod common;

use common::ConfigDir;

fn vhostctl(args: &[&str], config: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vhostctl"))
        .args(&args[..1])
        .arg(config)
        .args(&args[1..])
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

#[test]
fn test_lookup_reports_broken_config_as_diagnostics() {
    let dir = ConfigDir::new();
    let path = dir.write("config.json", r#"{ "server": { "port": 70000 }, "logging": { "level": "loud" } }"#);

    let out = vhostctl(&["lookup", "a.example"], &path);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert!(!out.status.success());
    assert!(stderr.contains("2 problem(s) found"), "{stderr}");
    assert!(stderr.contains("  server.port: "), "{stderr}");
    assert!(stderr.contains("  logging.level: "), "{stderr}");
    assert!(!stderr.contains("Validation("), "{stderr}");
}

#[test]
fn test_lookup_prints_serving_vhost() {
    let dir = ConfigDir::new();
    let path = dir.write(
        "config.json",
        r#"{ "vhosts": [{ "name": "a.example", "docroot": "/srv/a", "default": true }] }"#,
    );

    let out = vhostctl(&["lookup", "other.example:8080"], &path);

    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "other.example:8080 -> a.example (docroot /srv/a)");
}

#[test]
fn test_check_lists_every_problem() {
    let dir = ConfigDir::new();
    let path = dir.write("config.json", r#"{ "limits": { "max_connections": -5 } }"#);

    let out = vhostctl(&["check"], &path);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert!(!out.status.success());
    assert!(stderr.contains("limits.max_connections"), "{stderr}");
}
