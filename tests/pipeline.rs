//! End-to-end resolution tests: documents on disk to validated snapshots.

use vhost_config::config::model::LookupError;
use vhost_config::config::{load_config_with, ConfigError, Origin, ViolationKind};

mod common;

use common::{env, ConfigDir};

#[test]
fn test_minimal_document_has_no_default_vhost() {
    let dir = ConfigDir::new();
    let path = dir.write("config.json", "{}");

    let config = load_config_with(&path, &env(&[])).unwrap();

    assert!(config.virtual_hosts().is_empty());
    assert_eq!(
        config.lookup_virtual_host("anything.example"),
        Err(LookupError::NotFound {
            host: "anything.example".into()
        })
    );
}

#[test]
fn test_vhosts_inherit_unset_limits() {
    let dir = ConfigDir::new();
    let path = dir.write(
        "config.json",
        r#"{
            "limits": { "requests_per_second": 100 },
            "vhosts": [
                { "name": "a.example" },
                { "name": "b.example", "limits": { "requests_per_second": 50 } }
            ]
        }"#,
    );

    let config = load_config_with(&path, &env(&[])).unwrap();
    let a = config.lookup_virtual_host("a.example").unwrap();
    let b = config.lookup_virtual_host("b.example").unwrap();

    assert_eq!(a.limits.requests_per_second, 100);
    assert_eq!(b.limits.requests_per_second, 50);
    assert_eq!(a.origin_of("limits.requests_per_second"), Some(Origin::Global));
}

#[test]
fn test_quantities_in_documents() {
    let dir = ConfigDir::new();
    let path = dir.write(
        "config.json",
        r#"{
            "limits": { "max_memory": "2GB", "request_timeout": "1.5h", "max_upload_rate": "10MB/s" }
        }"#,
    );

    let config = load_config_with(&path, &env(&[])).unwrap();
    let limits = config.global_limits();

    assert_eq!(limits.max_memory, 2_147_483_648);
    assert_eq!(limits.request_timeout, 5400.0);
    assert_eq!(limits.max_upload_rate, 10_485_760);
}

#[test]
fn test_unknown_unit_is_a_quantity_error() {
    let dir = ConfigDir::new();
    let path = dir.write("config.json", r#"{ "vhosts": [{ "name": "a", "limits": { "max_memory": "2XB" } }] }"#);

    let err = load_config_with(&path, &env(&[])).unwrap_err();

    match err {
        ConfigError::QuantityParse { field, .. } => assert_eq!(field, "vhosts[0].limits.max_memory"),
        other => panic!("expected QuantityParse, got {other:?}"),
    }
}

#[test]
fn test_interpolation() {
    let dir = ConfigDir::new();
    let path = dir.write(
        "config.json",
        r#"{ "server": { "port": "${PORT:-8080}" }, "security": { "auth": { "realm": "${API_KEY}" } } }"#,
    );

    let err = load_config_with(&path, &env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Reference { ref variable, .. } if variable == "API_KEY"));

    let config = load_config_with(&path, &env(&[("API_KEY", "secret")])).unwrap();
    assert_eq!(config.server().port, 8080);
    assert_eq!(config.global_security().auth.realm, "secret");
}

#[test]
fn test_capacity_is_enforced_not_truncated() {
    let dir = ConfigDir::new();
    let entries: Vec<String> = (0..101).map(|i| format!("\"/srv/{i}\"")).collect();
    let path = dir.write(
        "config.json",
        &format!(r#"{{ "security": {{ "fs_read": [{}] }} }}"#, entries.join(",")),
    );

    let err = load_config_with(&path, &env(&[])).unwrap_err();

    assert_eq!(err.violations().len(), 1);
    assert_eq!(err.violations()[0].field, "security.fs_read");
    assert_eq!(err.violations()[0].kind, ViolationKind::Capacity { len: 101, max: 100 });
}

#[test]
fn test_include_cycle_is_rejected() {
    let dir = ConfigDir::new();
    let a = dir.write("a.json", r#"{ "includes": ["b.json"] }"#);
    dir.write("b.json", r#"{ "includes": ["a.json"] }"#);

    let err = load_config_with(&a, &env(&[])).unwrap_err();

    match err {
        ConfigError::IncludeCycle { chain } => {
            assert_eq!(chain.len(), 3);
            assert_eq!(chain.first(), chain.last());
        }
        other => panic!("expected IncludeCycle, got {other:?}"),
    }
}

#[test]
fn test_includes_contribute_vhosts_and_defaults() {
    let dir = ConfigDir::new();
    dir.write("sites/10-a.json", r#"{ "vhosts": [{ "name": "a.example" }] }"#);
    dir.write(
        "sites/20-b.toml",
        "[[vhosts]]\nname = \"b.example\"\ndefault = true\n\n[vhosts.limits]\nmax_memory = \"1GB\"\n",
    );
    dir.write("base.json", r#"{ "limits": { "max_memory": "256MB", "max_connections": 10 } }"#);
    let root = dir.write(
        "config.json",
        r#"{ "includes": ["base.json", "sites/*"], "limits": { "max_connections": 20 } }"#,
    );

    let config = load_config_with(&root, &env(&[])).unwrap();

    let names: Vec<_> = config.virtual_hosts().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["a.example", "b.example"]);
    assert_eq!(config.global_limits().max_connections, 20);
    assert_eq!(config.global_limits().max_memory, 256 * 1024 * 1024);
    assert_eq!(config.virtual_hosts()[1].limits.max_memory, 1024 * 1024 * 1024);
    assert_eq!(config.lookup_virtual_host("unknown.example").unwrap().name, "b.example");
    assert_eq!(config.sources().len(), 4);
    assert!(config.is_source(&root.canonicalize().unwrap()));
}

#[test]
fn test_resolution_is_idempotent() {
    let dir = ConfigDir::new();
    dir.write("extra.json", r#"{ "cron": [{ "schedule": "0 * * * *", "script": "hourly.js" }] }"#);
    let path = dir.write(
        "config.json",
        r#"{
            "includes": ["extra.json"],
            "security": { "cors": { "enabled": true, "allowed_origins": ["https://a.example"] } },
            "vhosts": [{ "name": "a.example", "aliases": ["www.a.example"] }]
        }"#,
    );

    let first = load_config_with(&path, &env(&[])).unwrap();
    let second = load_config_with(&path, &env(&[])).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_lookup_ignores_case_and_port() {
    let dir = ConfigDir::new();
    let path = dir.write(
        "config.json",
        r#"{ "vhosts": [{ "name": "Example.com", "aliases": ["WWW.example.com"], "docroot": "/srv/example" }] }"#,
    );

    let config = load_config_with(&path, &env(&[])).unwrap();

    for host in ["example.com:8080", "EXAMPLE.COM", "www.example.com.", "Www.Example.Com:443"] {
        let vhost = config.lookup_virtual_host(host).unwrap();
        assert_eq!(vhost.name, "example.com");
        assert_eq!(vhost.docroot.as_deref(), Some("/srv/example"));
    }
}

#[test]
fn test_all_violations_reported_together() {
    let dir = ConfigDir::new();
    let path = dir.write(
        "config.json",
        r#"{
            "logging": { "level": "verbose" },
            "vhosts": [
                { "name": "a.example", "default": true, "tls": { "auto_cert": true, "cert": "/c.pem" } },
                { "name": "A.example", "default": true }
            ]
        }"#,
    );

    let err = load_config_with(&path, &env(&[])).unwrap_err();
    let paths: Vec<_> = err.diagnostics().into_iter().map(|d| d.path).collect();

    assert_eq!(paths, ["logging.level", "vhosts[0].tls.cert", "vhosts[1].name", "vhosts[1].default"]);
}

#[test]
fn test_negative_count_is_a_range_violation() {
    let dir = ConfigDir::new();
    let path = dir.write(
        "config.toml",
        "[limits]\nmax_connections = -5\n\n[logging]\nlevel = \"loud\"\n",
    );

    let err = load_config_with(&path, &env(&[])).unwrap_err();

    assert_eq!(err.violations().len(), 2);
    assert_eq!(err.violations()[0].field, "limits.max_connections");
    assert!(matches!(err.violations()[0].kind, ViolationKind::Range { ref value, .. } if value == "-5"));
    assert_eq!(err.violations()[1].field, "logging.level");
}
