//! Configuration validation.
//!
//! # Responsibilities
//! - Enforce collection capacities and string length bounds
//! - Validate value ranges (ports, worker counts, HTTP/2 windows)
//! - Check enum membership and cross-field rules
//! - Detect duplicate hostnames, defaults and plugin names
//!
//! # Design Decisions
//! - Returns all violations, not just the first
//! - Pure function of the raw document and its resolution
//! - Field rules run on explicit values at the scope that wrote them, so an
//!   inherited bad value is reported once, at its source
//! - Hostname uniqueness runs on the resolved (lower-cased) names

use std::collections::HashMap;

use crate::config::error::{Violation, ViolationKind};
use crate::config::model::ResolvedConfig;
use crate::config::schema::{
    CronSection, Integer, LimitsSection, RawConfig, RuntimeSection, SecuritySection, VhostSection,
};

pub const MAX_VHOSTS: usize = 100;
pub const MAX_ALIASES: usize = 100;
pub const MAX_CRON_JOBS: usize = 20;
pub const MAX_PLUGINS: usize = 10;
pub const MAX_FS_ENTRIES: usize = 100;
pub const MAX_NET_ENTRIES: usize = 100;
pub const MAX_ENV_ENTRIES: usize = 100;
pub const MAX_CIPHER_SUITES: usize = 30;
pub const MAX_CORS_ORIGINS: usize = 20;
pub const MAX_CORS_METHODS: usize = 10;
pub const MAX_CORS_HEADERS: usize = 30;
pub const MAX_FILE_EXTENSIONS: usize = 20;
pub const MAX_CRON_ENVIRONMENT: usize = 20;
pub const MAX_CACHE_RULES: usize = 50;

/// Hostname length in bytes.
pub const MAX_HOSTNAME_LEN: usize = 255;
/// Filesystem path length in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Largest legal HTTP/2 flow-control window.
pub const MAX_HTTP2_WINDOW: u32 = (1 << 31) - 1;

/// Largest count any field accepts.
const MAX_COUNT: Integer = u32::MAX as Integer;

pub const LANGUAGES: &[&str] = &["js", "lua", "python"];
pub const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];
pub const LOG_FORMATS: &[&str] = &["json", "text"];
pub const AUTH_TYPES: &[&str] = &["basic", "jwt", "oauth2"];
pub const TLS_VERSIONS: &[&str] = &["1.2", "1.3"];
pub const CACHE_BACKENDS: &[&str] = &["memory", "redis", "file"];
pub const METRICS_FORMATS: &[&str] = &["prometheus", "json"];

/// Validate a decoded document together with its resolution.
pub fn validate(raw: &RawConfig, resolved: &ResolvedConfig) -> Result<(), Vec<Violation>> {
    let mut v = Validator::default();

    v.server(raw);
    v.limits("limits", &raw.limits);
    v.security("security", &raw.security);
    v.runtime("runtime", &raw.runtime);
    v.logging(raw);
    v.monitoring(raw);
    v.cache(raw);
    v.metadata(raw);

    v.capacity("vhosts", raw.vhosts.len(), MAX_VHOSTS);
    for (i, vhost) in raw.vhosts.iter().enumerate() {
        v.vhost(&format!("vhosts[{i}]"), vhost);
    }

    v.capacity("cron", raw.cron.len(), MAX_CRON_JOBS);
    for (i, job) in raw.cron.iter().enumerate() {
        v.cron(&format!("cron[{i}]"), job);
    }

    v.capacity("plugins", raw.plugins.len(), MAX_PLUGINS);
    let mut plugin_names: HashMap<&str, usize> = HashMap::new();
    for (i, plugin) in raw.plugins.iter().enumerate() {
        let field = format!("plugins[{i}]");
        v.path_len(&format!("{field}.path"), Some(&plugin.path));
        match plugin_names.get(plugin.name.as_str()) {
            Some(first) => v.push(format!("{field}.name"), ViolationKind::Uniqueness {
                value: plugin.name.clone(),
                first: format!("plugins[{first}]"),
            }),
            None => {
                plugin_names.insert(&plugin.name, i);
            }
        }
    }

    v.hostnames(resolved);

    if v.violations.is_empty() {
        Ok(())
    } else {
        Err(v.violations)
    }
}

#[derive(Default)]
struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    fn push(&mut self, field: impl Into<String>, kind: ViolationKind) {
        self.violations.push(Violation::new(field, kind));
    }

    fn capacity(&mut self, field: &str, len: usize, max: usize) {
        if len > max {
            self.push(field, ViolationKind::Capacity { len, max });
        }
    }

    fn list(&mut self, field: &str, list: &Option<Vec<String>>, max: usize) {
        if let Some(list) = list {
            self.capacity(field, list.len(), max);
        }
    }

    fn path_len(&mut self, field: &str, path: Option<&String>) {
        if let Some(path) = path {
            self.capacity(field, path.len(), MAX_PATH_LEN);
        }
    }

    fn range(&mut self, field: &str, value: impl ToString, expected: &str) {
        self.push(field, ViolationKind::Range {
            value: value.to_string(),
            expected: expected.to_string(),
        });
    }

    fn bounded(&mut self, field: &str, value: Option<Integer>, min: Integer, max: Integer) {
        if let Some(value) = value {
            if !(min..=max).contains(&value) {
                self.range(field, value, &format!("{min}..={max}"));
            }
        }
    }

    fn count(&mut self, field: &str, value: Option<Integer>) {
        self.bounded(field, value, 0, MAX_COUNT);
    }

    fn at_least_one(&mut self, field: &str, value: Option<Integer>) {
        self.bounded(field, value, 1, MAX_COUNT);
    }

    fn port(&mut self, field: &str, port: Option<Integer>) {
        self.bounded(field, port, 1, Integer::from(u16::MAX));
    }

    fn seconds(&mut self, field: &str, value: Option<f64>) {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                self.range(field, value, "a finite, non-negative duration");
            }
        }
    }

    fn one_of(&mut self, field: &str, value: &Option<String>, allowed: &[&str]) {
        if let Some(value) = value {
            if !allowed.contains(&value.as_str()) {
                self.push(field, ViolationKind::Enum {
                    value: value.clone(),
                    allowed: allowed.iter().map(|s| s.to_string()).collect(),
                });
            }
        }
    }

    fn language(&mut self, field: &str, value: &Option<String>) {
        if let Some(value) = value {
            if !LANGUAGES.contains(&value.as_str()) {
                self.push(field, ViolationKind::Referential {
                    target: "language".to_string(),
                    value: value.clone(),
                });
            }
        }
    }

    fn server(&mut self, raw: &RawConfig) {
        let s = &raw.server;
        self.port("server.port", s.port);
        self.at_least_one("server.worker_processes", s.worker_processes);
        self.at_least_one("server.worker_threads", s.worker_threads);
    }

    fn limits(&mut self, scope: &str, l: &LimitsSection) {
        let counts = [
            ("max_connections", l.max_connections),
            ("max_connections_per_ip", l.max_connections_per_ip),
            ("max_requests_per_conn", l.max_requests_per_conn),
            ("max_open_files", l.max_open_files),
            ("max_directory_depth", l.max_directory_depth),
            ("requests_per_second", l.requests_per_second),
            ("requests_per_minute", l.requests_per_minute),
        ];
        for (name, value) in counts {
            self.count(&format!("{scope}.{name}"), value);
        }
        self.seconds(&format!("{scope}.request_timeout"), l.request_timeout);
        self.seconds(&format!("{scope}.idle_timeout"), l.idle_timeout);
        self.seconds(&format!("{scope}.startup_timeout"), l.startup_timeout);
    }

    fn security(&mut self, scope: &str, s: &SecuritySection) {
        let f = |name: &str| format!("{scope}.{name}");

        self.list(&f("fs_read"), &s.fs_read, MAX_FS_ENTRIES);
        self.list(&f("fs_write"), &s.fs_write, MAX_FS_ENTRIES);
        self.list(&f("fs_execute"), &s.fs_execute, MAX_FS_ENTRIES);
        self.list(&f("net_outbound"), &s.net_outbound, MAX_NET_ENTRIES);
        self.list(&f("net_inbound"), &s.net_inbound, MAX_NET_ENTRIES);
        self.list(&f("env_allow"), &s.env_allow, MAX_ENV_ENTRIES);
        self.list(&f("env_deny"), &s.env_deny, MAX_ENV_ENTRIES);

        let allow_written = s.env_allow.as_ref().is_some_and(|a| !a.is_empty());
        if s.env_block_all == Some(true) && allow_written {
            self.push(f("env_allow"), ViolationKind::MutualExclusion {
                other: f("env_block_all"),
            });
        }

        self.one_of(&f("auth.type"), &s.auth.auth_type, AUTH_TYPES);
        if s.auth.auth_type.as_deref() == Some("jwt") && s.auth.jwt_issuer.is_none() {
            self.push(f("auth.jwt_issuer"), ViolationKind::Referential {
                target: "JWT issuer".to_string(),
                value: String::new(),
            });
        }
        self.path_len(&f("auth.public_key"), s.auth.public_key.as_ref());

        self.one_of(&f("tls.min_tls_version"), &s.tls.min_tls_version, TLS_VERSIONS);
        self.list(&f("tls.cipher_suites"), &s.tls.cipher_suites, MAX_CIPHER_SUITES);

        self.list(&f("cors.allowed_origins"), &s.cors.allowed_origins, MAX_CORS_ORIGINS);
        self.list(&f("cors.allowed_methods"), &s.cors.allowed_methods, MAX_CORS_METHODS);
        self.list(&f("cors.allowed_headers"), &s.cors.allowed_headers, MAX_CORS_HEADERS);
        self.seconds(&f("cors.max_age"), s.cors.max_age);

        self.list(
            &f("content.allowed_file_extensions"),
            &s.content.allowed_file_extensions,
            MAX_FILE_EXTENSIONS,
        );
        self.list(
            &f("content.denied_file_extensions"),
            &s.content.denied_file_extensions,
            MAX_FILE_EXTENSIONS,
        );
    }

    fn runtime(&mut self, scope: &str, r: &RuntimeSection) {
        self.language(&format!("{scope}.default_language"), &r.default_language);
        self.seconds(&format!("{scope}.timeout"), r.timeout);
    }

    fn vhost(&mut self, scope: &str, vhost: &VhostSection) {
        let f = |name: &str| format!("{scope}.{name}");

        if vhost.name.trim().is_empty() {
            self.range(&f("name"), "\"\"", "a non-empty hostname");
        }
        self.capacity(&f("name"), vhost.name.len(), MAX_HOSTNAME_LEN);
        self.capacity(&f("aliases"), vhost.aliases.len(), MAX_ALIASES);
        for (i, alias) in vhost.aliases.iter().enumerate() {
            self.capacity(&format!("{scope}.aliases[{i}]"), alias.len(), MAX_HOSTNAME_LEN);
        }

        self.port(&f("port"), vhost.port);
        self.path_len(&f("docroot"), vhost.docroot.as_ref());
        self.path_len(&f("tls.cert"), vhost.tls.cert.as_ref());
        self.path_len(&f("tls.key"), vhost.tls.key.as_ref());
        self.path_len(&f("tls.ca_cert"), vhost.tls.ca_cert.as_ref());

        if vhost.tls.auto_cert == Some(true) {
            for (name, set) in [("tls.cert", vhost.tls.cert.is_some()), ("tls.key", vhost.tls.key.is_some())] {
                if set {
                    self.push(f(name), ViolationKind::MutualExclusion {
                        other: f("tls.auto_cert"),
                    });
                }
            }
        }

        let h2 = &vhost.http2_settings;
        self.at_least_one(&f("http2_settings.max_concurrent_streams"), h2.max_concurrent_streams);
        self.bounded(
            &f("http2_settings.initial_window_size"),
            h2.initial_window_size,
            0,
            Integer::from(MAX_HTTP2_WINDOW),
        );
        self.count(
            &f("webtransport_settings.max_webtransport_sessions"),
            vhost.webtransport_settings.max_webtransport_sessions,
        );

        self.limits(&f("limits"), &vhost.limits);
        self.security(&f("security"), &vhost.security);
        self.runtime(&f("runtime"), &vhost.runtime);
    }

    fn cron(&mut self, scope: &str, job: &CronSection) {
        self.language(&format!("{scope}.language"), &job.language);
        self.capacity(&format!("{scope}.environment"), job.environment.len(), MAX_CRON_ENVIRONMENT);
        self.path_len(&format!("{scope}.script"), Some(&job.script));
        self.path_len(&format!("{scope}.working_directory"), job.working_directory.as_ref());
        self.seconds(&format!("{scope}.timeout"), job.timeout);
    }

    fn logging(&mut self, raw: &RawConfig) {
        let l = &raw.logging;
        self.one_of("logging.level", &l.level, LOG_LEVELS);
        self.one_of("logging.format", &l.format, LOG_FORMATS);
        self.path_len("logging.file", l.file.as_ref());
        if l.rotate == Some(true) {
            self.at_least_one("logging.max_files", l.max_files);
        } else {
            self.count("logging.max_files", l.max_files);
        }
    }

    fn monitoring(&mut self, raw: &RawConfig) {
        let m = &raw.monitoring;
        self.one_of("monitoring.format", &m.format, METRICS_FORMATS);
        self.seconds("monitoring.collection_interval", m.collection_interval);
        if m.enabled == Some(true) && m.collection_interval == Some(0.0) {
            self.range("monitoring.collection_interval", 0, "> 0 when monitoring is enabled");
        }
    }

    fn cache(&mut self, raw: &RawConfig) {
        let c = &raw.cache;
        self.one_of("cache.backend", &c.backend, CACHE_BACKENDS);
        self.seconds("cache.ttl", c.ttl);
        self.list("cache.rules.paths", &c.rules.paths, MAX_CACHE_RULES);
        self.list("cache.rules.extensions", &c.rules.extensions, MAX_CACHE_RULES);
    }

    fn metadata(&mut self, raw: &RawConfig) {
        self.path_len("data_directory", raw.data_directory.as_ref());
        self.path_len("temp_directory", raw.temp_directory.as_ref());
    }

    /// Names and aliases must be unique across vhosts; one default at most.
    fn hostnames(&mut self, resolved: &ResolvedConfig) {
        let mut seen: HashMap<&str, String> = HashMap::new();
        let mut default: Option<usize> = None;

        for (i, vhost) in resolved.virtual_hosts().iter().enumerate() {
            let names = std::iter::once(("name".to_string(), &vhost.name)).chain(
                vhost
                    .aliases
                    .iter()
                    .enumerate()
                    .map(|(j, a)| (format!("aliases[{j}]"), a)),
            );
            for (field, host) in names {
                let here = format!("vhosts[{i}].{field}");
                match seen.get(host.as_str()) {
                    Some(first) => self.push(here, ViolationKind::Uniqueness {
                        value: host.clone(),
                        first: first.clone(),
                    }),
                    None => {
                        seen.insert(host, here);
                    }
                }
            }

            if vhost.is_default {
                match default {
                    Some(first) => self.push(format!("vhosts[{i}].default"), ViolationKind::Uniqueness {
                        value: "default".to_string(),
                        first: format!("vhosts[{first}]"),
                    }),
                    None => default = Some(i),
                }
            }
        }
    }
}
