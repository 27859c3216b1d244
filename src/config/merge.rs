//! Inheritance cascade from global defaults into each virtual host.
//!
//! # Responsibilities
//! - Resolve every inheritable leaf: vhost value, else global value, else built-in
//! - Record the origin of every cascaded vhost field
//! - Resolve global-only sections against built-in defaults
//!
//! # Design Decisions
//! - The unit of inheritance is the leaf field, never a whole group; a vhost
//!   may override one CORS field and inherit the rest
//! - Lists are leaves: a vhost list replaces the global list
//! - `port`, `bind_address`, `http2` and `http3` inherit from `server`
//! - Infallible: range and membership rules belong to validation

use std::path::PathBuf;

use crate::config::model::{
    AuthPolicy, CacheConfig, CacheRules, ConfigParts, ContentPolicy, CorsPolicy, CronJob,
    FieldOrigins, HeadersPolicy, Http2Settings, LimitsPolicy, LoggingConfig, Metadata,
    MonitoringConfig, Origin, Plugin, ResolvedConfig, RuntimePolicy, SecurityPolicy,
    ServerSettings, TlsPolicy, VhostTls, VirtualHost, WebTransportSettings, normalize_host,
};
use crate::config::schema::{
    Integer, LimitsSection, RawConfig, RuntimeSection, SecuritySection, VhostSection,
};

/// Built-in defaults, used when neither the vhost nor the global scope sets a field.
pub mod defaults {
    const MIB: u64 = 1024 * 1024;

    pub const PORT: u16 = 8080;
    pub const HOST: &str = "0.0.0.0";
    pub const SERVER_NAME: &str = "vhost-config";
    pub const WORKER_PROCESSES: u32 = 1;
    pub const WORKER_THREADS: u32 = 4;

    pub const MAX_MEMORY: u64 = 512 * MIB;
    pub const MAX_HEAP: u64 = 256 * MIB;
    pub const MAX_STACK_SIZE: u64 = 8 * MIB;
    pub const MAX_CONNECTIONS: u32 = 1024;
    pub const MAX_CONNECTIONS_PER_IP: u32 = 64;
    pub const MAX_REQUESTS_PER_CONN: u32 = 1000;
    /// 1 Gbit/s.
    pub const MAX_BANDWIDTH: u64 = 128 * MIB;
    pub const MAX_UPLOAD_RATE: u64 = 10 * MIB;
    pub const MAX_DOWNLOAD_RATE: u64 = 50 * MIB;
    pub const MAX_FILE_SIZE: u64 = 100 * MIB;
    pub const MAX_OPEN_FILES: u32 = 1024;
    pub const MAX_DIRECTORY_DEPTH: u32 = 32;
    pub const REQUEST_TIMEOUT: f64 = 30.0;
    pub const IDLE_TIMEOUT: f64 = 60.0;
    pub const STARTUP_TIMEOUT: f64 = 10.0;
    pub const REQUESTS_PER_SECOND: u32 = 100;
    pub const REQUESTS_PER_MINUTE: u32 = 6000;

    pub const X_FRAME_OPTIONS: &str = "DENY";
    pub const X_CONTENT_TYPE_OPTIONS: &str = "nosniff";
    pub const REFERRER_POLICY: &str = "strict-origin-when-cross-origin";
    pub const STRICT_TRANSPORT_SECURITY: &str = "max-age=31536000";
    pub const AUTH_TYPE: &str = "basic";
    pub const AUTH_REALM: &str = "Restricted";
    pub const MIN_TLS_VERSION: &str = "1.2";
    pub const CORS_MAX_AGE: f64 = 86_400.0;

    pub const LANGUAGE: &str = "js";
    pub const RUNTIME_TIMEOUT: f64 = 30.0;

    pub const HTTP2_MAX_CONCURRENT_STREAMS: u32 = 100;
    pub const HTTP2_INITIAL_WINDOW_SIZE: u32 = 65_535;
    pub const WEBTRANSPORT_MAX_SESSIONS: u32 = 100;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FORMAT: &str = "text";
    pub const LOG_MAX_SIZE: u64 = 100 * MIB;
    pub const LOG_MAX_FILES: u32 = 5;

    pub const METRICS_ENDPOINT: &str = "/metrics";
    pub const METRICS_FORMAT: &str = "prometheus";
    pub const COLLECTION_INTERVAL: f64 = 60.0;

    pub const CACHE_BACKEND: &str = "memory";
    pub const CACHE_TTL: f64 = 3600.0;
    pub const CACHE_MAX_SIZE: u64 = 256 * MIB;

    pub const CRON_TIMEOUT: f64 = 300.0;

    pub const TIMEZONE: &str = "UTC";
    pub const LOCALE: &str = "en_US.UTF-8";
    pub const DATA_DIRECTORY: &str = "./data";
    pub const TEMP_DIRECTORY: &str = "/tmp";
}

/// Picks leaf values and optionally records where each came from.
struct Cascade<'a> {
    origins: Option<&'a mut FieldOrigins>,
    prefix: &'static str,
}

impl<'a> Cascade<'a> {
    /// Global scope: nothing to record.
    fn global() -> Self {
        Self {
            origins: None,
            prefix: "",
        }
    }

    fn tracking(origins: &'a mut FieldOrigins) -> Self {
        Self {
            origins: Some(origins),
            prefix: "",
        }
    }

    fn within(&mut self, prefix: &'static str) -> Cascade<'_> {
        Cascade {
            origins: self.origins.as_deref_mut(),
            prefix,
        }
    }

    fn record(&mut self, field: &str, origin: Origin) {
        if let Some(origins) = self.origins.as_deref_mut() {
            origins.insert(format!("{}{field}", self.prefix), origin);
        }
    }

    fn pick<T: Clone>(&mut self, field: &str, local: &Option<T>, global: &Option<T>, default: T) -> T {
        let (value, origin) = match (local, global) {
            (Some(v), _) => (v.clone(), Origin::VirtualHost),
            (None, Some(v)) => (v.clone(), Origin::Global),
            (None, None) => (default, Origin::BuiltIn),
        };
        self.record(field, origin);
        value
    }

    /// Like [`pick`](Self::pick) for leaves with no built-in value.
    fn pick_opt<T: Clone>(&mut self, field: &str, local: &Option<T>, global: &Option<T>) -> Option<T> {
        let (value, origin) = match (local, global) {
            (Some(v), _) => (Some(v.clone()), Origin::VirtualHost),
            (None, Some(v)) => (Some(v.clone()), Origin::Global),
            (None, None) => (None, Origin::BuiltIn),
        };
        self.record(field, origin);
        value
    }
}

/// Cascade `raw` into a snapshot. `sources` lists the contributing files.
pub fn resolve(raw: &RawConfig, sources: Vec<PathBuf>) -> ResolvedConfig {
    let none_limits = LimitsSection::default();
    let none_security = SecuritySection::default();
    let none_runtime = RuntimeSection::default();

    let mut global = Cascade::global();
    let limits = resolve_limits(&raw.limits, &none_limits, &mut global.within("limits."));
    let security = resolve_security(&raw.security, &none_security, &mut global.within("security."));
    let runtime = resolve_runtime(&raw.runtime, &none_runtime, &mut global.within("runtime."));

    let vhosts = raw.vhosts.iter().map(|v| resolve_vhost(v, raw)).collect();
    let cron = raw
        .cron
        .iter()
        .map(|job| CronJob {
            schedule: job.schedule.clone(),
            script: job.script.clone(),
            language: job
                .language
                .clone()
                .unwrap_or_else(|| runtime.default_language.clone()),
            working_directory: job.working_directory.clone(),
            environment: job.environment.clone(),
            timeout: job.timeout.unwrap_or(defaults::CRON_TIMEOUT),
            enabled: job.enabled.unwrap_or(true),
        })
        .collect();
    let plugins = raw
        .plugins
        .iter()
        .map(|p| Plugin {
            name: p.name.clone(),
            path: p.path.clone(),
            enabled: p.enabled.unwrap_or(true),
            config: p.config.clone(),
        })
        .collect();

    ResolvedConfig::from_parts(ConfigParts {
        server: resolve_server(raw),
        limits,
        security,
        runtime,
        logging: resolve_logging(raw),
        monitoring: resolve_monitoring(raw),
        cache: resolve_cache(raw),
        vhosts,
        cron,
        plugins,
        metadata: Metadata {
            timezone: or_default(&raw.timezone, defaults::TIMEZONE),
            locale: or_default(&raw.locale, defaults::LOCALE),
            debug_mode: raw.debug_mode.unwrap_or(false),
            data_directory: or_default(&raw.data_directory, defaults::DATA_DIRECTORY),
            temp_directory: or_default(&raw.temp_directory, defaults::TEMP_DIRECTORY),
        },
        sources,
    })
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value.clone().unwrap_or_else(|| default.to_string())
}

/// Out-of-range integers read as unset. Validation reports them.
fn narrow<T: TryFrom<Integer>>(value: &Option<Integer>) -> Option<T> {
    value.and_then(|v| T::try_from(v).ok())
}

fn resolve_vhost(v: &VhostSection, raw: &RawConfig) -> VirtualHost {
    let server = &raw.server;
    let mut origins = FieldOrigins::new();
    let mut c = Cascade::tracking(&mut origins);

    let port = c.pick("port", &narrow(&v.port), &narrow(&server.port), defaults::PORT);
    let bind_address = c.pick("bind_address", &v.bind_address, &server.host, defaults::HOST.to_string());
    let http1 = c.pick("http1", &v.http1, &None, true);
    let http2 = c.pick("http2", &v.http2, &server.enable_http2, true);
    let http3 = c.pick("http3", &v.http3, &server.enable_http3, false);

    let limits = resolve_limits(&v.limits, &raw.limits, &mut c.within("limits."));
    let security = resolve_security(&v.security, &raw.security, &mut c.within("security."));
    let runtime = resolve_runtime(&v.runtime, &raw.runtime, &mut c.within("runtime."));

    VirtualHost {
        name: normalize_host(&v.name),
        aliases: v.aliases.iter().map(|a| normalize_host(a)).collect(),
        is_default: v.default.unwrap_or(false),
        docroot: v.docroot.clone(),
        port,
        bind_address,
        tls: VhostTls {
            cert: v.tls.cert.clone(),
            key: v.tls.key.clone(),
            ca_cert: v.tls.ca_cert.clone(),
            auto_cert: v.tls.auto_cert.unwrap_or(false),
        },
        http1,
        http2,
        http3,
        http2_settings: Http2Settings {
            max_concurrent_streams: narrow(&v.http2_settings.max_concurrent_streams).unwrap_or(defaults::HTTP2_MAX_CONCURRENT_STREAMS),
            initial_window_size: narrow(&v.http2_settings.initial_window_size).unwrap_or(defaults::HTTP2_INITIAL_WINDOW_SIZE),
        },
        webtransport: WebTransportSettings {
            max_sessions: narrow(&v.webtransport_settings.max_webtransport_sessions).unwrap_or(defaults::WEBTRANSPORT_MAX_SESSIONS),
            datagram_enabled: v.webtransport_settings.datagram_enabled.unwrap_or(false),
        },
        limits,
        security,
        runtime,
        origins,
    }
}

fn resolve_limits(l: &LimitsSection, g: &LimitsSection, c: &mut Cascade<'_>) -> LimitsPolicy {
    LimitsPolicy {
        max_memory: c.pick("max_memory", &l.max_memory, &g.max_memory, defaults::MAX_MEMORY),
        max_heap: c.pick("max_heap", &l.max_heap, &g.max_heap, defaults::MAX_HEAP),
        max_stack_size: c.pick("max_stack_size", &l.max_stack_size, &g.max_stack_size, defaults::MAX_STACK_SIZE),
        max_connections: c.pick("max_connections", &narrow(&l.max_connections), &narrow(&g.max_connections), defaults::MAX_CONNECTIONS),
        max_connections_per_ip: c.pick(
            "max_connections_per_ip",
            &narrow(&l.max_connections_per_ip),
            &narrow(&g.max_connections_per_ip),
            defaults::MAX_CONNECTIONS_PER_IP,
        ),
        max_requests_per_conn: c.pick(
            "max_requests_per_conn",
            &narrow(&l.max_requests_per_conn),
            &narrow(&g.max_requests_per_conn),
            defaults::MAX_REQUESTS_PER_CONN,
        ),
        max_bandwidth: c.pick("max_bandwidth", &l.max_bandwidth, &g.max_bandwidth, defaults::MAX_BANDWIDTH),
        max_upload_rate: c.pick("max_upload_rate", &l.max_upload_rate, &g.max_upload_rate, defaults::MAX_UPLOAD_RATE),
        max_download_rate: c.pick(
            "max_download_rate",
            &l.max_download_rate,
            &g.max_download_rate,
            defaults::MAX_DOWNLOAD_RATE,
        ),
        max_file_size: c.pick("max_file_size", &l.max_file_size, &g.max_file_size, defaults::MAX_FILE_SIZE),
        max_open_files: c.pick("max_open_files", &narrow(&l.max_open_files), &narrow(&g.max_open_files), defaults::MAX_OPEN_FILES),
        max_directory_depth: c.pick(
            "max_directory_depth",
            &narrow(&l.max_directory_depth),
            &narrow(&g.max_directory_depth),
            defaults::MAX_DIRECTORY_DEPTH,
        ),
        request_timeout: c.pick("request_timeout", &l.request_timeout, &g.request_timeout, defaults::REQUEST_TIMEOUT),
        idle_timeout: c.pick("idle_timeout", &l.idle_timeout, &g.idle_timeout, defaults::IDLE_TIMEOUT),
        startup_timeout: c.pick("startup_timeout", &l.startup_timeout, &g.startup_timeout, defaults::STARTUP_TIMEOUT),
        requests_per_second: c.pick(
            "requests_per_second",
            &narrow(&l.requests_per_second),
            &narrow(&g.requests_per_second),
            defaults::REQUESTS_PER_SECOND,
        ),
        requests_per_minute: c.pick(
            "requests_per_minute",
            &narrow(&l.requests_per_minute),
            &narrow(&g.requests_per_minute),
            defaults::REQUESTS_PER_MINUTE,
        ),
    }
}

fn resolve_security(l: &SecuritySection, g: &SecuritySection, c: &mut Cascade<'_>) -> SecurityPolicy {
    let h = (&l.security_headers, &g.security_headers);
    let a = (&l.auth, &g.auth);
    let t = (&l.tls, &g.tls);
    let o = (&l.cors, &g.cors);
    let x = (&l.content, &g.content);

    let security_headers = {
        let mut c = c.within("security.security_headers.");
        HeadersPolicy {
            enabled: c.pick("enabled", &h.0.enabled, &h.1.enabled, true),
            content_security_policy: c.pick(
                "content_security_policy",
                &h.0.content_security_policy,
                &h.1.content_security_policy,
                String::new(),
            ),
            x_frame_options: c.pick(
                "x_frame_options",
                &h.0.x_frame_options,
                &h.1.x_frame_options,
                defaults::X_FRAME_OPTIONS.to_string(),
            ),
            x_content_type_options: c.pick(
                "x_content_type_options",
                &h.0.x_content_type_options,
                &h.1.x_content_type_options,
                defaults::X_CONTENT_TYPE_OPTIONS.to_string(),
            ),
            referrer_policy: c.pick(
                "referrer_policy",
                &h.0.referrer_policy,
                &h.1.referrer_policy,
                defaults::REFERRER_POLICY.to_string(),
            ),
            strict_transport_security: c.pick(
                "strict_transport_security",
                &h.0.strict_transport_security,
                &h.1.strict_transport_security,
                defaults::STRICT_TRANSPORT_SECURITY.to_string(),
            ),
            x_xss_protection: c.pick("x_xss_protection", &h.0.x_xss_protection, &h.1.x_xss_protection, false),
        }
    };

    let auth = {
        let mut c = c.within("security.auth.");
        AuthPolicy {
            enabled: c.pick("enabled", &a.0.enabled, &a.1.enabled, false),
            auth_type: c.pick("type", &a.0.auth_type, &a.1.auth_type, defaults::AUTH_TYPE.to_string()),
            realm: c.pick("realm", &a.0.realm, &a.1.realm, defaults::AUTH_REALM.to_string()),
            jwt_issuer: c.pick_opt("jwt_issuer", &a.0.jwt_issuer, &a.1.jwt_issuer),
            jwt_audience: c.pick_opt("jwt_audience", &a.0.jwt_audience, &a.1.jwt_audience),
            public_key: c.pick_opt("public_key", &a.0.public_key, &a.1.public_key),
            require_https: c.pick("require_https", &a.0.require_https, &a.1.require_https, true),
        }
    };

    let tls = {
        let mut c = c.within("security.tls.");
        TlsPolicy {
            require_https: c.pick("require_https", &t.0.require_https, &t.1.require_https, false),
            min_tls_version: c.pick(
                "min_tls_version",
                &t.0.min_tls_version,
                &t.1.min_tls_version,
                defaults::MIN_TLS_VERSION.to_string(),
            ),
            cipher_suites: c.pick("cipher_suites", &t.0.cipher_suites, &t.1.cipher_suites, Vec::new()),
            prefer_server_ciphers: c.pick(
                "prefer_server_ciphers",
                &t.0.prefer_server_ciphers,
                &t.1.prefer_server_ciphers,
                true,
            ),
            ocsp_stapling: c.pick("ocsp_stapling", &t.0.ocsp_stapling, &t.1.ocsp_stapling, false),
        }
    };

    let cors = {
        let mut c = c.within("security.cors.");
        CorsPolicy {
            enabled: c.pick("enabled", &o.0.enabled, &o.1.enabled, false),
            allowed_origins: c.pick("allowed_origins", &o.0.allowed_origins, &o.1.allowed_origins, Vec::new()),
            allowed_methods: c.pick("allowed_methods", &o.0.allowed_methods, &o.1.allowed_methods, Vec::new()),
            allowed_headers: c.pick("allowed_headers", &o.0.allowed_headers, &o.1.allowed_headers, Vec::new()),
            allow_credentials: c.pick("allow_credentials", &o.0.allow_credentials, &o.1.allow_credentials, false),
            max_age: c.pick("max_age", &o.0.max_age, &o.1.max_age, defaults::CORS_MAX_AGE),
        }
    };

    let content = {
        let mut c = c.within("security.content.");
        ContentPolicy {
            allowed_file_extensions: c.pick(
                "allowed_file_extensions",
                &x.0.allowed_file_extensions,
                &x.1.allowed_file_extensions,
                Vec::new(),
            ),
            denied_file_extensions: c.pick(
                "denied_file_extensions",
                &x.0.denied_file_extensions,
                &x.1.denied_file_extensions,
                Vec::new(),
            ),
        }
    };

    SecurityPolicy {
        fs_read: c.pick("fs_read", &l.fs_read, &g.fs_read, Vec::new()),
        fs_write: c.pick("fs_write", &l.fs_write, &g.fs_write, Vec::new()),
        fs_execute: c.pick("fs_execute", &l.fs_execute, &g.fs_execute, Vec::new()),
        fs_deny_dotfiles: c.pick("fs_deny_dotfiles", &l.fs_deny_dotfiles, &g.fs_deny_dotfiles, true),
        net_outbound: c.pick("net_outbound", &l.net_outbound, &g.net_outbound, Vec::new()),
        net_inbound: c.pick("net_inbound", &l.net_inbound, &g.net_inbound, Vec::new()),
        net_block_private_ips: c.pick(
            "net_block_private_ips",
            &l.net_block_private_ips,
            &g.net_block_private_ips,
            true,
        ),
        env_allow: c.pick("env_allow", &l.env_allow, &g.env_allow, Vec::new()),
        env_deny: c.pick("env_deny", &l.env_deny, &g.env_deny, Vec::new()),
        env_block_all: c.pick("env_block_all", &l.env_block_all, &g.env_block_all, false),
        security_headers,
        auth,
        tls,
        cors,
        content,
    }
}

fn resolve_runtime(l: &RuntimeSection, g: &RuntimeSection, c: &mut Cascade<'_>) -> RuntimePolicy {
    RuntimePolicy {
        default_language: c.pick(
            "default_language",
            &l.default_language,
            &g.default_language,
            defaults::LANGUAGE.to_string(),
        ),
        enable_jit: c.pick("enable_jit", &l.enable_jit, &g.enable_jit, true),
        timeout: c.pick("timeout", &l.timeout, &g.timeout, defaults::RUNTIME_TIMEOUT),
        sandbox_enabled: c.pick("sandbox_enabled", &l.sandbox_enabled, &g.sandbox_enabled, true),
    }
}

fn resolve_server(raw: &RawConfig) -> ServerSettings {
    let s = &raw.server;
    ServerSettings {
        port: narrow(&s.port).unwrap_or(defaults::PORT),
        host: or_default(&s.host, defaults::HOST),
        acme_email: s.acme_email.clone(),
        auto_https: s.auto_https.unwrap_or(false),
        server_name: or_default(&s.server_name, defaults::SERVER_NAME),
        hide_server_header: s.hide_server_header.unwrap_or(false),
        worker_processes: narrow(&s.worker_processes).unwrap_or(defaults::WORKER_PROCESSES),
        worker_threads: narrow(&s.worker_threads).unwrap_or(defaults::WORKER_THREADS),
        enable_http2: s.enable_http2.unwrap_or(true),
        enable_http3: s.enable_http3.unwrap_or(false),
        enable_websockets: s.enable_websockets.unwrap_or(true),
        enable_webtransport: s.enable_webtransport.unwrap_or(false),
    }
}

fn resolve_logging(raw: &RawConfig) -> LoggingConfig {
    let l = &raw.logging;
    LoggingConfig {
        level: or_default(&l.level, defaults::LOG_LEVEL),
        format: or_default(&l.format, defaults::LOG_FORMAT),
        file: l.file.clone(),
        rotate: l.rotate.unwrap_or(false),
        max_size: l.max_size.unwrap_or(defaults::LOG_MAX_SIZE),
        max_files: narrow(&l.max_files).unwrap_or(defaults::LOG_MAX_FILES),
        include_timestamp: l.include_timestamp.unwrap_or(true),
        include_request_id: l.include_request_id.unwrap_or(true),
    }
}

fn resolve_monitoring(raw: &RawConfig) -> MonitoringConfig {
    let m = &raw.monitoring;
    MonitoringConfig {
        enabled: m.enabled.unwrap_or(false),
        endpoint: or_default(&m.endpoint, defaults::METRICS_ENDPOINT),
        format: or_default(&m.format, defaults::METRICS_FORMAT),
        include_runtime_stats: m.include_runtime_stats.unwrap_or(true),
        include_system_stats: m.include_system_stats.unwrap_or(true),
        collection_interval: m.collection_interval.unwrap_or(defaults::COLLECTION_INTERVAL),
    }
}

fn resolve_cache(raw: &RawConfig) -> CacheConfig {
    let c = &raw.cache;
    CacheConfig {
        enabled: c.enabled.unwrap_or(false),
        backend: or_default(&c.backend, defaults::CACHE_BACKEND),
        ttl: c.ttl.unwrap_or(defaults::CACHE_TTL),
        max_size: c.max_size.unwrap_or(defaults::CACHE_MAX_SIZE),
        compress: c.compress.unwrap_or(false),
        rules: CacheRules {
            paths: c.rules.paths.clone().unwrap_or_default(),
            extensions: c.rules.extensions.clone().unwrap_or_default(),
            cache_dynamic: c.rules.cache_dynamic.unwrap_or(false),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve_json(doc: serde_json::Value) -> ResolvedConfig {
        resolve(&RawConfig::from_value(doc).unwrap(), Vec::new())
    }

    #[test]
    fn test_vhost_inherits_global_limit() {
        let config = resolve_json(json!({
            "limits": { "requests_per_second": 100 },
            "vhosts": [
                { "name": "a.example" },
                { "name": "b.example", "limits": { "requests_per_second": 50 } }
            ]
        }));

        let a = &config.virtual_hosts()[0];
        let b = &config.virtual_hosts()[1];
        assert_eq!(a.limits.requests_per_second, 100);
        assert_eq!(a.origin_of("limits.requests_per_second"), Some(Origin::Global));
        assert_eq!(b.limits.requests_per_second, 50);
        assert_eq!(b.origin_of("limits.requests_per_second"), Some(Origin::VirtualHost));
        assert_eq!(config.global_limits().requests_per_second, 100);
    }

    #[test]
    fn test_builtin_default_when_nobody_sets_it() {
        let config = resolve_json(json!({ "vhosts": [{ "name": "a.example" }] }));
        let a = &config.virtual_hosts()[0];
        assert_eq!(a.limits.max_memory, defaults::MAX_MEMORY);
        assert_eq!(a.origin_of("limits.max_memory"), Some(Origin::BuiltIn));
    }

    #[test]
    fn test_explicit_value_equal_to_global_is_still_an_override() {
        let config = resolve_json(json!({
            "limits": { "max_connections": 10 },
            "vhosts": [{ "name": "a", "limits": { "max_connections": 10 } }]
        }));
        let a = &config.virtual_hosts()[0];
        assert_eq!(a.origin_of("limits.max_connections"), Some(Origin::VirtualHost));
    }

    #[test]
    fn test_nested_groups_cascade_per_leaf() {
        let config = resolve_json(json!({
            "security": { "cors": {
                "enabled": true,
                "allowed_origins": ["https://a.example"],
                "max_age": 600.0
            } },
            "vhosts": [{ "name": "a", "security": { "cors": { "allowed_origins": ["https://b.example"] } } }]
        }));
        let cors = &config.virtual_hosts()[0].security.cors;
        assert!(cors.enabled);
        assert_eq!(cors.allowed_origins, ["https://b.example"]);
        assert_eq!(cors.max_age, 600.0);

        let a = &config.virtual_hosts()[0];
        assert_eq!(a.origin_of("security.cors.enabled"), Some(Origin::Global));
        assert_eq!(a.origin_of("security.cors.allowed_origins"), Some(Origin::VirtualHost));
    }

    #[test]
    fn test_server_settings_feed_vhost_defaults() {
        let config = resolve_json(json!({
            "server": { "port": 9443, "host": "10.0.0.1", "enable_http3": true },
            "runtime": { "default_language": "lua" },
            "vhosts": [{ "name": "A.Example", "runtime": { "enable_jit": false } }]
        }));
        let a = &config.virtual_hosts()[0];
        assert_eq!(a.name, "a.example");
        assert_eq!(a.port, 9443);
        assert_eq!(a.bind_address, "10.0.0.1");
        assert!(a.http3);
        assert_eq!(a.runtime.default_language, "lua");
        assert!(!a.runtime.enable_jit);
    }

    #[test]
    fn test_cron_language_defaults_to_global_runtime() {
        let config = resolve_json(json!({
            "runtime": { "default_language": "python" },
            "cron": [{ "schedule": "0 0 * * *", "script": "nightly.py" }]
        }));
        assert_eq!(config.cron_jobs()[0].language, "python");
        assert!(config.cron_jobs()[0].enabled);
    }
}
