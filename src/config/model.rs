//! Resolved, immutable configuration snapshot.
//!
//! # Responsibilities
//! - Hold the fully cascaded policies of every virtual host
//! - Answer hostname lookups (exact name/alias, then default vhost)
//! - Expose read-only views of global sections and metadata
//!
//! # Design Decisions
//! - No mutation methods: a change means building a new snapshot
//! - Fields of [`ResolvedConfig`] are private; sections are handed out by reference
//! - Host matching is case-insensitive and ignores the port
//! - No wildcard matching; only exact names and aliases

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::loader::IncludeGlob;
use crate::config::schema::{Bytes, BytesPerSecond, Seconds};

/// Where a resolved field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Set explicitly on the virtual host.
    VirtualHost,
    /// Inherited from the global scope.
    Global,
    /// Built-in default.
    BuiltIn,
}

/// Dotted field path → origin, for one virtual host.
pub type FieldOrigins = BTreeMap<String, Origin>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSettings {
    pub port: u16,
    pub host: String,
    pub acme_email: Option<String>,
    pub auto_https: bool,
    pub server_name: String,
    pub hide_server_header: bool,
    pub worker_processes: u32,
    pub worker_threads: u32,
    pub enable_http2: bool,
    pub enable_http3: bool,
    pub enable_websockets: bool,
    pub enable_webtransport: bool,
}

/// Effective resource limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitsPolicy {
    pub max_memory: Bytes,
    pub max_heap: Bytes,
    pub max_stack_size: Bytes,
    pub max_connections: u32,
    pub max_connections_per_ip: u32,
    pub max_requests_per_conn: u32,
    pub max_bandwidth: BytesPerSecond,
    pub max_upload_rate: BytesPerSecond,
    pub max_download_rate: BytesPerSecond,
    pub max_file_size: Bytes,
    pub max_open_files: u32,
    pub max_directory_depth: u32,
    pub request_timeout: Seconds,
    pub idle_timeout: Seconds,
    pub startup_timeout: Seconds,
    pub requests_per_second: u32,
    pub requests_per_minute: u32,
}

/// Effective security policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityPolicy {
    pub fs_read: Vec<String>,
    pub fs_write: Vec<String>,
    pub fs_execute: Vec<String>,
    pub fs_deny_dotfiles: bool,
    pub net_outbound: Vec<String>,
    pub net_inbound: Vec<String>,
    pub net_block_private_ips: bool,
    /// Applies even when `env_block_all` is set.
    pub env_allow: Vec<String>,
    pub env_deny: Vec<String>,
    pub env_block_all: bool,
    pub security_headers: HeadersPolicy,
    pub auth: AuthPolicy,
    pub tls: TlsPolicy,
    pub cors: CorsPolicy,
    pub content: ContentPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadersPolicy {
    pub enabled: bool,
    pub content_security_policy: String,
    pub x_frame_options: String,
    pub x_content_type_options: String,
    pub referrer_policy: String,
    pub strict_transport_security: String,
    pub x_xss_protection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthPolicy {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub auth_type: String,
    pub realm: String,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
    pub public_key: Option<String>,
    pub require_https: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TlsPolicy {
    pub require_https: bool,
    pub min_tls_version: String,
    pub cipher_suites: Vec<String>,
    pub prefer_server_ciphers: bool,
    pub ocsp_stapling: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorsPolicy {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Seconds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPolicy {
    pub allowed_file_extensions: Vec<String>,
    pub denied_file_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimePolicy {
    pub default_language: String,
    pub enable_jit: bool,
    pub timeout: Seconds,
    pub sandbox_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VhostTls {
    pub cert: Option<String>,
    pub key: Option<String>,
    pub ca_cert: Option<String>,
    pub auto_cert: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Http2Settings {
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebTransportSettings {
    pub max_sessions: u32,
    pub datagram_enabled: bool,
}

/// A virtual host with every inheritable field resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualHost {
    /// Lower-cased primary hostname.
    pub name: String,
    /// Lower-cased extra hostnames.
    pub aliases: Vec<String>,
    pub is_default: bool,
    pub docroot: Option<String>,
    pub port: u16,
    pub bind_address: String,
    pub tls: VhostTls,
    pub http1: bool,
    pub http2: bool,
    pub http3: bool,
    pub http2_settings: Http2Settings,
    pub webtransport: WebTransportSettings,
    pub limits: LimitsPolicy,
    pub security: SecurityPolicy,
    pub runtime: RuntimePolicy,
    /// Provenance of each cascaded field.
    pub origins: FieldOrigins,
}

impl VirtualHost {
    /// Where `field` (e.g. `"limits.max_memory"`) got its value.
    pub fn origin_of(&self, field: &str) -> Option<Origin> {
        self.origins.get(field).copied()
    }

    fn hostnames(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<String>,
    pub rotate: bool,
    pub max_size: Bytes,
    pub max_files: u32,
    pub include_timestamp: bool,
    pub include_request_id: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub format: String,
    pub include_runtime_stats: bool,
    pub include_system_stats: bool,
    pub collection_interval: Seconds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: String,
    pub ttl: Seconds,
    pub max_size: Bytes,
    pub compress: bool,
    pub rules: CacheRules,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheRules {
    pub paths: Vec<String>,
    pub extensions: Vec<String>,
    pub cache_dynamic: bool,
}

/// A declared cron job. Scheduling happens elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronJob {
    pub schedule: String,
    pub script: String,
    pub language: String,
    pub working_directory: Option<String>,
    pub environment: Vec<String>,
    pub timeout: Seconds,
    pub enabled: bool,
}

/// A declared plugin. `config` is opaque to this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plugin {
    pub name: String,
    pub path: String,
    pub enabled: bool,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub timezone: String,
    pub locale: String,
    pub debug_mode: bool,
    pub data_directory: String,
    pub temp_directory: String,
}

/// Hostname lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no virtual host matches '{host}' and no default is configured")]
    NotFound { host: String },
}

/// Everything the merger produces, before indexing.
#[derive(Debug, Clone)]
pub(crate) struct ConfigParts {
    pub server: ServerSettings,
    pub limits: LimitsPolicy,
    pub security: SecurityPolicy,
    pub runtime: RuntimePolicy,
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
    pub cache: CacheConfig,
    pub vhosts: Vec<VirtualHost>,
    pub cron: Vec<CronJob>,
    pub plugins: Vec<Plugin>,
    pub metadata: Metadata,
    pub sources: Vec<PathBuf>,
}

/// The published configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    server: ServerSettings,
    limits: LimitsPolicy,
    security: SecurityPolicy,
    runtime: RuntimePolicy,
    logging: LoggingConfig,
    monitoring: MonitoringConfig,
    cache: CacheConfig,
    vhosts: Vec<VirtualHost>,
    cron: Vec<CronJob>,
    plugins: Vec<Plugin>,
    metadata: Metadata,
    sources: Vec<PathBuf>,
    #[serde(skip)]
    include_globs: Vec<IncludeGlob>,
    #[serde(skip)]
    by_host: HashMap<String, usize>,
    #[serde(skip)]
    default_vhost: Option<usize>,
}

impl ResolvedConfig {
    pub(crate) fn from_parts(parts: ConfigParts) -> Self {
        let mut by_host = HashMap::new();
        for (i, vhost) in parts.vhosts.iter().enumerate() {
            for host in vhost.hostnames() {
                by_host.entry(host.to_string()).or_insert(i);
            }
        }
        let default_vhost = parts.vhosts.iter().position(|v| v.is_default);

        Self {
            server: parts.server,
            limits: parts.limits,
            security: parts.security,
            runtime: parts.runtime,
            logging: parts.logging,
            monitoring: parts.monitoring,
            cache: parts.cache,
            vhosts: parts.vhosts,
            cron: parts.cron,
            plugins: parts.plugins,
            metadata: parts.metadata,
            sources: parts.sources,
            include_globs: Vec::new(),
            by_host,
            default_vhost,
        }
    }

    /// Find the virtual host serving `hostname` (a `Host` header value).
    ///
    /// The port is stripped and the name lower-cased before an exact match on
    /// names and aliases. Falls back to the default vhost.
    pub fn lookup_virtual_host(&self, hostname: &str) -> Result<&VirtualHost, LookupError> {
        let host = normalize_host(strip_port(hostname));
        self.by_host
            .get(&host)
            .or(self.default_vhost.as_ref())
            .map(|&i| &self.vhosts[i])
            .ok_or(LookupError::NotFound { host })
    }

    pub fn default_virtual_host(&self) -> Option<&VirtualHost> {
        self.default_vhost.map(|i| &self.vhosts[i])
    }

    pub fn virtual_hosts(&self) -> &[VirtualHost] {
        &self.vhosts
    }

    pub fn server(&self) -> &ServerSettings {
        &self.server
    }

    /// Global limits, for introspection. Vhosts carry their own resolved copy.
    pub fn global_limits(&self) -> &LimitsPolicy {
        &self.limits
    }

    /// Global security policy, for introspection.
    pub fn global_security(&self) -> &SecurityPolicy {
        &self.security
    }

    pub fn global_runtime(&self) -> &RuntimePolicy {
        &self.runtime
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    pub fn monitoring(&self) -> &MonitoringConfig {
        &self.monitoring
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn cron_jobs(&self) -> &[CronJob] {
        &self.cron
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Files that contributed to this snapshot, root last.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Glob includes whose directories can add files to the next load.
    pub fn include_globs(&self) -> &[IncludeGlob] {
        &self.include_globs
    }

    pub(crate) fn with_include_globs(mut self, globs: Vec<IncludeGlob>) -> Self {
        self.include_globs = globs;
        self
    }

    /// Whether `path` contributed to this snapshot.
    pub fn is_source(&self, path: &Path) -> bool {
        self.sources.iter().any(|p| p == path)
    }
}

/// Case-fold a hostname and drop a trailing dot.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// `example.com:8080` → `example.com`, `[::1]:443` → `[::1]`.
fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        // A bare IPv6 address has several colons and no port.
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
