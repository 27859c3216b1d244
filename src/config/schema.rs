//! Raw configuration schema.
//!
//! Mirrors the on-disk document after includes, interpolation and quantity
//! normalization. Every inheritable leaf is an `Option` so the merger can tell
//! "not mentioned" apart from "explicitly set". Quantity fields arrive here
//! already in canonical units (bytes, seconds, bytes per second).
//!
//! Numeric and boolean leaves also accept their string form, since
//! interpolated values (`"${PORT:-8080}"`) are always strings.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::error::{ConfigError, ConfigResult};

/// Bytes, canonical size unit.
pub type Bytes = u64;
/// Seconds, canonical duration unit.
pub type Seconds = f64;
/// Bytes per second, canonical rate unit.
pub type BytesPerSecond = u64;
/// Ports and counts. Decoded wide so that out-of-range values reach
/// validation as range violations instead of failing the decode.
pub type Integer = i64;

/// Root of a configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub server: ServerSection,
    pub limits: LimitsSection,
    pub security: SecuritySection,
    /// Global defaults for per-vhost runtime options.
    pub runtime: RuntimeSection,
    pub logging: LoggingSection,
    pub monitoring: MonitoringSection,
    pub cache: CacheSection,
    pub vhosts: Vec<VhostSection>,
    pub cron: Vec<CronSection>,
    pub plugins: Vec<PluginSection>,

    pub timezone: Option<String>,
    pub locale: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub debug_mode: Option<bool>,
    pub data_directory: Option<String>,
    pub temp_directory: Option<String>,
}

impl RawConfig {
    /// Decode a normalized document tree.
    ///
    /// A decode failure is reported at the field that caused it.
    pub fn from_value(doc: Value) -> ConfigResult<Self> {
        match Self::deserialize(&doc) {
            Ok(raw) => Ok(raw),
            Err(e) => {
                let message = e.to_string();
                let path = locate_decode_error(&doc, &message)
                    .unwrap_or_else(|| "<document>".to_string());
                Err(ConfigError::Syntax { path, message })
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Key(String),
    Index(usize),
}

fn display_path(steps: &[Step]) -> String {
    let mut out = String::new();
    for step in steps {
        match step {
            Step::Key(key) if out.is_empty() => out.push_str(key),
            Step::Key(key) => {
                out.push('.');
                out.push_str(key);
            }
            Step::Index(i) => out.push_str(&format!("[{i}]")),
        }
    }
    out
}

/// Find the node whose removal changes the decode outcome.
///
/// Leaves are tried first, in document order, then containers innermost
/// first. Removing a required field only produces a `missing field` error,
/// which does not count as a change.
fn locate_decode_error(doc: &Value, message: &str) -> Option<String> {
    let mut leaves = Vec::new();
    let mut containers = Vec::new();
    collect_nodes(doc, &mut Vec::new(), &mut leaves, &mut containers);

    leaves.iter().chain(containers.iter()).find_map(|steps| {
        let mut pruned = doc.clone();
        remove_node(&mut pruned, steps);
        let changed = match RawConfig::deserialize(&pruned) {
            Ok(_) => true,
            Err(e) => {
                let other = e.to_string();
                other != message && !other.starts_with("missing field")
            }
        };
        changed.then(|| display_path(steps))
    })
}

fn collect_nodes(value: &Value, at: &mut Vec<Step>, leaves: &mut Vec<Vec<Step>>, containers: &mut Vec<Vec<Step>>) {
    let children: Vec<(Step, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (Step::Key(k.clone()), v)).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (Step::Index(i), v)).collect(),
        _ => return,
    };
    for (step, child) in children {
        at.push(step);
        let nested = matches!(child, Value::Object(m) if !m.is_empty())
            || matches!(child, Value::Array(a) if !a.is_empty());
        if nested {
            collect_nodes(child, at, leaves, containers);
            containers.push(at.clone());
        } else {
            leaves.push(at.clone());
        }
        at.pop();
    }
}

fn remove_node(value: &mut Value, steps: &[Step]) {
    let Some((last, parents)) = steps.split_last() else {
        return;
    };
    let mut node = value;
    for step in parents {
        let next = match (step, node) {
            (Step::Key(k), Value::Object(map)) => map.get_mut(k),
            (Step::Index(i), Value::Array(items)) => items.get_mut(*i),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return,
        }
    }
    match (last, node) {
        (Step::Key(k), Value::Object(map)) => {
            map.remove(k);
        }
        (Step::Index(i), Value::Array(items)) if *i < items.len() => {
            items.remove(*i);
        }
        _ => {}
    }
}

/// Process-wide listener and worker settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    #[serde(deserialize_with = "lenient")]
    pub port: Option<Integer>,
    /// Bind address.
    pub host: Option<String>,
    /// Contact address for ACME certificate issuance.
    pub acme_email: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub auto_https: Option<bool>,
    /// `Server` header value.
    pub server_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub hide_server_header: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub worker_processes: Option<Integer>,
    #[serde(deserialize_with = "lenient")]
    pub worker_threads: Option<Integer>,
    #[serde(deserialize_with = "lenient")]
    pub enable_http2: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub enable_http3: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub enable_websockets: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub enable_webtransport: Option<bool>,
}

/// Resource limits, at global or vhost scope.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    pub max_memory: Option<Bytes>,
    /// Language-specific heap limit.
    pub max_heap: Option<Bytes>,
    /// Stack size per request.
    pub max_stack_size: Option<Bytes>,

    #[serde(deserialize_with = "lenient")]
    pub max_connections: Option<Integer>,
    #[serde(deserialize_with = "lenient")]
    pub max_connections_per_ip: Option<Integer>,
    /// Requests per keep-alive connection.
    #[serde(deserialize_with = "lenient")]
    pub max_requests_per_conn: Option<Integer>,

    pub max_bandwidth: Option<BytesPerSecond>,
    pub max_upload_rate: Option<BytesPerSecond>,
    pub max_download_rate: Option<BytesPerSecond>,

    /// Upload size limit.
    pub max_file_size: Option<Bytes>,
    #[serde(deserialize_with = "lenient")]
    pub max_open_files: Option<Integer>,
    /// Maximum path depth under the docroot.
    #[serde(deserialize_with = "lenient")]
    pub max_directory_depth: Option<Integer>,

    pub request_timeout: Option<Seconds>,
    pub idle_timeout: Option<Seconds>,
    pub startup_timeout: Option<Seconds>,

    #[serde(deserialize_with = "lenient")]
    pub requests_per_second: Option<Integer>,
    #[serde(deserialize_with = "lenient")]
    pub requests_per_minute: Option<Integer>,
}

/// Security policy, at global or vhost scope.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SecuritySection {
    pub fs_read: Option<Vec<String>>,
    pub fs_write: Option<Vec<String>>,
    pub fs_execute: Option<Vec<String>>,
    /// Block `.env`, `.git` and friends.
    #[serde(deserialize_with = "lenient")]
    pub fs_deny_dotfiles: Option<bool>,

    /// `host:port` entries.
    pub net_outbound: Option<Vec<String>>,
    /// `ip:port` entries.
    pub net_inbound: Option<Vec<String>>,
    /// Block RFC 1918 destinations.
    #[serde(deserialize_with = "lenient")]
    pub net_block_private_ips: Option<bool>,

    pub env_allow: Option<Vec<String>>,
    pub env_deny: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub env_block_all: Option<bool>,

    pub security_headers: HeadersSection,
    pub auth: AuthSection,
    pub tls: TlsPolicySection,
    pub cors: CorsSection,
    pub content: ContentSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HeadersSection {
    #[serde(deserialize_with = "lenient")]
    pub enabled: Option<bool>,
    pub content_security_policy: Option<String>,
    pub x_frame_options: Option<String>,
    pub x_content_type_options: Option<String>,
    pub referrer_policy: Option<String>,
    pub strict_transport_security: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub x_xss_protection: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    #[serde(deserialize_with = "lenient")]
    pub enabled: Option<bool>,
    /// One of `basic`, `jwt`, `oauth2`.
    #[serde(rename = "type")]
    pub auth_type: Option<String>,
    /// Basic auth realm.
    pub realm: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
    /// Path to the JWT verification key.
    pub public_key: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub require_https: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TlsPolicySection {
    /// Redirect HTTP to HTTPS.
    #[serde(deserialize_with = "lenient")]
    pub require_https: Option<bool>,
    /// `"1.2"` or `"1.3"`.
    pub min_tls_version: Option<String>,
    pub cipher_suites: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub prefer_server_ciphers: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub ocsp_stapling: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CorsSection {
    #[serde(deserialize_with = "lenient")]
    pub enabled: Option<bool>,
    pub allowed_origins: Option<Vec<String>>,
    pub allowed_methods: Option<Vec<String>>,
    pub allowed_headers: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub allow_credentials: Option<bool>,
    pub max_age: Option<Seconds>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ContentSection {
    pub allowed_file_extensions: Option<Vec<String>>,
    pub denied_file_extensions: Option<Vec<String>>,
}

/// Language runtime options, at global or vhost scope.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
    /// `"js"`, `"lua"` or `"python"`.
    pub default_language: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub enable_jit: Option<bool>,
    /// Script execution timeout.
    pub timeout: Option<Seconds>,
    #[serde(deserialize_with = "lenient")]
    pub sandbox_enabled: Option<bool>,
}

/// One virtual host.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VhostSection {
    /// Primary hostname.
    pub name: String,
    /// Additional hostnames served by this vhost.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Serve requests whose host matches no vhost.
    #[serde(default, deserialize_with = "lenient")]
    pub default: Option<bool>,
    #[serde(default)]
    pub docroot: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub port: Option<Integer>,
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default)]
    pub tls: VhostTlsSection,

    #[serde(default, deserialize_with = "lenient")]
    pub http1: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub http2: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub http3: Option<bool>,
    #[serde(default)]
    pub http2_settings: Http2Section,
    #[serde(default)]
    pub webtransport_settings: WebTransportSection,

    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// Certificate material for one vhost.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VhostTlsSection {
    pub cert: Option<String>,
    pub key: Option<String>,
    pub ca_cert: Option<String>,
    /// Obtain a certificate automatically.
    #[serde(deserialize_with = "lenient")]
    pub auto_cert: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Http2Section {
    #[serde(deserialize_with = "lenient")]
    pub max_concurrent_streams: Option<Integer>,
    #[serde(deserialize_with = "lenient")]
    pub initial_window_size: Option<Integer>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WebTransportSection {
    #[serde(deserialize_with = "lenient")]
    pub max_webtransport_sessions: Option<Integer>,
    #[serde(deserialize_with = "lenient")]
    pub datagram_enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `debug`, `info`, `warn` or `error`.
    pub level: Option<String>,
    /// `json` or `text`.
    pub format: Option<String>,
    /// Log file path; stdout when unset.
    pub file: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub rotate: Option<bool>,
    pub max_size: Option<Bytes>,
    #[serde(deserialize_with = "lenient")]
    pub max_files: Option<Integer>,
    #[serde(deserialize_with = "lenient")]
    pub include_timestamp: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub include_request_id: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringSection {
    #[serde(deserialize_with = "lenient")]
    pub enabled: Option<bool>,
    /// Metrics endpoint path.
    pub endpoint: Option<String>,
    /// `prometheus` or `json`.
    pub format: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub include_runtime_stats: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub include_system_stats: Option<bool>,
    pub collection_interval: Option<Seconds>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    #[serde(deserialize_with = "lenient")]
    pub enabled: Option<bool>,
    /// `memory`, `redis` or `file`.
    pub backend: Option<String>,
    pub ttl: Option<Seconds>,
    pub max_size: Option<Bytes>,
    #[serde(deserialize_with = "lenient")]
    pub compress: Option<bool>,
    pub rules: CacheRulesSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheRulesSection {
    /// Glob patterns of cacheable paths.
    pub paths: Option<Vec<String>>,
    pub extensions: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub cache_dynamic: Option<bool>,
}

/// A scheduled script. Executed elsewhere; only declared here.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CronSection {
    /// Cron expression, e.g. `"0 0 * * *"`.
    pub schedule: String,
    pub script: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    /// `KEY=VALUE` entries.
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub timeout: Option<Seconds>,
    #[serde(default, deserialize_with = "lenient")]
    pub enabled: Option<bool>,
}

/// A plugin declaration. `config` is passed through untouched.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PluginSection {
    pub name: String,
    /// `.so`, `.dll` or `.wasm` path.
    pub path: String,
    #[serde(default, deserialize_with = "lenient")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub config: Value,
}

/// Accept either the native JSON type or its string form.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + FromStr,
    T::Err: Display,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid value '{s}': {e}"))),
        Some(other) => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document() {
        let raw = RawConfig::from_value(json!({})).unwrap();
        assert!(raw.vhosts.is_empty());
        assert_eq!(raw.limits, LimitsSection::default());
    }

    #[test]
    fn test_unset_is_distinct_from_zero() {
        let raw = RawConfig::from_value(json!({
            "limits": { "max_connections": 0 },
            "vhosts": [{ "name": "a.example" }]
        }))
        .unwrap();
        assert_eq!(raw.limits.max_connections, Some(0));
        assert_eq!(raw.vhosts[0].limits.max_connections, None);
    }

    #[test]
    fn test_interpolated_strings_decode_as_numbers_and_bools() {
        let raw = RawConfig::from_value(json!({
            "server": { "port": "8080", "enable_http2": "true" }
        }))
        .unwrap();
        assert_eq!(raw.server.port, Some(8080));
        assert_eq!(raw.server.enable_http2, Some(true));
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_types() {
        let err = RawConfig::from_value(json!({ "limits": { "max_conections": 5 } })).unwrap_err();
        assert!(err.to_string().contains("max_conections"));

        assert!(RawConfig::from_value(json!({ "server": { "port": "http" } })).is_err());
        assert!(RawConfig::from_value(json!({ "vhosts": [{ "docroot": "/srv" }] })).is_err());
    }

    #[test]
    fn test_out_of_range_integers_decode_for_validation() {
        let raw = RawConfig::from_value(json!({
            "server": { "port": 70000 },
            "limits": { "max_connections": -1 }
        }))
        .unwrap();
        assert_eq!(raw.server.port, Some(70000));
        assert_eq!(raw.limits.max_connections, Some(-1));
    }

    fn syntax_path(doc: Value) -> String {
        match RawConfig::from_value(doc).unwrap_err() {
            ConfigError::Syntax { path, .. } => path,
            other => panic!("expected Syntax, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_errors_name_the_field() {
        assert_eq!(
            syntax_path(json!({
                "vhosts": [
                    { "name": "a" },
                    { "name": "b", "limits": { "max_connections": "lots" } }
                ]
            })),
            "vhosts[1].limits.max_connections"
        );
        assert_eq!(syntax_path(json!({ "limits": { "max_conections": 5 } })), "limits.max_conections");
        assert_eq!(syntax_path(json!({ "server": { "enable_http2": "maybe" } })), "server.enable_http2");
        assert_eq!(syntax_path(json!({ "server": { "port": [80] } })), "server.port");
    }

    #[test]
    fn test_auth_type_and_plugin_payload() {
        let raw = RawConfig::from_value(json!({
            "security": { "auth": { "type": "jwt" } },
            "plugins": [{ "name": "gzip", "path": "/p/gzip.so", "config": { "level": 9, "any": ["thing"] } }]
        }))
        .unwrap();
        assert_eq!(raw.security.auth.auth_type.as_deref(), Some("jwt"));
        assert_eq!(raw.plugins[0].config["level"], 9);
    }
}
