//! Human-readable quantity parsing.
//!
//! # Responsibilities
//! - Parse sizes (`"512MB"`), durations (`"1.5h"`) and rates (`"10MB/s"`)
//! - Normalize to canonical units: bytes, seconds, bytes per second
//!
//! # Design Decisions
//! - Size multipliers are binary (1 KB = 1024 B)
//! - Durations are float seconds, truncated to millisecond precision
//! - Sizes and rates are whole numbers; fractional bytes are truncated
//! - A bare number is taken to already be in canonical units
//! - Pure: no environment or locale dependency
//! - [`normalize_document`] rewrites quantity fields in place, after
//!   interpolation and before typed decoding

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::error::ConfigError;

const KIB: f64 = 1024.0;

/// The unit class a field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    Bytes,
    Seconds,
    BytesPerSecond,
}

impl fmt::Display for UnitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitClass::Bytes => write!(f, "size"),
            UnitClass::Seconds => write!(f, "duration"),
            UnitClass::BytesPerSecond => write!(f, "rate"),
        }
    }
}

/// A parsed quantity in canonical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Quantity {
    Bytes(u64),
    Seconds(f64),
    BytesPerSecond(u64),
}

impl Quantity {
    pub fn unit_class(&self) -> UnitClass {
        match self {
            Quantity::Bytes(_) => UnitClass::Bytes,
            Quantity::Seconds(_) => UnitClass::Seconds,
            Quantity::BytesPerSecond(_) => UnitClass::BytesPerSecond,
        }
    }

    /// Canonical value as a JSON number.
    pub fn to_json(&self) -> serde_json::Value {
        match *self {
            Quantity::Bytes(b) | Quantity::BytesPerSecond(b) => serde_json::Value::from(b),
            Quantity::Seconds(s) => serde_json::Value::from(s),
        }
    }
}

/// Why a quantity string was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {class} '{input}': {reason}")]
pub struct QuantityError {
    pub input: String,
    pub class: UnitClass,
    pub reason: QuantityErrorReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityErrorReason {
    #[error("malformed number")]
    Malformed,
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("negative magnitude")]
    Negative,
    #[error("value out of range")]
    Overflow,
}

/// Parse `input` as a quantity of the given class.
pub fn parse(input: &str, class: UnitClass) -> Result<Quantity, QuantityError> {
    match class {
        UnitClass::Bytes => parse_size(input).map(Quantity::Bytes),
        UnitClass::Seconds => parse_duration(input).map(Quantity::Seconds),
        UnitClass::BytesPerSecond => parse_rate(input).map(Quantity::BytesPerSecond),
    }
}

/// Parse a size string into bytes.
pub fn parse_size(input: &str) -> Result<u64, QuantityError> {
    let fail = |reason| error(input, UnitClass::Bytes, reason);
    let (magnitude, unit) = split_magnitude(input).map_err(fail)?;
    let multiplier = size_multiplier(unit)
        .ok_or_else(|| fail(QuantityErrorReason::UnknownUnit(unit.to_string())))?;
    to_whole(magnitude * multiplier).map_err(fail)
}

/// Parse a duration string into seconds.
pub fn parse_duration(input: &str) -> Result<f64, QuantityError> {
    let fail = |reason| error(input, UnitClass::Seconds, reason);
    let (magnitude, unit) = split_magnitude(input).map_err(fail)?;
    let seconds_per_unit = duration_multiplier(unit)
        .ok_or_else(|| fail(QuantityErrorReason::UnknownUnit(unit.to_string())))?;
    let millis = (magnitude * seconds_per_unit * 1000.0).trunc();
    if !millis.is_finite() {
        return Err(fail(QuantityErrorReason::Overflow));
    }
    Ok(millis / 1000.0)
}

/// Parse a rate string into bytes per second.
///
/// Accepts `<size>/<duration-unit>` (`"10MB/s"`) and bit-rate shorthand
/// (`"100Mbps"`, binary multipliers).
pub fn parse_rate(input: &str) -> Result<u64, QuantityError> {
    let fail = |reason| error(input, UnitClass::BytesPerSecond, reason);
    let (magnitude, unit) = split_magnitude(input).map_err(fail)?;

    if let Some((size_unit, per)) = unit.split_once('/') {
        let bytes = size_multiplier(size_unit.trim_end())
            .ok_or_else(|| fail(QuantityErrorReason::UnknownUnit(size_unit.to_string())))?;
        let seconds = duration_multiplier(per.trim_start())
            .ok_or_else(|| fail(QuantityErrorReason::UnknownUnit(per.to_string())))?;
        return to_whole(magnitude * bytes / seconds).map_err(fail);
    }

    if unit.is_empty() {
        return to_whole(magnitude).map_err(fail);
    }

    let bits = bit_rate_multiplier(unit)
        .ok_or_else(|| fail(QuantityErrorReason::UnknownUnit(unit.to_string())))?;
    to_whole(magnitude * bits / 8.0).map_err(fail)
}

/// Quantity leaves of a limits/security/runtime scope (global or vhost).
const SCOPE_FIELDS: &[(&str, UnitClass)] = &[
    ("limits.max_memory", UnitClass::Bytes),
    ("limits.max_heap", UnitClass::Bytes),
    ("limits.max_stack_size", UnitClass::Bytes),
    ("limits.max_file_size", UnitClass::Bytes),
    ("limits.max_bandwidth", UnitClass::BytesPerSecond),
    ("limits.max_upload_rate", UnitClass::BytesPerSecond),
    ("limits.max_download_rate", UnitClass::BytesPerSecond),
    ("limits.request_timeout", UnitClass::Seconds),
    ("limits.idle_timeout", UnitClass::Seconds),
    ("limits.startup_timeout", UnitClass::Seconds),
    ("security.cors.max_age", UnitClass::Seconds),
    ("runtime.timeout", UnitClass::Seconds),
];

/// Quantity leaves that only exist at document root.
const ROOT_FIELDS: &[(&str, UnitClass)] = &[
    ("logging.max_size", UnitClass::Bytes),
    ("monitoring.collection_interval", UnitClass::Seconds),
    ("cache.ttl", UnitClass::Seconds),
    ("cache.max_size", UnitClass::Bytes),
];

const CRON_FIELDS: &[(&str, UnitClass)] = &[("timeout", UnitClass::Seconds)];

/// Replace every quantity field of `doc` with its canonical number.
///
/// Strings are parsed; numbers are checked and re-canonicalized. Other
/// shapes are left for the typed decoder to reject.
pub fn normalize_document(doc: &mut Value) -> Result<(), ConfigError> {
    normalize_fields(doc, "", SCOPE_FIELDS)?;
    normalize_fields(doc, "", ROOT_FIELDS)?;

    if let Some(Value::Array(vhosts)) = doc.get_mut("vhosts") {
        for (i, vhost) in vhosts.iter_mut().enumerate() {
            normalize_fields(vhost, &format!("vhosts[{i}]."), SCOPE_FIELDS)?;
        }
    }
    if let Some(Value::Array(jobs)) = doc.get_mut("cron") {
        for (i, job) in jobs.iter_mut().enumerate() {
            normalize_fields(job, &format!("cron[{i}]."), CRON_FIELDS)?;
        }
    }
    Ok(())
}

fn normalize_fields(scope: &mut Value, prefix: &str, fields: &[(&str, UnitClass)]) -> Result<(), ConfigError> {
    for (path, class) in fields {
        let Some(slot) = lookup_mut(scope, path) else {
            continue;
        };
        let text = match slot {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        let quantity = parse(&text, *class).map_err(|source| ConfigError::QuantityParse {
            field: format!("{prefix}{path}"),
            source,
        })?;
        *slot = quantity.to_json();
    }
    Ok(())
}

fn lookup_mut<'a>(value: &'a mut Value, dotted: &str) -> Option<&'a mut Value> {
    dotted
        .split('.')
        .try_fold(value, |node, key| node.as_object_mut()?.get_mut(key))
}

fn error(input: &str, class: UnitClass, reason: QuantityErrorReason) -> QuantityError {
    QuantityError {
        input: input.to_string(),
        class,
        reason,
    }
}

/// Split `" 1.5 GB "` into `(1.5, "GB")`.
fn split_magnitude(input: &str) -> Result<(f64, &str), QuantityErrorReason> {
    let s = input.trim();
    if s.starts_with('-') {
        return Err(QuantityErrorReason::Negative);
    }
    let digits = s.strip_prefix('+').unwrap_or(s);
    let end = digits
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(digits.len());
    let (number, unit) = digits.split_at(end);

    // Reject "", ".", "1.2.3" and anything `f64::from_str` would read as inf/nan.
    if number.is_empty() || number == "." || number.matches('.').count() > 1 {
        return Err(QuantityErrorReason::Malformed);
    }
    let magnitude: f64 = number.parse().map_err(|_| QuantityErrorReason::Malformed)?;
    Ok((magnitude, unit.trim_start()))
}

fn size_multiplier(unit: &str) -> Option<f64> {
    let exp = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "KB" => 1,
        "MB" => 2,
        "GB" => 3,
        "TB" => 4,
        _ => return None,
    };
    Some(KIB.powi(exp))
}

fn duration_multiplier(unit: &str) -> Option<f64> {
    Some(match unit {
        "" | "s" => 1.0,
        "ms" => 0.001,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86_400.0,
        _ => return None,
    })
}

fn bit_rate_multiplier(unit: &str) -> Option<f64> {
    let exp = match unit.to_ascii_lowercase().as_str() {
        "bps" => 0,
        "kbps" => 1,
        "mbps" => 2,
        "gbps" => 3,
        "tbps" => 4,
        _ => return None,
    };
    Some(KIB.powi(exp))
}

fn to_whole(value: f64) -> Result<u64, QuantityErrorReason> {
    if !value.is_finite() || value >= u64::MAX as f64 {
        return Err(QuantityErrorReason::Overflow);
    }
    Ok(value.trunc() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_are_binary() {
        assert_eq!(parse_size("2GB").unwrap(), 2_147_483_648);
        assert_eq!(parse_size("512MB").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_size("1.5GB").unwrap(), 1_610_612_736);
        assert_eq!(parse_size("1kb").unwrap(), 1024);
        assert_eq!(parse_size("10 MB").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("1TB").unwrap(), 1u64 << 40);
    }

    #[test]
    fn test_durations_in_seconds() {
        assert_eq!(parse_duration("1.5h").unwrap(), 5400.0);
        assert_eq!(parse_duration("30m").unwrap(), 1800.0);
        assert_eq!(parse_duration("250ms").unwrap(), 0.25);
        assert_eq!(parse_duration("2d").unwrap(), 172_800.0);
        assert_eq!(parse_duration("45").unwrap(), 45.0);
        // sub-millisecond precision is dropped
        assert_eq!(parse_duration("1.0005s").unwrap(), 1.0);
    }

    #[test]
    fn test_rates() {
        assert_eq!(parse_rate("10MB/s").unwrap(), 10_485_760);
        assert_eq!(parse_rate("60MB/m").unwrap(), 1_048_576);
        assert_eq!(parse_rate("1Gbps").unwrap(), 134_217_728);
        assert_eq!(parse_rate("8bps").unwrap(), 1);
    }

    #[test]
    fn test_unknown_unit_cites_input() {
        let err = parse_size("2XB").unwrap_err();
        assert_eq!(err.input, "2XB");
        assert_eq!(err.reason, QuantityErrorReason::UnknownUnit("XB".into()));
        assert!(err.to_string().contains("2XB"));

        let err = parse_rate("10MB/week").unwrap_err();
        assert!(matches!(err.reason, QuantityErrorReason::UnknownUnit(_)));
    }

    #[test]
    fn test_malformed_and_negative() {
        assert_eq!(parse_size("-5MB").unwrap_err().reason, QuantityErrorReason::Negative);
        assert_eq!(parse_duration("").unwrap_err().reason, QuantityErrorReason::Malformed);
        assert_eq!(parse_duration("h").unwrap_err().reason, QuantityErrorReason::Malformed);
        assert_eq!(parse_size("1.2.3MB").unwrap_err().reason, QuantityErrorReason::Malformed);
        assert_eq!(parse_size("infGB").unwrap_err().reason, QuantityErrorReason::Malformed);
    }

    #[test]
    fn test_parse_dispatches_on_class() {
        assert_eq!(parse("1KB", UnitClass::Bytes).unwrap(), Quantity::Bytes(1024));
        assert_eq!(parse("2s", UnitClass::Seconds).unwrap(), Quantity::Seconds(2.0));
        assert_eq!(
            parse("1KB/s", UnitClass::BytesPerSecond).unwrap(),
            Quantity::BytesPerSecond(1024)
        );
        assert!(parse("1KB", UnitClass::Seconds).is_err());
    }
    #[test]
    fn test_normalize_document_rewrites_quantities() {
        let mut doc = serde_json::json!({
            "limits": { "max_memory": "2GB", "request_timeout": 30, "max_connections": 5 },
            "security": { "cors": { "max_age": "1h" } },
            "vhosts": [ { "name": "a", "limits": { "max_upload_rate": "10MB/s" } } ],
            "cron": [ { "schedule": "* * * * *", "script": "x.js", "timeout": "5m" } ],
            "cache": { "ttl": "30m" }
        });
        normalize_document(&mut doc).unwrap();
        assert_eq!(doc["limits"]["max_memory"], 2_147_483_648u64);
        assert_eq!(doc["limits"]["request_timeout"], 30.0);
        assert_eq!(doc["limits"]["max_connections"], 5);
        assert_eq!(doc["security"]["cors"]["max_age"], 3600.0);
        assert_eq!(doc["vhosts"][0]["limits"]["max_upload_rate"], 10_485_760u64);
        assert_eq!(doc["cron"][0]["timeout"], 300.0);
        assert_eq!(doc["cache"]["ttl"], 1800.0);
    }

    #[test]
    fn test_normalize_document_reports_field_path() {
        let mut doc = serde_json::json!({ "vhosts": [ {}, { "limits": { "max_memory": "2XB" } } ] });
        match normalize_document(&mut doc).unwrap_err() {
            ConfigError::QuantityParse { field, source } => {
                assert_eq!(field, "vhosts[1].limits.max_memory");
                assert_eq!(source.input, "2XB");
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut doc = serde_json::json!({ "limits": { "idle_timeout": -1 } });
        assert!(matches!(
            normalize_document(&mut doc),
            Err(ConfigError::QuantityParse { source: QuantityError { reason: QuantityErrorReason::Negative, .. }, .. })
        ));
    }
}
