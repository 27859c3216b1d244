//! Environment variable interpolation.
//!
//! # Responsibilities
//! - Replace `${NAME}` and `${NAME:-default}` tokens in every string value
//! - Report unresolved variables with the field path that referenced them
//!
//! # Design Decisions
//! - Substring replacement: a value may hold several tokens plus literal text
//! - `:-default` applies when the variable is unset or empty
//! - `$${` is an escaped literal `${`
//! - Substituted text is never re-scanned
//! - Object keys are left alone
//! - The environment is injected through [`EnvSource`] so the pass stays pure

use std::collections::HashMap;

use serde_json::Value;

use crate::config::error::ConfigError;

/// Where variable values come from.
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Interpolate every string in `doc` in place.
pub fn interpolate_document(doc: &mut Value, env: &dyn EnvSource) -> Result<(), ConfigError> {
    walk(doc, "", env)
}

fn walk(value: &mut Value, path: &str, env: &dyn EnvSource) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate_str(s, path, env)?;
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                walk(item, &format!("{path}[{i}]"), env)?;
            }
        }
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(child, &child_path, env)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Interpolate a single string. `field` is only used for error reporting.
pub fn interpolate_str(input: &str, field: &str, env: &dyn EnvSource) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("$${") {
            out.push_str("${");
            rest = after;
            continue;
        }

        let Some(body_start) = tail.strip_prefix("${") else {
            out.push('$');
            rest = &tail[1..];
            continue;
        };

        let end = body_start.find('}').ok_or_else(|| ConfigError::Syntax {
            path: field.to_string(),
            message: format!("unterminated interpolation token in '{input}'"),
        })?;
        let body = &body_start[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        if !is_valid_name(name) {
            return Err(ConfigError::Syntax {
                path: field.to_string(),
                message: format!("invalid variable name '{name}' in '{input}'"),
            });
        }

        let resolved = match (env.var(name), default) {
            (Some(v), Some(d)) if v.is_empty() => d.to_string(),
            (Some(v), _) => v,
            (None, Some(d)) => d.to_string(),
            (None, None) => {
                return Err(ConfigError::Reference {
                    field: field.to_string(),
                    variable: name.to_string(),
                })
            }
        };
        out.push_str(&resolved);
        rest = &body_start[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_used_when_unset() {
        let out = interpolate_str("${PORT:-8080}", "server.port", &env(&[])).unwrap();
        assert_eq!(out, "8080");
    }

    #[test]
    fn test_default_used_when_empty() {
        let out = interpolate_str("${PORT:-8080}", "server.port", &env(&[("PORT", "")])).unwrap();
        assert_eq!(out, "8080");
    }

    #[test]
    fn test_missing_variable_names_field_and_variable() {
        let err = interpolate_str("Bearer ${API_KEY}", "security.auth.realm", &env(&[])).unwrap_err();
        match err {
            ConfigError::Reference { field, variable } => {
                assert_eq!(field, "security.auth.realm");
                assert_eq!(variable, "API_KEY");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_multiple_tokens_and_literals() {
        let e = env(&[("HOST", "db"), ("PORT", "5432")]);
        let out = interpolate_str("tcp://${HOST}:${PORT}/x", "f", &e).unwrap();
        assert_eq!(out, "tcp://db:5432/x");
    }

    #[test]
    fn test_escape_and_lone_dollar() {
        let out = interpolate_str("cost $5 and $${LITERAL}", "f", &env(&[])).unwrap();
        assert_eq!(out, "cost $5 and ${LITERAL}");
    }

    #[test]
    fn test_substitution_is_not_rescanned() {
        let e = env(&[("A", "${B}")]);
        assert_eq!(interpolate_str("${A}", "f", &e).unwrap(), "${B}");
    }

    #[test]
    fn test_unterminated_token_is_syntax_error() {
        let err = interpolate_str("${OOPS", "logging.file", &env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { ref path, .. } if path == "logging.file"));
    }

    #[test]
    fn test_document_paths_include_indices() {
        let mut doc = json!({
            "limits": { "max_memory": "${MAX_MEM:-2GB}" },
            "vhosts": [ { "name": "a" }, { "docroot": "${DOCROOT}" } ]
        });
        let err = interpolate_document(&mut doc, &env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Reference { ref field, .. } if field == "vhosts[1].docroot"));

        let mut doc = json!({ "limits": { "max_memory": "${MAX_MEM:-2GB}" } });
        interpolate_document(&mut doc, &env(&[])).unwrap();
        assert_eq!(doc["limits"]["max_memory"], "2GB");
    }
}
