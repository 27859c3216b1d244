//! Configuration document loading from disk.
//!
//! # Responsibilities
//! - Read the root document (JSON, or TOML by extension)
//! - Expand `includes` (paths or globs) recursively
//! - Merge included documents under the including one
//! - Guard against include cycles and runaway nesting
//!
//! # Design Decisions
//! - Include patterns are relative to the including file's directory
//! - Glob matches load in lexicographic order; an empty glob is not an error
//! - The including file's directory is escaped before it joins a glob, so
//!   only the pattern itself carries glob syntax
//! - A literal include that does not exist is an IO error
//! - Including document wins field-by-field over what it includes
//! - `vhosts`, `cron` and `plugins` concatenate instead of replacing
//! - Nothing partial is returned: any failure voids the whole document

use std::fs;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::config::error::{ConfigError, ConfigResult};

/// Maximum include nesting below the root document.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Maximum `includes` entries in a single document.
pub const MAX_INCLUDES: usize = 100;

/// Root-level lists that accumulate across includes.
const CONCATENATED_KEYS: [&str; 3] = ["vhosts", "cron", "plugins"];

/// On-disk syntax of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    /// Pick the format from a file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DocumentFormat::Toml,
            _ => DocumentFormat::Json,
        }
    }

    fn parse(self, content: &str, origin: &str) -> ConfigResult<Value> {
        let parsed: Value = match self {
            DocumentFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Syntax {
                path: origin.to_string(),
                message: e.to_string(),
            })?,
            DocumentFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Syntax {
                path: origin.to_string(),
                message: e.to_string(),
            })?,
        };
        if !parsed.is_object() {
            return Err(ConfigError::Syntax {
                path: origin.to_string(),
                message: "top-level value must be a mapping".to_string(),
            });
        }
        Ok(parsed)
    }
}

/// A fully include-merged document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Merged tree with `includes` removed.
    pub root: Value,
    /// Every file that contributed, in load order.
    pub sources: Vec<PathBuf>,
    /// Glob includes met while loading, matched or not.
    pub include_globs: Vec<IncludeGlob>,
}

/// A glob include entry, resolved against its including file.
///
/// Files created later under `root` that match `pattern` join the
/// configuration on the next load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeGlob {
    /// Deepest directory of the pattern without glob characters.
    pub root: PathBuf,
    /// Full-path glob with the base directory escaped.
    pub pattern: String,
    /// Directory levels below `root` a match can sit at; `None` for `**`.
    pub depth: Option<usize>,
}

impl IncludeGlob {
    fn new(base_dir: &Path, pattern: &str) -> Self {
        let absolute = Path::new(pattern).is_absolute();
        let mut root = if absolute { PathBuf::new() } else { base_dir.to_path_buf() };
        let mut remaining = 0usize;
        for component in Path::new(pattern).components() {
            let text = component.as_os_str().to_string_lossy();
            if remaining == 0 && !is_glob(&text) {
                root.push(component);
            } else {
                remaining += 1;
            }
        }

        let full = if absolute {
            pattern.to_string()
        } else {
            let base = globset::escape(&base_dir.to_string_lossy());
            format!("{}/{pattern}", base.trim_end_matches('/'))
        };
        Self {
            root,
            pattern: full,
            depth: (!pattern.contains("**")).then_some(remaining),
        }
    }

    /// Whether matches may sit deeper than `root`'s direct children.
    pub fn is_recursive(&self) -> bool {
        self.depth != Some(1)
    }

    /// Compile `pattern` the way include expansion matches it.
    pub fn matcher(&self) -> Result<GlobMatcher, globset::Error> {
        Ok(GlobBuilder::new(&self.pattern)
            .literal_separator(true)
            .build()?
            .compile_matcher())
    }
}

/// Load `path` and everything it includes.
pub fn load_document(path: &Path) -> ConfigResult<LoadedDocument> {
    let mut loader = DocumentLoader::default();
    let root = loader.load_file(path, 0)?;
    Ok(LoadedDocument {
        root,
        sources: loader.sources,
        include_globs: loader.include_globs,
    })
}

/// Load a document from memory. Includes resolve against `base_dir`.
pub fn load_document_str(
    content: &str,
    format: DocumentFormat,
    base_dir: &Path,
) -> ConfigResult<LoadedDocument> {
    let mut loader = DocumentLoader::default();
    let doc = format.parse(content, "<inline>")?;
    let root = loader.expand(doc, base_dir, "<inline>", 0)?;
    Ok(LoadedDocument {
        root,
        sources: loader.sources,
        include_globs: loader.include_globs,
    })
}

#[derive(Default)]
struct DocumentLoader {
    /// Canonical paths of the documents currently being expanded.
    chain: Vec<PathBuf>,
    sources: Vec<PathBuf>,
    include_globs: Vec<IncludeGlob>,
}

impl DocumentLoader {
    fn load_file(&mut self, path: &Path, depth: usize) -> ConfigResult<Value> {
        let canonical = path.canonicalize().map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if self.chain.contains(&canonical) {
            let mut chain = self.chain.clone();
            chain.push(canonical);
            return Err(ConfigError::IncludeCycle { chain });
        }
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ConfigError::IncludeDepthExceeded {
                path: canonical,
                max: MAX_INCLUDE_DEPTH,
            });
        }

        let content = fs::read_to_string(&canonical).map_err(|source| ConfigError::Io {
            path: canonical.clone(),
            source,
        })?;
        let origin = canonical.display().to_string();
        let doc = DocumentFormat::from_path(&canonical).parse(&content, &origin)?;
        tracing::debug!(path = %origin, depth, "Loaded config document");

        let base_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        self.chain.push(canonical.clone());
        let expanded = self.expand(doc, &base_dir, &origin, depth);
        self.chain.pop();

        if !self.sources.contains(&canonical) {
            self.sources.push(canonical);
        }
        expanded
    }

    /// Merge everything `doc` includes underneath it.
    fn expand(&mut self, mut doc: Value, base_dir: &Path, origin: &str, depth: usize) -> ConfigResult<Value> {
        let patterns = take_includes(&mut doc, origin)?;
        if patterns.is_empty() {
            return Ok(doc);
        }

        let mut merged = Value::Object(Map::new());
        for pattern in &patterns {
            for file in self.resolve_include(base_dir, pattern, origin)? {
                let included = self.load_file(&file, depth + 1)?;
                merge_documents(&mut merged, included);
            }
        }
        merge_documents(&mut merged, doc);
        Ok(merged)
    }

    /// Expand one include entry into the files it names, sorted.
    fn resolve_include(&mut self, base_dir: &Path, pattern: &str, origin: &str) -> ConfigResult<Vec<PathBuf>> {
        if !is_glob(pattern) {
            return Ok(vec![base_dir.join(pattern)]);
        }

        let glob = IncludeGlob::new(base_dir, pattern);
        let matcher = glob.matcher().map_err(|e| ConfigError::Syntax {
            path: format!("{origin}: includes"),
            message: format!("invalid include pattern '{pattern}': {e}"),
        })?;
        let matches = glob_matches(&glob, &matcher)?;
        if !self.include_globs.contains(&glob) {
            self.include_globs.push(glob);
        }
        Ok(matches)
    }
}

fn take_includes(doc: &mut Value, origin: &str) -> ConfigResult<Vec<String>> {
    let Some(raw) = doc.as_object_mut().and_then(|m| m.remove("includes")) else {
        return Ok(Vec::new());
    };
    let syntax = |message: &str| ConfigError::Syntax {
        path: format!("{origin}: includes"),
        message: message.to_string(),
    };

    let Value::Array(entries) = raw else {
        return Err(syntax("expected a list of paths"));
    };
    if entries.len() > MAX_INCLUDES {
        return Err(ConfigError::Capacity {
            field: format!("{origin}: includes"),
            len: entries.len(),
            max: MAX_INCLUDES,
        });
    }
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(s) => Ok(s),
            _ => Err(syntax("include entries must be strings")),
        })
        .collect()
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn glob_matches(glob: &IncludeGlob, matcher: &GlobMatcher) -> ConfigResult<Vec<PathBuf>> {
    if !glob.root.is_dir() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(&glob.root).follow_links(true);
    if let Some(depth) = glob.depth {
        walker = walker.max_depth(depth);
    }

    let mut matches = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: glob.root.clone(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && matcher.is_match(entry.path()) {
            matches.push(entry.into_path());
        }
    }
    matches.sort();
    Ok(matches)
}

/// Overlay `overlay` onto `base` at document root.
pub fn merge_documents(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let concat = CONCATENATED_KEYS.contains(&key.as_str());
                if let Some(base_val) = base_map.get_mut(&key) {
                    match (base_val, overlay_val) {
                        (Value::Array(existing), Value::Array(more)) if concat => existing.extend(more),
                        (base_val, overlay_val) => deep_merge(base_val, overlay_val),
                    }
                } else {
                    base_map.insert(key, overlay_val);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Recursively deep-merge `overlay` into `base`.
///
/// Mappings merge per key; scalars and sequences from the overlay replace.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                if let Some(base_val) = base_map.get_mut(&key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_map.insert(key, overlay_val);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_including_document_wins() {
        let dir = TempDir::new().unwrap();
        write(&dir, "base.json", r#"{"limits": {"max_connections": 10, "max_open_files": 64}}"#);
        let root = write(
            &dir,
            "main.json",
            r#"{"includes": ["base.json"], "limits": {"max_connections": 20}}"#,
        );

        let loaded = load_document(&root).unwrap();
        assert_eq!(loaded.root["limits"]["max_connections"], 20);
        assert_eq!(loaded.root["limits"]["max_open_files"], 64);
        assert!(loaded.root.get("includes").is_none());
        assert_eq!(loaded.sources.len(), 2);
    }

    #[test]
    fn test_glob_includes_load_in_lexicographic_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "conf.d/20-b.json", r#"{"timezone": "B", "vhosts": [{"name": "b"}]}"#);
        write(&dir, "conf.d/10-a.json", r#"{"timezone": "A", "vhosts": [{"name": "a"}]}"#);
        write(&dir, "conf.d/notes.txt", "ignored");
        let root = write(
            &dir,
            "main.json",
            r#"{"includes": ["conf.d/*.json"], "vhosts": [{"name": "main"}]}"#,
        );

        let loaded = load_document(&root).unwrap();
        // later include overrides earlier
        assert_eq!(loaded.root["timezone"], "B");
        let names: Vec<_> = loaded.root["vhosts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "main"]);
    }

    #[test]
    fn test_glob_syntax_in_base_directory_is_literal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "conf[prod]/sites/a.json", r#"{"vhosts": [{"name": "a"}]}"#);
        write(&dir, "conf{x}/sites/b.json", r#"{"vhosts": [{"name": "b"}]}"#);
        let root = write(&dir, "conf[prod]/main.json", r#"{"includes": ["sites/*.json"]}"#);

        let loaded = load_document(&root).unwrap();
        assert_eq!(loaded.root["vhosts"][0]["name"], "a");
        assert_eq!(loaded.sources.len(), 2);

        let glob = &loaded.include_globs[0];
        assert!(glob.root.ends_with("conf[prod]/sites"));
        assert_eq!(glob.depth, Some(1));
        assert!(glob.matcher().unwrap().is_match(glob.root.join("later.json")));
    }

    #[test]
    fn test_include_globs_are_recorded() {
        let dir = TempDir::new().unwrap();
        let root = write(
            &dir,
            "main.json",
            r#"{"includes": ["empty/*.json", "deep/**/*.toml", "empty/*.json"]}"#,
        );

        let loaded = load_document(&root).unwrap();
        let globs = &loaded.include_globs;
        assert_eq!(globs.len(), 2);
        assert!(!globs[0].is_recursive());
        assert!(globs[1].is_recursive());
        assert_eq!(globs[1].depth, None);
    }

    #[test]
    fn test_empty_glob_is_fine_missing_literal_is_not() {
        let dir = TempDir::new().unwrap();
        let root = write(&dir, "main.json", r#"{"includes": ["nothing/*.json"]}"#);
        assert!(load_document(&root).is_ok());

        let root = write(&dir, "main2.json", r#"{"includes": ["missing.json"]}"#);
        assert!(matches!(load_document(&root), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_cycle_detected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.json", r#"{"includes": ["a.json"]}"#);
        let a = write(&dir, "a.json", r#"{"includes": ["b.json"]}"#);

        match load_document(&a) {
            Err(ConfigError::IncludeCycle { chain }) => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let dir = TempDir::new().unwrap();
        write(&dir, "shared.json", r#"{"locale": "en_US"}"#);
        write(&dir, "left.json", r#"{"includes": ["shared.json"]}"#);
        write(&dir, "right.json", r#"{"includes": ["shared.json"]}"#);
        let root = write(&dir, "main.json", r#"{"includes": ["left.json", "right.json"]}"#);

        let loaded = load_document(&root).unwrap();
        assert_eq!(loaded.root["locale"], "en_US");
        assert_eq!(loaded.sources.len(), 4);
    }

    #[test]
    fn test_depth_limit() {
        let dir = TempDir::new().unwrap();
        for i in 0..=MAX_INCLUDE_DEPTH {
            write(&dir, &format!("d{i}.json"), &format!(r#"{{"includes": ["d{}.json"]}}"#, i + 1));
        }
        write(&dir, &format!("d{}.json", MAX_INCLUDE_DEPTH + 1), "{}");

        let err = load_document(&dir.path().join("d0.json")).unwrap_err();
        assert!(matches!(err, ConfigError::IncludeDepthExceeded { max, .. } if max == MAX_INCLUDE_DEPTH));
    }

    #[test]
    fn test_toml_documents() {
        let dir = TempDir::new().unwrap();
        write(&dir, "extra.toml", "[server]\nport = 9000\n");
        let root = write(&dir, "main.json", r#"{"includes": ["extra.toml"]}"#);
        let loaded = load_document(&root).unwrap();
        assert_eq!(loaded.root["server"]["port"], 9000);
    }

    #[test]
    fn test_malformed_document() {
        let dir = TempDir::new().unwrap();
        let root = write(&dir, "bad.json", r#"{"server": "#);
        assert!(matches!(load_document(&root), Err(ConfigError::Syntax { .. })));

        let root = write(&dir, "list.json", "[1, 2]");
        assert!(matches!(load_document(&root), Err(ConfigError::Syntax { .. })));
    }

    #[test]
    fn test_include_capacity() {
        let dir = TempDir::new().unwrap();
        let includes: Vec<String> = (0..=MAX_INCLUDES).map(|i| format!("x{i}/*.json")).collect();
        let body = json!({ "includes": includes }).to_string();
        let root = write(&dir, "main.json", &body);
        assert!(matches!(load_document(&root), Err(ConfigError::Capacity { .. })));
    }

    #[test]
    fn test_inline_content_resolves_includes_against_base_dir() {
        let dir = TempDir::new().unwrap();
        write(&dir, "base.json", r#"{"debug_mode": true}"#);
        let loaded =
            load_document_str(r#"{"includes": ["base.json"]}"#, DocumentFormat::Json, dir.path()).unwrap();
        assert_eq!(loaded.root["debug_mode"], true);
    }

    #[test]
    fn test_merge_documents_concatenates_entity_lists_only() {
        let mut base = json!({"vhosts": [{"name": "a"}], "security": {"fs_read": ["/a"]}});
        merge_documents(&mut base, json!({"vhosts": [{"name": "b"}], "security": {"fs_read": ["/b"]}}));
        assert_eq!(base["vhosts"].as_array().unwrap().len(), 2);
        assert_eq!(base["security"]["fs_read"], json!(["/b"]));
    }
}
