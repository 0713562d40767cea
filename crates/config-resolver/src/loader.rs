//! Turns YAML/JSON text, or files on disk, into provider dictionaries ready for
//! [`crate::database::ConfigDatabase::add_provider`].

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::{
    eager::CONFIG_PATH_KEY,
    error::ConfigError,
    flatten,
    value::Value,
};

/// A source format a provider can be parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

/// Parses `contents` as `format`, flattens the result, and stamps `_config_path` with `path`'s
/// parent directory.
pub fn load_from_str(
    contents: &str,
    format: Format,
    path: &Path,
) -> Result<IndexMap<String, Value>, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(IndexMap::new());
    }

    let nested: IndexMap<String, Value> = match format {
        Format::Yaml => {
            let parsed: serde_yaml::Value = serde_yaml::from_str(contents)
                .map_err(|err| ConfigError::new(crate::error::ConfigErrorKind::Io, format!("invalid YAML in `{}`: {err}", path.display())))?;
            object_entries(Value::from(parsed), path)?
        }
        Format::Json => {
            let parsed: serde_json::Value = serde_json::from_str(contents)
                .map_err(|err| ConfigError::new(crate::error::ConfigErrorKind::Io, format!("invalid JSON in `{}`: {err}", path.display())))?;
            object_entries(Value::from(parsed), path)?
        }
    };

    let mut flat = flatten::flatten(&nested);
    let config_path = path
        .parent()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();
    flat.insert(CONFIG_PATH_KEY.to_owned(), Value::String(config_path));
    Ok(flat)
}

fn object_entries(value: Value, path: &Path) -> Result<IndexMap<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(IndexMap::new()),
        _ => Err(ConfigError::new(
            crate::error::ConfigErrorKind::Io,
            format!("`{}` must contain a mapping at its top level", path.display()),
        )),
    }
}

fn format_for_extension(path: &Path) -> Option<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml" | "yaml") => Some(Format::Yaml),
        Some("json") => Some(Format::Json),
        _ => None,
    }
}

/// Loads a single file, dispatching on its extension.
///
/// A missing file yields an empty provider unless `strict` is set, in which case it's an *io*
/// error. An empty file always yields an empty provider.
pub fn load_from_file(path: &Path, strict: bool) -> Result<IndexMap<String, Value>, ConfigError> {
    let format = format_for_extension(path).ok_or_else(|| {
        ConfigError::new(
            crate::error::ConfigErrorKind::Io,
            format!("`{}` has an unrecognized extension; expected .yml/.yaml/.json", path.display()),
        )
    })?;

    match std::fs::read_to_string(path) {
        Ok(contents) => load_from_str(&contents, format, path),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !strict => Ok(IndexMap::new()),
        Err(err) => Err(ConfigError::io(format!("failed to read `{}`", path.display()), err)),
    }
}

/// Loads every path in `paths`, sorted so `.json` files are applied after `.yml`/`.yaml` ones
/// (JSON conventionally carries the most specific overrides in this system).
pub fn load_from_paths(paths: &[PathBuf], strict: bool) -> Result<Vec<IndexMap<String, Value>>, ConfigError> {
    let mut ordered: Vec<&PathBuf> = paths.iter().collect();
    ordered.sort_by_key(|path| matches!(format_for_extension(path), Some(Format::Json)));

    ordered.into_iter().map(|path| load_from_file(path, strict)).collect()
}

/// Loads `<dir>/defaults.yml` followed by `<dir>/defaults.json`, the conventional pair of default
/// providers for a directory-based configuration tree. Neither file is required to exist unless
/// `strict` is set.
pub fn load_from_defaults(dir: &Path, strict: bool) -> Result<Vec<IndexMap<String, Value>>, ConfigError> {
    load_from_paths(&[dir.join("defaults.yml"), dir.join("defaults.json")], strict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_and_stamps_config_path() {
        let provider = load_from_str("a:\n  b: 1\n", Format::Yaml, Path::new("/tmp/cfg/defaults.yml")).unwrap();
        assert_eq!(provider["a.b"], Value::Int(1));
        assert_eq!(provider[CONFIG_PATH_KEY], Value::String("/tmp/cfg".into()));
    }

    #[test]
    fn loads_json() {
        let provider = load_from_str(r#"{"a": {"b": 2}}"#, Format::Json, Path::new("/x/defaults.json")).unwrap();
        assert_eq!(provider["a.b"], Value::Int(2));
    }

    #[test]
    fn empty_contents_yield_empty_provider() {
        let provider = load_from_str("", Format::Yaml, Path::new("/x/defaults.yml")).unwrap();
        assert!(provider.is_empty());
    }

    #[test]
    fn missing_file_is_empty_unless_strict() {
        let path = Path::new("/nonexistent/defaults.yml");
        assert!(load_from_file(path, false).unwrap().is_empty());
        assert!(load_from_file(path, true).is_err());
    }

    #[test]
    fn paths_sort_json_after_yaml() {
        let dir = std::env::temp_dir().join(format!("config-resolver-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.json"), r#"{"x": 2}"#).unwrap();
        std::fs::write(dir.join("a.yml"), "x: 1\n").unwrap();

        let providers = load_from_paths(&[dir.join("b.json"), dir.join("a.yml")], false).unwrap();
        assert_eq!(providers[0]["x"], Value::Int(1));
        assert_eq!(providers[1]["x"], Value::Int(2));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
