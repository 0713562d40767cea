//! The layered configuration database: ordered providers, resolved and cached on demand.

use indexmap::IndexMap;
use tracing::instrument;

use crate::{
    eager, flatten,
    error::{ConfigError, ConfigErrorKind},
    scheduler,
    value::Value,
};

/// The seven layers a [`ConfigDatabase`] folds, in increasing precedence order.
///
/// A later layer's settings and directives override an earlier layer's, mirroring how a design
/// flow driver assembles configuration: tool defaults, then per-tool and per-technology overlays,
/// then whatever the environment, the project, and finally a single run contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Builtins,
    Core,
    Tools,
    Technology,
    Environment,
    Project,
    Runtime,
}

const LAYER_ORDER: [Layer; 7] = [
    Layer::Builtins,
    Layer::Core,
    Layer::Tools,
    Layer::Technology,
    Layer::Environment,
    Layer::Project,
    Layer::Runtime,
];

/// A layered, meta-directive-driven configuration database.
///
/// Each layer accumulates zero or more flattened providers (see [`crate::flatten`]). Calling
/// [`ConfigDatabase::resolve`] eagerly folds every provider in layer order, then schedules any
/// `lazy*` directives left over; the result is cached until a layer is mutated again.
#[derive(Debug, Default)]
pub struct ConfigDatabase {
    layers: IndexMap<Layer, Vec<IndexMap<String, Value>>>,
    cache: Option<IndexMap<String, Value>>,
}

impl ConfigDatabase {
    /// Creates an empty database with all seven layers present but unpopulated.
    pub fn new() -> Self {
        let layers = LAYER_ORDER.into_iter().map(|layer| (layer, Vec::new())).collect();
        Self { layers, cache: None }
    }

    /// Appends a provider (already flattened, as [`flatten::flatten`] would produce it) to `layer`.
    ///
    /// Invalidates the resolved-configuration cache.
    pub fn add_provider(&mut self, layer: Layer, provider: IndexMap<String, Value>) {
        self.layers.entry(layer).or_default().push(provider);
        self.cache = None;
    }

    /// Convenience for [`add_provider`](Self::add_provider) with a nested (unflattened) mapping.
    pub fn add_nested_provider(&mut self, layer: Layer, provider: &IndexMap<String, Value>) {
        self.add_provider(layer, flatten::flatten(provider));
    }

    /// Removes every provider previously added to `layer`.
    pub fn clear_layer(&mut self, layer: Layer) {
        self.layers.entry(layer).or_default().clear();
        self.cache = None;
    }

    /// Replaces the entire contents of `layer` with `providers`, wholesale.
    fn replace_layer(&mut self, layer: Layer, providers: Vec<IndexMap<String, Value>>) {
        self.layers.insert(layer, providers);
        self.cache = None;
    }

    /// Replaces the builtins layer with `providers`.
    pub fn update_builtins(&mut self, providers: Vec<IndexMap<String, Value>>) {
        self.replace_layer(Layer::Builtins, providers);
    }

    /// Replaces the core layer with `providers`.
    pub fn update_core(&mut self, providers: Vec<IndexMap<String, Value>>) {
        self.replace_layer(Layer::Core, providers);
    }

    /// Replaces the tools layer with `providers`.
    pub fn update_tools(&mut self, providers: Vec<IndexMap<String, Value>>) {
        self.replace_layer(Layer::Tools, providers);
    }

    /// Replaces the technology layer with `providers`.
    pub fn update_technology(&mut self, providers: Vec<IndexMap<String, Value>>) {
        self.replace_layer(Layer::Technology, providers);
    }

    /// Replaces the environment layer with `providers`.
    pub fn update_environment(&mut self, providers: Vec<IndexMap<String, Value>>) {
        self.replace_layer(Layer::Environment, providers);
    }

    /// Replaces the project layer with `providers`.
    pub fn update_project(&mut self, providers: Vec<IndexMap<String, Value>>) {
        self.replace_layer(Layer::Project, providers);
    }

    /// Writes `key := value` into the single runtime dictionary, the highest-precedence layer.
    ///
    /// Unlike the other six layers, runtime is always a single provider: repeated calls merge
    /// into the same dictionary rather than accumulating a new one each time.
    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let runtime = self.layers.entry(Layer::Runtime).or_default();
        if runtime.is_empty() {
            runtime.push(IndexMap::new());
        }
        runtime[0].insert(key.into(), value.into());
        self.cache = None;
    }

    /// Resolves (if necessary) and returns the setting at `key`.
    pub fn get_setting(&mut self, key: &str) -> Result<&Value, ConfigError> {
        self.resolve()?;
        self.cache
            .as_ref()
            .and_then(|resolved| resolved.get(key))
            .ok_or_else(|| {
                ConfigError::new(ConfigErrorKind::MissingKey, format!("no setting named `{key}`"))
                    .with_key(key.to_owned())
            })
    }

    /// Like [`get_setting`](Self::get_setting), but substitutes `null_sentinel` for an explicit
    /// `null` value instead of handing the caller a literal `Value::Null`.
    pub fn get_setting_or(&mut self, key: &str, null_sentinel: Value) -> Result<Value, ConfigError> {
        let value = self.get_setting(key)?;
        Ok(if matches!(value, Value::Null) { null_sentinel } else { value.clone() })
    }

    /// Resolves (if necessary) and reports whether `key` is present.
    pub fn has_setting(&mut self, key: &str) -> Result<bool, ConfigError> {
        self.resolve()?;
        Ok(self.cache.as_ref().is_some_and(|resolved| resolved.contains_key(key)))
    }

    /// Resolves the full, flattened configuration, using the cached result if no layer has
    /// changed since the last call.
    #[instrument(level = "debug", skip(self))]
    pub fn resolve(&mut self) -> Result<&IndexMap<String, Value>, ConfigError> {
        if self.cache.is_none() {
            let mut working = IndexMap::new();
            for layer in LAYER_ORDER {
                for provider in self.layers.entry(layer).or_default().iter() {
                    working = eager::fold(&working, provider)?;
                }
            }
            working = scheduler::schedule(working)?;
            tracing::debug!(settings = working.len(), "resolved configuration database");
            self.cache = Some(working);
        }
        Ok(self.cache.as_ref().expect("just populated"))
    }

    /// Resolves and returns the configuration as a flat JSON value (dotted keys, no nesting), for
    /// callers that want to keep working with a `serde_json::Value` rather than a formatted
    /// string.
    ///
    /// Deliberately does not round-trip through [`flatten::unflatten`]: that helper is for test
    /// and debug use only (a resolved map legally containing both `a` and `a.b` would make
    /// unflattening ambiguous), and external consumers key into the resolved config with the same
    /// dotted strings providers use, not a nested tree.
    pub fn dump_json_value(&mut self) -> Result<serde_json::Value, ConfigError> {
        let resolved = self.resolve()?;
        Ok(serde_json::Value::Object(
            resolved.iter().map(|(k, v)| (k.clone(), serde_json::Value::from(v))).collect(),
        ))
    }

    /// Resolves and returns a stable, sorted, four-space-indented JSON dump of the configuration,
    /// for consumption by external tools (mirrors the source's
    /// `json.dumps(sort_keys=True, indent=4, separators=(',', ': '))`).
    pub fn dump_json(&mut self) -> Result<String, ConfigError> {
        let json = self.dump_json_value()?;
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        serde::Serialize::serialize(&json, &mut serializer).expect("serializing a JSON value cannot fail");
        Ok(String::from_utf8(buffer).expect("serde_json always emits valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn provider(entries: impl IntoIterator<Item = (&'static str, Value)>) -> IndexMap<String, Value> {
        entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let mut db = ConfigDatabase::new();
        db.add_provider(Layer::Builtins, provider([("threads", Value::Int(1))]));
        db.add_provider(Layer::Project, provider([("threads", Value::Int(8))]));
        assert_eq!(*db.get_setting("threads").unwrap(), Value::Int(8));
    }

    #[test]
    fn missing_key_is_an_error() {
        let mut db = ConfigDatabase::new();
        let err = db.get_setting("nope").unwrap_err();
        assert_matches!(err.kind(), ConfigErrorKind::MissingKey);
    }

    #[test]
    fn cache_is_invalidated_by_mutation() {
        let mut db = ConfigDatabase::new();
        db.add_provider(Layer::Builtins, provider([("a", Value::Int(1))]));
        assert_eq!(*db.get_setting("a").unwrap(), Value::Int(1));
        db.set_setting("a", 2);
        assert_eq!(*db.get_setting("a").unwrap(), Value::Int(2));
    }

    #[test]
    fn resolves_lazy_directives_across_layers() {
        let mut db = ConfigDatabase::new();
        db.add_provider(Layer::Builtins, provider([("base", Value::String("hi".into()))]));
        db.add_provider(
            Layer::Project,
            provider([
                ("greet", Value::String("${base}!".into())),
                ("greet_meta", Value::String("lazysubst".into())),
            ]),
        );
        assert_eq!(*db.get_setting("greet").unwrap(), Value::String("hi!".into()));
    }

    #[test]
    fn dump_json_value_keeps_dotted_keys_flat() {
        let mut db = ConfigDatabase::new();
        db.add_provider(Layer::Builtins, provider([("a.b", Value::Int(1))]));
        let dumped = db.dump_json_value().unwrap();
        assert_eq!(dumped["a.b"], serde_json::json!(1));
        assert!(dumped.as_object().unwrap().get("a").is_none());
    }

    #[test]
    fn dump_json_value_tolerates_a_key_and_its_dotted_child_coexisting() {
        let mut db = ConfigDatabase::new();
        db.add_provider(Layer::Builtins, provider([("a", Value::Int(1)), ("a.b", Value::Int(2))]));
        let dumped = db.dump_json_value().unwrap();
        assert_eq!(dumped["a"], serde_json::json!(1));
        assert_eq!(dumped["a.b"], serde_json::json!(2));
    }

    #[test]
    fn dump_json_is_sorted_and_four_space_indented() {
        let mut db = ConfigDatabase::new();
        db.add_provider(Layer::Builtins, provider([("b", Value::Int(2)), ("a", Value::Int(1))]));
        let dumped = db.dump_json().unwrap();
        assert_eq!(dumped, "{\n    \"a\": 1,\n    \"b\": 2\n}");
    }

    #[test]
    fn update_core_replaces_whole_layer() {
        let mut db = ConfigDatabase::new();
        db.update_core(vec![provider([("threads", Value::Int(1))])]);
        assert_eq!(*db.get_setting("threads").unwrap(), Value::Int(1));
        db.update_core(vec![provider([("threads", Value::Int(4))])]);
        assert_eq!(*db.get_setting("threads").unwrap(), Value::Int(4));
    }

    #[test]
    fn set_setting_merges_into_single_runtime_provider() {
        let mut db = ConfigDatabase::new();
        db.set_setting("a", 1_i64);
        db.set_setting("b", 2_i64);
        assert_eq!(*db.get_setting("a").unwrap(), Value::Int(1));
        assert_eq!(*db.get_setting("b").unwrap(), Value::Int(2));
    }

    #[test]
    fn get_setting_or_substitutes_for_null() {
        let mut db = ConfigDatabase::new();
        db.add_provider(Layer::Builtins, provider([("a", Value::Null)]));
        assert_eq!(
            db.get_setting_or("a", Value::String("fallback".into())).unwrap(),
            Value::String("fallback".into())
        );
    }
}
