//! Black-box coverage of the concrete resolution scenarios a configuration database must get
//! right: layer precedence, each meta-directive family, self-reference renaming, and lazy
//! scheduling (including cycle detection).

use config_resolver::{database::Layer, error::ConfigErrorKind, value::Value, ConfigDatabase};
use indexmap::IndexMap;

fn provider(entries: impl IntoIterator<Item = (&'static str, Value)>) -> IndexMap<String, Value> {
    entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}

#[test]
fn simple_substitution() {
    let mut db = ConfigDatabase::new();
    db.add_provider(
        Layer::Project,
        provider([
            ("base", Value::String("hi".into())),
            ("greet", Value::String("${base}!".into())),
            ("greet_meta", Value::String("subst".into())),
        ]),
    );
    assert_eq!(*db.get_setting("greet").unwrap(), Value::String("hi!".into()));
}

#[test]
fn append_across_layers() {
    let mut db = ConfigDatabase::new();
    db.add_provider(Layer::Builtins, provider([("items", Value::Array(vec![Value::String("a".into())]))]));
    db.add_provider(
        Layer::Project,
        provider([
            ("items", Value::Array(vec![Value::String("b".into())])),
            ("items_meta", Value::String("append".into())),
        ]),
    );
    assert_eq!(
        *db.get_setting("items").unwrap(),
        Value::Array(vec![Value::String("a".into()), Value::String("b".into())])
    );
}

#[test]
fn self_referential_lazy_subst_renames_and_resolves() {
    let mut db = ConfigDatabase::new();
    db.add_provider(
        Layer::Builtins,
        provider([
            ("p", Value::String("x".into())),
            ("p_meta", Value::String("lazysubst".into())),
        ]),
    );
    db.add_provider(
        Layer::Project,
        provider([
            ("p", Value::String("${p}_y".into())),
            ("p_meta", Value::String("lazysubst".into())),
        ]),
    );
    assert_eq!(*db.get_setting("p").unwrap(), Value::String("x_y".into()));
}

#[test]
fn cross_append_reference() {
    let mut db = ConfigDatabase::new();
    db.add_provider(
        Layer::Builtins,
        provider([
            ("a", Value::Array(vec![Value::String("1".into())])),
            ("b", Value::Array(vec![Value::String("2".into()), Value::String("3".into())])),
            ("c", Value::Array(vec![Value::String("a".into()), Value::String("b".into())])),
            ("c_meta", Value::String("crossappendref".into())),
        ]),
    );
    assert_eq!(
        *db.get_setting("c").unwrap(),
        Value::Array(vec![
            Value::String("1".into()),
            Value::String("2".into()),
            Value::String("3".into())
        ])
    );
}

#[test]
fn prepend_local_joins_provider_config_path() {
    let path = std::env::temp_dir().join(format!("config-resolver-prependlocal-scenario-{}", std::process::id()));
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("defaults.yml"), "script: run.sh\nscript_meta: prependlocal\n").unwrap();

    let providers = config_resolver::load_from_defaults(&path, false).unwrap();
    let mut db = ConfigDatabase::new();
    for p in providers {
        db.add_provider(Layer::Project, p);
    }
    let expected = path.join("run.sh").to_string_lossy().into_owned();
    assert_eq!(*db.get_setting("script").unwrap(), Value::String(expected));

    std::fs::remove_dir_all(&path).unwrap();
}

#[test]
fn lazy_cycle_is_detected() {
    let mut db = ConfigDatabase::new();
    db.add_provider(
        Layer::Project,
        provider([
            ("x", Value::String("${y}".into())),
            ("x_meta", Value::String("lazysubst".into())),
            ("y", Value::String("${x}".into())),
            ("y_meta", Value::String("lazysubst".into())),
        ]),
    );
    let err = db.get_setting("x").unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::LazyCycle);
}

#[test]
fn dynamic_prefix_is_rejected_with_the_offending_key() {
    let mut db = ConfigDatabase::new();
    db.add_provider(
        Layer::Project,
        provider([
            ("x", Value::String("1".into())),
            ("x_meta", Value::String("dynamicsubst".into())),
        ]),
    );
    let err = db.get_setting("x").unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::InvalidDirective);
    assert_eq!(err.key(), Some("x"));
}

#[test]
fn json_defaults_override_yaml_defaults_in_the_same_directory() {
    let path = std::env::temp_dir().join(format!("config-resolver-json-precedence-scenario-{}", std::process::id()));
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(&path.join("defaults.yml"), "threads: 1\n").unwrap();
    std::fs::write(&path.join("defaults.json"), r#"{"threads": 8}"#).unwrap();

    let providers = config_resolver::load_from_defaults(&path, false).unwrap();
    let mut db = ConfigDatabase::new();
    for p in providers {
        db.add_provider(Layer::Project, p);
    }
    assert_eq!(*db.get_setting("threads").unwrap(), Value::Int(8));

    std::fs::remove_dir_all(&path).unwrap();
}

#[test]
fn resolution_is_idempotent() {
    let mut db = ConfigDatabase::new();
    db.add_provider(Layer::Builtins, provider([("a", Value::Int(1)), ("b", Value::Int(2))]));
    let first = db.dump_json().unwrap();
    let second = db.dump_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn resolved_output_has_no_meta_or_reserved_keys() {
    let path = std::env::temp_dir().join(format!("config-resolver-no-leaks-scenario-{}", std::process::id()));
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(&path.join("defaults.yml"), "greet: \"${base}\"\ngreet_meta: subst\nbase: hi\n").unwrap();

    let providers = config_resolver::load_from_defaults(&path, false).unwrap();
    let mut db = ConfigDatabase::new();
    for p in providers {
        db.add_provider(Layer::Project, p);
    }
    let dumped = db.dump_json_value().unwrap();
    let object = dumped.as_object().unwrap();
    assert!(!object.contains_key("greet_meta"));
    assert!(!object.contains_key("_config_path"));
    assert!(!object.contains_key("_next_free_index"));

    std::fs::remove_dir_all(&path).unwrap();
}
