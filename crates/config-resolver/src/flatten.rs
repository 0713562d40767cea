//! Recursive inlining of nested setting mappings into dotted keys, and back.

use indexmap::IndexMap;

use crate::{
    error::{ConfigError, ConfigErrorKind},
    value::Value,
};

/// Flattens a (possibly nested) mapping into one whose values are never themselves `Object`s.
///
/// `{"a": {"b": 1}}` becomes `{"a.b": 1}`. A key that already contains a `.` at the input level is
/// treated as a single atomic segment and simply concatenated with its children's keys, so
/// `{"a.b": {"c": 1}}` yields `"a.b.c"`, not a deeper tree.
pub fn flatten(nested: &IndexMap<String, Value>) -> IndexMap<String, Value> {
    let mut out = IndexMap::new();
    flatten_into(nested, "", &mut out);
    out
}

fn flatten_into(nested: &IndexMap<String, Value>, prefix: &str, out: &mut IndexMap<String, Value>) {
    for (key, value) in nested {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(inner, &full_key, out),
            other => {
                out.insert(full_key, other.clone());
            }
        }
    }
}

/// Inverts [`flatten`]: splits every key on `.` and rebuilds a nested mapping.
///
/// Used by [`crate::database::ConfigDatabase::dump_json`] and test/debug code. A round-trip
/// through `flatten`/`unflatten` is only exact for inputs with no blank path segments and no keys
/// that collide once split.
pub fn unflatten(flat: &IndexMap<String, Value>) -> Result<IndexMap<String, Value>, ConfigError> {
    let mut out: IndexMap<String, Value> = IndexMap::new();
    for (key, value) in flat {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(ConfigError::new(
                ConfigErrorKind::BlankKey,
                format!("key `{key}` has a blank dotted segment"),
            )
            .with_key(key.clone()));
        }
        insert_path(&mut out, &segments, value.clone())?;
    }
    Ok(out)
}

fn insert_path(
    map: &mut IndexMap<String, Value>,
    segments: &[&str],
    value: Value,
) -> Result<(), ConfigError> {
    let (head, rest) = segments.split_first().expect("segments is non-empty");
    if rest.is_empty() {
        map.insert((*head).to_owned(), value);
        return Ok(());
    }

    let entry = map
        .entry((*head).to_owned())
        .or_insert_with(|| Value::Object(IndexMap::new()));
    let Value::Object(inner) = entry else {
        return Err(ConfigError::new(
            ConfigErrorKind::BlankKey,
            format!("key segment `{head}` is used both as a scalar and as a nested mapping"),
        )
        .with_key(head.to_string()));
    };
    insert_path(inner, rest, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(entries: impl IntoIterator<Item = (&'static str, Value)>) -> IndexMap<String, Value> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect()
    }

    #[test]
    fn flattens_nested_mapping() {
        let nested = obj([("a", Value::Object(obj([("b", Value::Int(1))])))]);
        let flat = flatten(&nested);
        assert_eq!(flat, obj([("a.b", Value::Int(1))]));
    }

    #[test]
    fn preserves_dotted_keys_already_present() {
        let nested = obj([(
            "a.b",
            Value::Object(obj([("c", Value::Int(1)), ("d", Value::Int(2))])),
        )]);
        let flat = flatten(&nested);
        assert_eq!(
            flat,
            obj([("a.b.c", Value::Int(1)), ("a.b.d", Value::Int(2))])
        );
    }

    #[test]
    fn leaves_scalars_and_lists_alone() {
        let nested = obj([
            ("one", Value::Int(1)),
            ("two", Value::Array(vec![Value::Int(1), Value::Int(2)])),
        ]);
        let flat = flatten(&nested);
        assert_eq!(flat, nested);
    }

    #[test]
    fn unflatten_inverts_flatten() {
        let nested = obj([(
            "a",
            Value::Object(obj([
                ("foo", Value::Int(1)),
                ("bar", Value::Int(2)),
            ])),
        ), (
            "b",
            Value::Object(obj([
                ("baz", Value::Int(3)),
                (
                    "boom",
                    Value::Object(obj([
                        ("rocket", Value::String("chip".into())),
                        ("hwacha", Value::String("vector".into())),
                    ])),
                ),
            ])),
        )]);
        let flat = flatten(&nested);
        let round_tripped = unflatten(&flat).unwrap();
        assert_eq!(round_tripped, nested);
    }

    #[test]
    fn unflatten_rejects_blank_segments() {
        let flat = obj([("a..b", Value::Int(1))]);
        let err = unflatten(&flat).unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::BlankKey);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        /// A key segment matching `[A-Za-z_\-0-9]+`, short enough to keep generated trees small.
        fn key_segment() -> impl Strategy<Value = String> {
            "[A-Za-z_][A-Za-z_0-9]{0,4}"
        }

        fn scalar() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::Int),
                "[a-z]{0,8}".prop_map(Value::String),
            ]
        }

        /// A nested mapping of bounded depth/breadth, with no key reused at a given level (so
        /// flattening never collides) and no dotted keys (those are covered by a dedicated unit
        /// test, not the round-trip property).
        fn nested_mapping() -> impl Strategy<Value = IndexMap<String, Value>> {
            let leaf = scalar();
            leaf.prop_recursive(3, 16, 3, |inner| {
                prop::collection::vec((key_segment(), inner), 0..3).prop_map(|entries| {
                    let mut map = IndexMap::new();
                    for (key, value) in entries {
                        map.insert(key, value);
                    }
                    Value::Object(map)
                })
            })
            .prop_map(|value| match value {
                Value::Object(map) => map,
                other => {
                    let mut map = IndexMap::new();
                    map.insert("v".to_owned(), other);
                    map
                }
            })
        }

        proptest! {
            #[test]
            fn unflatten_inverts_flatten_for_arbitrary_trees(nested in nested_mapping()) {
                let flat = flatten(&nested);
                let round_tripped = unflatten(&flat).unwrap();
                prop_assert_eq!(round_tripped, nested);
            }
        }
    }
}
