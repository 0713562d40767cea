//! The fixed catalog of meta-directives and their `apply`/`deps`/`rename` behaviors.

use std::{path::Path, sync::LazyLock};

use indexmap::IndexMap;

use crate::{
    error::{ConfigError, ConfigErrorKind},
    value::Value,
};

/// Miscellaneous parameters needed to execute a directive, besides the key/value themselves.
#[derive(Debug, Clone, Copy)]
pub struct ApplyParams<'a> {
    /// Directory the provider that declared the directive came from, or `"unspecified"`.
    pub meta_path: &'a str,
}

/// A meta-directive: an `apply`/`deps`/`rename` triple, looked up by name in [`directive`].
pub struct Directive {
    /// Name as it appears (without any `lazy` prefix) in a `_meta` entry.
    pub name: &'static str,
    /// Mutates `working[setting]` according to this directive's semantics.
    pub apply: fn(
        working: &mut IndexMap<String, Value>,
        setting: &str,
        value: &Value,
        params: ApplyParams<'_>,
    ) -> Result<(), ConfigError>,
    /// Lists the setting names this directive's value reads, for `setting`/`value`.
    pub deps: fn(setting: &str, value: &Value) -> Result<Vec<String>, ConfigError>,
    /// Rewrites `value` so that any reference to `from` becomes `to`, returning the new value and
    /// the (possibly different) directive name that should now apply it. Returns `Ok(None)` if
    /// the directive cannot express the requested rename.
    pub rename: fn(
        setting: &str,
        value: &Value,
        from: &str,
        to: &str,
    ) -> Result<Option<(Value, &'static str)>, ConfigError>,
}

fn invalid_value(setting: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::new(ConfigErrorKind::InvalidValue, message).with_key(setting.to_owned())
}

fn missing_target(setting: &str, target: &str) -> ConfigError {
    ConfigError::new(
        ConfigErrorKind::MissingTarget,
        format!("setting `{target}` is not present"),
    )
    .with_key(setting.to_owned())
}

// ---- append ----------------------------------------------------------------------------------

fn append_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    _params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let Some(addition) = value.as_array() else {
        return Err(invalid_value(
            setting,
            format!("trying to append to list {setting} with non-list value"),
        ));
    };
    let current = working
        .entry(setting.to_owned())
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(items) = current else {
        return Err(invalid_value(
            setting,
            format!("trying to append to non-list setting {setting}"),
        ));
    };
    items.extend(addition.iter().cloned());
    Ok(())
}

fn append_deps(setting: &str, _value: &Value) -> Result<Vec<String>, ConfigError> {
    Ok(vec![setting.to_owned()])
}

fn append_rename(
    _setting: &str,
    value: &Value,
    from: &str,
    to: &str,
) -> Result<Option<(Value, &'static str)>, ConfigError> {
    let _ = from; // append depends only on itself, which is always the rename target here
    Ok(Some((
        Value::Array(vec![Value::String(to.to_owned()), value.clone()]),
        "crossappend",
    )))
}

// ---- crossappend ------------------------------------------------------------------------------

fn crossappend_decode<'a>(setting: &str, value: &'a Value) -> Result<(&'a str, &'a [Value]), ConfigError> {
    let Some(items) = value.as_array() else {
        return Err(invalid_value(setting, "crossappend takes a list of two elements"));
    };
    let [target, append_value] = items else {
        return Err(invalid_value(setting, "crossappend takes a list of two elements"));
    };
    let Value::String(target) = target else {
        return Err(invalid_value(setting, "crossappend target setting must be a string"));
    };
    let Some(append_value) = append_value.as_array() else {
        return Err(invalid_value(setting, "crossappend must append a list"));
    };
    Ok((target.as_str(), append_value))
}

fn crossappend_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    _params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let (target, append_value) = crossappend_decode(setting, value)?;
    let target_value = working.get(target).ok_or_else(|| missing_target(setting, target))?;
    let Some(target_list) = target_value.as_array() else {
        return Err(invalid_value(setting, format!("crossappend target `{target}` is not a list")));
    };
    let mut combined = target_list.to_vec();
    combined.extend(append_value.iter().cloned());
    working.insert(setting.to_owned(), Value::Array(combined));
    Ok(())
}

fn crossappend_deps(setting: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let (target, _) = crossappend_decode(setting, value)?;
    Ok(vec![target.to_owned()])
}

fn crossappend_rename(
    setting: &str,
    value: &Value,
    from: &str,
    to: &str,
) -> Result<Option<(Value, &'static str)>, ConfigError> {
    let (target, append_value) = crossappend_decode(setting, value)?;
    let target = if target == from { to } else { target };
    Ok(Some((
        Value::Array(vec![
            Value::String(target.to_owned()),
            Value::Array(append_value.to_vec()),
        ]),
        "crossappend",
    )))
}

// ---- crossappendref ----------------------------------------------------------------------------

fn crossappendref_decode<'a>(setting: &str, value: &'a Value) -> Result<(&'a str, &'a str), ConfigError> {
    let Some(items) = value.as_array() else {
        return Err(invalid_value(setting, "crossappendref takes a list of two elements"));
    };
    let [target, source] = items else {
        return Err(invalid_value(setting, "crossappendref takes a list of two elements"));
    };
    let (Value::String(target), Value::String(source)) = (target, source) else {
        return Err(invalid_value(
            setting,
            "crossappendref target and source settings must be strings",
        ));
    };
    Ok((target.as_str(), source.as_str()))
}

fn crossappendref_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    _params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let (target, source) = crossappendref_decode(setting, value)?;
    let target_value = working.get(target).ok_or_else(|| missing_target(setting, target))?;
    let Some(target_list) = target_value.as_array() else {
        return Err(invalid_value(setting, format!("crossappendref target `{target}` is not a list")));
    };
    let source_value = working.get(source).ok_or_else(|| missing_target(setting, source))?;
    let Some(source_list) = source_value.as_array() else {
        return Err(invalid_value(setting, format!("crossappendref source `{source}` is not a list")));
    };
    let mut combined = target_list.to_vec();
    combined.extend(source_list.iter().cloned());
    working.insert(setting.to_owned(), Value::Array(combined));
    Ok(())
}

fn crossappendref_deps(setting: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let (target, source) = crossappendref_decode(setting, value)?;
    Ok(vec![target.to_owned(), source.to_owned()])
}

fn crossappendref_rename(
    setting: &str,
    value: &Value,
    from: &str,
    to: &str,
) -> Result<Option<(Value, &'static str)>, ConfigError> {
    let (target, source) = crossappendref_decode(setting, value)?;
    let replace = |s: &str| if s == from { to.to_owned() } else { s.to_owned() };
    Ok(Some((
        Value::Array(vec![Value::String(replace(target)), Value::String(replace(source))]),
        "crossappendref",
    )))
}

// ---- subst --------------------------------------------------------------------------------------

/// Finds every `${name}` occurrence in `input`, per the `\${([A-Za-z_\-0-9.]+)}` escape grammar.
/// Returns `(byte_start, byte_end, name)` triples for full matches, including the `${`/`}`
/// delimiters in the range.
fn find_var_refs(input: &str) -> Vec<(usize, usize, &str)> {
    fn is_name_char(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b'.'
    }

    let bytes = input.as_bytes();
    let mut matches = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            let name_start = i + 2;
            let mut j = name_start;
            while j < bytes.len() && is_name_char(bytes[j]) {
                j += 1;
            }
            if j > name_start && j < bytes.len() && bytes[j] == b'}' {
                matches.push((i, j + 1, &input[name_start..j]));
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    matches
}

fn subst_str(input: &str, mut replacement: impl FnMut(&str) -> Result<String, ConfigError>) -> Result<String, ConfigError> {
    let refs = find_var_refs(input);
    if refs.is_empty() {
        return Ok(input.to_owned());
    }
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    for (start, end, name) in refs {
        out.push_str(&input[cursor..start]);
        out.push_str(&replacement(name)?);
        cursor = end;
    }
    out.push_str(&input[cursor..]);
    Ok(out)
}

fn subst_source(working: &IndexMap<String, Value>, setting: &str, name: &str) -> Result<String, ConfigError> {
    let value = working
        .get(name)
        .ok_or_else(|| missing_target(setting, name))?;
    value.as_str().map(str::to_owned).ok_or_else(|| {
        invalid_value(
            setting,
            format!("subst can only interpolate string-valued settings, but `{name}` is not one"),
        )
    })
}

fn subst_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    _params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let new_value = match value {
        Value::String(s) => {
            Value::String(subst_str(s, |name| subst_source(working, setting, name))?)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let Value::String(s) = item else {
                    return Err(invalid_value(setting, "subst list entries must be strings"));
                };
                out.push(Value::String(subst_str(s, |name| {
                    subst_source(working, setting, name)
                })?));
            }
            Value::Array(out)
        }
        _ => return Err(invalid_value(setting, "subst requires a string or list of strings")),
    };
    working.insert(setting.to_owned(), new_value);
    Ok(())
}

fn subst_targets_of(s: &str) -> Vec<String> {
    find_var_refs(s).into_iter().map(|(_, _, name)| name.to_owned()).collect()
}

fn subst_deps(setting: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::String(s) => Ok(subst_targets_of(s)),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                let Value::String(s) = item else {
                    return Err(invalid_value(setting, "subst list entries must be strings"));
                };
                out.extend(subst_targets_of(s));
            }
            Ok(out)
        }
        _ => Err(invalid_value(setting, "subst requires a string or list of strings")),
    }
}

fn subst_rename_str(s: &str, from: &str, to: &str) -> String {
    subst_str(s, |name| {
        Ok(if name == from {
            format!("${{{to}}}")
        } else {
            format!("${{{name}}}")
        })
    })
    .expect("replacement closure never fails")
}

fn subst_rename(
    setting: &str,
    value: &Value,
    from: &str,
    to: &str,
) -> Result<Option<(Value, &'static str)>, ConfigError> {
    if !subst_deps(setting, value)?.iter().any(|target| target == from) {
        return Ok(None);
    }
    let new_value = match value {
        Value::String(s) => Value::String(subst_rename_str(s, from, to)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(subst_rename_str(s, from, to)),
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => return Ok(None),
    };
    Ok(Some((new_value, "subst")))
}

// ---- crossref -----------------------------------------------------------------------------------

fn crossref_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    _params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let new_value = match value {
        Value::String(target) => working
            .get(target.as_str())
            .cloned()
            .ok_or_else(|| missing_target(setting, target))?,
        Value::Array(targets) => {
            let mut out = Vec::with_capacity(targets.len());
            for target in targets {
                let Value::String(target) = target else {
                    return Err(invalid_value(
                        setting,
                        "crossref (if used with lists) can only be used with lists of strings",
                    ));
                };
                out.push(
                    working
                        .get(target.as_str())
                        .cloned()
                        .ok_or_else(|| missing_target(setting, target))?,
                );
            }
            Value::Array(out)
        }
        other if other.is_numeric_or_bool() => {
            return Err(invalid_value(setting, "crossref cannot be used with numbers and bools"))
        }
        _ => return Err(invalid_value(setting, "crossref is not supported for this value type")),
    };
    working.insert(setting.to_owned(), new_value);
    Ok(())
}

fn crossref_deps(setting: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::String(target) => Ok(vec![target.clone()]),
        Value::Array(targets) => targets
            .iter()
            .map(|target| {
                target.as_str().map(str::to_owned).ok_or_else(|| {
                    invalid_value(
                        setting,
                        "crossref (if used with lists) can only be used with lists of strings",
                    )
                })
            })
            .collect(),
        other if other.is_numeric_or_bool() => {
            Err(invalid_value(setting, "crossref cannot be used with numbers and bools"))
        }
        _ => Err(invalid_value(setting, "crossref is not supported for this value type")),
    }
}

fn crossref_rename(
    setting: &str,
    value: &Value,
    from: &str,
    to: &str,
) -> Result<Option<(Value, &'static str)>, ConfigError> {
    let replace = |s: &str| if s == from { to.to_owned() } else { s.to_owned() };
    let new_value = match value {
        Value::String(target) => Value::String(replace(target)),
        Value::Array(targets) => {
            let mut out = Vec::with_capacity(targets.len());
            for target in targets {
                let Value::String(target) = target else {
                    return Err(invalid_value(
                        setting,
                        "crossref (if used with lists) can only be used with lists of strings",
                    ));
                };
                out.push(Value::String(replace(target)));
            }
            Value::Array(out)
        }
        other if other.is_numeric_or_bool() => {
            return Err(invalid_value(setting, "crossref cannot be used with numbers and bools"))
        }
        _ => return Err(invalid_value(setting, "crossref is not supported for this value type")),
    };
    Ok(Some((new_value, "crossref")))
}

// ---- transclude -----------------------------------------------------------------------------------

fn transclude_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    _params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let Value::String(path) = value else {
        return Err(invalid_value(setting, "path to file for transclusion must be a string"));
    };
    let contents = std::fs::read_to_string(path).map_err(|err| {
        ConfigError::io(format!("failed to transclude `{path}`"), err).with_key(setting.to_owned())
    })?;
    working.insert(setting.to_owned(), Value::String(contents));
    Ok(())
}

fn no_deps(_setting: &str, _value: &Value) -> Result<Vec<String>, ConfigError> {
    Ok(Vec::new())
}

fn identity_rename(
    name: &'static str,
) -> fn(&str, &Value, &str, &str) -> Result<Option<(Value, &'static str)>, ConfigError> {
    // Directives with no dependencies never need to change their value on rename.
    match name {
        "transclude" => |_s, value, _from, _to| Ok(Some((value.clone(), "transclude"))),
        "json2list" => |_s, value, _from, _to| Ok(Some((value.clone(), "json2list"))),
        "prependlocal" => |_s, value, _from, _to| Ok(Some((value.clone(), "prependlocal"))),
        _ => unreachable!("identity_rename called for a directive with dependencies"),
    }
}

// ---- json2list -----------------------------------------------------------------------------------

fn json2list_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    _params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let Value::String(text) = value else {
        return Err(invalid_value(setting, "json2list requires a JSON string that is a list"));
    };
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|err| {
        invalid_value(setting, format!("json2list could not parse JSON: {err}"))
    })?;
    let serde_json::Value::Array(_) = &parsed else {
        return Err(invalid_value(setting, "json2list requires a JSON string that is a list"));
    };
    working.insert(setting.to_owned(), Value::from(parsed));
    Ok(())
}

// ---- prependlocal -----------------------------------------------------------------------------------

fn prependlocal_apply(
    working: &mut IndexMap<String, Value>,
    setting: &str,
    value: &Value,
    params: ApplyParams<'_>,
) -> Result<(), ConfigError> {
    let joined = Path::new(params.meta_path)
        .join(value.to_path_segment())
        .to_string_lossy()
        .into_owned();
    working.insert(setting.to_owned(), Value::String(joined));
    Ok(())
}

static DIRECTIVES: LazyLock<[Directive; 8]> = LazyLock::new(|| {
    [
        Directive {
            name: "append",
            apply: append_apply,
            deps: append_deps,
            rename: append_rename,
        },
        Directive {
            name: "crossappend",
            apply: crossappend_apply,
            deps: crossappend_deps,
            rename: crossappend_rename,
        },
        Directive {
            name: "crossappendref",
            apply: crossappendref_apply,
            deps: crossappendref_deps,
            rename: crossappendref_rename,
        },
        Directive {
            name: "subst",
            apply: subst_apply,
            deps: subst_deps,
            rename: subst_rename,
        },
        Directive {
            name: "crossref",
            apply: crossref_apply,
            deps: crossref_deps,
            rename: crossref_rename,
        },
        Directive {
            name: "transclude",
            apply: transclude_apply,
            deps: no_deps,
            rename: identity_rename("transclude"),
        },
        Directive {
            name: "json2list",
            apply: json2list_apply,
            deps: no_deps,
            rename: identity_rename("json2list"),
        },
        Directive {
            name: "prependlocal",
            apply: prependlocal_apply,
            deps: no_deps,
            rename: identity_rename("prependlocal"),
        },
    ]
});

/// Looks up a directive by its base name (i.e. with any `lazy` prefix already stripped).
pub fn directive(name: &str) -> Option<&'static Directive> {
    DIRECTIVES.iter().find(|directive| directive.name == name)
}
