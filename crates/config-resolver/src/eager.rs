//! Folds one provider's meta directives into a running working dictionary.

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    directive::{self, ApplyParams},
    error::{ConfigError, ConfigErrorKind},
    value::Value,
};

pub(crate) const CONFIG_PATH_KEY: &str = "_config_path";
pub(crate) const NEXT_FREE_INDEX_KEY: &str = "_next_free_index";

const META_SUFFIX: &str = "_meta";

fn invalid_directive(message: impl Into<String>) -> ConfigError {
    ConfigError::new(ConfigErrorKind::InvalidDirective, message)
}

fn next_free_index(working: &mut IndexMap<String, Value>) -> i64 {
    if !working.contains_key(NEXT_FREE_INDEX_KEY) {
        working.insert(NEXT_FREE_INDEX_KEY.to_owned(), Value::Int(1));
    }
    let current = match working.get(NEXT_FREE_INDEX_KEY) {
        Some(Value::Int(i)) => *i,
        _ => 1,
    };
    working.insert(NEXT_FREE_INDEX_KEY.to_owned(), Value::Int(current + 1));
    current
}

fn directive_names(meta_key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::String(name) => Ok(vec![name.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_owned).ok_or_else(|| {
                    invalid_directive(format!(
                        "`{meta_key}` must be a directive name or a list of directive names"
                    ))
                })
            })
            .collect(),
        _ => Err(invalid_directive(format!(
            "`{meta_key}` must be a directive name or a list of directive names"
        ))),
    }
}

/// Folds `provider`'s settings and meta directives into `working`, returning the updated
/// dictionary. `working` is left untouched; the result is a fresh map.
///
/// Eager directives are applied immediately. Lazy directives (`lazy*`) are copied through
/// unevaluated, except that a lazy directive that self-references its own setting has its prior
/// value renamed out of the way first, per [`directive::Directive::rename`].
pub fn fold(
    working: &IndexMap<String, Value>,
    provider: &IndexMap<String, Value>,
) -> Result<IndexMap<String, Value>, ConfigError> {
    let mut new_working = working.clone();
    let mut meta = provider.clone();

    let meta_keys: Vec<String> = meta
        .keys()
        .filter(|key| key.ends_with(META_SUFFIX) && key.as_str() != META_SUFFIX)
        .cloned()
        .collect();
    let settings_with_meta: std::collections::HashSet<&str> = meta_keys
        .iter()
        .map(|key| &key[..key.len() - META_SUFFIX.len()])
        .collect();

    // Settings with no directive of their own are plain data: merge them in before evaluating any
    // directive, so e.g. a `subst` template can reference a sibling setting from the same
    // provider. A setting that itself carries a directive is deliberately *not* merged here: its
    // prior value (from `working`) must stay visible to self-reference rename detection below.
    for (key, value) in &meta {
        if !key.ends_with(META_SUFFIX) && !settings_with_meta.contains(key.as_str()) {
            new_working.insert(key.clone(), value.clone());
        }
    }

    for meta_key in &meta_keys {
        let setting = meta_key[..meta_key.len() - META_SUFFIX.len()].to_owned();
        let directive_list = directive_names(meta_key, &meta[meta_key])?;

        let mut seen_lazy = false;
        for name in &directive_list {
            if name.starts_with("dynamic") {
                return Err(invalid_directive(format!(
                    "found meta type `{name}`. Dynamic meta directives were renamed to lazy meta \
                     directives; please change your metas from dynamic* to lazy*"
                ))
                .with_key(setting.clone())
                .with_directive(name.clone()));
            }

            if let Some(base_name) = name.strip_prefix("lazy") {
                if directive::directive(base_name).is_none() {
                    return Err(invalid_directive(format!(
                        "the type of lazy meta variable `{meta_key}` is not supported (`{name}`)"
                    ))
                    .with_key(setting.clone())
                    .with_directive(name.clone()));
                }
                if seen_lazy {
                    return Err(invalid_directive(
                        "multiple lazy directives in a single directive list are not supported",
                    )
                    .with_key(setting.clone()));
                }
                seen_lazy = true;

                let base_directive = directive::directive(base_name).expect("checked above");
                let setting_value = meta
                    .get(&setting)
                    .ok_or_else(|| invalid_directive(format!("`{meta_key}` has no matching setting `{setting}`")))?
                    .clone();
                let targets = (base_directive.deps)(&setting, &setting_value)?;

                if targets.iter().any(|target| target == &setting) {
                    let index = next_free_index(&mut new_working);
                    let new_base_setting = format!("{setting}_{index}");
                    let (renamed_value, new_base_name) = (base_directive.rename)(
                        &setting,
                        &setting_value,
                        &setting,
                        &new_base_setting,
                    )?
                    .ok_or_else(|| {
                        ConfigError::new(
                            ConfigErrorKind::RenameUnsupported,
                            format!(
                                "failed to rename lazy setting `{setting}`, which depends on itself"
                            ),
                        )
                        .with_key(setting.clone())
                        .with_directive(name.clone())
                    })?;

                    debug!(setting, new_base_setting, "renamed self-referential lazy setting");

                    let old_value = new_working.get(&setting).cloned();
                    let old_meta = new_working.get(meta_key).cloned();
                    if let Some(old_value) = old_value {
                        new_working.insert(new_base_setting.clone(), old_value);
                    }
                    if let Some(old_meta) = old_meta {
                        new_working.insert(format!("{new_base_setting}{META_SUFFIX}"), old_meta);
                    }
                    new_working.insert(setting.clone(), renamed_value);
                    new_working.insert(meta_key.clone(), Value::String(format!("lazy{new_base_name}")));
                } else {
                    new_working.insert(setting.clone(), setting_value);
                    new_working.insert(meta_key.clone(), Value::String(name.clone()));
                }
                continue;
            }

            if seen_lazy {
                return Err(invalid_directive(
                    "cannot use a non-lazy meta directive after a lazy one in the same list",
                )
                .with_key(setting.clone())
                .with_directive(name.clone()));
            }

            let eager_directive = directive::directive(name).ok_or_else(|| {
                invalid_directive(format!(
                    "the type of meta variable `{meta_key}` is not supported (`{name}`)"
                ))
                .with_key(setting.clone())
                .with_directive(name.clone())
            })?;
            let value = meta
                .get(&setting)
                .cloned()
                .ok_or_else(|| invalid_directive(format!("`{meta_key}` has no matching setting `{setting}`")))?;
            let meta_path = match meta.get(CONFIG_PATH_KEY).and_then(Value::as_str) {
                Some(path) => path.to_owned(),
                None => "unspecified".to_owned(),
            };
            (eager_directive.apply)(&mut new_working, &setting, &value, ApplyParams { meta_path: &meta_path })?;

            // Subsequent directives in this list see the value this one just produced.
            if let Some(updated) = new_working.get(&setting) {
                meta.insert(setting.clone(), updated.clone());
            }
        }

        meta.shift_remove(meta_key);
        meta.shift_remove(&setting);
    }

    debug!(
        settings = meta_keys.len(),
        total = meta.len(),
        "folded provider into working configuration"
    );

    for (key, value) in meta {
        new_working.insert(key, value);
    }
    Ok(new_working)
}
