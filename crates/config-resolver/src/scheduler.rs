//! Dependency-ordered evaluation of the lazy directives left over after eager folding.

use std::collections::{BTreeSet, HashMap, VecDeque};

use indexmap::IndexMap;
use tracing::trace;

use crate::{
    directive,
    eager::{self, CONFIG_PATH_KEY, NEXT_FREE_INDEX_KEY},
    error::{ConfigError, ConfigErrorKind},
    value::Value,
};

const META_SUFFIX: &str = "_meta";

struct LazySetting {
    setting: String,
    /// Directive name with the `lazy` prefix stripped, ready for the eager evaluator.
    base_directive: String,
    value: Value,
}

/// Evaluates every remaining `lazy*` directive in `working` in dependency order, and strips
/// reserved internal keys from the result.
///
/// Dependencies are computed once, from the snapshot of `working` as folding left it: a lazy
/// setting `s` depends on `t` only if `t` was *itself* a lazy setting in that snapshot. Plain
/// (already-resolved) settings a lazy directive reads are not graph edges, just values it can read
/// immediately.
pub fn schedule(mut working: IndexMap<String, Value>) -> Result<IndexMap<String, Value>, ConfigError> {
    let meta_keys: Vec<String> = working
        .keys()
        .filter(|key| key.ends_with(META_SUFFIX) && key.as_str() != META_SUFFIX)
        .cloned()
        .collect();

    if meta_keys.is_empty() {
        strip_reserved(&mut working);
        return Ok(working);
    }

    let lazy_settings_present: BTreeSet<String> = meta_keys
        .iter()
        .map(|key| key[..key.len() - META_SUFFIX.len()].to_owned())
        .collect();

    let mut lazy: HashMap<String, LazySetting> = HashMap::new();
    // node -> (dependents, dependencies), mirroring the teacher's adjacency-list-of-two-lists shape.
    let mut graph: HashMap<String, (BTreeSet<String>, BTreeSet<String>)> = HashMap::new();

    for meta_key in &meta_keys {
        let setting = meta_key[..meta_key.len() - META_SUFFIX.len()].to_owned();
        let lazy_name = working[meta_key].as_str().ok_or_else(|| {
            ConfigError::new(
                ConfigErrorKind::InvalidDirective,
                format!("`{meta_key}` must name a directive"),
            )
            .with_key(setting.clone())
        })?;
        let base_directive = lazy_name.strip_prefix("lazy").ok_or_else(|| {
            ConfigError::new(
                ConfigErrorKind::InvalidDirective,
                format!("expected only lazy directives to remain, found `{lazy_name}` on `{setting}`"),
            )
            .with_key(setting.clone())
        })?;
        let directive_impl = directive::directive(base_directive).ok_or_else(|| {
            ConfigError::new(
                ConfigErrorKind::InvalidDirective,
                format!("the type of lazy meta variable `{meta_key}` is not supported (`{lazy_name}`)"),
            )
            .with_key(setting.clone())
        })?;
        let value = working[&setting].clone();

        graph.entry(setting.clone()).or_default();
        for target in (directive_impl.deps)(&setting, &value)? {
            if lazy_settings_present.contains(&target) {
                graph.entry(target.clone()).or_default().0.insert(setting.clone());
                graph.entry(setting.clone()).or_default().1.insert(target);
            }
        }

        lazy.insert(
            setting.clone(),
            LazySetting {
                setting: setting.clone(),
                base_directive: base_directive.to_owned(),
                value,
            },
        );
    }

    for meta_key in &meta_keys {
        let setting = meta_key[..meta_key.len() - META_SUFFIX.len()].to_owned();
        working.shift_remove(meta_key);
        working.shift_remove(&setting);
    }

    let order = topological_order(&graph)?;
    trace!(order = ?order, "lazy evaluation order");

    for setting in order {
        let entry = lazy.remove(&setting).expect("graph node always has a lazy entry");
        let provider: IndexMap<String, Value> = [
            (entry.setting.clone(), entry.value),
            (format!("{}{META_SUFFIX}", entry.setting), Value::String(entry.base_directive)),
        ]
        .into_iter()
        .collect();
        working = eager::fold(&working, &provider)?;
    }

    strip_reserved(&mut working);
    Ok(working)
}

fn topological_order(
    graph: &HashMap<String, (BTreeSet<String>, BTreeSet<String>)>,
) -> Result<Vec<String>, ConfigError> {
    let mut in_degree: HashMap<&str, usize> = graph
        .iter()
        .map(|(node, (_, deps))| (node.as_str(), deps.len()))
        .collect();

    let mut ready: BTreeSet<String> = graph
        .iter()
        .filter(|(_, (_, deps))| deps.is_empty())
        .map(|(node, _)| node.clone())
        .collect();

    if ready.is_empty() {
        return Err(ConfigError::new(
            ConfigErrorKind::LazyCycle,
            "there appears to be a cycle among lazy settings",
        ));
    }

    let mut queue: VecDeque<String> = ready.iter().cloned().collect();
    ready.clear();
    let mut order = Vec::with_capacity(graph.len());
    let mut visited: BTreeSet<String> = BTreeSet::new();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node.clone()) {
            continue;
        }
        order.push(node.clone());

        let (dependents, _) = &graph[&node];
        let mut newly_ready: Vec<String> = Vec::new();
        for dependent in dependents {
            let degree = in_degree.get_mut(dependent.as_str()).expect("node in graph");
            *degree -= 1;
            if *degree == 0 {
                newly_ready.push(dependent.clone());
            }
        }
        newly_ready.sort();
        queue.extend(newly_ready);
    }

    if order.len() != graph.len() {
        return Err(ConfigError::new(
            ConfigErrorKind::LazyCycle,
            "there appears to be a cycle among lazy settings",
        ));
    }
    Ok(order)
}

fn strip_reserved(working: &mut IndexMap<String, Value>) {
    working.shift_remove(CONFIG_PATH_KEY);
    working.shift_remove(NEXT_FREE_INDEX_KEY);
}
