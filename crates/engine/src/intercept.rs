use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// A named, overridable method on a receiver of type `T`.
pub type Method<T> = Box<dyn FnMut(&mut T, &[Value]) -> Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptKind {
    Before,
    After,
    Replace,
}

struct Interceptor<T> {
    owner: String,
    kind: InterceptKind,
    hook: Method<T>,
}

struct MethodEntry<T> {
    base: Method<T>,
    interceptors: Vec<Interceptor<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterceptorInfo {
    pub owner: String,
    pub kind: InterceptKind,
}

/// Dispatch table of overridable methods.
///
/// Each method keeps its base implementation plus an ordered interceptor list.
/// Dispatch reproduces nested wrapping: every registration wraps whatever the
/// method looked like when it was registered. `Before` hooks therefore run
/// newest-first ahead of the core call, `After` hooks run oldest-first behind it,
/// and the newest `Replace` becomes the core call, hiding everything registered
/// before it. Because the list is kept, removing an owner's interceptors restores
/// the chain underneath.
pub struct MethodTable<T> {
    entries: BTreeMap<String, MethodEntry<T>>,
}

impl<T> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MethodTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(name, entry)| (name, entry.interceptors.len())),
            )
            .finish()
    }
}

impl<T> MethodTable<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Defines or redefines the base implementation. Interceptors already
    /// installed on `name` stay in place. Returns true if `name` already existed.
    pub fn define<F>(&mut self, name: impl Into<String>, method: F) -> bool
    where
        F: FnMut(&mut T, &[Value]) -> Value + 'static,
    {
        let name = name.into();
        match self.entries.get_mut(&name) {
            Some(entry) => {
                entry.base = Box::new(method);
                true
            }
            None => {
                self.entries.insert(
                    name,
                    MethodEntry {
                        base: Box::new(method),
                        interceptors: Vec::new(),
                    },
                );
                false
            }
        }
    }

    pub fn is_callable(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Invokes `name` on `target`. Returns `None` when no such method exists.
    pub fn call(&mut self, name: &str, target: &mut T, args: &[Value]) -> Option<Value> {
        let entry = self.entries.get_mut(name)?;
        let live_from = entry
            .interceptors
            .iter()
            .rposition(|layer| layer.kind == InterceptKind::Replace)
            .map_or(0, |index| index + 1);
        let (hidden, live) = entry.interceptors.split_at_mut(live_from);

        for layer in live.iter_mut().rev() {
            if layer.kind == InterceptKind::Before {
                (layer.hook)(target, args);
            }
        }
        let result = match hidden.last_mut() {
            Some(replacement) => (replacement.hook)(target, args),
            None => (entry.base)(target, args),
        };
        for layer in live.iter_mut() {
            if layer.kind == InterceptKind::After {
                (layer.hook)(target, args);
            }
        }
        Some(result)
    }

    /// Interceptors on `name` in registration order.
    pub fn interceptors(&self, name: &str) -> Vec<InterceptorInfo> {
        self.entries
            .get(name)
            .map(|entry| {
                entry
                    .interceptors
                    .iter()
                    .map(|layer| InterceptorInfo {
                        owner: layer.owner.clone(),
                        kind: layer.kind,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn remove_interceptors(&mut self, name: &str, owner: &str) -> usize {
        let Some(entry) = self.entries.get_mut(name) else {
            return 0;
        };
        let before = entry.interceptors.len();
        entry.interceptors.retain(|layer| layer.owner != owner);
        before - entry.interceptors.len()
    }

    /// Drops every interceptor `owner` installed, across all methods.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        for entry in self.entries.values_mut() {
            let before = entry.interceptors.len();
            entry.interceptors.retain(|layer| layer.owner != owner);
            removed += before - entry.interceptors.len();
        }
        removed
    }

    /// Serializable description of every method and its interceptor chain.
    pub fn describe(&self) -> Value {
        let mut out = serde_json::Map::new();
        for name in self.entries.keys() {
            let chain = serde_json::to_value(self.interceptors(name)).unwrap_or(Value::Null);
            out.insert(name.clone(), chain);
        }
        Value::Object(out)
    }

    fn push(&mut self, name: &str, owner: &str, kind: InterceptKind, hook: Method<T>) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        entry.interceptors.push(Interceptor {
            owner: owner.to_string(),
            kind,
            hook,
        });
        true
    }
}

/// Interceptor installer bound to one `(target table, owning behavior)` pair.
///
/// Every operation returns false and leaves the table untouched when `name` is
/// not a defined method.
pub struct Override<'a, T> {
    table: &'a mut MethodTable<T>,
    owner: &'a str,
}

impl<'a, T> Override<'a, T> {
    pub fn new(table: &'a mut MethodTable<T>, owner: &'a str) -> Self {
        Self { table, owner }
    }

    pub fn owner(&self) -> &str {
        self.owner
    }

    /// Runs `hook` with the call's arguments, then the current method; the
    /// method's result is returned and the hook's is discarded.
    pub fn before<F>(&mut self, name: &str, mut hook: F) -> bool
    where
        F: FnMut(&mut T, &[Value]) + 'static,
    {
        self.table.push(
            name,
            self.owner,
            InterceptKind::Before,
            Box::new(move |target, args| {
                hook(target, args);
                Value::Null
            }),
        )
    }

    /// Runs the current method, then `hook` with the same arguments; the
    /// method's result is returned.
    pub fn after<F>(&mut self, name: &str, mut hook: F) -> bool
    where
        F: FnMut(&mut T, &[Value]) + 'static,
    {
        self.table.push(
            name,
            self.owner,
            InterceptKind::After,
            Box::new(move |target, args| {
                hook(target, args);
                Value::Null
            }),
        )
    }

    /// Substitutes `hook` for the method and everything layered on it so far.
    pub fn replace<F>(&mut self, name: &str, hook: F) -> bool
    where
        F: FnMut(&mut T, &[Value]) -> Value + 'static,
    {
        self.table
            .push(name, self.owner, InterceptKind::Replace, Box::new(hook))
    }

    /// Removes this owner's interceptors from `name`.
    pub fn restore(&mut self, name: &str) -> usize {
        self.table.remove_interceptors(name, self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Target {
        log: Vec<String>,
    }

    fn table_with_f() -> MethodTable<Target> {
        let mut table = MethodTable::new();
        table.define("f", |target: &mut Target, args: &[Value]| {
            target.log.push(format!("f{}", Value::Array(args.to_vec())));
            json!("R")
        });
        table
    }

    #[test]
    fn before_runs_hook_then_method_and_keeps_method_result() {
        let mut table = table_with_f();
        let mut target = Target::default();
        assert!(Override::new(&mut table, "script").before("f", |t: &mut Target, args| {
            t.log.push(format!("g{}", Value::Array(args.to_vec())));
        }));

        let result = table.call("f", &mut target, &[json!(1), json!("a")]);
        assert_eq!(result, Some(json!("R")));
        assert_eq!(target.log, vec![r#"g[1,"a"]"#, r#"f[1,"a"]"#]);
    }

    #[test]
    fn after_runs_method_then_hook_and_keeps_method_result() {
        let mut table = table_with_f();
        let mut target = Target::default();
        assert!(Override::new(&mut table, "script").after("f", |t: &mut Target, args| {
            t.log.push(format!("g{}", Value::Array(args.to_vec())));
        }));

        let result = table.call("f", &mut target, &[json!(2)]);
        assert_eq!(result, Some(json!("R")));
        assert_eq!(target.log, vec!["f[2]", "g[2]"]);
    }

    #[test]
    fn replace_substitutes_result() {
        let mut table = table_with_f();
        let mut target = Target::default();
        assert!(Override::new(&mut table, "script")
            .replace("f", |t: &mut Target, _args| {
                t.log.push("h".to_string());
                json!(42)
            }));

        assert_eq!(table.call("f", &mut target, &[]), Some(json!(42)));
        assert_eq!(target.log, vec!["h"]);
    }

    #[test]
    fn unknown_method_is_rejected_without_mutation() {
        let mut table = table_with_f();
        let mut ov = Override::new(&mut table, "script");
        assert!(!ov.before("missing", |_: &mut Target, _| {}));
        assert!(!ov.after("missing", |_: &mut Target, _| {}));
        assert!(!ov.replace("missing", |_: &mut Target, _| Value::Null));
        assert!(table.interceptors("f").is_empty());
        assert!(!table.is_callable("missing"));
        assert_eq!(table.call("missing", &mut Target::default(), &[]), None);
    }

    #[test]
    fn stacked_wrappers_nest_like_successive_wraps() {
        let mut table = table_with_f();
        let mut target = Target::default();
        {
            let mut ov = Override::new(&mut table, "a");
            ov.before("f", |t: &mut Target, _| t.log.push("b1".into()));
            ov.after("f", |t: &mut Target, _| t.log.push("a1".into()));
            ov.before("f", |t: &mut Target, _| t.log.push("b2".into()));
            ov.after("f", |t: &mut Target, _| t.log.push("a2".into()));
        }

        table.call("f", &mut target, &[]);
        assert_eq!(target.log, vec!["b2", "b1", "f[]", "a1", "a2"]);
    }

    #[test]
    fn replace_hides_earlier_chain_but_later_wraps_apply() {
        let mut table = table_with_f();
        let mut target = Target::default();
        {
            let mut ov = Override::new(&mut table, "a");
            ov.before("f", |t: &mut Target, _| t.log.push("hidden".into()));
            ov.replace("f", |t: &mut Target, _| {
                t.log.push("r".into());
                json!("replaced")
            });
            ov.after("f", |t: &mut Target, _| t.log.push("after".into()));
        }

        assert_eq!(table.call("f", &mut target, &[]), Some(json!("replaced")));
        assert_eq!(target.log, vec!["r", "after"]);
    }

    #[test]
    fn removing_owner_restores_underlying_chain() {
        let mut table = table_with_f();
        let mut target = Target::default();
        Override::new(&mut table, "keep").before("f", |t: &mut Target, _| {
            t.log.push("keep".into())
        });
        Override::new(&mut table, "drop").replace("f", |_: &mut Target, _| json!("x"));

        assert_eq!(table.remove_owner("drop"), 1);
        assert_eq!(table.call("f", &mut target, &[]), Some(json!("R")));
        assert_eq!(target.log, vec!["keep", "f[]"]);
        assert_eq!(
            table.interceptors("f"),
            vec![InterceptorInfo {
                owner: "keep".into(),
                kind: InterceptKind::Before
            }]
        );
    }

    #[test]
    fn redefining_base_keeps_interceptors() {
        let mut table = table_with_f();
        let mut target = Target::default();
        Override::new(&mut table, "a").after("f", |t: &mut Target, _| t.log.push("a".into()));
        assert!(table.define("f", |_: &mut Target, _| json!("new")));

        assert_eq!(table.call("f", &mut target, &[]), Some(json!("new")));
        assert_eq!(target.log, vec!["a"]);
    }

    #[test]
    fn restore_only_touches_named_method_and_owner() {
        let mut table = table_with_f();
        table.define("g", |_: &mut Target, _| Value::Null);
        let mut ov = Override::new(&mut table, "a");
        ov.before("f", |_: &mut Target, _| {});
        ov.before("g", |_: &mut Target, _| {});
        assert_eq!(ov.restore("f"), 1);
        assert!(table.interceptors("f").is_empty());
        assert_eq!(table.interceptors("g").len(), 1);
        assert_eq!(
            table.describe(),
            json!({"f": [], "g": [{"owner": "a", "kind": "before"}]})
        );
    }
}
