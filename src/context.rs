use std::{
    collections::{btree_map, BTreeMap},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use minijinja::{value::ValueKind, Value};
use serde::Serialize;

use crate::{Error, Result};

/// String keyed template variables.
///
/// Values are [`minijinja::Value`]s, so a context can carry plain data
/// (strings, numbers, sequences, maps) as well as opaque objects such as the
/// [`PageRequest`](crate::PageRequest).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context out of anything that serializes to a map.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::from_value(Value::from_serialize(value))
    }

    /// Builds a context out of a map [`Value`], failing for every other kind.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.kind() != ValueKind::Map {
            return Err(Error::invalid_argument(format!(
                "context must be a mapping, found {}",
                value.kind()
            )));
        }

        let mut context = Context::new();
        for key in value.try_iter()? {
            let Some(name) = key.as_str() else {
                return Err(Error::invalid_argument(format!(
                    "context keys must be strings, found {}",
                    key.kind()
                )));
            };

            context.insert(name, value.get_item(&key)?);
        }

        Ok(context)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Copies every entry of `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: Context) {
        self.0.extend(other.0);
    }

    pub fn into_value(self) -> Value {
        Value::from_iter(self.0)
    }
}

impl From<Context> for Value {
    fn from(context: Context) -> Self {
        context.into_value()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<(String, Value)> for Context {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for Context {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A [`Context`] shared by every render of a [`WebPage`](crate::WebPage).
///
/// Updates are expected to happen while the application is being set up.
/// The lock keeps later updates memory safe, but a render that is already in
/// flight may or may not observe them.
#[derive(Debug, Default)]
pub struct SharedContext(RwLock<Context>);

impl SharedContext {
    pub fn new(context: Context) -> Self {
        Self(RwLock::new(context))
    }

    /// Merges `patch` into the shared context. A patch that is not a mapping
    /// is rejected and leaves the context untouched.
    pub fn update<T: Serialize + ?Sized>(&self, patch: &T) -> Result<()> {
        let patch = Context::from_serialize(patch)?;
        self.write().merge(patch);

        Ok(())
    }

    pub fn snapshot(&self) -> Context {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Context> {
        self.0.read().expect("context lock should not be poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Context> {
        self.0.write().expect("context lock should not be poisoned")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Theme {
        name: &'static str,
        dark: bool,
    }

    #[test]
    fn builds_from_struct() {
        let context = Context::from_serialize(&Theme {
            name: "solarized",
            dark: true,
        })
        .unwrap();

        assert_eq!(context.len(), 2);
        assert_eq!(context.get("name"), Some(&Value::from("solarized")));
        assert_eq!(context.get("dark"), Some(&Value::from(true)));
    }

    #[test]
    fn rejects_non_mappings() {
        for value in [json!([1, 2, 3]), json!("text"), json!(42), json!(null)] {
            let error = Context::from_serialize(&value).unwrap_err();
            assert!(matches!(error, Error::InvalidArgument(_)), "{value} was accepted");
        }
    }

    #[test]
    fn merge_prefers_incoming_keys() {
        let mut base = Context::from_serialize(&json!({ "title": "old", "lang": "en" })).unwrap();
        base.merge(Context::from_serialize(&json!({ "title": "new" })).unwrap());

        assert_eq!(base.get("title"), Some(&Value::from("new")));
        assert_eq!(base.get("lang"), Some(&Value::from("en")));
    }

    #[test]
    fn shared_context_accumulates_updates() {
        let shared = SharedContext::default();
        shared.update(&json!({ "site": "demo" })).unwrap();

        let mut patch = HashMap::new();
        patch.insert("year", 2024);
        shared.update(&patch).unwrap();

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.get("site"), Some(&Value::from("demo")));
        assert_eq!(snapshot.get("year"), Some(&Value::from(2024)));
    }

    #[test]
    fn rejected_update_leaves_context_untouched() {
        let site = Context::from_serialize(&json!({ "site": "demo" })).unwrap();
        let shared = SharedContext::new(site);

        assert!(shared.update(&vec!["not", "a", "map"]).is_err());
        assert_eq!(shared.snapshot().len(), 1);
    }

    #[test]
    fn converts_into_map_value() {
        let context = Context::from_serialize(&json!({ "a": 1 })).unwrap();
        let value = context.into_value();

        assert_eq!(value.kind(), ValueKind::Map);
        assert_eq!(value.get_attr("a").unwrap(), Value::from(1));
    }
}
