//! Pattern router
//!
//! Stores `(pattern, payload)` pairs where a pattern is a partial mapping of
//! field names to literal values. Resolution returns the payload of the most
//! specific pattern (most constrained fields) whose fields all equal the
//! corresponding request fields. Among equally specific matches the first
//! registered pattern wins.

use crate::error::{PermError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Partial action request used as a matching key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(BTreeMap<String, Value>);

impl Pattern {
    /// Empty pattern (matches every request)
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add a constrained field
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Build a pattern from a JSON object, dropping `$`-suffixed control keys
    /// (such as `perm$`)
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self(
            map.iter()
                .filter(|(key, _)| !key.ends_with('$'))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Number of constrained fields
    pub fn specificity(&self) -> usize {
        self.0.len()
    }

    /// Check whether every constrained field equals the request's field
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| fields.get(key) == Some(expected))
    }

    /// Constrained value for a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Iterate over the constrained fields in key order
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The pattern as a request field map
    pub fn to_map(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl TryFrom<Value> for Pattern {
    type Error = PermError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(&map)),
            other => Err(PermError::InvalidSpec(format!(
                "pattern must be an object, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            match value {
                Value::String(s) => write!(f, "{}:{}", key, s)?,
                other => write!(f, "{}:{}", key, other)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Route<T> {
    pattern: Pattern,
    payload: T,
}

/// Specificity-ordered pattern router
///
/// Routes are kept sorted by descending specificity, stable in registration
/// order, so `find` returns the first matching route.
#[derive(Debug, Clone)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
}

impl<T> Router<T> {
    /// Create an empty router
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a pattern
    pub fn add(&mut self, pattern: Pattern, payload: T) {
        let specificity = pattern.specificity();
        let index = self
            .routes
            .iter()
            .position(|route| route.pattern.specificity() < specificity)
            .unwrap_or(self.routes.len());
        self.routes.insert(index, Route { pattern, payload });
    }

    /// Replace the payload of an identical pattern, or register it.
    ///
    /// Returns the replaced payload.
    pub fn set(&mut self, pattern: Pattern, payload: T) -> Option<T> {
        match self.routes.iter_mut().find(|route| route.pattern == pattern) {
            Some(route) => Some(std::mem::replace(&mut route.payload, payload)),
            None => {
                self.add(pattern, payload);
                None
            }
        }
    }

    /// Payload of the most specific matching pattern
    pub fn find(&self, fields: &Map<String, Value>) -> Option<&T> {
        self.find_route(fields).map(|(_, payload)| payload)
    }

    /// Most specific matching pattern together with its payload
    pub fn find_route(&self, fields: &Map<String, Value>) -> Option<(&Pattern, &T)> {
        self.routes
            .iter()
            .find(|route| route.pattern.matches(fields))
            .map(|route| (&route.pattern, &route.payload))
    }

    /// Every matching route, most specific first
    pub fn matches<'a>(
        &'a self,
        fields: &'a Map<String, Value>,
    ) -> impl Iterator<Item = (&'a Pattern, &'a T)> + 'a {
        self.routes
            .iter()
            .filter(move |route| route.pattern.matches(fields))
            .map(|route| (&route.pattern, &route.payload))
    }

    /// Payload registered for exactly this pattern
    pub fn get(&self, pattern: &Pattern) -> Option<&T> {
        self.routes
            .iter()
            .find(|route| &route.pattern == pattern)
            .map(|route| &route.payload)
    }

    /// Iterate over routes in resolution order
    pub fn iter(&self) -> impl Iterator<Item = (&Pattern, &T)> {
        self.routes.iter().map(|route| (&route.pattern, &route.payload))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Display> fmt::Display for Router<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for route in &self.routes {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{{{}}} -> {}", route.pattern, route.payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_most_specific_wins() {
        let mut router = Router::new();
        router.add(Pattern::new().with("a", 1), "a");
        router.add(Pattern::new().with("a", 1).with("b", 2), "ab");

        assert_eq!(router.find(&fields(json!({"a": 1, "b": 2, "c": 3}))), Some(&"ab"));
        assert_eq!(router.find(&fields(json!({"a": 1, "b": 3}))), Some(&"a"));
        assert_eq!(router.find(&fields(json!({"b": 2}))), None);
    }

    #[test]
    fn test_tie_first_registered_wins() {
        let mut router = Router::new();
        router.add(Pattern::new().with("a", 1), "first");
        router.add(Pattern::new().with("b", 2), "second");

        assert_eq!(router.find(&fields(json!({"a": 1, "b": 2}))), Some(&"first"));
    }

    #[test]
    fn test_exact_value_equality() {
        let mut router = Router::new();
        router.add(Pattern::new().with("name", "foo"), true);

        assert!(router.find(&fields(json!({"name": "foo"}))).is_some());
        assert!(router.find(&fields(json!({"name": "food"}))).is_none());
        assert!(router.find(&fields(json!({"other": "foo"}))).is_none());
    }

    #[test]
    fn test_empty_pattern_matches_everything_last() {
        let mut router = Router::new();
        router.add(Pattern::new(), "any");
        router.add(Pattern::new().with("name", "foo"), "foo");

        assert_eq!(router.find(&fields(json!({"name": "foo"}))), Some(&"foo"));
        assert_eq!(router.find(&fields(json!({"name": "bar"}))), Some(&"any"));
    }

    #[test]
    fn test_matches_lists_all_in_specificity_order() {
        let mut router = Router::new();
        router.add(Pattern::new(), "any");
        router.add(Pattern::new().with("name", "foo"), "foo");
        router.add(Pattern::new().with("name", "bar"), "bar");

        let request = fields(json!({"name": "foo"}));
        let matched: Vec<_> = router.matches(&request).map(|(_, payload)| *payload).collect();
        assert_eq!(matched, vec!["foo", "any"]);
    }

    #[test]
    fn test_set_replaces_identical_pattern() {
        let mut router = Router::new();
        let pattern = Pattern::new().with("role", "entity").with("cmd", "save");
        router.add(pattern.clone(), 1);

        assert_eq!(router.set(pattern.clone(), 2), Some(1));
        assert_eq!(router.len(), 1);
        assert_eq!(router.get(&pattern), Some(&2));
    }

    #[test]
    fn test_pattern_from_map_drops_control_keys() {
        let pattern = Pattern::try_from(json!({"a": 1, "perm$": true})).unwrap();
        assert_eq!(pattern.specificity(), 1);
        assert_eq!(pattern.to_string(), "a:1");

        assert!(Pattern::try_from(json!("a:1")).is_err());
    }

    #[test]
    fn test_display() {
        let mut router = Router::new();
        router.add(Pattern::new().with("name", "foo"), "cr");
        assert_eq!(router.to_string(), "{name:foo} -> cr");
    }
}
