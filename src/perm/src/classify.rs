//! Operation classification and operation grants
//!
//! Entity commands imply a set of operation codes:
//!
//! | verb     | with id | without id |
//! |----------|---------|------------|
//! | `save`   | `u`     | `c`        |
//! | `load`   | `r`     | `rq`       |
//! | `remove` | `d`     | `dq`       |
//! | `list`   | `q`     | `q`        |
//!
//! A [`Grant`] (an "opspec" such as `"crudq"` or the wildcard `"*"`)
//! authorizes a request only if it holds every character of every required
//! code.

use crate::entity::{ENT_FIELD, QUERY_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Access operation implied by an entity command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationCode {
    Create,
    Update,
    Read,
    ReadQuery,
    Delete,
    DeleteQuery,
    Query,
}

impl OperationCode {
    /// Short code used in grants and diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCode::Create => "c",
            OperationCode::Update => "u",
            OperationCode::Read => "r",
            OperationCode::ReadQuery => "rq",
            OperationCode::Delete => "d",
            OperationCode::DeleteQuery => "dq",
            OperationCode::Query => "q",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of operation codes required by a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSet(Vec<OperationCode>);

impl OperationSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn of(code: OperationCode) -> Self {
        Self(vec![code])
    }

    pub fn insert(&mut self, code: OperationCode) {
        if !self.0.contains(&code) {
            self.0.push(code);
        }
    }

    pub fn contains(&self, code: OperationCode) -> bool {
        self.0.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = OperationCode> + '_ {
        self.0.iter().copied()
    }

    /// Every grant character the set needs
    fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.0.iter().flat_map(|code| code.as_str().chars())
    }
}

impl fmt::Display for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.0 {
            f.write_str(code.as_str())?;
        }
        Ok(())
    }
}

/// Operations granted by an entity rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Grant {
    /// `*`: every operation
    Wildcard,
    /// Character set of operation codes, e.g. `"cr"`
    Codes(String),
}

impl Grant {
    pub fn parse(spec: &str) -> Self {
        if spec == "*" {
            Grant::Wildcard
        } else {
            Grant::Codes(spec.to_string())
        }
    }

    /// Whether this grant covers every required code.
    ///
    /// An empty requirement set (unclassified verb) is only satisfied by a
    /// non-empty grant.
    pub fn satisfies(&self, need: &OperationSet) -> bool {
        match self {
            Grant::Wildcard => true,
            Grant::Codes(codes) if need.is_empty() => !codes.is_empty(),
            Grant::Codes(codes) => need.chars().all(|c| codes.contains(c)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Grant::Wildcard => "*",
            Grant::Codes(codes) => codes,
        }
    }
}

impl From<String> for Grant {
    fn from(spec: String) -> Self {
        Grant::parse(&spec)
    }
}

impl From<&str> for Grant {
    fn from(spec: &str) -> Self {
        Grant::parse(spec)
    }
}

impl From<Grant> for String {
    fn from(grant: Grant) -> Self {
        grant.as_str().to_string()
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the operation codes implied by a verb and the request shape.
///
/// Unrecognized verbs yield an empty set: no restriction is known.
pub fn classify(verb: &str, fields: &Map<String, Value>) -> OperationSet {
    match verb {
        "save" => OperationSet::of(if has_id(fields.get(ENT_FIELD)) {
            OperationCode::Update
        } else {
            OperationCode::Create
        }),
        "load" => OperationSet::of(if has_id(fields.get(QUERY_FIELD)) {
            OperationCode::Read
        } else {
            OperationCode::ReadQuery
        }),
        "remove" => OperationSet::of(if has_id(fields.get(QUERY_FIELD)) {
            OperationCode::Delete
        } else {
            OperationCode::DeleteQuery
        }),
        "list" => OperationSet::of(OperationCode::Query),
        _ => OperationSet::empty(),
    }
}

/// Identifier carried by an entity payload or query object
pub fn id_of(object: Option<&Value>) -> Option<&Value> {
    object
        .and_then(|value| value.get("id"))
        .filter(|id| match id {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
}

fn has_id(object: Option<&Value>) -> bool {
    id_of(object).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn need(value: Value) -> OperationSet {
        let fields = value.as_object().unwrap().clone();
        let verb = fields.get("cmd").and_then(Value::as_str).unwrap_or("").to_string();
        classify(&verb, &fields)
    }

    #[test]
    fn test_classify_entity_commands() {
        assert_eq!(need(json!({"cmd": "save", "ent": {"a": 1}})).to_string(), "c");
        assert_eq!(need(json!({"cmd": "save", "ent": {"id": "x1"}})).to_string(), "u");
        assert_eq!(need(json!({"cmd": "load", "q": {"id": "x1"}})).to_string(), "r");
        assert_eq!(need(json!({"cmd": "load", "q": {"a": 1}})).to_string(), "rq");
        assert_eq!(need(json!({"cmd": "remove", "q": {"id": 7}})).to_string(), "d");
        assert_eq!(need(json!({"cmd": "remove", "q": {}})).to_string(), "dq");
        assert_eq!(need(json!({"cmd": "list", "q": {"id": "x1"}})).to_string(), "q");
    }

    #[test]
    fn test_null_or_empty_id_is_absent() {
        assert_eq!(need(json!({"cmd": "save", "ent": {"id": null}})).to_string(), "c");
        assert_eq!(need(json!({"cmd": "load", "q": {"id": ""}})).to_string(), "rq");
        assert_eq!(need(json!({"cmd": "load"})).to_string(), "rq");
    }

    #[test]
    fn test_unknown_verb_is_empty() {
        assert!(need(json!({"cmd": "frobnicate"})).is_empty());
    }

    #[test]
    fn test_grant_satisfies() {
        let cr = Grant::parse("cr");
        assert!(cr.satisfies(&OperationSet::of(OperationCode::Create)));
        assert!(cr.satisfies(&OperationSet::of(OperationCode::Read)));
        assert!(!cr.satisfies(&OperationSet::of(OperationCode::Update)));
        assert!(!cr.satisfies(&OperationSet::of(OperationCode::ReadQuery)));

        let rq = Grant::parse("rq");
        assert!(rq.satisfies(&OperationSet::of(OperationCode::Query)));
        assert!(rq.satisfies(&OperationSet::of(OperationCode::ReadQuery)));
        assert!(!rq.satisfies(&OperationSet::of(OperationCode::DeleteQuery)));

        assert!(Grant::Wildcard.satisfies(&OperationSet::of(OperationCode::DeleteQuery)));
    }

    #[test]
    fn test_empty_need_requires_non_empty_grant() {
        assert!(Grant::parse("r").satisfies(&OperationSet::empty()));
        assert!(!Grant::parse("").satisfies(&OperationSet::empty()));
        assert!(Grant::Wildcard.satisfies(&OperationSet::empty()));
    }

    #[test]
    fn test_grant_serde() {
        let grant: Grant = serde_json::from_value(json!("*")).unwrap();
        assert_eq!(grant, Grant::Wildcard);
        assert_eq!(serde_json::to_value(Grant::parse("cr")).unwrap(), json!("cr"));
    }
}
