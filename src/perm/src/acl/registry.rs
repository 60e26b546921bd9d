//! Access control rule registry and property allow-lists

use super::rule::{AccessControlRule, AclAction, Control};
use crate::engine::decision::{Denial, DenialCode};
use crate::entity::{Entity, EntityCommand, EntityId, OWNER_FIELD};
use crate::error::Result;
use crate::request::ActionRequest;
use crate::router::{Pattern, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Record identity, never filtered
const ID_FIELD: &str = "id";

/// Declared visible fields for one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedProperties {
    pub entity: EntityId,
    pub fields: Vec<String>,
}

/// Canonical entity id to the fields visible and settable for it.
///
/// Entity types without an entry are unrestricted.
#[derive(Debug, Clone, Default)]
pub struct PropertyAllowList {
    entries: BTreeMap<String, (EntityId, Vec<String>)>,
}

impl PropertyAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_properties(properties: &[AllowedProperties]) -> Self {
        let mut list = Self::new();
        for property in properties {
            list.insert(&property.entity, property.fields.iter().cloned());
        }
        list
    }

    /// Replace the allow-list of an entity type
    pub fn insert(&mut self, entity: &EntityId, fields: impl IntoIterator<Item = String>) {
        let mut ordered: Vec<String> = Vec::new();
        for field in fields {
            if !ordered.contains(&field) {
                ordered.push(field);
            }
        }
        self.entries.insert(entity.canon(), (entity.clone(), ordered));
    }

    pub fn get(&self, entity: &EntityId) -> Option<&[String]> {
        self.entries
            .get(&entity.canon())
            .map(|(_, fields)| fields.as_slice())
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.values().map(|(entity, _)| entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fields to drop for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
    hidden: BTreeSet<String>,
    visible_only: Option<BTreeSet<String>>,
}

impl FieldFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn hide<'a>(&mut self, fields: impl IntoIterator<Item = &'a String>) {
        self.hidden.extend(fields.into_iter().cloned());
    }

    /// Restrict to the given fields (intersecting earlier restrictions)
    pub fn restrict_to(&mut self, fields: &[String]) {
        let allowed: BTreeSet<String> = fields.iter().cloned().collect();
        self.visible_only = Some(match self.visible_only.take() {
            Some(current) => current.intersection(&allowed).cloned().collect(),
            None => allowed,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.hidden.is_empty() && self.visible_only.is_none()
    }

    /// Whether `field` is filtered. Identity and owner attribution are
    /// always kept: the gate stamps `owner` before this stage runs.
    pub fn is_hidden(&self, field: &str) -> bool {
        if field == ID_FIELD || field == OWNER_FIELD {
            return false;
        }
        self.hidden.contains(field)
            || self
                .visible_only
                .as_ref()
                .is_some_and(|visible| !visible.contains(field))
    }

    /// Hidden fields referenced by `entity`, in key order
    pub fn hidden_in(&self, entity: &Entity) -> Vec<String> {
        entity
            .keys()
            .filter(|field| self.is_hidden(field))
            .cloned()
            .collect()
    }

    /// Drop hidden fields, returning their names
    pub fn strip(&self, entity: &mut Entity) -> Vec<String> {
        let hidden = self.hidden_in(entity);
        for field in &hidden {
            entity.remove(field);
        }
        hidden
    }

    /// Strip a handler result: an entity or a list of entities
    pub fn strip_value(&self, value: &mut Value) {
        match value {
            Value::Object(entity) => {
                self.strip(entity);
            }
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(entity) = item {
                        self.strip(entity);
                    }
                }
            }
            _ => {}
        }
    }

    /// Make a write unable to introduce or change hidden fields: hidden
    /// fields take the value the stored entity already has, or are dropped.
    pub fn restrict_write(&self, ent: &mut Entity, existing: Option<&Entity>) -> Vec<String> {
        let removed = self.strip(ent);
        if let Some(existing) = existing {
            for (field, value) in existing {
                if self.is_hidden(field) {
                    ent.insert(field.clone(), value.clone());
                }
            }
        }
        removed
    }
}

/// Compiled access control rules
pub struct AclRegistry {
    rules: Vec<AccessControlRule>,
    routes: Router<Vec<usize>>,
    allow_list: PropertyAllowList,
}

impl AclRegistry {
    /// Validate the rules and index them by `{role, cmd, zone, base, name}`
    pub fn new(rules: Vec<AccessControlRule>, allow_list: PropertyAllowList) -> Result<Self> {
        let mut grouped: Vec<(Pattern, Vec<usize>)> = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            rule.validate()?;
            for entity in &rule.entities {
                for action in &rule.actions {
                    let pattern = action.command().pattern(entity);
                    match grouped.iter_mut().find(|(existing, _)| *existing == pattern) {
                        Some((_, indices)) if indices.contains(&index) => {}
                        Some((_, indices)) => indices.push(index),
                        None => grouped.push((pattern, vec![index])),
                    }
                }
            }
        }

        let mut routes = Router::new();
        for (pattern, indices) in grouped {
            routes.add(pattern, indices);
        }

        info!(
            "AclRegistry built with {} rules, {} routes, {} allow-lists",
            rules.len(),
            routes.len(),
            allow_list.len()
        );

        Ok(Self {
            rules,
            routes,
            allow_list,
        })
    }

    pub fn rules(&self) -> &[AccessControlRule] {
        &self.rules
    }

    pub fn allow_list(&self) -> &PropertyAllowList {
        &self.allow_list
    }

    /// Entity handler patterns the registry has to intercept
    pub fn patterns(&self) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self.routes.iter().map(|(p, _)| p.clone()).collect();
        for entity in self.allow_list.entities() {
            for cmd in EntityCommand::ALL {
                let pattern = cmd.pattern(entity);
                if !patterns.contains(&pattern) {
                    patterns.push(pattern);
                }
            }
        }
        patterns
    }

    /// Evaluate the rules covering a request.
    ///
    /// Returns the fields to filter, or the denial of the first failing
    /// `required` rule.
    pub fn evaluate(
        &self,
        request: &ActionRequest,
        caller_roles: &[String],
        denied_status: u16,
    ) -> std::result::Result<FieldFilter, Denial> {
        let mut filter = FieldFilter::none();
        let Some(action) = AclAction::of(request) else {
            return Ok(filter);
        };
        let entity = request.entity_id();

        let mut seen = BTreeSet::new();
        let applicable = self
            .routes
            .matches(request.fields())
            .flat_map(|(_, indices)| indices.iter().copied())
            .filter(|index| seen.insert(*index))
            .map(|index| &self.rules[index])
            .filter(|rule| rule.applies(action, request.fields()));

        for rule in applicable {
            if rule.grants(caller_roles) {
                continue;
            }
            match rule.control {
                Control::Required => {
                    debug!("Rule '{}' denies {:?} on {}", rule.name, action, entity);
                    return Err(Denial::new(DenialCode::FailAcl, request.to_args())
                        .with_rule(rule.name.clone(), &rule.roles)
                        .with_status(denied_status));
                }
                Control::Filter if rule.filters.is_some() => filter.hide(rule.hidden_fields()),
                Control::Filter => {
                    if let Some(fields) = self.allow_list.get(&entity) {
                        filter.restrict_to(fields);
                    }
                }
            }
        }

        if let Some(fields) = self.allow_list.get(&entity) {
            filter.restrict_to(fields);
        }

        Ok(filter)
    }
}
