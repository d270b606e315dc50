//! SCIM 2.0 PATCH Operations
//!
//! This module implements parsing and execution of SCIM PATCH operations per
//! RFC 7644 Section 3.5.2.
//!
//! ## Operations
//!
//! - `add`: Add value(s) to an attribute
//! - `remove`: Remove attribute or specific value from multi-valued attribute
//! - `replace`: Replace attribute value
//!
//! Operations apply in order to a working copy of the resource. The first failing
//! operation aborts the request and the caller never sees a partially patched
//! resource.
//!
//! ## Examples
//!
//! ```json
//! {
//!   "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
//!   "Operations": [
//!     { "op": "replace", "path": "displayName", "value": "New Name" },
//!     { "op": "add", "path": "emails", "value": [{"type": "home", "value": "home@example.com"}] },
//!     { "op": "remove", "path": "members[value eq \"user-123\"]" }
//!   ]
//! }
//! ```

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    compile::{member, member_key},
    error::PatchError,
    filter::FilterNode,
    path::ScimPath,
    resolve::{AddressedTarget, Selection, resolve},
    schema::{
        AttributeScope, AttributeType, Mutability, ResourceKind, SchemaAttribute, SchemaLookup,
    },
    types::SCHEMA_PATCH_OP,
};

/// A SCIM PATCH request containing one or more operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    /// SCIM schema URIs (should contain PatchOp schema)
    pub schemas: Vec<String>,

    /// List of patch operations to apply
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOp>,
}

impl PatchRequest {
    /// Create a new patch request with operations
    pub fn new(operations: Vec<PatchOp>) -> Self {
        Self {
            schemas: vec![SCHEMA_PATCH_OP.to_string()],
            operations,
        }
    }

    /// Validate the request envelope
    pub fn validate(&self) -> Result<(), PatchError> {
        if !self
            .schemas
            .iter()
            .any(|s| s.eq_ignore_ascii_case(SCHEMA_PATCH_OP))
        {
            return Err(PatchError::invalid_syntax(format!(
                "schemas must contain '{}'",
                SCHEMA_PATCH_OP
            )));
        }
        if self.operations.is_empty() {
            return Err(PatchError::invalid_syntax("Operations must not be empty"));
        }

        for (i, op) in self.operations.iter().enumerate() {
            op.validate().map_err(|e| e.at_operation(i))?;
        }

        Ok(())
    }
}

/// A single SCIM PATCH operation.
///
/// Some identity providers capitalize the operation name; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Add value(s) to an attribute
    #[serde(alias = "Add")]
    Add {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        value: Value,
    },
    /// Replace attribute value
    #[serde(alias = "Replace")]
    Replace {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        value: Value,
    },
    /// Remove attribute or value. A `value` on a multi-valued attribute removes
    /// just the listed elements.
    #[serde(alias = "Remove")]
    Remove {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
}

impl PatchOp {
    /// Create an add operation
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Add {
            path: Some(path.into()),
            value,
        }
    }

    /// Create a replace operation
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Replace {
            path: Some(path.into()),
            value,
        }
    }

    /// Create a remove operation
    pub fn remove(path: impl Into<String>) -> Self {
        PatchOp::Remove {
            path: Some(path.into()),
            value: None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Replace { path, .. }
            | PatchOp::Remove { path, .. } => path.as_deref(),
        }
    }

    /// Validate the operation shape. Paths are checked against the schema when applied.
    pub fn validate(&self) -> Result<(), PatchError> {
        match self {
            PatchOp::Remove { path, .. } if path.as_deref().is_none_or(|p| p.trim().is_empty()) => {
                Err(PatchError::no_target("remove requires a path"))
            }
            PatchOp::Add { path: None, value } | PatchOp::Replace { path: None, value }
                if !value.is_object() =>
            {
                Err(PatchError::invalid_value(
                    "an operation without a path requires an object value",
                ))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Mode {
    Add,
    Replace,
}

/// Applies PATCH operations to resources of one type.
#[derive(Clone, Copy)]
pub struct PatchEngine<'s> {
    schema: &'s dyn SchemaLookup,
    kind: ResourceKind,
}

impl<'s> PatchEngine<'s> {
    pub fn new(schema: &'s dyn SchemaLookup, kind: ResourceKind) -> Self {
        Self { schema, kind }
    }

    /// Apply `operations` in order to a copy of `resource`.
    ///
    /// Returns the patched copy, or the error of the first failing operation.
    pub fn apply(&self, resource: &Value, operations: &[PatchOp]) -> Result<Value, PatchError> {
        let mut working = resource.clone();
        for (i, op) in operations.iter().enumerate() {
            self.apply_operation(&mut working, op)
                .map_err(|e| e.at_operation(i))?;
        }
        Ok(working)
    }

    /// Apply one operation in place. On error `resource` may be partially modified.
    pub fn apply_operation(&self, resource: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
        op.validate()?;
        match op {
            PatchOp::Add { path: None, value } => self.apply_members(resource, value, Mode::Add),
            PatchOp::Replace { path: None, value } => {
                self.apply_members(resource, value, Mode::Replace)
            }
            PatchOp::Add {
                path: Some(path),
                value,
            } => self.apply_at(resource, path, value, Mode::Add),
            PatchOp::Replace {
                path: Some(path),
                value,
            } => self.apply_at(resource, path, value, Mode::Replace),
            PatchOp::Remove { path, value } => {
                let path = path.as_deref().unwrap_or_default();
                let target = self.target(resource, path)?;
                self.remove(resource, target, value.as_ref())
            }
        }
    }

    /// An operation without a path: each member of the value is an attribute.
    fn apply_members(
        &self,
        resource: &mut Value,
        value: &Value,
        mode: Mode,
    ) -> Result<(), PatchError> {
        let Value::Object(members) = value else {
            return Err(PatchError::invalid_value(
                "an operation without a path requires an object value",
            ));
        };
        for (key, member_value) in members {
            // Clients echo back `schemas` and read-only attributes; they are not patchable
            let read_only = self
                .schema
                .attribute(self.kind, key)
                .is_some_and(|a| a.mutability == Mutability::ReadOnly);
            if key.eq_ignore_ascii_case("schemas") || read_only {
                continue;
            }
            self.apply_at(resource, key, member_value, mode)?;
        }
        Ok(())
    }

    fn apply_at(
        &self,
        resource: &mut Value,
        path: &str,
        value: &Value,
        mode: Mode,
    ) -> Result<(), PatchError> {
        let target = self.target(resource, path)?;
        if value.is_null() {
            return self.remove(resource, target, None);
        }
        match mode {
            Mode::Add => self.add(resource, target, value),
            Mode::Replace => self.replace(resource, target, value),
        }
    }

    fn target(&self, resource: &Value, path: &str) -> Result<AddressedTarget<'s>, PatchError> {
        let path = ScimPath::parse(path, self.schema)?;
        Ok(resolve(&path, resource, self.schema, self.kind)?)
    }

    fn add(
        &self,
        resource: &mut Value,
        target: AddressedTarget<'s>,
        value: &Value,
    ) -> Result<(), PatchError> {
        let Some(def) = target.definition else {
            let incoming = check_members(value, target.members, &target.attribute)?;
            let object = member_object_mut(container_mut(resource, &[])?, &target.attribute)?;
            for (key, member_value) in incoming {
                set_member(object, &key, member_value);
            }
            register_extension(resource, &target.attribute);
            return Ok(());
        };

        let container = container_mut(resource, &target.container)?;
        match (&target.selection, target.sub_attribute) {
            (Selection::Whole, None) if def.multi_valued => {
                let items = check_elements(value, def)?;
                let array = array_mut(container, &def.name)?;
                for item in items {
                    append_element(array, item);
                }
            }
            (Selection::Whole, None) if def.attr_type == AttributeType::Complex => {
                let incoming = check_members(value, &def.sub_attributes, &def.name)?;
                let object = member_object_mut(container, &def.name)?;
                for (key, member_value) in incoming {
                    if let Some(sub) = find_definition(&def.sub_attributes, &key) {
                        check_immutable(sub, member_of(object, &key), &member_value)?;
                    }
                    set_member(object, &key, member_value);
                }
            }
            (Selection::Whole, None) => {
                let new = check_value(value, def)?;
                check_immutable(def, member_of(container, &def.name), &new)?;
                set_member(container, &def.name, new);
            }
            (Selection::Whole, Some(sub)) => {
                set_on_every_element(container, def, sub, value)?;
            }
            (Selection::Matched(indices), sub) if indices.is_empty() => {
                let element = seed_element(&target, def, sub, value)?;
                append_element(array_mut(container, &def.name)?, element);
            }
            (Selection::Matched(indices), Some(sub)) => {
                let new = check_value(value, sub)?;
                let array = array_mut(container, &def.name)?;
                if sub_is_primary(sub, &new) {
                    clear_primary(array, |i| indices.contains(&i));
                }
                for &i in indices {
                    if let Some(item) = array.get_mut(i) {
                        set_sub_attribute(item, sub, new.clone())?;
                    }
                }
            }
            (Selection::Matched(indices), None) => {
                let incoming = check_members(value, &def.sub_attributes, &def.name)?;
                let array = array_mut(container, &def.name)?;
                if is_primary_members(&incoming) {
                    clear_primary(array, |i| indices.contains(&i));
                }
                for &i in indices {
                    if let Some(item) = array.get_mut(i) {
                        let object = object_mut(item, &def.name)?;
                        for (key, member_value) in &incoming {
                            set_member(object, key, member_value.clone());
                        }
                    }
                }
            }
        }

        if let Some(urn) = &target.extension {
            register_extension(resource, urn);
        }
        Ok(())
    }

    fn replace(
        &self,
        resource: &mut Value,
        target: AddressedTarget<'s>,
        value: &Value,
    ) -> Result<(), PatchError> {
        let Some(def) = target.definition else {
            let incoming = check_members(value, target.members, &target.attribute)?;
            set_member(container_mut(resource, &[])?, &target.attribute, Value::Object(incoming));
            register_extension(resource, &target.attribute);
            return Ok(());
        };

        let target = target.require_match()?;
        let container = container_mut(resource, &target.container)?;
        match (&target.selection, target.sub_attribute) {
            (Selection::Whole, None) => {
                let new = check_value(value, def)?;
                if def.multi_valued
                    && new
                        .as_array()
                        .is_some_and(|items| items.iter().filter(|i| is_primary(i)).count() > 1)
                {
                    return Err(PatchError::invalid_value(format!(
                        "at most one '{}' value may be primary",
                        def.name
                    )));
                }
                check_immutable(def, member_of(container, &def.name), &new)?;
                set_member(container, &def.name, new);
            }
            (Selection::Whole, Some(sub)) => {
                set_on_every_element(container, def, sub, value)?;
            }
            (Selection::Matched(indices), Some(sub)) => {
                let new = check_value(value, sub)?;
                let array = array_mut(container, &def.name)?;
                if sub_is_primary(sub, &new) {
                    clear_primary(array, |i| indices.contains(&i));
                }
                for &i in indices {
                    if let Some(item) = array.get_mut(i) {
                        set_sub_attribute(item, sub, new.clone())?;
                    }
                }
            }
            (Selection::Matched(indices), None) => {
                let new = check_single(value, def)?;
                let array = array_mut(container, &def.name)?;
                if is_primary(&new) {
                    clear_primary(array, |i| indices.contains(&i));
                }
                for &i in indices {
                    if let Some(item) = array.get_mut(i) {
                        *item = new.clone();
                    }
                }
                dedup_elements(array);
            }
        }

        if let Some(urn) = &target.extension {
            register_extension(resource, urn);
        }
        Ok(())
    }

    fn remove(
        &self,
        resource: &mut Value,
        target: AddressedTarget<'s>,
        value: Option<&Value>,
    ) -> Result<(), PatchError> {
        let Some(def) = target.definition else {
            if self
                .schema
                .required_extensions(self.kind)
                .iter()
                .any(|urn| urn.eq_ignore_ascii_case(&target.attribute))
            {
                return Err(PatchError::invalid_value(format!(
                    "extension '{}' is required",
                    target.attribute
                )));
            }
            if let Some(root) = resource.as_object_mut() {
                remove_member(root, &target.attribute);
            }
            unregister_extension(resource, &target.attribute);
            return Ok(());
        };

        let target = target.require_match()?;
        let Some(container) = existing_container_mut(resource, &target.container) else {
            return Ok(());
        };

        match (&target.selection, target.sub_attribute) {
            (Selection::Whole, None) => {
                if def.required {
                    return Err(PatchError::invalid_value(format!(
                        "'{}' is required",
                        def.name
                    )));
                }
                match value {
                    Some(candidates) if def.multi_valued => {
                        if let Some(array) = existing_array_mut(container, &def.name) {
                            let candidates = as_slice(candidates);
                            array.retain(|item| !candidates.iter().any(|c| same_element(c, item)));
                        }
                    }
                    _ => {
                        if def.mutability == Mutability::Immutable
                            && member_of(container, &def.name)
                                .is_some_and(super::compile::is_present)
                        {
                            return Err(PatchError::mutability(format!(
                                "'{}' is immutable",
                                def.name
                            )));
                        }
                        remove_member(container, &def.name);
                    }
                }
            }
            (Selection::Whole, Some(sub)) => {
                require_removable(def, sub)?;
                if let Some(array) = existing_array_mut(container, &def.name) {
                    for item in array.iter_mut() {
                        remove_sub_attribute(item, sub)?;
                    }
                }
            }
            (Selection::Matched(indices), None) => {
                if let Some(array) = existing_array_mut(container, &def.name) {
                    let mut index = 0;
                    array.retain(|_| {
                        let keep = !indices.contains(&index);
                        index += 1;
                        keep
                    });
                }
            }
            (Selection::Matched(indices), Some(sub)) => {
                require_removable(def, sub)?;
                if let Some(array) = existing_array_mut(container, &def.name) {
                    for &i in indices {
                        if let Some(item) = array.get_mut(i) {
                            remove_sub_attribute(item, sub)?;
                        }
                    }
                }
            }
        }

        // A multi-valued attribute with no values left is unassigned
        if existing_array_mut(container, &def.name).is_some_and(|items| items.is_empty()) {
            remove_member(container, &def.name);
        }
        if let Some(urn) = &target.extension {
            prune_extension(resource, urn);
        }
        Ok(())
    }
}

fn require_removable(def: &SchemaAttribute, sub: &SchemaAttribute) -> Result<(), PatchError> {
    if sub.required {
        return Err(PatchError::invalid_value(format!(
            "'{}.{}' is required",
            def.name, sub.name
        )));
    }
    Ok(())
}

/// `emails.type` style targets: set the sub-attribute on every element.
fn set_on_every_element(
    container: &mut Map<String, Value>,
    def: &SchemaAttribute,
    sub: &SchemaAttribute,
    value: &Value,
) -> Result<(), PatchError> {
    let new = check_value(value, sub)?;
    let array = existing_array_mut(container, &def.name)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| PatchError::no_target(format!("'{}' has no values", def.name)))?;
    if sub_is_primary(sub, &new) && array.len() > 1 {
        return Err(PatchError::invalid_value(format!(
            "at most one '{}' value may be primary",
            def.name
        )));
    }
    for item in array.iter_mut() {
        set_sub_attribute(item, sub, new.clone())?;
    }
    Ok(())
}

/// Build the element a filtered `add` creates when nothing matches yet.
///
/// Only a plain equality filter such as `emails[type eq "work"]` says what the new
/// element looks like.
fn seed_element(
    target: &AddressedTarget<'_>,
    def: &SchemaAttribute,
    sub: Option<&SchemaAttribute>,
    value: &Value,
) -> Result<Value, PatchError> {
    let seeds = target
        .filter
        .as_ref()
        .and_then(FilterNode::equality_seeds)
        .ok_or_else(|| {
            PatchError::no_target(format!("no values matched '{}'", target.path))
        })?;

    let mut element = Map::new();
    for (name, literal) in seeds {
        element.insert(name.to_string(), literal.to_json());
    }
    match (sub, value) {
        (Some(sub), value) => {
            element.insert(sub.name.clone(), value.clone());
        }
        (None, Value::Object(members)) => {
            element.extend(members.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        (None, _) => {
            return Err(PatchError::invalid_value(format!(
                "'{}' expects an object",
                def.name
            )));
        }
    }
    check_single(&Value::Object(element), def)
}

// =============================================================================
// Value checks
// =============================================================================

fn find_definition<'a>(members: &'a [SchemaAttribute], name: &str) -> Option<&'a SchemaAttribute> {
    AttributeScope::Attributes(members).find(name)
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        single => std::slice::from_ref(single),
    }
}

/// Check a value against an attribute definition, returning it with canonical
/// member names. A single value for a multi-valued attribute becomes a one-element array.
fn check_value(value: &Value, def: &SchemaAttribute) -> Result<Value, PatchError> {
    if def.multi_valued {
        check_elements(value, def).map(Value::Array)
    } else {
        check_single(value, def)
    }
}

fn check_elements(value: &Value, def: &SchemaAttribute) -> Result<Vec<Value>, PatchError> {
    as_slice(value)
        .iter()
        .map(|item| check_single(item, def))
        .collect()
}

fn check_single(value: &Value, def: &SchemaAttribute) -> Result<Value, PatchError> {
    let mismatch = || {
        PatchError::invalid_value(format!(
            "'{}' expects a {} value, got {}",
            def.name, def.attr_type, value
        ))
    };

    match def.attr_type {
        AttributeType::Complex => {
            check_members(value, &def.sub_attributes, &def.name).map(Value::Object)
        }
        AttributeType::String | AttributeType::Reference | AttributeType::Binary => {
            value.is_string().then(|| value.clone()).ok_or_else(mismatch)
        }
        AttributeType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            // Some clients send booleans as "True"/"False"
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        AttributeType::Integer => (value.is_i64() || value.is_u64())
            .then(|| value.clone())
            .ok_or_else(mismatch),
        AttributeType::Decimal => value.is_number().then(|| value.clone()).ok_or_else(mismatch),
        AttributeType::DateTime => value
            .as_str()
            .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok())
            .then(|| value.clone())
            .ok_or_else(mismatch),
    }
}

/// Check the members of a complex value. Read-only and null members are dropped.
fn check_members(
    value: &Value,
    members: &[SchemaAttribute],
    owner: &str,
) -> Result<Map<String, Value>, PatchError> {
    let Value::Object(object) = value else {
        return Err(PatchError::invalid_value(format!(
            "'{}' expects an object, got {}",
            owner, value
        )));
    };

    let mut checked = Map::new();
    for (key, member_value) in object {
        let def = find_definition(members, key).ok_or_else(|| {
            PatchError::invalid_value(format!("'{}' has no sub-attribute '{}'", owner, key))
        })?;
        if def.mutability == Mutability::ReadOnly || member_value.is_null() {
            continue;
        }
        checked.insert(def.name.clone(), check_value(member_value, def)?);
    }
    Ok(checked)
}

/// Immutable attributes may be assigned once; re-assigning the same value is allowed.
fn check_immutable(
    def: &SchemaAttribute,
    current: Option<&Value>,
    new: &Value,
) -> Result<(), PatchError> {
    if def.mutability == Mutability::Immutable
        && current.is_some_and(super::compile::is_present)
        && current != Some(new)
    {
        return Err(PatchError::mutability(format!(
            "'{}' is immutable",
            def.name
        )));
    }
    Ok(())
}

// =============================================================================
// JSON tree edits
// =============================================================================

fn object_mut<'v>(
    value: &'v mut Value,
    name: &str,
) -> Result<&'v mut Map<String, Value>, PatchError> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| PatchError::invalid_value(format!("'{}' does not hold an object", name)))
}

/// The object at `keys`, created along the way when absent.
fn container_mut<'v>(
    resource: &'v mut Value,
    keys: &[String],
) -> Result<&'v mut Map<String, Value>, PatchError> {
    let mut current = object_mut(resource, "resource")?;
    for key in keys {
        current = member_object_mut(current, key)?;
    }
    Ok(current)
}

/// The object at `keys`, if every step exists.
fn existing_container_mut<'v>(
    resource: &'v mut Value,
    keys: &[String],
) -> Option<&'v mut Map<String, Value>> {
    let mut current = resource.as_object_mut()?;
    for key in keys {
        let key = member_key(current, key)?.clone();
        current = current.get_mut(&key)?.as_object_mut()?;
    }
    Some(current)
}

fn member_object_mut<'m>(
    map: &'m mut Map<String, Value>,
    name: &str,
) -> Result<&'m mut Map<String, Value>, PatchError> {
    let key = member_key(map, name)
        .cloned()
        .unwrap_or_else(|| name.to_string());
    object_mut(map.entry(key).or_insert(Value::Null), name)
}

fn member_of<'m>(map: &'m Map<String, Value>, name: &str) -> Option<&'m Value> {
    member_key(map, name).and_then(|key| map.get(key))
}

fn array_mut<'m>(
    map: &'m mut Map<String, Value>,
    name: &str,
) -> Result<&'m mut Vec<Value>, PatchError> {
    let key = member_key(map, name)
        .cloned()
        .unwrap_or_else(|| name.to_string());
    let slot = map.entry(key).or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
        .ok_or_else(|| PatchError::invalid_value(format!("'{}' does not hold a list", name)))
}

fn existing_array_mut<'m>(
    map: &'m mut Map<String, Value>,
    name: &str,
) -> Option<&'m mut Vec<Value>> {
    let key = member_key(map, name)?.clone();
    map.get_mut(&key)?.as_array_mut()
}

/// Set `name`, replacing any differently-cased key.
fn set_member(map: &mut Map<String, Value>, name: &str, value: Value) {
    if let Some(existing) = member_key(map, name).cloned()
        && existing != name
    {
        map.remove(&existing);
    }
    map.insert(name.to_string(), value);
}

fn remove_member(map: &mut Map<String, Value>, name: &str) -> Option<Value> {
    let key = member_key(map, name)?.clone();
    map.remove(&key)
}

fn set_sub_attribute(
    item: &mut Value,
    sub: &SchemaAttribute,
    new: Value,
) -> Result<(), PatchError> {
    let object = object_mut(item, &sub.name)?;
    check_immutable(sub, member_of(object, &sub.name), &new)?;
    set_member(object, &sub.name, new);
    Ok(())
}

fn remove_sub_attribute(item: &mut Value, sub: &SchemaAttribute) -> Result<(), PatchError> {
    let Some(object) = item.as_object_mut() else {
        return Ok(());
    };
    if sub.mutability == Mutability::Immutable
        && member_of(object, &sub.name).is_some_and(super::compile::is_present)
    {
        return Err(PatchError::mutability(format!("'{}' is immutable", sub.name)));
    }
    remove_member(object, &sub.name);
    Ok(())
}

fn is_primary(item: &Value) -> bool {
    member(item, "primary").and_then(Value::as_bool) == Some(true)
}

fn is_primary_members(members: &Map<String, Value>) -> bool {
    member_of(members, "primary").and_then(Value::as_bool) == Some(true)
}

fn sub_is_primary(sub: &SchemaAttribute, value: &Value) -> bool {
    sub.name == "primary" && value.as_bool() == Some(true)
}

/// Clear `primary` on every element except those `keep` selects.
fn clear_primary(items: &mut [Value], keep: impl Fn(usize) -> bool) {
    for (i, item) in items.iter_mut().enumerate() {
        if !keep(i)
            && is_primary(item)
            && let Some(object) = item.as_object_mut()
        {
            set_member(object, "primary", Value::Bool(false));
        }
    }
}

/// Append a multi-valued element unless an equal one exists. A new primary
/// element demotes the current one.
fn append_element(items: &mut Vec<Value>, item: Value) {
    if items.contains(&item) {
        return;
    }
    if is_primary(&item) {
        clear_primary(items, |_| false);
    }
    items.push(item);
}

fn dedup_elements(items: &mut Vec<Value>) {
    let mut seen: Vec<Value> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(item.clone());
            true
        }
    });
}

/// Whether a removal candidate names `item`: by `value` when both carry one,
/// otherwise by equality.
fn same_element(candidate: &Value, item: &Value) -> bool {
    match (member(candidate, "value"), member(item, "value")) {
        (Some(a), Some(b)) => a == b,
        _ => candidate == item,
    }
}

fn register_extension(resource: &mut Value, urn: &str) {
    let Some(root) = resource.as_object_mut() else {
        return;
    };
    let Ok(schemas) = array_mut(root, "schemas") else {
        return;
    };
    if !schemas
        .iter()
        .any(|s| s.as_str().is_some_and(|s| s.eq_ignore_ascii_case(urn)))
    {
        schemas.push(Value::String(urn.to_string()));
    }
}

fn unregister_extension(resource: &mut Value, urn: &str) {
    if let Some(root) = resource.as_object_mut()
        && let Some(schemas) = existing_array_mut(root, "schemas")
    {
        schemas.retain(|s| !s.as_str().is_some_and(|s| s.eq_ignore_ascii_case(urn)));
    }
}

/// Drop an extension object left empty by a removal.
fn prune_extension(resource: &mut Value, urn: &str) {
    let empty = member(resource, urn)
        .and_then(Value::as_object)
        .is_some_and(|object| object.is_empty());
    if empty {
        if let Some(root) = resource.as_object_mut() {
            remove_member(root, urn);
        }
        unregister_extension(resource, urn);
    }
}

// =============================================================================
// Tests
// =============================================================================
