//! Attribute projection (RFC 7644 Section 3.4.2.5)
//!
//! Applies the `attributes` / `excludedAttributes` request parameters and the
//! schema's `returned` characteristic to a canonical resource tree before it is
//! written to the wire. `returned: never` attributes are always stripped,
//! `returned: always` attributes always survive, and `returned: request`
//! attributes appear only when explicitly listed in `attributes`.

use serde_json::{Map, Value};

use super::{
    error::ScimError,
    path::ScimPath,
    schema::{AttributeScope, ResourceKind, Returned, SchemaAttribute, SchemaLookup},
};

/// One entry of an `attributes` or `excludedAttributes` list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    /// Extension schema the attribute lives in
    extension: Option<String>,
    /// None selects a whole extension object
    attribute: Option<String>,
    sub_attribute: Option<String>,
}

impl Selector {
    fn in_extension(&self, urn: Option<&str>) -> bool {
        match (self.extension.as_deref(), urn) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    fn names(&self, attribute: &str) -> bool {
        self.attribute
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(attribute))
    }
}

/// A parsed `attributes` / `excludedAttributes` pair.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    include: Option<Vec<Selector>>,
    exclude: Vec<Selector>,
}

impl Projection {
    /// Parse the comma-separated parameter values.
    ///
    /// `attributes` wins when both are given. Names that the schema does not
    /// define are ignored.
    pub fn parse(
        attributes: Option<&str>,
        excluded_attributes: Option<&str>,
        schema: &dyn SchemaLookup,
        kind: ResourceKind,
    ) -> Result<Self, ScimError> {
        let include = match attributes.filter(|a| !a.trim().is_empty()) {
            Some(list) => Some(parse_list(list, schema, kind)?),
            None => None,
        };
        let exclude = match (&include, excluded_attributes) {
            (None, Some(list)) => parse_list(list, schema, kind)?,
            _ => Vec::new(),
        };
        Ok(Self { include, exclude })
    }

    pub fn is_default(&self) -> bool {
        self.include.is_none() && self.exclude.is_empty()
    }

    /// Project a canonical resource tree.
    pub fn apply(&self, resource: &Value, schema: &dyn SchemaLookup, kind: ResourceKind) -> Value {
        let Value::Object(object) = resource else {
            return resource.clone();
        };

        let mut projected = Map::new();
        for (key, value) in object {
            if key == "schemas" {
                projected.insert(key.clone(), value.clone());
                continue;
            }

            if let Some(extension) = schema.extension(kind, key) {
                if let Some(value) =
                    self.project_extension(key, value, extension.attributes.as_slice())
                {
                    projected.insert(key.clone(), value);
                }
                continue;
            }

            let scope = AttributeScope::Resource { schema, kind };
            if let Some(value) = self.project_attribute(None, key, value, scope) {
                projected.insert(key.clone(), value);
            }
        }
        Value::Object(projected)
    }

    fn project_extension(
        &self,
        urn: &str,
        value: &Value,
        attributes: &[SchemaAttribute],
    ) -> Option<Value> {
        let whole = |selectors: &[Selector]| {
            selectors
                .iter()
                .any(|s| s.in_extension(Some(urn)) && s.attribute.is_none())
        };
        if whole(&self.exclude) {
            return None;
        }
        if let Some(include) = &self.include
            && !include.iter().any(|s| s.in_extension(Some(urn)))
        {
            return None;
        }

        let Value::Object(object) = value else {
            return Some(value.clone());
        };
        let inner = match &self.include {
            Some(include) if whole(include) => Projection {
                include: None,
                exclude: self.exclude.clone(),
            },
            _ => self.clone(),
        };
        let scope = AttributeScope::Attributes(attributes);
        let projected: Map<String, Value> = object
            .iter()
            .filter_map(|(key, value)| {
                inner
                    .project_attribute(Some(urn), key, value, scope)
                    .map(|v| (key.clone(), v))
            })
            .collect();
        (!projected.is_empty()).then_some(Value::Object(projected))
    }

    fn project_attribute(
        &self,
        extension: Option<&str>,
        key: &str,
        value: &Value,
        scope: AttributeScope<'_>,
    ) -> Option<Value> {
        let Some(def) = scope.find(key) else {
            return self.include.is_none().then(|| value.clone());
        };
        match def.returned {
            Returned::Never => return None,
            Returned::Always => return Some(strip_never(value, def)),
            _ => {}
        }

        let selects = |s: &&Selector| s.in_extension(extension) && s.names(&def.name);

        if let Some(include) = &self.include {
            let listed: Vec<&Selector> = include.iter().filter(selects).collect();
            if listed.is_empty() {
                return None;
            }
            if !listed.iter().any(|s| s.sub_attribute.is_none()) {
                let subs: Vec<&str> = listed
                    .iter()
                    .filter_map(|s| s.sub_attribute.as_deref())
                    .collect();
                return keep_sub_attributes(value, def, |name| {
                    subs.iter().any(|s| s.eq_ignore_ascii_case(name))
                });
            }
        } else if def.returned == Returned::Request {
            return None;
        }

        let excluded: Vec<&Selector> = self.exclude.iter().filter(selects).collect();
        if excluded.iter().any(|s| s.sub_attribute.is_none()) {
            return None;
        }
        if !excluded.is_empty() {
            let subs: Vec<&str> = excluded
                .iter()
                .filter_map(|s| s.sub_attribute.as_deref())
                .collect();
            return keep_sub_attributes(value, def, |name| {
                !subs.iter().any(|s| s.eq_ignore_ascii_case(name))
            });
        }
        Some(strip_never(value, def))
    }
}

fn parse_list(
    list: &str,
    schema: &dyn SchemaLookup,
    kind: ResourceKind,
) -> Result<Vec<Selector>, ScimError> {
    let mut selectors = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let path = match ScimPath::parse(name, schema) {
            Ok(path) => path,
            Err(ScimError::UnknownAttribute(_)) => continue,
            Err(err) => return Err(err),
        };
        if let Some(selector) = selector(&path, schema, kind) {
            selectors.push(selector);
        }
    }
    Ok(selectors)
}

fn selector(path: &ScimPath, schema: &dyn SchemaLookup, kind: ResourceKind) -> Option<Selector> {
    let mut segments = path.expressions().iter();
    let mut first = segments.next()?;

    let mut extension = None;
    if first.is_schema_urn() {
        let urn = schema.extension(kind, first.path()?)?;
        extension = Some(urn.id.clone());
        match segments.next() {
            Some(next) => first = next,
            None => {
                return Some(Selector {
                    extension,
                    attribute: None,
                    sub_attribute: None,
                });
            }
        }
    }

    let attribute = first.is_path_only().then(|| first.path())??;
    let sub_attribute = match segments.next() {
        Some(sub) if sub.is_path_only() => Some(sub.path()?.to_string()),
        Some(_) => return None,
        None => None,
    };
    if segments.next().is_some() {
        return None;
    }

    Some(Selector {
        extension,
        attribute: Some(attribute.to_string()),
        sub_attribute,
    })
}

/// Keep the sub-attributes of a complex value (or of each element) for which `keep` holds.
fn keep_sub_attributes(
    value: &Value,
    def: &SchemaAttribute,
    keep: impl Fn(&str) -> bool,
) -> Option<Value> {
    let filter_object = |object: &Map<String, Value>| -> Map<String, Value> {
        object
            .iter()
            .filter(|(name, _)| {
                let returned = def.sub_attribute(name).map(|s| s.returned);
                match returned {
                    Some(Returned::Never) => false,
                    Some(Returned::Always) => true,
                    _ => keep(name),
                }
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };

    match value {
        Value::Object(object) => {
            let kept = filter_object(object);
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        Value::Array(items) => {
            let kept: Vec<Value> = items
                .iter()
                .map(|item| match item {
                    Value::Object(object) => Value::Object(filter_object(object)),
                    other => other.clone(),
                })
                .filter(|item| item.as_object().is_none_or(|o| !o.is_empty()))
                .collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        other => Some(other.clone()),
    }
}

fn strip_never(value: &Value, def: &SchemaAttribute) -> Value {
    if def.sub_attributes.iter().all(|s| s.returned != Returned::Never) {
        return value.clone();
    }
    keep_sub_attributes(value, def, |_| true).unwrap_or(Value::Null)
}
