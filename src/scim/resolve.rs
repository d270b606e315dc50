//! PATCH path resolution
//!
//! Resolves a parsed [`ScimPath`] against a live resource into the
//! [`AddressedTarget`] a PATCH operation acts on. Bracketed value filters are
//! compiled with the filter compiler and evaluated element by element, so the
//! target of `addresses[type eq "work"].postalCode` is the set of matching
//! `addresses` elements plus the `postalCode` sub-attribute of each.

use serde_json::Value;

use super::{
    compile::{compile_element_filter, member},
    error::ScimError,
    filter::FilterNode,
    path::ScimPath,
    schema::{
        AttributeMetadata, AttributeScope, AttributeType, Mutability, ResourceKind,
        SchemaAttribute, SchemaLookup,
    },
};

/// Which values of the addressed attribute an operation touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The attribute as a whole (every element, for a multi-valued attribute)
    Whole,
    /// Indices of the elements selected by a value filter, in order
    Matched(Vec<usize>),
}

/// The part of a resource a PATCH path addresses.
#[derive(Debug, Clone)]
pub struct AddressedTarget<'s> {
    /// Normalized path text, for error details
    pub path: String,
    /// JSON keys from the resource root to the object owning `attribute`
    pub container: Vec<String>,
    /// Key of the addressed attribute within its container
    pub attribute: String,
    /// Schema definition of the attribute; None for a whole extension object
    pub definition: Option<&'s SchemaAttribute>,
    pub attribute_metadata: AttributeMetadata,
    /// Definitions of the attribute's members: sub-attributes of a complex
    /// attribute, or the attributes of a whole extension object
    pub members: &'s [SchemaAttribute],
    pub selection: Selection,
    pub sub_attribute: Option<&'s SchemaAttribute>,
    /// The value filter behind a `Matched` selection
    pub filter: Option<FilterNode>,
    /// Extension schema the target belongs to
    pub extension: Option<String>,
}

impl<'s> AddressedTarget<'s> {
    /// Metadata of the innermost addressed attribute.
    pub fn metadata(&self) -> AttributeMetadata {
        self.sub_attribute
            .map(SchemaAttribute::metadata)
            .unwrap_or(self.attribute_metadata)
    }

    /// Whether the target is a whole extension schema object.
    pub fn is_extension_object(&self) -> bool {
        self.container.is_empty() && self.extension.as_deref() == Some(self.attribute.as_str())
    }

    /// Fail with `NoTarget` when a value filter selected nothing.
    pub fn require_match(self) -> Result<Self, ScimError> {
        match &self.selection {
            Selection::Matched(indices) if indices.is_empty() => Err(ScimError::NoTarget {
                path: self.path,
                detail: "no values matched the filter".to_string(),
            }),
            _ => Ok(self),
        }
    }
}

/// Resolve `path` against `resource`.
pub fn resolve<'s>(
    path: &ScimPath,
    resource: &Value,
    schema: &'s dyn SchemaLookup,
    kind: ResourceKind,
) -> Result<AddressedTarget<'s>, ScimError> {
    let normalized = path.normalized().to_string();
    let invalid = |detail: &str| ScimError::InvalidPath {
        path: normalized.clone(),
        detail: detail.to_string(),
    };
    let no_target = |detail: String| ScimError::NoTarget {
        path: normalized.clone(),
        detail,
    };

    let expressions = path.expressions();
    let mut container: Vec<String> = Vec::new();
    let mut scope = AttributeScope::Resource { schema, kind };
    let mut extension: Option<String> = None;
    let mut i = 0;

    while let Some(expr) = expressions.get(i) {
        let is_last = i + 1 == expressions.len();

        if expr.is_schema_urn() {
            let urn = expr.path().unwrap_or_default();
            if i != 0 {
                return Err(invalid("a schema URN must start the path"));
            }
            let schema_def = schema
                .extension(kind, urn)
                .ok_or_else(|| no_target(format!("schema '{}' is not supported here", urn)))?;
            extension = Some(schema_def.id.clone());
            if is_last {
                return Ok(AddressedTarget {
                    path: normalized,
                    container,
                    attribute: schema_def.id.clone(),
                    definition: None,
                    attribute_metadata: AttributeMetadata::extension(),
                    members: &schema_def.attributes,
                    selection: Selection::Whole,
                    sub_attribute: None,
                    filter: None,
                    extension,
                });
            }
            container.push(schema_def.id.clone());
            scope = AttributeScope::Attributes(&schema_def.attributes);
            i += 1;
            continue;
        }

        let Some(name) = expr.path() else {
            return Err(invalid("a filter does not address an attribute"));
        };
        let attr = scope
            .find(name)
            .ok_or_else(|| no_target(format!("unknown attribute '{}'", name)))?;
        if attr.mutability == Mutability::ReadOnly {
            return Err(ScimError::ReadOnlyAttribute(attr.name.clone()));
        }

        if !attr.multi_valued {
            if expr.filter().is_some() {
                return Err(invalid("value filters apply to multi-valued attributes"));
            }
            if !is_last {
                if attr.attr_type != AttributeType::Complex {
                    return Err(no_target(format!("'{}' has no sub-attributes", attr.name)));
                }
                container.push(attr.name.clone());
                scope = AttributeScope::Attributes(&attr.sub_attributes);
                i += 1;
                continue;
            }
        }

        let filter = expr.filter_node()?;
        let selection = match &filter {
            None => Selection::Whole,
            Some(node) => {
                let element_filter = compile_element_filter(
                    node,
                    AttributeScope::Attributes(&attr.sub_attributes),
                    schema,
                    kind,
                )?;
                let indices = lookup(resource, &container, &attr.name)
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .enumerate()
                            .filter(|(_, item)| element_filter.matches(item))
                            .map(|(idx, _)| idx)
                            .collect()
                    })
                    .unwrap_or_default();
                Selection::Matched(indices)
            }
        };

        // After a multi-valued attribute only a final sub-attribute may follow
        let sub_attribute = match expressions.get(i + 1) {
            None => None,
            Some(next) => {
                let (Some(sub_name), true) = (next.path(), next.is_path_only()) else {
                    return Err(invalid("expected a sub-attribute after the value filter"));
                };
                if i + 2 != expressions.len() {
                    return Err(invalid("too many path segments"));
                }
                let sub = attr.sub_attribute(sub_name).ok_or_else(|| {
                    no_target(format!("'{}' has no sub-attribute '{}'", attr.name, sub_name))
                })?;
                if sub.mutability == Mutability::ReadOnly {
                    return Err(ScimError::ReadOnlyAttribute(format!(
                        "{}.{}",
                        attr.name, sub.name
                    )));
                }
                Some(sub)
            }
        };

        return Ok(AddressedTarget {
            path: normalized,
            container,
            attribute: attr.name.clone(),
            definition: Some(attr),
            attribute_metadata: attr.metadata(),
            members: &attr.sub_attributes,
            selection,
            sub_attribute,
            filter,
            extension,
        });
    }

    Err(invalid("empty path"))
}

/// The value at `container` + `attribute`, matching keys case-insensitively.
pub(crate) fn lookup<'v>(
    resource: &'v Value,
    container: &[String],
    attribute: &str,
) -> Option<&'v Value> {
    let mut current = resource;
    for key in container {
        current = member(current, key)?;
    }
    member(current, attribute)
}
