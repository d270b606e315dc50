//! SCIM filter predicate compiler
//!
//! Compiles a parsed [`ScimPath`] against the attribute schema of a resource type
//! into a [`CompiledFilter`] that can be evaluated against any number of resources.
//!
//! Semantics (RFC 7644 Section 3.4.2.2):
//!
//! - Attribute names resolve case-insensitively; unknown names fail at compile time.
//! - Multi-valued attributes are existential: `emails co "x"` holds when any
//!   element's `value` contains `x`, `emails[type eq "work"]` when any element
//!   satisfies the bracketed filter.
//! - Strings compare case-insensitively unless the attribute is `caseExact`.
//! - Ordering operators use the declared type: `dateTime` is temporal, `integer`
//!   and `decimal` numeric, `string` lexical. Booleans, binaries and references
//!   are not ordered.
//! - `pr` holds for values that are neither null nor empty; `eq null` holds
//!   when the attribute is absent and `ne` holds when no value is equal.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::{
    error::ScimError,
    filter::{AttrPath, CompareOp, FilterNode, FilterValue},
    path::ScimPath,
    schema::{
        AttributeMetadata, AttributeScope, AttributeType, ResourceKind, SchemaAttribute,
        SchemaLookup,
    },
};

// =============================================================================
// JSON tree access
// =============================================================================

/// Key of `name` in `object`, matched case-insensitively.
pub(crate) fn member_key<'m>(object: &'m Map<String, Value>, name: &str) -> Option<&'m String> {
    if let Some((key, _)) = object.get_key_value(name) {
        return Some(key);
    }
    object.keys().find(|k| k.eq_ignore_ascii_case(name))
}

/// Member `name` of a JSON object, matched case-insensitively.
pub(crate) fn member<'v>(value: &'v Value, name: &str) -> Option<&'v Value> {
    let object = value.as_object()?;
    member_key(object, name).and_then(|key| object.get(key))
}

/// Whether a value counts as assigned: not null and not empty.
pub(crate) fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => items.iter().any(is_present),
        Value::Object(members) => !members.is_empty(),
        _ => true,
    }
}

/// All values reached by following `keys`, flattening multi-valued attributes.
fn collect<'v>(value: &'v Value, keys: &[String]) -> Vec<&'v Value> {
    let mut current = vec![value];
    for key in keys {
        current = current
            .into_iter()
            .filter_map(|v| member(v, key))
            .flat_map(flatten)
            .collect();
    }
    current
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

// =============================================================================
// Compiled form
// =============================================================================

/// A filter compiled against a resource schema.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
enum Step {
    /// Descend into an extension schema object
    Extension(String),
    /// Descend into an attribute, keeping the elements the filter selects
    Attribute {
        name: String,
        filter: Option<ElementFilter>,
    },
    /// Test the values in scope
    Test(ElementFilter),
}

impl CompiledFilter {
    /// Whether `resource` satisfies the filter.
    pub fn matches(&self, resource: &Value) -> bool {
        let mut scope = vec![resource];
        for step in &self.steps {
            scope = match step {
                Step::Extension(urn) => scope.into_iter().filter_map(|v| member(v, urn)).collect(),
                Step::Attribute { name, filter } => scope
                    .into_iter()
                    .filter_map(|v| member(v, name))
                    .flat_map(flatten)
                    .filter(|v| filter.as_ref().is_none_or(|f| f.matches(v)))
                    .collect(),
                Step::Test(filter) => scope.into_iter().filter(|v| filter.matches(v)).collect(),
            };
            if scope.is_empty() {
                return false;
            }
        }
        true
    }
}

/// A filter evaluated against a single object: a resource, an extension object,
/// or one element of a multi-valued attribute.
#[derive(Debug, Clone)]
pub struct ElementFilter(Predicate);

impl ElementFilter {
    pub fn matches(&self, value: &Value) -> bool {
        self.0.matches(value)
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Compare {
        keys: Vec<String>,
        op: CompareOp,
        literal: Literal,
        case_exact: bool,
    },
    Present(Vec<String>),
    Any {
        keys: Vec<String>,
        inner: Box<Predicate>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Compare {
                keys,
                op,
                literal,
                case_exact,
            } => {
                let values = collect(value, keys);
                match (op, literal) {
                    (CompareOp::Eq, Literal::Null) => !values.into_iter().any(is_present),
                    (CompareOp::Ne, Literal::Null) => values.into_iter().any(is_present),
                    (CompareOp::Ne, _) => !values
                        .into_iter()
                        .any(|v| test(v, CompareOp::Eq, literal, *case_exact)),
                    _ => values.into_iter().any(|v| test(v, *op, literal, *case_exact)),
                }
            }
            Predicate::Present(keys) => collect(value, keys).into_iter().any(is_present),
            Predicate::Any { keys, inner } => {
                collect(value, keys).into_iter().any(|v| inner.matches(v))
            }
            Predicate::And(left, right) => left.matches(value) && right.matches(value),
            Predicate::Or(left, right) => left.matches(value) || right.matches(value),
            Predicate::Not(inner) => !inner.matches(value),
        }
    }
}

/// A comparison literal converted to the attribute's declared type.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    DateTime(DateTime<Utc>),
    Text(String),
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn json_decimal(value: &Value) -> Option<Decimal> {
    let Value::Number(n) = value else {
        return None;
    };
    n.as_i64()
        .map(Decimal::from)
        .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok()))
}

impl Literal {
    /// Read a JSON value as a literal of `data_type`.
    fn from_json(value: &Value, data_type: AttributeType) -> Option<Self> {
        match data_type {
            AttributeType::String | AttributeType::Reference | AttributeType::Binary => {
                value.as_str().map(|s| Literal::Text(s.to_string()))
            }
            AttributeType::Boolean => value.as_bool().map(Literal::Bool),
            AttributeType::Integer => value.as_i64().map(Literal::Integer),
            AttributeType::Decimal => json_decimal(value).map(Literal::Decimal),
            AttributeType::DateTime => {
                value.as_str().and_then(parse_datetime).map(Literal::DateTime)
            }
            AttributeType::Complex => None,
        }
    }
}

/// Order `value` against `literal`; None when the value is not of the literal's type.
fn compare_literal(value: &Value, literal: &Literal, case_exact: bool) -> Option<Ordering> {
    match literal {
        Literal::Null => None,
        Literal::Bool(b) => value.as_bool().map(|v| v.cmp(b)),
        Literal::Integer(i) => value.as_i64().map(|v| v.cmp(i)),
        Literal::Decimal(d) => json_decimal(value).map(|v| v.cmp(d)),
        Literal::DateTime(t) => value.as_str().and_then(parse_datetime).map(|v| v.cmp(t)),
        Literal::Text(t) => value.as_str().map(|s| {
            if case_exact {
                s.cmp(t.as_str())
            } else {
                s.to_lowercase().cmp(&t.to_lowercase())
            }
        }),
    }
}

fn test(value: &Value, op: CompareOp, literal: &Literal, case_exact: bool) -> bool {
    if op.is_substring() {
        let (Some(s), Literal::Text(t)) = (value.as_str(), literal) else {
            return false;
        };
        let (s, t) = if case_exact {
            (s.to_string(), t.clone())
        } else {
            (s.to_lowercase(), t.to_lowercase())
        };
        return match op {
            CompareOp::Co => s.contains(&t),
            CompareOp::Sw => s.starts_with(&t),
            _ => s.ends_with(&t),
        };
    }

    let Some(ordering) = compare_literal(value, literal, case_exact) else {
        return false;
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Co | CompareOp::Sw | CompareOp::Ew => false,
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// Compile a parsed filter against the schema of `kind`.
///
/// Each segment narrows the scope: an extension URN selects the extension object,
/// an attribute selects its values (filtered by a bracketed filter when present),
/// and a trailing filter tests what remains.
pub fn compile(
    path: &ScimPath,
    schema: &dyn SchemaLookup,
    kind: ResourceKind,
) -> Result<CompiledFilter, ScimError> {
    if !path.ends_with_filter() {
        return Err(ScimError::syntax(
            "Expected comparison after attribute path",
            path.normalized().len(),
        ));
    }

    let compiler = Compiler { schema, kind };
    let mut scope = AttributeScope::Resource { schema, kind };
    let mut steps = Vec::with_capacity(path.expressions().len());

    for expr in path.expressions() {
        let node = expr.filter_node()?;
        match expr.path() {
            Some(urn) if expr.is_schema_urn() => {
                let extension = schema
                    .extension(kind, urn)
                    .ok_or_else(|| ScimError::UnknownAttribute(urn.to_string()))?;
                steps.push(Step::Extension(extension.id.clone()));
                scope = AttributeScope::Attributes(&extension.attributes);
            }
            Some(name) => {
                let attr = scope
                    .find(name)
                    .ok_or_else(|| ScimError::UnknownAttribute(name.to_string()))?;
                let inner = AttributeScope::Attributes(&attr.sub_attributes);
                let filter = match node {
                    Some(_) if attr.attr_type != AttributeType::Complex => {
                        return Err(ScimError::InvalidPath {
                            path: path.normalized().to_string(),
                            detail: format!("'{}' is not a complex attribute", attr.name),
                        });
                    }
                    Some(node) => Some(ElementFilter(compiler.compile_node(&node, inner)?)),
                    None => None,
                };
                steps.push(Step::Attribute {
                    name: attr.name.clone(),
                    filter,
                });
                scope = inner;
            }
            None => {
                let Some(node) = node else { continue };
                steps.push(Step::Test(ElementFilter(compiler.compile_node(&node, scope)?)));
            }
        }
    }

    Ok(CompiledFilter { steps })
}

/// Compile a bracketed value filter for the elements of a complex attribute.
pub fn compile_element_filter(
    node: &FilterNode,
    scope: AttributeScope<'_>,
    schema: &dyn SchemaLookup,
    kind: ResourceKind,
) -> Result<ElementFilter, ScimError> {
    Compiler { schema, kind }
        .compile_node(node, scope)
        .map(ElementFilter)
}

struct Compiler<'s> {
    schema: &'s dyn SchemaLookup,
    kind: ResourceKind,
}

impl<'s> Compiler<'s> {
    fn compile_node(
        &self,
        node: &FilterNode,
        scope: AttributeScope<'s>,
    ) -> Result<Predicate, ScimError> {
        Ok(match node {
            FilterNode::Comparison { attr, op, value } => {
                self.compile_comparison(attr, *op, value, scope)?
            }
            FilterNode::Presence { attr } => Predicate::Present(self.resolve(attr, scope)?.0),
            FilterNode::ValuePath { attr, filter } => {
                let (keys, metadata, sub_attributes) = self.resolve(attr, scope)?;
                if metadata.data_type != AttributeType::Complex {
                    return Err(ScimError::InvalidPath {
                        path: attr.to_string(),
                        detail: "value filters apply to complex attributes".to_string(),
                    });
                }
                Predicate::Any {
                    keys,
                    inner: Box::new(
                        self.compile_node(filter, AttributeScope::Attributes(sub_attributes))?,
                    ),
                }
            }
            FilterNode::And(left, right) => Predicate::And(
                Box::new(self.compile_node(left, scope)?),
                Box::new(self.compile_node(right, scope)?),
            ),
            FilterNode::Or(left, right) => Predicate::Or(
                Box::new(self.compile_node(left, scope)?),
                Box::new(self.compile_node(right, scope)?),
            ),
            FilterNode::Not(inner) => Predicate::Not(Box::new(self.compile_node(inner, scope)?)),
            FilterNode::Group(inner) => self.compile_node(inner, scope)?,
        })
    }

    /// Resolve an attribute path to its JSON keys, metadata and sub-attributes.
    fn resolve(
        &self,
        attr: &AttrPath,
        scope: AttributeScope<'s>,
    ) -> Result<(Vec<String>, AttributeMetadata, &'s [SchemaAttribute]), ScimError> {
        let unknown = || ScimError::UnknownAttribute(attr.to_string());
        let mut keys = Vec::with_capacity(3);

        let scope = match (&attr.schema, scope) {
            (None, scope) => scope,
            (Some(urn), scope @ AttributeScope::Resource { .. })
                if self.schema.is_core_schema(urn) =>
            {
                scope
            }
            (Some(urn), AttributeScope::Resource { .. }) => {
                let extension = self.schema.extension(self.kind, urn).ok_or_else(unknown)?;
                keys.push(extension.id.clone());
                AttributeScope::Attributes(&extension.attributes)
            }
            (Some(_), AttributeScope::Attributes(_)) => return Err(unknown()),
        };

        let top = scope.find(&attr.attr).ok_or_else(unknown)?;
        keys.push(top.name.clone());
        let target = match &attr.sub_attr {
            Some(sub) => {
                let sub = top.sub_attribute(sub).ok_or_else(unknown)?;
                keys.push(sub.name.clone());
                sub
            }
            None => top,
        };

        Ok((keys, target.metadata(), &target.sub_attributes))
    }

    fn compile_comparison(
        &self,
        attr: &AttrPath,
        op: CompareOp,
        value: &FilterValue,
        scope: AttributeScope<'s>,
    ) -> Result<Predicate, ScimError> {
        let (mut keys, mut metadata, sub_attributes) = self.resolve(attr, scope)?;

        // `emails co "x"` compares the `value` sub-attribute of each element
        if metadata.data_type == AttributeType::Complex
            && metadata.multi_valued
            && let Some(value_attr) = AttributeScope::Attributes(sub_attributes).find("value")
        {
            keys.push(value_attr.name.clone());
            metadata = value_attr.metadata();
        }

        let unsupported = || ScimError::UnsupportedOperator {
            attribute: attr.to_string(),
            op,
            data_type: metadata.data_type,
        };
        let supported = match metadata.data_type {
            AttributeType::Complex => false,
            AttributeType::Boolean => matches!(op, CompareOp::Eq | CompareOp::Ne),
            AttributeType::String => true,
            AttributeType::Reference | AttributeType::Binary => !op.is_ordering(),
            AttributeType::Integer | AttributeType::Decimal | AttributeType::DateTime => {
                !op.is_substring()
            }
        };
        if !supported {
            return Err(unsupported());
        }

        let literal = typed_literal(attr, op, value, metadata.data_type)?;
        Ok(Predicate::Compare {
            keys,
            op,
            literal,
            case_exact: metadata.case_exact,
        })
    }
}

fn typed_literal(
    attr: &AttrPath,
    op: CompareOp,
    value: &FilterValue,
    data_type: AttributeType,
) -> Result<Literal, ScimError> {
    let invalid = |detail: String| ScimError::InvalidLiteral {
        attribute: attr.to_string(),
        detail,
    };

    match (data_type, value) {
        (_, FilterValue::Null) if matches!(op, CompareOp::Eq | CompareOp::Ne) => Ok(Literal::Null),
        (_, FilterValue::Null) => Err(invalid(format!("null cannot be compared with '{}'", op))),
        (
            AttributeType::String | AttributeType::Reference | AttributeType::Binary,
            FilterValue::String(s),
        ) => Ok(Literal::Text(s.clone())),
        (AttributeType::Boolean, FilterValue::Bool(b)) => Ok(Literal::Bool(*b)),
        (AttributeType::Integer, FilterValue::Number(n)) if n.fract().is_zero() => i64::try_from(*n)
            .map(Literal::Integer)
            .map_err(|_| invalid(format!("{} is out of range", n))),
        (AttributeType::Decimal, FilterValue::Number(n)) => Ok(Literal::Decimal(*n)),
        (AttributeType::DateTime, FilterValue::String(s)) => parse_datetime(s)
            .map(Literal::DateTime)
            .ok_or_else(|| invalid(format!("'{}' is not an RFC 3339 timestamp", s))),
        (data_type, other) => Err(invalid(format!("{} is not a {} value", other, data_type))),
    }
}

// =============================================================================
// Sorting
// =============================================================================

/// Typed ordering of resources by one attribute, for `sortBy`.
#[derive(Debug, Clone)]
pub struct SortKey {
    keys: Vec<String>,
    metadata: AttributeMetadata,
}

impl SortKey {
    /// Compile a `sortBy` attribute path.
    pub fn compile(
        path: &ScimPath,
        schema: &dyn SchemaLookup,
        kind: ResourceKind,
    ) -> Result<Self, ScimError> {
        let invalid = |detail: &str| ScimError::InvalidPath {
            path: path.normalized().to_string(),
            detail: detail.to_string(),
        };

        let mut scope = AttributeScope::Resource { schema, kind };
        let mut keys = Vec::new();
        let mut metadata = None;

        let last = path.expressions().len().saturating_sub(1);
        for (i, expr) in path.expressions().iter().enumerate() {
            let (Some(name), true) = (expr.path(), expr.is_path_only()) else {
                return Err(invalid("sortBy must be an attribute path"));
            };
            if expr.is_schema_urn() {
                let extension = schema
                    .extension(kind, name)
                    .ok_or_else(|| ScimError::UnknownAttribute(name.to_string()))?;
                keys.push(extension.id.clone());
                scope = AttributeScope::Attributes(&extension.attributes);
                continue;
            }
            let attr = scope
                .find(name)
                .ok_or_else(|| ScimError::UnknownAttribute(name.to_string()))?;
            keys.push(attr.name.clone());
            metadata = Some(attr.metadata());
            scope = AttributeScope::Attributes(&attr.sub_attributes);

            if attr.attr_type == AttributeType::Complex
                && attr.multi_valued
                && i == last
                && let Some(value_attr) = attr.sub_attribute("value")
            {
                keys.push(value_attr.name.clone());
                metadata = Some(value_attr.metadata());
            }
        }

        let metadata = metadata.ok_or_else(|| invalid("sortBy must name an attribute"))?;
        if metadata.data_type == AttributeType::Complex {
            return Err(invalid("cannot sort by a complex attribute"));
        }
        Ok(Self { keys, metadata })
    }

    /// Ascending order of two resources. Resources without a value sort last.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (self.first_value(a), self.first_value(b)) {
            (Some(a), Some(b)) => Literal::from_json(b, self.metadata.data_type)
                .and_then(|literal| compare_literal(a, &literal, self.metadata.case_exact))
                .unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn first_value<'v>(&self, resource: &'v Value) -> Option<&'v Value> {
        collect(resource, &self.keys).into_iter().find(|v| is_present(v))
    }
}
