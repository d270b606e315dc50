//! SCIM schema registry
//!
//! Attribute definitions (RFC 7643 Section 7) for the resource types served here,
//! and the [`SchemaLookup`] capability through which the path parser, the filter
//! compiler and the patch engine resolve attribute metadata. The registry is always
//! passed explicitly; nothing in this crate consults a process-wide schema table.

use serde::{Deserialize, Serialize};

use super::types::{
    ResourceType, SCHEMA_ENTERPRISE_USER, SCHEMA_GROUP, SCHEMA_RESOURCE_TYPE, SCHEMA_SCHEMA,
    SCHEMA_USER, ScimMeta, SchemaExtension,
};

// =============================================================================
// Resource kinds
// =============================================================================

/// The resource types this server provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    User,
    Group,
}

impl ResourceKind {
    /// Resource type name as used in `meta.resourceType`.
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::User => "User",
            ResourceKind::Group => "Group",
        }
    }

    /// Collection endpoint, relative to the SCIM base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            ResourceKind::User => "/Users",
            ResourceKind::Group => "/Groups",
        }
    }

    /// Core schema URN of this resource type.
    pub fn core_schema(self) -> &'static str {
        match self {
            ResourceKind::User => SCHEMA_USER,
            ResourceKind::Group => SCHEMA_GROUP,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("user") {
            Some(ResourceKind::User)
        } else if name.eq_ignore_ascii_case("group") {
            Some(ResourceKind::Group)
        } else {
            None
        }
    }
}

// =============================================================================
// Attribute definitions
// =============================================================================

/// SCIM schema definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimSchema {
    /// Always contains SCHEMA_SCHEMA
    pub schemas: Vec<String>,

    /// Schema URI (e.g., "urn:ietf:params:scim:schemas:core:2.0:User")
    pub id: String,

    /// Human-readable name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Attribute definitions
    pub attributes: Vec<SchemaAttribute>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ScimMeta>,
}

impl ScimSchema {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        attributes: Vec<SchemaAttribute>,
    ) -> Self {
        Self {
            schemas: vec![SCHEMA_SCHEMA.to_string()],
            id: id.into(),
            name: name.into(),
            description: Some(description.into()),
            attributes,
            meta: None,
        }
    }

    /// Find a top-level attribute by name (case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        find_attribute(&self.attributes, name)
    }

    /// The core User schema (RFC 7643 Section 4.1).
    pub fn user() -> Self {
        Self::new(
            SCHEMA_USER,
            "User",
            "User Account",
            vec![
                SchemaAttribute::string(
                    "userName",
                    "Unique identifier for the User",
                    true,
                    Mutability::ReadWrite,
                )
                .with_uniqueness(Uniqueness::Server),
                SchemaAttribute::complex(
                    "name",
                    "The components of the user's real name",
                    false,
                    vec![
                        SchemaAttribute::string(
                            "formatted",
                            "The full name",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "familyName",
                            "The family name of the User",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "givenName",
                            "The given name of the User",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "middleName",
                            "The middle name(s) of the User",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "honorificPrefix",
                            "The honorific prefix(es) of the User",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "honorificSuffix",
                            "The honorific suffix(es) of the User",
                            false,
                            Mutability::ReadWrite,
                        ),
                    ],
                ),
                SchemaAttribute::string(
                    "displayName",
                    "The name of the User, suitable for display",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "nickName",
                    "The casual way to address the user",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::typed(
                    "profileUrl",
                    AttributeType::Reference,
                    "A fully qualified URL pointing to the User's online profile",
                ),
                SchemaAttribute::string("title", "The user's title", false, Mutability::ReadWrite),
                SchemaAttribute::string(
                    "userType",
                    "Relationship between the organization and the user",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "preferredLanguage",
                    "The User's preferred written or spoken language",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "locale",
                    "The User's default location",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "timezone",
                    "The User's time zone in the Olson format",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::boolean(
                    "active",
                    "The User's administrative status",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "password",
                    "The User's cleartext password",
                    false,
                    Mutability::WriteOnly,
                )
                .with_returned(Returned::Never),
                SchemaAttribute::multi_valued(
                    "emails",
                    "Email addresses for the user",
                    false,
                    typed_value_attributes(AttributeType::String),
                ),
                SchemaAttribute::multi_valued(
                    "phoneNumbers",
                    "Phone numbers for the User",
                    false,
                    typed_value_attributes(AttributeType::String),
                ),
                SchemaAttribute::multi_valued(
                    "ims",
                    "Instant messaging addresses for the User",
                    false,
                    typed_value_attributes(AttributeType::String),
                ),
                SchemaAttribute::multi_valued(
                    "photos",
                    "URLs of photos of the User",
                    false,
                    typed_value_attributes(AttributeType::Reference),
                ),
                SchemaAttribute::multi_valued(
                    "addresses",
                    "A physical mailing address for this User",
                    false,
                    vec![
                        SchemaAttribute::string(
                            "formatted",
                            "The full mailing address",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "streetAddress",
                            "The full street address component",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "locality",
                            "The city or locality component",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "region",
                            "The state or region component",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "postalCode",
                            "The zip code or postal code component",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "country",
                            "The country name component",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::string(
                            "type",
                            "A label indicating the attribute's function",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::boolean(
                            "primary",
                            "Indicates the primary address",
                            false,
                            Mutability::ReadWrite,
                        ),
                    ],
                ),
                SchemaAttribute::multi_valued(
                    "groups",
                    "A list of groups to which the user belongs",
                    false,
                    vec![
                        SchemaAttribute::string(
                            "value",
                            "The identifier of the User's group",
                            false,
                            Mutability::ReadOnly,
                        ),
                        SchemaAttribute::typed(
                            "$ref",
                            AttributeType::Reference,
                            "The URI of the group",
                        )
                        .with_mutability(Mutability::ReadOnly),
                        SchemaAttribute::string(
                            "display",
                            "A human-readable name of the group",
                            false,
                            Mutability::ReadOnly,
                        ),
                        SchemaAttribute::string(
                            "type",
                            "Direct or indirect membership",
                            false,
                            Mutability::ReadOnly,
                        ),
                    ],
                )
                .with_mutability(Mutability::ReadOnly),
                SchemaAttribute::multi_valued(
                    "entitlements",
                    "A list of entitlements for the User",
                    false,
                    typed_value_attributes(AttributeType::String),
                ),
                SchemaAttribute::multi_valued(
                    "roles",
                    "A list of roles for the User",
                    false,
                    typed_value_attributes(AttributeType::String),
                ),
                SchemaAttribute::multi_valued(
                    "x509Certificates",
                    "A list of certificates issued to the User",
                    false,
                    typed_value_attributes(AttributeType::Binary),
                ),
            ],
        )
    }

    /// The core Group schema (RFC 7643 Section 4.2).
    pub fn group() -> Self {
        Self::new(
            SCHEMA_GROUP,
            "Group",
            "Group",
            vec![
                SchemaAttribute::string(
                    "displayName",
                    "A human-readable name for the Group",
                    true,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::multi_valued(
                    "members",
                    "A list of members of the Group",
                    false,
                    vec![
                        SchemaAttribute::string(
                            "value",
                            "Identifier of the member",
                            false,
                            Mutability::Immutable,
                        ),
                        SchemaAttribute::typed(
                            "$ref",
                            AttributeType::Reference,
                            "The URI of the member",
                        )
                        .with_mutability(Mutability::Immutable),
                        SchemaAttribute::string(
                            "display",
                            "A human-readable name of the member",
                            false,
                            Mutability::Immutable,
                        ),
                        SchemaAttribute::string(
                            "type",
                            "The type of the member (User or Group)",
                            false,
                            Mutability::Immutable,
                        ),
                    ],
                ),
            ],
        )
    }

    /// The Enterprise User extension (RFC 7643 Section 4.3).
    pub fn enterprise_user() -> Self {
        Self::new(
            SCHEMA_ENTERPRISE_USER,
            "EnterpriseUser",
            "Enterprise User",
            vec![
                SchemaAttribute::string(
                    "employeeNumber",
                    "Numeric or alphanumeric identifier assigned to a person",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "costCenter",
                    "Identifies the name of a cost center",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "organization",
                    "Identifies the name of an organization",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "division",
                    "Identifies the name of a division",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::string(
                    "department",
                    "Identifies the name of a department",
                    false,
                    Mutability::ReadWrite,
                ),
                SchemaAttribute::complex(
                    "manager",
                    "The User's manager",
                    false,
                    vec![
                        SchemaAttribute::string(
                            "value",
                            "The id of the SCIM resource representing the User's manager",
                            false,
                            Mutability::ReadWrite,
                        ),
                        SchemaAttribute::typed(
                            "$ref",
                            AttributeType::Reference,
                            "The URI of the SCIM resource representing the User's manager",
                        ),
                        SchemaAttribute::string(
                            "displayName",
                            "The displayName of the User's manager",
                            false,
                            Mutability::ReadOnly,
                        ),
                    ],
                ),
            ],
        )
    }
}

/// Attributes every resource carries (RFC 7643 Section 3.1).
fn common_attributes() -> Vec<SchemaAttribute> {
    vec![
        SchemaAttribute::string("id", "Unique resource identifier", false, Mutability::ReadOnly)
            .with_case_exact(true)
            .with_returned(Returned::Always)
            .with_uniqueness(Uniqueness::Server),
        SchemaAttribute::string(
            "externalId",
            "Identifier assigned by the provisioning client",
            false,
            Mutability::ReadWrite,
        )
        .with_case_exact(true),
        SchemaAttribute::complex(
            "meta",
            "Resource metadata",
            false,
            vec![
                SchemaAttribute::string(
                    "resourceType",
                    "The name of the resource type",
                    false,
                    Mutability::ReadOnly,
                )
                .with_case_exact(true),
                SchemaAttribute::typed("created", AttributeType::DateTime, "Creation timestamp")
                    .with_mutability(Mutability::ReadOnly),
                SchemaAttribute::typed(
                    "lastModified",
                    AttributeType::DateTime,
                    "Last modification timestamp",
                )
                .with_mutability(Mutability::ReadOnly),
                SchemaAttribute::typed("location", AttributeType::Reference, "Resource URI")
                    .with_mutability(Mutability::ReadOnly),
                SchemaAttribute::string("version", "Resource version", false, Mutability::ReadOnly)
                    .with_case_exact(true),
            ],
        )
        .with_mutability(Mutability::ReadOnly),
    ]
}

/// `value`/`display`/`type`/`primary` sub-attributes shared by the simple
/// multi-valued attributes.
fn typed_value_attributes(value_type: AttributeType) -> Vec<SchemaAttribute> {
    vec![
        SchemaAttribute::typed("value", value_type, "The attribute value"),
        SchemaAttribute::string(
            "display",
            "A human-readable name",
            false,
            Mutability::ReadWrite,
        ),
        SchemaAttribute::string(
            "type",
            "A label indicating the attribute's function",
            false,
            Mutability::ReadWrite,
        ),
        SchemaAttribute::boolean(
            "primary",
            "Indicates the primary value",
            false,
            Mutability::ReadWrite,
        ),
    ]
}

fn find_attribute<'a>(
    attributes: &'a [SchemaAttribute],
    name: &str,
) -> Option<&'a SchemaAttribute> {
    attributes.iter().find(|a| a.name.eq_ignore_ascii_case(name))
}

/// SCIM attribute definition within a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAttribute {
    pub name: String,

    #[serde(rename = "type")]
    pub attr_type: AttributeType,

    pub multi_valued: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub required: bool,

    /// Whether string comparisons are case-sensitive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_exact: Option<bool>,

    pub mutability: Mutability,

    pub returned: Returned,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub uniqueness: Option<Uniqueness>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_attributes: Vec<SchemaAttribute>,
}

impl SchemaAttribute {
    /// A singular, optional, read-write attribute of the given type.
    pub fn typed(name: &str, attr_type: AttributeType, description: &str) -> Self {
        let case_exact = match attr_type {
            AttributeType::String => Some(false),
            AttributeType::Reference | AttributeType::Binary => Some(true),
            _ => None,
        };
        Self {
            name: name.to_string(),
            attr_type,
            multi_valued: false,
            description: Some(description.to_string()),
            required: false,
            case_exact,
            mutability: Mutability::ReadWrite,
            returned: Returned::Default,
            uniqueness: None,
            sub_attributes: Vec::new(),
        }
    }

    pub fn string(name: &str, description: &str, required: bool, mutability: Mutability) -> Self {
        Self {
            required,
            mutability,
            ..Self::typed(name, AttributeType::String, description)
        }
    }

    pub fn boolean(name: &str, description: &str, required: bool, mutability: Mutability) -> Self {
        Self {
            required,
            mutability,
            ..Self::typed(name, AttributeType::Boolean, description)
        }
    }

    /// Create a complex attribute with sub-attributes
    pub fn complex(
        name: &str,
        description: &str,
        required: bool,
        sub_attributes: Vec<SchemaAttribute>,
    ) -> Self {
        Self {
            required,
            sub_attributes,
            ..Self::typed(name, AttributeType::Complex, description)
        }
    }

    /// Create a multi-valued complex attribute
    pub fn multi_valued(
        name: &str,
        description: &str,
        required: bool,
        sub_attributes: Vec<SchemaAttribute>,
    ) -> Self {
        Self {
            multi_valued: true,
            ..Self::complex(name, description, required, sub_attributes)
        }
    }

    pub fn with_mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    pub fn with_returned(mut self, returned: Returned) -> Self {
        self.returned = returned;
        self
    }

    pub fn with_case_exact(mut self, case_exact: bool) -> Self {
        self.case_exact = Some(case_exact);
        self
    }

    pub fn with_uniqueness(mut self, uniqueness: Uniqueness) -> Self {
        self.uniqueness = Some(uniqueness);
        self
    }

    /// Find a sub-attribute by name (case-insensitive).
    pub fn sub_attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        find_attribute(&self.sub_attributes, name)
    }

    pub fn metadata(&self) -> AttributeMetadata {
        AttributeMetadata::from(self)
    }
}

/// SCIM attribute data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    String,
    Boolean,
    Decimal,
    Integer,
    DateTime,
    Reference,
    Complex,
    Binary,
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttributeType::String => "string",
            AttributeType::Boolean => "boolean",
            AttributeType::Decimal => "decimal",
            AttributeType::Integer => "integer",
            AttributeType::DateTime => "dateTime",
            AttributeType::Reference => "reference",
            AttributeType::Complex => "complex",
            AttributeType::Binary => "binary",
        };
        write!(f, "{}", s)
    }
}

/// SCIM attribute mutability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutability {
    ReadOnly,
    ReadWrite,
    Immutable,
    WriteOnly,
}

/// SCIM attribute return behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Returned {
    Always,
    Never,
    Default,
    Request,
}

/// SCIM attribute uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Uniqueness {
    None,
    Server,
    Global,
}

// =============================================================================
// Attribute metadata
// =============================================================================

/// The slice of an attribute definition the expression engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMetadata {
    pub data_type: AttributeType,
    pub multi_valued: bool,
    pub case_exact: bool,
    pub mutability: Mutability,
    pub returned: Returned,
    pub required: bool,
}

impl AttributeMetadata {
    /// Metadata for an extension schema object addressed as a whole.
    pub fn extension() -> Self {
        Self {
            data_type: AttributeType::Complex,
            multi_valued: false,
            case_exact: false,
            mutability: Mutability::ReadWrite,
            returned: Returned::Default,
            required: false,
        }
    }
}

impl From<&SchemaAttribute> for AttributeMetadata {
    fn from(attr: &SchemaAttribute) -> Self {
        Self {
            data_type: attr.attr_type,
            multi_valued: attr.multi_valued,
            case_exact: attr.case_exact.unwrap_or(false),
            mutability: attr.mutability,
            returned: attr.returned,
            required: attr.required,
        }
    }
}

// =============================================================================
// Lookup capability
// =============================================================================

/// Read-only schema capability consumed by the expression engine.
pub trait SchemaLookup: Send + Sync {
    /// Top-level attribute of `kind`, including the common attributes.
    fn attribute(&self, kind: ResourceKind, name: &str) -> Option<&SchemaAttribute>;

    /// Extension schema registered for `kind` under `urn` (case-insensitive).
    fn extension(&self, kind: ResourceKind, urn: &str) -> Option<&ScimSchema>;

    /// Whether `urn` names an extension schema registered for any resource type.
    fn is_known_extension(&self, urn: &str) -> bool;

    /// Whether `urn` names a core resource schema.
    fn is_core_schema(&self, urn: &str) -> bool;

    /// Extension URNs a resource of `kind` must carry in `schemas`.
    fn required_extensions(&self, kind: ResourceKind) -> Vec<String>;

    /// Metadata for a dotted attribute path such as `name.givenName` or
    /// `urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager.value`.
    fn lookup(&self, kind: ResourceKind, path: &str) -> Option<AttributeMetadata> {
        let (extension, rest) = match path.rfind(':') {
            Some(idx) if self.is_core_schema(&path[..idx]) => (None, &path[idx + 1..]),
            Some(idx) => (Some(self.extension(kind, &path[..idx])?), &path[idx + 1..]),
            None => (None, path),
        };
        let mut parts = rest.split('.');
        let first = parts.next()?;
        let mut attr = match extension {
            Some(schema) => schema.attribute(first)?,
            None => self.attribute(kind, first)?,
        };
        for part in parts {
            attr = attr.sub_attribute(part)?;
        }
        Some(attr.metadata())
    }
}

/// Where an attribute name is resolved: a resource's top level, or the
/// attributes of an extension schema or complex attribute.
#[derive(Clone, Copy)]
pub enum AttributeScope<'s> {
    Resource {
        schema: &'s dyn SchemaLookup,
        kind: ResourceKind,
    },
    Attributes(&'s [SchemaAttribute]),
}

impl<'s> AttributeScope<'s> {
    pub fn find(&self, name: &str) -> Option<&'s SchemaAttribute> {
        match *self {
            AttributeScope::Resource { schema, kind } => schema.attribute(kind, name),
            AttributeScope::Attributes(attributes) => find_attribute(attributes, name),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Clone)]
struct RegisteredExtension {
    kind: ResourceKind,
    schema: ScimSchema,
    required: bool,
}

/// In-process schema registry for User and Group resources.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    common: Vec<SchemaAttribute>,
    user: ScimSchema,
    group: ScimSchema,
    extensions: Vec<RegisteredExtension>,
}

impl Default for SchemaRegistry {
    /// Core schemas plus the optional Enterprise User extension.
    fn default() -> Self {
        Self::core().with_extension(ResourceKind::User, ScimSchema::enterprise_user(), false)
    }
}

impl SchemaRegistry {
    /// Core schemas only, no extensions.
    pub fn core() -> Self {
        Self {
            common: common_attributes(),
            user: ScimSchema::user(),
            group: ScimSchema::group(),
            extensions: Vec::new(),
        }
    }

    /// Register an extension schema for `kind`.
    pub fn with_extension(
        mut self,
        kind: ResourceKind,
        schema: ScimSchema,
        required: bool,
    ) -> Self {
        self.extensions.retain(|e| !(e.kind == kind && e.schema.id == schema.id));
        self.extensions.push(RegisteredExtension {
            kind,
            schema,
            required,
        });
        self
    }

    pub fn core_schema(&self, kind: ResourceKind) -> &ScimSchema {
        match kind {
            ResourceKind::User => &self.user,
            ResourceKind::Group => &self.group,
        }
    }

    /// Extension schemas registered for `kind`, in registration order.
    pub fn extensions_for(&self, kind: ResourceKind) -> impl Iterator<Item = (&ScimSchema, bool)> {
        self.extensions
            .iter()
            .filter(move |e| e.kind == kind)
            .map(|e| (&e.schema, e.required))
    }

    /// All schema definitions, as served from `/Schemas`.
    pub fn schema_documents(&self, base_url: &str) -> Vec<ScimSchema> {
        let mut schemas = vec![self.user.clone(), self.group.clone()];
        for ext in &self.extensions {
            if !schemas.iter().any(|s| s.id == ext.schema.id) {
                schemas.push(ext.schema.clone());
            }
        }
        for schema in &mut schemas {
            schema.meta = Some(
                ScimMeta::new("Schema")
                    .with_location(format!("{}/Schemas/{}", base_url, schema.id)),
            );
        }
        schemas
    }

    /// Resource type documents, as served from `/ResourceTypes`.
    pub fn resource_types(&self, base_url: &str) -> Vec<ResourceType> {
        [ResourceKind::User, ResourceKind::Group]
            .into_iter()
            .map(|kind| ResourceType {
                schemas: vec![SCHEMA_RESOURCE_TYPE.to_string()],
                id: kind.name().to_string(),
                name: kind.name().to_string(),
                endpoint: kind.endpoint().to_string(),
                description: self.core_schema(kind).description.clone(),
                schema: kind.core_schema().to_string(),
                schema_extensions: self
                    .extensions_for(kind)
                    .map(|(schema, required)| SchemaExtension {
                        schema: schema.id.clone(),
                        required,
                    })
                    .collect(),
                meta: Some(
                    ScimMeta::new("ResourceType")
                        .with_location(format!("{}/ResourceTypes/{}", base_url, kind.name())),
                ),
            })
            .collect()
    }
}

impl SchemaLookup for SchemaRegistry {
    fn attribute(&self, kind: ResourceKind, name: &str) -> Option<&SchemaAttribute> {
        find_attribute(&self.common, name).or_else(|| self.core_schema(kind).attribute(name))
    }

    fn extension(&self, kind: ResourceKind, urn: &str) -> Option<&ScimSchema> {
        self.extensions
            .iter()
            .find(|e| e.kind == kind && e.schema.id.eq_ignore_ascii_case(urn))
            .map(|e| &e.schema)
    }

    fn is_known_extension(&self, urn: &str) -> bool {
        self.extensions
            .iter()
            .any(|e| e.schema.id.eq_ignore_ascii_case(urn))
    }

    fn is_core_schema(&self, urn: &str) -> bool {
        self.user.id.eq_ignore_ascii_case(urn) || self.group.id.eq_ignore_ascii_case(urn)
    }

    fn required_extensions(&self, kind: ResourceKind) -> Vec<String> {
        self.extensions_for(kind)
            .filter(|(_, required)| *required)
            .map(|(schema, _)| schema.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_core_attribute() {
        let registry = SchemaRegistry::default();
        let meta = registry.lookup(ResourceKind::User, "userName").unwrap();
        assert_eq!(meta.data_type, AttributeType::String);
        assert!(!meta.case_exact);
        assert!(meta.required);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = SchemaRegistry::default();
        assert!(registry.lookup(ResourceKind::User, "USERNAME").is_some());
        assert!(registry.lookup(ResourceKind::User, "Name.GivenName").is_some());
    }

    #[test]
    fn test_lookup_common_attributes() {
        let registry = SchemaRegistry::default();
        let id = registry.lookup(ResourceKind::Group, "id").unwrap();
        assert!(id.case_exact);
        assert_eq!(id.mutability, Mutability::ReadOnly);
        assert_eq!(id.returned, Returned::Always);

        let modified = registry
            .lookup(ResourceKind::Group, "meta.lastModified")
            .unwrap();
        assert_eq!(modified.data_type, AttributeType::DateTime);
    }

    #[test]
    fn test_lookup_extension_attribute() {
        let registry = SchemaRegistry::default();
        let path = format!("{}:manager.value", SCHEMA_ENTERPRISE_USER);
        let meta = registry.lookup(ResourceKind::User, &path).unwrap();
        assert_eq!(meta.data_type, AttributeType::String);

        // The enterprise extension is not registered for groups
        assert!(registry.lookup(ResourceKind::Group, &path).is_none());
    }

    #[test]
    fn test_lookup_fully_qualified_core_attribute() {
        let registry = SchemaRegistry::default();
        let path = format!("{}:name.familyName", SCHEMA_USER);
        assert!(registry.lookup(ResourceKind::User, &path).is_some());
    }

    #[test]
    fn test_lookup_unknown_attribute() {
        let registry = SchemaRegistry::default();
        assert!(registry.lookup(ResourceKind::User, "fooBar").is_none());
        assert!(registry.lookup(ResourceKind::User, "name.fooBar").is_none());
        assert!(registry.lookup(ResourceKind::Group, "userName").is_none());
    }

    #[test]
    fn test_namespace_queries() {
        let registry = SchemaRegistry::default();
        assert!(registry.is_known_extension(SCHEMA_ENTERPRISE_USER));
        assert!(!registry.is_known_extension(SCHEMA_USER));
        assert!(registry.is_core_schema(SCHEMA_GROUP));
        assert!(!registry.is_core_schema("urn:example:unknown"));
    }

    #[test]
    fn test_required_extensions() {
        let registry = SchemaRegistry::default();
        assert!(registry.required_extensions(ResourceKind::User).is_empty());

        let registry = SchemaRegistry::core().with_extension(
            ResourceKind::User,
            ScimSchema::enterprise_user(),
            true,
        );
        assert_eq!(
            registry.required_extensions(ResourceKind::User),
            vec![SCHEMA_ENTERPRISE_USER.to_string()]
        );
        assert!(registry.required_extensions(ResourceKind::Group).is_empty());
    }

    #[test]
    fn test_resource_type_documents() {
        let registry = SchemaRegistry::default();
        let types = registry.resource_types("https://example.com/scim/v2");
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].endpoint, "/Users");
        assert_eq!(types[0].schema_extensions.len(), 1);
        assert!(types[1].schema_extensions.is_empty());

        let json = serde_json::to_value(&types[0]).unwrap();
        assert_eq!(json["schemaExtensions"][0]["required"], false);
    }

    #[test]
    fn test_schema_documents_serialize_attribute_types() {
        let registry = SchemaRegistry::default();
        let schemas = registry.schema_documents("https://example.com/scim/v2");
        assert_eq!(schemas.len(), 3);

        let json = serde_json::to_value(&schemas[0]).unwrap();
        let password = json["attributes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["name"] == "password")
            .unwrap();
        assert_eq!(password["returned"], "never");
        assert_eq!(password["mutability"], "writeOnly");
    }
}
