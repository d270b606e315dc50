//! SCIM 2.0 Protocol Implementation
//!
//! The expression and mutation core of the provisioning server: attribute paths
//! and filters, their evaluation against resource trees, and PATCH.
//!
//! ## RFC References
//!
//! - RFC 7643: SCIM Core Schema
//! - RFC 7644: SCIM Protocol
//!
//! ## Module Structure
//!
//! - [`filter`]: filter AST and recursive-descent parser
//! - [`path`]: attribute path / filter expression sequences and their normalized form
//! - [`schema`]: attribute metadata and the schema registry
//! - [`compile`]: filters compiled into predicates over resource trees
//! - [`resolve`]: PATCH paths resolved against a live resource
//! - [`patch`]: PATCH request types and the operation engine
//! - [`projection`]: `attributes` / `excludedAttributes` handling
//! - [`wire`]: SCIM 1.1 / 2.0 wire encodings
//! - [`types`]: protocol messages and discovery documents
//! - [`error`]: engine errors and the protocol error body

pub mod compile;
pub mod error;
pub mod filter;
pub mod patch;
pub mod path;
pub mod projection;
pub mod resolve;
pub mod schema;
pub mod types;
pub mod wire;

pub use compile::{CompiledFilter, SortKey, compile};
pub use error::*;
pub use filter::{AttrPath, CompareOp, FilterNode, FilterParseError, FilterValue, parse_filter};
pub use patch::{PatchEngine, PatchOp, PatchRequest};
pub use path::{PathExpression, ScimPath};
pub use projection::Projection;
pub use resolve::{AddressedTarget, Selection, resolve};
pub use schema::{
    AttributeMetadata, AttributeType, Mutability, ResourceKind, Returned, SchemaAttribute,
    SchemaLookup, SchemaRegistry, ScimSchema,
};
pub use types::*;
pub use wire::ProtocolVersion;
