//! SCIM path and filter segmentation
//!
//! Turns the text of a `filter` query parameter or a PATCH `path` into an ordered
//! sequence of [`PathExpression`] segments plus a canonical normalized string.
//!
//! The leading attribute path (everything before the first top-level space,
//! parenthesis or quote) decides how the text is read:
//!
//! - a pure attribute path such as `name.givenName`, `members[value eq "x"]` or
//!   `urn:...:enterprise:2.0:User:manager.value` becomes one segment per component;
//! - a single attribute expression such as `name.givenName eq "Daniel"` attaches the
//!   comparison to the owning segment, giving `name[givenName eq "Daniel"]`;
//! - anything else is a general filter expression kept as one filter-only segment,
//!   with dotted sub-attribute access rewritten into bracket form.
//!
//! Known extension schema URNs become standalone segments; a fully-qualified core
//! schema prefix is dropped. Normalized text re-parses to the same segments.

use std::fmt;

use serde::Serialize;

use super::{
    error::ScimError,
    filter::{FilterNode, MAX_FILTER_LENGTH, is_attr_name, parse_filter},
    schema::SchemaLookup,
};

/// One segment of a parsed path: an attribute path, a filter, or both.
///
/// At least one of the two fields is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathExpression {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
}

impl PathExpression {
    pub fn path_only(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            filter: None,
        }
    }

    pub fn filter_only(filter: impl Into<String>) -> Self {
        Self {
            path: None,
            filter: Some(filter.into()),
        }
    }

    /// An attribute with a value filter, `path[filter]`.
    pub fn with_filter(path: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            filter: Some(filter.into()),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn is_path_only(&self) -> bool {
        self.filter.is_none()
    }

    pub fn is_filter_only(&self) -> bool {
        self.path.is_none()
    }

    /// Whether this segment is an extension schema URN.
    pub fn is_schema_urn(&self) -> bool {
        self.filter.is_none() && self.path.as_deref().is_some_and(has_urn_prefix)
    }

    /// Parse the filter text of this segment.
    pub fn filter_node(&self) -> Result<Option<FilterNode>, ScimError> {
        Ok(self.filter.as_deref().map(parse_filter).transpose()?)
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, &self.filter) {
            (Some(path), Some(filter)) => write!(f, "{}[{}]", path, filter),
            (Some(path), None) => write!(f, "{}", path),
            (None, Some(filter)) => write!(f, "{}", filter),
            (None, None) => Ok(()),
        }
    }
}

/// A parsed path or filter: its segments and their normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScimPath {
    expressions: Vec<PathExpression>,
    normalized: String,
}

impl ScimPath {
    /// Parse filter or attribute-path text.
    ///
    /// `schema` is consulted to recognize extension schema URN prefixes.
    pub fn parse(text: &str, schema: &dyn SchemaLookup) -> Result<Self, ScimError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ScimError::syntax("Empty path or filter expression", 0));
        }
        if text.len() > MAX_FILTER_LENGTH {
            return Err(ScimError::syntax(
                format!(
                    "Filter exceeds maximum length ({} bytes, max {})",
                    text.len(),
                    MAX_FILTER_LENGTH
                ),
                0,
            ));
        }

        let lead_end = scan_boundaries(text)?;
        let (lead, rest) = (&text[..lead_end], text[lead_end..].trim());

        let expressions = if lead.is_empty() || (lead.starts_with('[') && !rest.is_empty()) {
            vec![general_filter(text)?]
        } else if rest.is_empty() {
            attribute_path(lead, schema)?
        } else if lead.ends_with(']') {
            vec![general_filter(text)?]
        } else {
            let segments = attribute_path(lead, schema)?;
            match attach_expression(segments, rest) {
                Some(segments) => segments,
                None => vec![general_filter(text)?],
            }
        };

        Ok(Self::from_expressions(expressions))
    }

    fn from_expressions(expressions: Vec<PathExpression>) -> Self {
        let mut normalized = String::new();
        for (i, expr) in expressions.iter().enumerate() {
            if i > 0 {
                normalized.push(if expressions[i - 1].is_schema_urn() {
                    ':'
                } else {
                    '.'
                });
            }
            normalized.push_str(&expr.to_string());
        }
        Self {
            expressions,
            normalized,
        }
    }

    pub fn expressions(&self) -> &[PathExpression] {
        &self.expressions
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether the last segment carries filter text.
    pub fn ends_with_filter(&self) -> bool {
        self.expressions.last().is_some_and(|e| e.filter.is_some())
    }
}

impl fmt::Display for ScimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

fn has_urn_prefix(text: &str) -> bool {
    text.len() >= 4 && text.is_char_boundary(4) && text[..4].eq_ignore_ascii_case("urn:")
}

/// Parse filter text and rewrite it into its canonical bracketed form.
fn normalize_filter(text: &str) -> Result<String, ScimError> {
    Ok(parse_filter(text)?.into_bracket_form().to_string())
}

fn general_filter(text: &str) -> Result<PathExpression, ScimError> {
    Ok(PathExpression::filter_only(normalize_filter(text)?))
}

// =============================================================================
// Scanning
// =============================================================================

/// Check that quotes, brackets and parentheses are balanced, and return the byte
/// offset where the leading attribute path ends.
fn scan_boundaries(text: &str) -> Result<usize, ScimError> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut quote_start: Option<usize> = None;
    let mut escaped = false;
    let mut lead_end = None;

    for (i, c) in text.char_indices() {
        if quote_start.is_some() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                quote_start = None;
            }
            continue;
        }

        if lead_end.is_none() && stack.is_empty() && (c.is_whitespace() || c == '(' || c == '"') {
            lead_end = Some(i);
        }

        match c {
            '"' => quote_start = Some(i),
            '[' | '(' => stack.push((c, i)),
            ']' | ')' => {
                let open = if c == ']' { '[' } else { '(' };
                match stack.pop() {
                    Some((o, _)) if o == open => {}
                    _ => return Err(ScimError::syntax(format!("Unbalanced '{}'", c), i)),
                }
            }
            _ => {}
        }
    }

    if let Some(start) = quote_start {
        return Err(ScimError::syntax("Unterminated string", start));
    }
    if let Some((c, pos)) = stack.pop() {
        return Err(ScimError::syntax(format!("Unclosed '{}'", c), pos));
    }

    Ok(lead_end.unwrap_or(text.len()))
}

/// Split a pure attribute path into one segment per component.
fn attribute_path(text: &str, schema: &dyn SchemaLookup) -> Result<Vec<PathExpression>, ScimError> {
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return Ok(vec![PathExpression::filter_only(normalize_filter(inner)?)]);
    }

    let mut segments = Vec::new();
    let mut rest = text;

    if has_urn_prefix(text) {
        let (extension, remainder) = split_schema_prefix(text, schema)?;
        match extension {
            Some(urn) => segments.push(PathExpression::path_only(urn)),
            None if remainder.is_empty() => {
                return Err(ScimError::syntax(
                    "Expected attribute name after schema URN",
                    text.len(),
                ));
            }
            None => {}
        }
        if remainder.is_empty() {
            return Ok(segments);
        }
        rest = remainder;
    }

    let offset = text.len() - rest.len();
    for (name, filter) in split_components(rest, offset)? {
        segments.push(match filter {
            Some(filter) => PathExpression::with_filter(name, normalize_filter(filter)?),
            None => PathExpression::path_only(name),
        });
    }

    Ok(segments)
}

/// Match the longest `:`-delimited prefix of `text` that names a registered schema.
///
/// Returns the extension URN (None for a core schema) and the remaining text.
fn split_schema_prefix<'t>(
    text: &'t str,
    schema: &dyn SchemaLookup,
) -> Result<(Option<&'t str>, &'t str), ScimError> {
    let head = &text[..text.find('[').unwrap_or(text.len())];
    let boundaries =
        std::iter::once(head.len()).chain(head.rmatch_indices(':').map(|(i, _)| i));

    for end in boundaries {
        let urn = &text[..end];
        let rest = &text[end..];
        let rest = rest.strip_prefix(':').unwrap_or(rest);
        if schema.is_known_extension(urn) {
            return Ok((Some(urn), rest));
        }
        if schema.is_core_schema(urn) {
            return Ok((None, rest));
        }
    }

    Err(ScimError::UnknownAttribute(head.to_string()))
}

/// Split at top-level `.` into `(name, bracket filter)` components.
fn split_components(text: &str, offset: usize) -> Result<Vec<(&str, Option<&str>)>, ScimError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;
    let mut bracket: Option<usize> = None;
    let mut closed = false;

    for (i, c) in text.char_indices() {
        if in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }

        match c {
            '.' if depth == 0 => {
                parts.push(component(text, start, i, bracket, offset)?);
                start = i + 1;
                bracket = None;
                closed = false;
            }
            _ if depth == 0 && closed => {
                return Err(ScimError::syntax(
                    format!("Unexpected '{}' after value filter", c),
                    offset + i,
                ));
            }
            '"' => in_quote = true,
            '[' => {
                if depth == 0 {
                    bracket = Some(i);
                }
                depth += 1;
            }
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    closed = true;
                }
            }
            _ => {}
        }
    }

    parts.push(component(text, start, text.len(), bracket, offset)?);
    Ok(parts)
}

fn component(
    text: &str,
    start: usize,
    end: usize,
    bracket: Option<usize>,
    offset: usize,
) -> Result<(&str, Option<&str>), ScimError> {
    let (name, filter) = match bracket {
        Some(open) => (&text[start..open], Some(&text[open + 1..end - 1])),
        None => (&text[start..end], None),
    };

    if name.is_empty() {
        return Err(ScimError::syntax("Empty path segment", offset + start));
    }
    if !is_attr_name(name) {
        return Err(ScimError::syntax(
            format!("Invalid attribute name '{}'", name),
            offset + start,
        ));
    }

    Ok((name, filter))
}

/// Attach `rest` as a single comparison on the last attribute of `segments`.
///
/// Returns None when `rest` does not complete a single attribute expression.
fn attach_expression(mut segments: Vec<PathExpression>, rest: &str) -> Option<Vec<PathExpression>> {
    let last = segments.last()?;
    if !last.is_path_only() || last.is_schema_urn() {
        return None;
    }

    let node = parse_filter(&format!("{} {}", last.path()?, rest)).ok()?;
    if !matches!(
        node,
        FilterNode::Comparison { .. } | FilterNode::Presence { .. }
    ) {
        return None;
    }
    let filter = node.to_string();

    segments.pop();
    match segments.last_mut() {
        Some(owner) if owner.is_path_only() && !owner.is_schema_urn() => {
            owner.filter = Some(filter);
        }
        _ => segments.push(PathExpression::filter_only(filter)),
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::scim::{
        schema::SchemaRegistry,
        types::{SCHEMA_ENTERPRISE_USER, SCHEMA_USER},
    };

    fn parse(text: &str) -> Result<ScimPath, ScimError> {
        ScimPath::parse(text, &SchemaRegistry::default())
    }

    #[test]
    fn test_dotted_comparison_attaches_to_owner() {
        let path = parse("name.givenName eq \"Daniel\"").unwrap();
        assert_eq!(
            path.expressions(),
            &[PathExpression::with_filter("name", "givenName eq \"Daniel\"")]
        );
        assert_eq!(path.normalized(), "name[givenName eq \"Daniel\"]");
    }

    #[test]
    fn test_bracketed_value_path() {
        let path = parse("meta[lastModified gt \"2011-05-13T04:42:34Z\"]").unwrap();
        assert_eq!(
            path.expressions(),
            &[PathExpression::with_filter(
                "meta",
                "lastModified gt \"2011-05-13T04:42:34Z\""
            )]
        );
    }

    #[test]
    fn test_general_filter_rewrites_dotted_access() {
        let path = parse(
            "userType eq \"Employee\" and (emails co \"example.com\" or emails.value co \"example.org\")",
        )
        .unwrap();
        assert_eq!(path.expressions().len(), 1);
        let expr = &path.expressions()[0];
        assert!(expr.is_filter_only());
        assert!(
            expr.filter()
                .unwrap()
                .contains("emails[value co \"example.org\"]")
        );
    }

    #[test]
    fn test_simple_comparison_is_filter_only() {
        let path = parse("userName eq \"bjensen\"").unwrap();
        assert_eq!(
            path.expressions(),
            &[PathExpression::filter_only("userName eq \"bjensen\"")]
        );
        assert_eq!(path.normalized(), "userName eq \"bjensen\"");
    }

    #[test]
    fn test_pure_attribute_paths() {
        let path = parse("name.familyName").unwrap();
        assert_eq!(
            path.expressions(),
            &[
                PathExpression::path_only("name"),
                PathExpression::path_only("familyName")
            ]
        );
        assert_eq!(path.normalized(), "name.familyName");
    }

    #[test]
    fn test_value_path_with_trailing_sub_attribute() {
        let path = parse("addresses[type eq \"work\"].postalCode").unwrap();
        assert_eq!(
            path.expressions(),
            &[
                PathExpression::with_filter("addresses", "type eq \"work\""),
                PathExpression::path_only("postalCode")
            ]
        );
        assert_eq!(path.normalized(), "addresses[type eq \"work\"].postalCode");
    }

    #[test]
    fn test_value_path_with_trailing_comparison() {
        let path = parse("emails[type eq \"work\"].value co \"@example.com\"").unwrap();
        assert_eq!(
            path.expressions(),
            &[
                PathExpression::with_filter("emails", "type eq \"work\""),
                PathExpression::filter_only("value co \"@example.com\"")
            ]
        );
    }

    #[test]
    fn test_extension_urn_becomes_own_segment() {
        let text = format!("{}:manager.value", SCHEMA_ENTERPRISE_USER);
        let path = parse(&text).unwrap();
        assert_eq!(
            path.expressions(),
            &[
                PathExpression::path_only(SCHEMA_ENTERPRISE_USER),
                PathExpression::path_only("manager"),
                PathExpression::path_only("value")
            ]
        );
        assert_eq!(path.normalized(), text);
        assert!(path.expressions()[0].is_schema_urn());
    }

    #[test]
    fn test_extension_urn_alone() {
        let path = parse(SCHEMA_ENTERPRISE_USER).unwrap();
        assert_eq!(
            path.expressions(),
            &[PathExpression::path_only(SCHEMA_ENTERPRISE_USER)]
        );
    }

    #[test]
    fn test_extension_attribute_comparison() {
        let text = format!("{}:employeeNumber eq \"701984\"", SCHEMA_ENTERPRISE_USER);
        let path = parse(&text).unwrap();
        assert_eq!(
            path.expressions(),
            &[
                PathExpression::path_only(SCHEMA_ENTERPRISE_USER),
                PathExpression::filter_only("employeeNumber eq \"701984\"")
            ]
        );
        assert_eq!(path.normalized(), text);
    }

    #[test]
    fn test_core_schema_prefix_is_dropped() {
        let path = parse(&format!("{}:name.givenName", SCHEMA_USER)).unwrap();
        assert_eq!(path.normalized(), "name.givenName");
    }

    #[test]
    fn test_unknown_urn_namespace() {
        let err = parse("urn:example:custom:1.0:User:badge eq \"x\"").unwrap_err();
        assert!(matches!(err, ScimError::UnknownAttribute(_)));
    }

    #[test]
    fn test_bracket_wrapped_filter() {
        let path = parse("[type eq \"work\"]").unwrap();
        assert_eq!(
            path.expressions(),
            &[PathExpression::filter_only("type eq \"work\"")]
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("userName eq \"abc")]
    #[case("emails[type eq \"work\"")]
    #[case("emails]")]
    #[case("(userName pr")]
    #[case("name..givenName")]
    #[case("name.")]
    #[case(".name")]
    #[case("emails[]")]
    #[case("emails[type eq \"work\"]value")]
    #[case("userName eq")]
    #[case("userName eq \"a\" and")]
    #[case("1name pr")]
    fn test_syntax_errors(#[case] text: &str) {
        let err = parse(text).unwrap_err();
        assert!(
            matches!(err, ScimError::Syntax { .. }),
            "{text:?} gave {err:?}"
        );
    }

    #[test]
    fn test_quotes_hide_boundaries() {
        let path = parse("displayName eq \"a (b] [c\"").unwrap();
        assert_eq!(path.normalized(), "displayName eq \"a (b] [c\"");

        let path = parse("emails[value eq \"a.b c\"].display").unwrap();
        assert_eq!(path.expressions().len(), 2);
    }

    #[rstest]
    #[case("name.givenName eq \"Daniel\"")]
    #[case("meta[lastModified gt \"2011-05-13T04:42:34Z\"]")]
    #[case(
        "userType eq \"Employee\" and (emails co \"example.com\" or emails.value co \"example.org\")"
    )]
    #[case("emails[type eq \"work\" and value co \"@example.com\"] or ims[type eq \"xmpp\"]")]
    #[case("emails[type eq \"work\"].value co \"@example.com\"")]
    #[case("addresses[type eq \"work\"].postalCode")]
    #[case("not (active eq false) and title pr")]
    #[case("emails.value pr")]
    #[case("urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager.value eq \"26118915\"")]
    #[case("urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:employeeNumber pr")]
    #[case("members")]
    fn test_normalized_text_reparses_identically(#[case] text: &str) {
        let first = parse(text).unwrap();
        let second = parse(first.normalized()).unwrap();
        assert_eq!(first.expressions(), second.expressions(), "{text}");
        assert_eq!(first.normalized(), second.normalized());
    }

    #[test]
    fn test_serializes_segments() {
        let path = parse("name.givenName eq \"Daniel\"").unwrap();
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(json["expressions"][0]["path"], "name");
        assert_eq!(json["normalized"], "name[givenName eq \"Daniel\"]");
    }
}
