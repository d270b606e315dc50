//! SCIM 2.0 Filter Parser
//!
//! Parses the filter text carried by a [`super::path::PathExpression`] into a
//! [`FilterNode`] tree per RFC 7644 Section 3.4.2.2.
//!
//! ## Grammar (simplified)
//!
//! ```text
//! filter     = logExpr
//! logExpr    = andExpr { "or" andExpr }
//! andExpr    = notExpr { "and" notExpr }
//! notExpr    = "not" "(" filter ")" | "(" filter ")" | attrExpr
//! attrExpr   = attrPath "pr" | attrPath compareOp compValue
//!            | attrPath "[" filter "]" ["." ATTRNAME (compareOp compValue | "pr")]
//! attrPath   = [URN ":"] ATTRNAME ["." ATTRNAME]
//! compareOp  = "eq" | "ne" | "co" | "sw" | "ew" | "gt" | "ge" | "lt" | "le"
//! compValue  = "true" | "false" | "null" | NUMBER | STRING
//! ```
//!
//! `emails[type eq "work"].value eq "x"` folds into a single value path,
//! `emails[type eq "work" and value eq "x"]`, so that both spellings select the
//! same element.
//!
//! ## Security Limits
//!
//! To prevent DoS attacks from malicious filter expressions:
//! - Maximum filter length: 4096 bytes
//! - Maximum nesting depth: 32 levels

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum allowed length of a SCIM filter expression (bytes).
pub const MAX_FILTER_LENGTH: usize = 4096;

/// Maximum allowed nesting depth of a SCIM filter expression.
///
/// Guards against stack exhaustion from inputs like `not (not (not (...)))`.
pub const MAX_FILTER_DEPTH: usize = 32;

/// A parsed SCIM filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Attribute comparison (e.g., `userName eq "john"`)
    Comparison {
        attr: AttrPath,
        op: CompareOp,
        value: FilterValue,
    },
    /// Attribute presence check (e.g., `name pr`)
    Presence { attr: AttrPath },
    /// Element selection on a multi-valued or complex attribute
    /// (e.g., `emails[type eq "work"]`); true when any element matches
    ValuePath {
        attr: AttrPath,
        filter: Box<FilterNode>,
    },
    And(Box<FilterNode>, Box<FilterNode>),
    Or(Box<FilterNode>, Box<FilterNode>),
    Not(Box<FilterNode>),
    /// Parenthesized sub-expression
    Group(Box<FilterNode>),
}

impl FilterNode {
    /// Rewrite every dotted sub-attribute access into bracket form:
    /// `emails.value co "x"` becomes `emails[value co "x"]`.
    pub fn into_bracket_form(self) -> FilterNode {
        match self {
            FilterNode::Comparison { attr, op, value } => match attr.split_sub_attr() {
                (outer, Some(inner)) => FilterNode::ValuePath {
                    attr: outer,
                    filter: Box::new(FilterNode::Comparison {
                        attr: inner,
                        op,
                        value,
                    }),
                },
                (attr, None) => FilterNode::Comparison { attr, op, value },
            },
            FilterNode::Presence { attr } => match attr.split_sub_attr() {
                (outer, Some(inner)) => FilterNode::ValuePath {
                    attr: outer,
                    filter: Box::new(FilterNode::Presence { attr: inner }),
                },
                (attr, None) => FilterNode::Presence { attr },
            },
            FilterNode::ValuePath { attr, filter } => FilterNode::ValuePath {
                attr,
                filter: Box::new(filter.into_bracket_form()),
            },
            FilterNode::And(l, r) => FilterNode::And(
                Box::new(l.into_bracket_form()),
                Box::new(r.into_bracket_form()),
            ),
            FilterNode::Or(l, r) => FilterNode::Or(
                Box::new(l.into_bracket_form()),
                Box::new(r.into_bracket_form()),
            ),
            FilterNode::Not(inner) => FilterNode::Not(Box::new(inner.into_bracket_form())),
            FilterNode::Group(inner) => FilterNode::Group(Box::new(inner.into_bracket_form())),
        }
    }

    /// Wrap an `or` expression in a group so it can be the operand of `and`.
    fn grouped_if_or(self) -> FilterNode {
        match self {
            FilterNode::Or(..) => FilterNode::Group(Box::new(self)),
            other => other,
        }
    }

    /// Equality seeds of a conjunction of `eq` comparisons, e.g. `type eq "work"`
    /// yields `[("type", "work")]`. Used to create the element a filtered `add`
    /// addresses when no element matches yet.
    pub fn equality_seeds(&self) -> Option<Vec<(&str, &FilterValue)>> {
        match self {
            FilterNode::Comparison {
                attr,
                op: CompareOp::Eq,
                value,
            } if attr.schema.is_none()
                && attr.sub_attr.is_none()
                && *value != FilterValue::Null =>
            {
                Some(vec![(attr.attr.as_str(), value)])
            }
            FilterNode::And(l, r) => {
                let mut seeds = l.equality_seeds()?;
                seeds.extend(r.equality_seeds()?);
                Some(seeds)
            }
            FilterNode::Group(inner) => inner.equality_seeds(),
            _ => None,
        }
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterNode::Comparison { attr, op, value } => write!(f, "{} {} {}", attr, op, value),
            FilterNode::Presence { attr } => write!(f, "{} pr", attr),
            FilterNode::ValuePath { attr, filter } => write!(f, "{}[{}]", attr, filter),
            FilterNode::And(left, right) => write!(f, "{} and {}", left, right),
            FilterNode::Or(left, right) => write!(f, "{} or {}", left, right),
            FilterNode::Not(inner) => write!(f, "not ({})", inner),
            FilterNode::Group(inner) => write!(f, "({})", inner),
        }
    }
}

/// An attribute path, optionally schema-qualified and with a sub-attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPath {
    /// Schema URN prefix (e.g., the enterprise extension URN)
    pub schema: Option<String>,
    /// Main attribute name (e.g., "userName", "emails")
    pub attr: String,
    /// Sub-attribute for complex types (e.g., "familyName" in "name.familyName")
    pub sub_attr: Option<String>,
}

impl AttrPath {
    /// Create a simple attribute path
    pub fn simple(attr: impl Into<String>) -> Self {
        Self {
            schema: None,
            attr: attr.into(),
            sub_attr: None,
        }
    }

    fn split_sub_attr(self) -> (AttrPath, Option<AttrPath>) {
        let inner = self.sub_attr.map(AttrPath::simple);
        (
            AttrPath {
                schema: self.schema,
                attr: self.attr,
                sub_attr: None,
            },
            inner,
        )
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}:", schema)?;
        }
        write!(f, "{}", self.attr)?;
        if let Some(sub) = &self.sub_attr {
            write!(f, ".{}", sub)?;
        }
        Ok(())
    }
}

/// Comparison operators per RFC 7644.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Contains
    Co,
    /// Starts with
    Sw,
    /// Ends with
    Ew,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Co => "co",
            CompareOp::Sw => "sw",
            CompareOp::Ew => "ew",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        };
        write!(f, "{}", s)
    }
}

impl CompareOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "co" => Some(CompareOp::Co),
            "sw" => Some(CompareOp::Sw),
            "ew" => Some(CompareOp::Ew),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            _ => None,
        }
    }

    /// `gt`, `ge`, `lt` and `le`.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le
        )
    }

    /// `co`, `sw` and `ew`.
    pub fn is_substring(self) -> bool {
        matches!(self, CompareOp::Co | CompareOp::Sw | CompareOp::Ew)
    }
}

/// Filter comparison values.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Bool(bool),
    /// Numbers are kept exact so decimal attributes compare without rounding.
    Number(Decimal),
    Null,
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Null => write!(f, "null"),
        }
    }
}

impl FilterValue {
    /// The JSON value this literal denotes.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            FilterValue::String(s) => Value::String(s.clone()),
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Number(n) if n.fract().is_zero() => i64::try_from(*n)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(n.to_string())),
            FilterValue::Number(n) => f64::try_from(*n)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
            FilterValue::Null => Value::Null,
        }
    }
}

/// Filter parsing error.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParseError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)
    }
}

impl std::error::Error for FilterParseError {}

/// Parse a SCIM filter expression.
///
/// # Errors
///
/// Returns an error if:
/// - The filter exceeds [`MAX_FILTER_LENGTH`] bytes
/// - The filter exceeds [`MAX_FILTER_DEPTH`] nesting levels
/// - The filter has invalid syntax
///
/// # Examples
///
/// ```
/// use scimgate::scim::filter::parse_filter;
///
/// let filter = parse_filter("userName eq \"john\"").unwrap();
/// let filter = parse_filter("active eq true and emails pr").unwrap();
/// ```
pub fn parse_filter(input: &str) -> Result<FilterNode, FilterParseError> {
    if input.len() > MAX_FILTER_LENGTH {
        return Err(FilterParseError {
            message: format!(
                "Filter exceeds maximum length ({} bytes, max {})",
                input.len(),
                MAX_FILTER_LENGTH
            ),
            position: 0,
        });
    }

    let mut parser = Parser::new(input);
    let filter = parser.parse_filter()?;

    // Ensure we consumed all input
    parser.skip_whitespace();
    if parser.position < parser.input.len() {
        return Err(FilterParseError {
            message: format!("Unexpected input: '{}'", &parser.input[parser.position..]),
            position: parser.position,
        });
    }

    Ok(filter)
}

/// Whether `name` is a valid ATTRNAME (RFC 7644: ALPHA *(nameChar), plus `$ref`).
pub fn is_attr_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '$' => {}
        _ => return false,
    }
    chars.all(is_name_char)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_urn_char(c: char) -> bool {
    is_name_char(c) || matches!(c, ':' | '.' | '$')
}

// =============================================================================
// Parser Implementation
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    position: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> FilterParseError {
        FilterParseError {
            message: message.into(),
            position: self.position,
        }
    }

    /// Enter a nested scope (parentheses, brackets, etc.).
    /// Returns an error if the maximum nesting depth is exceeded.
    fn enter_scope(&mut self) -> Result<(), FilterParseError> {
        self.depth += 1;
        if self.depth > MAX_FILTER_DEPTH {
            return Err(self.error(format!(
                "Filter exceeds maximum nesting depth ({})",
                MAX_FILTER_DEPTH
            )));
        }
        Ok(())
    }

    fn exit_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn parse_filter(&mut self) -> Result<FilterNode, FilterParseError> {
        self.parse_or_expr()
    }

    // logExpr = andExpr { "or" andExpr }
    fn parse_or_expr(&mut self) -> Result<FilterNode, FilterParseError> {
        let mut left = self.parse_and_expr()?;

        while self.try_keyword("or") {
            let right = self.parse_and_expr()?;
            left = FilterNode::Or(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    // andExpr = notExpr { "and" notExpr }
    fn parse_and_expr(&mut self) -> Result<FilterNode, FilterParseError> {
        let mut left = self.parse_not_expr()?;

        while self.try_keyword("and") {
            let right = self.parse_not_expr()?;
            left = FilterNode::And(Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    // notExpr = "not" "(" filter ")" | "(" filter ")" | attrExpr
    fn parse_not_expr(&mut self) -> Result<FilterNode, FilterParseError> {
        self.skip_whitespace();

        if self.try_keyword("not") {
            self.skip_whitespace();
            if !self.try_char('(') {
                return Err(self.error("Expected '(' after 'not'"));
            }
            let inner = self.parse_enclosed(')', "Expected ')' to close 'not' expression")?;
            return Ok(FilterNode::Not(Box::new(inner)));
        }

        if self.try_char('(') {
            let inner = self.parse_enclosed(')', "Expected ')' to close grouped expression")?;
            return Ok(FilterNode::Group(Box::new(inner)));
        }

        self.parse_attr_expr()
    }

    /// Parse a nested filter up to `close`, the opening character already consumed.
    fn parse_enclosed(
        &mut self,
        close: char,
        message: &str,
    ) -> Result<FilterNode, FilterParseError> {
        self.enter_scope()?;
        let inner = self.parse_filter()?;
        self.exit_scope();
        self.skip_whitespace();
        if !self.try_char(close) {
            return Err(self.error(message));
        }
        Ok(inner)
    }

    // attrExpr = attrPath "pr" | attrPath compareOp compValue
    //          | attrPath "[" filter "]" ["." ATTRNAME ...]
    fn parse_attr_expr(&mut self) -> Result<FilterNode, FilterParseError> {
        let attr = self.parse_attr_path()?;

        if self.peek() != Some('[') {
            return self.parse_comparison(attr);
        }
        if attr.sub_attr.is_some() {
            return Err(self.error("Value filter must follow an attribute name"));
        }

        self.advance();
        let mut filter = self.parse_enclosed(']', "Expected ']' to close value filter")?;

        if self.try_char('.') {
            let sub = self.parse_attr_name()?;
            let tail = self.parse_comparison(AttrPath::simple(sub))?;
            filter = FilterNode::And(Box::new(filter.grouped_if_or()), Box::new(tail));
        } else {
            // `emails[type pr] pr` selects the same elements as `emails[type pr]`
            self.try_keyword("pr");
        }

        Ok(FilterNode::ValuePath {
            attr,
            filter: Box::new(filter),
        })
    }

    fn parse_comparison(&mut self, attr: AttrPath) -> Result<FilterNode, FilterParseError> {
        self.skip_whitespace();

        if self.try_keyword("pr") {
            return Ok(FilterNode::Presence { attr });
        }

        let op = self.parse_compare_op()?;
        self.skip_whitespace();
        let value = self.parse_value()?;

        Ok(FilterNode::Comparison { attr, op, value })
    }

    // attrPath = [URN ":"] ATTRNAME ["." ATTRNAME]
    fn parse_attr_path(&mut self) -> Result<AttrPath, FilterParseError> {
        self.skip_whitespace();

        let remaining = &self.input[self.position..];
        if !remaining
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
        {
            let attr = self.parse_attr_name()?;
            let sub_attr = if self.try_char('.') {
                Some(self.parse_attr_name()?)
            } else {
                None
            };
            return Ok(AttrPath {
                schema: None,
                attr,
                sub_attr,
            });
        }

        // Schema-qualified: the attribute starts after the last ':'
        let start = self.position;
        while self.peek().is_some_and(is_urn_char) {
            self.advance();
        }
        let token = &self.input[start..self.position];
        let split = token.rfind(':').unwrap_or(0);
        let (schema, rest) = (&token[..split], &token[split + 1..]);

        let mut parts = rest.split('.');
        let attr = parts.next().unwrap_or_default();
        let sub_attr = parts.next();
        if !is_attr_name(attr)
            || sub_attr.is_some_and(|s| !is_attr_name(s))
            || parts.next().is_some()
        {
            return Err(FilterParseError {
                message: format!("Invalid attribute path after schema URN: '{}'", rest),
                position: start + split + 1,
            });
        }

        Ok(AttrPath {
            schema: Some(schema.to_string()),
            attr: attr.to_string(),
            sub_attr: sub_attr.map(str::to_string),
        })
    }

    fn parse_attr_name(&mut self) -> Result<String, FilterParseError> {
        self.skip_whitespace();

        let start = self.position;

        // Attribute names must start with a letter ('$' for "$ref")
        if !self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '$') {
            return Err(self.error("Expected attribute name"));
        }
        self.advance();

        while self.peek().is_some_and(is_name_char) {
            self.advance();
        }

        Ok(self.input[start..self.position].to_string())
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, FilterParseError> {
        self.skip_whitespace();

        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }

        let op_str = &self.input[start..self.position];
        if op_str.is_empty() {
            return Err(self.error("Expected comparison operator"));
        }

        CompareOp::parse(op_str).ok_or_else(|| FilterParseError {
            message: format!("Unknown operator: '{}'", op_str),
            position: start,
        })
    }

    fn parse_value(&mut self) -> Result<FilterValue, FilterParseError> {
        self.skip_whitespace();

        if self.peek() == Some('"') {
            return self.parse_string_value();
        }

        if self.try_keyword("true") {
            return Ok(FilterValue::Bool(true));
        }
        if self.try_keyword("false") {
            return Ok(FilterValue::Bool(false));
        }
        if self.try_keyword("null") {
            return Ok(FilterValue::Null);
        }

        if self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            return self.parse_number_value();
        }

        Err(self.error("Expected value (string, boolean, number, or null)"))
    }

    fn parse_string_value(&mut self) -> Result<FilterValue, FilterParseError> {
        if !self.try_char('"') {
            return Err(self.error("Expected '\"' to start string"));
        }

        let mut value = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error("Unterminated string")),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        _ => return Err(self.error("Invalid escape sequence")),
                    };
                    value.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(FilterValue::String(value))
    }

    fn parse_number_value(&mut self) -> Result<FilterValue, FilterParseError> {
        let start = self.position;

        if self.peek() == Some('-') || self.peek() == Some('+') {
            self.advance();
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let mut scientific = false;
        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            scientific = true;
            self.advance();
            if self.peek() == Some('-') || self.peek() == Some('+') {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.position];
        let digits = num_str.strip_prefix('+').unwrap_or(num_str);
        let parsed = if scientific {
            Decimal::from_scientific(digits)
        } else {
            Decimal::from_str(digits)
        };

        parsed.map(FilterValue::Number).map_err(|_| FilterParseError {
            message: format!("Invalid number: '{}'", num_str),
            position: start,
        })
    }

    // Helper methods

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn try_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();

        let remaining = &self.input[self.position..];

        if remaining.len() >= keyword.len()
            && remaining.is_char_boundary(keyword.len())
            && remaining[..keyword.len()].eq_ignore_ascii_case(keyword)
        {
            // Make sure keyword is not part of a larger identifier
            let after_keyword = remaining[keyword.len()..].chars().next();
            if after_keyword.is_none_or(|c| !is_name_char(c) && c != '.' && c != ':') {
                self.position += keyword.len();
                return true;
            }
        }

        false
    }
}

// =============================================================================
// Tests
// =============================================================================
