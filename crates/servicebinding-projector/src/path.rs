//! Path engine: JSONPath-style navigation over `serde_json::Value` trees
//!
//! Workloads are handled in their generic JSON form so one engine works for
//! every resource kind. Two dialects share the parser:
//!
//! - **unrestricted** (`Path::parse`): field accessors, `[*]`/`.*` wildcards,
//!   `[n]` indices, `..` recursive descent and `[?(@.a == 'x')]` filters.
//!   Only container fragment paths use it, since they may fan out.
//! - **restricted** (`Path::parse_restricted`): plain field accessors only
//!   (`.a.b`, `['a.b']`). These paths always denote zero or one location.
//!
//! Missing intermediate nodes are never an error on read: `get` returns
//! `None`. `set` creates intermediate objects as needed.

use std::fmt;

use serde_json::{Map, Value};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while parsing or applying a path
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    /// The expression is not valid path syntax
    #[error("invalid path '{path}' at offset {position}: {message}")]
    Syntax {
        /// The offending expression
        path: String,
        /// Character offset of the failure
        position: usize,
        /// What was expected
        message: String,
    },

    /// A restricted path used something other than a field accessor
    #[error("path '{path}' may only use field accessors, found '{segment}'")]
    Restricted {
        /// The offending expression
        path: String,
        /// The rejected segment
        segment: String,
    },

    /// `set` walked into a value that cannot hold fields
    #[error("cannot set '{path}': '{segment}' is not an object")]
    NotAnObject {
        /// The expression being set
        path: String,
        /// Prefix of the path that resolved to a non-object
        segment: String,
    },
}

// =============================================================================
// AST
// =============================================================================

/// Comparison used by filter segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

/// `[?(@.field...)]` filter over array elements or object values
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field chain evaluated relative to each candidate
    pub fields: Vec<String>,
    /// Optional comparison; without one the filter tests existence
    pub condition: Option<(Comparison, Value)>,
}

impl Filter {
    fn matches(&self, candidate: &Value) -> bool {
        let mut node = Some(candidate);
        for field in &self.fields {
            node = node.and_then(|n| n.as_object()).and_then(|m| m.get(field));
        }
        let node = node.filter(|n| !n.is_null());
        match &self.condition {
            None => node.is_some(),
            Some((Comparison::Eq, literal)) => node == Some(literal),
            Some((Comparison::Ne, literal)) => node != Some(literal),
        }
    }
}

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name` or `['name']`
    Field(String),
    /// `[n]`; negative indices count from the end
    Index(i64),
    /// `[*]` or `.*`
    Wildcard,
    /// `..x`: apply the inner selector to a node and all its descendants
    Descendants(Box<Segment>),
    /// `[?(...)]`
    Filter(Filter),
}

impl Segment {
    fn is_field(&self) -> bool {
        matches!(self, Segment::Field(_))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn write_field(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if !name.is_empty() && name.chars().all(is_ident_char) {
        write!(f, ".{}", name)
    } else {
        write!(f, "['{}']", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write_field(f, name),
            Segment::Index(i) => write!(f, "[{}]", i),
            Segment::Wildcard => write!(f, "[*]"),
            Segment::Descendants(inner) => match inner.as_ref() {
                Segment::Field(name) if name.chars().all(is_ident_char) => {
                    write!(f, "..{}", name)
                }
                Segment::Wildcard => write!(f, "..*"),
                other => write!(f, "..{}", other),
            },
            Segment::Filter(filter) => {
                write!(f, "[?(@")?;
                for field in &filter.fields {
                    write_field(f, field)?;
                }
                match &filter.condition {
                    None => {}
                    Some((Comparison::Eq, v)) => write!(f, " == {}", v)?,
                    Some((Comparison::Ne, v)) => write!(f, " != {}", v)?,
                }
                write!(f, ")]")
            }
        }
    }
}

// =============================================================================
// Locations
// =============================================================================

/// One concrete step into a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

/// Concrete address of one node, as produced by [`Path::locate`]
///
/// Locations let callers re-enter a node mutably after evaluating a
/// fan-out path against an immutable view of the same document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location(Vec<Step>);

impl Location {
    fn child(&self, step: Step) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    /// Steps from the document root
    pub fn steps(&self) -> &[Step] {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "$");
        }
        for step in &self.0 {
            match step {
                Step::Key(key) => write_field(f, key)?,
                Step::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

/// Resolve a location against a document
pub fn get_at<'a>(doc: &'a Value, location: &Location) -> Option<&'a Value> {
    let mut node = doc;
    for step in location.steps() {
        node = match step {
            Step::Key(key) => node.as_object()?.get(key)?,
            Step::Index(i) => node.as_array()?.get(*i)?,
        };
    }
    Some(node)
}

/// Resolve a location against a document for mutation
pub fn get_mut_at<'a>(doc: &'a mut Value, location: &Location) -> Option<&'a mut Value> {
    let mut node = doc;
    for step in location.steps() {
        node = match step {
            Step::Key(key) => node.as_object_mut()?.get_mut(key)?,
            Step::Index(i) => node.as_array_mut()?.get_mut(*i)?,
        };
    }
    Some(node)
}

// =============================================================================
// Path
// =============================================================================

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    expr: String,
    segments: Vec<Segment>,
}

impl Path {
    /// Parse an expression in the unrestricted dialect
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let segments = Parser::new(expr).parse()?;
        Ok(Self {
            expr: expr.to_string(),
            segments,
        })
    }

    /// Parse an expression that may only use field accessors
    pub fn parse_restricted(expr: &str) -> Result<Self, PathError> {
        let path = Self::parse(expr)?;
        if let Some(segment) = path.segments.iter().find(|s| !s.is_field()) {
            return Err(PathError::Restricted {
                path: expr.to_string(),
                segment: segment.to_string(),
            });
        }
        Ok(path)
    }

    /// The expression this path was parsed from
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the path consists of field accessors only
    pub fn is_restricted(&self) -> bool {
        self.segments.iter().all(Segment::is_field)
    }

    /// Every node the path selects, in document order
    ///
    /// Document order is pre-order: a node comes before its descendants.
    /// Array elements fan out by index. Object members fan out in key order
    /// (alphabetical), not in the order they were written, since
    /// `serde_json::Map` keeps keys sorted.
    pub fn select<'a>(&self, doc: &'a Value) -> Vec<&'a Value> {
        self.evaluate(doc).into_iter().map(|(_, v)| v).collect()
    }

    /// Concrete locations of every node the path selects, in document order
    ///
    /// Same order as [`Path::select`]: wildcards and `..` over an object
    /// visit its keys alphabetically, so a mapping over a map of containers
    /// sees them sorted by key.
    pub fn locate(&self, doc: &Value) -> Vec<Location> {
        self.evaluate(doc).into_iter().map(|(loc, _)| loc).collect()
    }

    /// The single value at this path; `None` when absent or `null`
    pub fn get<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.evaluate(doc)
            .into_iter()
            .next()
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    /// Write `value` at this path, creating intermediate objects
    ///
    /// Only restricted paths can be written. `null` intermediates are
    /// replaced with objects; any other non-object intermediate is an error.
    pub fn set(&self, doc: &mut Value, value: Value) -> Result<(), PathError> {
        let mut fields = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => fields.push(name.as_str()),
                other => {
                    return Err(PathError::Restricted {
                        path: self.expr.clone(),
                        segment: other.to_string(),
                    })
                }
            }
        }

        let Some((last, parents)) = fields.split_last() else {
            *doc = value;
            return Ok(());
        };

        let mut node = doc;
        let mut walked = Location::default();
        for field in parents {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map.entry(field.to_string()).or_insert(Value::Null),
                _ => return Err(self.not_an_object(&walked)),
            };
            walked = walked.child(Step::Key(field.to_string()));
        }

        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        match node {
            Value::Object(map) => {
                map.insert(last.to_string(), value);
                Ok(())
            }
            _ => Err(self.not_an_object(&walked)),
        }
    }

    fn not_an_object(&self, walked: &Location) -> PathError {
        PathError::NotAnObject {
            path: self.expr.clone(),
            segment: walked.to_string(),
        }
    }

    fn evaluate<'a>(&self, doc: &'a Value) -> Vec<(Location, &'a Value)> {
        let mut current = vec![(Location::default(), doc)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (location, node) in current {
                apply(segment, location, node, &mut next);
            }
            current = next;
        }
        current
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

fn children<'a>(location: &Location, node: &'a Value) -> Vec<(Location, &'a Value)> {
    match node {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (location.child(Step::Key(k.clone())), v))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (location.child(Step::Index(i)), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn apply<'a>(
    segment: &Segment,
    location: Location,
    node: &'a Value,
    out: &mut Vec<(Location, &'a Value)>,
) {
    match segment {
        Segment::Field(name) => {
            if let Some(child) = node.as_object().and_then(|m| m.get(name)) {
                out.push((location.child(Step::Key(name.clone())), child));
            }
        }
        Segment::Index(index) => {
            if let Some(items) = node.as_array() {
                let len = items.len() as i64;
                let resolved = if *index < 0 { len + index } else { *index };
                if (0..len).contains(&resolved) {
                    let i = resolved as usize;
                    out.push((location.child(Step::Index(i)), &items[i]));
                }
            }
        }
        Segment::Wildcard => out.extend(children(&location, node)),
        Segment::Filter(filter) => out.extend(
            children(&location, node)
                .into_iter()
                .filter(|(_, child)| filter.matches(child)),
        ),
        Segment::Descendants(inner) => {
            apply(inner, location.clone(), node, out);
            for (child_location, child) in children(&location, node) {
                apply(segment, child_location, child, out);
            }
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            expr,
            chars: expr.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> PathError {
        PathError::Syntax {
            path: self.expr.to_string(),
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), PathError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<Vec<Segment>, PathError> {
        self.skip_whitespace();
        let braced = self.eat('{');
        self.skip_whitespace();
        self.eat('$');

        let mut segments = Vec::new();
        if self.peek().is_some_and(is_ident_char) {
            segments.push(Segment::Field(self.ident()?));
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    if self.eat('.') {
                        let inner = self.descendant_selector()?;
                        segments.push(Segment::Descendants(Box::new(inner)));
                    } else if self.eat('*') {
                        segments.push(Segment::Wildcard);
                    } else {
                        segments.push(Segment::Field(self.ident()?));
                    }
                }
                Some('[') => segments.push(self.bracket()?),
                _ => break,
            }
        }

        self.skip_whitespace();
        if braced {
            self.expect('}')?;
            self.skip_whitespace();
        }
        if self.pos < self.chars.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(segments)
    }

    fn descendant_selector(&mut self) -> Result<Segment, PathError> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok(Segment::Wildcard)
            }
            Some('[') => self.bracket(),
            _ => Ok(Segment::Field(self.ident()?)),
        }
    }

    fn ident(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected field name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn bracket(&mut self) -> Result<Segment, PathError> {
        self.expect('[')?;
        self.skip_whitespace();
        let segment = match self.peek() {
            Some('*') => {
                self.pos += 1;
                Segment::Wildcard
            }
            Some('\'') | Some('"') => Segment::Field(self.quoted()?),
            Some('?') => {
                self.pos += 1;
                Segment::Filter(self.filter()?)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => Segment::Index(self.integer()?),
            _ => return Err(self.error("expected '*', index, quoted name or filter")),
        };
        self.skip_whitespace();
        self.expect(']')?;
        Ok(segment)
    }

    fn quoted(&mut self) -> Result<String, PathError> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted string")),
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => {
                    let escaped = self
                        .peek_at(1)
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    out.push(escaped);
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn integer(&mut self) -> Result<i64, PathError> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| self.error(format!("invalid index '{}'", text)))
    }

    fn filter(&mut self) -> Result<Filter, PathError> {
        self.expect('(')?;
        self.skip_whitespace();
        self.expect('@')?;

        let mut fields = Vec::new();
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    fields.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    fields.push(self.quoted()?);
                    self.skip_whitespace();
                    self.expect(']')?;
                }
                _ => break,
            }
        }

        self.skip_whitespace();
        let condition = if self.peek() == Some('=') && self.peek_at(1) == Some('=') {
            self.pos += 2;
            Some((Comparison::Eq, self.literal()?))
        } else if self.peek() == Some('!') && self.peek_at(1) == Some('=') {
            self.pos += 2;
            Some((Comparison::Ne, self.literal()?))
        } else {
            None
        };

        self.skip_whitespace();
        self.expect(')')?;
        Ok(Filter { fields, condition })
    }

    fn literal(&mut self) -> Result<Value, PathError> {
        self.skip_whitespace();
        match self.peek() {
            Some('\'') | Some('"') => Ok(Value::String(self.quoted()?)),
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                self.eat('-');
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                serde_json::from_str::<serde_json::Number>(&text)
                    .map(Value::Number)
                    .map_err(|_| self.error(format!("invalid number '{}'", text)))
            }
            _ => {
                let word = self.ident()?;
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => Err(self.error(format!("unknown literal '{}'", word))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "metadata": {"name": "app", "annotations": {"a.b/c": "1"}},
            "spec": {
                "template": {
                    "spec": {
                        "initContainers": [{"name": "init"}],
                        "containers": [
                            {"name": "app", "env": [{"name": "A", "value": "1"}]},
                            {"name": "sidecar", "image": "envoy"}
                        ]
                    }
                }
            }
        })
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn parses_dotted_fields() {
        let path = Path::parse(".spec.template.spec").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Field("spec".to_string()),
                Segment::Field("template".to_string()),
                Segment::Field("spec".to_string()),
            ]
        );
        assert!(path.is_restricted());
    }

    #[test]
    fn parses_braces_dollar_and_bracket_fields() {
        let path = Path::parse("{$.metadata['annotations'][\"a.b/c\"]}").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Field("metadata".to_string()),
                Segment::Field("annotations".to_string()),
                Segment::Field("a.b/c".to_string()),
            ]
        );
    }

    #[test]
    fn parses_bare_leading_field() {
        let path = Path::parse("spec.containers[*]").unwrap();
        assert_eq!(path.segments()[0], Segment::Field("spec".to_string()));
        assert_eq!(path.segments()[2], Segment::Wildcard);
    }

    #[test]
    fn parses_fan_out_segments() {
        let path = Path::parse("..containers[-1].*[?(@.name == 'app')]").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Descendants(Box::new(Segment::Field("containers".to_string()))),
                Segment::Index(-1),
                Segment::Wildcard,
                Segment::Filter(Filter {
                    fields: vec!["name".to_string()],
                    condition: Some((Comparison::Eq, json!("app"))),
                }),
            ]
        );
        assert!(!path.is_restricted());
    }

    #[test]
    fn empty_path_is_the_document() {
        let path = Path::parse("").unwrap();
        assert!(path.segments().is_empty());
        let doc = json!({"a": 1});
        assert_eq!(path.get(&doc), Some(&doc));
    }

    #[test]
    fn rejects_malformed_paths() {
        for expr in [
            ".spec.",
            ".spec[",
            ".spec['unterminated]",
            "{.spec",
            ".spec}",
            ".spec[abc]",
            ".spec[?(@.a === 'x')]",
            "literal{.spec}",
            ".spec name",
        ] {
            let err = Path::parse(expr).unwrap_err();
            assert!(
                matches!(err, PathError::Syntax { .. }),
                "expected syntax error for {:?}, got {:?}",
                expr,
                err
            );
        }
    }

    #[test]
    fn restricted_dialect_rejects_everything_but_fields() {
        for (expr, segment) in [
            (".spec.containers[*]", "[*]"),
            (".spec.*", "[*]"),
            (".spec.containers[0]", "[0]"),
            ("..name", "..name"),
            (".items[?(@.name == 'x')]", "[?(@.name == \"x\")]"),
        ] {
            match Path::parse_restricted(expr).unwrap_err() {
                PathError::Restricted { path, segment: found } => {
                    assert_eq!(path, expr);
                    assert_eq!(found, segment);
                }
                other => panic!("expected restricted error for {}, got {:?}", expr, other),
            }
        }

        assert!(Path::parse_restricted(".metadata['annotations']").is_ok());
    }

    #[test]
    fn restricted_dialect_still_reports_syntax_errors() {
        assert!(matches!(
            Path::parse_restricted(".spec..").unwrap_err(),
            PathError::Syntax { .. }
        ));
    }

    // =========================================================================
    // Reading
    // =========================================================================

    #[test]
    fn get_returns_none_for_missing_intermediates() {
        let doc = deployment();
        let path = Path::parse_restricted(".spec.template.metadata.annotations").unwrap();
        assert_eq!(path.get(&doc), None);

        let through_scalar = Path::parse_restricted(".metadata.name.first").unwrap();
        assert_eq!(through_scalar.get(&doc), None);
    }

    #[test]
    fn get_treats_null_as_absent() {
        let doc = json!({"spec": {"volumes": null}});
        let path = Path::parse_restricted(".spec.volumes").unwrap();
        assert_eq!(path.get(&doc), None);
    }

    #[test]
    fn get_reads_keys_with_dots() {
        let doc = deployment();
        let path = Path::parse_restricted(".metadata.annotations['a.b/c']").unwrap();
        assert_eq!(path.get(&doc), Some(&json!("1")));
    }

    #[test]
    fn wildcard_selects_in_document_order() {
        let doc = deployment();
        let path = Path::parse(".spec.template.spec.containers[*].name").unwrap();
        assert_eq!(path.select(&doc), vec![&json!("app"), &json!("sidecar")]);
    }

    #[test]
    fn negative_index_counts_from_end() {
        let doc = deployment();
        let path = Path::parse(".spec.template.spec.containers[-1].name").unwrap();
        assert_eq!(path.select(&doc), vec![&json!("sidecar")]);

        let out_of_range = Path::parse(".spec.template.spec.containers[5]").unwrap();
        assert!(out_of_range.select(&doc).is_empty());
    }

    #[test]
    fn recursive_descent_finds_every_match() {
        let doc = deployment();
        let path = Path::parse("..name").unwrap();
        let names = path.select(&doc);
        // Pre-order, object keys sorted: `containers` before `initContainers`,
        // and the env entry's name before the next container's
        assert_eq!(
            names,
            vec![
                &json!("app"),
                &json!("app"),
                &json!("A"),
                &json!("sidecar"),
                &json!("init")
            ]
        );
    }

    #[test]
    fn wildcard_over_object_visits_keys_alphabetically() {
        let doc = json!({"workers": {"zeta": {"name": "z"}, "alpha": {"name": "a"}, "mid": {"name": "m"}}});
        let path = Path::parse(".workers.*.name").unwrap();
        assert_eq!(path.select(&doc), vec![&json!("a"), &json!("m"), &json!("z")]);
        assert_eq!(
            path.locate(&doc).iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![".workers.alpha.name", ".workers.mid.name", ".workers.zeta.name"]
        );
    }

    #[test]
    fn filter_selects_matching_elements() {
        let doc = deployment();
        let by_name = Path::parse(".spec.template.spec.containers[?(@.name == 'sidecar')]").unwrap();
        let selected = by_name.select(&doc);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["image"], json!("envoy"));

        let has_env = Path::parse(".spec.template.spec.containers[?(@.env)]").unwrap();
        assert_eq!(has_env.select(&doc)[0]["name"], json!("app"));

        let not_app = Path::parse(".spec.template.spec.containers[?(@.name != 'app')].name").unwrap();
        assert_eq!(not_app.select(&doc), vec![&json!("sidecar")]);
    }

    #[test]
    fn locate_round_trips_through_get_mut_at() {
        let mut doc = deployment();
        let path = Path::parse(".spec.template.spec.containers[*]").unwrap();
        let locations = path.locate(&doc);
        assert_eq!(locations.len(), 2);
        assert_eq!(
            locations[1].to_string(),
            ".spec.template.spec.containers[1]"
        );

        for location in &locations {
            let fragment = get_mut_at(&mut doc, location).unwrap();
            fragment["touched"] = json!(true);
        }
        assert_eq!(doc["spec"]["template"]["spec"]["containers"][0]["touched"], json!(true));
        assert_eq!(doc["spec"]["template"]["spec"]["containers"][1]["touched"], json!(true));
        assert_eq!(get_at(&doc, &locations[0]).unwrap()["name"], json!("app"));
    }

    // =========================================================================
    // Writing
    // =========================================================================

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({"spec": {"template": null}});
        let path = Path::parse_restricted(".spec.template.metadata.annotations").unwrap();
        path.set(&mut doc, json!({"k": "v"})).unwrap();
        assert_eq!(
            doc,
            json!({"spec": {"template": {"metadata": {"annotations": {"k": "v"}}}}})
        );
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut doc = deployment();
        let path = Path::parse_restricted(".metadata.name").unwrap();
        path.set(&mut doc, json!("renamed")).unwrap();
        assert_eq!(doc["metadata"]["name"], json!("renamed"));
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut doc = deployment();
        let path = Path::parse_restricted(".metadata.name.first").unwrap();
        match path.set(&mut doc, json!("x")).unwrap_err() {
            PathError::NotAnObject { segment, .. } => assert_eq!(segment, ".metadata.name"),
            other => panic!("expected NotAnObject, got {:?}", other),
        }
    }

    #[test]
    fn set_rejects_fan_out_paths() {
        let mut doc = deployment();
        let path = Path::parse(".spec.template.spec.containers[*].env").unwrap();
        assert!(matches!(
            path.set(&mut doc, json!([])).unwrap_err(),
            PathError::Restricted { .. }
        ));
    }

    #[test]
    fn display_round_trips_segments() {
        let path = Path::parse(".a['b.c'][2][*]..d[?(@.e == 'f')]").unwrap();
        let rendered: String = path.segments().iter().map(|s| s.to_string()).collect();
        assert_eq!(rendered, ".a['b.c'][2][*]..d[?(@.e == \"f\")]");
        assert_eq!(Path::parse(&rendered).unwrap().segments(), path.segments());
    }
}
