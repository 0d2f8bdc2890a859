//! The image parser.
//!
//! An image is a sequence of named node definitions:
//!
//! ```text
//! # a package exporting one function
//! @root = { main: @main }
//! @main = { entry: @entry, num_params: 0i32, num_locals: 0i32 }
//! @entry = { instrs: [ { op: "push", val: 777i32 }, { op: "ret" } ] }
//! ```
//!
//! References may point forward, and named nodes may reference each other
//! cyclically (basic-block graphs are cyclic). Parsing is therefore two
//! passes: the text is first read into literal trees, then every named
//! object/array gets an empty shell allocated before any field or element
//! is filled in, so references always have something to resolve to.

use opal_core::{Array, Object, Str, Value};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ImageError;

// =============================================================================
// Literal trees
// =============================================================================

#[derive(Debug)]
enum Node {
    Int(i32),
    Float(f32),
    Str(String),
    Bool(bool),
    Undef,
    /// Reference to a named node, with its source position for diagnostics.
    Ref(String, u32, u32),
    Obj(Vec<(String, Node)>),
    Arr(Vec<Node>),
}

// =============================================================================
// Parser
// =============================================================================

const EOF_CHAR: char = '\0';

/// Character-level parser with line/column tracking.
struct Parser<'src> {
    chars: std::str::Chars<'src>,
    line: u32,
    col: u32,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Parser<'src> {
        Parser {
            chars: source.chars(),
            line: 1,
            col: 1,
        }
    }

    /// Peek at the next character without consuming it.
    fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    fn is_eof(&self) -> bool {
        self.chars.clone().next().is_none()
    }

    /// Consume and return the next character.
    fn bump(&mut self) -> char {
        let Some(c) = self.chars.next() else {
            return EOF_CHAR;
        };
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    /// Consume a specific character if it is next.
    fn eat(&mut self, c: char) -> bool {
        if self.first() == c {
            self.bump();
            true
        } else {
            false
        }
    }

    fn err(&self, message: impl Into<String>) -> ImageError {
        ImageError::new(self.line, self.col, message)
    }

    fn expect(&mut self, c: char) -> Result<(), ImageError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', found '{}'", c, self.first())))
        }
    }

    /// Skip whitespace and `#` line comments.
    fn skip_trivia(&mut self) {
        loop {
            let c = self.first();
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while !self.is_eof() && self.first() != '\n' {
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn ident(&mut self) -> Result<String, ImageError> {
        let first = self.first();
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(self.err(format!("expected identifier, found '{}'", first)));
        }
        let mut name = String::new();
        while self.first().is_ascii_alphanumeric() || self.first() == '_' {
            name.push(self.bump());
        }
        Ok(name)
    }

    /// Parse the whole image into its definitions, in order.
    fn definitions(&mut self) -> Result<Vec<(String, Node)>, ImageError> {
        let mut defs = Vec::new();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        loop {
            self.skip_trivia();
            if self.is_eof() {
                break;
            }
            self.expect('@')?;
            let name = self.ident()?;
            if !seen.insert(name.clone()) {
                return Err(self.err(format!("duplicate node \"@{}\"", name)));
            }
            self.skip_trivia();
            self.expect('=')?;
            let value = self.value()?;
            defs.push((name, value));
        }
        Ok(defs)
    }

    fn value(&mut self) -> Result<Node, ImageError> {
        self.skip_trivia();
        match self.first() {
            '{' => self.object(),
            '[' => self.array(),
            '"' => self.string(),
            '@' => {
                let (line, col) = (self.line, self.col);
                self.bump();
                Ok(Node::Ref(self.ident()?, line, col))
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => self.number(),
            c if c.is_ascii_alphabetic() => {
                let word = self.ident()?;
                match word.as_str() {
                    "true" => Ok(Node::Bool(true)),
                    "false" => Ok(Node::Bool(false)),
                    "undef" => Ok(Node::Undef),
                    other => Err(self.err(format!("unknown literal \"{}\"", other))),
                }
            }
            c => Err(self.err(format!("unexpected character '{}'", c))),
        }
    }

    fn object(&mut self) -> Result<Node, ImageError> {
        self.expect('{')?;
        let mut fields = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat('}') {
                break;
            }
            let name = self.ident()?;
            self.skip_trivia();
            self.expect(':')?;
            let value = self.value()?;
            fields.push((name, value));
            self.skip_trivia();
            if !self.eat(',') {
                self.skip_trivia();
                self.expect('}')?;
                break;
            }
        }
        Ok(Node::Obj(fields))
    }

    fn array(&mut self) -> Result<Node, ImageError> {
        self.expect('[')?;
        let mut elems = Vec::new();
        loop {
            self.skip_trivia();
            if self.eat(']') {
                break;
            }
            elems.push(self.value()?);
            self.skip_trivia();
            if !self.eat(',') {
                self.skip_trivia();
                self.expect(']')?;
                break;
            }
        }
        Ok(Node::Arr(elems))
    }

    fn string(&mut self) -> Result<Node, ImageError> {
        self.expect('"')?;
        let mut text = String::new();
        loop {
            match self.bump() {
                EOF_CHAR => return Err(self.err("unterminated string literal")),
                '"' => break,
                '\\' => match self.bump() {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    '"' => text.push('"'),
                    '\\' => text.push('\\'),
                    c => return Err(self.err(format!("unknown escape '\\{}'", c))),
                },
                c => text.push(c),
            }
        }
        Ok(Node::Str(text))
    }

    fn number(&mut self) -> Result<Node, ImageError> {
        let mut text = String::new();
        if self.first() == '-' || self.first() == '+' {
            text.push(self.bump());
        }
        while self.first().is_ascii_digit() {
            text.push(self.bump());
        }
        let mut is_float = false;
        if self.first() == '.' {
            is_float = true;
            text.push(self.bump());
            while self.first().is_ascii_digit() {
                text.push(self.bump());
            }
        }
        // Optional i32/f32 suffix.
        if self.eat('i') {
            self.expect('3')?;
            self.expect('2')?;
            if is_float {
                return Err(self.err("i32 suffix on a fractional literal"));
            }
        } else if self.eat('f') {
            self.expect('3')?;
            self.expect('2')?;
            is_float = true;
        }

        if is_float {
            text.parse::<f32>()
                .map(Node::Float)
                .map_err(|_| self.err(format!("malformed float literal \"{}\"", text)))
        } else {
            text.parse::<i32>()
                .map(Node::Int)
                .map_err(|_| self.err(format!("int32 literal out of range \"{}\"", text)))
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Turn parsed definitions into the object graph and return the root
/// package object.
fn resolve(defs: Vec<(String, Node)>) -> Result<Object, ImageError> {
    let mut values: FxHashMap<String, Value> = FxHashMap::default();

    // Shells first, so cyclic references resolve.
    for (name, node) in &defs {
        let shell = match node {
            Node::Obj(fields) => Value::from(Object::with_capacity(fields.len())),
            Node::Arr(elems) => Value::from(Array::with_capacity(elems.len())),
            Node::Int(v) => Value::int32(*v),
            Node::Float(v) => Value::float32(*v),
            Node::Str(s) => Value::from(Str::new(s)),
            Node::Bool(b) => Value::bool(*b),
            Node::Undef => Value::UNDEF,
            // Aliases resolve once their targets exist.
            Node::Ref(..) => continue,
        };
        values.insert(name.clone(), shell);
    }

    // Aliases (`@a = @b`), following chains with cycle detection.
    for (name, node) in &defs {
        if let Node::Ref(..) = node {
            resolve_alias(name, &defs, &mut values, &mut FxHashSet::default())?;
        }
    }

    // Fill the container shells.
    for (name, node) in &defs {
        match node {
            Node::Obj(fields) => {
                let obj = values[name].as_object().expect("object shell");
                for (field, sub) in fields {
                    let val = build(sub, &values)?;
                    obj.set_field(field, val);
                }
            }
            Node::Arr(elems) => {
                let arr = values[name].as_array().expect("array shell");
                for sub in elems {
                    arr.push(build(sub, &values)?);
                }
            }
            _ => {}
        }
    }

    match values.get("root").copied() {
        Some(root) => root
            .as_object()
            .ok_or_else(|| ImageError::file("@root is not an object")),
        None => Err(ImageError::file("image has no @root node")),
    }
}

fn resolve_alias(
    name: &str,
    defs: &[(String, Node)],
    values: &mut FxHashMap<String, Value>,
    visiting: &mut FxHashSet<String>,
) -> Result<Value, ImageError> {
    if let Some(val) = values.get(name) {
        return Ok(*val);
    }
    let Some((_, node)) = defs.iter().find(|(n, _)| n.as_str() == name) else {
        return Err(ImageError::file(format!("undefined node \"@{}\"", name)));
    };
    let Node::Ref(target, line, col) = node else {
        unreachable!("non-alias definitions were resolved in the shell pass");
    };
    if !visiting.insert(name.to_owned()) {
        return Err(ImageError::new(
            *line,
            *col,
            format!("alias cycle through \"@{}\"", name),
        ));
    }
    let val = match values.get(target) {
        Some(v) => *v,
        None => resolve_alias(target, defs, values, visiting).map_err(|_| {
            ImageError::new(*line, *col, format!("undefined node \"@{}\"", target))
        })?,
    };
    values.insert(name.to_owned(), val);
    Ok(val)
}

/// Build a value from a literal tree, resolving references through the
/// named-node table.
fn build(node: &Node, values: &FxHashMap<String, Value>) -> Result<Value, ImageError> {
    Ok(match node {
        Node::Int(v) => Value::int32(*v),
        Node::Float(v) => Value::float32(*v),
        Node::Str(s) => Value::from(Str::new(s)),
        Node::Bool(b) => Value::bool(*b),
        Node::Undef => Value::UNDEF,
        Node::Ref(name, line, col) => *values.get(name).ok_or_else(|| {
            ImageError::new(*line, *col, format!("undefined node \"@{}\"", name))
        })?,
        Node::Obj(fields) => {
            let obj = Object::with_capacity(fields.len());
            for (field, sub) in fields {
                let val = build(sub, values)?;
                obj.set_field(field, val);
            }
            Value::from(obj)
        }
        Node::Arr(elems) => {
            let arr = Array::with_capacity(elems.len());
            for sub in elems {
                arr.push(build(sub, values)?);
            }
            Value::from(arr)
        }
    })
}

/// Parse an image from source text, returning the root package object.
pub fn parse_image(source: &str) -> Result<Object, ImageError> {
    let defs = Parser::new(source).definitions()?;
    resolve(defs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_literals() {
        let root = parse_image(
            r#"
            @root = { i: 7, ineg: -3i32, f: 1.5, fsuf: 2f32, t: true, f2: false, u: undef, s: "hi\n" }
            "#,
        )
        .unwrap();
        assert_eq!(root.get_field("i"), Some(Value::int32(7)));
        assert_eq!(root.get_field("ineg"), Some(Value::int32(-3)));
        assert_eq!(root.get_field("f"), Some(Value::float32(1.5)));
        assert_eq!(root.get_field("fsuf"), Some(Value::float32(2.0)));
        assert_eq!(root.get_field("t"), Some(Value::TRUE));
        assert_eq!(root.get_field("f2"), Some(Value::FALSE));
        assert_eq!(root.get_field("u"), Some(Value::UNDEF));
        let s = root.get_field("s").unwrap().as_str().unwrap();
        assert_eq!(s.as_bytes(), b"hi\n");
    }

    #[test]
    fn test_nested_containers() {
        let root = parse_image(r#"@root = { xs: [1, [2, 3], { y: 4 }] }"#).unwrap();
        let xs = root.get_field("xs").unwrap().as_array().unwrap();
        assert_eq!(xs.len(), 3);
        assert_eq!(xs.get(0), Some(Value::int32(1)));
        let inner = xs.get(1).unwrap().as_array().unwrap();
        assert_eq!(inner.get(1), Some(Value::int32(3)));
        let obj = xs.get(2).unwrap().as_object().unwrap();
        assert_eq!(obj.get_field("y"), Some(Value::int32(4)));
    }

    #[test]
    fn test_forward_and_cyclic_references() {
        // a and b reference each other, as basic-block graphs do.
        let root = parse_image(
            r#"
            @root = { a: @a }
            @a = { next: @b }
            @b = { back: @a }
            "#,
        )
        .unwrap();
        let a = root.get_field("a").unwrap().as_object().unwrap();
        let b = a.get_field("next").unwrap().as_object().unwrap();
        let back = b.get_field("back").unwrap().as_object().unwrap();
        assert!(back == a);
    }

    #[test]
    fn test_alias_definition() {
        let root = parse_image(
            r#"
            @root = { x: @alias }
            @alias = @target
            @target = { v: 9 }
            "#,
        )
        .unwrap();
        let x = root.get_field("x").unwrap().as_object().unwrap();
        assert_eq!(x.get_field("v"), Some(Value::int32(9)));
    }

    #[test]
    fn test_comments_and_trailing_commas() {
        let root = parse_image(
            r#"
            # the package
            @root = {
                xs: [1, 2,],  # elements
                n: 3,
            }
            "#,
        )
        .unwrap();
        assert_eq!(root.get_field("n"), Some(Value::int32(3)));
        assert_eq!(root.get_field("xs").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = parse_image("@root = { }\n@root = { }").unwrap_err();
        assert!(err.message.contains("duplicate"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_undefined_reference_rejected() {
        let err = parse_image("@root = { x: @nowhere }").unwrap_err();
        assert!(err.message.contains("nowhere"));
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let err = parse_image(
            r#"
            @root = { }
            @a = @b
            @b = @a
            "#,
        )
        .unwrap_err();
        assert!(err.message.contains("alias cycle") || err.message.contains("undefined"));
    }

    #[test]
    fn test_missing_root_rejected() {
        let err = parse_image("@main = { }").unwrap_err();
        assert!(err.message.contains("@root"));
    }

    #[test]
    fn test_non_object_root_rejected() {
        let err = parse_image("@root = 5").unwrap_err();
        assert!(err.message.contains("not an object"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse_image("@root = { s: \"oops }").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_image("@root = { x 1 }").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("':'"));
    }
}
