//! Incremental schema composition.
//!
//! Feature modules each contribute a schema fragment at startup. The
//! composer folds every fragment into a single document with three parts:
//!
//! - the fields of `type Query`, normalized to `name(args):Type`
//! - the fields of `type Mutation`, normalized the same way
//! - every other top-level definition, kept verbatim
//!
//! Nothing is deduplicated. A field declared by two fragments appears twice,
//! and two `type User` blocks are both rendered. The rendered document is
//! always rebuilt from these three lists, never patched as raw text.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";

/// Words that open a top-level definition.
const DEFINITION_KEYWORDS: [&str; 9] = [
    "type",
    "input",
    "enum",
    "interface",
    "union",
    "scalar",
    "schema",
    "extend",
    "directive",
];

/// Errors raised while parsing a schema fragment.
///
/// Offsets are byte offsets into the fragment that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unbalanced braces at offset {offset}")]
    UnbalancedBraces { offset: usize },
    #[error("unterminated string literal at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("unparsable field declaration at offset {offset}: {declaration:?}")]
    UnparsableField { offset: usize, declaration: String },
    #[error("unexpected token at offset {offset}: {token:?}")]
    UnexpectedToken { offset: usize, token: String },
}

// ---------------------------------------------------------------------------
// SchemaDocument
// ---------------------------------------------------------------------------

/// Parsed form of one or more fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDocument {
    query: Vec<String>,
    mutation: Vec<String>,
    auxiliary: Vec<String>,
}

impl SchemaDocument {
    /// Parses a fragment into its root fields and auxiliary blocks.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when braces or string literals are not
    /// closed, when a root field cannot be read as `name(args): Type`, or
    /// when top-level text is not a recognizable definition.
    pub fn parse(fragment: &str) -> Result<Self, SchemaError> {
        let mut doc = Self::default();
        let mut scanner = Scanner::new(fragment, 0);

        loop {
            scanner.skip_ignored();
            if scanner.at_end() {
                break;
            }

            let start = scanner.pos;
            if scanner.peek() == Some(b'"') {
                scanner.skip_string()?;
                scanner.skip_ignored();
            }

            let keyword_offset = scanner.offset();
            let Some(keyword) = scanner.read_name() else {
                return Err(scanner.unexpected());
            };
            let (kind, kind_offset, extension) = if keyword == "extend" {
                scanner.skip_ignored();
                let offset = scanner.offset();
                (scanner.expect_name()?, offset, true)
            } else {
                (keyword, keyword_offset, false)
            };

            match kind {
                "directive" if !extension => scanner.read_directive_definition()?,
                "schema" => {
                    scanner.read_directives()?;
                    scanner.read_optional_body()?;
                }
                "scalar" | "union" | "type" | "interface" | "enum" | "input" => {
                    scanner.skip_ignored();
                    let name = scanner.expect_name()?;
                    if matches!(kind, "type" | "interface") {
                        scanner.read_implements()?;
                    }
                    scanner.read_directives()?;
                    if kind == "union" {
                        scanner.read_union_members()?;
                    }
                    let body = if matches!(kind, "scalar" | "union") {
                        None
                    } else {
                        scanner.read_optional_body()?
                    };

                    if kind == "type" && !extension && matches!(name, QUERY | MUTATION) {
                        if let Some((block, offset)) = body {
                            let fields = parse_fields(&block[1..block.len() - 1], offset + 1)?;
                            if name == QUERY {
                                doc.query.extend(fields);
                            } else {
                                doc.mutation.extend(fields);
                            }
                        }
                        continue;
                    }
                }
                other => {
                    return Err(SchemaError::UnexpectedToken {
                        offset: kind_offset,
                        token: other.to_string(),
                    });
                }
            }

            doc.auxiliary.push(scanner.slice_from(start));
        }

        Ok(doc)
    }

    /// Appends another document after this one, preserving order.
    pub fn append(&mut self, other: SchemaDocument) {
        self.query.extend(other.query);
        self.mutation.extend(other.mutation);
        self.auxiliary.extend(other.auxiliary);
    }

    /// Normalized `Query` fields in merge order.
    #[must_use]
    pub fn query_fields(&self) -> &[String] {
        &self.query
    }

    /// Normalized `Mutation` fields in merge order.
    #[must_use]
    pub fn mutation_fields(&self) -> &[String] {
        &self.mutation
    }

    /// Auxiliary definitions in first-seen order, as written.
    #[must_use]
    pub fn auxiliary_blocks(&self) -> &[String] {
        &self.auxiliary
    }

    /// Renders the canonical document.
    ///
    /// Root blocks come first and only when they carry fields, one field per
    /// line. Auxiliary blocks follow, one per line. No trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        for (name, fields) in [(QUERY, &self.query), (MUTATION, &self.mutation)] {
            if fields.is_empty() {
                continue;
            }
            lines.push(if name == QUERY {
                "type Query {"
            } else {
                "type Mutation {"
            });
            lines.extend(fields.iter().map(String::as_str));
            lines.push("}");
        }
        lines.extend(self.auxiliary.iter().map(String::as_str));
        lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// SchemaComposer
// ---------------------------------------------------------------------------

/// Accumulates fragments into one combined schema during bootstrap.
///
/// `merge` takes `&self` and is guarded by a mutex, so a composer can be
/// shared while feature modules register. Once registration is over call
/// [`SchemaComposer::finish`] to obtain the immutable [`ComposedSchema`].
#[derive(Debug, Default)]
pub struct SchemaComposer {
    document: Mutex<SchemaDocument>,
}

impl SchemaComposer {
    /// Creates an empty composer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a composer seeded with an initial schema text.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if `initial` is malformed.
    pub fn from_document(initial: &str) -> Result<Self, SchemaError> {
        let composer = Self::new();
        composer.merge(initial)?;
        Ok(composer)
    }

    /// Merges a fragment into the combined document.
    ///
    /// The fragment is parsed before the lock is taken; a malformed fragment
    /// leaves the combined document untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if the fragment is malformed.
    pub fn merge(&self, fragment: &str) -> Result<(), SchemaError> {
        let parsed = SchemaDocument::parse(fragment)?;
        debug!(
            query_fields = parsed.query.len(),
            mutation_fields = parsed.mutation.len(),
            auxiliary_blocks = parsed.auxiliary.len(),
            "merging schema fragment"
        );
        self.document.lock().append(parsed);
        Ok(())
    }

    /// Returns a copy of the current parsed state.
    #[must_use]
    pub fn document(&self) -> SchemaDocument {
        self.document.lock().clone()
    }

    /// Renders the current combined document.
    #[must_use]
    pub fn render(&self) -> String {
        self.document.lock().render()
    }

    /// Ends composition and freezes the rendered document.
    #[must_use]
    pub fn finish(self) -> ComposedSchema {
        ComposedSchema::new(self.document.into_inner().render())
    }
}

// ---------------------------------------------------------------------------
// ComposedSchema
// ---------------------------------------------------------------------------

/// The finished, immutable schema document shared by every request.
///
/// Cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedSchema {
    sdl: Arc<str>,
}

impl ComposedSchema {
    #[must_use]
    pub fn new(sdl: impl Into<Arc<str>>) -> Self {
        Self { sdl: sdl.into() }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.sdl
    }
}

impl fmt::Display for ComposedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sdl)
    }
}

// ---------------------------------------------------------------------------
// Field normalization
// ---------------------------------------------------------------------------

/// Splits the body of a root block into normalized field declarations.
///
/// `base` is the offset of `body` inside the enclosing fragment.
fn parse_fields(body: &str, base: usize) -> Result<Vec<String>, SchemaError> {
    let mut scanner = Scanner::new(body, base);
    let mut fields = Vec::new();

    loop {
        scanner.skip_ignored();
        if scanner.at_end() {
            break;
        }
        // Field descriptions are dropped.
        if scanner.peek() == Some(b'"') {
            scanner.skip_string()?;
            continue;
        }

        let start = scanner.pos;
        let Some(name) = scanner.read_name() else {
            return Err(scanner.unparsable(start));
        };
        let mut field = name.to_string();

        scanner.skip_ignored();
        if scanner.peek() == Some(b'(') {
            let args = scanner.read_balanced(b'(', b')')?;
            field.push_str(&strip_whitespace(args));
            scanner.skip_ignored();
        }

        if !scanner.eat(b':') {
            return Err(scanner.unparsable(start));
        }
        field.push(':');
        let ty = scanner.read_type().ok_or_else(|| scanner.unparsable(start))?;
        field.push_str(&ty);

        loop {
            let mark = scanner.pos;
            scanner.skip_ignored();
            if !scanner.eat(b'@') {
                scanner.pos = mark;
                break;
            }
            let directive = scanner
                .read_name()
                .ok_or_else(|| scanner.unparsable(start))?;
            field.push_str(" @");
            field.push_str(directive);
            let mark = scanner.pos;
            scanner.skip_ignored();
            if scanner.peek() == Some(b'(') {
                let args = scanner.read_balanced(b'(', b')')?;
                field.push_str(&strip_whitespace(args));
            } else {
                scanner.pos = mark;
            }
        }

        fields.push(field);
    }

    Ok(fields)
}

/// Removes whitespace and comments outside string literals.
///
/// Where dropping a gap would fuse two tokens (`Int = 10 after: String`),
/// a comma is left in its place.
fn strip_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut gap = false;

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' || skipped == '\r' {
                        break;
                    }
                }
                gap = true;
            }
            c if c.is_whitespace() => gap = true,
            c => {
                if gap && out.chars().last().is_some_and(ends_token) && starts_token(c) {
                    out.push(',');
                }
                gap = false;
                out.push(c);
                if c == '"' {
                    copy_string(&mut chars, &mut out);
                }
            }
        }
    }
    out
}

/// Copies the rest of a string literal whose opening quote is already in `out`.
fn copy_string(chars: &mut Peekable<Chars<'_>>, out: &mut String) {
    if chars.peek() == Some(&'"') {
        chars.next();
        out.push('"');
        if chars.peek() != Some(&'"') {
            return;
        }
        chars.next();
        out.push('"');
        let content_start = out.len();
        for c in chars.by_ref() {
            out.push(c);
            if out.len() >= content_start + 3 && out.ends_with("\"\"\"") {
                return;
            }
        }
        return;
    }

    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' => return,
            _ => {}
        }
    }
}

fn ends_token(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '!' | ']' | '"' | ')' | '}')
}

fn starts_token(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '"' | '$')
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Byte cursor over schema text.
///
/// Every delimiter the grammar cares about is ASCII, so positions where the
/// scanner stops are always UTF-8 boundaries.
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    base: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, base: usize) -> Self {
        Self { src, pos: 0, base }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn slice_from(&self, start: usize) -> String {
        self.src[start..self.pos].trim().to_string()
    }

    /// Skips whitespace, commas and `#` comments.
    fn skip_ignored(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' | b',' | 0x0c => self.pos += 1,
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                // Unicode BOM and other non-ASCII whitespace.
                _ if b >= 0x80 => {
                    let Some(c) = self.src[self.pos..].chars().next() else {
                        break;
                    };
                    if c.is_whitespace() || c == '\u{feff}' {
                        self.pos += c.len_utf8();
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn read_name(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b == b'_' || b.is_ascii_alphabetic() => self.pos += 1,
            _ => return None,
        }
        while let Some(b) = self.peek() {
            if b == b'_' || b.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        Some(&self.src[start..self.pos])
    }

    fn expect_name(&mut self) -> Result<&'a str, SchemaError> {
        self.read_name().ok_or_else(|| self.unexpected())
    }

    /// Reads a type reference such as `User`, `[ID!]!`, returning it
    /// without whitespace.
    fn read_type(&mut self) -> Option<String> {
        self.skip_ignored();
        let mut ty = if self.eat(b'[') {
            let inner = self.read_type()?;
            self.skip_ignored();
            if !self.eat(b']') {
                return None;
            }
            format!("[{inner}]")
        } else {
            self.read_name()?.to_string()
        };

        let mark = self.pos;
        self.skip_ignored();
        if self.eat(b'!') {
            ty.push('!');
        } else {
            self.pos = mark;
        }
        Some(ty)
    }

    /// Skips a `"..."` or `"""..."""` literal starting at the cursor.
    fn skip_string(&mut self) -> Result<(), SchemaError> {
        let start = self.offset();
        let rest = &self.src[self.pos..];

        if rest.starts_with("\"\"\"") {
            let Some(end) = rest[3..].find("\"\"\"") else {
                return Err(SchemaError::UnterminatedString { offset: start });
            };
            self.pos += 3 + end + 3;
            return Ok(());
        }

        self.pos += 1;
        while let Some(b) = self.peek() {
            match b {
                b'\\' => self.pos += 2,
                b'"' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'\n' | b'\r' => break,
                _ => self.pos += 1,
            }
        }
        Err(SchemaError::UnterminatedString { offset: start })
    }

    /// Reads a delimited group starting at `open`, returning the slice
    /// including both delimiters. Strings and comments are skipped.
    fn read_balanced(&mut self, open: u8, close: u8) -> Result<&'a str, SchemaError> {
        let start = self.pos;
        let start_offset = self.offset();
        let mut depth = 0usize;

        while let Some(b) = self.peek() {
            match b {
                b'"' => {
                    self.skip_string()?;
                    continue;
                }
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                        self.pos += 1;
                    }
                    continue;
                }
                _ if b == open => depth += 1,
                _ if b == close => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(&self.src[start..self.pos]);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }

        Err(SchemaError::UnbalancedBraces {
            offset: start_offset,
        })
    }

    /// Returns the next name without consuming it.
    fn peek_name(&mut self) -> Option<&'a str> {
        let mark = self.pos;
        self.skip_ignored();
        let name = self.read_name();
        self.pos = mark;
        name
    }

    /// Consumes `b` if it is the next significant byte.
    fn eat_significant(&mut self, b: u8) -> bool {
        let mark = self.pos;
        self.skip_ignored();
        if self.eat(b) {
            true
        } else {
            self.pos = mark;
            false
        }
    }

    fn skip_arguments(&mut self) -> Result<(), SchemaError> {
        let mark = self.pos;
        self.skip_ignored();
        if self.peek() == Some(b'(') {
            self.read_balanced(b'(', b')')?;
        } else {
            self.pos = mark;
        }
        Ok(())
    }

    /// Reads `implements A & B` after a type or interface name. Legacy
    /// lists separated only by commas or spaces are accepted too.
    fn read_implements(&mut self) -> Result<(), SchemaError> {
        if self.peek_name() != Some("implements") {
            return Ok(());
        }
        self.skip_ignored();
        self.read_name();
        self.eat_significant(b'&');
        self.skip_ignored();
        self.expect_name()?;
        loop {
            if self.eat_significant(b'&') {
                self.skip_ignored();
                self.expect_name()?;
                continue;
            }
            match self.peek_name() {
                Some(name) if !DEFINITION_KEYWORDS.contains(&name) => {
                    self.skip_ignored();
                    self.read_name();
                }
                _ => return Ok(()),
            }
        }
    }

    /// Reads any number of `@name(args)` applications.
    fn read_directives(&mut self) -> Result<(), SchemaError> {
        while self.eat_significant(b'@') {
            self.skip_ignored();
            self.expect_name()?;
            self.skip_arguments()?;
        }
        Ok(())
    }

    /// Reads `= A | B | C` after a union header, if present.
    fn read_union_members(&mut self) -> Result<(), SchemaError> {
        if !self.eat_significant(b'=') {
            return Ok(());
        }
        self.eat_significant(b'|');
        self.read_alternatives()
    }

    /// Reads `A | B | C`.
    fn read_alternatives(&mut self) -> Result<(), SchemaError> {
        self.skip_ignored();
        self.expect_name()?;
        while self.eat_significant(b'|') {
            self.skip_ignored();
            self.expect_name()?;
        }
        Ok(())
    }

    /// Reads `@name(args) repeatable on A | B` after `directive`.
    fn read_directive_definition(&mut self) -> Result<(), SchemaError> {
        self.skip_ignored();
        if !self.eat(b'@') {
            return Err(self.unexpected());
        }
        self.skip_ignored();
        self.expect_name()?;
        self.skip_arguments()?;
        if self.peek_name() == Some("repeatable") {
            self.skip_ignored();
            self.read_name();
        }
        self.skip_ignored();
        if self.peek_name() != Some("on") {
            return Err(self.unexpected());
        }
        self.read_name();
        self.eat_significant(b'|');
        self.read_alternatives()
    }

    /// Reads a `{ ... }` body if one follows, with the offset of its brace.
    fn read_optional_body(&mut self) -> Result<Option<(&'a str, usize)>, SchemaError> {
        let mark = self.pos;
        self.skip_ignored();
        if self.peek() != Some(b'{') {
            self.pos = mark;
            return Ok(None);
        }
        let offset = self.offset();
        Ok(Some((self.read_balanced(b'{', b'}')?, offset)))
    }

    fn unexpected(&self) -> SchemaError {
        let token: String = self.src[self.pos..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .take(32)
            .collect();
        if token.starts_with('}') {
            return SchemaError::UnbalancedBraces {
                offset: self.offset(),
            };
        }
        SchemaError::UnexpectedToken {
            offset: self.offset(),
            token,
        }
    }

    fn unparsable(&self, start: usize) -> SchemaError {
        let declaration = self.src[start..]
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        SchemaError::UnparsableField {
            offset: self.base + start,
            declaration,
        }
    }
}
