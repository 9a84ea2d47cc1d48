//! Reader and writer for the `#define`-style settings headers the firmware is built with.

use log::debug;
use std::fmt::{self, Write};
use thiserror::Error;

const DEFINE: &str = "#define";
const UNDEF: &str = "#undef";

/// Right-hand side of a `#define`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A C string literal, unescaped.
    Str(String),
    /// A bare token such as `D5` or `LED_BUILTIN`.
    Token(String),
    /// A name-only define, e.g. an include guard.
    Empty,
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string literal",
            Value::Token(_) => "token",
            Value::Empty => "empty define",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => {
                f.write_char('"')?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('"')
            }
            Value::Token(t) => f.write_str(t),
            Value::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    pub name: String,
    pub value: Value,
    /// False for a definition that is commented out (`//#define ...`).
    pub enabled: bool,
}

impl Define {
    pub fn new(name: &str, value: Value, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            value,
            enabled,
        }
    }
}

impl fmt::Display for Define {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            f.write_str("//")?;
        }
        write!(f, "{} {}", DEFINE, self.name)?;
        if self.value != Value::Empty {
            write!(f, " {}", self.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("line {line}: directive without a symbol name")]
    MissingName { line: usize },
    #[error("line {line}: invalid symbol name '{name}'")]
    InvalidName { line: usize, name: String },
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
    #[error("line {line}: unexpected text after value: '{rest}'")]
    TrailingTokens { line: usize, rest: String },
    #[error("line {line}: not a #define or comment: '{text}'")]
    UnexpectedLine { line: usize, text: String },
    #[error("block comment opened on line {line} is never closed")]
    UnterminatedComment { line: usize },
    #[error("symbol {name} is defined on line {first} and again on line {second}")]
    DuplicateDefinition {
        name: String,
        first: usize,
        second: usize,
    },
}

/// Parsed header: every definition with the line it came from, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<(usize, Define)>,
}

impl Header {
    /// The active definition of `name`.
    pub fn get(&self, name: &str) -> Option<&Define> {
        self.find(name, true)
    }

    /// The commented-out definition of `name`.
    pub fn get_disabled(&self, name: &str) -> Option<&Define> {
        self.find(name, false)
    }

    pub fn defines(&self) -> impl Iterator<Item = &Define> {
        self.entries.iter().map(|(_, define)| define)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replace every definition of `define.name` with `define`.
    pub fn upsert(&mut self, define: Define) {
        self.entries.retain(|(_, d)| d.name != define.name);
        self.entries.push((0, define));
    }

    fn find(&self, name: &str, enabled: bool) -> Option<&Define> {
        self.entries
            .iter()
            .map(|(_, define)| define)
            .find(|define| define.name == name && define.enabled == enabled)
    }

    fn insert(&mut self, line: usize, define: Define) -> Result<(), HeaderError> {
        let clash = self
            .entries
            .iter()
            .find(|(_, d)| d.name == define.name && d.enabled == define.enabled)
            .map(|(first, _)| *first);
        match clash {
            Some(first) if define.enabled => Err(HeaderError::DuplicateDefinition {
                name: define.name,
                first,
                second: line,
            }),
            Some(first) => {
                debug!(
                    "Keeping commented-out {} from line {}, ignoring line {}",
                    define.name, first, line
                );
                Ok(())
            }
            None => {
                self.entries.push((line, define));
                Ok(())
            }
        }
    }

    /// Apply `#undef name`: the active definition becomes a commented-out one, unless a
    /// commented-out suggestion already exists.
    fn undefine(&mut self, name: &str, line: usize) {
        let has_disabled = self.find(name, false).is_some();
        let active = self
            .entries
            .iter()
            .position(|(_, d)| d.name == name && d.enabled);
        match active {
            Some(idx) if has_disabled => {
                self.entries.remove(idx);
            }
            Some(idx) => self.entries[idx].1.enabled = false,
            None => debug!("#undef {} on line {} has nothing to undefine", name, line),
        }
    }
}

enum CommentStart {
    Line,
    Block,
}

/// First `//` or `/*` outside a string literal.
fn find_comment(line: &str) -> Option<(usize, CommentStart)> {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b'/' if !in_string => match bytes.get(i + 1) {
                Some(b'/') => return Some((i, CommentStart::Line)),
                Some(b'*') => return Some((i, CommentStart::Block)),
                _ => {}
            },
            _ => {}
        }
        i += 1;
    }
    None
}

/// Remove `/* ... */` comments from one line. A line comment is left in place. `open` holds
/// the line of a block comment still open at the end of the line.
fn strip_block_comments(line: &str, line_no: usize, open: &mut Option<usize>) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        if open.is_some() {
            match rest.find("*/") {
                Some(end) => {
                    *open = None;
                    rest = &rest[end + 2..];
                    out.push(' ');
                }
                None => return out,
            }
        }
        match find_comment(rest) {
            Some((start, CommentStart::Block)) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + 2..];
                *open = Some(line_no);
            }
            Some((_, CommentStart::Line)) | None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/// Parse header text.
///
/// A line comment whose body is a well-formed `#define` is kept as a disabled definition.
/// Any other comment is dropped.
pub fn parse(text: &str) -> Result<Header, HeaderError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut header = Header::default();
    let mut block_start: Option<usize> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let stripped = strip_block_comments(raw, line_no, &mut block_start);
        let line = stripped.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(body) = line.strip_prefix("//") {
            // A block comment opened inside a line comment ends with the line.
            let body = strip_block_comments(body, line_no, &mut None);
            let body = body.trim();
            if body.starts_with(DEFINE) {
                match parse_define(body, line_no) {
                    Ok((name, value)) => {
                        header.insert(line_no, Define { name, value, enabled: false })?
                    }
                    Err(e) => debug!("Ignoring commented-out line {}: {}", line_no, e),
                }
            }
            continue;
        }

        if line.starts_with(DEFINE) {
            let (name, value) = parse_define(line, line_no)?;
            header.insert(line_no, Define { name, value, enabled: true })?;
        } else if line.starts_with(UNDEF) {
            let name = parse_undef(line, line_no)?;
            header.undefine(&name, line_no);
        } else if line.starts_with('#') {
            debug!("Skipping preprocessor directive on line {}: {}", line_no, line);
        } else {
            return Err(HeaderError::UnexpectedLine {
                line: line_no,
                text: line.to_string(),
            });
        }
    }

    if let Some(line) = block_start {
        return Err(HeaderError::UnterminatedComment { line });
    }

    Ok(header)
}

fn parse_undef(line: &str, line_no: usize) -> Result<String, HeaderError> {
    let rest = &line[UNDEF.len()..];
    let rest = rest.split("//").next().unwrap_or_default();
    let mut words = rest.split_whitespace();
    let name = match words.next() {
        Some(name) if rest.starts_with(char::is_whitespace) => name,
        _ => return Err(HeaderError::MissingName { line: line_no }),
    };
    if !is_identifier(name) {
        return Err(HeaderError::InvalidName {
            line: line_no,
            name: name.to_string(),
        });
    }
    if let Some(extra) = words.next() {
        return Err(HeaderError::TrailingTokens {
            line: line_no,
            rest: extra.to_string(),
        });
    }
    Ok(name.to_string())
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_define(line: &str, line_no: usize) -> Result<(String, Value), HeaderError> {
    let rest = &line[DEFINE.len()..];
    if !rest.starts_with(char::is_whitespace) {
        return Err(HeaderError::MissingName { line: line_no });
    }
    let rest = rest.trim_start();

    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if name.is_empty() {
        return Err(HeaderError::MissingName { line: line_no });
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) || rest[name_len..].starts_with('(') {
        return Err(HeaderError::InvalidName {
            line: line_no,
            name: rest.split_whitespace().next().unwrap_or(name).to_string(),
        });
    }

    let rest = rest[name_len..].trim_start();
    let (value, remainder) = if rest.is_empty() || rest.starts_with("//") {
        (Value::Empty, rest)
    } else if let Some(literal) = rest.strip_prefix('"') {
        let (s, consumed) = parse_string_literal(literal, line_no)?;
        (Value::Str(s), &literal[consumed..])
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len())
            .min(rest.find("//").unwrap_or(rest.len()));
        (Value::Token(rest[..end].to_string()), &rest[end..])
    };

    let remainder = remainder.trim();
    if !(remainder.is_empty() || remainder.starts_with("//")) {
        return Err(HeaderError::TrailingTokens {
            line: line_no,
            rest: remainder.to_string(),
        });
    }

    Ok((name.to_string(), value))
}

/// Unescape a string literal body (after the opening quote). Returns the value and the number
/// of bytes consumed including the closing quote.
fn parse_string_literal(body: &str, line_no: usize) -> Result<(String, usize), HeaderError> {
    let mut out = String::new();
    let mut chars = body.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, idx + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            },
            c => out.push(c),
        }
    }

    Err(HeaderError::UnterminatedString { line: line_no })
}

/// One line of a header to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Blank,
    Comment(String),
    Define(Define),
}

/// Render-ready header: a banner block comment followed by items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDocument {
    pub banner: String,
    pub items: Vec<Item>,
}

impl HeaderDocument {
    pub fn new(banner: &str) -> Self {
        Self {
            banner: banner.to_string(),
            items: Vec::new(),
        }
    }

    pub fn blank(mut self) -> Self {
        self.items.push(Item::Blank);
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.items.push(Item::Comment(text.to_string()));
        self
    }

    pub fn define(mut self, define: Define) -> Self {
        self.items.push(Item::Define(define));
        self
    }
}

impl From<&HeaderDocument> for Header {
    fn from(doc: &HeaderDocument) -> Self {
        let entries = doc
            .items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| match item {
                Item::Define(define) => Some((idx + 1, define.clone())),
                _ => None,
            })
            .collect();
        Self { entries }
    }
}

/// Render a document as header text.
pub fn render(doc: &HeaderDocument) -> String {
    let mut out = String::new();
    out.push_str("/**\n");
    for line in doc.banner.lines() {
        out.push_str("  * ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("  */\n");

    for item in &doc.items {
        match item {
            Item::Blank => out.push('\n'),
            Item::Comment(text) => {
                for line in text.lines() {
                    out.push_str("// ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Item::Define(define) => {
                out.push_str(&define.to_string());
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_HEADER: &str = r#"/**
  * Settings for this specific MMRC client
  */
// Access point
#define APNAME "MMRC-start"
#define APPASSWORD "mmrc1234"

// Define which pin to use for the pushbutton
#define BUTTON_PIN D5

// Configuration pin
// When CONFIG_PIN is pulled to ground on startup, the client will use the initial
// password to buld an AP. (E.g. in case of lost password)
//#define CONFIG_PIN D2
"#;

    #[test]
    fn parses_strings_tokens_and_disabled_defines() {
        let header = parse(START_HEADER).unwrap();
        assert_eq!(header.len(), 4);
        assert_eq!(
            header.get("APNAME").map(|d| &d.value),
            Some(&Value::Str("MMRC-start".to_string()))
        );
        assert_eq!(
            header.get("BUTTON_PIN").map(|d| &d.value),
            Some(&Value::Token("D5".to_string()))
        );
        assert!(header.get("CONFIG_PIN").is_none());
        assert_eq!(
            header.get_disabled("CONFIG_PIN").map(|d| &d.value),
            Some(&Value::Token("D2".to_string()))
        );
    }

    #[test]
    fn strips_trailing_comments() {
        let header = parse("#define LED_PIN LED_BUILTIN // on-board\n#define X \"a b\"// c").unwrap();
        assert_eq!(
            header.get("LED_PIN").unwrap().value,
            Value::Token("LED_BUILTIN".to_string())
        );
        assert_eq!(header.get("X").unwrap().value, Value::Str("a b".to_string()));
    }

    #[test]
    fn rejects_duplicate_enabled_definitions() {
        let err = parse("#define A \"1\"\n\n#define A \"2\"").unwrap_err();
        assert_eq!(
            err,
            HeaderError::DuplicateDefinition {
                name: "A".to_string(),
                first: 1,
                second: 3
            }
        );
    }

    #[test]
    fn enabled_definition_wins_over_disabled_one() {
        let header = parse("//#define STATUS_PIN LED_BUILTIN\n#define STATUS_PIN D4").unwrap();
        assert_eq!(
            header.get("STATUS_PIN").unwrap().value,
            Value::Token("D4".to_string())
        );
        assert!(header.get_disabled("STATUS_PIN").is_some());
    }

    #[test]
    fn repeated_commented_out_suggestions_keep_the_first() {
        let header = parse("//#define STATUS_PIN D4\n//#define STATUS_PIN LED_BUILTIN\n").unwrap();
        assert_eq!(header.len(), 1);
        assert_eq!(
            header.get_disabled("STATUS_PIN").unwrap().value,
            Value::Token("D4".to_string())
        );
    }

    #[test]
    fn undef_turns_definition_off() {
        let header = parse("#define CONFIG_PIN D2\n#undef CONFIG_PIN // not wired\n").unwrap();
        assert!(header.get("CONFIG_PIN").is_none());
        assert_eq!(
            header.get_disabled("CONFIG_PIN").unwrap().value,
            Value::Token("D2".to_string())
        );

        let header = parse("//#define STATUS_PIN LED_BUILTIN\n#define STATUS_PIN D4\n#undef STATUS_PIN").unwrap();
        assert!(header.get("STATUS_PIN").is_none());
        assert_eq!(
            header.get_disabled("STATUS_PIN").unwrap().value,
            Value::Token("LED_BUILTIN".to_string())
        );
    }

    #[test]
    fn redefinition_after_undef_is_allowed() {
        let header = parse("#define LED_PIN D1\n#undef LED_PIN\n#define LED_PIN D3\n").unwrap();
        assert_eq!(
            header.get("LED_PIN").unwrap().value,
            Value::Token("D3".to_string())
        );
        assert_eq!(parse("#undef NEVER_DEFINED").unwrap().len(), 0);
    }

    #[test]
    fn rejects_malformed_undef() {
        assert_eq!(
            parse("#undef").unwrap_err(),
            HeaderError::MissingName { line: 1 }
        );
        assert_eq!(
            parse("\n#undef A B").unwrap_err(),
            HeaderError::TrailingTokens {
                line: 2,
                rest: "B".to_string()
            }
        );
    }

    #[test]
    fn strips_block_comments_anywhere_on_a_line() {
        let text = "#define BUTTON_PIN D5 /* push */\n\
                    #define APNAME \"a/*b\" /* spans\n\
                    two lines */ #define LED_PIN /* on-board */ LED_BUILTIN\n\
                    //#define CONFIG_PIN D2 /* optional */\n";
        let header = parse(text).unwrap();
        assert_eq!(
            header.get("BUTTON_PIN").unwrap().value,
            Value::Token("D5".to_string())
        );
        assert_eq!(header.get("APNAME").unwrap().value, Value::Str("a/*b".to_string()));
        assert_eq!(
            header.get("LED_PIN").unwrap().value,
            Value::Token("LED_BUILTIN".to_string())
        );
        assert!(header.get_disabled("CONFIG_PIN").is_some());
    }

    #[test]
    fn block_comment_inside_line_comment_does_not_open() {
        let header = parse("// see /* below\n#define A \"1\"\n").unwrap();
        assert_eq!(header.get("A").unwrap().value, Value::Str("1".to_string()));
    }

    #[test]
    fn skips_leading_byte_order_mark() {
        let header = parse("\u{feff}/**\n  * banner\n  */\n#define A \"1\"\n").unwrap();
        assert_eq!(header.len(), 1);
    }

    #[test]
    fn reports_malformed_lines_with_line_numbers() {
        assert_eq!(
            parse("#define").unwrap_err(),
            HeaderError::MissingName { line: 1 }
        );
        assert_eq!(
            parse("\n#define A \"open").unwrap_err(),
            HeaderError::UnterminatedString { line: 2 }
        );
        assert_eq!(
            parse("#define A B C").unwrap_err(),
            HeaderError::TrailingTokens {
                line: 1,
                rest: "C".to_string()
            }
        );
        assert!(matches!(
            parse("#define 1A x").unwrap_err(),
            HeaderError::InvalidName { line: 1, .. }
        ));
        assert!(matches!(
            parse("#define F(x) x").unwrap_err(),
            HeaderError::InvalidName { line: 1, .. }
        ));
        assert!(matches!(
            parse("int x = 1;").unwrap_err(),
            HeaderError::UnexpectedLine { line: 1, .. }
        ));
        assert_eq!(
            parse("/* open\n#define A \"1\"").unwrap_err(),
            HeaderError::UnterminatedComment { line: 1 }
        );
    }

    #[test]
    fn ignores_commented_prose_and_other_directives() {
        let text = "#pragma once\n// #define is used below\n#ifndef GUARD\n#define GUARD\n#endif\n";
        let header = parse(text).unwrap();
        assert_eq!(header.get("GUARD").unwrap().value, Value::Empty);
        assert_eq!(header.len(), 1);
    }

    #[test]
    fn upsert_replaces_both_states() {
        let mut header = parse("//#define CONFIG_PIN D2").unwrap();
        header.upsert(Define::new("CONFIG_PIN", Value::Token("D3".to_string()), true));
        assert_eq!(header.len(), 1);
        assert!(header.get_disabled("CONFIG_PIN").is_none());
        assert_eq!(
            header.get("CONFIG_PIN").unwrap().value,
            Value::Token("D3".to_string())
        );
    }

    #[test]
    fn unescapes_string_literals() {
        let header = parse(r#"#define PASS "a\"b\\c""#).unwrap();
        assert_eq!(header.get("PASS").unwrap().value, Value::Str("a\"b\\c".to_string()));
    }

    #[test]
    fn rendered_document_parses_back() {
        let doc = HeaderDocument::new("Settings for this specific MMRC client")
            .comment("Access point")
            .define(Define::new("APNAME", Value::Str("say \"hi\"".to_string()), true))
            .blank()
            .define(Define::new("CONFIG_PIN", Value::Token("D2".to_string()), false));
        let text = render(&doc);

        assert!(text.starts_with("/**\n  * Settings for this specific MMRC client\n  */\n"));
        assert!(text.contains("//#define CONFIG_PIN D2\n"));

        let header = parse(&text).unwrap();
        assert_eq!(
            header.get("APNAME").unwrap().value,
            Value::Str("say \"hi\"".to_string())
        );
        assert!(header.get_disabled("CONFIG_PIN").is_some());
    }
}
