//! Positional scanner for fixed-grammar AT reply lines.
//!
//! Replies are prefix-tagged lines with comma-separated positional fields:
//!
//! ```text
//! +CSQ: 18,99
//! +CGPADDR: 1,"10.188.32.7"
//! +MDNSCFG: "ip","183.230.126.224",,"183.230.126.225"
//! ```
//!
//! [`scan_line`] walks such a line against a [`FieldSpec`] slice and
//! captures decimal integers, quoted strings and bare tokens. Matching is
//! best-effort: it stops at the first field the input cannot satisfy and
//! returns what it captured so far, so a truncated reply is a short match,
//! never a panic.

/// What to extract at a position. `Skip*` variants advance the cursor
/// without capturing, mirroring `%*d`-style suppression in the modem docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    /// Signed decimal integer.
    Int,
    SkipInt,
    /// Double-quoted string; may contain commas and `\"` escapes.
    Quoted,
    SkipQuoted,
    /// Bare token up to the next comma (possibly empty).
    Token,
    SkipToken,
}

/// A captured field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Int(_) => None,
        }
    }
}

/// Scan `line` against `spec`, requiring it to start with `keyword`.
///
/// Returns `None` when the keyword does not lead the line. Otherwise
/// returns the captured fields, which may be fewer than the spec's capture
/// positions when the line is truncated or malformed mid-way.
pub fn scan_line(line: &str, keyword: &str, spec: &[FieldSpec]) -> Option<Vec<FieldValue>> {
    let rest = line.strip_prefix(keyword)?;
    let mut cursor = Cursor::new(rest);
    let mut values = Vec::new();

    for (i, field) in spec.iter().enumerate() {
        if i > 0 && !cursor.take_comma() {
            break;
        }
        cursor.skip_spaces();
        let captured = match field {
            FieldSpec::Int | FieldSpec::SkipInt => match cursor.take_int() {
                Some(v) => Some(FieldValue::Int(v)),
                None => break,
            },
            FieldSpec::Quoted | FieldSpec::SkipQuoted => match cursor.take_quoted() {
                Some(s) => Some(FieldValue::Text(s)),
                None => break,
            },
            FieldSpec::Token | FieldSpec::SkipToken => {
                Some(FieldValue::Text(cursor.take_token()))
            }
        };
        match field {
            FieldSpec::SkipInt | FieldSpec::SkipQuoted | FieldSpec::SkipToken => {}
            _ => {
                if let Some(v) = captured {
                    values.push(v);
                }
            }
        }
    }

    Some(values)
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(rest: &'a str) -> Self {
        Cursor { rest }
    }

    fn skip_spaces(&mut self) {
        self.rest = self.rest.trim_start_matches(' ');
    }

    /// Consume a separating comma (with surrounding spaces). Returns false
    /// at end of input or when something other than a comma is next.
    fn take_comma(&mut self) -> bool {
        self.skip_spaces();
        match self.rest.strip_prefix(',') {
            Some(r) => {
                self.rest = r;
                true
            }
            None => false,
        }
    }

    fn take_int(&mut self) -> Option<i64> {
        let bytes = self.rest.as_bytes();
        let mut end = 0;
        if bytes.first() == Some(&b'-') {
            end = 1;
        }
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let digits = &self.rest[..end];
        if digits.is_empty() || digits == "-" {
            return None;
        }
        let value = digits.parse::<i64>().ok()?;
        self.rest = &self.rest[end..];
        Some(value)
    }

    /// Consume `"..."`, honoring `\"` escapes. `None` on a missing opening
    /// quote or an unterminated string.
    fn take_quoted(&mut self) -> Option<String> {
        let body = self.rest.strip_prefix('"')?;
        let mut out = String::new();
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => return None,
                },
                '"' => {
                    self.rest = &body[i + 1..];
                    return Some(out);
                }
                _ => out.push(c),
            }
        }
        None
    }

    /// Consume up to the next comma or end of line. Empty slots (`,,`)
    /// yield an empty token.
    fn take_token(&mut self) -> String {
        let end = self.rest.find(',').unwrap_or(self.rest.len());
        let token = self.rest[..end].trim().to_string();
        self.rest = &self.rest[end..];
        token
    }
}
