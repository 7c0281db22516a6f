//! Bounded container for one command's reply lines.
//!
//! An [`AtResponse`] lives for exactly one [`crate::AtClient::exec`] call:
//! created with a byte budget and an expected-line-count hint, filled from
//! the wire, consumed by the caller, dropped. It is never retained across
//! commands.

use std::time::Duration;

use crate::parser::{scan_line, FieldSpec, FieldValue};

/// Accumulated reply lines for a single AT command.
#[derive(Debug)]
pub struct AtResponse {
    lines: Vec<String>,
    /// Expected meaningful line count; 0 means "wait for terminal OK/ERROR".
    line_hint: usize,
    /// Total bytes this response may accumulate.
    byte_budget: usize,
    bytes_used: usize,
    /// Overall deadline the owning command was issued with.
    timeout: Duration,
}

impl AtResponse {
    pub fn new(byte_budget: usize, line_hint: usize, timeout: Duration) -> Self {
        AtResponse {
            lines: Vec::new(),
            line_hint,
            byte_budget,
            bytes_used: 0,
            timeout,
        }
    }

    /// Append a received line. Returns `false` when the byte budget would be
    /// exceeded; the line is not stored in that case.
    #[must_use]
    pub(crate) fn push_line(&mut self, line: &str) -> bool {
        let needed = self.bytes_used + line.len() + 2;
        if needed > self.byte_budget {
            return false;
        }
        self.bytes_used = needed;
        self.lines.push(line.to_string());
        true
    }

    pub fn line_hint(&self) -> usize {
        self.line_hint
    }

    pub fn byte_budget(&self) -> usize {
        self.byte_budget
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Line by 0-based index.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// First line starting with `keyword`, if any.
    pub fn first_line_with(&self, keyword: &str) -> Option<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .find(|l| l.starts_with(keyword))
    }

    /// Locate the first line starting with `keyword` and scan it against a
    /// positional field spec.
    ///
    /// `None` means the keyword is absent from the whole response; a `Some`
    /// shorter than `spec`'s capture count means the tagged line was
    /// malformed or truncated. Both are soft failures — the caller retries
    /// the step or fails it, nothing panics. Unrelated interleaved lines
    /// (asynchronous notifications) are skipped by the keyword search.
    pub fn parse_by_keyword(
        &self,
        keyword: &str,
        spec: &[FieldSpec],
    ) -> Option<Vec<FieldValue>> {
        let line = self.first_line_with(keyword)?;
        scan_line(line, keyword, spec)
    }
}
