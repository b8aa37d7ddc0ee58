//! Comment Locator
//!
//! Splits source text into regions (code, strings, comments, docstrings) using
//! only the delimiters of a [`LanguageProfile`], and exposes the comment
//! regions as a lazy sequence of [`CommentSpan`]s.
//!
//! The locator never looks inside comments. Block comments do not nest: the
//! first closing delimiter ends them. Line-comment tokens inside block
//! comments and comment-like text inside string literals are ignored because
//! the lexer is already in the block or string state when it reaches them.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::language::LanguageProfile;
use crate::source::LineIndex;

// ============================================================================
// Lexer
// ============================================================================

/// Kind of a lexical region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Code,
    Str,
    LineComment,
    BlockComment,
    Docstring,
}

impl RegionKind {
    pub fn is_comment(&self) -> bool {
        matches!(
            self,
            RegionKind::LineComment | RegionKind::BlockComment | RegionKind::Docstring
        )
    }
}

/// A contiguous byte range of one lexical kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub start: usize,
    pub end: usize,
    /// The closing delimiter was never found.
    pub unterminated: bool,
}

#[derive(Debug, Clone)]
enum Opener {
    Docstring(String),
    Block(String, String),
    Line(String),
    Str { delim: String, multiline: bool },
}

impl Opener {
    fn token(&self) -> &str {
        match self {
            Opener::Docstring(t) | Opener::Line(t) => t,
            Opener::Block(open, _) => open,
            Opener::Str { delim, .. } => delim,
        }
    }
}

/// Region tokenizer driven by a language profile.
///
/// Yields regions covering the whole input in order, with adjacent code
/// merged into one region.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    openers: Arc<Vec<Opener>>,
    char_literals: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, profile: &LanguageProfile) -> Self {
        let mut openers = Vec::new();
        for delim in &profile.docstrings {
            openers.push(Opener::Docstring(delim.clone()));
        }
        if let Some((open, close)) = &profile.block_comment {
            openers.push(Opener::Block(open.clone(), close.clone()));
        }
        if let Some(token) = &profile.line_comment {
            openers.push(Opener::Line(token.clone()));
        }
        for delim in &profile.multiline_strings {
            openers.push(Opener::Str {
                delim: delim.clone(),
                multiline: true,
            });
        }
        for delim in &profile.strings {
            openers.push(Opener::Str {
                delim: delim.clone(),
                multiline: false,
            });
        }
        openers.retain(|o| !o.token().is_empty());
        // Longest token first; stable sort keeps docstrings ahead of strings on ties.
        openers.sort_by(|a, b| b.token().len().cmp(&a.token().len()));

        Self {
            source,
            pos: 0,
            openers: Arc::new(openers),
            char_literals: profile.char_literals,
        }
    }

    fn opener_at(&self, at: usize) -> Option<&Opener> {
        let rest = &self.source[at..];
        self.openers.iter().find(|o| rest.starts_with(o.token()))
    }

    /// End of a `'x'` or `'\n'` literal starting at `at`. Lifetimes and
    /// labels (`'a`) have no closing quote and are left as code.
    fn char_literal_end(&self, at: usize) -> Option<usize> {
        if !self.char_literals {
            return None;
        }
        let rest = self.source[at..].strip_prefix('\'')?;
        let body_len = if rest.starts_with('\\') {
            // `\u{10FFFF}` is the longest escape
            rest.char_indices()
                .skip(2)
                .take(10)
                .find(|&(_, c)| c == '\'' || c == '\n')
                .filter(|&(_, c)| c == '\'')?
                .0
        } else {
            let c = rest.chars().next().filter(|&c| c != '\'' && c != '\n')?;
            c.len_utf8()
        };
        rest[body_len..]
            .starts_with('\'')
            .then_some(at + 1 + body_len + 1)
    }

    fn char_len_at(&self, at: usize) -> usize {
        self.source[at..].chars().next().map_or(1, char::len_utf8)
    }

    /// End of a delimited region whose close token is searched from `from`.
    fn find_close(&self, from: usize, close: &str) -> (usize, bool) {
        match self.source[from..].find(close) {
            Some(idx) => (from + idx + close.len(), false),
            None => (self.source.len(), true),
        }
    }

    fn string_end(&self, from: usize, delim: &str, multiline: bool) -> (usize, bool) {
        let mut i = from;
        while i < self.source.len() {
            let rest = &self.source[i..];
            if rest.starts_with('\\') {
                i += 1;
                if i < self.source.len() {
                    i += self.char_len_at(i);
                }
                continue;
            }
            if rest.starts_with(delim) {
                return (i + delim.len(), false);
            }
            if !multiline && rest.starts_with('\n') {
                return (i, true);
            }
            i += self.char_len_at(i);
        }
        (self.source.len(), true)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let len = self.source.len();
        let start = self.pos;
        if start >= len {
            return None;
        }

        if let Some(opener) = self.opener_at(start) {
            let token_end = start + opener.token().len();
            let (kind, (end, unterminated)) = match opener {
                Opener::Docstring(delim) if is_own_line(self.source, start) => (
                    RegionKind::Docstring,
                    self.find_close(token_end, delim),
                ),
                // A triple-quoted literal in expression position is just a string.
                Opener::Docstring(delim) => (
                    RegionKind::Str,
                    self.find_close(token_end, delim),
                ),
                Opener::Block(_, close) => {
                    (RegionKind::BlockComment, self.find_close(token_end, close))
                }
                Opener::Line(_) => {
                    let end = self.source[token_end..]
                        .find('\n')
                        .map_or(len, |idx| token_end + idx);
                    (RegionKind::LineComment, (end, false))
                }
                Opener::Str { delim, multiline } => (
                    RegionKind::Str,
                    self.string_end(token_end, delim, *multiline),
                ),
            };
            self.pos = end;
            return Some(Region {
                kind,
                start,
                end,
                unterminated,
            });
        }

        if let Some(end) = self.char_literal_end(start) {
            self.pos = end;
            return Some(Region {
                kind: RegionKind::Str,
                start,
                end,
                unterminated: false,
            });
        }

        let mut i = start;
        while i < len && self.opener_at(i).is_none() && self.char_literal_end(i).is_none() {
            i += self.char_len_at(i);
        }
        self.pos = i;
        Some(Region {
            kind: RegionKind::Code,
            start,
            end: i,
            unterminated: false,
        })
    }
}

/// Whether only whitespace precedes `offset` on its line.
pub fn is_own_line(source: &str, offset: usize) -> bool {
    source[..offset]
        .rsplit('\n')
        .next()
        .map_or(true, |prefix| prefix.trim().is_empty())
}

/// Copy of `source` with every non-code region blanked to spaces.
///
/// Newlines survive so line numbers and byte offsets are unchanged. Used by
/// the scope resolver to look for structural cues in code only.
pub fn code_mask(source: &str, profile: &LanguageProfile) -> String {
    let mut bytes = source.as_bytes().to_vec();
    for region in Lexer::new(source, profile) {
        if region.kind == RegionKind::Code {
            continue;
        }
        for b in &mut bytes[region.start..region.end] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

// ============================================================================
// Comment Spans
// ============================================================================

/// Syntactic form of a comment span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    /// One line comment, or a run of consecutive own-line line comments
    Line,
    Block,
    Docstring,
}

impl CommentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentKind::Line => "line",
            CommentKind::Block => "block",
            CommentKind::Docstring => "docstring",
        }
    }
}

/// A located comment or docstring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSpan {
    pub kind: CommentKind,
    /// Byte offset of the opening delimiter
    pub start: usize,
    /// Byte offset one past the closing delimiter (or end of file)
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub column: usize,
    /// Comment text with delimiters and decoration replaced by spaces.
    /// `body.len() == end - start`, so `start + i` is the file offset of `body[i..]`.
    pub body: String,
    pub unterminated: bool,
    /// Name of the profile the span was located with
    pub language: String,
}

impl CommentSpan {
    /// File offset of a byte index inside `body`.
    pub fn file_offset(&self, body_index: usize) -> usize {
        self.start + body_index
    }

    /// Warning for a comment that runs to end of file.
    pub fn unterminated_warning(&self, file: &str) -> Option<Diagnostic> {
        self.unterminated.then(|| {
            Diagnostic::new(
                DiagnosticCode::LocatorWarning,
                format!(
                    "unterminated {} comment runs to end of file",
                    self.kind.as_str()
                ),
                file,
                self.start_line,
                self.column,
            )
        })
    }
}

/// Lazy, restartable sequence of comment spans.
///
/// Cloning the iterator restarts nothing; call [`locate`] again to rescan
/// from the top. Both produce identical output for the same input.
#[derive(Debug, Clone)]
pub struct CommentSpans<'a> {
    source: &'a str,
    lexer: Lexer<'a>,
    lines: Arc<LineIndex>,
    line_token: Option<String>,
    language: String,
    lookahead: VecDeque<Region>,
}

/// Locate every comment span in `source`.
pub fn locate<'a>(source: &'a str, profile: &LanguageProfile) -> CommentSpans<'a> {
    locate_with_index(source, profile, Arc::new(LineIndex::new(source)))
}

/// Locate comment spans reusing a prebuilt line index.
pub fn locate_with_index<'a>(
    source: &'a str,
    profile: &LanguageProfile,
    lines: Arc<LineIndex>,
) -> CommentSpans<'a> {
    CommentSpans {
        source,
        lexer: Lexer::new(source, profile),
        lines,
        line_token: profile.line_comment.clone(),
        language: profile.name.clone(),
        lookahead: VecDeque::new(),
    }
}

impl CommentSpans<'_> {
    fn next_region(&mut self) -> Option<Region> {
        self.lookahead.pop_front().or_else(|| self.lexer.next())
    }

    fn peek_region(&mut self, n: usize) -> Option<Region> {
        while self.lookahead.len() <= n {
            let region = self.lexer.next()?;
            self.lookahead.push_back(region);
        }
        self.lookahead.get(n).copied()
    }

    /// Pull following own-line line comments into one run.
    fn extend_run(&mut self, first: Region) -> Vec<Region> {
        let mut parts = vec![first];
        if !is_own_line(self.source, first.start) {
            return parts;
        }
        loop {
            let (Some(gap), Some(next)) = (self.peek_region(0), self.peek_region(1)) else {
                break;
            };
            let gap_text = &self.source[gap.start..gap.end];
            let joins = gap.kind == RegionKind::Code
                && next.kind == RegionKind::LineComment
                && gap_text.trim().is_empty()
                && gap_text.matches('\n').count() == 1
                && is_own_line(self.source, next.start);
            if !joins {
                break;
            }
            self.lookahead.pop_front();
            self.lookahead.pop_front();
            parts.push(next);
        }
        parts
    }

    fn build(&self, kind: CommentKind, parts: &[Region], delims: Delims<'_>) -> CommentSpan {
        let start = parts.first().map_or(0, |r| r.start);
        let end = parts.last().map_or(start, |r| r.end);
        let unterminated = parts.iter().any(|r| r.unterminated);
        let mut body = self.source.as_bytes()[start..end].to_vec();

        match delims {
            Delims::Line(token) => {
                for part in parts {
                    let at = part.start - start;
                    blank_prefix(&mut body, at, token.as_bytes());
                }
            }
            Delims::Block(open, close) => {
                blank_prefix(&mut body, 0, open.as_bytes());
                if !unterminated {
                    let len = body.len();
                    blank(&mut body, len.saturating_sub(close.len()), len);
                }
                blank_star_decoration(&mut body);
            }
            Delims::Docstring(delim) => {
                blank(&mut body, 0, delim.len());
                if !unterminated && body.len() >= 2 * delim.len() {
                    let len = body.len();
                    blank(&mut body, len - delim.len(), len);
                }
            }
        }

        let (start_line, column) = self.lines.position(start);
        CommentSpan {
            kind,
            start,
            end,
            start_line,
            end_line: self.lines.line(end.saturating_sub(1).max(start)),
            column,
            body: String::from_utf8_lossy(&body).into_owned(),
            unterminated,
            language: self.language.clone(),
        }
    }

    fn delimiters_of(&self, region: &Region) -> Option<(CommentKind, String, String)> {
        let text = &self.source[region.start..region.end];
        match region.kind {
            RegionKind::LineComment => {
                let token = self.line_token.clone()?;
                Some((CommentKind::Line, token, String::new()))
            }
            RegionKind::BlockComment => {
                let (open, close) = self.lexer_block_delims()?;
                Some((CommentKind::Block, open, close))
            }
            RegionKind::Docstring => {
                let delim = self.docstring_delim(text)?;
                Some((CommentKind::Docstring, delim, String::new()))
            }
            RegionKind::Code | RegionKind::Str => None,
        }
    }

    fn lexer_block_delims(&self) -> Option<(String, String)> {
        self.lexer.openers.iter().find_map(|o| match o {
            Opener::Block(open, close) => Some((open.clone(), close.clone())),
            _ => None,
        })
    }

    fn docstring_delim(&self, text: &str) -> Option<String> {
        self.lexer.openers.iter().find_map(|o| match o {
            Opener::Docstring(d) if text.starts_with(d.as_str()) => Some(d.clone()),
            _ => None,
        })
    }
}

enum Delims<'d> {
    Line(&'d str),
    Block(&'d str, &'d str),
    Docstring(&'d str),
}

impl Iterator for CommentSpans<'_> {
    type Item = CommentSpan;

    fn next(&mut self) -> Option<CommentSpan> {
        loop {
            let region = self.next_region()?;
            let Some((kind, open, close)) = self.delimiters_of(&region) else {
                continue;
            };
            let span = match kind {
                CommentKind::Line => {
                    let parts = self.extend_run(region);
                    self.build(kind, &parts, Delims::Line(&open))
                }
                CommentKind::Block => self.build(kind, &[region], Delims::Block(&open, &close)),
                CommentKind::Docstring => self.build(kind, &[region], Delims::Docstring(&open)),
            };
            return Some(span);
        }
    }
}

// ============================================================================
// Body blanking
// ============================================================================

fn blank(body: &mut [u8], from: usize, to: usize) {
    let to = to.min(body.len());
    for b in body.iter_mut().take(to).skip(from) {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

/// Blank `token` at `at` plus any repeated decoration right after it
/// (`///`, `//!`, `##`, `/**`).
fn blank_prefix(body: &mut [u8], at: usize, token: &[u8]) {
    let mut end = (at + token.len()).min(body.len());
    let last = token.last().copied();
    while end < body.len() && (Some(body[end]) == last || body[end] == b'!') {
        end += 1;
    }
    blank(body, at, end);
}

/// Blank a leading `*` on each continuation line of a block comment.
fn blank_star_decoration(body: &mut [u8]) {
    let mut line_start = false;
    for i in 0..body.len() {
        match body[i] {
            b'\n' => line_start = true,
            b' ' | b'\t' | b'\r' => {}
            b'*' if line_start => {
                if body.get(i + 1) != Some(&b'/') {
                    body[i] = b' ';
                }
                line_start = false;
            }
            _ => line_start = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spans(source: &str, profile: &LanguageProfile) -> Vec<CommentSpan> {
        locate(source, profile).collect()
    }

    // ========================================================================
    // Lexer Tests
    // ========================================================================

    #[test]
    fn test_regions_cover_input() {
        let source = "let a = \"// no\"; // yes\n/* b */ x";
        let regions: Vec<Region> = Lexer::new(source, &LanguageProfile::rust()).collect();
        assert_eq!(regions.first().unwrap().start, 0);
        assert_eq!(regions.last().unwrap().end, source.len());
        for pair in regions.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let kinds: Vec<RegionKind> = regions.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RegionKind::Code,
                RegionKind::Str,
                RegionKind::Code,
                RegionKind::LineComment,
                RegionKind::Code,
                RegionKind::BlockComment,
                RegionKind::Code,
            ]
        );
    }

    #[test]
    fn test_code_mask_preserves_offsets() {
        let source = "x = \"{\" # {\ny = 1\n";
        let masked = code_mask(source, &LanguageProfile::python());
        assert_eq!(masked.len(), source.len());
        assert!(!masked.contains('{'));
        assert_eq!(masked.lines().nth(1), Some("y = 1"));
    }

    // ========================================================================
    // Comment Span Tests
    // ========================================================================

    #[test]
    fn test_string_with_comment_token_is_skipped() {
        let source = "const url = \"http://example.com\";\n// real\n";
        let found = spans(source, &LanguageProfile::javascript());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_line, 2);
        assert_eq!(found[0].body.trim(), "real");
    }

    #[test]
    fn test_rust_char_literals_do_not_open_strings() {
        let source = "let q = '\"'; // @ai-metadata {\"description\": \"quote\"}\n\
                      let e = '\\''; // escaped\n\
                      fn f<'a>(s: &'a str) -> &'a str { s } // lifetime\n";
        let found = spans(source, &LanguageProfile::rust());
        let bodies: Vec<&str> = found.iter().map(|s| s.body.trim()).collect();
        assert_eq!(
            bodies,
            vec![
                "@ai-metadata {\"description\": \"quote\"}",
                "escaped",
                "lifetime",
            ]
        );
    }

    #[test]
    fn test_java_char_literal_with_quote() {
        let source = "char q = '\"'; // after\n";
        let found = spans(source, &LanguageProfile::java());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body.trim(), "after");
    }

    #[test]
    fn test_block_comment_does_not_nest() {
        let source = "/* outer /* inner */ tail */";
        let found = spans(source, &LanguageProfile::java());
        assert_eq!(found.len(), 1);
        assert_eq!(&source[found[0].start..found[0].end], "/* outer /* inner */");
    }

    #[test]
    fn test_line_token_inside_block_is_ignored() {
        let source = "/* a // b\n c */\n";
        let found = spans(source, &LanguageProfile::csharp());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CommentKind::Block);
        assert_eq!(found[0].end_line, 2);
    }

    #[test]
    fn test_unterminated_block_runs_to_eof() {
        let source = "code();\n/* never closed\nmore";
        let found = spans(source, &LanguageProfile::go());
        assert_eq!(found.len(), 1);
        assert!(found[0].unterminated);
        assert_eq!(found[0].end, source.len());

        let warning = found[0].unterminated_warning("a.go").unwrap();
        assert_eq!(warning.code, DiagnosticCode::LocatorWarning);
        assert_eq!(warning.line, 2);
    }

    #[test]
    fn test_line_comment_run_merges() {
        let source = "# one\n# two\n\n# three\nx = 1  # trailing\n";
        let found = spans(source, &LanguageProfile::python());
        assert_eq!(found.len(), 3);
        assert_eq!((found[0].start_line, found[0].end_line), (1, 2));
        assert_eq!(found[0].body, "  one\n  two");
        assert_eq!(found[1].start_line, 4);
        assert_eq!(found[2].start_line, 5);
    }

    #[test]
    fn test_trailing_comment_does_not_join_run() {
        let source = "a(); // trailing\n// own line\n";
        let found = spans(source, &LanguageProfile::typescript());
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_body_offsets_match_file() {
        let source = "fn x() {}\n/**\n * @tag {\"a\": 1}\n */\n";
        let found = spans(source, &LanguageProfile::rust());
        let span = &found[0];
        assert_eq!(span.body.len(), span.end - span.start);
        let at = span.body.find("@tag").unwrap();
        assert_eq!(&source[span.file_offset(at)..span.file_offset(at) + 4], "@tag");
        assert!(!span.body.contains('*'));
    }

    #[test]
    fn test_python_docstring_vs_string() {
        let source = "def f():\n    \"\"\"doc\"\"\"\n    x = \"\"\"not doc\"\"\"\n";
        let found = spans(source, &LanguageProfile::python());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, CommentKind::Docstring);
        assert_eq!(found[0].body.trim(), "doc");
    }

    #[test]
    fn test_locate_is_restartable() {
        let source = "// a\nx();\n/* b */\n";
        let profile = LanguageProfile::javascript();
        let first: Vec<_> = locate(source, &profile).collect();
        let second: Vec<_> = locate(source, &profile).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let source = "s = 'it\\'s # not'\n# yes\n";
        let found = spans(source, &LanguageProfile::python());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_line, 2);
    }
}
