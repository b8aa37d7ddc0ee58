//! Scope Resolver
//!
//! Decides which code construct a comment span describes, using lightweight
//! structural cues instead of a parser: declaration keywords from the
//! language profile, matched line by line over code regions only, plus brace
//! matching or indentation to find where bodies end.
//!
//! Resolution rules, first match wins:
//!
//! 1. A docstring that is the first statement of a class or function body
//!    belongs to that declaration.
//! 2. The first code line after the span (skipping blank lines, other
//!    comments and decorator/attribute lines) holds a declaration: bind to it.
//!    A file header comment separated from that line by a blank line is
//!    excluded from this rule.
//! 3. The span is the first content of the file (after an optional shebang):
//!    File scope.
//! 4. Otherwise Block scope, nested under the innermost enclosing class or
//!    function.
//!
//! This is a precision/effort trade-off. Deeply nested one-liners and
//! unusual layouts can be misclassified; unbalanced braces never fail, they
//! only drop enclosing paths.

use std::collections::HashMap;
use std::fmt;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::language::{BlockStyle, LanguageProfile, MethodStyle};
use crate::locator::{code_mask, CommentKind, CommentSpan};
use crate::source::LineIndex;

/// Name given to anonymous block scopes.
pub const BLOCK_SCOPE_NAME: &str = "<block>";

// ============================================================================
// Scope Types
// ============================================================================

/// The closed set of constructs an annotation can describe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    File,
    Class,
    Function,
    Variable,
    Block,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::File => "file",
            ScopeKind::Class => "class",
            ScopeKind::Function => "function",
            ScopeKind::Variable => "variable",
            ScopeKind::Block => "block",
        }
    }

    /// Whether this kind can enclose other declarations.
    pub fn is_container(&self) -> bool {
        matches!(self, ScopeKind::Class | ScopeKind::Function)
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scope an annotation is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeRef {
    pub kind: ScopeKind,
    /// Construct name; empty for File scope, `<block>` for Block scope
    pub name: String,
    /// Names of enclosing classes/functions, outermost first
    pub path: Vec<String>,
    pub line: usize,
    pub column: usize,
}

impl ScopeRef {
    pub fn file() -> Self {
        Self {
            kind: ScopeKind::File,
            name: String::new(),
            path: Vec::new(),
            line: 1,
            column: 1,
        }
    }

    /// Anonymous scopes need their line to stay unique within a file.
    pub fn is_anonymous(&self) -> bool {
        self.kind == ScopeKind::Block
    }

    /// Enclosing path plus own name, joined with `::`.
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<&str> = self.path.iter().map(String::as_str).collect();
        if !self.name.is_empty() {
            parts.push(&self.name);
        }
        parts.join("::")
    }
}

/// A declaration found in the code regions of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: ScopeKind,
    pub name: String,
    /// Names of enclosing classes/functions, outermost first
    pub path: Vec<String>,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the declared name
    pub offset: usize,
    /// Last line of the declaration header (`{` or `:` line)
    pub header_end_line: usize,
    /// Byte range of the body, when the declaration has one
    pub body: Option<(usize, usize)>,
}

impl Declaration {
    pub fn to_scope(&self) -> ScopeRef {
        ScopeRef {
            kind: self.kind,
            name: self.name.clone(),
            path: self.path.clone(),
            line: self.line,
            column: self.column,
        }
    }

    fn encloses(&self, offset: usize) -> bool {
        self.body
            .map_or(false, |(start, end)| start < offset && offset < end)
    }
}

// ============================================================================
// Structural Patterns
// ============================================================================

const IDENT: &str = r"(?P<name>[A-Za-z_$][\w$]*)";
const TYPE: &str = r"(?P<ty>[\w.$]+(?:<[^()]*>)?(?:\[\])*\??)";

/// Words that look like a method name in `name(...)` position but are not.
const CONTROL_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "with", "else", "do",
    "try", "new", "typeof", "await", "yield", "sizeof", "super", "this", "using", "lock",
    "foreach", "fixed", "throw", "delete",
];

/// Words that look like a return type but start a statement.
const STATEMENT_WORDS: &[&str] = &[
    "return", "new", "throw", "else", "await", "yield", "case", "goto", "delete", "typeof",
    "in", "of", "var", "let", "const",
];

fn alternation(words: &[String]) -> Option<String> {
    let mut escaped: Vec<String> = words
        .iter()
        .filter(|w| !w.is_empty())
        .map(|w| regex::escape(w))
        .collect();
    if escaped.is_empty() {
        return None;
    }
    escaped.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    Some(format!("(?:{})", escaped.join("|")))
}

fn template(pattern: &str, mods: &str, keywords: &str) -> Result<Regex, regex::Error> {
    Regex::new(
        &pattern
            .replace("%MODS%", mods)
            .replace("%KW%", keywords)
            .replace("%NAME%", IDENT)
            .replace("%TYPE%", TYPE),
    )
}

/// Declaration regexes compiled from one language profile.
///
/// Compile once per profile and share across files.
#[derive(Debug, Clone)]
pub struct StructuralPatterns {
    block_style: BlockStyle,
    decorator_prefixes: Vec<String>,
    class: Option<Regex>,
    function: Option<Regex>,
    function_binding: Option<Regex>,
    js_method: Option<Regex>,
    c_method: Option<Regex>,
    field: Option<Regex>,
    variable: Option<Regex>,
    assignment: Option<Regex>,
}

impl StructuralPatterns {
    pub fn compile(profile: &LanguageProfile) -> Result<Self, regex::Error> {
        let mods_alt = alternation(&profile.modifiers);
        let mods = mods_alt
            .as_deref()
            .map(|alt| format!(r"(?:{alt}(?:\([^)]*\))?\s+)*"))
            .unwrap_or_default();
        let class_kw = alternation(&profile.class_keywords);
        let function_kw = alternation(&profile.function_keywords);
        let variable_kw = alternation(&profile.variable_keywords);

        let class = class_kw
            .as_deref()
            .map(|kw| template(r"^\s*%MODS%%KW%(?:\s*<[^>]*>)?\s+%NAME%", &mods, kw))
            .transpose()?;
        let function = function_kw
            .as_deref()
            .map(|kw| template(r"^\s*%MODS%%KW%\s+(?:\([^)]*\)\s*)?%NAME%", &mods, kw))
            .transpose()?;
        let variable = variable_kw
            .as_deref()
            .map(|kw| template(r"^\s*%MODS%%KW%\s+(?:mut\s+)?%NAME%", &mods, kw))
            .transpose()?;

        let (function_binding, js_method, c_method, field) = match profile.method_style {
            MethodStyle::None => (None, None, None, None),
            MethodStyle::JsStyle => {
                let binding = variable_kw
                    .as_deref()
                    .map(|kw| {
                        template(
                            r"^\s*%MODS%%KW%\s+%NAME%\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)",
                            &mods,
                            kw,
                        )
                    })
                    .transpose()?;
                let method = template(
                    r"^\s*%MODS%(?:(?:get|set)\s+)?(?:\*\s*)?%NAME%\s*(?:<[^>]*>)?\([^)]*\)\s*(?::\s*[^{;=]+)?\{",
                    &mods,
                    "",
                )?;
                (binding, Some(method), None, None)
            }
            MethodStyle::CStyle => {
                let method = template(
                    r"^\s*(?P<mods>%MODS%)(?:%TYPE%\s+)?%NAME%\s*(?:<[^>]*>)?\(",
                    &mods,
                    "",
                )?;
                let field = mods_alt
                    .as_deref()
                    .map(|alt| {
                        template(
                            r"^\s*(?:%KW%(?:\([^)]*\))?\s+)+%TYPE%\s+%NAME%\s*(?:=|;)",
                            "",
                            alt,
                        )
                    })
                    .transpose()?;
                (None, None, Some(method), field)
            }
        };

        let assignment = profile
            .assignment_variables
            .then(|| Regex::new(r"^(?P<name>[A-Za-z_]\w*)\s*(?::[^=]+)?=(?:[^=]|$)"))
            .transpose()?;

        Ok(Self {
            block_style: profile.block_style,
            decorator_prefixes: profile.decorator_prefixes.clone(),
            class,
            function,
            function_binding,
            js_method,
            c_method,
            field,
            variable,
            assignment,
        })
    }

    /// Match one masked code line against the declaration patterns.
    fn match_line<'l>(&self, line: &'l str) -> Option<(ScopeKind, Captures<'l>)> {
        let try_kind = |regex: &Option<Regex>, kind: ScopeKind| {
            regex
                .as_ref()
                .and_then(|re| re.captures(line))
                .map(|caps| (kind, caps))
        };

        try_kind(&self.class, ScopeKind::Class)
            .or_else(|| try_kind(&self.function, ScopeKind::Function))
            .or_else(|| try_kind(&self.function_binding, ScopeKind::Function))
            .or_else(|| {
                try_kind(&self.js_method, ScopeKind::Function)
                    .filter(|(_, caps)| !is_control_word(caps))
            })
            .or_else(|| {
                try_kind(&self.c_method, ScopeKind::Function).filter(|(_, caps)| {
                    let has_mods = caps.name("mods").map_or(false, |m| !m.as_str().is_empty());
                    let ty = caps.name("ty").map(|m| m.as_str());
                    (has_mods || ty.is_some())
                        && !ty.map_or(false, |t| STATEMENT_WORDS.contains(&t))
                        && !is_control_word(caps)
                })
            })
            .or_else(|| {
                try_kind(&self.field, ScopeKind::Variable).filter(|(_, caps)| {
                    !caps
                        .name("ty")
                        .map_or(false, |t| STATEMENT_WORDS.contains(&t.as_str()))
                })
            })
            .or_else(|| try_kind(&self.variable, ScopeKind::Variable))
            .or_else(|| try_kind(&self.assignment, ScopeKind::Variable))
    }
}

fn is_control_word(caps: &Captures<'_>) -> bool {
    caps.name("name")
        .map_or(true, |m| CONTROL_WORDS.contains(&m.as_str()))
}

fn paren_delta(text: &str) -> i64 {
    text.bytes().fold(0, |depth, b| match b {
        b'(' => depth + 1,
        b')' => depth - 1,
        _ => depth,
    })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

// ============================================================================
// Structural Index
// ============================================================================

/// Per-file structural cues: declarations, their bodies and nesting.
#[derive(Debug, Clone)]
pub struct StructuralIndex {
    declarations: Vec<Declaration>,
    by_line: HashMap<usize, usize>,
    masked_lines: Vec<String>,
    blank_lines: Vec<bool>,
    lines: LineIndex,
    first_content: usize,
    balanced: bool,
    decorator_prefixes: Vec<String>,
    block_style: BlockStyle,
}

impl StructuralIndex {
    /// Index the declarations of `source`.
    pub fn build(source: &str, profile: &LanguageProfile, patterns: &StructuralPatterns) -> Self {
        let masked = code_mask(source, profile);
        let lines = LineIndex::new(source);
        let masked_lines: Vec<String> = masked.split('\n').map(str::to_string).collect();
        let blank_lines: Vec<bool> = source.split('\n').map(|l| l.trim().is_empty()).collect();

        let mut declarations = Vec::new();
        for (idx, text) in masked_lines.iter().enumerate() {
            let Some((kind, caps)) = patterns.match_line(text) else {
                continue;
            };
            let Some(name) = caps.name("name") else {
                continue;
            };
            let line = idx + 1;
            let line_start = lines.line_start(line).unwrap_or(0);
            declarations.push(Declaration {
                kind,
                name: name.as_str().to_string(),
                path: Vec::new(),
                line,
                column: name.start() + 1,
                offset: line_start + name.start(),
                header_end_line: line,
                body: None,
            });
        }

        let balanced = match patterns.block_style {
            BlockStyle::Braces => {
                let (matches, balanced) = match_braces(&masked);
                for decl in declarations.iter_mut().filter(|d| d.kind.is_container()) {
                    brace_body(decl, &masked, &matches, &lines);
                }
                balanced
            }
            BlockStyle::Indentation => {
                for decl in declarations.iter_mut().filter(|d| d.kind.is_container()) {
                    indented_body(decl, &masked_lines, &lines);
                }
                brackets_balanced(&masked)
            }
        };

        if balanced {
            assign_paths(&mut declarations);
        }

        let by_line = declarations
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.line, idx))
            .collect();

        trace!(
            declarations = declarations.len(),
            balanced,
            "Built structural index"
        );

        Self {
            declarations,
            by_line,
            masked_lines,
            blank_lines,
            lines,
            first_content: first_content_offset(source),
            balanced,
            decorator_prefixes: patterns.decorator_prefixes.clone(),
            block_style: patterns.block_style,
        }
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// False when block delimiters do not pair up; enclosing paths are then empty.
    pub fn is_balanced(&self) -> bool {
        self.balanced
    }

    /// Determine the scope a comment span is attached to.
    pub fn resolve(&self, span: &CommentSpan) -> ScopeRef {
        if self.balanced && span.kind == CommentKind::Docstring {
            if let Some(owner) = self.docstring_owner(span) {
                return owner.to_scope();
            }
        }

        let is_header = span.start <= self.first_content;
        if let Some((decl, crossed_blank)) = self.following_declaration(span) {
            if !(is_header && crossed_blank) {
                return decl.to_scope();
            }
        }

        if is_header {
            return ScopeRef::file();
        }

        let mut path = Vec::new();
        if self.balanced {
            if let Some(enclosing) = self.enclosing(span.start) {
                path = enclosing.path.clone();
                path.push(enclosing.name.clone());
            }
        }
        ScopeRef {
            kind: ScopeKind::Block,
            name: BLOCK_SCOPE_NAME.to_string(),
            path,
            line: span.start_line,
            column: span.column,
        }
    }

    fn declaration_on(&self, line: usize) -> Option<&Declaration> {
        self.by_line.get(&line).map(|&idx| &self.declarations[idx])
    }

    /// Innermost class/function whose body contains `offset`.
    fn enclosing(&self, offset: usize) -> Option<&Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.kind.is_container() && d.encloses(offset))
            .max_by_key(|d| d.offset)
    }

    fn docstring_owner(&self, span: &CommentSpan) -> Option<&Declaration> {
        let mut line = span.start_line.checked_sub(1)?;
        while line > 0 && self.blank_lines.get(line - 1).copied().unwrap_or(true) {
            line -= 1;
        }
        if line == 0 {
            return None;
        }
        self.declarations
            .iter()
            .filter(|d| d.kind.is_container() && d.header_end_line == line)
            .find(|d| match self.block_style {
                BlockStyle::Indentation => d.body.is_some(),
                BlockStyle::Braces => d.encloses(span.start),
            })
    }

    /// First declaration after the span, and whether a blank line was crossed.
    fn following_declaration(&self, span: &CommentSpan) -> Option<(&Declaration, bool)> {
        let end_line = self.lines.line(span.end);
        let end_col = span.end - self.lines.line_start(end_line).unwrap_or(0);
        let rest = self
            .masked_lines
            .get(end_line - 1)
            .and_then(|l| l.get(end_col..))
            .unwrap_or("");
        if !rest.trim().is_empty() {
            return self.declaration_on(end_line).map(|d| (d, false));
        }

        let mut crossed_blank = false;
        let mut decorator_depth = 0i64;
        for line in end_line + 1..=self.masked_lines.len() {
            let masked = &self.masked_lines[line - 1];
            let trimmed = masked.trim();
            if decorator_depth > 0 {
                decorator_depth += paren_delta(trimmed);
                continue;
            }
            if trimmed.is_empty() {
                // Blank lines and comment-only lines are skipped alike.
                if self.blank_lines.get(line - 1).copied().unwrap_or(true) {
                    crossed_blank = true;
                }
                continue;
            }
            if self.is_decorator(trimmed) {
                decorator_depth = paren_delta(trimmed).max(0);
                continue;
            }
            return self.declaration_on(line).map(|d| (d, crossed_blank));
        }
        None
    }

    fn is_decorator(&self, trimmed: &str) -> bool {
        self.decorator_prefixes
            .iter()
            .any(|p| !p.is_empty() && trimmed.starts_with(p.as_str()))
    }
}

/// Offset of the first non-whitespace content, skipping a shebang line.
fn first_content_offset(source: &str) -> usize {
    let mut from = 0;
    if source.starts_with("#!") {
        from = source.find('\n').map_or(source.len(), |idx| idx + 1);
    }
    let rest = &source[from..];
    from + (rest.len() - rest.trim_start().len())
}

/// Pair up braces in masked text. Returns open → close offsets and whether
/// every brace found its partner.
fn match_braces(masked: &str) -> (HashMap<usize, usize>, bool) {
    let mut matches = HashMap::new();
    let mut stack = Vec::new();
    let mut balanced = true;
    for (idx, b) in masked.bytes().enumerate() {
        match b {
            b'{' => stack.push(idx),
            b'}' => match stack.pop() {
                Some(open) => {
                    matches.insert(open, idx);
                }
                None => balanced = false,
            },
            _ => {}
        }
    }
    (matches, balanced && stack.is_empty())
}

fn brackets_balanced(masked: &str) -> bool {
    let mut depth = 0i64;
    for b in masked.bytes() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn brace_body(
    decl: &mut Declaration,
    masked: &str,
    matches: &HashMap<usize, usize>,
    lines: &LineIndex,
) {
    let from = decl.offset;
    let open = masked.as_bytes()[from..]
        .iter()
        .position(|&b| matches!(b, b'{' | b';' | b'}'))
        .map(|idx| from + idx)
        .filter(|&idx| masked.as_bytes()[idx] == b'{');
    let Some(open) = open else {
        return;
    };
    let close = matches.get(&open).copied().unwrap_or(masked.len());
    decl.header_end_line = lines.line(open);
    decl.body = Some((open, close));
}

fn indented_body(decl: &mut Declaration, masked_lines: &[String], lines: &LineIndex) {
    let decl_indent = indent_of(&masked_lines[decl.line - 1]);

    // The header ends where parentheses close; a header that does not end
    // with `:` carries its body inline and encloses nothing.
    let mut depth = 0i64;
    let mut header = None;
    for (idx, text) in masked_lines.iter().enumerate().skip(decl.line - 1) {
        depth += paren_delta(text);
        if depth <= 0 {
            header = Some((idx + 1, text.trim_end().ends_with(':')));
            break;
        }
    }
    let Some((header_end, has_block)) = header else {
        return;
    };
    decl.header_end_line = header_end;
    if !has_block {
        return;
    }

    let mut last_body_line = header_end;
    for (idx, text) in masked_lines.iter().enumerate().skip(header_end) {
        if text.trim().is_empty() {
            continue;
        }
        if indent_of(text) <= decl_indent {
            break;
        }
        last_body_line = idx + 1;
    }

    let line_end = |line: usize| {
        lines
            .line_start(line)
            .map_or(0, |start| start + masked_lines[line - 1].len())
    };
    decl.body = Some((line_end(header_end), line_end(last_body_line)));
}

/// Fill enclosing paths from body containment.
fn assign_paths(declarations: &mut [Declaration]) {
    declarations.sort_by_key(|d| d.offset);
    let mut stack: Vec<(String, usize)> = Vec::new();
    for decl in declarations.iter_mut() {
        while stack.last().map_or(false, |(_, end)| *end <= decl.offset) {
            stack.pop();
        }
        decl.path = stack.iter().map(|(name, _)| name.clone()).collect();
        if let Some((_, end)) = decl.body.filter(|_| decl.kind.is_container()) {
            stack.push((decl.name.clone(), end));
        }
    }
}
